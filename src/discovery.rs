//! Binlog 파일 탐색
//!
//! 루트 아래를 재귀적으로 돌면서 파일 이름이 패턴(`mysql-bin.*` 등)에 맞는 파일을 찾는다.
//! 패턴은 `*` (0글자 이상) 와 `?` (정확히 1글자) 만 지원하며 파일 이름 전체와 비교한다.
//! 결과는 경로 순으로 정렬된다.

use crate::error::{BinlogError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub fn discover_binlogs(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(BinlogError::Discovery(format!(
            "root not found: {}",
            root.display()
        )));
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| BinlogError::Discovery(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matched = matches_pattern(&entry.file_name().to_string_lossy(), pattern);
        if matched {
            found.push(entry.into_path());
        }
    }

    debug!(
        "Discovered {} binlog files under {} matching '{}'",
        found.len(),
        root.display(),
        pattern
    );
    Ok(found)
}

/// `*`, `?` 와일드카드 매칭
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p).copied() {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(c) if c == '?' || c == name[n] => {
                n += 1;
                p += 1;
            }
            _ => match backtrack {
                // 직전 '*' 가 한 글자 더 먹도록 되돌아간다
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
