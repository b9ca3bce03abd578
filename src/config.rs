//! 실행 설정
//!
//! 환경 변수에서 기본값을 읽고, CLI 플래그가 있으면 main 에서 덮어쓴다.
//!
//! | 필드 | 환경 변수 | 기본값 |
//! |---|---|---|
//! | `root` | `BINLOG_ROOT` | `./binlogs` |
//! | `out_dir` | `BINLOG_OUT` | `./output` |
//! | `file_pattern` | `BINLOG_PATTERN` | `mysql-bin.*` |
//! | `workers` | `BINLOG_WORKERS` | CPU 수 |
//! | `verify_checksum` | `BINLOG_VERIFY_CHECKSUM` | `false` |
//! | `update_images` | `BINLOG_UPDATE_IMAGES` | `paired` |

use crate::emitter::UpdateImages;
use crate::engine::SessionOptions;
use crate::error::{BinlogError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_ROOT: &str = "BINLOG_ROOT";
pub const ENV_OUT: &str = "BINLOG_OUT";
pub const ENV_PATTERN: &str = "BINLOG_PATTERN";
pub const ENV_WORKERS: &str = "BINLOG_WORKERS";
pub const ENV_VERIFY_CHECKSUM: &str = "BINLOG_VERIFY_CHECKSUM";
pub const ENV_UPDATE_IMAGES: &str = "BINLOG_UPDATE_IMAGES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// binlog 파일 또는 디렉터리
    pub root: PathBuf,
    /// `.jsonl` 출력 디렉터리
    pub out_dir: PathBuf,
    /// 파일 이름 패턴 (`*`, `?`)
    pub file_pattern: String,
    /// 동시에 파싱할 파일 수
    pub workers: usize,
    pub verify_checksum: bool,
    pub update_images: UpdateImages,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            root: PathBuf::from("./binlogs"),
            out_dir: PathBuf::from("./output"),
            file_pattern: "mysql-bin.*".to_string(),
            workers: default_workers(),
            verify_checksum: false,
            update_images: UpdateImages::Paired,
        }
    }
}

impl ParserConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 key → value 조회 함수로 설정을 만든다
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ParserConfig::default();

        if let Some(root) = lookup(ENV_ROOT) {
            config.root = PathBuf::from(root);
        }
        if let Some(out) = lookup(ENV_OUT) {
            config.out_dir = PathBuf::from(out);
        }
        if let Some(pattern) = lookup(ENV_PATTERN) {
            config.file_pattern = pattern;
        }
        if let Some(workers) = lookup(ENV_WORKERS) {
            config.workers = workers.trim().parse().map_err(|_| {
                BinlogError::Config(format!("{} must be a number, got '{}'", ENV_WORKERS, workers))
            })?;
        }
        if let Some(verify) = lookup(ENV_VERIFY_CHECKSUM) {
            config.verify_checksum = parse_bool(ENV_VERIFY_CHECKSUM, &verify)?;
        }
        if let Some(images) = lookup(ENV_UPDATE_IMAGES) {
            config.update_images = images.parse()?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(BinlogError::Config("workers must be at least 1".to_string()));
        }
        if self.file_pattern.trim().is_empty() {
            return Err(BinlogError::Config("file pattern is empty".to_string()));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            verify_checksum: self.verify_checksum,
            update_images: self.update_images,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(BinlogError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}
