//! 여러 binlog 파일 일괄 처리
//!
//! 파일마다 독립된 세션(레지스트리, 출력 파일)을 blocking 워커에서 돌린다.
//! 동시 실행 수는 세마포어로 제한하고, 한 파일의 실패는 기록만 하고 나머지는 계속 진행한다.

use crate::config::ParserConfig;
use crate::discovery::discover_binlogs;
use crate::emitter::RecordEmitter;
use crate::engine::{parse_file, ParseSummary};
use crate::error::{BinlogError, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 실패한 파일과 원인
#[derive(Debug)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: BinlogError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<ParseSummary>,
    pub failed: Vec<FailedFile>,
}

impl BatchReport {
    pub fn total_records(&self) -> u64 {
        self.succeeded.iter().map(|s| s.records).sum()
    }

    /// 실패한 파일이 하나라도 있으면 1
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() {
            0
        } else {
            1
        }
    }

    fn fail(&mut self, path: PathBuf, error: BinlogError) {
        warn!("Failed to parse {}: {}", path.display(), error);
        self.failed.push(FailedFile { path, error });
    }
}

pub async fn run_batch(config: &ParserConfig, cancel: CancellationToken) -> Result<BatchReport> {
    config.validate()?;

    let files = discover_binlogs(&config.root, &config.file_pattern)?;
    tokio::fs::create_dir_all(&config.out_dir).await?;
    info!(
        "Found {} binlog files under {} (workers={})",
        files.len(),
        config.root.display(),
        config.workers
    );

    let process_date = RecordEmitter::today();
    let options = config.session_options();
    let semaphore = Arc::new(Semaphore::new(config.workers));
    let mut claimed = HashSet::new();
    let mut report = BatchReport::default();
    let mut workers = Vec::with_capacity(files.len());

    for path in files {
        // 출력 파일 이름이 겹치면 뒤에 나온 파일을 실패 처리
        let base_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !claimed.insert(base_name.clone()) {
            let error = BinlogError::Discovery(format!(
                "another file named {} is already written to the output directory",
                base_name
            ));
            report.fail(path, error);
            continue;
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report.fail(path, BinlogError::Cancelled);
                continue;
            }
            permit = semaphore.clone().acquire_owned() => {
                permit.map_err(|e| BinlogError::IoError(e.to_string()))?
            }
        };

        let out_dir = config.out_dir.clone();
        let process_date = process_date.clone();
        let cancel = cancel.clone();
        let task_path = path.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            parse_file(&task_path, &out_dir, &process_date, options, &cancel)
        });
        workers.push((path, handle));
    }

    for (path, handle) in workers {
        let result = handle
            .await
            .unwrap_or_else(|e| Err(BinlogError::IoError(format!("worker failed: {}", e))));
        match result {
            Ok(summary) => report.succeeded.push(summary),
            Err(error) => report.fail(path, error),
        }
    }

    info!(
        "Batch finished: {} files parsed, {} failed, {} records",
        report.succeeded.len(),
        report.failed.len(),
        report.total_records()
    );
    Ok(report)
}
