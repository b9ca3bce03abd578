//! MySQL binlog 파일을 JSONL 변경 레코드로 변환하는 CLI
//!
//! 루트 디렉터리 아래의 `mysql-bin.*` 파일을 찾아 파일마다 `<out>/<파일명>.jsonl` 을 만든다.
//! 실패한 파일이 하나라도 있으면 종료 코드 1, 설정/탐색 에러는 2.

use clap::Parser;
use mysql_binlog_jsonl::config::ParserConfig;
use mysql_binlog_jsonl::emitter::UpdateImages;
use mysql_binlog_jsonl::error::Result;
use mysql_binlog_jsonl::runner::run_batch;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "binlog2jsonl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// binlog 파일 또는 디렉터리 (기본값: BINLOG_ROOT 또는 ./binlogs)
    #[arg(long)]
    root: Option<PathBuf>,

    /// 출력 디렉터리 (기본값: BINLOG_OUT 또는 ./output)
    #[arg(long)]
    out: Option<PathBuf>,

    /// 파일 이름 패턴 (기본값: BINLOG_PATTERN 또는 mysql-bin.*)
    #[arg(long)]
    pattern: Option<String>,

    /// 동시에 파싱할 파일 수
    #[arg(long)]
    workers: Option<usize>,

    /// CRC32 체크섬 검증
    #[arg(long)]
    verify_checksum: bool,

    /// UPDATE 출력 방식 (paired, split)
    #[arg(long)]
    update_images: Option<UpdateImages>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let config = match build_config(cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping at the next event boundary");
            interrupt.cancel();
        }
    });

    info!(
        "Parsing binlogs under {} into {}",
        config.root.display(),
        config.out_dir.display()
    );

    match run_batch(&config, cancel).await {
        Ok(report) => std::process::exit(report.exit_code()),
        Err(e) => {
            error!("Batch failed: {}", e);
            std::process::exit(2);
        }
    }
}

/// 환경 변수 설정 위에 CLI 플래그를 덮어쓴다
fn build_config(cli: Cli) -> Result<ParserConfig> {
    let mut config = ParserConfig::from_env()?;

    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(out) = cli.out {
        config.out_dir = out;
    }
    if let Some(pattern) = cli.pattern {
        config.file_pattern = pattern;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if cli.verify_checksum {
        config.verify_checksum = true;
    }
    if let Some(update_images) = cli.update_images {
        config.update_images = update_images;
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(level: &str) {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
