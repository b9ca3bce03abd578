//! Binlog 디코딩 에러 타입

use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum BinlogError {
    #[error("유효하지 않은 binlog 형식: {0}")]
    InvalidFormat(String),

    #[error("잘못된 매직 헤더: {observed} (기대값 fe62696e)")]
    BadMagicHeader { observed: String },

    #[error("이벤트가 잘림: 위치 {position}에서 {needed} 바이트 필요, {available} 바이트만 남음")]
    TruncatedEvent {
        position: u64,
        needed: usize,
        available: usize,
    },

    #[error("잘못된 이벤트 (log_pos={log_pos}, type={event_type}): {reason}")]
    MalformedEvent {
        log_pos: u32,
        event_type: String,
        reason: String,
    },

    #[error("컬럼 디코딩 실패: column={column}, type={column_type}, offset={offset}")]
    ColumnDecode {
        column: usize,
        column_type: String,
        offset: usize,
    },

    #[error("체크섬 불일치 (log_pos={log_pos}): expected {expected:08x}, actual {actual:08x}")]
    ChecksumMismatch {
        log_pos: u32,
        expected: u32,
        actual: u32,
    },

    #[error("I/O 에러: {0}")]
    IoError(String),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("파일 탐색 에러: {0}")]
    Discovery(String),

    #[error("설정 에러: {0}")]
    Config(String),

    #[error("작업이 취소되었습니다")]
    Cancelled,
}

impl From<io::Error> for BinlogError {
    fn from(err: io::Error) -> Self {
        BinlogError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BinlogError>;
