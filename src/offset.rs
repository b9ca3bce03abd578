//! Binlog 처리 위치 추적
//!
//! Binlog 파일명 + 바이트 위치로 현재 읽고 있는 지점을 나타낸다.
//! 예: "mysql-bin.000003" 파일의 4097 바이트 위치

use serde::{Deserialize, Serialize};
use std::fmt;

/// MySQL binlog 은 4 바이트 매직 넘버 뒤에서 첫 이벤트가 시작된다
pub const FIRST_EVENT_POSITION: u64 = 4;

/// Binlog 파일 위치 정보
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinlogPosition {
    /// 바이너리 로그 파일명 (e.g., "mysql-bin.000001")
    pub filename: String,
    /// 바이트 위치
    pub position: u64,
}

impl BinlogPosition {
    pub fn new(filename: String, position: u64) -> Self {
        BinlogPosition { filename, position }
    }

    /// 파일 시작 위치 (매직 넘버 앞)
    pub fn start(filename: String) -> Self {
        BinlogPosition::new(filename, 0)
    }

    pub fn advance(&mut self, len: u64) {
        self.position += len;
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.position)
    }
}
