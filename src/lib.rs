//! MySQL Binlog 파일 → JSONL 변경 레코드 변환기
//!
//! 디스크에 있는 MySQL 바이너리 로그 파일을 읽어 row 단위 변경(insert/update/delete)을
//! 한 줄에 하나씩 JSON 레코드로 출력합니다.
//! 주요 기능:
//! - 매직 헤더 검증 및 이벤트 프레이밍
//! - FORMAT_DESCRIPTION / TABLE_MAP / ROWS (v1, v2) 이벤트 디코딩
//! - 컬럼 타입별 값 디코딩 (DECIMAL, 날짜/시간, 바이너리 JSON 포함)
//! - 파일 단위 병렬 처리와 취소

pub mod binlog;
pub mod config;
pub mod decoder;
pub mod discovery;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod events;
pub mod json_binary;
pub mod offset;
pub mod read_ext;
pub mod registry;
pub mod rows;
pub mod runner;
pub mod sink;
pub mod value;

#[cfg(test)]
mod testutil;

pub use config::ParserConfig;
pub use emitter::{OutputRecord, RecordEmitter, UpdateImages};
pub use engine::{parse_file, ParseSession, ParseSummary, SessionOptions};
pub use error::{BinlogError, Result};
pub use events::{EventType, RowsKind};
pub use runner::{run_batch, BatchReport};
pub use sink::{JsonlSink, MemorySink, RecordSink};
pub use value::CellValue;
