//! 디코딩된 row 이벤트를 출력 레코드로 변환

use crate::error::{BinlogError, Result};
use crate::events::{EventHeader, RowChange, RowChangeEvent, RowImage, RowsKind};
use crate::registry::TableDefinition;
use crate::sink::RecordSink;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// UPDATE 이벤트의 before/after 이미지를 레코드로 내보내는 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateImages {
    /// row 쌍마다 레코드 1개: `row` = after, `before` = before
    #[default]
    Paired,
    /// row 쌍마다 레코드 2개: before 레코드 다음 after 레코드
    Split,
}

impl FromStr for UpdateImages {
    type Err = BinlogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paired" => Ok(UpdateImages::Paired),
            "split" => Ok(UpdateImages::Split),
            other => Err(BinlogError::Config(format!(
                "update images must be 'paired' or 'split', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for UpdateImages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateImages::Paired => f.write_str("paired"),
            UpdateImages::Split => f.write_str("split"),
        }
    }
}

/// JSONL 한 줄
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    /// 파싱 실행 날짜 (로컬, YYYY-MM-DD)
    pub process_date: String,
    pub server_id: u32,
    /// 다음 이벤트 위치
    pub log_pos: u32,
    /// 이벤트 타임스탬프 (UTC RFC3339)
    pub event_time: String,
    pub event_type: RowsKind,
    pub schema: String,
    pub table: String,
    pub row: RowImage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<RowImage>,
    pub binlog_file: String,
}

/// 파일 하나에 대한 레코드 생성기
#[derive(Debug, Clone)]
pub struct RecordEmitter {
    binlog_file: String,
    process_date: String,
    update_images: UpdateImages,
}

impl RecordEmitter {
    pub fn new(
        binlog_file: impl Into<String>,
        process_date: impl Into<String>,
        update_images: UpdateImages,
    ) -> Self {
        RecordEmitter {
            binlog_file: binlog_file.into(),
            process_date: process_date.into(),
            update_images,
        }
    }

    /// 실행 시점의 로컬 날짜
    pub fn today() -> String {
        chrono::Local::now().format("%Y-%m-%d").to_string()
    }

    pub fn event_time(timestamp: u32) -> String {
        DateTime::<Utc>::from_timestamp(timestamp as i64, 0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// 디코딩 순서대로 레코드를 하나씩 만든다
    pub fn records<'a>(
        &'a self,
        header: &'a EventHeader,
        table: &'a TableDefinition,
        event: &'a RowChangeEvent,
    ) -> impl Iterator<Item = OutputRecord> + 'a {
        let event_time = Self::event_time(header.timestamp);
        let policy = self.update_images;

        event
            .rows
            .iter()
            .flat_map(move |change| {
                let images: [Option<(&RowImage, Option<&RowImage>)>; 2] = match (change, policy) {
                    (RowChange::Single(image), _) => [Some((image, None)), None],
                    (RowChange::Pair { before, after }, UpdateImages::Paired) => {
                        [Some((after, Some(before))), None]
                    }
                    (RowChange::Pair { before, after }, UpdateImages::Split) => {
                        [Some((before, None)), Some((after, None))]
                    }
                };
                images.into_iter().flatten()
            })
            .map(move |(row, before)| OutputRecord {
                process_date: self.process_date.clone(),
                server_id: header.server_id,
                log_pos: header.next_pos,
                event_time: event_time.clone(),
                event_type: event.kind,
                schema: table.schema.clone(),
                table: table.table.clone(),
                row: row.clone(),
                before: before.cloned(),
                binlog_file: self.binlog_file.clone(),
            })
    }

    /// 레코드를 만드는 즉시 sink 에 넘기고 넘긴 개수를 반환
    pub fn emit(
        &self,
        header: &EventHeader,
        table: &TableDefinition,
        event: &RowChangeEvent,
        sink: &mut dyn RecordSink,
    ) -> Result<usize> {
        let mut count = 0;
        for record in self.records(header, table, event) {
            sink.accept(&record)?;
            count += 1;
        }
        Ok(count)
    }
}
