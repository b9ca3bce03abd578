//! 파일 하나를 처음부터 끝까지 파싱하는 세션
//!
//! 매직 검증 → 이벤트 읽기 → 디코딩 → 레코드 출력 을 이벤트 단위로 순서대로 진행한다.
//! 테이블 레지스트리는 세션이 소유하므로 파일끼리 상태를 공유하지 않는다.

use crate::binlog::{BinlogParser, EventReader};
use crate::decoder::{Decoded, EventDecoder};
use crate::emitter::{RecordEmitter, UpdateImages};
use crate::error::{BinlogError, Result};
use crate::registry::TableRegistry;
use crate::sink::{output_path, JsonlSink, RecordSink};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 세션 동작 옵션
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub verify_checksum: bool,
    pub update_images: UpdateImages,
}

/// 파일 하나의 파싱 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseSummary {
    pub file: String,
    /// 읽은 이벤트 수 (매직 제외)
    pub events: u64,
    /// 출력한 레코드 수
    pub records: u64,
    /// 등록된 테이블 정의 수
    pub tables: usize,
    /// TABLE_MAP 없이 나와 건너뛴 row 이벤트 수
    pub skipped_unknown_table: u64,
    /// 마지막으로 읽은 이벤트 다음 위치
    pub last_position: u64,
    /// FORMAT_DESCRIPTION 의 서버 버전 (없으면 빈 문자열)
    pub server_version: String,
}

pub struct ParseSession {
    decoder: EventDecoder,
    registry: TableRegistry,
    emitter: RecordEmitter,
    summary: ParseSummary,
}

impl ParseSession {
    pub fn new(
        file_name: impl Into<String>,
        process_date: impl Into<String>,
        options: SessionOptions,
    ) -> Self {
        let file_name = file_name.into();
        ParseSession {
            decoder: EventDecoder::new(options.verify_checksum),
            registry: TableRegistry::new(),
            emitter: RecordEmitter::new(file_name.clone(), process_date, options.update_images),
            summary: ParseSummary {
                file: file_name,
                ..Default::default()
            },
        }
    }

    /// 스트림 끝까지 파싱한다. 에러가 나도 이미 sink 에 넘긴 레코드는 유지되고
    /// `finish` 는 항상 호출된다.
    pub fn run<R: Read>(
        mut self,
        reader: R,
        sink: &mut dyn RecordSink,
        cancel: &CancellationToken,
    ) -> Result<ParseSummary> {
        let mut events = EventReader::new(self.summary.file.clone(), reader);
        let result = self.drive(&mut events, sink, cancel);
        let finished = sink.finish();

        result?;
        finished?;
        self.summary.tables = self.registry.len();
        self.summary.server_version = self.decoder.format().server_version.clone();
        Ok(self.summary)
    }

    fn drive<R: Read>(
        &mut self,
        events: &mut EventReader<R>,
        sink: &mut dyn RecordSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(BinlogError::Cancelled);
            }
            let Some(event) = events.next_event()? else {
                return Ok(());
            };

            self.summary.events += 1;
            self.summary.last_position = events.current_position().position;

            match self.decoder.decode(&event, &mut self.registry)? {
                Decoded::Rows(change) => {
                    if let Some(table) = self.registry.get(change.table_id) {
                        let emitted = self.emitter.emit(&event.header, table, &change, sink)?;
                        self.summary.records += emitted as u64;
                    }
                }
                Decoded::UnknownTable { table_id, kind } => {
                    debug!(
                        "Skipping {} rows event for unmapped table id {} (log_pos={})",
                        kind.as_str(),
                        table_id,
                        event.header.next_pos
                    );
                    self.summary.skipped_unknown_table += 1;
                }
                Decoded::FormatDescription | Decoded::TableMap { .. } | Decoded::Ignored(_) => {}
            }
        }
    }
}

/// 디스크의 binlog 파일 하나를 `<out_dir>/<파일명>.jsonl` 로 변환한다.
///
/// 매직 헤더가 틀리면 출력 파일을 만들기 전에 실패한다.
pub fn parse_file(
    path: &Path,
    out_dir: &Path,
    process_date: &str,
    options: SessionOptions,
    cancel: &CancellationToken,
) -> Result<ParseSummary> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| BinlogError::Discovery(format!("no file name in {}", path.display())))?;

    info!("Parsing: {}", path.display());

    let mut file = File::open(path)?;
    BinlogParser::inspect_magic_header(&mut file)?;

    let out_path = output_path(out_dir, &file_name);
    let mut sink = JsonlSink::create(&out_path)?;

    let summary = ParseSession::new(file_name, process_date, options).run(
        BufReader::new(file),
        &mut sink,
        cancel,
    )?;

    info!(
        "Finished {} (server {}): {} events, {} records, {} tables -> {}",
        summary.file,
        summary.server_version,
        summary.events,
        summary.records,
        summary.tables,
        out_path.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RowsKind;
    use crate::sink::MemorySink;
    use crate::testutil::{BinlogBuilder, ColumnDef, RowBuilder, DELETE_ROWS_V2, UPDATE_ROWS_V1};
    use crate::value::CellValue;
    use std::io::Cursor;

    const DATE: &str = "2024-05-01";

    fn scenario_a() -> Vec<u8> {
        BinlogBuilder::new()
            .fde(false)
            .table_map(7, "s", "t", &[ColumnDef::long()])
            .write_rows(7, 1, &[RowBuilder::new().long(42)])
            .xid(1)
            .build()
    }

    fn scenario_d() -> Vec<u8> {
        BinlogBuilder::new()
            .fde(true)
            .table_map(
                12,
                "shop",
                "orders",
                &[ColumnDef::long(), ColumnDef::varchar(32)],
            )
            .update_rows(
                UPDATE_ROWS_V1,
                12,
                2,
                &[
                    (
                        RowBuilder::new().long(1).varchar("new"),
                        RowBuilder::new().long(1).varchar("paid"),
                    ),
                    (
                        RowBuilder::new().long(2).varchar("new"),
                        RowBuilder::new().long(2).null(),
                    ),
                ],
            )
            .build()
    }

    fn run(data: &[u8], options: SessionOptions) -> (Result<ParseSummary>, MemorySink) {
        let mut sink = MemorySink::default();
        let result = ParseSession::new("mysql-bin.000001", DATE, options).run(
            Cursor::new(data),
            &mut sink,
            &CancellationToken::new(),
        );
        (result, sink)
    }

    #[test]
    fn test_single_insert() {
        let (result, sink) = run(&scenario_a(), SessionOptions::default());
        let summary = result.unwrap();

        assert_eq!(summary.events, 4);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.tables, 1);
        assert_eq!(summary.last_position, scenario_a().len() as u64);
        assert_eq!(summary.server_version, "8.0.35");

        let record = &sink.records[0];
        assert_eq!(record.event_type, RowsKind::Insert);
        assert_eq!(record.schema, "s");
        assert_eq!(record.table, "t");
        assert_eq!(record.row, vec![CellValue::Int(42)]);
        assert_eq!(record.binlog_file, "mysql-bin.000001");
        assert_eq!(record.process_date, DATE);
        assert_eq!(record.server_id, 1);
        assert_eq!(record.event_time, "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_every_column_type_round_trips() {
        let datetime2: u64 =
            ((((2024u64 * 13 + 3) << 5) | 9) << 17 | (7 << 12 | 5 << 6 | 1)) + 0x80_0000_0000;
        let time2 = ((10u64 << 12 | 20 << 6 | 30) + 0x80_0000).to_be_bytes();
        let date: u32 = (2020 << 9) | (2 << 5) | 29;
        let mut timestamp2 = 1_700_000_000u32.to_be_bytes().to_vec();
        timestamp2.extend_from_slice(&1234u16.to_be_bytes());

        let columns = [
            ColumnDef::tiny(),
            ColumnDef::short(),
            ColumnDef::int24(),
            ColumnDef::long(),
            ColumnDef::longlong(),
            ColumnDef::float(),
            ColumnDef::double(),
            ColumnDef::new_decimal(10, 2),
            ColumnDef::bit(10),
            ColumnDef::year(),
            ColumnDef::date(),
            ColumnDef::time(),
            ColumnDef::datetime(),
            ColumnDef::timestamp(),
            ColumnDef::timestamp2(3),
            ColumnDef::datetime2(0),
            ColumnDef::time2(0),
            ColumnDef::varchar(40),
            ColumnDef::string(20),
            ColumnDef::enumeration(1),
            ColumnDef::set(1),
            ColumnDef::blob(2),
            ColumnDef::json(),
            ColumnDef::long(),
        ];
        let row = RowBuilder::new()
            .tiny(-5)
            .raw(&(-300i16).to_le_bytes())
            .raw(&123_456i32.to_le_bytes()[..3])
            .long(-70_000)
            .longlong(1 << 40)
            .raw(&1.5f32.to_le_bytes())
            .double(2.25)
            .raw(&[0x80, 0x00, 0x04, 0xd2, 0x38])
            .raw(&[0x02, 0x01])
            .raw(&[124])
            .raw(&date.to_le_bytes()[..3])
            .raw(&123_456i32.to_le_bytes()[..3])
            .raw(&20_240_309_070_501u64.to_le_bytes())
            .raw(&1_700_000_000u32.to_le_bytes())
            .raw(&timestamp2)
            .raw(&datetime2.to_be_bytes()[3..])
            .raw(&time2[5..])
            .varchar("hello")
            .varchar("ab")
            .raw(&[2])
            .raw(&[0b101])
            .raw(&[3, 0, 1, 2, 3])
            .blob4(&[0x04, 0x01])
            .null();

        let data = BinlogBuilder::new()
            .timestamp(1_600_000_000)
            .server_id(42)
            .fde(true)
            .table_map(20, "s", "all_types", &columns)
            .write_rows(20, columns.len(), std::slice::from_ref(&row))
            .delete_rows(20, columns.len(), &[row])
            .build();

        let (result, sink) = run(&data, SessionOptions::default());
        assert_eq!(result.unwrap().records, 2);

        let expected = serde_json::json!([
            -5,
            -300,
            123456,
            -70000,
            1099511627776i64,
            1.5,
            2.25,
            "1234.56",
            0x201,
            2024,
            "2020-02-29",
            "12:34:56",
            "2024-03-09 07:05:01",
            "2023-11-14 22:13:20",
            "2023-11-14 22:13:20.123",
            "2024-03-09 07:05:01",
            "10:20:30",
            "hello",
            "ab",
            2,
            5,
            "AQID",
            true,
            null
        ]);
        for (record, kind) in sink.records.iter().zip([RowsKind::Insert, RowsKind::Delete]) {
            assert_eq!(record.event_type, kind);
            assert_eq!(record.table, "all_types");
            assert_eq!(record.server_id, 42);
            assert_eq!(record.event_time, "2020-09-13T12:26:40Z");
            assert_eq!(serde_json::to_value(&record.row).unwrap(), expected);
        }
        assert_eq!(sink.records[0].row[23], CellValue::Null);
    }

    #[test]
    fn test_rows_follow_latest_table_map() {
        let data = BinlogBuilder::new()
            .fde(false)
            .table_map(7, "s", "t", &[ColumnDef::long()])
            .rows(DELETE_ROWS_V2, 9, 1, &[RowBuilder::new().long(0).encode()])
            .write_rows(7, 1, &[RowBuilder::new().long(1)])
            .table_map(7, "s", "t2", &[ColumnDef::long(), ColumnDef::varchar(16)])
            .write_rows(7, 2, &[RowBuilder::new().long(2).varchar("x")])
            .build();

        let (result, sink) = run(&data, SessionOptions::default());
        let summary = result.unwrap();
        assert_eq!(summary.skipped_unknown_table, 1);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.tables, 1);

        assert_eq!(sink.records[0].table, "t");
        assert_eq!(sink.records[0].row, vec![CellValue::Int(1)]);
        assert_eq!(sink.records[1].table, "t2");
        assert_eq!(
            sink.records[1].row,
            vec![CellValue::Int(2), CellValue::String("x".into())]
        );
    }

    #[test]
    fn test_bad_magic_emits_nothing() {
        let mut data = scenario_a();
        data[..4].copy_from_slice(&[0, 0, 0, 0]);

        let (result, sink) = run(&data, SessionOptions::default());
        match result {
            Err(BinlogError::BadMagicHeader { observed }) => assert_eq!(observed, "00000000"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(sink.records.is_empty());
    }

    #[test]
    fn test_rows_without_table_map_are_skipped() {
        let data = BinlogBuilder::new()
            .rows(DELETE_ROWS_V2, 9, 1, &[RowBuilder::new().long(3).encode()])
            .build();

        let (result, sink) = run(&data, SessionOptions::default());
        let summary = result.unwrap();
        assert!(sink.records.is_empty());
        assert_eq!(summary.skipped_unknown_table, 1);
    }

    #[test]
    fn test_update_pairs_paired_policy() {
        let options = SessionOptions {
            verify_checksum: true,
            update_images: UpdateImages::Paired,
        };
        let (result, sink) = run(&scenario_d(), options);
        assert_eq!(result.unwrap().records, 2);

        let first = &sink.records[0];
        assert_eq!(first.event_type, RowsKind::Update);
        assert_eq!(
            first.before,
            Some(vec![CellValue::Int(1), CellValue::String("new".into())])
        );
        assert_eq!(
            first.row,
            vec![CellValue::Int(1), CellValue::String("paid".into())]
        );
        assert_eq!(sink.records[1].row, vec![CellValue::Int(2), CellValue::Null]);
    }

    #[test]
    fn test_update_pairs_split_policy() {
        let options = SessionOptions {
            verify_checksum: false,
            update_images: UpdateImages::Split,
        };
        let (result, sink) = run(&scenario_d(), options);
        assert_eq!(result.unwrap().records, 4);

        let rows: Vec<_> = sink.records.iter().map(|r| r.row[1].clone()).collect();
        assert_eq!(
            rows,
            vec![
                CellValue::String("new".into()),
                CellValue::String("paid".into()),
                CellValue::String("new".into()),
                CellValue::Null,
            ]
        );
    }

    #[test]
    fn test_same_input_same_output() {
        let render = |data: &[u8]| {
            let mut sink = JsonlSink::new(Vec::new());
            ParseSession::new("mysql-bin.000001", DATE, SessionOptions::default())
                .run(Cursor::new(data), &mut sink, &CancellationToken::new())
                .unwrap();
            sink.into_inner().unwrap()
        };
        let data = scenario_d();
        assert_eq!(render(&data), render(&data));
    }

    #[test]
    fn test_truncation_keeps_earlier_records() {
        let mut data = scenario_a();
        let full = BinlogBuilder::new()
            .fde(false)
            .table_map(7, "s", "t", &[ColumnDef::long()])
            .write_rows(7, 1, &[RowBuilder::new().long(42)])
            .xid(1)
            .write_rows(7, 1, &[RowBuilder::new().long(43)])
            .build();
        data.extend_from_slice(&full[data.len()..full.len() - 2]);

        let (result, sink) = run(&data, SessionOptions::default());
        assert!(matches!(result, Err(BinlogError::TruncatedEvent { .. })));
        assert_eq!(sink.records.len(), 1);
        assert_eq!(sink.records[0].row, vec![CellValue::Int(42)]);
    }

    #[test]
    fn test_cancelled_before_first_event() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = MemorySink::default();
        let result = ParseSession::new("f", DATE, SessionOptions::default()).run(
            Cursor::new(scenario_a()),
            &mut sink,
            &cancel,
        );
        assert!(matches!(result, Err(BinlogError::Cancelled)));
        assert!(sink.records.is_empty());
    }

    #[test]
    fn test_parse_file_writes_jsonl() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let path = input.path().join("mysql-bin.000003");
        std::fs::write(&path, scenario_d()).unwrap();

        let summary = parse_file(
            &path,
            out.path(),
            DATE,
            SessionOptions::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(summary.file, "mysql-bin.000003");
        assert_eq!(summary.records, 2);

        let text = std::fs::read_to_string(out.path().join("mysql-bin.000003.jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event_type"], "update");
        assert_eq!(lines[0]["before"], serde_json::json!([1, "new"]));
        assert_eq!(lines[1]["row"], serde_json::json!([2, null]));
    }

    #[test]
    fn test_parse_file_bad_magic_creates_no_output() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let path = input.path().join("mysql-bin.000004");
        std::fs::write(&path, [0u8; 64]).unwrap();

        let result = parse_file(
            &path,
            out.path(),
            DATE,
            SessionOptions::default(),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(BinlogError::BadMagicHeader { .. })));
        assert!(!out.path().join("mysql-bin.000004.jsonl").exists());
    }

    #[test]
    fn test_parse_file_truncated_flushes_partial_output() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let path = input.path().join("mysql-bin.000005");
        let mut data = scenario_a();
        data.extend_from_slice(&[0x01, 0x02, 0x03]);
        std::fs::write(&path, data).unwrap();

        let result = parse_file(
            &path,
            out.path(),
            DATE,
            SessionOptions::default(),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(BinlogError::TruncatedEvent { .. })));
        let text = std::fs::read_to_string(out.path().join("mysql-bin.000005.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
