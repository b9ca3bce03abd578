//! 이벤트 본문 디코더
//!
//! `EventReader` 가 잘라낸 `RawEvent` 를 해석한다.
//! - FORMAT_DESCRIPTION: 체크섬 알고리즘과 post-header 길이를 기억
//! - TABLE_MAP: 테이블 정의를 레지스트리에 등록
//! - WRITE/UPDATE/DELETE_ROWS (v1, v2): row image 디코딩
//!
//! 그 외 이벤트는 `Decoded::Ignored` 로 넘긴다.

use crate::binlog::EVENT_HEADER_SIZE;
use crate::error::{BinlogError, Result};
use crate::events::{ColumnType, EventHeader, EventType, RawEvent, RowChangeEvent, RowsKind};
use crate::read_ext::{bitmap_len, CursorExt};
use crate::registry::{TableDefinition, TableRegistry};
use crate::rows;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::{debug, trace};

const SERVER_VERSION_LEN: usize = 50;
const CHECKSUM_LEN: usize = 4;
/// FDE 헤더 flags 의 "binlog 사용 중" 비트. 체크섬은 이 비트가 꺼진 상태로 계산된다.
const LOG_EVENT_BINLOG_IN_USE_F: u16 = 0x1;
/// TABLE_MAP optional metadata 타입
const OPTIONAL_META_SIGNEDNESS: u8 = 1;

/// 이벤트 체크섬 알고리즘
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlg {
    #[default]
    Off,
    Crc32,
}

impl ChecksumAlg {
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => ChecksumAlg::Crc32,
            _ => ChecksumAlg::Off,
        }
    }
}

/// FORMAT_DESCRIPTION 이벤트 내용
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescription {
    pub binlog_version: u16,
    pub server_version: String,
    pub create_timestamp: u32,
    pub header_length: u8,
    /// 이벤트 타입 코드 - 1 을 인덱스로 하는 post-header 길이
    pub post_header_lengths: Vec<u8>,
    pub checksum: ChecksumAlg,
}

impl Default for FormatDescription {
    fn default() -> Self {
        FormatDescription {
            binlog_version: 4,
            server_version: String::new(),
            create_timestamp: 0,
            header_length: EVENT_HEADER_SIZE as u8,
            post_header_lengths: Vec::new(),
            checksum: ChecksumAlg::Off,
        }
    }
}

impl FormatDescription {
    pub fn post_header_len(&self, event_type: EventType) -> Option<u8> {
        let code = event_type.code() as usize;
        if code == 0 {
            return None;
        }
        self.post_header_lengths.get(code - 1).copied()
    }

    /// post-header 가 6 바이트면 구버전 4바이트 table id
    pub fn table_id_len(&self, event_type: EventType) -> usize {
        match self.post_header_len(event_type) {
            Some(6) => 4,
            _ => 6,
        }
    }

    /// MySQL 5.6.1+ / MariaDB 5.3+ 는 FDE 끝에 체크섬 알고리즘 바이트를 둔다
    pub fn version_has_checksum(server_version: &str) -> bool {
        let numeric = server_version.split('-').next().unwrap_or("");
        let mut parts = numeric.split('.').map(|part| {
            part.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse::<u32>()
                .unwrap_or(0)
        });
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);
        let version = (major, minor, patch);

        if server_version.contains("MariaDB") {
            version >= (5, 3, 0)
        } else {
            version >= (5, 6, 1)
        }
    }
}

/// 디코딩 결과
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    FormatDescription,
    TableMap { table_id: u64 },
    Rows(RowChangeEvent),
    /// TABLE_MAP 없이 나온 row 이벤트 (건너뜀)
    UnknownTable { table_id: u64, kind: RowsKind },
    Ignored(EventType),
}

/// 파일 하나를 읽는 동안 유지되는 디코더 상태
#[derive(Debug, Default)]
pub struct EventDecoder {
    format: FormatDescription,
    verify_checksum: bool,
}

impl EventDecoder {
    pub fn new(verify_checksum: bool) -> Self {
        EventDecoder {
            format: FormatDescription::default(),
            verify_checksum,
        }
    }

    pub fn format(&self) -> &FormatDescription {
        &self.format
    }

    pub fn decode(&mut self, event: &RawEvent, registry: &mut TableRegistry) -> Result<Decoded> {
        let header = &event.header;
        trace!(
            "Decoding {} at offset {} ({} bytes)",
            header.event_type,
            event.offset,
            header.event_length
        );

        if header.event_type == EventType::FormatDescription {
            let format =
                decode_format_description(&event.body).map_err(|e| malformed(header, e))?;
            if format.checksum == ChecksumAlg::Crc32 && self.verify_checksum {
                verify_crc32(event)?;
            }
            debug!(
                "Format description: server {} binlog v{}, checksum {:?}",
                format.server_version, format.binlog_version, format.checksum
            );
            self.format = format;
            return Ok(Decoded::FormatDescription);
        }

        let payload = self.payload(event)?;

        match header.event_type {
            EventType::TableMap => {
                let definition = self
                    .decode_table_map(payload)
                    .map_err(|e| malformed(header, e))?;
                let table_id = definition.table_id;
                registry.upsert(definition);
                Ok(Decoded::TableMap { table_id })
            }
            other => match other.rows_kind() {
                Some(kind) => self
                    .decode_rows(header, kind, payload, registry)
                    .map_err(|e| malformed(header, e)),
                None => Ok(Decoded::Ignored(other)),
            },
        }
    }

    /// 체크섬 trailer 를 떼어낸 본문
    fn payload<'a>(&self, event: &'a RawEvent) -> Result<&'a [u8]> {
        if self.format.checksum != ChecksumAlg::Crc32 {
            return Ok(&event.body[..]);
        }
        if event.body.len() < CHECKSUM_LEN {
            return Err(malformed(
                &event.header,
                BinlogError::InvalidFormat(format!(
                    "body of {} bytes cannot hold a checksum",
                    event.body.len()
                )),
            ));
        }
        if self.verify_checksum {
            verify_crc32(event)?;
        }
        Ok(&event.body[..event.body.len() - CHECKSUM_LEN])
    }

    fn decode_table_map(&self, payload: &[u8]) -> Result<TableDefinition> {
        let mut cursor = Cursor::new(payload);

        let table_id = cursor.read_uint_le(self.format.table_id_len(EventType::TableMap))?;
        let _flags = cursor.read_u16::<LittleEndian>()?;
        let schema = cursor.read_u8_prefixed_string()?;
        cursor.skip(1)?;
        let table = cursor.read_u8_prefixed_string()?;
        cursor.skip(1)?;

        let column_count = cursor.read_lenenc_int()? as usize;
        if column_count > cursor.remaining() {
            return Err(BinlogError::InvalidFormat(format!(
                "column count {} exceeds event body",
                column_count
            )));
        }
        let column_types: Vec<ColumnType> = cursor
            .read_bytes(column_count)?
            .into_iter()
            .map(ColumnType::from_u8)
            .collect();

        let metadata_len = cursor.read_lenenc_int()? as usize;
        let metadata = cursor.read_bytes(metadata_len)?;
        let column_meta = decode_column_meta(&column_types, &metadata)?;

        let null_bitmap = cursor.read_bytes(bitmap_len(column_count))?;
        let unsigned = decode_optional_metadata(&mut cursor, &column_types)?;

        Ok(TableDefinition {
            table_id,
            schema,
            table,
            column_types,
            column_meta,
            null_bitmap,
            unsigned,
        })
    }

    fn decode_rows(
        &self,
        header: &EventHeader,
        kind: RowsKind,
        payload: &[u8],
        registry: &TableRegistry,
    ) -> Result<Decoded> {
        let mut cursor = Cursor::new(payload);

        let table_id = cursor.read_uint_le(self.format.table_id_len(header.event_type))?;
        let _flags = cursor.read_u16::<LittleEndian>()?;
        if header.event_type.is_rows_v2() {
            let extra_len = cursor.read_u16::<LittleEndian>()? as usize;
            if extra_len < 2 {
                return Err(BinlogError::InvalidFormat(format!(
                    "extra data length {} is smaller than its own field",
                    extra_len
                )));
            }
            cursor.skip(extra_len - 2)?;
        }
        let column_count = cursor.read_lenenc_int()? as usize;

        let Some(table) = registry.get(table_id) else {
            return Ok(Decoded::UnknownTable { table_id, kind });
        };
        if column_count != table.column_count() {
            return Err(BinlogError::InvalidFormat(format!(
                "row event has {} columns but table map {}.{} declares {}",
                column_count,
                table.schema,
                table.table,
                table.column_count()
            )));
        }

        let present = cursor.read_bytes(bitmap_len(column_count))?;
        let present_after = match kind {
            RowsKind::Update => Some(cursor.read_bytes(bitmap_len(column_count))?),
            _ => None,
        };

        let rows = rows::decode_rows(
            &mut cursor,
            table,
            kind,
            &present,
            present_after.as_deref(),
        )?;

        Ok(Decoded::Rows(RowChangeEvent {
            kind,
            table_id,
            rows,
        }))
    }
}

fn decode_format_description(body: &[u8]) -> Result<FormatDescription> {
    let mut cursor = Cursor::new(body);

    let binlog_version = cursor.read_u16::<LittleEndian>()?;
    let raw_version = cursor.read_bytes(SERVER_VERSION_LEN)?;
    let server_version = String::from_utf8_lossy(&raw_version)
        .trim_end_matches('\0')
        .to_string();
    let create_timestamp = cursor.read_u32::<LittleEndian>()?;
    let header_length = cursor.read_u8()?;
    if header_length as usize != EVENT_HEADER_SIZE {
        return Err(BinlogError::InvalidFormat(format!(
            "unsupported event header length {}",
            header_length
        )));
    }

    let rest = &body[cursor.offset()..];
    let (post_header_lengths, checksum) = if FormatDescription::version_has_checksum(
        &server_version,
    ) && rest.len() > CHECKSUM_LEN
    {
        let alg_pos = rest.len() - CHECKSUM_LEN - 1;
        (rest[..alg_pos].to_vec(), ChecksumAlg::from_u8(rest[alg_pos]))
    } else {
        (rest.to_vec(), ChecksumAlg::Off)
    };

    Ok(FormatDescription {
        binlog_version,
        server_version,
        create_timestamp,
        header_length,
        post_header_lengths,
        checksum,
    })
}

/// 컬럼 타입별 메타데이터. 블록을 정확히 다 써야 한다.
fn decode_column_meta(column_types: &[ColumnType], metadata: &[u8]) -> Result<Vec<u16>> {
    let mut cursor = Cursor::new(metadata);
    let too_short = |_| {
        BinlogError::InvalidFormat(format!(
            "column metadata of {} bytes is too short for {} columns",
            metadata.len(),
            column_types.len()
        ))
    };

    let mut column_meta = Vec::with_capacity(column_types.len());
    for column_type in column_types {
        let meta = match column_type.metadata_len() {
            0 => 0,
            1 => cursor.read_u8().map_err(too_short)? as u16,
            _ => match column_type {
                ColumnType::Varchar | ColumnType::VarString | ColumnType::Bit => {
                    cursor.read_u16::<LittleEndian>().map_err(too_short)?
                }
                // STRING/ENUM/SET/NEWDECIMAL: (byte0 << 8) | byte1
                _ => cursor.read_u16::<BigEndian>().map_err(too_short)?,
            },
        };
        column_meta.push(meta);
    }

    if cursor.remaining() != 0 {
        return Err(BinlogError::InvalidFormat(format!(
            "column metadata has {} unused bytes",
            cursor.remaining()
        )));
    }
    Ok(column_meta)
}

/// MySQL 8.0 optional metadata (TLV). SIGNEDNESS 만 해석한다.
fn decode_optional_metadata(
    cursor: &mut Cursor<&[u8]>,
    column_types: &[ColumnType],
) -> Result<Vec<bool>> {
    let mut unsigned = vec![false; column_types.len()];

    while cursor.remaining() > 0 {
        let field_type = cursor.read_u8()?;
        let len = cursor.read_lenenc_int()? as usize;
        let value = cursor.read_bytes(len)?;

        if field_type != OPTIONAL_META_SIGNEDNESS {
            continue;
        }
        // 숫자 컬럼마다 1비트, MSB 부터
        let numeric = column_types
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_numeric());
        for (bit, (column, _)) in numeric.enumerate() {
            let byte = value.get(bit / 8).copied().unwrap_or(0);
            unsigned[column] = byte & (0x80 >> (bit % 8)) != 0;
        }
    }

    Ok(unsigned)
}

/// 헤더(+FDE 라면 in-use 플래그 제거) 와 trailer 앞 본문으로 CRC32 를 다시 계산한다
fn verify_crc32(event: &RawEvent) -> Result<()> {
    let body = &event.body;
    if body.len() < CHECKSUM_LEN {
        return Err(malformed(
            &event.header,
            BinlogError::InvalidFormat("missing checksum trailer".to_string()),
        ));
    }
    let (data, trailer) = body.split_at(body.len() - CHECKSUM_LEN);
    let expected = LittleEndian::read_u32(trailer);

    let mut header = event.header_bytes;
    if event.header.event_type == EventType::FormatDescription {
        let flags = LittleEndian::read_u16(&header[17..19]) & !LOG_EVENT_BINLOG_IN_USE_F;
        LittleEndian::write_u16(&mut header[17..19], flags);
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header);
    hasher.update(data);
    let actual = hasher.finalize();

    if actual != expected {
        return Err(BinlogError::ChecksumMismatch {
            log_pos: event.header.next_pos,
            expected,
            actual,
        });
    }
    Ok(())
}

fn malformed(header: &EventHeader, err: BinlogError) -> BinlogError {
    let reason = match err {
        BinlogError::MalformedEvent { .. }
        | BinlogError::ChecksumMismatch { .. }
        | BinlogError::Cancelled => return err,
        BinlogError::InvalidFormat(reason) | BinlogError::IoError(reason) => reason,
        other => other.to_string(),
    };
    BinlogError::MalformedEvent {
        log_pos: header.next_pos,
        event_type: header.event_type.to_string(),
        reason,
    }
}
