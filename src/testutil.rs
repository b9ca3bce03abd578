//! 테스트용 binlog 바이트 생성기

use crate::binlog::{BINLOG_MAGIC, EVENT_HEADER_SIZE};
use byteorder::{LittleEndian, WriteBytesExt};

const FDE: u8 = 15;
const XID: u8 = 16;
const TABLE_MAP: u8 = 19;

pub const WRITE_ROWS_V1: u8 = 23;
pub const UPDATE_ROWS_V1: u8 = 24;
pub const DELETE_ROWS_V1: u8 = 25;
pub const WRITE_ROWS_V2: u8 = 30;
pub const UPDATE_ROWS_V2: u8 = 31;
pub const DELETE_ROWS_V2: u8 = 32;

/// TABLE_MAP 에 들어갈 컬럼 타입 코드 + 메타데이터
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub code: u8,
    pub meta: Vec<u8>,
}

impl ColumnDef {
    fn new(code: u8, meta: &[u8]) -> Self {
        ColumnDef {
            code,
            meta: meta.to_vec(),
        }
    }

    pub fn tiny() -> Self {
        Self::new(1, &[])
    }
    pub fn short() -> Self {
        Self::new(2, &[])
    }
    pub fn long() -> Self {
        Self::new(3, &[])
    }
    pub fn float() -> Self {
        Self::new(4, &[4])
    }
    pub fn double() -> Self {
        Self::new(5, &[8])
    }
    pub fn timestamp() -> Self {
        Self::new(7, &[])
    }
    pub fn longlong() -> Self {
        Self::new(8, &[])
    }
    pub fn int24() -> Self {
        Self::new(9, &[])
    }
    pub fn date() -> Self {
        Self::new(10, &[])
    }
    pub fn time() -> Self {
        Self::new(11, &[])
    }
    pub fn datetime() -> Self {
        Self::new(12, &[])
    }
    pub fn year() -> Self {
        Self::new(13, &[])
    }
    pub fn varchar(max_len: u16) -> Self {
        Self::new(15, &max_len.to_le_bytes())
    }
    pub fn bit(bits: u16) -> Self {
        Self::new(16, &[(bits % 8) as u8, (bits / 8) as u8])
    }
    pub fn timestamp2(fsp: u8) -> Self {
        Self::new(17, &[fsp])
    }
    pub fn datetime2(fsp: u8) -> Self {
        Self::new(18, &[fsp])
    }
    pub fn time2(fsp: u8) -> Self {
        Self::new(19, &[fsp])
    }
    pub fn json() -> Self {
        Self::new(245, &[4])
    }
    pub fn new_decimal(precision: u8, scale: u8) -> Self {
        Self::new(246, &[precision, scale])
    }
    pub fn blob(length_bytes: u8) -> Self {
        Self::new(252, &[length_bytes])
    }
    pub fn string(max_len: u8) -> Self {
        Self::new(254, &[254, max_len])
    }
    pub fn enumeration(pack_len: u8) -> Self {
        Self::new(254, &[247, pack_len])
    }
    pub fn set(pack_len: u8) -> Self {
        Self::new(254, &[248, pack_len])
    }
}

/// row image 한 개 (null 비트맵 + 값 바이트)
#[derive(Debug, Clone, Default)]
pub struct RowBuilder {
    nulls: Vec<bool>,
    data: Vec<u8>,
}

impl RowBuilder {
    pub fn new() -> Self {
        RowBuilder::default()
    }

    pub fn null(mut self) -> Self {
        self.nulls.push(true);
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.nulls.push(false);
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn tiny(self, v: i8) -> Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn long(self, v: i32) -> Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn longlong(self, v: i64) -> Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn double(self, v: f64) -> Self {
        self.raw(&v.to_le_bytes())
    }

    /// 1바이트 길이 접두사 문자열 (max_len < 256 인 VARCHAR/CHAR)
    pub fn varchar(self, s: &str) -> Self {
        let mut bytes = vec![s.len() as u8];
        bytes.extend_from_slice(s.as_bytes());
        self.raw(&bytes)
    }

    /// 4바이트 길이 접두사 BLOB/JSON
    pub fn blob4(self, payload: &[u8]) -> Self {
        let mut bytes = (payload.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(payload);
        self.raw(&bytes)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bitmap = vec![0u8; self.nulls.len().div_ceil(8)];
        for (i, is_null) in self.nulls.iter().enumerate() {
            if *is_null {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        bitmap.extend_from_slice(&self.data);
        bitmap
    }
}

/// 합성 binlog 파일 생성기
pub struct BinlogBuilder {
    data: Vec<u8>,
    checksum: bool,
    timestamp: u32,
    server_id: u32,
}

impl Default for BinlogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BinlogBuilder {
    pub fn new() -> Self {
        BinlogBuilder {
            data: BINLOG_MAGIC.to_vec(),
            checksum: false,
            timestamp: 1_700_000_000,
            server_id: 1,
        }
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn server_id(mut self, server_id: u32) -> Self {
        self.server_id = server_id;
        self
    }

    /// MySQL 8.0 FDE. `checksum` 이 true 면 이후 이벤트에 CRC32 trailer 가 붙는다.
    pub fn fde(self, checksum: bool) -> Self {
        self.fde_with_version("8.0.35", checksum)
    }

    pub fn fde_with_version(mut self, version: &str, checksum: bool) -> Self {
        let mut body = Vec::new();
        body.write_u16::<LittleEndian>(4).unwrap();
        let mut server_version = [0u8; 50];
        server_version[..version.len()].copy_from_slice(version.as_bytes());
        body.extend_from_slice(&server_version);
        body.write_u32::<LittleEndian>(self.timestamp).unwrap();
        body.push(EVENT_HEADER_SIZE as u8);

        let mut post_header_lengths = vec![0u8; 40];
        post_header_lengths[(TABLE_MAP - 1) as usize] = 8;
        for code in [WRITE_ROWS_V1, UPDATE_ROWS_V1, DELETE_ROWS_V1] {
            post_header_lengths[(code - 1) as usize] = 8;
        }
        for code in [WRITE_ROWS_V2, UPDATE_ROWS_V2, DELETE_ROWS_V2] {
            post_header_lengths[(code - 1) as usize] = 10;
        }
        body.extend_from_slice(&post_header_lengths);

        let legacy = version.starts_with("5.5") || version.starts_with("5.1");
        if !legacy {
            body.push(u8::from(checksum));
        }

        // FDE 자신은 서버 버전이 지원하면 항상 4바이트 체크섬 자리를 가진다
        self.checksum = !legacy;
        self = self.event(FDE, body);
        self.checksum = checksum && !legacy;
        self
    }

    pub fn table_map(self, table_id: u64, schema: &str, table: &str, columns: &[ColumnDef]) -> Self {
        self.table_map_with_optional(table_id, schema, table, columns, &[])
    }

    pub fn table_map_with_optional(
        self,
        table_id: u64,
        schema: &str,
        table: &str,
        columns: &[ColumnDef],
        optional_metadata: &[u8],
    ) -> Self {
        let mut body = Vec::new();
        body.write_uint::<LittleEndian>(table_id, 6).unwrap();
        body.write_u16::<LittleEndian>(1).unwrap();
        body.push(schema.len() as u8);
        body.extend_from_slice(schema.as_bytes());
        body.push(0);
        body.push(table.len() as u8);
        body.extend_from_slice(table.as_bytes());
        body.push(0);
        body.push(columns.len() as u8);
        for column in columns {
            body.push(column.code);
        }
        let metadata: Vec<u8> = columns.iter().flat_map(|c| c.meta.clone()).collect();
        body.push(metadata.len() as u8);
        body.extend_from_slice(&metadata);
        body.extend(std::iter::repeat(0xff).take(columns.len().div_ceil(8)));
        body.extend_from_slice(optional_metadata);
        self.event(TABLE_MAP, body)
    }

    /// `images` 는 row 하나당 인코딩된 바이트. UPDATE 면 before + after 를 이어 붙인 값.
    pub fn rows(self, event_code: u8, table_id: u64, column_count: usize, images: &[Vec<u8>]) -> Self {
        let is_v2 = matches!(event_code, WRITE_ROWS_V2 | UPDATE_ROWS_V2 | DELETE_ROWS_V2);
        let is_update = matches!(event_code, UPDATE_ROWS_V1 | UPDATE_ROWS_V2);

        let mut body = Vec::new();
        body.write_uint::<LittleEndian>(table_id, 6).unwrap();
        body.write_u16::<LittleEndian>(1).unwrap();
        if is_v2 {
            body.write_u16::<LittleEndian>(2).unwrap();
        }
        body.push(column_count as u8);
        let mut present = vec![0u8; column_count.div_ceil(8)];
        for i in 0..column_count {
            present[i / 8] |= 1 << (i % 8);
        }
        body.extend_from_slice(&present);
        if is_update {
            body.extend_from_slice(&present);
        }
        for image in images {
            body.extend_from_slice(image);
        }
        self.event(event_code, body)
    }

    pub fn write_rows(self, table_id: u64, column_count: usize, rows: &[RowBuilder]) -> Self {
        let images: Vec<_> = rows.iter().map(RowBuilder::encode).collect();
        self.rows(WRITE_ROWS_V2, table_id, column_count, &images)
    }

    pub fn update_rows(
        self,
        event_code: u8,
        table_id: u64,
        column_count: usize,
        pairs: &[(RowBuilder, RowBuilder)],
    ) -> Self {
        let images: Vec<_> = pairs
            .iter()
            .map(|(before, after)| {
                let mut bytes = before.encode();
                bytes.extend_from_slice(&after.encode());
                bytes
            })
            .collect();
        self.rows(event_code, table_id, column_count, &images)
    }

    pub fn delete_rows(self, table_id: u64, column_count: usize, rows: &[RowBuilder]) -> Self {
        let images: Vec<_> = rows.iter().map(RowBuilder::encode).collect();
        self.rows(DELETE_ROWS_V2, table_id, column_count, &images)
    }

    pub fn xid(self, xid: u64) -> Self {
        self.event(XID, xid.to_le_bytes().to_vec())
    }

    /// 임의 타입 코드의 이벤트
    pub fn event(mut self, code: u8, body: Vec<u8>) -> Self {
        let trailer = if self.checksum { 4 } else { 0 };
        let event_length = (EVENT_HEADER_SIZE + body.len() + trailer) as u32;
        let next_pos = self.data.len() as u32 + event_length;

        let mut event = Vec::with_capacity(event_length as usize);
        event.write_u32::<LittleEndian>(self.timestamp).unwrap();
        event.push(code);
        event.write_u32::<LittleEndian>(self.server_id).unwrap();
        event.write_u32::<LittleEndian>(event_length).unwrap();
        event.write_u32::<LittleEndian>(next_pos).unwrap();
        event.write_u16::<LittleEndian>(0).unwrap();
        event.extend_from_slice(&body);
        if self.checksum {
            let crc = crc32fast::hash(&event);
            event.write_u32::<LittleEndian>(crc).unwrap();
        }

        self.data.extend_from_slice(&event);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}
