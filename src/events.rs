//! MySQL Binlog 이벤트 타입 및 데이터 구조 정의

use crate::value::CellValue;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// MySQL Binlog 이벤트 타입
///
/// 디코더가 다루는 타입과 로그에 이름으로 남길 타입만 열거하고,
/// 나머지 코드는 `Unknown` 에 원래 값을 그대로 담는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// 쿼리 이벤트 (DDL, BEGIN)
    Query,
    /// 서버 종료
    Stop,
    /// 로테이션 이벤트 (새 binlog 파일)
    Rotate,
    /// 포맷 설명 이벤트 (체크섬, post-header 길이)
    FormatDescription,
    /// 트랜잭션 커밋
    Xid,
    /// 테이블 맵 이벤트 (스키마 정보)
    TableMap,
    WriteRowsV1,
    UpdateRowsV1,
    DeleteRowsV1,
    Heartbeat,
    /// Rows Query 이벤트 (원본 쿼리)
    RowsQuery,
    WriteRowsV2,
    UpdateRowsV2,
    DeleteRowsV2,
    /// GTID 이벤트 (Global Transaction ID)
    Gtid,
    /// 익명 GTID 이벤트
    AnonymousGtid,
    PreviousGtids,
    /// 알 수 없는 이벤트
    Unknown(u8),
}

impl EventType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            2 => EventType::Query,
            3 => EventType::Stop,
            4 => EventType::Rotate,
            15 => EventType::FormatDescription,
            16 => EventType::Xid,
            19 => EventType::TableMap,
            23 => EventType::WriteRowsV1,
            24 => EventType::UpdateRowsV1,
            25 => EventType::DeleteRowsV1,
            27 => EventType::Heartbeat,
            29 => EventType::RowsQuery,
            30 => EventType::WriteRowsV2,
            31 => EventType::UpdateRowsV2,
            32 => EventType::DeleteRowsV2,
            33 => EventType::Gtid,
            34 => EventType::AnonymousGtid,
            35 => EventType::PreviousGtids,
            other => EventType::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            EventType::Query => 2,
            EventType::Stop => 3,
            EventType::Rotate => 4,
            EventType::FormatDescription => 15,
            EventType::Xid => 16,
            EventType::TableMap => 19,
            EventType::WriteRowsV1 => 23,
            EventType::UpdateRowsV1 => 24,
            EventType::DeleteRowsV1 => 25,
            EventType::Heartbeat => 27,
            EventType::RowsQuery => 29,
            EventType::WriteRowsV2 => 30,
            EventType::UpdateRowsV2 => 31,
            EventType::DeleteRowsV2 => 32,
            EventType::Gtid => 33,
            EventType::AnonymousGtid => 34,
            EventType::PreviousGtids => 35,
            EventType::Unknown(code) => *code,
        }
    }

    /// row 변경 이벤트라면 연산 종류를 반환
    pub fn rows_kind(&self) -> Option<RowsKind> {
        match self {
            EventType::WriteRowsV1 | EventType::WriteRowsV2 => Some(RowsKind::Insert),
            EventType::UpdateRowsV1 | EventType::UpdateRowsV2 => Some(RowsKind::Update),
            EventType::DeleteRowsV1 | EventType::DeleteRowsV2 => Some(RowsKind::Delete),
            _ => None,
        }
    }

    /// v2 row 이벤트는 post-header 뒤에 extra data 블록을 가진다
    pub fn is_rows_v2(&self) -> bool {
        matches!(
            self,
            EventType::WriteRowsV2 | EventType::UpdateRowsV2 | EventType::DeleteRowsV2
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Unknown(code) => write!(f, "Unknown({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// MySQL 컬럼 타입 (TABLE_MAP 이벤트의 type 바이트)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Decimal,
    Tiny,
    Short,
    Long,
    Float,
    Double,
    Null,
    Timestamp,
    LongLong,
    Int24,
    Date,
    Time,
    DateTime,
    Year,
    NewDate,
    Varchar,
    Bit,
    Timestamp2,
    DateTime2,
    Time2,
    Json,
    NewDecimal,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
    Unknown(u8),
}

impl ColumnType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => ColumnType::Decimal,
            1 => ColumnType::Tiny,
            2 => ColumnType::Short,
            3 => ColumnType::Long,
            4 => ColumnType::Float,
            5 => ColumnType::Double,
            6 => ColumnType::Null,
            7 => ColumnType::Timestamp,
            8 => ColumnType::LongLong,
            9 => ColumnType::Int24,
            10 => ColumnType::Date,
            11 => ColumnType::Time,
            12 => ColumnType::DateTime,
            13 => ColumnType::Year,
            14 => ColumnType::NewDate,
            15 => ColumnType::Varchar,
            16 => ColumnType::Bit,
            17 => ColumnType::Timestamp2,
            18 => ColumnType::DateTime2,
            19 => ColumnType::Time2,
            245 => ColumnType::Json,
            246 => ColumnType::NewDecimal,
            247 => ColumnType::Enum,
            248 => ColumnType::Set,
            249 => ColumnType::TinyBlob,
            250 => ColumnType::MediumBlob,
            251 => ColumnType::LongBlob,
            252 => ColumnType::Blob,
            253 => ColumnType::VarString,
            254 => ColumnType::String,
            255 => ColumnType::Geometry,
            other => ColumnType::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ColumnType::Decimal => 0,
            ColumnType::Tiny => 1,
            ColumnType::Short => 2,
            ColumnType::Long => 3,
            ColumnType::Float => 4,
            ColumnType::Double => 5,
            ColumnType::Null => 6,
            ColumnType::Timestamp => 7,
            ColumnType::LongLong => 8,
            ColumnType::Int24 => 9,
            ColumnType::Date => 10,
            ColumnType::Time => 11,
            ColumnType::DateTime => 12,
            ColumnType::Year => 13,
            ColumnType::NewDate => 14,
            ColumnType::Varchar => 15,
            ColumnType::Bit => 16,
            ColumnType::Timestamp2 => 17,
            ColumnType::DateTime2 => 18,
            ColumnType::Time2 => 19,
            ColumnType::Json => 245,
            ColumnType::NewDecimal => 246,
            ColumnType::Enum => 247,
            ColumnType::Set => 248,
            ColumnType::TinyBlob => 249,
            ColumnType::MediumBlob => 250,
            ColumnType::LongBlob => 251,
            ColumnType::Blob => 252,
            ColumnType::VarString => 253,
            ColumnType::String => 254,
            ColumnType::Geometry => 255,
            ColumnType::Unknown(code) => *code,
        }
    }

    /// TABLE_MAP 의 column metadata 블록에서 이 타입이 차지하는 바이트 수
    pub fn metadata_len(&self) -> usize {
        match self {
            ColumnType::String
            | ColumnType::Enum
            | ColumnType::Set
            | ColumnType::NewDecimal
            | ColumnType::Varchar
            | ColumnType::VarString
            | ColumnType::Bit => 2,
            ColumnType::Blob
            | ColumnType::TinyBlob
            | ColumnType::MediumBlob
            | ColumnType::LongBlob
            | ColumnType::Double
            | ColumnType::Float
            | ColumnType::Geometry
            | ColumnType::Json
            | ColumnType::Time2
            | ColumnType::DateTime2
            | ColumnType::Timestamp2 => 1,
            _ => 0,
        }
    }

    /// SIGNEDNESS optional metadata 비트가 할당되는 숫자 타입
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Tiny
                | ColumnType::Short
                | ColumnType::Int24
                | ColumnType::Long
                | ColumnType::LongLong
                | ColumnType::NewDecimal
                | ColumnType::Float
                | ColumnType::Double
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Unknown(code) => write!(f, "Unknown({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Binlog 이벤트 헤더 (19 바이트, 이벤트마다 새로 읽음)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// 이벤트 타임스탬프 (초 단위)
    pub timestamp: u32,
    /// 이벤트 타입
    pub event_type: EventType,
    /// MySQL 서버 ID
    pub server_id: u32,
    /// 이벤트 길이 (헤더 포함, 바이트)
    pub event_length: u32,
    /// 다음 이벤트 위치
    pub next_pos: u32,
    /// 이벤트 플래그
    pub flags: u16,
}

/// 스트림에서 잘라낸 이벤트 한 개 (헤더 + 해석 전 본문)
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub header: EventHeader,
    /// 체크섬 계산용 원본 헤더 바이트
    pub header_bytes: [u8; 19],
    /// 헤더 뒤의 본문 (체크섬 trailer 포함)
    pub body: Bytes,
    /// 파일 내 이벤트 시작 오프셋
    pub offset: u64,
}

/// 변경 연산 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowsKind {
    Insert,
    Update,
    Delete,
}

impl RowsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowsKind::Insert => "insert",
            RowsKind::Update => "update",
            RowsKind::Delete => "delete",
        }
    }
}

/// 한 row 의 컬럼 값들 (테이블 정의의 컬럼 순서)
pub type RowImage = Vec<CellValue>;

/// row 이벤트 안의 한 행
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    /// INSERT 의 after image 또는 DELETE 의 before image
    Single(RowImage),
    /// UPDATE 의 변경 전후 쌍
    Pair { before: RowImage, after: RowImage },
}

/// 디코딩된 WRITE/UPDATE/DELETE_ROWS 이벤트
#[derive(Debug, Clone, PartialEq)]
pub struct RowChangeEvent {
    pub kind: RowsKind,
    pub table_id: u64,
    pub rows: Vec<RowChange>,
}
