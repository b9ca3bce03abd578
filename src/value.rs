//! 디코딩된 컬럼 값
//!
//! JSON 으로는 타입 태그 없이 값 자체로 직렬화된다.
//! 날짜/시간은 MySQL 텍스트 표기 (`YYYY-MM-DD HH:MM:SS[.ffffff]`),
//! 바이너리 값은 base64 문자열이 된다.

use base64::Engine;
use serde::{Serialize, Serializer};
use std::fmt;

/// 셀 값 (다양한 MySQL 타입 지원)
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    /// 정밀도를 잃지 않도록 문자열로 보관
    Decimal(String),
    String(String),
    Bytes(Vec<u8>),
    Year(u16),
    Date(MysqlDate),
    Time(MysqlTime),
    DateTime(MysqlDateTime),
    /// ENUM 의 1-based 인덱스
    Enum(u16),
    /// SET 의 비트마스크
    Set(u64),
    Json(serde_json::Value),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Int(v) => serializer.serialize_i64(*v),
            CellValue::UInt(v) => serializer.serialize_u64(*v),
            CellValue::Float(v) => serializer.serialize_f32(*v),
            CellValue::Double(v) => serializer.serialize_f64(*v),
            CellValue::Decimal(s) | CellValue::String(s) => serializer.serialize_str(s),
            CellValue::Bytes(b) => serializer
                .serialize_str(&base64::engine::general_purpose::STANDARD.encode(b)),
            CellValue::Year(y) => serializer.serialize_u16(*y),
            CellValue::Date(d) => serializer.collect_str(d),
            CellValue::Time(t) => serializer.collect_str(t),
            CellValue::DateTime(dt) => serializer.collect_str(dt),
            CellValue::Enum(v) => serializer.serialize_u16(*v),
            CellValue::Set(v) => serializer.serialize_u64(*v),
            CellValue::Json(v) => v.serialize(serializer),
        }
    }
}

/// DATE (0000-00-00 같은 zero date 도 표현 가능)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MysqlDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl fmt::Display for MysqlDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// TIME / TIME2 (-838:59:59 ~ 838:59:59)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MysqlTime {
    pub negative: bool,
    pub hours: u32,
    pub minutes: u8,
    pub seconds: u8,
    pub micros: u32,
    /// 소수점 이하 자릿수 (0..=6)
    pub fsp: u8,
}

impl fmt::Display for MysqlTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)?;
        write_fraction(f, self.micros, self.fsp)
    }
}

/// DATETIME / DATETIME2 / TIMESTAMP / TIMESTAMP2 (TIMESTAMP 은 UTC 로 변환된 값)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MysqlDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micros: u32,
    pub fsp: u8,
}

impl MysqlDateTime {
    /// 0000-00-00 00:00:00
    pub fn zero(fsp: u8) -> Self {
        MysqlDateTime {
            fsp,
            ..Default::default()
        }
    }
}

impl fmt::Display for MysqlDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        write_fraction(f, self.micros, self.fsp)
    }
}

fn write_fraction(f: &mut fmt::Formatter<'_>, micros: u32, fsp: u8) -> fmt::Result {
    if fsp == 0 {
        return Ok(());
    }
    let fsp = fsp.min(6) as u32;
    let scaled = micros / 10u32.pow(6 - fsp);
    write!(f, ".{:0width$}", scaled, width = fsp as usize)
}
