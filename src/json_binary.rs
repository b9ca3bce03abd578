//! MySQL 바이너리 JSON 디코더
//!
//! JSON 컬럼 값은 텍스트가 아니라 타입 태그, 키/값 오프셋 테이블,
//! 인라인 스칼라로 이루어진 MySQL 고유 바이너리 형식으로 binlog 에 기록된다.
//! 컨테이너 안의 오프셋은 모두 해당 컨테이너 본문 시작 기준이다.

use crate::events::ColumnType;
use crate::rows::decode_decimal;
use base64::Engine;
use serde_json::{Map, Number, Value};
use std::io;

const SMALL_OBJECT: u8 = 0x00;
const LARGE_OBJECT: u8 = 0x01;
const SMALL_ARRAY: u8 = 0x02;
const LARGE_ARRAY: u8 = 0x03;
const LITERAL: u8 = 0x04;
const INT16: u8 = 0x05;
const UINT16: u8 = 0x06;
const INT32: u8 = 0x07;
const UINT32: u8 = 0x08;
const INT64: u8 = 0x09;
const UINT64: u8 = 0x0a;
const DOUBLE: u8 = 0x0b;
const STRING: u8 = 0x0c;
const OPAQUE: u8 = 0x0f;

const LITERAL_NULL: u8 = 0x00;
const LITERAL_TRUE: u8 = 0x01;
const LITERAL_FALSE: u8 = 0x02;

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn slice(data: &[u8], start: usize, len: usize) -> io::Result<&[u8]> {
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| {
            invalid(format!(
                "json value out of bounds: {}+{} of {}",
                start,
                len,
                data.len()
            ))
        })
}

fn read_u16(data: &[u8], pos: usize) -> io::Result<u16> {
    let b = slice(data, pos, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], pos: usize) -> io::Result<u32> {
    let b = slice(data, pos, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(data: &[u8], pos: usize) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice(data, pos, 8)?);
    Ok(u64::from_le_bytes(buf))
}

/// JSON 컬럼 payload 전체를 디코딩한다. 빈 payload 는 JSON null.
pub fn decode_json(data: &[u8]) -> io::Result<Value> {
    match data.split_first() {
        None => Ok(Value::Null),
        Some((&value_type, body)) => parse_value(value_type, body),
    }
}

fn parse_value(value_type: u8, data: &[u8]) -> io::Result<Value> {
    match value_type {
        SMALL_OBJECT => parse_container(data, false, true),
        LARGE_OBJECT => parse_container(data, true, true),
        SMALL_ARRAY => parse_container(data, false, false),
        LARGE_ARRAY => parse_container(data, true, false),
        LITERAL => parse_literal(*slice(data, 0, 1)?.first().unwrap_or(&LITERAL_NULL)),
        INT16 => Ok(Value::from(read_u16(data, 0)? as i16)),
        UINT16 => Ok(Value::from(read_u16(data, 0)?)),
        INT32 => Ok(Value::from(read_u32(data, 0)? as i32)),
        UINT32 => Ok(Value::from(read_u32(data, 0)?)),
        INT64 => Ok(Value::from(read_u64(data, 0)? as i64)),
        UINT64 => Ok(Value::from(read_u64(data, 0)?)),
        DOUBLE => {
            let v = f64::from_bits(read_u64(data, 0)?);
            Ok(Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null))
        }
        STRING => {
            let (len, prefix) = read_variable_length(data)?;
            let bytes = slice(data, prefix, len)?;
            Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()))
        }
        OPAQUE => parse_opaque(data),
        other => Err(invalid(format!("unknown json value type 0x{:02x}", other))),
    }
}

fn parse_literal(code: u8) -> io::Result<Value> {
    match code {
        LITERAL_NULL => Ok(Value::Null),
        LITERAL_TRUE => Ok(Value::Bool(true)),
        LITERAL_FALSE => Ok(Value::Bool(false)),
        other => Err(invalid(format!("unknown json literal 0x{:02x}", other))),
    }
}

/// object/array 공통: count, size, (object 라면) key entry, value entry 순서
fn parse_container(data: &[u8], large: bool, is_object: bool) -> io::Result<Value> {
    let offset_size = if large { 4 } else { 2 };
    let read_offset = |pos: usize| -> io::Result<usize> {
        if large {
            Ok(read_u32(data, pos)? as usize)
        } else {
            Ok(read_u16(data, pos)? as usize)
        }
    };

    let count = read_offset(0)?;
    let size = read_offset(offset_size)?;
    if size > data.len() {
        return Err(invalid(format!(
            "json container size {} exceeds {} bytes",
            size,
            data.len()
        )));
    }
    let data = &data[..size];

    let header_size = offset_size * 2;
    let key_entry_size = offset_size + 2;
    let value_entry_size = offset_size + 1;
    let key_entries = header_size;
    let value_entries = if is_object {
        key_entries + count * key_entry_size
    } else {
        header_size
    };

    let mut values = Vec::with_capacity(count.min(data.len()));
    for i in 0..count {
        let entry = value_entries + i * value_entry_size;
        let value_type = *slice(data, entry, 1)?
            .first()
            .ok_or_else(|| invalid("missing value entry"))?;
        values.push(parse_entry(data, value_type, entry + 1, large)?);
    }

    if !is_object {
        return Ok(Value::Array(values));
    }

    let mut map = Map::with_capacity(count);
    for (i, value) in values.into_iter().enumerate() {
        let entry = key_entries + i * key_entry_size;
        let key_offset = read_offset(entry)?;
        let key_len = read_u16(data, entry + offset_size)? as usize;
        let key = String::from_utf8_lossy(slice(data, key_offset, key_len)?).into_owned();
        map.insert(key, value);
    }
    Ok(Value::Object(map))
}

/// value entry: 작은 스칼라는 오프셋 자리에 값이 바로 들어 있다
fn parse_entry(data: &[u8], value_type: u8, pos: usize, large: bool) -> io::Result<Value> {
    match value_type {
        LITERAL => return parse_literal(read_u16(data, pos)? as u8),
        INT16 => return Ok(Value::from(read_u16(data, pos)? as i16)),
        UINT16 => return Ok(Value::from(read_u16(data, pos)?)),
        INT32 if large => return Ok(Value::from(read_u32(data, pos)? as i32)),
        UINT32 if large => return Ok(Value::from(read_u32(data, pos)?)),
        _ => {}
    }

    let offset = if large {
        read_u32(data, pos)? as usize
    } else {
        read_u16(data, pos)? as usize
    };
    if offset >= data.len() {
        return Err(invalid(format!("json value offset {} out of bounds", offset)));
    }
    parse_value(value_type, &data[offset..])
}

/// 문자열/opaque 길이: 7비트씩, 최상위 비트가 계속 표시 (최대 5바이트)
fn read_variable_length(data: &[u8]) -> io::Result<(usize, usize)> {
    let mut length = 0usize;
    for i in 0..5 {
        let b = *data
            .get(i)
            .ok_or_else(|| invalid("truncated json variable length"))?;
        length |= ((b & 0x7f) as usize) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((length, i + 1));
        }
    }
    Err(invalid("json variable length longer than 5 bytes"))
}

/// opaque: MySQL 필드 타입 + 길이 + 원본 바이트
fn parse_opaque(data: &[u8]) -> io::Result<Value> {
    let field_type = ColumnType::from_u8(*slice(data, 0, 1)?.first().unwrap_or(&0));
    let (len, prefix) = read_variable_length(&data[1..])?;
    let payload = slice(data, 1 + prefix, len)?;

    match field_type {
        ColumnType::NewDecimal => {
            let header = slice(payload, 0, 2)?;
            let (precision, scale) = (header[0] as usize, header[1] as usize);
            let (text, _) = decode_decimal(&payload[2..], precision, scale)?;
            Ok(text
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::String(text)))
        }
        ColumnType::Time => Ok(Value::String(packed_time(read_u64(payload, 0)? as i64))),
        ColumnType::Date => Ok(Value::String(
            packed_datetime(read_u64(payload, 0)? as i64)[..10].to_string(),
        )),
        ColumnType::DateTime | ColumnType::Timestamp => {
            Ok(Value::String(packed_datetime(read_u64(payload, 0)? as i64)))
        }
        _ => Ok(Value::String(
            base64::engine::general_purpose::STANDARD.encode(payload),
        )),
    }
}

fn packed_datetime(packed: i64) -> String {
    let v = packed.unsigned_abs();
    let ymdhms = v >> 24;
    let micros = v % (1 << 24);
    let ymd = ymdhms >> 17;
    let ym = ymd >> 5;
    let hms = ymdhms % (1 << 17);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
        ym / 13,
        ym % 13,
        ymd % 32,
        hms >> 12,
        (hms >> 6) % 64,
        hms % 64,
        micros
    )
}

fn packed_time(packed: i64) -> String {
    let sign = if packed < 0 { "-" } else { "" };
    let v = packed.unsigned_abs();
    let hms = v >> 24;
    format!(
        "{}{:02}:{:02}:{:02}.{:06}",
        sign,
        (hms >> 12) % (1 << 10),
        (hms >> 6) % 64,
        hms % 64,
        v % (1 << 24)
    )
}
