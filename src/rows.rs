//! Row image 및 컬럼 값 디코딩
//!
//! WRITE/UPDATE/DELETE_ROWS 본문의 row 들을 테이블 정의에 따라 `CellValue` 로 바꾼다.
//! present 비트맵에 없는 컬럼은 `Null` 로 채워 항상 테이블 컬럼 수만큼 값을 돌려준다.

use crate::error::{BinlogError, Result};
use crate::events::{ColumnType, RowChange, RowImage, RowsKind};
use crate::json_binary;
use crate::read_ext::{bit_is_set, bitmap_len, count_set_bits, CursorExt};
use crate::registry::TableDefinition;
use crate::value::{CellValue, MysqlDate, MysqlDateTime, MysqlTime};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use chrono::{Datelike, Timelike};
use std::fmt::Write as _;
use std::io::{self, Cursor};

const DIG_PER_DEC: usize = 9;
const COMPRESSED_BYTES: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];

const DATETIME2_OFFSET: i64 = 0x80_0000_0000;
const TIMEF_INT_OFS: i64 = 0x80_0000;
const TIMEF_OFS: i64 = 0x8000_0000_0000;

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// 본문 끝까지 row 를 읽는다.
/// UPDATE 는 `present_after` 비트맵으로 after image 를 이어서 읽어 쌍으로 묶는다.
pub fn decode_rows(
    cursor: &mut Cursor<&[u8]>,
    table: &TableDefinition,
    kind: RowsKind,
    present: &[u8],
    present_after: Option<&[u8]>,
) -> Result<Vec<RowChange>> {
    let mut rows = Vec::new();

    while cursor.remaining() > 0 {
        let start = cursor.offset();
        let row = match (kind, present_after) {
            (RowsKind::Update, Some(after_bitmap)) => {
                let before = decode_image(cursor, table, present)?;
                let after = decode_image(cursor, table, after_bitmap)?;
                RowChange::Pair { before, after }
            }
            _ => RowChange::Single(decode_image(cursor, table, present)?),
        };
        if cursor.offset() == start {
            return Err(BinlogError::InvalidFormat(format!(
                "row image at offset {} consumed no bytes",
                start
            )));
        }
        rows.push(row);
    }

    Ok(rows)
}

/// row image 한 개: present 컬럼 수 기준 null 비트맵 + 값들
pub fn decode_image(
    cursor: &mut Cursor<&[u8]>,
    table: &TableDefinition,
    present: &[u8],
) -> Result<RowImage> {
    let column_count = table.column_count();
    let present_count = count_set_bits(present, column_count);

    let null_bitmap = cursor.read_bytes(bitmap_len(present_count)).map_err(|e| {
        BinlogError::InvalidFormat(format!(
            "row null bitmap at offset {}: {}",
            cursor.offset(),
            e
        ))
    })?;

    let mut image = Vec::with_capacity(column_count);
    let mut null_index = 0;

    for column in 0..column_count {
        if !bit_is_set(present, column) {
            image.push(CellValue::Null);
            continue;
        }

        let is_null = bit_is_set(&null_bitmap, null_index);
        null_index += 1;
        if is_null {
            image.push(CellValue::Null);
            continue;
        }

        let column_type = table.column_types[column];
        let offset = cursor.offset();
        let value = decode_value(
            cursor,
            column_type,
            table.column_meta[column],
            table.is_unsigned(column),
        )
        .map_err(|_| BinlogError::ColumnDecode {
            column,
            column_type: column_type.to_string(),
            offset,
        })?;
        image.push(value);
    }

    Ok(image)
}

/// 컬럼 값 한 개 디코딩
pub fn decode_value(
    cursor: &mut Cursor<&[u8]>,
    column_type: ColumnType,
    meta: u16,
    unsigned: bool,
) -> io::Result<CellValue> {
    let value = match column_type {
        ColumnType::Null => CellValue::Null,

        ColumnType::Tiny if unsigned => CellValue::UInt(cursor.read_u8()? as u64),
        ColumnType::Tiny => CellValue::Int(cursor.read_i8()? as i64),
        ColumnType::Short if unsigned => {
            CellValue::UInt(cursor.read_u16::<LittleEndian>()? as u64)
        }
        ColumnType::Short => CellValue::Int(cursor.read_i16::<LittleEndian>()? as i64),
        ColumnType::Int24 if unsigned => {
            CellValue::UInt(cursor.read_u24::<LittleEndian>()? as u64)
        }
        ColumnType::Int24 => CellValue::Int(cursor.read_i24::<LittleEndian>()? as i64),
        ColumnType::Long if unsigned => CellValue::UInt(cursor.read_u32::<LittleEndian>()? as u64),
        ColumnType::Long => CellValue::Int(cursor.read_i32::<LittleEndian>()? as i64),
        ColumnType::LongLong if unsigned => CellValue::UInt(cursor.read_u64::<LittleEndian>()?),
        ColumnType::LongLong => CellValue::Int(cursor.read_i64::<LittleEndian>()?),

        ColumnType::Float => CellValue::Float(cursor.read_f32::<LittleEndian>()?),
        ColumnType::Double => CellValue::Double(cursor.read_f64::<LittleEndian>()?),

        ColumnType::NewDecimal => {
            let precision = (meta >> 8) as usize;
            let scale = (meta & 0xff) as usize;
            let start = cursor.offset();
            let (text, size) = decode_decimal(&cursor.get_ref()[start..], precision, scale)?;
            cursor.skip(size)?;
            CellValue::Decimal(text)
        }

        ColumnType::Bit => {
            let nbits = (meta >> 8) as usize * 8 + (meta & 0xff) as usize;
            let len = nbits.div_ceil(8);
            if len > 8 {
                return Err(invalid(format!("bit column of {} bits", nbits)));
            }
            CellValue::UInt(cursor.read_uint_be(len)?)
        }

        ColumnType::Year => {
            let y = cursor.read_u8()?;
            CellValue::Year(if y == 0 { 0 } else { y as u16 + 1900 })
        }

        ColumnType::Date | ColumnType::NewDate => {
            let v = cursor.read_u24::<LittleEndian>()?;
            CellValue::Date(MysqlDate {
                year: (v >> 9) as u16,
                month: ((v >> 5) % 16) as u8,
                day: (v % 32) as u8,
            })
        }

        ColumnType::Time => {
            let v = cursor.read_i24::<LittleEndian>()?;
            let abs = v.unsigned_abs();
            CellValue::Time(MysqlTime {
                negative: v < 0,
                hours: abs / 10000,
                minutes: ((abs % 10000) / 100) as u8,
                seconds: (abs % 100) as u8,
                micros: 0,
                fsp: 0,
            })
        }

        ColumnType::Time2 => CellValue::Time(decode_time2(cursor, meta as u8)?),

        ColumnType::DateTime => {
            let v = cursor.read_u64::<LittleEndian>()?;
            let date = v / 1_000_000;
            let time = v % 1_000_000;
            CellValue::DateTime(MysqlDateTime {
                year: (date / 10000) as u16,
                month: ((date % 10000) / 100) as u8,
                day: (date % 100) as u8,
                hour: (time / 10000) as u8,
                minute: ((time % 10000) / 100) as u8,
                second: (time % 100) as u8,
                micros: 0,
                fsp: 0,
            })
        }

        ColumnType::DateTime2 => CellValue::DateTime(decode_datetime2(cursor, meta as u8)?),

        ColumnType::Timestamp => {
            let secs = cursor.read_u32::<LittleEndian>()?;
            CellValue::DateTime(timestamp_to_utc(secs, 0, 0)?)
        }

        ColumnType::Timestamp2 => {
            let fsp = meta as u8;
            let secs = cursor.read_u32::<BigEndian>()?;
            let micros = read_fraction(cursor, fsp)?;
            CellValue::DateTime(timestamp_to_utc(secs, micros, fsp)?)
        }

        ColumnType::Varchar | ColumnType::VarString => {
            let len = if meta < 256 {
                cursor.read_u8()? as usize
            } else {
                cursor.read_u16::<LittleEndian>()? as usize
            };
            let bytes = cursor.read_bytes(len)?;
            CellValue::String(String::from_utf8_lossy(&bytes).into_owned())
        }

        ColumnType::String => decode_string(cursor, meta)?,

        ColumnType::Enum => decode_enum(cursor, (meta & 0xff) as usize)?,
        ColumnType::Set => CellValue::Set(read_set(cursor, (meta & 0xff) as usize)?),

        ColumnType::Blob
        | ColumnType::TinyBlob
        | ColumnType::MediumBlob
        | ColumnType::LongBlob
        | ColumnType::Geometry => {
            let len = cursor.read_uint_le(length_bytes(meta)?)? as usize;
            CellValue::Bytes(cursor.read_bytes(len)?)
        }

        ColumnType::Json => {
            let len = cursor.read_uint_le(length_bytes(meta)?)? as usize;
            let payload = cursor.read_bytes(len)?;
            CellValue::Json(json_binary::decode_json(&payload)?)
        }

        ColumnType::Decimal | ColumnType::Unknown(_) => {
            return Err(invalid(format!("unsupported column type {}", column_type)));
        }
    };

    Ok(value)
}

/// BLOB/JSON 길이 접두사 크기 (1..=4)
fn length_bytes(meta: u16) -> io::Result<usize> {
    match meta {
        1..=4 => Ok(meta as usize),
        other => Err(invalid(format!("blob length prefix of {} bytes", other))),
    }
}

/// MYSQL_TYPE_STRING: 메타데이터 상위 바이트에 실제 타입(ENUM/SET/CHAR)이 들어 있다
fn decode_string(cursor: &mut Cursor<&[u8]>, meta: u16) -> io::Result<CellValue> {
    let (real_type, length) = if meta >= 256 {
        let b0 = (meta >> 8) as u8;
        let b1 = meta & 0xff;
        if b0 & 0x30 != 0x30 {
            (b0 | 0x30, b1 | ((((b0 & 0x30) ^ 0x30) as u16) << 4))
        } else {
            (b0, b1)
        }
    } else {
        (ColumnType::String.code(), meta)
    };

    match ColumnType::from_u8(real_type) {
        ColumnType::Enum => decode_enum(cursor, length as usize),
        ColumnType::Set => Ok(CellValue::Set(read_set(cursor, length as usize)?)),
        _ => {
            let len = if length < 256 {
                cursor.read_u8()? as usize
            } else {
                cursor.read_u16::<LittleEndian>()? as usize
            };
            let bytes = cursor.read_bytes(len)?;
            Ok(CellValue::String(String::from_utf8_lossy(&bytes).into_owned()))
        }
    }
}

fn decode_enum(cursor: &mut Cursor<&[u8]>, pack_len: usize) -> io::Result<CellValue> {
    match pack_len {
        1 => Ok(CellValue::Enum(cursor.read_u8()? as u16)),
        2 => Ok(CellValue::Enum(cursor.read_u16::<LittleEndian>()?)),
        other => Err(invalid(format!("enum pack length {}", other))),
    }
}

fn read_set(cursor: &mut Cursor<&[u8]>, pack_len: usize) -> io::Result<u64> {
    if pack_len > 8 {
        return Err(invalid(format!("set pack length {}", pack_len)));
    }
    cursor.read_uint_le(pack_len)
}

/// TIME2/DATETIME2/TIMESTAMP2 의 소수 초 (big-endian) 를 마이크로초로
fn read_fraction(cursor: &mut Cursor<&[u8]>, fsp: u8) -> io::Result<u32> {
    let micros = match fsp {
        1 | 2 => cursor.read_u8()? as u32 * 10_000,
        3 | 4 => cursor.read_u16::<BigEndian>()? as u32 * 100,
        5 | 6 => cursor.read_u24::<BigEndian>()?,
        _ => 0,
    };
    check_micros(micros)
}

fn check_micros(micros: u32) -> io::Result<u32> {
    if micros >= 1_000_000 {
        return Err(invalid(format!("fractional part {} out of range", micros)));
    }
    Ok(micros)
}

fn decode_datetime2(cursor: &mut Cursor<&[u8]>, fsp: u8) -> io::Result<MysqlDateTime> {
    let packed = cursor.read_uint_be(5)? as i64 - DATETIME2_OFFSET;
    let micros = read_fraction(cursor, fsp)?;

    if packed == 0 {
        return Ok(MysqlDateTime {
            micros,
            ..MysqlDateTime::zero(fsp)
        });
    }

    let packed = packed.unsigned_abs();
    let ymd = packed >> 17;
    let ym = ymd >> 5;
    let hms = packed % (1 << 17);

    Ok(MysqlDateTime {
        year: (ym / 13) as u16,
        month: (ym % 13) as u8,
        day: (ymd % 32) as u8,
        hour: (hms >> 12) as u8,
        minute: ((hms >> 6) % 64) as u8,
        second: (hms % 64) as u8,
        micros,
        fsp,
    })
}

fn decode_time2(cursor: &mut Cursor<&[u8]>, fsp: u8) -> io::Result<MysqlTime> {
    let tmp: i64 = match fsp {
        1 | 2 => {
            let mut int_part = cursor.read_uint_be(3)? as i64 - TIMEF_INT_OFS;
            let mut frac = cursor.read_u8()? as i64;
            if int_part < 0 && frac != 0 {
                int_part += 1;
                frac -= 0x100;
            }
            (int_part << 24) + frac * 10_000
        }
        3 | 4 => {
            let mut int_part = cursor.read_uint_be(3)? as i64 - TIMEF_INT_OFS;
            let mut frac = cursor.read_u16::<BigEndian>()? as i64;
            if int_part < 0 && frac != 0 {
                int_part += 1;
                frac -= 0x10000;
            }
            (int_part << 24) + frac * 100
        }
        5 | 6 => cursor.read_uint_be(6)? as i64 - TIMEF_OFS,
        _ => (cursor.read_uint_be(3)? as i64 - TIMEF_INT_OFS) << 24,
    };

    let negative = tmp < 0;
    let tmp = tmp.unsigned_abs();
    let hms = tmp >> 24;
    let micros = check_micros((tmp % (1 << 24)) as u32)?;

    Ok(MysqlTime {
        negative,
        hours: ((hms >> 12) % (1 << 10)) as u32,
        minutes: ((hms >> 6) % 64) as u8,
        seconds: (hms % 64) as u8,
        micros,
        fsp,
    })
}

/// TIMESTAMP 는 epoch 초로 저장되므로 UTC 로 풀어 쓴다 (0 은 zero datetime)
fn timestamp_to_utc(secs: u32, micros: u32, fsp: u8) -> io::Result<MysqlDateTime> {
    if secs == 0 && micros == 0 {
        return Ok(MysqlDateTime::zero(fsp));
    }
    let nanos = micros
        .checked_mul(1000)
        .ok_or_else(|| invalid(format!("fractional part {} out of range", micros)))?;
    let utc = chrono::DateTime::from_timestamp(secs as i64, nanos)
        .ok_or_else(|| invalid(format!("timestamp {} out of range", secs)))?;

    Ok(MysqlDateTime {
        year: utc.year() as u16,
        month: utc.month() as u8,
        day: utc.day() as u8,
        hour: utc.hour() as u8,
        minute: utc.minute() as u8,
        second: utc.second() as u8,
        micros,
        fsp,
    })
}

/// NEWDECIMAL 이 차지하는 바이트 수
pub(crate) fn decimal_bin_size(precision: usize, scale: usize) -> usize {
    let integral = precision.saturating_sub(scale);
    (integral / DIG_PER_DEC) * 4
        + COMPRESSED_BYTES[integral % DIG_PER_DEC]
        + (scale / DIG_PER_DEC) * 4
        + COMPRESSED_BYTES[scale % DIG_PER_DEC]
}

/// NEWDECIMAL 바이너리를 10진 문자열로. 사용한 바이트 수를 함께 반환한다.
///
/// 부호 비트가 뒤집혀 저장되고, 음수는 전체 바이트가 반전되어 있다.
pub(crate) fn decode_decimal(
    data: &[u8],
    precision: usize,
    scale: usize,
) -> io::Result<(String, usize)> {
    if scale > precision {
        return Err(invalid(format!(
            "decimal scale {} exceeds precision {}",
            scale, precision
        )));
    }

    let integral = precision - scale;
    let int_words = integral / DIG_PER_DEC;
    let int_leftover = integral % DIG_PER_DEC;
    let frac_words = scale / DIG_PER_DEC;
    let frac_leftover = scale % DIG_PER_DEC;

    let size = decimal_bin_size(precision, scale);
    if size == 0 || data.len() < size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("decimal needs {} bytes, {} remaining", size, data.len()),
        ));
    }

    let mut buf = data[..size].to_vec();
    let negative = buf[0] & 0x80 == 0;
    buf[0] ^= 0x80;
    if negative {
        for b in buf.iter_mut() {
            *b = !*b;
        }
    }

    let mut cursor = Cursor::new(buf.as_slice());
    let mut digits = String::new();

    let leftover_bytes = COMPRESSED_BYTES[int_leftover];
    if leftover_bytes > 0 {
        let _ = write!(digits, "{}", cursor.read_uint_be(leftover_bytes)?);
    }
    for _ in 0..int_words {
        let _ = write!(digits, "{:09}", cursor.read_u32::<BigEndian>()?);
    }

    let mut text = String::with_capacity(precision + 2);
    if negative {
        text.push('-');
    }
    match digits.trim_start_matches('0') {
        "" => text.push('0'),
        trimmed => text.push_str(trimmed),
    }

    if scale > 0 {
        text.push('.');
        for _ in 0..frac_words {
            let _ = write!(text, "{:09}", cursor.read_u32::<BigEndian>()?);
        }
        let leftover_bytes = COMPRESSED_BYTES[frac_leftover];
        if leftover_bytes > 0 {
            let v = cursor.read_uint_be(leftover_bytes)?;
            let _ = write!(text, "{:0width$}", v, width = frac_leftover);
        }
    }

    Ok((text, size))
}
