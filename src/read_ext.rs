//! 이벤트 본문 바이트 읽기 헬퍼
//!
//! 모든 읽기는 남은 길이를 먼저 확인하므로 잘못된 길이 값이 들어와도
//! 패닉이나 과도한 할당 없이 `UnexpectedEof` 로 끝난다.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};

fn eof(needed: usize, available: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("need {} bytes, {} remaining", needed, available),
    )
}

fn too_wide(nbytes: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{}-byte integer does not fit in u64", nbytes),
    )
}

pub trait CursorExt {
    /// 커서 뒤에 남은 바이트 수
    fn remaining(&self) -> usize;

    /// 현재 오프셋 (이벤트 본문 기준)
    fn offset(&self) -> usize;

    fn skip(&mut self, len: usize) -> io::Result<()>;

    fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>>;

    /// Length-encoded integer (0xfb 는 NULL 표시라 row 이벤트에서는 허용하지 않는다)
    fn read_lenenc_int(&mut self) -> io::Result<u64>;

    /// 1바이트 길이 + 본문 형태의 문자열
    fn read_u8_prefixed_string(&mut self) -> io::Result<String>;

    /// Big-endian 부호 없는 정수 (0..=8 바이트)
    fn read_uint_be(&mut self, nbytes: usize) -> io::Result<u64>;

    /// Little-endian 부호 없는 정수 (0..=8 바이트)
    fn read_uint_le(&mut self, nbytes: usize) -> io::Result<u64>;
}

impl CursorExt for Cursor<&[u8]> {
    fn remaining(&self) -> usize {
        self.get_ref().len().saturating_sub(self.position() as usize)
    }

    fn offset(&self) -> usize {
        self.position() as usize
    }

    fn skip(&mut self, len: usize) -> io::Result<()> {
        let available = self.remaining();
        if len > available {
            return Err(eof(len, available));
        }
        self.set_position(self.position() + len as u64);
        Ok(())
    }

    fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let available = self.remaining();
        if len > available {
            return Err(eof(len, available));
        }
        let start = self.offset();
        let bytes = self.get_ref()[start..start + len].to_vec();
        self.set_position((start + len) as u64);
        Ok(bytes)
    }

    fn read_lenenc_int(&mut self) -> io::Result<u64> {
        let first = self.read_u8()?;
        match first {
            0..=0xfa => Ok(first as u64),
            0xfc => Ok(self.read_u16::<LittleEndian>()? as u64),
            0xfd => Ok(self.read_u24::<LittleEndian>()? as u64),
            0xfe => self.read_u64::<LittleEndian>(),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid length-encoded integer prefix 0x{:02x}", first),
            )),
        }
    }

    fn read_u8_prefixed_string(&mut self) -> io::Result<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_uint_be(&mut self, nbytes: usize) -> io::Result<u64> {
        if nbytes == 0 {
            return Ok(0);
        }
        if nbytes > 8 {
            return Err(too_wide(nbytes));
        }
        let available = self.remaining();
        if nbytes > available {
            return Err(eof(nbytes, available));
        }
        self.read_uint::<byteorder::BigEndian>(nbytes)
    }

    fn read_uint_le(&mut self, nbytes: usize) -> io::Result<u64> {
        if nbytes == 0 {
            return Ok(0);
        }
        if nbytes > 8 {
            return Err(too_wide(nbytes));
        }
        let available = self.remaining();
        if nbytes > available {
            return Err(eof(nbytes, available));
        }
        self.read_uint::<LittleEndian>(nbytes)
    }
}

/// 비트맵에서 idx 번째 비트 (LSB 우선)
pub fn bit_is_set(bitmap: &[u8], idx: usize) -> bool {
    bitmap
        .get(idx / 8)
        .map(|b| b & (1 << (idx % 8)) != 0)
        .unwrap_or(false)
}

pub fn count_set_bits(bitmap: &[u8], bits: usize) -> usize {
    (0..bits).filter(|&i| bit_is_set(bitmap, i)).count()
}

pub fn bitmap_len(bits: usize) -> usize {
    bits.div_ceil(8)
}
