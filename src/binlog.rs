//! Binlog 파일 프레이밍 검증 및 이벤트 스트림 읽기
//!
//! 헤더: 4 바이트 매직 넘버 (0xfe 0x62 0x69 0x6e)
//! 각 이벤트:
//!   - Timestamp (4 bytes)
//!   - Type (1 byte)
//!   - Server ID (4 bytes)
//!   - Event Length (4 bytes)
//!   - Next Position (4 bytes)
//!   - Flags (2 bytes)
//!   - Event Data (variable)

use crate::error::{BinlogError, Result};
use crate::events::{EventHeader, EventType, RawEvent};
use crate::offset::{BinlogPosition, FIRST_EVENT_POSITION};
use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use tracing::{debug, trace};

pub const BINLOG_MAGIC: [u8; 4] = [0xfe, 0x62, 0x69, 0x6e]; // ".bin" in ASCII
pub const EVENT_HEADER_SIZE: usize = 19;

/// 매직 헤더 검사 시 읽는 최대 바이트 수
const INSPECT_LEN: u64 = 256;

/// Binlog 파일 파서
pub struct BinlogParser;

impl BinlogParser {
    /// Binlog 파일 헤더 검증
    pub fn verify_magic(data: &[u8]) -> Result<()> {
        if data.len() < BINLOG_MAGIC.len() {
            return Err(BinlogError::InvalidFormat(format!(
                "file too short: got {} bytes",
                data.len()
            )));
        }

        if data[0..4] == BINLOG_MAGIC[..] {
            Ok(())
        } else {
            Err(BinlogError::BadMagicHeader {
                observed: hex::encode(&data[0..4]),
            })
        }
    }

    /// 파일 앞부분을 읽어 매직 헤더를 확인하고 커서를 0 으로 되돌린다
    pub fn inspect_magic_header<R: Read + Seek>(reader: &mut R) -> Result<()> {
        let mut buf = Vec::with_capacity(INSPECT_LEN as usize);
        reader.by_ref().take(INSPECT_LEN).read_to_end(&mut buf)?;

        if let Err(err) = Self::verify_magic(&buf) {
            debug!("First {} bytes: {}", buf.len(), hex::encode(&buf));
            return Err(err);
        }

        reader.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// 이벤트 헤더 파싱
    pub fn parse_header(data: &[u8]) -> Result<EventHeader> {
        if data.len() < EVENT_HEADER_SIZE {
            return Err(BinlogError::InvalidFormat(format!(
                "event header too short: {} bytes",
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);

        let timestamp = cursor.read_u32::<LittleEndian>()?;
        let event_type = cursor.read_u8()?;
        let server_id = cursor.read_u32::<LittleEndian>()?;
        let event_length = cursor.read_u32::<LittleEndian>()?;
        let next_pos = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;

        Ok(EventHeader {
            timestamp,
            event_type: EventType::from_u8(event_type),
            server_id,
            event_length,
            next_pos,
            flags,
        })
    }
}

/// 바이트 스트림에서 이벤트를 파일 순서대로 하나씩 꺼내는 리더
///
/// 스트림은 0 바이트 (매직 넘버) 위치에서 시작해야 한다.
pub struct EventReader<R> {
    reader: R,
    position: BinlogPosition,
    started: bool,
    finished: bool,
}

impl<R: Read> EventReader<R> {
    pub fn new(filename: impl Into<String>, reader: R) -> Self {
        EventReader {
            reader,
            position: BinlogPosition::start(filename.into()),
            started: false,
            finished: false,
        }
    }

    /// 다음에 읽을 이벤트의 파일 내 위치
    pub fn current_position(&self) -> &BinlogPosition {
        &self.position
    }

    /// 다음 이벤트를 읽는다. 스트림이 이벤트 경계에서 끝나면 `None`.
    pub fn next_event(&mut self) -> Result<Option<RawEvent>> {
        if self.finished {
            return Ok(None);
        }
        let result = self.read_event();
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    fn read_event(&mut self) -> Result<Option<RawEvent>> {
        if !self.started {
            self.read_magic()?;
            self.started = true;
        }

        let offset = self.position.position;
        let mut header_bytes = [0u8; EVENT_HEADER_SIZE];
        let got = read_full(&mut self.reader, &mut header_bytes)?;
        if got == 0 {
            return Ok(None);
        }
        if got < EVENT_HEADER_SIZE {
            return Err(BinlogError::TruncatedEvent {
                position: offset,
                needed: EVENT_HEADER_SIZE,
                available: got,
            });
        }

        let header = BinlogParser::parse_header(&header_bytes)?;
        let event_length = header.event_length as usize;
        if event_length < EVENT_HEADER_SIZE {
            return Err(BinlogError::MalformedEvent {
                log_pos: header.next_pos,
                event_type: header.event_type.to_string(),
                reason: format!(
                    "event length {} is smaller than the {}-byte header",
                    event_length, EVENT_HEADER_SIZE
                ),
            });
        }

        let body_len = event_length - EVENT_HEADER_SIZE;
        let mut body = Vec::with_capacity(body_len.min(1 << 20));
        (&mut self.reader)
            .take(body_len as u64)
            .read_to_end(&mut body)?;
        if body.len() < body_len {
            return Err(BinlogError::TruncatedEvent {
                position: offset,
                needed: event_length,
                available: EVENT_HEADER_SIZE + body.len(),
            });
        }

        trace!(
            "Event at {}: type={}, length={}, next_pos={}",
            self.position,
            header.event_type,
            header.event_length,
            header.next_pos
        );
        self.position.advance(event_length as u64);

        Ok(Some(RawEvent {
            header,
            header_bytes,
            body: Bytes::from(body),
            offset,
        }))
    }

    fn read_magic(&mut self) -> Result<()> {
        let mut magic = [0u8; 4];
        let got = read_full(&mut self.reader, &mut magic)?;
        if got < magic.len() {
            return Err(BinlogError::InvalidFormat(format!(
                "file too short: got {} bytes",
                got
            )));
        }
        BinlogParser::verify_magic(&magic)?;
        self.position.advance(FIRST_EVENT_POSITION);
        Ok(())
    }
}

impl<R: Read> Iterator for EventReader<R> {
    type Item = Result<RawEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

/// EOF 를 만날 때까지 최대한 채우고 읽은 바이트 수를 반환
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
