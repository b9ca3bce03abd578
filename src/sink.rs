//! 출력 레코드 sink

use crate::emitter::OutputRecord;
use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// 레코드를 받아 어딘가에 기록하는 대상
pub trait RecordSink {
    fn accept(&mut self, record: &OutputRecord) -> Result<()>;

    /// 버퍼를 비운다. 성공/실패와 상관없이 파싱이 끝나면 호출된다.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 레코드 한 개당 JSON 한 줄
pub struct JsonlSink<W: Write> {
    writer: BufWriter<W>,
    written: usize,
}

impl JsonlSink<File> {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(JsonlSink::new(File::create(path)?))
    }
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        JsonlSink {
            writer: BufWriter::new(writer),
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::BinlogError::IoError(e.error().to_string()))
    }
}

impl<W: Write> RecordSink for JsonlSink<W> {
    fn accept(&mut self, record: &OutputRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// 테스트와 라이브러리 사용자를 위한 메모리 sink
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<OutputRecord>,
}

impl RecordSink for MemorySink {
    fn accept(&mut self, record: &OutputRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// `<out_dir>/<binlog base name>.jsonl`
pub fn output_path(out_dir: &Path, binlog_file: &str) -> PathBuf {
    out_dir.join(format!("{}.jsonl", binlog_file))
}
