//! Binary frame container used by every log file
//!
//! A file is one header followed by fixed-size rows. The header carries
//! the column layout; the row size is derived from it once, which makes
//! row indexing O(1) and lets the reader compute the row count from the
//! remaining file length. Every multi-byte field is little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use neurodaq_core::{DaqError, DaqResult};
use std::io::{Read, Seek, SeekFrom, Write};

/// Current on-disk format version
pub const FORMAT_VERSION: i32 = 1;

/// Name of the synthetic first column holding the pass counter
pub const SAMPLE_COLUMN: &str = "Sample";

/// Name of the synthetic elapsed-time column of source/pipeline files
pub const ELAPSED_COLUMN: &str = "Elapsed_ms";

/// Files never grow past a 32-bit byte count
pub const MAX_FILE_BYTES: u64 = u32::MAX as u64;

/// Parsed or to-be-written file header
#[derive(Debug, Clone, PartialEq)]
pub struct DataHeader {
    /// Format version the file was written with
    pub version: i32,
    /// 3-character ASCII type code ("src", "dat", plugin extension)
    pub type_code: [u8; 3],
    /// Sample rate of the recorded run in Hz
    pub sample_rate: f64,
    /// Number of streams available for playback
    pub playback_streams: i32,
    /// Full column list; always starts with "Sample", followed by
    /// "Elapsed_ms" for source/pipeline files, then the stream names
    pub column_names: Vec<String>,
}

impl DataHeader {
    /// Header for a source/pipeline file: Sample + Elapsed_ms + streams
    pub fn with_elapsed(type_code: &str, sample_rate: f64, stream_names: &[String]) -> DaqResult<Self> {
        let mut columns = Vec::with_capacity(stream_names.len() + 2);
        columns.push(SAMPLE_COLUMN.to_string());
        columns.push(ELAPSED_COLUMN.to_string());
        columns.extend_from_slice(stream_names);
        Self::build(type_code, sample_rate, stream_names.len() as i32, columns)
    }

    /// Header for a plugin file: Sample + streams, no elapsed column
    pub fn plain(type_code: &str, sample_rate: f64, stream_names: &[String]) -> DaqResult<Self> {
        let mut columns = Vec::with_capacity(stream_names.len() + 1);
        columns.push(SAMPLE_COLUMN.to_string());
        columns.extend_from_slice(stream_names);
        Self::build(type_code, sample_rate, stream_names.len() as i32, columns)
    }

    fn build(
        type_code: &str,
        sample_rate: f64,
        playback_streams: i32,
        column_names: Vec<String>,
    ) -> DaqResult<Self> {
        let code = parse_type_code(type_code)?;
        for name in &column_names {
            if !name.is_ascii() || name.contains('\t') {
                return Err(DaqError::FrameFormat {
                    reason: format!("column name '{}' must be ASCII without tabs", name),
                });
            }
        }
        Ok(DataHeader {
            version: FORMAT_VERSION,
            type_code: code,
            sample_rate,
            playback_streams,
            column_names,
        })
    }

    /// Whether rows of this file carry the elapsed-time field
    pub fn has_elapsed(&self) -> bool {
        self.column_names.get(1).map(String::as_str) == Some(ELAPSED_COLUMN)
    }

    /// Number of f64 value columns per row (synthetic columns excluded)
    pub fn value_columns(&self) -> usize {
        let synthetic = 1 + usize::from(self.has_elapsed());
        self.column_names.len().saturating_sub(synthetic)
    }

    /// Fixed byte size of one row
    pub fn row_size(&self) -> u64 {
        let elapsed = if self.has_elapsed() { 8 } else { 0 };
        4 + elapsed + 8 * self.value_columns() as u64
    }

    /// Byte offset of the first data row
    pub fn data_start(&self) -> u64 {
        // version + type code + rate + playback streams + column count + blob length
        let fixed = 4 + 3 + 8 + 4 + 4 + 4;
        fixed + self.names_blob().len() as u64
    }

    fn names_blob(&self) -> Vec<u8> {
        self.column_names.join("\t").into_bytes()
    }

    /// Serialize the header to `writer`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> DaqResult<()> {
        let blob = self.names_blob();
        writer.write_i32::<LittleEndian>(self.version)?;
        writer.write_all(&self.type_code)?;
        writer.write_f64::<LittleEndian>(self.sample_rate)?;
        writer.write_i32::<LittleEndian>(self.playback_streams)?;
        writer.write_i32::<LittleEndian>(self.column_names.len() as i32)?;
        writer.write_i32::<LittleEndian>(blob.len() as i32)?;
        writer.write_all(&blob)?;
        Ok(())
    }

    /// Parse a header from the start of `reader`
    pub fn read_from<R: Read>(reader: &mut R) -> DaqResult<Self> {
        let version = reader.read_i32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(DaqError::FrameFormat {
                reason: format!("unsupported format version {}", version),
            });
        }
        let mut type_code = [0u8; 3];
        reader.read_exact(&mut type_code)?;
        let sample_rate = reader.read_f64::<LittleEndian>()?;
        let playback_streams = reader.read_i32::<LittleEndian>()?;
        let column_count = reader.read_i32::<LittleEndian>()?;
        let blob_len = reader.read_i32::<LittleEndian>()?;
        if column_count < 1 || blob_len < 0 {
            return Err(DaqError::FrameFormat {
                reason: format!(
                    "implausible header: {} columns, {} name bytes",
                    column_count, blob_len
                ),
            });
        }

        let mut blob = vec![0u8; blob_len as usize];
        reader.read_exact(&mut blob)?;
        // Writers only emit ASCII names; reject anything else symmetrically
        let names = match String::from_utf8(blob) {
            Ok(names) if names.is_ascii() => names,
            _ => {
                return Err(DaqError::FrameFormat {
                    reason: "column name blob must be ASCII".into(),
                })
            }
        };
        let column_names: Vec<String> = names.split('\t').map(str::to_string).collect();
        if column_names.len() != column_count as usize {
            return Err(DaqError::FrameFormat {
                reason: format!(
                    "header declares {} columns but names {} of them",
                    column_count,
                    column_names.len()
                ),
            });
        }
        if column_names.first().map(String::as_str) != Some(SAMPLE_COLUMN) {
            return Err(DaqError::FrameFormat {
                reason: "first column must be the synthetic Sample column".into(),
            });
        }

        Ok(DataHeader {
            version,
            type_code,
            sample_rate,
            playback_streams,
            column_names,
        })
    }
}

fn parse_type_code(code: &str) -> DaqResult<[u8; 3]> {
    let bytes = code.as_bytes();
    if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
        return Err(DaqError::FrameFormat {
            reason: format!("type code '{}' must be 3 ASCII characters", code),
        });
    }
    Ok([bytes[0], bytes[1], bytes[2]])
}

/// One decoded data row
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRow {
    /// Pass counter (wraps at the unsigned 32-bit maximum)
    pub counter: u32,
    /// Elapsed milliseconds since the previous row; absent in plugin files
    pub elapsed: Option<f64>,
    /// One value per registered stream, in registration order
    pub values: Vec<f64>,
}

/// Sequential row writer over any byte sink
pub struct FrameWriter<W: Write> {
    writer: W,
    header: DataHeader,
    rows_written: u64,
    bytes_written: u64,
}

impl<W: Write> FrameWriter<W> {
    /// Write the header and return a writer ready for rows
    pub fn new(mut writer: W, header: DataHeader) -> DaqResult<Self> {
        header.write_to(&mut writer)?;
        let bytes_written = header.data_start();
        Ok(FrameWriter {
            writer,
            header,
            rows_written: 0,
            bytes_written,
        })
    }

    /// Append one row. The elapsed field and value count must match the
    /// header layout; a mismatched row is rejected before any byte is
    /// written, so the file never loses alignment.
    pub fn write_row(&mut self, counter: u32, elapsed: Option<f64>, values: &[f64]) -> DaqResult<()> {
        if elapsed.is_some() != self.header.has_elapsed() {
            return Err(DaqError::FrameFormat {
                reason: "row elapsed field doesn't match header layout".into(),
            });
        }
        if values.len() != self.header.value_columns() {
            return Err(DaqError::StreamIntegrity {
                category: "frame",
                expected: self.header.value_columns(),
                actual: values.len(),
            });
        }
        if self.bytes_written + self.header.row_size() > MAX_FILE_BYTES {
            return Err(DaqError::FrameFormat {
                reason: "file would exceed the 32-bit byte-count limit".into(),
            });
        }

        self.writer.write_u32::<LittleEndian>(counter)?;
        if let Some(ms) = elapsed {
            self.writer.write_f64::<LittleEndian>(ms)?;
        }
        for v in values {
            self.writer.write_f64::<LittleEndian>(*v)?;
        }
        self.rows_written += 1;
        self.bytes_written += self.header.row_size();
        Ok(())
    }

    /// Number of rows appended so far
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    /// Flush buffered bytes to the underlying sink
    pub fn flush(&mut self) -> DaqResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and release the underlying writer
    pub fn finish(mut self) -> DaqResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Sequential reader with O(1) row indexing
pub struct FrameReader<R: Read + Seek> {
    reader: R,
    header: DataHeader,
    row_count: u64,
    cursor: u64,
}

impl<R: Read + Seek> FrameReader<R> {
    /// Parse the header and derive the row count from the file length
    pub fn new(mut reader: R) -> DaqResult<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        if file_len > MAX_FILE_BYTES {
            return Err(DaqError::FrameFormat {
                reason: format!("file length {} exceeds the 32-bit byte-count limit", file_len),
            });
        }
        reader.seek(SeekFrom::Start(0))?;
        let header = DataHeader::read_from(&mut reader)?;

        let data_start = header.data_start();
        if file_len < data_start {
            return Err(DaqError::FrameFormat {
                reason: "file is shorter than its own header".into(),
            });
        }
        let data_len = file_len - data_start;
        let row_size = header.row_size();
        if row_size > 0 && data_len % row_size != 0 {
            return Err(DaqError::FrameFormat {
                reason: format!("{} trailing bytes after the last full row", data_len % row_size),
            });
        }
        let row_count = if row_size == 0 { 0 } else { data_len / row_size };

        reader.seek(SeekFrom::Start(data_start))?;
        Ok(FrameReader {
            reader,
            header,
            row_count,
            cursor: 0,
        })
    }

    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    /// Number of complete rows in the file
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Read the next row; past the known row count this is a hard error
    pub fn read_row(&mut self) -> DaqResult<FrameRow> {
        if self.cursor >= self.row_count {
            return Err(DaqError::ReadPastEnd {
                requested: self.cursor,
                available: self.row_count,
            });
        }
        let row = self.decode_row()?;
        self.cursor += 1;
        Ok(row)
    }

    /// Seek to `index` and read that row
    pub fn read_row_at(&mut self, index: u64) -> DaqResult<FrameRow> {
        if index >= self.row_count {
            return Err(DaqError::ReadPastEnd {
                requested: index,
                available: self.row_count,
            });
        }
        let offset = self.header.data_start() + index * self.header.row_size();
        self.reader.seek(SeekFrom::Start(offset))?;
        self.cursor = index;
        self.read_row()
    }

    /// Reset the cursor to the first data row
    pub fn reset(&mut self) -> DaqResult<()> {
        self.reader.seek(SeekFrom::Start(self.header.data_start()))?;
        self.cursor = 0;
        Ok(())
    }

    fn decode_row(&mut self) -> DaqResult<FrameRow> {
        let counter = self.reader.read_u32::<LittleEndian>()?;
        let elapsed = if self.header.has_elapsed() {
            Some(self.reader.read_f64::<LittleEndian>()?)
        } else {
            None
        };
        let mut values = Vec::with_capacity(self.header.value_columns());
        for _ in 0..self.header.value_columns() {
            values.push(self.reader.read_f64::<LittleEndian>()?);
        }
        Ok(FrameRow {
            counter,
            elapsed,
            values,
        })
    }
}
