//! Append-only room journal — binary protobuf log.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Strict append only. No mutation, deletion or reordering.
//!   - fsync after every write
//!   - Sequence strictly increasing (validated on append)
//!   - A torn or undecodable frame makes the whole journal unreadable

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;

use crate::proto_types::ProtoEventEnvelope;

const MAX_FRAME: usize = 16 * 1024 * 1024;

pub struct EventStore {
    path: PathBuf,
    last_sequence: u64,
}

impl EventStore {
    /// Open or create a journal. Reads existing frames to find the last
    /// sequence number.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let last_sequence = if path.exists() {
            let events = Self::read_all_from_file(path)?;
            events.last().map(|e| e.sequence).unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            path: path.to_path_buf(),
            last_sequence,
        })
    }

    /// Append one record. Writes a length-prefixed frame and fsyncs.
    pub fn append_event(&mut self, event: &ProtoEventEnvelope) -> io::Result<()> {
        let expected = self.last_sequence + 1;
        if event.sequence != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Sequence violation in journal: expected {}, got {}",
                    expected, event.sequence
                ),
            ));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let buf = event.encode_to_vec();
        let len = u32::try_from(buf.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;

        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&buf)?;
            writer.flush()?;
        }
        file.sync_all()?;

        self.last_sequence = event.sequence;
        Ok(())
    }

    pub fn load_all_events(&self) -> io::Result<Vec<ProtoEventEnvelope>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Self::read_all_from_file(&self.path)
    }

    /// Records with sequence > `after`.
    pub fn load_since(&self, after: u64) -> io::Result<Vec<ProtoEventEnvelope>> {
        Ok(self
            .load_all_events()?
            .into_iter()
            .filter(|e| e.sequence > after)
            .collect())
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all_from_file(path: &Path) -> io::Result<Vec<ProtoEventEnvelope>> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut events: Vec<ProtoEventEnvelope> = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut len_buf = [0u8; 4];
            let got = read_up_to(&mut reader, &mut len_buf)?;
            if got == 0 {
                break;
            }
            if got < len_buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Torn frame header at offset {}", offset),
                ));
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len == 0 || len > MAX_FRAME {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid frame length {} at offset {}", len, offset),
                ));
            }

            let mut frame = vec![0u8; len];
            reader.read_exact(&mut frame).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Truncated frame at offset {}: {}", offset, e),
                )
            })?;

            let event = ProtoEventEnvelope::decode(frame.as_slice()).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Protobuf decode error at offset {}: {}", offset, e),
                )
            })?;

            let expected = events.last().map(|e| e.sequence + 1).unwrap_or(1);
            if event.sequence != expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Out-of-order record at offset {}: expected {}, got {}",
                        offset, expected, event.sequence
                    ),
                ));
            }

            offset += 4 + len as u64;
            events.push(event);
        }

        Ok(events)
    }
}

/// Like `read_exact`, but reports how many bytes were read before EOF.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
