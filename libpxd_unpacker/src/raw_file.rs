//! Reader for ONSEN network-dump files.
//!
//! A dump is a plain concatenation of event packets as they came off the
//! ONSEN link: an 8-byte header (big-endian magic and frame count), the
//! frame-length table (one big-endian u32 per frame) and the frame payloads,
//! each padded to a 32-bit boundary. Each [`next_event`](RawFile::next_event)
//! call returns one complete packet, exactly as the unpacker expects it.

use byteorder::{BigEndian, ReadBytesExt};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::constants::{MAX_FRAMES_PER_EVENT, ONSEN_MAGIC};
use super::error::RawFileError;
use super::wire;

#[derive(Debug)]
pub struct RawFile {
    file_handle: File,
    #[allow(dead_code)]
    file_path: PathBuf,
    size_bytes: u64,
    bytes_read: u64,
    events_read: u64,
}

impl RawFile {
    /// Open a dump file in read-only mode.
    pub fn new(path: &Path) -> Result<Self, RawFileError> {
        if !path.exists() {
            return Err(RawFileError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let size_bytes = file.metadata()?.len();
        Ok(Self {
            file_handle: file,
            file_path: path.to_path_buf(),
            size_bytes,
            bytes_read: 0,
            events_read: 0,
        })
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    /// Read the next event packet. Returns `None` at a clean end of file;
    /// a file ending inside an event is an error.
    pub fn next_event(&mut self) -> Result<Option<Vec<u8>>, RawFileError> {
        let magic = match self.file_handle.read_u32::<BigEndian>() {
            Ok(word) => word,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(RawFileError::IOError(e)),
        };
        if magic != ONSEN_MAGIC {
            return Err(RawFileError::BadMagic(magic));
        }

        let frame_count = self
            .file_handle
            .read_u32::<BigEndian>()
            .map_err(eof_as_truncated)?;
        if frame_count > MAX_FRAMES_PER_EVENT {
            return Err(RawFileError::TooManyFrames(frame_count));
        }

        let mut event = Vec::new();
        event.extend_from_slice(&magic.to_be_bytes());
        event.extend_from_slice(&frame_count.to_be_bytes());

        let mut payload_len = 0usize;
        for _ in 0..frame_count {
            let frame_len = self
                .file_handle
                .read_u32::<BigEndian>()
                .map_err(eof_as_truncated)?;
            event.extend_from_slice(&frame_len.to_be_bytes());
            payload_len += wire::round_up_to_4(frame_len as usize);
        }

        let table_end = event.len();
        event.resize(table_end + payload_len, 0);
        self.file_handle
            .read_exact(&mut event[table_end..])
            .map_err(eof_as_truncated)?;

        self.bytes_read += event.len() as u64;
        self.events_read += 1;
        Ok(Some(event))
    }
}

fn eof_as_truncated(e: std::io::Error) -> RawFileError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        RawFileError::Truncated
    } else {
        RawFileError::IOError(e)
    }
}
