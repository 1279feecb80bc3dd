//! Shared, seekable byte stores.
//!
//! Recognizers never consume a caller's stream: they read from an [`Input`],
//! a cheap-to-clone handle over either an in-memory buffer or a shared
//! seekable stream, optionally narrowed to a window. Each [`Input::reader`]
//! starts at offset zero, so a failed decode never disturbs later candidates.
//!
//! # Design Notes
//! - Memory stores are safe for concurrent readers ([`StreamFactoryAccess::Parallel`]).
//! - Stream stores serialize every read behind a lock and seek before each
//!   read ([`StreamFactoryAccess::Reentrant`]).
//! - Non-seekable streams are spooled: into memory up to a limit, then into an
//!   anonymous temporary file.

use crate::context::CancellationToken;
use crate::error::{AnalysisError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

const SPOOL_CHUNK: usize = 64 * 1024;

/// Readable and seekable stream that can move between threads.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// How a stream factory may be used from several threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFactoryAccess {
    /// Streams may be opened and read concurrently.
    Parallel,
    /// Streams may be reopened sequentially, never concurrently.
    Reentrant,
    /// No guarantee; treat as single-threaded.
    Exclusive,
}

impl StreamFactoryAccess {
    /// Whether siblings using this access policy may be analyzed concurrently.
    pub fn allows_parallel(self) -> bool {
        matches!(self, StreamFactoryAccess::Parallel)
    }
}

enum Store {
    Memory(Vec<u8>),
    Stream(Mutex<Box<dyn ReadSeek>>),
}

/// Cheaply clonable handle to a byte range of a store.
#[derive(Clone)]
pub struct Input {
    store: Arc<Store>,
    offset: u64,
    len: u64,
}

impl Input {
    /// Wrap an owned buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            store: Arc::new(Store::Memory(data)),
            offset: 0,
            len,
        }
    }

    /// Copy a slice into a new store.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    /// Wrap a seekable stream; its length is taken from the end position.
    pub fn from_stream(mut stream: Box<dyn ReadSeek>) -> io::Result<Self> {
        let len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;
        Ok(Self {
            store: Arc::new(Store::Stream(Mutex::new(stream))),
            offset: 0,
            len,
        })
    }

    /// Open a filesystem file as a store.
    pub fn open_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_stream(Box::new(file))?)
    }

    /// Drain `reader` into a new store.
    ///
    /// Up to `memory_limit` bytes are kept in memory; longer streams move to
    /// an anonymous temporary file. Cancellation is checked between chunks.
    pub fn spool(
        reader: &mut dyn Read,
        memory_limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut buffer = Vec::new();
        let mut chunk = vec![0u8; SPOOL_CHUNK];
        let mut file: Option<File> = None;

        loop {
            cancel.checkpoint()?;
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            match file.as_mut() {
                Some(f) => f.write_all(&chunk[..n])?,
                None if buffer.len() + n > memory_limit => {
                    let mut f = tempfile::tempfile()?;
                    f.write_all(&buffer)?;
                    f.write_all(&chunk[..n])?;
                    buffer = Vec::new();
                    file = Some(f);
                }
                None => buffer.extend_from_slice(&chunk[..n]),
            }
        }

        match file {
            Some(f) => Ok(Self::from_stream(Box::new(f))?),
            None => Ok(Self::from_vec(buffer)),
        }
    }

    /// Length of the range in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Access policy of the underlying store.
    pub fn access(&self) -> StreamFactoryAccess {
        match *self.store {
            Store::Memory(_) => StreamFactoryAccess::Parallel,
            Store::Stream(_) => StreamFactoryAccess::Reentrant,
        }
    }

    /// Bytes of the range when the store is in memory.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &*self.store {
            Store::Memory(data) => {
                let start = self.offset as usize;
                Some(&data[start..start + self.len as usize])
            }
            Store::Stream(_) => None,
        }
    }

    /// Narrow to `len` bytes starting at `offset` within this range.
    pub fn window(&self, offset: u64, len: u64) -> Result<Input> {
        let end = offset.checked_add(len);
        match end {
            Some(end) if end <= self.len => Ok(Input {
                store: self.store.clone(),
                offset: self.offset + offset,
                len,
            }),
            _ => Err(AnalysisError::TruncatedData {
                offset,
                expected: usize::try_from(len).unwrap_or(usize::MAX),
                actual: usize::try_from(self.len.saturating_sub(offset)).unwrap_or(usize::MAX),
            }),
        }
    }

    /// Read at `pos` within the range; returns 0 at the end.
    pub fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        if pos >= self.len {
            return Ok(0);
        }
        let avail = (self.len - pos).min(buf.len() as u64) as usize;
        let abs = self.offset + pos;
        match &*self.store {
            Store::Memory(data) => {
                let start = abs as usize;
                buf[..avail].copy_from_slice(&data[start..start + avail]);
                Ok(avail)
            }
            Store::Stream(stream) => {
                let mut stream = stream.lock();
                stream.seek(SeekFrom::Start(abs))?;
                let mut filled = 0;
                while filled < avail {
                    match stream.read(&mut buf[filled..avail]) {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(filled)
            }
        }
    }

    /// Fill `buf` from `pos`, failing on a short read.
    pub fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(pos, buf)?;
        if n < buf.len() {
            return Err(AnalysisError::TruncatedData {
                offset: pos,
                expected: buf.len(),
                actual: n,
            });
        }
        Ok(())
    }

    /// Up to `max` bytes from the start of the range.
    pub fn header(&self, max: usize) -> io::Result<Vec<u8>> {
        let want = (self.len.min(max as u64)) as usize;
        let mut buf = vec![0u8; want];
        let n = self.read_at(0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Whole range as a vector.
    pub fn to_vec(&self) -> io::Result<Vec<u8>> {
        if let Some(bytes) = self.as_bytes() {
            return Ok(bytes.to_vec());
        }
        let len = usize::try_from(self.len)
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "input too large"))?;
        self.header(len)
    }

    /// Independent reader positioned at the start of the range.
    pub fn reader(&self) -> InputReader {
        InputReader {
            input: self.clone(),
            pos: 0,
        }
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("access", &self.access())
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Cursor over an [`Input`].
pub struct InputReader {
    input: Input,
    pos: u64,
}

impl InputReader {
    /// Current position.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.input.read_at(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for InputReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.input.len.checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        match target {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of input",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_window_reads() {
        let input = Input::from_slice(b"0123456789");
        let window = input.window(2, 5).unwrap();
        assert_eq!(window.len(), 5);
        assert_eq!(window.to_vec().unwrap(), b"23456");
        assert_eq!(window.as_bytes(), Some(&b"23456"[..]));
        assert!(input.window(8, 5).is_err());
    }

    #[test]
    fn test_stream_store_is_reentrant() {
        let stream = Cursor::new(b"abcdef".to_vec());
        let input = Input::from_stream(Box::new(stream)).unwrap();
        assert_eq!(input.access(), StreamFactoryAccess::Reentrant);
        let mut buf = [0u8; 3];
        input.read_exact_at(2, &mut buf).unwrap();
        assert_eq!(&buf, b"cde");
        assert!(input.read_exact_at(4, &mut buf).is_err());
    }

    #[test]
    fn test_readers_are_independent() {
        let input = Input::from_slice(b"hello world");
        let mut a = input.reader();
        let mut first = [0u8; 5];
        a.read_exact(&mut first).unwrap();

        let mut b = input.reader();
        let mut again = String::new();
        b.read_to_string(&mut again).unwrap();
        assert_eq!(&first, b"hello");
        assert_eq!(again, "hello world");

        a.seek(SeekFrom::End(-5)).unwrap();
        let mut tail = String::new();
        a.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "world");
    }

    #[test]
    fn test_spool_small_stays_in_memory() {
        let token = CancellationToken::new();
        let mut reader = Cursor::new(vec![7u8; 100]);
        let input = Input::spool(&mut reader, 1024, &token).unwrap();
        assert_eq!(input.access(), StreamFactoryAccess::Parallel);
        assert_eq!(input.len(), 100);
    }

    #[test]
    fn test_spool_large_moves_to_file() {
        let token = CancellationToken::new();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = Cursor::new(data.clone());
        let input = Input::spool(&mut reader, 1024, &token).unwrap();
        assert_eq!(input.access(), StreamFactoryAccess::Reentrant);
        assert_eq!(input.to_vec().unwrap(), data);
    }

    #[test]
    fn test_spool_observes_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let mut reader = Cursor::new(vec![0u8; 10]);
        let err = Input::spool(&mut reader, 1024, &token).unwrap_err();
        assert!(err.is_fatal());
    }
}
