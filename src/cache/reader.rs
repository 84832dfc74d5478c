//! Chunked reader over a cached body file.
//!
//! The file handle is held only while there is data left: it is closed as
//! soon as EOF or a read error is seen, and dropping the reader early (client
//! went away) closes it too.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::error::CacheError;

#[derive(Debug)]
pub struct CacheBody {
    file: Option<File>,
    chunk_size: usize,
    bytes_read: u64,
}

impl CacheBody {
    pub(crate) fn new(file: File, chunk_size: usize) -> Self {
        Self {
            file: Some(file),
            chunk_size: chunk_size.max(1),
            bytes_read: 0,
        }
    }

    /// Next chunk of at most `chunk_size` bytes, `None` once exhausted
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, CacheError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };

        let mut buf = BytesMut::with_capacity(self.chunk_size);
        while buf.len() < self.chunk_size {
            match file.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) => {
                    self.file = None;
                    return Err(CacheError::Io(e));
                }
            }
        }

        if buf.is_empty() {
            self.file = None;
            return Ok(None);
        }
        self.bytes_read += buf.len() as u64;
        Ok(Some(buf.freeze()))
    }

    /// Whether the underlying file is still open
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Single-pass stream of chunks
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, CacheError>> + Send {
        stream::unfold(self, |mut body| async move {
            match body.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), body)),
                Ok(None) => None,
                Err(e) => Some((Err(e), body)),
            }
        })
    }
}
