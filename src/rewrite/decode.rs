//! Content-Encoding decoding for bodies that are about to be rewritten

use std::io::Read;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeBodyError {
    #[error("{encoding} decoding failed: {message}")]
    Failed {
        encoding: &'static str,
        message: String,
    },

    #[error("decoded body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Encodings the rewriter can undo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
}

impl ContentEncoding {
    /// Parse a `Content-Encoding` header value.
    ///
    /// `None` for encodings we cannot decode, including stacked ones such as
    /// `gzip, br`.
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        let Some(value) = value else {
            return Some(ContentEncoding::Identity);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Some(ContentEncoding::Identity),
            "gzip" | "x-gzip" => Some(ContentEncoding::Gzip),
            "deflate" => Some(ContentEncoding::Deflate),
            "br" => Some(ContentEncoding::Brotli),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Deflate => "deflate",
            ContentEncoding::Brotli => "br",
        }
    }

    /// Decode `data`, refusing output larger than `max_size`
    pub fn decode(&self, data: &[u8], max_size: usize) -> Result<Vec<u8>, DecodeBodyError> {
        match self {
            ContentEncoding::Identity => {
                if data.len() > max_size {
                    return Err(DecodeBodyError::TooLarge { limit: max_size });
                }
                Ok(data.to_vec())
            }
            ContentEncoding::Gzip => read_limited(flate2::read::GzDecoder::new(data), *self, max_size),
            // HTTP deflate is zlib-wrapped; some servers send raw deflate
            ContentEncoding::Deflate => {
                match read_limited(flate2::read::ZlibDecoder::new(data), *self, max_size) {
                    Err(DecodeBodyError::Failed { .. }) => {
                        read_limited(flate2::read::DeflateDecoder::new(data), *self, max_size)
                    }
                    other => other,
                }
            }
            ContentEncoding::Brotli => {
                read_limited(brotli::Decompressor::new(data, 4096), *self, max_size)
            }
        }
    }
}

fn read_limited<R: Read>(
    reader: R,
    encoding: ContentEncoding,
    max_size: usize,
) -> Result<Vec<u8>, DecodeBodyError> {
    let mut reader = reader.take(max_size as u64 + 1);
    let mut result = Vec::new();
    reader
        .read_to_end(&mut result)
        .map_err(|e| DecodeBodyError::Failed {
            encoding: encoding.as_str(),
            message: e.to_string(),
        })?;

    if result.len() > max_size {
        return Err(DecodeBodyError::TooLarge { limit: max_size });
    }
    Ok(result)
}
