//! Transport compression applied to stored payloads.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Compression algorithm.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
    Bzip2,
}

impl Compression {
    /// Sniff the leading bytes of a payload.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(GZIP_MAGIC) {
            Compression::Gzip
        } else if data.starts_with(ZSTD_MAGIC) {
            Compression::Zstd
        } else if data.starts_with(BZIP2_MAGIC) {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }

    /// Map a `Content-Encoding` value. Unknown or identity encodings give `None`.
    pub fn from_content_encoding(encoding: &str) -> Option<Self> {
        match encoding.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Compression::Gzip),
            "zstd" => Some(Compression::Zstd),
            "bzip2" | "x-bzip2" => Some(Compression::Bzip2),
            _ => None,
        }
    }

    /// Map an object path suffix such as `.json.bz2`.
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with(".gz") {
            Some(Compression::Gzip)
        } else if path.ends_with(".zst") {
            Some(Compression::Zstd)
        } else if path.ends_with(".bz2") {
            Some(Compression::Bzip2)
        } else {
            None
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
            Compression::Bzip2 => "bzip2",
        };
        f.write_str(s)
    }
}

/// Compress data using the specified algorithm.
pub fn compress(data: &[u8], algorithm: Compression) -> Result<Vec<u8>, DecodeError> {
    match algorithm {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => compress_gzip(data),
        Compression::Zstd => compress_zstd(data),
        Compression::Bzip2 => compress_bzip2(data),
    }
}

/// Decompress data using the specified algorithm.
pub fn decompress(data: &[u8], algorithm: Compression) -> Result<Vec<u8>, DecodeError> {
    match algorithm {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => decompress_gzip(data),
        Compression::Zstd => decompress_zstd(data),
        Compression::Bzip2 => decompress_bzip2(data),
    }
}

fn failed(compression: Compression, what: &str, e: std::io::Error) -> DecodeError {
    DecodeError {
        compression,
        cause: format!("{} failed: {}", what, e),
    }
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| failed(Compression::Gzip, "Gzip write", e))?;
    encoder
        .finish()
        .map_err(|e| failed(Compression::Gzip, "Gzip finish", e))
}

fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| failed(Compression::Gzip, "Gzip read", e))?;
    Ok(output)
}

fn compress_zstd(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)
        .map_err(|e| failed(Compression::Zstd, "Zstd compression", e))?;
    encoder
        .write_all(data)
        .map_err(|e| failed(Compression::Zstd, "Zstd write", e))?;
    encoder
        .finish()
        .map_err(|e| failed(Compression::Zstd, "Zstd finish", e))
}

fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = zstd::Decoder::new(data)
        .map_err(|e| failed(Compression::Zstd, "Zstd decompression", e))?;
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| failed(Compression::Zstd, "Zstd read", e))?;
    Ok(output)
}

fn compress_bzip2(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
    encoder
        .write_all(data)
        .map_err(|e| failed(Compression::Bzip2, "Bzip2 write", e))?;
    encoder
        .finish()
        .map_err(|e| failed(Compression::Bzip2, "Bzip2 finish", e))
}

fn decompress_bzip2(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = bzip2::read::BzDecoder::new(data);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| failed(Compression::Bzip2, "Bzip2 read", e))?;
    Ok(output)
}
