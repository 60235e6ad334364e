//! Block compression codecs.
//!
//! # Identity rules
//! A codec is identified by the name stored in the container's `avro.codec`
//! metadata entry.  The name is the only identity written to disk; a reader
//! that cannot resolve the name in its [`CodecRegistry`] MUST fail before
//! reading any block.
//!
//! Built-ins: `null` (payload stored verbatim), `deflate` (raw RFC 1951, no
//! zlib header), `zstandard` and `xz`.  User codecs are added with
//! [`CodecRegistry::register`].

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use thiserror::Error;

// ── CodecId enum ─────────────────────────────────────────────────────────────

/// The built-in codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Null,
    Deflate,
    Zstandard,
    Xz,
}

impl CodecId {
    pub const ALL: [CodecId; 4] = [CodecId::Null, CodecId::Deflate, CodecId::Zstandard, CodecId::Xz];

    /// The name written to `avro.codec`.
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Null      => "null",
            CodecId::Deflate   => "deflate",
            CodecId::Zstandard => "zstandard",
            CodecId::Xz        => "xz",
        }
    }

    /// Parse from a metadata value or CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "null" | "none"        => Some(CodecId::Null),
            "deflate"              => Some(CodecId::Deflate),
            "zstandard" | "zstd"   => Some(CodecId::Zstandard),
            "xz"                   => Some(CodecId::Xz),
            _                      => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    /// The file names a codec this registry does not know.
    #[error("Codec '{name}' is not available")]
    UnavailableCodec { name: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    /// The `avro.codec` name.
    fn name(&self) -> &str;

    /// `level` is codec specific; codecs without levels ignore it.
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;

    /// `hint` is the expected decompressed size, when known; it only sizes
    /// the output buffer.
    fn decompress(&self, data: &[u8], hint: Option<usize>) -> Result<Vec<u8>, CodecError>;
}

/// Output buffers never pre-allocate more than this from an untrusted hint.
const MAX_HINT: usize = 16 * 1024 * 1024;

fn output_buffer(hint: Option<usize>, input: usize) -> Vec<u8> {
    Vec::with_capacity(hint.unwrap_or(input.saturating_mul(2)).min(MAX_HINT))
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NullCodec;
impl Codec for NullCodec {
    fn name(&self) -> &str { CodecId::Null.name() }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8], _: Option<usize>) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }
}

pub struct DeflateCodec;
impl Codec for DeflateCodec {
    fn name(&self) -> &str { CodecId::Deflate.name() }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        let mut w = DeflateEncoder::new(Vec::new(), Compression::new(level.clamp(0, 9) as u32));
        w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        w.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], hint: Option<usize>) -> Result<Vec<u8>, CodecError> {
        let mut out = output_buffer(hint, data.len());
        DeflateDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct ZstandardCodec;
impl Codec for ZstandardCodec {
    fn name(&self) -> &str { CodecId::Zstandard.name() }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], hint: Option<usize>) -> Result<Vec<u8>, CodecError> {
        let mut out = output_buffer(hint, data.len());
        zstd::stream::read::Decoder::new(data)
            .and_then(|mut d| d.read_to_end(&mut out))
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct XzCodec;
impl Codec for XzCodec {
    fn name(&self) -> &str { CodecId::Xz.name() }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::xz_compress(&mut io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8], hint: Option<usize>) -> Result<Vec<u8>, CodecError> {
        let mut out = output_buffer(hint, data.len());
        lzma_rs::xz_decompress(&mut io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a CodecId to a built-in codec.
pub fn get_codec(id: CodecId) -> Arc<dyn Codec> {
    match id {
        CodecId::Null      => Arc::new(NullCodec),
        CodecId::Deflate   => Arc::new(DeflateCodec),
        CodecId::Zstandard => Arc::new(ZstandardCodec),
        CodecId::Xz        => Arc::new(XzCodec),
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Name → codec lookup used by readers and writers.
///
/// `Default` holds every built-in codec.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// A registry with no codecs at all, not even `null`.
    pub fn empty() -> Self {
        Self { codecs: HashMap::new() }
    }

    /// Add or replace a codec under its own name.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> &mut Self {
        self.codecs.insert(codec.name().to_string(), codec);
        self
    }

    /// Returns `Err(CodecError::UnavailableCodec)` if `name` is not known.
    /// The caller MUST NOT fall back to any other codec.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Codec>, CodecError> {
        self.codecs
            .get(name)
            .cloned()
            .ok_or_else(|| CodecError::UnavailableCodec { name: name.to_string() })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        for id in CodecId::ALL {
            reg.register(get_codec(id));
        }
        reg
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry").field("codecs", &self.names()).finish()
    }
}
