//! Crate-wide error taxonomy.
//!
//! Compression failures keep their own [`CodecError`] (see `codec`); every
//! other failure is an [`Error`].  Decode errors raised inside a value are
//! wrapped once, at the top of the decode call, in [`Error::Context`] carrying
//! the byte offset at which decoding stopped and the schema path that was
//! being walked.

use std::io;
use thiserror::Error;

use crate::codec::CodecError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// No terminating byte within `max_bytes` groups, or the value overflows
    /// the target width.
    #[error("Malformed varint (limit {max_bytes} bytes)")]
    MalformedVarint { max_bytes: usize },
    #[error("Malformed boolean byte 0x{0:02x}")]
    MalformedBoolean(u8),
    #[error("Invalid UTF-8 in string: {0}")]
    InvalidEncoding(#[from] std::string::FromUtf8Error),
    #[error("Invalid length prefix {0}")]
    InvalidLength(i64),
    #[error("Stream truncated: source exhausted mid-value")]
    TruncatedStream,
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("Incompatible schemas: {0}")]
    IncompatibleSchema(String),
    #[error("Corrupt block at offset {offset}: {reason}")]
    CorruptBlock { offset: u64, reason: String },
    #[error("Unknown enum symbol '{0}'")]
    UnknownEnumSymbol(String),
    #[error("Union member {index} out of range (union has {members} members)")]
    UnknownUnionMember { index: usize, members: usize },
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    #[error("Invalid container header: {0}")]
    InvalidHeader(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("IO error: {0}")]
    Io(io::Error),
    #[error("{source} (at byte {offset}, path '{path}')")]
    Context {
        offset: u64,
        path:   String,
        #[source]
        source: Box<Error>,
    },
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::TruncatedStream
        } else {
            Error::Io(e)
        }
    }
}

impl Error {
    /// The innermost error, looking through any [`Error::Context`] wrapper.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self.root(), Error::TruncatedStream)
    }

    pub fn is_corrupt_block(&self) -> bool {
        matches!(self.root(), Error::CorruptBlock { .. })
    }

    pub fn is_incompatible(&self) -> bool {
        matches!(self.root(), Error::IncompatibleSchema(_))
    }

    pub(crate) fn with_context(self, offset: u64, path: String) -> Self {
        match self {
            already @ Error::Context { .. } => already,
            source => Error::Context { offset, path, source: Box::new(source) },
        }
    }
}

#[inline]
pub(crate) fn mismatch(msg: impl Into<String>) -> Error {
    Error::SchemaMismatch(msg.into())
}

#[inline]
pub(crate) fn incompatible(msg: impl Into<String>) -> Error {
    Error::IncompatibleSchema(msg.into())
}

#[inline]
pub(crate) fn invalid_schema(msg: impl Into<String>) -> Error {
    Error::InvalidSchema(msg.into())
}
