//! Flat, tagged binary serialization of circuits and modules, with
//! read-only views that traverse the serialized bytes without unpacking
//! them.
//!
//! Encoding performs a canonical renumber: live nodes are compacted to the
//! identifiers `0..n` in topological order, so structurally equal circuits
//! serialize to identical bytes. Readers tolerate forward-compatible field
//! addition: every node record is length-prefixed, and unknown trailing
//! bytes are skipped while absent optional fields read as their defaults.

mod encode;
mod format;
mod view;

pub use self::encode::{encode_circuit, encode_module};
pub use self::view::{CircuitView, ModuleView, NodeView};

/// Conventional file extension for a serialized circuit.
pub const CIRCUIT_FILE_EXTENSION: &str = "cfs";
/// Conventional file extension for a serialized module.
pub const MODULE_FILE_EXTENSION: &str = "mfs";
/// Conventional suffix appended to either extension for gzip-compressed
/// files; compression itself is handled by the caller.
pub const COMPRESSED_SUFFIX: &str = "z";

/// Errors raised while encoding, parsing or unpacking a buffer.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("buffer truncated: need {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("bad magic bytes, expected `{expected}`")]
    BadMagic { expected: &'static str },

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("invalid {what} tag {value}")]
    InvalidTag { what: &'static str, value: u8 },

    #[error("malformed buffer: {0}")]
    Malformed(String),

    #[error("string field is not valid utf-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Unpacking rebuilt a graph the object model rejects.
    #[error(transparent)]
    Ir(#[from] fuse_ir::IrError),
}
