//! Crate-wide error taxonomy.
//!
//! lzip's reference implementation reports failures through a small set of
//! `enum Lzip_errno` values (`LZ_ok`, `LZ_bad_argument`, `LZ_mem_error`,
//! `LZ_sequence_error`, `LZ_header_error`, `LZ_unexpected_eof`,
//! `LZ_data_error`, `LZ_library_error`). `LzipError` below mirrors that
//! taxonomy one-to-one as a `thiserror` enum; `ok` is simply `Result::Ok` and
//! has no variant here.

use std::io;

/// A fatal or transient error raised by the encoder or decoder.
#[derive(thiserror::Error, Debug)]
pub enum LzipError {
    /// Invalid constructor arguments, or an operation misused relative to
    /// the handle's current state (the non-sequencing cases of misuse).
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// Allocation failure (surfaced for parity with the taxonomy; this
    /// implementation otherwise relies on the allocator aborting the
    /// process on true OOM, as idiomatic Rust code does).
    #[error("memory allocation error: {0}")]
    MemError(String),

    /// Operation invalid in the handle's current state, e.g. calling
    /// `restart_member` before the previous member finished.
    #[error("sequence error: {0}")]
    SequenceError(String),

    /// Invalid magic, unsupported version, or invalid dictionary-size field
    /// at member start.
    #[error("header error: {0}")]
    HeaderError(String),

    /// The stream ended before a member's header or trailer was fully read.
    #[error("unexpected end of stream: {0}")]
    UnexpectedEof(String),

    /// Trailer mismatch, out-of-range distance, invalid marker use, or a
    /// corrupted member discovered mid-stream.
    #[error("data error: {0}")]
    DataError(String),

    /// Internal invariant failure. Fatal and not recoverable for this
    /// handle.
    #[error("library error: {0}")]
    LibraryError(String),

    /// Wraps an I/O failure from the one-shot `Read`/`Write` helpers in
    /// [`crate::io_helpers`].
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LzipError {
    /// Whether this error poisons the handle: subsequent `read`/`write`
    /// calls must also fail (though `read` may still drain bytes already
    /// produced into the output window before the error was latched).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LzipError::BadArgument(_))
    }
}

pub type Result<T> = std::result::Result<T, LzipError>;
