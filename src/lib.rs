//! A pure-Rust codec for the **lzip** compressed file format: an LZMA-family
//! entropy-coded bitstream framed by a 6-byte member header, CRC32 + size
//! trailer, and support for concatenated members.
//!
//! The streaming [`Encoder`] and [`Decoder`] accept input incrementally and
//! produce output incrementally, in the style of a non-blocking codec: every
//! call returns promptly with however many bytes it could consume/produce.
//! For simpler one-shot use over a `Read`/`Write` pair, see the [`io`]
//! module.
//!
//! ```
//! use lzip_rs::{io, CompressionLevel};
//! use std::io::Cursor;
//!
//! let data = b"hello hello hello world";
//! let mut compressed = Vec::new();
//! io::compress(&mut Cursor::new(&data[..]), &mut compressed, CompressionLevel::Level6).unwrap();
//!
//! let mut decompressed = Vec::new();
//! io::decompress(&mut Cursor::new(&compressed[..]), &mut decompressed).unwrap();
//! assert_eq!(decompressed, data);
//! ```

mod circular_buffer;
mod crc32;
mod decode;
mod encode;
mod error;
mod header;
mod macros;
mod models;

pub mod decoder;
pub mod encoder;
pub mod io;
pub mod level;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{LzipError, Result};
pub use level::{CompressionLevel, EncoderParams};
