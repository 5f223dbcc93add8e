//! One-shot convenience helpers over `Read`/`Write`, per spec §10's ambient
//! ergonomics layer: a thin wrapper around the streaming [`crate::Encoder`]/
//! [`crate::Decoder`], in the spirit of `lzma_rs::lzma_decompress`-style
//! free functions.

use std::io::{Read, Write};

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{LzipError, Result};
use crate::level::CompressionLevel;

const CHUNK_SIZE: usize = 65536;

/// Compresses everything `reader` yields into `writer` at the given level.
pub fn compress<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    level: CompressionLevel,
) -> Result<()> {
    let mut enc = Encoder::new(level.params())?;
    let mut in_buf = [0u8; CHUNK_SIZE];
    let mut out_buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut in_buf)?;
        if n == 0 {
            break;
        }
        let mut offset = 0;
        while offset < n {
            offset += enc.write(&in_buf[offset..n])?;
            drain_encoder(&mut enc, writer, &mut out_buf)?;
        }
    }
    enc.finish()?;
    drain_encoder(&mut enc, writer, &mut out_buf)?;
    Ok(())
}

fn drain_encoder<W: Write>(enc: &mut Encoder, writer: &mut W, buf: &mut [u8]) -> Result<()> {
    loop {
        let n = enc.read(buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
    }
    Ok(())
}

/// Decompresses everything `reader` yields into `writer`. `reader` may hold
/// several concatenated members; all are decoded in sequence.
pub fn decompress<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<()> {
    let mut dec = Decoder::new();
    let mut in_buf = [0u8; CHUNK_SIZE];
    let mut out_buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut in_buf)?;
        if n == 0 {
            break;
        }
        let mut offset = 0;
        while offset < n {
            offset += dec.write(&in_buf[offset..n])?;
            drain_decoder(&mut dec, writer, &mut out_buf)?;
        }
    }
    drain_decoder(&mut dec, writer, &mut out_buf)?;
    if !dec.finished() {
        return Err(match dec.errno() {
            Some(msg) => LzipError::DataError(msg.to_string()),
            None => LzipError::UnexpectedEof("input ended before member trailer".into()),
        });
    }
    Ok(())
}

fn drain_decoder<W: Write>(dec: &mut Decoder, writer: &mut W, buf: &mut [u8]) -> Result<()> {
    loop {
        let n = dec.read(buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn compress_then_decompress_roundtrips() {
        let data = b"one-shot helpers over a Read/Write pair, repeated repeated repeated";
        let mut compressed = Vec::new();
        compress(&mut Cursor::new(&data[..]), &mut compressed, CompressionLevel::Level1).unwrap();
        assert_eq!(&compressed[0..4], b"LZIP");

        let mut decompressed = Vec::new();
        decompress(&mut Cursor::new(&compressed[..]), &mut decompressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn decompress_truncated_input_is_an_error() {
        let data = vec![b'x'; 8192];
        let mut compressed = Vec::new();
        compress(&mut Cursor::new(&data[..]), &mut compressed, CompressionLevel::Level0).unwrap();
        compressed.truncate(compressed.len() - 3);

        let mut decompressed = Vec::new();
        assert!(decompress(&mut Cursor::new(&compressed[..]), &mut decompressed).is_err());
    }
}
