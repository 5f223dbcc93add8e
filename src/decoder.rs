//! The public streaming `Decoder`: discovers members from the input byte
//! stream, validates headers, drives [`crate::decode::LzDecoder`] per
//! member, and concatenates their output transparently across member
//! boundaries. See spec §4.7 (decoder half) and §6.

use std::collections::VecDeque;

use crate::circular_buffer::CircularBuffer;
use crate::decode::{LzDecoder, StepOutcome};
use crate::error::{LzipError, Result};
use crate::header::{self, Header, HEADER_SIZE};
use crate::macros::lzip_info;

const INPUT_BUFFER_CAPACITY: usize = 65536;

enum Active {
    /// Waiting for enough bytes to parse the next member header.
    AwaitingHeader,
    Decoding(LzDecoder),
}

/// Streaming lzip decompressor. Feed compressed bytes via [`write`], drain
/// decompressed bytes via [`read`]; call them in whatever order and
/// chunk sizes the caller likes.
pub struct Decoder {
    input: CircularBuffer,
    active: Active,
    fatal: Option<String>,
    current_header: Option<Header>,
    total_in: u64,
    total_out_before_member: u64,
    /// A finished member's still-undrained output, moved out of its
    /// `LzDecoder` window before that decoder is replaced. `read` drains
    /// this before falling through to the active member's window.
    pending_output: VecDeque<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Decoder {
            input: CircularBuffer::new(INPUT_BUFFER_CAPACITY),
            active: Active::AwaitingHeader,
            fatal: None,
            current_header: None,
            total_in: 0,
            total_out_before_member: 0,
            pending_output: VecDeque::new(),
        }
    }

    /// Buffers as much of `buf` as fits in the internal input queue,
    /// returning the number of bytes accepted. Also drives decoding
    /// opportunistically.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if let Some(msg) = &self.fatal {
            return Err(LzipError::SequenceError(format!(
                "decoder is poisoned by a prior fatal error: {msg}"
            )));
        }
        let n = self.input.write(buf);
        self.total_in += n as u64;
        self.advance()?;
        Ok(n)
    }

    /// Drains up to `buf.len()` decompressed bytes. Even after a fatal
    /// error, this may still deliver bytes already produced before the
    /// error was latched.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.pending_output.is_empty() {
            let n = self.pending_output.len().min(buf.len());
            for (dst, src) in buf[..n].iter_mut().zip(self.pending_output.drain(..n)) {
                *dst = src;
            }
            return Ok(n);
        }
        let n = if let Active::Decoding(lz) = &mut self.active {
            lz.window.read(buf)
        } else {
            0
        };
        if n == 0 {
            if let Some(msg) = &self.fatal {
                return Err(LzipError::DataError(msg.clone()));
            }
        }
        Ok(n)
    }

    /// Advances the state machine as far as currently-buffered input and
    /// output space allow, without blocking.
    fn advance(&mut self) -> Result<()> {
        loop {
            match &mut self.active {
                Active::AwaitingHeader => {
                    if self.input.used() < HEADER_SIZE {
                        return Ok(());
                    }
                    // Read the header field-by-field rather than via
                    // `Header::parse` on a single 6-byte read, so that on
                    // failure only the bytes past the actual point of
                    // failure are left in `input` (spec §7): none pushed
                    // back for a bad magic (it was never a header), 1 byte
                    // for a bad version, 2 bytes for a bad dictionary-size.
                    let mut magic_buf = [0u8; 4];
                    self.input.read(&mut magic_buf);
                    if magic_buf != header::MAGIC {
                        let e = header::classify_bad_magic(&magic_buf);
                        self.fatal = Some(e.to_string());
                        return Err(e);
                    }

                    let mut version_buf = [0u8; 1];
                    self.input.read(&mut version_buf);
                    let version = version_buf[0];
                    if version != header::VERSION {
                        self.input.unread(1);
                        let e = LzipError::HeaderError(format!("unsupported version {version}"));
                        self.fatal = Some(e.to_string());
                        return Err(e);
                    }

                    let mut dict_buf = [0u8; 1];
                    self.input.read(&mut dict_buf);
                    let dictionary_size = match header::decode_dictionary_size(dict_buf[0]) {
                        Some(d) => d,
                        None => {
                            self.input.unread(2);
                            let e = LzipError::HeaderError("invalid dictionary size byte".into());
                            self.fatal = Some(e.to_string());
                            return Err(e);
                        }
                    };

                    let header = Header { version, dictionary_size };
                    lzip_info!(
                        "member header: version={} dict_size={}",
                        header.version,
                        header.dictionary_size
                    );
                    self.current_header = Some(header);
                    self.active = Active::Decoding(LzDecoder::new(header.dictionary_size as usize));
                }
                Active::Decoding(lz) => match lz.decode(&mut self.input) {
                    Ok(StepOutcome::Continue) => {
                        if lz.member_finished() {
                            self.total_out_before_member += lz.data_position();
                            // `lz` (and its output window) is about to be
                            // dropped in favor of `AwaitingHeader`; move
                            // whatever it still holds into `pending_output`
                            // first so `read` can still deliver it.
                            let mut drain_buf = vec![0u8; lz.window.used()];
                            lz.window.read(&mut drain_buf);
                            self.pending_output.extend(drain_buf);
                            self.active = Active::AwaitingHeader;
                            continue;
                        }
                        return Ok(());
                    }
                    Ok(StepOutcome::NeedInput) | Ok(StepOutcome::NeedOutputSpace) => return Ok(()),
                    Err(e) => {
                        self.fatal = Some(e.to_string());
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Scans buffered input for the next plausible member header,
    /// discarding bytes before it, and clears any latched error. Per spec
    /// §9's open question, the contract preserved here is: a subsequent
    /// `write`+`read` either resumes at the next valid member or surfaces
    /// an error again — not a guarantee about which bytes were skipped.
    pub fn sync_to_member(&mut self) -> Result<bool> {
        self.fatal = None;
        self.active = Active::AwaitingHeader;
        let buffered = self.input.used();
        let mut scratch = vec![0u8; buffered];
        self.input.read(&mut scratch);

        for start in 0..scratch.len() {
            if scratch[start..].starts_with(&header::MAGIC) {
                self.input.write(&scratch[start..]);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Clears latched error state and returns to awaiting the next
    /// member header, discarding any partially-decoded member.
    pub fn reset(&mut self) {
        self.fatal = None;
        self.active = Active::AwaitingHeader;
        self.input.reset();
        self.current_header = None;
        self.pending_output.clear();
    }

    pub fn finished(&self) -> bool {
        matches!(self.active, Active::AwaitingHeader)
            && self.input.empty()
            && self.pending_output.is_empty()
            && self.fatal.is_none()
    }

    pub fn member_finished(&self) -> bool {
        matches!(&self.active, Active::Decoding(lz) if lz.member_finished())
    }

    pub fn member_version(&self) -> Option<u8> {
        self.current_header.map(|h| h.version)
    }

    pub fn dictionary_size(&self) -> Option<u32> {
        self.current_header.map(|h| h.dictionary_size)
    }

    pub fn data_crc(&self) -> Option<u32> {
        match &self.active {
            Active::Decoding(lz) if lz.member_finished() => Some(lz.data_crc()),
            _ => None,
        }
    }

    pub fn data_position(&self) -> u64 {
        match &self.active {
            Active::Decoding(lz) => lz.data_position(),
            Active::AwaitingHeader => 0,
        }
    }

    pub fn total_in_size(&self) -> u64 {
        self.total_in
    }

    pub fn total_out_size(&self) -> u64 {
        self.total_out_before_member + self.data_position()
    }

    pub fn errno(&self) -> Option<&str> {
        self.fatal.as_deref()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::level::CompressionLevel;

    fn compress_all(data: &[u8], level: CompressionLevel) -> Vec<u8> {
        let params = level.params();
        let mut enc = Encoder::new(params).unwrap();
        let mut out = Vec::new();
        let mut scratch = [0u8; 4096];
        let mut offset = 0;
        while offset < data.len() {
            offset += enc.write(&data[offset..]).unwrap();
            loop {
                let n = enc.read(&mut scratch).unwrap();
                out.extend_from_slice(&scratch[..n]);
                if n == 0 {
                    break;
                }
            }
        }
        enc.finish().unwrap();
        loop {
            let n = enc.read(&mut scratch).unwrap();
            out.extend_from_slice(&scratch[..n]);
            if n == 0 {
                break;
            }
        }
        out
    }

    #[test]
    fn roundtrip_small_input() {
        let data = b"hello hello hello world world world";
        let compressed = compress_all(data, CompressionLevel::Level0);
        assert_eq!(&compressed[0..4], b"LZIP");

        let mut dec = Decoder::new();
        let mut out = Vec::new();
        let mut scratch = [0u8; 4096];
        let mut offset = 0;
        while offset < compressed.len() {
            offset += dec.write(&compressed[offset..]).unwrap();
            loop {
                let n = dec.read(&mut scratch).unwrap();
                out.extend_from_slice(&scratch[..n]);
                if n == 0 {
                    break;
                }
            }
        }
        assert_eq!(out, data);
    }

    #[test]
    fn empty_input_roundtrips() {
        let compressed = compress_all(b"", CompressionLevel::Level0);
        let mut dec = Decoder::new();
        dec.write(&compressed).unwrap();
        let mut scratch = [0u8; 16];
        assert_eq!(dec.read(&mut scratch).unwrap(), 0);
    }

    #[test]
    fn truncated_trailer_is_unexpected_eof_like() {
        let data = vec![b'x'; 4096];
        let mut compressed = compress_all(&data, CompressionLevel::Level0);
        compressed.truncate(compressed.len() - 5);

        let mut dec = Decoder::new();
        dec.write(&compressed).unwrap();
        let mut scratch = [0u8; 8192];
        let _ = dec.read(&mut scratch);
        assert!(!dec.finished());
    }

    #[test]
    fn bitflip_in_payload_is_data_error() {
        let data = vec![b'y'; 4096];
        let mut compressed = compress_all(&data, CompressionLevel::Level0);
        let mid = compressed.len() / 2;
        compressed[mid] ^= 0x01;

        let mut dec = Decoder::new();
        let mut scratch = [0u8; 8192];
        let mut saw_error = false;
        for chunk in compressed.chunks(256) {
            if dec.write(chunk).is_err() {
                saw_error = true;
                break;
            }
            if dec.read(&mut scratch).is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
    }
}
