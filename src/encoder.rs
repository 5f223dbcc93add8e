//! The public streaming `Encoder`: the container orchestrator that holds
//! one [`crate::encode::EncoderBody`] at a time, emits member headers and
//! trailers around it, and exposes the non-blocking `write`/`read` surface
//! described in spec §4.7 and §6.

use crate::circular_buffer::CircularBuffer;
use crate::encode::{EncoderBody, LzEncoderBody};
use crate::error::{LzipError, Result};
use crate::header::{self, Header, Trailer, HEADER_SIZE, TRAILER_SIZE};
use crate::level::EncoderParams;
use crate::macros::lzip_info;

const OUTPUT_BUFFER_CAPACITY: usize = 65536;

const MIN_MATCH_LEN_LIMIT: u32 = 5;
const MAX_MATCH_LEN_LIMIT: u32 = 273;
const MIN_MEMBER_SIZE_LIMIT: u64 = 1 << 12;
const MAX_MEMBER_SIZE_LIMIT: u64 = 1 << 51;

/// Streaming lzip compressor. Feed uncompressed bytes via [`write`], drain
/// compressed bytes via [`read`]; call [`finish`] once no more input is
/// coming for the current member.
pub struct Encoder {
    params: EncoderParams,
    body: EncoderBody,
    out: CircularBuffer,
    fatal: Option<String>,
    finishing: bool,
    member_finished: bool,
    uncompressed_before_member: u64,
    member_total_produced: u64,
    total_in: u64,
    total_out: u64,
}

impl Encoder {
    /// Validates `params`, allocates the encoder body, and emits the first
    /// member's 6-byte header into the output queue immediately.
    pub fn new(params: EncoderParams) -> Result<Self> {
        Self::validate_params(&params)?;

        let body = EncoderBody::new(params.dictionary_size, params.match_len_limit);
        let mut out = CircularBuffer::new(OUTPUT_BUFFER_CAPACITY);
        Self::emit_header(&mut out, params.dictionary_size);

        Ok(Encoder {
            params,
            body,
            out,
            fatal: None,
            finishing: false,
            member_finished: false,
            uncompressed_before_member: 0,
            member_total_produced: HEADER_SIZE as u64,
            total_in: 0,
            total_out: 0,
        })
    }

    fn validate_params(params: &EncoderParams) -> Result<()> {
        if !(MIN_MATCH_LEN_LIMIT..=MAX_MATCH_LEN_LIMIT).contains(&params.match_len_limit) {
            return Err(LzipError::BadArgument(format!(
                "match_len_limit {} out of range [{}, {}]",
                params.match_len_limit, MIN_MATCH_LEN_LIMIT, MAX_MATCH_LEN_LIMIT
            )));
        }
        if !(MIN_MEMBER_SIZE_LIMIT..=MAX_MEMBER_SIZE_LIMIT).contains(&params.member_size_limit) {
            return Err(LzipError::BadArgument(format!(
                "member_size_limit {} out of range [{}, {}]",
                params.member_size_limit, MIN_MEMBER_SIZE_LIMIT, MAX_MEMBER_SIZE_LIMIT
            )));
        }
        if !(header::MIN_DICTIONARY_SIZE..=header::MAX_DICTIONARY_SIZE).contains(&params.dictionary_size) {
            return Err(LzipError::BadArgument(format!(
                "dictionary_size {} out of range [{}, {}]",
                params.dictionary_size,
                header::MIN_DICTIONARY_SIZE,
                header::MAX_DICTIONARY_SIZE
            )));
        }
        Ok(())
    }

    fn emit_header(out: &mut CircularBuffer, dictionary_size: u32) {
        let header = Header {
            version: header::VERSION,
            dictionary_size,
        };
        let mut buf = [0u8; HEADER_SIZE];
        header.write(&mut buf);
        out.write(&buf);
    }

    /// Feeds as much of `buf` into the match finder as fits, returning the
    /// number of bytes accepted. Also drives the encoder opportunistically.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if let Some(msg) = &self.fatal {
            return Err(LzipError::SequenceError(format!(
                "encoder is poisoned by a prior fatal error: {msg}"
            )));
        }
        if self.finishing {
            return Err(LzipError::SequenceError(
                "write called after finish/member size limit reached".into(),
            ));
        }
        let n = self.body.write(buf);
        self.total_in += n as u64;
        self.advance()?;
        Ok(n)
    }

    /// Drains up to `buf.len()` compressed bytes.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.advance()?;
        let n = self.out.read(buf);
        self.total_out += n as u64;
        Ok(n)
    }

    /// Upper bound on how many bytes the next `write` could accept.
    pub fn write_size(&self) -> usize {
        self.body.free_space()
    }

    /// Marks that no more input is coming for the current member: closes
    /// the match finder, drains the encoder, emits the stop marker, flushes
    /// the range coder, and appends the trailer (as output space allows).
    /// Idempotent.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(msg) = &self.fatal {
            return Err(LzipError::SequenceError(format!(
                "encoder is poisoned by a prior fatal error: {msg}"
            )));
        }
        if !self.finishing {
            self.finishing = true;
            self.body.set_finishing();
        }
        self.advance()
    }

    /// Forces a sync-flush marker mid-member: every byte written so far
    /// becomes decodable without waiting for `finish`, at the cost of a
    /// few bytes and a reset range-coder prime. Returns `false` (retry
    /// after draining `read`) if there wasn't room in the output queue.
    pub fn sync_flush(&mut self) -> Result<bool> {
        if let Some(msg) = &self.fatal {
            return Err(LzipError::SequenceError(format!(
                "encoder is poisoned by a prior fatal error: {msg}"
            )));
        }
        if self.finishing || self.member_finished {
            return Err(LzipError::SequenceError(
                "sync_flush called on a finishing/finished member".into(),
            ));
        }
        let before = self.out.used();
        let emitted = self.body.emit_sync_flush(&mut self.out);
        self.member_total_produced += (self.out.used() - before) as u64;
        Ok(emitted)
    }

    /// Starts a new member, reusing the same dictionary size and match
    /// length limit but a fresh `member_size_limit`. Requires the previous
    /// member to have finished.
    pub fn restart_member(&mut self, member_size_limit: u64) -> Result<()> {
        if let Some(msg) = &self.fatal {
            return Err(LzipError::SequenceError(format!(
                "encoder is poisoned by a prior fatal error: {msg}"
            )));
        }
        if !self.member_finished {
            return Err(LzipError::SequenceError(
                "restart_member called before the previous member finished".into(),
            ));
        }
        if !(MIN_MEMBER_SIZE_LIMIT..=MAX_MEMBER_SIZE_LIMIT).contains(&member_size_limit) {
            return Err(LzipError::BadArgument(format!(
                "member_size_limit {} out of range [{}, {}]",
                member_size_limit, MIN_MEMBER_SIZE_LIMIT, MAX_MEMBER_SIZE_LIMIT
            )));
        }

        self.uncompressed_before_member += self.body.uncompressed_position();
        self.params.member_size_limit = member_size_limit;
        self.body = EncoderBody::new(self.params.dictionary_size, self.params.match_len_limit);
        Self::emit_header(&mut self.out, self.params.dictionary_size);
        self.member_total_produced = HEADER_SIZE as u64;
        self.finishing = false;
        self.member_finished = false;
        lzip_info!("member restarted: member_size_limit={}", member_size_limit);
        Ok(())
    }

    /// Advances the state machine as far as currently-buffered input and
    /// free output space allow, without blocking.
    fn advance(&mut self) -> Result<()> {
        if let Some(msg) = &self.fatal {
            return Err(LzipError::SequenceError(format!(
                "encoder is poisoned by a prior fatal error: {msg}"
            )));
        }
        if self.member_finished {
            return Ok(());
        }
        if !self.finishing && self.body.uncompressed_position() >= self.params.member_size_limit {
            self.body.set_finishing();
            self.finishing = true;
        }

        let before = self.out.used();
        let done = self.body.encode(&mut self.out);
        self.member_total_produced += (self.out.used() - before) as u64;

        if done {
            self.try_finalize_member();
        }
        Ok(())
    }

    /// Appends the 20-byte trailer once there's room for it. A no-op
    /// (retried on the next `advance`) if `out` is currently too full.
    fn try_finalize_member(&mut self) {
        if self.out.free() < TRAILER_SIZE {
            return;
        }
        let trailer = Trailer {
            data_crc: self.body.crc(),
            data_size: self.body.uncompressed_position(),
            member_size: self.member_total_produced + TRAILER_SIZE as u64,
        };
        let mut buf = [0u8; TRAILER_SIZE];
        trailer.write(&mut buf);
        self.out.write(&buf);
        self.member_total_produced += TRAILER_SIZE as u64;
        self.member_finished = true;
        lzip_info!(
            "member finished: size={} crc={:#010x}",
            trailer.member_size,
            trailer.data_crc
        );
    }

    pub fn errno(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    /// Whether the whole handle is done: the current member's trailer has
    /// been written and every produced byte has been drained via `read`.
    pub fn finished(&self) -> bool {
        self.finishing && self.member_finished && self.out.empty() && self.fatal.is_none()
    }

    pub fn member_finished(&self) -> bool {
        self.member_finished
    }

    /// Cumulative uncompressed bytes accepted across all members so far.
    pub fn data_position(&self) -> u64 {
        self.uncompressed_before_member + self.body.uncompressed_position()
    }

    /// Uncompressed bytes accepted by the current member.
    pub fn member_position(&self) -> u64 {
        self.body.uncompressed_position()
    }

    pub fn total_in_size(&self) -> u64 {
        self.total_in
    }

    pub fn total_out_size(&self) -> u64 {
        self.total_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::level::CompressionLevel;

    fn drain(enc: &mut Encoder) -> Vec<u8> {
        let mut out = Vec::new();
        let mut scratch = [0u8; 4096];
        loop {
            let n = enc.read(&mut scratch).unwrap();
            out.extend_from_slice(&scratch[..n]);
            if n == 0 {
                break;
            }
        }
        out
    }

    fn decode_all(compressed: &[u8]) -> Vec<u8> {
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
        out
    }

    #[test]
    fn header_is_present_immediately_after_new() {
        let mut enc = Encoder::new(CompressionLevel::Level0.params()).unwrap();
        let mut scratch = [0u8; 6];
        let n = enc.read(&mut scratch).unwrap();
        assert_eq!(n, 6);
        assert_eq!(&scratch[0..4], b"LZIP");
    }

    #[test]
    fn rejects_out_of_range_match_len_limit() {
        let mut params = CompressionLevel::Level6.params();
        params.match_len_limit = 4;
        assert!(matches!(Encoder::new(params), Err(LzipError::BadArgument(_))));
    }

    #[test]
    fn rejects_out_of_range_member_size_limit() {
        let mut params = CompressionLevel::Level6.params();
        params.member_size_limit = 10;
        assert!(matches!(Encoder::new(params), Err(LzipError::BadArgument(_))));
    }

    #[test]
    fn restart_member_before_finished_is_sequence_error() {
        let mut enc = Encoder::new(CompressionLevel::Level0.params()).unwrap();
        enc.write(b"abc").unwrap();
        assert!(matches!(
            enc.restart_member(1 << 20),
            Err(LzipError::SequenceError(_))
        ));
    }

    #[test]
    fn restart_member_produces_two_concatenated_members() {
        let mut enc = Encoder::new(CompressionLevel::Level0.params()).unwrap();
        enc.write(b"first member payload").unwrap();
        enc.finish().unwrap();
        let mut compressed = drain(&mut enc);
        assert!(enc.member_finished());

        enc.restart_member(1 << 20).unwrap();
        enc.write(b"second member payload").unwrap();
        enc.finish().unwrap();
        compressed.extend(drain(&mut enc));
        assert!(enc.finished());

        let decompressed = decode_all(&compressed);
        assert_eq!(decompressed, b"first member payloadsecond member payload");
    }

    #[test]
    fn sync_flush_mid_stream_still_roundtrips() {
        let mut enc = Encoder::new(CompressionLevel::Level0.params()).unwrap();
        enc.write(b"alpha beta gamma ").unwrap();
        while !enc.sync_flush().unwrap() {
            drain(&mut enc);
        }
        enc.write(b"delta epsilon zeta").unwrap();
        enc.finish().unwrap();
        let compressed = drain(&mut enc);

        let decompressed = decode_all(&compressed);
        assert_eq!(decompressed, b"alpha beta gamma delta epsilon zeta");
    }
}
