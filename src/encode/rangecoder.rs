//! The range encoder: emits range-coded bytes into a circular output
//! buffer with carry propagation via a cached byte and a run-length of
//! pending 0xFF bytes.

use crate::circular_buffer::CircularBuffer;
use crate::models::{self, BitTree, LenModel, Prob};

pub struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u64,
}

impl RangeEncoder {
    pub fn new() -> Self {
        RangeEncoder {
            low: 0,
            range: 0xFFFF_FFFF,
            cache: 0xFF,
            cache_size: 1,
        }
    }

    pub fn reset(&mut self) {
        self.low = 0;
        self.range = 0xFFFF_FFFF;
        self.cache = 0xFF;
        self.cache_size = 1;
    }

    fn shift_low(&mut self, out: &mut CircularBuffer) {
        if (self.low as u32) < 0xFF00_0000 || (self.low >> 32) != 0 {
            let carry = (self.low >> 32) as u8;
            let mut temp = self.cache;
            loop {
                out.put_byte(temp.wrapping_add(carry));
                temp = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low << 8) & 0xFFFF_FFFF;
    }

    fn normalize(&mut self, out: &mut CircularBuffer) {
        if self.range < 0x0100_0000 {
            self.range <<= 8;
            self.shift_low(out);
        }
    }

    pub fn encode_direct_bits(&mut self, value: u32, num_bits: u32, out: &mut CircularBuffer) {
        for i in (0..num_bits).rev() {
            self.range >>= 1;
            let bit = (value >> i) & 1;
            if bit != 0 {
                self.low += self.range as u64;
            }
            self.normalize(out);
        }
    }

    #[inline]
    pub fn encode_bit(&mut self, prob: &mut Prob, bit: bool, out: &mut CircularBuffer) {
        let bound = (self.range >> models::PROB_MODEL_TOTAL_BITS) * (*prob as u32);
        if !bit {
            self.range = bound;
        } else {
            self.low += bound as u64;
            self.range -= bound;
        }
        models::prob_update(prob, bit);
        self.normalize(out);
    }

    pub fn encode_tree(&mut self, tree: &mut BitTree, symbol: u32, out: &mut CircularBuffer) {
        let num_bits = tree.num_bits();
        let probs = tree.probs();
        let mut m: u32 = 1;
        for i in (0..num_bits).rev() {
            let bit = (symbol >> i) & 1 != 0;
            encode_bit_raw(
                &mut self.low,
                &mut self.range,
                &mut probs[m as usize],
                bit,
            );
            self.normalize(out);
            m = (m << 1) | bit as u32;
        }
    }

    pub fn encode_tree_reversed(
        &mut self,
        tree: &mut BitTree,
        symbol: u32,
        out: &mut CircularBuffer,
    ) {
        let num_bits = tree.num_bits();
        let probs = tree.probs();
        self.encode_reversed_in_slice(probs, 0, num_bits, symbol, out);
    }

    pub fn encode_reversed_in_slice(
        &mut self,
        probs: &mut [Prob],
        offset: usize,
        num_bits: u32,
        symbol: u32,
        out: &mut CircularBuffer,
    ) {
        let mut m: usize = 1;
        let mut sym = symbol;
        for _ in 0..num_bits {
            let bit = sym & 1 != 0;
            encode_bit_raw(&mut self.low, &mut self.range, &mut probs[offset + m], bit);
            self.normalize(out);
            m = (m << 1) | bit as usize;
            sym >>= 1;
        }
    }

    pub fn encode_len(
        &mut self,
        lm: &mut LenModel,
        pos_state: usize,
        len: usize,
        out: &mut CircularBuffer,
    ) {
        if len < 8 {
            self.encode_bit(&mut lm.choice1, false, out);
            self.encode_tree(&mut lm.low[pos_state], len as u32, out);
        } else if len < 16 {
            self.encode_bit(&mut lm.choice1, true, out);
            self.encode_bit(&mut lm.choice2, false, out);
            self.encode_tree(&mut lm.mid[pos_state], (len - 8) as u32, out);
        } else {
            self.encode_bit(&mut lm.choice1, true, out);
            self.encode_bit(&mut lm.choice2, true, out);
            self.encode_tree(&mut lm.high, (len - 16) as u32, out);
        }
    }

    /// Flushes the 5 tail bytes that let a decoder drain the final symbols
    /// (mirrors the 5-byte prime consumed at the start of each member).
    pub fn flush(&mut self, out: &mut CircularBuffer) {
        for _ in 0..5 {
            self.shift_low(out);
        }
    }
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn encode_bit_raw(low: &mut u64, range: &mut u32, prob: &mut Prob, bit: bool) {
    let bound = (*range >> models::PROB_MODEL_TOTAL_BITS) * (*prob as u32);
    if !bit {
        *range = bound;
    } else {
        *low += bound as u64;
        *range -= bound;
    }
    models::prob_update(prob, bit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_bits_roundtrip() {
        use crate::decode::rangecoder::RangeDecoder;

        let mut enc = RangeEncoder::new();
        let mut out = CircularBuffer::new(256);
        enc.encode_direct_bits(0b1011_0110, 8, &mut out);
        enc.flush(&mut out);

        let mut dec = RangeDecoder::new();
        dec.try_prime(&mut out).unwrap();
        let value = dec.decode_direct_bits(8, &mut out).unwrap();
        assert_eq!(value, 0b1011_0110);
    }
}
