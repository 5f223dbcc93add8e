//! The fast, single-position greedy encoder used only for level 0
//! (`dictionary_size == 65535, match_len_limit == 16`). See spec §4.6.

use super::rangecoder::RangeEncoder;
use crate::circular_buffer::CircularBuffer;
use crate::crc32::Crc32;
use crate::models::{self, LzModels};

const HASH_BITS: u32 = 17;
const HASH_SIZE: usize = 1 << HASH_BITS;
const NIL: i64 = -1;

pub(crate) struct FastEncoder {
    buffer: Vec<u8>,
    hash: Vec<i64>,
    dictionary_size: usize,
    match_len_limit: usize,
    pos: usize,
    stream_pos: usize,
    at_stream_end: bool,
    flushed: bool,
    base_offset: u64,

    models: LzModels,
    rc: RangeEncoder,
    state: usize,
    rep: [u32; 4],
    crc: Crc32,
}

impl FastEncoder {
    pub fn new(dictionary_size: usize) -> Self {
        let before_size = 8192usize;
        let after_size = before_size + 2 * models::MAX_MATCH_LEN + 1;
        let buffer_size = 16 * dictionary_size + before_size + after_size;
        FastEncoder {
            buffer: vec![0u8; buffer_size],
            hash: vec![NIL; HASH_SIZE],
            dictionary_size,
            match_len_limit: 16,
            pos: 0,
            stream_pos: 0,
            at_stream_end: false,
            flushed: false,
            base_offset: 0,
            models: LzModels::new(),
            rc: RangeEncoder::new(),
            state: 0,
            rep: [0; 4],
            crc: Crc32::new(),
        }
    }

    fn avail(&self) -> usize {
        self.stream_pos - self.pos
    }

    fn hash_at(&self, pos: usize) -> usize {
        let b0 = self.buffer[pos] as u32;
        let b1 = self.buffer[pos + 1] as u32;
        let b2 = self.buffer[pos + 2] as u32;
        let b3 = self.buffer[pos + 3] as u32;
        let h = (b0 << 24) ^ (b1 << 16) ^ (b2 << 8) ^ b3;
        (h.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
    }

    fn match_len(&self, a: usize, b: usize, max_len: usize) -> usize {
        let mut len = 0;
        while len < max_len && self.buffer[a + len] == self.buffer[b + len] {
            len += 1;
        }
        len
    }

    fn rep_len(&self, rep_dist: u32, max_len: usize) -> usize {
        let dist = rep_dist as usize + 1;
        if dist > self.pos {
            return 0;
        }
        self.match_len(self.pos - dist, self.pos, max_len)
    }

    fn pos_state(&self) -> usize {
        (self.pos as u64 & models::POS_STATE_MASK as u64) as usize
    }

    fn emit_literal(&mut self, byte: u8, out: &mut CircularBuffer) {
        let pos_state = self.pos_state();
        let is_match_idx = self.state * models::NUM_POS_STATES + pos_state;
        self.rc.encode_bit(&mut self.models.is_match[is_match_idx], false, out);

        let prev_byte = if self.pos == 0 { 0 } else { self.buffer[self.pos - 1] };
        let lit_state = (prev_byte >> (8 - models::LITERAL_CONTEXT_BITS)) as usize;
        let probs = &mut self.models.literal_probs[lit_state];

        if models::is_literal_state(self.state) {
            // Encode the 8 bits of `byte`, MSB first, through the
            // literal-coder bit-tree addressed by the running `symbol`.
            let mut symbol: u32 = 1;
            for i in (0..8).rev() {
                let bit = (byte >> i) & 1 != 0;
                self.rc.encode_bit(&mut probs[symbol as usize], bit, out);
                symbol = (symbol << 1) | bit as u32;
            }
        } else {
            let mut match_byte = self.buffer[self.pos - self.rep[0] as usize - 1] as u32;
            let mut symbol: u32 = 1;
            for i in (0..8).rev() {
                let match_bit = (match_byte >> 7) & 1;
                match_byte <<= 1;
                let bit = (byte >> i) & 1 != 0;
                let idx = ((1 + match_bit) << 8) + symbol;
                self.rc.encode_bit(&mut probs[idx as usize], bit, out);
                symbol = (symbol << 1) | bit as u32;
                if match_bit != bit as u32 {
                    // remaining bits fall back to the plain literal tree
                    for j in (0..i).rev() {
                        let bit2 = (byte >> j) & 1 != 0;
                        self.rc.encode_bit(&mut probs[symbol as usize], bit2, out);
                        symbol = (symbol << 1) | bit2 as u32;
                    }
                    break;
                }
            }
        }
        self.state = models::state_after_literal(self.state);
    }

    fn emit_short_rep(&mut self, out: &mut CircularBuffer) {
        let pos_state = self.pos_state();
        let is_match_idx = self.state * models::NUM_POS_STATES + pos_state;
        self.rc.encode_bit(&mut self.models.is_match[is_match_idx], true, out);
        self.rc.encode_bit(&mut self.models.is_rep[self.state], true, out);
        self.rc.encode_bit(&mut self.models.is_rep_g0[self.state], false, out);
        let idx = self.state * models::NUM_POS_STATES + pos_state;
        self.rc.encode_bit(&mut self.models.is_rep0_long[idx], false, out);
        self.state = models::state_after_short_rep(self.state);
    }

    fn emit_rep_match(&mut self, rep_index: usize, len: usize, out: &mut CircularBuffer) {
        let pos_state = self.pos_state();
        let is_match_idx = self.state * models::NUM_POS_STATES + pos_state;
        self.rc.encode_bit(&mut self.models.is_match[is_match_idx], true, out);
        self.rc.encode_bit(&mut self.models.is_rep[self.state], true, out);

        if rep_index == 0 {
            self.rc.encode_bit(&mut self.models.is_rep_g0[self.state], false, out);
            let idx = self.state * models::NUM_POS_STATES + pos_state;
            self.rc.encode_bit(&mut self.models.is_rep0_long[idx], true, out);
        } else {
            self.rc.encode_bit(&mut self.models.is_rep_g0[self.state], true, out);
            if rep_index == 1 {
                self.rc.encode_bit(&mut self.models.is_rep_g1[self.state], false, out);
            } else {
                self.rc.encode_bit(&mut self.models.is_rep_g1[self.state], true, out);
                self.rc
                    .encode_bit(&mut self.models.is_rep_g2[self.state], rep_index == 3, out);
            }
            let dist = self.rep[rep_index];
            for i in (0..rep_index).rev() {
                self.rep[i + 1] = self.rep[i];
            }
            self.rep[0] = dist;
        }

        self.rc
            .encode_len(&mut self.models.rep_len_decoder, pos_state, len - models::MIN_MATCH_LEN, out);
        self.state = models::state_after_rep(self.state);
    }

    fn emit_match(&mut self, dist: u32, len: usize, out: &mut CircularBuffer) {
        let pos_state = self.pos_state();
        let is_match_idx = self.state * models::NUM_POS_STATES + pos_state;
        self.rc.encode_bit(&mut self.models.is_match[is_match_idx], true, out);
        self.rc.encode_bit(&mut self.models.is_rep[self.state], false, out);

        self.rep[3] = self.rep[2];
        self.rep[2] = self.rep[1];
        self.rep[1] = self.rep[0];
        self.rep[0] = dist;

        self.rc
            .encode_len(&mut self.models.len_decoder, pos_state, len - models::MIN_MATCH_LEN, out);
        let len_state = models::len_to_dist_state(len - models::MIN_MATCH_LEN);
        encode_distance(&mut self.rc, &mut self.models, len_state, dist, out);
        self.state = models::state_after_match(self.state);
    }

    fn consume(&mut self, n: usize) {
        for i in 0..n {
            self.crc.update_byte(self.buffer[self.pos + i]);
        }
        self.pos += n;
    }

    fn normalize_if_needed(&mut self) {
        let before_size = 8192;
        if self.pos < before_size + self.dictionary_size + 2 * models::MAX_MATCH_LEN {
            return;
        }
        let offset = self.pos - before_size - self.dictionary_size;
        self.buffer.copy_within(offset..self.stream_pos, 0);
        self.stream_pos -= offset;
        self.pos -= offset;
        self.base_offset += offset as u64;
        for slot in self.hash.iter_mut() {
            if *slot >= 0 {
                *slot = (*slot - offset as i64).max(NIL);
            }
        }
    }
}

/// Shared by the fast and normal encoders: emits a 0-based distance via
/// the distance-slot tree and any footer/align bits.
pub(crate) fn encode_distance(
    rc: &mut RangeEncoder,
    models: &mut LzModels,
    len_state: usize,
    dist: u32,
    out: &mut CircularBuffer,
) {
    let slot = models::dist_to_slot(dist);
    rc.encode_tree(&mut models.pos_slot_decoder[len_state], slot, out);
    if slot < models::START_DIST_MODEL_INDEX as u32 {
        return;
    }
    let footer_bits = models::slot_footer_bits(slot);
    let base = models::slot_base(slot);
    let footer = dist - base;
    if slot < models::END_DIST_MODEL_INDEX as u32 {
        let offset = models::pos_decoders_offset(slot);
        rc.encode_reversed_in_slice(&mut models.pos_decoders, offset, footer_bits, footer, out);
    } else {
        rc.encode_direct_bits(footer >> models::ALIGN_BITS, footer_bits - models::ALIGN_BITS, out);
        rc.encode_tree_reversed(
            &mut models.align_decoder,
            footer & (models::DIST_ALIGN_SIZE as u32 - 1),
            out,
        );
    }
}

impl super::LzEncoderBody for FastEncoder {
    fn write(&mut self, src: &[u8]) -> usize {
        let free = self.buffer.len() - self.stream_pos;
        let n = src.len().min(free);
        self.buffer[self.stream_pos..self.stream_pos + n].copy_from_slice(&src[..n]);
        self.stream_pos += n;
        n
    }

    fn free_space(&self) -> usize {
        self.buffer.len() - self.stream_pos
    }

    fn set_finishing(&mut self) {
        self.at_stream_end = true;
    }

    fn encode(&mut self, out: &mut CircularBuffer) -> bool {
        loop {
            let avail = self.avail();
            if avail == 0 {
                if !self.at_stream_end {
                    return false;
                }
                if self.flushed {
                    return true;
                }
                if out.free() < 32 {
                    return false;
                }
                let pos_state = self.pos_state();
                encode_distance_marker_stop(&mut self.rc, &mut self.models, self.state, pos_state, out);
                self.rc.flush(out);
                self.flushed = true;
                return true;
            }
            if !self.at_stream_end && avail < 4 + self.match_len_limit {
                // Wait for more lookahead unless this is the final flush.
                return false;
            }
            // Leave headroom in `out` so a single symbol never straddles
            // a caller's drain; the container orchestrator keeps this
            // buffer large enough that this practically never stalls.
            if out.free() < 32 {
                return false;
            }

            if avail < 4 {
                let byte = self.buffer[self.pos];
                self.emit_literal(byte, out);
                self.consume(1);
                continue;
            }

            let max_len = avail.min(self.match_len_limit);
            let h = self.hash_at(self.pos);
            let candidate = self.hash[h];
            self.hash[h] = self.pos as i64;

            let hash_len = if candidate >= 0 && (self.pos as i64 - candidate - 1) < self.dictionary_size as i64
            {
                self.match_len(candidate as usize, self.pos, max_len)
            } else {
                0
            };
            let hash_dist = if candidate >= 0 {
                (self.pos as i64 - candidate - 1) as u32
            } else {
                0
            };

            let mut best_rep_idx = 0usize;
            let mut best_rep_len = 0usize;
            for (i, &r) in self.rep.iter().enumerate() {
                let l = self.rep_len(r, max_len);
                if l > best_rep_len {
                    best_rep_len = l;
                    best_rep_idx = i;
                }
            }

            const THRESHOLD: usize = models::MIN_MATCH_LEN + 3;
            if best_rep_len > THRESHOLD && best_rep_len >= hash_len {
                let len = best_rep_len;
                self.emit_rep_match(best_rep_idx, len, out);
                self.consume(len);
            } else if hash_len > THRESHOLD {
                self.emit_match(hash_dist, hash_len, out);
                self.consume(hash_len);
            } else if self.pos >= (self.rep[0] as usize + 1)
                && self.buffer[self.pos - self.rep[0] as usize - 1] == self.buffer[self.pos]
            {
                self.emit_short_rep(out);
                self.consume(1);
            } else {
                let byte = self.buffer[self.pos];
                self.emit_literal(byte, out);
                self.consume(1);
            }
            self.normalize_if_needed();
        }
    }

    fn uncompressed_position(&self) -> u64 {
        self.base_offset + self.pos as u64
    }

    fn crc(&self) -> u32 {
        self.crc.finalize()
    }

    fn emit_sync_flush(&mut self, out: &mut CircularBuffer) -> bool {
        if out.free() < 32 {
            return false;
        }
        let pos_state = self.pos_state();
        encode_distance_marker(&mut self.rc, &mut self.models, self.state, pos_state, 1, out);
        self.rc.flush(out);
        self.rc.reset();
        true
    }
}

/// An end-of-member or sync-flush marker: a normal match with distance
/// `0xFFFF_FFFF`, at whatever state/pos_state the encoder is currently in.
/// `len_minus_min = 0` is the stop marker (full length `MIN_MATCH_LEN`);
/// `len_minus_min = 1` is the sync-flush marker (length `MIN_MATCH_LEN + 1`,
/// per spec §6) that tells the decoder to reload its 5-byte range-coder
/// prime without resetting probability models.
pub(crate) fn encode_distance_marker(
    rc: &mut RangeEncoder,
    models: &mut LzModels,
    state: usize,
    pos_state: usize,
    len_minus_min: usize,
    out: &mut CircularBuffer,
) {
    let is_match_idx = state * models::NUM_POS_STATES + pos_state;
    rc.encode_bit(&mut models.is_match[is_match_idx], true, out);
    rc.encode_bit(&mut models.is_rep[state], false, out);
    rc.encode_len(&mut models.len_decoder, pos_state, len_minus_min, out);
    let len_state = models::len_to_dist_state(len_minus_min);
    encode_distance(rc, models, len_state, models::MARKER_DISTANCE, out);
}

/// The end-of-member marker: shorthand for
/// [`encode_distance_marker`] with `len_minus_min = 0`.
pub(crate) fn encode_distance_marker_stop(
    rc: &mut RangeEncoder,
    models: &mut LzModels,
    state: usize,
    pos_state: usize,
    out: &mut CircularBuffer,
) {
    encode_distance_marker(rc, models, state, pos_state, 0, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::LzEncoderBody;

    #[test]
    fn encodes_without_panicking_on_repetitive_input() {
        let mut enc = FastEncoder::new(65535);
        let data = vec![b'z'; 5000];
        enc.write(&data);
        enc.set_finishing();
        let mut out = CircularBuffer::new(1 << 16);
        let done = enc.encode(&mut out);
        assert!(done);
        assert!(out.used() > 0);
        assert!(out.used() < data.len());
    }
}
