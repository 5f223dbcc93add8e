//! The LZ decoder: consumes symbols from the range decoder, maintains the
//! sliding dictionary, reconstructs literals and matches, and verifies the
//! member trailer. See spec §4.3.

pub(crate) mod rangecoder;

use crate::circular_buffer::CircularBuffer;
use crate::crc32::Crc32;
use crate::error::{LzipError, Result};
use crate::header::{Trailer, HEADER_SIZE, TRAILER_SIZE};
use crate::models::{self, LzModels};
use rangecoder::{NeedMoreInput, RangeDecoder};

/// Result of attempting to advance the member decode loop by as much as
/// currently-buffered input and free output space allow.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StepOutcome {
    /// Made progress or is idle; caller should check `member_finished`.
    Continue,
    /// Cannot proceed without more compressed input.
    NeedInput,
    /// Cannot proceed without more free space in the output window.
    NeedOutputSpace,
}

/// Per-member decoder state: range decoder, probability models, rep
/// distances, symbol-context state, and the sliding dictionary window.
pub struct LzDecoder {
    models: LzModels,
    rc: RangeDecoder,
    state: usize,
    rep: [u32; 4],
    pub window: CircularBuffer,
    dictionary_size: usize,
    crc: Crc32,
    data_position: u64,
    pos_wrapped: bool,
    member_finished: bool,
    verify_trailer_pending: bool,
    trailer_buf: Vec<u8>,
    data_crc: u32,
    /// Total compressed bytes (LZMA stream + trailer) this member has
    /// consumed from `input` so far, for `try_verify_trailer`'s
    /// `member_size` check. `decode()` accumulates it from `input.used()`
    /// deltas, which are net of any rollback `decode_inner` already did.
    compressed_consumed: u64,
}

impl LzDecoder {
    pub fn new(dictionary_size: usize) -> Self {
        LzDecoder {
            models: LzModels::new(),
            rc: RangeDecoder::new(),
            state: 0,
            rep: [0; 4],
            window: CircularBuffer::new(dictionary_size + 4096),
            dictionary_size,
            crc: Crc32::new(),
            data_position: 0,
            pos_wrapped: false,
            member_finished: false,
            verify_trailer_pending: false,
            trailer_buf: Vec::with_capacity(TRAILER_SIZE),
            data_crc: 0,
            compressed_consumed: 0,
        }
    }

    pub fn member_finished(&self) -> bool {
        self.member_finished
    }

    pub fn data_position(&self) -> u64 {
        self.data_position
    }

    pub fn data_crc(&self) -> u32 {
        self.data_crc
    }

    /// Drives the member loop, reading from `input` and writing decoded
    /// bytes into `self.window`, until input or output space runs out, or
    /// the member finishes (trailer verified).
    pub fn decode(&mut self, input: &mut CircularBuffer) -> Result<StepOutcome> {
        loop {
            if self.member_finished {
                return Ok(StepOutcome::Continue);
            }
            if self.verify_trailer_pending {
                return self.try_verify_trailer(input);
            }
            if !self.rc.is_primed() {
                let before = input.used();
                match self.rc.try_prime(input) {
                    Ok(()) => {
                        self.compressed_consumed += (before - input.used()) as u64;
                    }
                    Err(NeedMoreInput) => {
                        let consumed = before - input.used();
                        input.unread(consumed);
                        return Ok(StepOutcome::NeedInput);
                    }
                }
            }
            // A symbol can need up to MAX_MATCH_LEN bytes of free window
            // space; stall rather than decode a partial match.
            if self.window.free() < models::MAX_MATCH_LEN + 1 {
                return Ok(StepOutcome::NeedOutputSpace);
            }

            let snapshot = self.snapshot();
            let before = input.used();
            match self.decode_symbol(input) {
                Ok(SymbolOutcome::Normal) => {
                    self.compressed_consumed += (before - input.used()) as u64;
                    continue;
                }
                Ok(SymbolOutcome::SyncFlush) => {
                    self.compressed_consumed += (before - input.used()) as u64;
                    self.rc.request_reload();
                    continue;
                }
                Ok(SymbolOutcome::StopMarker) => {
                    self.compressed_consumed += (before - input.used()) as u64;
                    self.verify_trailer_pending = true;
                    return self.try_verify_trailer(input);
                }
                Err(DecodeStepError::NeedMoreInput) => {
                    self.restore(snapshot);
                    let consumed = before - input.used();
                    input.unread(consumed);
                    return Ok(StepOutcome::NeedInput);
                }
                Err(DecodeStepError::DataError(msg)) => {
                    return Err(LzipError::DataError(msg));
                }
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            rep: self.rep,
            rc_range: self.rc.range,
            rc_code: self.rc.code,
            models: self.models.clone(),
            data_position: self.data_position,
        }
    }

    /// The window itself is only appended to by `decode_symbol` once every
    /// byte it needs has already been decoded successfully (a match is
    /// only copied after its length and distance both decode cleanly), so
    /// a `NeedMoreInput` failure never leaves partially-emitted output to
    /// unwind — restoring the range coder and model state is sufficient.
    fn restore(&mut self, s: Snapshot) {
        self.state = s.state;
        self.rep = s.rep;
        self.rc.range = s.rc_range;
        self.rc.code = s.rc_code;
        self.models = s.models;
        self.data_position = s.data_position;
    }

    fn decode_symbol(&mut self, input: &mut CircularBuffer) -> std::result::Result<SymbolOutcome, DecodeStepError> {
        let pos_state = (self.data_position as usize) & models::POS_STATE_MASK;
        let is_match_idx = self.state * models::NUM_POS_STATES + pos_state;

        if !self
            .rc
            .decode_bit(&mut self.models.is_match[is_match_idx], input)
            .map_err(dmi)?
        {
            let byte = self.decode_literal(input)?;
            self.state = models::state_after_literal(self.state);
            self.emit_byte(byte);
            return Ok(SymbolOutcome::Normal);
        }

        if self.rc.decode_bit(&mut self.models.is_rep[self.state], input).map_err(dmi)? {
            // rep match or short rep
            if !self
                .rc
                .decode_bit(&mut self.models.is_rep_g0[self.state], input)
                .map_err(dmi)?
            {
                let short_rep_idx = self.state * models::NUM_POS_STATES + pos_state;
                if !self
                    .rc
                    .decode_bit(&mut self.models.is_rep0_long[short_rep_idx], input)
                    .map_err(dmi)?
                {
                    self.state = models::state_after_short_rep(self.state);
                    self.emit_match(self.rep[0] as usize, 1)?;
                    return Ok(SymbolOutcome::Normal);
                }
            } else {
                let idx;
                if !self.rc.decode_bit(&mut self.models.is_rep_g1[self.state], input).map_err(dmi)? {
                    idx = 1;
                } else if !self.rc.decode_bit(&mut self.models.is_rep_g2[self.state], input).map_err(dmi)? {
                    idx = 2;
                } else {
                    idx = 3;
                }
                let dist = self.rep[idx];
                for i in (0..idx).rev() {
                    self.rep[i + 1] = self.rep[i];
                }
                self.rep[0] = dist;
            }
            let len = self
                .rc
                .decode_len(&mut self.models.rep_len_decoder, pos_state, input)
                .map_err(dmi)?
                + models::MIN_MATCH_LEN;
            self.state = models::state_after_rep(self.state);
            self.emit_match(self.rep[0] as usize, len)?;
            Ok(SymbolOutcome::Normal)
        } else {
            self.rep[3] = self.rep[2];
            self.rep[2] = self.rep[1];
            self.rep[1] = self.rep[0];

            let len = self
                .rc
                .decode_len(&mut self.models.len_decoder, pos_state, input)
                .map_err(dmi)?;
            self.state = models::state_after_match(self.state);

            let len_state = models::len_to_dist_state(len);
            let dist = self.decode_distance(len_state, input)?;

            if dist == models::MARKER_DISTANCE {
                let full_len = len + models::MIN_MATCH_LEN;
                return if full_len == models::MIN_MATCH_LEN {
                    Ok(SymbolOutcome::StopMarker)
                } else if full_len == models::MIN_MATCH_LEN + 1 {
                    Ok(SymbolOutcome::SyncFlush)
                } else {
                    Err(DecodeStepError::DataError(
                        "invalid marker length".to_string(),
                    ))
                };
            }

            self.rep[0] = dist;
            let full_len = len + models::MIN_MATCH_LEN;
            self.emit_match(dist as usize, full_len)?;
            Ok(SymbolOutcome::Normal)
        }
    }

    fn decode_literal(&mut self, input: &mut CircularBuffer) -> std::result::Result<u8, DecodeStepError> {
        let prev_byte = if self.data_position == 0 {
            0
        } else {
            self.window.byte_back(1)
        };
        let lit_state = (prev_byte >> (8 - models::LITERAL_CONTEXT_BITS)) as usize;
        let probs = &mut self.models.literal_probs[lit_state];

        let mut symbol: u32 = 1;
        if !models::is_literal_state(self.state) {
            let mut match_byte = self.window.byte_back(self.rep[0] as usize + 1) as u32;
            while symbol < 0x100 {
                let match_bit = (match_byte >> 7) & 1;
                match_byte <<= 1;
                let idx = ((1 + match_bit) << 8) + symbol;
                let bit = self.rc.decode_bit(&mut probs[idx as usize], input).map_err(dmi)?;
                symbol = (symbol << 1) | bit as u32;
                if match_bit != bit as u32 {
                    break;
                }
            }
        }
        while symbol < 0x100 {
            let bit = self.rc.decode_bit(&mut probs[symbol as usize], input).map_err(dmi)?;
            symbol = (symbol << 1) | bit as u32;
        }
        Ok((symbol - 0x100) as u8)
    }

    fn decode_distance(&mut self, len_state: usize, input: &mut CircularBuffer) -> std::result::Result<u32, DecodeStepError> {
        let slot = self
            .rc
            .decode_tree(&mut self.models.pos_slot_decoder[len_state], input)
            .map_err(dmi)?;
        if slot < models::START_DIST_MODEL_INDEX as u32 {
            return Ok(slot);
        }
        let footer_bits = models::slot_footer_bits(slot);
        let base = models::slot_base(slot);
        if slot < models::END_DIST_MODEL_INDEX as u32 {
            let offset = models::pos_decoders_offset(slot);
            let footer = self
                .rc
                .decode_reversed_in_slice(&mut self.models.pos_decoders, offset, footer_bits, input)
                .map_err(dmi)?;
            Ok(base + footer)
        } else {
            let direct = self
                .rc
                .decode_direct_bits(footer_bits - models::ALIGN_BITS, input)
                .map_err(dmi)?
                << models::ALIGN_BITS;
            let align = self
                .rc
                .decode_tree_reversed(&mut self.models.align_decoder, input)
                .map_err(dmi)?;
            Ok(base + direct + align)
        }
    }

    fn emit_byte(&mut self, byte: u8) {
        self.window.put_byte(byte);
        self.crc.update_byte(byte);
        self.data_position += 1;
    }

    fn emit_match(&mut self, distance: usize, len: usize) -> std::result::Result<(), DecodeStepError> {
        if distance >= self.dictionary_size {
            return Err(DecodeStepError::DataError(format!(
                "distance {} exceeds dictionary size {}",
                distance, self.dictionary_size
            )));
        }
        if !self.pos_wrapped && distance as u64 >= self.data_position {
            return Err(DecodeStepError::DataError(format!(
                "distance {} exceeds data written so far ({})",
                distance, self.data_position
            )));
        }
        let crc = &mut self.crc;
        let copied = self.window.copy_match(distance, len, |b| crc.update_byte(b));
        if copied != len {
            return Err(DecodeStepError::DataError(
                "match copy truncated by window capacity".to_string(),
            ));
        }
        self.data_position += len as u64;
        if self.data_position as usize >= self.dictionary_size {
            self.pos_wrapped = true;
        }
        Ok(())
    }

    fn try_verify_trailer(&mut self, input: &mut CircularBuffer) -> Result<StepOutcome> {
        let need = TRAILER_SIZE - self.trailer_buf.len();
        let mut tmp = vec![0u8; need];
        let n = input.read(&mut tmp);
        self.trailer_buf.extend_from_slice(&tmp[..n]);
        self.compressed_consumed += n as u64;
        if self.trailer_buf.len() < TRAILER_SIZE {
            return Ok(StepOutcome::NeedInput);
        }
        let mut arr = [0u8; TRAILER_SIZE];
        arr.copy_from_slice(&self.trailer_buf);
        let trailer = Trailer::parse(&arr);
        let computed_crc = self.crc.finalize();
        if trailer.data_crc != computed_crc {
            return Err(LzipError::DataError(format!(
                "CRC mismatch: trailer says {:#010x}, computed {:#010x}",
                trailer.data_crc, computed_crc
            )));
        }
        if trailer.data_size != self.data_position {
            return Err(LzipError::DataError(format!(
                "uncompressed size mismatch: trailer says {}, decoded {}",
                trailer.data_size, self.data_position
            )));
        }
        let member_size = HEADER_SIZE as u64 + self.compressed_consumed;
        if trailer.member_size != member_size {
            return Err(LzipError::DataError(format!(
                "member size mismatch: trailer says {}, consumed {}",
                trailer.member_size, member_size
            )));
        }
        self.data_crc = trailer.data_crc;
        self.member_finished = true;
        self.verify_trailer_pending = false;
        Ok(StepOutcome::Continue)
    }
}

struct Snapshot {
    state: usize,
    rep: [u32; 4],
    rc_range: u32,
    rc_code: u32,
    models: LzModels,
    data_position: u64,
}

enum SymbolOutcome {
    Normal,
    StopMarker,
    SyncFlush,
}

enum DecodeStepError {
    NeedMoreInput,
    DataError(String),
}

fn dmi(_: NeedMoreInput) -> DecodeStepError {
    DecodeStepError::NeedMoreInput
}
