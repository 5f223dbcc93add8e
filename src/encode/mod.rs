//! Encoder internals: the range encoder, match finder, price tables, and
//! the two encoder bodies (price-optimizing "normal" and greedy "fast").
//! [`crate::encoder::Encoder`] is the public container orchestrator that
//! picks between them.

pub(crate) mod fast;
pub(crate) mod matchfinder;
pub(crate) mod normal;
pub(crate) mod price;
pub(crate) mod rangecoder;

use crate::circular_buffer::CircularBuffer;

/// Either encoder body emits into an output circular buffer and reports
/// how many bytes of the input it has consumed so far via
/// `data_position()`/`member_position()`-style accounting kept by the
/// caller (the container orchestrator owns those counters since they
/// persist across `restart_member`).
pub(crate) trait LzEncoderBody {
    /// Feeds more input bytes into the match finder, returns how many
    /// were accepted.
    fn write(&mut self, src: &[u8]) -> usize;

    fn free_space(&self) -> usize;

    /// Marks that no more input will ever arrive, so the match finder and
    /// encoder can flush remaining trailing bytes instead of waiting for
    /// a full match-length's worth of lookahead.
    fn set_finishing(&mut self);

    /// Encodes as much as currently-available input and output space
    /// allow. Returns `true` once all buffered input has been consumed
    /// (only meaningful after `set_finishing`).
    fn encode(&mut self, out: &mut CircularBuffer) -> bool;

    fn uncompressed_position(&self) -> u64;

    fn crc(&self) -> u32;

    /// Emits a sync-flush marker (distance `0xFFFF_FFFF`, length
    /// `MIN_MATCH_LEN + 1`) and a full range-coder flush/reprime, without
    /// resetting probability models or rep distances. Returns `false`
    /// (caller should retry after draining `out`) if there wasn't enough
    /// free space to emit it yet.
    fn emit_sync_flush(&mut self, out: &mut CircularBuffer) -> bool;
}

/// Sum type over the two encoder bodies so the container orchestrator has
/// one concrete handle to hold, without dynamic dispatch (spec §9: "Use a
/// sum type over the two encoder bodies; callers see a single encoder
/// handle. No vtable is required.").
pub(crate) enum EncoderBody {
    Normal(normal::NormalEncoder),
    Fast(fast::FastEncoder),
}

impl EncoderBody {
    pub fn new(dictionary_size: u32, match_len_limit: u32) -> Self {
        if dictionary_size == 65535 && match_len_limit == 16 {
            EncoderBody::Fast(fast::FastEncoder::new(dictionary_size as usize))
        } else {
            EncoderBody::Normal(normal::NormalEncoder::new(
                dictionary_size as usize,
                match_len_limit as usize,
            ))
        }
    }
}

impl LzEncoderBody for EncoderBody {
    fn write(&mut self, src: &[u8]) -> usize {
        match self {
            EncoderBody::Normal(e) => e.write(src),
            EncoderBody::Fast(e) => e.write(src),
        }
    }

    fn free_space(&self) -> usize {
        match self {
            EncoderBody::Normal(e) => e.free_space(),
            EncoderBody::Fast(e) => e.free_space(),
        }
    }

    fn set_finishing(&mut self) {
        match self {
            EncoderBody::Normal(e) => e.set_finishing(),
            EncoderBody::Fast(e) => e.set_finishing(),
        }
    }

    fn encode(&mut self, out: &mut CircularBuffer) -> bool {
        match self {
            EncoderBody::Normal(e) => e.encode(out),
            EncoderBody::Fast(e) => e.encode(out),
        }
    }

    fn uncompressed_position(&self) -> u64 {
        match self {
            EncoderBody::Normal(e) => e.uncompressed_position(),
            EncoderBody::Fast(e) => e.uncompressed_position(),
        }
    }

    fn crc(&self) -> u32 {
        match self {
            EncoderBody::Normal(e) => e.crc(),
            EncoderBody::Fast(e) => e.crc(),
        }
    }

    fn emit_sync_flush(&mut self, out: &mut CircularBuffer) -> bool {
        match self {
            EncoderBody::Normal(e) => e.emit_sync_flush(out),
            EncoderBody::Fast(e) => e.emit_sync_flush(out),
        }
    }
}
