//! The price-optimizing "normal" encoder, used for every compression level
//! except level 0. See spec §4.5.
//!
//! Unlike the greedy [`super::fast::FastEncoder`], this runs an actual
//! dynamic-programming optimal parse: a `trials` array holds, for each
//! reachable offset ahead of the current position, the cheapest price
//! found so far to reach it and the piece (literal / short rep / rep
//! match / match) that got there. Two seed trials (offsets 0 and 1) start
//! the array, an extension loop walks forward pricing every literal, rep,
//! and match-finder candidate reachable from each newly-settled offset,
//! and a backward pass over `prev_index`/`prev_index2` links reconstructs
//! the chosen sequence once the horizon is reached. `prev_index2` records
//! the one two-piece combination this parser considers: splitting a match
//! one byte short and following it with a one-byte rep0, which is
//! sometimes cheaper than encoding the same total length as one match.
//!
//! A position whose best rep or match already reaches the full lookahead
//! window skips the trellis entirely — nothing beyond the window could
//! ever beat already-maximal length, so there's nothing left to optimize.

use super::matchfinder::{MatchFinder, MatchPair};
use super::price::{price_bit, DistPriceTable, LenPriceTable, INFINITY_PRICE};
use super::rangecoder::RangeEncoder;
use crate::circular_buffer::CircularBuffer;
use crate::crc32::Crc32;
use crate::models::{self, LzModels};

const DICT_FACTOR: usize = 4;

/// Upper bound on how far the trellis is allowed to grow past the initial
/// lookahead window, bounding memory and per-call work even if a chain of
/// near-maximal matches keeps extending it.
const MAX_TRIAL_LEN: usize = 1024;

/// Output space reserved before starting an optimal-parse call: unlike the
/// single-symbol encoders, one call here can emit an entire trellis's
/// worth of pieces.
const OPT_OUTPUT_MARGIN: usize = 4096;

pub(crate) struct NormalEncoder {
    mf: MatchFinder,
    match_len_limit: usize,
    at_stream_end: bool,
    flushed: bool,

    models: LzModels,
    rc: RangeEncoder,
    state: usize,
    rep: [u32; 4],
    crc: Crc32,

    len_prices: LenPriceTable,
    rep_len_prices: LenPriceTable,
    dist_prices: DistPriceTable,
}

/// One edge arriving at a trellis position: either a single emitted
/// symbol, or (for the match/short-rep combination) the second half of a
/// two-symbol combo whose first half is `piece2` on the same [`Trial`].
#[derive(Clone, Copy)]
enum Piece {
    Literal,
    ShortRep,
    Rep { index: usize, len: usize },
    Match { dist: u32, len: usize },
}

#[derive(Clone)]
struct Trial {
    price: u32,
    state: usize,
    reps: [u32; 4],
    prev_index: usize,
    /// `Some(mid)` means this trial is reached by two pieces from
    /// `prev_index`: `piece2` spans `prev_index..mid`, then `piece` spans
    /// `mid..`(this trial's own offset).
    prev_index2: Option<usize>,
    piece: Piece,
    piece2: Option<Piece>,
}

impl Trial {
    fn infinite() -> Self {
        Trial {
            price: INFINITY_PRICE,
            state: 0,
            reps: [0; 4],
            prev_index: 0,
            prev_index2: None,
            piece: Piece::Literal,
            piece2: None,
        }
    }

    fn seed(state: usize, reps: [u32; 4]) -> Self {
        Trial {
            price: 0,
            state,
            reps,
            prev_index: 0,
            prev_index2: None,
            piece: Piece::Literal,
            piece2: None,
        }
    }
}

fn ensure_len(trials: &mut Vec<Trial>, n: usize) {
    while trials.len() < n {
        trials.push(Trial::infinite());
    }
}

impl NormalEncoder {
    pub fn new(dictionary_size: usize, match_len_limit: usize) -> Self {
        let mut enc = NormalEncoder {
            mf: MatchFinder::new(dictionary_size, match_len_limit, DICT_FACTOR),
            match_len_limit,
            at_stream_end: false,
            flushed: false,
            models: LzModels::new(),
            rc: RangeEncoder::new(),
            state: 0,
            rep: [0; 4],
            crc: Crc32::new(),
            len_prices: LenPriceTable::new(),
            rep_len_prices: LenPriceTable::new(),
            dist_prices: DistPriceTable::new(),
        };
        enc.len_prices.update(&enc.models.len_decoder, match_len_limit);
        enc.rep_len_prices.update(&enc.models.rep_len_decoder, match_len_limit);
        enc.dist_prices.update(&enc.models.pos_slot_decoder);
        enc
    }

    fn pos_state(&self) -> usize {
        (self.mf.data_position() as usize) & models::POS_STATE_MASK
    }

    fn price_literal(&self, byte: u8, pos_state: usize, prev_byte: u8, match_byte: u8, state: usize) -> u32 {
        let is_match_idx = state * models::NUM_POS_STATES + pos_state;
        let mut price = price_bit(self.models.is_match[is_match_idx], false);

        let lit_state = (prev_byte >> (8 - models::LITERAL_CONTEXT_BITS)) as usize;
        let probs = &self.models.literal_probs[lit_state];

        if models::is_literal_state(state) {
            let mut symbol: u32 = 1;
            for i in (0..8).rev() {
                let bit = (byte >> i) & 1 != 0;
                price += price_bit(probs[symbol as usize], bit);
                symbol = (symbol << 1) | bit as u32;
            }
        } else {
            let mut match_byte = match_byte as u32;
            let mut symbol: u32 = 1;
            for i in (0..8).rev() {
                let match_bit = (match_byte >> 7) & 1;
                match_byte <<= 1;
                let bit = (byte >> i) & 1 != 0;
                let idx = ((1 + match_bit) << 8) + symbol;
                price += price_bit(probs[idx as usize], bit);
                symbol = (symbol << 1) | bit as u32;
                if match_bit != bit as u32 {
                    for j in (0..i).rev() {
                        let bit2 = (byte >> j) & 1 != 0;
                        price += price_bit(probs[symbol as usize], bit2);
                        symbol = (symbol << 1) | bit2 as u32;
                    }
                    break;
                }
            }
        }
        price
    }

    fn price_short_rep(&self, pos_state: usize, state: usize) -> u32 {
        let idx = state * models::NUM_POS_STATES + pos_state;
        price_bit(self.models.is_match[idx], true)
            + price_bit(self.models.is_rep[state], true)
            + price_bit(self.models.is_rep_g0[state], false)
            + price_bit(self.models.is_rep0_long[idx], false)
    }

    fn price_rep_match(&self, rep_index: usize, len: usize, pos_state: usize, state: usize) -> u32 {
        let mut price = price_bit(self.models.is_match[state * models::NUM_POS_STATES + pos_state], true);
        price += price_bit(self.models.is_rep[state], true);
        if rep_index == 0 {
            price += price_bit(self.models.is_rep_g0[state], false);
            price += price_bit(self.models.is_rep0_long[state * models::NUM_POS_STATES + pos_state], true);
        } else {
            price += price_bit(self.models.is_rep_g0[state], true);
            if rep_index == 1 {
                price += price_bit(self.models.is_rep_g1[state], false);
            } else {
                price += price_bit(self.models.is_rep_g1[state], true);
                price += price_bit(self.models.is_rep_g2[state], rep_index == 3);
            }
        }
        price + self.rep_len_prices.price(pos_state, len - models::MIN_MATCH_LEN)
    }

    fn price_match(&self, dist: u32, len: usize, pos_state: usize, state: usize) -> u32 {
        let mut price = price_bit(self.models.is_match[state * models::NUM_POS_STATES + pos_state], true);
        price += price_bit(self.models.is_rep[state], false);
        price += self.len_prices.price(pos_state, len - models::MIN_MATCH_LEN);
        let len_state = models::len_to_dist_state(len - models::MIN_MATCH_LEN);
        price += self
            .dist_prices
            .price_distance(len_state, dist, &self.models.pos_decoders, &self.models.align_decoder);
        price
    }

    fn emit_literal(&mut self, byte: u8, pos_state: usize, prev_byte: u8, match_byte: u8, out: &mut CircularBuffer) {
        let is_match_idx = self.state * models::NUM_POS_STATES + pos_state;
        self.rc.encode_bit(&mut self.models.is_match[is_match_idx], false, out);

        let lit_state = (prev_byte >> (8 - models::LITERAL_CONTEXT_BITS)) as usize;
        let probs = &mut self.models.literal_probs[lit_state];

        if models::is_literal_state(self.state) {
            let mut symbol: u32 = 1;
            for i in (0..8).rev() {
                let bit = (byte >> i) & 1 != 0;
                self.rc.encode_bit(&mut probs[symbol as usize], bit, out);
                symbol = (symbol << 1) | bit as u32;
            }
        } else {
            let mut match_byte = match_byte as u32;
            let mut symbol: u32 = 1;
            for i in (0..8).rev() {
                let match_bit = (match_byte >> 7) & 1;
                match_byte <<= 1;
                let bit = (byte >> i) & 1 != 0;
                let idx = ((1 + match_bit) << 8) + symbol;
                self.rc.encode_bit(&mut probs[idx as usize], bit, out);
                symbol = (symbol << 1) | bit as u32;
                if match_bit != bit as u32 {
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

    fn emit_short_rep(&mut self, pos_state: usize, out: &mut CircularBuffer) {
        let is_match_idx = self.state * models::NUM_POS_STATES + pos_state;
        self.rc.encode_bit(&mut self.models.is_match[is_match_idx], true, out);
        self.rc.encode_bit(&mut self.models.is_rep[self.state], true, out);
        self.rc.encode_bit(&mut self.models.is_rep_g0[self.state], false, out);
        let idx = self.state * models::NUM_POS_STATES + pos_state;
        self.rc.encode_bit(&mut self.models.is_rep0_long[idx], false, out);
        self.state = models::state_after_short_rep(self.state);
    }

    fn emit_rep_match(&mut self, rep_index: usize, len: usize, pos_state: usize, out: &mut CircularBuffer) {
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

    fn emit_match(&mut self, dist: u32, len: usize, pos_state: usize, out: &mut CircularBuffer) {
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
        super::fast::encode_distance(&mut self.rc, &mut self.models, len_state, dist, out);
        self.state = models::state_after_match(self.state);
    }

    fn refresh_prices_if_due(&mut self, pos_state: usize) {
        self.len_prices
            .tick(pos_state, &self.models.len_decoder, self.match_len_limit);
        self.rep_len_prices
            .tick(pos_state, &self.models.rep_len_decoder, self.match_len_limit);
        self.dist_prices.tick(&self.models.pos_slot_decoder);
    }

    /// Emits a single piece directly against the encoder's live state,
    /// used by the fast path where a match or rep already spans the
    /// entire lookahead window. `mf` has only advanced one position (from
    /// the initial `get_matches()` call); this advances it the rest of
    /// the way and updates the CRC over the whole run.
    fn emit_direct(&mut self, piece: Piece, pos_state: usize, out: &mut CircularBuffer) {
        match piece {
            Piece::Rep { index, len } => {
                for i in 0..len {
                    self.crc.update_byte(self.mf.byte_at(i as isize - 1));
                }
                self.emit_rep_match(index, len, pos_state, out);
                for _ in 0..len - 1 {
                    self.mf.get_matches();
                }
            }
            Piece::Match { dist, len } => {
                for i in 0..len {
                    self.crc.update_byte(self.mf.byte_at(i as isize - 1));
                }
                self.emit_match(dist, len, pos_state, out);
                for _ in 0..len - 1 {
                    self.mf.get_matches();
                }
            }
            Piece::Literal | Piece::ShortRep => unreachable!("fast path only ever emits a rep or match"),
        }
        self.refresh_prices_if_due(pos_state);
    }

    /// Runs one dynamic-programming optimal parse starting at the match
    /// finder's current position, then emits the reconstructed piece
    /// sequence. On return, `self.mf` sits exactly at the position just
    /// past the last emitted piece (every intervening position was
    /// already visited while filling the trellis, so no further
    /// `get_matches()` calls are needed to catch it up).
    fn run_optimal_parse(&mut self, out: &mut CircularBuffer) {
        let start_abs = self.mf.data_position();
        let avail = self.mf.avail_bytes();
        let max_len = avail.min(self.match_len_limit).min(models::MAX_MATCH_LEN);
        let pos_state0 = self.pos_state();

        let byte0 = self.mf.byte_at(0);
        let prev_byte0 = if start_abs == 0 { 0 } else { self.mf.byte_at(-1) };
        let match_byte0 = if start_abs > self.rep[0] as u64 {
            self.mf.byte_at(-(self.rep[0] as isize) - 1)
        } else {
            0
        };

        let mut rep_lens = [0usize; 4];
        for (i, len) in rep_lens.iter_mut().enumerate() {
            *len = self.mf.true_match_len(self.rep[i] as usize, max_len);
        }
        let matches = self.mf.get_matches();

        // Fast path: nothing beyond the lookahead window could ever beat
        // a candidate that already reaches it.
        if max_len >= models::MIN_MATCH_LEN {
            if let Some((index, &len)) = rep_lens.iter().enumerate().find(|&(_, &l)| l >= max_len) {
                self.emit_direct(Piece::Rep { index, len }, pos_state0, out);
                return;
            }
            if let Some(m) = matches.iter().rev().find(|m| m.len as usize >= max_len) {
                self.emit_direct(Piece::Match { dist: m.dist, len: max_len }, pos_state0, out);
                return;
            }
        }

        let mut trials: Vec<Trial> = (0..=max_len.max(1)).map(|_| Trial::infinite()).collect();
        trials[0] = Trial::seed(self.state, self.rep);
        trials[1] = Trial {
            price: self.price_literal(byte0, pos_state0, prev_byte0, match_byte0, self.state),
            state: models::state_after_literal(self.state),
            reps: self.rep,
            prev_index: 0,
            prev_index2: None,
            piece: Piece::Literal,
            piece2: None,
        };
        if rep_lens[0] >= 1 {
            let price = self.price_short_rep(pos_state0, self.state);
            if price < trials[1].price {
                trials[1] = Trial {
                    price,
                    state: models::state_after_short_rep(self.state),
                    reps: self.rep,
                    prev_index: 0,
                    prev_index2: None,
                    piece: Piece::ShortRep,
                    piece2: None,
                };
            }
        }
        self.fill_trellis_step(&mut trials, 0, pos_state0, self.rep, self.state, &rep_lens, &matches);

        // `avail` bounds how many more positions can ever be visited: one
        // byte is consumed per step, and nothing exists past it yet (it
        // may simply not be buffered, even at stream end). `advanced`
        // tracks how far `self.mf` has actually moved past `start_abs`;
        // it (not `trials.len()`, which can grow past it via a long match
        // found right at the cutoff) is the real trellis horizon.
        let mut advanced = 1usize;
        let mut cur = 1usize;
        while cur < trials.len() && cur < MAX_TRIAL_LEN && cur < avail {
            let pos_state = (pos_state0 + cur) & models::POS_STATE_MASK;
            let state = trials[cur].state;
            let reps = trials[cur].reps;
            let price = trials[cur].price;

            // Read everything keyed off the current byte (`mf.pos ==
            // start_abs + cur` here) before `get_matches` advances it.
            let byte = self.mf.byte_at(0);
            let prev_byte = self.mf.byte_at(-1);
            let abs = start_abs + cur as u64;
            let match_byte = if abs > reps[0] as u64 { self.mf.byte_at(-(reps[0] as isize) - 1) } else { 0 };

            let max_here = self.mf.avail_bytes().min(self.match_len_limit).min(models::MAX_MATCH_LEN);
            let mut rep_lens_here = [0usize; 4];
            for (i, len) in rep_lens_here.iter_mut().enumerate() {
                *len = self.mf.true_match_len(reps[i] as usize, max_here);
            }
            let matches_here = self.mf.get_matches();
            advanced = cur + 1;

            if price < INFINITY_PRICE {
                ensure_len(&mut trials, cur + 2);

                let lit_price = price + self.price_literal(byte, pos_state, prev_byte, match_byte, state);
                if lit_price < trials[cur + 1].price {
                    trials[cur + 1] = Trial {
                        price: lit_price,
                        state: models::state_after_literal(state),
                        reps,
                        prev_index: cur,
                        prev_index2: None,
                        piece: Piece::Literal,
                        piece2: None,
                    };
                }
                if rep_lens_here[0] >= 1 {
                    let sr_price = price + self.price_short_rep(pos_state, state);
                    if sr_price < trials[cur + 1].price {
                        trials[cur + 1] = Trial {
                            price: sr_price,
                            state: models::state_after_short_rep(state),
                            reps,
                            prev_index: cur,
                            prev_index2: None,
                            piece: Piece::ShortRep,
                            piece2: None,
                        };
                    }
                }

                self.fill_trellis_step(&mut trials, cur, pos_state, reps, state, &rep_lens_here, &matches_here);
            }
            cur += 1;
        }

        // Cap at `advanced`: any trial beyond it was relaxed by a match
        // found at the cutoff boundary whose full length `self.mf` has
        // not actually walked over yet.
        let end_index = advanced.min(trials.len() - 1);
        let mut pieces_rev = Vec::new();
        let mut idx = end_index;
        while idx != 0 {
            let t = trials[idx].clone();
            if t.prev_index2.is_some() {
                pieces_rev.push(t.piece);
                pieces_rev.push(t.piece2.expect("prev_index2 always pairs with piece2"));
            } else {
                pieces_rev.push(t.piece);
            }
            idx = t.prev_index;
        }
        pieces_rev.reverse();

        // `self.mf` has advanced exactly `end_index` bytes past
        // `start_abs` by now, so that's the pivot for reading any
        // already-explored byte back via `byte_at`'s negative offsets.
        let lookback_base = end_index;
        let mut p = 0usize;
        for piece in pieces_rev {
            let pos_state = (pos_state0 + p) & models::POS_STATE_MASK;
            match piece {
                Piece::Literal => {
                    let byte = self.mf.byte_at(p as isize - lookback_base as isize);
                    let abs = start_abs + p as u64;
                    let prev_byte = if abs == 0 {
                        0
                    } else {
                        self.mf.byte_at((p as isize - 1) - lookback_base as isize)
                    };
                    let match_byte = if abs > self.rep[0] as u64 {
                        self.mf
                            .byte_at((p as isize - 1 - self.rep[0] as isize) - lookback_base as isize)
                    } else {
                        0
                    };
                    self.crc.update_byte(byte);
                    self.emit_literal(byte, pos_state, prev_byte, match_byte, out);
                    p += 1;
                }
                Piece::ShortRep => {
                    let byte = self.mf.byte_at(p as isize - lookback_base as isize);
                    self.crc.update_byte(byte);
                    self.emit_short_rep(pos_state, out);
                    p += 1;
                }
                Piece::Rep { index, len } => {
                    for i in 0..len {
                        let byte = self.mf.byte_at((p + i) as isize - lookback_base as isize);
                        self.crc.update_byte(byte);
                    }
                    self.emit_rep_match(index, len, pos_state, out);
                    p += len;
                }
                Piece::Match { dist, len } => {
                    for i in 0..len {
                        let byte = self.mf.byte_at((p + i) as isize - lookback_base as isize);
                        self.crc.update_byte(byte);
                    }
                    self.emit_match(dist, len, pos_state, out);
                    p += len;
                }
            }
            self.refresh_prices_if_due(pos_state);
        }
    }

    /// Fills in every rep and match extension reachable from the trial at
    /// offset `cur` (whose state/reps/price are passed explicitly, since
    /// `trials[cur]` may still be getting mutated by sibling calls in the
    /// same step). Also considers, for each match, splitting it one byte
    /// short and following with a one-byte rep0 — `prev_index2` records
    /// that combination when it beats the equivalent direct match.
    #[allow(clippy::too_many_arguments)]
    fn fill_trellis_step(
        &self,
        trials: &mut Vec<Trial>,
        cur: usize,
        pos_state: usize,
        reps: [u32; 4],
        state: usize,
        rep_lens: &[usize; 4],
        matches: &[MatchPair],
    ) {
        let price = trials[cur].price;
        if price >= INFINITY_PRICE {
            return;
        }

        for (i, &len) in rep_lens.iter().enumerate() {
            if len < models::MIN_MATCH_LEN {
                continue;
            }
            for l in models::MIN_MATCH_LEN..=len {
                let target = cur + l;
                if target >= cur + MAX_TRIAL_LEN {
                    break;
                }
                ensure_len(trials, target + 1);
                let p = price + self.price_rep_match(i, l, pos_state, state);
                if p < trials[target].price {
                    let mut new_reps = reps;
                    if i != 0 {
                        let d = new_reps[i];
                        for k in (0..i).rev() {
                            new_reps[k + 1] = new_reps[k];
                        }
                        new_reps[0] = d;
                    }
                    trials[target] = Trial {
                        price: p,
                        state: models::state_after_rep(state),
                        reps: new_reps,
                        prev_index: cur,
                        prev_index2: None,
                        piece: Piece::Rep { index: i, len: l },
                        piece2: None,
                    };
                }
            }
        }

        for m in matches {
            // `MatchFinder::get_matches` only caps by `MAX_MATCH_LEN`, not
            // by our configured search limit; clamp here so every length
            // fed to the price tables stays within the range they were
            // last `update`d/`tick`ed for.
            let len = (m.len as usize).min(self.match_len_limit);
            if len < models::MIN_MATCH_LEN {
                continue;
            }
            let new_reps = [m.dist, reps[0], reps[1], reps[2]];
            for l in models::MIN_MATCH_LEN..=len {
                let target = cur + l;
                if target >= cur + MAX_TRIAL_LEN {
                    break;
                }
                ensure_len(trials, target + 1);
                let p = price + self.price_match(m.dist, l, pos_state, state);
                if p < trials[target].price {
                    trials[target] = Trial {
                        price: p,
                        state: models::state_after_match(state),
                        reps: new_reps,
                        prev_index: cur,
                        prev_index2: None,
                        piece: Piece::Match { dist: m.dist, len: l },
                        piece2: None,
                    };
                }
            }

            // A match's own run of bytes proves the byte right after its
            // shortened form also continues the same distance, so
            // splitting into (match, len - 1) + (short rep, 1) always
            // reaches the same total length; occasionally it's cheaper
            // than the direct match of the full length.
            if len >= models::MIN_MATCH_LEN + 1 {
                let split_len = len - 1;
                let mid = cur + split_len;
                let total = mid + 1;
                if total < cur + MAX_TRIAL_LEN {
                    ensure_len(trials, total + 1);
                    let price_first = price + self.price_match(m.dist, split_len, pos_state, state);
                    let state_after_match = models::state_after_match(state);
                    let pos_state_mid = (pos_state + split_len) & models::POS_STATE_MASK;
                    let price_combo = price_first + self.price_short_rep(pos_state_mid, state_after_match);
                    if price_combo < trials[total].price {
                        trials[total] = Trial {
                            price: price_combo,
                            state: models::state_after_short_rep(state_after_match),
                            reps: new_reps,
                            prev_index: cur,
                            prev_index2: Some(mid),
                            piece: Piece::ShortRep,
                            piece2: Some(Piece::Match { dist: m.dist, len: split_len }),
                        };
                    }
                }
            }
        }
    }
}

impl super::LzEncoderBody for NormalEncoder {
    fn write(&mut self, src: &[u8]) -> usize {
        self.mf.write(src)
    }

    fn free_space(&self) -> usize {
        self.mf.free_space()
    }

    fn set_finishing(&mut self) {
        self.at_stream_end = true;
        self.mf.set_stream_end();
    }

    fn encode(&mut self, out: &mut CircularBuffer) -> bool {
        loop {
            let avail = self.mf.avail_bytes();
            if avail == 0 {
                if !self.mf.at_stream_end() {
                    return false;
                }
                if self.flushed {
                    return true;
                }
                if out.free() < 32 {
                    return false;
                }
                let pos_state = self.pos_state();
                super::fast::encode_distance_marker_stop(
                    &mut self.rc,
                    &mut self.models,
                    self.state,
                    pos_state,
                    out,
                );
                self.rc.flush(out);
                self.flushed = true;
                return true;
            }
            if !self.mf.at_stream_end() && avail < 4 + self.match_len_limit {
                return false;
            }
            if out.free() < OPT_OUTPUT_MARGIN {
                return false;
            }

            self.run_optimal_parse(out);
        }
    }

    fn uncompressed_position(&self) -> u64 {
        self.mf.data_position()
    }

    fn crc(&self) -> u32 {
        self.crc.finalize()
    }

    fn emit_sync_flush(&mut self, out: &mut CircularBuffer) -> bool {
        if out.free() < 32 {
            return false;
        }
        let pos_state = self.pos_state();
        super::fast::encode_distance_marker(&mut self.rc, &mut self.models, self.state, pos_state, 1, out);
        self.rc.flush(out);
        self.rc.reset();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LzDecoder;
    use crate::encode::LzEncoderBody;

    #[test]
    fn encodes_without_panicking_on_repetitive_input() {
        let mut enc = NormalEncoder::new(1 << 20, 32);
        let data = vec![b'q'; 5000];
        enc.write(&data);
        enc.set_finishing();
        let mut out = CircularBuffer::new(1 << 16);
        let done = enc.encode(&mut out);
        assert!(done);
        assert!(out.used() > 0);
        assert!(out.used() < data.len());
    }

    #[test]
    fn handles_mixed_literal_and_match_input() {
        let mut enc = NormalEncoder::new(1 << 16, 16);
        let mut data = Vec::new();
        for i in 0..2000u32 {
            data.push((i % 251) as u8);
        }
        data.extend_from_slice(&data.clone());
        enc.write(&data);
        enc.set_finishing();
        let mut out = CircularBuffer::new(1 << 16);
        let mut total_out = 0;
        loop {
            let done = enc.encode(&mut out);
            let mut scratch = [0u8; 4096];
            loop {
                let n = out.read(&mut scratch);
                total_out += n;
                if n == 0 {
                    break;
                }
            }
            if done {
                break;
            }
        }
        assert!(total_out > 0);
    }

    /// Exercises reps, matches of varying lengths, and the match/short-rep
    /// combine path (a near-maximal match immediately followed by one more
    /// repeated byte), then decodes the raw LZMA stream back and checks it
    /// matches the input exactly.
    #[test]
    fn optimal_parse_roundtrips_through_lzma_stream() {
        let match_len_limit = 64;
        let dictionary_size = 1 << 16;
        let mut enc = NormalEncoder::new(dictionary_size, match_len_limit);

        let mut data = Vec::new();
        for i in 0..300u32 {
            data.push((i % 7) as u8);
        }
        let prefix = data.clone();
        data.extend_from_slice(&prefix);
        data.push(data[0]);
        data.extend_from_slice(b"distinct tail bytes that never repeat xyz123");

        enc.write(&data);
        enc.set_finishing();

        let mut staging = CircularBuffer::new(1 << 16);
        let mut compressed = Vec::new();
        loop {
            let done = enc.encode(&mut staging);
            let mut scratch = [0u8; 4096];
            loop {
                let n = staging.read(&mut scratch);
                if n == 0 {
                    break;
                }
                compressed.extend_from_slice(&scratch[..n]);
            }
            if done {
                break;
            }
        }

        let mut dec = LzDecoder::new(dictionary_size);
        let mut input = CircularBuffer::new(1 << 16);
        let mut offset = 0;
        while !dec.member_finished() {
            if offset < compressed.len() {
                offset += input.write(&compressed[offset..]);
            }
            dec.decode(&mut input).unwrap();
            if offset >= compressed.len() && input.empty() && !dec.member_finished() {
                // Nothing left to feed; avoid spinning forever on a bug.
                break;
            }
        }
        assert!(dec.member_finished());

        let mut out = Vec::new();
        let mut scratch = [0u8; 4096];
        loop {
            let n = dec.window.read(&mut scratch);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&scratch[..n]);
        }
        assert_eq!(out, data);
    }
}
