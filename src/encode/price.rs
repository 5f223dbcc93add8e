//! Converts probabilities to "price" integers (scaled negative
//! log-probabilities) used by the optimizing encoder to compare candidate
//! encodings, plus the per-state distance/length price caches the
//! optimizer refreshes periodically.

use crate::models::{self, LenModel, Prob};

const PRICE_SHIFT_BITS: u32 = 4;
const NUM_BIT_PRICE_SHIFT_BITS: u32 = 4;
pub const INFINITY_PRICE: u32 = 0x0FFF_FFFF;

/// `prob_prices[ctx >> (11 - BITS)]` style table, built once at first use.
fn build_prob_prices() -> [u16; 1 << (models::PROB_MODEL_TOTAL_BITS - NUM_BIT_PRICE_SHIFT_BITS)]
{
    const N: usize = 1 << (models::PROB_MODEL_TOTAL_BITS - NUM_BIT_PRICE_SHIFT_BITS);
    let mut table = [0u16; N];
    let num_bits = models::PROB_MODEL_TOTAL_BITS - NUM_BIT_PRICE_SHIFT_BITS;
    for i in 0..N {
        let mut w: u32 = ((i << NUM_BIT_PRICE_SHIFT_BITS) + (1 << (NUM_BIT_PRICE_SHIFT_BITS - 1)))
            as u32;
        let mut bit_count = 0u32;
        for _ in 0..PRICE_SHIFT_BITS {
            w = w * w;
            bit_count <<= 1;
            while w >= (1 << 16) {
                w >>= 1;
                bit_count += 1;
            }
        }
        table[i] = ((num_bits << PRICE_SHIFT_BITS) - bit_count) as u16;
    }
    table
}

thread_local! {
    static PROB_PRICES: [u16; 1 << (models::PROB_MODEL_TOTAL_BITS - NUM_BIT_PRICE_SHIFT_BITS)] =
        build_prob_prices();
}

#[inline]
pub fn price0(prob: Prob) -> u32 {
    PROB_PRICES.with(|t| t[(prob >> NUM_BIT_PRICE_SHIFT_BITS) as usize] as u32)
}

#[inline]
pub fn price1(prob: Prob) -> u32 {
    PROB_PRICES.with(|t| {
        t[(((1 << models::PROB_MODEL_TOTAL_BITS) - prob) >> NUM_BIT_PRICE_SHIFT_BITS) as usize]
            as u32
    })
}

#[inline]
pub fn price_bit(prob: Prob, bit: bool) -> u32 {
    if bit {
        price1(prob)
    } else {
        price0(prob)
    }
}

pub fn price_tree(tree_probs: &[Prob], num_bits: u32, symbol: u32) -> u32 {
    let mut price = 0u32;
    let mut m: u32 = 1;
    for i in (0..num_bits).rev() {
        let bit = (symbol >> i) & 1 != 0;
        price += price_bit(tree_probs[m as usize], bit);
        m = (m << 1) | bit as u32;
    }
    price
}

pub fn price_tree_reversed(tree_probs: &[Prob], num_bits: u32, symbol: u32) -> u32 {
    let mut price = 0u32;
    let mut m: usize = 1;
    let mut sym = symbol;
    for _ in 0..num_bits {
        let bit = sym & 1 != 0;
        price += price_bit(tree_probs[m], bit);
        m = (m << 1) | bit as usize;
        sym >>= 1;
    }
    price
}

pub fn price_direct_bits(num_bits: u32) -> u32 {
    num_bits << PRICE_SHIFT_BITS
}

/// Price of encoding `len` (offset by `MIN_MATCH_LEN`) under the length
/// model, for a fixed `pos_state`.
pub fn price_len(lm: &LenModel, pos_state: usize, len: usize) -> u32 {
    if len < 8 {
        price0(lm.choice1) + price_tree(lm.low[pos_state].probs_slice(), 3, len as u32)
    } else if len < 16 {
        price1(lm.choice1)
            + price0(lm.choice2)
            + price_tree(lm.mid[pos_state].probs_slice(), 3, (len - 8) as u32)
    } else {
        price1(lm.choice1)
            + price1(lm.choice2)
            + price_tree(lm.high.probs_slice(), 8, (len - 16) as u32)
    }
}

/// Per-`len_state` cache of length prices across all pos_states and all
/// encodable lengths, refreshed every `PRICE_UPDATE_INTERVAL` symbols (the
/// "periodic" cadence spec §4.5 calls out for distance/length prices).
pub struct LenPriceTable {
    prices: Vec<[u32; models::MAX_LEN_SYMBOLS]>,
    counters: Vec<u32>,
}

pub const PRICE_UPDATE_INTERVAL: u32 = 32;

impl LenPriceTable {
    pub fn new() -> Self {
        LenPriceTable {
            prices: vec![[0u32; models::MAX_LEN_SYMBOLS]; models::NUM_POS_STATES],
            counters: vec![0; models::NUM_POS_STATES],
        }
    }

    pub fn price(&self, pos_state: usize, len_minus_min: usize) -> u32 {
        self.prices[pos_state][len_minus_min]
    }

    pub fn update(&mut self, lm: &LenModel, match_len_limit: usize) {
        for pos_state in 0..models::NUM_POS_STATES {
            for len in 0..=(match_len_limit - models::MIN_MATCH_LEN) {
                self.prices[pos_state][len] = price_len(lm, pos_state, len);
            }
        }
    }

    pub fn tick(&mut self, pos_state: usize, lm: &LenModel, match_len_limit: usize) {
        if self.counters[pos_state] == 0 {
            for len in 0..=(match_len_limit - models::MIN_MATCH_LEN) {
                self.prices[pos_state][len] = price_len(lm, pos_state, len);
            }
            self.counters[pos_state] = PRICE_UPDATE_INTERVAL;
        } else {
            self.counters[pos_state] -= 1;
        }
    }
}

/// Per-`len_state` distance-slot price cache, refreshed on the same
/// cadence as [`LenPriceTable`]. Only prices the slot's own bit-tree cost;
/// footer/align bits are priced on demand in [`price_distance`] since they
/// depend on the specific distance, not just its slot.
pub struct DistPriceTable {
    slot_prices: Vec<[u32; 1 << models::DIST_SLOT_BITS]>,
    counter: u32,
}

impl DistPriceTable {
    pub fn new() -> Self {
        DistPriceTable {
            slot_prices: vec![[0u32; 1 << models::DIST_SLOT_BITS]; models::NUM_LEN_TO_POS_STATES],
            counter: 0,
        }
    }

    pub fn update(&mut self, pos_slot_decoders: &[crate::models::BitTree; models::NUM_LEN_TO_POS_STATES]) {
        for len_state in 0..models::NUM_LEN_TO_POS_STATES {
            let probs = pos_slot_decoders[len_state].probs_slice();
            for slot in 0..(1usize << models::DIST_SLOT_BITS) {
                self.slot_prices[len_state][slot] =
                    price_tree(probs, models::DIST_SLOT_BITS, slot as u32);
            }
        }
    }

    pub fn tick(&mut self, pos_slot_decoders: &[crate::models::BitTree; models::NUM_LEN_TO_POS_STATES]) {
        if self.counter == 0 {
            self.update(pos_slot_decoders);
            self.counter = PRICE_UPDATE_INTERVAL;
        } else {
            self.counter -= 1;
        }
    }

    /// Full price of encoding `dist` (0-based) under `len_state`, including
    /// any footer/align bits beyond the slot itself.
    pub fn price_distance(
        &self,
        len_state: usize,
        dist: u32,
        pos_decoders: &[Prob],
        align: &crate::models::BitTree,
    ) -> u32 {
        let slot = models::dist_to_slot(dist);
        let mut price = self.slot_prices[len_state][slot as usize];
        if slot >= models::START_DIST_MODEL_INDEX as u32 {
            let footer_bits = models::slot_footer_bits(slot);
            let base = models::slot_base(slot);
            let footer = dist - base;
            if slot < models::END_DIST_MODEL_INDEX as u32 {
                let offset = models::pos_decoders_offset(slot);
                price += price_tree_reversed(&pos_decoders[offset..], footer_bits, footer);
            } else {
                price += price_direct_bits(footer_bits - models::ALIGN_BITS);
                price += price_tree_reversed(
                    align.probs_slice(),
                    models::ALIGN_BITS,
                    footer & (models::DIST_ALIGN_SIZE as u32 - 1),
                );
            }
        }
        price
    }
}

impl Default for DistPriceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for LenPriceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price0_and_price1_are_complementary_at_equiprobable() {
        let p = models::PROB_INIT;
        // at p=1024 (equiprobable), price0 and price1 should be equal
        // within the rounding of the 4-bit price table.
        let diff = (price0(p) as i64 - price1(p) as i64).abs();
        assert!(diff <= 2);
    }

    #[test]
    fn extreme_probability_is_cheap_for_likely_bit() {
        assert!(price0(2000) < price0(100));
    }
}
