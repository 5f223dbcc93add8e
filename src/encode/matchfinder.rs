//! Sliding-window match finder: hash tables over 2-, 3-, and 4-byte keys
//! feeding binary-tree hash chains, producing sorted (length, distance)
//! candidate pairs at each input position.
//!
//! The binary tree is expressed as flat index pairs in `pos_array`
//! (`(left, right)` per cyclic position) rather than as owned references,
//! per spec §9's "Pointer graphs in the match finder" design note.

const HASH2_BITS: u32 = 10;
const HASH3_BITS: u32 = 16;
const HASH2_SIZE: usize = 1 << HASH2_BITS;
const HASH3_SIZE: usize = 1 << HASH3_BITS;

/// One (length, distance) candidate. `distance` is the raw byte distance
/// (`0` means "one byte back", matching `rep0 + 1` semantics elsewhere).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPair {
    pub len: usize,
    pub dist: u32,
}

pub struct MatchFinder {
    buffer: Vec<u8>,
    dictionary_size: usize,
    before_size: usize,
    after_size: usize,
    /// Number of bytes valid in `buffer` so far (i.e. how far the stream
    /// has been fed in).
    stream_pos: usize,
    /// Current position being matched against the dictionary.
    pos: usize,
    /// Position at which the buffer must be normalized (slid left) before
    /// continuing, to keep indices within `pos_array`'s cyclic range.
    pos_limit: usize,
    at_stream_end: bool,

    hash2: Vec<i32>,
    hash3: Vec<i32>,
    hash4_bits: u32,
    hash4: Vec<i32>,

    /// `2 * (dictionary_size + 1)` left/right index pairs, flattened.
    pos_array: Vec<i32>,

    cycles: usize,
    num_avail_bytes_cached: usize,

    /// Bytes of `buffer` discarded so far by `normalize`, added back to any
    /// externally reported position.
    base_offset: u64,

    match_len_limit: usize,
}

const NIL: i32 = -1;

impl MatchFinder {
    pub fn new(dictionary_size: usize, match_len_limit: usize, dict_factor: usize) -> Self {
        let before_size = 8192usize.max(match_len_limit + 1);
        let after_size = before_size + 2 * crate::models::MAX_MATCH_LEN + 1;
        let buffer_size = dict_factor * dictionary_size + before_size + after_size;

        let hash4_bits: u32 = if dictionary_size <= 1 << 16 {
            16
        } else if dictionary_size <= 1 << 20 {
            18
        } else {
            20
        };
        let cycles = if match_len_limit <= 32 { 16 } else { 256 };

        MatchFinder {
            buffer: vec![0u8; buffer_size],
            dictionary_size,
            before_size,
            after_size,
            stream_pos: 0,
            pos: 0,
            pos_limit: buffer_size,
            at_stream_end: false,
            hash2: vec![NIL; HASH2_SIZE],
            hash3: vec![NIL; HASH3_SIZE],
            hash4_bits,
            hash4: vec![NIL; 1 << hash4_bits],
            pos_array: vec![NIL; 2 * (dictionary_size + 1)],
            cycles,
            num_avail_bytes_cached: 0,
            base_offset: 0,
            match_len_limit,
        }
    }

    pub fn before_size(&self) -> usize {
        self.before_size
    }

    pub fn write(&mut self, src: &[u8]) -> usize {
        let free = self.buffer.len() - self.stream_pos;
        let n = src.len().min(free);
        self.buffer[self.stream_pos..self.stream_pos + n].copy_from_slice(&src[..n]);
        self.stream_pos += n;
        n
    }

    pub fn set_stream_end(&mut self) {
        self.at_stream_end = true;
    }

    pub fn at_stream_end(&self) -> bool {
        self.at_stream_end
    }

    pub fn free_space(&self) -> usize {
        self.buffer.len() - self.stream_pos
    }

    pub fn avail_bytes(&self) -> usize {
        self.stream_pos - self.pos
    }

    pub fn data_position(&self) -> u64 {
        self.base_offset + self.pos as u64
    }

    pub fn byte_at(&self, offset_from_pos: isize) -> u8 {
        self.buffer[(self.pos as isize + offset_from_pos) as usize]
    }

    /// Walks forward from `pos` comparing against `pos - distance - 1`, up
    /// to `min(available, max_match_len)`, to compute the true length of a
    /// rep-distance extension.
    pub fn true_match_len(&self, distance: usize, max_match_len: usize) -> usize {
        if distance + 1 > self.pos {
            return 0;
        }
        let avail = self.avail_bytes().min(max_match_len);
        let src_start = self.pos - distance - 1;
        let mut len = 0;
        while len < avail && self.buffer[src_start + len] == self.buffer[self.pos + len] {
            len += 1;
        }
        len
    }

    fn hash2_value(&self) -> usize {
        let b0 = self.buffer[self.pos] as u32;
        let b1 = self.buffer[self.pos + 1] as u32;
        (((b0 << 8) ^ b1).wrapping_mul(0x9E37_79B1) >> (32 - HASH2_BITS)) as usize
    }

    fn hash3_value(&self) -> usize {
        let b0 = self.buffer[self.pos] as u32;
        let b1 = self.buffer[self.pos + 1] as u32;
        let b2 = self.buffer[self.pos + 2] as u32;
        let h = (b0 << 16) ^ (b1 << 8) ^ b2;
        (h.wrapping_mul(0x9E37_79B1) >> (32 - HASH3_BITS)) as usize
    }

    fn hash4_value(&self) -> usize {
        let b0 = self.buffer[self.pos] as u32;
        let b1 = self.buffer[self.pos + 1] as u32;
        let b2 = self.buffer[self.pos + 2] as u32;
        let b3 = self.buffer[self.pos + 3] as u32;
        let h = (b0 << 24) ^ (b1 << 16) ^ (b2 << 8) ^ b3;
        (h.wrapping_mul(0x9E37_79B1) >> (32 - self.hash4_bits)) as usize
    }

    /// Advances by one position, returning sorted increasing-length match
    /// candidates found via the hash tables and binary tree.
    pub fn get_matches(&mut self) -> Vec<MatchPair> {
        let mut matches = Vec::new();
        let avail = self.avail_bytes();
        if avail < 4 {
            self.skip_insert(avail);
            return matches;
        }
        let max_len = avail.min(crate::models::MAX_MATCH_LEN);

        let h2 = self.hash2_value();
        let h2_pos = self.hash2[h2];
        if h2_pos >= 0 {
            let dist = (self.pos as i64 - h2_pos as i64 - 1) as u32;
            if (dist as usize) < self.dictionary_size {
                let len = self.match_len_at(dist as usize, max_len);
                if len >= 2 {
                    matches.push(MatchPair { len, dist });
                }
            }
        }
        self.hash2[h2] = self.pos as i32;

        let h3 = self.hash3_value();
        let h3_pos = self.hash3[h3];
        if h3_pos >= 0 {
            let dist = (self.pos as i64 - h3_pos as i64 - 1) as u32;
            if (dist as usize) < self.dictionary_size {
                let len = self.match_len_at(dist as usize, max_len);
                if len >= 3 && matches.last().map_or(true, |m| len > m.len) {
                    matches.push(MatchPair { len, dist });
                }
            }
        }
        self.hash3[h3] = self.pos as i32;

        let h4 = self.hash4_value();
        let tree_root = self.hash4[h4];
        self.hash4[h4] = self.pos as i32;

        let tree_matches = self.walk_binary_tree(tree_root, max_len);
        for m in tree_matches {
            if matches.last().map_or(true, |last| m.len > last.len) {
                matches.push(m);
            }
        }

        self.pos += 1;
        if self.pos >= self.pos_limit {
            self.normalize();
        }
        matches
    }

    /// Inserts `n` positions into the hash/tree structures without
    /// emitting match candidates — used once `avail_bytes` drops below 4
    /// near end of stream, where no full 4-byte key exists.
    fn skip_insert(&mut self, avail: usize) {
        if avail == 0 {
            return;
        }
        self.pos += 1;
        if self.pos >= self.pos_limit {
            self.normalize();
        }
    }

    fn match_len_at(&self, dist: usize, max_len: usize) -> usize {
        let src_start = self.pos - dist - 1;
        let mut len = 0;
        while len < max_len && self.buffer[src_start + len] == self.buffer[self.pos + len] {
            len += 1;
        }
        len
    }

    fn walk_binary_tree(&mut self, root: i32, max_len: usize) -> Vec<MatchPair> {
        let mut result = Vec::new();
        let cyclic_cap = self.dictionary_size + 1;
        let cyclic_pos = self.pos % cyclic_cap;

        let mut left_idx = cyclic_pos * 2;
        let mut right_idx = cyclic_pos * 2 + 1;
        let mut cur = root;
        let mut len_left = 0usize;
        let mut len_right = 0usize;
        let mut best_len = 0usize;

        let mut cycles = self.cycles;
        while cur >= 0 && cycles > 0 {
            cycles -= 1;
            let cur_pos = cur as usize;
            let dist = self.pos - cur_pos - 1;
            if dist >= self.dictionary_size {
                break;
            }
            let cur_cyclic = cur_pos % cyclic_cap;

            let mut len = len_left.min(len_right);
            let src_start = self.pos - dist - 1;
            while len < max_len && self.buffer[src_start + len] == self.buffer[self.pos + len] {
                len += 1;
            }
            if len > best_len {
                best_len = len;
                result.push(MatchPair {
                    len,
                    dist: dist as u32,
                });
                if len >= max_len {
                    self.pos_array[left_idx] = self.pos_array[cur_cyclic * 2];
                    self.pos_array[right_idx] = self.pos_array[cur_cyclic * 2 + 1];
                    break;
                }
            }

            if len < max_len && self.buffer[src_start + len] < self.buffer[self.pos + len] {
                self.pos_array[left_idx] = cur;
                left_idx = cur_cyclic * 2 + 1;
                cur = self.pos_array[left_idx];
                len_left = len;
            } else {
                self.pos_array[right_idx] = cur;
                right_idx = cur_cyclic * 2;
                cur = self.pos_array[right_idx];
                len_right = len;
            }
        }
        self.pos_array[left_idx] = NIL;
        self.pos_array[right_idx] = NIL;
        result
    }

    /// Slides the buffer left once `pos` reaches `pos_limit`, keeping
    /// `pos_array`/hash-table indices valid by subtracting the same offset
    /// from every stored entry (saturating at 0 / nil).
    fn normalize(&mut self) {
        let offset = self
            .pos
            .saturating_sub(self.before_size)
            .saturating_sub(self.dictionary_size);
        if offset == 0 {
            self.pos_limit = self.buffer.len();
            return;
        }
        let len = self.stream_pos - offset;
        self.buffer.copy_within(offset..self.stream_pos, 0);
        self.stream_pos = len;
        self.pos -= offset;
        self.base_offset += offset as u64;

        for v in self.hash2.iter_mut().chain(self.hash3.iter_mut()).chain(self.hash4.iter_mut()) {
            if *v >= 0 {
                *v = (*v - offset as i32).max(NIL);
            }
        }
        for v in self.pos_array.iter_mut() {
            if *v >= 0 {
                *v = (*v - offset as i32).max(NIL);
            }
        }
        self.pos_limit = self.buffer.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_repeated_run() {
        let mut mf = MatchFinder::new(1 << 16, 16, 2);
        let data = b"abcabcabcabc";
        mf.write(data);
        mf.set_stream_end();
        let mut any_match = false;
        for _ in 0..data.len() {
            let matches = mf.get_matches();
            if !matches.is_empty() {
                any_match = true;
            }
        }
        assert!(any_match);
    }
}
