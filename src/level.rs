//! Compression-level presets, mirroring the ten `-0`..`-9` levels of the
//! lzip command-line tool: each level fixes a dictionary size and a match
//! length limit, and `0` is special-cased to select the greedy encoder
//! (see [`crate::encode::EncoderBody::new`]).

/// The default member size limit presets use: large enough that ordinary
/// inputs never trigger an automatic `restart_member`, but still within the
/// `2^51` cap the container orchestrator enforces.
pub const DEFAULT_MEMBER_SIZE_LIMIT: u64 = 1 << 51;

/// Parameters needed to construct an [`crate::encoder::Encoder`]: dictionary
/// size in bytes, the match-length limit ("nice length") passed to the match
/// finder, and the member size limit at which the container orchestrator
/// automatically starts a new member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderParams {
    pub dictionary_size: u32,
    pub match_len_limit: u32,
    pub member_size_limit: u64,
}

/// One of the ten preset compression levels. `Level6` is lzip's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    Level0,
    Level1,
    Level2,
    Level3,
    Level4,
    Level5,
    Level6,
    Level7,
    Level8,
    Level9,
}

impl CompressionLevel {
    /// The `(dictionary_size, match_len_limit)` pair for this level. Level
    /// 0's dictionary size of `65535` (not `1 << 16`) is what selects the
    /// fast greedy encoder body in [`crate::encode::EncoderBody::new`].
    pub fn params(self) -> EncoderParams {
        let (dictionary_size, match_len_limit) = match self {
            CompressionLevel::Level0 => (65535, 16),
            CompressionLevel::Level1 => (1 << 20, 5),
            CompressionLevel::Level2 => (1 << 19, 6),
            CompressionLevel::Level3 => (1 << 21, 8),
            CompressionLevel::Level4 => (1 << 20, 12),
            CompressionLevel::Level5 => (1 << 22, 20),
            CompressionLevel::Level6 => (1 << 23, 36),
            CompressionLevel::Level7 => (1 << 24, 68),
            CompressionLevel::Level8 => (1 << 23, 132),
            CompressionLevel::Level9 => (1 << 25, 273),
        };
        EncoderParams {
            dictionary_size,
            match_len_limit,
            member_size_limit: DEFAULT_MEMBER_SIZE_LIMIT,
        }
    }

    /// Maps a CLI-style `-0`..`-9` digit to its level, if in range.
    pub fn from_digit(digit: u8) -> Option<CompressionLevel> {
        Some(match digit {
            0 => CompressionLevel::Level0,
            1 => CompressionLevel::Level1,
            2 => CompressionLevel::Level2,
            3 => CompressionLevel::Level3,
            4 => CompressionLevel::Level4,
            5 => CompressionLevel::Level5,
            6 => CompressionLevel::Level6,
            7 => CompressionLevel::Level7,
            8 => CompressionLevel::Level8,
            9 => CompressionLevel::Level9,
            _ => return None,
        })
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel::Level6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level0_selects_fast_encoder_dictionary_size() {
        assert_eq!(CompressionLevel::Level0.params().dictionary_size, 65535);
    }

    #[test]
    fn from_digit_rejects_out_of_range() {
        assert!(CompressionLevel::from_digit(10).is_none());
        assert_eq!(CompressionLevel::from_digit(6), Some(CompressionLevel::Level6));
    }

    #[test]
    fn default_is_level6() {
        assert_eq!(CompressionLevel::default(), CompressionLevel::Level6);
    }
}
