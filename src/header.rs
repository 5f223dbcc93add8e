//! The 6-byte lzip member header and 20-byte member trailer.

use crate::error::{LzipError, Result};
use byteorder::{ByteOrder, LittleEndian};

pub const MAGIC: [u8; 4] = *b"LZIP";
pub const VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 6;
pub const TRAILER_SIZE: usize = 20;

pub const MIN_DICTIONARY_SIZE: u32 = 1 << 12;
pub const MAX_DICTIONARY_SIZE: u32 = 1 << 29;

/// Decoded form of the 6-byte member header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub dictionary_size: u32,
}

/// How many leading bytes of `buf` equal the magic at the same position.
/// Used to distinguish a merely-absent header (`header_error`) from a
/// corrupted one that still resembles lzip (`data_error`), per spec §7.
fn magic_match_count(buf: &[u8]) -> usize {
    buf.iter()
        .zip(MAGIC.iter())
        .take_while(|(a, b)| a == b)
        .count()
}

/// Classifies a failed header as an outright absence of the magic
/// (`HeaderError`) or a plausible-but-corrupted member (`DataError`).
pub fn classify_bad_magic(buf: &[u8]) -> LzipError {
    if magic_match_count(buf) >= 2 {
        LzipError::DataError("corrupted member: magic partially matches".into())
    } else {
        LzipError::HeaderError("bad magic bytes".into())
    }
}

/// Decodes the dictionary-size byte: `base = 1 << (byte & 0x1F)`,
/// `reduction = (byte >> 5) & 7`, `dict = base - (base / 16) * reduction`.
pub fn decode_dictionary_size(byte: u8) -> Option<u32> {
    let base: u32 = 1u32 << (byte & 0x1F);
    let reduction: u32 = ((byte >> 5) & 7) as u32;
    let dict = base.saturating_sub((base / 16) * reduction);
    if (MIN_DICTIONARY_SIZE..=MAX_DICTIONARY_SIZE).contains(&dict) {
        Some(dict)
    } else {
        None
    }
}

/// Picks the smallest encodable byte for a dictionary size, preferring
/// `reduction = 0` (an exact power of two) when possible, otherwise the
/// smallest `reduction` that reaches at least `dict_size`.
pub fn encode_dictionary_size(dict_size: u32) -> u8 {
    let dict_size = dict_size.clamp(MIN_DICTIONARY_SIZE, MAX_DICTIONARY_SIZE);
    for log2 in 12..=29u32 {
        let base = 1u32 << log2;
        if base == dict_size {
            return log2 as u8;
        }
        if base > dict_size {
            for reduction in 1..=7u32 {
                let candidate = base - (base / 16) * reduction;
                if candidate <= dict_size {
                    return (log2 as u8) | ((reduction as u8) << 5);
                }
            }
        }
    }
    29
}

impl Header {
    pub fn parse(buf: &[u8; HEADER_SIZE]) -> Result<Header> {
        if buf[0..4] != MAGIC {
            return Err(classify_bad_magic(buf));
        }
        let version = buf[4];
        if version != VERSION {
            return Err(LzipError::HeaderError(format!(
                "unsupported version {}",
                version
            )));
        }
        let dictionary_size = decode_dictionary_size(buf[5])
            .ok_or_else(|| LzipError::HeaderError("invalid dictionary size byte".into()))?;
        Ok(Header {
            version,
            dictionary_size,
        })
    }

    pub fn write(&self, out: &mut [u8; HEADER_SIZE]) {
        out[0..4].copy_from_slice(&MAGIC);
        out[4] = self.version;
        out[5] = encode_dictionary_size(self.dictionary_size);
    }
}

/// Decoded form of the 20-byte member trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Trailer {
    pub data_crc: u32,
    pub data_size: u64,
    pub member_size: u64,
}

impl Trailer {
    pub fn parse(buf: &[u8; TRAILER_SIZE]) -> Trailer {
        Trailer {
            data_crc: LittleEndian::read_u32(&buf[0..4]),
            data_size: LittleEndian::read_u64(&buf[4..12]),
            member_size: LittleEndian::read_u64(&buf[12..20]),
        }
    }

    pub fn write(&self, out: &mut [u8; TRAILER_SIZE]) {
        LittleEndian::write_u32(&mut out[0..4], self.data_crc);
        LittleEndian::write_u64(&mut out[4..12], self.data_size);
        LittleEndian::write_u64(&mut out[12..20], self.member_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_size_roundtrip_powers_of_two() {
        for log2 in 12..=29u32 {
            let dict = 1u32 << log2;
            let byte = encode_dictionary_size(dict);
            assert_eq!(decode_dictionary_size(byte), Some(dict));
        }
    }

    #[test]
    fn dictionary_size_rejects_out_of_range() {
        // byte encodes log2=11 (base 2048), below the minimum.
        assert_eq!(decode_dictionary_size(11), None);
    }

    #[test]
    fn header_roundtrip() {
        let h = Header {
            version: VERSION,
            dictionary_size: 1 << 23,
        };
        let mut buf = [0u8; HEADER_SIZE];
        h.write(&mut buf);
        let parsed = Header::parse(&buf).unwrap();
        assert_eq!(parsed.version, h.version);
        assert_eq!(parsed.dictionary_size, h.dictionary_size);
    }

    #[test]
    fn bad_magic_is_header_error_when_unrelated() {
        let buf = [0u8; HEADER_SIZE];
        match classify_bad_magic(&buf) {
            LzipError::HeaderError(_) => {}
            other => panic!("expected header_error, got {other:?}"),
        }
    }

    #[test]
    fn bad_magic_is_data_error_when_partially_matching() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = b'L';
        buf[1] = b'Z';
        buf[2] = b'x';
        match classify_bad_magic(&buf) {
            LzipError::DataError(_) => {}
            other => panic!("expected data_error, got {other:?}"),
        }
    }

    #[test]
    fn trailer_roundtrip() {
        let t = Trailer {
            data_crc: 0xDEAD_BEEF,
            data_size: 12345,
            member_size: 67890,
        };
        let mut buf = [0u8; TRAILER_SIZE];
        t.write(&mut buf);
        assert_eq!(Trailer::parse(&buf), t);
    }
}
