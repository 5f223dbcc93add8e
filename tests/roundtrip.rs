//! End-to-end scenarios from spec §8: whole-crate round-tripping across
//! compression levels, arbitrary chunking on both the compress and
//! decompress sides, and the documented corruption/truncation failure
//! modes. Small per-module unit tests live beside their modules instead;
//! this file is reserved for behavior that only shows up when the full
//! `Encoder`/`Decoder` pair is driven end to end.

use lzip_rs::{io, CompressionLevel, Decoder, Encoder, LzipError};

/// Deterministic xorshift32 PRNG so "random" test input is reproducible
/// without pulling in a `rand` dependency just for tests.
struct Xorshift32(u32);

impl Xorshift32 {
    fn new(seed: u32) -> Self {
        Xorshift32(seed | 1)
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn fill_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            out.extend_from_slice(&self.next_u32().to_le_bytes());
        }
        out.truncate(len);
        out
    }
}

fn compress_all(data: &[u8], level: CompressionLevel) -> Vec<u8> {
    let mut enc = Encoder::new(level.params()).unwrap();
    let mut out = Vec::new();
    let mut scratch = [0u8; 4096];
    let mut offset = 0;
    while offset < data.len() {
        offset += enc.write(&data[offset..]).unwrap();
        out.extend_from_slice(&drain(&mut enc, &mut scratch));
    }
    enc.finish().unwrap();
    out.extend_from_slice(&drain(&mut enc, &mut scratch));
    out
}

fn drain(enc: &mut Encoder, scratch: &mut [u8]) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let n = enc.read(scratch).unwrap();
        out.extend_from_slice(&scratch[..n]);
        if n == 0 {
            break;
        }
    }
    out
}

fn decompress_in_chunks(compressed: &[u8], chunk_sizes: &[usize]) -> Vec<u8> {
    let mut dec = Decoder::new();
    let mut out = Vec::new();
    let mut scratch = [0u8; 8192];
    let mut offset = 0;
    let mut chunk_idx = 0;
    while offset < compressed.len() {
        let chunk = chunk_sizes[chunk_idx % chunk_sizes.len()].max(1);
        chunk_idx += 1;
        let end = offset.saturating_add(chunk).min(compressed.len());
        let mut written = 0;
        while written < end - offset {
            written += dec.write(&compressed[offset + written..end]).unwrap();
            loop {
                let n = dec.read(&mut scratch).unwrap();
                out.extend_from_slice(&scratch[..n]);
                if n == 0 {
                    break;
                }
            }
        }
        offset = end;
    }
    out
}

#[test]
fn roundtrips_every_compression_level() {
    let samples: Vec<Vec<u8>> = vec![
        Vec::new(),
        b"x".to_vec(),
        b"hello hello hello world world world".to_vec(),
        Xorshift32::new(42).fill_bytes(4096),
        (0..8000u32).map(|i| (i % 197) as u8).collect(),
    ];
    for digit in 0..=9u8 {
        let level = CompressionLevel::from_digit(digit).unwrap();
        for data in &samples {
            let compressed = compress_all(data, level);
            assert_eq!(&compressed[0..4], b"LZIP", "level {digit}");
            let decompressed = decompress_in_chunks(&compressed, &[usize::MAX]);
            assert_eq!(&decompressed, data, "level {digit} mismatched round-trip");
        }
    }
}

#[test]
fn compressed_output_always_begins_with_magic() {
    for digit in 0..=9u8 {
        let level = CompressionLevel::from_digit(digit).unwrap();
        let compressed = compress_all(b"any nonempty payload", level);
        assert_eq!(&compressed[0..4], b"LZIP");
    }
}

#[test]
fn splitting_the_compressed_stream_does_not_change_the_result() {
    let data: Vec<u8> = (0..20000u32).map(|i| (i % 233) as u8).collect();
    let compressed = compress_all(&data, CompressionLevel::Level6);

    let whole = decompress_in_chunks(&compressed, &[usize::MAX]);
    let chunked = decompress_in_chunks(&compressed, &[1, 7, 64, 4096]);
    assert_eq!(whole, data);
    assert_eq!(chunked, data);
}

#[test]
fn feeding_source_in_four_chunks_then_finishing_decompresses_correctly() {
    let mut data = Vec::with_capacity(445);
    let mut rng = Xorshift32::new(7);
    data.extend(rng.fill_bytes(445));

    let mut enc = Encoder::new(CompressionLevel::Level3.params()).unwrap();
    let mut compressed = Vec::new();
    let mut scratch = [0u8; 4096];
    let mut offset = 0;
    for chunk_len in [130, 110, 105, 100] {
        let end = offset + chunk_len;
        while offset < end {
            offset += enc.write(&data[offset..end]).unwrap();
            compressed.extend_from_slice(&drain(&mut enc, &mut scratch));
        }
    }
    assert_eq!(offset, data.len());
    enc.finish().unwrap();
    compressed.extend_from_slice(&drain(&mut enc, &mut scratch));

    let decompressed = decompress_in_chunks(&compressed, &[usize::MAX]);
    assert_eq!(decompressed, data);
}

#[test]
fn splitting_at_absolute_offsets_decompresses_correctly() {
    let mut data = Vec::with_capacity(445);
    let mut rng = Xorshift32::new(99);
    data.extend(rng.fill_bytes(445));

    let compressed = compress_all(&data, CompressionLevel::Level0);
    let cut_points = [20usize, 40, 60, 100, compressed.len()];

    let mut dec = Decoder::new();
    let mut out = Vec::new();
    let mut scratch = [0u8; 8192];
    let mut prev = 0;
    for &cut in &cut_points {
        let mut offset = prev;
        while offset < cut {
            offset += dec.write(&compressed[offset..cut]).unwrap();
            loop {
                let n = dec.read(&mut scratch).unwrap();
                out.extend_from_slice(&scratch[..n]);
                if n == 0 {
                    break;
                }
            }
        }
        prev = cut;
    }
    assert_eq!(out, data);
}

#[test]
fn truncating_the_trailer_surfaces_as_incomplete_not_corrupt() {
    let data = vec![b'q'; 1 << 20];
    let mut compressed = compress_all(&data, CompressionLevel::Level0);
    compressed.truncate(compressed.len() - 5);

    let mut dec = Decoder::new();
    let mut scratch = [0u8; 1 << 16];
    let mut offset = 0;
    while offset < compressed.len() {
        offset += dec.write(&compressed[offset..]).unwrap();
        loop {
            let n = dec.read(&mut scratch).unwrap();
            if n == 0 {
                break;
            }
        }
    }
    assert!(!dec.finished());
    assert!(dec.errno().is_none(), "truncation alone should not latch a fatal error");
}

#[test]
fn flipping_a_bit_mid_stream_surfaces_a_data_error() {
    let data = vec![b'r'; 1 << 20];
    let mut compressed = compress_all(&data, CompressionLevel::Level0);
    let mid = compressed.len() / 2;
    compressed[mid] ^= 0x01;

    let mut dec = Decoder::new();
    let mut scratch = [0u8; 1 << 16];
    let mut saw_error = false;
    for chunk in compressed.chunks(4096) {
        if dec.write(chunk).is_err() {
            saw_error = true;
            break;
        }
        if dec.read(&mut scratch).is_err() {
            saw_error = true;
            break;
        }
    }
    assert!(saw_error);
}

#[test]
fn multiple_concatenated_members_decode_as_one_stream() {
    let first = b"first member".to_vec();
    let second = b"second member".to_vec();

    let mut enc = Encoder::new(CompressionLevel::Level1.params()).unwrap();
    let mut scratch = [0u8; 4096];
    enc.write(&first).unwrap();
    enc.finish().unwrap();
    let mut compressed = drain(&mut enc, &mut scratch);

    enc.restart_member(1 << 20).unwrap();
    enc.write(&second).unwrap();
    enc.finish().unwrap();
    compressed.extend(drain(&mut enc, &mut scratch));

    let decompressed = decompress_in_chunks(&compressed, &[usize::MAX]);
    let mut expected = first;
    expected.extend(second);
    assert_eq!(decompressed, expected);
}

#[test]
fn one_shot_helpers_agree_with_the_streaming_api() {
    use std::io::Cursor;

    let data = b"one-shot helper parity check, repeated repeated repeated".to_vec();
    let streamed = compress_all(&data, CompressionLevel::Level4);

    let mut via_helper = Vec::new();
    io::compress(&mut Cursor::new(&data[..]), &mut via_helper, CompressionLevel::Level4).unwrap();
    assert_eq!(&via_helper[0..4], b"LZIP");

    let mut decompressed_streamed = Vec::new();
    io::decompress(&mut Cursor::new(&streamed[..]), &mut decompressed_streamed).unwrap();
    let mut decompressed_helper = Vec::new();
    io::decompress(&mut Cursor::new(&via_helper[..]), &mut decompressed_helper).unwrap();

    assert_eq!(decompressed_streamed, data);
    assert_eq!(decompressed_helper, data);
}

#[test]
fn bad_header_at_stream_start_is_header_error_not_data_error() {
    let mut dec = Decoder::new();
    let garbage = [0u8; 64];
    let result = dec.write(&garbage);
    assert!(matches!(result, Err(LzipError::HeaderError(_))));
}
