//! Chunk payload codec: byte shuffle followed by deflate, framed with the
//! raw length and a CRC-32 of the unshuffled bytes.

use std::convert::TryInto;
use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{Result, TableError};

/// Bytes of framing preceding the compressed body: raw length + CRC-32.
pub const CHUNK_FRAME_SIZE: usize = 8;

/// A fixed-width little-endian array element.
pub trait Element: Copy + PartialEq + std::fmt::Debug {
    const WIDTH: usize;

    fn store_le(self, dst: &mut [u8]);
    fn load_le(src: &[u8]) -> Self;

    /// Bit pattern used to persist the dataset fill value in the manifest.
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

impl Element for i8 {
    const WIDTH: usize = 1;

    fn store_le(self, dst: &mut [u8]) {
        dst[0] = self as u8;
    }

    fn load_le(src: &[u8]) -> Self {
        src[0] as i8
    }

    fn to_bits(self) -> u64 {
        u64::from(self as u8)
    }

    fn from_bits(bits: u64) -> Self {
        bits as u8 as i8
    }
}

impl Element for i64 {
    const WIDTH: usize = 8;

    fn store_le(self, dst: &mut [u8]) {
        dst[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn load_le(src: &[u8]) -> Self {
        i64::from_le_bytes(src[..8].try_into().expect("slice is 8 bytes"))
    }

    fn to_bits(self) -> u64 {
        self as u64
    }

    fn from_bits(bits: u64) -> Self {
        bits as i64
    }
}

impl Element for f64 {
    const WIDTH: usize = 8;

    fn store_le(self, dst: &mut [u8]) {
        dst[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn load_le(src: &[u8]) -> Self {
        f64::from_le_bytes(src[..8].try_into().expect("slice is 8 bytes"))
    }

    fn to_bits(self) -> u64 {
        self.to_bits()
    }

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

impl Element for u32 {
    const WIDTH: usize = 4;

    fn store_le(self, dst: &mut [u8]) {
        dst[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn load_le(src: &[u8]) -> Self {
        u32::from_le_bytes(src[..4].try_into().expect("slice is 4 bytes"))
    }

    fn to_bits(self) -> u64 {
        u64::from(self)
    }

    fn from_bits(bits: u64) -> Self {
        bits as u32
    }
}

impl Element for u64 {
    const WIDTH: usize = 8;

    fn store_le(self, dst: &mut [u8]) {
        dst[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn load_le(src: &[u8]) -> Self {
        u64::from_le_bytes(src[..8].try_into().expect("slice is 8 bytes"))
    }

    fn to_bits(self) -> u64 {
        self
    }

    fn from_bits(bits: u64) -> Self {
        bits
    }
}

/// Transposes `raw` so that byte lane `j` of every element becomes
/// contiguous. Runs of equal-significance bytes compress far better than
/// interleaved multi-byte values.
pub fn shuffle(raw: &[u8], width: usize) -> Vec<u8> {
    debug_assert!(width > 0 && raw.len() % width == 0);
    if width <= 1 {
        return raw.to_vec();
    }
    let count = raw.len() / width;
    let mut out = vec![0u8; raw.len()];
    for i in 0..count {
        for j in 0..width {
            out[j * count + i] = raw[i * width + j];
        }
    }
    out
}

/// Inverse of [`shuffle`].
pub fn unshuffle(shuffled: &[u8], width: usize) -> Vec<u8> {
    debug_assert!(width > 0 && shuffled.len() % width == 0);
    if width <= 1 {
        return shuffled.to_vec();
    }
    let count = shuffled.len() / width;
    let mut out = vec![0u8; shuffled.len()];
    for i in 0..count {
        for j in 0..width {
            out[i * width + j] = shuffled[j * count + i];
        }
    }
    out
}

/// Encodes one chunk payload: `[raw_len u32][crc32 u32][deflate(shuffled)]`.
pub fn encode_chunk(raw: &[u8], width: usize, level: u32) -> Result<Vec<u8>> {
    let raw_len: u32 = raw
        .len()
        .try_into()
        .map_err(|_| TableError::InvalidArgument("chunk payload exceeds u32::MAX".into()))?;
    let crc = crc32fast::hash(raw);

    let shuffled = shuffle(raw, width);
    let mut out = Vec::with_capacity(CHUNK_FRAME_SIZE + raw.len() / 2);
    out.extend_from_slice(&raw_len.to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());

    let mut encoder = DeflateEncoder::new(out, Compression::new(level));
    encoder.write_all(&shuffled)?;
    Ok(encoder.finish()?)
}

/// Decodes one chunk payload, verifying length and checksum.
pub fn decode_chunk(stored: &[u8], width: usize) -> Result<Vec<u8>> {
    if stored.len() < CHUNK_FRAME_SIZE {
        return Err(TableError::Corruption("chunk frame truncated".into()));
    }
    let raw_len =
        u32::from_le_bytes(stored[0..4].try_into().expect("slice is 4 bytes")) as usize;
    let crc = u32::from_le_bytes(stored[4..8].try_into().expect("slice is 4 bytes"));

    let mut shuffled = Vec::with_capacity(raw_len);
    let mut decoder = DeflateDecoder::new(&stored[CHUNK_FRAME_SIZE..]);
    decoder
        .read_to_end(&mut shuffled)
        .map_err(|e| TableError::Corruption(format!("chunk inflate failed: {e}")))?;

    if shuffled.len() != raw_len {
        return Err(TableError::Corruption(format!(
            "chunk length mismatch: expected {raw_len} bytes, inflated {}",
            shuffled.len()
        )));
    }
    if raw_len % width != 0 {
        return Err(TableError::Corruption(
            "chunk length is not a multiple of the element width".into(),
        ));
    }

    let raw = unshuffle(&shuffled, width);
    if crc32fast::hash(&raw) != crc {
        return Err(TableError::Corruption("chunk checksum mismatch".into()));
    }
    Ok(raw)
}
