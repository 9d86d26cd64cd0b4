//! TIFF-flavored LZW (compression 5), MSB-first with the early-change code
//! width switch, via `weezl`.

use weezl::{decode::Decoder as LzwDecoder, encode::Encoder as LzwEncoder, BitOrder};

use crate::codec::CodecOptions;
use crate::error::{TiffError, TiffResult, TiffUnsupportedError};

/// Compresses one tile; the output always starts with the clear code.
pub fn encode(data: &[u8], _options: &CodecOptions) -> TiffResult<Vec<u8>> {
    let mut encoder = LzwEncoder::with_tiff_size_switch(BitOrder::Msb, 8);
    let mut out = Vec::with_capacity(data.len() / 2 + 16);
    encoder.into_stream(&mut out).encode_all(data).status?;
    Ok(out)
}

/// Decompresses one tile.
///
/// Streams beginning `00 01` were produced by the TIFF 5.0 encoder, which
/// packed codes LSB-first; those are diagnosed rather than misdecoded.
pub fn decode(data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
    if data.len() >= 2 && data[0] == 0x00 && data[1] == 0x01 {
        return Err(TiffError::UnsupportedError(TiffUnsupportedError::OldStyleLzw));
    }
    let limit = options.max_decoded_size;
    let mut decoder = LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8);
    let mut out = Vec::with_capacity(options.decoded_len().min(limit));
    decoder
        .into_stream(&mut out)
        .decode_all(data)
        .status
        .map_err(|_| {
            TiffError::FormatError(crate::error::TiffFormatError::Format(String::from(
                "LZW compressed data corrupted",
            )))
        })?;
    if out.len() > limit {
        out.truncate(limit);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(len: usize) -> CodecOptions {
        CodecOptions::builder(len as u32, 1).build()
    }

    /// Deterministic pseudo-random bytes, xorshift-flavored.
    fn noise(len: usize, mut seed: u32) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                (seed >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn stream_starts_with_clear_code() {
        let data = noise(100, 0x3FD5_11E7);
        let encoded = encode(&data, &opts(data.len())).unwrap();
        // The 9-bit clear code 256, MSB-first, puts 0x80 in the first byte.
        assert_eq!(encoded[0], 0x80);
        assert_eq!(decode(&encoded, &opts(data.len())).unwrap(), data);
    }

    #[test]
    fn round_trip_compressible_data() {
        let mut data = vec![0u8; 4096];
        for (i, b) in data.iter_mut().enumerate() {
            *b = ((i / 64) % 251) as u8;
        }
        let encoded = encode(&data, &opts(data.len())).unwrap();
        assert!(encoded.len() < data.len());
        assert_eq!(decode(&encoded, &opts(data.len())).unwrap(), data);
    }

    #[test]
    fn old_style_stream_is_rejected() {
        let err = decode(&[0x00, 0x01, 0x12, 0x34], &opts(16)).unwrap_err();
        assert!(matches!(
            err,
            TiffError::UnsupportedError(TiffUnsupportedError::OldStyleLzw)
        ));
    }
}
