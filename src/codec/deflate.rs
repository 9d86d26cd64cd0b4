//! Zlib-wrapped Deflate (compression 8 and the older 32946).

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression as FlateCompression;

use crate::codec::CodecOptions;
use crate::error::{TiffError, TiffResult};

/// Maps the `[0, 1]` lossless level onto flate2's 0..9: zero stays stored,
/// everything else lands on `max(1, round(9·level))`.
fn flate_level(options: &CodecOptions) -> FlateCompression {
    match options.lossless_level {
        None => FlateCompression::default(),
        Some(level) => {
            let level = level.clamp(0.0, 1.0);
            if level == 0.0 {
                FlateCompression::new(0)
            } else {
                FlateCompression::new(((9.0 * level).round() as u32).max(1))
            }
        }
    }
}

pub fn encode(data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate_level(options));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompresses zlib streams, accepting multiple concatenated streams the
/// way some writers emit them.
pub fn decode(data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
    let limit = options.max_decoded_size;
    let mut out = Vec::with_capacity(options.decoded_len().min(limit));
    let mut remaining = data;
    while !remaining.is_empty() && out.len() < limit {
        let mut decoder = ZlibDecoder::new(remaining);
        decoder.read_to_end(&mut out)?;
        let consumed = decoder.total_in() as usize;
        if consumed == 0 {
            break;
        }
        remaining = &remaining[consumed..];
    }
    if out.len() > limit {
        return Err(TiffError::LimitsExceeded);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(len: usize, level: Option<f32>) -> CodecOptions {
        let builder = CodecOptions::builder(len as u32, 1);
        match level {
            Some(l) => builder.lossless_level(l).build(),
            None => builder.build(),
        }
    }

    #[test]
    fn round_trip() {
        let data: Vec<u8> = (0..4096).map(|i| ((i * i) % 253) as u8).collect();
        for level in [None, Some(0.0), Some(0.3), Some(1.0)] {
            let options = opts(data.len(), level);
            let encoded = encode(&data, &options).unwrap();
            assert_eq!(decode(&encoded, &options).unwrap(), data);
        }
    }

    #[test]
    fn concatenated_streams_are_accepted() {
        let a = vec![1u8; 100];
        let b = vec![2u8; 100];
        let options = opts(100, None);
        let mut joined = encode(&a, &options).unwrap();
        joined.extend(encode(&b, &options).unwrap());
        let all = decode(&joined, &opts(200, None)).unwrap();
        assert_eq!(&all[..100], &a[..]);
        assert_eq!(&all[100..], &b[..]);
    }

    #[test]
    fn level_mapping() {
        assert_eq!(flate_level(&opts(1, Some(0.0))).level(), 0);
        assert_eq!(flate_level(&opts(1, Some(0.05))).level(), 1);
        assert_eq!(flate_level(&opts(1, Some(0.5))).level(), 5);
        assert_eq!(flate_level(&opts(1, Some(1.0))).level(), 9);
    }
}
