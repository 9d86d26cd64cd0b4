//! Pixel-major / channel-major sample layout transforms.

use crate::error::{TiffError, TiffFormatError, TiffResult};

fn check_len(data: &[u8], channels: usize, bytes_per_sample: usize, pixels: usize) -> TiffResult<()> {
    let expected = channels
        .checked_mul(bytes_per_sample)
        .and_then(|n| n.checked_mul(pixels))
        .ok_or(TiffError::LimitsExceeded)?;
    if data.len() != expected {
        return Err(TiffError::FormatError(
            TiffFormatError::InconsistentSizesEncountered,
        ));
    }
    Ok(())
}

/// Channel-major `n·(p·b)` to pixel-major `p·(n·b)`.
pub fn interleave(
    data: &[u8],
    channels: usize,
    bytes_per_sample: usize,
    pixels: usize,
) -> TiffResult<Vec<u8>> {
    check_len(data, channels, bytes_per_sample, pixels)?;
    if channels == 1 {
        return Ok(data.to_vec());
    }
    let mut out = vec![0u8; data.len()];
    let plane = pixels * bytes_per_sample;
    let stride = channels * bytes_per_sample;
    for c in 0..channels {
        let src = &data[c * plane..][..plane];
        for p in 0..pixels {
            let from = p * bytes_per_sample;
            let to = p * stride + c * bytes_per_sample;
            out[to..to + bytes_per_sample].copy_from_slice(&src[from..from + bytes_per_sample]);
        }
    }
    Ok(out)
}

/// Pixel-major `p·(n·b)` to channel-major `n·(p·b)`.
pub fn separate(
    data: &[u8],
    channels: usize,
    bytes_per_sample: usize,
    pixels: usize,
) -> TiffResult<Vec<u8>> {
    check_len(data, channels, bytes_per_sample, pixels)?;
    if channels == 1 {
        return Ok(data.to_vec());
    }
    let mut out = vec![0u8; data.len()];
    let plane = pixels * bytes_per_sample;
    let stride = channels * bytes_per_sample;
    for c in 0..channels {
        let dst = &mut out[c * plane..][..plane];
        for p in 0..pixels {
            let from = p * stride + c * bytes_per_sample;
            let to = p * bytes_per_sample;
            dst[to..to + bytes_per_sample].copy_from_slice(&data[from..from + bytes_per_sample]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_small_shapes() {
        for channels in 1..=5usize {
            for bytes_per_sample in 1..=5usize {
                for pixels in [1usize, 2, 7] {
                    let len = channels * bytes_per_sample * pixels;
                    let data: Vec<u8> = (0..len).map(|i| (i * 37 % 251) as u8).collect();
                    let inter = interleave(&data, channels, bytes_per_sample, pixels).unwrap();
                    let back = separate(&inter, channels, bytes_per_sample, pixels).unwrap();
                    assert_eq!(back, data, "n={channels} b={bytes_per_sample} p={pixels}");
                    let sep = separate(&data, channels, bytes_per_sample, pixels).unwrap();
                    let forth = interleave(&sep, channels, bytes_per_sample, pixels).unwrap();
                    assert_eq!(forth, data, "n={channels} b={bytes_per_sample} p={pixels}");
                }
            }
        }
    }

    #[test]
    fn interleave_rgb_rows() {
        // Three planes of two pixels each.
        let planar = [1, 2, 10, 20, 100, 200];
        let interleaved = interleave(&planar, 3, 1, 2).unwrap();
        assert_eq!(interleaved, vec![1, 10, 100, 2, 20, 200]);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(interleave(&[0u8; 5], 2, 1, 3).is_err());
        assert!(separate(&[0u8; 5], 2, 1, 3).is_err());
    }
}
