//! Baseline JPEG (compression 7): decode through `zune-jpeg`, encode through
//! the `image` crate's JPEG encoder. Abbreviated tile streams are merged
//! with the shared `JPEGTables` tag, and SOF3 frames are routed to the
//! lossless sub-codec.

use image::ImageEncoder;

use crate::codec::{jpeg_lossless, CodecOptions};
use crate::error::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError};
use crate::tags::{CompressionScheme, PhotometricInterpretation};

/// What a marker walk over the frame header tells us.
struct FrameInfo {
    sof_marker: u8,
    component_ids: Vec<u8>,
    /// Adobe APP14 color transform byte, when present.
    adobe_transform: Option<u8>,
}

/// Walks the marker stream up to the SOF segment.
fn scan_frame(data: &[u8]) -> TiffResult<FrameInfo> {
    let bad = || TiffError::FormatError(TiffFormatError::Format(String::from("broken JPEG stream")));
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(bad());
    }
    let mut at = 2usize;
    let mut adobe_transform = None;
    loop {
        if at + 4 > data.len() {
            return Err(bad());
        }
        if data[at] != 0xFF {
            return Err(bad());
        }
        let marker = data[at + 1];
        // Fill bytes before a marker are legal.
        if marker == 0xFF {
            at += 1;
            continue;
        }
        let seg_len = ((data[at + 2] as usize) << 8) | data[at + 3] as usize;
        match marker {
            0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC => {
                // A start-of-frame segment: precision(1) height(2) width(2)
                // components(1), then 3 bytes per component.
                let seg = &data[at + 4..];
                if seg_len < 8 || seg.len() < seg_len - 2 {
                    return Err(bad());
                }
                let component_count = seg[5] as usize;
                let mut component_ids = Vec::with_capacity(component_count);
                for c in 0..component_count {
                    let entry = 6 + c * 3;
                    if entry >= seg_len - 2 {
                        return Err(bad());
                    }
                    component_ids.push(seg[entry]);
                }
                return Ok(FrameInfo {
                    sof_marker: marker,
                    component_ids,
                    adobe_transform,
                });
            }
            0xEE => {
                // Adobe APP14: b"Adobe" then version, flags0, flags1,
                // transform.
                let seg = &data[at + 4..];
                if seg_len >= 2 + 12 && seg.len() >= 12 && &seg[..5] == b"Adobe" {
                    adobe_transform = Some(seg[11]);
                }
                at += 2 + seg_len;
            }
            0xD9 => return Err(bad()),
            _ => {
                at += 2 + seg_len;
            }
        }
    }
}

/// Splices the shared tables stream (SOI .. tables .. EOI) in front of an
/// abbreviated tile stream (SOI .. frame .. EOI).
fn merge_jpeg_tables(tables: &[u8], data: &[u8]) -> Vec<u8> {
    let has_soi = |b: &[u8]| b.len() >= 2 && b[0] == 0xFF && b[1] == 0xD8;
    if !has_soi(tables) || !has_soi(data) {
        return data.to_vec();
    }
    let mut tables_end = tables.len();
    // Drop the trailing EOI of the tables stream, tolerating pad bytes.
    while tables_end >= 2 {
        if tables[tables_end - 2] == 0xFF && tables[tables_end - 1] == 0xD9 {
            tables_end -= 2;
            break;
        }
        tables_end -= 1;
        if tables.len() - tables_end > 8 {
            tables_end = tables.len();
            break;
        }
    }
    let mut merged = Vec::with_capacity(tables_end + data.len() - 2);
    merged.extend_from_slice(&tables[..tables_end]);
    merged.extend_from_slice(&data[2..]);
    merged
}

/// In-place JFIF-style YCbCr to RGB conversion for 8-bit interleaved
/// triples.
fn ycbcr_to_rgb(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(3) {
        let y = px[0] as f32;
        let cb = px[1] as f32 - 128.0;
        let cr = px[2] as f32 - 128.0;
        px[0] = (y + 1.402 * cr).round().clamp(0.0, 255.0) as u8;
        px[1] = (y - 0.344_136 * cb - 0.714_136 * cr).round().clamp(0.0, 255.0) as u8;
        px[2] = (y + 1.772 * cb).round().clamp(0.0, 255.0) as u8;
    }
}

pub fn decode(data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
    let merged;
    let data = match options.jpeg_tables.as_deref() {
        Some(tables) if tables.len() > 4 => {
            merged = merge_jpeg_tables(tables, data);
            &merged[..]
        }
        _ => data,
    };

    let frame = scan_frame(data)?;
    match frame.sof_marker {
        // Baseline, extended sequential and progressive Huffman frames.
        0xC0 | 0xC1 | 0xC2 => {}
        // Lossless Huffman goes to the dedicated sub-codec.
        0xC3 => return jpeg_lossless::decode(data, options),
        // All arithmetic-coded frame types.
        0xC9 | 0xCA | 0xCB | 0xCD | 0xCE | 0xCF => {
            return Err(TiffError::UnsupportedError(
                TiffUnsupportedError::ArithmeticCodedJpeg,
            ))
        }
        _ => {
            return Err(TiffError::UnsupportedError(
                TiffUnsupportedError::CodecConstraint {
                    scheme: CompressionScheme::Jpeg,
                    reason: "unsupported JPEG frame type",
                },
            ))
        }
    }

    let mut decoder = zune_jpeg::JpegDecoder::new(data);
    let pixels = decoder.decode().map_err(|e| {
        TiffError::FormatError(TiffFormatError::Format(format!("JPEG decode: {e}")))
    })?;
    // Dimensions are taken from the stream itself; the caller reconciles
    // them against the tile grid (boundary tiles may be stored cropped).
    decoder
        .dimensions()
        .ok_or(TiffError::FormatError(TiffFormatError::Format(String::from(
            "JPEG stream without dimensions",
        ))))?;

    let mut pixels = pixels;
    // Streams declared YCbCr with 1x1 subsampling whose components are
    // labelled R,G,B (or an Adobe transform of 0) are emitted untouched by
    // the entropy decoder; the color transform is ours to do.
    if options.photometric == PhotometricInterpretation::YCbCr
        && options.ycbcr_subsampling == (1, 1)
        && frame.component_ids.len() == 3
        && (frame.component_ids == [b'R', b'G', b'B'] || frame.adobe_transform == Some(0))
    {
        ycbcr_to_rgb(&mut pixels);
    }

    // Some decoder configurations hand grayscale streams back as RGB
    // triples; collapse them for single-channel tiles.
    let gray_len = options.width as usize * options.height as usize;
    if options.channels == 1 && pixels.len() == gray_len * 3 {
        pixels = pixels.chunks_exact(3).map(|p| p[0]).collect();
    }

    if pixels.len() > options.max_decoded_size {
        return Err(TiffError::LimitsExceeded);
    }
    Ok(pixels)
}

pub fn encode(data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
    if options.bits_per_sample != 8 {
        return Err(TiffError::UnsupportedError(
            TiffUnsupportedError::CodecConstraint {
                scheme: CompressionScheme::Jpeg,
                reason: "baseline JPEG is 8-bit only",
            },
        ));
    }
    let color_type = match options.channels {
        1 => image::ExtendedColorType::L8,
        3 => image::ExtendedColorType::Rgb8,
        _ => {
            return Err(TiffError::UnsupportedError(
                TiffUnsupportedError::CodecConstraint {
                    scheme: CompressionScheme::Jpeg,
                    reason: "baseline JPEG encodes 1 or 3 channels",
                },
            ))
        }
    };
    let expected = options.width as usize * options.height as usize * options.channels as usize;
    if data.len() != expected {
        return Err(TiffError::FormatError(
            TiffFormatError::InconsistentSizesEncountered,
        ));
    }

    let quality = options
        .quality
        .map(|q| ((q * 100.0).round() as u8).clamp(1, 100))
        .unwrap_or(90);
    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .write_image(data, options.width, options.height, color_type)
        .map_err(|e| {
            TiffError::FormatError(TiffFormatError::Format(format!("JPEG encode: {e}")))
        })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_rgb(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x * 255 / width.max(1)) as u8);
                data.push((y * 255 / height.max(1)) as u8);
                data.push(128);
            }
        }
        data
    }

    #[test]
    fn encode_decode_stays_close() {
        let (w, h) = (32u32, 24u32);
        let original = gradient_rgb(w, h);
        let options = CodecOptions::builder(w, h)
            .channels(3)
            .bits_per_sample(8)
            .quality(0.95)
            .photometric(PhotometricInterpretation::YCbCr)
            .build();
        let encoded = encode(&original, &options).unwrap();
        assert_eq!(&encoded[..2], &[0xFF, 0xD8]);
        let decoded = decode(&encoded, &options).unwrap();
        assert_eq!(decoded.len(), original.len());
        // Lossy, but a smooth gradient at q95 stays within a few codes.
        let max_delta = original
            .iter()
            .zip(&decoded)
            .map(|(&a, &b)| (a as i16 - b as i16).unsigned_abs())
            .max()
            .unwrap();
        assert!(max_delta <= 24, "max delta {max_delta}");
    }

    #[test]
    fn grayscale_round_trip_shape() {
        let (w, h) = (16u32, 16u32);
        let original: Vec<u8> = (0..w * h).map(|i| (i % 251) as u8).collect();
        let options = CodecOptions::builder(w, h)
            .channels(1)
            .bits_per_sample(8)
            .quality(1.0)
            .build();
        let encoded = encode(&original, &options).unwrap();
        let decoded = decode(&encoded, &options).unwrap();
        assert_eq!(decoded.len(), original.len());
    }

    #[test]
    fn sixteen_bit_encode_is_rejected() {
        let options = CodecOptions::builder(4, 4).channels(1).bits_per_sample(16).build();
        assert!(encode(&[0u8; 32], &options).is_err());
    }

    #[test]
    fn tables_merge_splices_streams() {
        let tables = [0xFFu8, 0xD8, 0xFF, 0xDB, 0x00, 0x03, 0x01, 0xFF, 0xD9];
        let tile = [0xFFu8, 0xD8, 0xFF, 0xC0, 0x00, 0x03, 0x02, 0xFF, 0xD9];
        let merged = merge_jpeg_tables(&tables, &tile);
        assert_eq!(
            merged,
            vec![0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x03, 0x01, 0xFF, 0xC0, 0x00, 0x03, 0x02, 0xFF, 0xD9]
        );
    }

    #[test]
    fn ycbcr_conversion_hits_reference_values() {
        // Pure luma gray.
        let mut px = vec![128u8, 128, 128];
        ycbcr_to_rgb(&mut px);
        assert_eq!(px, vec![128, 128, 128]);
        // Saturated red in YCbCr terms.
        let mut px = vec![76u8, 85, 255];
        ycbcr_to_rgb(&mut px);
        assert!(px[0] > 240 && px[1] < 40 && px[2] < 40, "{px:?}");
    }
}
