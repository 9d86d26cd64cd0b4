//! JPEG 2000 code-streams (compression 34712 and the Aperio 33003/33005
//! variants) through the `jpeg2k` openjpeg wrapper.
//!
//! Lossless requests use the reversible 5/3 filter, lossy ones the
//! irreversible 9/7 filter with the rate derived from `quality`.

use jpeg2k::{DecodeParameters, EncodeParameters, Image};

use crate::codec::CodecOptions;
use crate::error::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError};
use crate::tags::CompressionScheme;

fn j2k_error(kind: &str, err: impl std::fmt::Display) -> TiffError {
    TiffError::FormatError(TiffFormatError::Format(format!("JPEG 2000 {kind}: {err}")))
}

fn check_shape(options: &CodecOptions) -> TiffResult<()> {
    if options.signed {
        return Err(TiffError::UnsupportedError(
            TiffUnsupportedError::CodecConstraint {
                scheme: CompressionScheme::Jpeg2000,
                reason: "only unsigned samples are supported",
            },
        ));
    }
    if !matches!(options.bits_per_sample, 8 | 16 | 32) {
        return Err(TiffError::UnsupportedError(
            TiffUnsupportedError::UnsupportedBitsPerChannel(options.bits_per_sample),
        ));
    }
    Ok(())
}

pub fn decode(data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
    check_shape(options)?;
    let mut params = DecodeParameters::new();
    if let Some(reduce) = options.resolution_level {
        params = params.reduce(reduce);
    }
    let image = Image::from_bytes_with(data, params).map_err(|e| j2k_error("decode", e))?;
    let pixels = image
        .get_pixels(None)
        .map_err(|e| j2k_error("pixel extraction", e))?;
    if pixels.data.len() > options.max_decoded_size {
        return Err(TiffError::LimitsExceeded);
    }
    Ok(pixels.data)
}

pub fn encode(data: &[u8], options: &CodecOptions, lossless: bool) -> TiffResult<Vec<u8>> {
    check_shape(options)?;
    if options.bits_per_sample != 8 {
        return Err(TiffError::UnsupportedError(
            TiffUnsupportedError::CodecConstraint {
                scheme: CompressionScheme::Jpeg2000,
                reason: "encoding is implemented for 8-bit samples",
            },
        ));
    }
    let expected = options.width as usize * options.height as usize * options.channels as usize;
    if data.len() != expected {
        return Err(TiffError::FormatError(
            TiffFormatError::InconsistentSizesEncountered,
        ));
    }

    let dynamic = match options.channels {
        1 => image::DynamicImage::ImageLuma8(
            image::GrayImage::from_raw(options.width, options.height, data.to_vec()).ok_or(
                TiffError::FormatError(TiffFormatError::InconsistentSizesEncountered),
            )?,
        ),
        3 => image::DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(options.width, options.height, data.to_vec()).ok_or(
                TiffError::FormatError(TiffFormatError::InconsistentSizesEncountered),
            )?,
        ),
        _ => {
            return Err(TiffError::UnsupportedError(
                TiffUnsupportedError::CodecConstraint {
                    scheme: CompressionScheme::Jpeg2000,
                    reason: "encoding takes 1 or 3 channels",
                },
            ))
        }
    };

    let image = Image::from_image(&dynamic).map_err(|e| j2k_error("image conversion", e))?;
    let mut params = EncodeParameters::new();
    // A lossy quality of q maps onto a target compression ratio; 1.0 is
    // treated as the reversible path.
    if !lossless {
        let quality = options.quality.unwrap_or(0.8).clamp(0.01, 1.0);
        let ratio = (1.0 / quality * 10.0).max(1.0);
        params = params.irreversible(true).compression_ratio(ratio);
    }
    if let Some(levels) = options.num_decomposition_levels {
        params = params.resolutions(levels + 1);
    }
    image
        .encode(params)
        .map_err(|e| j2k_error("encode", e))
}
