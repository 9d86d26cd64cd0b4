//! Byte-level codecs for one tile, the differencing predictor and the
//! interleaving transforms that wrap them.
//!
//! Every codec sees the same shape: encoded bytes in, decoded bytes out (or
//! the reverse), with the tile geometry carried in an immutable
//! [`CodecOptions`]. No codec owns the tile.

use std::collections::BTreeMap;
use std::sync::Arc;

pub mod bits;
pub mod ccitt;
#[cfg(feature = "deflate")]
pub mod deflate;
pub mod interleave;
#[cfg(feature = "jpeg")]
pub mod jpeg;
pub mod jpeg_lossless;
#[cfg(feature = "jpeg2000")]
pub mod jpeg2000;
#[cfg(feature = "lzw")]
pub mod lzw;
pub mod packbits;
pub mod predictor;

use crate::error::{TiffError, TiffResult, TiffUnsupportedError};
use crate::stream::ByteOrder;
use crate::tags::{CompressionScheme, FillOrder, PhotometricInterpretation, Predictor};

/// The tile geometry and tuning knobs a codec may consult.
///
/// Construct through [`CodecOptions::builder`]; the struct itself is
/// immutable once built.
#[derive(Debug, Clone)]
pub struct CodecOptions {
    /// Pixels per row of the (possibly cropped) payload.
    pub width: u32,
    /// Rows of the payload.
    pub height: u32,
    /// Channels stored in this chunk; 1 for planar-separated planes.
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Byte order multi-byte samples are stored in.
    pub byte_order: ByteOrder,
    pub signed: bool,
    /// Whether the decoded bytes are pixel-major.
    pub interleaved: bool,
    /// Upper bound for a decoded tile; NONE also truncates/pads to this.
    pub max_decoded_size: usize,
    /// Lossy quality in `(0, 1]`.
    pub quality: Option<f32>,
    /// Effort knob for lossless compressors in `[0, 1]`.
    pub lossless_level: Option<f32>,
    pub photometric: PhotometricInterpretation,
    pub ycbcr_subsampling: (u16, u16),
    /// JPEG 2000 code-block size.
    pub code_block_size: (u32, u32),
    pub num_decomposition_levels: Option<u32>,
    pub resolution_level: Option<u32>,
    /// Shared JPEG tables (tag 347) for abbreviated streams.
    pub jpeg_tables: Option<Vec<u8>>,
    /// Raw `Group3Options` word.
    pub t4_options: u32,
    /// Raw `Group4Options` word.
    pub t6_options: u32,
}

impl CodecOptions {
    pub fn builder(width: u32, height: u32) -> CodecOptionsBuilder {
        CodecOptionsBuilder {
            options: CodecOptions {
                width,
                height,
                channels: 1,
                bits_per_sample: 8,
                byte_order: ByteOrder::native(),
                signed: false,
                interleaved: true,
                max_decoded_size: usize::MAX,
                quality: None,
                lossless_level: None,
                photometric: PhotometricInterpretation::BlackIsZero,
                ycbcr_subsampling: (2, 2),
                code_block_size: (64, 64),
                num_decomposition_levels: None,
                resolution_level: None,
                jpeg_tables: None,
                t4_options: 0,
                t6_options: 0,
            },
        }
    }

    /// Bytes one decoded row occupies, rows padded to byte boundaries.
    pub fn row_bytes(&self) -> usize {
        let bits = self.width as usize * self.channels as usize * self.bits_per_sample as usize;
        bits.div_ceil(8)
    }

    /// Bytes the full decoded payload occupies.
    pub fn decoded_len(&self) -> usize {
        self.row_bytes() * self.height as usize
    }
}

/// Builder for [`CodecOptions`].
#[derive(Debug, Clone)]
pub struct CodecOptionsBuilder {
    options: CodecOptions,
}

impl CodecOptionsBuilder {
    pub fn channels(mut self, channels: u16) -> Self {
        self.options.channels = channels;
        self
    }

    pub fn bits_per_sample(mut self, bits: u16) -> Self {
        self.options.bits_per_sample = bits;
        self
    }

    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.options.byte_order = byte_order;
        self
    }

    pub fn signed(mut self, signed: bool) -> Self {
        self.options.signed = signed;
        self
    }

    pub fn interleaved(mut self, interleaved: bool) -> Self {
        self.options.interleaved = interleaved;
        self
    }

    pub fn max_decoded_size(mut self, max: usize) -> Self {
        self.options.max_decoded_size = max;
        self
    }

    pub fn quality(mut self, quality: f32) -> Self {
        self.options.quality = Some(quality.clamp(f32::MIN_POSITIVE, 1.0));
        self
    }

    pub fn lossless_level(mut self, level: f32) -> Self {
        self.options.lossless_level = Some(level.clamp(0.0, 1.0));
        self
    }

    pub fn photometric(mut self, photometric: PhotometricInterpretation) -> Self {
        self.options.photometric = photometric;
        self
    }

    pub fn ycbcr_subsampling(mut self, factors: (u16, u16)) -> Self {
        self.options.ycbcr_subsampling = factors;
        self
    }

    pub fn code_block_size(mut self, size: (u32, u32)) -> Self {
        self.options.code_block_size = size;
        self
    }

    pub fn num_decomposition_levels(mut self, levels: u32) -> Self {
        self.options.num_decomposition_levels = Some(levels);
        self
    }

    pub fn resolution_level(mut self, level: u32) -> Self {
        self.options.resolution_level = Some(level);
        self
    }

    pub fn jpeg_tables(mut self, tables: Option<Vec<u8>>) -> Self {
        self.options.jpeg_tables = tables;
        self
    }

    pub fn t4_options(mut self, options: u32) -> Self {
        self.options.t4_options = options;
        self
    }

    pub fn t6_options(mut self, options: u32) -> Self {
        self.options.t6_options = options;
        self
    }

    pub fn build(self) -> CodecOptions {
        self.options
    }
}

/// A codec registered for a compression code outside the built-in catalog.
pub trait TileCodec: Send + Sync {
    fn encode(&self, data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>>;
    fn decode(&self, data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>>;
}

/// Per-reader/per-writer registry of external codecs, keyed on the raw
/// compression code. There is no process-wide registry.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: BTreeMap<u16, Arc<dyn TileCodec>>,
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codes", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CodecRegistry {
    pub fn new() -> CodecRegistry {
        CodecRegistry::default()
    }

    pub fn register(&mut self, code: u16, codec: Arc<dyn TileCodec>) {
        self.codecs.insert(code, codec);
    }

    pub fn lookup(&self, code: u16) -> Option<&Arc<dyn TileCodec>> {
        self.codecs.get(&code)
    }
}

/// The closed set of built-in codecs plus the boxed external fallback.
#[derive(Clone)]
#[non_exhaustive]
pub enum Codec {
    None,
    PackBits,
    #[cfg(feature = "lzw")]
    Lzw,
    #[cfg(feature = "deflate")]
    Deflate,
    CcittRle,
    CcittFax3,
    CcittFax4,
    #[cfg(feature = "jpeg")]
    Jpeg,
    LosslessJpeg,
    #[cfg(feature = "jpeg2000")]
    Jpeg2000 {
        lossless: bool,
    },
    External(u16, Arc<dyn TileCodec>),
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Codec::None => "None",
            Codec::PackBits => "PackBits",
            #[cfg(feature = "lzw")]
            Codec::Lzw => "Lzw",
            #[cfg(feature = "deflate")]
            Codec::Deflate => "Deflate",
            Codec::CcittRle => "CcittRle",
            Codec::CcittFax3 => "CcittFax3",
            Codec::CcittFax4 => "CcittFax4",
            #[cfg(feature = "jpeg")]
            Codec::Jpeg => "Jpeg",
            Codec::LosslessJpeg => "LosslessJpeg",
            #[cfg(feature = "jpeg2000")]
            Codec::Jpeg2000 { .. } => "Jpeg2000",
            Codec::External(code, _) => return write!(f, "External({code})"),
        };
        f.write_str(name)
    }
}

impl Codec {
    /// Resolves the codec for a compression scheme, consulting `registry`
    /// for codes with no built-in implementation.
    pub fn for_scheme(scheme: CompressionScheme, registry: &CodecRegistry) -> TiffResult<Codec> {
        let code = scheme.to_u16();
        let external = || registry.lookup(code).cloned().map(|c| Codec::External(code, c));
        match scheme {
            CompressionScheme::None => Ok(Codec::None),
            CompressionScheme::PackBits => Ok(Codec::PackBits),
            CompressionScheme::Lzw => {
                #[cfg(feature = "lzw")]
                {
                    Ok(Codec::Lzw)
                }
                #[cfg(not(feature = "lzw"))]
                {
                    external().ok_or(TiffError::UnsupportedError(
                        TiffUnsupportedError::UnsupportedCompressionScheme(scheme),
                    ))
                }
            }
            CompressionScheme::Deflate | CompressionScheme::OldDeflate => {
                #[cfg(feature = "deflate")]
                {
                    Ok(Codec::Deflate)
                }
                #[cfg(not(feature = "deflate"))]
                {
                    external().ok_or(TiffError::UnsupportedError(
                        TiffUnsupportedError::UnsupportedCompressionScheme(scheme),
                    ))
                }
            }
            CompressionScheme::CcittRle => Ok(Codec::CcittRle),
            CompressionScheme::CcittFax3 => Ok(Codec::CcittFax3),
            CompressionScheme::CcittFax4 => Ok(Codec::CcittFax4),
            CompressionScheme::Jpeg => {
                #[cfg(feature = "jpeg")]
                {
                    Ok(Codec::Jpeg)
                }
                #[cfg(not(feature = "jpeg"))]
                {
                    external().ok_or(TiffError::UnsupportedError(
                        TiffUnsupportedError::UnsupportedCompressionScheme(scheme),
                    ))
                }
            }
            CompressionScheme::OldJpeg => Err(TiffError::UnsupportedError(
                TiffUnsupportedError::OldStyleJpeg,
            )),
            CompressionScheme::LosslessJpeg => Ok(Codec::LosslessJpeg),
            CompressionScheme::Jpeg2000
            | CompressionScheme::AperioJp2kYcbcr
            | CompressionScheme::AperioJp2kRgb => {
                #[cfg(feature = "jpeg2000")]
                {
                    // 34712 is the lossless assignment; the Aperio variants
                    // carry the irreversible 9/7 filter.
                    Ok(Codec::Jpeg2000 {
                        lossless: scheme == CompressionScheme::Jpeg2000,
                    })
                }
                #[cfg(not(feature = "jpeg2000"))]
                {
                    external().ok_or(TiffError::UnsupportedError(
                        TiffUnsupportedError::UnsupportedCompressionScheme(scheme),
                    ))
                }
            }
            CompressionScheme::Unknown(code) => external().ok_or(TiffError::UnsupportedError(
                TiffUnsupportedError::UnknownCompressionScheme(code),
            )),
        }
    }

    /// Decompresses one tile's encoded bytes.
    pub fn decode(&self, data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
        match self {
            Codec::None => {
                let mut out = data.to_vec();
                if out.len() > options.max_decoded_size {
                    out.truncate(options.max_decoded_size);
                }
                Ok(out)
            }
            Codec::PackBits => packbits::decode(data, options),
            #[cfg(feature = "lzw")]
            Codec::Lzw => lzw::decode(data, options),
            #[cfg(feature = "deflate")]
            Codec::Deflate => deflate::decode(data, options),
            Codec::CcittRle => ccitt::decode(ccitt::Scheme::ModifiedHuffman, data, options),
            Codec::CcittFax3 => ccitt::decode(ccitt::Scheme::T4, data, options),
            Codec::CcittFax4 => ccitt::decode(ccitt::Scheme::T6, data, options),
            #[cfg(feature = "jpeg")]
            Codec::Jpeg => jpeg::decode(data, options),
            Codec::LosslessJpeg => jpeg_lossless::decode(data, options),
            #[cfg(feature = "jpeg2000")]
            Codec::Jpeg2000 { .. } => jpeg2000::decode(data, options),
            Codec::External(_, codec) => codec.decode(data, options),
        }
    }

    /// Compresses one tile's decoded bytes.
    pub fn encode(&self, data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
        match self {
            Codec::None => Ok(data.to_vec()),
            Codec::PackBits => packbits::encode(data, options),
            #[cfg(feature = "lzw")]
            Codec::Lzw => lzw::encode(data, options),
            #[cfg(feature = "deflate")]
            Codec::Deflate => deflate::encode(data, options),
            Codec::CcittRle => ccitt::encode(ccitt::Scheme::ModifiedHuffman, data, options),
            Codec::CcittFax3 => ccitt::encode(ccitt::Scheme::T4, data, options),
            Codec::CcittFax4 => ccitt::encode(ccitt::Scheme::T6, data, options),
            #[cfg(feature = "jpeg")]
            Codec::Jpeg => jpeg::encode(data, options),
            Codec::LosslessJpeg => Err(TiffError::UnsupportedError(
                TiffUnsupportedError::UnsupportedCompressionScheme(
                    CompressionScheme::LosslessJpeg,
                ),
            )),
            #[cfg(feature = "jpeg2000")]
            Codec::Jpeg2000 { lossless } => jpeg2000::encode(data, options, *lossless),
            Codec::External(_, codec) => codec.encode(data, options),
        }
    }
}

/// The write-side pipeline: predictor pass, compression, then the
/// fill-order fix-up.
pub(crate) fn encode_chain(
    codec: &Codec,
    data: &[u8],
    predictor: Predictor,
    fill_order: FillOrder,
    options: &CodecOptions,
) -> TiffResult<Vec<u8>> {
    let differenced;
    let data = match predictor {
        Predictor::None => data,
        Predictor::Horizontal => {
            let mut copy = data.to_vec();
            predictor::difference(&mut copy, options)?;
            differenced = copy;
            &differenced[..]
        }
        Predictor::FloatingPoint => {
            let mut copy = data.to_vec();
            predictor::difference_float(&mut copy, options)?;
            differenced = copy;
            &differenced[..]
        }
    };
    let mut encoded = codec.encode(data, options)?;
    if fill_order == FillOrder::LsbFirst {
        encoded = bits::reverse_bits(&encoded);
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReversingCodec;

    impl TileCodec for ReversingCodec {
        fn encode(&self, data: &[u8], _options: &CodecOptions) -> TiffResult<Vec<u8>> {
            Ok(data.iter().rev().copied().collect())
        }

        fn decode(&self, data: &[u8], _options: &CodecOptions) -> TiffResult<Vec<u8>> {
            Ok(data.iter().rev().copied().collect())
        }
    }

    #[test]
    fn external_codecs_resolve_by_raw_code() {
        let mut registry = CodecRegistry::new();
        registry.register(50_000, Arc::new(ReversingCodec));

        let codec =
            Codec::for_scheme(CompressionScheme::Unknown(50_000), &registry).unwrap();
        let options = CodecOptions::builder(4, 1).build();
        let encoded = codec.encode(&[1, 2, 3, 4], &options).unwrap();
        assert_eq!(encoded, vec![4, 3, 2, 1]);
        assert_eq!(codec.decode(&encoded, &options).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn unregistered_codes_are_diagnosed() {
        let registry = CodecRegistry::new();
        let err = Codec::for_scheme(CompressionScheme::Unknown(50_001), &registry).unwrap_err();
        assert!(matches!(
            err,
            TiffError::UnsupportedError(TiffUnsupportedError::UnknownCompressionScheme(50_001))
        ));
    }

    #[test]
    fn old_jpeg_is_rejected() {
        let registry = CodecRegistry::new();
        let err = Codec::for_scheme(CompressionScheme::OldJpeg, &registry).unwrap_err();
        assert!(matches!(
            err,
            TiffError::UnsupportedError(TiffUnsupportedError::OldStyleJpeg)
        ));
    }

    #[test]
    fn quality_and_level_are_clamped() {
        let options = CodecOptions::builder(1, 1)
            .quality(3.0)
            .lossless_level(-1.0)
            .build();
        assert_eq!(options.quality, Some(1.0));
        assert_eq!(options.lossless_level, Some(0.0));
    }
}
