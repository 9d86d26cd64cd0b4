//! Tag, type and enumerated-value dictionaries for the TIFF container.

/// Generates a `u16`-backed enum with lossless round-tripping to the raw
/// code. With an `unknown` arm the out-of-catalog codes are preserved in an
/// `Unknown(u16)` variant instead of being dropped.
macro_rules! tiff_enum {
    {
        $( #[$enum_attr:meta] )*
        $vis:vis enum $name:ident $(unknown($unknown:ident))? {
            $( $(#[$variant_attr:meta])* $variant:ident = $code:literal, )*
        }
    } => {
        $( #[$enum_attr] )*
        #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
        #[non_exhaustive]
        $vis enum $name {
            $( $(#[$variant_attr])* $variant, )*
            $(
                /// A code outside the known catalog; the raw value is kept.
                $unknown(u16),
            )?
        }

        impl $name {
            /// The raw 16-bit code as stored in the file.
            #[inline]
            pub fn to_u16(self) -> u16 {
                match self {
                    $( $name::$variant => $code, )*
                    $( $name::$unknown(code) => code, )?
                }
            }

            /// Looks the code up in the known catalog.
            #[inline]
            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some($name::$variant), )*
                    _ => None,
                }
            }

            $(
                /// Converts any code, preserving unknown values in
                #[doc = concat!("[`", stringify!($name), "::", stringify!($unknown), "`].")]
                #[inline]
                pub fn from_u16_exhaustive(code: u16) -> Self {
                    Self::from_u16(code).unwrap_or($name::$unknown(code))
                }
            )?
        }
    };
}

tiff_enum! {
/// TIFF tags understood by this crate.
///
/// Unknown tags are carried through reads, rewrites and copies untouched.
pub enum Tag unknown(Unknown) {
    NewSubfileType = 254,
    SubfileType = 255,
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    FillOrder = 266,
    ImageDescription = 270,
    Make = 271,
    Model = 272,
    StripOffsets = 273,
    Orientation = 274,
    SamplesPerPixel = 277,
    RowsPerStrip = 278,
    StripByteCounts = 279,
    MinSampleValue = 280,
    MaxSampleValue = 281,
    XResolution = 282,
    YResolution = 283,
    PlanarConfiguration = 284,
    T4Options = 292,
    T6Options = 293,
    ResolutionUnit = 296,
    Software = 305,
    DateTime = 306,
    Artist = 315,
    Predictor = 317,
    ColorMap = 320,
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    SubIfd = 330,
    SampleFormat = 339,
    SMinSampleValue = 340,
    SMaxSampleValue = 341,
    JpegTables = 347,
    YCbCrCoefficients = 529,
    YCbCrSubSampling = 530,
    YCbCrPositioning = 531,
    Copyright = 33_432,
}
}

tiff_enum! {
/// The type of an IFD entry (a 2 byte field).
pub enum Type {
    /// 8-bit unsigned integer
    BYTE = 1,
    /// 8-bit byte that contains a 7-bit ASCII code; the last byte must be zero
    ASCII = 2,
    /// 16-bit unsigned integer
    SHORT = 3,
    /// 32-bit unsigned integer
    LONG = 4,
    /// Fraction stored as two 32-bit unsigned integers
    RATIONAL = 5,
    /// 8-bit signed integer
    SBYTE = 6,
    /// 8-bit byte that may contain anything, depending on the field
    UNDEFINED = 7,
    /// 16-bit signed integer
    SSHORT = 8,
    /// 32-bit signed integer
    SLONG = 9,
    /// Fraction stored as two 32-bit signed integers
    SRATIONAL = 10,
    /// 32-bit IEEE floating point
    FLOAT = 11,
    /// 64-bit IEEE floating point
    DOUBLE = 12,
    /// 32-bit unsigned integer (offset)
    IFD = 13,
    /// BigTIFF 64-bit unsigned integer
    LONG8 = 16,
    /// BigTIFF 64-bit signed integer
    SLONG8 = 17,
    /// BigTIFF 64-bit unsigned integer (offset)
    IFD8 = 18,
}
}

impl Type {
    /// On-disk size of one element of this type in bytes.
    pub fn size(self) -> usize {
        match self {
            Type::BYTE | Type::SBYTE | Type::ASCII | Type::UNDEFINED => 1,
            Type::SHORT | Type::SSHORT => 2,
            Type::LONG | Type::SLONG | Type::FLOAT | Type::IFD => 4,
            Type::RATIONAL
            | Type::SRATIONAL
            | Type::DOUBLE
            | Type::LONG8
            | Type::SLONG8
            | Type::IFD8 => 8,
        }
    }
}

tiff_enum! {
/// See [TIFF compression tags](https://www.awaresystems.be/imaging/tiff/tifftags/compression.html)
/// for reference.
pub enum CompressionScheme unknown(Unknown) {
    None = 1,
    /// CCITT Group 3 one-dimensional Modified Huffman RLE.
    CcittRle = 2,
    /// CCITT T.4 (Group 3 fax).
    CcittFax3 = 3,
    /// CCITT T.6 (Group 4 fax).
    CcittFax4 = 4,
    Lzw = 5,
    /// The 6.0-style JPEG scheme; diagnosed and rejected.
    OldJpeg = 6,
    /// "New" JPEG per Technical Note 2 (baseline DCT).
    Jpeg = 7,
    Deflate = 8,
    PackBits = 32773,
    /// The older Adobe assignment for zlib streams.
    OldDeflate = 32946,
    /// Aperio JPEG 2000 code-stream with YCbCr samples.
    AperioJp2kYcbcr = 33003,
    /// Aperio JPEG 2000 code-stream with RGB samples.
    AperioJp2kRgb = 33005,
    /// Lossless (SOF3) JPEG; read only.
    LosslessJpeg = 34676,
    Jpeg2000 = 34712,
}
}

impl CompressionScheme {
    /// Whether the scheme carries a JPEG 2000 code-stream.
    pub fn is_jpeg2000(self) -> bool {
        matches!(
            self,
            CompressionScheme::Jpeg2000
                | CompressionScheme::AperioJp2kYcbcr
                | CompressionScheme::AperioJp2kRgb
        )
    }
}

tiff_enum! {
pub enum PhotometricInterpretation {
    WhiteIsZero = 0,
    BlackIsZero = 1,
    RGB = 2,
    RGBPalette = 3,
    TransparencyMask = 4,
    CMYK = 5,
    YCbCr = 6,
    CIELab = 8,
}
}

impl PhotometricInterpretation {
    /// The sample count this interpretation implies when `SamplesPerPixel`
    /// is absent.
    pub fn default_samples_per_pixel(self) -> u16 {
        match self {
            PhotometricInterpretation::RGB
            | PhotometricInterpretation::YCbCr
            | PhotometricInterpretation::CIELab => 3,
            PhotometricInterpretation::CMYK => 4,
            _ => 1,
        }
    }
}

tiff_enum! {
pub enum PlanarConfiguration {
    /// Samples of each pixel stored together.
    Chunky = 1,
    /// One storage plane per channel.
    Planar = 2,
}
}

tiff_enum! {
pub enum Predictor {
    /// No changes were made to the data.
    None = 1,
    /// Each row holds the difference of every sample from the previous
    /// pixel's same-channel sample.
    Horizontal = 2,
    /// Byte-split horizontal differencing for floating point samples.
    FloatingPoint = 3,
}
}

tiff_enum! {
/// Per-byte bit order of the encoded data.
pub enum FillOrder {
    /// Most significant bit first; the TIFF default.
    MsbFirst = 1,
    /// Least significant bit first; every byte is bit-reversed.
    LsbFirst = 2,
}
}

tiff_enum! {
pub enum SampleFormat unknown(Unknown) {
    Uint = 1,
    Int = 2,
    IEEEFP = 3,
    Void = 4,
}
}

tiff_enum! {
/// Type to represent resolution units
pub enum ResolutionUnit {
    None = 1,
    Inch = 2,
    Centimeter = 3,
}
}

/// `Group3Options` (tag 292) bit flags.
pub mod t4_options {
    /// Two-dimensional coding mode.
    pub const TWO_DIMENSIONAL: u32 = 1;
    /// Uncompressed mode; diagnosed and rejected.
    pub const UNCOMPRESSED: u32 = 2;
    /// Fill bits before EOL codes so each EOL ends on a byte boundary.
    pub const FILL_BITS: u32 = 4;
}

/// `Group4Options` (tag 293) bit flags.
pub mod t6_options {
    /// Uncompressed mode; diagnosed and rejected.
    pub const UNCOMPRESSED: u32 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_round_trip() {
        let c = CompressionScheme::from_u16_exhaustive(0xC350);
        assert_eq!(c, CompressionScheme::Unknown(0xC350));
        assert_eq!(c.to_u16(), 0xC350);
        assert_eq!(CompressionScheme::from_u16(0xC350), None);
    }

    #[test]
    fn known_codes_round_trip() {
        for (scheme, code) in [
            (CompressionScheme::None, 1),
            (CompressionScheme::CcittFax4, 4),
            (CompressionScheme::Lzw, 5),
            (CompressionScheme::PackBits, 32773),
            (CompressionScheme::Jpeg2000, 34712),
        ] {
            assert_eq!(scheme.to_u16(), code);
            assert_eq!(CompressionScheme::from_u16(code), Some(scheme));
        }
    }

    #[test]
    fn type_sizes() {
        assert_eq!(Type::BYTE.size(), 1);
        assert_eq!(Type::SHORT.size(), 2);
        assert_eq!(Type::LONG.size(), 4);
        assert_eq!(Type::RATIONAL.size(), 8);
        assert_eq!(Type::LONG8.size(), 8);
    }
}
