use std::error::Error;
use std::fmt;
use std::io;
use std::str;
use std::string;

use crate::tags::{CompressionScheme, PhotometricInterpretation, Tag};

/// Tiff error kinds.
#[derive(Debug)]
pub enum TiffError {
    /// The file is not formatted properly.
    FormatError(TiffFormatError),

    /// The file requires features this crate does not support.
    UnsupportedError(TiffUnsupportedError),

    /// An I/O error occurred while reading or writing the file.
    IoError(io::Error),

    /// A configured size limit was exceeded.
    LimitsExceeded,

    /// An integer conversion to or from a platform size failed, either due to
    /// limits of the platform size or limits of the format.
    IntSizeError,

    /// The handle does not support the requested operation.
    UsageError(UsageError),

    /// A tile could not be processed; wraps the underlying error with enough
    /// context to identify the tile.
    Tile {
        ifd_index: usize,
        tile_index: usize,
        op: TileOp,
        inner: Box<TiffError>,
    },

    /// A copy operation was cancelled through its cancellation checker.
    Cancelled,
}

/// The operation during which a tile error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOp {
    Read,
    Decode,
    Encode,
    Write,
}

/// The file is not formatted properly.
///
/// This indicates that the producer of the file misbehaved or that the file
/// has been corrupted.
///
/// The list of variants may grow to incorporate errors of future features.
/// Matching against this exhaustively is not covered by interface stability
/// guarantees.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TiffFormatError {
    TiffSignatureNotFound,
    TiffSignatureInvalid,
    ImageFileDirectoryNotFound,
    InconsistentSizesEncountered,
    InvalidDimensions(u64, u64),
    InvalidTag,
    InvalidTagValueType(Tag),
    RequiredTagNotFound(Tag),
    RequiredTagEmpty(Tag),
    UnexpectedCompressedData {
        actual_bytes: usize,
        required_bytes: usize,
    },
    UnknownPredictor(u16),
    UnknownPlanarConfiguration(u16),
    UnknownFillOrder(u16),
    UnsignedIntegerExpected(crate::ifd::Value),
    SignedIntegerExpected(crate::ifd::Value),
    AsciiExpected(crate::ifd::Value),
    /// Entry count or value data extends past the end of the file.
    DirectoryOutOfBounds,
    /// Two entries for the same tag inside one directory.
    DuplicateTag(u16),
    /// Entries are not sorted by ascending tag value.
    OutOfOrderTag(u16),
    StripTileTagConflict,
    CycleInOffsets,
    SamplesPerPixelIsZero,
    ZeroTileSize,
    /// A tile's declared offset or byte count is zero or out of range.
    MissingTileData {
        tile_index: usize,
    },
    Format(String),
}

impl fmt::Display for TiffFormatError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use self::TiffFormatError::*;
        match *self {
            TiffSignatureNotFound => write!(fmt, "TIFF signature not found."),
            TiffSignatureInvalid => write!(fmt, "TIFF signature invalid."),
            ImageFileDirectoryNotFound => write!(fmt, "Image file directory not found."),
            InconsistentSizesEncountered => write!(fmt, "Inconsistent sizes encountered."),
            InvalidDimensions(width, height) => {
                write!(fmt, "Invalid dimensions: {}x{}.", width, height)
            }
            InvalidTag => write!(fmt, "Image contains invalid tag."),
            InvalidTagValueType(ref tag) => {
                write!(fmt, "Tag `{:?}` did not have the expected value type.", tag)
            }
            RequiredTagNotFound(ref tag) => write!(fmt, "Required tag `{:?}` not found.", tag),
            RequiredTagEmpty(ref tag) => write!(fmt, "Required tag `{:?}` was empty.", tag),
            UnexpectedCompressedData {
                actual_bytes,
                required_bytes,
            } => {
                write!(
                    fmt,
                    "Decompression returned different amount of bytes than expected: got {}, expected {}.",
                    actual_bytes, required_bytes
                )
            }
            UnknownPredictor(predictor) => {
                write!(fmt, "Unknown predictor “{}” encountered", predictor)
            }
            UnknownPlanarConfiguration(config) => {
                write!(fmt, "Unknown planar configuration “{}” encountered", config)
            }
            UnknownFillOrder(order) => write!(fmt, "Unknown fill order “{}” encountered", order),
            UnsignedIntegerExpected(ref val) => {
                write!(fmt, "Expected unsigned integer, {:?} found.", val)
            }
            SignedIntegerExpected(ref val) => {
                write!(fmt, "Expected signed integer, {:?} found.", val)
            }
            AsciiExpected(ref val) => write!(fmt, "Expected ASCII value, {:?} found.", val),
            DirectoryOutOfBounds => {
                write!(fmt, "Image file directory extends past the end of the file.")
            }
            DuplicateTag(tag) => write!(fmt, "Directory contains tag {} twice.", tag),
            OutOfOrderTag(tag) => {
                write!(fmt, "Directory entries not in ascending order at tag {}.", tag)
            }
            StripTileTagConflict => write!(fmt, "File should contain either (StripByteCounts and StripOffsets) or (TileByteCounts and TileOffsets), other combination was found."),
            CycleInOffsets => write!(fmt, "File contained a cycle in the list of IFDs"),
            SamplesPerPixelIsZero => write!(fmt, "Samples per pixel is zero"),
            ZeroTileSize => write!(fmt, "Tile dimensions must not be zero"),
            MissingTileData { tile_index } => {
                write!(fmt, "Tile {} has no stored data (zero or out-of-range offset).", tile_index)
            }
            Format(ref val) => write!(fmt, "Invalid format: {:?}.", val),
        }
    }
}

/// The file requires features this crate does not support.
///
/// This only captures known failures for which the standard either does not
/// require support or an implementation has been planned but not yet
/// completed.
///
/// The list of variants may grow. Matching against this exhaustively is not
/// covered by interface stability guarantees.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TiffUnsupportedError {
    UnknownInterpretation,
    UnknownCompressionScheme(u16),
    UnsupportedCompressionScheme(CompressionScheme),
    /// Pre-TIFF-6.0 LZW streams (LSB-first code packing) are diagnosed but
    /// not decoded.
    OldStyleLzw,
    /// Old-style JPEG (compression code 6) as found in some legacy pyramids.
    OldStyleJpeg,
    /// The CCITT "uncompressed" mode flag in Group3Options/Group4Options.
    CcittUncompressedMode,
    /// Arithmetic-coded JPEG frames (SOF9/SOF11 and friends).
    ArithmeticCodedJpeg,
    InconsistentBitsPerSample(Vec<u16>),
    InconsistentSampleFormat,
    UnsupportedSampleDepth(u16),
    UnsupportedBitsPerChannel(u16),
    UnsupportedSampleType {
        bits: u16,
        format: u16,
    },
    UnsupportedInterpretation(PhotometricInterpretation),
    /// The codec cannot process the tile shape it was handed, e.g. CCITT for
    /// more than one channel or baseline JPEG for more than 8 bits.
    CodecConstraint {
        scheme: CompressionScheme,
        reason: &'static str,
    },
    /// A non-ASCII description on an IFD that did not opt into UTF-8.
    NonAsciiDescription,
}

impl fmt::Display for TiffUnsupportedError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use self::TiffUnsupportedError::*;
        match *self {
            UnknownInterpretation => write!(
                fmt,
                "The image is using an unknown photometric interpretation."
            ),
            UnknownCompressionScheme(code) => {
                write!(fmt, "Unknown compression scheme {} and no external codec registered for it.", code)
            }
            UnsupportedCompressionScheme(scheme) => {
                write!(fmt, "Compression scheme {:?} is unsupported", scheme)
            }
            OldStyleLzw => write!(fmt, "TIFF 5.0-style LZW (LSB-first) is not supported"),
            OldStyleJpeg => write!(fmt, "Old-style JPEG (compression 6) is not supported"),
            CcittUncompressedMode => {
                write!(fmt, "CCITT uncompressed mode is not supported")
            }
            ArithmeticCodedJpeg => write!(fmt, "Arithmetic-coded JPEG is not supported"),
            InconsistentBitsPerSample(ref bits) => {
                write!(fmt, "Inconsistent bits per sample: {:?}.", bits)
            }
            InconsistentSampleFormat => {
                write!(fmt, "All samples of a pixel must share one sample format.")
            }
            UnsupportedSampleDepth(samples) => {
                write!(fmt, "{} samples per pixel is unsupported.", samples)
            }
            UnsupportedBitsPerChannel(bits) => {
                write!(fmt, "{} bits per channel not supported", bits)
            }
            UnsupportedSampleType { bits, format } => write!(
                fmt,
                "Samples of {} bits with sample format {} are unsupported",
                bits, format
            ),
            UnsupportedInterpretation(interpretation) => {
                write!(
                    fmt,
                    "Unsupported photometric interpretation \"{:?}\".",
                    interpretation
                )
            }
            CodecConstraint { scheme, reason } => {
                write!(fmt, "Compression scheme {:?}: {}", scheme, reason)
            }
            NonAsciiDescription => write!(
                fmt,
                "Description contains non-ASCII characters and the directory does not allow UTF-8"
            ),
        }
    }
}

/// The caller attempted to use a handle in a way that is incompatible with
/// the specific file or map.
///
/// For example: writing outside the bounds of a fixed-size tile map.
#[derive(Debug)]
pub enum UsageError {
    /// A tile coordinate outside the grid of the map.
    TileIndexOutOfRange {
        index: usize,
        count: usize,
    },
    /// A write outside the declared dimensions of a fixed map.
    RectangleOutOfBounds,
    /// Interleaving requested for packed sub-byte samples.
    SubByteSamplesNotInterleavable,
    /// A tile state transition that the lifecycle does not permit.
    InvalidTileTransition {
        from: crate::tile::TileState,
        to: crate::tile::TileState,
    },
    /// An in-place overwrite whose encoded data is longer than the stored
    /// tile it replaces.
    InPlaceOverwriteTooLong {
        stored: u64,
        new: u64,
    },
    /// `rewrite_ifd` on a directory that was never read from or assigned a
    /// position in this file.
    IfdHasNoWritePosition,
    /// Direct copy between files whose byte order or offset width differs.
    IncompatibleDirectCopy,
    /// The handle was already closed.
    Closed,
}

impl fmt::Display for UsageError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::UsageError::*;
        match *self {
            TileIndexOutOfRange { index, count } => {
                write!(fmt, "Tile index {} out of range, map has {} tiles.", index, count)
            }
            RectangleOutOfBounds => {
                write!(fmt, "Rectangle lies outside the bounds of a fixed-size map.")
            }
            SubByteSamplesNotInterleavable => {
                write!(fmt, "Packed sub-byte samples cannot be interleaved.")
            }
            InvalidTileTransition { from, to } => {
                write!(fmt, "Invalid tile state transition {:?} -> {:?}.", from, to)
            }
            InPlaceOverwriteTooLong { stored, new } => write!(
                fmt,
                "In-place overwrite needs {} bytes but only {} are reserved.",
                new, stored
            ),
            IfdHasNoWritePosition => {
                write!(fmt, "IFD has no recorded write position in this file.")
            }
            IncompatibleDirectCopy => write!(
                fmt,
                "Direct copy requires matching byte order and BigTIFF flag on both files."
            ),
            Closed => write!(fmt, "The handle was already closed."),
        }
    }
}

impl fmt::Display for TiffError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match *self {
            TiffError::FormatError(ref e) => write!(fmt, "Format error: {}", e),
            TiffError::UnsupportedError(ref f) => {
                write!(fmt, "Unsupported feature: {}", f)
            }
            TiffError::IoError(ref e) => e.fmt(fmt),
            TiffError::LimitsExceeded => write!(fmt, "The configured limits are exceeded"),
            TiffError::IntSizeError => write!(fmt, "Platform or format size limits exceeded"),
            TiffError::UsageError(ref e) => write!(fmt, "Usage error: {}", e),
            TiffError::Tile {
                ifd_index,
                tile_index,
                op,
                ref inner,
            } => write!(
                fmt,
                "{:?} of tile {} in image {} failed: {}",
                op, tile_index, ifd_index, inner
            ),
            TiffError::Cancelled => write!(fmt, "The operation was cancelled"),
        }
    }
}

impl Error for TiffError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            TiffError::IoError(ref e) => Some(e),
            TiffError::Tile { ref inner, .. } => Some(inner),
            _ => None,
        }
    }
}

impl TiffError {
    /// Attach tile context to an error, per the propagation policy.
    pub(crate) fn for_tile(self, ifd_index: usize, tile_index: usize, op: TileOp) -> TiffError {
        TiffError::Tile {
            ifd_index,
            tile_index,
            op,
            inner: Box::new(self),
        }
    }

    /// The process exit code an embedding command-line tool should report
    /// for this error: 1 for I/O, 2 for malformed files, 3 for unsupported
    /// features, 4 for cancellation.
    pub fn exit_code(&self) -> i32 {
        match *self {
            TiffError::IoError(_) => 1,
            TiffError::FormatError(_) => 2,
            TiffError::UnsupportedError(_) => 3,
            TiffError::Cancelled => 4,
            TiffError::Tile { ref inner, .. } => inner.exit_code(),
            // Limits, integer overflow and misuse are diagnosed like
            // malformed input from the outside.
            TiffError::LimitsExceeded | TiffError::IntSizeError | TiffError::UsageError(_) => 2,
        }
    }
}

impl From<io::Error> for TiffError {
    fn from(err: io::Error) -> TiffError {
        TiffError::IoError(err)
    }
}

impl From<str::Utf8Error> for TiffError {
    fn from(_err: str::Utf8Error) -> TiffError {
        TiffError::FormatError(TiffFormatError::InvalidTag)
    }
}

impl From<string::FromUtf8Error> for TiffError {
    fn from(_err: string::FromUtf8Error) -> TiffError {
        TiffError::FormatError(TiffFormatError::InvalidTag)
    }
}

impl From<TiffFormatError> for TiffError {
    fn from(err: TiffFormatError) -> TiffError {
        TiffError::FormatError(err)
    }
}

impl From<TiffUnsupportedError> for TiffError {
    fn from(err: TiffUnsupportedError) -> TiffError {
        TiffError::UnsupportedError(err)
    }
}

impl From<UsageError> for TiffError {
    fn from(err: UsageError) -> TiffError {
        TiffError::UsageError(err)
    }
}

impl From<std::num::TryFromIntError> for TiffError {
    fn from(_err: std::num::TryFromIntError) -> TiffError {
        TiffError::IntSizeError
    }
}

#[cfg(feature = "lzw")]
impl From<weezl::LzwError> for TiffError {
    fn from(err: weezl::LzwError) -> TiffError {
        match err {
            weezl::LzwError::InvalidCode => TiffError::FormatError(TiffFormatError::Format(
                String::from("LZW compressed data corrupted"),
            )),
        }
    }
}

/// Result of a TIFF reading/writing process.
pub type TiffResult<T> = Result<T, TiffError>;
