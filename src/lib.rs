//! Reading, writing and editing of tiled TIFF and BigTIFF images.
//!
//! The crate is built around three top-level handles: [`TiffReader`] parses
//! the header and the chain of image file directories and decodes tiles on
//! demand, [`TiffWriter`] creates new files or edits existing ones in place,
//! and [`TiffCopier`] moves whole images between files either verbatim or
//! with recompression. Both classic TIFF (32-bit offsets) and BigTIFF
//! (64-bit offsets) are supported in either byte order, including the very
//! large tiled pyramids produced by whole-slide scanners.
//!
//! # Related Links
//! * <https://web.archive.org/web/20210108073850/https://www.adobe.io/open/standards/TIFF.html> - The TIFF specification
//! * <https://www.awaresystems.be/imaging/tiff/bigtiff.html> - The BigTIFF design

mod buffer;
mod cache;
pub mod codec;
mod copier;
mod error;
mod ifd;
mod map;
mod pyramid;
mod reader;
mod stream;
pub mod tags;
mod tile;
mod writer;

pub use self::buffer::ChannelBuffer;
pub use self::copier::{compact_file, CopyProgress, TiffCopier};
pub use self::error::{
    TiffError, TiffFormatError, TiffResult, TiffUnsupportedError, TileOp, UsageError,
};
pub use self::ifd::{ChunkKind, Entry, Ifd, Value};
pub use self::map::{Region, TileMap};
pub use self::pyramid::{PyramidLayout, PyramidLevel, SlideDescription};
pub use self::reader::{OpenMode, ReaderOptions, TiffReader};
pub use self::stream::ByteOrder;
pub use self::tile::{Tile, TileIndex, TileState};
pub use self::writer::{TiffWriter, WriterMode, WriterOptions};

/// The element type of one sample, derived from `BitsPerSample` and
/// `SampleFormat`.
///
/// All samples of a pixel must share one width and one format; images mixing
/// them per channel are rejected during IFD validation.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[non_exhaustive]
pub enum SampleType {
    /// A single bit, packed eight to a byte, MSB first.
    Bit,
    U8,
    I8,
    U16,
    I16,
    /// 24-bit unsigned integer stored in three bytes.
    U24,
    /// 24-bit signed integer stored in three bytes.
    I24,
    U32,
    I32,
    /// IEEE half-precision float.
    F16,
    F32,
    F64,
}

impl SampleType {
    /// Number of bits each sample occupies on disk.
    pub fn bits(self) -> u32 {
        match self {
            SampleType::Bit => 1,
            SampleType::U8 | SampleType::I8 => 8,
            SampleType::U16 | SampleType::I16 | SampleType::F16 => 16,
            SampleType::U24 | SampleType::I24 => 24,
            SampleType::U32 | SampleType::I32 | SampleType::F32 => 32,
            SampleType::F64 => 64,
        }
    }

    /// Whole bytes per sample; `None` for the packed [`SampleType::Bit`].
    pub fn byte_width(self) -> Option<u32> {
        match self {
            SampleType::Bit => None,
            other => Some(other.bits() / 8),
        }
    }

    /// Whether the sample is a signed integer.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            SampleType::I8 | SampleType::I16 | SampleType::I24 | SampleType::I32
        )
    }

    /// Whether the sample is an IEEE float.
    pub fn is_float(self) -> bool {
        matches!(self, SampleType::F16 | SampleType::F32 | SampleType::F64)
    }
}
