//! The image file directory: a typed map from 16-bit tags to array values.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Seek, Write};

use log::warn;

use crate::error::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError};
use crate::stream::{fix_endianness, ByteOrder, EndianReader, EndianWriter};
use crate::tags::{
    CompressionScheme, FillOrder, PhotometricInterpretation, PlanarConfiguration, Predictor,
    SampleFormat, Tag, Type,
};
use crate::SampleType;

/// Upper bound for a single entry's value data, 1 MiB times the element
/// size. Protects against absurd counts in corrupted directories.
const MAX_ENTRY_ELEMENTS: u64 = 1 << 20;

/// A single decoded tag value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    Byte(u8),
    SignedByte(i8),
    Undefined(u8),
    Short(u16),
    SignedShort(i16),
    Long(u32),
    SignedLong(i32),
    Long8(u64),
    SignedLong8(i64),
    Rational(u32, u32),
    SRational(i32, i32),
    Float(f32),
    Double(f64),
    Ascii(String),
    Ifd(u32),
    Ifd8(u64),
    List(Vec<Value>),
}

impl Value {
    pub fn into_u64(self) -> TiffResult<u64> {
        match self {
            Value::Byte(v) => Ok(v.into()),
            Value::Undefined(v) => Ok(v.into()),
            Value::Short(v) => Ok(v.into()),
            Value::Long(v) => Ok(v.into()),
            Value::Long8(v) => Ok(v),
            Value::Ifd(v) => Ok(v.into()),
            Value::Ifd8(v) => Ok(v),
            val => Err(TiffError::FormatError(
                TiffFormatError::UnsignedIntegerExpected(val),
            )),
        }
    }

    pub fn into_u32(self) -> TiffResult<u32> {
        Ok(u32::try_from(self.into_u64()?)?)
    }

    pub fn into_u16(self) -> TiffResult<u16> {
        Ok(u16::try_from(self.into_u64()?)?)
    }

    pub fn into_i64(self) -> TiffResult<i64> {
        match self {
            Value::SignedByte(v) => Ok(v.into()),
            Value::SignedShort(v) => Ok(v.into()),
            Value::SignedLong(v) => Ok(v.into()),
            Value::SignedLong8(v) => Ok(v),
            val => Err(TiffError::FormatError(
                TiffFormatError::SignedIntegerExpected(val),
            )),
        }
    }

    pub fn into_f64(self) -> TiffResult<f64> {
        match self {
            Value::Float(v) => Ok(v.into()),
            Value::Double(v) => Ok(v),
            Value::Rational(n, d) => Ok(n as f64 / d as f64),
            Value::SRational(n, d) => Ok(n as f64 / d as f64),
            val => val.into_u64().map(|v| v as f64),
        }
    }

    pub fn into_string(self) -> TiffResult<String> {
        match self {
            Value::Ascii(v) => Ok(v),
            val => Err(TiffError::FormatError(TiffFormatError::AsciiExpected(val))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{v}"),
            Value::SignedByte(v) => write!(f, "{v}"),
            Value::Undefined(v) => write!(f, "{v:#04x}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::SignedShort(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::SignedLong(v) => write!(f, "{v}"),
            Value::Long8(v) => write!(f, "{v}"),
            Value::SignedLong8(v) => write!(f, "{v}"),
            Value::Rational(n, d) => write!(f, "{n}/{d}"),
            Value::SRational(n, d) => write!(f, "{n}/{d}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Ascii(v) => write!(f, "{v:?}"),
            Value::Ifd(v) => write!(f, "IFD@{v}"),
            Value::Ifd8(v) => write!(f, "IFD@{v}"),
            Value::List(values) => {
                let mut first = true;
                for v in values {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{v}")?;
                }
                Ok(())
            }
        }
    }
}

/// One directory entry: the on-disk type, the element count and the value
/// bytes held in native byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    type_: Type,
    count: u64,
    data: Vec<u8>,
}

impl Entry {
    pub fn new(type_: Type, count: u64, data: Vec<u8>) -> TiffResult<Entry> {
        let expected = count
            .checked_mul(type_.size() as u64)
            .ok_or(TiffError::LimitsExceeded)?;
        if expected != data.len() as u64 {
            return Err(TiffError::FormatError(
                TiffFormatError::InconsistentSizesEncountered,
            ));
        }
        Ok(Entry { type_, count, data })
    }

    pub fn from_shorts(values: &[u16]) -> Entry {
        let mut data = Vec::with_capacity(values.len() * 2);
        for v in values {
            data.extend_from_slice(&v.to_ne_bytes());
        }
        Entry {
            type_: Type::SHORT,
            count: values.len() as u64,
            data,
        }
    }

    pub fn from_longs(values: &[u32]) -> Entry {
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values {
            data.extend_from_slice(&v.to_ne_bytes());
        }
        Entry {
            type_: Type::LONG,
            count: values.len() as u64,
            data,
        }
    }

    pub fn from_long8s(values: &[u64]) -> Entry {
        let mut data = Vec::with_capacity(values.len() * 8);
        for v in values {
            data.extend_from_slice(&v.to_ne_bytes());
        }
        Entry {
            type_: Type::LONG8,
            count: values.len() as u64,
            data,
        }
    }

    pub fn from_rationals(values: &[(u32, u32)]) -> Entry {
        let mut data = Vec::with_capacity(values.len() * 8);
        for (n, d) in values {
            data.extend_from_slice(&n.to_ne_bytes());
            data.extend_from_slice(&d.to_ne_bytes());
        }
        Entry {
            type_: Type::RATIONAL,
            count: values.len() as u64,
            data,
        }
    }

    pub fn from_doubles(values: &[f64]) -> Entry {
        let mut data = Vec::with_capacity(values.len() * 8);
        for v in values {
            data.extend_from_slice(&v.to_ne_bytes());
        }
        Entry {
            type_: Type::DOUBLE,
            count: values.len() as u64,
            data,
        }
    }

    /// An ASCII entry; the terminating NUL is appended here.
    pub fn from_text(text: &str) -> Entry {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Entry {
            type_: Type::ASCII,
            count: data.len() as u64,
            data,
        }
    }

    pub fn from_undefined(bytes: &[u8]) -> Entry {
        Entry {
            type_: Type::UNDEFINED,
            count: bytes.len() as u64,
            data: bytes.to_vec(),
        }
    }

    pub fn type_(&self) -> Type {
        self.type_
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The raw value bytes in native byte order.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// On-disk size of the value data in bytes.
    pub fn data_len(&self) -> u64 {
        self.count * self.type_.size() as u64
    }

    /// All elements coerced to `u64`; fails for non-integral types.
    pub fn as_u64s(&self) -> TiffResult<Vec<u64>> {
        let mut out = Vec::with_capacity(self.count as usize);
        match self.type_ {
            Type::BYTE | Type::UNDEFINED => out.extend(self.data.iter().map(|&b| b as u64)),
            Type::SHORT => {
                for c in self.data.chunks_exact(2) {
                    out.push(u16::from_ne_bytes(c.try_into().unwrap()) as u64);
                }
            }
            Type::LONG | Type::IFD => {
                for c in self.data.chunks_exact(4) {
                    out.push(u32::from_ne_bytes(c.try_into().unwrap()) as u64);
                }
            }
            Type::LONG8 | Type::IFD8 => {
                for c in self.data.chunks_exact(8) {
                    out.push(u64::from_ne_bytes(c.try_into().unwrap()));
                }
            }
            _ => {
                return Err(TiffError::FormatError(
                    TiffFormatError::UnsignedIntegerExpected(
                        self.decoded_values().into_iter().next().unwrap_or(
                            Value::List(Vec::new()),
                        ),
                    ),
                ))
            }
        }
        Ok(out)
    }

    pub fn as_u32s(&self) -> TiffResult<Vec<u32>> {
        self.as_u64s()?
            .into_iter()
            .map(|v| u32::try_from(v).map_err(TiffError::from))
            .collect()
    }

    pub fn as_u16s(&self) -> TiffResult<Vec<u16>> {
        self.as_u64s()?
            .into_iter()
            .map(|v| u16::try_from(v).map_err(TiffError::from))
            .collect()
    }

    /// First element as `u64`; fails on empty entries.
    pub fn as_u64(&self) -> TiffResult<u64> {
        self.as_u64s()?
            .first()
            .copied()
            .ok_or(TiffError::FormatError(TiffFormatError::InvalidTag))
    }

    pub fn as_text(&self) -> TiffResult<String> {
        if self.type_ != Type::ASCII {
            return Err(TiffError::FormatError(TiffFormatError::AsciiExpected(
                self.decoded_values()
                    .into_iter()
                    .next()
                    .unwrap_or(Value::List(Vec::new())),
            )));
        }
        let mut bytes = self.data.clone();
        // Strings may be NUL-terminated; trim anything from the first NUL on.
        if let Some(first) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(first);
        }
        Ok(String::from_utf8(bytes)?)
    }

    /// Decodes the value bytes into typed values.
    pub fn decoded_values(&self) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.count as usize);
        match self.type_ {
            Type::BYTE => out.extend(self.data.iter().map(|&b| Value::Byte(b))),
            Type::SBYTE => out.extend(self.data.iter().map(|&b| Value::SignedByte(b as i8))),
            Type::UNDEFINED => out.extend(self.data.iter().map(|&b| Value::Undefined(b))),
            Type::ASCII => {
                if let Ok(text) = self.as_text() {
                    out.push(Value::Ascii(text));
                }
            }
            Type::SHORT => {
                for c in self.data.chunks_exact(2) {
                    out.push(Value::Short(u16::from_ne_bytes(c.try_into().unwrap())));
                }
            }
            Type::SSHORT => {
                for c in self.data.chunks_exact(2) {
                    out.push(Value::SignedShort(i16::from_ne_bytes(c.try_into().unwrap())));
                }
            }
            Type::LONG => {
                for c in self.data.chunks_exact(4) {
                    out.push(Value::Long(u32::from_ne_bytes(c.try_into().unwrap())));
                }
            }
            Type::SLONG => {
                for c in self.data.chunks_exact(4) {
                    out.push(Value::SignedLong(i32::from_ne_bytes(c.try_into().unwrap())));
                }
            }
            Type::LONG8 => {
                for c in self.data.chunks_exact(8) {
                    out.push(Value::Long8(u64::from_ne_bytes(c.try_into().unwrap())));
                }
            }
            Type::SLONG8 => {
                for c in self.data.chunks_exact(8) {
                    out.push(Value::SignedLong8(i64::from_ne_bytes(c.try_into().unwrap())));
                }
            }
            Type::FLOAT => {
                for c in self.data.chunks_exact(4) {
                    out.push(Value::Float(f32::from_ne_bytes(c.try_into().unwrap())));
                }
            }
            Type::DOUBLE => {
                for c in self.data.chunks_exact(8) {
                    out.push(Value::Double(f64::from_ne_bytes(c.try_into().unwrap())));
                }
            }
            Type::RATIONAL => {
                for c in self.data.chunks_exact(8) {
                    out.push(Value::Rational(
                        u32::from_ne_bytes(c[..4].try_into().unwrap()),
                        u32::from_ne_bytes(c[4..].try_into().unwrap()),
                    ));
                }
            }
            Type::SRATIONAL => {
                for c in self.data.chunks_exact(8) {
                    out.push(Value::SRational(
                        i32::from_ne_bytes(c[..4].try_into().unwrap()),
                        i32::from_ne_bytes(c[4..].try_into().unwrap()),
                    ));
                }
            }
            Type::IFD => {
                for c in self.data.chunks_exact(4) {
                    out.push(Value::Ifd(u32::from_ne_bytes(c.try_into().unwrap())));
                }
            }
            Type::IFD8 => {
                for c in self.data.chunks_exact(8) {
                    out.push(Value::Ifd8(u64::from_ne_bytes(c.try_into().unwrap())));
                }
            }
        }
        out
    }

    /// Component bit width for the endianness fix-up; rationals swap at the
    /// 32-bit component level.
    fn component_bits(&self) -> u32 {
        match self.type_ {
            Type::RATIONAL | Type::SRATIONAL => 32,
            t => 8 * t.size() as u32,
        }
    }
}

/// An image file directory with its file placement bookkeeping.
///
/// Entries iterate in ascending tag order, which is also the order they
/// serialize in. The directory remembers where it was read from and, when an
/// editing writer intends to rewrite it, where it is to be written.
#[derive(Debug, Clone)]
pub struct Ifd {
    entries: BTreeMap<u16, Entry>,
    byte_order: ByteOrder,
    big_tiff: bool,
    offset_for_reading: Option<u64>,
    offset_for_writing: Option<u64>,
    /// On-disk room available at `offset_for_writing`, measured as the full
    /// serialized extent at read time.
    reserved_room: Option<u64>,
    next_ifd: u64,
    /// Descriptions may opt into UTF-8; plain ASCII otherwise.
    utf8_descriptions: bool,
    /// Round out-of-spec parameters up instead of rejecting them.
    smart_format_correction: bool,
    cached_chunk_offsets: Option<Vec<u64>>,
    cached_chunk_byte_counts: Option<Vec<u64>>,
}

impl PartialEq for Ifd {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// Whether an image stores its data as rectangular tiles or full-width
/// strips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Tiles,
    Strips,
}

impl Ifd {
    pub fn new(byte_order: ByteOrder, big_tiff: bool) -> Ifd {
        Ifd {
            entries: BTreeMap::new(),
            byte_order,
            big_tiff,
            offset_for_reading: None,
            offset_for_writing: None,
            reserved_room: None,
            next_ifd: 0,
            utf8_descriptions: false,
            smart_format_correction: false,
            cached_chunk_offsets: None,
            cached_chunk_byte_counts: None,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn is_big_tiff(&self) -> bool {
        self.big_tiff
    }

    pub fn offset_for_reading(&self) -> Option<u64> {
        self.offset_for_reading
    }

    pub fn offset_for_writing(&self) -> Option<u64> {
        self.offset_for_writing
    }

    pub(crate) fn set_offset_for_writing(&mut self, offset: Option<u64>) {
        self.offset_for_writing = offset;
    }

    /// After a (re)write the directory effectively lives at its new
    /// position; chain bookkeeping reads it from there.
    pub(crate) fn set_offset_for_reading_hint(&mut self, offset: Option<u64>) {
        self.offset_for_reading = offset;
    }

    pub(crate) fn reserved_room(&self) -> Option<u64> {
        self.reserved_room
    }

    pub(crate) fn set_reserved_room(&mut self, room: Option<u64>) {
        self.reserved_room = room;
    }

    /// Offset of the next directory in the chain; 0 terminates.
    pub fn next_ifd_offset(&self) -> u64 {
        self.next_ifd
    }

    pub(crate) fn set_next_ifd_offset(&mut self, offset: u64) {
        self.next_ifd = offset;
    }

    /// Allow UTF-8 in the image description.
    pub fn allow_utf8_descriptions(&mut self, allow: bool) {
        self.utf8_descriptions = allow;
    }

    /// Normalize out-of-spec parameters in setters instead of rejecting.
    pub fn set_smart_format_correction(&mut self, enabled: bool) {
        self.smart_format_correction = enabled;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.entries.contains_key(&tag.to_u16())
    }

    pub fn get(&self, tag: Tag) -> Option<&Entry> {
        self.entries.get(&tag.to_u16())
    }

    /// Iterate over all entries in ascending tag order.
    pub fn iter(&self) -> impl Iterator<Item = (Tag, &Entry)> + '_ {
        self.entries
            .iter()
            .map(|(k, v)| (Tag::from_u16_exhaustive(*k), v))
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Entry> {
        self.invalidate_layout_cache(tag);
        self.entries.remove(&tag.to_u16())
    }

    pub fn set_entry(&mut self, tag: Tag, entry: Entry) {
        self.invalidate_layout_cache(tag);
        self.entries.insert(tag.to_u16(), entry);
    }

    fn invalidate_layout_cache(&mut self, tag: Tag) {
        if matches!(
            tag,
            Tag::TileOffsets | Tag::StripOffsets | Tag::TileByteCounts | Tag::StripByteCounts
        ) {
            self.cached_chunk_offsets = None;
            self.cached_chunk_byte_counts = None;
        }
    }

    //
    // Typed getters
    //

    fn get_u64(&self, tag: Tag) -> TiffResult<Option<u64>> {
        match self.get(tag) {
            Some(entry) => Ok(Some(entry.as_u64()?)),
            None => Ok(None),
        }
    }

    fn require_u64(&self, tag: Tag) -> TiffResult<u64> {
        self.get_u64(tag)?
            .ok_or(TiffError::FormatError(TiffFormatError::RequiredTagNotFound(
                tag,
            )))
    }

    /// Image width in pixels.
    pub fn width(&self) -> TiffResult<u64> {
        self.require_u64(Tag::ImageWidth)
    }

    /// Image height in pixels.
    pub fn height(&self) -> TiffResult<u64> {
        self.require_u64(Tag::ImageLength)
    }

    /// `(width, height)` with the 63-bit area overflow check applied.
    pub fn dimensions(&self) -> TiffResult<(u64, u64)> {
        let width = self.width()?;
        let height = self.height()?;
        if width == 0 || height == 0 {
            return Err(TiffError::FormatError(TiffFormatError::InvalidDimensions(
                width, height,
            )));
        }
        match width.checked_mul(height) {
            Some(area) if area <= i64::MAX as u64 => Ok((width, height)),
            _ => Err(TiffError::FormatError(TiffFormatError::InvalidDimensions(
                width, height,
            ))),
        }
    }

    pub fn samples_per_pixel(&self) -> TiffResult<u16> {
        match self.get_u64(Tag::SamplesPerPixel)? {
            Some(0) => Err(TiffError::FormatError(
                TiffFormatError::SamplesPerPixelIsZero,
            )),
            Some(n) => Ok(u16::try_from(n)?),
            None => Ok(1),
        }
    }

    pub fn bits_per_sample(&self) -> TiffResult<Vec<u16>> {
        match self.get(Tag::BitsPerSample) {
            Some(entry) => entry.as_u16s(),
            None => Ok(vec![1]),
        }
    }

    /// The common bits-per-sample of all channels; mixed widths are
    /// rejected.
    pub fn uniform_bits_per_sample(&self) -> TiffResult<u16> {
        let bits = self.bits_per_sample()?;
        let first = *bits.first().ok_or(TiffError::FormatError(
            TiffFormatError::RequiredTagEmpty(Tag::BitsPerSample),
        ))?;
        if bits.iter().any(|&b| b != first) {
            return Err(TiffError::UnsupportedError(
                TiffUnsupportedError::InconsistentBitsPerSample(bits),
            ));
        }
        Ok(first)
    }

    pub fn sample_format(&self) -> TiffResult<SampleFormat> {
        let formats = match self.get(Tag::SampleFormat) {
            Some(entry) => entry.as_u16s()?,
            None => return Ok(SampleFormat::Uint),
        };
        let first = *formats.first().ok_or(TiffError::FormatError(
            TiffFormatError::RequiredTagEmpty(Tag::SampleFormat),
        ))?;
        if formats.iter().any(|&f| f != first) {
            return Err(TiffError::UnsupportedError(
                TiffUnsupportedError::InconsistentSampleFormat,
            ));
        }
        Ok(SampleFormat::from_u16_exhaustive(first))
    }

    /// The derived element type of one sample, validated against the set of
    /// supported combinations.
    pub fn sample_type(&self) -> TiffResult<SampleType> {
        let bits = self.uniform_bits_per_sample()?;
        let format = self.sample_format()?;
        let unsupported = || {
            TiffError::UnsupportedError(TiffUnsupportedError::UnsupportedSampleType {
                bits,
                format: format.to_u16(),
            })
        };
        match format {
            SampleFormat::Uint | SampleFormat::Void => match bits {
                1 => Ok(SampleType::Bit),
                8 => Ok(SampleType::U8),
                16 => Ok(SampleType::U16),
                24 => Ok(SampleType::U24),
                32 => Ok(SampleType::U32),
                _ => Err(unsupported()),
            },
            SampleFormat::Int => match bits {
                8 => Ok(SampleType::I8),
                16 => Ok(SampleType::I16),
                24 => Ok(SampleType::I24),
                32 => Ok(SampleType::I32),
                _ => Err(unsupported()),
            },
            SampleFormat::IEEEFP => match bits {
                16 => Ok(SampleType::F16),
                32 => Ok(SampleType::F32),
                64 => Ok(SampleType::F64),
                _ => Err(unsupported()),
            },
            SampleFormat::Unknown(_) => Err(unsupported()),
        }
    }

    /// The compression scheme and its raw code; the code is never lost even
    /// when the scheme is outside the catalog.
    pub fn compression(&self) -> TiffResult<(CompressionScheme, u16)> {
        let code = match self.get_u64(Tag::Compression)? {
            Some(c) => u16::try_from(c)?,
            None => 1,
        };
        Ok((CompressionScheme::from_u16_exhaustive(code), code))
    }

    pub fn photometric(&self) -> TiffResult<PhotometricInterpretation> {
        let code = match self.get_u64(Tag::PhotometricInterpretation)? {
            Some(c) => u16::try_from(c)?,
            None => {
                return Err(TiffError::FormatError(
                    TiffFormatError::RequiredTagNotFound(Tag::PhotometricInterpretation),
                ))
            }
        };
        PhotometricInterpretation::from_u16(code).ok_or(TiffError::UnsupportedError(
            TiffUnsupportedError::UnknownInterpretation,
        ))
    }

    pub fn planar_configuration(&self) -> TiffResult<PlanarConfiguration> {
        let code = match self.get_u64(Tag::PlanarConfiguration)? {
            Some(c) => u16::try_from(c)?,
            None => 1,
        };
        PlanarConfiguration::from_u16(code).ok_or(TiffError::FormatError(
            TiffFormatError::UnknownPlanarConfiguration(code),
        ))
    }

    pub fn predictor(&self) -> TiffResult<Predictor> {
        let code = match self.get_u64(Tag::Predictor)? {
            Some(c) => u16::try_from(c)?,
            None => 1,
        };
        Predictor::from_u16(code).ok_or(TiffError::FormatError(
            TiffFormatError::UnknownPredictor(code),
        ))
    }

    pub fn fill_order(&self) -> TiffResult<FillOrder> {
        let code = match self.get_u64(Tag::FillOrder)? {
            Some(c) => u16::try_from(c)?,
            None => 1,
        };
        FillOrder::from_u16(code).ok_or(TiffError::FormatError(
            TiffFormatError::UnknownFillOrder(code),
        ))
    }

    /// YCbCr chroma subsampling factors, `(horizontal, vertical)`.
    pub fn ycbcr_subsampling(&self) -> TiffResult<(u16, u16)> {
        match self.get(Tag::YCbCrSubSampling) {
            Some(entry) => {
                let v = entry.as_u16s()?;
                if v.len() != 2 {
                    return Err(TiffError::FormatError(
                        TiffFormatError::InconsistentSizesEncountered,
                    ));
                }
                Ok((v[0], v[1]))
            }
            None => Ok((2, 2)),
        }
    }

    pub fn description(&self) -> TiffResult<Option<String>> {
        match self.get(Tag::ImageDescription) {
            Some(entry) => Ok(Some(entry.as_text()?)),
            None => Ok(None),
        }
    }

    pub fn jpeg_tables(&self) -> Option<&[u8]> {
        self.get(Tag::JpegTables).map(|e| e.data())
    }

    //
    // Chunk (tile/strip) geometry
    //

    /// Whether the image stores tiles or strips; files carrying both
    /// vocabularies are diagnosed.
    pub fn chunk_kind(&self) -> TiffResult<ChunkKind> {
        let tiled = self.contains(Tag::TileOffsets);
        let stripped = self.contains(Tag::StripOffsets);
        match (tiled, stripped) {
            (true, false) => Ok(ChunkKind::Tiles),
            (false, true) => Ok(ChunkKind::Strips),
            (true, true) => Err(TiffError::FormatError(
                TiffFormatError::StripTileTagConflict,
            )),
            (false, false) => Err(TiffError::FormatError(
                TiffFormatError::RequiredTagNotFound(Tag::TileOffsets),
            )),
        }
    }

    /// Is this a tiled image (as opposed to strips)?
    pub fn is_tiled(&self) -> bool {
        self.contains(Tag::TileWidth) || self.contains(Tag::TileOffsets)
    }

    /// Tile dimensions; strips are reported as full-width tiles of
    /// `RowsPerStrip` height.
    pub fn tile_size(&self) -> TiffResult<(u32, u32)> {
        if self.is_tiled() {
            let tw = u32::try_from(self.require_u64(Tag::TileWidth)?)?;
            let th = u32::try_from(self.require_u64(Tag::TileLength)?)?;
            if tw == 0 || th == 0 {
                return Err(TiffError::FormatError(TiffFormatError::ZeroTileSize));
            }
            Ok((tw, th))
        } else {
            let (width, height) = self.dimensions()?;
            let rows = match self.get_u64(Tag::RowsPerStrip)? {
                Some(0) | None => height,
                Some(r) => r.min(height),
            };
            Ok((u32::try_from(width)?, u32::try_from(rows)?))
        }
    }

    /// Parses and caches the chunk offset array; later calls are O(1).
    pub fn cache_chunk_layout(&mut self) -> TiffResult<()> {
        if self.cached_chunk_offsets.is_none() {
            self.cached_chunk_offsets = Some(self.chunk_offsets()?);
        }
        if self.cached_chunk_byte_counts.is_none() {
            self.cached_chunk_byte_counts = Some(self.chunk_byte_counts()?);
        }
        Ok(())
    }

    /// Absolute file offsets of all chunks, tile- or strip-based.
    pub fn chunk_offsets(&self) -> TiffResult<Vec<u64>> {
        if let Some(cached) = &self.cached_chunk_offsets {
            return Ok(cached.clone());
        }
        let tag = match self.chunk_kind()? {
            ChunkKind::Tiles => Tag::TileOffsets,
            ChunkKind::Strips => Tag::StripOffsets,
        };
        self.get(tag)
            .ok_or(TiffError::FormatError(TiffFormatError::RequiredTagNotFound(
                tag,
            )))?
            .as_u64s()
    }

    /// Stored offset of one chunk; `None` when the index is out of range.
    pub fn chunk_offset_at(&self, index: usize) -> TiffResult<Option<u64>> {
        if let Some(cached) = &self.cached_chunk_offsets {
            return Ok(cached.get(index).copied());
        }
        Ok(self.chunk_offsets()?.get(index).copied())
    }

    /// Stored byte count of one chunk; `None` when the index is out of
    /// range.
    pub fn chunk_byte_count_at(&self, index: usize) -> TiffResult<Option<u64>> {
        if let Some(cached) = &self.cached_chunk_byte_counts {
            return Ok(cached.get(index).copied());
        }
        Ok(self.chunk_byte_counts()?.get(index).copied())
    }

    /// Encoded byte counts of all chunks.
    pub fn chunk_byte_counts(&self) -> TiffResult<Vec<u64>> {
        if let Some(cached) = &self.cached_chunk_byte_counts {
            return Ok(cached.clone());
        }
        let tag = match self.chunk_kind()? {
            ChunkKind::Tiles => Tag::TileByteCounts,
            ChunkKind::Strips => Tag::StripByteCounts,
        };
        self.get(tag)
            .ok_or(TiffError::FormatError(TiffFormatError::RequiredTagNotFound(
                tag,
            )))?
            .as_u64s()
    }

    //
    // Setters
    //

    pub fn set_dimensions(&mut self, width: u64, height: u64) -> TiffResult<()> {
        if width == 0
            || height == 0
            || width.checked_mul(height).map_or(true, |a| a > i64::MAX as u64)
        {
            return Err(TiffError::FormatError(TiffFormatError::InvalidDimensions(
                width, height,
            )));
        }
        self.set_entry(Tag::ImageWidth, long_or_long8(width, self.big_tiff)?);
        self.set_entry(Tag::ImageLength, long_or_long8(height, self.big_tiff)?);
        Ok(())
    }

    /// Sets the photometric interpretation and, when `SamplesPerPixel` is
    /// still unset, its implied default channel count.
    pub fn set_photometric(&mut self, photometric: PhotometricInterpretation) {
        self.set_entry(
            Tag::PhotometricInterpretation,
            Entry::from_shorts(&[photometric.to_u16()]),
        );
        if !self.contains(Tag::SamplesPerPixel) {
            self.set_entry(
                Tag::SamplesPerPixel,
                Entry::from_shorts(&[photometric.default_samples_per_pixel()]),
            );
        }
    }

    pub fn set_samples_per_pixel(&mut self, samples: u16) -> TiffResult<()> {
        if samples == 0 {
            return Err(TiffError::FormatError(
                TiffFormatError::SamplesPerPixelIsZero,
            ));
        }
        self.set_entry(Tag::SamplesPerPixel, Entry::from_shorts(&[samples]));
        Ok(())
    }

    pub fn set_bits_per_sample(&mut self, bits: &[u16]) {
        self.set_entry(Tag::BitsPerSample, Entry::from_shorts(bits));
    }

    pub fn set_sample_format(&mut self, format: SampleFormat, samples: u16) {
        self.set_entry(
            Tag::SampleFormat,
            Entry::from_shorts(&vec![format.to_u16(); samples as usize]),
        );
    }

    pub fn set_compression(&mut self, scheme: CompressionScheme) {
        self.set_entry(Tag::Compression, Entry::from_shorts(&[scheme.to_u16()]));
    }

    pub fn set_predictor(&mut self, predictor: Predictor) {
        self.set_entry(Tag::Predictor, Entry::from_shorts(&[predictor.to_u16()]));
    }

    pub fn set_planar_configuration(&mut self, config: PlanarConfiguration) {
        self.set_entry(
            Tag::PlanarConfiguration,
            Entry::from_shorts(&[config.to_u16()]),
        );
    }

    pub fn set_fill_order(&mut self, order: FillOrder) {
        self.set_entry(Tag::FillOrder, Entry::from_shorts(&[order.to_u16()]));
    }

    /// Tile dimensions must be positive multiples of 16; with smart format
    /// correction they are rounded up instead of rejected.
    pub fn set_tile_size(&mut self, width: u32, height: u32) -> TiffResult<()> {
        if width == 0 || height == 0 {
            return Err(TiffError::FormatError(TiffFormatError::ZeroTileSize));
        }
        let (mut width, mut height) = (width, height);
        if width % 16 != 0 || height % 16 != 0 {
            if self.smart_format_correction {
                width = width.div_ceil(16) * 16;
                height = height.div_ceil(16) * 16;
            } else {
                return Err(TiffError::FormatError(TiffFormatError::Format(format!(
                    "tile size {}x{} is not a multiple of 16",
                    width, height
                ))));
            }
        }
        self.set_entry(Tag::TileWidth, Entry::from_longs(&[width]));
        self.set_entry(Tag::TileLength, Entry::from_longs(&[height]));
        Ok(())
    }

    pub fn set_rows_per_strip(&mut self, rows: u32) {
        self.set_entry(Tag::RowsPerStrip, Entry::from_longs(&[rows]));
    }

    /// Writes the description string, refusing non-ASCII text unless the
    /// directory opted into UTF-8.
    pub fn set_description(&mut self, text: &str) -> TiffResult<()> {
        if !self.utf8_descriptions && !text.is_ascii() {
            return Err(TiffError::UnsupportedError(
                TiffUnsupportedError::NonAsciiDescription,
            ));
        }
        self.set_entry(Tag::ImageDescription, Entry::from_text(text));
        Ok(())
    }

    pub fn set_software(&mut self, text: &str) {
        self.set_entry(Tag::Software, Entry::from_text(text));
    }

    pub fn set_resolution(&mut self, unit: crate::tags::ResolutionUnit, x: (u32, u32), y: (u32, u32)) {
        self.set_entry(Tag::ResolutionUnit, Entry::from_shorts(&[unit.to_u16()]));
        self.set_entry(Tag::XResolution, Entry::from_rationals(&[x]));
        self.set_entry(Tag::YResolution, Entry::from_rationals(&[y]));
    }

    /// Stores the chunk placement arrays, tile- or strip-flavored.
    pub(crate) fn set_chunk_layout(&mut self, offsets: &[u64], byte_counts: &[u64]) -> TiffResult<()> {
        let (offsets_tag, counts_tag) = if self.is_tiled() {
            (Tag::TileOffsets, Tag::TileByteCounts)
        } else {
            (Tag::StripOffsets, Tag::StripByteCounts)
        };
        if self.big_tiff {
            self.set_entry(offsets_tag, Entry::from_long8s(offsets));
            self.set_entry(counts_tag, Entry::from_long8s(byte_counts));
        } else {
            let narrow = |values: &[u64]| -> TiffResult<Vec<u32>> {
                values
                    .iter()
                    .map(|&v| u32::try_from(v).map_err(TiffError::from))
                    .collect()
            };
            self.set_entry(offsets_tag, Entry::from_longs(&narrow(offsets)?));
            self.set_entry(counts_tag, Entry::from_longs(&narrow(byte_counts)?));
        }
        Ok(())
    }

    //
    // On-disk representation
    //

    fn slot_size(big_tiff: bool) -> u64 {
        if big_tiff {
            8
        } else {
            4
        }
    }

    fn entry_record_size(big_tiff: bool) -> u64 {
        // tag + type + count + value-or-offset
        if big_tiff {
            20
        } else {
            12
        }
    }

    fn count_field_size(big_tiff: bool) -> u64 {
        if big_tiff {
            8
        } else {
            2
        }
    }

    /// Full serialized extent: count field, entry records, next-IFD pointer
    /// and all out-of-line value arrays (each padded to a word boundary).
    pub fn serialized_size(&self) -> u64 {
        let slot = Self::slot_size(self.big_tiff);
        let mut size = Self::count_field_size(self.big_tiff)
            + self.entries.len() as u64 * Self::entry_record_size(self.big_tiff)
            + slot;
        for entry in self.entries.values() {
            let len = entry.data_len();
            if len > slot {
                size += len + (len & 1);
            }
        }
        size
    }

    /// Reads a directory and all of its out-of-line value data.
    ///
    /// In strict mode structural defects (duplicate, unordered or unknown
    /// typed tags) are errors; otherwise they are logged and skipped.
    pub(crate) fn read_from<R: Read + Seek>(
        reader: &mut EndianReader<R>,
        offset: u64,
        big_tiff: bool,
        stream_len: u64,
        strict: bool,
    ) -> TiffResult<Ifd> {
        reader.goto_offset(offset)?;
        let entry_count = if big_tiff {
            reader.read_u64()?
        } else {
            reader.read_u16()? as u64
        };

        let record_size = Self::entry_record_size(big_tiff);
        let table_end = offset
            .checked_add(Self::count_field_size(big_tiff))
            .and_then(|o| o.checked_add(entry_count.checked_mul(record_size)?))
            .and_then(|o| o.checked_add(Self::slot_size(big_tiff)))
            .ok_or(TiffError::FormatError(TiffFormatError::DirectoryOutOfBounds))?;
        if table_end > stream_len {
            return Err(TiffError::FormatError(TiffFormatError::DirectoryOutOfBounds));
        }

        // First pass: the fixed-size records.
        struct RawEntry {
            tag: u16,
            type_: Option<Type>,
            raw_type: u16,
            count: u64,
            slot: [u8; 8],
        }
        let mut raw = Vec::with_capacity(entry_count.min(1 << 16) as usize);
        for _ in 0..entry_count {
            let tag = reader.read_u16()?;
            let raw_type = reader.read_u16()?;
            let count = if big_tiff {
                reader.read_u64()?
            } else {
                reader.read_u32()? as u64
            };
            let mut slot = [0u8; 8];
            let slot_len = Self::slot_size(big_tiff) as usize;
            reader.read_exact(&mut slot[..slot_len])?;
            raw.push(RawEntry {
                tag,
                type_: Type::from_u16(raw_type),
                raw_type,
                count,
                slot,
            });
        }
        let next_ifd = if big_tiff {
            reader.read_u64()?
        } else {
            reader.read_u32()? as u64
        };

        // Second pass: order and uniqueness, then the value data.
        let mut ifd = Ifd::new(reader.byte_order(), big_tiff);
        let mut previous_tag: Option<u16> = None;
        for raw_entry in raw {
            if let Some(prev) = previous_tag {
                if raw_entry.tag == prev {
                    if strict {
                        return Err(TiffError::FormatError(TiffFormatError::DuplicateTag(
                            raw_entry.tag,
                        )));
                    }
                    warn!("duplicate tag {} in IFD at {:#x}, keeping the first", raw_entry.tag, offset);
                    continue;
                }
                if raw_entry.tag < prev {
                    if strict {
                        return Err(TiffError::FormatError(TiffFormatError::OutOfOrderTag(
                            raw_entry.tag,
                        )));
                    }
                    warn!("out-of-order tag {} in IFD at {:#x}", raw_entry.tag, offset);
                }
            }
            previous_tag = Some(raw_entry.tag);

            let Some(type_) = raw_entry.type_ else {
                if strict {
                    return Err(TiffError::FormatError(TiffFormatError::InvalidTag));
                }
                warn!(
                    "tag {} has unknown field type {}, skipped",
                    raw_entry.tag, raw_entry.raw_type
                );
                continue;
            };

            if raw_entry.count > MAX_ENTRY_ELEMENTS {
                return Err(TiffError::LimitsExceeded);
            }
            let value_bytes = raw_entry
                .count
                .checked_mul(type_.size() as u64)
                .ok_or(TiffError::LimitsExceeded)?;

            let mut data = vec![0u8; value_bytes as usize];
            if value_bytes <= Self::slot_size(big_tiff) {
                data.copy_from_slice(&raw_entry.slot[..value_bytes as usize]);
            } else {
                let mut slot_reader = EndianReader::new(
                    std::io::Cursor::new(&raw_entry.slot[..]),
                    reader.byte_order(),
                );
                let value_offset = if big_tiff {
                    slot_reader.read_u64()?
                } else {
                    slot_reader.read_u32()? as u64
                };
                if value_offset
                    .checked_add(value_bytes)
                    .map_or(true, |end| end > stream_len)
                {
                    return Err(TiffError::FormatError(
                        TiffFormatError::DirectoryOutOfBounds,
                    ));
                }
                reader.goto_offset(value_offset)?;
                reader.read_exact(&mut data)?;
            }

            let mut entry = Entry {
                type_,
                count: raw_entry.count,
                data,
            };
            let component_bits = entry.component_bits();
            fix_endianness(&mut entry.data, reader.byte_order(), component_bits);
            // Insert directly; ordering diagnostics already ran above.
            ifd.entries.insert(raw_entry.tag, entry);
        }

        ifd.offset_for_reading = Some(offset);
        ifd.offset_for_writing = Some(offset);
        ifd.next_ifd = next_ifd;
        ifd.reserved_room = Some(ifd.serialized_size());
        Ok(ifd)
    }

    /// Serializes the directory block followed by its out-of-line arrays at
    /// `writer`'s current offset, which must equal `at`. The value written
    /// into the next-IFD slot is `self.next_ifd_offset()`; its file position
    /// is returned so chain links can be patched later.
    pub(crate) fn write_to<W: Write + Seek>(
        &self,
        writer: &mut EndianWriter<W>,
        at: u64,
    ) -> TiffResult<u64> {
        debug_assert_eq!(writer.offset(), at);
        let big = self.big_tiff;
        let slot = Self::slot_size(big);

        // Lay out the out-of-line arrays after the next-IFD pointer.
        let mut array_offset = at
            + Self::count_field_size(big)
            + self.entries.len() as u64 * Self::entry_record_size(big)
            + slot;

        if big {
            writer.write_u64(self.entries.len() as u64)?;
        } else {
            writer.write_u16(u16::try_from(self.entries.len())?)?;
        }

        let mut spill: Vec<&Entry> = Vec::new();
        for (&tag, entry) in &self.entries {
            writer.write_u16(tag)?;
            writer.write_u16(entry.type_.to_u16())?;
            if big {
                writer.write_u64(entry.count)?;
            } else {
                writer.write_u32(u32::try_from(entry.count)?)?;
            }

            let len = entry.data_len();
            if len <= slot {
                // Inline: value bytes left-justified, zero-padded.
                let mut bytes = Vec::with_capacity(slot as usize);
                {
                    let mut slot_writer = EndianWriter::new(&mut bytes, writer.byte_order());
                    write_entry_elements(&mut slot_writer, entry)?;
                }
                bytes.resize(slot as usize, 0);
                writer.write_bytes(&bytes)?;
            } else {
                write_offset_value(writer, big, array_offset)?;
                spill.push(entry);
                array_offset += len + (len & 1);
            }
        }

        let next_ifd_slot = writer.offset();
        write_offset_value(writer, big, self.next_ifd)?;

        for entry in spill {
            write_entry_elements(writer, entry)?;
            if entry.data_len() & 1 == 1 {
                writer.write_u8(0)?;
            }
        }

        Ok(next_ifd_slot)
    }

    /// One line: placement, entry count and the headline geometry.
    pub fn brief(&self) -> String {
        let place = match self.offset_for_reading {
            Some(o) => format!("@{:#x}", o),
            None => String::from("(new)"),
        };
        let geometry = match (self.get_u64(Tag::ImageWidth), self.get_u64(Tag::ImageLength)) {
            (Ok(Some(w)), Ok(Some(h))) => format!(" {}x{}", w, h),
            _ => String::new(),
        };
        let compression = self
            .compression()
            .map(|(scheme, _)| format!(" {:?}", scheme))
            .unwrap_or_default();
        format!(
            "IFD{place}: {} entries{geometry}{compression}",
            self.entries.len()
        )
    }

    /// A JSON object with stable tag-name keys, for diagnostics and
    /// round-trip tests.
    pub fn to_json(&self) -> serde_json::Value {
        let mut tags = serde_json::Map::new();
        for (&code, entry) in &self.entries {
            let key = match Tag::from_u16(code) {
                Some(tag) => format!("{:?}", tag),
                None => format!("Tag{}", code),
            };
            let values: Vec<serde_json::Value> = entry
                .decoded_values()
                .into_iter()
                .map(|v| match v {
                    Value::Ascii(s) => serde_json::Value::String(s),
                    Value::Float(x) => serde_json::json!(x),
                    Value::Double(x) => serde_json::json!(x),
                    Value::Rational(n, d) => serde_json::json!(format!("{n}/{d}")),
                    Value::SRational(n, d) => serde_json::json!(format!("{n}/{d}")),
                    Value::SignedByte(x) => serde_json::json!(x),
                    Value::SignedShort(x) => serde_json::json!(x),
                    Value::SignedLong(x) => serde_json::json!(x),
                    Value::SignedLong8(x) => serde_json::json!(x),
                    other => serde_json::json!(other.into_u64().unwrap_or(0)),
                })
                .collect();
            tags.insert(
                key,
                if values.len() == 1 {
                    values.into_iter().next().unwrap()
                } else {
                    serde_json::Value::Array(values)
                },
            );
        }
        serde_json::json!({
            "bigTiff": self.big_tiff,
            "entries": self.entries.len(),
            "tags": serde_json::Value::Object(tags),
        })
    }
}

impl fmt::Display for Ifd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.brief())?;
        for (tag, entry) in self.iter() {
            let values = entry.decoded_values();
            write!(
                f,
                "  {:?} ({}) {:?}[{}]: ",
                tag,
                tag.to_u16(),
                entry.type_(),
                entry.count()
            )?;
            const SHOWN: usize = 16;
            for (i, v) in values.iter().take(SHOWN).enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{v}")?;
            }
            if values.len() > SHOWN {
                write!(f, ", … ({} more)", values.len() - SHOWN)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A width-appropriate LONG/LONG8 entry for a single value.
fn long_or_long8(value: u64, big_tiff: bool) -> TiffResult<Entry> {
    if big_tiff {
        Ok(Entry::from_long8s(&[value]))
    } else {
        Ok(Entry::from_longs(&[u32::try_from(value)?]))
    }
}

fn write_offset_value<W: Write>(
    writer: &mut EndianWriter<W>,
    big_tiff: bool,
    offset: u64,
) -> TiffResult<()> {
    if big_tiff {
        writer.write_u64(offset)?;
    } else {
        writer.write_u32(u32::try_from(offset)?)?;
    }
    Ok(())
}

/// Writes the entry's elements in the file byte order.
fn write_entry_elements<W: Write>(
    writer: &mut EndianWriter<W>,
    entry: &Entry,
) -> TiffResult<()> {
    let data = entry.data();
    match entry.type_() {
        Type::BYTE | Type::SBYTE | Type::ASCII | Type::UNDEFINED => writer.write_bytes(data)?,
        Type::SHORT | Type::SSHORT => {
            for c in data.chunks_exact(2) {
                writer.write_u16(u16::from_ne_bytes(c.try_into().unwrap()))?;
            }
        }
        Type::LONG | Type::SLONG | Type::IFD => {
            for c in data.chunks_exact(4) {
                writer.write_u32(u32::from_ne_bytes(c.try_into().unwrap()))?;
            }
        }
        Type::FLOAT => {
            for c in data.chunks_exact(4) {
                writer.write_f32(f32::from_ne_bytes(c.try_into().unwrap()))?;
            }
        }
        Type::LONG8 | Type::SLONG8 | Type::IFD8 => {
            for c in data.chunks_exact(8) {
                writer.write_u64(u64::from_ne_bytes(c.try_into().unwrap()))?;
            }
        }
        Type::DOUBLE => {
            for c in data.chunks_exact(8) {
                writer.write_f64(f64::from_ne_bytes(c.try_into().unwrap()))?;
            }
        }
        Type::RATIONAL | Type::SRATIONAL => {
            for c in data.chunks_exact(4) {
                writer.write_u32(u32::from_ne_bytes(c.try_into().unwrap()))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_ifd(big_tiff: bool, order: ByteOrder) -> Ifd {
        let mut ifd = Ifd::new(order, big_tiff);
        ifd.set_dimensions(300, 200).unwrap();
        ifd.set_photometric(PhotometricInterpretation::RGB);
        ifd.set_bits_per_sample(&[8, 8, 8]);
        ifd.set_compression(CompressionScheme::None);
        ifd.set_description("a test image").unwrap();
        ifd
    }

    fn round_trip(ifd: &Ifd) -> Ifd {
        let mut sink = EndianWriter::new(Cursor::new(Vec::new()), ifd.byte_order());
        // Simulate a directory living at a non-zero position.
        sink.write_bytes(&[0u8; 16]).unwrap();
        ifd.write_to(&mut sink, 16).unwrap();
        let bytes = sink.inner().clone().into_inner();
        let len = bytes.len() as u64;
        let mut src = EndianReader::new(Cursor::new(bytes), ifd.byte_order());
        Ifd::read_from(&mut src, 16, ifd.is_big_tiff(), len, true).unwrap()
    }

    #[test]
    fn write_read_round_trip_classic() {
        let ifd = sample_ifd(false, ByteOrder::LittleEndian);
        let back = round_trip(&ifd);
        assert_eq!(ifd, back);
        assert_eq!(back.width().unwrap(), 300);
        assert_eq!(back.description().unwrap().as_deref(), Some("a test image"));
    }

    #[test]
    fn write_read_round_trip_bigtiff_be() {
        let ifd = sample_ifd(true, ByteOrder::BigEndian);
        let back = round_trip(&ifd);
        assert_eq!(ifd, back);
        assert_eq!(back.samples_per_pixel().unwrap(), 3);
    }

    #[test]
    fn photometric_sets_default_samples() {
        let mut ifd = Ifd::new(ByteOrder::LittleEndian, false);
        ifd.set_photometric(PhotometricInterpretation::CMYK);
        assert_eq!(ifd.samples_per_pixel().unwrap(), 4);
        // An explicit value is not clobbered.
        let mut ifd = Ifd::new(ByteOrder::LittleEndian, false);
        ifd.set_samples_per_pixel(2).unwrap();
        ifd.set_photometric(PhotometricInterpretation::RGB);
        assert_eq!(ifd.samples_per_pixel().unwrap(), 2);
    }

    #[test]
    fn tile_size_multiple_of_16() {
        let mut ifd = Ifd::new(ByteOrder::LittleEndian, false);
        assert!(ifd.set_tile_size(100, 96).is_err());
        ifd.set_smart_format_correction(true);
        ifd.set_tile_size(100, 96).unwrap();
        // TileWidth must have been rounded up.
        assert_eq!(ifd.get(Tag::TileWidth).unwrap().as_u64().unwrap(), 112);
        assert_eq!(ifd.get(Tag::TileLength).unwrap().as_u64().unwrap(), 96);
    }

    #[test]
    fn description_rejects_non_ascii_by_default() {
        let mut ifd = Ifd::new(ByteOrder::LittleEndian, false);
        assert!(ifd.set_description("öl").is_err());
        ifd.allow_utf8_descriptions(true);
        ifd.set_description("öl").unwrap();
        assert_eq!(ifd.description().unwrap().as_deref(), Some("öl"));
    }

    #[test]
    fn dimension_overflow_is_rejected() {
        let mut ifd = Ifd::new(ByteOrder::LittleEndian, true);
        assert!(ifd.set_dimensions(1 << 32, 1 << 32).is_err());
    }

    #[test]
    fn unknown_compression_keeps_raw_code() {
        let mut ifd = Ifd::new(ByteOrder::LittleEndian, false);
        ifd.set_entry(Tag::Compression, Entry::from_shorts(&[50_000]));
        let (scheme, code) = ifd.compression().unwrap();
        assert_eq!(scheme, CompressionScheme::Unknown(50_000));
        assert_eq!(code, 50_000);
    }

    #[test]
    fn serialized_size_matches_written_bytes() {
        for big in [false, true] {
            let ifd = sample_ifd(big, ByteOrder::LittleEndian);
            let mut sink = EndianWriter::new(Cursor::new(Vec::new()), ByteOrder::LittleEndian);
            ifd.write_to(&mut sink, 0).unwrap();
            assert_eq!(sink.offset(), ifd.serialized_size());
        }
    }

    #[test]
    fn strict_mode_rejects_bad_order() {
        // Hand-build a directory whose entries are out of order.
        let mut sink = EndianWriter::new(Cursor::new(Vec::new()), ByteOrder::LittleEndian);
        sink.write_u16(2).unwrap();
        for tag in [257u16, 256] {
            sink.write_u16(tag).unwrap();
            sink.write_u16(Type::LONG.to_u16()).unwrap();
            sink.write_u32(1).unwrap();
            sink.write_u32(7).unwrap();
        }
        sink.write_u32(0).unwrap();
        let bytes = sink.inner().clone().into_inner();
        let len = bytes.len() as u64;
        let mut src = EndianReader::new(Cursor::new(bytes.clone()), ByteOrder::LittleEndian);
        assert!(Ifd::read_from(&mut src, 0, false, len, true).is_err());
        let mut src = EndianReader::new(Cursor::new(bytes), ByteOrder::LittleEndian);
        let lenient = Ifd::read_from(&mut src, 0, false, len, false).unwrap();
        assert_eq!(lenient.len(), 2);
    }

    #[test]
    fn json_has_stable_keys() {
        let ifd = sample_ifd(false, ByteOrder::LittleEndian);
        let json = ifd.to_json();
        assert_eq!(json["tags"]["ImageWidth"], serde_json::json!(300));
        assert_eq!(json["tags"]["BitsPerSample"], serde_json::json!([8, 8, 8]));
    }
}
