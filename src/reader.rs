//! Reading TIFF and BigTIFF files: header, IFD chain, tiles, rectangles.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::Arc;

use log::warn;

use crate::buffer::ChannelBuffer;
use crate::cache::{TileCache, TileKey, DEFAULT_TILE_CACHE_BUDGET};
use crate::codec::CodecRegistry;
use crate::error::{TiffError, TiffFormatError, TiffResult, TileOp, UsageError};
use crate::ifd::Ifd;
use crate::map::{Region, TileMap};
use crate::stream::{ByteOrder, EndianReader};
use crate::tags::PhotometricInterpretation;
use crate::tile::TileIndex;
use crate::SampleType;

/// Upper bound on chain length; a guard against pointer garbage.
const MAX_IFD_COUNT: usize = 1 << 20;

/// How strictly problems are treated while opening a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Defer all errors; the deferred error is available from
    /// [`TiffReader::open_error`].
    NoChecks,
    /// A non-TIFF file is not an error; callers test [`TiffReader::is_tiff`].
    AllowNonTiff,
    /// Any problem fails immediately, including an unreadable first IFD.
    #[default]
    ValidTiff,
}

/// Tuning knobs for a reader instance.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub open_mode: OpenMode,
    /// Replace tiles with zero or out-of-range placement by filler pixels
    /// instead of failing.
    pub missing_tiles_allowed: bool,
    /// The byte used for missing pixels and boundary padding.
    pub byte_filler: u8,
    /// Assume boundary tiles store only their in-image pixels, as written
    /// by a cropping writer. Full-size boundary payloads are accepted
    /// either way; the flag decides the geometry handed to dimensioned
    /// codecs.
    pub crop_boundary_tiles: bool,
    /// Hand out pixel-major bytes from [`TiffReader::read_rectangle_bytes`]
    /// instead of channel-major planes.
    pub interleave_results: bool,
    /// Expand 1-bit samples to 0/255 bytes and half floats to f32 in
    /// rectangle results.
    pub auto_unpack: bool,
    /// Invert samples of WhiteIsZero images in rectangle results.
    pub auto_correct_inverted_brightness: bool,
    /// Byte budget of the decoded-tile cache.
    pub cache_budget: usize,
    /// External codecs, keyed by raw compression code.
    pub codecs: CodecRegistry,
}

impl Default for ReaderOptions {
    fn default() -> ReaderOptions {
        ReaderOptions {
            open_mode: OpenMode::default(),
            missing_tiles_allowed: false,
            byte_filler: 0,
            crop_boundary_tiles: false,
            interleave_results: false,
            auto_unpack: false,
            auto_correct_inverted_brightness: false,
            cache_budget: DEFAULT_TILE_CACHE_BUDGET,
            codecs: CodecRegistry::new(),
        }
    }
}

/// The parsed file header.
#[derive(Debug, Clone, Copy)]
struct Header {
    byte_order: ByteOrder,
    big_tiff: bool,
    first_ifd: u64,
}

/// A read handle over one TIFF file.
pub struct TiffReader<R: Read + Seek> {
    stream: EndianReader<R>,
    stream_len: u64,
    header: Option<Header>,
    open_error: Option<TiffError>,
    options: ReaderOptions,
    /// The chain, once fully walked.
    ifds: Option<Vec<Ifd>>,
    cache: TileCache,
    closed: bool,
}

impl TiffReader<BufReader<File>> {
    /// Opens a file with a buffered stream and default options.
    pub fn open(path: impl AsRef<Path>) -> TiffResult<TiffReader<BufReader<File>>> {
        Self::open_with(path, ReaderOptions::default())
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        options: ReaderOptions,
    ) -> TiffResult<TiffReader<BufReader<File>>> {
        let file = File::open(path)?;
        TiffReader::new(BufReader::with_capacity(64 * 1024, file), options)
    }
}

impl<R: Read + Seek> TiffReader<R> {
    /// Wraps an already-open stream. The stream should be buffered; IFD
    /// traversal issues many small reads.
    pub fn new(stream: R, options: ReaderOptions) -> TiffResult<TiffReader<R>> {
        let mut stream = EndianReader::new(stream, ByteOrder::LittleEndian);
        let stream_len = stream.stream_len()?;
        let mut reader = TiffReader {
            stream,
            stream_len,
            header: None,
            open_error: None,
            cache: TileCache::new(options.cache_budget),
            options,
            ifds: None,
            closed: false,
        };
        match reader.parse_header() {
            Ok(header) => {
                reader.header = Some(header);
                if reader.options.open_mode == OpenMode::ValidTiff {
                    // Fail fast on an unreadable first directory.
                    reader.read_single_ifd(0)?;
                }
            }
            Err(e) => match reader.options.open_mode {
                OpenMode::ValidTiff => return Err(e),
                OpenMode::AllowNonTiff => {}
                OpenMode::NoChecks => reader.open_error = Some(e),
            },
        }
        Ok(reader)
    }

    fn parse_header(&mut self) -> TiffResult<Header> {
        self.stream.goto_offset(0)?;
        let mut order = [0u8; 2];
        self.stream.read_exact(&mut order)?;
        let byte_order = match &order {
            b"II" => ByteOrder::LittleEndian,
            b"MM" => ByteOrder::BigEndian,
            _ => {
                return Err(TiffError::FormatError(
                    TiffFormatError::TiffSignatureNotFound,
                ))
            }
        };
        self.stream.byte_order = byte_order;
        let big_tiff = match self.stream.read_u16()? {
            42 => false,
            43 => {
                // Offset size, always 8, and a zero constant.
                if self.stream.read_u16()? != 8 || self.stream.read_u16()? != 0 {
                    return Err(TiffError::FormatError(
                        TiffFormatError::TiffSignatureInvalid,
                    ));
                }
                true
            }
            _ => {
                return Err(TiffError::FormatError(
                    TiffFormatError::TiffSignatureInvalid,
                ))
            }
        };
        let first_ifd = if big_tiff {
            self.stream.read_u64()?
        } else {
            self.stream.read_u32()? as u64
        };
        Ok(Header {
            byte_order,
            big_tiff,
            first_ifd,
        })
    }

    fn header(&self) -> TiffResult<Header> {
        if self.closed {
            return Err(TiffError::UsageError(UsageError::Closed));
        }
        self.header.ok_or_else(|| match &self.open_error {
            Some(TiffError::FormatError(e)) => TiffError::FormatError(e.clone()),
            _ => TiffError::FormatError(TiffFormatError::TiffSignatureNotFound),
        })
    }

    /// Whether the stream parsed as a TIFF file.
    pub fn is_tiff(&self) -> bool {
        self.header.is_some()
    }

    /// The error deferred by [`OpenMode::NoChecks`], if any.
    pub fn open_error(&self) -> Option<&TiffError> {
        self.open_error.as_ref()
    }

    pub fn is_big_tiff(&self) -> TiffResult<bool> {
        Ok(self.header()?.big_tiff)
    }

    pub fn byte_order(&self) -> TiffResult<ByteOrder> {
        Ok(self.header()?.byte_order)
    }

    pub fn stream_length(&self) -> u64 {
        self.stream_len
    }

    fn strict(&self) -> bool {
        self.options.open_mode == OpenMode::ValidTiff
    }

    /// Walks the whole chain once and caches it. The cycle guard is a
    /// visited-offset set plus a hard count cap.
    pub fn all_ifds(&mut self) -> TiffResult<Vec<Ifd>> {
        if self.ifds.is_none() {
            let header = self.header()?;
            let strict = self.strict();
            let mut ifds = Vec::new();
            let mut seen = std::collections::HashSet::new();
            let mut next = header.first_ifd;
            while next != 0 {
                if !seen.insert(next) {
                    return Err(TiffError::FormatError(TiffFormatError::CycleInOffsets));
                }
                if ifds.len() >= MAX_IFD_COUNT {
                    return Err(TiffError::FormatError(TiffFormatError::CycleInOffsets));
                }
                let ifd = Ifd::read_from(
                    &mut self.stream,
                    next,
                    header.big_tiff,
                    self.stream_len,
                    strict,
                )?;
                next = ifd.next_ifd_offset();
                ifds.push(ifd);
            }
            if ifds.is_empty() {
                return Err(TiffError::FormatError(
                    TiffFormatError::ImageFileDirectoryNotFound,
                ));
            }
            self.ifds = Some(ifds);
        }
        Ok(self.ifds.clone().unwrap_or_default())
    }

    /// Number of directories in the chain.
    pub fn ifd_count(&mut self) -> TiffResult<usize> {
        Ok(self.all_ifds()?.len())
    }

    /// Reads the `index`-th directory, skipping over the intermediate ones
    /// without materializing their entries.
    pub fn read_single_ifd(&mut self, index: usize) -> TiffResult<Ifd> {
        if let Some(ifds) = &self.ifds {
            return ifds.get(index).cloned().ok_or(TiffError::FormatError(
                TiffFormatError::ImageFileDirectoryNotFound,
            ));
        }
        let header = self.header()?;
        let mut seen = std::collections::HashSet::new();
        let mut next = header.first_ifd;
        let mut at = 0usize;
        while next != 0 {
            if !seen.insert(next) || at >= MAX_IFD_COUNT {
                return Err(TiffError::FormatError(TiffFormatError::CycleInOffsets));
            }
            if at == index {
                let strict = self.strict();
                return Ifd::read_from(
                    &mut self.stream,
                    next,
                    header.big_tiff,
                    self.stream_len,
                    strict,
                );
            }
            next = self.skip_ifd(next, header.big_tiff)?;
            at += 1;
        }
        Err(TiffError::FormatError(
            TiffFormatError::ImageFileDirectoryNotFound,
        ))
    }

    /// Reads only the entry count and next pointer of the directory at
    /// `offset`.
    fn skip_ifd(&mut self, offset: u64, big_tiff: bool) -> TiffResult<u64> {
        self.stream.goto_offset(offset)?;
        let (count, entry_size, pointer_size) = if big_tiff {
            (self.stream.read_u64()?, 20u64, 8u64)
        } else {
            (self.stream.read_u16()? as u64, 12, 4)
        };
        let pointer_at = offset
            .checked_add(if big_tiff { 8 } else { 2 })
            .and_then(|o| o.checked_add(count.checked_mul(entry_size)?))
            .ok_or(TiffError::FormatError(TiffFormatError::DirectoryOutOfBounds))?;
        if pointer_at + pointer_size > self.stream_len {
            return Err(TiffError::FormatError(TiffFormatError::DirectoryOutOfBounds));
        }
        self.stream.goto_offset(pointer_at)?;
        Ok(if big_tiff {
            self.stream.read_u64()?
        } else {
            self.stream.read_u32()? as u64
        })
    }

    /// Builds the tile map for one image of the file.
    pub fn map(&mut self, ifd_index: usize) -> TiffResult<TileMap> {
        let mut ifd = self.read_single_ifd(ifd_index)?;
        ifd.cache_chunk_layout()?;
        let mut map = TileMap::new(
            ifd,
            false,
            self.options.byte_filler,
            self.options.crop_boundary_tiles,
        )?;
        map.set_source_index(ifd_index);
        Ok(map)
    }

    /// Reads and decodes one tile, returning the full-size (uncropped)
    /// pixel buffer in the file's sample layout. Decoded tiles are served
    /// from the per-reader cache when possible.
    pub fn read_tile(&mut self, map: &TileMap, tile_index: usize) -> TiffResult<Arc<Vec<u8>>> {
        let ifd_index = map.source_index().unwrap_or(0);
        let wrap = |e: TiffError, op: TileOp| e.for_tile(ifd_index, tile_index, op);

        let key = TileKey {
            image: map.ifd().offset_for_reading().unwrap_or(0),
            tile_index,
        };
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        if tile_index >= map.tile_count() {
            return Err(TiffError::UsageError(UsageError::TileIndexOutOfRange {
                index: tile_index,
                count: map.tile_count(),
            }));
        }

        let offset = map.ifd().chunk_offset_at(tile_index)?.unwrap_or(0);
        let length = map.ifd().chunk_byte_count_at(tile_index)?.unwrap_or(0);
        let in_range = offset > 0
            && length > 0
            && offset
                .checked_add(length)
                .map_or(false, |end| end <= self.stream_len);
        if !in_range {
            if self.options.missing_tiles_allowed {
                warn!(
                    "tile {} of image {} has no stored data, substituting filler",
                    tile_index, ifd_index
                );
                return Ok(Arc::new(vec![
                    self.options.byte_filler;
                    map.full_tile_bytes()
                ]));
            }
            return Err(wrap(
                TiffError::FormatError(TiffFormatError::MissingTileData { tile_index }),
                TileOp::Read,
            ));
        }

        let mut encoded = self
            .read_tile_raw(map, tile_index)
            .map_err(|e| wrap(e, TileOp::Read))?;

        let mut full = map
            .decode_stored_payload(
                &mut encoded,
                tile_index,
                &self.options.codecs,
                self.options.missing_tiles_allowed,
            )
            .map_err(|e| wrap(e, TileOp::Decode))?;

        if self.options.auto_correct_inverted_brightness
            && matches!(
                map.ifd().photometric(),
                Ok(PhotometricInterpretation::WhiteIsZero)
            )
        {
            invert_samples(&mut full, map.sample_type());
        }

        let full = Arc::new(full);
        self.cache.put(key, full.clone());
        Ok(full)
    }

    /// Reads one tile's stored bytes without decoding them, for verbatim
    /// copies.
    pub fn read_tile_raw(&mut self, map: &TileMap, tile_index: usize) -> TiffResult<Vec<u8>> {
        let offset = map.ifd().chunk_offset_at(tile_index)?.unwrap_or(0);
        let length = map.ifd().chunk_byte_count_at(tile_index)?.unwrap_or(0);
        let in_range = offset > 0
            && length > 0
            && offset
                .checked_add(length)
                .map_or(false, |end| end <= self.stream_len);
        if !in_range {
            return Err(TiffError::FormatError(TiffFormatError::MissingTileData {
                tile_index,
            }));
        }
        let mut encoded = vec![0u8; length as usize];
        self.stream.goto_offset(offset)?;
        self.stream.read_exact(&mut encoded)?;
        Ok(encoded)
    }

    /// Reads an arbitrary sub-rectangle, assembling a planar channel buffer
    /// from every intersecting tile. Multi-byte samples come out in native
    /// byte order.
    pub fn read_rectangle(
        &mut self,
        map: &TileMap,
        x: u64,
        y: u64,
        width: u32,
        height: u32,
    ) -> TiffResult<ChannelBuffer> {
        let rect = Region::new(x, y, width as u64, height as u64);
        let mut out = ChannelBuffer::new_filled(
            width,
            height,
            map.samples_per_pixel(),
            map.sample_type(),
            self.options.byte_filler,
        );
        if width == 0 || height == 0 || map.tile_count() == 0 {
            return Ok(out);
        }

        let (tile_width, tile_height) = map.tile_size();
        let tx0 = (rect.x / tile_width as u64) as u32;
        let tx1 = (((rect.right() - 1) / tile_width as u64) as u32).min(map.tiles_across().saturating_sub(1));
        let ty0 = (rect.y / tile_height as u64) as u32;
        let ty1 = (((rect.bottom() - 1) / tile_height as u64) as u32).min(map.tiles_down().saturating_sub(1));

        for plane in 0..map.planes() {
            for ty in ty0..=ty1 {
                for tx in tx0..=tx1 {
                    let index = TileIndex {
                        x: tx,
                        y: ty,
                        plane,
                    };
                    let linear = map.linear_index(index);
                    let tile = self.read_tile(map, linear)?;
                    map.blit_tile_to_channels(&tile, index, &mut out, &rect);
                }
            }
        }

        if self.options.auto_unpack {
            out = auto_unpack(out);
        }
        Ok(out)
    }

    /// Like [`Self::read_rectangle`], but interleaved to pixel-major bytes.
    pub fn read_rectangle_interleaved(
        &mut self,
        map: &TileMap,
        x: u64,
        y: u64,
        width: u32,
        height: u32,
    ) -> TiffResult<Vec<u8>> {
        self.read_rectangle(map, x, y, width, height)?.interleaved()
    }

    /// Raw rectangle bytes, channel-major by default or pixel-major when
    /// the `interleave_results` option is set.
    pub fn read_rectangle_bytes(
        &mut self,
        map: &TileMap,
        x: u64,
        y: u64,
        width: u32,
        height: u32,
    ) -> TiffResult<Vec<u8>> {
        let buffer = self.read_rectangle(map, x, y, width, height)?;
        if self.options.interleave_results {
            buffer.interleaved()
        } else {
            Ok(buffer.into_data())
        }
    }

    /// Drops the cache and marks the handle closed.
    pub fn close(&mut self) -> TiffResult<()> {
        self.cache.clear();
        self.closed = true;
        Ok(())
    }

    /// Consumes the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.stream.into_inner()
    }
}

/// WhiteIsZero correction: bitwise complement works for every unsigned
/// integer width; floats are left alone.
fn invert_samples(data: &mut [u8], sample_type: SampleType) {
    match sample_type {
        SampleType::Bit
        | SampleType::U8
        | SampleType::U16
        | SampleType::U24
        | SampleType::U32 => {
            for b in data {
                *b = !*b;
            }
        }
        _ => {}
    }
}

/// Expands unusual precisions to their natural machine type: packed bits to
/// 0/255 bytes, half floats to f32.
fn auto_unpack(buffer: ChannelBuffer) -> ChannelBuffer {
    match buffer.sample_type() {
        SampleType::Bit => {
            let (width, height, channels) =
                (buffer.width(), buffer.height(), buffer.channels());
            let mut out = ChannelBuffer::new_filled(width, height, channels, SampleType::U8, 0);
            for c in 0..channels {
                for y in 0..height {
                    let src = buffer.row(c, y);
                    let dst = out.row_mut(c, y);
                    for (x, value) in dst.iter_mut().enumerate() {
                        let bit = (src[x / 8] >> (7 - x % 8)) & 1;
                        *value = if bit == 1 { 255 } else { 0 };
                    }
                }
            }
            out
        }
        SampleType::F16 => {
            let (width, height, channels) =
                (buffer.width(), buffer.height(), buffer.channels());
            let mut out = ChannelBuffer::new_filled(width, height, channels, SampleType::F32, 0);
            for c in 0..channels {
                for y in 0..height {
                    let src = buffer.row(c, y);
                    let dst = out.row_mut(c, y);
                    for x in 0..width as usize {
                        let half = half::f16::from_ne_bytes([src[x * 2], src[x * 2 + 1]]);
                        dst[x * 4..x * 4 + 4]
                            .copy_from_slice(&half.to_f32().to_ne_bytes());
                    }
                }
            }
            out
        }
        _ => buffer,
    }
}
