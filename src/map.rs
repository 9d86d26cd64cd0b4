//! The tile map: one image's pixel geometry, its grid of tiles and the
//! lifecycle bookkeeping for incremental writing.

use std::collections::BTreeMap;

use crate::buffer::ChannelBuffer;
use crate::codec::CodecOptions;
use crate::error::{TiffError, TiffFormatError, TiffResult, UsageError};
use crate::ifd::Ifd;
use crate::stream::ByteOrder;
use crate::tags::PlanarConfiguration;
use crate::tile::{Tile, TileIndex, TileState};
use crate::SampleType;

/// A pixel-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u64,
    pub y: u64,
    pub width: u64,
    pub height: u64,
}

impl Region {
    pub fn new(x: u64, y: u64, width: u64, height: u64) -> Region {
        Region {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u64 {
        self.y + self.height
    }

    pub fn intersection(&self, other: &Region) -> Option<Region> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if x < right && y < bottom {
            Some(Region::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }
}

/// One image's pixel descriptor, tile grid and tile store.
///
/// A map is owned by a reader (geometry only, tiles materialize through the
/// tile cache) or by a writer (tiles accumulate pixel data until they are
/// encoded and flushed).
#[derive(Debug)]
pub struct TileMap {
    ifd: Ifd,
    image_width: u64,
    image_height: u64,
    tile_width: u32,
    tile_height: u32,
    samples_per_pixel: u16,
    sample_type: SampleType,
    planar: bool,
    resizable: bool,
    /// Dimensions grew since the IFD was last synchronized.
    dims_dirty: bool,
    byte_filler: u8,
    /// Store only the in-image part of boundary tiles.
    crop_boundary_tiles: bool,
    /// Position of the backing IFD in the file's chain, when read from one.
    source_index: Option<usize>,
    tiles: BTreeMap<usize, Tile>,
}

impl TileMap {
    pub(crate) fn new(
        ifd: Ifd,
        resizable: bool,
        byte_filler: u8,
        crop_boundary_tiles: bool,
    ) -> TiffResult<TileMap> {
        let sample_type = ifd.sample_type()?;
        let samples_per_pixel = ifd.samples_per_pixel()?;
        let planar = ifd.planar_configuration()? == PlanarConfiguration::Planar;
        let (image_width, image_height) = if ifd.contains(crate::tags::Tag::ImageWidth) {
            ifd.dimensions()?
        } else if resizable {
            (0, 0)
        } else {
            return Err(TiffError::FormatError(TiffFormatError::RequiredTagNotFound(
                crate::tags::Tag::ImageWidth,
            )));
        };
        let tiled = ifd.contains(crate::tags::Tag::TileWidth);
        let (tile_width, tile_height) = if tiled || !resizable || image_width > 0 {
            // Strip geometry needs the image dimensions, so a resizable map
            // that is still empty must be tile-based.
            ifd.tile_size()?
        } else {
            return Err(TiffError::FormatError(TiffFormatError::RequiredTagNotFound(
                crate::tags::Tag::TileWidth,
            )));
        };
        if tile_width == 0 || tile_height == 0 {
            return Err(TiffError::FormatError(TiffFormatError::ZeroTileSize));
        }
        Ok(TileMap {
            ifd,
            image_width,
            image_height,
            tile_width,
            tile_height,
            samples_per_pixel,
            sample_type,
            planar,
            resizable,
            dims_dirty: false,
            byte_filler,
            crop_boundary_tiles,
            source_index: None,
            tiles: BTreeMap::new(),
        })
    }

    /// Position of the backing IFD in the file's chain, when known.
    pub fn source_index(&self) -> Option<usize> {
        self.source_index
    }

    pub(crate) fn set_source_index(&mut self, index: usize) {
        self.source_index = Some(index);
    }

    //
    // Geometry
    //

    pub fn ifd(&self) -> &Ifd {
        &self.ifd
    }

    pub fn ifd_mut(&mut self) -> &mut Ifd {
        &mut self.ifd
    }

    pub fn dimensions(&self) -> (u64, u64) {
        (self.image_width, self.image_height)
    }

    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    pub fn samples_per_pixel(&self) -> u16 {
        self.samples_per_pixel
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn is_planar(&self) -> bool {
        self.planar
    }

    pub fn is_resizable(&self) -> bool {
        self.resizable
    }

    pub fn byte_filler(&self) -> u8 {
        self.byte_filler
    }

    pub(crate) fn dims_dirty(&self) -> bool {
        self.dims_dirty
    }

    pub(crate) fn clear_dims_dirty(&mut self) {
        self.dims_dirty = false;
    }

    pub fn tiles_across(&self) -> u32 {
        (self.image_width.div_ceil(self.tile_width as u64)) as u32
    }

    pub fn tiles_down(&self) -> u32 {
        (self.image_height.div_ceil(self.tile_height as u64)) as u32
    }

    /// Channel planes: one per sample for planar-separated images.
    pub fn planes(&self) -> u32 {
        if self.planar {
            self.samples_per_pixel as u32
        } else {
            1
        }
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_across() as usize * self.tiles_down() as usize * self.planes() as usize
    }

    /// Samples per pixel stored in one chunk.
    pub(crate) fn channels_per_chunk(&self) -> u16 {
        if self.planar {
            1
        } else {
            self.samples_per_pixel
        }
    }

    pub(crate) fn linear_index(&self, index: TileIndex) -> usize {
        index.linear(self.tiles_across(), self.tiles_down())
    }

    pub(crate) fn index_of(&self, linear: usize) -> TileIndex {
        TileIndex::from_linear(linear, self.tiles_across(), self.tiles_down())
    }

    /// Payload pixel size of the tile at grid position `(x, y)`.
    pub(crate) fn tile_data_size(&self, x: u32, y: u32) -> (u32, u32) {
        if !self.crop_boundary_tiles || self.image_width == 0 {
            return (self.tile_width, self.tile_height);
        }
        let w = self
            .image_width
            .saturating_sub(x as u64 * self.tile_width as u64)
            .min(self.tile_width as u64) as u32;
        let h = self
            .image_height
            .saturating_sub(y as u64 * self.tile_height as u64)
            .min(self.tile_height as u64) as u32;
        (w.max(1), h.max(1))
    }

    fn sample_bits(&self) -> u32 {
        self.sample_type.bits()
    }

    /// Row stride in bytes for a chunk row of `width` pixels.
    pub(crate) fn row_stride(&self, width: u32) -> usize {
        (width as usize * self.channels_per_chunk() as usize * self.sample_bits() as usize)
            .div_ceil(8)
    }

    /// Byte size of a full (uncropped) decoded tile.
    pub(crate) fn full_tile_bytes(&self) -> usize {
        self.row_stride(self.tile_width) * self.tile_height as usize
    }

    /// Byte size of the stored (possibly cropped) payload of tile `(x, y)`.
    pub(crate) fn stored_tile_bytes(&self, x: u32, y: u32) -> usize {
        let (w, h) = self.tile_data_size(x, y);
        self.row_stride(w) * h as usize
    }

    /// Base codec options for the tile at `(x, y)`.
    pub(crate) fn codec_options_for_tile(&self, x: u32, y: u32) -> CodecOptions {
        let (w, h) = self.tile_data_size(x, y);
        CodecOptions::builder(w, h)
            .channels(self.channels_per_chunk())
            .bits_per_sample(self.sample_bits() as u16)
            .byte_order(self.ifd.byte_order())
            .signed(self.sample_type.is_signed())
            .interleaved(!self.planar)
            .max_decoded_size(self.full_tile_bytes())
            .jpeg_tables(self.ifd.jpeg_tables().map(|t| t.to_vec()))
            .build()
    }

    //
    // Tile store
    //

    pub fn tile(&self, index: TileIndex) -> Option<&Tile> {
        self.tiles.get(&self.linear_index(index))
    }

    pub fn tile_at(&self, linear: usize) -> Option<&Tile> {
        self.tiles.get(&linear)
    }

    pub(crate) fn tile_at_mut(&mut self, linear: usize) -> Option<&mut Tile> {
        self.tiles.get_mut(&linear)
    }

    pub(crate) fn tile_or_insert(&mut self, linear: usize) -> TiffResult<&mut Tile> {
        if linear >= self.tile_count() {
            return Err(TiffError::UsageError(UsageError::TileIndexOutOfRange {
                index: linear,
                count: self.tile_count(),
            }));
        }
        let index = self.index_of(linear);
        let (w, h) = self.tile_data_size(index.x, index.y);
        Ok(self
            .tiles
            .entry(linear)
            .or_insert_with(|| Tile::new(index, w, h)))
    }

    /// Linear indices of tiles ready for encoding and flushing.
    pub fn completed_tiles(&self) -> Vec<usize> {
        self.tiles
            .iter()
            .filter(|(_, t)| t.state() == TileState::Complete)
            .map(|(&i, _)| i)
            .collect()
    }

    /// Pads every still-empty or partial tile with the byte filler and marks
    /// it complete; returns everything now eligible for flushing.
    pub fn complete_writing(&mut self) -> TiffResult<Vec<usize>> {
        let full_bytes = self.full_tile_bytes();
        let filler = self.byte_filler;
        for linear in 0..self.tile_count() {
            let tile = self.tile_or_insert(linear)?;
            match tile.state() {
                TileState::Empty => {
                    tile.fill_partial(vec![filler; full_bytes])?;
                    tile.mark_complete()?;
                }
                TileState::Partial => tile.mark_complete()?,
                _ => {}
            }
        }
        Ok(self.completed_tiles())
    }

    //
    // Pixel movement
    //

    /// Copies a planar channel buffer into every tile it intersects.
    ///
    /// Fully covered tiles become `Complete`, partially covered ones
    /// `Partial` while keeping previous content outside the written region.
    /// On a resizable map the image grows to fit; a fixed map rejects
    /// writes outside its bounds.
    pub fn update_channels(
        &mut self,
        channels: &ChannelBuffer,
        x: u64,
        y: u64,
    ) -> TiffResult<()> {
        if channels.channels() != self.samples_per_pixel
            || channels.sample_type() != self.sample_type
        {
            return Err(TiffError::FormatError(
                TiffFormatError::InconsistentSizesEncountered,
            ));
        }
        let rect = Region::new(x, y, channels.width() as u64, channels.height() as u64);
        if rect.width == 0 || rect.height == 0 {
            return Ok(());
        }
        if self.resizable {
            if rect.right() > self.image_width || rect.bottom() > self.image_height {
                self.image_width = self.image_width.max(rect.right());
                self.image_height = self.image_height.max(rect.bottom());
                self.dims_dirty = true;
            }
        } else if rect.right() > self.image_width || rect.bottom() > self.image_height {
            return Err(TiffError::UsageError(UsageError::RectangleOutOfBounds));
        }

        let tw = self.tile_width as u64;
        let th = self.tile_height as u64;
        let tx0 = (rect.x / tw) as u32;
        let tx1 = ((rect.right() - 1) / tw) as u32;
        let ty0 = (rect.y / th) as u32;
        let ty1 = ((rect.bottom() - 1) / th) as u32;
        let full_bytes = self.full_tile_bytes();
        let filler = self.byte_filler;
        let tile_width = self.tile_width;
        let channels_per_chunk = self.channels_per_chunk();
        let sample_bits = self.sample_bits();
        let byte_order = self.ifd.byte_order();

        for plane in 0..self.planes() {
            for ty in ty0..=ty1 {
                for tx in tx0..=tx1 {
                    let tile_rect = Region::new(tx as u64 * tw, ty as u64 * th, tw, th);
                    let Some(inter) = tile_rect.intersection(&rect) else {
                        continue;
                    };
                    let index = TileIndex {
                        x: tx,
                        y: ty,
                        plane,
                    };
                    let linear = self.linear_index(index);
                    let (data_w, data_h) = self.tile_data_size(tx, ty);
                    let covers_payload = inter.x == tile_rect.x
                        && inter.y == tile_rect.y
                        && inter.width >= data_w as u64
                        && inter.height >= data_h as u64;

                    // Copy geometry, all in pixels.
                    let geometry = BlitGeometry {
                        tile_width,
                        channels: channels_per_chunk,
                        plane,
                        sample_bits,
                        byte_order,
                        dst_x: (inter.x - tile_rect.x) as u32,
                        dst_y: (inter.y - tile_rect.y) as u32,
                        src_x: inter.x - rect.x,
                        src_y: inter.y - rect.y,
                        width: inter.width as u32,
                        height: inter.height as u32,
                    };

                    let tile = self.tile_or_insert(linear)?;
                    if tile.decoded().is_none() {
                        tile.fill_partial(vec![filler; full_bytes])?;
                    }
                    if let Some(buf) = tile.decoded_mut() {
                        blit_channels_to_tile(channels, buf, geometry);
                    }
                    if covers_payload && tile.state() == TileState::Partial {
                        tile.mark_complete()?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Copies the intersection of a decoded full-size tile and `rect` into
    /// `out`, whose top-left corner sits at `(rect.x, rect.y)`.
    pub(crate) fn blit_tile_to_channels(
        &self,
        tile_full: &[u8],
        index: TileIndex,
        out: &mut ChannelBuffer,
        rect: &Region,
    ) {
        let tile_rect = Region::new(
            index.x as u64 * self.tile_width as u64,
            index.y as u64 * self.tile_height as u64,
            self.tile_width as u64,
            self.tile_height as u64,
        );
        let Some(inter) = tile_rect.intersection(rect) else {
            return;
        };
        let geometry = BlitGeometry {
            tile_width: self.tile_width,
            channels: self.channels_per_chunk(),
            plane: index.plane,
            sample_bits: self.sample_bits(),
            byte_order: self.ifd.byte_order(),
            dst_x: (inter.x - rect.x) as u32,
            dst_y: (inter.y - rect.y) as u32,
            src_x: inter.x - tile_rect.x,
            src_y: inter.y - tile_rect.y,
            width: inter.width as u32,
            height: inter.height as u32,
        };
        blit_tile_to_channels(tile_full, out, geometry);
    }

    /// Expands a stored (possibly cropped) payload into a full-size tile
    /// buffer, padding the margin with the byte filler.
    pub(crate) fn expand_stored_payload(
        &self,
        stored: &[u8],
        x: u32,
        y: u32,
    ) -> TiffResult<Vec<u8>> {
        let full_bytes = self.full_tile_bytes();
        if stored.len() >= full_bytes {
            return Ok(stored[..full_bytes].to_vec());
        }
        let (data_w, data_h) = self.tile_data_size(x, y);
        let cropped_stride = self.row_stride(data_w);
        let cropped_bytes = cropped_stride * data_h as usize;
        if stored.len() < cropped_bytes {
            return Err(TiffError::FormatError(
                TiffFormatError::UnexpectedCompressedData {
                    actual_bytes: stored.len(),
                    required_bytes: cropped_bytes,
                },
            ));
        }
        let full_stride = self.row_stride(self.tile_width);
        let mut full = vec![self.byte_filler; full_bytes];
        for row in 0..data_h as usize {
            full[row * full_stride..][..cropped_stride]
                .copy_from_slice(&stored[row * cropped_stride..][..cropped_stride]);
        }
        Ok(full)
    }

    /// Codec options for one tile with the IFD-derived extras resolved.
    fn resolved_codec_options(&self, x: u32, y: u32) -> TiffResult<CodecOptions> {
        let ifd = &self.ifd;
        let t4 = ifd
            .get(crate::tags::Tag::T4Options)
            .map(|e| e.as_u64())
            .transpose()?
            .unwrap_or(0) as u32;
        let t6 = ifd
            .get(crate::tags::Tag::T6Options)
            .map(|e| e.as_u64())
            .transpose()?
            .unwrap_or(0) as u32;
        let base = self.codec_options_for_tile(x, y);
        Ok(CodecOptions {
            photometric: ifd
                .photometric()
                .unwrap_or(crate::tags::PhotometricInterpretation::BlackIsZero),
            ycbcr_subsampling: ifd.ycbcr_subsampling().unwrap_or((2, 2)),
            t4_options: t4,
            t6_options: t6,
            ..base
        })
    }

    /// The full decode chain for one stored tile payload: fill-order
    /// fix-up, decompression, layout reconciliation (cropped or full-size
    /// boundary tiles), predictor inverse, expansion to the full tile
    /// buffer.
    pub(crate) fn decode_stored_payload(
        &self,
        encoded: &mut Vec<u8>,
        tile_index: usize,
        codecs: &crate::codec::CodecRegistry,
        lenient: bool,
    ) -> TiffResult<Vec<u8>> {
        let index = self.index_of(tile_index);
        let ifd = &self.ifd;

        if ifd.fill_order()? == crate::tags::FillOrder::LsbFirst {
            crate::codec::bits::reverse_bits_in_place(encoded);
        }

        let (scheme, _) = ifd.compression()?;
        let codec = crate::codec::Codec::for_scheme(scheme, codecs)?;
        let options = self.resolved_codec_options(index.x, index.y)?;

        let mut decoded = codec.decode(encoded, &options)?;

        let stored_bytes = self.stored_tile_bytes(index.x, index.y);
        let full_bytes = self.full_tile_bytes();
        let (data_w, data_h) = self.tile_data_size(index.x, index.y);
        let cropped_layout = decoded.len() < full_bytes;
        if decoded.len() < stored_bytes {
            if !lenient {
                return Err(TiffError::FormatError(
                    TiffFormatError::UnexpectedCompressedData {
                        actual_bytes: decoded.len(),
                        required_bytes: stored_bytes,
                    },
                ));
            }
            decoded.resize(stored_bytes, self.byte_filler);
        }

        let predictor = ifd.predictor()?;
        if predictor != crate::tags::Predictor::None {
            let (pred_w, pred_h) = if cropped_layout {
                (data_w, data_h)
            } else {
                (self.tile_width, self.tile_height)
            };
            let pred_options = CodecOptions {
                width: pred_w,
                height: pred_h,
                ..options
            };
            match predictor {
                crate::tags::Predictor::Horizontal => {
                    crate::codec::predictor::undifference(&mut decoded, &pred_options)?
                }
                crate::tags::Predictor::FloatingPoint => {
                    crate::codec::predictor::undifference_float(&mut decoded, &pred_options)?
                }
                _ => {}
            }
        }

        if cropped_layout {
            self.expand_stored_payload(&decoded, index.x, index.y)
        } else {
            decoded.truncate(full_bytes);
            Ok(decoded)
        }
    }

    /// The full encode chain for one tile: cropping to the stored payload,
    /// predictor pass, compression, fill-order fix-up.
    pub(crate) fn encode_tile_payload(
        &self,
        full: &[u8],
        tile_index: usize,
        codecs: &crate::codec::CodecRegistry,
        quality: Option<f32>,
        lossless_level: Option<f32>,
    ) -> TiffResult<Vec<u8>> {
        let index = self.index_of(tile_index);
        let ifd = &self.ifd;
        let payload = self.extract_stored_payload(full, index.x, index.y);

        let (scheme, _) = ifd.compression()?;
        let codec = crate::codec::Codec::for_scheme(scheme, codecs)?;
        let mut options = self.resolved_codec_options(index.x, index.y)?;
        options.quality = quality.or(options.quality);
        options.lossless_level = lossless_level.or(options.lossless_level);

        crate::codec::encode_chain(
            &codec,
            &payload,
            ifd.predictor()?,
            ifd.fill_order()?,
            &options,
        )
    }

    /// Extracts the stored payload (cropped rows and columns) from a
    /// full-size tile buffer.
    pub(crate) fn extract_stored_payload(&self, full: &[u8], x: u32, y: u32) -> Vec<u8> {
        let (data_w, data_h) = self.tile_data_size(x, y);
        if data_w == self.tile_width && data_h == self.tile_height {
            return full.to_vec();
        }
        let full_stride = self.row_stride(self.tile_width);
        let cropped_stride = self.row_stride(data_w);
        let mut out = Vec::with_capacity(cropped_stride * data_h as usize);
        for row in 0..data_h as usize {
            out.extend_from_slice(&full[row * full_stride..][..cropped_stride]);
        }
        out
    }
}

/// Everything a blit between a planar channel buffer and a chunk buffer
/// needs to know, in pixels.
struct BlitGeometry {
    tile_width: u32,
    channels: u16,
    plane: u32,
    sample_bits: u32,
    byte_order: ByteOrder,
    dst_x: u32,
    dst_y: u32,
    src_x: u64,
    src_y: u64,
    width: u32,
    height: u32,
}

#[inline]
fn get_bit(buf: &[u8], index: usize) -> u8 {
    (buf[index / 8] >> (7 - index % 8)) & 1
}

#[inline]
fn set_bit(buf: &mut [u8], index: usize, value: u8) {
    let mask = 0x80 >> (index % 8);
    if value != 0 {
        buf[index / 8] |= mask;
    } else {
        buf[index / 8] &= !mask;
    }
}

fn blit_channels_to_tile(channels: &ChannelBuffer, tile_buf: &mut [u8], g: BlitGeometry) {
    let buffer_channels: Vec<u16> = if g.channels == 1 && channels.channels() > 1 {
        vec![g.plane as u16]
    } else {
        (0..g.channels).collect()
    };
    let swap = g.sample_bits > 8 && g.byte_order != ByteOrder::native();
    let bytes = (g.sample_bits / 8) as usize;
    let tile_stride_bits = g.tile_width as usize * g.channels as usize * g.sample_bits as usize;
    let tile_stride = tile_stride_bits.div_ceil(8);
    for row in 0..g.height {
        let src_row_y = g.src_y as u32 + row;
        let dst_row = (g.dst_y + row) as usize;
        for (slot, &channel) in buffer_channels.iter().enumerate() {
            let src = channels.row(channel, src_row_y);
            if g.sample_bits == 1 {
                for px in 0..g.width as usize {
                    let bit = get_bit(src, g.src_x as usize + px);
                    let dst_bit = dst_row * tile_stride * 8
                        + ((g.dst_x as usize + px) * g.channels as usize + slot);
                    set_bit(tile_buf, dst_bit, bit);
                }
            } else {
                for px in 0..g.width as usize {
                    let from = (g.src_x as usize + px) * bytes;
                    let to = dst_row * tile_stride
                        + ((g.dst_x as usize + px) * g.channels as usize + slot) * bytes;
                    let sample = &src[from..from + bytes];
                    let dst = &mut tile_buf[to..to + bytes];
                    if swap {
                        for (i, b) in sample.iter().rev().enumerate() {
                            dst[i] = *b;
                        }
                    } else {
                        dst.copy_from_slice(sample);
                    }
                }
            }
        }
    }
}

fn blit_tile_to_channels(tile_full: &[u8], out: &mut ChannelBuffer, g: BlitGeometry) {
    let buffer_channels: Vec<u16> = if g.channels == 1 && out.channels() > 1 {
        vec![g.plane as u16]
    } else {
        (0..g.channels).collect()
    };
    let swap = g.sample_bits > 8 && g.byte_order != ByteOrder::native();
    let bytes = (g.sample_bits / 8) as usize;
    let tile_stride_bits = g.tile_width as usize * g.channels as usize * g.sample_bits as usize;
    let tile_stride = tile_stride_bits.div_ceil(8);
    for row in 0..g.height {
        let src_row = (g.src_y as u32 + row) as usize;
        let dst_row_y = g.dst_y + row;
        for (slot, &channel) in buffer_channels.iter().enumerate() {
            let dst = out.row_mut(channel, dst_row_y);
            if g.sample_bits == 1 {
                for px in 0..g.width as usize {
                    let src_bit = src_row * tile_stride * 8
                        + ((g.src_x as usize + px) * g.channels as usize + slot);
                    let bit = get_bit(tile_full, src_bit);
                    set_bit(dst, g.dst_x as usize + px, bit);
                }
            } else {
                for px in 0..g.width as usize {
                    let from = src_row * tile_stride
                        + ((g.src_x as usize + px) * g.channels as usize + slot) * bytes;
                    let to = (g.dst_x as usize + px) * bytes;
                    let sample = &tile_full[from..from + bytes];
                    let dst_sample = &mut dst[to..to + bytes];
                    if swap {
                        for (i, b) in sample.iter().rev().enumerate() {
                            dst_sample[i] = *b;
                        }
                    } else {
                        dst_sample.copy_from_slice(sample);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{CompressionScheme, PhotometricInterpretation};

    fn gray8_ifd(width: u64, height: u64, tile: u32) -> Ifd {
        let mut ifd = Ifd::new(ByteOrder::LittleEndian, false);
        ifd.set_dimensions(width, height).unwrap();
        ifd.set_photometric(PhotometricInterpretation::BlackIsZero);
        ifd.set_bits_per_sample(&[8]);
        ifd.set_compression(CompressionScheme::None);
        ifd.set_tile_size(tile, tile).unwrap();
        ifd
    }

    #[test]
    fn grid_geometry() {
        let map = TileMap::new(gray8_ifd(100, 50, 16), false, 0, true).unwrap();
        assert_eq!(map.tiles_across(), 7);
        assert_eq!(map.tiles_down(), 4);
        assert_eq!(map.tile_count(), 28);
        assert_eq!(map.tile_data_size(0, 0), (16, 16));
        assert_eq!(map.tile_data_size(6, 3), (4, 2));
        assert_eq!(map.full_tile_bytes(), 256);
        assert_eq!(map.stored_tile_bytes(6, 3), 8);
    }

    #[test]
    fn update_marks_full_and_partial_tiles() {
        let mut map = TileMap::new(gray8_ifd(32, 32, 16), false, 0, true).unwrap();
        // Cover the top-left tile exactly, spill into the top-right one.
        let buf = ChannelBuffer::new_filled(20, 16, 1, SampleType::U8, 7);
        map.update_channels(&buf, 0, 0).unwrap();
        let full = map.tile(TileIndex { x: 0, y: 0, plane: 0 }).unwrap();
        assert_eq!(full.state(), TileState::Complete);
        let partial = map.tile(TileIndex { x: 1, y: 0, plane: 0 }).unwrap();
        assert_eq!(partial.state(), TileState::Partial);
        assert_eq!(map.completed_tiles(), vec![0]);

        // The partial tile holds sevens left of x=20, filler right of it.
        let decoded = partial.decoded().unwrap();
        assert_eq!(decoded[0], 7);
        assert_eq!(decoded[3], 7);
        assert_eq!(decoded[4], 0);
    }

    #[test]
    fn fixed_map_rejects_out_of_bounds() {
        let mut map = TileMap::new(gray8_ifd(32, 32, 16), false, 0, true).unwrap();
        let buf = ChannelBuffer::new_filled(16, 16, 1, SampleType::U8, 1);
        assert!(map.update_channels(&buf, 20, 20).is_err());
    }

    #[test]
    fn resizable_map_grows() {
        let mut map = TileMap::new(gray8_ifd(16, 16, 16), true, 0, true).unwrap();
        let buf = ChannelBuffer::new_filled(16, 16, 1, SampleType::U8, 1);
        map.update_channels(&buf, 16, 0).unwrap();
        assert_eq!(map.dimensions(), (32, 16));
        assert!(map.dims_dirty());
        assert_eq!(map.tile_count(), 2);
    }

    #[test]
    fn complete_writing_pads_everything() {
        let mut map = TileMap::new(gray8_ifd(32, 16, 16), false, 0xEE, true).unwrap();
        let buf = ChannelBuffer::new_filled(8, 8, 1, SampleType::U8, 1);
        map.update_channels(&buf, 0, 0).unwrap();
        let completed = map.complete_writing().unwrap();
        assert_eq!(completed, vec![0, 1]);
        let untouched = map.tile_at(1).unwrap();
        assert!(untouched.decoded().unwrap().iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn stored_payload_round_trip() {
        let map = TileMap::new(gray8_ifd(20, 20, 16), false, 0xAA, true).unwrap();
        // The (1, 1) corner tile stores 4x4 pixels.
        let full: Vec<u8> = (0..256).map(|i| i as u8).collect();
        let stored = map.extract_stored_payload(&full, 1, 1);
        assert_eq!(stored.len(), 16);
        assert_eq!(stored[0], 0);
        assert_eq!(stored[4], 16);
        let back = map.expand_stored_payload(&stored, 1, 1).unwrap();
        assert_eq!(back.len(), 256);
        assert_eq!(back[0], 0);
        assert_eq!(back[16], 16);
        // The padded area carries the filler.
        assert_eq!(back[4], 0xAA);
    }

    #[test]
    fn planar_maps_use_one_plane_per_channel() {
        let mut ifd = Ifd::new(ByteOrder::LittleEndian, false);
        ifd.set_dimensions(32, 32).unwrap();
        ifd.set_photometric(PhotometricInterpretation::RGB);
        ifd.set_bits_per_sample(&[8, 8, 8]);
        ifd.set_planar_configuration(crate::tags::PlanarConfiguration::Planar);
        ifd.set_tile_size(16, 16).unwrap();
        let mut map = TileMap::new(ifd, false, 0, true).unwrap();
        assert_eq!(map.planes(), 3);
        assert_eq!(map.tile_count(), 12);
        assert_eq!(map.channels_per_chunk(), 1);

        let mut buf = ChannelBuffer::new_filled(16, 16, 3, SampleType::U8, 0);
        buf.channel_mut(2).fill(9);
        map.update_channels(&buf, 0, 0).unwrap();
        // Plane 2's tile holds channel 2's data.
        let tile = map.tile(TileIndex { x: 0, y: 0, plane: 2 }).unwrap();
        assert!(tile.decoded().unwrap().iter().all(|&b| b == 9));
        let tile = map.tile(TileIndex { x: 0, y: 0, plane: 0 }).unwrap();
        assert!(tile.decoded().unwrap().iter().all(|&b| b == 0));
    }
}
