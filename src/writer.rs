//! Writing TIFF and BigTIFF files: creation, appending and in-place
//! editing of existing files.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::Path;

use crate::codec::CodecRegistry;
use crate::error::{TiffError, TiffFormatError, TiffResult, TileOp, UsageError};
use crate::ifd::{Entry, Ifd};
use crate::map::{Region, TileMap};
use crate::stream::{ByteOrder, EndianReader, EndianWriter};
use crate::tags::{Tag, Type};
use crate::tile::TileState;

/// How the writer attaches to its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterMode {
    /// Start from an empty file; an existing one is truncated.
    Create,
    /// Keep the existing chain and write new images after it. An empty
    /// stream degrades to `Create`.
    OpenForAppend,
    /// Edit images in place; the writer owns an internal reader view.
    OpenExisting,
}

/// Tuning knobs for a writer instance.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Write BigTIFF (64-bit offsets). Ignored when attaching to an
    /// existing file, whose header wins.
    pub big_tiff: bool,
    /// Byte order for new files; an existing file's header wins.
    pub byte_order: ByteOrder,
    /// Normalize out-of-spec parameters instead of rejecting them.
    pub smart_format_correction: bool,
    /// The byte used to pad partial tiles.
    pub byte_filler: u8,
    /// Store only the in-image pixels of boundary tiles instead of the
    /// padded full tile. Off by default, matching what other TIFF writers
    /// produce.
    pub crop_boundary_tiles: bool,
    /// Serialize IFDs at the file end even when an in-place rewrite would
    /// fit. `complete` honors this; `rewrite_ifd` always tries in place.
    pub always_write_to_file_end: bool,
    /// Default lossy quality in `(0, 1]` for codecs that take one.
    pub quality: Option<f32>,
    /// Default lossless effort in `[0, 1]`.
    pub lossless_level: Option<f32>,
    /// External codecs, keyed by raw compression code.
    pub codecs: CodecRegistry,
}

impl Default for WriterOptions {
    fn default() -> WriterOptions {
        WriterOptions {
            big_tiff: false,
            byte_order: ByteOrder::native(),
            smart_format_correction: false,
            byte_filler: 0,
            crop_boundary_tiles: false,
            always_write_to_file_end: true,
            quality: None,
            lossless_level: None,
            codecs: CodecRegistry::new(),
        }
    }
}

/// One directory of the on-disk chain and the file position of the pointer
/// slot inside it.
#[derive(Debug, Clone, Copy)]
struct ChainEntry {
    offset: u64,
    next_slot: u64,
}

/// A write handle over one TIFF file.
pub struct TiffWriter<W: Read + Write + Seek> {
    stream: W,
    byte_order: ByteOrder,
    big_tiff: bool,
    options: WriterOptions,
    /// Logical end of the file; appends land here.
    file_len: u64,
    /// Position of the header's first-IFD pointer.
    header_pointer_pos: u64,
    chain: Vec<ChainEntry>,
    closed: bool,
}

impl TiffWriter<File> {
    /// Creates (or truncates) a file at `path`.
    pub fn create_path(
        path: impl AsRef<Path>,
        options: WriterOptions,
    ) -> TiffResult<TiffWriter<File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        TiffWriter::new(file, WriterMode::Create, options)
    }

    /// Attaches to an existing file for appending or in-place editing.
    pub fn open_path(
        path: impl AsRef<Path>,
        mode: WriterMode,
        options: WriterOptions,
    ) -> TiffResult<TiffWriter<File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(mode != WriterMode::OpenExisting)
            .open(path)?;
        TiffWriter::new(file, mode, options)
    }
}

impl<W: Read + Write + Seek> TiffWriter<W> {
    pub fn new(mut stream: W, mode: WriterMode, options: WriterOptions) -> TiffResult<TiffWriter<W>> {
        let existing_len = stream.seek(std::io::SeekFrom::End(0))?;
        let attach = match mode {
            WriterMode::Create => false,
            WriterMode::OpenForAppend => existing_len > 0,
            WriterMode::OpenExisting => true,
        };
        if attach {
            Self::attach(stream, existing_len, options)
        } else {
            Self::start_empty(stream, options)
        }
    }

    fn start_empty(stream: W, options: WriterOptions) -> TiffResult<TiffWriter<W>> {
        let byte_order = options.byte_order;
        let big_tiff = options.big_tiff;
        let mut writer = TiffWriter {
            stream,
            byte_order,
            big_tiff,
            options,
            file_len: 0,
            header_pointer_pos: if big_tiff { 8 } else { 4 },
            chain: Vec::new(),
            closed: false,
        };
        writer.write_header()?;
        Ok(writer)
    }

    fn attach(mut stream: W, existing_len: u64, options: WriterOptions) -> TiffResult<TiffWriter<W>> {
        // Parse the existing header; its byte order and offset width win.
        let mut reader = EndianReader::new(&mut stream, ByteOrder::LittleEndian);
        reader.goto_offset(0)?;
        let mut order = [0u8; 2];
        reader.read_exact(&mut order)?;
        let byte_order = match &order {
            b"II" => ByteOrder::LittleEndian,
            b"MM" => ByteOrder::BigEndian,
            _ => {
                return Err(TiffError::FormatError(
                    TiffFormatError::TiffSignatureNotFound,
                ))
            }
        };
        reader.byte_order = byte_order;
        let big_tiff = match reader.read_u16()? {
            42 => false,
            43 => {
                if reader.read_u16()? != 8 || reader.read_u16()? != 0 {
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
        let first = if big_tiff {
            reader.read_u64()?
        } else {
            reader.read_u32()? as u64
        };

        // Walk the chain without loading entries, recording the pointer
        // slot of every directory.
        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut next = first;
        while next != 0 {
            if !seen.insert(next) || chain.len() >= (1 << 20) {
                return Err(TiffError::FormatError(TiffFormatError::CycleInOffsets));
            }
            reader.goto_offset(next)?;
            let (count, entry_size, count_field) = if big_tiff {
                (reader.read_u64()?, 20u64, 8u64)
            } else {
                (reader.read_u16()? as u64, 12, 2)
            };
            let next_slot = next
                .checked_add(count_field)
                .and_then(|o| o.checked_add(count.checked_mul(entry_size)?))
                .ok_or(TiffError::FormatError(TiffFormatError::DirectoryOutOfBounds))?;
            if next_slot + if big_tiff { 8 } else { 4 } > existing_len {
                return Err(TiffError::FormatError(TiffFormatError::DirectoryOutOfBounds));
            }
            chain.push(ChainEntry {
                offset: next,
                next_slot,
            });
            reader.goto_offset(next_slot)?;
            next = if big_tiff {
                reader.read_u64()?
            } else {
                reader.read_u32()? as u64
            };
        }

        Ok(TiffWriter {
            stream,
            byte_order,
            big_tiff,
            options,
            file_len: existing_len,
            header_pointer_pos: if big_tiff { 8 } else { 4 },
            chain,
            closed: false,
        })
    }

    fn write_header(&mut self) -> TiffResult<()> {
        let big = self.big_tiff;
        let mut w = EndianWriter::new(&mut self.stream, self.byte_order);
        w.goto_offset(0)?;
        match self.byte_order {
            ByteOrder::LittleEndian => w.write_bytes(b"II")?,
            ByteOrder::BigEndian => w.write_bytes(b"MM")?,
        }
        if big {
            w.write_u16(43)?;
            w.write_u16(8)?;
            w.write_u16(0)?;
            w.write_u64(0)?;
        } else {
            w.write_u16(42)?;
            w.write_u32(0)?;
        }
        self.file_len = w.offset();
        Ok(())
    }

    pub fn is_big_tiff(&self) -> bool {
        self.big_tiff
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Number of images currently chained in the file.
    pub fn ifd_count(&self) -> usize {
        self.chain.len()
    }

    pub fn file_length(&self) -> u64 {
        self.file_len
    }

    fn check_open(&self) -> TiffResult<()> {
        if self.closed {
            return Err(TiffError::UsageError(UsageError::Closed));
        }
        Ok(())
    }

    //
    // IFDs and maps
    //

    /// A blank directory preset with this file's byte order and offset
    /// width.
    pub fn new_ifd(&self) -> Ifd {
        let mut ifd = Ifd::new(self.byte_order, self.big_tiff);
        ifd.set_smart_format_correction(self.options.smart_format_correction);
        ifd
    }

    /// A map whose dimensions are fixed to the IFD's declared size.
    pub fn new_fixed_map(&self, ifd: Ifd) -> TiffResult<TileMap> {
        TileMap::new(
            ifd,
            false,
            self.options.byte_filler,
            self.options.crop_boundary_tiles,
        )
    }

    /// A map that grows to fit the tiles written into it.
    pub fn new_resizable_map(&self, ifd: Ifd) -> TiffResult<TileMap> {
        TileMap::new(
            ifd,
            true,
            self.options.byte_filler,
            self.options.crop_boundary_tiles,
        )
    }

    /// Reads one directory of the chain through the writer's reader view.
    pub fn read_ifd(&mut self, index: usize) -> TiffResult<Ifd> {
        self.check_open()?;
        let offset = self
            .chain
            .get(index)
            .ok_or(TiffError::FormatError(
                TiffFormatError::ImageFileDirectoryNotFound,
            ))?
            .offset;
        let file_len = self.file_len;
        let big = self.big_tiff;
        let mut reader = EndianReader::new(&mut self.stream, self.byte_order);
        Ifd::read_from(&mut reader, offset, big, file_len, false)
    }

    /// Builds an editable map over an image already in the file.
    pub fn existing_map(&mut self, index: usize) -> TiffResult<TileMap> {
        let mut ifd = self.read_ifd(index)?;
        ifd.cache_chunk_layout()?;
        ifd.set_smart_format_correction(self.options.smart_format_correction);
        let mut map = TileMap::new(
            ifd,
            false,
            self.options.byte_filler,
            self.options.crop_boundary_tiles,
        )?;
        map.set_source_index(index);
        Ok(map)
    }

    /// Decodes every tile that intersects `rect` without being fully inside
    /// it, so a following partial overwrite preserves surrounding pixels.
    pub fn preload_existing_tiles(&mut self, map: &mut TileMap, rect: Region) -> TiffResult<()> {
        self.check_open()?;
        if map.tile_count() == 0 || rect.width == 0 || rect.height == 0 {
            return Ok(());
        }
        let (tile_width, tile_height) = map.tile_size();
        let tx0 = (rect.x / tile_width as u64) as u32;
        let tx1 =
            (((rect.right() - 1) / tile_width as u64) as u32).min(map.tiles_across() - 1);
        let ty0 = (rect.y / tile_height as u64) as u32;
        let ty1 =
            (((rect.bottom() - 1) / tile_height as u64) as u32).min(map.tiles_down() - 1);

        for plane in 0..map.planes() {
            for ty in ty0..=ty1 {
                for tx in tx0..=tx1 {
                    let tile_rect = Region::new(
                        tx as u64 * tile_width as u64,
                        ty as u64 * tile_height as u64,
                        tile_width as u64,
                        tile_height as u64,
                    );
                    if tile_rect.intersection(&rect).is_none() {
                        continue;
                    }
                    let fully_inside = tile_rect.x >= rect.x
                        && tile_rect.y >= rect.y
                        && tile_rect.right() <= rect.right()
                        && tile_rect.bottom() <= rect.bottom();
                    if fully_inside {
                        continue;
                    }
                    let index = crate::tile::TileIndex {
                        x: tx,
                        y: ty,
                        plane,
                    };
                    let linear = map.linear_index(index);
                    if map
                        .tile_at(linear)
                        .map_or(false, |t| t.state() != TileState::Empty)
                    {
                        continue;
                    }
                    let full = self.read_stored_tile(map, linear)?;
                    map.tile_or_insert(linear)?.fill_partial(full)?;
                }
            }
        }
        Ok(())
    }

    /// Reads and decodes one stored tile through the writer's reader view;
    /// tiles with no stored data come back as filler.
    fn read_stored_tile(&mut self, map: &TileMap, linear: usize) -> TiffResult<Vec<u8>> {
        let offset = map.ifd().chunk_offset_at(linear)?.unwrap_or(0);
        let length = map.ifd().chunk_byte_count_at(linear)?.unwrap_or(0);
        let in_range = offset > 0
            && length > 0
            && offset
                .checked_add(length)
                .map_or(false, |end| end <= self.file_len);
        if !in_range {
            return Ok(vec![self.options.byte_filler; map.full_tile_bytes()]);
        }
        let mut encoded = vec![0u8; length as usize];
        {
            let mut reader = EndianReader::new(&mut self.stream, self.byte_order);
            reader.goto_offset(offset)?;
            reader.read_exact(&mut encoded)?;
        }
        map.decode_stored_payload(&mut encoded, linear, &self.options.codecs, true)
    }

    //
    // Tile data
    //

    /// Encodes and appends every tile the map reports as complete. Returns
    /// how many tiles were flushed; append order matches the grid order.
    pub fn write_completed_tiles(&mut self, map: &mut TileMap) -> TiffResult<usize> {
        let completed = map.completed_tiles();
        self.flush_tiles(map, &completed)?;
        Ok(completed.len())
    }

    fn flush_tiles(&mut self, map: &mut TileMap, indices: &[usize]) -> TiffResult<()> {
        self.check_open()?;
        let ifd_index = map.source_index().unwrap_or(self.chain.len());
        for &linear in indices {
            let encoded = {
                let tile = map.tile_at(linear).ok_or(TiffError::UsageError(
                    UsageError::TileIndexOutOfRange {
                        index: linear,
                        count: map.tile_count(),
                    },
                ))?;
                let Some(full) = tile.decoded() else {
                    continue;
                };
                map.encode_tile_payload(
                    full,
                    linear,
                    &self.options.codecs,
                    self.options.quality,
                    self.options.lossless_level,
                )
                .map_err(|e| e.for_tile(ifd_index, linear, TileOp::Encode))?
            };
            let length = encoded.len() as u64;
            let offset = self
                .append_bytes(&encoded)
                .map_err(|e| e.for_tile(ifd_index, linear, TileOp::Write))?;
            let tile_count = map.tile_count();
            let tile = map.tile_at_mut(linear).ok_or(TiffError::UsageError(
                UsageError::TileIndexOutOfRange {
                    index: linear,
                    count: tile_count,
                },
            ))?;
            tile.set_encoded(encoded)?;
            tile.mark_flushed(offset, length)?;
            tile.drop_buffers();
        }
        Ok(())
    }

    /// Re-encodes one completed tile over its stored bytes. Only possible
    /// when the new payload is no longer than the old one; everything else
    /// must go through the append path.
    pub fn overwrite_tile_in_place(&mut self, map: &mut TileMap, linear: usize) -> TiffResult<()> {
        self.check_open()?;
        let ifd_index = map.source_index().unwrap_or(self.chain.len());
        let old_offset = map.ifd().chunk_offset_at(linear)?.unwrap_or(0);
        let old_length = map.ifd().chunk_byte_count_at(linear)?.unwrap_or(0);
        if old_offset == 0 {
            return Err(TiffError::FormatError(TiffFormatError::MissingTileData {
                tile_index: linear,
            }));
        }
        let encoded = {
            let tile = map.tile_at(linear).ok_or(TiffError::UsageError(
                UsageError::TileIndexOutOfRange {
                    index: linear,
                    count: map.tile_count(),
                },
            ))?;
            let full = tile.decoded().ok_or(TiffError::UsageError(
                UsageError::InvalidTileTransition {
                    from: tile.state(),
                    to: TileState::Encoded,
                },
            ))?;
            map.encode_tile_payload(
                full,
                linear,
                &self.options.codecs,
                self.options.quality,
                self.options.lossless_level,
            )
            .map_err(|e| e.for_tile(ifd_index, linear, TileOp::Encode))?
        };
        let length = encoded.len() as u64;
        if length > old_length {
            return Err(TiffError::UsageError(UsageError::InPlaceOverwriteTooLong {
                stored: old_length,
                new: length,
            }));
        }
        {
            let mut w = EndianWriter::new(&mut self.stream, self.byte_order);
            w.goto_offset(old_offset)?;
            w.write_bytes(&encoded)?;
        }
        let tile_count = map.tile_count();
        let tile = map.tile_at_mut(linear).ok_or(TiffError::UsageError(
            UsageError::TileIndexOutOfRange {
                index: linear,
                count: tile_count,
            },
        ))?;
        tile.set_encoded(encoded)?;
        tile.mark_flushed(old_offset, length)?;
        tile.drop_buffers();
        Ok(())
    }

    /// Raw append for tile-granular copies.
    pub(crate) fn append_raw(&mut self, bytes: &[u8]) -> TiffResult<u64> {
        self.check_open()?;
        self.append_bytes(bytes)
    }

    /// Appends a directory and links it into the chain.
    pub(crate) fn append_ifd(&mut self, ifd: &mut Ifd) -> TiffResult<u64> {
        self.check_open()?;
        self.place_ifd(ifd, true, false)
    }

    fn append_bytes(&mut self, bytes: &[u8]) -> TiffResult<u64> {
        let at = self.file_len;
        let mut w = EndianWriter::new(&mut self.stream, self.byte_order);
        w.goto_offset(at)?;
        w.write_bytes(bytes)?;
        self.file_len = self.file_len.max(w.offset());
        Ok(at)
    }

    //
    // Finalization
    //

    /// Finalizes a map: pads partial tiles, flushes everything outstanding,
    /// records the offset and byte-count arrays and chains the serialized
    /// IFD into the file.
    pub fn complete(&mut self, map: &mut TileMap) -> TiffResult<()> {
        self.check_open()?;

        // Tiles never touched in an editing session keep their stored
        // placement.
        if let (Ok(offsets), Ok(counts)) =
            (map.ifd().chunk_offsets(), map.ifd().chunk_byte_counts())
        {
            for linear in 0..map.tile_count() {
                let stored = offsets.get(linear).copied().zip(counts.get(linear).copied());
                let Some((offset, length)) = stored else {
                    continue;
                };
                if offset == 0 {
                    continue;
                }
                let tile = map.tile_or_insert(linear)?;
                if tile.state() == TileState::Empty {
                    tile.mark_flushed(offset, length)?;
                }
            }
        }

        let pending = map.complete_writing()?;
        self.flush_tiles(map, &pending)?;

        if map.dims_dirty() {
            let (width, height) = map.dimensions();
            map.ifd_mut().set_dimensions(width, height)?;
            map.clear_dims_dirty();
        }

        if self.options.smart_format_correction {
            // JPEG chunks are self-describing; a stray subsampling tag on a
            // non-YCbCr image only confuses readers.
            let ifd = map.ifd_mut();
            if matches!(
                ifd.compression(),
                Ok((crate::tags::CompressionScheme::Jpeg, _))
            ) && !matches!(
                ifd.photometric(),
                Ok(crate::tags::PhotometricInterpretation::YCbCr)
            ) {
                ifd.remove(Tag::YCbCrSubSampling);
            }
        }

        let count = map.tile_count();
        let mut offsets = Vec::with_capacity(count);
        let mut lengths = Vec::with_capacity(count);
        for linear in 0..count {
            let range = map.tile_at(linear).and_then(|t| t.stored_range());
            let Some((offset, length)) = range else {
                return Err(TiffError::FormatError(TiffFormatError::MissingTileData {
                    tile_index: linear,
                }));
            };
            offsets.push(offset);
            lengths.push(length);
        }
        map.ifd_mut().set_chunk_layout(&offsets, &lengths)?;

        let prefer_in_place = !self.options.always_write_to_file_end;
        self.place_ifd(map.ifd_mut(), true, prefer_in_place)?;
        Ok(())
    }

    /// Serializes `ifd` at its recorded write offset when it still fits the
    /// reserved room, relocating it to the file end otherwise. With
    /// `update_links` the predecessor's next pointer (or the header's
    /// first-IFD offset) is patched to follow the move.
    pub fn rewrite_ifd(&mut self, ifd: &mut Ifd, update_links: bool) -> TiffResult<()> {
        self.check_open()?;
        if ifd.offset_for_writing().is_none() {
            return Err(TiffError::UsageError(UsageError::IfdHasNoWritePosition));
        }
        self.place_ifd(ifd, update_links, true)?;
        Ok(())
    }

    /// Shortcut for metadata editing: replaces the description of image
    /// `index`. With `keep_length` a string no longer than the stored one
    /// is NUL-padded into the existing entry, guaranteeing an in-place
    /// rewrite.
    pub fn write_description(
        &mut self,
        index: usize,
        text: &str,
        keep_length: bool,
    ) -> TiffResult<()> {
        let mut ifd = self.read_ifd(index)?;
        if keep_length {
            if let Some(entry) = ifd.get(Tag::ImageDescription) {
                let room = entry.count() as usize;
                if text.len() + 1 <= room {
                    let mut data = text.as_bytes().to_vec();
                    data.resize(room, 0);
                    let entry = Entry::new(Type::ASCII, room as u64, data)?;
                    ifd.set_entry(Tag::ImageDescription, entry);
                    return self.rewrite_ifd(&mut ifd, true);
                }
            }
        }
        ifd.set_description(text)?;
        self.rewrite_ifd(&mut ifd, true)
    }

    /// Serializes an IFD and keeps the chain links consistent. Returns the
    /// position the directory landed at.
    fn place_ifd(
        &mut self,
        ifd: &mut Ifd,
        update_links: bool,
        prefer_in_place: bool,
    ) -> TiffResult<u64> {
        let size = ifd.serialized_size();
        let in_place = prefer_in_place
            && ifd.offset_for_writing().is_some()
            && ifd.reserved_room().map_or(false, |room| size <= room);
        let target = match (in_place, ifd.offset_for_writing()) {
            (true, Some(at)) => at,
            _ => (self.file_len + 3) / 4 * 4,
        };

        // The successor may itself have moved since this directory was
        // read; serialize the chain's current view of the next pointer.
        let chain_pos = ifd
            .offset_for_reading()
            .and_then(|p| self.chain.iter().position(|e| e.offset == p));
        match chain_pos {
            Some(at) => {
                let next = self.chain.get(at + 1).map_or(0, |e| e.offset);
                ifd.set_next_ifd_offset(next);
            }
            None => ifd.set_next_ifd_offset(0),
        }
        if !self.big_tiff && target.checked_add(size).map_or(true, |end| end > u32::MAX as u64) {
            // Classic offsets cannot address past 4 GiB; fail before
            // touching the file.
            return Err(TiffError::IntSizeError);
        }

        let next_slot = {
            let mut w = EndianWriter::new(&mut self.stream, self.byte_order);
            w.goto_offset(target)?;
            let slot = ifd.write_to(&mut w, target)?;
            self.file_len = self.file_len.max(w.offset());
            slot
        };

        let previous = ifd.offset_for_reading();
        if update_links && previous != Some(target) {
            match previous.and_then(|p| self.chain.iter().position(|e| e.offset == p)) {
                Some(at) => {
                    // Relocation of a chain member: repoint whatever led to
                    // it.
                    let slot = if at == 0 {
                        self.header_pointer_pos
                    } else {
                        self.chain[at - 1].next_slot
                    };
                    self.patch_pointer(slot, target)?;
                    self.chain[at] = ChainEntry {
                        offset: target,
                        next_slot,
                    };
                }
                None => {
                    // A new directory: link it after the current tail.
                    let slot = match self.chain.last() {
                        Some(last) => last.next_slot,
                        None => self.header_pointer_pos,
                    };
                    self.patch_pointer(slot, target)?;
                    self.chain.push(ChainEntry {
                        offset: target,
                        next_slot,
                    });
                }
            }
        } else if let Some(at) = self.chain.iter().position(|e| e.offset == target) {
            self.chain[at].next_slot = next_slot;
        }

        if !in_place {
            ifd.set_reserved_room(Some(size));
        }
        ifd.set_offset_for_writing(Some(target));
        ifd.set_offset_for_reading_hint(Some(target));
        Ok(target)
    }

    fn patch_pointer(&mut self, at: u64, value: u64) -> TiffResult<()> {
        if !self.big_tiff && value > u32::MAX as u64 {
            return Err(TiffError::IntSizeError);
        }
        let big = self.big_tiff;
        let mut w = EndianWriter::new(&mut self.stream, self.byte_order);
        w.goto_offset(at)?;
        if big {
            w.write_u64(value)?;
        } else {
            w.write_u32(value as u32)?;
        }
        Ok(())
    }

    /// Flushes and closes the handle. A failed flush is reported; the file
    /// may then hold a partial chain up to the last completed IFD.
    pub fn close(&mut self) -> TiffResult<()> {
        if self.closed {
            return Ok(());
        }
        self.stream.flush()?;
        self.closed = true;
        Ok(())
    }

}

impl<W: Read + Write + Seek> Drop for TiffWriter<W> {
    fn drop(&mut self) {
        if !self.closed {
            // Last-ditch flush; errors surface through `close` instead.
            let _ = self.stream.flush();
        }
    }
}
