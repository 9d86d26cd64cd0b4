//! Copying whole images and sub-rectangles between files, verbatim or with
//! recompression, plus single-file compaction.

use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use crate::error::{TiffError, TiffResult, UsageError};
use crate::ifd::Ifd;
use crate::map::Region;
use crate::reader::{ReaderOptions, TiffReader};
use crate::tags::Tag;
use crate::writer::{TiffWriter, WriterMode, WriterOptions};

/// Progress of a running copy, handed to the configured updater between
/// tiles.
#[derive(Debug, Clone, Copy)]
pub struct CopyProgress {
    pub image_index: usize,
    pub image_count: usize,
    pub tile_index: usize,
    pub tile_count: usize,
    /// Set during the final phase of a compaction, while the temporary
    /// sink is written back over the original file.
    pub copying_temporary_file: bool,
}

/// Tile-granular image copier.
///
/// Direct mode moves encoded tile payloads verbatim; recompression decodes
/// with the source codec and re-encodes with whatever the destination IFD
/// declares. Cancellation is cooperative and checked between tiles; a
/// cancelled destination is consistent only up to its last completed IFD.
#[derive(Default)]
pub struct TiffCopier {
    direct_copy: bool,
    progress_updater: Option<Box<dyn FnMut(&CopyProgress)>>,
    cancellation_checker: Option<Box<dyn Fn() -> bool>>,
    ifd_corrector: Option<Box<dyn Fn(&mut Ifd)>>,
}

impl std::fmt::Debug for TiffCopier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiffCopier")
            .field("direct_copy", &self.direct_copy)
            .field("progress_updater", &self.progress_updater.is_some())
            .field("cancellation_checker", &self.cancellation_checker.is_some())
            .field("ifd_corrector", &self.ifd_corrector.is_some())
            .finish()
    }
}

impl TiffCopier {
    pub fn new() -> TiffCopier {
        TiffCopier::default()
    }

    /// Copy encoded tile bytes verbatim instead of recompressing.
    pub fn direct_copy(mut self, enabled: bool) -> TiffCopier {
        self.direct_copy = enabled;
        self
    }

    pub fn progress_updater(mut self, updater: impl FnMut(&CopyProgress) + 'static) -> TiffCopier {
        self.progress_updater = Some(Box::new(updater));
        self
    }

    pub fn cancellation_checker(mut self, checker: impl Fn() -> bool + 'static) -> TiffCopier {
        self.cancellation_checker = Some(Box::new(checker));
        self
    }

    /// Hook run over each destination IFD before it is written.
    pub fn ifd_corrector(mut self, corrector: impl Fn(&mut Ifd) + 'static) -> TiffCopier {
        self.ifd_corrector = Some(Box::new(corrector));
        self
    }

    fn check_cancelled(&self) -> TiffResult<()> {
        if let Some(checker) = &self.cancellation_checker {
            if checker() {
                return Err(TiffError::Cancelled);
            }
        }
        Ok(())
    }

    fn report(&mut self, progress: CopyProgress) {
        if let Some(updater) = &mut self.progress_updater {
            updater(&progress);
        }
    }

    /// The destination clone of a source IFD: all tags except the chunk
    /// placement arrays, with the file placement reset.
    fn clone_ifd_for_destination<W: Read + Write + Seek>(
        &self,
        source: &Ifd,
        writer: &TiffWriter<W>,
    ) -> Ifd {
        let mut ifd = writer.new_ifd();
        for (tag, entry) in source.iter() {
            ifd.set_entry(tag, entry.clone());
        }
        for tag in [
            Tag::TileOffsets,
            Tag::TileByteCounts,
            Tag::StripOffsets,
            Tag::StripByteCounts,
        ] {
            ifd.remove(tag);
        }
        if let Some(corrector) = &self.ifd_corrector {
            corrector(&mut ifd);
        }
        ifd
    }

    /// Copies one whole image of `reader` to the end of `writer`.
    pub fn copy_image<R, W>(
        &mut self,
        writer: &mut TiffWriter<W>,
        reader: &mut TiffReader<R>,
        ifd_index: usize,
    ) -> TiffResult<()>
    where
        R: Read + Seek,
        W: Read + Write + Seek,
    {
        let image_count = reader.ifd_count()?;
        let map = reader.map(ifd_index)?;
        let tile_count = map.tile_count();
        let mut ifd = self.clone_ifd_for_destination(map.ifd(), writer);

        if self.direct_copy {
            if reader.byte_order()? != writer.byte_order()
                || reader.is_big_tiff()? != writer.is_big_tiff()
            {
                return Err(TiffError::UsageError(UsageError::IncompatibleDirectCopy));
            }
            let mut offsets = Vec::with_capacity(tile_count);
            let mut lengths = Vec::with_capacity(tile_count);
            for tile_index in 0..tile_count {
                self.check_cancelled()?;
                self.report(CopyProgress {
                    image_index: ifd_index,
                    image_count,
                    tile_index,
                    tile_count,
                    copying_temporary_file: false,
                });
                let payload = reader.read_tile_raw(&map, tile_index)?;
                let offset = writer.append_raw(&payload)?;
                offsets.push(offset);
                lengths.push(payload.len() as u64);
            }
            ifd.set_chunk_layout(&offsets, &lengths)?;
            writer.append_ifd(&mut ifd)?;
        } else {
            let mut destination = writer.new_fixed_map(ifd)?;
            for tile_index in 0..tile_count {
                self.check_cancelled()?;
                self.report(CopyProgress {
                    image_index: ifd_index,
                    image_count,
                    tile_index,
                    tile_count,
                    copying_temporary_file: false,
                });
                let full = reader.read_tile(&map, tile_index)?;
                destination
                    .tile_or_insert(tile_index)?
                    .fill_complete(full.as_ref().clone())?;
                // Flush as we go; huge pyramids never hold more than one
                // decoded tile here.
                writer.write_completed_tiles(&mut destination)?;
            }
            writer.complete(&mut destination)?;
        }
        Ok(())
    }

    /// Copies a sub-rectangle of one image; the destination image's
    /// dimensions become the rectangle's.
    ///
    /// With direct mode and a tile-aligned rectangle the covered tiles are
    /// moved verbatim; anything else is decoded, cropped and re-encoded.
    pub fn copy_rectangle<R, W>(
        &mut self,
        writer: &mut TiffWriter<W>,
        reader: &mut TiffReader<R>,
        ifd_index: usize,
        rect: Region,
    ) -> TiffResult<()>
    where
        R: Read + Seek,
        W: Read + Write + Seek,
    {
        let image_count = reader.ifd_count()?;
        let map = reader.map(ifd_index)?;
        let (source_width, source_height) = map.dimensions();
        let (tile_width, tile_height) = map.tile_size();
        let mut ifd = self.clone_ifd_for_destination(map.ifd(), writer);
        ifd.set_dimensions(rect.width, rect.height)?;

        let aligned = self.direct_copy
            && rect.x % tile_width as u64 == 0
            && rect.y % tile_height as u64 == 0
            && (rect.width % tile_width as u64 == 0 || rect.right() >= source_width)
            && (rect.height % tile_height as u64 == 0 || rect.bottom() >= source_height);

        if aligned {
            if reader.byte_order()? != writer.byte_order()
                || reader.is_big_tiff()? != writer.is_big_tiff()
            {
                return Err(TiffError::UsageError(UsageError::IncompatibleDirectCopy));
            }
            let tx0 = (rect.x / tile_width as u64) as u32;
            let ty0 = (rect.y / tile_height as u64) as u32;
            let across = rect.width.div_ceil(tile_width as u64) as u32;
            let down = rect.height.div_ceil(tile_height as u64) as u32;
            let tile_count = (across * down * map.planes()) as usize;
            let mut offsets = Vec::with_capacity(tile_count);
            let mut lengths = Vec::with_capacity(tile_count);
            let mut copied = 0usize;
            for plane in 0..map.planes() {
                for ty in 0..down {
                    for tx in 0..across {
                        self.check_cancelled()?;
                        self.report(CopyProgress {
                            image_index: ifd_index,
                            image_count,
                            tile_index: copied,
                            tile_count,
                            copying_temporary_file: false,
                        });
                        let source = crate::tile::TileIndex {
                            x: tx0 + tx,
                            y: ty0 + ty,
                            plane,
                        };
                        let payload =
                            reader.read_tile_raw(&map, map.linear_index(source))?;
                        let offset = writer.append_raw(&payload)?;
                        offsets.push(offset);
                        lengths.push(payload.len() as u64);
                        copied += 1;
                    }
                }
            }
            ifd.set_chunk_layout(&offsets, &lengths)?;
            writer.append_ifd(&mut ifd)?;
        } else {
            let pixels = reader.read_rectangle(
                &map,
                rect.x,
                rect.y,
                u32::try_from(rect.width)?,
                u32::try_from(rect.height)?,
            )?;
            self.check_cancelled()?;
            let mut destination = writer.new_fixed_map(ifd)?;
            destination.update_channels(&pixels, 0, 0)?;
            writer.complete(&mut destination)?;
        }
        Ok(())
    }

    /// Rewrites `path` without holes: every image is copied into a memory
    /// sink which then replaces the file.
    pub fn compact(&mut self, path: impl AsRef<Path>) -> TiffResult<()> {
        let path = path.as_ref();
        let mut reader = TiffReader::open_with(
            path,
            ReaderOptions {
                missing_tiles_allowed: true,
                ..ReaderOptions::default()
            },
        )?;
        let image_count = reader.ifd_count()?;

        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = TiffWriter::new(
                &mut sink,
                WriterMode::Create,
                WriterOptions {
                    big_tiff: reader.is_big_tiff()?,
                    byte_order: reader.byte_order()?,
                    ..WriterOptions::default()
                },
            )?;
            for index in 0..image_count {
                self.copy_image(&mut writer, &mut reader, index)?;
            }
            writer.close()?;
        }
        drop(reader);

        self.report(CopyProgress {
            image_index: image_count,
            image_count,
            tile_index: 0,
            tile_count: 0,
            copying_temporary_file: true,
        });
        std::fs::write(path, sink.into_inner())?;
        Ok(())
    }
}

/// Convenience wrapper: open `path` and compact it with default settings.
pub fn compact_file(path: impl AsRef<Path>) -> TiffResult<()> {
    TiffCopier::new().direct_copy(true).compact(path)
}
