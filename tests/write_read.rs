//! End-to-end write/read round trips over in-memory files.

use std::io::Cursor;

use pyratiff::{
    ByteOrder, ChannelBuffer, ReaderOptions, SampleType, TiffReader, TiffWriter, WriterMode,
    WriterOptions,
};
use pyratiff::tags::{
    CompressionScheme, FillOrder, PhotometricInterpretation, PlanarConfiguration, Predictor,
};

fn gray8_image(
    width: u64,
    height: u64,
    tile: u32,
    compression: CompressionScheme,
    options: WriterOptions,
    pixels: &[u8],
) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = TiffWriter::new(&mut cursor, WriterMode::Create, options).unwrap();
        let mut ifd = writer.new_ifd();
        ifd.set_dimensions(width, height).unwrap();
        ifd.set_photometric(PhotometricInterpretation::BlackIsZero);
        ifd.set_bits_per_sample(&[8]);
        ifd.set_compression(compression);
        ifd.set_tile_size(tile, tile).unwrap();
        let mut map = writer.new_fixed_map(ifd).unwrap();
        let buffer = ChannelBuffer::from_planar(
            width as u32,
            height as u32,
            1,
            SampleType::U8,
            pixels.to_vec(),
        )
        .unwrap();
        map.update_channels(&buffer, 0, 0).unwrap();
        writer.complete(&mut map).unwrap();
        writer.close().unwrap();
    }
    cursor.into_inner()
}

fn read_back(bytes: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut reader =
        TiffReader::new(Cursor::new(bytes.to_vec()), ReaderOptions::default()).unwrap();
    let map = reader.map(0).unwrap();
    let rect = reader.read_rectangle(&map, 0, 0, width, height).unwrap();
    rect.into_data()
}

fn noise(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed >> 24) as u8
        })
        .collect()
}

#[test]
fn tiny_classic_grayscale() {
    // A 3x2 image in one 16x16 uncompressed tile.
    let pixels = [10u8, 20, 30, 40, 50, 60];
    let bytes = gray8_image(3, 2, 16, CompressionScheme::None, WriterOptions::default(), &pixels);

    let mut reader =
        TiffReader::new(Cursor::new(bytes.clone()), ReaderOptions::default()).unwrap();
    assert!(reader.is_tiff());
    assert!(!reader.is_big_tiff().unwrap());

    let map = reader.map(0).unwrap();
    assert_eq!(map.dimensions(), (3, 2));
    assert_eq!(map.tile_count(), 1);

    // The decoded tile carries the six pixels and filler elsewhere.
    let tile = reader.read_tile(&map, 0).unwrap();
    assert_eq!(tile.len(), 256);
    assert_eq!(&tile[0..3], &[10, 20, 30]);
    assert_eq!(tile[3], 0);
    assert_eq!(&tile[16..19], &[40, 50, 60]);
    assert_eq!(tile[19], 0);

    let rect = reader.read_rectangle(&map, 0, 0, 3, 2).unwrap();
    assert_eq!(rect.data(), &pixels);

    // Header + one 256-byte tile + the IFD, nothing else.
    let ifd = reader.read_single_ifd(0).unwrap();
    assert!(ifd.serialized_size() <= 200);
    assert_eq!(bytes.len() as u64, 8 + 256 + ifd.serialized_size());
}

#[test]
fn round_trip_all_byte_codecs() {
    let pixels = noise(60 * 40, 0x5EED_1234);
    for compression in [
        CompressionScheme::None,
        CompressionScheme::PackBits,
        #[cfg(feature = "lzw")]
        CompressionScheme::Lzw,
        #[cfg(feature = "deflate")]
        CompressionScheme::Deflate,
    ] {
        let bytes = gray8_image(60, 40, 16, compression, WriterOptions::default(), &pixels);
        assert_eq!(read_back(&bytes, 60, 40), pixels, "{compression:?}");
    }
}

#[test]
fn round_trip_big_endian_and_bigtiff() {
    let pixels = noise(32 * 32, 77);
    for (big_tiff, byte_order) in [
        (false, ByteOrder::BigEndian),
        (true, ByteOrder::LittleEndian),
        (true, ByteOrder::BigEndian),
    ] {
        let options = WriterOptions {
            big_tiff,
            byte_order,
            ..WriterOptions::default()
        };
        let bytes = gray8_image(32, 32, 16, CompressionScheme::None, options, &pixels);
        let mut reader =
            TiffReader::new(Cursor::new(bytes.clone()), ReaderOptions::default()).unwrap();
        assert_eq!(reader.is_big_tiff().unwrap(), big_tiff);
        assert_eq!(reader.byte_order().unwrap(), byte_order);
        assert_eq!(read_back(&bytes, 32, 32), pixels);
    }
}

#[cfg(feature = "deflate")]
#[test]
fn sixteen_bit_predictor_round_trip() {
    let width = 48u32;
    let height = 32u32;
    // Smooth 16-bit ramp, the predictor's favourite diet.
    let mut pixels = Vec::with_capacity((width * height * 2) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&((x * 700 + y * 13) as u16).to_ne_bytes());
        }
    }

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            TiffWriter::new(&mut cursor, WriterMode::Create, WriterOptions::default()).unwrap();
        let mut ifd = writer.new_ifd();
        ifd.set_dimensions(width as u64, height as u64).unwrap();
        ifd.set_photometric(PhotometricInterpretation::BlackIsZero);
        ifd.set_bits_per_sample(&[16]);
        ifd.set_compression(CompressionScheme::Deflate);
        ifd.set_predictor(Predictor::Horizontal);
        ifd.set_tile_size(16, 16).unwrap();
        let mut map = writer.new_fixed_map(ifd).unwrap();
        let buffer =
            ChannelBuffer::from_planar(width, height, 1, SampleType::U16, pixels.clone()).unwrap();
        map.update_channels(&buffer, 0, 0).unwrap();
        writer.complete(&mut map).unwrap();
        writer.close().unwrap();
    }

    let mut reader = TiffReader::new(
        Cursor::new(cursor.into_inner()),
        ReaderOptions::default(),
    )
    .unwrap();
    let map = reader.map(0).unwrap();
    let rect = reader.read_rectangle(&map, 0, 0, width, height).unwrap();
    assert_eq!(rect.data(), &pixels[..]);
}

#[cfg(feature = "deflate")]
#[test]
fn rgb_chunky_and_planar_round_trip() {
    let width = 40u32;
    let height = 24u32;
    let planar_pixels = noise((width * height * 3) as usize, 0xC0FFEE);

    for planar in [false, true] {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                TiffWriter::new(&mut cursor, WriterMode::Create, WriterOptions::default())
                    .unwrap();
            let mut ifd = writer.new_ifd();
            ifd.set_dimensions(width as u64, height as u64).unwrap();
            ifd.set_photometric(PhotometricInterpretation::RGB);
            ifd.set_bits_per_sample(&[8, 8, 8]);
            ifd.set_compression(CompressionScheme::Deflate);
            if planar {
                ifd.set_planar_configuration(PlanarConfiguration::Planar);
            }
            ifd.set_tile_size(16, 16).unwrap();
            let mut map = writer.new_fixed_map(ifd).unwrap();
            assert_eq!(map.planes(), if planar { 3 } else { 1 });
            let buffer = ChannelBuffer::from_planar(
                width,
                height,
                3,
                SampleType::U8,
                planar_pixels.clone(),
            )
            .unwrap();
            map.update_channels(&buffer, 0, 0).unwrap();
            writer.complete(&mut map).unwrap();
            writer.close().unwrap();
        }

        let mut reader = TiffReader::new(
            Cursor::new(cursor.into_inner()),
            ReaderOptions::default(),
        )
        .unwrap();
        let map = reader.map(0).unwrap();
        let rect = reader.read_rectangle(&map, 0, 0, width, height).unwrap();
        assert_eq!(rect.data(), &planar_pixels[..], "planar={planar}");

        // Planar images carry three times the chunk count of chunky ones.
        let expected_chunks = if planar { 3 * 3 * 2 } else { 3 * 2 };
        assert_eq!(map.tile_count(), expected_chunks);
    }
}

#[test]
fn strip_image_round_trip() {
    let width = 50u64;
    let height = 19u64;
    let pixels = noise((width * height) as usize, 0xAB);

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            TiffWriter::new(&mut cursor, WriterMode::Create, WriterOptions::default()).unwrap();
        let mut ifd = writer.new_ifd();
        ifd.set_dimensions(width, height).unwrap();
        ifd.set_photometric(PhotometricInterpretation::BlackIsZero);
        ifd.set_bits_per_sample(&[8]);
        ifd.set_compression(CompressionScheme::PackBits);
        ifd.set_rows_per_strip(8);
        let mut map = writer.new_fixed_map(ifd).unwrap();
        // Strips are full-width bands: 8 + 8 + 3 rows.
        assert_eq!(map.tile_size(), (50, 8));
        assert_eq!(map.tiles_down(), 3);
        let buffer = ChannelBuffer::from_planar(
            width as u32,
            height as u32,
            1,
            SampleType::U8,
            pixels.clone(),
        )
        .unwrap();
        map.update_channels(&buffer, 0, 0).unwrap();
        writer.complete(&mut map).unwrap();
        writer.close().unwrap();
    }

    let bytes = cursor.into_inner();
    assert_eq!(read_back(&bytes, width as u32, height as u32), pixels);
}

#[test]
fn bilevel_group4_round_trip() {
    let width = 64u32;
    let height = 48u32;
    let row_bytes = (width as usize).div_ceil(8);
    // Diagonal stripes.
    let mut bits = vec![0u8; row_bytes * height as usize];
    for y in 0..height as usize {
        for x in 0..width as usize {
            if (x + y) % 9 < 4 {
                bits[y * row_bytes + x / 8] |= 0x80 >> (x % 8);
            }
        }
    }

    for (compression, fill_order) in [
        (CompressionScheme::CcittFax4, FillOrder::MsbFirst),
        (CompressionScheme::CcittRle, FillOrder::MsbFirst),
        (CompressionScheme::CcittRle, FillOrder::LsbFirst),
    ] {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                TiffWriter::new(&mut cursor, WriterMode::Create, WriterOptions::default())
                    .unwrap();
            let mut ifd = writer.new_ifd();
            ifd.set_dimensions(width as u64, height as u64).unwrap();
            ifd.set_photometric(PhotometricInterpretation::WhiteIsZero);
            ifd.set_bits_per_sample(&[1]);
            ifd.set_compression(compression);
            ifd.set_fill_order(fill_order);
            ifd.set_tile_size(32, 16).unwrap();
            let mut map = writer.new_fixed_map(ifd).unwrap();
            let buffer = ChannelBuffer::from_planar(
                width,
                height,
                1,
                SampleType::Bit,
                bits.clone(),
            )
            .unwrap();
            map.update_channels(&buffer, 0, 0).unwrap();
            writer.complete(&mut map).unwrap();
            writer.close().unwrap();
        }

        let bytes = cursor.into_inner();
        let mut reader =
            TiffReader::new(Cursor::new(bytes), ReaderOptions::default()).unwrap();
        let map = reader.map(0).unwrap();
        let rect = reader.read_rectangle(&map, 0, 0, width, height).unwrap();
        assert_eq!(rect.data(), &bits[..], "{compression:?} {fill_order:?}");
    }
}

#[cfg(feature = "jpeg")]
#[test]
fn jpeg_round_trip_is_visually_close() {
    let width = 48u32;
    let height = 48u32;
    let mut planar = Vec::with_capacity((width * height * 3) as usize);
    // Planar smooth channels.
    for c in 0u32..3 {
        for y in 0..height {
            for x in 0..width {
                planar.push(((x * 3 + y * 2 + c * 40) % 256) as u8);
            }
        }
    }

    let mut cursor = Cursor::new(Vec::new());
    {
        let options = WriterOptions {
            quality: Some(0.95),
            ..WriterOptions::default()
        };
        let mut writer = TiffWriter::new(&mut cursor, WriterMode::Create, options).unwrap();
        let mut ifd = writer.new_ifd();
        ifd.set_dimensions(width as u64, height as u64).unwrap();
        ifd.set_photometric(PhotometricInterpretation::YCbCr);
        ifd.set_samples_per_pixel(3).unwrap();
        ifd.set_bits_per_sample(&[8, 8, 8]);
        ifd.set_compression(CompressionScheme::Jpeg);
        ifd.set_tile_size(48, 48).unwrap();
        let mut map = writer.new_fixed_map(ifd).unwrap();
        let buffer =
            ChannelBuffer::from_planar(width, height, 3, SampleType::U8, planar.clone()).unwrap();
        map.update_channels(&buffer, 0, 0).unwrap();
        writer.complete(&mut map).unwrap();
        writer.close().unwrap();
    }

    let mut reader = TiffReader::new(
        Cursor::new(cursor.into_inner()),
        ReaderOptions::default(),
    )
    .unwrap();
    let map = reader.map(0).unwrap();
    let rect = reader.read_rectangle(&map, 0, 0, width, height).unwrap();
    let mean_error: f64 = planar
        .iter()
        .zip(rect.data())
        .map(|(&a, &b)| (a as f64 - b as f64).abs())
        .sum::<f64>()
        / planar.len() as f64;
    assert!(mean_error < 8.0, "mean error {mean_error}");
}

#[test]
fn resizable_map_grows_with_writes() {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            TiffWriter::new(&mut cursor, WriterMode::Create, WriterOptions::default()).unwrap();
        let mut ifd = writer.new_ifd();
        ifd.set_photometric(PhotometricInterpretation::BlackIsZero);
        ifd.set_bits_per_sample(&[8]);
        ifd.set_compression(CompressionScheme::None);
        ifd.set_tile_size(16, 16).unwrap();
        let mut map = writer.new_resizable_map(ifd).unwrap();
        let tile = ChannelBuffer::new_filled(16, 16, 1, SampleType::U8, 5);
        map.update_channels(&tile, 0, 0).unwrap();
        map.update_channels(&tile, 16, 0).unwrap();
        map.update_channels(&tile, 0, 16).unwrap();
        assert_eq!(map.dimensions(), (32, 32));
        writer.complete(&mut map).unwrap();
        writer.close().unwrap();
    }

    let bytes = cursor.into_inner();
    let mut reader =
        TiffReader::new(Cursor::new(bytes), ReaderOptions::default()).unwrap();
    let map = reader.map(0).unwrap();
    assert_eq!(map.dimensions(), (32, 32));
    let rect = reader.read_rectangle(&map, 0, 0, 32, 32).unwrap();
    // The never-written bottom-right tile reads as filler.
    assert_eq!(rect.data()[0], 5);
    assert_eq!(rect.data()[31 * 32 + 31], 0);
}

#[test]
fn completed_layout_has_no_holes() {
    let pixels = noise(40 * 40, 3);
    let bytes = gray8_image(40, 40, 16, CompressionScheme::PackBits, WriterOptions::default(), &pixels);
    let mut reader =
        TiffReader::new(Cursor::new(bytes.clone()), ReaderOptions::default()).unwrap();
    let ifd = reader.read_single_ifd(0).unwrap();
    let offsets = ifd.chunk_offsets().unwrap();
    let counts = ifd.chunk_byte_counts().unwrap();
    assert_eq!(offsets.len(), 9);
    for (&offset, &count) in offsets.iter().zip(&counts) {
        assert!(offset > 0);
        assert!(count > 0);
        assert!(offset + count <= bytes.len() as u64);
    }
}

#[test]
fn cropped_boundary_tiles_round_trip() {
    let pixels = noise(20 * 20, 0xF00D);
    let options = WriterOptions {
        crop_boundary_tiles: true,
        ..WriterOptions::default()
    };
    let bytes = gray8_image(20, 20, 16, CompressionScheme::None, options, &pixels);

    // The boundary tiles hold only their in-image pixels.
    let mut reader = TiffReader::new(
        Cursor::new(bytes.clone()),
        ReaderOptions {
            crop_boundary_tiles: true,
            ..ReaderOptions::default()
        },
    )
    .unwrap();
    let ifd = reader.read_single_ifd(0).unwrap();
    let counts = ifd.chunk_byte_counts().unwrap();
    assert_eq!(counts, vec![256, 4 * 16, 16 * 4, 4 * 4]);

    let map = reader.map(0).unwrap();
    let rect = reader.read_rectangle(&map, 0, 0, 20, 20).unwrap();
    assert_eq!(rect.data(), &pixels[..]);
}

#[test]
fn non_tiff_input_is_diagnosed_by_mode() {
    let garbage = b"definitely not a tiff".to_vec();

    assert!(TiffReader::new(
        Cursor::new(garbage.clone()),
        ReaderOptions::default()
    )
    .is_err());

    let reader = TiffReader::new(
        Cursor::new(garbage.clone()),
        ReaderOptions {
            open_mode: pyratiff::OpenMode::AllowNonTiff,
            ..ReaderOptions::default()
        },
    )
    .unwrap();
    assert!(!reader.is_tiff());
    assert!(reader.open_error().is_none());

    let reader = TiffReader::new(
        Cursor::new(garbage),
        ReaderOptions {
            open_mode: pyratiff::OpenMode::NoChecks,
            ..ReaderOptions::default()
        },
    )
    .unwrap();
    assert!(!reader.is_tiff());
    assert!(reader.open_error().is_some());
}

#[test]
fn missing_tiles_follow_the_lenient_flag() {
    let pixels = noise(32 * 32, 9);
    let mut bytes = gray8_image(32, 32, 16, CompressionScheme::None, WriterOptions::default(), &pixels);

    // Zero out the offset of the first tile, strict readers must fail.
    {
        let mut reader =
            TiffReader::new(Cursor::new(bytes.clone()), ReaderOptions::default()).unwrap();
        let ifd = reader.read_single_ifd(0).unwrap();
        let first_offset = ifd.chunk_offsets().unwrap()[0];
        // The offsets array lives out of line; find and zero the first
        // element (little endian LONG).
        let needle = (first_offset as u32).to_le_bytes();
        let at = bytes
            .windows(4)
            .rposition(|w| w == needle)
            .expect("offset value present");
        bytes[at..at + 4].fill(0);
    }

    let mut strict =
        TiffReader::new(Cursor::new(bytes.clone()), ReaderOptions::default()).unwrap();
    let map = strict.map(0).unwrap();
    assert!(strict.read_tile(&map, 0).is_err());

    let mut lenient = TiffReader::new(
        Cursor::new(bytes),
        ReaderOptions {
            missing_tiles_allowed: true,
            byte_filler: 0x11,
            ..ReaderOptions::default()
        },
    )
    .unwrap();
    let map = lenient.map(0).unwrap();
    let tile = lenient.read_tile(&map, 0).unwrap();
    assert!(tile.iter().all(|&b| b == 0x11));
}

#[test]
fn auto_unpack_expands_bits() {
    let width = 16u32;
    let height = 8u32;
    let row_bytes = 2usize;
    let mut bits = vec![0u8; row_bytes * height as usize];
    bits[0] = 0b1010_0000;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            TiffWriter::new(&mut cursor, WriterMode::Create, WriterOptions::default()).unwrap();
        let mut ifd = writer.new_ifd();
        ifd.set_dimensions(width as u64, height as u64).unwrap();
        ifd.set_photometric(PhotometricInterpretation::BlackIsZero);
        ifd.set_bits_per_sample(&[1]);
        ifd.set_compression(CompressionScheme::None);
        ifd.set_tile_size(16, 16).unwrap();
        let mut map = writer.new_fixed_map(ifd).unwrap();
        let buffer =
            ChannelBuffer::from_planar(width, height, 1, SampleType::Bit, bits.clone()).unwrap();
        map.update_channels(&buffer, 0, 0).unwrap();
        writer.complete(&mut map).unwrap();
        writer.close().unwrap();
    }

    let mut reader = TiffReader::new(
        Cursor::new(cursor.into_inner()),
        ReaderOptions {
            auto_unpack: true,
            ..ReaderOptions::default()
        },
    )
    .unwrap();
    let map = reader.map(0).unwrap();
    let rect = reader.read_rectangle(&map, 0, 0, width, height).unwrap();
    assert_eq!(rect.sample_type(), SampleType::U8);
    assert_eq!(&rect.data()[..4], &[255, 0, 255, 0]);
}
