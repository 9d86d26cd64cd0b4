//! The differencing predictor (tag 317): horizontal subtract on write,
//! horizontal add on read, plus the byte-split floating point variant.

use crate::codec::CodecOptions;
use crate::error::{TiffError, TiffResult, TiffUnsupportedError};
use crate::stream::ByteOrder;

fn sample_bytes(options: &CodecOptions) -> TiffResult<usize> {
    match options.bits_per_sample {
        8 => Ok(1),
        16 => Ok(2),
        24 => Ok(3),
        32 => Ok(4),
        bits => Err(TiffError::UnsupportedError(
            TiffUnsupportedError::UnsupportedBitsPerChannel(bits),
        )),
    }
}

#[inline]
fn load(buf: &[u8], width: usize, order: ByteOrder) -> u32 {
    match (width, order) {
        (1, _) => buf[0] as u32,
        (2, ByteOrder::LittleEndian) => u16::from_le_bytes([buf[0], buf[1]]) as u32,
        (2, ByteOrder::BigEndian) => u16::from_be_bytes([buf[0], buf[1]]) as u32,
        (3, ByteOrder::LittleEndian) => u32::from_le_bytes([buf[0], buf[1], buf[2], 0]),
        (3, ByteOrder::BigEndian) => u32::from_be_bytes([0, buf[0], buf[1], buf[2]]),
        (4, ByteOrder::LittleEndian) => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
        (4, ByteOrder::BigEndian) => u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
        _ => unreachable!("sample widths are validated before the row pass"),
    }
}

#[inline]
fn store(buf: &mut [u8], width: usize, order: ByteOrder, value: u32) {
    match (width, order) {
        (1, _) => buf[0] = value as u8,
        (2, ByteOrder::LittleEndian) => buf.copy_from_slice(&(value as u16).to_le_bytes()),
        (2, ByteOrder::BigEndian) => buf.copy_from_slice(&(value as u16).to_be_bytes()),
        (3, ByteOrder::LittleEndian) => buf.copy_from_slice(&value.to_le_bytes()[..3]),
        (3, ByteOrder::BigEndian) => buf.copy_from_slice(&value.to_be_bytes()[1..]),
        (4, ByteOrder::LittleEndian) => buf.copy_from_slice(&value.to_le_bytes()),
        (4, ByteOrder::BigEndian) => buf.copy_from_slice(&value.to_be_bytes()),
        _ => unreachable!("sample widths are validated before the row pass"),
    }
}

#[inline]
fn mask_for(width: usize) -> u32 {
    match width {
        1 => 0xFF,
        2 => 0xFFFF,
        3 => 0xFF_FFFF,
        _ => u32::MAX,
    }
}

/// Horizontal subtract, the write-side pass. The first pixel of every row is
/// left unchanged.
pub fn difference(data: &mut [u8], options: &CodecOptions) -> TiffResult<()> {
    let width = sample_bytes(options)?;
    let channels = options.channels as usize;
    let row_samples = options.width as usize * channels;
    let row_bytes = row_samples * width;
    let mask = mask_for(width);
    for row in data.chunks_exact_mut(row_bytes) {
        // Back to front so each difference reads the original neighbor.
        for i in (channels..row_samples).rev() {
            let current = load(&row[i * width..], width, options.byte_order);
            let previous = load(&row[(i - channels) * width..], width, options.byte_order);
            store(
                &mut row[i * width..i * width + width],
                width,
                options.byte_order,
                current.wrapping_sub(previous) & mask,
            );
        }
    }
    Ok(())
}

/// Horizontal add, the read-side pass; exact inverse of [`difference`].
pub fn undifference(data: &mut [u8], options: &CodecOptions) -> TiffResult<()> {
    let width = sample_bytes(options)?;
    let channels = options.channels as usize;
    let row_samples = options.width as usize * channels;
    let row_bytes = row_samples * width;
    let mask = mask_for(width);
    for row in data.chunks_exact_mut(row_bytes) {
        for i in channels..row_samples {
            let current = load(&row[i * width..], width, options.byte_order);
            let previous = load(&row[(i - channels) * width..], width, options.byte_order);
            store(
                &mut row[i * width..i * width + width],
                width,
                options.byte_order,
                current.wrapping_add(previous) & mask,
            );
        }
    }
    Ok(())
}

fn float_sample_bytes(options: &CodecOptions) -> TiffResult<usize> {
    match options.bits_per_sample {
        16 => Ok(2),
        32 => Ok(4),
        64 => Ok(8),
        bits => Err(TiffError::UnsupportedError(
            TiffUnsupportedError::UnsupportedBitsPerChannel(bits),
        )),
    }
}

/// Floating point predictor, write side: per row, samples are split into
/// big-endian byte planes and the plane bytes are differenced with the
/// channel stride.
pub fn difference_float(data: &mut [u8], options: &CodecOptions) -> TiffResult<()> {
    let width = float_sample_bytes(options)?;
    let channels = options.channels as usize;
    let row_samples = options.width as usize * channels;
    let row_bytes = row_samples * width;
    let mut split = vec![0u8; row_bytes];
    for row in data.chunks_exact_mut(row_bytes) {
        for (i, sample) in row.chunks_exact(width).enumerate() {
            for (plane, &byte) in sample.iter().enumerate() {
                let byte = match options.byte_order {
                    ByteOrder::BigEndian => byte,
                    ByteOrder::LittleEndian => sample[width - 1 - plane],
                };
                split[plane * row_samples + i] = byte;
            }
        }
        for i in (channels..row_bytes).rev() {
            split[i] = split[i].wrapping_sub(split[i - channels]);
        }
        row.copy_from_slice(&split);
    }
    Ok(())
}

/// Floating point predictor, read side; exact inverse of
/// [`difference_float`].
pub fn undifference_float(data: &mut [u8], options: &CodecOptions) -> TiffResult<()> {
    let width = float_sample_bytes(options)?;
    let channels = options.channels as usize;
    let row_samples = options.width as usize * channels;
    let row_bytes = row_samples * width;
    let mut gathered = vec![0u8; row_bytes];
    for row in data.chunks_exact_mut(row_bytes) {
        for i in channels..row_bytes {
            row[i] = row[i].wrapping_add(row[i - channels]);
        }
        for i in 0..row_samples {
            for plane in 0..width {
                let byte = row[plane * row_samples + i];
                let at = match options.byte_order {
                    ByteOrder::BigEndian => i * width + plane,
                    ByteOrder::LittleEndian => i * width + width - 1 - plane,
                };
                gathered[at] = byte;
            }
        }
        row.copy_from_slice(&gathered);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ByteOrder;

    fn opts(width: u32, channels: u16, bits: u16, order: ByteOrder) -> CodecOptions {
        CodecOptions::builder(width, 1)
            .channels(channels)
            .bits_per_sample(bits)
            .byte_order(order)
            .build()
    }

    #[test]
    fn rgb8_reference_row() {
        // (10,20,30) (11,21,31) (13,23,33) (20,30,40)
        let mut row = vec![10u8, 20, 30, 11, 21, 31, 13, 23, 33, 20, 30, 40];
        let options = opts(4, 3, 8, ByteOrder::LittleEndian);
        difference(&mut row, &options).unwrap();
        assert_eq!(row, vec![10, 20, 30, 1, 1, 1, 2, 2, 2, 7, 7, 7]);
        undifference(&mut row, &options).unwrap();
        assert_eq!(row, vec![10, 20, 30, 11, 21, 31, 13, 23, 33, 20, 30, 40]);
    }

    #[test]
    fn sixteen_bit_respects_byte_order() {
        // Two pixels, one channel: 0x0100 then 0x0101.
        let options_le = opts(2, 1, 16, ByteOrder::LittleEndian);
        let mut le = vec![0x00, 0x01, 0x01, 0x01];
        difference(&mut le, &options_le).unwrap();
        assert_eq!(le, vec![0x00, 0x01, 0x01, 0x00]);

        let options_be = opts(2, 1, 16, ByteOrder::BigEndian);
        let mut be = vec![0x01, 0x00, 0x01, 0x01];
        difference(&mut be, &options_be).unwrap();
        assert_eq!(be, vec![0x01, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn wrapping_difference() {
        let options = opts(2, 1, 8, ByteOrder::LittleEndian);
        let mut row = vec![200u8, 100];
        difference(&mut row, &options).unwrap();
        assert_eq!(row, vec![200, 156]);
        undifference(&mut row, &options).unwrap();
        assert_eq!(row, vec![200, 100]);
    }

    #[test]
    fn round_trip_widths_and_orders() {
        for bits in [8u16, 16, 24, 32] {
            for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
                for channels in [1u16, 3] {
                    let options = opts(5, channels, bits, order);
                    let len = 5 * channels as usize * (bits as usize / 8) * 2;
                    let original: Vec<u8> = (0..len).map(|i| (i * 89 % 256) as u8).collect();
                    let mut data = original.clone();
                    // Two rows worth of data.
                    let two_row_options = CodecOptions::builder(5, 2)
                        .channels(channels)
                        .bits_per_sample(bits)
                        .byte_order(order)
                        .build();
                    difference(&mut data, &two_row_options).unwrap();
                    undifference(&mut data, &two_row_options).unwrap();
                    assert_eq!(data, original, "bits={bits} order={order:?} n={channels}");
                }
            }
        }
    }

    #[test]
    fn float_round_trip() {
        for bits in [16u16, 32, 64] {
            for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
                let options = CodecOptions::builder(4, 2)
                    .channels(3)
                    .bits_per_sample(bits)
                    .byte_order(order)
                    .build();
                let len = 4 * 3 * (bits as usize / 8) * 2;
                let original: Vec<u8> = (0..len).map(|i| (i * 131 % 256) as u8).collect();
                let mut data = original.clone();
                difference_float(&mut data, &options).unwrap();
                assert_ne!(data, original);
                undifference_float(&mut data, &options).unwrap();
                assert_eq!(data, original, "bits={bits} order={order:?}");
            }
        }
    }

    #[test]
    fn one_bit_samples_are_rejected() {
        let options = opts(8, 1, 1, ByteOrder::LittleEndian);
        let mut data = vec![0u8; 1];
        assert!(difference(&mut data, &options).is_err());
    }
}
