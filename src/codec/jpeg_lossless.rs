//! Read-only lossless JPEG (SOF3) as stored under compression 34676:
//! Huffman-coded differences with the seven spatial predictors.
//!
//! Arithmetic-coded frames are diagnosed and rejected; there is no encoder.

use crate::codec::CodecOptions;
use crate::error::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError};
use crate::stream::ByteOrder;

fn bad(detail: &str) -> TiffError {
    TiffError::FormatError(TiffFormatError::Format(format!(
        "lossless JPEG stream corrupted: {detail}"
    )))
}

/// One canonical DC-style Huffman table.
#[derive(Clone, Default)]
struct HuffmanTable {
    /// MINCODE/MAXCODE/VALPTR per code length 1..=16.
    min_code: [i32; 17],
    max_code: [i32; 17],
    val_ptr: [usize; 17],
    values: Vec<u8>,
}

impl HuffmanTable {
    fn build(counts: &[u8; 16], values: Vec<u8>) -> HuffmanTable {
        let mut table = HuffmanTable {
            values,
            ..Default::default()
        };
        let mut code = 0i32;
        let mut k = 0usize;
        for len in 1..=16usize {
            if counts[len - 1] == 0 {
                table.min_code[len] = 0;
                table.max_code[len] = -1;
                code <<= 1;
                continue;
            }
            table.val_ptr[len] = k;
            table.min_code[len] = code;
            code += counts[len - 1] as i32;
            k += counts[len - 1] as usize;
            table.max_code[len] = code - 1;
            code <<= 1;
        }
        table
    }

    fn decode_symbol(&self, reader: &mut EntropyReader) -> TiffResult<u8> {
        let mut code = 0i32;
        for len in 1..=16usize {
            code = (code << 1) | reader.read_bit()? as i32;
            if self.max_code[len] >= 0 && code <= self.max_code[len] && code >= self.min_code[len] {
                let index = self.val_ptr[len] + (code - self.min_code[len]) as usize;
                return self
                    .values
                    .get(index)
                    .copied()
                    .ok_or_else(|| bad("Huffman code outside table"));
            }
        }
        Err(bad("Huffman code longer than 16 bits"))
    }
}

/// Entropy-coded segment reader handling byte stuffing and restart markers.
struct EntropyReader<'a> {
    data: &'a [u8],
    at: usize,
    bit: u8,
    /// Set once a restart or EOI marker is reached.
    marker: Option<u8>,
}

impl<'a> EntropyReader<'a> {
    fn new(data: &'a [u8], at: usize) -> EntropyReader<'a> {
        EntropyReader {
            data,
            at,
            bit: 0,
            marker: None,
        }
    }

    fn read_bit(&mut self) -> TiffResult<u8> {
        if self.marker.is_some() {
            return Err(bad("read past a marker"));
        }
        let Some(&byte) = self.data.get(self.at) else {
            return Err(bad("truncated entropy data"));
        };
        if byte == 0xFF && self.bit == 0 {
            match self.data.get(self.at + 1) {
                Some(0x00) => {}
                Some(&m) => {
                    self.marker = Some(m);
                    return Err(bad("marker inside entropy data"));
                }
                None => return Err(bad("truncated entropy data")),
            }
        }
        let value = (byte >> (7 - self.bit)) & 1;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.at += if byte == 0xFF { 2 } else { 1 };
        }
        Ok(value)
    }

    /// `count` raw bits, MSB first.
    fn read_bits(&mut self, count: u8) -> TiffResult<u32> {
        let mut out = 0u32;
        for _ in 0..count {
            out = (out << 1) | self.read_bit()? as u32;
        }
        Ok(out)
    }

    /// Consumes an expected restart marker and resynchronizes.
    fn consume_restart(&mut self) -> TiffResult<()> {
        if self.bit != 0 {
            self.bit = 0;
            self.at += if self.data[self.at] == 0xFF { 2 } else { 1 };
        }
        if self.at + 2 > self.data.len()
            || self.data[self.at] != 0xFF
            || !(0xD0..=0xD7).contains(&self.data[self.at + 1])
        {
            return Err(bad("missing restart marker"));
        }
        self.at += 2;
        self.marker = None;
        Ok(())
    }
}

/// The JPEG `Extend` procedure: a `category`-bit magnitude to a signed
/// difference.
fn extend(value: u32, category: u8) -> i32 {
    if category == 0 {
        return 0;
    }
    if category == 16 {
        // 32768 is coded without additional bits.
        return 32768;
    }
    let threshold = 1u32 << (category - 1);
    if value < threshold {
        value as i32 - (1i32 << category) + 1
    } else {
        value as i32
    }
}

struct Component {
    id: u8,
    table: usize,
}

pub fn decode(data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(bad("missing SOI"));
    }

    let mut tables: Vec<Option<HuffmanTable>> = vec![None, None, None, None];
    let mut precision = 0u8;
    let mut frame_width = 0usize;
    let mut frame_height = 0usize;
    let mut frame_components: Vec<u8> = Vec::new();
    let mut restart_interval = 0usize;

    let mut at = 2usize;
    loop {
        if at + 2 > data.len() {
            return Err(bad("missing SOS"));
        }
        if data[at] != 0xFF {
            return Err(bad("broken marker stream"));
        }
        let marker = data[at + 1];
        if marker == 0xFF {
            at += 1;
            continue;
        }
        if at + 4 > data.len() {
            return Err(bad("truncated segment"));
        }
        let seg_len = ((data[at + 2] as usize) << 8) | data[at + 3] as usize;
        let seg = data
            .get(at + 4..at + 2 + seg_len)
            .ok_or_else(|| bad("truncated segment"))?;
        match marker {
            0xC3 => {
                if seg.len() < 6 {
                    return Err(bad("short SOF3"));
                }
                precision = seg[0];
                frame_height = ((seg[1] as usize) << 8) | seg[2] as usize;
                frame_width = ((seg[3] as usize) << 8) | seg[4] as usize;
                let count = seg[5] as usize;
                for c in 0..count {
                    let entry = seg.get(6 + c * 3..9 + c * 3).ok_or_else(|| bad("short SOF3"))?;
                    if entry[1] != 0x11 {
                        return Err(TiffError::UnsupportedError(
                            TiffUnsupportedError::CodecConstraint {
                                scheme: crate::tags::CompressionScheme::LosslessJpeg,
                                reason: "subsampled lossless frames are not supported",
                            },
                        ));
                    }
                    frame_components.push(entry[0]);
                }
                at += 2 + seg_len;
            }
            // Any other frame type under this compression code is wrong;
            // the arithmetic ones get their dedicated diagnosis.
            0xC9 | 0xCA | 0xCB | 0xCD | 0xCE | 0xCF => {
                return Err(TiffError::UnsupportedError(
                    TiffUnsupportedError::ArithmeticCodedJpeg,
                ))
            }
            0xCC => {
                return Err(TiffError::UnsupportedError(
                    TiffUnsupportedError::ArithmeticCodedJpeg,
                ))
            }
            0xC0 | 0xC1 | 0xC2 | 0xC5 | 0xC6 | 0xC7 => {
                return Err(bad("not a lossless (SOF3) frame"));
            }
            0xC4 => {
                // DHT, possibly several tables in one segment.
                let mut rest = seg;
                while !rest.is_empty() {
                    let class = rest[0] >> 4;
                    let slot = (rest[0] & 0x0F) as usize;
                    if class != 0 || slot > 3 {
                        return Err(bad("unexpected Huffman table class"));
                    }
                    let counts: [u8; 16] = rest
                        .get(1..17)
                        .ok_or_else(|| bad("short DHT"))?
                        .try_into()
                        .unwrap();
                    let total: usize = counts.iter().map(|&c| c as usize).sum();
                    let values = rest
                        .get(17..17 + total)
                        .ok_or_else(|| bad("short DHT"))?
                        .to_vec();
                    tables[slot] = Some(HuffmanTable::build(&counts, values));
                    rest = &rest[17 + total..];
                }
                at += 2 + seg_len;
            }
            0xDD => {
                if seg.len() < 2 {
                    return Err(bad("short DRI"));
                }
                restart_interval = ((seg[0] as usize) << 8) | seg[1] as usize;
                at += 2 + seg_len;
            }
            0xDA => {
                // SOS: component table mapping plus the predictor selector.
                if seg.is_empty() {
                    return Err(bad("short SOS"));
                }
                let count = seg[0] as usize;
                if seg.len() < 1 + count * 2 + 3 {
                    return Err(bad("short SOS"));
                }
                let mut components = Vec::with_capacity(count);
                for c in 0..count {
                    components.push(Component {
                        id: seg[1 + c * 2],
                        table: (seg[2 + c * 2] >> 4) as usize,
                    });
                }
                let predictor = seg[1 + count * 2];
                let point_transform = seg[3 + count * 2] & 0x0F;
                let entropy_start = at + 2 + seg_len;
                return decode_scan(
                    data,
                    entropy_start,
                    &tables,
                    precision,
                    frame_width,
                    frame_height,
                    &frame_components,
                    components,
                    predictor,
                    point_transform,
                    restart_interval,
                    options,
                );
            }
            0xD9 => return Err(bad("EOI before SOS")),
            _ => {
                at += 2 + seg_len;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_scan(
    data: &[u8],
    entropy_start: usize,
    tables: &[Option<HuffmanTable>],
    precision: u8,
    width: usize,
    height: usize,
    frame_components: &[u8],
    components: Vec<Component>,
    predictor: u8,
    point_transform: u8,
    restart_interval: usize,
    options: &CodecOptions,
) -> TiffResult<Vec<u8>> {
    if width == 0 || height == 0 || frame_components.is_empty() {
        return Err(bad("SOS before SOF3"));
    }
    if !(1..=7).contains(&predictor) {
        return Err(bad("predictor selector out of range"));
    }
    if !(2..=16).contains(&precision) {
        return Err(bad("sample precision out of range"));
    }
    if components.len() != frame_components.len() {
        return Err(bad("scan does not cover all components"));
    }
    for component in &components {
        if !frame_components.contains(&component.id) {
            return Err(bad("scan references unknown component"));
        }
    }

    let channel_count = components.len();
    let sample_bytes = if precision > 8 { 2 } else { 1 };
    let out_len = width * height * channel_count * sample_bytes;
    if out_len > options.max_decoded_size {
        return Err(TiffError::LimitsExceeded);
    }

    // Samples are reconstructed per channel at full precision first.
    let mut samples = vec![0u16; width * height * channel_count];
    let mut reader = EntropyReader::new(data, entropy_start);
    let default_prediction = 1i32 << (precision - point_transform - 1);
    let mut until_restart = restart_interval;
    // After a restart marker the prediction starts over from the default.
    let mut reset_pending = false;

    for y in 0..height {
        for x in 0..width {
            for (c, component) in components.iter().enumerate() {
                let table = tables
                    .get(component.table)
                    .and_then(|t| t.as_ref())
                    .ok_or_else(|| bad("scan references missing Huffman table"))?;
                let category = table.decode_symbol(&mut reader)?;
                if category > 16 {
                    return Err(bad("difference category out of range"));
                }
                let magnitude = if category == 0 || category == 16 {
                    0
                } else {
                    reader.read_bits(category)?
                };
                let diff = extend(magnitude, category);

                let index = (y * width + x) * channel_count + c;
                let ra = || samples[index - channel_count] as i32;
                let rb = || samples[index - width * channel_count] as i32;
                let rc = || samples[index - width * channel_count - channel_count] as i32;
                let prediction = if (y == 0 && x == 0) || reset_pending {
                    default_prediction
                } else if y == 0 {
                    ra()
                } else if x == 0 {
                    rb()
                } else {
                    match predictor {
                        1 => ra(),
                        2 => rb(),
                        3 => rc(),
                        4 => ra() + rb() - rc(),
                        5 => ra() + ((rb() - rc()) >> 1),
                        6 => rb() + ((ra() - rc()) >> 1),
                        _ => (ra() + rb()) >> 1,
                    }
                };
                let mask = (1u32 << precision) - 1;
                samples[index] = ((prediction + diff) as u32 & mask) as u16;
            }
            reset_pending = false;
            if restart_interval > 0 {
                until_restart -= 1;
                if until_restart == 0 && !(y == height - 1 && x == width - 1) {
                    reader.consume_restart()?;
                    until_restart = restart_interval;
                    reset_pending = true;
                }
            }
        }
    }

    // Point transform shifts samples back up.
    if point_transform > 0 {
        for s in &mut samples {
            *s <<= point_transform;
        }
    }

    // Big-endian sample storage, then whatever byte order the tile wants.
    let mut out = Vec::with_capacity(out_len);
    if sample_bytes == 2 {
        for s in &samples {
            out.extend_from_slice(&s.to_be_bytes());
        }
        if options.byte_order == ByteOrder::LittleEndian {
            // The pipeline expects file byte order.
            for pair in out.chunks_exact_mut(2) {
                pair.swap(0, 1);
            }
        }
    } else {
        out.extend(samples.iter().map(|&s| s as u8));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_matches_reference() {
        assert_eq!(extend(0, 0), 0);
        // Category 1: 0 -> -1, 1 -> 1.
        assert_eq!(extend(0, 1), -1);
        assert_eq!(extend(1, 1), 1);
        // Category 3: 0..3 -> -7..-4, 4..7 -> 4..7.
        assert_eq!(extend(0, 3), -7);
        assert_eq!(extend(3, 3), -4);
        assert_eq!(extend(4, 3), 4);
        assert_eq!(extend(7, 3), 7);
        assert_eq!(extend(0, 16), 32768);
    }

    #[test]
    fn huffman_table_decodes_canonical_codes() {
        // Two 2-bit codes (00, 01) and one 3-bit code (100).
        let mut counts = [0u8; 16];
        counts[1] = 2;
        counts[2] = 1;
        let table = HuffmanTable::build(&counts, vec![0, 1, 2]);
        let bits = [0b0001_1000u8];
        let mut reader = EntropyReader::new(&bits, 0);
        assert_eq!(table.decode_symbol(&mut reader).unwrap(), 0);
        assert_eq!(table.decode_symbol(&mut reader).unwrap(), 1);
        assert_eq!(table.decode_symbol(&mut reader).unwrap(), 2);
    }

    #[test]
    fn byte_stuffing_is_transparent() {
        let data = [0xFFu8, 0x00, 0x80];
        let mut reader = EntropyReader::new(&data, 0);
        let mut first = 0u32;
        for _ in 0..8 {
            first = (first << 1) | reader.read_bit().unwrap() as u32;
        }
        assert_eq!(first, 0xFF);
        assert_eq!(reader.read_bit().unwrap(), 1);
    }

    /// A tiny hand-assembled SOF3 stream: 2x2, one component, 8-bit,
    /// predictor 1.
    fn tiny_lossless_stream() -> Vec<u8> {
        let mut s = vec![0xFF, 0xD8];
        // DHT: one table, symbols 0..=2 with 2-bit/3-bit codes as above.
        s.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x16, 0x00]);
        let mut counts = [0u8; 16];
        counts[1] = 2;
        counts[2] = 1;
        s.extend_from_slice(&counts);
        s.extend_from_slice(&[0x00, 0x01, 0x02]);
        // SOF3: precision 8, 2x2, one component id 0, sampling 1x1.
        s.extend_from_slice(&[0xFF, 0xC3, 0x00, 0x0B, 0x08, 0x00, 0x02, 0x00, 0x02, 0x01, 0x00, 0x11, 0x00]);
        // SOS: one component, table 0, predictor 1, point transform 0.
        s.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00]);
        // Entropy data. Sample stream decodes as:
        //   (0,0): cat 0        -> diff 0    -> 128 (default prediction)
        //   (1,0): cat 1, bit 1 -> diff +1   -> 129 (Ra)
        //   (0,1): cat 1, bit 0 -> diff -1   -> 127 (Rb)
        //   (1,1): cat 2, 11    -> diff +3   -> 130 (Ra)
        // Codes: 00 | 01 1 | 01 0 | 100 11  = 0001_1010_1001_1xxx
        s.extend_from_slice(&[0b0001_1010, 0b1001_1000]);
        s.extend_from_slice(&[0xFF, 0xD9]);
        s
    }

    #[test]
    fn decodes_tiny_stream() {
        let stream = tiny_lossless_stream();
        let options = CodecOptions::builder(2, 2).channels(1).bits_per_sample(8).build();
        let decoded = decode(&stream, &options).unwrap();
        assert_eq!(decoded, vec![128, 129, 127, 130]);
    }

    #[test]
    fn arithmetic_frames_are_rejected() {
        let mut s = vec![0xFF, 0xD8];
        s.extend_from_slice(&[0xFF, 0xCB, 0x00, 0x08, 0x08, 0x00, 0x01, 0x00, 0x01, 0x00]);
        let options = CodecOptions::builder(1, 1).build();
        assert!(matches!(
            decode(&s, &options).unwrap_err(),
            TiffError::UnsupportedError(TiffUnsupportedError::ArithmeticCodedJpeg)
        ));
    }
}
