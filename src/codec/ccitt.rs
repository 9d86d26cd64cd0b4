//! CCITT bilevel codecs: Modified Huffman RLE (compression 2), T.4 / Group 3
//! (compression 3) and T.6 / Group 4 (compression 4).
//!
//! Encoded and decoded data are MSB-first; a `FillOrder` of 2 is handled by
//! the pipeline around the codec, never in here. Decoded rows are packed one
//! bit per pixel, `0` = white, `1` = black, each row padded to a byte
//! boundary.

use crate::codec::CodecOptions;
use crate::error::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError};
use crate::tags::{t4_options, t6_options, CompressionScheme};

/// Which of the three CCITT flavors is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// One-dimensional runs, every row byte-aligned, no EOL codes.
    ModifiedHuffman,
    /// Group 3: EOL-framed rows, optionally 2-D coded (Group3Options).
    T4,
    /// Group 4: pure 2-D coding against the previous row.
    T6,
}

impl Scheme {
    fn compression(self) -> CompressionScheme {
        match self {
            Scheme::ModifiedHuffman => CompressionScheme::CcittRle,
            Scheme::T4 => CompressionScheme::CcittFax3,
            Scheme::T6 => CompressionScheme::CcittFax4,
        }
    }
}

// (run, bits, code) triples straight from ITU-T T.4.

#[rustfmt::skip]
static WHITE_TERMINATING: [(u16, u8, u16); 64] = [
    (0, 8, 0x35), (1, 6, 0x07), (2, 4, 0x07), (3, 4, 0x08),
    (4, 4, 0x0B), (5, 4, 0x0C), (6, 4, 0x0E), (7, 4, 0x0F),
    (8, 5, 0x13), (9, 5, 0x14), (10, 5, 0x07), (11, 5, 0x08),
    (12, 6, 0x08), (13, 6, 0x03), (14, 6, 0x34), (15, 6, 0x35),
    (16, 6, 0x2A), (17, 6, 0x2B), (18, 7, 0x27), (19, 7, 0x0C),
    (20, 7, 0x08), (21, 7, 0x17), (22, 7, 0x03), (23, 7, 0x04),
    (24, 7, 0x28), (25, 7, 0x2B), (26, 7, 0x13), (27, 7, 0x24),
    (28, 7, 0x18), (29, 8, 0x02), (30, 8, 0x03), (31, 8, 0x1A),
    (32, 8, 0x1B), (33, 8, 0x12), (34, 8, 0x13), (35, 8, 0x14),
    (36, 8, 0x15), (37, 8, 0x16), (38, 8, 0x17), (39, 8, 0x28),
    (40, 8, 0x29), (41, 8, 0x2A), (42, 8, 0x2B), (43, 8, 0x2C),
    (44, 8, 0x2D), (45, 8, 0x04), (46, 8, 0x05), (47, 8, 0x0A),
    (48, 8, 0x0B), (49, 8, 0x52), (50, 8, 0x53), (51, 8, 0x54),
    (52, 8, 0x55), (53, 8, 0x24), (54, 8, 0x25), (55, 8, 0x58),
    (56, 8, 0x59), (57, 8, 0x5A), (58, 8, 0x5B), (59, 8, 0x4A),
    (60, 8, 0x4B), (61, 8, 0x32), (62, 8, 0x33), (63, 8, 0x34),
];

#[rustfmt::skip]
static WHITE_MAKEUP: [(u16, u8, u16); 27] = [
    (64, 5, 0x1B), (128, 5, 0x12), (192, 6, 0x17), (256, 7, 0x37),
    (320, 8, 0x36), (384, 8, 0x37), (448, 8, 0x64), (512, 8, 0x65),
    (576, 8, 0x68), (640, 8, 0x67), (704, 9, 0xCC), (768, 9, 0xCD),
    (832, 9, 0xD2), (896, 9, 0xD3), (960, 9, 0xD4), (1024, 9, 0xD5),
    (1088, 9, 0xD6), (1152, 9, 0xD7), (1216, 9, 0xD8), (1280, 9, 0xD9),
    (1344, 9, 0xDA), (1408, 9, 0xDB), (1472, 9, 0x98), (1536, 9, 0x99),
    (1600, 9, 0x9A), (1664, 6, 0x18), (1728, 9, 0x9B),
];

#[rustfmt::skip]
static BLACK_TERMINATING: [(u16, u8, u16); 64] = [
    (0, 10, 0x37), (1, 3, 0x02), (2, 2, 0x03), (3, 2, 0x02),
    (4, 3, 0x03), (5, 4, 0x03), (6, 4, 0x02), (7, 5, 0x03),
    (8, 6, 0x05), (9, 6, 0x04), (10, 7, 0x04), (11, 7, 0x05),
    (12, 7, 0x07), (13, 8, 0x04), (14, 8, 0x07), (15, 9, 0x18),
    (16, 10, 0x17), (17, 10, 0x18), (18, 10, 0x08), (19, 11, 0x67),
    (20, 11, 0x68), (21, 11, 0x6C), (22, 11, 0x37), (23, 11, 0x28),
    (24, 11, 0x17), (25, 11, 0x18), (26, 12, 0xCA), (27, 12, 0xCB),
    (28, 12, 0xCC), (29, 12, 0xCD), (30, 12, 0x68), (31, 12, 0x69),
    (32, 12, 0x6A), (33, 12, 0x6B), (34, 12, 0xD2), (35, 12, 0xD3),
    (36, 12, 0xD4), (37, 12, 0xD5), (38, 12, 0xD6), (39, 12, 0xD7),
    (40, 12, 0x6C), (41, 12, 0x6D), (42, 12, 0xDA), (43, 12, 0xDB),
    (44, 12, 0x54), (45, 12, 0x55), (46, 12, 0x56), (47, 12, 0x57),
    (48, 12, 0x64), (49, 12, 0x65), (50, 12, 0x52), (51, 12, 0x53),
    (52, 12, 0x24), (53, 12, 0x37), (54, 12, 0x38), (55, 12, 0x27),
    (56, 12, 0x28), (57, 12, 0x58), (58, 12, 0x59), (59, 12, 0x2B),
    (60, 12, 0x2C), (61, 12, 0x5A), (62, 12, 0x66), (63, 12, 0x67),
];

#[rustfmt::skip]
static BLACK_MAKEUP: [(u16, u8, u16); 27] = [
    (64, 10, 0x0F), (128, 12, 0xC8), (192, 12, 0xC9), (256, 12, 0x5B),
    (320, 12, 0x33), (384, 12, 0x34), (448, 12, 0x35), (512, 13, 0x6C),
    (576, 13, 0x6D), (640, 13, 0x4A), (704, 13, 0x4B), (768, 13, 0x4C),
    (832, 13, 0x4D), (896, 13, 0x72), (960, 13, 0x73), (1024, 13, 0x74),
    (1088, 13, 0x75), (1152, 13, 0x76), (1216, 13, 0x77), (1280, 13, 0x52),
    (1344, 13, 0x53), (1408, 13, 0x54), (1472, 13, 0x55), (1536, 13, 0x5A),
    (1600, 13, 0x5B), (1664, 13, 0x64), (1728, 13, 0x65),
];

/// Extended makeup codes shared by both colors.
#[rustfmt::skip]
static EXTENDED_MAKEUP: [(u16, u8, u16); 13] = [
    (1792, 11, 0x08), (1856, 11, 0x0C), (1920, 11, 0x0D), (1984, 12, 0x12),
    (2048, 12, 0x13), (2112, 12, 0x14), (2176, 12, 0x15), (2240, 12, 0x16),
    (2304, 12, 0x17), (2368, 12, 0x1C), (2432, 12, 0x1D), (2496, 12, 0x1E),
    (2560, 12, 0x1F),
];

const EOL_BITS: u8 = 12;
const EOL_CODE: u32 = 0x001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Black,
}

impl Color {
    fn flip(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

//
// Bit-level I/O, MSB first.
//

struct BitWriter {
    bytes: Vec<u8>,
    /// Bits pending in `acc`, at most 7 after a flush.
    acc: u32,
    acc_len: u32,
}

impl BitWriter {
    fn new() -> BitWriter {
        BitWriter {
            bytes: Vec::new(),
            acc: 0,
            acc_len: 0,
        }
    }

    fn write_bits(&mut self, code: u32, len: u8) {
        self.acc = (self.acc << len) | (code & ((1u32 << len) - 1));
        self.acc_len += len as u32;
        while self.acc_len >= 8 {
            self.acc_len -= 8;
            self.bytes.push((self.acc >> self.acc_len) as u8);
        }
    }

    /// Total bits written so far, counting pending ones.
    fn bit_position(&self) -> usize {
        self.bytes.len() * 8 + self.acc_len as usize
    }

    fn align_byte(&mut self) {
        if self.acc_len > 0 {
            let pad = 8 - self.acc_len;
            self.write_bits(0, pad as u8);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        self.align_byte();
        self.bytes
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    /// Next bit to read, counted from the stream start.
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> BitReader<'a> {
        BitReader { data, position: 0 }
    }

    fn bits_left(&self) -> usize {
        self.data.len() * 8 - self.position
    }

    /// Next `len` bits without consuming; missing bits read as zero.
    fn peek(&self, len: u8) -> u32 {
        let mut out = 0u32;
        for i in 0..len as usize {
            let at = self.position + i;
            let bit = if at < self.data.len() * 8 {
                (self.data[at / 8] >> (7 - at % 8)) & 1
            } else {
                0
            };
            out = (out << 1) | bit as u32;
        }
        out
    }

    fn consume(&mut self, len: u8) {
        self.position = (self.position + len as usize).min(self.data.len() * 8);
    }

    fn align_byte(&mut self) {
        self.position = (self.position + 7) / 8 * 8;
    }

    /// Consumes zero fill bits followed by an EOL code, if present.
    fn try_consume_eol(&mut self) -> bool {
        let mut probe = self.position;
        let total = self.data.len() * 8;
        let mut zeros = 0usize;
        while probe < total {
            let bit = (self.data[probe / 8] >> (7 - probe % 8)) & 1;
            if bit == 1 {
                if zeros >= (EOL_BITS - 1) as usize {
                    self.position = probe + 1;
                    return true;
                }
                return false;
            }
            zeros += 1;
            probe += 1;
        }
        false
    }
}

fn constraint(scheme: Scheme, reason: &'static str) -> TiffError {
    TiffError::UnsupportedError(TiffUnsupportedError::CodecConstraint {
        scheme: scheme.compression(),
        reason,
    })
}

fn corrupt(detail: &str) -> TiffError {
    TiffError::FormatError(TiffFormatError::Format(format!(
        "CCITT stream corrupted: {detail}"
    )))
}

fn check_shape(scheme: Scheme, options: &CodecOptions) -> TiffResult<()> {
    if options.channels != 1 {
        return Err(constraint(scheme, "requires exactly one channel"));
    }
    if options.bits_per_sample != 1 {
        return Err(constraint(scheme, "requires one bit per sample"));
    }
    match scheme {
        Scheme::T4 if options.t4_options & t4_options::UNCOMPRESSED != 0 => Err(
            TiffError::UnsupportedError(TiffUnsupportedError::CcittUncompressedMode),
        ),
        Scheme::T6 if options.t6_options & t6_options::UNCOMPRESSED != 0 => Err(
            TiffError::UnsupportedError(TiffUnsupportedError::CcittUncompressedMode),
        ),
        _ => Ok(()),
    }
}

//
// Row <-> changing-element conversions.
//

/// Positions where the pixel color changes, scanning left to right with an
/// implied white pixel before the row. Transitions alternate white->black,
/// black->white, ...
fn row_transitions(row: &[u8], width: usize) -> Vec<usize> {
    let mut transitions = Vec::new();
    let mut color = Color::White;
    for x in 0..width {
        let bit = (row[x / 8] >> (7 - x % 8)) & 1;
        let pixel = if bit == 1 { Color::Black } else { Color::White };
        if pixel != color {
            transitions.push(x);
            color = pixel;
        }
    }
    transitions
}

fn transitions_to_row(transitions: &[usize], width: usize, row: &mut [u8]) {
    row.fill(0);
    let mut color = Color::White;
    let mut x = 0usize;
    for &t in transitions.iter().chain(std::iter::once(&width)) {
        let end = t.min(width);
        if color == Color::Black {
            for px in x..end {
                row[px / 8] |= 0x80 >> (px % 8);
            }
        }
        x = end;
        color = color.flip();
        if x >= width {
            break;
        }
    }
}

//
// Run length coding shared by the 1-D schemes and horizontal mode.
//

fn encode_run(out: &mut BitWriter, color: Color, mut run: usize) {
    let (terminating, makeup): (&[(u16, u8, u16)], &[(u16, u8, u16)]) = match color {
        Color::White => (&WHITE_TERMINATING, &WHITE_MAKEUP),
        Color::Black => (&BLACK_TERMINATING, &BLACK_MAKEUP),
    };
    // Repeat the largest extended makeup while the run exceeds what one
    // makeup/terminating pair can express.
    while run > 2560 + 63 {
        let (_, bits, code) = EXTENDED_MAKEUP[EXTENDED_MAKEUP.len() - 1];
        out.write_bits(code as u32, bits);
        run -= 2560;
    }
    if run >= 64 {
        let span = (run / 64) * 64;
        let entry = if span >= 1792 {
            EXTENDED_MAKEUP[(span - 1792) / 64]
        } else {
            makeup[span / 64 - 1]
        };
        out.write_bits(entry.2 as u32, entry.1);
        run -= span as usize;
    }
    let (_, bits, code) = terminating[run];
    out.write_bits(code as u32, bits);
}

enum RunToken {
    Run(usize),
    Eol,
}

/// Decodes one complete run (makeup chain plus terminating code).
fn decode_run(reader: &mut BitReader, color: Color) -> TiffResult<RunToken> {
    let (terminating, makeup): (&[(u16, u8, u16)], &[(u16, u8, u16)]) = match color {
        Color::White => (&WHITE_TERMINATING, &WHITE_MAKEUP),
        Color::Black => (&BLACK_TERMINATING, &BLACK_MAKEUP),
    };
    let mut total = 0usize;
    loop {
        let mut matched = None;
        'lengths: for len in 1..=13u8 {
            let code = reader.peek(len) as u16;
            for &(run, bits, table_code) in terminating
                .iter()
                .chain(makeup.iter())
                .chain(EXTENDED_MAKEUP.iter())
            {
                if bits == len && table_code == code {
                    matched = Some((run, bits));
                    break 'lengths;
                }
            }
            if len == EOL_BITS && reader.peek(EOL_BITS) as u32 == EOL_CODE {
                reader.consume(EOL_BITS);
                return Ok(RunToken::Eol);
            }
        }
        let Some((run, bits)) = matched else {
            if reader.bits_left() < 13 {
                return Err(corrupt("truncated run code"));
            }
            if reader.try_consume_eol() {
                return Ok(RunToken::Eol);
            }
            return Err(corrupt("unrecognized run code"));
        };
        reader.consume(bits);
        total += run as usize;
        if run < 64 {
            return Ok(RunToken::Run(total));
        }
    }
}

fn encode_row_1d(out: &mut BitWriter, transitions: &[usize], width: usize) {
    let mut color = Color::White;
    let mut position = 0usize;
    for &t in transitions.iter().chain(std::iter::once(&width)) {
        encode_run(out, color, t - position);
        position = t;
        color = color.flip();
        if position >= width {
            break;
        }
    }
    if position < width {
        encode_run(out, color, width - position);
    }
}

fn decode_row_1d(reader: &mut BitReader, width: usize) -> TiffResult<Vec<usize>> {
    let mut transitions = Vec::new();
    let mut color = Color::White;
    let mut position = 0usize;
    while position < width {
        if transitions.len() > width + 1 {
            return Err(corrupt("row does not terminate"));
        }
        match decode_run(reader, color)? {
            RunToken::Run(run) => {
                position += run;
                if position < width {
                    transitions.push(position);
                } else if position > width {
                    return Err(corrupt("run overshoots the row"));
                }
                color = color.flip();
            }
            // A premature EOL ends the row; the remainder stays white.
            RunToken::Eol => break,
        }
    }
    Ok(transitions)
}

//
// Two-dimensional (READ/VERTICAL/PASS/HORIZONTAL) coding.
//

/// `b1` and `b2` for the current `a0`/color against the reference row.
fn reference_pair(reference: &[usize], a0: isize, color: Color, width: usize) -> (usize, usize) {
    // b1 is the first reference transition right of a0 changing away from
    // `color`; with the white-first alternation that is an even index for
    // white, odd for black.
    let wanted_parity = match color {
        Color::White => 0,
        Color::Black => 1,
    };
    let mut b1 = width;
    let mut b2 = width;
    for (i, &t) in reference.iter().enumerate() {
        if (t as isize) > a0 && i % 2 == wanted_parity {
            b1 = t;
            b2 = reference.get(i + 1).copied().unwrap_or(width).min(width);
            break;
        }
    }
    (b1.min(width), b2)
}

fn encode_row_2d(
    out: &mut BitWriter,
    current: &[usize],
    reference: &[usize],
    width: usize,
) {
    let mut a0: isize = -1;
    let mut color = Color::White;
    let mut current_index = 0usize;
    loop {
        let a1 = current.get(current_index).copied().unwrap_or(width);
        let (b1, b2) = reference_pair(reference, a0, color, width);
        if b2 < a1 {
            // Pass mode.
            out.write_bits(0b0001, 4);
            a0 = b2 as isize;
            continue;
        }
        let delta = a1 as isize - b1 as isize;
        if (-3..=3).contains(&delta) {
            // Vertical mode.
            match delta {
                0 => out.write_bits(0b1, 1),
                1 => out.write_bits(0b011, 3),
                2 => out.write_bits(0b000011, 6),
                3 => out.write_bits(0b0000011, 7),
                -1 => out.write_bits(0b010, 3),
                -2 => out.write_bits(0b000010, 6),
                _ => out.write_bits(0b0000010, 7),
            }
            a0 = a1 as isize;
            color = color.flip();
            current_index += 1;
        } else {
            // Horizontal mode: two runs, color unchanged afterwards.
            let a2 = current.get(current_index + 1).copied().unwrap_or(width);
            let from = if a0 < 0 { 0 } else { a0 as usize };
            out.write_bits(0b001, 3);
            encode_run(out, color, a1 - from);
            encode_run(out, color.flip(), a2 - a1);
            a0 = a2 as isize;
            current_index += 2;
        }
        if a0 >= width as isize {
            break;
        }
    }
}

enum Mode {
    Pass,
    Horizontal,
    Vertical(i8),
    EolOrEofb,
}

fn read_mode(reader: &mut BitReader) -> TiffResult<Mode> {
    if reader.peek(1) == 0b1 {
        reader.consume(1);
        return Ok(Mode::Vertical(0));
    }
    match reader.peek(3) {
        0b011 => {
            reader.consume(3);
            return Ok(Mode::Vertical(1));
        }
        0b010 => {
            reader.consume(3);
            return Ok(Mode::Vertical(-1));
        }
        0b001 => {
            reader.consume(3);
            return Ok(Mode::Horizontal);
        }
        _ => {}
    }
    if reader.peek(4) == 0b0001 {
        reader.consume(4);
        return Ok(Mode::Pass);
    }
    match reader.peek(6) {
        0b000011 => {
            reader.consume(6);
            return Ok(Mode::Vertical(2));
        }
        0b000010 => {
            reader.consume(6);
            return Ok(Mode::Vertical(-2));
        }
        _ => {}
    }
    match reader.peek(7) {
        0b0000011 => {
            reader.consume(7);
            return Ok(Mode::Vertical(3));
        }
        0b0000010 => {
            reader.consume(7);
            return Ok(Mode::Vertical(-3));
        }
        0b0000001 => {
            return Err(TiffError::UnsupportedError(
                TiffUnsupportedError::CcittUncompressedMode,
            ))
        }
        _ => {}
    }
    Ok(Mode::EolOrEofb)
}

fn decode_row_2d(
    reader: &mut BitReader,
    reference: &[usize],
    width: usize,
) -> TiffResult<Vec<usize>> {
    let mut transitions = Vec::new();
    let mut a0: isize = -1;
    let mut color = Color::White;
    let mut steps = 0usize;
    while a0 < width as isize {
        steps += 1;
        if steps > 2 * width + 16 {
            return Err(corrupt("row does not terminate"));
        }
        match read_mode(reader)? {
            Mode::Pass => {
                let (_, b2) = reference_pair(reference, a0, color, width);
                a0 = b2 as isize;
            }
            Mode::Vertical(delta) => {
                let (b1, _) = reference_pair(reference, a0, color, width);
                let a1 = (b1 as isize + delta as isize).clamp(0, width as isize) as usize;
                if a1 < width {
                    transitions.push(a1);
                }
                a0 = a1 as isize;
                color = color.flip();
            }
            Mode::Horizontal => {
                let from = if a0 < 0 { 0 } else { a0 as usize };
                let RunToken::Run(run1) = decode_run(reader, color)? else {
                    return Err(corrupt("EOL inside horizontal mode"));
                };
                let RunToken::Run(run2) = decode_run(reader, color.flip())? else {
                    return Err(corrupt("EOL inside horizontal mode"));
                };
                let first = (from + run1).min(width);
                let second = (first + run2).min(width);
                if first < width {
                    transitions.push(first);
                }
                if second < width {
                    transitions.push(second);
                }
                a0 = second as isize;
            }
            Mode::EolOrEofb => {
                if reader.try_consume_eol() || reader.bits_left() == 0 {
                    break;
                }
                return Err(corrupt("unrecognized 2-D mode code"));
            }
        }
        if a0 >= width as isize {
            break;
        }
    }
    // Transitions must stay strictly increasing even on damaged input.
    transitions.dedup();
    Ok(transitions)
}

//
// Public entry points.
//

pub fn encode(scheme: Scheme, data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
    check_shape(scheme, options)?;
    let width = options.width as usize;
    let height = options.height as usize;
    let row_bytes = width.div_ceil(8);
    if data.len() < row_bytes * height {
        return Err(TiffError::FormatError(
            TiffFormatError::InconsistentSizesEncountered,
        ));
    }

    let two_dimensional =
        scheme == Scheme::T6 || options.t4_options & t4_options::TWO_DIMENSIONAL != 0;
    let fill_to_byte = options.t4_options & t4_options::FILL_BITS != 0;

    let mut out = BitWriter::new();
    // The reference row for the first T.6 row is imaginary all-white.
    let mut reference: Vec<usize> = Vec::new();
    for y in 0..height {
        let row = &data[y * row_bytes..][..row_bytes];
        let transitions = row_transitions(row, width);
        match scheme {
            Scheme::ModifiedHuffman => {
                encode_row_1d(&mut out, &transitions, width);
                out.align_byte();
            }
            Scheme::T4 => {
                if fill_to_byte {
                    // Zero fill so the EOL (and its tag bit) ends on a byte
                    // boundary.
                    let tag_bits = if two_dimensional { 1 } else { 0 };
                    let used = (out.bit_position() + EOL_BITS as usize + tag_bits) % 8;
                    if used != 0 {
                        out.write_bits(0, (8 - used) as u8);
                    }
                }
                out.write_bits(EOL_CODE, EOL_BITS);
                if two_dimensional {
                    // Tag bit: 1 = the next row is 1-D coded.
                    let one_dimensional_row = y == 0;
                    out.write_bits(u32::from(one_dimensional_row), 1);
                    if one_dimensional_row {
                        encode_row_1d(&mut out, &transitions, width);
                    } else {
                        encode_row_2d(&mut out, &transitions, &reference, width);
                    }
                } else {
                    encode_row_1d(&mut out, &transitions, width);
                }
            }
            Scheme::T6 => {
                encode_row_2d(&mut out, &transitions, &reference, width);
            }
        }
        reference = transitions;
    }
    if scheme == Scheme::T6 {
        // EOFB.
        out.write_bits(EOL_CODE, EOL_BITS);
        out.write_bits(EOL_CODE, EOL_BITS);
    }
    Ok(out.finish())
}

pub fn decode(scheme: Scheme, data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
    check_shape(scheme, options)?;
    let width = options.width as usize;
    let height = options.height as usize;
    let row_bytes = width.div_ceil(8);
    let decoded_len = row_bytes * height;
    if decoded_len > options.max_decoded_size {
        return Err(TiffError::LimitsExceeded);
    }

    let two_dimensional =
        scheme == Scheme::T6 || options.t4_options & t4_options::TWO_DIMENSIONAL != 0;

    let mut reader = BitReader::new(data);
    let mut out = vec![0u8; decoded_len];
    let mut reference: Vec<usize> = Vec::new();
    for y in 0..height {
        if reader.bits_left() == 0 {
            // Truncated streams leave the remaining rows white.
            break;
        }
        let transitions = match scheme {
            Scheme::ModifiedHuffman => {
                let t = decode_row_1d(&mut reader, width)?;
                reader.align_byte();
                t
            }
            Scheme::T4 => {
                reader.try_consume_eol();
                if reader.bits_left() == 0 {
                    break;
                }
                if two_dimensional {
                    let one_dimensional_row = reader.peek(1) == 1;
                    reader.consume(1);
                    if one_dimensional_row {
                        decode_row_1d(&mut reader, width)?
                    } else {
                        decode_row_2d(&mut reader, &reference, width)?
                    }
                } else {
                    decode_row_1d(&mut reader, width)?
                }
            }
            Scheme::T6 => {
                if reader.peek(EOL_BITS) == EOL_CODE {
                    // EOFB reached before the declared height.
                    break;
                }
                decode_row_2d(&mut reader, &reference, width)?
            }
        };
        transitions_to_row(&transitions, width, &mut out[y * row_bytes..][..row_bytes]);
        reference = transitions;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(width: u32, height: u32) -> CodecOptions {
        CodecOptions::builder(width, height)
            .channels(1)
            .bits_per_sample(1)
            .build()
    }

    fn opts_2d(width: u32, height: u32) -> CodecOptions {
        CodecOptions::builder(width, height)
            .channels(1)
            .bits_per_sample(1)
            .t4_options(t4_options::TWO_DIMENSIONAL)
            .build()
    }

    /// A deterministic test bitmap with runs of varying lengths.
    fn checker(width: usize, height: usize, seed: u32) -> Vec<u8> {
        let row_bytes = width.div_ceil(8);
        let mut out = vec![0u8; row_bytes * height];
        let mut state = seed | 1;
        for y in 0..height {
            let mut x = 0usize;
            let mut black = false;
            while x < width {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let run = 1 + (state % 23) as usize;
                if black {
                    for px in x..(x + run).min(width) {
                        out[y * row_bytes + px / 8] |= 0x80 >> (px % 8);
                    }
                }
                x += run;
                black = !black;
            }
        }
        out
    }

    #[test]
    fn mh_known_rows() {
        // All-white 8 pixel row: white run 8 = 10011, padded -> 0x98.
        let encoded = encode(Scheme::ModifiedHuffman, &[0x00], &opts(8, 1)).unwrap();
        assert_eq!(encoded, vec![0x98]);
        // All-black 8 pixel row: white 0 (00110101) + black 8 (000101).
        let encoded = encode(Scheme::ModifiedHuffman, &[0xFF], &opts(8, 1)).unwrap();
        assert_eq!(encoded, vec![0x35, 0x14]);
    }

    #[test]
    fn mh_round_trip() {
        for (w, h) in [(8usize, 1usize), (64, 16), (100, 7), (1728, 4)] {
            let data = checker(w, h, 0xBEEF + w as u32);
            let options = opts(w as u32, h as u32);
            let encoded = encode(Scheme::ModifiedHuffman, &data, &options).unwrap();
            assert_eq!(decode(Scheme::ModifiedHuffman, &encoded, &options).unwrap(), data);
        }
    }

    #[test]
    fn t4_one_dimensional_round_trip() {
        let data = checker(200, 12, 0x1234);
        let options = opts(200, 12);
        let encoded = encode(Scheme::T4, &data, &options).unwrap();
        // Stream starts with an EOL.
        assert_eq!(encoded[0], 0x00);
        assert_eq!(decode(Scheme::T4, &encoded, &options).unwrap(), data);
    }

    #[test]
    fn t4_two_dimensional_round_trip() {
        let data = checker(320, 20, 0x77);
        let options = opts_2d(320, 20);
        let encoded = encode(Scheme::T4, &data, &options).unwrap();
        assert_eq!(decode(Scheme::T4, &encoded, &options).unwrap(), data);
    }

    #[test]
    fn t4_fill_bits_align_eols() {
        let data = checker(129, 9, 0x5150);
        let options = CodecOptions::builder(129, 9)
            .channels(1)
            .bits_per_sample(1)
            .t4_options(t4_options::FILL_BITS)
            .build();
        let encoded = encode(Scheme::T4, &data, &options).unwrap();
        assert_eq!(decode(Scheme::T4, &encoded, &options).unwrap(), data);
    }

    #[test]
    fn t6_round_trip() {
        for (w, h) in [(16usize, 4usize), (64, 64), (211, 33), (1728, 8)] {
            let data = checker(w, h, 0xACE1 ^ w as u32);
            let options = opts(w as u32, h as u32);
            let encoded = encode(Scheme::T6, &data, &options).unwrap();
            assert_eq!(decode(Scheme::T6, &encoded, &options).unwrap(), data, "{w}x{h}");
        }
    }

    #[test]
    fn t6_solid_colors() {
        let white = vec![0u8; 16 * 4];
        let options = opts(128, 4);
        let encoded = encode(Scheme::T6, &white, &options).unwrap();
        assert_eq!(decode(Scheme::T6, &encoded, &options).unwrap(), white);

        let black = vec![0xFFu8; 16 * 4];
        let encoded = encode(Scheme::T6, &black, &options).unwrap();
        assert_eq!(decode(Scheme::T6, &encoded, &options).unwrap(), black);
    }

    #[test]
    fn long_runs_use_extended_makeups() {
        // A single row wider than 2623 pixels, mostly white.
        let width = 4000usize;
        let mut data = vec![0u8; width.div_ceil(8)];
        data[490] = 0xFF; // a few black pixels near the end
        let options = opts(width as u32, 1);
        let encoded = encode(Scheme::ModifiedHuffman, &data, &options).unwrap();
        assert_eq!(decode(Scheme::ModifiedHuffman, &encoded, &options).unwrap(), data);
    }

    #[test]
    fn uncompressed_mode_is_rejected() {
        let options = CodecOptions::builder(8, 1)
            .channels(1)
            .bits_per_sample(1)
            .t4_options(t4_options::UNCOMPRESSED)
            .build();
        assert!(matches!(
            encode(Scheme::T4, &[0u8], &options).unwrap_err(),
            TiffError::UnsupportedError(TiffUnsupportedError::CcittUncompressedMode)
        ));
        let options = CodecOptions::builder(8, 1)
            .channels(1)
            .bits_per_sample(1)
            .t6_options(t6_options::UNCOMPRESSED)
            .build();
        assert!(decode(Scheme::T6, &[0u8], &options).is_err());
    }

    #[test]
    fn multichannel_input_is_rejected() {
        let options = CodecOptions::builder(8, 1).channels(3).bits_per_sample(1).build();
        assert!(encode(Scheme::T6, &[0u8; 3], &options).is_err());
        let options = CodecOptions::builder(8, 1).channels(1).bits_per_sample(8).build();
        assert!(encode(Scheme::ModifiedHuffman, &[0u8; 8], &options).is_err());
    }
}
