//! PackBits byte-level run length coding (compression 32773).

use crate::codec::CodecOptions;
use crate::error::TiffResult;

/// Longest run or literal block one header byte can describe.
const MAX_BLOCK: usize = 128;

/// Compresses with the TIFF PackBits scheme.
///
/// Maximal runs of two or more identical bytes become one repeat block, the
/// stretches between them become literal blocks. The ambiguous `-128`
/// header is never emitted.
pub fn encode(data: &[u8], _options: &CodecOptions) -> TiffResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2 + 8);
    let mut i = 0;
    while i < data.len() {
        // Measure the run starting here.
        let mut run = 1;
        while i + run < data.len() && data[i + run] == data[i] && run < MAX_BLOCK {
            run += 1;
        }
        if run >= 2 {
            out.push((1i8 - run as i8) as u8);
            out.push(data[i]);
            i += run;
            continue;
        }
        // Literal stretch: up to the next run of at least two bytes.
        let start = i;
        i += 1;
        while i < data.len() && i - start < MAX_BLOCK {
            if i + 1 < data.len() && data[i + 1] == data[i] {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&data[start..i]);
    }
    Ok(out)
}

/// Decompresses PackBits data.
///
/// Invalid blocks (headers with no data behind them) are skipped without
/// failing; output is capped at the declared decoded size.
pub fn decode(data: &[u8], options: &CodecOptions) -> TiffResult<Vec<u8>> {
    let limit = options.max_decoded_size;
    let mut out = Vec::with_capacity(options.decoded_len().min(limit));
    let mut i = 0;
    while i < data.len() && out.len() < limit {
        let header = data[i] as i8;
        i += 1;
        if header == -128 {
            // No-op filler byte.
            continue;
        }
        if header >= 0 {
            let count = header as usize + 1;
            let available = data.len().saturating_sub(i).min(count);
            let take = available.min(limit - out.len());
            out.extend_from_slice(&data[i..i + take]);
            i += available;
        } else {
            let count = 1 - header as isize;
            let Some(&value) = data.get(i) else {
                break;
            };
            i += 1;
            let take = (count as usize).min(limit - out.len());
            out.extend(std::iter::repeat(value).take(take));
        }
    }
    Ok(out)
}
