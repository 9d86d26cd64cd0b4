//! The planar channel buffer handed across the reading and writing APIs.

use crate::codec::interleave;
use crate::error::{TiffError, TiffResult, UsageError};
use crate::SampleType;

/// A planar (channel-major) pixel buffer: `channels` planes of `height` rows,
/// each row padded to a whole number of bytes.
///
/// This is the shape the tile pipeline produces and consumes; turning it into
/// an application bitmap is the business of the layer above this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBuffer {
    width: u32,
    height: u32,
    channels: u16,
    sample_type: SampleType,
    data: Vec<u8>,
}

impl ChannelBuffer {
    /// An all-`filler` buffer of the given shape.
    pub fn new_filled(
        width: u32,
        height: u32,
        channels: u16,
        sample_type: SampleType,
        filler: u8,
    ) -> ChannelBuffer {
        let len = Self::plane_len(width, height, sample_type) * channels as usize;
        ChannelBuffer {
            width,
            height,
            channels,
            sample_type,
            data: vec![filler; len],
        }
    }

    /// Wraps existing channel-major bytes; the length must match the shape.
    pub fn from_planar(
        width: u32,
        height: u32,
        channels: u16,
        sample_type: SampleType,
        data: Vec<u8>,
    ) -> TiffResult<ChannelBuffer> {
        let expected = Self::plane_len(width, height, sample_type) * channels as usize;
        if data.len() != expected {
            return Err(TiffError::FormatError(
                crate::error::TiffFormatError::InconsistentSizesEncountered,
            ));
        }
        Ok(ChannelBuffer {
            width,
            height,
            channels,
            sample_type,
            data,
        })
    }

    /// Builds a planar buffer from pixel-major (interleaved) bytes.
    pub fn from_interleaved(
        width: u32,
        height: u32,
        channels: u16,
        sample_type: SampleType,
        data: &[u8],
    ) -> TiffResult<ChannelBuffer> {
        let Some(bytes_per_sample) = sample_type.byte_width() else {
            return Err(TiffError::UsageError(UsageError::SubByteSamplesNotInterleavable));
        };
        let planar = interleave::separate(
            data,
            channels as usize,
            bytes_per_sample as usize,
            (width as usize) * (height as usize),
        )?;
        Self::from_planar(width, height, channels, sample_type, planar)
    }

    /// Bytes one channel plane occupies.
    fn plane_len(width: u32, height: u32, sample_type: SampleType) -> usize {
        Self::row_stride_for(width, sample_type) * height as usize
    }

    fn row_stride_for(width: u32, sample_type: SampleType) -> usize {
        match sample_type.byte_width() {
            Some(b) => width as usize * b as usize,
            // Bit samples: rows are padded to byte boundaries.
            None => (width as usize).div_ceil(8),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Bytes per row of one channel plane.
    pub fn row_stride(&self) -> usize {
        Self::row_stride_for(self.width, self.sample_type)
    }

    pub fn plane_bytes(&self) -> usize {
        Self::plane_len(self.width, self.height, self.sample_type)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn channel(&self, channel: u16) -> &[u8] {
        let plane = self.plane_bytes();
        &self.data[channel as usize * plane..][..plane]
    }

    pub fn channel_mut(&mut self, channel: u16) -> &mut [u8] {
        let plane = self.plane_bytes();
        &mut self.data[channel as usize * plane..][..plane]
    }

    /// One row of one channel plane.
    pub fn row(&self, channel: u16, y: u32) -> &[u8] {
        let stride = self.row_stride();
        &self.channel(channel)[y as usize * stride..][..stride]
    }

    pub fn row_mut(&mut self, channel: u16, y: u32) -> &mut [u8] {
        let stride = self.row_stride();
        let plane = self.plane_bytes();
        let start = channel as usize * plane + y as usize * stride;
        &mut self.data[start..][..stride]
    }

    /// Pixel-major bytes; only byte-aligned sample types can interleave.
    pub fn interleaved(&self) -> TiffResult<Vec<u8>> {
        let Some(bytes_per_sample) = self.sample_type.byte_width() else {
            return Err(TiffError::UsageError(UsageError::SubByteSamplesNotInterleavable));
        };
        interleave::interleave(
            &self.data,
            self.channels as usize,
            bytes_per_sample as usize,
            (self.width as usize) * (self.height as usize),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_addressing() {
        let mut buf = ChannelBuffer::new_filled(4, 2, 3, SampleType::U8, 0);
        buf.channel_mut(1).fill(7);
        buf.row_mut(2, 1).fill(9);
        assert_eq!(buf.channel(0), &[0; 8]);
        assert_eq!(buf.channel(1), &[7; 8]);
        assert_eq!(buf.row(2, 0), &[0; 4]);
        assert_eq!(buf.row(2, 1), &[9; 4]);
    }

    #[test]
    fn bit_rows_are_byte_padded() {
        let buf = ChannelBuffer::new_filled(10, 3, 1, SampleType::Bit, 0);
        assert_eq!(buf.row_stride(), 2);
        assert_eq!(buf.plane_bytes(), 6);
    }

    #[test]
    fn interleave_round_trip() {
        let interleaved: Vec<u8> = (0..24).collect();
        let buf = ChannelBuffer::from_interleaved(4, 2, 3, SampleType::U8, &interleaved).unwrap();
        assert_eq!(buf.interleaved().unwrap(), interleaved);
        // Channel 0 holds every third byte.
        assert_eq!(buf.channel(0), &[0, 3, 6, 9, 12, 15, 18, 21]);
    }
}
