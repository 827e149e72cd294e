// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `stream` module defines the serialised forms: the frame header that fronts a compressed
//! file, the per-coder stream headers, and the progressive-portion tools.
//!
//! All multi-byte fields are little-endian. The frame header is:
//!
//! | Offset | Bytes | Field                                                  |
//! |--------|-------|--------------------------------------------------------|
//! | 0      | 1     | major version                                          |
//! | 1      | 1     | flags: is_portion, is_3d, is_float, multi_chunk,       |
//! |        |       | zstd_applied, qz_mode, reserved, reserved              |
//! | 2      | 12    | volume dims, u32 x 3                                   |
//! | 14     | 6     | chunk dims, u16 x 3 (only when multi_chunk)            |
//! | ...    | 4 * N | compressed byte length per chunk, u32                  |

use undula_core::errors::{decode_error, invalid_param_error, Error, Result};
use undula_core::io::{pack_8_booleans, unpack_8_booleans, ByteReader};

use crate::volume::chunk_volume;

/// Major version of the frame format. A reader rejects any other value.
pub const FORMAT_VERSION_MAJOR: u8 = 1;

/// Frame header length up to the chunk length table.
pub const HEADER_MAGIC_1CHUNK: usize = 14;
pub const HEADER_MAGIC_NCHUNK: usize = 20;

/// Never truncate a chunk below this many bytes when producing a portion stream.
const PROGRESSIVE_MIN_CHUNK_BYTES: usize = 64;

pub(crate) const SPECK_HEADER_SIZE: usize = 22;
pub(crate) const SPECK_HEADER_SIZE_QZ: usize = 30;
pub(crate) const SPERR_HEADER_SIZE: usize = 20;

/// Parsed frame header and the chunk layout derived from it.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    pub major_version: u8,
    pub is_portion: bool,
    pub is_3d: bool,
    pub is_float: bool,
    pub multi_chunk: bool,
    pub zstd_applied: bool,
    pub qz_mode: bool,
    pub vol_dims: [usize; 3],
    pub chunk_dims: [usize; 3],
    /// Total frame header length in bytes, including the chunk length table.
    pub header_len: usize,
    /// Per chunk: (absolute byte offset, byte length).
    pub chunk_offsets: Vec<(usize, usize)>,
}

impl StreamInfo {
    /// Parse the frame header at the front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<StreamInfo> {
        let mut reader = ByteReader::new(buf);

        let major_version = reader.read_u8()?;
        if major_version != FORMAT_VERSION_MAJOR {
            return Err(Error::VersionMismatch(major_version));
        }

        let flags = unpack_8_booleans(reader.read_u8()?);
        let (is_portion, is_3d, is_float, multi_chunk) = (flags[0], flags[1], flags[2], flags[3]);
        let (zstd_applied, qz_mode) = (flags[4], flags[5]);

        if zstd_applied {
            return Err(Error::ZstdMismatch);
        }

        let vol_dims = [
            reader.read_u32()? as usize,
            reader.read_u32()? as usize,
            reader.read_u32()? as usize,
        ];
        let chunk_dims = if multi_chunk {
            [
                reader.read_u16()? as usize,
                reader.read_u16()? as usize,
                reader.read_u16()? as usize,
            ]
        }
        else {
            vol_dims
        };

        if vol_dims.iter().any(|d| *d == 0) {
            return decode_error("frame header declares a zero dimension");
        }

        let chunks = chunk_volume(vol_dims, chunk_dims);
        let header_len = reader.pos() + chunks.len() * 4;

        let mut chunk_offsets = Vec::with_capacity(chunks.len());
        let mut offset = header_len;
        for _ in 0..chunks.len() {
            let len = reader.read_u32()? as usize;
            chunk_offsets.push((offset, len));
            offset += len;
        }

        Ok(StreamInfo {
            major_version,
            is_portion,
            is_3d,
            is_float,
            multi_chunk,
            zstd_applied,
            qz_mode,
            vol_dims,
            chunk_dims,
            header_len,
            chunk_offsets,
        })
    }

    /// Total length of the frame: header plus every chunk stream.
    pub fn stream_len(&self) -> usize {
        self.header_len + self.chunk_offsets.iter().map(|(_, len)| len).sum::<usize>()
    }

    /// Serialise a frame header for the given layout and per-chunk lengths.
    pub fn write_header(&self, chunk_lens: &[u32]) -> Vec<u8> {
        let magic =
            if self.multi_chunk { HEADER_MAGIC_NCHUNK } else { HEADER_MAGIC_1CHUNK };
        let mut out = Vec::with_capacity(magic + chunk_lens.len() * 4);

        out.push(self.major_version);
        let mut flags = [false; 8];
        flags[0] = self.is_portion;
        flags[1] = self.is_3d;
        flags[2] = self.is_float;
        flags[3] = self.multi_chunk;
        flags[4] = self.zstd_applied;
        flags[5] = self.qz_mode;
        out.push(pack_8_booleans(flags));

        for d in self.vol_dims {
            out.extend_from_slice(&(d as u32).to_le_bytes());
        }
        if self.multi_chunk {
            for d in self.chunk_dims {
                out.extend_from_slice(&(d as u16).to_le_bytes());
            }
        }
        for len in chunk_lens {
            out.extend_from_slice(&len.to_le_bytes());
        }

        out
    }
}

/// Build a *portion* stream: every chunk truncated to roughly `pct` percent of its bytes, the
/// length table rewritten, and the portion flag raised. `pct >= 100` returns the input frame
/// unchanged.
pub fn progressive_portion(frame: &[u8], pct: u32) -> Result<Vec<u8>> {
    if pct == 0 {
        return invalid_param_error("portion percentage must be nonzero");
    }

    let info = StreamInfo::parse(frame)?;
    if frame.len() < info.stream_len() {
        return decode_error("frame shorter than its header declares");
    }
    if pct >= 100 {
        return Ok(frame[..info.stream_len()].to_vec());
    }

    let new_lens: Vec<usize> = info
        .chunk_offsets
        .iter()
        .map(|&(_, len)| {
            if len > PROGRESSIVE_MIN_CHUNK_BYTES {
                let request = (len as f64 * f64::from(pct) / 100.0) as usize;
                request.max(PROGRESSIVE_MIN_CHUNK_BYTES)
            }
            else {
                len
            }
        })
        .collect();

    let mut portion = StreamInfo { is_portion: true, ..info.clone() };
    portion.chunk_offsets =
        new_lens.iter().scan(info.header_len, |acc, &len| {
            let entry = (*acc, len);
            *acc += len;
            Some(entry)
        }).collect();

    let lens_u32: Vec<u32> = new_lens.iter().map(|&l| l as u32).collect();
    let mut out = portion.write_header(&lens_u32);
    for (&(offset, _), &new_len) in info.chunk_offsets.iter().zip(new_lens.iter()) {
        out.extend_from_slice(&frame[offset..offset + new_len]);
    }

    Ok(out)
}

/// Header fields of one serialised SPECK stream.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SpeckHeader {
    pub dims: [usize; 3],
    pub image_mean: f64,
    pub max_coeff_bits: i16,
    /// Useful bit count; present only in QZ mode, where the stream must expose its own length.
    pub num_bits: Option<u64>,
}

pub(crate) fn write_speck_header(out: &mut Vec<u8>, header: &SpeckHeader) {
    for d in header.dims {
        out.extend_from_slice(&(d as u32).to_le_bytes());
    }
    out.extend_from_slice(&header.image_mean.to_le_bytes());
    out.extend_from_slice(&(header.max_coeff_bits as u16).to_le_bytes());
    if let Some(num_bits) = header.num_bits {
        out.extend_from_slice(&num_bits.to_le_bytes());
    }
}

pub(crate) fn parse_speck_header(buf: &[u8], qz_mode: bool) -> Result<SpeckHeader> {
    let mut reader = ByteReader::new(buf);
    let dims = [
        reader.read_u32()? as usize,
        reader.read_u32()? as usize,
        reader.read_u32()? as usize,
    ];
    let image_mean = reader.read_f64()?;
    let max_coeff_bits = reader.read_u16()? as i16;
    let num_bits = if qz_mode { Some(reader.read_u64()?) } else { None };
    Ok(SpeckHeader { dims, image_mean, max_coeff_bits, num_bits })
}

/// Byte length of the SPECK stream at the front of `buf`. In fixed-rate mode the stream runs to
/// the end of the chunk body; in QZ mode the header's bit count bounds it.
pub(crate) fn speck_stream_size(buf: &[u8], qz_mode: bool) -> Result<usize> {
    if !qz_mode {
        return Ok(buf.len());
    }
    let header = parse_speck_header(buf, true)?;
    let num_bits = header.num_bits.unwrap_or(0) as usize;
    Ok(SPECK_HEADER_SIZE_QZ + (num_bits + 7) / 8)
}

/// Byte length of the SPERR stream at the front of `buf`, from its bit-count field.
pub(crate) fn sperr_stream_size(buf: &[u8]) -> Result<usize> {
    let mut reader = ByteReader::new(buf);
    let _total_len = reader.read_u64()?;
    let _max_threshold = reader.read_f32()?;
    let num_bits = reader.read_u64()? as usize;
    Ok(SPERR_HEADER_SIZE + (num_bits + 7) / 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_header_roundtrip_single_chunk() {
        let info = StreamInfo {
            major_version: FORMAT_VERSION_MAJOR,
            is_portion: false,
            is_3d: true,
            is_float: true,
            multi_chunk: false,
            zstd_applied: false,
            qz_mode: true,
            vol_dims: [64, 64, 64],
            chunk_dims: [64, 64, 64],
            header_len: 0,
            chunk_offsets: Vec::new(),
        };
        let bytes = info.write_header(&[1000]);
        assert_eq!(bytes.len(), HEADER_MAGIC_1CHUNK + 4);

        let parsed = StreamInfo::parse(&bytes).unwrap();
        assert!(parsed.is_3d);
        assert!(parsed.is_float);
        assert!(parsed.qz_mode);
        assert!(!parsed.multi_chunk);
        assert_eq!(parsed.vol_dims, [64, 64, 64]);
        assert_eq!(parsed.chunk_dims, [64, 64, 64]);
        assert_eq!(parsed.chunk_offsets, vec![(HEADER_MAGIC_1CHUNK + 4, 1000)]);
    }

    #[test]
    fn verify_header_roundtrip_multi_chunk() {
        let info = StreamInfo {
            major_version: FORMAT_VERSION_MAJOR,
            is_portion: false,
            is_3d: true,
            is_float: false,
            multi_chunk: true,
            zstd_applied: false,
            qz_mode: false,
            vol_dims: [128, 128, 64],
            chunk_dims: [64, 64, 64],
            header_len: 0,
            chunk_offsets: Vec::new(),
        };
        let lens = [10u32, 20, 30, 40];
        let bytes = info.write_header(&lens);
        assert_eq!(bytes.len(), HEADER_MAGIC_NCHUNK + 16);

        let parsed = StreamInfo::parse(&bytes).unwrap();
        assert!(parsed.multi_chunk);
        assert_eq!(parsed.chunk_dims, [64, 64, 64]);
        assert_eq!(parsed.chunk_offsets.len(), 4);
        assert_eq!(parsed.chunk_offsets[0], (bytes.len(), 10));
        assert_eq!(parsed.chunk_offsets[3], (bytes.len() + 60, 40));
        assert_eq!(parsed.stream_len(), bytes.len() + 100);
    }

    #[test]
    fn verify_version_and_zstd_rejection() {
        let info = StreamInfo {
            major_version: FORMAT_VERSION_MAJOR,
            is_portion: false,
            is_3d: false,
            is_float: false,
            multi_chunk: false,
            zstd_applied: false,
            qz_mode: false,
            vol_dims: [8, 8, 1],
            chunk_dims: [8, 8, 1],
            header_len: 0,
            chunk_offsets: Vec::new(),
        };
        let mut bytes = info.write_header(&[0]);

        bytes[0] = FORMAT_VERSION_MAJOR + 1;
        assert!(matches!(StreamInfo::parse(&bytes), Err(Error::VersionMismatch(_))));

        bytes[0] = FORMAT_VERSION_MAJOR;
        let mut flags = unpack_8_booleans(bytes[1]);
        flags[4] = true;
        bytes[1] = pack_8_booleans(flags);
        assert!(matches!(StreamInfo::parse(&bytes), Err(Error::ZstdMismatch)));
    }

    #[test]
    fn verify_progressive_portion() {
        let info = StreamInfo {
            major_version: FORMAT_VERSION_MAJOR,
            is_portion: false,
            is_3d: true,
            is_float: false,
            multi_chunk: true,
            zstd_applied: false,
            qz_mode: false,
            vol_dims: [64, 64, 128],
            chunk_dims: [64, 64, 64],
            header_len: 0,
            chunk_offsets: Vec::new(),
        };
        let lens = [1000u32, 2000];
        let mut frame = info.write_header(&lens);
        for i in 0..3000u32 {
            frame.push((i % 251) as u8);
        }

        let portion = progressive_portion(&frame, 50).unwrap();
        let parsed = StreamInfo::parse(&portion).unwrap();
        assert!(parsed.is_portion);
        assert_eq!(parsed.chunk_offsets[0].1, 500);
        assert_eq!(parsed.chunk_offsets[1].1, 1000);
        assert_eq!(portion.len(), parsed.stream_len());

        // The kept prefix of each chunk is byte-identical to the original.
        let orig = StreamInfo::parse(&frame).unwrap();
        let (o0, _) = orig.chunk_offsets[0];
        let (p0, l0) = parsed.chunk_offsets[0];
        assert_eq!(&frame[o0..o0 + l0], &portion[p0..p0 + l0]);
    }

    #[test]
    fn verify_speck_header_roundtrip() {
        let header = SpeckHeader {
            dims: [64, 32, 16],
            image_mean: 2.75,
            max_coeff_bits: -12,
            num_bits: Some(12345),
        };
        let mut bytes = Vec::new();
        write_speck_header(&mut bytes, &header);
        assert_eq!(bytes.len(), SPECK_HEADER_SIZE_QZ);

        let parsed = parse_speck_header(&bytes, true).unwrap();
        assert_eq!(parsed.dims, [64, 32, 16]);
        assert_eq!(parsed.image_mean, 2.75);
        assert_eq!(parsed.max_coeff_bits, -12);
        assert_eq!(parsed.num_bits, Some(12345));

        assert_eq!(speck_stream_size(&bytes, true).unwrap(), SPECK_HEADER_SIZE_QZ + 1544);
    }
}
