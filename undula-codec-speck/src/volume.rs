// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `volume` module splits an oversized volume into axis-aligned chunks, compresses or
//! decompresses them on separate OS threads, and assembles the framed stream of
//! [`crate::stream`].
//!
//! Chunks share nothing: each worker owns its chunk buffer, its coder state, and its output
//! stream, and results are stitched together in chunk order once every worker has finished.

use std::thread;

use log::{debug, info};
use num_traits::Float;

use undula_core::errors::{invalid_param_error, wrong_size_error, Error, Result};

use crate::chunk::{ChunkCompressor, ChunkDecompressor};
use crate::stream::{StreamInfo, FORMAT_VERSION_MAJOR};
use crate::RateMode;

/// One chunk's placement: `(start_x, len_x, start_y, len_y, start_z, len_z)`.
pub type ChunkSpec = [usize; 6];

/// Split a volume into chunks of roughly `chunk_dims`. Every chunk gets the nominal extent
/// except the last along each axis, which absorbs the remainder. X varies fastest in the
/// returned order.
pub fn chunk_volume(vol_dims: [usize; 3], chunk_dims: [usize; 3]) -> Vec<ChunkSpec> {
    let mut counts = [0usize; 3];
    for i in 0..3 {
        counts[i] = (vol_dims[i] / chunk_dims[i].max(1)).max(1);
    }

    let segment = |axis: usize, seg: usize| -> (usize, usize) {
        let nominal = chunk_dims[axis];
        let start = seg * nominal;
        let len = if seg + 1 == counts[axis] { vol_dims[axis] - start } else { nominal };
        (start, len)
    };

    let mut chunks = Vec::with_capacity(counts[0] * counts[1] * counts[2]);
    for sz in 0..counts[2] {
        let (z0, lz) = segment(2, sz);
        for sy in 0..counts[1] {
            let (y0, ly) = segment(1, sy);
            for sx in 0..counts[0] {
                let (x0, lx) = segment(0, sx);
                chunks.push([x0, lx, y0, ly, z0, lz]);
            }
        }
    }
    chunks
}

/// Copy one chunk out of a volume, converting to doubles.
pub fn gather_chunk<T: Float>(vol: &[T], vol_dims: [usize; 3], chunk: ChunkSpec) -> Vec<f64> {
    let mut out = Vec::with_capacity(chunk[1] * chunk[3] * chunk[5]);
    for z in chunk[4]..chunk[4] + chunk[5] {
        let plane_offset = z * vol_dims[0] * vol_dims[1];
        for y in chunk[2]..chunk[2] + chunk[3] {
            let col_offset = plane_offset + y * vol_dims[0];
            for x in chunk[0]..chunk[0] + chunk[1] {
                out.push(vol[col_offset + x].to_f64().unwrap_or(0.0));
            }
        }
    }
    out
}

/// Copy one decompressed chunk back into its place in a volume.
pub fn scatter_chunk<T: Float>(
    vol: &mut [T],
    vol_dims: [usize; 3],
    chunk: ChunkSpec,
    data: &[f64],
) {
    let mut idx = 0;
    for z in chunk[4]..chunk[4] + chunk[5] {
        let plane_offset = z * vol_dims[0] * vol_dims[1];
        for y in chunk[2]..chunk[2] + chunk[3] {
            let col_offset = plane_offset + y * vol_dims[0];
            for x in chunk[0]..chunk[0] + chunk[1] {
                vol[col_offset + x] = T::from(data[idx]).unwrap_or_else(T::zero);
                idx += 1;
            }
        }
    }
}

fn default_num_threads() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Distribute chunk jobs round-robin over workers and run them on scoped threads, one worker
/// per thread, each owning its state for the duration.
fn run_workers<J, R, F>(jobs: Vec<J>, num_threads: usize, work: F) -> Vec<Result<R>>
where
    J: Send,
    R: Send,
    F: Fn(J) -> Result<R> + Sync,
{
    let num_jobs = jobs.len();
    let num_workers = num_threads.clamp(1, num_jobs.max(1));

    // Round-robin assignment keeps chunk order reconstructible from the worker index.
    let mut per_worker: Vec<Vec<(usize, J)>> = (0..num_workers).map(|_| Vec::new()).collect();
    for (i, job) in jobs.into_iter().enumerate() {
        per_worker[i % num_workers].push((i, job));
    }

    let mut results: Vec<Option<Result<R>>> = (0..num_jobs).map(|_| None).collect();
    let work = &work;

    thread::scope(|s| {
        let handles: Vec<_> = per_worker
            .into_iter()
            .map(|assigned| {
                s.spawn(move || {
                    assigned
                        .into_iter()
                        .map(|(i, job)| (i, work(job)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for (i, result) in handle.join().expect("chunk worker panicked") {
                results[i] = Some(result);
            }
        }
    });

    results.into_iter().map(|r| r.expect("chunk result missing")).collect()
}

/// Compresses a whole volume: chunking, per-chunk pipelines on worker threads, and framing.
pub struct VolumeCompressor {
    dims: [usize; 3],
    chunk_dims: [usize; 3],
    num_threads: usize,
    mode: Option<RateMode>,
    conditioning: (bool, bool),
    is_float: bool,
    chunk_buffers: Vec<Vec<f64>>,
    streams: Vec<Vec<u8>>,
    num_outliers: usize,
}

impl Default for VolumeCompressor {
    fn default() -> Self {
        VolumeCompressor {
            dims: [0; 3],
            chunk_dims: [0; 3],
            num_threads: default_num_threads(),
            mode: None,
            conditioning: (true, false),
            is_float: false,
            chunk_buffers: Vec::new(),
            streams: Vec::new(),
            num_outliers: 0,
        }
    }
}

impl VolumeCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_num_threads(&mut self, n: usize) {
        if n > 0 {
            self.num_threads = n;
        }
    }

    pub fn set_mode(&mut self, mode: RateMode) {
        self.mode = Some(mode);
    }

    pub fn toggle_conditioning(&mut self, subtract_mean: bool, divide_by_rms: bool) {
        self.conditioning = (subtract_mean, divide_by_rms);
    }

    /// Total outliers encoded across all chunks by the last compression.
    pub fn num_outliers(&self) -> usize {
        self.num_outliers
    }

    /// Copy the volume in, splitting it into chunk buffers. The requested chunk extents are
    /// clamped to `[1, dim]` along each axis.
    pub fn copy_data<T: Float>(
        &mut self,
        vol: &[T],
        vol_dims: [usize; 3],
        chunk_dims: [usize; 3],
    ) -> Result<()> {
        if vol.len() != vol_dims[0] * vol_dims[1] * vol_dims[2] {
            return wrong_size_error("volume buffer does not match dimensions");
        }
        if vol_dims.iter().any(|d| *d == 0) {
            return invalid_param_error("volume dimensions must be nonzero");
        }

        self.dims = vol_dims;
        for i in 0..3 {
            self.chunk_dims[i] = chunk_dims[i].clamp(1, vol_dims[i]);
        }
        self.is_float = std::mem::size_of::<T>() == 4;

        let chunks = chunk_volume(self.dims, self.chunk_dims);
        if chunks.len() > 1 && self.chunk_dims.iter().any(|d| *d > u16::MAX as usize) {
            return invalid_param_error("chunk extents must fit in 16 bits");
        }
        self.chunk_buffers = chunks.iter().map(|c| gather_chunk(vol, vol_dims, *c)).collect();

        Ok(())
    }

    /// Compress every chunk. Worker threads each own a [`ChunkCompressor`] and are handed
    /// chunks round-robin.
    pub fn compress(&mut self) -> Result<()> {
        let mode = match self.mode {
            Some(mode) => mode,
            None => return invalid_param_error("rate mode not set"),
        };
        if self.chunk_buffers.is_empty() {
            return invalid_param_error("no volume data to compress");
        }

        let chunks = chunk_volume(self.dims, self.chunk_dims);
        let conditioning = self.conditioning;
        info!(
            "compressing {:?} as {} chunk(s) on {} thread(s)",
            self.dims,
            chunks.len(),
            self.num_threads
        );

        let jobs: Vec<(Vec<f64>, [usize; 3])> = std::mem::take(&mut self.chunk_buffers)
            .into_iter()
            .zip(chunks.iter())
            .map(|(buf, c)| (buf, [c[1], c[3], c[5]]))
            .collect();

        let results = run_workers(jobs, self.num_threads, |(buf, dims)| {
            let mut compressor = ChunkCompressor::new();
            compressor.toggle_conditioning(conditioning.0, conditioning.1);
            let stream = compressor.compress(buf, dims, mode)?;
            Ok((stream, compressor.num_outliers()))
        });

        self.streams = Vec::with_capacity(results.len());
        self.num_outliers = 0;
        for result in results {
            let (stream, outliers) = result?;
            if stream.is_empty() {
                return Err(Error::EmptyStream);
            }
            self.streams.push(stream);
            self.num_outliers += outliers;
        }

        Ok(())
    }

    /// Assemble the framed bitstream: header, then every chunk stream in order.
    pub fn encoded_bitstream(&self) -> Result<Vec<u8>> {
        if self.streams.is_empty() {
            return Err(Error::EmptyStream);
        }

        let info = StreamInfo {
            major_version: FORMAT_VERSION_MAJOR,
            is_portion: false,
            is_3d: self.dims[2] > 1,
            is_float: self.is_float,
            multi_chunk: self.streams.len() > 1,
            zstd_applied: false,
            qz_mode: matches!(self.mode, Some(RateMode::QzTermination { .. })),
            vol_dims: self.dims,
            chunk_dims: self.chunk_dims,
            header_len: 0,
            chunk_offsets: Vec::new(),
        };

        let lens: Vec<u32> = self.streams.iter().map(|s| s.len() as u32).collect();
        let mut out = info.write_header(&lens);
        for stream in &self.streams {
            out.extend_from_slice(stream);
        }

        debug!("frame assembled: {} bytes", out.len());
        Ok(out)
    }
}

/// Decompresses a framed bitstream back into a volume.
#[derive(Default)]
pub struct VolumeDecompressor {
    frame: Vec<u8>,
    info: Option<StreamInfo>,
    num_threads: usize,
    bpp_cap: Option<f64>,
    output: Vec<f64>,
}

impl VolumeDecompressor {
    pub fn new() -> Self {
        VolumeDecompressor { num_threads: default_num_threads(), ..Default::default() }
    }

    pub fn set_num_threads(&mut self, n: usize) {
        if n > 0 {
            self.num_threads = n;
        }
    }

    /// Decode only up to this many bits per sample of each fixed-rate chunk.
    pub fn set_decode_bpp(&mut self, bpp: Option<f64>) {
        self.bpp_cap = bpp;
    }

    /// Take in a framed bitstream and parse its header.
    pub fn use_bitstream(&mut self, frame: &[u8]) -> Result<()> {
        let info = StreamInfo::parse(frame)?;
        if frame.len() < info.stream_len() {
            return wrong_size_error("frame shorter than its header declares");
        }
        self.frame = frame[..info.stream_len()].to_vec();
        self.info = Some(info);
        Ok(())
    }

    pub fn info(&self) -> Option<&StreamInfo> {
        self.info.as_ref()
    }

    pub fn dims(&self) -> [usize; 3] {
        self.info.as_ref().map(|i| i.vol_dims).unwrap_or([0; 3])
    }

    pub fn decompress(&mut self) -> Result<()> {
        let info = match &self.info {
            Some(info) => info.clone(),
            None => return invalid_param_error("no bitstream to decompress"),
        };

        let chunks = chunk_volume(info.vol_dims, info.chunk_dims);
        if chunks.len() != info.chunk_offsets.len() {
            return Err(Error::DimMismatch("chunk table does not match the volume layout"));
        }

        let qz_mode = info.qz_mode;
        let bpp_cap = self.bpp_cap;
        let frame = &self.frame;

        let jobs: Vec<(usize, usize, ChunkSpec)> = info
            .chunk_offsets
            .iter()
            .zip(chunks.iter())
            .map(|(&(offset, len), c)| (offset, len, *c))
            .collect();

        let results = run_workers(jobs, self.num_threads, |(offset, len, spec)| {
            let mut decompressor = ChunkDecompressor::new();
            let (samples, dims) =
                decompressor.decompress(&frame[offset..offset + len], qz_mode, bpp_cap)?;
            if dims != [spec[1], spec[3], spec[5]] {
                return Err(Error::DimMismatch("chunk stream dimensions do not match layout"));
            }
            Ok((samples, spec))
        });

        let total_vals = info.vol_dims[0] * info.vol_dims[1] * info.vol_dims[2];
        self.output.clear();
        self.output.resize(total_vals, 0.0);
        for result in results {
            let (samples, spec) = result?;
            scatter_chunk(&mut self.output, info.vol_dims, spec, &samples);
        }

        Ok(())
    }

    pub fn view_output(&self) -> &[f64] {
        &self.output
    }

    /// The reconstructed volume, converted to the requested sample type.
    pub fn output_as<T: Float>(&self) -> Vec<T> {
        self.output.iter().map(|v| T::from(*v).unwrap_or_else(T::zero)).collect()
    }

    pub fn release_output(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::qz_level_for_tolerance;
    use crate::stream::progressive_portion;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn verify_chunk_volume_covers_exactly_once() {
        for (vol, chunk) in [
            ([64usize, 64, 64], [32usize, 32, 32]),
            ([100, 90, 80], [32, 32, 32]),
            ([10, 10, 10], [32, 32, 32]),
            ([65, 64, 1], [64, 64, 64]),
        ] {
            let chunks = chunk_volume(vol, chunk);
            let mut seen = vec![0u32; vol[0] * vol[1] * vol[2]];
            for c in &chunks {
                for z in c[4]..c[4] + c[5] {
                    for y in c[2]..c[2] + c[3] {
                        for x in c[0]..c[0] + c[1] {
                            seen[z * vol[0] * vol[1] + y * vol[0] + x] += 1;
                        }
                    }
                }
            }
            assert!(seen.iter().all(|&n| n == 1), "vol {:?} chunk {:?}", vol, chunk);
        }
    }

    #[test]
    fn verify_gather_scatter_roundtrip() {
        let vol_dims = [7usize, 5, 3];
        let vol: Vec<f64> = (0..105).map(|i| i as f64).collect();
        let chunk = [2usize, 4, 1, 3, 0, 2];

        let gathered = gather_chunk(&vol, vol_dims, chunk);
        assert_eq!(gathered.len(), 24);
        assert_eq!(gathered[0], vol[1 * 7 + 2]);

        let mut out = vec![0.0f64; 105];
        scatter_chunk(&mut out, vol_dims, chunk, &gathered);
        for z in 0..2 {
            for y in 1..4 {
                for x in 2..6 {
                    let idx = z * 35 + y * 7 + x;
                    assert_eq!(out[idx], vol[idx]);
                }
            }
        }
    }

    fn smooth_with_spikes(dims: [usize; 3], spikes: &[usize]) -> Vec<f64> {
        let mut vol = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    let fx = x as f64 / dims[0] as f64;
                    let fy = y as f64 / dims[1] as f64;
                    let fz = z as f64 / dims[2] as f64;
                    vol.push((6.28 * fx).sin() + (6.28 * fy).cos() + 0.3 * (9.42 * fz).sin());
                }
            }
        }
        for &s in spikes {
            vol[s] += 100.0;
        }
        vol
    }

    #[test]
    fn verify_multi_chunk_qz_volume_roundtrip() {
        let dims = [64usize, 64, 64];
        let tolerance = 1e-3;
        let level = qz_level_for_tolerance(tolerance).unwrap();
        let spikes = [1001usize, 30011, 60013, 100003, 150001, 200003, 220009, 240007, 250013, 260003];
        let original = smooth_with_spikes(dims, &spikes);

        let mut compressor = VolumeCompressor::new();
        compressor.set_num_threads(4);
        compressor.set_mode(RateMode::QzTermination { level, tolerance });
        compressor.copy_data(&original, dims, [32, 32, 32]).unwrap();
        compressor.compress().unwrap();
        assert!(compressor.num_outliers() >= spikes.len());
        let frame = compressor.encoded_bitstream().unwrap();

        let mut decompressor = VolumeDecompressor::new();
        decompressor.set_num_threads(4);
        decompressor.use_bitstream(&frame).unwrap();
        assert!(decompressor.info().unwrap().multi_chunk);
        assert!(decompressor.info().unwrap().qz_mode);
        decompressor.decompress().unwrap();

        let bound = 2.0f64.powi(level) + tolerance;
        let max_err = original
            .iter()
            .zip(decompressor.view_output().iter())
            .fold(0.0f64, |m, (a, b)| m.max((a - b).abs()));
        assert!(max_err <= bound, "max error {} exceeds {}", max_err, bound);
    }

    #[test]
    fn verify_fixed_rate_volume_and_portion() {
        let dims = [64usize, 64, 32];
        let mut rng = SmallRng::seed_from_u64(4242);
        let original: Vec<f64> = {
            // Smooth base plus small noise so the stream has content at every bitplane.
            let mut v = smooth_with_spikes(dims, &[]);
            for s in v.iter_mut() {
                *s += 0.01 * (rng.random::<f64>() - 0.5);
            }
            v
        };

        let mut compressor = VolumeCompressor::new();
        compressor.set_mode(RateMode::BitsPerSample(4.0));
        compressor.copy_data(&original, dims, [32, 32, 32]).unwrap();
        compressor.compress().unwrap();
        let frame = compressor.encoded_bitstream().unwrap();

        let mse_at = |frame: &[u8]| -> f64 {
            let mut d = VolumeDecompressor::new();
            d.use_bitstream(frame).unwrap();
            d.decompress().unwrap();
            original
                .iter()
                .zip(d.view_output().iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                / original.len() as f64
        };

        let full_mse = mse_at(&frame);

        let portion = progressive_portion(&frame, 50).unwrap();
        assert!(portion.len() < frame.len());
        let portion_mse = mse_at(&portion);

        assert!(full_mse < 0.1);
        assert!(portion_mse >= full_mse);
        assert!(portion_mse.is_finite());
    }

    #[test]
    fn verify_float_input_roundtrip() {
        let dims = [32usize, 32, 1];
        let original: Vec<f32> = (0..dims[0] * dims[1])
            .map(|i| ((i % 64) as f32 * 0.1).sin() * 10.0)
            .collect();

        let mut compressor = VolumeCompressor::new();
        compressor.set_mode(RateMode::BitsPerSample(8.0));
        compressor.copy_data(&original, dims, dims).unwrap();
        compressor.compress().unwrap();
        let frame = compressor.encoded_bitstream().unwrap();

        let mut decompressor = VolumeDecompressor::new();
        decompressor.use_bitstream(&frame).unwrap();
        assert!(decompressor.info().unwrap().is_float);
        assert!(!decompressor.info().unwrap().multi_chunk);
        decompressor.decompress().unwrap();

        let recon: Vec<f32> = decompressor.output_as();
        let max_err = original
            .iter()
            .zip(recon.iter())
            .fold(0.0f32, |m, (a, b)| m.max((a - b).abs()));
        assert!(max_err < 0.1);
    }
}
