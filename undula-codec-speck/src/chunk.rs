// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `chunk` module runs one compression unit end to end: conditioner, wavelet transform,
//! SPECK coding, and (in quantization-termination mode) the decode-back pass that finds and
//! encodes outliers.
//!
//! A serialised chunk is the 17-byte conditioner descriptor, the SPECK stream, and optionally
//! a SPERR stream. Each worker thread owns one `ChunkCompressor` or `ChunkDecompressor` and
//! reuses its scratch state across the chunks it is handed.

use log::debug;

use undula_core::conditioner::{Conditioner, META_SIZE};
use undula_core::dsp::dwt::Dwt;
use undula_core::errors::{invalid_param_error, wrong_size_error, Error, Result};

use crate::speck2d::Speck2d;
use crate::speck3d::Speck3d;
use crate::sperr::{Outlier, Sperr};
use crate::stream::{parse_speck_header, speck_stream_size, SPERR_HEADER_SIZE};
use crate::{RateMode, SpeckCoder};

/// The quantization termination level matching a point-wise error tolerance: the largest
/// integer q with `2^q <= tolerance`.
pub fn qz_level_for_tolerance(tolerance: f64) -> Result<i32> {
    if tolerance <= 0.0 {
        return invalid_param_error("tolerance must be positive");
    }
    Ok(tolerance.log2().floor() as i32)
}

fn validate_mode(mode: RateMode) -> Result<()> {
    match mode {
        RateMode::BitsPerSample(bpp) => {
            if bpp <= 0.0 || bpp > 64.0 {
                return invalid_param_error("bits-per-sample must be in (0, 64]");
            }
        }
        RateMode::QzTermination { tolerance, .. } => {
            if tolerance <= 0.0 {
                return invalid_param_error("tolerance must be positive");
            }
        }
    }
    Ok(())
}

fn forward_transform(dwt: &mut Dwt, dims: [usize; 3]) -> Result<()> {
    if dims[1] == 1 && dims[2] == 1 {
        dwt.dwt1d()
    }
    else if dims[2] == 1 {
        dwt.dwt2d()
    }
    else {
        dwt.dwt3d()
    }
}

fn inverse_transform(dwt: &mut Dwt, dims: [usize; 3]) -> Result<()> {
    if dims[1] == 1 && dims[2] == 1 {
        dwt.idwt1d()
    }
    else if dims[2] == 1 {
        dwt.idwt2d()
    }
    else {
        dwt.idwt3d()
    }
}

/// Compresses one chunk of samples into a serialised chunk stream.
#[derive(Default)]
pub struct ChunkCompressor {
    conditioner: Conditioner,
    dwt: Dwt,
    sperr: Sperr,
    num_outliers: usize,
}

impl ChunkCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_conditioning(&mut self, subtract_mean: bool, divide_by_rms: bool) {
        self.conditioner.toggle_subtract_mean(subtract_mean);
        self.conditioner.toggle_divide_by_rms(divide_by_rms);
    }

    /// Outliers the last quantization-terminated compression had to encode.
    pub fn num_outliers(&self) -> usize {
        self.num_outliers
    }

    /// Compress `data` and return the serialised chunk stream.
    pub fn compress(&mut self, data: Vec<f64>, dims: [usize; 3], mode: RateMode) -> Result<Vec<u8>> {
        validate_mode(mode)?;
        let total_vals = dims[0] * dims[1] * dims[2];
        if data.len() != total_vals {
            return wrong_size_error("chunk buffer does not match dimensions");
        }

        if dims[2] == 1 {
            self.run::<Speck2d>(data, dims, mode)
        }
        else {
            self.run::<Speck3d>(data, dims, mode)
        }
    }

    fn run<C: SpeckCoder + Default>(
        &mut self,
        data: Vec<f64>,
        dims: [usize; 3],
        mode: RateMode,
    ) -> Result<Vec<u8>> {
        let total_vals = dims[0] * dims[1] * dims[2];
        self.num_outliers = 0;

        // Quantization termination needs the pristine samples later for the outlier pass.
        let original = match mode {
            RateMode::QzTermination { .. } => data.clone(),
            RateMode::BitsPerSample(_) => Vec::new(),
        };

        let mut buf = data;
        let condi_meta = self.conditioner.condition(&mut buf)?;

        self.dwt.take_data(buf, dims)?;
        forward_transform(&mut self.dwt, dims)?;

        let mut coder = C::default();
        coder.take_data(self.dwt.release_data(), dims)?;
        match mode {
            RateMode::BitsPerSample(bpp) => {
                coder.set_bit_budget((bpp * total_vals as f64) as usize);
            }
            RateMode::QzTermination { level, .. } => coder.set_qz_level(level),
        }
        coder.encode()?;
        let speck_stream = coder.encoded_bitstream()?;

        let mut out = Vec::with_capacity(META_SIZE + speck_stream.len());
        out.extend_from_slice(&condi_meta);
        out.extend_from_slice(&speck_stream);

        if let RateMode::QzTermination { tolerance, .. } = mode {
            // Decode back through the whole pipeline to see the errors the decoder will see.
            coder.decode()?;
            self.dwt.take_data(coder.release_data(), dims)?;
            inverse_transform(&mut self.dwt, dims)?;
            let mut recon = self.dwt.release_data();
            self.conditioner.inverse_condition(&mut recon, &condi_meta)?;

            let outliers: Vec<Outlier> = original
                .iter()
                .zip(recon.iter())
                .enumerate()
                .filter_map(|(i, (a, b))| {
                    let diff = a - b;
                    (diff.abs() > tolerance).then(|| Outlier::new(i, diff))
                })
                .collect();

            if !outliers.is_empty() {
                self.num_outliers = outliers.len();
                debug!("chunk {:?}: correcting {} outliers", dims, self.num_outliers);

                self.sperr = Sperr::new();
                self.sperr.set_length(total_vals);
                self.sperr.set_tolerance(tolerance);
                self.sperr.take_outliers(outliers);
                self.sperr.encode()?;
                out.extend_from_slice(&self.sperr.encoded_bitstream()?);
            }
        }

        Ok(out)
    }
}

/// Decompresses one serialised chunk stream back to samples.
#[derive(Default)]
pub struct ChunkDecompressor {
    conditioner: Conditioner,
    dwt: Dwt,
    sperr: Sperr,
}

impl ChunkDecompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decompress a chunk stream. `qz_mode` must match the frame flag; `bpp_cap` optionally
    /// decodes only a prefix of a fixed-rate stream.
    pub fn decompress(
        &mut self,
        stream: &[u8],
        qz_mode: bool,
        bpp_cap: Option<f64>,
    ) -> Result<(Vec<f64>, [usize; 3])> {
        if stream.is_empty() {
            return Err(Error::EmptyStream);
        }
        if stream.len() < META_SIZE {
            return wrong_size_error("chunk stream shorter than the conditioner descriptor");
        }

        let mut condi_meta = [0u8; META_SIZE];
        condi_meta.copy_from_slice(&stream[..META_SIZE]);
        let body = &stream[META_SIZE..];

        let header = parse_speck_header(body, qz_mode)?;
        let dims = header.dims;

        // A portion stream may cut the SPECK bits short; the decoder stops at exhaustion.
        let speck_end = speck_stream_size(body, qz_mode)?.min(body.len());

        let coeffs = if dims[2] == 1 {
            self.decode_coeffs::<Speck2d>(&body[..speck_end], dims, qz_mode, bpp_cap)?
        }
        else {
            self.decode_coeffs::<Speck3d>(&body[..speck_end], dims, qz_mode, bpp_cap)?
        };

        self.dwt.take_data(coeffs, dims)?;
        inverse_transform(&mut self.dwt, dims)?;
        let mut samples = self.dwt.release_data();
        self.conditioner.inverse_condition(&mut samples, &condi_meta)?;

        // Any bytes past the SPECK stream are the outlier correction.
        if qz_mode && body.len() > speck_end && body.len() - speck_end >= SPERR_HEADER_SIZE {
            self.sperr.parse_bitstream(&body[speck_end..])?;
            self.sperr.decode()?;
            for outlier in self.sperr.release_outliers() {
                samples[outlier.location] += outlier.error;
            }
        }

        Ok((samples, dims))
    }

    fn decode_coeffs<C: SpeckCoder + Default>(
        &mut self,
        stream: &[u8],
        dims: [usize; 3],
        qz_mode: bool,
        bpp_cap: Option<f64>,
    ) -> Result<Vec<f64>> {
        let mut coder = C::default();
        coder.parse_bitstream(stream, qz_mode)?;
        if let Some(bpp) = bpp_cap {
            let total_vals = dims[0] * dims[1] * dims[2];
            coder.set_bit_budget((bpp * total_vals as f64) as usize);
        }
        coder.decode()?;
        Ok(coder.release_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smooth_volume(dims: [usize; 3], amplitude: f64) -> Vec<f64> {
        let mut vol = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    let fx = x as f64 / dims[0] as f64;
                    let fy = y as f64 / dims[1] as f64;
                    let fz = z as f64 / dims[2] as f64;
                    vol.push(amplitude * ((6.28 * fx).sin() + (6.28 * fy).cos() + 0.5 * fz));
                }
            }
        }
        vol
    }

    #[test]
    fn verify_qz_chunk_respects_pointwise_bound() {
        let dims = [32usize, 32, 32];
        let tolerance = 1e-3;
        let level = qz_level_for_tolerance(tolerance).unwrap();
        let original = smooth_volume(dims, 10.0);

        let mut compressor = ChunkCompressor::new();
        let stream = compressor
            .compress(original.clone(), dims, RateMode::QzTermination { level, tolerance })
            .unwrap();

        let mut decompressor = ChunkDecompressor::new();
        let (recon, out_dims) = decompressor.decompress(&stream, true, None).unwrap();
        assert_eq!(out_dims, dims);

        let bound = 2.0f64.powi(level) + tolerance;
        for (a, b) in original.iter().zip(recon.iter()) {
            assert!((a - b).abs() <= bound);
        }
    }

    #[test]
    fn verify_qz_chunk_encodes_injected_outliers() {
        let dims = [64usize, 64, 64];
        let tolerance = 1e-3;
        let level = qz_level_for_tolerance(tolerance).unwrap();

        let mut original = smooth_volume(dims, 1.0);
        // Ten isolated spikes far above the field's scale.
        let spots = [3001usize, 17003, 40007, 65011, 90013, 123017, 150019, 99023, 200029, 250031];
        for &s in &spots {
            original[s] += 100.0;
        }

        let mut compressor = ChunkCompressor::new();
        let stream = compressor
            .compress(original.clone(), dims, RateMode::QzTermination { level, tolerance })
            .unwrap();
        assert!(compressor.num_outliers() >= spots.len());

        let mut decompressor = ChunkDecompressor::new();
        let (recon, _) = decompressor.decompress(&stream, true, None).unwrap();

        let bound = 2.0f64.powi(level) + tolerance;
        let max_err = original
            .iter()
            .zip(recon.iter())
            .fold(0.0f64, |m, (a, b)| m.max((a - b).abs()));
        assert!(max_err <= bound, "max error {} exceeds {}", max_err, bound);
    }

    #[test]
    fn verify_fixed_rate_chunk_roundtrip_2d() {
        let dims = [64usize, 64, 1];
        let original = smooth_volume(dims, 50.0);

        let mut compressor = ChunkCompressor::new();
        let stream =
            compressor.compress(original.clone(), dims, RateMode::BitsPerSample(4.0)).unwrap();

        let mut decompressor = ChunkDecompressor::new();
        let (recon, out_dims) = decompressor.decompress(&stream, false, None).unwrap();
        assert_eq!(out_dims, dims);

        let mse: f64 = original
            .iter()
            .zip(recon.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            / original.len() as f64;
        assert!(mse < 1.0);
    }

    #[test]
    fn verify_chunk_rejects_bad_parameters() {
        let mut compressor = ChunkCompressor::new();
        let data = vec![0.5; 64];

        assert!(compressor
            .compress(data.clone(), [8, 8, 1], RateMode::BitsPerSample(0.0))
            .is_err());
        assert!(compressor
            .compress(data.clone(), [8, 8, 1], RateMode::BitsPerSample(65.0))
            .is_err());
        assert!(compressor
            .compress(data.clone(), [8, 8, 1], RateMode::QzTermination { level: -4, tolerance: 0.0 })
            .is_err());
        assert!(compressor.compress(data, [9, 8, 1], RateMode::BitsPerSample(2.0)).is_err());

        let mut decompressor = ChunkDecompressor::new();
        assert!(matches!(decompressor.decompress(&[], false, None), Err(Error::EmptyStream)));
    }

    #[test]
    fn verify_one_dimensional_chunk() {
        let dims = [512usize, 1, 1];
        let original: Vec<f64> = (0..512).map(|i| (i as f64 * 0.05).sin() * 20.0).collect();
        let tolerance = 1e-4;
        let level = qz_level_for_tolerance(tolerance).unwrap();

        let mut compressor = ChunkCompressor::new();
        let stream = compressor
            .compress(original.clone(), dims, RateMode::QzTermination { level, tolerance })
            .unwrap();

        let mut decompressor = ChunkDecompressor::new();
        let (recon, _) = decompressor.decompress(&stream, true, None).unwrap();

        let bound = 2.0f64.powi(level) + tolerance;
        for (a, b) in original.iter().zip(recon.iter()) {
            assert!((a - b).abs() <= bound);
        }
    }
}
