// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dwt` module drives the CDF 9/7 lifting kernels over 1-D, 2-D, and 3-D buffers.
//!
//! The transform owns the coefficient buffer exclusively for the duration of a pass: callers
//! hand it over with [`Dwt::take_data`] and reclaim it with [`Dwt::release_data`]. Buffers are
//! laid out with X varying fastest. After each level, low-pass results occupy the leading half
//! of the transformed extent and high-pass results the trailing half.

use log::trace;

use crate::dsp::cdf97::{self, Boundary, Phase};
use crate::dsp::{approx_detail_len, num_of_xforms};
use crate::errors::{wrong_size_error, Result};

/// Multi-level separable CDF 9/7 transform over an owned coefficient buffer.
#[derive(Default)]
pub struct Dwt {
    dims: [usize; 3],
    buf: Vec<f64>,
    boundary: Boundary,
    scratch: Vec<f64>,
}

impl Dwt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a coefficient buffer with the given dimensions.
    pub fn take_data(&mut self, data: Vec<f64>, dims: [usize; 3]) -> Result<()> {
        if data.len() != dims[0] * dims[1] * dims[2] {
            return wrong_size_error("buffer length does not match dimensions");
        }
        self.buf = data;
        self.dims = dims;
        Ok(())
    }

    /// Select the boundary extension used by all subsequent passes.
    pub fn set_boundary(&mut self, boundary: Boundary) {
        self.boundary = boundary;
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn data(&self) -> &[f64] {
        &self.buf
    }

    /// Give the coefficient buffer back to the caller.
    pub fn release_data(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.buf)
    }

    /// Forward transform of a 1-D signal, over all levels the length admits.
    pub fn dwt1d(&mut self) -> Result<()> {
        let levels = num_of_xforms(self.dims[0]);
        self.ensure_scratch(self.dims[0]);
        forward_1d(&mut self.buf, levels, self.boundary, &mut self.scratch)
    }

    pub fn idwt1d(&mut self) -> Result<()> {
        let levels = num_of_xforms(self.dims[0]);
        self.ensure_scratch(self.dims[0]);
        inverse_1d(&mut self.buf, levels, self.boundary, &mut self.scratch)
    }

    /// Forward transform of a 2-D plane, over all levels the shorter side admits.
    pub fn dwt2d(&mut self) -> Result<()> {
        let [nx, ny, _] = self.dims;
        let levels = num_of_xforms(nx.min(ny));
        self.ensure_scratch(2 * nx.max(ny));
        forward_2d(&mut self.buf, nx, nx, ny, levels, self.boundary, &mut self.scratch)
    }

    pub fn idwt2d(&mut self) -> Result<()> {
        let [nx, ny, _] = self.dims;
        let levels = num_of_xforms(nx.min(ny));
        self.ensure_scratch(2 * nx.max(ny));
        inverse_2d(&mut self.buf, nx, nx, ny, levels, self.boundary, &mut self.scratch)
    }

    /// Forward 3-D transform, choosing the dyadic or wavelet-packet strategy by whether the XY
    /// plane and the Z axis admit the same number of levels. The inverse makes the same choice,
    /// so the two always agree.
    pub fn dwt3d(&mut self) -> Result<()> {
        let [nx, ny, nz] = self.dims;
        if num_of_xforms(nx.min(ny)) == num_of_xforms(nz) {
            trace!("3-d transform of {:?} takes the dyadic path", self.dims);
            self.dwt3d_dyadic()
        }
        else {
            trace!("3-d transform of {:?} takes the wavelet-packet path", self.dims);
            self.dwt3d_wavelet_packet()
        }
    }

    pub fn idwt3d(&mut self) -> Result<()> {
        let [nx, ny, nz] = self.dims;
        if num_of_xforms(nx.min(ny)) == num_of_xforms(nz) {
            self.idwt3d_dyadic()
        }
        else {
            self.idwt3d_wavelet_packet()
        }
    }

    /// Wavelet-packet 3-D forward transform: all XY levels first, then all Z levels.
    pub fn dwt3d_wavelet_packet(&mut self) -> Result<()> {
        let [nx, ny, nz] = self.dims;
        let plane_size = nx * ny;
        let xy_levels = num_of_xforms(nx.min(ny));
        let z_levels = num_of_xforms(nz);
        self.ensure_scratch(2 * nx.max(ny).max(nz));

        for z in 0..nz {
            let plane = &mut self.buf[z * plane_size..(z + 1) * plane_size];
            forward_2d(plane, nx, nx, ny, xy_levels, self.boundary, &mut self.scratch)?;
        }

        let (col, tmp) = self.scratch.split_at_mut(nz);
        for base in 0..plane_size {
            for (k, c) in col.iter_mut().enumerate() {
                *c = self.buf[k * plane_size + base];
            }
            forward_1d(col, z_levels, self.boundary, tmp)?;
            for (k, c) in col.iter().enumerate() {
                self.buf[k * plane_size + base] = *c;
            }
        }

        Ok(())
    }

    pub fn idwt3d_wavelet_packet(&mut self) -> Result<()> {
        let [nx, ny, nz] = self.dims;
        let plane_size = nx * ny;
        let xy_levels = num_of_xforms(nx.min(ny));
        let z_levels = num_of_xforms(nz);
        self.ensure_scratch(2 * nx.max(ny).max(nz));

        let (col, tmp) = self.scratch.split_at_mut(nz);
        for base in 0..plane_size {
            for (k, c) in col.iter_mut().enumerate() {
                *c = self.buf[k * plane_size + base];
            }
            inverse_1d(col, z_levels, self.boundary, tmp)?;
            for (k, c) in col.iter().enumerate() {
                self.buf[k * plane_size + base] = *c;
            }
        }

        for z in 0..nz {
            let plane = &mut self.buf[z * plane_size..(z + 1) * plane_size];
            inverse_2d(plane, nx, nx, ny, xy_levels, self.boundary, &mut self.scratch)?;
        }

        Ok(())
    }

    /// Dyadic 3-D forward transform: one XY level and one Z level per pyramid level,
    /// interleaved.
    pub fn dwt3d_dyadic(&mut self) -> Result<()> {
        let [nx, ny, nz] = self.dims;
        let plane_size = nx * ny;
        let levels = num_of_xforms(nx.min(ny).min(nz));
        self.ensure_scratch(2 * nx.max(ny).max(nz));

        for lev in 0..levels {
            let (ax, _) = approx_detail_len(nx, lev);
            let (ay, _) = approx_detail_len(ny, lev);
            let (az, _) = approx_detail_len(nz, lev);

            for z in 0..az {
                let plane = &mut self.buf[z * plane_size..(z + 1) * plane_size];
                forward_2d_one_level(plane, nx, ax, ay, self.boundary, &mut self.scratch)?;
            }

            let (col, tmp) = self.scratch.split_at_mut(az);
            for y in 0..ay {
                for x in 0..ax {
                    let base = y * nx + x;
                    for (k, c) in col.iter_mut().enumerate() {
                        *c = self.buf[k * plane_size + base];
                    }
                    forward_1d_one_level(col, self.boundary, tmp)?;
                    for (k, c) in col.iter().enumerate() {
                        self.buf[k * plane_size + base] = *c;
                    }
                }
            }
        }

        Ok(())
    }

    pub fn idwt3d_dyadic(&mut self) -> Result<()> {
        let [nx, ny, nz] = self.dims;
        let plane_size = nx * ny;
        let levels = num_of_xforms(nx.min(ny).min(nz));
        self.ensure_scratch(2 * nx.max(ny).max(nz));

        for lev in (0..levels).rev() {
            let (ax, _) = approx_detail_len(nx, lev);
            let (ay, _) = approx_detail_len(ny, lev);
            let (az, _) = approx_detail_len(nz, lev);

            let (col, tmp) = self.scratch.split_at_mut(az);
            for y in 0..ay {
                for x in 0..ax {
                    let base = y * nx + x;
                    for (k, c) in col.iter_mut().enumerate() {
                        *c = self.buf[k * plane_size + base];
                    }
                    inverse_1d_one_level(col, self.boundary, tmp)?;
                    for (k, c) in col.iter().enumerate() {
                        self.buf[k * plane_size + base] = *c;
                    }
                }
            }

            for z in 0..az {
                let plane = &mut self.buf[z * plane_size..(z + 1) * plane_size];
                inverse_2d_one_level(plane, nx, ax, ay, self.boundary, &mut self.scratch)?;
            }
        }

        Ok(())
    }

    fn ensure_scratch(&mut self, len: usize) {
        if self.scratch.len() < len {
            self.scratch.resize(len, 0.0);
        }
    }
}

/// Move low-pass (even-indexed) samples to the front half and high-pass (odd-indexed) samples
/// to the back half.
fn gather_subbands(dest: &mut [f64], orig: &[f64]) {
    let len = orig.len();
    let low_count = (len + 1) / 2;
    for i in 0..low_count {
        dest[i] = orig[i * 2];
    }
    for i in 0..len - low_count {
        dest[low_count + i] = orig[i * 2 + 1];
    }
}

/// Interleave front-half low-pass and back-half high-pass samples back to natural order.
fn scatter_subbands(dest: &mut [f64], orig: &[f64]) {
    let len = orig.len();
    let low_count = (len + 1) / 2;
    for i in 0..low_count {
        dest[i * 2] = orig[i];
    }
    for i in 0..len - low_count {
        dest[i * 2 + 1] = orig[low_count + i];
    }
}

fn forward_1d_one_level(array: &mut [f64], boundary: Boundary, tmp: &mut [f64]) -> Result<()> {
    let len = array.len();
    tmp[..len].copy_from_slice(array);
    cdf97::analysis(&mut tmp[..len], Phase::Even, boundary)?;
    gather_subbands(array, &tmp[..len]);
    Ok(())
}

fn inverse_1d_one_level(array: &mut [f64], boundary: Boundary, tmp: &mut [f64]) -> Result<()> {
    let len = array.len();
    scatter_subbands(&mut tmp[..len], array);
    cdf97::synthesis(&mut tmp[..len], Phase::Even, boundary)?;
    array.copy_from_slice(&tmp[..len]);
    Ok(())
}

fn forward_1d(
    array: &mut [f64],
    levels: usize,
    boundary: Boundary,
    scratch: &mut [f64],
) -> Result<()> {
    let len = array.len();
    for lev in 0..levels {
        let (approx, _) = approx_detail_len(len, lev);
        forward_1d_one_level(&mut array[..approx], boundary, scratch)?;
    }
    Ok(())
}

fn inverse_1d(
    array: &mut [f64],
    levels: usize,
    boundary: Boundary,
    scratch: &mut [f64],
) -> Result<()> {
    let len = array.len();
    for lev in (0..levels).rev() {
        let (approx, _) = approx_detail_len(len, lev);
        inverse_1d_one_level(&mut array[..approx], boundary, scratch)?;
    }
    Ok(())
}

/// One level of the separable 2-D transform on the leading `(len_x, len_y)` region of a plane
/// with row stride `stride`: rows first, then columns.
fn forward_2d_one_level(
    plane: &mut [f64],
    stride: usize,
    len_x: usize,
    len_y: usize,
    boundary: Boundary,
    scratch: &mut [f64],
) -> Result<()> {
    let (a, b) = scratch.split_at_mut(len_x.max(len_y));

    for y in 0..len_y {
        let row = &mut plane[y * stride..y * stride + len_x];
        a[..len_x].copy_from_slice(row);
        cdf97::analysis(&mut a[..len_x], Phase::Even, boundary)?;
        gather_subbands(row, &a[..len_x]);
    }

    for x in 0..len_x {
        for y in 0..len_y {
            a[y] = plane[y * stride + x];
        }
        cdf97::analysis(&mut a[..len_y], Phase::Even, boundary)?;
        gather_subbands(&mut b[..len_y], &a[..len_y]);
        for y in 0..len_y {
            plane[y * stride + x] = b[y];
        }
    }

    Ok(())
}

/// One level of the inverse separable 2-D transform: columns first, then rows.
fn inverse_2d_one_level(
    plane: &mut [f64],
    stride: usize,
    len_x: usize,
    len_y: usize,
    boundary: Boundary,
    scratch: &mut [f64],
) -> Result<()> {
    let (a, b) = scratch.split_at_mut(len_x.max(len_y));

    for x in 0..len_x {
        for y in 0..len_y {
            a[y] = plane[y * stride + x];
        }
        scatter_subbands(&mut b[..len_y], &a[..len_y]);
        cdf97::synthesis(&mut b[..len_y], Phase::Even, boundary)?;
        for y in 0..len_y {
            plane[y * stride + x] = b[y];
        }
    }

    for y in 0..len_y {
        let row = &mut plane[y * stride..y * stride + len_x];
        scatter_subbands(&mut a[..len_x], row);
        cdf97::synthesis(&mut a[..len_x], Phase::Even, boundary)?;
        row.copy_from_slice(&a[..len_x]);
    }

    Ok(())
}

fn forward_2d(
    plane: &mut [f64],
    stride: usize,
    len_x: usize,
    len_y: usize,
    levels: usize,
    boundary: Boundary,
    scratch: &mut [f64],
) -> Result<()> {
    for lev in 0..levels {
        let (ax, _) = approx_detail_len(len_x, lev);
        let (ay, _) = approx_detail_len(len_y, lev);
        forward_2d_one_level(plane, stride, ax, ay, boundary, scratch)?;
    }
    Ok(())
}

fn inverse_2d(
    plane: &mut [f64],
    stride: usize,
    len_x: usize,
    len_y: usize,
    levels: usize,
    boundary: Boundary,
    scratch: &mut [f64],
) -> Result<()> {
    for lev in (0..levels).rev() {
        let (ax, _) = approx_detail_len(len_x, lev);
        let (ay, _) = approx_detail_len(len_y, lev);
        inverse_2d_one_level(plane, stride, ax, ay, boundary, scratch)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_volume(rng: &mut SmallRng, len: usize) -> Vec<f64> {
        (0..len).map(|_| rng.random::<f64>() * 2.0 - 1.0).collect()
    }

    fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b.iter()).fold(0.0f64, |m, (x, y)| m.max((x - y).abs()))
    }

    #[test]
    fn verify_dwt1d_roundtrip() {
        let mut rng = SmallRng::seed_from_u64(11);
        for len in [1usize, 7, 8, 9, 16, 63, 64, 127, 128, 1000, 4096] {
            let original = random_volume(&mut rng, len);

            let mut dwt = Dwt::new();
            dwt.take_data(original.clone(), [len, 1, 1]).unwrap();
            dwt.dwt1d().unwrap();
            dwt.idwt1d().unwrap();

            let recon = dwt.release_data();
            assert!(max_abs_diff(&original, &recon) < 1e-10, "len {}", len);
        }
    }

    #[test]
    fn verify_dwt1d_all_levels() {
        let mut rng = SmallRng::seed_from_u64(12);
        for len in [8usize, 64, 127, 1024, 4096] {
            let original = random_volume(&mut rng, len);
            for levels in 0..=num_of_xforms(len) {
                let mut buf = original.clone();
                let mut scratch = vec![0.0; len];
                forward_1d(&mut buf, levels, Boundary::Symmetric, &mut scratch).unwrap();
                inverse_1d(&mut buf, levels, Boundary::Symmetric, &mut scratch).unwrap();
                assert!(max_abs_diff(&original, &buf) < 1e-10, "len {} levels {}", len, levels);
            }
        }
    }

    #[test]
    fn verify_impulse_stays_localised() {
        let len = 128;
        let levels = 3;
        let mut buf = vec![0.0; len];
        buf[64] = 1.0;
        let mut scratch = vec![0.0; len];
        forward_1d(&mut buf, levels, Boundary::Symmetric, &mut scratch).unwrap();

        // Subband extents after three levels: approx [0, 16), then details [16, 32),
        // [32, 64), [64, 128). Within each, the nonzero support must span at most 12 slots.
        let bands = [(0usize, 16usize), (16, 32), (32, 64), (64, 128)];
        for (lo, hi) in bands {
            let nonzero: Vec<usize> =
                (lo..hi).filter(|&i| buf[i].abs() > 1e-12).collect();
            if let (Some(first), Some(last)) = (nonzero.first(), nonzero.last()) {
                assert!(last - first + 1 <= 12, "band [{}, {}) spread too wide", lo, hi);
            }
        }
    }

    #[test]
    fn verify_dwt2d_roundtrip() {
        let mut rng = SmallRng::seed_from_u64(13);
        for (nx, ny) in [(64usize, 64usize), (65, 33), (128, 31), (8, 8)] {
            let original = random_volume(&mut rng, nx * ny);

            let mut dwt = Dwt::new();
            dwt.take_data(original.clone(), [nx, ny, 1]).unwrap();
            dwt.dwt2d().unwrap();
            dwt.idwt2d().unwrap();

            let recon = dwt.release_data();
            assert!(max_abs_diff(&original, &recon) < 1e-10, "dims {}x{}", nx, ny);
        }
    }

    #[test]
    fn verify_constant_plane_has_no_detail() {
        let (nx, ny) = (512usize, 512usize);
        let mut dwt = Dwt::new();
        dwt.take_data(vec![0.0; nx * ny], [nx, ny, 1]).unwrap();
        // A conditioned (mean-subtracted) constant plane is all zeros; every coefficient of the
        // transform, detail ones included, stays at zero.
        dwt.dwt2d().unwrap();
        assert!(dwt.data().iter().all(|c| c.abs() <= 1e-10));
    }

    #[test]
    fn verify_dwt3d_dyadic_roundtrip() {
        let mut rng = SmallRng::seed_from_u64(14);
        for dims in [[32usize, 32, 32], [64, 64, 64], [17, 17, 17]] {
            let original = random_volume(&mut rng, dims[0] * dims[1] * dims[2]);

            let mut dwt = Dwt::new();
            dwt.take_data(original.clone(), dims).unwrap();
            dwt.dwt3d_dyadic().unwrap();
            dwt.idwt3d_dyadic().unwrap();

            let recon = dwt.release_data();
            assert!(max_abs_diff(&original, &recon) < 1e-10, "dims {:?}", dims);
        }
    }

    #[test]
    fn verify_dwt3d_wavelet_packet_roundtrip() {
        let mut rng = SmallRng::seed_from_u64(15);
        for dims in [[64usize, 64, 16], [32, 32, 9], [16, 16, 128]] {
            let original = random_volume(&mut rng, dims[0] * dims[1] * dims[2]);

            let mut dwt = Dwt::new();
            dwt.take_data(original.clone(), dims).unwrap();
            dwt.dwt3d_wavelet_packet().unwrap();
            dwt.idwt3d_wavelet_packet().unwrap();

            let recon = dwt.release_data();
            assert!(max_abs_diff(&original, &recon) < 1e-10, "dims {:?}", dims);
        }
    }

    #[test]
    fn verify_dyadic_and_packet_agree_on_equal_levels() {
        // 32x32x32 admits the same level count on all axes, so both strategies are valid;
        // each must invert its own forward pass to the same source.
        let dims = [32usize, 32, 32];
        let mut rng = SmallRng::seed_from_u64(16);
        let original = random_volume(&mut rng, dims[0] * dims[1] * dims[2]);

        let mut dyadic = Dwt::new();
        dyadic.take_data(original.clone(), dims).unwrap();
        dyadic.dwt3d_dyadic().unwrap();
        dyadic.idwt3d_dyadic().unwrap();
        let err_dyadic = max_abs_diff(&original, dyadic.data());

        let mut packet = Dwt::new();
        packet.take_data(original.clone(), dims).unwrap();
        packet.dwt3d_wavelet_packet().unwrap();
        packet.idwt3d_wavelet_packet().unwrap();
        let err_packet = max_abs_diff(&original, packet.data());

        assert!(err_dyadic < 1e-10);
        assert!(err_packet < 1e-10);
        assert!((err_dyadic - err_packet).abs() < 1e-10);
    }

    #[test]
    fn verify_periodic_boundary_roundtrip_2d() {
        let mut rng = SmallRng::seed_from_u64(17);
        let (nx, ny) = (64usize, 32usize);
        let original = random_volume(&mut rng, nx * ny);

        let mut dwt = Dwt::new();
        dwt.set_boundary(Boundary::Periodic);
        dwt.take_data(original.clone(), [nx, ny, 1]).unwrap();
        dwt.dwt2d().unwrap();
        dwt.idwt2d().unwrap();

        assert!(max_abs_diff(&original, dwt.data()) < 1e-10);
    }
}
