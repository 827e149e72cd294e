// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `speck3d` module implements the embedded set-partitioning bitplane coder over a 3-D
//! coefficient volume.
//!
//! Unlike the 2-D coder, single pixels live in their own list (the LIP) rather than as
//! degenerate S-sets, and the initial partitioning descends a mixed-level pyramid: octant
//! splits while both the XY plane and the Z axis have levels left, then plane-only or Z-only
//! splits for the remainder. Within `code_S`, the last non-empty child's significance is
//! inferred when every earlier sibling came up insignificant, and no bit is spent on it.

use undula_core::dsp::num_of_xforms;
use undula_core::errors::{invalid_param_error, wrong_size_error, Result};
use undula_core::io::{pack_booleans, unpack_booleans, BitBuffer};

use crate::sets::{
    partition_s_xy, partition_s_xyz, partition_s_z, SetType, SpeckSet3d,
};
use crate::stream::{
    parse_speck_header, speck_stream_size, write_speck_header, SpeckHeader, SPECK_HEADER_SIZE,
    SPECK_HEADER_SIZE_QZ,
};
use crate::{make_coeff_positive, max_coefficient_bits, SpeckCoder};

const MAX_BITPLANES: usize = 128;
const GARBAGE_MIN: usize = 16;

/// The 3-D SPECK coder.
#[derive(Default)]
pub struct Speck3d {
    dims: [usize; 3],
    image_mean: f64,
    max_coeff_bits: i16,
    budget: Option<usize>,
    qz_level: Option<i32>,
    encode_mode: bool,
    threshold: f64,
    bits: BitBuffer,
    coeff_buf: Vec<f64>,
    sign_array: Vec<bool>,
    significance_map: Vec<bool>,
    lis: Vec<Vec<SpeckSet3d>>,
    lis_garbage_cnt: Vec<usize>,
    /// Insignificant pixels by flat index, with a parallel garbage flag per entry.
    lip: Vec<usize>,
    lip_garbage: Vec<bool>,
    lip_garbage_cnt: usize,
    /// Significant pixels by flat index, with a parallel newly-significant flag.
    lsp: Vec<usize>,
    lsp_newly: Vec<bool>,
}

impl Speck3d {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_image_mean(&mut self, mean: f64) {
        self.image_mean = mean;
    }

    pub fn image_mean(&self) -> f64 {
        self.image_mean
    }

    pub fn max_coeff_bits(&self) -> i16 {
        self.max_coeff_bits
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    fn flat_index(&self, set: &SpeckSet3d) -> usize {
        set.start_z as usize * self.dims[0] * self.dims[1]
            + set.start_y as usize * self.dims[0]
            + set.start_x as usize
    }

    fn num_of_partitions_per_axis(&self) -> [usize; 3] {
        let mut parts = [0usize; 3];
        for (p, d) in parts.iter_mut().zip(self.dims.iter()) {
            let mut dim = *d;
            while dim > 1 {
                *p += 1;
                dim -= dim / 2;
            }
        }
        parts
    }

    /// File a freshly partitioned set where it belongs: pixels into the LIP, everything else
    /// into its LIS bucket. Empty sets are dropped on the floor; both sides of the codec
    /// partition identically, so neither ever spends a bit on them.
    fn insert_set(&mut self, set: SpeckSet3d) {
        if set.is_empty() {
            return;
        }
        if set.is_pixel() {
            self.lip.push(self.flat_index(&set));
            self.lip_garbage.push(false);
        }
        else {
            self.lis[set.total_partitions()].push(set);
        }
    }

    fn initialize_sets_lists(&mut self) {
        let parts = self.num_of_partitions_per_axis();
        let num_of_sizes = 1 + parts[0] + parts[1] + parts[2];

        self.lis.clear();
        self.lis.resize(num_of_sizes, Vec::new());
        for bucket in &mut self.lis {
            bucket.reserve(GARBAGE_MIN);
        }
        self.lis_garbage_cnt.clear();
        self.lis_garbage_cnt.resize(num_of_sizes, 0);
        self.lip.clear();
        self.lip_garbage.clear();
        self.lip_garbage_cnt = 0;
        self.lsp.clear();
        self.lsp_newly.clear();

        // Descend the pyramid: octant splits while both resolutions have levels left, then
        // whichever of the XY plane or the Z axis still does.
        let mut big = SpeckSet3d {
            length_x: self.dims[0] as u32,
            length_y: self.dims[1] as u32,
            length_z: self.dims[2] as u32,
            ..Default::default()
        };
        let xforms_xy = num_of_xforms(self.dims[0].min(self.dims[1]));
        let xforms_z = num_of_xforms(self.dims[2]);

        let mut xf = 0;
        while xf < xforms_xy && xf < xforms_z {
            let subsets = partition_s_xyz(&big);
            big = subsets[0];
            for subset in &subsets[1..] {
                self.insert_set(*subset);
            }
            xf += 1;
        }
        while xf < xforms_xy {
            let subsets = partition_s_xy(&big);
            big = subsets[0];
            for subset in &subsets[1..] {
                self.insert_set(*subset);
            }
            xf += 1;
        }
        while xf < xforms_z {
            let subsets = partition_s_z(&big);
            big = subsets[0];
            self.insert_set(subsets[1]);
            xf += 1;
        }

        // The approximation subband is the most likely significant, so it goes first in line.
        if big.is_pixel() {
            self.lip.insert(0, self.flat_index(&big));
            self.lip_garbage.insert(0, false);
        }
        else {
            self.lis[big.total_partitions()].insert(0, big);
        }
    }

    fn set_is_significant(&self, set: &SpeckSet3d) -> bool {
        let slice_size = self.dims[0] * self.dims[1];
        for z in set.start_z..set.start_z + set.length_z {
            let slice_offset = z as usize * slice_size;
            for y in set.start_y..set.start_y + set.length_y {
                let col_offset = slice_offset + y as usize * self.dims[0];
                for x in set.start_x..set.start_x + set.length_x {
                    if self.significance_map[col_offset + x as usize] {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Test, emit or consume, and act on one LIS set. `counter` tallies significant siblings
    /// for the caller's inference; with `coded` false the significance is taken as given.
    fn process_s(&mut self, idx1: usize, idx2: usize, counter: &mut u32, coded: bool) -> bool {
        debug_assert!(!self.lis[idx1][idx2].is_pixel());

        let significant = if coded {
            if self.encode_mode {
                let sig = self.set_is_significant(&self.lis[idx1][idx2]);
                if self.bits.push_bit(sig) {
                    return true;
                }
                sig
            }
            else {
                match self.bits.pop_bit() {
                    Some(bit) => bit,
                    None => return true,
                }
            }
        }
        else {
            true
        };

        if significant {
            *counter += 1;
            if self.code_s(idx1, idx2) {
                return true;
            }
            self.lis[idx1][idx2].set_type = SetType::Garbage;
            self.lis_garbage_cnt[idx1] += 1;
        }

        false
    }

    /// Test, emit or consume, and act on one LIP pixel.
    fn process_p(&mut self, loc: usize, counter: &mut u32, coded: bool) -> bool {
        let idx = self.lip[loc];

        let significant = if coded {
            if self.encode_mode {
                let sig = self.significance_map[idx];
                if self.bits.push_bit(sig) {
                    return true;
                }
                sig
            }
            else {
                match self.bits.pop_bit() {
                    Some(bit) => bit,
                    None => return true,
                }
            }
        }
        else {
            true
        };

        if significant {
            *counter += 1;
            if self.encode_mode {
                let stop = self.bits.push_bit(self.sign_array[idx]);
                self.coeff_buf[idx] -= self.threshold;
                if stop {
                    return true;
                }
            }
            else {
                match self.bits.pop_bit() {
                    Some(bit) => self.sign_array[idx] = bit,
                    None => return true,
                }
                self.coeff_buf[idx] = 1.5 * self.threshold;
            }
            self.lsp.push(idx);
            self.lsp_newly.push(true);
            self.lip_garbage[loc] = true;
            self.lip_garbage_cnt += 1;
        }

        false
    }

    fn code_s(&mut self, idx1: usize, idx2: usize) -> bool {
        let set = self.lis[idx1][idx2];
        let subsets = partition_s_xyz(&set);

        let last = match subsets.iter().rposition(|s| !s.is_empty()) {
            Some(last) => last,
            None => return false,
        };

        let mut counter = 0u32;
        for (i, subset) in subsets.iter().enumerate() {
            if subset.is_empty() {
                continue;
            }
            // The last non-empty child of a significant set is itself significant whenever all
            // its earlier siblings were not; neither side spends a bit on it then.
            let coded = !(i == last && counter == 0);
            if subset.is_pixel() {
                self.lip.push(self.flat_index(subset));
                self.lip_garbage.push(false);
                let loc = self.lip.len() - 1;
                if self.process_p(loc, &mut counter, coded) {
                    return true;
                }
            }
            else {
                let lev = subset.total_partitions();
                self.lis[lev].push(*subset);
                let pos = self.lis[lev].len() - 1;
                if self.process_s(lev, pos, &mut counter, coded) {
                    return true;
                }
            }
        }

        false
    }

    fn sorting_pass(&mut self) -> bool {
        if self.encode_mode {
            self.significance_map.clear();
            self.significance_map.resize(self.coeff_buf.len(), false);
            for (m, c) in self.significance_map.iter_mut().zip(self.coeff_buf.iter()) {
                *m = *c >= self.threshold;
            }
        }

        let mut dummy = 0u32;

        // Lone pixels first, then sets from the most refined bucket to the coarsest. Entries
        // appended mid-pass were already processed at their creation inside code_S.
        for loc in 0..self.lip.len() {
            if !self.lip_garbage[loc] && self.process_p(loc, &mut dummy, true) {
                return true;
            }
        }

        for idx1 in (0..self.lis.len()).rev() {
            for idx2 in 0..self.lis[idx1].len() {
                if self.lis[idx1][idx2].set_type == SetType::Garbage {
                    continue;
                }
                if self.process_s(idx1, idx2, &mut dummy, true) {
                    return true;
                }
            }
        }

        false
    }

    fn refinement_pass(&mut self) -> bool {
        for k in 0..self.lsp.len() {
            if self.lsp_newly[k] {
                self.lsp_newly[k] = false;
                continue;
            }

            let idx = self.lsp[k];
            if self.encode_mode {
                if self.coeff_buf[idx] >= self.threshold {
                    let stop = self.bits.push_bit(true);
                    self.coeff_buf[idx] -= self.threshold;
                    if stop {
                        return true;
                    }
                }
                else if self.bits.push_bit(false) {
                    return true;
                }
            }
            else {
                match self.bits.pop_bit() {
                    Some(bit) => {
                        let half = 0.5 * self.threshold;
                        self.coeff_buf[idx] += if bit { half } else { -half };
                    }
                    None => return true,
                }
            }
        }

        false
    }

    fn clean_lis(&mut self) {
        for (bucket, cnt) in self.lis.iter_mut().zip(self.lis_garbage_cnt.iter_mut()) {
            if *cnt > GARBAGE_MIN && *cnt >= bucket.len() / 2 {
                bucket.retain(|s| s.set_type != SetType::Garbage);
                *cnt = 0;
            }
        }

        if self.lip_garbage_cnt > GARBAGE_MIN && self.lip_garbage_cnt >= self.lip.len() / 2 {
            let mut kept = Vec::with_capacity(self.lip.len() - self.lip_garbage_cnt);
            for (loc, &idx) in self.lip.iter().enumerate() {
                if !self.lip_garbage[loc] {
                    kept.push(idx);
                }
            }
            self.lip = kept;
            self.lip_garbage.clear();
            self.lip_garbage.resize(self.lip.len(), false);
            self.lip_garbage_cnt = 0;
        }
    }

    fn ready_to_encode(&self) -> Result<()> {
        if self.dims.iter().any(|d| *d == 0) {
            return invalid_param_error("encoder dimensions not set");
        }
        if self.coeff_buf.len() != self.dims[0] * self.dims[1] * self.dims[2] {
            return wrong_size_error("coefficient buffer does not match dimensions");
        }
        if self.budget.is_none() && self.qz_level.is_none() {
            return invalid_param_error("neither a bit budget nor a qz level is set");
        }
        Ok(())
    }
}

impl SpeckCoder for Speck3d {
    fn take_data(&mut self, coeffs: Vec<f64>, dims: [usize; 3]) -> Result<()> {
        if coeffs.len() != dims[0] * dims[1] * dims[2] {
            return wrong_size_error("coefficient buffer does not match dimensions");
        }
        self.coeff_buf = coeffs;
        self.dims = dims;
        Ok(())
    }

    fn set_bit_budget(&mut self, budget: usize) {
        let rounded = (budget + 7) / 8 * 8;
        self.budget = Some(rounded);
        self.qz_level = None;
    }

    fn set_qz_level(&mut self, level: i32) {
        self.qz_level = Some(level);
        self.budget = None;
    }

    fn encode(&mut self) -> Result<()> {
        self.ready_to_encode()?;
        self.encode_mode = true;

        self.initialize_sets_lists();
        self.bits.clear();
        self.bits.set_budget(self.budget);
        if let Some(budget) = self.budget {
            self.bits.reserve(budget);
        }

        let max_coeff = make_coeff_positive(&mut self.coeff_buf, &mut self.sign_array);
        self.max_coeff_bits = max_coefficient_bits(max_coeff);
        self.threshold = 2.0f64.powi(i32::from(self.max_coeff_bits));
        let qz_threshold = self.qz_level.map(|q| 2.0f64.powi(q));

        for _ in 0..MAX_BITPLANES {
            if let Some(qt) = qz_threshold {
                if self.threshold < qt {
                    break;
                }
            }
            if self.sorting_pass() {
                break;
            }
            if self.refinement_pass() {
                break;
            }
            self.threshold *= 0.5;
            self.clean_lis();
        }

        Ok(())
    }

    fn decode(&mut self) -> Result<()> {
        if self.dims.iter().any(|d| *d == 0) {
            return invalid_param_error("decoder dimensions not set");
        }
        self.encode_mode = false;

        let num_vals = self.dims[0] * self.dims[1] * self.dims[2];
        self.coeff_buf.clear();
        self.coeff_buf.resize(num_vals, 0.0);
        self.sign_array.clear();
        self.sign_array.resize(num_vals, true);

        self.initialize_sets_lists();
        self.bits.rewind();
        self.bits.set_budget(self.budget);
        self.threshold = 2.0f64.powi(i32::from(self.max_coeff_bits));

        for _ in 0..MAX_BITPLANES {
            if self.sorting_pass() {
                break;
            }
            if self.refinement_pass() {
                break;
            }
            self.threshold *= 0.5;
            self.clean_lis();
        }

        for (c, s) in self.coeff_buf.iter_mut().zip(self.sign_array.iter()) {
            if !*s {
                *c = -*c;
            }
        }

        Ok(())
    }

    fn release_data(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.coeff_buf)
    }

    fn encoded_bitstream(&mut self) -> Result<Vec<u8>> {
        let qz_mode = self.qz_level.is_some();
        let useful_bits = self.bits.pad_to_byte();
        let num_bytes = self.bits.len() / 8;
        let header_size = if qz_mode { SPECK_HEADER_SIZE_QZ } else { SPECK_HEADER_SIZE };

        let header = SpeckHeader {
            dims: self.dims,
            image_mean: self.image_mean,
            max_coeff_bits: self.max_coeff_bits,
            num_bits: qz_mode.then_some(useful_bits as u64),
        };

        let mut out = Vec::with_capacity(header_size + num_bytes);
        write_speck_header(&mut out, &header);
        out.resize(header_size + num_bytes, 0);
        pack_booleans(&mut out[header_size..], self.bits.as_slice(), 0)?;

        self.bits.truncate(useful_bits);
        Ok(out)
    }

    fn parse_bitstream(&mut self, stream: &[u8], qz_mode: bool) -> Result<()> {
        let header = parse_speck_header(stream, qz_mode)?;
        self.dims = header.dims;
        self.image_mean = header.image_mean;
        self.max_coeff_bits = header.max_coeff_bits;

        // A truncated stream is decodable; it just stops earlier.
        let end = speck_stream_size(stream, qz_mode)?.min(stream.len());
        let stream = &stream[..end];
        let header_size = if qz_mode { SPECK_HEADER_SIZE_QZ } else { SPECK_HEADER_SIZE };
        let mut bits = vec![false; (stream.len() - header_size) * 8];
        unpack_booleans(&mut bits, stream, header_size)?;
        if let Some(num_bits) = header.num_bits {
            bits.truncate(num_bits as usize);
        }
        self.bits.load(bits);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use undula_core::dsp::dwt::Dwt;

    fn synthetic_volume(dims: [usize; 3]) -> Vec<f64> {
        let mut vol = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    let fx = x as f64 / dims[0] as f64;
                    let fy = y as f64 / dims[1] as f64;
                    let fz = z as f64 / dims[2] as f64;
                    vol.push(
                        50.0 * (6.28 * fx).sin() * (3.14 * fy).cos()
                            + 20.0 * (9.42 * fz).sin()
                            + 5.0 * (25.0 * fx * fy * fz).cos(),
                    );
                }
            }
        }
        vol
    }

    fn mse(a: &[f64], b: &[f64]) -> f64 {
        let sum: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
        sum / a.len() as f64
    }

    #[test]
    fn verify_fidelity_improves_with_budget() {
        let dims = [32usize, 32, 32];
        let num_vals = dims[0] * dims[1] * dims[2];
        let original = synthetic_volume(dims);

        let mut dwt = Dwt::new();
        dwt.take_data(original.clone(), dims).unwrap();
        dwt.dwt3d().unwrap();

        let mut encoder = Speck3d::new();
        encoder.take_data(dwt.release_data(), dims).unwrap();
        encoder.set_bit_budget(4 * num_vals);
        encoder.encode().unwrap();
        let stream = encoder.encoded_bitstream().unwrap();

        let mut last_mse = f64::INFINITY;
        for bpp in [0.5, 1.0, 2.0, 4.0] {
            let mut decoder = Speck3d::new();
            decoder.parse_bitstream(&stream, false).unwrap();
            decoder.set_bit_budget((bpp * num_vals as f64) as usize);
            decoder.decode().unwrap();

            let mut idwt = Dwt::new();
            idwt.take_data(decoder.release_data(), dims).unwrap();
            idwt.idwt3d().unwrap();

            let err = mse(&original, idwt.data());
            assert!(err <= last_mse + 1e-12, "mse regressed at {} bpp", bpp);
            last_mse = err;
        }
        assert!(last_mse < 1.0);
    }

    #[test]
    fn verify_qz_mode_bounds_coefficient_error() {
        let dims = [32usize, 32, 32];
        let coeffs = synthetic_volume(dims);
        let qz_level = -5;

        let mut encoder = Speck3d::new();
        encoder.take_data(coeffs.clone(), dims).unwrap();
        encoder.set_qz_level(qz_level);
        encoder.encode().unwrap();
        let stream = encoder.encoded_bitstream().unwrap();

        let mut decoder = Speck3d::new();
        decoder.parse_bitstream(&stream, true).unwrap();
        decoder.decode().unwrap();
        let recon = decoder.release_data();

        let bound = 2.0f64.powi(qz_level);
        for (a, b) in coeffs.iter().zip(recon.iter()) {
            assert!((a - b).abs() <= bound + 1e-12);
        }
    }

    #[test]
    fn verify_truncated_stream_matches_budgeted_decode() {
        let dims = [24usize, 24, 24];
        let num_vals = dims[0] * dims[1] * dims[2];
        let original = synthetic_volume(dims);

        let mut encoder = Speck3d::new();
        encoder.take_data(original, dims).unwrap();
        encoder.set_bit_budget(2 * num_vals);
        encoder.encode().unwrap();
        let stream = encoder.encoded_bitstream().unwrap();

        let body_bytes = (stream.len() - SPECK_HEADER_SIZE) / 2;
        let truncated = &stream[..SPECK_HEADER_SIZE + body_bytes];

        let mut decoder_a = Speck3d::new();
        decoder_a.parse_bitstream(truncated, false).unwrap();
        decoder_a.decode().unwrap();

        let mut decoder_b = Speck3d::new();
        decoder_b.parse_bitstream(&stream, false).unwrap();
        decoder_b.set_bit_budget(body_bytes * 8);
        decoder_b.decode().unwrap();

        for (a, b) in decoder_a.release_data().iter().zip(decoder_b.release_data().iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn verify_tiny_volumes_roundtrip() {
        for dims in [[1usize, 1, 1], [2, 2, 2], [4, 3, 2], [8, 8, 8], [9, 7, 5]] {
            let num_vals = dims[0] * dims[1] * dims[2];
            let coeffs: Vec<f64> = (0..num_vals).map(|i| (i as f64 * 0.7).sin() * 10.0).collect();

            let mut encoder = Speck3d::new();
            encoder.take_data(coeffs.clone(), dims).unwrap();
            encoder.set_qz_level(-8);
            encoder.encode().unwrap();
            let stream = encoder.encoded_bitstream().unwrap();

            let mut decoder = Speck3d::new();
            decoder.parse_bitstream(&stream, true).unwrap();
            decoder.decode().unwrap();
            let recon = decoder.release_data();

            let bound = 2.0f64.powi(-8);
            for (a, b) in coeffs.iter().zip(recon.iter()) {
                assert!((a - b).abs() <= bound + 1e-12, "dims {:?}", dims);
            }
        }
    }
}
