// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `speck2d` module implements the embedded set-partitioning bitplane coder over a 2-D
//! coefficient plane (1-D inputs ride along with a Y extent of one).
//!
//! The plane is covered by an S-set rooted at the coarsest approximation subband plus an
//! L-shaped I-set for the rest. Each bitplane runs a sorting pass (testing and splitting sets)
//! and a refinement pass (one bit per previously significant pixel). A set's significance bit
//! is spent exactly where the set is processed, so the encoder's emission order and the
//! decoder's consumption order coincide by construction; the emitted bit sequence is the
//! entire contract.

use undula_core::dsp::{approx_detail_len, num_of_xforms};
use undula_core::errors::{invalid_param_error, wrong_size_error, Result};
use undula_core::io::{pack_booleans, unpack_booleans, BitBuffer};

use crate::sets::{partition_s_2d, SetType, Significance, SpeckSet2d};
use crate::stream::{
    parse_speck_header, speck_stream_size, write_speck_header, SpeckHeader, SPECK_HEADER_SIZE,
    SPECK_HEADER_SIZE_QZ,
};
use crate::{make_coeff_positive, max_coefficient_bits, SpeckCoder};

/// Hard cap on bitplane iterations; the budget or the input always runs out first.
const MAX_BITPLANES: usize = 128;

/// A LIS bucket is compacted only past this size and over half dead.
const GARBAGE_MIN: usize = 16;

/// The 2-D SPECK coder.
#[derive(Default)]
pub struct Speck2d {
    dim_x: usize,
    dim_y: usize,
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
    lis: Vec<Vec<SpeckSet2d>>,
    lis_garbage_cnt: Vec<usize>,
    lsp: Vec<SpeckSet2d>,
    i_set: SpeckSet2d,
}

impl Speck2d {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the sample mean for the stream header. Purely diagnostic; inversion is the
    /// conditioner's job.
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
        [self.dim_x, self.dim_y, 1]
    }

    fn num_of_joint_partitions(&self) -> usize {
        let mut parts = 0;
        let (mut dx, mut dy) = (self.dim_x, self.dim_y);
        while dx > 1 || dy > 1 {
            parts += 1;
            dx -= dx / 2;
            dy -= dy / 2;
        }
        parts
    }

    fn initialize_sets_lists(&mut self) {
        let num_parts = self.num_of_joint_partitions();
        let num_xforms = num_of_xforms(self.dim_x.min(self.dim_y));

        self.lis.clear();
        self.lis.resize(num_parts + 1, Vec::new());
        for bucket in &mut self.lis {
            bucket.reserve(GARBAGE_MIN);
        }
        self.lis_garbage_cnt.clear();
        self.lis_garbage_cnt.resize(num_parts + 1, 0);

        // The root S-set is the coarsest approximation subband.
        let (root_len_x, _) = approx_detail_len(self.dim_x, num_xforms);
        let (root_len_y, _) = approx_detail_len(self.dim_y, num_xforms);
        let root = SpeckSet2d {
            start_x: 0,
            start_y: 0,
            length_x: root_len_x as u32,
            length_y: root_len_y as u32,
            part_level: num_xforms as u16,
            ..Default::default()
        };
        self.lis[root.part_level as usize].push(root);

        self.lsp.clear();
        self.lsp.reserve(GARBAGE_MIN);

        // The I-set is the L-shaped rest of the plane. Its lengths record the enclosing
        // rectangle, its start the corner cut out by the root.
        self.i_set = SpeckSet2d::new_i();
        self.i_set.part_level = num_xforms as u16;
        self.i_set.start_x = root.length_x;
        self.i_set.start_y = root.length_y;
        self.i_set.length_x = self.dim_x as u32;
        self.i_set.length_y = self.dim_y as u32;
    }

    fn set_is_significant(&self, set: &SpeckSet2d) -> bool {
        for y in set.start_y..set.start_y + set.length_y {
            let row = y as usize * self.dim_x;
            for x in set.start_x..set.start_x + set.length_x {
                if self.significance_map[row + x as usize] {
                    return true;
                }
            }
        }
        false
    }

    /// An I-set is tested as two rectangles: right of the cut-out corner, then the full rows
    /// below it (the latter contiguous in memory).
    fn i_set_is_significant(&self) -> bool {
        let set = &self.i_set;
        for y in 0..set.start_y {
            let row = y as usize * self.dim_x;
            for x in set.start_x as usize..self.dim_x {
                if self.significance_map[row + x] {
                    return true;
                }
            }
        }
        let from = set.start_y as usize * self.dim_x;
        self.significance_map[from..].iter().any(|s| *s)
    }

    fn mark_garbage(&mut self, idx1: usize, idx2: usize) {
        self.lis[idx1][idx2].set_type = SetType::Garbage;
        self.lis_garbage_cnt[idx1] += 1;
    }

    /// Test, emit or consume, and act on one LIS set. `counter` tallies significant siblings
    /// for the caller's inference; with `coded` false the significance is taken as given.
    /// Returns `true` once the budget or the input bits run out.
    fn process_s(&mut self, idx1: usize, idx2: usize, counter: &mut u32, coded: bool) -> bool {
        let set = self.lis[idx1][idx2];
        debug_assert!(!set.is_empty());

        let significant = if coded {
            if self.encode_mode {
                let sig = self.set_is_significant(&set);
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

        if !significant {
            return false;
        }
        *counter += 1;

        if set.is_pixel() {
            let idx = set.start_y as usize * self.dim_x + set.start_x as usize;
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
            let mut pixel = set;
            pixel.signif = Significance::NewlySig;
            self.lsp.push(pixel);
            self.mark_garbage(idx1, idx2);
        }
        else {
            if self.code_s(idx1, idx2) {
                return true;
            }
            self.mark_garbage(idx1, idx2);
        }

        false
    }

    fn code_s(&mut self, idx1: usize, idx2: usize) -> bool {
        let set = self.lis[idx1][idx2];
        let subsets = partition_s_2d(&set);

        let last = match subsets.iter().rposition(|s| !s.is_empty()) {
            Some(last) => last,
            None => return false,
        };

        let mut counter = 0u32;
        for (i, subset) in subsets.iter().enumerate() {
            if subset.is_empty() {
                continue;
            }
            // The last non-empty quadrant of a significant set is itself significant whenever
            // all its earlier siblings were not; neither side spends a bit on it then.
            let coded = !(i == last && counter == 0);
            let lev = subset.part_level as usize;
            self.lis[lev].push(*subset);
            let pos = self.lis[lev].len() - 1;
            if self.process_s(lev, pos, &mut counter, coded) {
                return true;
            }
        }

        false
    }

    /// Test, emit or consume, and act on the I-set.
    fn process_i(&mut self, coded: bool) -> bool {
        if self.i_set.part_level == 0 {
            return false;
        }

        let significant = if coded {
            if self.encode_mode {
                let sig = self.i_set_is_significant();
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
            return self.code_i();
        }

        false
    }

    /// Partition the I-set into BR, TR, BL children at the current level, shrinking the
    /// residual I in place.
    fn partition_i(&mut self) -> [SpeckSet2d; 3] {
        let current_lev = self.i_set.part_level;
        let (approx_len_x, detail_len_x) = approx_detail_len(self.dim_x, current_lev as usize);
        let (approx_len_y, detail_len_y) = approx_detail_len(self.dim_y, current_lev as usize);

        let br = SpeckSet2d {
            start_x: approx_len_x as u32,
            start_y: approx_len_y as u32,
            length_x: detail_len_x as u32,
            length_y: detail_len_y as u32,
            part_level: current_lev,
            ..Default::default()
        };
        let tr = SpeckSet2d {
            start_x: approx_len_x as u32,
            start_y: 0,
            length_x: detail_len_x as u32,
            length_y: approx_len_y as u32,
            part_level: current_lev,
            ..Default::default()
        };
        let bl = SpeckSet2d {
            start_x: 0,
            start_y: approx_len_y as u32,
            length_x: approx_len_x as u32,
            length_y: detail_len_y as u32,
            part_level: current_lev,
            ..Default::default()
        };

        self.i_set.part_level -= 1;
        self.i_set.start_x += detail_len_x as u32;
        self.i_set.start_y += detail_len_y as u32;

        [br, tr, bl]
    }

    fn code_i(&mut self) -> bool {
        let subsets = self.partition_i();

        let mut counter = 0u32;
        for subset in subsets.iter() {
            if subset.is_empty() {
                continue;
            }
            let lev = subset.part_level as usize;
            self.lis[lev].push(*subset);
            let pos = self.lis[lev].len() - 1;
            if self.process_s(lev, pos, &mut counter, true) {
                return true;
            }
        }

        // The residual I is the last sibling: when none of the three S-children was
        // significant, the significance must sit in the residual and no bit is spent on it.
        if self.i_set.part_level > 0 {
            return self.process_i(counter != 0);
        }
        debug_assert!(counter > 0, "significant I-set with empty residual and no child");

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

        if self.process_i(true) {
            return true;
        }

        false
    }

    fn refinement_pass(&mut self) -> bool {
        for k in 0..self.lsp.len() {
            if self.lsp[k].signif == Significance::NewlySig {
                self.lsp[k].signif = Significance::Sig;
                continue;
            }

            let pixel = self.lsp[k];
            let idx = pixel.start_y as usize * self.dim_x + pixel.start_x as usize;

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
            if *cnt > GARBAGE_MIN && *cnt > bucket.len() / 2 {
                bucket.retain(|s| s.set_type != SetType::Garbage);
                *cnt = 0;
            }
        }
    }

    fn qz_threshold(&self) -> Option<f64> {
        self.qz_level.map(|q| 2.0f64.powi(q))
    }

    fn ready_to_encode(&self) -> Result<()> {
        if self.dim_x == 0 || self.dim_y == 0 {
            return invalid_param_error("encoder dimensions not set");
        }
        if self.coeff_buf.len() != self.dim_x * self.dim_y {
            return wrong_size_error("coefficient buffer does not match dimensions");
        }
        if self.budget.is_none() && self.qz_level.is_none() {
            return invalid_param_error("neither a bit budget nor a qz level is set");
        }
        Ok(())
    }
}

impl SpeckCoder for Speck2d {
    fn take_data(&mut self, coeffs: Vec<f64>, dims: [usize; 3]) -> Result<()> {
        if dims[2] != 1 {
            return invalid_param_error("the 2-D coder requires a Z extent of one");
        }
        if coeffs.len() != dims[0] * dims[1] {
            return wrong_size_error("coefficient buffer does not match dimensions");
        }
        self.coeff_buf = coeffs;
        self.dim_x = dims[0];
        self.dim_y = dims[1];
        Ok(())
    }

    fn set_bit_budget(&mut self, budget: usize) {
        // Fill up the last byte; the packed stream is whole bytes anyway.
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
        let qz_threshold = self.qz_threshold();

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
        if self.dim_x == 0 || self.dim_y == 0 {
            return invalid_param_error("decoder dimensions not set");
        }
        self.encode_mode = false;

        let num_vals = self.dim_x * self.dim_y;
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
            dims: [self.dim_x, self.dim_y, 1],
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
        if header.dims[2] != 1 {
            return invalid_param_error("the 2-D coder requires a Z extent of one");
        }
        self.dim_x = header.dims[0];
        self.dim_y = header.dims[1];
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
