// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `sperr` module encodes outliers: indices whose reconstruction error still exceeds the
//! user tolerance after a quantization-terminated decode.
//!
//! The coder is a 1-D SPECK over the flat sample index space. The iteration count is fixed up
//! front from the largest error magnitude and the tolerance, so the final threshold lands just
//! below the tolerance and every corrected sample ends within it.

use undula_core::errors::{invalid_param_error, Result};
use undula_core::io::{pack_booleans, unpack_booleans, BitBuffer, ByteReader};

use crate::sets::{partition_s_1d, SetType, SpeckSet1d};
use crate::stream::SPERR_HEADER_SIZE;

/// One sample whose residual error exceeds the tolerance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Outlier {
    pub location: usize,
    pub error: f64,
}

impl Outlier {
    pub fn new(location: usize, error: f64) -> Self {
        Outlier { location, error }
    }
}

/// The SPERR outlier coder.
#[derive(Default)]
pub struct Sperr {
    total_len: usize,
    tolerance: f64,
    encode_mode: bool,
    threshold: f64,
    max_threshold: f32,
    num_itrs: usize,
    bits: BitBuffer,
    los: Vec<Outlier>,
    /// Remaining error magnitude per outlier during encoding.
    q: Vec<f64>,
    sig_map: Vec<bool>,
    lsp_new: Vec<usize>,
    lsp_old: Vec<usize>,
    recovered_signs: Vec<bool>,
    /// Number of outliers known before the current iteration; they are the ones refined.
    los_size: usize,
    lis: Vec<Vec<SpeckSet1d>>,
}

impl Sperr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of the flat index space the outliers live in.
    pub fn set_length(&mut self, len: usize) {
        self.total_len = len;
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    pub fn add_outlier(&mut self, location: usize, error: f64) {
        self.los.push(Outlier::new(location, error));
    }

    pub fn take_outliers(&mut self, list: Vec<Outlier>) {
        self.los = list;
    }

    pub fn outliers(&self) -> &[Outlier] {
        &self.los
    }

    pub fn release_outliers(&mut self) -> Vec<Outlier> {
        std::mem::take(&mut self.los)
    }

    fn initialize_lis(&mut self) {
        let num_of_parts = undula_core::dsp::num_of_partitions(self.total_len);
        self.lis.clear();
        self.lis.resize(num_of_parts + 1, Vec::new());

        // Two sets, each one half of the whole array.
        let whole = SpeckSet1d { start: 0, length: self.total_len, ..Default::default() };
        let halves = partition_s_1d(&whole);
        for half in halves {
            if half.length > 0 {
                self.lis[half.part_level as usize].push(half);
            }
        }
    }

    fn clean_lis(&mut self) {
        for bucket in &mut self.lis {
            bucket.retain(|s| s.set_type != SetType::Garbage);
        }
    }

    fn ready_to_encode(&self) -> Result<()> {
        if self.total_len == 0 {
            return invalid_param_error("outlier coder length not set");
        }
        if self.tolerance <= 0.0 {
            return invalid_param_error("outlier tolerance must be positive");
        }
        if self.los.is_empty() {
            return invalid_param_error("no outliers to encode");
        }
        if self.los.iter().any(|o| o.error.abs() < self.tolerance) {
            return invalid_param_error("outlier error below the tolerance");
        }
        // The list is sorted by now; locations must be unique and in range.
        if self.los.last().map(|o| o.location >= self.total_len) == Some(true) {
            return invalid_param_error("outlier location out of range");
        }
        if self.los.windows(2).any(|w| w[0].location == w[1].location) {
            return invalid_param_error("duplicate outlier locations");
        }
        Ok(())
    }

    /// Significance of a set via the significance map, plus the index of the outlier
    /// responsible, recovered by binary search over the sorted list.
    fn decide_significance(&self, set: &SpeckSet1d) -> (bool, usize) {
        let range = &self.sig_map[set.start..set.start + set.length];
        match range.iter().position(|s| *s) {
            Some(offset) => {
                let location = set.start + offset;
                let idx = self.los.partition_point(|o| o.location < location);
                debug_assert!(self.los[idx].location == location);
                (true, idx)
            }
            None => (false, 0),
        }
    }

    fn process_s_encoding(&mut self, idx1: usize, idx2: usize, counter: &mut u32, coded: bool) {
        let set = self.lis[idx1][idx2];
        let (is_sig, sig_idx) = self.decide_significance(&set);

        if coded {
            self.bits.push_bit(is_sig);
        }
        debug_assert!(coded || is_sig);

        if is_sig {
            *counter += 1;
            if set.length == 1 {
                self.bits.push_bit(self.los[sig_idx].error >= 0.0);
                self.lsp_new.push(sig_idx);
                self.q[sig_idx] -= self.threshold;
            }
            else {
                self.code_s(idx1, idx2);
            }
            self.lis[idx1][idx2].set_type = SetType::Garbage;
        }
    }

    fn process_s_decoding(&mut self, idx1: usize, idx2: usize, counter: &mut u32, coded: bool) -> bool {
        let is_sig = if coded {
            match self.bits.pop_bit() {
                Some(bit) => bit,
                None => return true,
            }
        }
        else {
            true
        };

        if is_sig {
            *counter += 1;
            let set = self.lis[idx1][idx2];
            if set.length == 1 {
                match self.bits.pop_bit() {
                    Some(sign) => {
                        self.los.push(Outlier::new(set.start, 1.5 * self.threshold));
                        self.recovered_signs.push(sign);
                    }
                    None => return true,
                }
            }
            else if self.code_s(idx1, idx2) {
                return true;
            }
            self.lis[idx1][idx2].set_type = SetType::Garbage;
        }

        false
    }

    fn code_s(&mut self, idx1: usize, idx2: usize) -> bool {
        let halves = partition_s_1d(&self.lis[idx1][idx2]);
        let mut counter = 0u32;

        if halves[0].length > 0 {
            let lev = halves[0].part_level as usize;
            self.lis[lev].push(halves[0]);
            let pos = self.lis[lev].len() - 1;
            if self.encode_mode {
                self.process_s_encoding(lev, pos, &mut counter, true);
            }
            else if self.process_s_decoding(lev, pos, &mut counter, true) {
                return true;
            }
        }

        if halves[1].length > 0 {
            let lev = halves[1].part_level as usize;
            self.lis[lev].push(halves[1]);
            let pos = self.lis[lev].len() - 1;
            // When the first half held no significance, the second half must; no bit then.
            let coded = counter != 0;
            if self.encode_mode {
                self.process_s_encoding(lev, pos, &mut counter, coded);
            }
            else if self.process_s_decoding(lev, pos, &mut counter, coded) {
                return true;
            }
        }

        false
    }

    fn sorting_pass(&mut self) -> bool {
        let mut dummy = 0u32;
        for idx1 in (0..self.lis.len()).rev() {
            for idx2 in 0..self.lis[idx1].len() {
                if self.lis[idx1][idx2].set_type == SetType::Garbage {
                    continue;
                }
                if self.encode_mode {
                    self.process_s_encoding(idx1, idx2, &mut dummy, true);
                }
                else if self.process_s_decoding(idx1, idx2, &mut dummy, true) {
                    return true;
                }
            }
        }
        false
    }

    fn refinement_pass_encoding(&mut self) {
        for k in 0..self.lsp_old.len() {
            let idx = self.lsp_old[k];
            let refine = self.q[idx] >= self.threshold;
            self.bits.push_bit(refine);
            if refine {
                self.q[idx] -= self.threshold;
            }
        }
        self.lsp_old.append(&mut self.lsp_new);
    }

    fn refinement_pass_decoding(&mut self) -> bool {
        for k in 0..self.los_size {
            match self.bits.pop_bit() {
                Some(bit) => {
                    let half = 0.5 * self.threshold;
                    self.los[k].error += if bit { half } else { -half };
                }
                None => return true,
            }
        }
        self.los_size = self.los.len();
        false
    }

    pub fn encode(&mut self) -> Result<()> {
        // Sort by location first; lists produced by the compressor already are, so this is
        // usually free.
        self.los.sort_by_key(|o| o.location);
        self.ready_to_encode()?;
        self.encode_mode = true;

        self.bits.clear();
        self.bits.set_budget(None);
        self.initialize_lis();

        self.q.clear();
        self.q.extend(self.los.iter().map(|o| o.error.abs()));
        self.lsp_new.clear();
        self.lsp_old.clear();
        self.lsp_old.reserve(self.los.len());

        // Start from just under the tolerance and double until one more doubling would pass
        // the largest magnitude; the iteration count follows.
        let max_q = self.q.iter().fold(0.0f64, |m, v| m.max(*v));
        let mut max_t = self.tolerance * 0.99;
        self.num_itrs = 1;
        while max_t * 2.0 < max_q {
            max_t *= 2.0;
            self.num_itrs += 1;
        }
        self.max_threshold = max_t as f32;
        self.threshold = f64::from(self.max_threshold);

        for _ in 0..self.num_itrs {
            self.sig_map.clear();
            self.sig_map.resize(self.total_len, false);
            for (o, q) in self.los.iter().zip(self.q.iter()) {
                if *q >= self.threshold {
                    self.sig_map[o.location] = true;
                }
            }

            self.sorting_pass();
            self.refinement_pass_encoding();

            self.threshold *= 0.5;
            self.clean_lis();
        }

        Ok(())
    }

    pub fn decode(&mut self) -> Result<()> {
        if self.total_len == 0 {
            return invalid_param_error("outlier coder length not set");
        }
        if self.bits.is_empty() {
            return invalid_param_error("no outlier bitstream to decode");
        }
        self.encode_mode = false;

        self.los.clear();
        self.recovered_signs.clear();
        self.initialize_lis();
        self.bits.rewind();
        self.bits.set_budget(None);
        self.los_size = 0;

        self.threshold = f64::from(self.max_threshold);

        for _ in 0..64 {
            if self.sorting_pass() {
                break;
            }
            if self.refinement_pass_decoding() {
                break;
            }
            self.threshold *= 0.5;
            self.clean_lis();
            if self.bits.remaining() == 0 {
                break;
            }
        }

        for (o, sign) in self.los.iter_mut().zip(self.recovered_signs.iter()) {
            if !*sign {
                o.error = -o.error;
            }
        }

        Ok(())
    }

    /// Serialise: flat length (u64), starting threshold (f32), useful bit count (u64), packed
    /// bits.
    pub fn encoded_bitstream(&mut self) -> Result<Vec<u8>> {
        let useful_bits = self.bits.pad_to_byte();
        let num_bytes = self.bits.len() / 8;

        let mut out = Vec::with_capacity(SPERR_HEADER_SIZE + num_bytes);
        out.extend_from_slice(&(self.total_len as u64).to_le_bytes());
        out.extend_from_slice(&self.max_threshold.to_le_bytes());
        out.extend_from_slice(&(useful_bits as u64).to_le_bytes());
        out.resize(SPERR_HEADER_SIZE + num_bytes, 0);
        pack_booleans(&mut out[SPERR_HEADER_SIZE..], self.bits.as_slice(), 0)?;

        self.bits.truncate(useful_bits);
        Ok(out)
    }

    pub fn parse_bitstream(&mut self, stream: &[u8]) -> Result<()> {
        let mut reader = ByteReader::new(stream);
        self.total_len = reader.read_u64()? as usize;
        self.max_threshold = reader.read_f32()?;
        let num_bits = reader.read_u64()? as usize;

        let mut bits = vec![false; (stream.len() - SPERR_HEADER_SIZE) * 8];
        unpack_booleans(&mut bits, stream, SPERR_HEADER_SIZE)?;
        bits.truncate(num_bits);
        self.bits.load(bits);

        Ok(())
    }
}
