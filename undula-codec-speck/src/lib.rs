// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SPECK set-partitioning bitplane coder with its SPERR outlier corrector, the per-chunk
//! compression pipeline, and the chunked, threaded volume orchestrator.
//!
//! A chunk travels through the pipeline as: conditioner -> CDF 9/7 transform -> SPECK encoder
//! (-> decode-back and SPERR outlier pass in quantization-termination mode) -> serialised
//! streams. [`volume`] splits an oversized volume into independent chunks, compresses them on
//! separate threads, and frames the result.

pub mod chunk;
pub mod sets;
pub mod speck2d;
pub mod speck3d;
pub mod sperr;
pub mod stream;
pub mod volume;

use undula_core::errors::Result;

/// Rate control for one compression unit.
#[derive(Clone, Copy, Debug)]
pub enum RateMode {
    /// Encode until the bit budget implied by bits-per-sample is spent.
    BitsPerSample(f64),
    /// Encode every bitplane down to threshold `2^level`, then correct residual outliers
    /// exceeding `tolerance` with a SPERR pass.
    QzTermination { level: i32, tolerance: f64 },
}

/// Split signs off a coefficient buffer, leaving magnitudes, and return the largest magnitude.
pub(crate) fn make_coeff_positive(buf: &mut [f64], signs: &mut Vec<bool>) -> f64 {
    signs.clear();
    signs.resize(buf.len(), true);
    let mut max = 0.0f64;
    for (v, s) in buf.iter_mut().zip(signs.iter_mut()) {
        if *v < 0.0 {
            *v = -*v;
            *s = false;
        }
        if *v > max {
            max = *v;
        }
    }
    max
}

/// The initial bitplane for a maximum coefficient magnitude: `floor(log2(max))`, clamped to
/// zero for an all-zero buffer.
pub(crate) fn max_coefficient_bits(max_coeff: f64) -> i16 {
    if max_coeff > 0.0 {
        max_coeff.log2().floor() as i16
    }
    else {
        0
    }
}

/// Common surface of the 2-D and 3-D SPECK coders, used by the per-chunk pipeline.
pub trait SpeckCoder {
    /// Take ownership of a coefficient buffer to encode.
    fn take_data(&mut self, coeffs: Vec<f64>, dims: [usize; 3]) -> Result<()>;

    /// Cap the number of coded bits. Rounded up to a whole byte.
    fn set_bit_budget(&mut self, budget: usize);

    /// Switch to quantization-termination mode, stopping at threshold `2^level`.
    fn set_qz_level(&mut self, level: i32);

    fn encode(&mut self) -> Result<()>;

    fn decode(&mut self) -> Result<()>;

    /// Give back the (encoded-from or decoded-into) coefficient buffer.
    fn release_data(&mut self) -> Vec<f64>;

    /// Serialise the header and packed bit buffer.
    fn encoded_bitstream(&mut self) -> Result<Vec<u8>>;

    /// Parse a stream produced by [`SpeckCoder::encoded_bitstream`].
    fn parse_bitstream(&mut self, stream: &[u8], qz_mode: bool) -> Result<()>;
}
