// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `cdf97` module implements the Cohen-Daubechies-Feauveau 9/7 biorthogonal wavelet pair as
//! a five-step lifting scheme.
//!
//! Every analysis kernel mutates the signal in place, leaving low-pass results at even indices
//! and high-pass results at odd indices (or vice versa for odd starting phase); the caller
//! regroups them into subband halves. Synthesis kernels run the identical steps in reverse with
//! the same constants, so the pair is exactly invertible for every boundary mode.
//!
//! The lifting constants follow the factoring in \[1\] with the scaling convention used by
//! existing 9/7 codecs rather than the paper's.
//!
//! \[1\] I. Daubechies, W. Sweldens, "Factoring wavelet transforms into lifting steps", Journal
//!       of Fourier Analysis and Applications, vol. 4, pp. 247-269, 1998.

use std::f64::consts::SQRT_2;

use crate::errors::{invalid_param_error, Result};

pub const ALPHA: f64 = -1.58615986717275;
pub const BETA: f64 = -0.05297864003258;
pub const GAMMA: f64 = 0.88293362717904;
pub const DELTA: f64 = 0.44350482244527;
pub const EPSILON: f64 = 1.14960430535816;

/// Boundary extension policy applied at both signal edges.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Boundary {
    /// Mirror the immediate interior neighbour (the neighbour counted twice).
    #[default]
    Symmetric,
    /// Wrap around; the signal length must be even.
    Periodic,
    /// 3-point linear extrapolation at each edge; falls back to symmetric for lengths 2 and 3.
    BoundaryWavelet,
}

/// Starting phase of the lifting ladder: whether index 0 carries a low-pass (even) or a
/// high-pass (odd) sample.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Phase {
    #[default]
    Even,
    Odd,
}

/// One level of forward lifting over the whole slice.
pub fn analysis(signal: &mut [f64], phase: Phase, boundary: Boundary) -> Result<()> {
    let len = signal.len();

    if len == 0 {
        return Ok(());
    }
    if len == 1 {
        match phase {
            Phase::Even => signal[0] *= SQRT_2,
            Phase::Odd => signal[0] /= SQRT_2,
        }
        return Ok(());
    }

    let boundary = effective_boundary(boundary, len)?;

    match (phase, len % 2 == 0, boundary) {
        (Phase::Even, true, Boundary::Symmetric) => analysis_symmetric_even_even(signal),
        (Phase::Even, false, Boundary::Symmetric) => analysis_symmetric_odd_even(signal),
        (Phase::Odd, true, Boundary::Symmetric) => analysis_symmetric_even_odd(signal),
        (Phase::Odd, false, Boundary::Symmetric) => analysis_symmetric_odd_odd(signal),
        (Phase::Even, true, Boundary::Periodic) => analysis_periodic_even_even(signal),
        (Phase::Odd, true, Boundary::Periodic) => analysis_periodic_even_odd(signal),
        (Phase::Even, true, Boundary::BoundaryWavelet) => analysis_boundary_even_even(signal),
        (Phase::Even, false, Boundary::BoundaryWavelet) => analysis_boundary_odd_even(signal),
        (Phase::Odd, true, Boundary::BoundaryWavelet) => analysis_boundary_even_odd(signal),
        (Phase::Odd, false, Boundary::BoundaryWavelet) => analysis_boundary_odd_odd(signal),
        (_, false, Boundary::Periodic) => unreachable!(),
    }

    Ok(())
}

/// One level of inverse lifting over the whole slice.
pub fn synthesis(signal: &mut [f64], phase: Phase, boundary: Boundary) -> Result<()> {
    let len = signal.len();

    if len == 0 {
        return Ok(());
    }
    if len == 1 {
        match phase {
            Phase::Even => signal[0] /= SQRT_2,
            Phase::Odd => signal[0] *= SQRT_2,
        }
        return Ok(());
    }

    let boundary = effective_boundary(boundary, len)?;

    match (phase, len % 2 == 0, boundary) {
        (Phase::Even, true, Boundary::Symmetric) => synthesis_symmetric_even_even(signal),
        (Phase::Even, false, Boundary::Symmetric) => synthesis_symmetric_odd_even(signal),
        (Phase::Odd, true, Boundary::Symmetric) => synthesis_symmetric_even_odd(signal),
        (Phase::Odd, false, Boundary::Symmetric) => synthesis_symmetric_odd_odd(signal),
        (Phase::Even, true, Boundary::Periodic) => synthesis_periodic_even_even(signal),
        (Phase::Odd, true, Boundary::Periodic) => synthesis_periodic_even_odd(signal),
        (Phase::Even, true, Boundary::BoundaryWavelet) => synthesis_boundary_even_even(signal),
        (Phase::Even, false, Boundary::BoundaryWavelet) => synthesis_boundary_odd_even(signal),
        (Phase::Odd, true, Boundary::BoundaryWavelet) => synthesis_boundary_even_odd(signal),
        (Phase::Odd, false, Boundary::BoundaryWavelet) => synthesis_boundary_odd_odd(signal),
        (_, false, Boundary::Periodic) => unreachable!(),
    }

    Ok(())
}

fn effective_boundary(boundary: Boundary, len: usize) -> Result<Boundary> {
    match boundary {
        Boundary::Periodic if len % 2 != 0 => {
            invalid_param_error("signal length must be even for periodic extension")
        }
        // The extrapolation needs four samples; shorter signals mirror instead.
        Boundary::BoundaryWavelet if len == 2 || len == 3 => Ok(Boundary::Symmetric),
        b => Ok(b),
    }
}

//
// Symmetric extension.
//

fn analysis_symmetric_even_even(s: &mut [f64]) {
    let n = s.len();

    let mut i = 1;
    while i < n - 2 {
        s[i] += ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] += 2.0 * ALPHA * s[n - 2];

    s[0] += 2.0 * BETA * s[1];
    let mut i = 2;
    while i < n {
        s[i] += BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] += GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] += 2.0 * GAMMA * s[n - 2];

    s[0] = EPSILON * (s[0] + 2.0 * DELTA * s[1]);
    let mut i = 2;
    while i < n {
        s[i] = EPSILON * (s[i] + DELTA * (s[i + 1] + s[i - 1]));
        i += 2;
    }

    let mut i = 1;
    while i < n {
        s[i] /= -EPSILON;
        i += 2;
    }
}

fn synthesis_symmetric_even_even(s: &mut [f64]) {
    let n = s.len();

    let mut i = 1;
    while i < n {
        s[i] *= -EPSILON;
        i += 2;
    }

    s[0] = s[0] / EPSILON - 2.0 * DELTA * s[1];
    let mut i = 2;
    while i < n {
        s[i] = s[i] / EPSILON - DELTA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] -= GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] -= 2.0 * GAMMA * s[n - 2];

    s[0] -= 2.0 * BETA * s[1];
    let mut i = 2;
    while i < n {
        s[i] -= BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] -= ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] -= 2.0 * ALPHA * s[n - 2];
}

fn analysis_symmetric_odd_even(s: &mut [f64]) {
    let n = s.len();

    let mut i = 1;
    while i < n - 1 {
        s[i] += ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    s[0] += 2.0 * BETA * s[1];
    let mut i = 2;
    while i < n - 2 {
        s[i] += BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] += 2.0 * BETA * s[n - 2];

    let mut i = 1;
    while i < n - 1 {
        s[i] += GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    s[0] = EPSILON * (s[0] + 2.0 * DELTA * s[1]);
    let mut i = 2;
    while i < n - 2 {
        s[i] = EPSILON * (s[i] + DELTA * (s[i + 1] + s[i - 1]));
        i += 2;
    }
    s[n - 1] = EPSILON * (s[n - 1] + 2.0 * DELTA * s[n - 2]);

    let mut i = 1;
    while i < n - 1 {
        s[i] /= -EPSILON;
        i += 2;
    }
}

fn synthesis_symmetric_odd_even(s: &mut [f64]) {
    let n = s.len();

    let mut i = 1;
    while i < n - 1 {
        s[i] *= -EPSILON;
        i += 2;
    }

    s[0] = s[0] / EPSILON - 2.0 * DELTA * s[1];
    let mut i = 2;
    while i < n - 2 {
        s[i] = s[i] / EPSILON - DELTA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] = s[n - 1] / EPSILON - 2.0 * DELTA * s[n - 2];

    let mut i = 1;
    while i < n - 1 {
        s[i] -= GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    s[0] -= 2.0 * BETA * s[1];
    let mut i = 2;
    while i < n - 2 {
        s[i] -= BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] -= 2.0 * BETA * s[n - 2];

    let mut i = 1;
    while i < n - 1 {
        s[i] -= ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
}

fn analysis_symmetric_even_odd(s: &mut [f64]) {
    let n = s.len();

    s[0] += 2.0 * ALPHA * s[1];
    let mut i = 2;
    while i < n {
        s[i] += ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] += BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] += 2.0 * BETA * s[n - 2];

    s[0] += 2.0 * GAMMA * s[1];
    let mut i = 2;
    while i < n {
        s[i] += GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] = EPSILON * (s[i] + DELTA * (s[i + 1] + s[i - 1]));
        i += 2;
    }
    s[n - 1] = EPSILON * (s[n - 1] + 2.0 * DELTA * s[n - 2]);

    let mut i = 0;
    while i < n {
        s[i] /= -EPSILON;
        i += 2;
    }
}

fn synthesis_symmetric_even_odd(s: &mut [f64]) {
    let n = s.len();

    let mut i = 0;
    while i < n {
        s[i] *= -EPSILON;
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] = s[i] / EPSILON - DELTA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] = s[n - 1] / EPSILON - 2.0 * DELTA * s[n - 2];

    s[0] -= 2.0 * GAMMA * s[1];
    let mut i = 2;
    while i < n {
        s[i] -= GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] -= BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] -= 2.0 * BETA * s[n - 2];

    s[0] -= 2.0 * ALPHA * s[1];
    let mut i = 2;
    while i < n {
        s[i] -= ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
}

fn analysis_symmetric_odd_odd(s: &mut [f64]) {
    let n = s.len();

    s[0] += 2.0 * ALPHA * s[1];
    let mut i = 2;
    while i < n - 2 {
        s[i] += ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] += 2.0 * ALPHA * s[n - 2];

    let mut i = 1;
    while i < n {
        s[i] += BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    s[0] += 2.0 * GAMMA * s[1];
    let mut i = 2;
    while i < n - 2 {
        s[i] += GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] += 2.0 * GAMMA * s[n - 2];

    let mut i = 1;
    while i < n {
        s[i] = EPSILON * (s[i] + DELTA * (s[i + 1] + s[i - 1]));
        i += 2;
    }

    let mut i = 0;
    while i < n {
        s[i] /= -EPSILON;
        i += 2;
    }
}

fn synthesis_symmetric_odd_odd(s: &mut [f64]) {
    let n = s.len();

    let mut i = 0;
    while i < n {
        s[i] *= -EPSILON;
        i += 2;
    }

    let mut i = 1;
    while i < n {
        s[i] = s[i] / EPSILON - DELTA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    s[0] -= 2.0 * GAMMA * s[1];
    let mut i = 2;
    while i < n - 2 {
        s[i] -= GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] -= 2.0 * GAMMA * s[n - 2];

    let mut i = 1;
    while i < n {
        s[i] -= BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    s[0] -= 2.0 * ALPHA * s[1];
    let mut i = 2;
    while i < n - 2 {
        s[i] -= ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] -= 2.0 * ALPHA * s[n - 2];
}

//
// Periodic extension. Even lengths only.
//

fn analysis_periodic_even_even(s: &mut [f64]) {
    let n = s.len();

    let mut i = 1;
    while i < n - 2 {
        s[i] += ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] += ALPHA * (s[n - 2] + s[0]);

    s[0] += BETA * (s[1] + s[n - 1]);
    let mut i = 2;
    while i < n {
        s[i] += BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] += GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] += GAMMA * (s[n - 2] + s[0]);

    s[0] = EPSILON * (s[0] + DELTA * (s[1] + s[n - 1]));
    let mut i = 2;
    while i < n {
        s[i] = EPSILON * (s[i] + DELTA * (s[i + 1] + s[i - 1]));
        i += 2;
    }

    let mut i = 1;
    while i < n {
        s[i] /= -EPSILON;
        i += 2;
    }
}

fn synthesis_periodic_even_even(s: &mut [f64]) {
    let n = s.len();

    let mut i = 1;
    while i < n {
        s[i] *= -EPSILON;
        i += 2;
    }

    s[0] = s[0] / EPSILON - DELTA * (s[1] + s[n - 1]);
    let mut i = 2;
    while i < n {
        s[i] = s[i] / EPSILON - DELTA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] -= GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] -= GAMMA * (s[n - 2] + s[0]);

    s[0] -= BETA * (s[1] + s[n - 1]);
    let mut i = 2;
    while i < n {
        s[i] -= BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] -= ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] -= ALPHA * (s[n - 2] + s[0]);
}

fn analysis_periodic_even_odd(s: &mut [f64]) {
    let n = s.len();

    s[0] += ALPHA * (s[n - 1] + s[1]);
    let mut i = 2;
    while i < n {
        s[i] += ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 1 {
        s[i] += BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] += BETA * (s[0] + s[n - 2]);

    s[0] += GAMMA * (s[n - 1] + s[1]);
    let mut i = 2;
    while i < n {
        s[i] += GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 1 {
        s[i] = EPSILON * (s[i] + DELTA * (s[i + 1] + s[i - 1]));
        i += 2;
    }
    s[n - 1] = EPSILON * (s[n - 1] + DELTA * (s[0] + s[n - 2]));

    let mut i = 0;
    while i < n {
        s[i] /= -EPSILON;
        i += 2;
    }
}

fn synthesis_periodic_even_odd(s: &mut [f64]) {
    let n = s.len();

    let mut i = 0;
    while i < n {
        s[i] *= -EPSILON;
        i += 2;
    }

    let mut i = 1;
    while i < n - 1 {
        s[i] = s[i] / EPSILON - DELTA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] = s[n - 1] / EPSILON - DELTA * (s[0] + s[n - 2]);

    s[0] -= GAMMA * (s[n - 1] + s[1]);
    let mut i = 2;
    while i < n {
        s[i] -= GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 1 {
        s[i] -= BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] -= BETA * (s[0] + s[n - 2]);

    s[0] -= ALPHA * (s[n - 1] + s[1]);
    let mut i = 2;
    while i < n {
        s[i] -= ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
}

//
// Boundary-wavelet extension: 3-point linear extrapolation, 3*s[1] - s[3] at the left edge and
// the mirrored expression at the right edge.
//

fn analysis_boundary_even_even(s: &mut [f64]) {
    let n = s.len();

    let mut i = 1;
    while i < n - 2 {
        s[i] += ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] += ALPHA * (3.0 * s[n - 2] - s[n - 4]);

    s[0] += BETA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n {
        s[i] += BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] += GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] += GAMMA * (3.0 * s[n - 2] - s[n - 4]);

    s[0] = EPSILON * (s[0] + DELTA * (3.0 * s[1] - s[3]));
    let mut i = 2;
    while i < n {
        s[i] = EPSILON * (s[i] + DELTA * (s[i + 1] + s[i - 1]));
        i += 2;
    }

    let mut i = 1;
    while i < n {
        s[i] /= -EPSILON;
        i += 2;
    }
}

fn synthesis_boundary_even_even(s: &mut [f64]) {
    let n = s.len();

    let mut i = 1;
    while i < n {
        s[i] *= -EPSILON;
        i += 2;
    }

    s[0] = s[0] / EPSILON - DELTA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n {
        s[i] = s[i] / EPSILON - DELTA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] -= GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] -= GAMMA * (3.0 * s[n - 2] - s[n - 4]);

    s[0] -= BETA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n {
        s[i] -= BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 2 {
        s[i] -= ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] -= ALPHA * (3.0 * s[n - 2] - s[n - 4]);
}

fn analysis_boundary_odd_even(s: &mut [f64]) {
    let n = s.len();

    let mut i = 1;
    while i < n {
        s[i] += ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    s[0] += BETA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n - 1 {
        s[i] += BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] += BETA * (3.0 * s[n - 2] - s[n - 4]);

    let mut i = 1;
    while i < n {
        s[i] += GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    s[0] = EPSILON * (s[0] + DELTA * (3.0 * s[1] - s[3]));
    let mut i = 2;
    while i < n - 1 {
        s[i] = EPSILON * (s[i] + DELTA * (s[i + 1] + s[i - 1]));
        i += 2;
    }
    s[n - 1] = EPSILON * (s[n - 1] + DELTA * (3.0 * s[n - 2] - s[n - 4]));

    let mut i = 1;
    while i < n {
        s[i] /= -EPSILON;
        i += 2;
    }
}

fn synthesis_boundary_odd_even(s: &mut [f64]) {
    let n = s.len();

    let mut i = 1;
    while i < n {
        s[i] *= -EPSILON;
        i += 2;
    }

    s[0] = s[0] / EPSILON - DELTA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n - 1 {
        s[i] = s[i] / EPSILON - DELTA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] = s[n - 1] / EPSILON - DELTA * (3.0 * s[n - 2] - s[n - 4]);

    let mut i = 1;
    while i < n {
        s[i] -= GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    s[0] -= BETA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n - 1 {
        s[i] -= BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] -= BETA * (3.0 * s[n - 2] - s[n - 4]);

    let mut i = 1;
    while i < n {
        s[i] -= ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
}

fn analysis_boundary_even_odd(s: &mut [f64]) {
    let n = s.len();

    s[0] += ALPHA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n {
        s[i] += ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 1 {
        s[i] += BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] += BETA * (3.0 * s[n - 2] - s[n - 4]);

    s[0] += GAMMA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n {
        s[i] += GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 1 {
        s[i] = EPSILON * (s[i] + DELTA * (s[i + 1] + s[i - 1]));
        i += 2;
    }
    s[n - 1] = EPSILON * (s[n - 1] + DELTA * (3.0 * s[n - 2] - s[n - 4]));

    let mut i = 0;
    while i < n {
        s[i] /= -EPSILON;
        i += 2;
    }
}

fn synthesis_boundary_even_odd(s: &mut [f64]) {
    let n = s.len();

    let mut i = 0;
    while i < n {
        s[i] *= -EPSILON;
        i += 2;
    }

    let mut i = 1;
    while i < n - 1 {
        s[i] = s[i] / EPSILON - DELTA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] = s[n - 1] / EPSILON - DELTA * (3.0 * s[n - 2] - s[n - 4]);

    s[0] -= GAMMA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n {
        s[i] -= GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }

    let mut i = 1;
    while i < n - 1 {
        s[i] -= BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }
    s[n - 1] -= BETA * (3.0 * s[n - 2] - s[n - 4]);

    s[0] -= ALPHA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n {
        s[i] -= ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
}

fn analysis_boundary_odd_odd(s: &mut [f64]) {
    let n = s.len();

    s[0] += ALPHA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n - 1 {
        s[i] += ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] += ALPHA * (3.0 * s[n - 2] - s[n - 4]);

    let mut i = 1;
    while i < n - 1 {
        s[i] += BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    s[0] += GAMMA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n - 1 {
        s[i] += GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] += GAMMA * (3.0 * s[n - 2] - s[n - 4]);

    let mut i = 1;
    while i < n - 1 {
        s[i] = EPSILON * (s[i] + DELTA * (s[i + 1] + s[i - 1]));
        i += 2;
    }

    let mut i = 0;
    while i < n {
        s[i] /= -EPSILON;
        i += 2;
    }
}

fn synthesis_boundary_odd_odd(s: &mut [f64]) {
    let n = s.len();

    let mut i = 0;
    while i < n {
        s[i] *= -EPSILON;
        i += 2;
    }

    let mut i = 1;
    while i < n - 1 {
        s[i] = s[i] / EPSILON - DELTA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    s[0] -= GAMMA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n - 1 {
        s[i] -= GAMMA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] -= GAMMA * (3.0 * s[n - 2] - s[n - 4]);

    let mut i = 1;
    while i < n - 1 {
        s[i] -= BETA * (s[i + 1] + s[i - 1]);
        i += 2;
    }

    s[0] -= ALPHA * (3.0 * s[1] - s[3]);
    let mut i = 2;
    while i < n - 1 {
        s[i] -= ALPHA * (s[i - 1] + s[i + 1]);
        i += 2;
    }
    s[n - 1] -= ALPHA * (3.0 * s[n - 2] - s[n - 4]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_signal(rng: &mut SmallRng, len: usize) -> Vec<f64> {
        (0..len).map(|_| rng.random::<f64>() * 2.0 - 1.0).collect()
    }

    fn max_abs(s: &[f64]) -> f64 {
        s.iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }

    fn assert_roundtrip(original: &[f64], phase: Phase, boundary: Boundary) {
        let mut signal = original.to_vec();
        analysis(&mut signal, phase, boundary).unwrap();
        synthesis(&mut signal, phase, boundary).unwrap();

        let tol = 1e-10 * max_abs(original).max(1.0);
        for (a, b) in signal.iter().zip(original.iter()) {
            assert!(
                (a - b).abs() <= tol,
                "roundtrip failed: phase {:?}, boundary {:?}, len {}",
                phase,
                boundary,
                original.len()
            );
        }
    }

    #[test]
    fn verify_symmetric_roundtrip() {
        let mut rng = SmallRng::seed_from_u64(97);
        for len in [1usize, 2, 3, 4, 5, 8, 9, 16, 27, 64, 127, 128, 333, 1024, 4095, 4096] {
            let signal = random_signal(&mut rng, len);
            assert_roundtrip(&signal, Phase::Even, Boundary::Symmetric);
            assert_roundtrip(&signal, Phase::Odd, Boundary::Symmetric);
        }
    }

    #[test]
    fn verify_periodic_roundtrip() {
        let mut rng = SmallRng::seed_from_u64(98);
        for len in [2usize, 4, 8, 16, 64, 128, 1024, 4096] {
            let signal = random_signal(&mut rng, len);
            assert_roundtrip(&signal, Phase::Even, Boundary::Periodic);
            assert_roundtrip(&signal, Phase::Odd, Boundary::Periodic);
        }
    }

    #[test]
    fn verify_periodic_rejects_odd_length() {
        let mut signal = vec![0.0; 9];
        assert!(analysis(&mut signal, Phase::Even, Boundary::Periodic).is_err());
        assert!(synthesis(&mut signal, Phase::Odd, Boundary::Periodic).is_err());
    }

    #[test]
    fn verify_boundary_wavelet_roundtrip() {
        let mut rng = SmallRng::seed_from_u64(99);
        for len in [2usize, 3, 4, 5, 8, 9, 16, 64, 127, 128, 1024, 4096] {
            let signal = random_signal(&mut rng, len);
            assert_roundtrip(&signal, Phase::Even, Boundary::BoundaryWavelet);
            assert_roundtrip(&signal, Phase::Odd, Boundary::BoundaryWavelet);
        }
    }

    #[test]
    fn verify_boundary_wavelet_all_ones_odd_length() {
        let signal = vec![1.0; 127];
        assert_roundtrip(&signal, Phase::Even, Boundary::BoundaryWavelet);
    }

    #[test]
    fn verify_length_one_scaling() {
        let mut s = vec![3.0];
        analysis(&mut s, Phase::Even, Boundary::Symmetric).unwrap();
        assert!((s[0] - 3.0 * std::f64::consts::SQRT_2).abs() < 1e-15);
        synthesis(&mut s, Phase::Even, Boundary::Symmetric).unwrap();
        assert!((s[0] - 3.0).abs() < 1e-15);

        let mut s = vec![3.0];
        analysis(&mut s, Phase::Odd, Boundary::Symmetric).unwrap();
        assert!((s[0] - 3.0 / std::f64::consts::SQRT_2).abs() < 1e-15);
        synthesis(&mut s, Phase::Odd, Boundary::Symmetric).unwrap();
        assert!((s[0] - 3.0).abs() < 1e-15);
    }

    #[test]
    fn verify_length_zero_is_noop() {
        let mut s: Vec<f64> = Vec::new();
        analysis(&mut s, Phase::Even, Boundary::Symmetric).unwrap();
        synthesis(&mut s, Phase::Even, Boundary::Symmetric).unwrap();
    }

    #[test]
    fn verify_low_pass_preserves_mean_energy() {
        // A constant signal concentrates in the low-pass half: every odd-indexed (detail)
        // output is zero under symmetric extension.
        let mut s = vec![1.0; 64];
        analysis(&mut s, Phase::Even, Boundary::Symmetric).unwrap();
        let mut i = 1;
        while i < s.len() {
            assert!(s[i].abs() < 1e-12);
            i += 2;
        }
    }
}
