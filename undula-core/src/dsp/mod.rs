// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dsp` module implements the CDF 9/7 lifting kernels and the separable multi-level
//! transform drivers, together with the subband pyramid arithmetic shared with the coders.

pub mod cdf97;
pub mod dwt;

/// How many levels of wavelet transform a signal of length `len` admits.
///
/// Eight samples is the minimal length for one level, so the count is
/// `floor(log2(len / 8)) + 1` for `len >= 8` and zero otherwise.
pub fn num_of_xforms(len: usize) -> usize {
    if len < 8 {
        return 0;
    }
    let f = ((len as f64) / 8.0).log2();
    f as usize + 1
}

/// How many binary partitions a dimension of length `len` admits.
///
/// Lengths 0 and 1 admit none; every partition keeps the larger half, so e.g. a length of 3
/// partitions twice (2 + 1, then 1 + 1).
pub fn num_of_partitions(len: usize) -> usize {
    let mut parts = 0;
    let mut dim = len;
    while dim > 1 {
        parts += 1;
        dim -= dim / 2;
    }
    parts
}

/// Approximation and detail lengths after `lev` transform levels of an original length.
///
/// The approximation takes the larger half at every level; the detail length reported is the
/// one split off by the last level applied.
pub fn approx_detail_len(orig_len: usize, lev: usize) -> (usize, usize) {
    let mut low_len = orig_len;
    let mut high_len = 0;
    for _ in 0..lev {
        let new_low = (low_len + 1) / 2;
        high_len = low_len - new_low;
        low_len = new_low;
    }
    (low_len, high_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_num_of_xforms() {
        assert_eq!(num_of_xforms(0), 0);
        assert_eq!(num_of_xforms(7), 0);
        assert_eq!(num_of_xforms(8), 1);
        assert_eq!(num_of_xforms(15), 1);
        assert_eq!(num_of_xforms(16), 2);
        assert_eq!(num_of_xforms(64), 4);
        assert_eq!(num_of_xforms(127), 4);
        assert_eq!(num_of_xforms(128), 5);
    }

    #[test]
    fn verify_num_of_partitions() {
        assert_eq!(num_of_partitions(0), 0);
        assert_eq!(num_of_partitions(1), 0);
        assert_eq!(num_of_partitions(2), 1);
        assert_eq!(num_of_partitions(3), 2);
        assert_eq!(num_of_partitions(4), 2);
        assert_eq!(num_of_partitions(5), 3);
    }

    #[test]
    fn verify_approx_detail_len() {
        assert_eq!(approx_detail_len(64, 0), (64, 0));
        assert_eq!(approx_detail_len(64, 1), (32, 32));
        assert_eq!(approx_detail_len(64, 2), (16, 16));
        assert_eq!(approx_detail_len(9, 1), (5, 4));
        assert_eq!(approx_detail_len(9, 2), (3, 2));
        // The approximation length at level l is ceil(len / 2^l).
        for len in 1..200usize {
            for lev in 0..6usize {
                let (approx, _) = approx_detail_len(len, lev);
                let ceil = (len + (1 << lev) - 1) >> lev;
                assert_eq!(approx, ceil);
            }
        }
    }
}
