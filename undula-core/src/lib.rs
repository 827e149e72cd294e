// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared foundations of Project Undula: the error taxonomy, bit- and byte-level I/O, the
//! CDF 9/7 lifting kernels with their multi-level drivers, and the sample conditioner.

pub mod conditioner;
pub mod dsp;
pub mod errors;
pub mod io;
