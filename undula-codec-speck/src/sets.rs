// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `sets` module holds the SPECK partition set types and the canonical partition
//! operations shared by the 2-D and 3-D coders.

/// Significance state of a set or pixel within the current bitplane.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Significance {
    #[default]
    Insig,
    Sig,
    /// Became significant in the current bitplane; skipped by this plane's refinement pass.
    NewlySig,
}

/// The kind of a set held in the LIS.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SetType {
    #[default]
    S,
    /// The 2-D L-shaped complement of the root S-set.
    I,
    /// Dead entry awaiting compaction.
    Garbage,
}

/// A rectangular 2-D SPECK set.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpeckSet2d {
    pub start_x: u32,
    pub start_y: u32,
    pub length_x: u32,
    pub length_y: u32,
    /// Which partition level this set is at, counted from the root.
    pub part_level: u16,
    pub signif: Significance,
    pub set_type: SetType,
}

impl SpeckSet2d {
    pub fn new_i() -> Self {
        SpeckSet2d { set_type: SetType::I, ..Default::default() }
    }

    pub fn is_pixel(&self) -> bool {
        self.length_x == 1 && self.length_y == 1
    }

    pub fn is_empty(&self) -> bool {
        self.length_x == 0 || self.length_y == 0
    }
}

/// A rectangular 3-D SPECK set with per-axis partition levels.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpeckSet3d {
    pub start_x: u32,
    pub start_y: u32,
    pub start_z: u32,
    pub length_x: u32,
    pub length_y: u32,
    pub length_z: u32,
    pub part_level_x: u16,
    pub part_level_y: u16,
    pub part_level_z: u16,
    pub signif: Significance,
    pub set_type: SetType,
}

impl SpeckSet3d {
    pub fn is_pixel(&self) -> bool {
        self.length_x == 1 && self.length_y == 1 && self.length_z == 1
    }

    pub fn is_empty(&self) -> bool {
        self.length_x == 0 || self.length_y == 0 || self.length_z == 0
    }

    /// Total partition level; the LIS bucket index of this set.
    pub fn total_partitions(&self) -> usize {
        usize::from(self.part_level_x)
            + usize::from(self.part_level_y)
            + usize::from(self.part_level_z)
    }
}

/// A contiguous 1-D set over the flat index space, used by the SPERR outlier coder.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpeckSet1d {
    pub start: usize,
    pub length: usize,
    pub part_level: u32,
    pub set_type: SetType,
}

/// Split a 2-D set into its four quadrants in canonical order: BR, BL, TR, TL. The top-left
/// (approximation) quadrant takes the larger half of an odd extent.
pub fn partition_s_2d(set: &SpeckSet2d) -> [SpeckSet2d; 4] {
    let detail_len_x = set.length_x / 2;
    let detail_len_y = set.length_y / 2;
    let approx_len_x = set.length_x - detail_len_x;
    let approx_len_y = set.length_y - detail_len_y;
    let part_level = set.part_level + 1;

    let br = SpeckSet2d {
        start_x: set.start_x + approx_len_x,
        start_y: set.start_y + approx_len_y,
        length_x: detail_len_x,
        length_y: detail_len_y,
        part_level,
        ..Default::default()
    };

    let bl = SpeckSet2d {
        start_x: set.start_x,
        start_y: set.start_y + approx_len_y,
        length_x: approx_len_x,
        length_y: detail_len_y,
        part_level,
        ..Default::default()
    };

    let tr = SpeckSet2d {
        start_x: set.start_x + approx_len_x,
        start_y: set.start_y,
        length_x: detail_len_x,
        length_y: approx_len_y,
        part_level,
        ..Default::default()
    };

    let tl = SpeckSet2d {
        start_x: set.start_x,
        start_y: set.start_y,
        length_x: approx_len_x,
        length_y: approx_len_y,
        part_level,
        ..Default::default()
    };

    [br, bl, tr, tl]
}

/// Split a 3-D set into up to eight octants in canonical order: (0,0,0), (1,0,0), (0,1,0),
/// (1,1,0), (0,0,1), (1,0,1), (0,1,1), (1,1,1). Octant (0,0,0) keeps the larger half of every
/// odd extent. A per-axis partition level only advances along axes that actually split.
pub fn partition_s_xyz(set: &SpeckSet3d) -> [SpeckSet3d; 8] {
    let split_x = [set.length_x - set.length_x / 2, set.length_x / 2];
    let split_y = [set.length_y - set.length_y / 2, set.length_y / 2];
    let split_z = [set.length_z - set.length_z / 2, set.length_z / 2];

    let plx = set.part_level_x + u16::from(split_x[1] > 0);
    let ply = set.part_level_y + u16::from(split_y[1] > 0);
    let plz = set.part_level_z + u16::from(split_z[1] > 0);

    let mut subsets = [SpeckSet3d::default(); 8];
    for (i, sub) in subsets.iter_mut().enumerate() {
        let (ix, iy, iz) = (i & 1, (i >> 1) & 1, (i >> 2) & 1);
        sub.start_x = set.start_x + if ix == 1 { split_x[0] } else { 0 };
        sub.start_y = set.start_y + if iy == 1 { split_y[0] } else { 0 };
        sub.start_z = set.start_z + if iz == 1 { split_z[0] } else { 0 };
        sub.length_x = split_x[ix];
        sub.length_y = split_y[iy];
        sub.length_z = split_z[iz];
        sub.part_level_x = plx;
        sub.part_level_y = ply;
        sub.part_level_z = plz;
    }

    subsets
}

/// Split a 3-D set into four XY quadrants, leaving the Z extent whole.
pub fn partition_s_xy(set: &SpeckSet3d) -> [SpeckSet3d; 4] {
    let split_x = [set.length_x - set.length_x / 2, set.length_x / 2];
    let split_y = [set.length_y - set.length_y / 2, set.length_y / 2];

    let plx = set.part_level_x + u16::from(split_x[1] > 0);
    let ply = set.part_level_y + u16::from(split_y[1] > 0);

    let mut subsets = [SpeckSet3d::default(); 4];
    for (i, sub) in subsets.iter_mut().enumerate() {
        let (ix, iy) = (i & 1, (i >> 1) & 1);
        sub.start_x = set.start_x + if ix == 1 { split_x[0] } else { 0 };
        sub.start_y = set.start_y + if iy == 1 { split_y[0] } else { 0 };
        sub.start_z = set.start_z;
        sub.length_x = split_x[ix];
        sub.length_y = split_y[iy];
        sub.length_z = set.length_z;
        sub.part_level_x = plx;
        sub.part_level_y = ply;
        sub.part_level_z = set.part_level_z;
    }

    subsets
}

/// Split a 3-D set into two Z halves, leaving the XY extent whole.
pub fn partition_s_z(set: &SpeckSet3d) -> [SpeckSet3d; 2] {
    let split_z = [set.length_z - set.length_z / 2, set.length_z / 2];
    let plz = set.part_level_z + u16::from(split_z[1] > 0);

    let mut subsets = [SpeckSet3d::default(); 2];
    for (i, sub) in subsets.iter_mut().enumerate() {
        sub.start_x = set.start_x;
        sub.start_y = set.start_y;
        sub.start_z = set.start_z + if i == 1 { split_z[0] } else { 0 };
        sub.length_x = set.length_x;
        sub.length_y = set.length_y;
        sub.length_z = split_z[i];
        sub.part_level_x = set.part_level_x;
        sub.part_level_y = set.part_level_y;
        sub.part_level_z = plz;
    }

    subsets
}

/// Split a 1-D set into two halves, the first taking the larger share of an odd length.
pub fn partition_s_1d(set: &SpeckSet1d) -> [SpeckSet1d; 2] {
    let first = SpeckSet1d {
        start: set.start,
        length: set.length - set.length / 2,
        part_level: set.part_level + 1,
        ..Default::default()
    };
    let second = SpeckSet1d {
        start: set.start + first.length,
        length: set.length / 2,
        part_level: set.part_level + 1,
        ..Default::default()
    };
    [first, second]
}
