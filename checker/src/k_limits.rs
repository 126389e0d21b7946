// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// Somewhat arbitrary constants used to limit things in the formula algebra that may
// take too long or use too much memory.

/// The number of atoms considered as interpolant candidates at a single cut point.
pub const MAX_INTERPOLATION_ATOMS: usize = 32;

/// Boolean abstraction enumerates at most this many cubes before giving up and returning true.
pub const MAX_ABSTRACTION_CUBES: usize = 1 << 12;

/// The number of partial assignments the bounded solver may try per query.
pub const MAX_BOUNDED_SOLVER_STEPS: u64 = 2_000_000;

/// Integer variables the bounded solver cannot bound on its own range over
/// [-DEFAULT_SOLVER_RANGE, DEFAULT_SOLVER_RANGE].
pub const DEFAULT_SOLVER_RANGE: i128 = 16;
