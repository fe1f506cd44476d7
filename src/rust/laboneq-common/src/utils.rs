// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use core::f64;

/// Bit pattern of a float with all zeros mapped onto `+0.0`.
pub fn normalize_f64(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0.0_f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Wrap a phase into `[0, 2π)`.
pub fn normalize_phase(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let out = match value < 0.0 {
        true => {
            value + ((-value / 2.0 / f64::consts::PI) as i64 + 1) as f64 * 2.0 * f64::consts::PI
        }
        false => value,
    };
    out % (2.0 * f64::consts::PI)
}

/// Ceil the given value to the nearest multiple of the grid.
///
/// This function panics if `grid` is not positive.
#[inline]
pub fn ceil_to_grid(value: i64, grid: i64) -> i64 {
    assert!(grid > 0, "Grid must be positive for rounding.");
    let remainder = value.rem_euclid(grid);
    if remainder == 0 {
        value
    } else {
        value - remainder + grid
    }
}

/// Floor the given value to the nearest multiple of the grid.
///
/// This function panics if `grid` is not positive.
#[inline]
pub fn floor_to_grid(value: i64, grid: i64) -> i64 {
    assert!(grid > 0, "Grid must be positive for rounding.");
    value - value.rem_euclid(grid)
}

pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

pub fn lcm(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return 0;
    }
    (a / gcd(a, b) * b).abs()
}
