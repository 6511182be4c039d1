// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of nest-exporter.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Temperature unit conversion
//!
//! A reading the API did not report is carried as [`UNAVAILABLE`] (NaN). Both
//! conversions return it unchanged instead of computing on it.

pub const UNAVAILABLE: f64 = f64::NAN;

pub fn is_unavailable(value: f64) -> bool {
    value.is_nan()
}

/// Celsius to Fahrenheit
pub fn c_to_f(celsius: f64) -> f64 {
    if is_unavailable(celsius) {
        return UNAVAILABLE;
    }
    celsius * 9.0 / 5.0 + 32.0
}

/// Fahrenheit to Celsius
pub fn f_to_c(fahrenheit: f64) -> f64 {
    if is_unavailable(fahrenheit) {
        return UNAVAILABLE;
    }
    (fahrenheit - 32.0) * 5.0 / 9.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_points() {
        assert!((c_to_f(0.0) - 32.0).abs() < 1e-9);
        assert!((c_to_f(100.0) - 212.0).abs() < 1e-9);
        assert!((c_to_f(-40.0) - -40.0).abs() < 1e-9);
        assert!((f_to_c(68.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn round_trip_within_tolerance() {
        let mut x = -273.15;
        while x < 1000.0 {
            let back = f_to_c(c_to_f(x));
            assert!((back - x).abs() < 1e-9, "{x} came back as {back}");
            x += 0.37;
        }
    }

    #[test]
    fn unavailable_passes_through() {
        assert!(is_unavailable(c_to_f(UNAVAILABLE)));
        assert!(is_unavailable(f_to_c(UNAVAILABLE)));
    }
}
