//! Optical media described by tabulated complex refractive indices.
//!
//! A [`Medium`] is built once from a table of `(λ, n, k)` triples and never
//! changes afterwards. It is shared between layers and stacks through an
//! [`Arc`](std::sync::Arc), including the short-lived sub-stacks used by the
//! field decomposition, so it must stay immutable and `Send + Sync`.
//!
//! Tables with at least [`MIN_CUBIC_ROWS`] rows are interpolated with a
//! not-a-knot cubic spline, shorter tables fall back to linear
//! interpolation. The real index and the extinction coefficient get
//! independent interpolants.

use std::fmt;

use itertools::Itertools;
use ndarray::Array1;
use ndarray_interp::interp1d::cubic_spline::CubicSpline;
use ndarray_interp::interp1d::{Interp1DBuilder, Linear};
use num_complex::Complex64;

use crate::error::{Result, StackError};


/// Minimum number of rows for which a cubic spline is used.
pub const MIN_CUBIC_ROWS: usize = 4;

type Interpolant = Box<dyn Fn(f64) -> std::result::Result<f64, String> + Send + Sync>;

/// An optical medium: complex refractive index `n + ik` as a function of the
/// wavelength, valid inside a closed wavelength interval.
pub struct Medium {
    name: Option<String>,
    wavelengths: Array1<f64>,
    n_interp: Interpolant,
    k_interp: Interpolant,
}

impl Medium {
    /// Builds a medium from `[λ, n, k]` rows in any order.
    pub fn from_rows(rows: &[[f64; 3]]) -> Result<Self> {
        if rows.len() < 2 {
            return Err(StackError::Config(format!(
                "a medium table needs at least 2 rows, got {}",
                rows.len()
            )));
        }
        if let Some(row) = rows.iter().find(|row| row.iter().any(|v| !v.is_finite())) {
            return Err(StackError::Config(format!(
                "medium table contains a non-finite value in row {:?}",
                row
            )));
        }

        let sorted = rows
            .iter()
            .copied()
            .sorted_by(|a, b| a[0].total_cmp(&b[0]))
            .collect_vec();
        if let Some((a, _)) = sorted.iter().tuple_windows().find(|(a, b)| a[0] >= b[0]) {
            return Err(StackError::Config(format!(
                "medium table has a repeated wavelength: {}",
                a[0]
            )));
        }

        let wavelengths: Array1<f64> = sorted.iter().map(|row| row[0]).collect();
        let real: Array1<f64> = sorted.iter().map(|row| row[1]).collect();
        let extinction: Array1<f64> = sorted.iter().map(|row| row[2]).collect();

        let n_interp = build_interpolant(&wavelengths, &real)?;
        let k_interp = build_interpolant(&wavelengths, &extinction)?;

        Ok(Self {
            name: None,
            wavelengths,
            n_interp,
            k_interp,
        })
    }

    /// Attaches a display name, used in log messages.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Complex refractive index `n(λ) + i·k(λ)`.
    pub fn refractive_index(&self, wavelength: f64) -> Result<Complex64> {
        let (min, max) = self.valid_range();
        if !(min..=max).contains(&wavelength) {
            return Err(StackError::WavelengthOutOfRange {
                wavelength,
                min,
                max,
            });
        }
        let n = (self.n_interp)(wavelength).map_err(StackError::Interpolation)?;
        let k = (self.k_interp)(wavelength).map_err(StackError::Interpolation)?;
        Ok(Complex64::new(n, k))
    }

    /// Shortest and longest tabulated wavelengths.
    pub fn valid_range(&self) -> (f64, f64) {
        (self.wavelengths[0], self.wavelengths[self.wavelengths.len() - 1])
    }
}

impl fmt::Debug for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Medium")
            .field("name", &self.name)
            .field("rows", &self.wavelengths.len())
            .field("valid_range", &self.valid_range())
            .finish()
    }
}

fn build_interpolant(x: &Array1<f64>, y: &Array1<f64>) -> Result<Interpolant> {
    let builder = Interp1DBuilder::new(y.clone()).x(x.clone());
    if x.len() >= MIN_CUBIC_ROWS {
        // not-a-knot boundaries
        let interp = builder
            .strategy(CubicSpline::new())
            .build()
            .map_err(|e| StackError::Config(e.to_string()))?;
        Ok(Box::new(move |value| {
            interp.interp_scalar(value).map_err(|e| e.to_string())
        }))
    } else {
        let interp = builder
            .strategy(Linear::new())
            .build()
            .map_err(|e| StackError::Config(e.to_string()))?;
        Ok(Box::new(move |value| {
            interp.interp_scalar(value).map_err(|e| e.to_string())
        }))
    }
}
