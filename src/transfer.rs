//! Characteristic matrices and the reflection/transmission coefficients
//! derived from them.
//!
//! Each interior layer of a stack is represented by a 2×2 complex
//! characteristic matrix relating the tangential field components at its two
//! interfaces. Multiplying the matrices of consecutive layers gives the matrix
//! of the whole film, from which [`Coefficients`] follows once the incident
//! and exit media are known.
//!
//! # Conventions
//!
//! For a layer of index `n`, thickness `d` and propagation angle `θ` at
//! vacuum wavelength `λ`:
//!
//! ```text
//! p = n·cos θ            (TE)
//! p = cos θ / n          (TM)
//! b = 2π·n·d·cos θ / λ
//!
//! M = | cos b         -i·sin(b)/p |
//!     | -i·p·sin(b)   cos b       |
//! ```
//!
//! The TM coefficients computed from `M` are ratios of magnetic field
//! amplitudes. The reflection coefficient is the same for both fields, the
//! transmission coefficient is converted to an electric field ratio.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use nalgebra::Matrix2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::StackError;


/// Polarization of the incident wave with respect to the plane of incidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    /// Electric field perpendicular to the plane of incidence.
    #[serde(alias = "te")]
    TE,
    /// Electric field parallel to the plane of incidence.
    #[serde(alias = "tm")]
    TM,
}

impl FromStr for Polarization {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TE" => Ok(Polarization::TE),
            "TM" => Ok(Polarization::TM),
            other => Err(StackError::Config(format!(
                "unknown polarization '{}', expected TE or TM",
                other
            ))),
        }
    }
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarization::TE => write!(f, "TE"),
            Polarization::TM => write!(f, "TM"),
        }
    }
}

/// Direction in which light crosses the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Incident from the top medium, exiting into the bottom medium.
    UpDown,
    /// Incident from the bottom medium, exiting into the top medium.
    DownUp,
}

/// Optical admittance of a medium for the given polarization.
pub fn admittance(n: Complex64, theta: Complex64, polarization: Polarization) -> Complex64 {
    match polarization {
        Polarization::TE => n * theta.cos(),
        Polarization::TM => theta.cos() / n,
    }
}

/// Phase thickness `b = 2π·n·d·cos θ / λ` of a layer.
pub fn phase_thickness(n: Complex64, thickness: f64, theta: Complex64, wavelength: f64) -> Complex64 {
    2.0 * PI * n * thickness * theta.cos() / wavelength
}

/// Characteristic matrix of a single homogeneous layer.
pub fn layer_matrix(
    n: Complex64,
    thickness: f64,
    theta: Complex64,
    wavelength: f64,
    polarization: Polarization,
) -> Matrix2<Complex64> {
    let i = Complex64::i();
    let p = admittance(n, theta, polarization);
    let b = phase_thickness(n, thickness, theta, wavelength);
    let (sin_b, cos_b) = (b.sin(), b.cos());

    Matrix2::new(cos_b, -i * sin_b / p, -i * p * sin_b, cos_b)
}

/// Product of consecutive characteristic matrices, in iteration order.
///
/// An empty iterator gives the identity, the matrix of a bare interface.
pub fn chain<'a>(matrices: impl IntoIterator<Item = &'a Matrix2<Complex64>>) -> Matrix2<Complex64> {
    matrices
        .into_iter()
        .fold(Matrix2::identity(), |product, m| product * m)
}

/// Refractive index and propagation angle of a semi-infinite terminal medium.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Terminal {
    pub n: Complex64,
    pub theta: Complex64,
}

impl Terminal {
    pub fn new(n: Complex64, theta: Complex64) -> Self {
        Self { n, theta }
    }
}

/// Amplitude and power coefficients of a stack in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coefficients {
    /// Amplitude reflection coefficient.
    pub r: Complex64,
    /// Amplitude transmission coefficient (electric field ratio).
    pub t: Complex64,
    /// Reflectance `|r|²`.
    pub reflectance: f64,
    /// `|t|²·p_exit/p_in`, kept complex.
    ///
    /// Only in a lossless stack with a propagating exit wave is this the
    /// physical transmittance. Otherwise it is a diagnostic quantity and the
    /// imaginary part is not discarded.
    pub transmittance: Complex64,
}

impl Coefficients {
    /// Derives the coefficients of a film with characteristic matrix `m`
    /// between the `incident` and `exit` media.
    pub fn from_matrix(
        m: &Matrix2<Complex64>,
        polarization: Polarization,
        incident: Terminal,
        exit: Terminal,
    ) -> Self {
        let p_in = admittance(incident.n, incident.theta, polarization);
        let p_exit = admittance(exit.n, exit.theta, polarization);

        let a = (m[(0, 0)] + m[(0, 1)] * p_exit) * p_in;
        let b = m[(1, 0)] + m[(1, 1)] * p_exit;

        let r = (a - b) / (a + b);
        let reflectance = r.norm_sqr();

        let (t, p_in, p_exit) = match polarization {
            Polarization::TE => (2.0 * p_in / (a + b), p_in, p_exit),
            Polarization::TM => (
                (incident.n / exit.n) * 2.0 * p_in / (a + b),
                incident.n * incident.theta.cos(),
                exit.n * exit.theta.cos(),
            ),
        };
        let transmittance = t.norm_sqr() * p_exit / p_in;

        Self {
            r,
            t,
            reflectance,
            transmittance,
        }
    }
}
