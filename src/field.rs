//! Field factors of a dipole emitting from inside a multilayer.
//!
//! For a dipole at depth `z`, oscillating along `x`, `y` or `z`, the field
//! factor `F` is the amplitude of the plane wave leaving the stack through
//! the top medium at angle `θ0`, normalised to the amplitude the same dipole
//! would produce in an infinite homogeneous medium. `Fx` and `Fz` are TM
//! quantities, `Fy` is TE. Emitted intensities follow as
//!
//! ```text
//! I_TE = |Fy|²
//! I_TM = |Fx·cos²θ0 + Fz·sin²θ0|²
//! ```
//!
//! # How it works
//!
//! The layer containing `z` decides the formula.
//!
//! * **Top medium.** The direct wave interferes with its reflection from the
//!   rest of the stack: `F = 1 ∓ r·exp(2iη0(z - z0))`, `-` for `x`.
//! * **Bottom medium.** The wave reaches the top through the whole stack,
//!   weighted by the up-down transmission coefficient.
//! * **Interior layer j.** The stack is split into the part above `j` and the
//!   part below it, both keeping layer `j` as a terminal medium. The wave
//!   bounces between the two parts, which sums to a geometric series:
//!
//! ```text
//!            t(0→j) · (1 ∓ r(j→N)·exp(2iηj(z - zj)))
//! F(z) = ----------------------------------------------- · phase · ratio
//!             1 - r(j→N)·r(j→0)·exp(2iηj·dj)
//! ```
//!
//! The split parts are [`SubStack`] views over the parent, so they reuse its
//! refractive indices, angles and layer matrices unchanged.
//!
//! Each factor configures the stack itself. The required polarization is
//! forced, the wavelength and angle are only set when they differ from the
//! current ones, and matrices are only recomputed when missing. Sweeping `z`
//! at fixed wavelength and angle therefore costs no matrix work after the
//! first point.

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::Matrix2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Prerequisite, Result, StackError};
use crate::multilayer::Multilayer;
use crate::transfer::{self, Coefficients, Direction, Polarization, Terminal};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::ErrorKind;
    use crate::medium::Medium;
    use crate::multilayer::LayerSpec;
    use crate::testing::{ambient, dielectric, medium1, medium2, silver};

    fn mlsame() -> Multilayer {
        Multilayer::new(vec![
            LayerSpec::Medium(medium1()),
            LayerSpec::Film(medium1(), 5.0),
            LayerSpec::Film(medium1(), 5.0),
            LayerSpec::Medium(medium1()),
        ])
        .unwrap()
    }

    fn crawford(thickness: f64) -> Multilayer {
        Multilayer::new(vec![
            LayerSpec::Medium(ambient()),
            LayerSpec::Film(dielectric(), thickness),
            LayerSpec::Medium(silver()),
        ])
        .unwrap()
    }

    #[test]
    fn homogeneous_stack_is_transparent() {
        let mut ml = mlsame();
        let cases = [(400.0, 0.0), (600.0, 0.0), (400.0, 0.5), (400.0, FRAC_PI_2)];
        for (wavelength, angle) in cases {
            for z in [-5.0, 5.0, 15.0] {
                for component in [Component::X, Component::Y, Component::Z] {
                    let f = ml.field_factor(component, z, wavelength, angle).unwrap();
                    assert!(
                        (f - Complex64::new(1.0, 0.0)).norm() < 1e-12,
                        "{:?} at z = {}, λ = {}, θ = {}: {}",
                        component,
                        z,
                        wavelength,
                        angle,
                        f
                    );
                }
            }
        }
    }

    #[test]
    fn forces_polarization() {
        let mut ml = crawford(300.0);
        ml.calculate_fy(100.0, 520.0, 0.3).unwrap();
        assert_eq!(ml.polarization(), Some(Polarization::TE));
        ml.calculate_fx(100.0, 520.0, 0.3).unwrap();
        assert_eq!(ml.polarization(), Some(Polarization::TM));
        ml.calculate_fz(100.0, 520.0, 0.3).unwrap();
        assert_eq!(ml.polarization(), Some(Polarization::TM));
        assert_eq!(ml.wavelength(), Some(520.0));
    }

    #[test]
    fn reuses_global_state() {
        let mut ml = crawford(300.0);
        ml.calculate_fy(0.0, 520.0, 1.1).unwrap();
        let matrix = ml.char_matrix_up_down().unwrap();
        ml.calculate_fy(500.0, 520.0, 1.1).unwrap();
        assert_eq!(ml.char_matrix_up_down().unwrap(), matrix);
        assert!(ml.is_updated());
    }

    #[test]
    fn crawford_film() {
        let mut ml = crawford(300.0);
        let angle = 65f64.to_radians();
        let expected = [
            (0.0, 0.24190098),
            (100.0, 2.54848769),
            (500.0, 3.53145497),
        ];
        for (z, intensity) in expected {
            let fy = ml.calculate_fy(z, 520.0, angle).unwrap();
            assert!((te_intensity(fy) - intensity).abs() < 1e-7, "z = {}", z);
        }
    }

    #[test]
    fn degenerate_angles() {
        let mut ml = crawford(50.0);
        let fz = ml.calculate_fz(-10.0, 520.0, 0.0).unwrap();
        assert_eq!(fz, Complex64::new(1.0, 0.0));
        let fz = ml.calculate_fz(10.0, 520.0, 0.0).unwrap();
        assert_eq!(fz, Complex64::new(1.0, 0.0));
        let fx = ml.calculate_fx(10.0, 520.0, FRAC_PI_2).unwrap();
        assert_eq!(fx, Complex64::new(1.0, 0.0));
        let fx = ml.calculate_fx(-10.0, 520.0, FRAC_PI_2).unwrap();
        assert_eq!(fx, Complex64::new(1.0, 0.0));
        // the top medium has no singularity
        let fz = ml.calculate_fz(60.0, 520.0, 0.0).unwrap();
        assert_ne!(fz, Complex64::new(1.0, 0.0));
    }

    #[test]
    fn split_views() {
        let mut ml = crawford(300.0);
        ml.calculate_fy(100.0, 520.0, 0.4).unwrap();

        let whole = SubStack::new(&ml, 0, 2).unwrap();
        assert_eq!(whole.num_layers(), 3);
        assert_eq!(
            whole.coefficients(Direction::UpDown).unwrap(),
            ml.coefficients_up_down().unwrap()
        );
        assert_eq!(
            whole.char_matrix(Direction::DownUp).unwrap(),
            ml.char_matrix_down_up().unwrap()
        );

        let interface = SubStack::new(&ml, 0, 1).unwrap();
        assert_eq!(interface.char_matrix(Direction::UpDown).unwrap(), Matrix2::identity());

        assert_eq!(SubStack::new(&ml, 1, 1).unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(SubStack::new(&ml, 0, 3).unwrap_err().kind(), ErrorKind::Index);
    }

    #[test]
    fn invalid_requests_leave_state() {
        let mut ml = Multilayer::new(vec![
            LayerSpec::Medium(medium1()),
            LayerSpec::Film(medium2(), 10.0),
            LayerSpec::Medium(medium2()),
        ])
        .unwrap();
        ml.calculate_fy(5.0, 400.0, 0.1).unwrap();
        let err = ml.calculate_fx(5.0, 750.0, 0.1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert_eq!(ml.polarization(), Some(Polarization::TE));
        assert_eq!(ml.wavelength(), Some(400.0));

        let err = ml.field_factor_at(Component::Y, 5.0, 400.0, 0.1, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
    }

    #[test]
    fn failed_propagation_restores_state() {
        // the film index vanishes at 400, where Snell's law has no solution
        let vanishing = Medium::from_rows(&[[300.0, 1.0, 0.0], [400.0, 0.0, 0.0]]).unwrap();
        let mut ml = Multilayer::new(vec![
            LayerSpec::Medium(ambient()),
            LayerSpec::Film(Arc::new(vanishing), 10.0),
            LayerSpec::Medium(ambient()),
        ])
        .unwrap();

        ml.calculate_fy(5.0, 300.0, 0.3).unwrap();
        let before = ml.coefficients_up_down().unwrap();

        let err = ml.calculate_fx(5.0, 400.0, 0.3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(ml.polarization(), Some(Polarization::TE));
        assert_eq!(ml.wavelength(), Some(300.0));
        assert_eq!(ml.propagation_angle(0).unwrap(), Complex64::new(0.3, 0.0));
        assert!(ml.is_updated());
        assert_eq!(ml.coefficients_up_down().unwrap(), before);
    }

    #[test]
    fn intensities() {
        let fx = Complex64::new(0.5, 0.5);
        let fz = Complex64::new(1.0, -1.0);
        assert_eq!(te_intensity(fz), 2.0);
        assert!((tm_intensity(fx, fz, 0.0) - 0.5).abs() < 1e-15);
        assert!((tm_intensity(fx, fz, FRAC_PI_2) - 2.0).abs() < 1e-15);

        let mut ml = crawford(300.0);
        let emission = ml.emission(100.0, 520.0, 0.7).unwrap();
        assert_eq!(emission.te, te_intensity(emission.fy));
        assert_eq!(emission.tm, tm_intensity(emission.fx, emission.fz, 0.7));
        assert_eq!(ml.polarization(), Some(Polarization::TE));
    }
}

/// Orientation of the emitting dipole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    /// In the interfaces, inside the plane of incidence.
    X,
    /// In the interfaces, perpendicular to the plane of incidence.
    Y,
    /// Normal to the interfaces.
    Z,
}

impl Component {
    /// Polarization carried by light from a dipole along this axis.
    pub fn polarization(self) -> Polarization {
        match self {
            Component::X | Component::Z => Polarization::TM,
            Component::Y => Polarization::TE,
        }
    }

    /// At these incidence angles a dipole along this axis does not radiate
    /// towards the top medium and the factor is a removable 0/0.
    fn is_degenerate(self, theta0: Complex64) -> bool {
        match self {
            Component::X => theta0 == Complex64::new(FRAC_PI_2, 0.0),
            Component::Y => false,
            Component::Z => theta0 == Complex64::new(0.0, 0.0),
        }
    }

    /// Projection ratio between layer `j` and the top medium.
    fn ratio(self, theta_j: Complex64, theta0: Complex64) -> Complex64 {
        match self {
            Component::X => theta_j.cos() / theta0.cos(),
            Component::Y => Complex64::new(1.0, 0.0),
            Component::Z => theta_j.sin() / theta0.sin(),
        }
    }

    /// `-1` for `x`, `+1` otherwise: the sign of the reflected term.
    fn sign(self) -> f64 {
        match self {
            Component::X => -1.0,
            Component::Y | Component::Z => 1.0,
        }
    }
}

/// Read-only view of layers `top..=bottom` of a configured parent stack.
///
/// The first and last layers of the view act as its semi-infinite terminal
/// media whatever their thickness in the parent.
#[derive(Debug, Clone, Copy)]
pub struct SubStack<'a> {
    parent: &'a Multilayer,
    top: usize,
    bottom: usize,
}

impl<'a> SubStack<'a> {
    pub fn new(parent: &'a Multilayer, top: usize, bottom: usize) -> Result<Self> {
        StackError::check_index(bottom, parent.num_layers())?;
        if top >= bottom {
            return Err(StackError::Config(format!(
                "a sub-stack needs at least 2 layers, got {}..={}",
                top, bottom
            )));
        }
        Ok(Self {
            parent,
            top,
            bottom,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.bottom - self.top + 1
    }

    /// Product of the parent's layer matrices strictly between the two
    /// terminals, in the given direction.
    pub fn char_matrix(&self, direction: Direction) -> Result<Matrix2<Complex64>> {
        let matrices = (self.top + 1..self.bottom)
            .map(|index| self.parent.layer_matrix(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(match direction {
            Direction::UpDown => transfer::chain(matrices.iter()),
            Direction::DownUp => transfer::chain(matrices.iter().rev()),
        })
    }

    pub fn coefficients(&self, direction: Direction) -> Result<Coefficients> {
        let polarization = self
            .parent
            .polarization()
            .ok_or(StackError::Missing(Prerequisite::Polarization))?;
        let top = self.terminal(self.top)?;
        let bottom = self.terminal(self.bottom)?;
        let matrix = self.char_matrix(direction)?;
        Ok(match direction {
            Direction::UpDown => Coefficients::from_matrix(&matrix, polarization, top, bottom),
            Direction::DownUp => Coefficients::from_matrix(&matrix, polarization, bottom, top),
        })
    }

    fn terminal(&self, index: usize) -> Result<Terminal> {
        Ok(Terminal::new(
            self.parent.refractive_index(index)?,
            self.parent.propagation_angle(index)?,
        ))
    }
}

/// Field factors and intensities at one point of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Emission {
    pub fx: Complex64,
    pub fy: Complex64,
    pub fz: Complex64,
    /// `|Fy|²`
    pub te: f64,
    /// `|Fx·cos²θ0 + Fz·sin²θ0|²`
    pub tm: f64,
}

/// TE intensity `|Fy|²`.
pub fn te_intensity(fy: Complex64) -> f64 {
    fy.norm_sqr()
}

/// TM intensity `|Fx·cos²θ0 + Fz·sin²θ0|²` for incidence angle `theta0`.
pub fn tm_intensity(fx: Complex64, fz: Complex64, theta0: f64) -> f64 {
    (fx * theta0.cos().powi(2) + fz * theta0.sin().powi(2)).norm_sqr()
}

impl Multilayer {
    /// `Fx(z)` for light leaving the top medium at `angle` (radians).
    pub fn calculate_fx(&mut self, z: f64, wavelength: f64, angle: f64) -> Result<Complex64> {
        self.field_factor(Component::X, z, wavelength, angle)
    }

    /// `Fy(z)` for light leaving the top medium at `angle` (radians).
    pub fn calculate_fy(&mut self, z: f64, wavelength: f64, angle: f64) -> Result<Complex64> {
        self.field_factor(Component::Y, z, wavelength, angle)
    }

    /// `Fz(z)` for light leaving the top medium at `angle` (radians).
    pub fn calculate_fz(&mut self, z: f64, wavelength: f64, angle: f64) -> Result<Complex64> {
        self.field_factor(Component::Z, z, wavelength, angle)
    }

    pub fn field_factor(&mut self, component: Component, z: f64, wavelength: f64, angle: f64) -> Result<Complex64> {
        self.field_factor_at(component, z, wavelength, angle, 0)
    }

    /// Field factor with `angle` given in layer `reference` instead of the
    /// top medium.
    pub fn field_factor_at(
        &mut self,
        component: Component,
        z: f64,
        wavelength: f64,
        angle: f64,
        reference: usize,
    ) -> Result<Complex64> {
        self.configure(
            component.polarization(),
            wavelength,
            Complex64::new(angle, 0.0),
            reference,
        )?;
        let value = self.evaluate(component, z)?;
        trace!(?component, z, wavelength, angle, value = %value, "field factor");
        Ok(value)
    }

    /// All three factors and both intensities. `Fx` and `Fz` are evaluated
    /// before `Fy` so the polarization changes at most once per call.
    pub fn emission(&mut self, z: f64, wavelength: f64, angle: f64) -> Result<Emission> {
        let fx = self.calculate_fx(z, wavelength, angle)?;
        let fz = self.calculate_fz(z, wavelength, angle)?;
        let fy = self.calculate_fy(z, wavelength, angle)?;
        Ok(Emission {
            fx,
            fy,
            fz,
            te: te_intensity(fy),
            tm: tm_intensity(fx, fz, angle),
        })
    }

    fn configure(
        &mut self,
        polarization: Polarization,
        wavelength: f64,
        angle: Complex64,
        reference: usize,
    ) -> Result<()> {
        StackError::check_index(reference, self.num_layers())?;
        let (min, max) = self.valid_range();
        if !(min..=max).contains(&wavelength) {
            return Err(StackError::WavelengthOutOfRange {
                wavelength,
                min,
                max,
            });
        }

        let unchanged = self.polarization() == Some(polarization)
            && self.wavelength() == Some(wavelength)
            && self.propagation_angle(reference).ok() == Some(angle);
        if unchanged && self.is_updated() {
            return Ok(());
        }

        // restored when any stage fails
        let saved = self.clone();
        let applied = self.apply_configuration(polarization, wavelength, angle, reference);
        if applied.is_err() {
            *self = saved;
        }
        applied
    }

    fn apply_configuration(
        &mut self,
        polarization: Polarization,
        wavelength: f64,
        angle: Complex64,
        reference: usize,
    ) -> Result<()> {
        if self.polarization() != Some(polarization) {
            self.set_polarization(polarization);
        }
        if self.wavelength() != Some(wavelength) {
            self.set_wavelength(wavelength)?;
            self.set_propagation_angle(angle, reference)?;
        }
        if self.propagation_angle(reference).ok() != Some(angle) {
            self.set_propagation_angle(angle, reference)?;
        }
        if !self.is_updated() {
            self.update()?;
        }
        Ok(())
    }

    fn evaluate(&self, component: Component, z: f64) -> Result<Complex64> {
        let i = Complex64::i();
        let one = Complex64::new(1.0, 0.0);
        let wavelength = self
            .wavelength()
            .ok_or(StackError::Missing(Prerequisite::Wavelength))?;
        let coefficients = self
            .coefficients_up_down()
            .ok_or(StackError::Missing(Prerequisite::GlobalMatrices))?;

        let theta0 = self.propagation_angle(0)?;
        let n0 = self.refractive_index(0)?;
        let z0 = self.position(0)?;
        let invariant = n0 * theta0.sin();
        let eta = |n: Complex64| 2.0 * PI * (n * n - invariant * invariant).sqrt() / wavelength;
        let eta0 = eta(n0);

        let index = self.index_at_depth(z);
        let last = self.num_layers() - 1;

        if index == 0 {
            let reflected = coefficients.r * (2.0 * i * eta0 * (z - z0)).exp();
            return Ok(one + component.sign() * reflected);
        }
        if component.is_degenerate(theta0) {
            return Ok(one);
        }

        let theta_j = self.propagation_angle(index)?;
        let eta_j = eta(self.refractive_index(index)?);
        let ratio = component.ratio(theta_j, theta0);

        if index == last {
            let phase = (i * eta0 * (z - z0) - i * eta_j * z).exp();
            return Ok(coefficients.t * phase * ratio);
        }

        let above = SubStack::new(self, 0, index)?;
        let below = SubStack::new(self, index, last)?;
        let t_above = above.coefficients(Direction::UpDown)?.t;
        let r_above = above.coefficients(Direction::DownUp)?.r;
        let r_below = below.coefficients(Direction::UpDown)?.r;

        let z_j = self.position(index)?;
        let z_upper = self.position(index - 1)?;
        let d_j = self.thickness(index)?;

        let numerator = t_above * (one + component.sign() * r_below * (2.0 * i * eta_j * (z - z_j)).exp());
        let denominator = one - r_below * r_above * (2.0 * i * eta_j * d_j).exp();
        let phase = (i * eta0 * (z - z0) - i * eta_j * (z - z_upper)).exp();
        Ok(numerator * phase * ratio / denominator)
    }
}
