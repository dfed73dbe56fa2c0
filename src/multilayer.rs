//! Planar stacks of optical media and their cached optical state.
//!
//! A [`Multilayer`] is an ordered list of layers. The first is the
//! semi-infinite top (incidence) medium and the last the semi-infinite bottom
//! (exit) medium; every layer in between has a finite thickness.
//!
//! # Geometry
//!
//! The position of a layer is the z coordinate of its lower interface. The
//! origin lies on the interface between the bottom medium and the layer
//! above it:
//!
//! ```text
//!  z
//!  ^     layer 0        (top, semi-infinite)
//!  |   ---------------- position(0) = position(1) + d1
//!  |     layer 1        thickness d1
//!  |   ---------------- position(1) = d2
//!  |     layer 2        thickness d2
//!  |   ---------------- position(2) = 0
//!  |     layer 3        (bottom, semi-infinite, position -inf)
//! ```
//!
//! # Cached state
//!
//! The optical state is built up in stages, each depending on the previous
//! one:
//!
//! 1. wavelength, which fixes the refractive index of every layer
//! 2. propagation angles, propagated with Snell's law from a reference layer
//! 3. polarization together with 1 and 2 gives the per-layer matrices
//! 4. global up-down and down-up matrices and their coefficients
//!
//! Changing a stage clears exactly the stages that depend on it. Nothing is
//! recomputed eagerly; [`Multilayer::update`] fills in whatever is missing.
//! Every setter validates its input before touching the state, so an error
//! leaves the stack as it was.

use std::sync::Arc;

use itertools::Itertools;
use nalgebra::Matrix2;
use num_complex::Complex64;
use tracing::{debug, trace, warn};

use crate::error::{Prerequisite, Result, StackError};
use crate::medium::Medium;
use crate::snell;
use crate::transfer::{self, Coefficients, Direction, Polarization, Terminal};


/// One entry of the ordered description a [`Multilayer`] is built from.
#[derive(Debug, Clone)]
pub enum LayerSpec {
    /// A medium without thickness: semi-infinite at either end of the stack,
    /// zero thickness anywhere else.
    Medium(Arc<Medium>),
    /// A film of the given thickness. Only valid for interior layers.
    Film(Arc<Medium>, f64),
}

impl From<Arc<Medium>> for LayerSpec {
    fn from(medium: Arc<Medium>) -> Self {
        LayerSpec::Medium(medium)
    }
}

impl From<(Arc<Medium>, f64)> for LayerSpec {
    fn from((medium, thickness): (Arc<Medium>, f64)) -> Self {
        LayerSpec::Film(medium, thickness)
    }
}

/// Propagation angle input for [`Multilayer::set_propagation_angle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Angle {
    /// One angle, valid in the reference layer and propagated to the others
    /// with Snell's law.
    Uniform(Complex64),
    /// Explicit angle for every layer, top to bottom. Snell's law is not
    /// applied.
    PerLayer(Vec<Complex64>),
}

impl From<f64> for Angle {
    fn from(angle: f64) -> Self {
        Angle::Uniform(Complex64::new(angle, 0.0))
    }
}

impl From<Complex64> for Angle {
    fn from(angle: Complex64) -> Self {
        Angle::Uniform(angle)
    }
}

fn check_thickness(index: usize, thickness: f64) -> Result<()> {
    if !thickness.is_finite() {
        return Err(StackError::Config(format!(
            "layer {}: thickness must be a finite number, got {}",
            index, thickness
        )));
    }
    if thickness < 0.0 {
        return Err(StackError::NegativeThickness { index, thickness });
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Layer {
    medium: Arc<Medium>,
    thickness: f64,
    position: f64,
    refractive_index: Option<Complex64>,
    angle: Option<Complex64>,
    matrix: Option<Matrix2<Complex64>>,
}

impl Layer {
    fn new(medium: Arc<Medium>, thickness: f64) -> Self {
        Self {
            medium,
            thickness,
            position: 0.0,
            refractive_index: None,
            angle: None,
            matrix: None,
        }
    }
}

/// Whole-stack matrices and the coefficients derived from them. Always
/// valid or cleared together.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GlobalState {
    up_down: Matrix2<Complex64>,
    down_up: Matrix2<Complex64>,
    coefficients_up_down: Coefficients,
    coefficients_down_up: Coefficients,
}

/// A stack of planar layers.
#[derive(Debug, Clone)]
pub struct Multilayer {
    layers: Vec<Layer>,
    valid_range: (f64, f64),
    wavelength: Option<f64>,
    polarization: Option<Polarization>,
    global: Option<GlobalState>,
}

impl Multilayer {
    /// Builds a stack from its top-to-bottom description.
    ///
    /// The first and last entries must be [`LayerSpec::Medium`]. The stack is
    /// only usable at wavelengths covered by every medium in it.
    pub fn new(specs: impl IntoIterator<Item = LayerSpec>) -> Result<Self> {
        let specs = specs.into_iter().collect_vec();
        if specs.len() < 2 {
            return Err(StackError::Config(format!(
                "a multilayer needs at least 2 layers, got {}",
                specs.len()
            )));
        }

        let last = specs.len() - 1;
        let mut layers = Vec::with_capacity(specs.len());
        for (index, spec) in specs.into_iter().enumerate() {
            let terminal = index == 0 || index == last;
            let layer = match spec {
                LayerSpec::Medium(medium) if terminal => Layer::new(medium, f64::INFINITY),
                LayerSpec::Medium(medium) => {
                    warn!(layer = index, "interior layer given without a thickness, using 0");
                    Layer::new(medium, 0.0)
                }
                LayerSpec::Film(..) if terminal => {
                    return Err(StackError::Config(format!(
                        "layer {} is semi-infinite and cannot be given a thickness",
                        index
                    )))
                }
                LayerSpec::Film(medium, thickness) => {
                    check_thickness(index, thickness)?;
                    Layer::new(medium, thickness)
                }
            };
            layers.push(layer);
        }

        let valid_range = layers
            .iter()
            .map(|layer| layer.medium.valid_range())
            .fold((f64::NEG_INFINITY, f64::INFINITY), |(lo, hi), (min, max)| {
                (lo.max(min), hi.min(max))
            });
        if valid_range.0 >= valid_range.1 {
            return Err(StackError::EmptyRange);
        }

        let mut multilayer = Self {
            layers,
            valid_range,
            wavelength: None,
            polarization: None,
            global: None,
        };
        multilayer.calc_positions();
        debug!(
            layers = multilayer.num_layers(),
            min = valid_range.0,
            max = valid_range.1,
            "multilayer built"
        );
        Ok(multilayer)
    }

    fn calc_positions(&mut self) {
        let last = self.layers.len() - 1;
        self.layers[last].position = f64::NEG_INFINITY;
        self.layers[last - 1].position = 0.0;
        for index in (0..last - 1).rev() {
            let below = &self.layers[index + 1];
            self.layers[index].position = below.position + below.thickness;
        }
    }

    fn invalidate_global(&mut self) {
        if self.global.take().is_some() {
            trace!("global matrices and coefficients cleared");
        }
    }

    fn layer(&self, index: usize) -> Result<&Layer> {
        StackError::check_index(index, self.layers.len())?;
        Ok(&self.layers[index])
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// z coordinate of the lower interface of a layer.
    pub fn position(&self, index: usize) -> Result<f64> {
        Ok(self.layer(index)?.position)
    }

    /// Thickness of a layer, infinite for the top and bottom media.
    pub fn thickness(&self, index: usize) -> Result<f64> {
        Ok(self.layer(index)?.thickness)
    }

    pub fn medium(&self, index: usize) -> Result<&Arc<Medium>> {
        Ok(&self.layer(index)?.medium)
    }

    /// Wavelength interval covered by every medium of the stack.
    pub fn valid_range(&self) -> (f64, f64) {
        self.valid_range
    }

    pub fn wavelength(&self) -> Option<f64> {
        self.wavelength
    }

    pub fn polarization(&self) -> Option<Polarization> {
        self.polarization
    }

    /// Refractive index of a layer at the current wavelength.
    pub fn refractive_index(&self, index: usize) -> Result<Complex64> {
        self.layer(index)?
            .refractive_index
            .ok_or(StackError::Missing(Prerequisite::Wavelength))
    }

    pub fn propagation_angle(&self, index: usize) -> Result<Complex64> {
        self.layer(index)?
            .angle
            .ok_or(StackError::Missing(Prerequisite::PropagationAngle(index)))
    }

    /// Characteristic matrix of an interior layer.
    pub fn layer_matrix(&self, index: usize) -> Result<Matrix2<Complex64>> {
        StackError::check_interior(index, self.layers.len())?;
        self.layers[index]
            .matrix
            .ok_or(StackError::Missing(Prerequisite::LayerMatrix(index)))
    }

    pub fn char_matrix_up_down(&self) -> Option<Matrix2<Complex64>> {
        self.global.map(|global| global.up_down)
    }

    pub fn char_matrix_down_up(&self) -> Option<Matrix2<Complex64>> {
        self.global.map(|global| global.down_up)
    }

    pub fn coefficients_up_down(&self) -> Option<Coefficients> {
        self.global.map(|global| global.coefficients_up_down)
    }

    pub fn coefficients_down_up(&self) -> Option<Coefficients> {
        self.global.map(|global| global.coefficients_down_up)
    }

    pub fn coefficients(&self, direction: Direction) -> Option<Coefficients> {
        match direction {
            Direction::UpDown => self.coefficients_up_down(),
            Direction::DownUp => self.coefficients_down_up(),
        }
    }

    /// Whether the global matrices and coefficients are valid.
    pub fn is_updated(&self) -> bool {
        self.global.is_some()
    }

    /// Index of the layer that contains the depth `z`.
    ///
    /// Layers are scanned from the top; the first one whose lower interface
    /// lies at or below `z` is returned. Depths above the stack belong to the
    /// top medium and depths below `0` to the bottom medium.
    pub fn index_at_depth(&self, z: f64) -> usize {
        self.layers
            .iter()
            .position(|layer| z >= layer.position)
            .unwrap_or(self.layers.len() - 1)
    }

    /// Changes the thickness of an interior layer.
    ///
    /// Only the matrix of that layer and the global state are cleared.
    pub fn set_thickness(&mut self, index: usize, thickness: f64) -> Result<()> {
        StackError::check_interior(index, self.layers.len())?;
        check_thickness(index, thickness)?;

        let layer = &mut self.layers[index];
        layer.thickness = thickness;
        layer.matrix = None;
        self.calc_positions();
        self.invalidate_global();
        debug!(layer = index, thickness, "thickness changed");
        Ok(())
    }

    fn check_wavelength(&self, wavelength: f64) -> Result<()> {
        let (min, max) = self.valid_range;
        if (min..=max).contains(&wavelength) {
            Ok(())
        } else {
            Err(StackError::WavelengthOutOfRange {
                wavelength,
                min,
                max,
            })
        }
    }

    /// Sets the wavelength and interpolates the refractive index of every
    /// layer. Angles, layer matrices and the global state are cleared.
    pub fn set_wavelength(&mut self, wavelength: f64) -> Result<()> {
        self.check_wavelength(wavelength)?;
        let indices = self
            .layers
            .iter()
            .map(|layer| layer.medium.refractive_index(wavelength))
            .collect::<Result<Vec<_>>>()?;
        self.apply_wavelength(wavelength, indices);
        Ok(())
    }

    /// Sets the wavelength with explicitly given refractive indices, one per
    /// layer from the top. The media are not consulted.
    pub fn set_wavelength_with_indices(&mut self, wavelength: f64, indices: &[Complex64]) -> Result<()> {
        self.check_wavelength(wavelength)?;
        if indices.len() != self.layers.len() {
            return Err(StackError::OverrideLength {
                expected: self.layers.len(),
                got: indices.len(),
            });
        }
        self.apply_wavelength(wavelength, indices.to_vec());
        Ok(())
    }

    fn apply_wavelength(&mut self, wavelength: f64, indices: Vec<Complex64>) {
        for (index, (layer, n)) in self.layers.iter_mut().zip(indices).enumerate() {
            trace!(layer = index, n = %n, "refractive index");
            layer.refractive_index = Some(n);
            layer.angle = None;
            layer.matrix = None;
        }
        self.wavelength = Some(wavelength);
        self.invalidate_global();
        debug!(wavelength, "wavelength set, angles and matrices cleared");
    }

    /// Sets the polarization. Layer matrices and the global state are
    /// cleared, angles and refractive indices are kept.
    pub fn set_polarization(&mut self, polarization: Polarization) {
        for layer in &mut self.layers {
            layer.matrix = None;
        }
        self.polarization = Some(polarization);
        self.invalidate_global();
        debug!(%polarization, "polarization set");
    }

    /// Sets the propagation angle of every layer.
    ///
    /// A [`Angle::Uniform`] angle holds in layer `reference` and is carried
    /// to the other layers with Snell's law. Requires the wavelength. Layer
    /// matrices and the global state are cleared.
    pub fn set_propagation_angle(&mut self, angle: impl Into<Angle>, reference: usize) -> Result<()> {
        if self.wavelength.is_none() {
            return Err(StackError::Missing(Prerequisite::Wavelength));
        }

        let angles = match angle.into() {
            Angle::Uniform(theta) => {
                let n_ref = self.refractive_index(reference)?;
                self.layers
                    .iter()
                    .map(|layer| {
                        let n = layer
                            .refractive_index
                            .ok_or(StackError::Missing(Prerequisite::Wavelength))?;
                        snell::propagate(theta, n_ref, n)
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            Angle::PerLayer(angles) => {
                if angles.len() != self.layers.len() {
                    return Err(StackError::OverrideLength {
                        expected: self.layers.len(),
                        got: angles.len(),
                    });
                }
                angles
            }
        };

        for (index, (layer, theta)) in self.layers.iter_mut().zip(angles).enumerate() {
            trace!(layer = index, theta = %theta, "propagation angle");
            layer.angle = Some(theta);
            layer.matrix = None;
        }
        self.invalidate_global();
        debug!(reference, "propagation angles set");
        Ok(())
    }

    /// Computes the characteristic matrices of the given interior layers, or
    /// of all of them when `indices` is `None`.
    ///
    /// Either every requested matrix is computed or none is.
    pub fn compute_layer_matrices(&mut self, indices: Option<&[usize]>) -> Result<()> {
        let wavelength = self
            .wavelength
            .ok_or(StackError::Missing(Prerequisite::Wavelength))?;
        let polarization = self
            .polarization
            .ok_or(StackError::Missing(Prerequisite::Polarization))?;

        let targets = match indices {
            Some(indices) => indices.to_vec(),
            None => (1..self.layers.len() - 1).collect(),
        };

        let mut matrices = Vec::with_capacity(targets.len());
        for index in targets {
            StackError::check_interior(index, self.layers.len())?;
            let layer = &self.layers[index];
            let n = layer
                .refractive_index
                .ok_or(StackError::Missing(Prerequisite::Wavelength))?;
            let theta = layer
                .angle
                .ok_or(StackError::Missing(Prerequisite::PropagationAngle(index)))?;
            let matrix = transfer::layer_matrix(n, layer.thickness, theta, wavelength, polarization);
            matrices.push((index, matrix));
        }

        for (index, matrix) in matrices {
            trace!(layer = index, "characteristic matrix computed");
            self.layers[index].matrix = Some(matrix);
        }
        Ok(())
    }

    fn terminal(&self, index: usize) -> Result<Terminal> {
        Ok(Terminal::new(
            self.refractive_index(index)?,
            self.propagation_angle(index)?,
        ))
    }

    fn derive_coefficients(&self, matrix: &Matrix2<Complex64>, direction: Direction) -> Result<Coefficients> {
        let polarization = self
            .polarization
            .ok_or(StackError::Missing(Prerequisite::Polarization))?;
        let top = self.terminal(0)?;
        let bottom = self.terminal(self.layers.len() - 1)?;
        Ok(match direction {
            Direction::UpDown => Coefficients::from_matrix(matrix, polarization, top, bottom),
            Direction::DownUp => Coefficients::from_matrix(matrix, polarization, bottom, top),
        })
    }

    /// Multiplies the layer matrices into the up-down (top to bottom) and
    /// down-up (bottom to top) matrices of the whole stack and derives the
    /// coefficients in both directions.
    pub fn update_global_matrices(&mut self) -> Result<()> {
        let matrices = (1..self.layers.len() - 1)
            .map(|index| {
                self.layers[index]
                    .matrix
                    .as_ref()
                    .ok_or(StackError::Missing(Prerequisite::LayerMatrix(index)))
            })
            .collect::<Result<Vec<_>>>()?;

        let up_down = transfer::chain(matrices.iter().copied());
        let down_up = transfer::chain(matrices.iter().rev().copied());
        let coefficients_up_down = self.derive_coefficients(&up_down, Direction::UpDown)?;
        let coefficients_down_up = self.derive_coefficients(&down_up, Direction::DownUp)?;

        debug!(
            r = %coefficients_up_down.r,
            reflectance = coefficients_up_down.reflectance,
            "global matrices and coefficients updated"
        );
        self.global = Some(GlobalState {
            up_down,
            down_up,
            coefficients_up_down,
            coefficients_down_up,
        });
        Ok(())
    }

    /// Derives the coefficients in one direction from the stored global
    /// matrices.
    pub fn compute_coefficients(&self, direction: Direction) -> Result<Coefficients> {
        let global = self
            .global
            .ok_or(StackError::Missing(Prerequisite::GlobalMatrices))?;
        let matrix = match direction {
            Direction::UpDown => global.up_down,
            Direction::DownUp => global.down_up,
        };
        self.derive_coefficients(&matrix, direction)
    }

    /// Computes whatever is missing among the layer matrices, the global
    /// matrices and the coefficients.
    pub fn update(&mut self) -> Result<()> {
        let missing = (1..self.layers.len() - 1)
            .filter(|&index| self.layers[index].matrix.is_none())
            .collect_vec();
        if !missing.is_empty() {
            self.compute_layer_matrices(Some(&missing))?;
        }
        if self.global.is_none() {
            self.update_global_matrices()?;
        }
        Ok(())
    }
}
