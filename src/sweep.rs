//! Batch drivers evaluating the emitted intensities over a range of depths,
//! angles or wavelengths.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array1};
use serde::Serialize;
use tracing::{debug, info};

use crate::field::{te_intensity, tm_intensity};
use crate::multilayer::Multilayer;
use crate::settings::{OutputFormat, Range, Settings, Sweep};
use crate::table;


/// Header line of sweeps that integrate numerically.
pub const INTEGRATION_NOTE: &str = "integrals use the trapezoidal rule";

/// Results of a sweep, one row per point.
#[derive(Debug, Clone, Serialize)]
pub struct SweepOutput {
    pub sweep: String,
    pub header: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl SweepOutput {
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self).context("failed to serialise results")
    }

    /// Writes to `path`, or to stdout when `path` is `None`.
    pub fn writeup(&self, path: Option<&Path>, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Tsv => {
                let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
                table::write_tsv_to(path, &self.header, &columns, &self.rows)
            }
            OutputFormat::Json => match path {
                Some(path) => {
                    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
                    let mut writer = BufWriter::new(file);
                    self.write_json(&mut writer)?;
                    writer.flush()?;
                    Ok(())
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut writer = stdout.lock();
                    self.write_json(&mut writer)?;
                    writeln!(writer)?;
                    Ok(())
                }
            },
        }
    }
}

/// Runs the sweep described by `settings` on `stack`.
pub fn run(settings: &Settings, stack: &mut Multilayer, progress: bool) -> Result<SweepOutput> {
    let start = Instant::now();
    info!("running {} sweep", settings.sweep.name());

    let (columns, rows) = match &settings.sweep {
        Sweep::Z { wavelength, angle, z } => {
            let zs = z.values();
            let pb = progress_bar(2 * zs.len(), "depth", progress)?;
            let rows = z_sweep(stack, *wavelength, angle.to_radians(), &zs, &pb)?;
            pb.finish_and_clear();
            (["z", "F_TE", "F_TM"], rows)
        }
        Sweep::Angle { z, wavelength, angle } => {
            let angles = angle.values();
            let pb = progress_bar(angles.len(), "angle", progress)?;
            let rows = angle_sweep(stack, *z, *wavelength, &angles, &pb)?;
            pb.finish_and_clear();
            (["angle", "F_TE", "F_TM"], rows)
        }
        Sweep::Wavelength { z, angle, wavelength } => {
            let wavelengths = wavelengths_or_valid(wavelength.as_ref(), stack);
            let pb = progress_bar(wavelengths.len(), "wavelength", progress)?;
            let rows = wavelength_sweep(stack, *z, angle.to_radians(), &wavelengths, &pb)?;
            pb.finish_and_clear();
            (["wlength", "F_TE", "F_TM"], rows)
        }
        Sweep::Spectrum {
            angle,
            distribution,
            wavelength,
        } => {
            let table = table::read_table(&distribution.file, &distribution.format(), &distribution.columns)?;
            let z = table.column(0).to_owned();
            let weights = table.column(1).to_owned();
            let wavelengths = wavelengths_or_valid(wavelength.as_ref(), stack);
            let pb = progress_bar(wavelengths.len(), "wavelength", progress)?;
            let rows = spectrum(stack, angle.to_radians(), &z, &weights, &wavelengths, &pb)?;
            pb.finish_and_clear();
            (["wlength", "F_TE", "F_TM"], rows)
        }
        Sweep::Integral { z, angle, wavelength } => {
            let angles = angle.values();
            let wavelengths = wavelengths_or_valid(wavelength.as_ref(), stack);
            let pb = progress_bar(wavelengths.len(), "wavelength", progress)?;
            let rows = wavelength_integral(stack, *z, &angles, &wavelengths, &pb)?;
            pb.finish_and_clear();
            (["angle", "F_TE", "F_TM"], rows)
        }
    };

    let duration = start.elapsed();
    info!(
        "Time taken: {:.2?}, Time per point: {:.2?}",
        duration,
        duration / rows.len().max(1) as u32
    );

    let mut header: Vec<String> = settings.to_string().lines().map(str::to_string).collect();
    if matches!(settings.sweep, Sweep::Spectrum { .. } | Sweep::Integral { .. }) {
        header.push(INTEGRATION_NOTE.to_string());
    }

    Ok(SweepOutput {
        sweep: settings.sweep.name().to_string(),
        header,
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    })
}

fn progress_bar(len: usize, message: &str, enabled: bool) -> Result<ProgressBar> {
    if !enabled {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
        )?
        .progress_chars("█▇▆▅▄▃▂▁"),
    );
    pb.set_message(message.to_string());
    Ok(pb)
}

/// The configured wavelengths, or the valid range of the stack in steps of 1
/// from its lower bound, the upper bound excluded.
fn wavelengths_or_valid(range: Option<&Range>, stack: &Multilayer) -> Vec<f64> {
    match range {
        Some(range) => range.values(),
        None => {
            let (min, max) = stack.valid_range();
            (0..)
                .map(|i| min + i as f64)
                .take_while(|&wavelength| wavelength < max)
                .collect()
        }
    }
}

/// Integrate `y` over `x` with the trapezoidal rule.
pub fn integrate_trapezoidal(x: &Array1<f64>, y: &Array1<f64>) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let dx = &x.slice(s![1..]) - &x.slice(s![..-1]);
    let avg_y = (&y.slice(s![1..]) + &y.slice(s![..-1])) / 2.0;
    (dx * avg_y).sum()
}

/// TE and TM intensities at every depth. All `Fx`/`Fz` pairs are evaluated
/// first and every `Fy` after, so the polarization flips once.
fn depth_profile(
    stack: &mut Multilayer,
    wavelength: f64,
    angle: f64,
    zs: &[f64],
    pb: &ProgressBar,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let mut tm = Array1::zeros(zs.len());
    for (i, &z) in zs.iter().enumerate() {
        let fx = stack.calculate_fx(z, wavelength, angle)?;
        let fz = stack.calculate_fz(z, wavelength, angle)?;
        tm[i] = tm_intensity(fx, fz, angle);
        pb.inc(1);
    }

    let mut te = Array1::zeros(zs.len());
    for (i, &z) in zs.iter().enumerate() {
        te[i] = te_intensity(stack.calculate_fy(z, wavelength, angle)?);
        pb.inc(1);
    }
    Ok((te, tm))
}

/// Rows of `[z, I_TE, I_TM]` at fixed wavelength and angle (radians).
pub fn z_sweep(stack: &mut Multilayer, wavelength: f64, angle: f64, zs: &[f64], pb: &ProgressBar) -> Result<Vec<Vec<f64>>> {
    let (te, tm) = depth_profile(stack, wavelength, angle, zs, pb)?;
    Ok(zs
        .iter()
        .zip(te.iter().zip(tm.iter()))
        .map(|(&z, (&te, &tm))| vec![z, te, tm])
        .collect())
}

/// Rows of `[angle, I_TE, I_TM]` for angles in degrees.
pub fn angle_sweep(
    stack: &mut Multilayer,
    z: f64,
    wavelength: f64,
    angles: &[f64],
    pb: &ProgressBar,
) -> Result<Vec<Vec<f64>>> {
    let mut rows = Vec::with_capacity(angles.len());
    for &angle in angles {
        let emission = stack.emission(z, wavelength, angle.to_radians())?;
        rows.push(vec![angle, emission.te, emission.tm]);
        pb.inc(1);
    }
    Ok(rows)
}

/// Rows of `[λ, I_TE, I_TM]` at fixed depth and angle (radians).
pub fn wavelength_sweep(
    stack: &mut Multilayer,
    z: f64,
    angle: f64,
    wavelengths: &[f64],
    pb: &ProgressBar,
) -> Result<Vec<Vec<f64>>> {
    let mut rows = Vec::with_capacity(wavelengths.len());
    for &wavelength in wavelengths {
        let emission = stack.emission(z, wavelength, angle)?;
        rows.push(vec![wavelength, emission.te, emission.tm]);
        pb.inc(1);
    }
    Ok(rows)
}

/// Spectrum modification by emitters spread over depths `z` with weights
/// `weights`: rows of `[λ, ∫I_TE·w dz, ∫I_TM·w dz]`.
///
/// The distribution must integrate to 1.
pub fn spectrum(
    stack: &mut Multilayer,
    angle: f64,
    z: &Array1<f64>,
    weights: &Array1<f64>,
    wavelengths: &[f64],
    pb: &ProgressBar,
) -> Result<Vec<Vec<f64>>> {
    if z.len() != weights.len() {
        bail!("distribution has {} depths but {} weights", z.len(), weights.len());
    }
    let norm = integrate_trapezoidal(z, weights);
    if (norm - 1.0).abs() > 1e-2 {
        bail!("distribution must integrate to 1, got {:.4}", norm);
    }
    debug!(points = z.len(), norm, "distribution accepted");

    let zs = z.to_vec();
    let hidden = ProgressBar::hidden();
    let mut rows = Vec::with_capacity(wavelengths.len());
    for &wavelength in wavelengths {
        let (te, tm) = depth_profile(stack, wavelength, angle, &zs, &hidden)?;
        rows.push(vec![
            wavelength,
            integrate_trapezoidal(z, &(&te * weights)),
            integrate_trapezoidal(z, &(&tm * weights)),
        ]);
        pb.inc(1);
    }
    Ok(rows)
}

/// Wavelength averages `∫I dλ / (λmax - λmin)` at fixed depth: rows of
/// `[angle, I_TE, I_TM]` for angles in degrees.
pub fn wavelength_integral(
    stack: &mut Multilayer,
    z: f64,
    angles: &[f64],
    wavelengths: &[f64],
    pb: &ProgressBar,
) -> Result<Vec<Vec<f64>>> {
    let (first, last) = match (wavelengths.first(), wavelengths.last()) {
        (Some(&first), Some(&last)) if last > first => (first, last),
        _ => bail!("integrating over wavelength needs at least two distinct wavelengths"),
    };
    let span = last - first;

    let mut te = vec![Vec::with_capacity(wavelengths.len()); angles.len()];
    let mut tm = vec![Vec::with_capacity(wavelengths.len()); angles.len()];
    for &wavelength in wavelengths {
        for (i, &angle) in angles.iter().enumerate() {
            let emission = stack.emission(z, wavelength, angle.to_radians())?;
            te[i].push(emission.te);
            tm[i].push(emission.tm);
        }
        pb.inc(1);
    }

    let x = Array1::from(wavelengths.to_vec());
    Ok(angles
        .iter()
        .zip(te.into_iter().zip(tm))
        .map(|(&angle, (te, tm))| {
            vec![
                angle,
                integrate_trapezoidal(&x, &Array1::from(te)) / span,
                integrate_trapezoidal(&x, &Array1::from(tm)) / span,
            ]
        })
        .collect())
}
