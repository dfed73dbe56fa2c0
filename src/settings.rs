use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::medium::Medium;
use crate::multilayer::{LayerSpec, Multilayer};
use crate::table::{self, TableFormat};


/// Prefix of environment variables overriding settings, e.g.
/// `MULTILAYER_OUTPUT=result.tsv`.
pub const ENV_PREFIX: &str = "MULTILAYER";

/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    /// Tabulated media, by name.
    pub media: BTreeMap<String, MediumSource>,
    /// The stack, top to bottom.
    pub layers: Vec<LayerEntry>,
    pub sweep: Sweep,
    /// Output file. Standard output when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub format: OutputFormat,
}

/// A medium table on disk.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MediumSource {
    pub file: PathBuf,
    #[serde(default = "default_comment")]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub skip_rows: usize,
    /// Columns holding wavelength, real index and extinction coefficient.
    #[serde(default = "default_medium_columns")]
    pub columns: [usize; 3],
}

impl MediumSource {
    pub fn format(&self) -> TableFormat {
        TableFormat {
            comment: self.comment.clone(),
            delimiter: self.delimiter.clone(),
            skip_rows: self.skip_rows,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LayerEntry {
    pub medium: String,
    /// Omitted for the top and bottom media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
}

/// Depth distribution of the emitters, a `(z, weight)` table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DistributionSource {
    pub file: PathBuf,
    #[serde(default = "default_comment")]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub skip_rows: usize,
    #[serde(default = "default_distribution_columns")]
    pub columns: [usize; 2],
}

impl DistributionSource {
    pub fn format(&self) -> TableFormat {
        TableFormat {
            comment: self.comment.clone(),
            delimiter: self.delimiter.clone(),
            skip_rows: self.skip_rows,
        }
    }
}

fn default_comment() -> String {
    "#".to_string()
}

fn default_medium_columns() -> [usize; 3] {
    [0, 1, 2]
}

fn default_distribution_columns() -> [usize; 2] {
    [0, 1]
}

/// Inclusive, evenly spaced range of values.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct Range {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl Range {
    pub fn values(&self) -> Vec<f64> {
        if !(self.step > 0.0) || self.stop < self.start {
            return Vec::new();
        }
        let count = ((self.stop - self.start) / self.step + 1e-9).floor() as usize + 1;
        (0..count)
            .map(|i| self.start + i as f64 * self.step)
            .collect()
    }

    fn validate(&self, what: &str) -> Result<()> {
        if !(self.start.is_finite() && self.stop.is_finite() && self.step.is_finite()) {
            bail!("{} range must be finite: {:?}", what, self);
        }
        if self.step <= 0.0 {
            bail!("{} step must be positive, got {}", what, self.step);
        }
        if self.stop < self.start {
            bail!("{} range is empty: {} > {}", what, self.start, self.stop);
        }
        Ok(())
    }
}

/// What to compute. Angles are in degrees, lengths in the units of the
/// medium tables.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Sweep {
    /// Intensities against depth at fixed wavelength and angle.
    Z { wavelength: f64, angle: f64, z: Range },
    /// Intensities against emission angle at fixed depth and wavelength.
    Angle { z: f64, wavelength: f64, angle: Range },
    /// Intensities against wavelength at fixed depth and angle. The whole
    /// valid range of the stack in steps of 1 when `wavelength` is unset.
    Wavelength {
        z: f64,
        angle: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wavelength: Option<Range>,
    },
    /// Spectrum modification by a depth distribution of emitters.
    Spectrum {
        angle: f64,
        distribution: DistributionSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wavelength: Option<Range>,
    },
    /// Intensities integrated over wavelength, against emission angle.
    Integral {
        z: f64,
        angle: Range,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wavelength: Option<Range>,
    },
}

impl Sweep {
    pub fn name(&self) -> &'static str {
        match self {
            Sweep::Z { .. } => "z",
            Sweep::Angle { .. } => "angle",
            Sweep::Wavelength { .. } => "wavelength",
            Sweep::Spectrum { .. } => "spectrum",
            Sweep::Integral { .. } => "integral",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Tab-separated columns with a `#` header.
    #[default]
    Tsv,
    Json,
}

impl Settings {
    /// Checks everything that can be checked without reading the tables.
    pub fn validate(&self) -> Result<()> {
        if self.layers.len() < 2 {
            bail!("the stack needs at least 2 layers, got {}", self.layers.len());
        }
        let last = self.layers.len() - 1;
        for (index, layer) in self.layers.iter().enumerate() {
            if !self.media.contains_key(&layer.medium) {
                bail!("layer {} uses unknown medium '{}'", index, layer.medium);
            }
            match layer.thickness {
                Some(_) if index == 0 || index == last => {
                    bail!("layer {} is semi-infinite and cannot have a thickness", index)
                }
                Some(thickness) if !thickness.is_finite() => {
                    bail!("layer {}: thickness must be a finite number, got {}", index, thickness)
                }
                Some(thickness) if thickness < 0.0 => {
                    bail!("layer {}: thickness must be >= 0, got {}", index, thickness)
                }
                _ => {}
            }
        }

        let check_angle = |angle: f64| -> Result<()> {
            if (0.0..=90.0).contains(&angle) {
                Ok(())
            } else {
                Err(anyhow!("angle must lie in [0, 90] degrees, got {}", angle))
            }
        };
        let check_wavelength = |wavelength: f64| -> Result<()> {
            if wavelength > 0.0 && wavelength.is_finite() {
                Ok(())
            } else {
                Err(anyhow!("wavelength must be positive, got {}", wavelength))
            }
        };

        match &self.sweep {
            Sweep::Z { wavelength, angle, z } => {
                check_wavelength(*wavelength)?;
                check_angle(*angle)?;
                z.validate("z")?;
            }
            Sweep::Angle { wavelength, angle, .. } => {
                check_wavelength(*wavelength)?;
                angle.validate("angle")?;
                check_angle(angle.start)?;
                check_angle(angle.stop)?;
            }
            Sweep::Wavelength { angle, wavelength, .. } => {
                check_angle(*angle)?;
                if let Some(range) = wavelength {
                    range.validate("wavelength")?;
                    check_wavelength(range.start)?;
                }
            }
            Sweep::Spectrum { angle, wavelength, .. } => {
                check_angle(*angle)?;
                if let Some(range) = wavelength {
                    range.validate("wavelength")?;
                    check_wavelength(range.start)?;
                }
            }
            Sweep::Integral { angle, wavelength, .. } => {
                angle.validate("angle")?;
                check_angle(angle.start)?;
                check_angle(angle.stop)?;
                if let Some(range) = wavelength {
                    range.validate("wavelength")?;
                    check_wavelength(range.start)?;
                }
            }
        }
        Ok(())
    }

    /// Loads every medium used by the stack and builds it.
    pub fn build_stack(&self) -> Result<Multilayer> {
        let mut loaded: BTreeMap<&str, Arc<Medium>> = BTreeMap::new();
        let mut specs = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let medium = match loaded.get(layer.medium.as_str()) {
                Some(medium) => medium.clone(),
                None => {
                    let source = self
                        .media
                        .get(&layer.medium)
                        .ok_or_else(|| anyhow!("unknown medium '{}'", layer.medium))?;
                    let medium = table::read_medium(&source.file, &source.format(), source.columns)?;
                    debug!(name = %layer.medium, range = ?medium.valid_range(), "medium loaded");
                    let medium = Arc::new(medium.with_name(layer.medium.clone()));
                    loaded.insert(layer.medium.as_str(), medium.clone());
                    medium
                }
            };
            specs.push(match layer.thickness {
                Some(thickness) => LayerSpec::Film(medium, thickness),
                None => LayerSpec::Medium(medium),
            });
        }
        Ok(Multilayer::new(specs)?)
    }

    /// Makes relative table paths relative to `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        for source in self.media.values_mut() {
            if source.file.is_relative() {
                source.file = root.join(&source.file);
            }
        }
        if let Sweep::Spectrum { distribution, .. } = &mut self.sweep {
            if distribution.file.is_relative() {
                distribution.file = root.join(&distribution.file);
            }
        }
    }

    /// Applies command line overrides.
    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(output) = &args.output {
            self.output = Some(output.clone());
        }
        if args.json {
            self.format = OutputFormat::Json;
        }

        match &mut self.sweep {
            Sweep::Z { wavelength, angle, z } => {
                override_value(wavelength, args.wavelength);
                override_value(angle, args.angle);
                override_range(z, &args.range);
            }
            Sweep::Angle {
                z,
                wavelength,
                angle,
            } => {
                override_value(z, args.z);
                override_value(wavelength, args.wavelength);
                override_range(angle, &args.range);
            }
            Sweep::Wavelength {
                z,
                angle,
                wavelength,
            } => {
                override_value(z, args.z);
                override_value(angle, args.angle);
                override_optional_range(wavelength, &args.range);
            }
            Sweep::Spectrum {
                angle, wavelength, ..
            } => {
                override_value(angle, args.angle);
                override_optional_range(wavelength, &args.range);
            }
            Sweep::Integral { z, angle, .. } => {
                override_value(z, args.z);
                override_range(angle, &args.range);
            }
        }
    }
}

fn override_value(target: &mut f64, value: Option<f64>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn range_from_args(values: &Option<Vec<f64>>) -> Option<Range> {
    match values.as_deref() {
        Some([start, stop, step]) => Some(Range {
            start: *start,
            stop: *stop,
            step: *step,
        }),
        _ => None,
    }
}

fn override_range(target: &mut Range, values: &Option<Vec<f64>>) {
    if let Some(range) = range_from_args(values) {
        *target = range;
    }
}

fn override_optional_range(target: &mut Option<Range>, values: &Option<Vec<f64>>) {
    if let Some(range) = range_from_args(values) {
        *target = Some(range);
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stack:")?;
        for layer in &self.layers {
            match layer.thickness {
                Some(thickness) => writeln!(f, "  {} ({})", layer.medium, thickness)?,
                None => writeln!(f, "  {}", layer.medium)?,
            }
        }
        match &self.sweep {
            Sweep::Z { wavelength, angle, z } => write!(
                f,
                "sweep: z from {} to {} step {}, wavelength {}, angle {} deg",
                z.start, z.stop, z.step, wavelength, angle
            ),
            Sweep::Angle { z, wavelength, angle } => write!(
                f,
                "sweep: angle from {} to {} step {} deg, z {}, wavelength {}",
                angle.start, angle.stop, angle.step, z, wavelength
            ),
            Sweep::Wavelength { z, angle, .. } => {
                write!(f, "sweep: wavelength, z {}, angle {} deg", z, angle)
            }
            Sweep::Spectrum {
                angle, distribution, ..
            } => write!(
                f,
                "sweep: spectrum, angle {} deg, distribution {:?}",
                angle, distribution.file
            ),
            Sweep::Integral { z, angle, .. } => write!(
                f,
                "sweep: wavelength integral, angle from {} to {} step {} deg, z {}",
                angle.start, angle.stop, angle.step, z
            ),
        }
    }
}

/// Loads `config/default.toml` alone, without environment or command line
/// overrides.
pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let mut settings: Settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("error loading configuration")?
        .try_deserialize()
        .context("error deserializing configuration")?;

    settings.resolve_paths(&root);
    settings.validate()?;
    Ok(settings)
}

/// Loads the settings: `config/default.toml`, then `config/local.toml` if
/// present, then `MULTILAYER_*` environment variables, then `args`.
pub fn load_config_with(args: &CliArgs) -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    let mut builder = Config::builder().add_source(File::from(default_config_file).required(true));
    if local_config.exists() {
        info!("using local configuration: {:?}", local_config);
        builder = builder.add_source(File::from(local_config).required(true));
    }
    if let Some(path) = &args.config {
        info!("using configuration: {:?}", path);
        builder = builder.add_source(File::from(path.clone()).required(true));
    }

    let mut settings: Settings = builder
        .add_source(Environment::with_prefix(ENV_PREFIX))
        .build()
        .context("error loading configuration")?
        .try_deserialize()
        .context("error deserializing configuration")?;

    settings.apply_args(args);
    settings.resolve_paths(&root);
    settings.validate()?;

    debug!("settings:\n{}", settings);
    Ok(settings)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the MULTILAYER_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
pub fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("MULTILAYER_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("failed to get current executable path")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("could not find project root directory"))
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Field factors of dipoles emitting inside thin-film multilayers"
)]
pub struct CliArgs {
    /// Additional configuration file, applied after the default and local ones.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output file. Results go to standard output when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write JSON instead of tab-separated columns.
    #[arg(long)]
    pub json: bool,

    /// Fixed wavelength, for sweeps that do not vary it.
    #[arg(short, long)]
    pub wavelength: Option<f64>,

    /// Fixed emission angle in degrees, for sweeps that do not vary it.
    #[arg(short, long)]
    pub angle: Option<f64>,

    /// Fixed depth of the emitter, for sweeps that do not vary it.
    #[arg(short, long, allow_negative_numbers = true)]
    pub z: Option<f64>,

    /// Range of the swept quantity.
    /// Format: start stop step
    #[arg(long, num_args = 3, value_delimiter = ' ', allow_negative_numbers = true)]
    pub range: Option<Vec<f64>>,

    /// Log debug messages unless RUST_LOG says otherwise.
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not draw progress bars.
    #[arg(short, long)]
    pub quiet: bool,
}
