//! PMVS option set and its `option.txt` serialization.
//!
//! See <https://www.di.ens.fr/pmvs/documentation.html> for the meaning of each
//! option. Field order matters: the options file lists the fields in declaration
//! order.

use crate::error::PmvsError;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Default file name of the options file inside a working directory.
pub const OPTIONS_FILE: &str = "option.txt";

/// A single option value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            // `{:?}` keeps the decimal point on whole numbers ("1.0").
            Scalar::Float(v) => write!(f, "{v:?}"),
        }
    }
}

/// An entry of the options file: either one value or a list of values.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Scalar(Scalar),
    Sequence(Vec<Scalar>),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Scalar(v) => write!(f, "{v}"),
            OptionValue::Sequence(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Scalar(Scalar::Int(v))
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Scalar(Scalar::Float(v))
    }
}

impl From<&[i64]> for OptionValue {
    fn from(values: &[i64]) -> Self {
        OptionValue::Sequence(values.iter().copied().map(Scalar::Int).collect())
    }
}

/// User supplied PMVS options.
///
/// Every field has a default, so a YAML mapping only needs to name the options it
/// overrides. Keys use the PMVS spellings (`minImageNum`, `CPU`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PmvsOptions {
    /// Pyramid level of the images used for reconstruction; 0 is full resolution.
    pub level: i64,
    /// Cell size controlling the density of the reconstruction.
    pub csize: i64,
    /// Photometric consistency threshold.
    pub threshold: f64,
    /// Side of the sampling window, in pixels.
    pub wsize: i64,
    /// Minimum number of images a point must be visible in.
    #[serde(rename = "minImageNum")]
    pub min_image_num: i64,
    /// Number of worker threads PMVS spawns.
    #[serde(rename = "CPU")]
    pub cpu: i64,
    #[serde(rename = "useVisData")]
    pub use_vis_data: i64,
    pub sequence: i64,
    /// Neighbours per camera in the generated `vis.dat`. Not a PMVS option.
    #[serde(rename = "numNeighbors")]
    pub num_neighbors: usize,
    /// Target images. `None` means every camera: `[-1, 0, num_cameras]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timages: Option<Vec<i64>>,
    pub oimages: i64,
}

impl Default for PmvsOptions {
    fn default() -> Self {
        PmvsOptions {
            level: 1,
            csize: 2,
            threshold: 0.6,
            wsize: 7,
            min_image_num: 2,
            cpu: 8,
            use_vis_data: 1,
            sequence: -1,
            num_neighbors: 2,
            timages: None,
            oimages: 0,
        }
    }
}

impl PmvsOptions {
    /// Target images for a rig of `num_cameras` cameras.
    pub fn target_images(&self, num_cameras: usize) -> Vec<i64> {
        match &self.timages {
            Some(timages) => timages.clone(),
            None => vec![-1, 0, num_cameras as i64],
        }
    }

    /// The entries of the options file, in order.
    ///
    /// `numNeighbors` only drives the visibility file and is left out.
    pub fn entries(&self, num_cameras: usize) -> Vec<(&'static str, OptionValue)> {
        vec![
            ("level", self.level.into()),
            ("csize", self.csize.into()),
            ("threshold", self.threshold.into()),
            ("wsize", self.wsize.into()),
            ("minImageNum", self.min_image_num.into()),
            ("CPU", self.cpu.into()),
            ("useVisData", self.use_vis_data.into()),
            ("sequence", self.sequence.into()),
            ("timages", self.target_images(num_cameras).as_slice().into()),
            ("oimages", self.oimages.into()),
        ]
    }

    /// Writes the options file content to `writer`, one `key value...` line per entry.
    pub fn write_options<W: Write>(&self, writer: &mut W, num_cameras: usize) -> Result<(), PmvsError> {
        for (key, value) in self.entries(num_cameras) {
            writeln!(writer, "{key} {value}")?;
        }
        Ok(())
    }

    /// The options file content as a string.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pmvs_tools::options::PmvsOptions;
    ///
    /// let text = PmvsOptions::default().to_options_string(12);
    /// assert!(text.starts_with("level 1\ncsize 2\nthreshold 0.6\n"));
    /// assert!(!text.contains("numNeighbors"));
    /// ```
    pub fn to_options_string(&self, num_cameras: usize) -> String {
        self.entries(num_cameras)
            .into_iter()
            .map(|(key, value)| format!("{key} {value}\n"))
            .collect()
    }

    /// Writes the options file at `path`.
    pub fn write_options_file(&self, path: &Path, num_cameras: usize) -> Result<(), PmvsError> {
        info!("Writing PMVS options to {}", path.display());
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_options(&mut writer, num_cameras)?;
        writer.flush()?;
        Ok(())
    }

    /// Loads an option set from a YAML mapping; missing keys keep their defaults.
    pub fn load_from_yaml(path: &Path) -> Result<Self, PmvsError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}
