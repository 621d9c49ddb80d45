//! Loading per-camera calibration files.
//!
//! Camera `i` (0-based) of a rig is described by two files living next to the
//! images: `intrinsics_cameraXX.<ext>` and `extrinsics_cameraXX.<ext>`, where
//! `XX` is the 1-based, zero-padded camera number. The [`CalibrationLoader`]
//! trait owns the extension and the parsing, so other calibration exports can be
//! plugged in without touching the projection builder.
//!
//! Two formats are provided:
//! * [`TextCalibrationLoader`] (`.txt`): whitespace separated numbers, `#` comments.
//!   Intrinsics hold the row-major camera matrix followed by `k1 k2 p1 p2 k3`,
//!   extrinsics hold the row-major rotation followed by the translation.
//! * [`YamlCalibrationLoader`] (`.yaml`): `camera_matrix`/`distortion` and
//!   `rotation`/`translation` lists.

use crate::camera::{CameraError, Extrinsics, Intrinsics};
use nalgebra::{Matrix3, Vector3};
use std::fs;
use std::path::{Path, PathBuf};
use yaml_rust::{Yaml, YamlLoader};

/// Source of per-camera calibration.
pub trait CalibrationLoader {
    /// Extension of the calibration files, without the leading dot.
    fn extension(&self) -> &str;

    /// Load the camera matrix and distortion coefficients from `path`.
    fn load_intrinsics(&self, path: &Path) -> Result<Intrinsics, CameraError>;

    /// Load the rotation and translation from `path`.
    fn load_extrinsics(&self, path: &Path) -> Result<Extrinsics, CameraError>;

    /// Path of the intrinsics file of 0-based camera `camera` inside `dir`.
    fn intrinsics_path(&self, dir: &Path, camera: usize) -> PathBuf {
        dir.join(format!(
            "intrinsics_camera{:02}.{}",
            camera + 1,
            self.extension()
        ))
    }

    /// Path of the extrinsics file of 0-based camera `camera` inside `dir`.
    fn extrinsics_path(&self, dir: &Path, camera: usize) -> PathBuf {
        dir.join(format!(
            "extrinsics_camera{:02}.{}",
            camera + 1,
            self.extension()
        ))
    }

    /// Load both calibration files of one camera.
    fn load_camera(&self, dir: &Path, camera: usize) -> Result<(Intrinsics, Extrinsics), CameraError> {
        let intrinsics = self.load_intrinsics(&self.intrinsics_path(dir, camera))?;
        let extrinsics = self.load_extrinsics(&self.extrinsics_path(dir, camera))?;
        Ok((intrinsics, extrinsics))
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> CameraError {
    CameraError::InvalidCalibration {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Plain text calibration files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCalibrationLoader;

impl TextCalibrationLoader {
    /// Read every number of the file, skipping `#` comments.
    fn read_numbers(path: &Path) -> Result<Vec<f64>, CameraError> {
        let contents = fs::read_to_string(path)?;
        let mut numbers = Vec::new();
        for line in contents.lines() {
            let data = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            };
            for token in data.split_whitespace() {
                let value = token
                    .parse::<f64>()
                    .map_err(|_| invalid(path, format!("'{token}' is not a number")))?;
                numbers.push(value);
            }
        }
        Ok(numbers)
    }
}

impl CalibrationLoader for TextCalibrationLoader {
    fn extension(&self) -> &str {
        "txt"
    }

    fn load_intrinsics(&self, path: &Path) -> Result<Intrinsics, CameraError> {
        let numbers = Self::read_numbers(path)?;
        if numbers.len() != 14 {
            return Err(invalid(
                path,
                format!(
                    "expected 9 camera matrix entries and 5 distortion coefficients, found {} numbers",
                    numbers.len()
                ),
            ));
        }
        let mut distortions = [0.0; 5];
        distortions.copy_from_slice(&numbers[9..]);
        Ok(Intrinsics {
            camera_matrix: Matrix3::from_row_slice(&numbers[..9]),
            distortions,
        })
    }

    fn load_extrinsics(&self, path: &Path) -> Result<Extrinsics, CameraError> {
        let numbers = Self::read_numbers(path)?;
        if numbers.len() != 12 {
            return Err(invalid(
                path,
                format!(
                    "expected 9 rotation entries and 3 translation entries, found {} numbers",
                    numbers.len()
                ),
            ));
        }
        Ok(Extrinsics {
            rotation: Matrix3::from_row_slice(&numbers[..9]),
            translation: Vector3::from_column_slice(&numbers[9..]),
        })
    }
}

/// YAML calibration files.
///
/// ```yaml
/// camera_matrix: [800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0]
/// distortion: [0.0, 0.0, 0.0, 0.0, 0.0]
/// ```
///
/// ```yaml
/// rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
/// translation: [0.0, 0.0, 1.5]
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCalibrationLoader;

impl YamlCalibrationLoader {
    fn load_document(path: &Path) -> Result<Yaml, CameraError> {
        let contents = fs::read_to_string(path)?;
        let mut docs = YamlLoader::load_from_str(&contents)?;
        if docs.is_empty() {
            return Err(invalid(path, "empty YAML document"));
        }
        Ok(docs.swap_remove(0))
    }

    /// Read the list stored under `key`, which must hold exactly `len` numbers.
    fn read_list(doc: &Yaml, key: &str, len: usize, path: &Path) -> Result<Vec<f64>, CameraError> {
        let node = doc[key]
            .as_vec()
            .ok_or_else(|| invalid(path, format!("missing '{key}' list")))?;
        if node.len() != len {
            return Err(invalid(
                path,
                format!("expected {len} values in '{key}', found {}", node.len()),
            ));
        }
        node.iter()
            .enumerate()
            .map(|(i, value)| {
                // Integers are common in hand written files ("0" instead of "0.0").
                let number = match value {
                    Yaml::Integer(v) => Some(*v as f64),
                    other => other.as_f64(),
                };
                number.ok_or_else(|| invalid(path, format!("invalid value at index {i} of '{key}'")))
            })
            .collect()
    }
}

impl CalibrationLoader for YamlCalibrationLoader {
    fn extension(&self) -> &str {
        "yaml"
    }

    fn load_intrinsics(&self, path: &Path) -> Result<Intrinsics, CameraError> {
        let doc = Self::load_document(path)?;
        let camera_matrix = Self::read_list(&doc, "camera_matrix", 9, path)?;
        let distortion = Self::read_list(&doc, "distortion", 5, path)?;

        let mut distortions = [0.0; 5];
        distortions.copy_from_slice(&distortion);
        Ok(Intrinsics {
            camera_matrix: Matrix3::from_row_slice(&camera_matrix),
            distortions,
        })
    }

    fn load_extrinsics(&self, path: &Path) -> Result<Extrinsics, CameraError> {
        let doc = Self::load_document(path)?;
        let rotation = Self::read_list(&doc, "rotation", 9, path)?;
        let translation = Self::read_list(&doc, "translation", 3, path)?;
        Ok(Extrinsics {
            rotation: Matrix3::from_row_slice(&rotation),
            translation: Vector3::from_column_slice(&translation),
        })
    }
}
