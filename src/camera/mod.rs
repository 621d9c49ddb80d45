//! Calibrated camera data for a multi-camera rig.
//!
//! A rig camera is described by its [`Intrinsics`] (camera matrix and
//! radial-tangential distortion) and its [`Extrinsics`] (pose as exported by the
//! calibration tool). The [`loader`] submodule provides the [`CalibrationLoader`]
//! trait and the concrete file formats it can read.

use nalgebra::{Matrix3, Vector3};

pub mod loader;

pub use loader::{CalibrationLoader, TextCalibrationLoader, YamlCalibrationLoader};

/// Distortion coefficients are considered zero below this magnitude.
pub const UNDISTORTED_TOLERANCE: f64 = 1e-9;

/// Intrinsic calibration of a single camera.
///
/// The distortion coefficients follow the radial-tangential ordering
/// `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Intrinsics {
    /// The 3x3 camera matrix `K`.
    pub camera_matrix: Matrix3<f64>,
    /// The 5 distortion coefficients: `[k1, k2, p1, p2, k3]`.
    pub distortions: [f64; 5],
}

/// Camera pose as exported by the calibration tool.
///
/// The calibration tool and PMVS use opposite conventions for this transform, see
/// [`Extrinsics::inverse`].
#[derive(Debug, Clone, PartialEq)]
pub struct Extrinsics {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Extrinsics {
    /// Returns the inverse rigid transform `(Rᵀ, -Rᵀt)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use nalgebra::{Matrix3, Vector3};
    /// use pmvs_tools::camera::Extrinsics;
    ///
    /// let pose = Extrinsics {
    ///     rotation: Matrix3::identity(),
    ///     translation: Vector3::new(1.0, 2.0, 3.0),
    /// };
    /// let inverse = pose.inverse();
    /// assert_eq!(inverse.translation, Vector3::new(-1.0, -2.0, -3.0));
    /// ```
    pub fn inverse(&self) -> Extrinsics {
        let rotation = self.rotation.transpose();
        let translation = -(rotation * self.translation);
        Extrinsics {
            rotation,
            translation,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CameraError {
    #[error("Invalid calibration file {path}: {reason}")]
    InvalidCalibration { path: String, reason: String },
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for CameraError {
    fn from(err: yaml_rust::ScanError) -> Self {
        CameraError::YamlError(err.to_string())
    }
}

/// Checks on loaded calibration data
pub mod validation {
    use super::*;

    /// Returns the index and value of the first distortion coefficient whose
    /// magnitude is not below [`UNDISTORTED_TOLERANCE`], or `None` when the
    /// camera is already undistorted.
    pub fn first_distortion(intrinsics: &Intrinsics) -> Option<(usize, f64)> {
        intrinsics
            .distortions
            .iter()
            .copied()
            .enumerate()
            .find(|(_, d)| !(d.abs() < UNDISTORTED_TOLERANCE))
    }
}
