//! Builds the `txt/` directory of projection matrices read by PMVS.
//!
//! PMVS expects, for every image `visualize/NNNNNNNN.ppm`, a file
//! `txt/NNNNNNNN.txt` holding the 3x4 projection matrix of that camera:
//!
//! ```text
//! CONTOUR
//! p00 p01 p02 p03
//! p10 p11 p12 p13
//! p20 p21 p22 p23
//! ```
//!
//! The matrix combines the camera intrinsics with the *inverse* of the pose exported
//! by the calibration tool.

use crate::camera::{validation, CalibrationLoader, Extrinsics, Intrinsics};
use crate::error::PmvsError;
use log::{debug, info};
use nalgebra::{Matrix3x4, Vector3};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Header line PMVS requires at the top of each projection file.
pub const PROJECTION_HEADER: &str = "CONTOUR";

/// Name of the projection matrix directory inside a PMVS working directory.
pub const TXT_DIR: &str = "txt";

/// Computes the projection matrix PMVS expects for a camera.
///
/// The pose is first inverted (see [`Extrinsics::inverse`]) and the result is
/// `K · [R | t]` of the inverted pose.
///
/// # Arguments
///
/// * `intrinsics` - The camera matrix of the camera. Distortion is ignored.
/// * `extrinsics` - The pose as exported by the calibration tool.
///
/// # Return Value
///
/// The 3x4 projection matrix.
///
/// # Examples
///
/// ```rust
/// use nalgebra::{Matrix3, Vector3};
/// use pmvs_tools::camera::{Extrinsics, Intrinsics};
/// use pmvs_tools::projection::projection_matrix;
///
/// let intrinsics = Intrinsics {
///     camera_matrix: Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0),
///     distortions: [0.0; 5],
/// };
/// let extrinsics = Extrinsics {
///     rotation: Matrix3::identity(),
///     translation: Vector3::new(0.0, 0.0, -2.0),
/// };
/// let p = projection_matrix(&intrinsics, &extrinsics);
/// assert_eq!(p[(2, 3)], 2.0);
/// assert_eq!(p[(0, 3)], 640.0);
/// ```
pub fn projection_matrix(intrinsics: &Intrinsics, extrinsics: &Extrinsics) -> Matrix3x4<f64> {
    let pose = extrinsics.inverse();
    let mut rt = Matrix3x4::zeros();
    rt.fixed_view_mut::<3, 3>(0, 0).copy_from(&pose.rotation);
    rt.set_column(3, &pose.translation);
    intrinsics.camera_matrix * rt
}

/// Formats a projection matrix in the layout PMVS reads.
///
/// Values use six decimals (`%f`), separated by single spaces, one matrix row per
/// line after the [`PROJECTION_HEADER`] line.
pub fn format_projection(projection: &Matrix3x4<f64>) -> String {
    let mut out = String::with_capacity(128);
    out.push_str(PROJECTION_HEADER);
    out.push('\n');
    for row in projection.row_iter() {
        let values: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}", values.join(" "));
    }
    out
}

/// Name of the projection file of 0-based camera `camera`.
pub fn projection_file_name(camera: usize) -> String {
    format!("{camera:08}.txt")
}

/// Checks that a camera is undistorted.
///
/// # Errors
///
/// [`PmvsError::Distorted`] naming the first coefficient whose magnitude is not
/// below [`crate::camera::UNDISTORTED_TOLERANCE`].
pub fn ensure_undistorted(camera: usize, intrinsics: &Intrinsics) -> Result<(), PmvsError> {
    match validation::first_distortion(intrinsics) {
        Some((index, value)) => Err(PmvsError::Distorted {
            camera,
            index,
            value,
        }),
        None => Ok(()),
    }
}

/// Loads the calibration of `num_cameras` cameras and computes their projection
/// matrices.
///
/// Every camera is validated before returning, so callers can rely on the whole
/// rig being undistorted before anything is written to disk.
///
/// # Errors
///
/// * [`PmvsError::Camera`] if a calibration file is missing or malformed.
/// * [`PmvsError::Distorted`] if any camera still carries lens distortion.
pub fn load_projections(
    calibration_dir: &Path,
    num_cameras: usize,
    loader: &dyn CalibrationLoader,
) -> Result<Vec<Matrix3x4<f64>>, PmvsError> {
    let mut projections = Vec::with_capacity(num_cameras);
    for camera in 0..num_cameras {
        let (intrinsics, extrinsics) = loader.load_camera(calibration_dir, camera)?;
        ensure_undistorted(camera, &intrinsics)?;
        let projection = projection_matrix(&intrinsics, &extrinsics);
        debug!(
            "Camera {camera}: centre {:?}",
            camera_centre(&extrinsics).as_slice()
        );
        projections.push(projection);
    }
    Ok(projections)
}

/// Creates the `txt/` subdirectory of `work_dir` and writes one projection file
/// per camera.
///
/// The calibration files are read from `calibration_dir` through `loader`.
/// Nothing is written unless all cameras load and pass the undistortion check.
///
/// # Return Value
///
/// The paths of the written files, in camera order.
///
/// # Errors
///
/// See [`load_projections`]; IO failures while writing are reported as
/// [`PmvsError::Io`].
pub fn set_up_txt_directory(
    calibration_dir: &Path,
    work_dir: &Path,
    num_cameras: usize,
    loader: &dyn CalibrationLoader,
) -> Result<Vec<PathBuf>, PmvsError> {
    let projections = load_projections(calibration_dir, num_cameras, loader)?;

    let txt_dir = work_dir.join(TXT_DIR);
    fs::create_dir_all(&txt_dir)?;
    info!(
        "Writing {} projection matrices to {}",
        projections.len(),
        txt_dir.display()
    );

    projections
        .iter()
        .enumerate()
        .map(|(camera, projection)| {
            let path = txt_dir.join(projection_file_name(camera));
            fs::write(&path, format_projection(projection))?;
            Ok(path)
        })
        .collect()
}

/// Camera centre in world coordinates for a pose exported by the calibration tool.
pub fn camera_centre(extrinsics: &Extrinsics) -> Vector3<f64> {
    extrinsics.translation
}
