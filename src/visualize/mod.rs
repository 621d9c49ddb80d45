//! Builds the `visualize/` image sequence PMVS reads.
//!
//! Source images are named `image_cameraXX.png` (1-based, two digits) and become
//! `visualize/NNNNNNNN.ppm` (0-based, eight digits). The conversion itself goes
//! through an [`ImageConverter`]: either ImageMagick's `convert` binary, or an
//! in-process conversion with the `image` crate.

use crate::error::PmvsError;
use glob::{glob, Pattern};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Name of the image directory inside a PMVS working directory.
pub const VISUALIZE_DIR: &str = "visualize";

/// Converts one image file into another format.
pub trait ImageConverter {
    fn convert(&self, source: &Path, destination: &Path) -> Result<(), PmvsError>;
}

/// Runs an external conversion utility as `<program> <source> <destination>`.
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    pub program: String,
}

impl Default for ExternalConverter {
    fn default() -> Self {
        ExternalConverter {
            program: "convert".to_string(),
        }
    }
}

impl ImageConverter for ExternalConverter {
    fn convert(&self, source: &Path, destination: &Path) -> Result<(), PmvsError> {
        let mut command = Command::new(&self.program);
        command.arg(source).arg(destination);
        run_command(&mut command, &self.program)?;
        Ok(())
    }
}

/// Decodes and re-encodes images with the `image` crate; the output format is
/// deduced from the destination extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConverter;

impl ImageConverter for NativeConverter {
    fn convert(&self, source: &Path, destination: &Path) -> Result<(), PmvsError> {
        let img = image::open(source)?;
        // PPM carries no alpha channel.
        img.into_rgb8().save(destination)?;
        Ok(())
    }
}

/// Runs `command` to completion and returns its stdout.
///
/// # Errors
///
/// * [`PmvsError::ProcessSpawn`] if the program cannot be started.
/// * [`PmvsError::ProcessFailed`] on a non-zero exit status, with the captured stderr.
pub(crate) fn run_command(command: &mut Command, program: &str) -> Result<Vec<u8>, PmvsError> {
    let rendered = format!("{command:?}");
    info!("Running command: {rendered}");
    let output = command.output().map_err(|source| PmvsError::ProcessSpawn {
        program: program.to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(PmvsError::ProcessFailed {
            command: rendered,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Counts the cameras of a rig: the number of `*.png` files in `images_dir`.
pub fn count_cameras(images_dir: &Path) -> Result<usize, PmvsError> {
    let pattern = format!(
        "{}/*.png",
        Pattern::escape(&images_dir.to_string_lossy())
    );
    debug!("Counting images matching {pattern}");
    Ok(glob(&pattern)?.filter_map(Result::ok).count())
}

/// Name of the source image of 0-based camera `camera`.
pub fn source_image_name(camera: usize) -> String {
    format!("image_camera{:02}.png", camera + 1)
}

/// Name of the PMVS image of 0-based camera `camera`.
pub fn visualize_image_name(camera: usize) -> String {
    format!("{camera:08}.ppm")
}

/// Creates the `visualize/` subdirectory of `work_dir` and converts the
/// `num_cameras` source images into it, one conversion at a time.
///
/// # Errors
///
/// The first failing conversion aborts the whole step.
pub fn set_up_visualize_directory(
    images_dir: &Path,
    work_dir: &Path,
    num_cameras: usize,
    converter: &dyn ImageConverter,
) -> Result<Vec<PathBuf>, PmvsError> {
    let visualize_dir = work_dir.join(VISUALIZE_DIR);
    fs::create_dir_all(&visualize_dir)?;
    info!(
        "Setting up visualize subdirectory in {}...",
        visualize_dir.display()
    );

    let mut written = Vec::with_capacity(num_cameras);
    for camera in 0..num_cameras {
        let source = images_dir.join(source_image_name(camera));
        let destination = visualize_dir.join(visualize_image_name(camera));
        converter.convert(&source, &destination)?;
        written.push(destination);
    }
    Ok(written)
}
