use crate::camera::CameraError;
use std::path::PathBuf;

/// Errors raised while preparing or running a reconstruction.
///
/// None of them is recovered locally: every variant aborts the run.
#[derive(thiserror::Error, Debug)]
pub enum PmvsError {
    #[error("Camera {camera} is not undistorted: distortion coefficient {index} is {value:e}")]
    Distorted {
        camera: usize,
        index: usize,
        value: f64,
    },
    #[error("Failed to start `{program}`: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed with {status}: {stderr}")]
    ProcessFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("Reconstruction output {} was not generated (models dir: {})", .path.display(), .models_dir.display())]
    MissingOutput { path: PathBuf, models_dir: PathBuf },
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Unknown preset '{0}'")]
    UnknownPreset(String),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("Image conversion failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}
