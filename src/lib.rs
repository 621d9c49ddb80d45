//! PMVS Tools Library
//!
//! Glue between a calibrated camera ring and the PMVS2 multi-view stereo binary.
//! This library provides:
//! - Calibration loading (camera matrix, distortion, pose) from text or YAML files
//! - Projection matrix generation for PMVS's `txt/` directory
//! - Image conversion into PMVS's `visualize/` directory
//! - Ring-topology `vis.dat` generation
//! - Typed PMVS options with `option.txt` serialization and YAML presets
//!
//! The [`pipeline`] module ties these together and runs the external binary.

pub mod camera;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod presets;
pub mod projection;
pub mod visibility;
pub mod visualize;
pub mod workspace;

// Re-export commonly used types
pub use camera::{
    CalibrationLoader, CameraError, Extrinsics, Intrinsics, TextCalibrationLoader,
    YamlCalibrationLoader,
};
pub use error::PmvsError;
pub use options::{OptionValue, PmvsOptions, Scalar};
pub use pipeline::{run_pmvs, ReconstructionReport, RunSettings};
pub use presets::PresetTable;
pub use visualize::{ExternalConverter, ImageConverter, NativeConverter};
