//! End-to-end PMVS2 reconstruction of a calibrated camera ring.
//!
//! [`run_pmvs`] lays out a PMVS working directory:
//!
//! ```text
//! <work>/visualize/00000000.ppm ...   converted images
//! <work>/txt/00000000.txt ...         projection matrices
//! <work>/models/                      PMVS output
//! <work>/option.txt                   options
//! <work>/vis.dat                      ring visibility
//! ```
//!
//! It then runs `pmvs2 ./ option.txt` inside it, moves `models/option.txt.ply` to
//! the requested destination and records the wall-clock time of the PMVS call
//! next to it.
//!
//! The images must already be radially undistorted.

use crate::camera::{CalibrationLoader, TextCalibrationLoader};
use crate::error::PmvsError;
use crate::options::{PmvsOptions, OPTIONS_FILE};
use crate::presets::preset_destination;
use crate::projection::set_up_txt_directory;
use crate::visibility::{check_ring, write_vis_file_ring, VIS_FILE};
use crate::visualize::{count_cameras, run_command, set_up_visualize_directory, ExternalConverter, ImageConverter};
use crate::workspace::WorkDir;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Name of the PMVS output directory inside a working directory.
pub const MODELS_DIR: &str = "models";

/// Destination file name when neither a file name nor a preset is given.
pub const DEFAULT_DESTINATION: &str = "reconstruction.ply";

/// Everything a reconstruction run needs.
pub struct RunSettings {
    /// Directory holding `image_cameraXX.png` and the calibration files.
    pub images_dir: PathBuf,
    /// Directory receiving the point cloud. Defaults to the current directory.
    pub dest_dir: Option<PathBuf>,
    /// File name of the point cloud. Defaults to `<preset>.ply` or [`DEFAULT_DESTINATION`].
    pub dest_file: Option<String>,
    pub options: PmvsOptions,
    /// Name of the preset `options` came from, if any.
    pub preset: Option<String>,
    /// Existing directory to work in. A temporary directory is used otherwise.
    pub work_dir: Option<PathBuf>,
    /// Where to record the PMVS runtime. Defaults to `<dest stem>_runtime.txt`.
    pub runtime_file: Option<PathBuf>,
    /// Keep a temporary working directory when the run fails.
    pub keep_work_dir_on_failure: bool,
    pub pmvs_binary: PathBuf,
    pub converter: Box<dyn ImageConverter>,
    pub loader: Box<dyn CalibrationLoader>,
}

impl RunSettings {
    /// Settings with every optional field at its default: temporary working
    /// directory, `pmvs2` from `PATH`, ImageMagick conversion and text calibration.
    pub fn new(images_dir: impl Into<PathBuf>, options: PmvsOptions) -> Self {
        RunSettings {
            images_dir: images_dir.into(),
            dest_dir: None,
            dest_file: None,
            options,
            preset: None,
            work_dir: None,
            runtime_file: None,
            keep_work_dir_on_failure: false,
            pmvs_binary: PathBuf::from("pmvs2"),
            converter: Box::new(ExternalConverter::default()),
            loader: Box::new(TextCalibrationLoader),
        }
    }

    /// Final location of the point cloud.
    pub fn destination(&self) -> Result<PathBuf, PmvsError> {
        let dir = match &self.dest_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let file = match (&self.dest_file, &self.preset) {
            (Some(file), _) => file.clone(),
            (None, Some(preset)) => preset_destination(preset),
            (None, None) => DEFAULT_DESTINATION.to_string(),
        };
        Ok(dir.join(file))
    }

    /// Location of the runtime report for a point cloud written at `destination`.
    pub fn runtime_path(&self, destination: &Path) -> PathBuf {
        match &self.runtime_file {
            Some(path) => path.clone(),
            None => {
                let stem = destination
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                destination.with_file_name(format!("{stem}_runtime.txt"))
            }
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionReport {
    pub num_cameras: usize,
    pub destination: PathBuf,
    pub runtime_file: PathBuf,
    /// Wall-clock duration of the PMVS call.
    pub runtime_secs: f64,
    /// Set when the working directory outlives the run.
    pub work_dir: Option<PathBuf>,
}

/// Path PMVS writes its point cloud to for `options_file`.
pub fn pmvs_output_path(work_dir: &Path, options_file: &str) -> PathBuf {
    work_dir.join(MODELS_DIR).join(format!("{options_file}.ply"))
}

/// Moves `from` to `to`, copying when a rename is not possible (e.g. the
/// temporary directory lives on another filesystem).
fn move_file(from: &Path, to: &Path) -> Result<(), PmvsError> {
    if let Err(err) = fs::rename(from, to) {
        debug!(
            "Rename {} -> {} failed ({err}), copying instead",
            from.display(),
            to.display()
        );
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

/// Runs a PMVS2 reconstruction on a directory of undistorted images.
///
/// The working directory is exclusively owned by this call. A temporary working
/// directory is removed on every exit path, unless
/// [`RunSettings::keep_work_dir_on_failure`] is set and the run fails.
///
/// # Errors
///
/// * [`PmvsError::InvalidParams`] before the working directory is created if
///   there are no images or the neighbour count does not fit the ring.
/// * [`PmvsError::Distorted`] before any process is started if a camera is not
///   undistorted.
/// * [`PmvsError::ProcessFailed`] / [`PmvsError::ProcessSpawn`] if `convert` or
///   `pmvs2` fail.
/// * [`PmvsError::MissingOutput`] if `pmvs2` exits successfully without writing
///   its point cloud. No destination or runtime file is written in that case.
pub fn run_pmvs(settings: &RunSettings) -> Result<ReconstructionReport, PmvsError> {
    let images_dir = settings.images_dir.canonicalize()?;
    let num_cameras = count_cameras(&images_dir)?;
    if num_cameras == 0 {
        return Err(PmvsError::InvalidParams(format!(
            "no *.png images in {}",
            images_dir.display()
        )));
    }
    info!("Found {num_cameras} cameras in {}", images_dir.display());
    check_ring(num_cameras, settings.options.num_neighbors)?;

    let work = match &settings.work_dir {
        Some(path) => WorkDir::pinned(path)?,
        None => WorkDir::temporary()?,
    };

    match run_in(settings, &images_dir, num_cameras, work.path()) {
        Ok(mut report) => {
            if !work.is_temporary() {
                report.work_dir = Some(work.path().to_path_buf());
            }
            Ok(report)
        }
        Err(err) => {
            if settings.keep_work_dir_on_failure && work.is_temporary() {
                let kept = work.persist();
                error!("Run failed, working directory kept at {}", kept.display());
            }
            Err(err)
        }
    }
}

fn run_in(
    settings: &RunSettings,
    images_dir: &Path,
    num_cameras: usize,
    work_dir: &Path,
) -> Result<ReconstructionReport, PmvsError> {
    // Validate the calibration before spawning any converter.
    set_up_txt_directory(images_dir, work_dir, num_cameras, settings.loader.as_ref())?;
    set_up_visualize_directory(images_dir, work_dir, num_cameras, settings.converter.as_ref())?;

    let models_dir = work_dir.join(MODELS_DIR);
    fs::create_dir_all(&models_dir)?;

    settings
        .options
        .write_options_file(&work_dir.join(OPTIONS_FILE), num_cameras)?;
    write_vis_file_ring(
        &work_dir.join(VIS_FILE),
        num_cameras,
        settings.options.num_neighbors,
    )?;

    info!("Calling {}...", settings.pmvs_binary.display());
    let program = settings.pmvs_binary.display().to_string();
    let mut command = Command::new(&settings.pmvs_binary);
    command.arg("./").arg(OPTIONS_FILE).current_dir(work_dir);
    let start = Instant::now();
    let stdout = run_command(&mut command, &program)?;
    let runtime_secs = start.elapsed().as_secs_f64();
    debug!("{program} output:\n{}", String::from_utf8_lossy(&stdout));
    info!("{program} finished in {runtime_secs:.3} s");

    let output = pmvs_output_path(work_dir, OPTIONS_FILE);
    if !output.is_file() {
        warn!(".ply file wasn't generated in {}", models_dir.display());
        return Err(PmvsError::MissingOutput {
            path: output,
            models_dir,
        });
    }

    let destination = settings.destination()?;
    let runtime_file = settings.runtime_path(&destination);
    move_file(&output, &destination)?;
    fs::write(&runtime_file, runtime_secs.to_string())?;
    info!("Point cloud written to {}", destination.display());

    Ok(ReconstructionReport {
        num_cameras,
        destination,
        runtime_file,
        runtime_secs,
        work_dir: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualize::NativeConverter;
    use image::{Rgb, RgbImage};

    const INTRINSICS: &str = "800 0 4\n0 800 3\n0 0 1\n0 0 0 0 0\n";

    /// Writes a ring of `n` cameras with images and text calibration.
    fn write_rig(dir: &Path, n: usize, distortion: &str) {
        for camera in 0..n {
            let img = RgbImage::from_pixel(8, 6, Rgb([camera as u8 * 20, 100, 200]));
            img.save(dir.join(format!("image_camera{:02}.png", camera + 1)))
                .unwrap();
            let intrinsics = INTRINSICS.replace("0 0 0 0 0", distortion);
            fs::write(
                dir.join(format!("intrinsics_camera{:02}.txt", camera + 1)),
                intrinsics,
            )
            .unwrap();
            let angle = std::f64::consts::TAU * camera as f64 / n as f64;
            let (s, c) = angle.sin_cos();
            let extrinsics = format!(
                "{c} 0 {s}\n0 1 0\n{} 0 {c}\n{} 0 {}\n",
                -s,
                -2.0 * s,
                -2.0 * c
            );
            fs::write(
                dir.join(format!("extrinsics_camera{:02}.txt", camera + 1)),
                extrinsics,
            )
            .unwrap();
        }
    }

    fn settings(images: &Path, dest: &Path, pmvs: PathBuf) -> RunSettings {
        let mut settings = RunSettings::new(images, PmvsOptions::default());
        settings.dest_dir = Some(dest.to_path_buf());
        settings.pmvs_binary = pmvs;
        settings.converter = Box::new(NativeConverter);
        settings
    }

    #[cfg(unix)]
    fn fake_pmvs(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-pmvs2");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_destination_defaults() {
        let mut settings = RunSettings::new("/data/rig", PmvsOptions::default());
        settings.dest_dir = Some(PathBuf::from("/out"));
        assert_eq!(
            settings.destination().unwrap(),
            PathBuf::from("/out/reconstruction.ply")
        );

        settings.preset = Some("pmvs_2_4_1".to_string());
        let destination = settings.destination().unwrap();
        assert_eq!(destination, PathBuf::from("/out/pmvs_2_4_1.ply"));
        assert_eq!(
            settings.runtime_path(&destination),
            PathBuf::from("/out/pmvs_2_4_1_runtime.txt")
        );

        settings.dest_file = Some("scan.ply".to_string());
        settings.runtime_file = Some(PathBuf::from("/logs/t.txt"));
        let destination = settings.destination().unwrap();
        assert_eq!(destination, PathBuf::from("/out/scan.ply"));
        assert_eq!(
            settings.runtime_path(&destination),
            PathBuf::from("/logs/t.txt")
        );
    }

    #[test]
    fn test_pmvs_output_path() {
        assert_eq!(
            pmvs_output_path(Path::new("/work"), "option.txt"),
            PathBuf::from("/work/models/option.txt.ply")
        );
    }

    #[test]
    fn test_empty_image_directory() {
        let images = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let settings = settings(images.path(), dest.path(), PathBuf::from("pmvs2"));
        assert!(matches!(
            run_pmvs(&settings),
            Err(PmvsError::InvalidParams(_))
        ));
    }

    /// A successful run lays out the working directory and moves the output.
    #[cfg(unix)]
    #[test]
    fn test_run_pmvs_success() {
        let images = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        write_rig(images.path(), 4, "0 0 0 0 0");

        // Checks its arguments and the working directory layout, then writes a point cloud.
        let pmvs = fake_pmvs(
            bin.path(),
            r#"[ "$1" = "./" ] && [ "$2" = "option.txt" ] || exit 3
[ -f txt/00000003.txt ] && [ -f visualize/00000003.ppm ] && [ -f vis.dat ] || exit 4
grep -q "^timages -1 0 4$" option.txt || exit 5
echo "ply" > models/option.txt.ply"#,
        );

        let mut settings = settings(images.path(), dest.path(), pmvs);
        settings.work_dir = Some(work.path().join("pmvs"));
        settings.preset = Some("pmvs_1_2_2".to_string());

        let report = run_pmvs(&settings).unwrap();

        assert_eq!(report.num_cameras, 4);
        assert_eq!(report.destination, dest.path().join("pmvs_1_2_2.ply"));
        assert_eq!(fs::read_to_string(&report.destination).unwrap(), "ply\n");
        assert_eq!(
            report.runtime_file,
            dest.path().join("pmvs_1_2_2_runtime.txt")
        );
        let recorded: f64 = fs::read_to_string(&report.runtime_file)
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(recorded, report.runtime_secs);

        // The pinned working directory is left in place, minus the moved output.
        let work_dir = report.work_dir.unwrap();
        assert_eq!(work_dir, work.path().join("pmvs"));
        assert_eq!(
            fs::read_to_string(work_dir.join("vis.dat")).unwrap(),
            "VISDATA\n4\n0 2 1 3 \n1 2 2 0 \n2 2 3 1 \n3 2 0 2 \n"
        );
        assert!(!work_dir.join("models").join("option.txt.ply").exists());
    }

    /// PMVS exiting cleanly without output is a hard failure with no destination file.
    #[cfg(unix)]
    #[test]
    fn test_run_pmvs_missing_output() {
        let images = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        write_rig(images.path(), 3, "0 0 0 0 0");
        let pmvs = fake_pmvs(bin.path(), "exit 0");

        let settings = settings(images.path(), dest.path(), pmvs);
        let err = run_pmvs(&settings).unwrap_err();

        assert!(matches!(err, PmvsError::MissingOutput { .. }));
        assert!(!dest.path().join(DEFAULT_DESTINATION).exists());
        assert!(!dest.path().join("reconstruction_runtime.txt").exists());
    }

    /// The failed run's temporary directory is kept on request.
    #[cfg(unix)]
    #[test]
    fn test_run_pmvs_keeps_work_dir_on_failure() {
        let images = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        write_rig(images.path(), 3, "0 0 0 0 0");
        // Records where it ran so the test can find the kept directory.
        let marker = bin.path().join("cwd");
        let pmvs = fake_pmvs(bin.path(), &format!("pwd > '{}'", marker.display()));

        let mut settings = settings(images.path(), dest.path(), pmvs);
        settings.keep_work_dir_on_failure = true;
        let err = run_pmvs(&settings).unwrap_err();
        assert!(matches!(err, PmvsError::MissingOutput { .. }));

        let kept = PathBuf::from(fs::read_to_string(&marker).unwrap().trim());
        assert!(kept.join("option.txt").is_file());
        assert!(kept.join("txt").join("00000002.txt").is_file());
        fs::remove_dir_all(&kept).unwrap();
    }

    /// Without the flag, the temporary directory is gone after a failure.
    #[cfg(unix)]
    #[test]
    fn test_run_pmvs_removes_temporary_on_failure() {
        let images = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        write_rig(images.path(), 3, "0 0 0 0 0");
        let marker = bin.path().join("cwd");
        let pmvs = fake_pmvs(bin.path(), &format!("pwd > '{}'\nexit 1", marker.display()));

        let settings = settings(images.path(), dest.path(), pmvs);
        let err = run_pmvs(&settings).unwrap_err();
        assert!(matches!(err, PmvsError::ProcessFailed { .. }));

        let used = PathBuf::from(fs::read_to_string(&marker).unwrap().trim());
        assert!(!used.exists());
    }

    /// A neighbour count that does not fit the ring fails before any work is done.
    #[test]
    fn test_run_pmvs_rejects_neighbors_before_work_dir() {
        let images = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        write_rig(images.path(), 2, "0 0 0 0 0");

        let mut settings = settings(
            images.path(),
            dest.path(),
            PathBuf::from("pmvs-tools-no-such-binary"),
        );
        settings.converter = Box::new(ExternalConverter {
            program: "pmvs-tools-no-such-converter".to_string(),
        });
        let work_dir = work.path().join("pmvs");
        settings.work_dir = Some(work_dir.clone());
        assert_eq!(settings.options.num_neighbors, 2);

        let err = run_pmvs(&settings).unwrap_err();
        assert!(matches!(err, PmvsError::InvalidParams(_)));
        assert!(!work_dir.exists());
    }

    /// Distortion is caught before PMVS or the converter run.
    #[test]
    fn test_run_pmvs_rejects_distorted_rig() {
        let images = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        write_rig(images.path(), 3, "0.1 0 0 0 0");

        let mut settings = settings(
            images.path(),
            dest.path(),
            PathBuf::from("pmvs-tools-no-such-binary"),
        );
        settings.work_dir = Some(work.path().to_path_buf());
        let err = run_pmvs(&settings).unwrap_err();

        assert!(matches!(err, PmvsError::Distorted { camera: 0, index: 0, .. }));
        assert!(!work.path().join("visualize").exists());
        assert!(!work.path().join("option.txt").exists());
    }
}
