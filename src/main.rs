//! Command line front end for PMVS2 reconstructions.
//!
//! Usage:
//! ```bash
//! pmvs-tools run --images rig/ --presets samples/pmvs_presets.yaml --preset pmvs_2_4_2
//! pmvs-tools presets --presets samples/pmvs_presets.yaml
//! pmvs-tools vis --cameras 12 --neighbors 2
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use pmvs_tools::visibility::write_vis_ring;
use pmvs_tools::{
    run_pmvs, CalibrationLoader, ExternalConverter, ImageConverter, NativeConverter, PmvsError,
    PmvsOptions, PresetTable, RunSettings, TextCalibrationLoader, YamlCalibrationLoader,
};
use std::path::PathBuf;

/// Prepare a calibrated camera ring for PMVS2 and run the reconstruction
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a reconstruction on a directory of undistorted images
    Run(RunArgs),
    /// List the presets of a preset file
    Presets {
        /// Path to the preset YAML file
        #[arg(short = 'p', long)]
        presets: PathBuf,
        /// Print the presets as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a ring visibility file to stdout
    Vis {
        /// Number of cameras in the ring
        #[arg(short = 'c', long)]
        cameras: usize,
        /// Neighbours per camera
        #[arg(short = 'k', long, default_value = "2")]
        neighbors: usize,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Directory with image_cameraXX.png and the calibration files
    #[arg(short = 'i', long)]
    images: PathBuf,

    /// Directory receiving the point cloud (default: current directory)
    #[arg(long)]
    dest_dir: Option<PathBuf>,

    /// File name of the point cloud (default: <preset>.ply or reconstruction.ply)
    #[arg(long)]
    dest_file: Option<String>,

    /// Path to a preset YAML file
    #[arg(short = 'p', long, requires = "preset")]
    presets: Option<PathBuf>,

    /// Name of the preset to use
    #[arg(long, requires = "presets", conflicts_with = "options")]
    preset: Option<String>,

    /// Path to a YAML file with PMVS options
    #[arg(short = 'o', long)]
    options: Option<PathBuf>,

    /// Override the number of neighbours in vis.dat
    #[arg(short = 'k', long)]
    neighbors: Option<usize>,

    /// Work in this directory instead of a temporary one; it is kept afterwards
    #[arg(short = 'w', long)]
    work_dir: Option<PathBuf>,

    /// Where to record the PMVS runtime (default: <dest stem>_runtime.txt)
    #[arg(long)]
    runtime_file: Option<PathBuf>,

    /// Keep the temporary working directory if the run fails
    #[arg(long)]
    keep_work_dir: bool,

    /// PMVS2 executable
    #[arg(long, default_value = "pmvs2")]
    pmvs_bin: PathBuf,

    /// How to convert images to PPM
    #[arg(long, value_enum, default_value_t = Converter::External)]
    converter: Converter,

    /// Conversion program used by the external converter
    #[arg(long, default_value = "convert")]
    convert_bin: String,

    /// Format of the calibration files
    #[arg(long, value_enum, default_value_t = CalibrationFormat::Txt)]
    calibration: CalibrationFormat,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Converter {
    /// ImageMagick style `convert <src> <dst>`
    External,
    /// In-process conversion
    Native,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CalibrationFormat {
    Txt,
    Yaml,
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = match (&args.preset, &args.presets, &args.options) {
        (Some(name), Some(path), _) => {
            info!("Using preset {name} from {}", path.display());
            PresetTable::load_from_yaml(path)?.resolve(name)?
        }
        (_, _, Some(path)) => {
            info!("Loading options from {}", path.display());
            PmvsOptions::load_from_yaml(path)?
        }
        _ => PmvsOptions::default(),
    };
    if let Some(neighbors) = args.neighbors {
        options.num_neighbors = neighbors;
    }

    let converter: Box<dyn ImageConverter> = match args.converter {
        Converter::External => Box::new(ExternalConverter {
            program: args.convert_bin,
        }),
        Converter::Native => Box::new(NativeConverter),
    };
    let loader: Box<dyn CalibrationLoader> = match args.calibration {
        CalibrationFormat::Txt => Box::new(TextCalibrationLoader),
        CalibrationFormat::Yaml => Box::new(YamlCalibrationLoader),
    };

    let mut settings = RunSettings::new(args.images, options);
    settings.dest_dir = args.dest_dir;
    settings.dest_file = args.dest_file;
    settings.preset = args.preset;
    settings.work_dir = args.work_dir;
    settings.runtime_file = args.runtime_file;
    settings.keep_work_dir_on_failure = args.keep_work_dir;
    settings.pmvs_binary = args.pmvs_bin;
    settings.converter = converter;
    settings.loader = loader;

    let report = run_pmvs(&settings)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} cameras reconstructed in {:.2} s -> {}",
            report.num_cameras,
            report.runtime_secs,
            report.destination.display()
        );
    }
    Ok(())
}

fn list_presets(path: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let table = PresetTable::load_from_yaml(&path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }
    for (name, options) in table.iter() {
        println!(
            "{name}: level {} csize {} threshold {} neighbours {}",
            options.level, options.csize, options.threshold, options.num_neighbors
        );
    }
    Ok(())
}

fn print_vis(cameras: usize, neighbors: usize) -> Result<(), PmvsError> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    write_vis_ring(&mut lock, cameras, neighbors)
}

fn try_main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Presets { presets, json } => list_presets(presets, json),
        Commands::Vis { cameras, neighbors } => Ok(print_vis(cameras, neighbors)?),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = try_main() {
        error!("{err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_preset() {
        let cli = Cli::try_parse_from([
            "pmvs-tools",
            "run",
            "--images",
            "rig",
            "--presets",
            "samples/pmvs_presets.yaml",
            "--preset",
            "pmvs_2_4_2",
            "--converter",
            "native",
            "--calibration",
            "yaml",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.images, PathBuf::from("rig"));
                assert_eq!(args.preset.as_deref(), Some("pmvs_2_4_2"));
                assert!(matches!(args.converter, Converter::Native));
                assert!(matches!(args.calibration, CalibrationFormat::Yaml));
                assert_eq!(args.pmvs_bin, PathBuf::from("pmvs2"));
                assert!(!args.keep_work_dir);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_preset_requires_preset_file() {
        let result = Cli::try_parse_from(["pmvs-tools", "run", "--images", "rig", "--preset", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_preset_conflicts_with_options() {
        let result = Cli::try_parse_from([
            "pmvs-tools",
            "run",
            "--images",
            "rig",
            "--presets",
            "p.yaml",
            "--preset",
            "x",
            "--options",
            "o.yaml",
        ]);
        assert!(result.is_err());
    }
}
