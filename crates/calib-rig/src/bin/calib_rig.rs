//! calib-rig CLI: settings checks and flag-mask inspection.

use calib_rig::flags::{build_flag_mask, parse_fix_digits};
use calib_rig::pattern::PatternConfig;
use calib_rig::settings::{load_settings, validate, Settings};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "calib-rig")]
#[command(about = "Camera calibration settings tooling")]
#[command(version)]
struct Cli {
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit tracing spans as JSON (requires the `tracing` feature).
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, resolve and validate a settings file.
    Check {
        /// Path to the JSON settings file.
        settings: PathBuf,
    },

    /// Print the solver flag mask for a fix-distortion string.
    Flags {
        /// Five 0/1 digits, one per distortion coefficient k1..k5.
        digits: String,

        #[arg(long)]
        fix_principal_point: bool,

        #[arg(long)]
        zero_tangent: bool,

        #[arg(long)]
        fix_aspect: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    if cli.json_log {
        calib_rig::core::init_tracing(true);
    } else {
        init_stderr(cli.verbose);
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    init_stderr(cli.verbose);
}

fn init_stderr(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = calib_rig::core::init_with_level(level);
}

fn run(command: Commands) -> CliResult<()> {
    match command {
        Commands::Check { settings } => check(&settings),
        Commands::Flags {
            digits,
            fix_principal_point,
            zero_tangent,
            fix_aspect,
        } => {
            let parsed = parse_fix_digits(&digits)
                .ok_or_else(|| format!("{digits:?} is not five 0/1 digits"))?;
            let flags = build_flag_mask(parsed, fix_principal_point, zero_tangent, fix_aspect);
            println!("flag_value: {}", flags.bits());
            println!("calibration_flags: {}", flags.describe());
            Ok(())
        }
    }
}

fn check(path: &Path) -> CliResult<()> {
    let raw = load_settings(path)?;
    let settings = match validate(raw) {
        Ok(settings) => settings,
        Err(err) => {
            for issue in &err.issues {
                eprintln!("invalid: {issue}");
            }
            return Err(format!("{} problem(s) in {}", err.issues.len(), path.display()).into());
        }
    };
    print_summary(&settings);
    Ok(())
}

fn print_summary(settings: &Settings) {
    println!("mode: {}", settings.mode);
    println!("pattern: {}", settings.pattern.kind());
    match &settings.pattern {
        PatternConfig::Chessboard { board, square_size } => {
            println!("board: {}x{} inner corners, square {square_size}", board.width, board.height);
        }
        PatternConfig::ArucoSingle(map) => {
            println!("marker map: {} markers ({})", map.len(), map.dictionary());
        }
        PatternConfig::ArucoBox { faces, lattice } => {
            for face in faces {
                println!(
                    "face {}: {} markers ({})",
                    face.plane,
                    face.map.len(),
                    face.map.dictionary()
                );
            }
            println!("lattice: offset {}, step {}", lattice.offset, lattice.step);
        }
    }
    println!("images: {}", settings.images.len());
    if let Some(id) = settings.camera_id {
        println!("camera: {id}");
    }
    println!(
        "intrinsic input: {}",
        if settings.intrinsic_guess.is_some() { "yes" } else { "no" }
    );
    println!(
        "flags: {} {}",
        settings.flags.bits(),
        settings.flags.describe()
    );
}
