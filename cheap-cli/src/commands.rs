use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use cheap_config::{ArenaConfig, BackingKind, CheapConfig, ConfigError};
use cheap_core::dax::{DeviceSizeProbe, SysfsProbe};
use cheap_core::{exercise, ArenaUsage, CursorArena};
use cheap_telemetry::{ArenaLogger, MetricsRecorder};

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "cheap", version, about)]
pub struct Cli {
    /// Configuration file; defaults to `config/cheap.yaml` when present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the size of a DAX device as reported by sysfs
    Probe(ProbeArgs),
    /// Build an arena and run the fill, verify and zero routines against it
    Exercise(ExerciseArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Device special file, e.g. /dev/dax0.0
    pub device: PathBuf,
    /// Alternate sysfs character-device root
    #[arg(long)]
    pub sysfs_root: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ExerciseArgs {
    /// Requested anonymous arena size in bytes
    #[arg(long)]
    pub size: Option<u64>,
    /// Default allocation alignment
    #[arg(long)]
    pub alignment: Option<usize>,
    /// Map this DAX device instead of anonymous memory
    #[arg(long)]
    pub device: Option<PathBuf>,
    /// Block size for the fill routine
    #[arg(long, default_value_t = 4096)]
    pub chunk: usize,
    /// Smallest random block size
    #[arg(long, default_value_t = 1)]
    pub min: usize,
    /// Largest random block size
    #[arg(long, default_value_t = 4096)]
    pub max: usize,
    /// Seed for the random block sizes
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Debug, Serialize)]
pub struct ExerciseReport {
    pub verified_blocks: usize,
    pub zero_rounds: usize,
    pub filled_blocks: usize,
    pub usage: ArenaUsage,
}

pub fn run_command(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => CheapConfig::load_from_path(path)?,
        None => CheapConfig::load()?,
    };
    ArenaLogger::init(&config.telemetry.log_level)?;

    match cli.command {
        Commands::Probe(args) => {
            let root = args.sysfs_root.unwrap_or(config.arena.sysfs_root);
            let size = SysfsProbe::with_root(root).device_size(&args.device)?;
            println!("{}: {} bytes", args.device.display(), size);
            Ok(())
        }
        Commands::Exercise(args) => {
            let arena_config = apply_overrides(config.arena, &args)?;
            let metrics = MetricsRecorder::new()?;
            let report = run_exercise(&arena_config, &args, &metrics)?;

            print!("{}", serde_yaml::to_string(&report)?);
            if args.metrics || config.telemetry.metrics {
                print!("{}", metrics.render()?);
            }
            Ok(())
        }
    }
}

fn apply_overrides(mut arena: ArenaConfig, args: &ExerciseArgs) -> Result<ArenaConfig, CliError> {
    if let Some(size) = args.size {
        arena.size = size;
    }
    if let Some(alignment) = args.alignment {
        arena.alignment = alignment;
    }
    if let Some(device) = &args.device {
        arena.backing = BackingKind::Device;
        arena.device_path = Some(device.clone());
    }
    arena.check().map_err(ConfigError::Invalid)?;
    Ok(arena)
}

/// Builds a fresh arena as described by `config`.
pub fn open_arena(config: &ArenaConfig) -> Result<CursorArena, CliError> {
    let arena = match (config.backing, &config.device_path) {
        (BackingKind::Device, Some(path)) => CursorArena::device_with_probe(
            path,
            config.alignment,
            &SysfsProbe::with_root(&config.sysfs_root),
        )?,
        (BackingKind::Device, None) => {
            return Err(ConfigError::Invalid("arena.device_path is not set".into()).into())
        }
        (BackingKind::Anonymous, _) => {
            let size =
                usize::try_from(config.size).map_err(|_| CliError::SizeOverflow(config.size))?;
            CursorArena::anonymous(config.alignment, size)?
        }
    };
    Ok(arena)
}

/// Runs `verify`, `zero` and `fill`, each on its own freshly opened arena.
pub fn run_exercise(
    config: &ArenaConfig,
    args: &ExerciseArgs,
    metrics: &MetricsRecorder,
) -> Result<ExerciseReport, CliError> {
    let mut arena = open_arena(config)?;
    let verified = exercise::verify(&mut arena, args.min, args.max, args.seed)?;
    metrics.record_outcome(&verified);
    arena.destroy();

    let mut arena = open_arena(config)?;
    let zeroed = exercise::zero(&mut arena, args.min, args.max, args.seed)?;
    metrics.record_outcome(&zeroed);
    arena.destroy();

    let mut arena = open_arena(config)?;
    let filled = exercise::fill(&mut arena, args.chunk)?;
    metrics.record_outcome(&filled);

    let usage = arena.usage();
    metrics.observe(&usage);
    ArenaLogger::log_usage("exercise", &usage);
    arena.destroy();

    let (verified_blocks, zero_rounds, filled_blocks) = (verified.count, zeroed.count, filled.count);
    info!(verified_blocks, zero_rounds, filled_blocks, "exercise complete");
    Ok(ExerciseReport {
        verified_blocks,
        zero_rounds,
        filled_blocks,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn exercise_args(argv: &[&str]) -> ExerciseArgs {
        let mut full = vec!["cheap", "exercise"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Exercise(args) => args,
            Commands::Probe(_) => panic!("expected exercise"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn probe_arguments_parse() {
        let cli = Cli::parse_from(["cheap", "probe", "/dev/dax0.0", "--sysfs-root", "/tmp/sys"]);
        match cli.command {
            Commands::Probe(args) => {
                assert_eq!(args.device, PathBuf::from("/dev/dax0.0"));
                assert_eq!(args.sysfs_root, Some(PathBuf::from("/tmp/sys")));
            }
            Commands::Exercise(_) => panic!("expected probe"),
        }
    }

    #[test]
    fn overrides_replace_config_values() {
        let args = exercise_args(&["--size", "4096", "--alignment", "16", "--device", "/dev/dax1.0"]);
        let arena = apply_overrides(ArenaConfig::default(), &args).unwrap();
        assert_eq!(arena.size, 4096);
        assert_eq!(arena.alignment, 16);
        assert_eq!(arena.backing, BackingKind::Device);
        assert_eq!(arena.device_path, Some(PathBuf::from("/dev/dax1.0")));
    }

    #[test]
    fn invalid_alignment_override_rejected() {
        let args = exercise_args(&["--alignment", "12"]);
        let err = apply_overrides(ArenaConfig::default(), &args).unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn exercise_anonymous_arena() {
        let args = exercise_args(&["--size", "1", "--chunk", "512", "--max", "1024", "--seed", "3"]);
        let config = apply_overrides(ArenaConfig::default(), &args).unwrap();
        let metrics = MetricsRecorder::new().unwrap();

        let report = run_exercise(&config, &args, &metrics).unwrap();
        assert_eq!(report.usage.capacity, 2 << 20);
        assert_eq!(report.filled_blocks, (2 << 20) / 512);
        assert_eq!(report.usage.available, 0);
        assert!(report.verified_blocks > 0);
        assert!(report.zero_rounds > 0);
        assert_eq!(metrics.allocation_failures.get(), 3);
        assert_eq!(metrics.rollbacks.get(), report.zero_rounds as u64);
        assert_eq!(
            metrics.allocations.get(),
            (report.verified_blocks + 2 * report.zero_rounds + report.filled_blocks) as u64
        );

        let yaml = serde_yaml::to_string(&report).unwrap();
        assert!(yaml.contains("filled_blocks: 4096"));
    }

    #[test]
    fn missing_device_surfaces_probe_error() {
        let sysfs = tempfile::tempdir().unwrap();
        let mut config = ArenaConfig::default();
        config.backing = BackingKind::Device;
        config.device_path = Some(PathBuf::from("/nonexistent/dax0.0"));
        config.sysfs_root = sysfs.path().to_path_buf();

        let err = open_arena(&config).unwrap_err();
        assert!(matches!(
            err,
            CliError::Arena(cheap_core::ArenaError::DeviceSizeUnavailable { .. })
        ));
    }
}
