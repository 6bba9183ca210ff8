//! Combine per-rank tile files into one global output container.
//!
//! # Usage
//!
//! ```bash
//! combine3d ./fields ./out
//! combine3d --format netcdf --fields T,u ./fields ./out
//! ```
//!
//! Exits with status 1 if the run fails or any field could not be combined.

use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use log::{error, info};

use tile_combine::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Netcdf,
}

/// Reassemble ghost-padded per-rank tiles into global 3-D fields
#[derive(Parser, Debug)]
#[command(name = "combine3d")]
#[command(about = "Reassemble ghost-padded per-rank tiles into global 3-D fields")]
struct Args {
    /// Directory holding one file per rank
    fields_dir: PathBuf,

    /// Directory receiving the combined container
    out_dir: PathBuf,

    /// Container format of rank files and output
    #[arg(long, value_enum, default_value = "json")]
    format: Format,

    /// Fields to combine (comma-separated, default all)
    #[arg(short, long, value_delimiter = ',')]
    fields: Vec<String>,

    /// JSON run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable all parallelism
    #[arg(long)]
    serial: bool,
}

fn load_config(args: &Args) -> Result<CombineConfig, CombineError> {
    let base = match args.format {
        Format::Json => CombineConfig::default(),
        Format::Netcdf => CombineConfig::netcdf(),
    };
    let mut config = match &args.config {
        Some(path) => CombineConfig::overlay_json_file(base, path)?,
        None => base,
    };
    if args.serial {
        config.parallel_fields = false;
        config.parallel_reads = false;
        config.parallel_copy = false;
    }
    if !args.fields.is_empty() {
        config.fields = Some(args.fields.clone());
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<CombineReport, CombineError> {
    let config = load_config(args)?;
    match args.format {
        Format::Json => {
            let source =
                JsonRankSource::new(&args.fields_dir).with_extension(config.rank_extension.clone());
            FieldCombiner::new(source, JsonSink::new(), config).combine(&args.out_dir)
        }
        #[cfg(feature = "netcdf")]
        Format::Netcdf => {
            let source = NetcdfRankSource::new(&args.fields_dir)
                .with_extension(config.rank_extension.clone());
            FieldCombiner::new(source, NetcdfSink::new(), config).combine(&args.out_dir)
        }
        #[cfg(not(feature = "netcdf"))]
        Format::Netcdf => Err(CombineError::Config(
            "netCDF support requires the `netcdf` feature".to_string(),
        )),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!(
        "combining {} into {}",
        args.fields_dir.display(),
        args.out_dir.display()
    );

    match run(&args).and_then(CombineReport::into_result) {
        Ok(report) => {
            info!(
                "combined {} field(s) from {} rank(s) into {}",
                report.written.len(),
                report.ranks,
                report.target.display()
            );
        }
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(argv: &[&str]) -> CombineConfig {
        load_config(&Args::parse_from(argv)).unwrap()
    }

    #[test]
    fn netcdf_format_keeps_its_defaults_under_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "fields": ["T"] }"#).unwrap();
        let path = path.to_str().unwrap();
        let cfg = config_for(&["combine3d", "--format", "netcdf", "--config", path, "in", "out"]);
        assert_eq!(cfg.rank_extension, "nc");
        assert_eq!(cfg.output_name, "combined.nc");
        assert_eq!(cfg.fields, Some(vec!["T".to_string()]));
    }

    #[test]
    fn config_file_still_overrides_format_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "output_name": "all.nc" }"#).unwrap();
        let path = path.to_str().unwrap();
        let cfg = config_for(&["combine3d", "--format", "netcdf", "-c", path, "in", "out"]);
        assert_eq!(cfg.output_name, "all.nc");
        assert_eq!(cfg.rank_extension, "nc");
    }

    #[test]
    fn serial_flag_and_field_list_apply_last() {
        let cfg = config_for(&["combine3d", "--serial", "--fields", "u,v", "in", "out"]);
        let expected = CombineConfig {
            fields: Some(vec!["u".into(), "v".into()]),
            ..CombineConfig::serial()
        };
        assert_eq!(cfg, expected);
    }
}
