//! Validate and canonicalize signature files.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use classhound::signatures::{LoadReport, Signature, SignatureLoader};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sigcheck")]
#[command(about = "Validate signature files and print their canonical form")]
#[command(version)]
struct Args {
    /// Signature files or directories
    #[arg(required = true)]
    paths: Vec<String>,

    /// Serialization used by --emit
    #[arg(short, long, default_value = "json")]
    format: EmitFormat,

    /// Print the canonical serialization of every loaded signature
    #[arg(long)]
    emit: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitFormat {
    Json,
    Yaml,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if args.verbose {
        EnvFilter::new("classhound=debug,sigcheck=debug")
    } else {
        EnvFilter::new("classhound=warn,sigcheck=info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
    debug!("Logging initialized (verbose={})", args.verbose);

    let loader = SignatureLoader::new();
    let report = loader.load_paths(&args.paths);
    print_report(&report, &args)?;

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_report(report: &LoadReport, args: &Args) -> Result<()> {
    for signature in &report.signatures {
        let archetype = signature.archetype();
        println!(
            "OK {} {} {} variants",
            archetype.identifier,
            archetype.level,
            signature.variants().len()
        );
        if args.emit {
            println!("{}", emit(signature, args.format)?.trim_end());
        }
    }
    for failure in &report.failures {
        println!("ERROR {}: {}", failure.path.display(), failure.error);
    }
    Ok(())
}

fn emit(signature: &Signature, format: EmitFormat) -> Result<String> {
    Ok(match format {
        EmitFormat::Json => signature.to_json()?,
        EmitFormat::Yaml => signature.to_yaml()?,
    })
}
