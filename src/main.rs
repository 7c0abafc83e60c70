//! ocikit CLI - container image copy/inspect/delete front end

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use ocikit::ops::{
    copy, delete, inspect, raw_config, raw_manifest, CopyOptions, InspectOptions,
};
use ocikit::{parse_selector, Config, ImageReference, PlatformOverrides};

#[derive(Parser)]
#[command(name = "ocikit")]
#[command(about = "copy, inspect and delete container images across storage transports")]
#[command(version)]
struct Cli {
    /// enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// config file with default platform overrides
    #[arg(long, global = true, env = "OCIKIT_CONFIG", value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// use OS instead of the running OS when choosing images
    #[arg(long, global = true, value_name = "OS")]
    override_os: Option<String>,

    /// use ARCH instead of the running architecture when choosing images
    #[arg(long, global = true, value_name = "ARCH")]
    override_arch: Option<String>,

    /// use VARIANT instead of the running architecture variant when choosing images
    #[arg(long, global = true, value_name = "VARIANT")]
    override_variant: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// copy an image from SOURCE to DESTINATION
    ///
    /// references take the form dir:PATH or oci:PATH[:TAG]
    Copy {
        /// source image reference
        source: String,

        /// destination image reference
        destination: String,

        /// copy every instance of a multi-arch image list
        #[arg(long)]
        all: bool,

        /// instances of a multi-arch image list to copy: either "system",
        /// or comma-joined arch=[..], platform=[..], digest=[..] lists
        #[arg(long, conflicts_with = "all", value_name = "SELECTOR")]
        multi_arch: Option<String>,

        /// suppress the transfer summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// show an image's manifest, configuration and metadata
    Inspect {
        /// image reference
        image: String,

        /// output the raw manifest
        #[arg(long)]
        raw: bool,

        /// output the raw configuration blob
        #[arg(long, conflicts_with = "raw")]
        config: bool,
    },

    /// delete an image from a transport
    Delete {
        /// image reference
        image: String,
    },

    /// generate a shell completion script
    Completion {
        /// shell to generate completions for
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(cli: Cli) -> ocikit::Result<()> {
    let overrides = build_overrides(&cli)?;

    match cli.command {
        Commands::Copy {
            source,
            destination,
            all,
            multi_arch,
            quiet,
        } => {
            let src = ImageReference::parse(&source)?;
            let dest = ImageReference::parse(&destination)?;

            // the selector is parsed exactly once, before any transport I/O
            let selection = multi_arch
                .as_deref()
                .map(|value| parse_selector(&overrides, value))
                .transpose()?;

            let options = CopyOptions {
                all,
                selection,
                overrides,
            };
            let report = copy(&src, &dest, &options)?;

            if !quiet {
                println!(
                    "copied {}: {} manifests, {} blobs copied, {} skipped, {} bytes",
                    dest,
                    report.manifests_written,
                    report.blobs_copied,
                    report.blobs_skipped,
                    report.bytes_transferred
                );
            }
        }

        Commands::Inspect { image, raw, config } => {
            let reference = ImageReference::parse(&image)?;
            let options = InspectOptions { overrides };

            if raw {
                write_stdout(&raw_manifest(&reference)?)?;
            } else if config {
                write_stdout(&raw_config(&reference, &options)?)?;
            } else {
                let output = inspect(&reference, &options)?;
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }

        Commands::Delete { image } => {
            let reference = ImageReference::parse(&image)?;
            delete(&reference)?;
            println!("deleted {}", reference);
        }

        Commands::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "ocikit", &mut io::stdout());
        }
    }

    Ok(())
}

/// flags win over config file values, which win over host defaults
fn build_overrides(cli: &Cli) -> ocikit::Result<PlatformOverrides> {
    let mut overrides = PlatformOverrides::host();

    if let Some(path) = &cli.config_file {
        let config = Config::load(path)?;
        overrides.os = config.overrides.os;
        overrides.arch = config.overrides.arch;
        overrides.variant = config.overrides.variant;
    }

    if cli.override_os.is_some() {
        overrides.os = cli.override_os.clone();
    }
    if cli.override_arch.is_some() {
        overrides.arch = cli.override_arch.clone();
    }
    if cli.override_variant.is_some() {
        overrides.variant = cli.override_variant.clone();
    }

    Ok(overrides)
}

fn write_stdout(data: &[u8]) -> ocikit::Result<()> {
    io::stdout().write_all(data).map_err(|e| ocikit::Error::Io {
        path: "stdout".into(),
        source: e,
    })
}
