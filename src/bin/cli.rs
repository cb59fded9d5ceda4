use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rastrea::config::{Config, DEFAULT_CONFIG_FILE};
use rastrea::error::{AgentError, Result};
use rastrea::output::OutputFormat;
use rastrea::{AgentOptions, ScanMode};

#[derive(Parser)]
#[command(
    name = "rastrea",
    about = "Pull a YARA rule from a rule server and sweep this host with it",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args)]
struct GlobalArgs {
    /// Suppress progress output and the run summary
    #[arg(long, short = 's', global = true, conflicts_with = "verbose")]
    silent: bool,

    /// Log every skipped target and its cause
    #[arg(long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Host identifier sent with every report
    #[arg(long, global = true, env = "RASTREA_HOSTNAME")]
    hostname: Option<String>,

    /// Rule server port when the server argument has none
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Summary format (console, json)
    #[arg(long, short = 'f', global = true, default_value = "console")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every file under a directory
    YaraDisk {
        /// Root directory to sweep
        path: PathBuf,

        /// Rule server, `host` or `host:port`
        server: String,

        /// Name of the rule to pull
        rule: String,
    },

    /// Scan the memory of every running process
    YaraMem {
        /// Rule server, `host` or `host:port`
        server: String,

        /// Name of the rule to pull
        rule: String,
    },

    /// Generate a starter rastrea.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.global);

    let result = match cli.command {
        Commands::YaraDisk { path, server, rule } => {
            cmd_scan(&cli.global, ScanMode::Disk { root: path }, &server, &rule)
        }
        Commands::YaraMem { server, rule } => {
            cmd_scan(&cli.global, ScanMode::Memory, &server, &rule)
        }
        Commands::Init { force } => cmd_init(&cli.global, force),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_logging(global: &GlobalArgs) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if global.silent {
        EnvFilter::new("off")
    } else if global.verbose {
        EnvFilter::new("rastrea=debug")
    } else {
        EnvFilter::new("rastrea=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_scan(global: &GlobalArgs, mode: ScanMode, server: &str, rule: &str) -> Result<()> {
    let format = OutputFormat::from_str_lenient(&global.format).unwrap_or_else(|| {
        tracing::warn!(format = %global.format, "unknown format, using console");
        OutputFormat::Console
    });

    let options = AgentOptions {
        config_path: global.config.clone(),
        hostname: global.hostname.clone(),
        port: global.port,
        format,
    };

    let summary = rastrea::scan(&mode, server, rule, &options)?;
    if !global.silent {
        let rendered = rastrea::render_report(&summary, options.format)?;
        println!("{}", rendered.trim_end());
    }
    Ok(())
}

fn cmd_init(global: &GlobalArgs, force: bool) -> Result<()> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if path.exists() && !force {
        return Err(AgentError::Config(format!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        )));
    }

    std::fs::write(&path, Config::starter_toml())?;
    if !global.silent {
        println!("Created {}", path.display());
    }
    Ok(())
}
