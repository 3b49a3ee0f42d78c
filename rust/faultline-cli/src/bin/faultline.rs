//! faultline: locate the root cause of a wrong output in a recorded trace.

use clap::{Parser, Subcommand};
use faultline_cli::colors::{Color, Palette};
use faultline_cli::commands::{self, Context};
use faultline_cli::config::LoadedConfig;
use faultline_cli::error_chain::format_error_chain;
use faultline_cli::report::OutputFormat;
use faultline_cli::CliError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "faultline", version, about = "Probabilistic root-cause localization over execution traces")]
struct Cli {
    /// Config file (default: nearest faultline.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format of reporting commands
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log at debug level unless FAULTLINE_LOG or RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the backward slice of the output step
    Slice {
        trace: PathBuf,
        /// Slice from this step instead of the output step
        #[arg(long)]
        step: Option<u32>,
    },
    /// Print the correctness probability of every slice step
    Propagate { trace: PathBuf },
    /// Print the most probable feedback path to the candidate root cause
    Path {
        trace: PathBuf,
        /// End the path at this step instead of the selected candidate
        #[arg(long)]
        end: Option<u32>,
    },
    /// Run a refinement session until a root cause or omission is found
    Locate {
        trace: PathBuf,
        /// Answer from an oracle script instead of the terminal
        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Create a faultline.toml in the current directory
    Init,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("FAULTLINE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn context(cli: &Cli, palette: Palette) -> Result<Context, CliError> {
    Ok(Context {
        config: LoadedConfig::load(cli.config.as_deref())?,
        format: cli.format,
        palette,
    })
}

fn run(cli: &Cli, palette: Palette) -> Result<(), CliError> {
    let output = match &cli.command {
        Commands::Init => {
            let dir = std::env::current_dir().map_err(|source| CliError::Io {
                path: PathBuf::from("."),
                source,
            })?;
            let path = commands::cmd_init(&dir)?;
            format!("{} {}", palette.status("Created"), path.display())
        }
        Commands::Slice { trace, step } => commands::cmd_slice(&context(cli, palette)?, trace, *step)?,
        Commands::Propagate { trace } => commands::cmd_propagate(&context(cli, palette)?, trace)?,
        Commands::Path { trace, end } => commands::cmd_path(&context(cli, palette)?, trace, *end)?,
        Commands::Locate { trace, script } => {
            commands::cmd_locate(&context(cli, palette)?, trace, script.as_deref())?
        }
    };
    println!("{}", output);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let palette = match cli.format {
        OutputFormat::Json => Palette::plain(),
        OutputFormat::Text => Palette::detect(),
    };
    if let Err(err) = run(&cli, palette) {
        let message = format_error_chain(&err);
        let message = message.strip_prefix("error: ").unwrap_or(&message);
        eprintln!("{} {}", Palette::detect().paint(Color::Red, "error:"), message);
        std::process::exit(1);
    }
}
