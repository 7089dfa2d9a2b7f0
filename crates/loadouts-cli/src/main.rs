mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_STORE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "loadouts",
    version,
    about = "Inspect and maintain stored equipment loadouts"
)]
struct Cli {
    /// Path to the loadouts configuration file.
    #[arg(long, default_value = "loadouts.toml", global = true)]
    config: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a starter configuration file.
    Init {
        /// Overwrite an existing configuration.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// List the loadout slots of an owner.
    List {
        /// User UUID, or "global" for the shared loadouts.
        owner: String,
    },
    /// Show one loadout in full.
    Show {
        /// User UUID, or "global".
        owner: String,
        /// Slot number (1-5).
        slot: String,
    },
    /// Delete a stored loadout.
    Delete {
        /// User UUID, or "global".
        owner: String,
        /// Slot number (1-5).
        slot: String,
        /// Skip the confirmation prompt.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// Set the display name of a stored loadout.
    Rename {
        /// User UUID, or "global".
        owner: String,
        /// Slot number (1-5).
        slot: String,
        /// New name, 1 to 32 characters.
        name: String,
    },
    /// Count the applicable loadouts of an owner.
    Count {
        /// User UUID, or "global".
        owner: String,
    },
    /// List every owner with stored loadouts.
    Owners,
    /// Run diagnostic checks on the configuration, database and journal.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

/// Exit quietly when stdout is closed under us (`loadouts list ... | head`).
fn exit_on_broken_pipe() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        let broken_pipe = ["Broken pipe", "broken pipe", "os error 32", "failed printing to stdout"]
            .iter()
            .any(|needle| msg.contains(needle));
        if broken_pipe {
            std::process::exit(0);
        }
        default_hook(info);
    }));
}

fn init_logging(verbose: bool, trace: bool) {
    let fallback = match (trace, verbose) {
        (true, _) => "trace",
        (false, true) => "debug",
        (false, false) => "warn",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("LOADOUTS_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Exit code for an error message, by its prefix.
fn exit_code_for(msg: &str) -> u8 {
    const CONFIG_PREFIXES: [&str; 3] = [
        "config error:",
        "failed to parse config",
        "failed to read config",
    ];
    if CONFIG_PREFIXES.iter().any(|p| msg.starts_with(p)) {
        EXIT_CONFIG_ERROR
    } else if msg.starts_with("store error:") {
        EXIT_STORE_ERROR
    } else {
        EXIT_FAILURE
    }
}

fn main() -> ExitCode {
    exit_on_broken_pipe();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.trace);

    let config = cli.config.as_path();
    let json = cli.json;

    let result = match cli.command {
        Commands::Init { force } => commands::init::run(config, force, json),
        Commands::List { owner } => commands::list::run(config, &owner, json),
        Commands::Show { owner, slot } => commands::show::run(config, &owner, &slot, json),
        Commands::Delete { owner, slot, yes } => {
            commands::delete::run(config, &owner, &slot, yes, json)
        }
        Commands::Rename { owner, slot, name } => {
            commands::rename::run(config, &owner, &slot, &name, json)
        }
        Commands::Count { owner } => commands::count::run(config, &owner, json),
        Commands::Owners => commands::owners::run(config, json),
        Commands::Doctor => commands::doctor::run(config, json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}
