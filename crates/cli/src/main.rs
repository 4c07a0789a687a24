mod config_commands;
mod context;
mod skill_commands;
mod tool_commands;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "skillsyoga", version, about = "SkillsYoga: manage agent skills across tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/skillsyoga/).
    #[arg(long, global = true, env = "SKILLSYOGA_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
    /// Custom data directory (holds state.json and the fallback trash).
    #[arg(long, global = true, env = "SKILLSYOGA_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Config file management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Tool (skills root) management.
    Tools {
        #[command(subcommand)]
        action: tool_commands::ToolAction,
    },
    /// Skill listing, editing and import.
    Skills {
        #[command(subcommand)]
        action: skill_commands::SkillAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "skillsyoga starting");

    if let Some(ref dir) = cli.config_dir {
        skillsyoga_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.data_dir {
        skillsyoga_config::set_data_dir(dir.clone());
    }

    let result = match cli.command {
        Commands::Config { action } => config_commands::handle_config(action),
        Commands::Tools { action } => tool_commands::handle_tools(action).await,
        Commands::Skills { action } => skill_commands::handle_skills(action).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
