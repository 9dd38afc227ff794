use clap::{Parser, Subcommand};

mod commands;
mod util;

#[derive(Parser)]
#[command(
    name = "envelo",
    version,
    about = "ENVELO operator CLI: check boundaries, inspect and drive the interlock agent"
)]
struct Cli {
    /// Certification Registry base URL
    #[arg(long, env = "ENVELO_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Local agent API base URL
    #[arg(long, env = "ENVELO_AGENT_URL", default_value = "http://127.0.0.1:7474")]
    agent_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate parameters against a local boundaries file (offline)
    Check {
        /// JSON file with {"boundaries": [...]} or a bare array ("-" for stdin)
        #[arg(long)]
        boundaries: String,
        /// Parameter to evaluate, as name=value (repeatable)
        #[arg(short = 'p', long = "param", required = true)]
        params: Vec<String>,
    },
    /// Fetch the boundaries the registry publishes for a certificate
    Boundaries {
        #[arg(long, env = "ENVELO_CERTIFICATE_ID")]
        certificate_id: String,
        #[arg(long, env = "ENVELO_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Show the local agent's session health
    Status,
    /// Enforce one action through the running agent
    Enforce {
        /// Parameter to evaluate, as name=value (repeatable)
        #[arg(short = 'p', long = "param", required = true)]
        params: Vec<String>,
        /// Action label recorded in telemetry
        #[arg(long)]
        action_type: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Check { boundaries, params } => commands::check::run(&boundaries, &params),
        Commands::Boundaries {
            certificate_id,
            api_key,
        } => commands::boundaries::run(&cli.api_url, api_key.as_deref(), &certificate_id).await,
        Commands::Status => commands::agent::status(&cli.agent_url).await,
        Commands::Enforce {
            params,
            action_type,
        } => commands::agent::enforce(&cli.agent_url, action_type.as_deref(), &params).await,
    };

    std::process::exit(code);
}
