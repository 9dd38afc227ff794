use std::process::ExitCode;

use clap::Parser;
use envelo_agent::autostart::{Autostart, NoAutostart, SystemdUserUnit};
use envelo_agent::config::AgentArgs;
use envelo_agent::{AgentError, AgentRuntime, HttpRegistry, ShutdownReason, server};
use envelo_core::BoundaryCatalog;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "envelo-agent",
    version,
    about = "ENVELO interlock agent: enforces certified operating boundaries"
)]
struct Cli {
    #[command(flatten)]
    agent: AgentArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing();

    match run(cli.agent).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "agent failed");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "envelo_agent=info,tower_http=info".into());
    let pretty = std::env::var("ENVELO_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("pretty"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if pretty {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }
}

async fn run(args: AgentArgs) -> Result<ExitCode, AgentError> {
    args.validate()?;
    let settings = args.settings();
    let defaults = BoundaryCatalog::new(args.load_default_boundaries()?)?;
    let registry = HttpRegistry::new(&args.api_url, args.api_key.clone(), args.request_timeout())?;

    let autostart: Box<dyn Autostart> = if args.autostart {
        match SystemdUserUnit::for_current_exe(&settings.certificate_id) {
            Ok(unit) => Box::new(unit),
            Err(err) => {
                tracing::warn!(error = %err, "autostart unavailable on this host");
                Box::new(NoAutostart)
            }
        }
    } else {
        Box::new(NoAutostart)
    };

    // Bind before starting so a busy port never leaves a registered session behind
    let listener = tokio::net::TcpListener::bind(args.listen_addr).await?;

    let runtime = AgentRuntime::new(settings, registry, defaults, autostart);
    runtime.start().await?;
    tracing::info!(addr = %args.listen_addr, "local enforcement API listening");
    let server = tokio::spawn(server::serve(listener, runtime.clone()));

    tokio::select! {
        _ = shutdown_signal() => runtime.shutdown(ShutdownReason::Signal).await,
        _ = runtime.wait_stopped() => {}
    }

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "local API ended with an error"),
        Err(err) => tracing::warn!(error = %err, "local API task failed"),
    }

    Ok(match runtime.stop_reason() {
        Some(reason) if reason.is_fatal() => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
