//! Builder command - serve the package builder

use crate::builder::{self, Builder};
use crate::cli::args::BuilderArgs;
use crate::config::Config;
use crate::error::FnplaneResult;
use crate::ui::{self, UiContext};
use tracing::info;

/// Execute the builder command
pub async fn execute(args: BuilderArgs, config: &Config) -> FnplaneResult<()> {
    let ctx = UiContext::detect();

    let mut settings = config.builder.clone();
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }
    if let Some(command) = args.default_command {
        settings.default_command = command;
    }
    let addr = settings.socket_addr()?;

    builder::ensure_shared_volume(&args.shared_volume).await?;
    let builder = Builder::with_registry(args.shared_volume.clone(), config.cache.options())
        .with_default_command(&settings.default_command);

    ui::step_ok_detail(&ctx, "Builder listening", &format!("http://{}", addr));
    ui::key_value(&ctx, "Shared volume", &args.shared_volume.display().to_string());
    ui::key_value(&ctx, "Default command", builder.default_command());

    builder::serve(builder, addr, shutdown_signal()).await?;

    ui::step_ok(&ctx, "Builder stopped");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
