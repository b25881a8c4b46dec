use clap::Parser;

use relay_rs::cli::Cli;
use relay_rs::{RelayServer, ShutdownHandle};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Wait for Ctrl-C on a helper thread and stop the relay when it arrives
///
/// The relay itself never touches tokio; a current-thread runtime exists only
/// to receive the signal.
fn spawn_signal_listener(handle: ShutdownHandle) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("relay-signal".into())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = ?err, "Failed to install ctrl-c handler");
                    return;
                }
                tracing::info!("Shutdown signal received");
                handle.shutdown();
            });
        })?;

    Ok(())
}

fn main() -> relay_rs::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut server = RelayServer::bind(cli.to_config())?;
    spawn_signal_listener(server.shutdown_handle())?;

    if let Err(err) = server.run() {
        tracing::error!(error = %err, "Relay exited with error");
        return Err(err);
    }

    Ok(())
}
