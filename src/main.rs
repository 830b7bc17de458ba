//! services-socket client entry point.
//!
//! Opens the services socket once and logs its lifecycle until the server
//! closes it or the process is interrupted.
//!
//! Usage: `services-socket [ORIGIN]`. Without an argument the origin comes
//! from `SERVICES_ORIGIN`.

use tracing_subscriber::EnvFilter;

use services_socket::config::{ClientConfig, LogFormat};
use services_socket::error::LocationError;
use services_socket::socket::{LoggingHandler, ServicesSocket};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(LogFormat::from_env());

    // Load configuration
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return Err(err.into());
        }
    };

    let endpoint = config.endpoint()?;
    tracing::info!(url = %endpoint, "connecting to services socket");

    let socket = ServicesSocket::open(&endpoint, config.socket_options(), LoggingHandler::new());

    tokio::select! {
        () = socket.closed() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupt received, closing services socket");
            socket.close();
        }
    }

    let handler = socket.join().await?;
    tracing::info!(
        received = handler.received(),
        errors = handler.errors(),
        "services socket finished"
    );

    Ok(())
}

fn load_config() -> Result<ClientConfig, LocationError> {
    let config = ClientConfig::from_env()?;
    match std::env::args().nth(1) {
        Some(origin) => config.with_origin(&origin),
        None => Ok(config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
