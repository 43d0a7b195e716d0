//! OCPP 1.6 WebSocket gateway binary.
//!
//! Reads configuration from the path in `OCPP_GATEWAY_CONFIG` (default
//! `config.toml`), then serves charge point connections until SIGTERM or
//! SIGINT.

use std::sync::Arc;

use tracing::{error, info};

use ocpp_gateway::server::shutdown::ShutdownCoordinator;
use ocpp_gateway::{
    AuditLogger, BackendClient, ConnectionRegistry, Dispatcher, GatewayConfig, GatewayServer,
    LoggingBackend, PendingRequests, PushHandle, SchemaStore,
};

fn init_logging(config: &GatewayConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match GatewayConfig::from_env() {
        Ok(config) => {
            init_logging(&config);
            config
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            error!(error = %e, "failed to load configuration, using defaults");
            GatewayConfig::default()
        }
    };
    let config = Arc::new(config);

    info!("starting OCPP 1.6 gateway");

    let schemas = match &config.schema_dir {
        Some(dir) => Arc::new(SchemaStore::from_dir(dir.clone())),
        None => {
            error!("no schema directory configured, every Call will be rejected as unimplemented");
            Arc::new(SchemaStore::disabled())
        }
    };

    let registry = ConnectionRegistry::shared();
    let audit = Arc::new(AuditLogger::new(config.audit.endpoint.clone()));
    if audit.is_enabled() {
        info!(endpoint = config.audit.endpoint.as_deref(), "audit forwarding enabled");
    }

    let backend: Arc<dyn BackendClient> =
        LoggingBackend::shared(config.heartbeat_interval_secs);
    backend.bind_push(PushHandle::new(registry.clone()));

    let pending = Arc::new(PendingRequests::new());
    let dispatcher = Arc::new(Dispatcher::new(schemas, backend, audit, pending));

    let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout_secs);
    let shutdown_signal = shutdown.signal();
    shutdown.start_signal_listener();

    let server = GatewayServer::new(config.clone(), registry.clone(), dispatcher)
        .with_shutdown(shutdown_signal);

    server.run().await?;

    info!("gateway stopped");
    Ok(())
}
