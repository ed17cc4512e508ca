//! Composition root: storage, host identity, the admin surface, the traffic
//! flusher, and the SSH accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info, warn};
use russh::server::Config;
use tokio::net::{TcpListener, TcpStream};
use tokio::pin;
use tokio::task::JoinHandle;

use crate::PortholeServer;
use crate::admin;
use crate::config::ApplicationConfig;
use crate::connections::ConnectionRegistry;
use crate::database::Database;
use crate::firewall::Firewall;
use crate::flusher;
use crate::host_key;
use crate::ssh::Server as _;

// Ties a helper task's lifetime to the entrypoint scope.
struct DroppableHandle<T>(JoinHandle<T>);

impl<T> Drop for DroppableHandle<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// Main entrypoint of the application.
pub async fn entrypoint(config: ApplicationConfig) -> anyhow::Result<()> {
    info!("Starting porthole...");

    let db = Database::connect(&config.db_path)
        .await
        .with_context(|| "Error initializing database")?;
    db.ensure_default_user()
        .await
        .with_context(|| "Error creating default user")?;

    let host_key_pem = host_key::load_or_generate(&config.host_key_file)
        .await
        .with_context(|| "Error loading host key")?;
    let host_key = russh::keys::decode_secret_key(&host_key_pem, None)
        .with_context(|| "Error decoding host key")?;

    let server = Arc::new(PortholeServer {
        firewall: Firewall::new(db.clone()),
        registry: ConnectionRegistry::new(),
        db,
    });

    let _flusher = DroppableHandle(tokio::spawn(flusher::run(Arc::clone(&server))));

    let admin_router = admin::router(
        Arc::clone(&server),
        config.web_username.clone(),
        config.web_password.clone(),
    );
    let web_listener = TcpListener::bind((config.listen_address, config.web_port))
        .await
        .with_context(|| "Error listening to web port")?;
    info!("Web interface listening on port {}", config.web_port);
    let _admin = DroppableHandle(tokio::spawn(async move {
        if let Err(error) = axum::serve(web_listener, admin_router).await {
            error!("Admin interface failed: {error}");
        }
    }));

    let ssh_config = Arc::new(Config {
        auth_rejection_time: Duration::from_secs(3),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        inactivity_timeout: Some(Duration::from_secs(3600)),
        keys: vec![host_key],
        ..Default::default()
    });
    let ssh_listener = TcpListener::bind((config.listen_address, config.ssh_port))
        .await
        .with_context(|| "Error listening to SSH port")?;
    info!("Listening for SSH connections on port {}", config.ssh_port);
    info!("porthole is now running.");

    let mut server = server;
    let signal_handler = wait_for_signal();
    pin!(signal_handler);
    loop {
        tokio::select! {
            conn = ssh_listener.accept() => {
                let (stream, address) = match conn {
                    Ok((stream, address)) => (stream, address),
                    Err(error) => {
                        error!("Unable to accept SSH connection: {error}");
                        break;
                    }
                };
                if let Err(error) = stream.set_nodelay(true) {
                    warn!("Error setting nodelay for {address}: {error}");
                }
                handle_ssh_connection(stream, address, Arc::clone(&ssh_config), &mut server);
            }
            _ = &mut signal_handler => {
                break;
            }
        }
    }
    info!("porthole is shutting down.");
    Ok(())
}

fn handle_ssh_connection(
    stream: TcpStream,
    address: SocketAddr,
    config: Arc<Config>,
    server: &mut Arc<PortholeServer>,
) {
    let handler = server.new_client(address);
    tokio::spawn(async move {
        match russh::server::run_stream(config, stream, handler).await {
            Ok(session) => {
                if let Err(error) = session.await {
                    debug!("Connection with {address} closed: {error}");
                }
            }
            Err(error) => {
                warn!("Connection setup failed: {error}");
            }
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut signal_terminate = signal(SignalKind::terminate()).unwrap();
    let mut signal_interrupt = signal(SignalKind::interrupt()).unwrap();

    tokio::select! {
        _ = signal_terminate.recv() => debug!("Received SIGTERM."),
        _ = signal_interrupt.recv() => debug!("Received SIGINT."),
    };
}

#[cfg(windows)]
async fn wait_for_signal() {
    use tokio::signal::windows;

    let mut signal_c = windows::ctrl_c().unwrap();
    let mut signal_break = windows::ctrl_break().unwrap();
    let mut signal_close = windows::ctrl_close().unwrap();
    let mut signal_shutdown = windows::ctrl_shutdown().unwrap();

    tokio::select! {
        _ = signal_c.recv() => debug!("Received CTRL_C."),
        _ = signal_break.recv() => debug!("Received CTRL_BREAK."),
        _ = signal_close.recv() => debug!("Received CTRL_CLOSE."),
        _ = signal_shutdown.recv() => debug!("Received CTRL_SHUTDOWN."),
    };
}
