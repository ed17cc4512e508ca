pub mod config;
pub mod database;
pub mod error;
pub mod models;

mod admin;
mod connections;
mod entrypoint;
mod firewall;
mod flusher;
mod forwarding;
mod host_key;
mod login;
mod ssh;

pub use config::ApplicationConfig;
pub use entrypoint::entrypoint;

use crate::connections::ConnectionRegistry;
use crate::database::Database;
use crate::firewall::Firewall;

// Process-wide state shared by the SSH front-end, the forwarder, and the
// traffic flusher. Created once at startup and threaded by reference.
pub struct PortholeServer {
    pub(crate) db: Database,
    pub(crate) firewall: Firewall,
    pub(crate) registry: ConnectionRegistry,
}
