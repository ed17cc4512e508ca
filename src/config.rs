use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::Parser;

// CLI configuration for the gateway.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct ApplicationConfig {
    /// Port to listen on for SSH connections.
    #[arg(long, default_value_t = 53322, value_name = "PORT")]
    pub ssh_port: u16,

    /// Port for the admin web interface.
    #[arg(long, default_value_t = 53380, value_name = "PORT")]
    pub web_port: u16,

    /// Address to listen on for all services.
    #[arg(
        long,
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        value_name = "ADDRESS"
    )]
    pub listen_address: IpAddr,

    /// Path to the SQLite database file. Parent directories are created as
    /// needed.
    #[arg(long, default_value_os = "./data/porthole.db", value_name = "FILE")]
    pub db_path: PathBuf,

    /// File path to the server's RSA host key. Generated on first start if
    /// missing.
    #[arg(long, default_value_os = "./data/host_key", value_name = "FILE")]
    pub host_key_file: PathBuf,

    /// Append diagnostics to this file instead of standard error.
    #[arg(long, value_name = "FILE")]
    pub log_path: Option<PathBuf>,

    /// Username for the admin web interface.
    #[arg(
        long,
        env = "WEB_USERNAME",
        default_value = "admin",
        value_name = "USERNAME"
    )]
    pub web_username: String,

    /// Password for the admin web interface.
    #[arg(
        long,
        env = "WEB_PASSWORD",
        default_value = "admin123",
        value_name = "PASSWORD"
    )]
    pub web_password: String,
}
