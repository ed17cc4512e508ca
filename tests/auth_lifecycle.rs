use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use porthole::database::Database;
use porthole::models::User;
use porthole::{ApplicationConfig, entrypoint};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

/// This test covers the authentication lifecycle: a successful login creates
/// a connection row, closing the transport stamps its disconnect time, and
/// wrong or deactivated credentials never produce a row.
#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn auth_lifecycle() {
    // 1. Seed the store with an active user and start the gateway.
    let dir = tempfile::tempdir().unwrap();
    let db = Database::connect(&dir.path().join("porthole.db"))
        .await
        .expect("database setup failed");
    db.add_user(&User {
        id: 0,
        name: "Alice".into(),
        username: "alice".into(),
        password: "p".into(),
        created: Utc::now(),
        active: true,
    })
    .await
    .expect("seeding user failed");
    start_gateway(dir.path(), 43022, 43080).await;

    // 2. Authenticate with valid credentials.
    let mut session = russh::client::connect(Default::default(), ("127.0.0.1", 43022), SshClient)
        .await
        .expect("Failed to connect to SSH server");
    assert!(
        session
            .authenticate_password("alice", "p")
            .await
            .expect("SSH authentication errored")
            .success(),
        "authentication didn't succeed"
    );

    // 3. A live connection row exists, with no disconnect time.
    let connections = timeout(Duration::from_secs(10), async {
        loop {
            let connections = db.list_connections().await.unwrap();
            if !connections.is_empty() {
                break connections;
            }
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("Timeout waiting for the connection row.");
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].username, "alice");
    assert!(connections[0].disconnected_at.is_none());
    assert!(!connections[0].session_id.is_empty());

    // 4. Closing the transport stamps the disconnect time exactly once.
    session
        .disconnect(russh::Disconnect::ByApplication, "", "English")
        .await
        .expect("disconnect failed");
    timeout(Duration::from_secs(10), async {
        loop {
            let connections = db.list_connections().await.unwrap();
            if connections[0].disconnected_at.is_some() {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("Timeout waiting for the disconnect stamp.");

    // 5. A wrong password is rejected and creates no row.
    let mut session = russh::client::connect(Default::default(), ("127.0.0.1", 43022), SshClient)
        .await
        .expect("Failed to connect to SSH server");
    assert!(
        !session
            .authenticate_password("alice", "wrong")
            .await
            .expect("SSH authentication errored")
            .success(),
        "wrong password was accepted"
    );
    assert_eq!(db.list_connections().await.unwrap().len(), 1);

    // 6. A deactivated user is rejected even with the right password.
    let mut alice = db.get_user_by_name("alice").await.unwrap().unwrap();
    alice.active = false;
    db.update_user(&alice).await.unwrap();
    let mut session = russh::client::connect(Default::default(), ("127.0.0.1", 43022), SshClient)
        .await
        .expect("Failed to connect to SSH server");
    assert!(
        !session
            .authenticate_password("alice", "p")
            .await
            .expect("SSH authentication errored")
            .success(),
        "deactivated user was accepted"
    );
    assert_eq!(db.list_connections().await.unwrap().len(), 1);
}

async fn start_gateway(data_dir: &Path, ssh_port: u16, web_port: u16) {
    let config = ApplicationConfig::parse_from([
        "porthole".to_string(),
        "--listen-address=127.0.0.1".to_string(),
        format!("--ssh-port={ssh_port}"),
        format!("--web-port={web_port}"),
        format!("--db-path={}", data_dir.join("porthole.db").display()),
        format!("--host-key-file={}", data_dir.join("host_key").display()),
    ]);
    tokio::spawn(async move { entrypoint(config).await });
    if timeout(Duration::from_secs(30), async {
        while TcpStream::connect(("127.0.0.1", ssh_port)).await.is_err() {
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .is_err()
    {
        panic!("Timeout waiting for porthole to start.")
    }
}

struct SshClient;

impl russh::client::Handler for SshClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}
