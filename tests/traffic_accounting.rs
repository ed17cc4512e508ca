use std::path::Path;
use std::time::Duration;

use clap::Parser;
use porthole::database::Database;
use porthole::{ApplicationConfig, entrypoint};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

/// This test ensures that a forward's durable counters end up equal to the
/// totals that actually crossed it: 100 bytes upstream, 200 downstream.
#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn traffic_accounting() {
    // 1. Start the gateway and a sink that consumes 100 bytes, replies with
    // 200, and closes.
    let dir = tempfile::tempdir().unwrap();
    start_gateway(dir.path(), 45022, 45080).await;
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener bind failed");
    let target_port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept failed");
        let mut request = vec![0u8; 100];
        socket.read_exact(&mut request).await.expect("read failed");
        socket.write_all(&[0x42; 200]).await.expect("write failed");
        socket.shutdown().await.expect("shutdown failed");
    });

    // 2. Forward a channel through the gateway and exchange the payloads.
    let mut session = russh::client::connect(Default::default(), ("127.0.0.1", 45022), SshClient)
        .await
        .expect("Failed to connect to SSH server");
    assert!(
        session
            .authenticate_password("admin", "admin123")
            .await
            .expect("SSH authentication errored")
            .success(),
        "authentication didn't succeed"
    );
    let mut channel = session
        .channel_open_direct_tcpip("127.0.0.1", target_port.into(), "::1", 23456)
        .await
        .expect("direct-tcpip open failed");
    channel.data(&[0x5A; 100][..]).await.expect("send failed");

    let mut received = 0usize;
    if timeout(Duration::from_secs(5), async {
        while let Some(msg) = channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { data } => {
                    received += data.len();
                    if received >= 200 {
                        break;
                    }
                }
                russh::ChannelMsg::Eof | russh::ChannelMsg::Close => break,
                _ => continue,
            }
        }
    })
    .await
    .is_err()
    {
        panic!("Timeout waiting for downstream data.")
    }
    assert_eq!(received, 200);

    // 3. After the forward closes, the durable record carries the totals.
    drop(channel);
    let db = Database::connect(&dir.path().join("porthole.db"))
        .await
        .expect("database open failed");
    let target = timeout(Duration::from_secs(10), async {
        loop {
            let targets = db.list_target_connections().await.unwrap();
            if let Some(target) = targets
                .into_iter()
                .find(|target| target.disconnected_at.is_some())
            {
                break target;
            }
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("Timeout waiting for the forward to be finalized.");

    assert_eq!(target.target, format!("127.0.0.1:{target_port}"));
    assert_eq!(target.bytes_up, 100);
    assert_eq!(target.bytes_down, 200);

    session
        .disconnect(russh::Disconnect::ByApplication, "", "English")
        .await
        .expect("disconnect failed");
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
