//! Relays an accepted direct-tcpip channel to its outbound TCP destination,
//! attributing every relayed chunk to the forward's traffic counters.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use russh::Channel;
use russh::server::Msg;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::PortholeServer;

const BUFFER_SIZE: usize = 32 * 1024;

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

pub(crate) fn spawn(
    server: Arc<PortholeServer>,
    channel: Channel<Msg>,
    target_id: i64,
    target: String,
) {
    tokio::spawn(run(server, channel, target_id, target));
}

async fn run(server: Arc<PortholeServer>, channel: Channel<Msg>, target_id: i64, target: String) {
    let outbound = match TcpStream::connect(&target).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!("Failed to connect to target {target}: {error}");
            finalize(&server, target_id).await;
            return;
        }
    };
    info!("Established direct-tcpip connection to {target}");

    let (channel_reader, channel_writer) = tokio::io::split(channel.into_stream());
    let (outbound_reader, outbound_writer) = outbound.into_split();

    let mut upstream = tokio::spawn(copy_counted(
        channel_reader,
        outbound_writer,
        Arc::clone(&server),
        target_id,
        Direction::Up,
    ));
    let mut downstream = tokio::spawn(copy_counted(
        outbound_reader,
        channel_writer,
        Arc::clone(&server),
        target_id,
        Direction::Down,
    ));

    // Either direction ending tears the whole forward down. Both halves of
    // the destination socket are owned by the copy tasks, so this join point
    // is also the single place where the socket gets closed.
    tokio::select! {
        _ = &mut upstream => downstream.abort(),
        _ = &mut downstream => upstream.abort(),
    }
    let _ = upstream.await;
    let _ = downstream.await;

    info!("Closed direct-tcpip connection to {target}");
    finalize(&server, target_id).await;
}

// One copy direction. Chunks are attributed to the counters before the
// write, and a short write ends the direction.
async fn copy_counted<R, W>(
    mut reader: R,
    mut writer: W,
    server: Arc<PortholeServer>,
    target_id: i64,
    direction: Direction,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        match direction {
            Direction::Up => {
                server
                    .registry
                    .add_target_traffic(target_id, read as u64, 0)
                    .await
            }
            Direction::Down => {
                server
                    .registry
                    .add_target_traffic(target_id, 0, read as u64)
                    .await
            }
        }
        let written = match writer.write(&buffer[..read]).await {
            Ok(written) => written,
            Err(_) => break,
        };
        if written != read {
            warn!("Expected to write {read} bytes, wrote {written} bytes");
            break;
        }
    }
}

// Final flush of the observed totals, disconnect stamp, and registry
// removal. Runs exactly once per forward, on every exit path.
async fn finalize(server: &PortholeServer, target_id: i64) {
    let Some(connection) = server.registry.remove_target(target_id).await else {
        return;
    };
    if let Err(error) = server
        .db
        .update_target_traffic(target_id, connection.bytes_up, connection.bytes_down)
        .await
    {
        warn!("Failed to flush final traffic for target connection {target_id}: {error:#}");
    }
    if let Err(error) = server.db.update_target_disconnect(target_id, Utc::now()).await {
        warn!("Failed to record disconnect for target connection {target_id}: {error:#}");
    }
}
