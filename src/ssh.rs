//! SSH front-end: one `ServerHandler` per accepted socket, driving password
//! authentication, the session-channel echo service, global requests, and
//! direct-tcpip dispatch into the forwarder.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use russh::keys::PublicKey;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, MethodKind, MethodSet};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::PortholeServer;
use crate::error::ServerError;
use crate::forwarding;
use crate::login::{self, AuthError};
use crate::models::{Connection, TargetConnection};

// Per-connection handler state, alive for the duration of the transport.
pub(crate) struct ServerHandler {
    // The IP and port of this connection.
    peer: SocketAddr,
    // Opaque session identifier minted at connection setup. Uniquely keys
    // the live session in the registry and the durable connection row.
    session_id: String,
    // Username from a successful password authentication.
    user: Option<String>,
    // Ids of open session channels. Requests on any other channel are
    // refused.
    session_channels: HashSet<ChannelId>,
    // Reference to the shared gateway state.
    server: Arc<PortholeServer>,
}

pub(crate) trait Server {
    fn new_client(&mut self, peer: SocketAddr) -> ServerHandler;
}

impl Server for Arc<PortholeServer> {
    fn new_client(&mut self, peer: SocketAddr) -> ServerHandler {
        info!("{peer} connected");
        ServerHandler {
            peer,
            session_id: Uuid::new_v4().to_string(),
            user: None,
            session_channels: HashSet::new(),
            server: Arc::clone(self),
        }
    }
}

fn reject() -> Auth {
    Auth::Reject {
        proceed_with_methods: None,
        partial_success: false,
    }
}

impl ServerHandler {
    // exec/shell/pty-req/env succeed on session channels; requests on any
    // other channel (notably direct-tcpip) are refused.
    fn reply_for_session_channel(
        &self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), russh::Error> {
        if self.session_channels.contains(&channel) {
            session.channel_success(channel)
        } else {
            session.channel_failure(channel)
        }
    }
}

impl Handler for ServerHandler {
    type Error = russh::Error;

    // Password is the only supported method.
    async fn auth_none(&mut self, _user: &str) -> Result<Auth, Self::Error> {
        Ok(Auth::Reject {
            proceed_with_methods: Some(MethodSet::from([MethodKind::Password].as_slice())),
            partial_success: false,
        })
    }

    async fn auth_publickey(
        &mut self,
        _user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(Auth::Reject {
            proceed_with_methods: Some(MethodSet::from([MethodKind::Password].as_slice())),
            partial_success: false,
        })
    }

    // Verify credentials, record the connection, and register it as live.
    // Connection rows and live sessions are kept in bijection: if the record
    // cannot be written, the authentication fails with it.
    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        let identity = match login::authenticate(&self.server.db, user, password).await {
            Ok(identity) => identity,
            Err(AuthError::Backend(error)) => {
                error!("Error authenticating {user} ({}): {error}", self.peer);
                return Ok(reject());
            }
            Err(reason) => {
                warn!("{user} ({}) failed password authentication: {reason}", self.peer);
                return Ok(reject());
            }
        };
        let mut connection = Connection {
            id: 0,
            user_id: identity.id,
            username: identity.username,
            remote_addr: self.peer.to_string(),
            connected_at: Utc::now(),
            disconnected_at: None,
            session_id: self.session_id.clone(),
        };
        connection.id = match self.server.db.record_connection(&connection).await {
            Ok(id) => id,
            Err(error) => {
                error!("Failed to record connection for {user}: {error:#}");
                return Ok(reject());
            }
        };
        self.server.registry.register_session(connection).await;
        self.user = Some(user.into());
        info!("{user} ({}) authenticated with password", self.peer);
        Ok(Auth::Accept)
    }

    // Session channels get a trivial echo service, for clients that
    // negotiate a shell even when they only came for port forwarding.
    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!("Opened session channel {} for {}", channel.id(), self.peer);
        self.session_channels.insert(channel.id());
        tokio::spawn(echo(channel));
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!("exec_request data {data:?}");
        self.reply_for_session_channel(channel, session)
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.reply_for_session_channel(channel, session)
    }

    // Accepted for compatibility; no pseudo-terminal is allocated and the
    // data path stays the same echo.
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.reply_for_session_channel(channel, session)
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!("env_request {variable_name}={variable_value}");
        self.reply_for_session_channel(channel, session)
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.session_channels.remove(&channel);
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!("Rejecting subsystem request {name}");
        session.channel_failure(channel)
    }

    // Deliberate no-op that presents as successful: the requested port is
    // echoed back, but no listener is bound.
    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        info!(
            "Accepted tcpip-forward request for {} from {}",
            join_host_port(address, *port),
            self.peer
        );
        Ok(true)
    }

    async fn cancel_tcpip_forward(
        &mut self,
        address: &str,
        port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        info!(
            "Accepted cancel-tcpip-forward request for {} from {}",
            join_host_port(address, port),
            self.peer
        );
        Ok(true)
    }

    // Gate the destination on firewall policy, record the forward, and hand
    // the channel to the relay. Truncated or otherwise malformed open
    // payloads never get here: the transport fails to decode them and the
    // connection dies with the decode error. What remains to check is the
    // port range, which the wire format cannot enforce.
    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if port_to_connect > u16::MAX.into() || originator_port > u16::MAX.into() {
            return Err(russh::Error::Disconnect);
        }
        let target = join_host_port(host_to_connect, port_to_connect);
        if !self.server.firewall.is_allowed(&target).await {
            info!(
                "Rejecting direct-tcpip from {} to {target}: {}",
                self.peer,
                ServerError::PolicyDenied
            );
            return Ok(false);
        }
        // Resolve the durable id for this session, falling back to the store
        // for channels that race the in-memory bookkeeping.
        let connection_id = match self.server.registry.session_connection_id(&self.session_id).await
        {
            Some(id) => Some(id),
            None => match self.server.db.connection_by_session_id(&self.session_id).await {
                Ok(connection) => connection.map(|connection| connection.id),
                Err(error) => {
                    error!("Failed to look up session {}: {error:#}", self.session_id);
                    None
                }
            },
        };
        let Some(connection_id) = connection_id else {
            warn!(
                "Rejecting direct-tcpip to {target}: {}",
                ServerError::SessionNotFound
            );
            return Ok(false);
        };
        let mut record = TargetConnection {
            id: 0,
            connection_id,
            target: target.clone(),
            connected_at: Utc::now(),
            disconnected_at: None,
            bytes_up: 0,
            bytes_down: 0,
        };
        record.id = match self.server.db.record_target_connection(&record).await {
            Ok(id) => id,
            Err(error) => {
                error!("Failed to record target connection to {target}: {error:#}");
                return Ok(false);
            }
        };
        let target_id = record.id;
        self.server.registry.register_target(record).await;
        info!(
            "Accepted direct-tcpip from {originator_address}:{originator_port} => {target} for {}",
            self.peer
        );
        forwarding::spawn(Arc::clone(&self.server), channel, target_id, target);
        Ok(true)
    }
}

// Session teardown on every exit path: stamp the disconnect time exactly
// once (guarded by the registry removal) and drop the live entry.
impl Drop for ServerHandler {
    fn drop(&mut self) {
        let server = Arc::clone(&self.server);
        let session_id = std::mem::take(&mut self.session_id);
        let user = self.user.take().unwrap_or_else(|| "unauthenticated".into());
        let peer = self.peer;
        tokio::spawn(async move {
            if server.registry.remove_session(&session_id).await.is_some() {
                if let Err(error) = server
                    .db
                    .update_connection_disconnect(&session_id, Utc::now())
                    .await
                {
                    error!("Failed to record disconnect for session of {user}: {error:#}");
                }
            }
            info!("{user} ({peer}) disconnected");
        });
    }
}

// Echo whatever the client sends until either side closes.
async fn echo(channel: Channel<Msg>) {
    let (mut reader, mut writer) = tokio::io::split(channel.into_stream());
    let mut buffer = vec![0u8; 1024];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                if writer.write_all(&buffer[..read]).await.is_err() {
                    break;
                }
            }
        }
    }
}

// Form a dialable "host:port" destination, bracketing IPv6 literals.
fn join_host_port(host: &str, port: u32) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
