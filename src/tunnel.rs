//! SSH local port forwarding.
//!
//! [`SshTunnel::open`] authenticates against the jump host with a private
//! key, binds an ephemeral loopback port, and relays every connection
//! accepted there to the remote database endpoint over a `direct-tcpip`
//! channel. Open failures propagate to the caller; teardown is explicit
//! via [`SshTunnel::close`] with a `Drop` fallback that logs instead of
//! panicking.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ssh2::Session;
use tracing::{debug, info, warn};

use crate::config::TunnelConfig;
use crate::error::{ScribeError, ScribeResult};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An established SSH tunnel forwarding a local loopback port to a remote
/// endpoint.
pub struct SshTunnel {
    session: Arc<Session>,
    local_port: u16,
    stop: Arc<AtomicBool>,
    forwarder: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SshTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `ssh2::Session` is not `Debug`; skip it.
        f.debug_struct("SshTunnel")
            .field("local_port", &self.local_port)
            .field("stop", &self.stop)
            .field("forwarder", &self.forwarder)
            .finish_non_exhaustive()
    }
}

impl SshTunnel {
    /// Open the tunnel. `remote` is the database endpoint as seen from the
    /// jump host.
    pub fn open(cfg: &TunnelConfig, remote: (&str, u16)) -> ScribeResult<Self> {
        match Self::establish(cfg, remote) {
            Ok(tunnel) => {
                info!(
                    local_port = tunnel.local_port,
                    host = %cfg.host,
                    "ssh tunnel established"
                );
                Ok(tunnel)
            }
            Err(e) => {
                warn!(error = %e, "failed to establish ssh tunnel");
                Err(e)
            }
        }
    }

    fn establish(cfg: &TunnelConfig, remote: (&str, u16)) -> ScribeResult<Self> {
        let addr = format!("{}:{}", cfg.host, cfg.port);
        let tcp = TcpStream::connect(&addr)
            .map_err(|e| ScribeError::tunnel(format!("connect to {addr}: {e}")))?;

        let mut session =
            Session::new().map_err(|e| ScribeError::tunnel(format!("session init: {e}")))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| ScribeError::tunnel(format!("handshake with {addr}: {e}")))?;
        session
            .userauth_pubkey_file(&cfg.username, None, &cfg.private_key_path, None)
            .map_err(|e| {
                ScribeError::tunnel(format!(
                    "public key auth for {} with {}: {e}",
                    cfg.username,
                    cfg.private_key_path.display()
                ))
            })?;
        if !session.authenticated() {
            return Err(ScribeError::tunnel(format!(
                "public key authentication rejected for {}",
                cfg.username
            )));
        }

        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let local_port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;

        let session = Arc::new(session);
        let stop = Arc::new(AtomicBool::new(false));
        let forwarder = {
            let session = Arc::clone(&session);
            let stop = Arc::clone(&stop);
            let remote_host = remote.0.to_string();
            let remote_port = remote.1;
            thread::Builder::new()
                .name("ssh-forwarder".to_string())
                .spawn(move || forward_loop(listener, session, remote_host, remote_port, stop))?
        };

        Ok(Self {
            session,
            local_port,
            stop,
            forwarder: Some(forwarder),
        })
    }

    /// The loopback port the tunnel is bound to. Stable for the lifetime
    /// of the tunnel.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Tear the tunnel down, returning any disconnect error to the caller.
    pub fn close(mut self) -> ScribeResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> ScribeResult<()> {
        if self.stop.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(handle) = self.forwarder.take() {
            let _ = handle.join();
        }
        self.session
            .disconnect(None, "session closed", None)
            .map_err(|e| ScribeError::tunnel(format!("disconnect: {e}")))?;
        info!("ssh tunnel closed");
        Ok(())
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "failed to close ssh tunnel");
        }
    }
}

fn forward_loop(
    listener: TcpListener,
    session: Arc<Session>,
    remote_host: String,
    remote_port: u16,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "forwarding local connection");
                let session = Arc::clone(&session);
                let remote_host = remote_host.clone();
                let result = thread::Builder::new()
                    .name("ssh-relay".to_string())
                    .spawn(move || {
                        match session.channel_direct_tcpip(&remote_host, remote_port, None) {
                            Ok(channel) => relay(stream, channel),
                            Err(e) => warn!(error = %e, "direct-tcpip channel failed"),
                        }
                    });
                if let Err(e) = result {
                    warn!(error = %e, "failed to spawn relay thread");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                warn!(error = %e, "tunnel accept failed");
                break;
            }
        }
    }
}

/// A bidirectional byte stream that can be split into independent read and
/// write halves. The relay is generic over this so it can be exercised
/// with plain TCP streams.
pub(crate) trait Transport {
    type Rx: Read + Send + 'static;
    type Tx: Write + Send + 'static;

    fn split(self) -> io::Result<(Self::Rx, Self::Tx)>;

    /// Signal end-of-stream on the write half once the paired reader is
    /// exhausted.
    fn finish(tx: &mut Self::Tx);
}

impl Transport for TcpStream {
    type Rx = TcpStream;
    type Tx = TcpStream;

    fn split(self) -> io::Result<(TcpStream, TcpStream)> {
        let rx = self.try_clone()?;
        Ok((rx, self))
    }

    fn finish(tx: &mut TcpStream) {
        let _ = tx.shutdown(Shutdown::Write);
    }
}

impl Transport for ssh2::Channel {
    type Rx = ssh2::Stream;
    type Tx = ssh2::Channel;

    fn split(mut self) -> io::Result<(ssh2::Stream, ssh2::Channel)> {
        Ok((self.stream(0), self))
    }

    fn finish(tx: &mut ssh2::Channel) {
        let _ = tx.send_eof();
    }
}

/// Pump bytes both ways until either side reaches end-of-stream.
pub(crate) fn relay<A: Transport, B: Transport>(a: A, b: B) {
    let (mut a_rx, mut a_tx) = match a.split() {
        Ok(halves) => halves,
        Err(e) => {
            warn!(error = %e, "failed to split local stream");
            return;
        }
    };
    let (mut b_rx, mut b_tx) = match b.split() {
        Ok(halves) => halves,
        Err(e) => {
            warn!(error = %e, "failed to split remote stream");
            return;
        }
    };

    let upstream = thread::spawn(move || {
        let _ = io::copy(&mut a_rx, &mut b_tx);
        B::finish(&mut b_tx);
    });
    let _ = io::copy(&mut b_rx, &mut a_tx);
    A::finish(&mut a_tx);
    let _ = upstream.join();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// A pair of connected loopback TCP streams.
    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_relay_moves_bytes_both_directions() {
        let (local_client, local_server) = socket_pair();
        let (remote_client, mut remote_server) = socket_pair();

        let handle = thread::spawn(move || relay(local_server, remote_client));

        let mut local = local_client;
        local.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        remote_server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        remote_server.write_all(b"pong").unwrap();
        local.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");

        drop(local);
        drop(remote_server);
        handle.join().unwrap();
    }

    #[test]
    fn test_relay_propagates_eof() {
        let (local_client, local_server) = socket_pair();
        let (remote_client, mut remote_server) = socket_pair();

        let handle = thread::spawn(move || relay(local_server, remote_client));

        local_client.shutdown(Shutdown::Write).unwrap();
        let mut buf = Vec::new();
        // Remote side sees end-of-stream once the local writer is done.
        remote_server.read_to_end(&mut buf).unwrap();
        assert!(buf.is_empty());

        drop(local_client);
        drop(remote_server);
        handle.join().unwrap();
    }

    #[test]
    fn test_open_failure_propagates() {
        // Grab a port with no listener behind it.
        let port = {
            let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        let cfg = TunnelConfig {
            host: "127.0.0.1".to_string(),
            port,
            username: "nobody".to_string(),
            private_key_path: PathBuf::from("/nonexistent/id_rsa"),
        };
        let err = SshTunnel::open(&cfg, ("127.0.0.1", 3306)).unwrap_err();
        assert!(matches!(err, ScribeError::Tunnel(_)));
    }
}
