//! # UDP Relay Listener
//!
//! Local applications ask the gateway to transmit on the mesh by sending a UDP
//! datagram such as `MSG_OUT:hello there` to port 1703. The listener strips the
//! prefix and writes `::hello there` to the device through the shared
//! [`SerialWriter`]. Datagrams without the prefix, or with nothing after it, are
//! ignored. Nothing is sent back to the sender.
//!
//! The listener runs as its own tokio task for the life of the process. Its only
//! coupling with the gateway loop is the writer's mutex.

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use std::net::SocketAddr;
use tokio::net::UdpSocket;

use crate::config::RelayConfig;
use crate::logutil::preview;
use crate::metrics;
use crate::serial::SerialWriter;

/// Largest datagram read in one receive; longer payloads are truncated by the OS.
const MAX_DATAGRAM: usize = 2048;

/// Decide what, if anything, a datagram should put on the serial line.
///
/// The text is trimmed, must start with `prefix`, and the remainder (trimmed
/// again) must be non-empty. The result is `marker` followed by that remainder.
pub fn relay_command(text: &str, prefix: &str, marker: &str) -> Option<String> {
    let body = text.trim().strip_prefix(prefix)?.trim();
    if body.is_empty() {
        return None;
    }
    Some(format!("{marker}{body}"))
}

pub struct UdpRelay {
    socket: UdpSocket,
    writer: SerialWriter,
    prefix: String,
    marker: String,
}

impl UdpRelay {
    pub async fn bind(config: &RelayConfig, writer: SerialWriter) -> Result<Self> {
        let addr = config.socket_addr();
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|e| anyhow!("Failed to bind UDP relay on {}: {}", addr, e))?;
        Ok(Self {
            socket,
            writer,
            prefix: config.prefix.clone(),
            marker: config.marker.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve datagrams until the socket fails. Per-datagram problems never end the
    /// loop.
    pub async fn run(self) -> Result<()> {
        info!("UDP relay listening on {}", self.local_addr()?);
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = self
                .socket
                .recv_from(&mut buf)
                .await
                .map_err(|e| anyhow!("UDP relay receive failed: {}", e))?;
            self.handle_datagram(&buf[..len], peer).await;
        }
    }

    async fn handle_datagram(&self, data: &[u8], peer: SocketAddr) {
        metrics::inc_datagrams_received();
        let text = String::from_utf8_lossy(data);
        let Some(command) = relay_command(&text, &self.prefix, &self.marker) else {
            metrics::inc_datagrams_ignored();
            debug!("Ignoring datagram from {}: {}", peer, preview(&text, 80));
            return;
        };

        // the serial write blocks; keep it off the async workers
        let writer = self.writer.clone();
        let line = command.clone();
        let outcome = tokio::task::spawn_blocking(move || writer.write_line(&line)).await;
        match outcome {
            Ok(Ok(())) => {
                metrics::inc_commands_relayed();
                info!("Relayed to MeshCom from UDP {}: {}", peer, preview(&command, 200));
            }
            Ok(Err(e)) => {
                metrics::inc_relay_failures();
                warn!("Dropping relay command from {}: {}", peer, e);
            }
            Err(e) => {
                metrics::inc_relay_failures();
                warn!("Relay write task failed for {}: {}", peer, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::relay_command;

    #[test]
    fn prefixed_payload_becomes_command() {
        assert_eq!(
            relay_command("MSG_OUT:hello there", "MSG_OUT:", "::").as_deref(),
            Some("::hello there")
        );
    }

    #[test]
    fn whitespace_around_prefix_and_body_is_trimmed() {
        assert_eq!(
            relay_command("  MSG_OUT:  {123}ciao \r\n", "MSG_OUT:", "::").as_deref(),
            Some("::{123}ciao")
        );
    }

    #[test]
    fn non_matching_or_empty_payloads_are_ignored() {
        assert_eq!(relay_command("PING", "MSG_OUT:", "::"), None);
        assert_eq!(relay_command("MSG_OUT:", "MSG_OUT:", "::"), None);
        assert_eq!(relay_command("MSG_OUT:   ", "MSG_OUT:", "::"), None);
        assert_eq!(relay_command("msg_out:lowercase", "MSG_OUT:", "::"), None);
        assert_eq!(relay_command("", "MSG_OUT:", "::"), None);
    }

    #[test]
    fn prefix_and_marker_are_configurable() {
        assert_eq!(
            relay_command("TX>hi", "TX>", ":: ").as_deref(),
            Some(":: hi")
        );
    }
}
