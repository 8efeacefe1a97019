//! The command (request/reply) TCP endpoint.
//!
//! Each accepted connection serves one client.  Messages are self-framing:
//! the 24-byte header carries the payload length, so the read loop first
//! reads the header, then exactly the payload.  A message that decodes but
//! makes no sense is answered or dropped by the command handler; a message
//! that does not decode is dropped with a warning and the connection
//! continues.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use halremote_core::protocol::codec::{decode_message, encode_message_now};
use halremote_core::protocol::messages::HEADER_SIZE;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::application::service::{ServiceHandle, ServiceRequest};
use crate::infrastructure::network::EndpointError;

/// Binds the command listener and spawns the accept loop.
///
/// # Errors
///
/// Returns [`EndpointError::BindFailed`] if the address cannot be bound.
pub async fn start_command_endpoint(
    addr: SocketAddr,
    service: ServiceHandle,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, EndpointError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| EndpointError::BindFailed { addr, source })?;
    info!("command endpoint listening on {addr}");

    let handle = tokio::spawn(async move {
        while running.load(Ordering::Relaxed) {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "command client connected");
                            let service = service.clone();
                            tokio::spawn(handle_connection(stream, peer, service));
                        }
                        Err(e) => warn!("command accept failed: {e}"),
                    }
                }
                // Re-check the shutdown flag periodically.
                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            }
        }
        info!("command endpoint stopped");
    });
    Ok(handle)
}

/// Serves one command connection until EOF or a fatal I/O error.
async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, service: ServiceHandle) {
    let client = peer.to_string();

    loop {
        let mut header = [0u8; HEADER_SIZE];
        if let Err(e) = stream.read_exact(&mut header).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!(%client, "command read error: {e}");
            }
            break;
        }

        // Payload length is at bytes 4..8 (big-endian u32).
        let payload_len = u32::from_be_bytes(header[4..8].try_into().unwrap()) as usize;
        let mut message = header.to_vec();
        message.resize(HEADER_SIZE + payload_len, 0);
        if payload_len > 0 {
            if let Err(e) = stream.read_exact(&mut message[HEADER_SIZE..]).await {
                warn!(%client, "command payload read error: {e}");
                break;
            }
        }

        let decoded = match decode_message(&message) {
            Ok((decoded, _)) => decoded,
            Err(e) => {
                warn!(%client, "dropping undecodable command message: {e}");
                continue;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ServiceRequest::Command {
            client: client.clone(),
            message: decoded.message,
            reply: reply_tx,
        };
        if service.send(request).await.is_err() {
            // Service loop is gone; nothing left to serve.
            break;
        }

        match reply_rx.await {
            Ok(Some(reply)) => match encode_message_now(&reply, 0) {
                Ok(bytes) => {
                    if let Err(e) = stream.write_all(&bytes).await {
                        warn!(%client, "failed to send reply: {e}");
                        break;
                    }
                }
                Err(e) => warn!(%client, "failed to encode reply: {e}"),
            },
            Ok(None) => {} // no reply defined for this request
            Err(_) => break,
        }
    }

    debug!(%client, "command client disconnected");
}
