//! Per-connection state machine: receive, frame, append, replay, close.
//!
//! Each accepted connection is served by one task running
//! [`handle_connection`]. The connection moves through three phases:
//!
//! 1. **Receiving**: read up to [`RECV_BUF_LEN`] bytes at a time and feed
//!    each chunk to the framer. Payload chunks are appended to the log
//!    verbatim; a chunk ending in the line terminator, a whole-chunk seek
//!    directive, or a peer half-close ends the phase.
//! 2. **Replaying**: stream the retained log back from byte offset zero,
//!    or from the offset a seek directive resolved to, until the log is
//!    exhausted.
//! 3. **Closing**: drop the socket. Connections are one-shot.
//!
//! Any socket, append, or seek failure terminates the connection without
//! retry; errors never propagate across connection boundaries.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::backend::LogBackend;
use crate::error::DeviceResult;
use crate::network::protocol::{classify_chunk, ChunkAction, SeekTo};

/// Socket receive/replay buffer size in bytes.
pub const RECV_BUF_LEN: usize = 1024;

/// Serves one client connection to completion, logging the outcome.
pub async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    backend: Arc<dyn LogBackend>,
) {
    if let Err(err) = serve(&mut socket, backend).await {
        warn!("connection from {} failed: {}", peer.ip(), err);
    }
    info!("Closed connection from {}", peer.ip());
}

#[derive(Debug, thiserror::Error)]
enum ServeError {
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
    #[error("log error: {0}")]
    Log(#[from] crate::error::DeviceError),
}

async fn serve(socket: &mut TcpStream, backend: Arc<dyn LogBackend>) -> Result<(), ServeError> {
    let seek = receive(socket, backend.as_ref()).await?;

    let mut cursor = match seek {
        Some(seek) => {
            let resolved = backend.seek_to(seek.write_cmd, seek.write_cmd_offset)?;
            debug!(
                "seek to record {} offset {} resolved to byte {}",
                seek.write_cmd, seek.write_cmd_offset, resolved
            );
            resolved
        }
        None => 0,
    };

    loop {
        let chunk = backend.read_at(cursor, RECV_BUF_LEN)?;
        if chunk.is_empty() {
            break;
        }
        socket.write_all(&chunk).await?;
        cursor += chunk.len();
    }

    Ok(())
}

/// Receiving phase: appends payload chunks until a terminator, a seek
/// directive, or the peer's half-close. Returns the directive, if one
/// arrived.
async fn receive(
    socket: &mut TcpStream,
    backend: &dyn LogBackend,
) -> Result<Option<SeekTo>, ServeError> {
    let mut buf = vec![0u8; RECV_BUF_LEN];
    loop {
        let received = socket.read(&mut buf).await?;
        if received == 0 {
            return Ok(None);
        }

        match classify_chunk(&buf[..received]) {
            ChunkAction::Seek(seek) => return Ok(Some(seek)),
            ChunkAction::Payload { terminated } => {
                append_all(backend, &buf[..received])?;
                if terminated {
                    return Ok(None);
                }
            }
        }
    }
}

fn append_all(backend: &dyn LogBackend, mut bytes: &[u8]) -> DeviceResult<()> {
    while !bytes.is_empty() {
        let written = backend.append(bytes)?;
        if written == 0 {
            // Nothing crossed into the log at all.
            return Err(crate::error::DeviceError::Fault);
        }
        bytes = &bytes[written..];
    }
    Ok(())
}
