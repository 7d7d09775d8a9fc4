use std::net::SocketAddr;
use std::sync::Arc;

use forkrpc_common::transport::{encode_frame, Framer};
use forkrpc_common::{ForkrpcError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;

/// Bytes requested from the socket per read
const READ_CHUNK: usize = 8 * 1024;

/// Serves one client connection until the peer closes it.
///
/// Bytes are fed through a [`Framer`] as they arrive, so a request may be
/// split across reads or share a read with the next one. Requests are answered
/// in order, one reply each.
///
/// Handlers run on the blocking pool, so a slow call only holds up its own
/// connection. The next request on the same connection waits for the reply.
///
/// # Errors
///
/// Returns an error if the socket fails or the peer announces a payload above
/// `max_frame_len`. Either way the connection is finished.
pub async fn serve_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    max_frame_len: usize,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!(peer = %peer, "Connection opened");

    let mut framer = Framer::with_max_frame_len(max_frame_len);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if framer.buffered_len() > 0 {
                debug!(peer = %peer, pending = framer.buffered_len(), "Peer closed mid-message");
            }
            info!(peer = %peer, "Connection closed");
            return Ok(());
        }

        framer.push(&chunk[..n]);
        while let Some(payload) = framer.next_frame()? {
            let dispatcher = dispatcher.clone();
            let reply = tokio::task::spawn_blocking(move || dispatcher.dispatch(&payload))
                .await
                .map_err(|e| ForkrpcError::Io(std::io::Error::other(e)))?;
            stream.write_all(&encode_frame(&reply)?).await?;
        }
        stream.flush().await?;
    }
}
