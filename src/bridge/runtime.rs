//! The stdin/stdout message loop.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{decode_frame, encode_frame, inbound_codec, outbound_codec};
use super::host::BridgeHost;
use super::protocol::{Inbound, Outbound};
use super::BridgeError;
use crate::github::SearchClient;
use crate::patrol::{Patrol, Request, Response, handle_request};

/// Serves the browser until it closes the connection or `shutdown` fires.
///
/// Requests and events each run on their own task, so a request that needs
/// host calls of its own never stalls the reader that delivers their
/// replies. On return every pending host call has failed with
/// `Disconnected` and `shutdown` is cancelled.
pub async fn serve<R, W, S>(
    reader: R,
    writer: W,
    patrol: Arc<Patrol<S, BridgeHost>>,
    outbound: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
) -> Result<(), BridgeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: SearchClient + 'static,
{
    let writer_task = tokio::spawn(write_frames(writer, outbound));
    let mut frames = FramedRead::new(reader, inbound_codec());

    let result = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break Ok(()),
            next = frames.next() => next,
        };
        match next {
            None => {
                info!("browser closed the connection");
                break Ok(());
            }
            Some(Err(e)) => break Err(BridgeError::Io(e)),
            Some(Ok(frame)) => dispatch(&patrol, &frame),
        }
    };

    patrol.host().disconnect();
    shutdown.cancel();
    writer_task.abort();
    result
}

fn dispatch<S>(patrol: &Arc<Patrol<S, BridgeHost>>, frame: &[u8])
where
    S: SearchClient + 'static,
{
    let inbound: Inbound = match decode_frame(frame) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(error = %e, "ignoring malformed frame");
            return;
        }
    };

    match inbound {
        Inbound::Reply {
            reply_to,
            result,
            error,
        } => {
            let outcome = match error {
                Some(err) => Err(err.into()),
                None => Ok(result),
            };
            patrol.host().resolve(reply_to, outcome);
        }

        Inbound::Request { id, message } => {
            let patrol = Arc::clone(patrol);
            let outbound = patrol.host().outbound();
            tokio::spawn(async move {
                let response = match serde_json::from_value::<Request>(message) {
                    Ok(request) => handle_request(&patrol, request).await,
                    Err(e) => {
                        debug!(error = %e, "unrecognised request");
                        Response::fail("Unknown message type")
                    }
                };
                if outbound
                    .send(Outbound::Response { id, response })
                    .await
                    .is_err()
                {
                    debug!("connection closed before the response was sent");
                }
            });
        }

        Inbound::Event { event } => {
            info!(?event, "browser event, starting a pass");
            patrol.spawn_poll();
        }
    }
}

async fn write_frames<W>(writer: W, mut outbound: mpsc::Receiver<Outbound>) -> Result<(), BridgeError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, outbound_codec());
    while let Some(frame) = outbound.recv().await {
        let bytes = match encode_frame(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "dropping outbound frame");
                // The UI is still waiting for an answer.
                let Outbound::Response { id, .. } = frame else {
                    continue;
                };
                let fallback = Outbound::Response {
                    id,
                    response: Response::fail("Response too large"),
                };
                encode_frame(&fallback)?
            }
        };
        sink.send(bytes).await?;
    }
    Ok(())
}
