//! Processing server loop
//!
//! Accepts gateway streams and drives one director session per stream.
//! Frames travel as newline-delimited JSON; the framing is deliberately
//! transport-local and everything semantic lives in [`crate::protocol`].

use std::sync::Arc;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::director::Director;
use crate::protocol::{ProcessingRequest, ProcessingResponse};

const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Accept gateway streams until `shutdown` fires
pub async fn run(
    listen_addr: &str,
    director: Arc<Director>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind processing address {listen_addr}"))?;
    info!(%listen_addr, "processing server listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutting down processing server");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, peer) = accepted.context("accept failed")?;
                debug!(%peer, "gateway stream opened");
                let director = Arc::clone(&director);
                let cancel = shutdown.child_token();
                tokio::spawn(handle_stream(socket, director, cancel));
            }
        }
    }
}

/// Drive one gateway stream to completion.
///
/// A surfaced director error turns into an immediate response and closes
/// the stream; the session's request context is still consulted for the
/// diagnostic log line.
async fn handle_stream(socket: TcpStream, director: Arc<Director>, cancel: CancellationToken) {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));
    let mut session = director.open_stream(cancel.clone());

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            next = framed.next() => match next {
                Some(Ok(line)) => line,
                Some(Err(error)) => {
                    warn!(%error, "frame decode failed");
                    break;
                }
                None => break,
            }
        };

        let frame: ProcessingRequest = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "malformed processing frame");
                break;
            }
        };

        match session.handle(frame).await {
            Ok(responses) => {
                let mut write_failed = false;
                for response in responses {
                    if send_response(&mut framed, &response).await.is_err() {
                        write_failed = true;
                        break;
                    }
                }
                if write_failed {
                    break;
                }
            }
            Err(err) => {
                let ctx = session.context();
                warn!(
                    request_id = %ctx.request_id,
                    model = %ctx.model,
                    criticality = %ctx.criticality,
                    error = %err,
                    "request failed"
                );
                let immediate = ProcessingResponse::ImmediateResponse {
                    status: err.status_code(),
                    body: err.to_string(),
                };
                let _ = send_response(&mut framed, &immediate).await;
                break;
            }
        }
    }

    // Tear down the session's predictor work along with the stream.
    cancel.cancel();
    debug!("gateway stream closed");
}

async fn send_response(
    framed: &mut Framed<TcpStream, LinesCodec>,
    response: &ProcessingResponse,
) -> anyhow::Result<()> {
    let encoded = serde_json::to_string(response).context("failed to encode response frame")?;
    if let Err(e) = framed.send(encoded).await {
        error!(error = %e, "failed to write response frame");
        anyhow::bail!("write failed: {e}");
    }
    Ok(())
}
