//! WebSocket live update channel.
//!
//! [`WsLiveChannel`] opens one socket per in-flight job at
//! `<ws base>jobs/<id>/` and forwards every text frame, stamped with its
//! receipt instant, into a single [`LiveMessage`] stream. Frames for one job
//! arrive in the order the socket delivered them.
//!
//! Each subscription runs in its own task and is cancelled through a child
//! of the channel's [`CancellationToken`], so dropping the channel stops
//! every socket at once.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use vr180_core::{JobId, LiveChannel, LiveHandle, LiveMessage, LiveMessageKind};

use crate::config::ClientConfig;
use crate::reconnect::{Backoff, ReconnectConfig};

type JobSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens per-job WebSocket subscriptions.
pub struct WsLiveChannel {
    config: Arc<ClientConfig>,
    reconnect: ReconnectConfig,
    tx: mpsc::UnboundedSender<LiveMessage>,
    cancel: CancellationToken,
}

impl WsLiveChannel {
    /// Create a channel and the receiving end of its message stream.
    pub fn new(
        config: Arc<ClientConfig>,
        reconnect: ReconnectConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LiveMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            config,
            reconnect,
            tx,
            cancel: CancellationToken::new(),
        };
        (channel, rx)
    }

    /// Stop every subscription opened through this channel.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl LiveChannel for WsLiveChannel {
    type Handle = LiveSubscription;

    fn open(&self, job_id: &JobId) -> LiveSubscription {
        let cancel = self.cancel.child_token();
        let url = self.config.job_socket_url(job_id.as_str());

        let task = tokio::spawn(run_subscription(
            job_id.clone(),
            url,
            Backoff::new(self.reconnect.clone()),
            self.tx.clone(),
            cancel.clone(),
        ));

        LiveSubscription {
            cancel,
            task,
        }
    }
}

impl Drop for WsLiveChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Handle to one job's socket task.
#[derive(Debug)]
pub struct LiveSubscription {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LiveHandle for LiveSubscription {
    fn close(&mut self) {
        self.cancel.cancel();
    }

    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Subscription task
// ---------------------------------------------------------------------------

/// How a connected socket stopped delivering frames.
enum StreamEnd {
    Cancelled,
    ReceiverGone,
    Closed,
    Failed(String),
}

/// Connect, read until the socket ends, reconnect with backoff.
///
/// Emits `Closed` only when it gives up on its own; a cancelled
/// subscription ends silently.
async fn run_subscription(
    job_id: JobId,
    url: String,
    mut backoff: Backoff,
    tx: mpsc::UnboundedSender<LiveMessage>,
    cancel: CancellationToken,
) {
    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((mut ws, _response)) => {
                tracing::info!(job_id = %job_id, url = %url, "Live subscription connected");
                backoff.reset();
                if !emit(&tx, &job_id, LiveMessageKind::Opened) {
                    return;
                }

                match read_frames(&mut ws, &job_id, &tx, &cancel).await {
                    StreamEnd::Cancelled | StreamEnd::ReceiverGone => {
                        let _ = ws.close(None).await;
                        tracing::debug!(job_id = %job_id, "Live subscription stopped");
                        return;
                    }
                    StreamEnd::Closed => {}
                    StreamEnd::Failed(error) => {
                        if !emit(&tx, &job_id, LiveMessageKind::Error(error)) {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    attempt = backoff.attempts(),
                    error = %e,
                    "Live subscription connect failed",
                );
                if !emit(&tx, &job_id, LiveMessageKind::Error(e.to_string())) {
                    return;
                }
            }
        }

        if !backoff.wait(&cancel).await {
            if !cancel.is_cancelled() {
                tracing::warn!(
                    job_id = %job_id,
                    attempts = backoff.attempts(),
                    "Live subscription giving up",
                );
                emit(&tx, &job_id, LiveMessageKind::Closed);
            }
            return;
        }
        tracing::info!(job_id = %job_id, attempt = backoff.attempts(), "Reconnecting live subscription");
    }
}

/// Forward text frames until the socket ends or the subscription is
/// cancelled.
async fn read_frames(
    ws: &mut JobSocket,
    job_id: &JobId,
    tx: &mpsc::UnboundedSender<LiveMessage>,
    cancel: &CancellationToken,
) -> StreamEnd {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return StreamEnd::Cancelled,
            next = ws.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                tracing::trace!(job_id = %job_id, frame = %text, "Live frame");
                if !emit(tx, job_id, LiveMessageKind::Frame(text)) {
                    return StreamEnd::ReceiverGone;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!(job_id = %job_id, "Ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(job_id = %job_id, ?frame, "Live socket closed by server");
                return StreamEnd::Closed;
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::warn!(job_id = %job_id, error = %e, "Live socket receive error");
                return StreamEnd::Failed(e.to_string());
            }
            None => return StreamEnd::Closed,
        }
    }
}

/// Send one message; `false` once nobody is listening.
fn emit(tx: &mpsc::UnboundedSender<LiveMessage>, job_id: &JobId, kind: LiveMessageKind) -> bool {
    tx.send(LiveMessage::new(job_id.clone(), Utc::now(), kind))
        .is_ok()
}
