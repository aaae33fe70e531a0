//! The Ingestor stage (spec §4.1): connects to the upstream websocket
//! feed, parses each frame as a [`Message`], and forwards valid messages
//! onto a bounded channel — blocking (back-pressuring the feed) when the
//! channel is full. Malformed frames are logged and skipped; a clean
//! close is a normal shutdown signal, an abrupt close is reported but a
//! reconnect policy is left to the caller (spec §4.1 "wrapping the
//! ingestor in a retry loop without changing downstream stages").

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use threadline_core::metrics::Counters;
use threadline_core::types::Message;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

/// Why an ingest run ended — lets the caller decide whether to reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The feed sent a close frame; treat as a normal shutdown signal.
    CleanClose,
    /// The connection dropped unexpectedly (I/O error, reset, ...).
    AbruptClose,
    /// The downstream channel was dropped; this ingestor run should stop.
    DownstreamClosed,
    /// `shutdown` was signalled (SIGINT/SIGTERM); the feed was closed
    /// cleanly from our side rather than the upstream's.
    Cancelled,
}

/// Spawn the Ingestor as an independent task against `url`. `shutdown`
/// is watched for a cancellation request (spec §5): on signal, the
/// ingestor sends a close frame upstream and stops, letting shutdown
/// propagate downstream in the usual closed-channel order.
pub fn run_ingestor(
    url: String,
    channel_capacity: usize,
    counters: Arc<Counters>,
    shutdown: watch::Receiver<bool>,
) -> (mpsc::Receiver<Message>, tokio::task::JoinHandle<IngestOutcome>) {
    let (tx, rx) = mpsc::channel(channel_capacity);
    let handle = tokio::spawn(ingest_loop(url, tx, counters, shutdown));
    (rx, handle)
}

async fn ingest_loop(
    url: String,
    tx: mpsc::Sender<Message>,
    counters: Arc<Counters>,
    mut shutdown: watch::Receiver<bool>,
) -> IngestOutcome {
    info!(%url, "ingestor connecting");
    let (stream, _) = match connect_async(&url).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(%url, error = %e, "failed to connect to upstream feed");
            return IngestOutcome::AbruptClose;
        }
    };
    info!("ingestor connected");

    let (mut sink, mut incoming) = stream.split();

    loop {
        tokio::select! {
            frame = incoming.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match parse_frame(&text) {
                            Ok(msg) => {
                                counters.incoming_messages.fetch_add(1, Ordering::Relaxed);
                                if tx.send(msg).await.is_err() {
                                    debug!("valid-message channel closed, stopping ingestor");
                                    return IngestOutcome::DownstreamClosed;
                                }
                            }
                            Err(e) => {
                                warn!(raw = %text, error = %e, "malformed upstream frame, skipping");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("upstream sent close frame");
                        return IngestOutcome::CleanClose;
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary frames carry no Message payload.
                        continue;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "upstream connection error");
                        return IngestOutcome::AbruptClose;
                    }
                    None => {
                        info!("upstream stream ended without a close frame");
                        return IngestOutcome::AbruptClose;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("shutdown signalled, closing upstream feed");
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return IngestOutcome::Cancelled;
                }
            }
        }
    }
}

fn parse_frame(text: &str) -> Result<Message, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_frame() {
        let json = r#"{"seqid":1,"ts":"2026-01-01T00:00:00Z","user":"alice","message":"hi"}"#;
        let msg = parse_frame(json).unwrap();
        assert_eq!(msg.seqid, 1);
        assert_eq!(msg.text, "hi");
    }

    #[test]
    fn malformed_frame_is_an_error_not_a_panic() {
        let result = parse_frame("not json");
        assert!(result.is_err());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let json = r#"{"seqid":1,"user":"alice","message":"hi"}"#;
        let result = parse_frame(json);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn shutdown_signal_closes_feed_and_stops_ingestor() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("ws://{addr}");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (_sink, mut incoming) = ws.split();
            while let Some(Ok(frame)) = incoming.next().await {
                if frame.is_close() {
                    break;
                }
            }
        });

        let counters = Counters::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (_rx, handle) = run_ingestor(url, 8, counters.clone(), shutdown_rx);

        // give the client a moment to connect before signalling shutdown
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, IngestOutcome::Cancelled);
        server.await.unwrap();
    }
}
