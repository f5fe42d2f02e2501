//! JSON-RPC 2.0 multiplexer: id allocation, request/response correlation,
//! and notification dispatch over a [`Transport`].
//!
//! A single background task owns the transport's reader half for the
//! lifetime of the connection; everything else talks to it only through
//! `call`/`notify`/`close`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::oneshot;

use super::transport::{self, Transport, TransportError};

/// Errors a caller of [`Connection::call`]/[`Connection::notify`] can see.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("LSP error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("failed to marshal params: {0}")]
    Marshal(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Serialize)]
struct OutgoingRequest<'a> {
    jsonrpc: &'static str,
    id: i64,
    method: &'a str,
    params: Value,
}

#[derive(Serialize)]
struct OutgoingNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
}

#[derive(Serialize)]
struct OutgoingAck {
    jsonrpc: &'static str,
    id: Value,
    result: Option<()>,
}

#[derive(serde::Deserialize)]
struct IncomingError {
    code: i64,
    message: String,
}

/// A tagged envelope loose enough to classify any incoming frame before
/// committing to a stricter decode.
#[derive(serde::Deserialize)]
struct IncomingEnvelope {
    id: Option<Value>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    result: Value,
    error: Option<IncomingError>,
}

type NotificationSink = Box<dyn Fn(&str, Value) + Send + Sync>;
type PendingMap = SyncMutex<HashMap<i64, oneshot::Sender<Result<Value, ProtocolError>>>>;

struct Shared {
    pending: PendingMap,
    closed: AtomicBool,
}

/// Owns a [`Transport`] and multiplexes JSON-RPC traffic over it.
pub struct Connection {
    writer: Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Unpin + Send>>>,
    next_id: AtomicI64,
    shared: Arc<Shared>,
}

impl Connection {
    /// Consumes a transport, spawns the background reader task, and returns
    /// a multiplexer ready to `call`/`notify`. `on_notification` is invoked
    /// (on the reader task) for every server notification that isn't the
    /// reserved server-request acknowledgement.
    pub fn new<R, W>(transport: Transport<R, W>, on_notification: NotificationSink) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = transport.into_parts();
        let writer: Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Unpin + Send>>> =
            Arc::new(tokio::sync::Mutex::new(Box::new(writer.into_inner())));
        let shared = Arc::new(Shared {
            pending: SyncMutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(read_loop(
            reader,
            Arc::clone(&shared),
            Arc::clone(&writer),
            on_notification,
        ));

        Self {
            writer,
            next_id: AtomicI64::new(1),
            shared,
        }
    }

    /// Sends a request and awaits its response. Registers the pending slot
    /// before writing the frame so a response racing ahead of the write
    /// acknowledgement can never be missed.
    pub async fn call<P: Serialize>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Value, ProtocolError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ProtocolError::ConnectionClosed);
        }

        let params = serde_json::to_value(params)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);

        let request = OutgoingRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let body = serde_json::to_vec(&request)?;

        if let Err(e) = write_frame(&self.writer, &body).await {
            self.shared.pending.lock().remove(&id);
            return Err(e.into());
        }

        rx.await.unwrap_or(Err(ProtocolError::ConnectionClosed))
    }

    /// Sends a notification; no response is expected or awaited.
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<(), ProtocolError> {
        let params = serde_json::to_value(params)?;
        let notification = OutgoingNotification {
            jsonrpc: "2.0",
            method,
            params,
        };
        let body = serde_json::to_vec(&notification)?;
        write_frame(&self.writer, &body).await?;
        Ok(())
    }

    /// Marks the connection closed, failing every pending call with
    /// [`ProtocolError::ConnectionClosed`]. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending: Vec<_> = self.shared.pending.lock().drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(ProtocolError::ConnectionClosed));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

async fn write_frame(
    writer: &tokio::sync::Mutex<Box<dyn AsyncWrite + Unpin + Send>>,
    body: &[u8],
) -> Result<(), TransportError> {
    let mut guard = writer.lock().await;
    transport::write_message(&mut *guard, body).await
}

async fn read_loop<R>(
    mut reader: R,
    shared: Arc<Shared>,
    writer: Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Unpin + Send>>>,
    on_notification: NotificationSink,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        let frame = match transport::read_message(&mut reader).await {
            Ok(frame) => frame,
            Err(_) => break,
        };

        let envelope: IncomingEnvelope = match serde_json::from_slice(&frame) {
            Ok(e) => e,
            Err(_) => continue, // malformed frames are skipped, not fatal
        };

        match (envelope.method, envelope.id) {
            (Some(method), None) => {
                on_notification(&method, envelope.params);
            }
            (Some(_method), Some(id)) => {
                // Server-originated request: acknowledge with a null result
                // and otherwise discard (we implement no server-driven
                // requests beyond this best-effort reply).
                let ack = OutgoingAck {
                    jsonrpc: "2.0",
                    id,
                    result: None,
                };
                if let Ok(body) = serde_json::to_vec(&ack) {
                    let _ = write_frame(&writer, &body).await;
                }
            }
            (None, Some(id)) => {
                let id = match id.as_i64() {
                    Some(id) => id,
                    None => continue,
                };
                let slot = shared.pending.lock().remove(&id);
                if let Some(tx) = slot {
                    let result = if let Some(err) = envelope.error {
                        Err(ProtocolError::Rpc {
                            code: err.code,
                            message: err.message,
                        })
                    } else {
                        Ok(envelope.result)
                    };
                    let _ = tx.send(result);
                }
                // Unknown id: duplicate or late response, dropped silently.
            }
            (None, None) => {} // not a well-formed JSON-RPC message, ignore
        }
    }

    shared.closed.store(true, Ordering::SeqCst);
    let pending: Vec<_> = shared.pending.lock().drain().collect();
    for (_, tx) in pending {
        let _ = tx.send(Err(ProtocolError::ConnectionClosed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::transport::{read_message, write_message};
    use std::sync::Mutex as StdMutex;
    use tokio::io::BufReader;

    fn pair() -> (
        tokio::io::DuplexStream,
        tokio::io::DuplexStream,
    ) {
        tokio::io::duplex(8192)
    }

    #[tokio::test]
    async fn call_allocates_increasing_ids() {
        let (client_io, mut server_io) = pair();
        let (read_half, write_half) = tokio::io::split(client_io);
        let transport = Transport::new(BufReader::new(read_half), write_half);
        let conn = Connection::new(transport, Box::new(|_, _| {}));

        let conn = Arc::new(conn);
        let c1 = Arc::clone(&conn);
        let t1 = tokio::spawn(async move { c1.call("a", serde_json::json!({})).await });

        let mut server_reader = BufReader::new(&mut server_io);
        let frame = read_message(&mut server_reader).await.unwrap();
        let v: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(v["id"], 1);

        write_message(&mut server_io, br#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .await
            .unwrap();
        t1.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn out_of_order_responses_are_routed_correctly() {
        let (client_io, server_io) = pair();
        let (read_half, write_half) = tokio::io::split(client_io);
        let transport = Transport::new(BufReader::new(read_half), write_half);
        let conn = Arc::new(Connection::new(transport, Box::new(|_, _| {})));

        let (mut server_read, mut server_write) = tokio::io::split(server_io);
        let mut server_reader = BufReader::new(&mut server_read);

        let c1 = Arc::clone(&conn);
        let t1 = tokio::spawn(async move { c1.call("first", serde_json::json!({})).await });
        let _ = read_message(&mut server_reader).await.unwrap();

        let c2 = Arc::clone(&conn);
        let t2 = tokio::spawn(async move { c2.call("second", serde_json::json!({})).await });
        let _ = read_message(&mut server_reader).await.unwrap();

        // Reply to id 2 first, then id 1.
        write_message(&mut server_write, br#"{"jsonrpc":"2.0","id":2,"result":"second-result"}"#)
            .await
            .unwrap();
        write_message(&mut server_write, br#"{"jsonrpc":"2.0","id":1,"result":"first-result"}"#)
            .await
            .unwrap();

        assert_eq!(t1.await.unwrap().unwrap(), Value::from("first-result"));
        assert_eq!(t2.await.unwrap().unwrap(), Value::from("second-result"));
    }

    #[tokio::test]
    async fn transport_closed_fails_pending_and_future_calls() {
        let (client_io, server_io) = pair();
        let (read_half, write_half) = tokio::io::split(client_io);
        let transport = Transport::new(BufReader::new(read_half), write_half);
        let conn = Arc::new(Connection::new(transport, Box::new(|_, _| {})));

        let c1 = Arc::clone(&conn);
        let t1 = tokio::spawn(async move { c1.call("pending", serde_json::json!({})).await });

        // Give the reader task a chance to register, then drop the server
        // side entirely so the reader observes EOF.
        tokio::task::yield_now().await;
        drop(server_io);

        let err = t1.await.unwrap().unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));

        // Subsequent calls must also fail, without blocking.
        let err2 = conn.call("later", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err2, ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn call_after_explicit_close_fails_immediately() {
        let (client_io, _server_io) = pair();
        let (read_half, write_half) = tokio::io::split(client_io);
        let transport = Transport::new(BufReader::new(read_half), write_half);
        let conn = Connection::new(transport, Box::new(|_, _| {}));

        conn.close();

        let err = conn.call("later", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
        assert!(conn.shared.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn notifications_are_dispatched_to_the_sink() {
        let (client_io, mut server_io) = pair();
        let (read_half, write_half) = tokio::io::split(client_io);
        let transport = Transport::new(BufReader::new(read_half), write_half);

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let conn = Connection::new(
            transport,
            Box::new(move |method, params| {
                seen_clone.lock().unwrap().push((method.to_string(), params));
            }),
        );

        write_message(
            &mut server_io,
            br#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{"uri":"file:///x"}}"#,
        )
        .await
        .unwrap();

        // Give the reader task a moment to process the frame.
        for _ in 0..50 {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let captured = seen.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, "textDocument/publishDiagnostics");
        drop(conn);
    }
}
