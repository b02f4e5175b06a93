//! Stdio transport - the harness speaks one JSON message per line.
//!
//! Protocol:
//! - The first message must be `init`; it fixes this node's id
//! - Messages before `init` are answered with error 11 (temporarily unavailable)
//! - A message whose `in_reply_to` matches an outstanding request completes it
//! - Everything else is routed on its own task, so slow handlers never block input
//! - All output goes through a single writer task, one line per message

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use ripple_protocols::{
    Body, Envelope, Error as ProtocolError, ErrorCode, MsgId, NodeId, Payload,
    Result as ProtocolResult, Transport,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::error::Result;
use crate::node::BroadcastNode;
use crate::router::Router;

/// Messages written to stdout, plus request/reply correlation.
pub struct StdioTransport {
    node_id: NodeId,
    next_msg_id: AtomicU64,
    pending: Mutex<HashMap<MsgId, oneshot::Sender<Payload>>>,
    outbound: mpsc::UnboundedSender<String>,
}

impl StdioTransport {
    fn new(node_id: NodeId, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            node_id,
            next_msg_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound,
        }
    }

    fn next_msg_id(&self) -> MsgId {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send `payload` to `dest` as the reply to message `in_reply_to`.
    pub fn reply_to(&self, dest: &str, in_reply_to: Option<MsgId>, payload: Payload) -> ProtocolResult<()> {
        let body = Body::new(payload)
            .with_msg_id(self.next_msg_id())
            .in_reply_to(in_reply_to);
        self.write(Envelope::new(self.node_id.clone(), dest, body))
    }

    fn write(&self, envelope: Envelope) -> ProtocolResult<()> {
        let line = envelope.to_line()?;
        self.outbound
            .send(line)
            .map_err(|_| ProtocolError::Transport("stdout writer closed".into()))
    }

    /// Hand a reply to whoever is waiting on `msg_id`.
    ///
    /// Gives the payload back if nobody is waiting (late or unsolicited reply).
    fn complete(&self, msg_id: MsgId, payload: Payload) -> Option<Payload> {
        let waiter = self.pending.lock().remove(&msg_id);
        match waiter {
            Some(tx) => {
                // The requester may have just timed out; that's fine.
                let _ = tx.send(payload);
                None
            }
            None => Some(payload),
        }
    }

    fn outstanding(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn send(&self, dest: &str, payload: Payload) -> ProtocolResult<()> {
        let body = Body::new(payload).with_msg_id(self.next_msg_id());
        self.write(Envelope::new(self.node_id.clone(), dest, body))
    }

    async fn request(&self, dest: &str, payload: Payload, timeout: Duration) -> ProtocolResult<Payload> {
        let msg_id = self.next_msg_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(msg_id, tx);

        let body = Body::new(payload).with_msg_id(msg_id);
        if let Err(e) = self.write(Envelope::new(self.node_id.clone(), dest, body)) {
            self.pending.lock().remove(&msg_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Payload::Error { code, text })) => Err(ProtocolError::Rejected { code, text }),
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ProtocolError::Transport("reply channel dropped".into())),
            Err(_) => {
                self.pending.lock().remove(&msg_id);
                Err(ProtocolError::Timeout(timeout))
            }
        }
    }
}

/// Run a node on the process's stdin/stdout until stdin closes.
pub async fn run(config: NodeConfig) -> Result<()> {
    serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), config).await
}

/// Run a node over arbitrary line-oriented input and output.
pub async fn serve<R, W>(input: R, output: W, config: NodeConfig) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound, lines_out) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if let Err(e) = write_lines(output, lines_out).await {
            error!("Stdout writer error: {}", e);
        }
    });

    let mut lines = input.lines();

    let Some((transport, router)) = handshake(&mut lines, &outbound, &config).await? else {
        info!("Input closed before init");
        return Ok(());
    };

    while let Some(line) = lines.next_line().await? {
        let Some(raw) = parse_envelope(&line) else {
            continue;
        };

        let msg_id = raw_msg_id(&raw);
        let body = match Body::from_value(raw.body) {
            Ok(body) => body,
            Err(e) => {
                reject(&outbound, &raw.dest, &raw.src, msg_id, &e);
                continue;
            }
        };

        let payload = match body.in_reply_to {
            Some(reply_to) => match transport.complete(reply_to, body.payload) {
                None => continue,
                Some(unclaimed) => unclaimed,
            },
            None => body.payload,
        };

        let src = raw.src;
        let transport = Arc::clone(&transport);
        let router = router.clone();
        tokio::spawn(async move {
            let reply = match router.handle(&src, payload).await {
                Ok(Some(reply)) => reply,
                Ok(None) => return,
                Err(e) => {
                    warn!(from = %src, "Request failed: {}", e);
                    Payload::from_error(&e)
                }
            };
            if let Err(e) = transport.reply_to(&src, msg_id, reply) {
                warn!(to = %src, "Failed to reply: {}", e);
            }
        });
    }

    info!(
        outstanding = transport.outstanding(),
        "Input closed, shutting down"
    );
    Ok(())
}

/// Wait for `init`, answer it, and build the node.
///
/// Returns `None` if input ends first.
async fn handshake<R>(
    lines: &mut Lines<R>,
    outbound: &mpsc::UnboundedSender<String>,
    config: &NodeConfig,
) -> Result<Option<(Arc<StdioTransport>, Router)>>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        let Some(raw) = parse_envelope(&line) else {
            continue;
        };

        let msg_id = raw_msg_id(&raw);
        let body = match Body::from_value(raw.body) {
            Ok(body) => body,
            Err(e) => {
                reject(outbound, &raw.dest, &raw.src, msg_id, &e);
                continue;
            }
        };

        let Payload::Init { node_id, node_ids } = body.payload else {
            write_error(
                outbound,
                &raw.dest,
                &raw.src,
                msg_id,
                ErrorCode::TemporarilyUnavailable,
                "node not initialized",
            );
            continue;
        };

        info!(node = %node_id, cluster = node_ids.len(), "Node initialized");

        let transport = Arc::new(StdioTransport::new(node_id, outbound.clone()));
        let node = BroadcastNode::start(transport.clone(), config);
        let router = Router::new(Arc::new(node));
        transport.reply_to(&raw.src, msg_id, Payload::InitOk)?;

        return Ok(Some((transport, router)));
    }

    Ok(None)
}

fn raw_msg_id(raw: &Envelope<serde_json::Value>) -> Option<MsgId> {
    raw.body.get("msg_id").and_then(serde_json::Value::as_u64)
}

fn parse_envelope(line: &str) -> Option<Envelope<serde_json::Value>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(envelope) => {
            debug!(line, "Received");
            Some(envelope)
        }
        Err(e) => {
            warn!(line, "Skipping undecodable line: {}", e);
            None
        }
    }
}

/// Answer an undecodable body that `sender` addressed to `node`.
fn reject(
    outbound: &mpsc::UnboundedSender<String>,
    node: &str,
    sender: &str,
    in_reply_to: Option<MsgId>,
    err: &ProtocolError,
) {
    warn!(from = sender, "Rejecting message: {}", err);
    write_error(outbound, node, sender, in_reply_to, err.code(), &err.to_string());
}

/// Send an `error` body from `node` back to `sender`.
fn write_error(
    outbound: &mpsc::UnboundedSender<String>,
    node: &str,
    sender: &str,
    in_reply_to: Option<MsgId>,
    code: ErrorCode,
    text: &str,
) {
    let body = Body::new(Payload::Error {
        code: code.as_u32(),
        text: text.to_string(),
    })
    .in_reply_to(in_reply_to);

    match Envelope::new(node, sender, body).to_line() {
        Ok(line) => {
            let _ = outbound.send(line);
        }
        Err(e) => error!("Failed to encode error reply: {}", e),
    }
}

async fn write_lines<W>(mut output: W, mut lines: mpsc::UnboundedReceiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        debug!(line = %line, "Sending");
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}
