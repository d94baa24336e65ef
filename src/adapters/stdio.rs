//! Line-delimited JSON bus transport.
//!
//! Each line is one message. Inbound lines are either a framed message
//! (`{"key": ..., "source": ..., "value": {...}}`) or a bare request body.
//! Outbound messages are always framed and stamped with the producer id, so
//! a bridge that loops output back into input does not feed the orchestrator
//! its own notices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{BusError, EventSink, EventSource, InboundMessage};
use crate::domain::MessageKey;

/// One framed message on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    pub value: serde_json::Value,
}

/// Event source reading one message per line
pub struct LineSource<R> {
    lines: Mutex<Lines<BufReader<R>>>,
    subscribed: AtomicBool,
    closed: AtomicBool,
    exhausted: AtomicBool,
}

impl LineSource<tokio::io::Stdin> {
    /// Read messages from standard input
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: Mutex::new(BufReader::new(reader).lines()),
            subscribed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            exhausted: AtomicBool::new(false),
        }
    }
}

/// Split a line into a message, unwrapping the frame when there is one
fn parse_line(line: &str) -> InboundMessage {
    let framed = serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .filter(|v| v.get("value").is_some())
        .and_then(|v| serde_json::from_value::<Frame>(v).ok());

    match framed {
        Some(frame) => InboundMessage {
            key: frame.key,
            source: frame.source,
            payload: frame.value.to_string().into_bytes(),
        },
        // Undecodable lines are passed through; the processor reports them
        None => InboundMessage::new(line.as_bytes()),
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> EventSource for LineSource<R> {
    fn name(&self) -> &str {
        "lines"
    }

    async fn subscribe(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        self.subscribed.store(true, Ordering::SeqCst);
        info!("Line source subscribed");
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if !self.subscribed.load(Ordering::SeqCst) {
            return Err(BusError::Transport("poll before subscribe".to_string()));
        }
        if self.exhausted.load(Ordering::SeqCst) {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }

        let mut lines = self.lines.lock().await;
        match tokio::time::timeout(timeout, lines.next_line()).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(line))) if line.trim().is_empty() => Ok(None),
            Ok(Ok(Some(line))) => Ok(Some(parse_line(line.trim()))),
            Ok(Ok(None)) => {
                info!("Line source reached end of input");
                self.exhausted.store(true, Ordering::SeqCst);
                Ok(None)
            }
            Ok(Err(e)) => Err(BusError::Io(e)),
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Line source closed");
        }
        Ok(())
    }
}

/// Event sink writing one framed message per line
pub struct LineSink<W> {
    writer: Mutex<W>,
    producer_id: String,
}

impl LineSink<tokio::io::Stdout> {
    /// Write messages to standard output
    pub fn stdout(producer_id: impl Into<String>) -> Self {
        Self::new(tokio::io::stdout(), producer_id)
    }
}

impl<W: AsyncWrite + Unpin + Send> LineSink<W> {
    pub fn new(writer: W, producer_id: impl Into<String>) -> Self {
        Self {
            writer: Mutex::new(writer),
            producer_id: producer_id.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> EventSink for LineSink<W> {
    async fn produce(&self, key: MessageKey, value: &serde_json::Value) -> Result<(), BusError> {
        let frame = Frame {
            key: Some(key.as_str().to_string()),
            source: Some(self.producer_id.clone()),
            value: value.clone(),
        };
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;

        debug!(key = %key, "Message produced");
        Ok(())
    }
}
