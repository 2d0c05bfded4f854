//! Line multiplexer for workload output.
//!
//! Every source gets its own reader task, so a stalled stream never blocks
//! the others. Lines from one source keep their order; lines from different
//! sources interleave in arrival order. The merged stream ends only after
//! every reader has finished: a closer task joins all readers before it drops
//! the last sender.
//!
//! Lines longer than [`MAX_LINE_BYTES`] are split into several lines, so a
//! workload that never writes a newline cannot grow a reader's buffer without
//! bound.

use crate::drivers::OutputSource;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Lines buffered between readers and the consumer.
pub const LINE_BUFFER: usize = 64;

/// Longest line delivered in one piece.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// The merged line stream of several sources.
#[derive(Debug)]
pub struct MergedLines {
    rx: mpsc::Receiver<String>,
}

impl MergedLines {
    /// Next line from any source; `None` once every source is exhausted.
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Stream for MergedLines {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}

/// Merge `sources` into one line stream.
///
/// Must be called within a tokio runtime.
pub fn merge(sources: Vec<OutputSource>) -> MergedLines {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    let mut readers = JoinSet::new();

    for (index, source) in sources.into_iter().enumerate() {
        readers.spawn(read_lines(index, source, tx.clone()));
    }

    tokio::spawn(async move {
        while let Some(joined) = readers.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("output reader task failed: {}", e);
            }
        }
        drop(tx);
    });

    MergedLines { rx }
}

async fn read_lines(index: usize, source: OutputSource, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    let mut split = false;

    loop {
        buf.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
        match limited.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // The terminator of a line that was already split off
                let orphan_terminator = split && (buf == b"\n" || buf == b"\r\n");
                split = !buf.ends_with(b"\n") && buf.len() == MAX_LINE_BYTES;
                if orphan_terminator {
                    continue;
                }
                if tx.send(decode_line(&buf)).await.is_err() {
                    // Consumer gone; nothing left to deliver to
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(source = index, "output stream closed: {}", e);
                break;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let trimmed = raw.strip_suffix(b"\n").unwrap_or(raw);
    let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
    String::from_utf8_lossy(trimmed).into_owned()
}
