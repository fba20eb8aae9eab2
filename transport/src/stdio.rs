//! stdio transport: newline-delimited JSON-RPC on stdin/stdout.
//!
//! Every non-empty line is dispatched on its own task; a single writer task
//! owns the output half so response and notification frames never
//! interleave mid-line. Logs must go to stderr — this module never writes
//! anything to stdout that is not a frame.

use std::io;
use std::sync::Arc;

use minimcp_server::Message;
use minimcp_server::MiniMcp;
use minimcp_server::Reply;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::warn;

/// Size of the bounded channel feeding the stdout writer task.
const CHANNEL_CAPACITY: usize = 128;

/// Installs a `tracing` subscriber that writes to stderr, filtered by
/// `RUST_LOG`. stdout belongs to the protocol on this transport, so hosts
/// that have not configured logging themselves should call this before
/// [`run`]. A no-op when a subscriber is already set.
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Runs the transport over the process's stdin/stdout until EOF. The stdio
/// streams are process singletons; run this at most once per process.
pub async fn run(server: Arc<MiniMcp>) -> io::Result<()> {
    run_with_io(server, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Same transport over arbitrary streams, which is also what the tests use.
pub async fn run_with_io<R, W>(server: Arc<MiniMcp>, reader: R, writer: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (writer_tx, writer_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
    let writer_task = tokio::spawn(write_frames(writer, writer_rx));

    let tasks = TaskTracker::new();
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let server = server.clone();
                let writer_tx = writer_tx.clone();
                tasks.spawn(async move {
                    handle_line(server, writer_tx, line).await;
                });
            }
            Ok(None) => break,
            Err(err) => {
                error!("failed reading stdin: {err}");
                break;
            }
        }
    }

    tasks.close();
    tasks.wait().await;
    drop(writer_tx);

    debug!("stdin reader finished (EOF)");
    match writer_task.await {
        Ok(result) => result,
        Err(err) => Err(io::Error::other(err)),
    }
}

async fn handle_line(server: Arc<MiniMcp>, writer_tx: mpsc::Sender<Message>, line: String) {
    debug!("handling incoming message");

    let response = match server.handle(&line, Some(writer_tx.clone()), None).await {
        Ok(Reply::Message(message)) => Some(message),
        Ok(Reply::NoMessage) => None,
        Err(invalid) => Some(invalid.response),
    };

    if let Some(response) = response
        && writer_tx.send(response).await.is_err()
    {
        warn!("stdout writer is gone; dropping response");
    }
}

/// Owns the write half. Frames must not contain embedded newlines: that is
/// a protocol violation on this transport and terminates it.
async fn write_frames<W>(mut writer: W, mut writer_rx: mpsc::Receiver<Message>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = writer_rx.recv().await {
        if frame.contains('\n') || frame.contains('\r') {
            error!("refusing to write frame with embedded newline");
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "messages must not contain embedded newlines",
            ));
        }
        writer.write_all(frame.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    debug!("stdout writer exited (channel closed)");
    Ok(())
}
