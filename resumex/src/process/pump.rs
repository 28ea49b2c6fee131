//! Line pumps copying child output to the session log and the console.

use std::io::Write;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// Log file shared by both pumps; the lock keeps lines whole.
pub type SharedLog = Arc<Mutex<File>>;

/// Which child stream a pump is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl OutputStream {
    /// Prefix written in front of every logged line.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stdout => "[STDOUT]",
            Self::Stderr => "[STDERR]",
        }
    }

    fn echo(self, line: &str) {
        // Console errors (e.g. a closed pipe) must not stop logging.
        let _ = match self {
            Self::Stdout => writeln!(std::io::stdout().lock(), "{line}"),
            Self::Stderr => writeln!(std::io::stderr().lock(), "{line}"),
        };
    }
}

/// Spawn a task pumping `reader` until end of stream.
pub fn spawn_pump<R>(reader: R, stream: OutputStream, log: SharedLog) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut log_failed = false;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(stream = stream.label(), error = %e, "error reading child output");
                    break;
                }
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);

            if !log_failed {
                if let Err(e) = append_line(&log, stream, line).await {
                    warn!(stream = stream.label(), error = %e, "failed to write session log");
                    log_failed = true;
                }
            }

            stream.echo(line);
        }
    })
}

async fn append_line(log: &SharedLog, stream: OutputStream, line: &str) -> std::io::Result<()> {
    let entry = format!("{} {line}\n", stream.label());
    let mut file = log.lock().await;
    file.write_all(entry.as_bytes()).await?;
    file.flush().await
}
