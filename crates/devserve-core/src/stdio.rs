use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Shared async sink that child output is teed into.
///
/// Defaults to the host's stdout/stderr; tests inject buffers to observe
/// what the supervisor forwarded.
pub struct OutputSink(Arc<Mutex<Box<dyn AsyncWrite + Unpin + Sync + Send>>>);

impl Clone for OutputSink {
    fn clone(&self) -> Self {
        OutputSink(self.0.clone())
    }
}

impl OutputSink {
    pub fn new(writer: Box<dyn AsyncWrite + Unpin + Sync + Send>) -> Self {
        OutputSink(Arc::new(Mutex::new(writer)))
    }

    /// Sink forwarding into the host's stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    /// Sink forwarding into the host's stderr.
    pub fn stderr() -> Self {
        Self::new(Box::new(tokio::io::stderr()))
    }

    /// Write one line, restoring the newline the line decoder consumed.
    pub async fn write_line(&self, line: &str) {
        let mut writer = self.0.lock().await;
        let _ = writer.write_all(line.as_bytes()).await;
        let _ = writer.write_all(b"\n").await;
        let _ = writer.flush().await;
    }

    /// Forward raw bytes unchanged.
    pub async fn write_bytes(&self, bytes: &[u8]) {
        let mut writer = self.0.lock().await;
        let _ = writer.write_all(bytes).await;
        let _ = writer.flush().await;
    }
}
