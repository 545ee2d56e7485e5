use tokio::io::{self, AsyncRead, AsyncReadExt};

const CHUNK: usize = 8 * 1024;

/// Capture one output stream of the process
///
/// Bytes beyond the limit are still read (so the writer never blocks on a
/// full pipe) but discarded, and the capture is marked as truncated.
#[derive(Debug, Default)]
pub struct Capture {
    buffer: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl Capture {
    pub fn new(limit: u64) -> Self {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Self {
            buffer: Vec::with_capacity(limit.min(CHUNK)),
            limit,
            truncated: false,
        }
    }
    /// read `reader` until EOF
    ///
    /// This method is cancellation safe, everything read before the future
    /// is dropped stays in the capture
    pub async fn drain<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> io::Result<()> {
        let mut chunk = [0; CHUNK];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            let room = self.limit.saturating_sub(self.buffer.len());
            if n > room {
                self.truncated = true;
            }
            self.buffer.extend_from_slice(&chunk[..n.min(room)]);
        }
    }
    pub fn truncated(&self) -> bool {
        self.truncated
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}
