//! Unidirectional byte relay

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Per-read buffer size. Kept small on purpose: larger buffers change the
/// segment timing profile the fragmentation relies on.
pub const RELAY_BUFFER_SIZE: usize = 1024;

/// Copy bytes from `from` to `to` until EOF, an I/O error, or an idle
/// deadline expiry. `timeout_ms == 0` disables the deadline. Returns the
/// total number of bytes copied on clean EOF.
///
/// Each read is individually bounded by the deadline, so a tunnel that keeps
/// moving data never times out; only a silent peer does.
pub async fn relay<R, W>(mut from: R, mut to: W, timeout_ms: u64) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = if timeout_ms > 0 {
            match timeout(Duration::from_millis(timeout_ms), from.read(&mut buf)).await {
                Ok(read) => read?,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "idle read deadline expired",
                    ))
                }
            }
        } else {
            from.read(&mut buf).await?
        };

        if n == 0 {
            return Ok(total);
        }

        to.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}
