use crate::error::{BlockchainError, Result};
use log::debug;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default dial/write timeout for outbound sends.
pub const TCP_WRITE_TIMEOUT: u64 = 5000;

/// Dial-and-write delivery of a single framed message.
pub trait Transport: Send + Sync {
    fn send(&self, addr: &str, frame: &[u8]) -> Result<()>;
}

/// One TCP connection per message: connect, write the frame, close the write
/// half so the receiver sees end-of-stream.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(TCP_WRITE_TIMEOUT))
    }
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn unreachable(addr: &str, reason: impl ToString) -> BlockchainError {
        BlockchainError::PeerUnreachable {
            addr: addr.to_string(),
            reason: reason.to_string(),
        }
    }

    fn connect(&self, addr: &str) -> Result<TcpStream> {
        let candidates = addr
            .to_socket_addrs()
            .map_err(|e| Self::unreachable(addr, e))?;

        let mut last_error = None;
        for socket_addr in candidates {
            match TcpStream::connect_timeout(&socket_addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) => Self::unreachable(addr, e),
            None => Self::unreachable(addr, "address did not resolve"),
        })
    }
}

impl Transport for TcpTransport {
    fn send(&self, addr: &str, frame: &[u8]) -> Result<()> {
        let mut stream = self.connect(addr)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| Self::unreachable(addr, e))?;
        stream
            .write_all(frame)
            .map_err(|e| Self::unreachable(addr, e))?;
        stream.flush().map_err(|e| Self::unreachable(addr, e))?;
        let _ = stream.shutdown(Shutdown::Write);
        debug!("Wrote {} bytes to {addr}", frame.len());
        Ok(())
    }
}

/// Read one whole frame: the sender closes its write half after the frame.
pub fn read_frame<R: Read>(mut stream: R) -> Result<Vec<u8>> {
    let mut frame = Vec::new();
    stream.read_to_end(&mut frame)?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_frame_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let reader = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            read_frame(stream).unwrap()
        });

        TcpTransport::default().send(&addr, b"framed bytes").unwrap();
        assert_eq!(reader.join().unwrap(), b"framed bytes".to_vec());
    }

    #[test]
    fn test_dead_peer_is_unreachable() {
        // Bind then drop to get a port nobody is listening on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let result = TcpTransport::new(Duration::from_millis(500)).send(&addr, b"x");
        assert!(matches!(
            result,
            Err(BlockchainError::PeerUnreachable { .. })
        ));
    }
}
