use crate::config::Config;
use crate::core::Ledger;
use crate::error::{BlockchainError, Result};
use crate::network::protocol::Protocol;
use crate::network::transport::TcpTransport;
use crate::storage::SledStore;
use log::{error, info, warn};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// TCP listener feeding inbound connections to a [`Protocol`].
pub struct Server {
    listener: TcpListener,
    addr: String,
    read_timeout: Option<Duration>,
}

impl Server {
    /// Bind the listen address. Failure here is the only fatal node error.
    pub fn bind(addr: &str) -> Result<Server> {
        let listener = TcpListener::bind(addr).map_err(|e| BlockchainError::ListenFailure {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        info!("Server listening on {addr}");
        Ok(Server {
            listener,
            addr: addr.to_string(),
            read_timeout: None,
        })
    }

    /// Bound the wait for a peer's frame. Without one a silent peer holds its
    /// handler thread forever.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one handler thread per connection.
    pub fn run(self, protocol: Arc<Protocol>) -> Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };

                    let protocol = Arc::clone(&protocol);
                    let read_timeout = self.read_timeout;
                    thread::spawn(move || {
                        if let Err(e) =
                            Self::handle_connection(&protocol, stream, peer_addr, read_timeout)
                        {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection on {}: {e}", self.addr);
                }
            }
        }
        Ok(())
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self, protocol: Arc<Protocol>) -> JoinHandle<()> {
        thread::spawn(move || {
            if let Err(e) = self.run(protocol) {
                error!("Server stopped: {e}");
            }
        })
    }

    fn handle_connection(
        protocol: &Protocol,
        stream: TcpStream,
        peer_addr: SocketAddr,
        read_timeout: Option<Duration>,
    ) -> Result<()> {
        stream.set_read_timeout(read_timeout)?;
        info!("Accepted connection from {peer_addr}");

        let result = protocol.handle_stream(&stream);
        let _ = stream.shutdown(Shutdown::Both);
        result
    }
}

/// Open the ledger described by `config`, persisted under its data dir when one is set.
pub fn open_ledger(config: &Config) -> Result<Ledger> {
    match config.node_db_path() {
        Some(path) => {
            info!("Opening chain at {}", path.display());
            Ledger::open(Arc::new(SledStore::open(&path)?))
        }
        None => {
            warn!("No data dir configured, the chain lives in memory only");
            Ok(Ledger::new())
        }
    }
}

/// Start a node and serve until the process exits.
pub fn start_node(config: &Config) -> Result<()> {
    let ledger = open_ledger(config)?;
    let server = Server::bind(&config.node_address)?.with_read_timeout(config.read_timeout());

    let transport = Arc::new(TcpTransport::new(config.connect_timeout()));
    let protocol = Arc::new(Protocol::new(
        &config.node_address,
        &config.bootstrap_address,
        ledger,
        transport,
    ));
    info!(
        "Node {} starting with chain height {}",
        config.node_address,
        protocol.ledger().height()
    );

    protocol.bootstrap();
    server.run(protocol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::codec::{Message, Ping};
    use crate::network::events::NodeEvent;
    use crate::network::transport::Transport;
    use std::sync::mpsc;

    #[test]
    fn test_bind_failure_is_fatal() {
        let first = Server::bind("127.0.0.1:0").unwrap();
        let addr = first.local_addr().unwrap().to_string();

        let err = Server::bind(&addr).err().unwrap();
        assert!(matches!(err, BlockchainError::ListenFailure { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_garbage_connection_does_not_stop_server() {
        let server = Server::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::channel();
        let protocol = Arc::new(
            Protocol::new(&addr, &addr, Ledger::new(), Arc::new(TcpTransport::default()))
                .with_events(tx),
        );
        server.spawn(Arc::clone(&protocol));

        let transport = TcpTransport::default();
        transport.send(&addr, b"short").unwrap();

        // Pong goes to an address nobody listens on; only the event matters
        let ping = Message::Ping(Ping {
            addr_from: "127.0.0.1:1".to_string(),
            nonce: 3,
        });
        transport.send(&addr, &ping.encode().unwrap()).unwrap();
        let pong = Message::Pong(crate::network::codec::Pong {
            addr_from: "127.0.0.1:1".to_string(),
            nonce: 3,
        });
        transport.send(&addr, &pong.encode().unwrap()).unwrap();

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            event,
            NodeEvent::PongReceived {
                from: "127.0.0.1:1".to_string(),
                nonce: 3
            }
        );
    }

    #[test]
    fn test_open_ledger_in_memory_and_on_disk() {
        let config = Config::default();
        assert_eq!(open_ledger(&config).unwrap().height(), 1);

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            node_address: "localhost:3005".to_string(),
            data_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let ledger = open_ledger(&config).unwrap();
        ledger.add_block(b"kept".to_vec()).unwrap();
        drop(ledger);

        assert_eq!(open_ledger(&config).unwrap().height(), 2);
        assert!(dir.path().join("node_3005").exists());
    }
}
