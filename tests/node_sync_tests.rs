//! End-to-end tests over real TCP sockets on the loopback interface.

use networkchain::network::codec::TxPayload;
use networkchain::{
    send_message, Ledger, Message, NodeEvent, Protocol, Server, TcpTransport, Transaction,
};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

struct TestNode {
    addr: String,
    protocol: Arc<Protocol>,
    events: Receiver<NodeEvent>,
}

fn start(bootstrap: Option<&str>) -> TestNode {
    let server = Server::bind("127.0.0.1:0")
        .unwrap()
        .with_read_timeout(Some(Duration::from_secs(5)));
    let addr = server.local_addr().unwrap().to_string();
    let bootstrap = bootstrap.unwrap_or(&addr).to_string();

    let (tx, rx) = mpsc::channel();
    let protocol = Arc::new(
        Protocol::new(
            &addr,
            &bootstrap,
            Ledger::new(),
            Arc::new(TcpTransport::default()),
        )
        .with_events(tx),
    );
    server.spawn(Arc::clone(&protocol));
    TestNode {
        addr,
        protocol,
        events: rx,
    }
}

#[test]
fn test_new_node_pulls_longer_chain() {
    let a = start(None);
    for i in 0..3u8 {
        a.protocol.ledger().add_block(vec![i]).unwrap();
    }
    let b = start(Some(&a.addr));

    b.protocol.bootstrap();
    assert!(wait_until(|| a.protocol.peers().contains(&b.addr)));

    // A shorter peer never triggers a push, so A announces itself
    a.protocol.send_version(&b.addr);

    assert!(wait_until(|| b.protocol.ledger().height() == 4));
    assert_eq!(b.protocol.ledger().blocks(), a.protocol.ledger().blocks());

    let added = b
        .events
        .try_iter()
        .filter(|event| matches!(event, NodeEvent::BlockAdded { .. }))
        .count();
    assert_eq!(added, 3);
}

#[test]
fn test_transactions_relayed_and_mined() {
    let a = start(None);
    let c = start(Some(&a.addr));

    c.protocol.bootstrap();
    assert!(wait_until(|| a.protocol.peers().contains(&c.addr)));

    // A wallet-style client that is not itself a node
    let transport = TcpTransport::default();
    for payload in [b"alice pays bob".as_slice(), b"bob pays carol".as_slice()] {
        let tx = Transaction::new(payload.to_vec());
        let message = Message::Tx(TxPayload {
            addr_from: "127.0.0.1:1".to_string(),
            transaction: tx.serialize().unwrap(),
        });
        send_message(&transport, &a.addr, &message).unwrap();
    }

    assert!(wait_until(|| c.protocol.ledger().height() == 2));
    assert!(wait_until(|| a.protocol.ledger().height() == 2));
    assert_eq!(a.protocol.ledger().tip(), c.protocol.ledger().tip());
    assert!(wait_until(|| a.protocol.ledger().mempool_len() == 0));

    let mined = c
        .events
        .try_iter()
        .find_map(|event| match event {
            NodeEvent::BlockMined { transactions, .. } => Some(transactions),
            _ => None,
        });
    assert_eq!(mined, Some(2));
}
