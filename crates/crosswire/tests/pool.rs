//! Pool invariants: one physical connection per key, dead channels
//! replaced, unrelated keys connect independently.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crosswire::{Address, Connect, Connection, ConnectionKey, ConnectionPool, RpcError};
use crosswire_testkit::{calc_router, spawn};

/// Connector that counts physical connects and wires each new connection
/// to an in-memory calculator server.
struct CountingConnector {
    connects: AtomicUsize,
}

impl CountingConnector {
    fn new() -> Self {
        Self {
            connects: AtomicUsize::new(0),
        }
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connect for CountingConnector {
    fn connect<'a>(
        &'a self,
        _address: &'a Address,
    ) -> Pin<Box<dyn Future<Output = Result<Connection, RpcError>> + Send + 'a>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);

            let (client_conn, server_conn) = Connection::pair();
            let server = crosswire::RpcChannel::new(server_conn);
            server.set_router(Arc::new(calc_router()));
            spawn(&server);

            Ok(client_conn)
        })
    }
}

fn key(port: u16) -> ConnectionKey {
    ConnectionKey::new(Address::Tcp(format!("127.0.0.1:{port}")))
}

#[tokio::test]
async fn concurrent_acquisitions_share_one_physical_connection() {
    let connector = Arc::new(CountingConnector::new());
    let pool = ConnectionPool::new(connector.clone());
    let key = key(9000);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            pool.get_or_create(&key, None).await.unwrap()
        }));
    }

    let mut channels = Vec::new();
    for handle in handles {
        channels.push(handle.await.unwrap());
    }

    assert_eq!(connector.connects(), 1);
    // Every caller got the same live channel.
    for channel in &channels {
        assert!(!channel.is_closed());
    }
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn dead_channel_is_replaced_on_next_acquisition() {
    let connector = Arc::new(CountingConnector::new());
    let pool = ConnectionPool::new(connector.clone());
    let key = key(9001);

    let first = pool.get_or_create(&key, None).await.unwrap();
    assert_eq!(connector.connects(), 1);

    first.dispose().await;
    assert!(first.is_closed());

    let second = pool.get_or_create(&key, None).await.unwrap();
    assert_eq!(connector.connects(), 2);
    assert!(!second.is_closed());
}

#[tokio::test]
async fn distinct_keys_get_distinct_connections() {
    let connector = Arc::new(CountingConnector::new());
    let pool = ConnectionPool::new(connector.clone());

    pool.get_or_create(&key(9002), None).await.unwrap();
    pool.get_or_create(&key(9003), None).await.unwrap();
    // Same address, different identity: still a distinct key.
    pool.get_or_create(&key(9002).with_identity("svc"), None)
        .await
        .unwrap();

    assert_eq!(connector.connects(), 3);
    assert_eq!(pool.len(), 3);
}

#[tokio::test]
async fn dispose_tears_down_every_pooled_channel() {
    let connector = Arc::new(CountingConnector::new());
    let pool = ConnectionPool::new(connector.clone());

    let a = pool.get_or_create(&key(9004), None).await.unwrap();
    let b = pool.get_or_create(&key(9005), None).await.unwrap();

    pool.dispose().await;
    assert!(a.is_closed());
    assert!(b.is_closed());
    assert!(pool.is_empty());
}
