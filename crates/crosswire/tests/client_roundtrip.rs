//! End-to-end client/server round-trips over real TCP.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crosswire::prelude::*;
use crosswire::{CallOptions, server};

fn service_router() -> Arc<CallbackRouter> {
    Arc::new(
        CallbackRouter::builder()
            .endpoint("Calc", |e| {
                e.method("Add", |(a, b): (i32, i32)| async move { Ok(a + b) })
                    .method("Divide", |(a, b): (i32, i32)| async move {
                        if b == 0 {
                            return Err(MethodError::new("MathError", "division by zero"));
                        }
                        Ok(a / b)
                    })
            })
            .endpoint("Log", |e| {
                e.method("Line", |(_line,): (String,)| async move { Ok(()) })
            })
            .build(),
    )
}

async fn start_server() -> Address {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve_listener(listener, service_router()));
    Address::Tcp(addr.to_string())
}

#[tokio::test]
async fn add_round_trips_over_tcp() {
    let address = start_server().await;
    let pool = ConnectionPool::new(Arc::new(SocketConnector::new()));
    let calc = ServiceClient::builder("Calc", address)
        .default_timeout(Duration::from_secs(5))
        .build(&pool);

    let sum: i32 = calc.call("Add").arg(2).arg(3).send().await.unwrap();
    assert_eq!(sum, 5);

    pool.dispose().await;
}

#[tokio::test]
async fn repeated_calls_reuse_the_pooled_connection() {
    let address = start_server().await;
    let pool = ConnectionPool::new(Arc::new(SocketConnector::new()));
    let calc = ServiceClient::builder("Calc", address)
        .default_timeout(Duration::from_secs(5))
        .build(&pool);

    for i in 0..10i32 {
        let sum: i32 = calc.call("Add").arg(i).arg(1).send().await.unwrap();
        assert_eq!(sum, i + 1);
    }
    assert_eq!(pool.len(), 1);

    pool.dispose().await;
}

#[tokio::test]
async fn remote_failure_surfaces_as_typed_remote_error() {
    let address = start_server().await;
    let pool = ConnectionPool::new(Arc::new(SocketConnector::new()));
    let calc = ServiceClient::builder("Calc", address)
        .default_timeout(Duration::from_secs(5))
        .build(&pool);

    let err = calc
        .call("Divide")
        .arg(1)
        .arg(0)
        .send::<i32>()
        .await
        .unwrap_err();
    match err {
        RpcError::Remote(remote) => {
            assert_eq!(remote.type_name, "MathError");
            assert_eq!(remote.message, "division by zero");
        }
        other => panic!("expected RemoteError, got {other:?}"),
    }

    pool.dispose().await;
}

#[tokio::test]
async fn missing_method_names_the_method_in_the_error() {
    let address = start_server().await;
    let pool = ConnectionPool::new(Arc::new(SocketConnector::new()));
    let calc = ServiceClient::builder("Calc", address)
        .default_timeout(Duration::from_secs(5))
        .build(&pool);

    let err = calc.call("Cbrt").arg(27).send::<i32>().await.unwrap_err();
    match err {
        RpcError::Remote(remote) => {
            assert_eq!(remote.type_name, "MissingMethodError");
            assert!(remote.message.contains("Cbrt"));
        }
        other => panic!("expected RemoteError, got {other:?}"),
    }

    pool.dispose().await;
}

#[tokio::test]
async fn one_way_notification_resolves_on_write() {
    let address = start_server().await;
    let pool = ConnectionPool::new(Arc::new(SocketConnector::new()));
    let log = ServiceClient::builder("Log", address).build(&pool);

    log.call("Line")
        .arg("started".to_string())
        .notify()
        .await
        .unwrap();

    pool.dispose().await;
}

#[tokio::test]
async fn server_calls_back_into_the_client() {
    // Accept one connection by hand so the test can keep the server-side
    // channel handle for the reverse call.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (reverse_tx, reverse_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let channel = server::serve_connection(socket, service_router());

        let response = channel
            .call(
                "Progress",
                "Report",
                vec![serde_json::to_string(&40u32).unwrap()],
                CallOptions::default(),
            )
            .await
            .unwrap();
        let acknowledged: u32 =
            serde_json::from_str(response.data.as_deref().unwrap()).unwrap();
        reverse_tx.send(acknowledged).unwrap();
    });

    let progress = Arc::new(
        CallbackRouter::builder()
            .endpoint("Progress", |e| {
                e.method("Report", |(pct,): (u32,)| async move { Ok(pct + 2) })
            })
            .build(),
    );

    let pool = ConnectionPool::new(Arc::new(SocketConnector::new()));
    let calc = ServiceClient::builder("Calc", Address::Tcp(addr.to_string()))
        .callbacks(progress)
        .default_timeout(Duration::from_secs(5))
        .build(&pool);

    // Establish the connection (and advertise the callbacks) with one call.
    let sum: i32 = calc.call("Add").arg(1).arg(1).send().await.unwrap();
    assert_eq!(sum, 2);

    // The server-initiated request reached the client's router.
    let acknowledged = reverse_rx.await.unwrap();
    assert_eq!(acknowledged, 42);

    pool.dispose().await;
}
