//! Channel teardown paths: peer close, protocol violation, and requests
//! arriving before any router is bound.

use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crosswire_core::{
    CallOptions, Connection, ConnectionError, Message, Request, RpcChannel, RpcError,
};

fn spawn_run(channel: &RpcChannel) {
    let runner = channel.clone();
    tokio::spawn(async move { runner.run().await });
}

async fn wait_for_outstanding(channel: &RpcChannel, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while channel.outstanding() < count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "calls never registered"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn peer_close_fails_outstanding_calls() {
    let (conn, peer) = Connection::pair();
    let channel = RpcChannel::new(conn);
    spawn_run(&channel);

    let pending = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .call("Calc", "Add", vec![], CallOptions::default())
                .await
        })
    };
    wait_for_outstanding(&channel, 1).await;

    // The peer goes away without answering.
    peer.shutdown().await;

    match pending.await.unwrap() {
        Err(RpcError::Connection(ConnectionError::Closed)) => {}
        other => panic!("expected connection loss, got {other:?}"),
    }
    assert!(channel.is_closed());
    assert_eq!(channel.outstanding(), 0);
}

#[tokio::test]
async fn protocol_violation_tears_the_channel_down() {
    let (io, mut raw_peer) = tokio::io::duplex(4096);
    let channel = RpcChannel::new(Connection::new(io));
    spawn_run(&channel);

    let pending = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .call("Calc", "Add", vec![], CallOptions::default())
                .await
        })
    };
    wait_for_outstanding(&channel, 1).await;

    // Unknown frame kind 7 with a well-formed length prefix.
    raw_peer.write_all(&[7u8]).await.unwrap();
    raw_peer.write_all(&2u32.to_le_bytes()).await.unwrap();
    raw_peer.write_all(b"{}").await.unwrap();

    match pending.await.unwrap() {
        Err(RpcError::Connection(ConnectionError::Closed)) => {}
        other => panic!("expected connection loss, got {other:?}"),
    }
    assert!(channel.is_closed());
    assert_eq!(channel.outstanding(), 0);
}

#[tokio::test]
async fn requests_without_a_router_are_answered_with_an_error() {
    let (conn, peer) = Connection::pair();
    let channel = RpcChannel::new(conn);
    spawn_run(&channel);

    peer.send(&Message::Request(Request {
        id: "1".into(),
        endpoint: "Calc".into(),
        method_name: "Add".into(),
        parameters: vec![],
        timeout_seconds: 0.0,
    }))
    .await
    .unwrap();

    match peer.recv().await.unwrap().unwrap() {
        Message::Response(response) => {
            assert_eq!(response.request_id, "1");
            let error = response.error.expect("routerless request must error");
            assert_eq!(error.type_name, "EndpointNotFoundError");
        }
        other => panic!("expected a response, got {other:?}"),
    }
    // The channel itself stays healthy.
    assert!(!channel.is_closed());
}
