//! Channel contract scenarios.
//!
//! Each scenario sets up one in-memory channel pair and checks a property
//! from the channel contract: correlation under concurrency, deterministic
//! timeout, cancellation isolation, disposal fail-all, unmatched-response
//! tolerance, and the dispatcher's error answers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crosswire_core::{
    CallOptions, CancellationRequest, CancellationToken, ConnectionError, Message, Request,
    Response, RpcError,
};

use crate::{TestError, arg, calc_router, linked_channels, parse, spawn};

/// N concurrent echo calls each resolve with their own payload, regardless
/// of arrival order.
pub async fn run_correlation_storm(calls: usize) -> Result<(), TestError> {
    let (caller, server) = linked_channels();
    server.set_router(Arc::new(calc_router()));
    spawn(&caller);
    spawn(&server);

    let mut handles = Vec::new();
    for i in 0..calls {
        let caller = caller.clone();
        handles.push(tokio::spawn(async move {
            let payload = format!("msg-{i}");
            let response = caller
                .call("Calc", "Echo", vec![arg(&payload)], CallOptions::default())
                .await?;
            let echoed: String = parse(&response)?;
            if echoed != payload {
                return Err(TestError::Assertion(format!(
                    "call {i} got {echoed:?}, expected {payload:?}"
                )));
            }
            Ok::<_, TestError>(())
        }));
    }

    for handle in handles {
        handle.await.expect("echo task panicked")?;
    }

    if caller.outstanding() != 0 {
        return Err(TestError::Assertion(format!(
            "{} calls still outstanding after the storm",
            caller.outstanding()
        )));
    }
    Ok(())
}

/// A call against a peer that never responds times out within a bounded
/// margin, and the channel remains usable for later calls.
pub async fn run_timeout_fires() -> Result<(), TestError> {
    let (caller, server) = linked_channels();
    server.set_router(Arc::new(calc_router()));
    spawn(&caller);
    spawn(&server);

    let started = Instant::now();
    let result = caller
        .call(
            "Calc",
            "Hang",
            vec![],
            CallOptions {
                timeout: Some(Duration::from_millis(50)),
                cancel: None,
            },
        )
        .await;
    let elapsed = started.elapsed();

    match result {
        Err(RpcError::Timeout) => {}
        other => {
            return Err(TestError::Assertion(format!(
                "expected timeout, got {other:?}"
            )));
        }
    }
    // Generous scheduling slack; the point is that it does not hang.
    if elapsed > Duration::from_secs(2) {
        return Err(TestError::Assertion(format!(
            "timeout took {elapsed:?} to fire"
        )));
    }
    if caller.outstanding() != 0 {
        return Err(TestError::Assertion(
            "timed-out call left a pending entry".into(),
        ));
    }

    // The channel must still be healthy.
    let response = caller
        .call(
            "Calc",
            "Add",
            vec![arg(&2), arg(&3)],
            CallOptions::default(),
        )
        .await?;
    let sum: i32 = parse(&response)?;
    if sum != 5 {
        return Err(TestError::Assertion(format!("Add returned {sum}")));
    }
    Ok(())
}

/// Canceling call A leaves concurrently outstanding call B untouched.
pub async fn run_cancel_leaves_sibling() -> Result<(), TestError> {
    let (caller, server) = linked_channels();
    server.set_router(Arc::new(calc_router()));
    spawn(&caller);
    spawn(&server);

    let token = CancellationToken::new();
    let hanging = {
        let caller = caller.clone();
        let token = token.clone();
        tokio::spawn(async move {
            caller
                .call(
                    "Calc",
                    "Hang",
                    vec![],
                    CallOptions {
                        timeout: None,
                        cancel: Some(token),
                    },
                )
                .await
        })
    };

    // Let the hanging call register and reach the peer.
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    match hanging.await.expect("hanging task panicked") {
        Err(RpcError::Canceled) => {}
        other => {
            return Err(TestError::Assertion(format!(
                "expected cancellation, got {other:?}"
            )));
        }
    }

    let response = caller
        .call(
            "Calc",
            "Add",
            vec![arg(&20), arg(&22)],
            CallOptions::default(),
        )
        .await?;
    let sum: i32 = parse(&response)?;
    if sum != 42 {
        return Err(TestError::Assertion(format!("sibling call returned {sum}")));
    }
    Ok(())
}

/// Disposal fails every outstanding call and empties the table.
pub async fn run_disposal_fails_all(calls: usize) -> Result<(), TestError> {
    let (caller, server) = linked_channels();
    server.set_router(Arc::new(calc_router()));
    spawn(&caller);
    spawn(&server);

    let mut handles = Vec::new();
    for _ in 0..calls {
        let caller = caller.clone();
        handles.push(tokio::spawn(async move {
            caller
                .call("Calc", "Hang", vec![], CallOptions::default())
                .await
        }));
    }

    // Wait until every call is registered in the table.
    let deadline = Instant::now() + Duration::from_secs(2);
    while caller.outstanding() < calls {
        if Instant::now() > deadline {
            return Err(TestError::Assertion(format!(
                "only {} of {calls} calls registered",
                caller.outstanding()
            )));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    caller.dispose().await;

    for handle in handles {
        match handle.await.expect("call task panicked") {
            Err(RpcError::Connection(ConnectionError::Closed)) => {}
            other => {
                return Err(TestError::Assertion(format!(
                    "expected connection loss, got {other:?}"
                )));
            }
        }
    }

    if caller.outstanding() != 0 {
        return Err(TestError::Assertion(
            "outstanding-call table not empty after dispose".into(),
        ));
    }
    if !caller.is_closed() {
        return Err(TestError::Assertion("channel not closed after dispose".into()));
    }
    Ok(())
}

/// A response with an unknown request id is dropped silently and the
/// channel keeps working. The peer here speaks the wire protocol directly.
pub async fn run_late_response_is_dropped() -> Result<(), TestError> {
    let (conn, peer) = crosswire_core::Connection::pair();
    let caller = crosswire_core::RpcChannel::new(conn);
    spawn(&caller);

    // Nothing is outstanding; this response matches no pending call.
    peer.send(&Message::Response(Response::success("999", "1")))
        .await?;

    // Answer the next real request by hand.
    let serving = tokio::spawn(async move {
        loop {
            match peer.recv().await {
                Ok(Some(Message::Request(request))) => {
                    let response = Response::success(request.id, "5");
                    let _ = peer.send(&Message::Response(response)).await;
                    break;
                }
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    });

    let response = caller
        .call(
            "Calc",
            "Add",
            vec![arg(&2), arg(&3)],
            CallOptions::default(),
        )
        .await?;
    serving.await.expect("peer task panicked");
    let sum: i32 = parse(&response)?;
    if sum != 5 {
        return Err(TestError::Assertion(format!("Add returned {sum}")));
    }
    Ok(())
}

/// A cancellation notice for an unknown invocation is ignored.
pub async fn run_unknown_cancellation_is_ignored() -> Result<(), TestError> {
    let (raw, server_conn) = crosswire_core::Connection::pair();
    let server = crosswire_core::RpcChannel::new(server_conn);
    server.set_router(Arc::new(calc_router()));
    spawn(&server);

    raw.send(&Message::Cancel(CancellationRequest {
        request_id: "404".into(),
    }))
    .await?;
    raw.send(&Message::Request(Request {
        id: "7".into(),
        endpoint: "Calc".into(),
        method_name: "Add".into(),
        parameters: vec![arg(&1), arg(&1)],
        timeout_seconds: 0.0,
    }))
    .await?;

    match raw.recv().await? {
        Some(Message::Response(response)) => {
            if response.request_id != "7" {
                return Err(TestError::Assertion(format!(
                    "response for wrong id {}",
                    response.request_id
                )));
            }
            let sum: i32 = parse(&response)?;
            if sum != 2 {
                return Err(TestError::Assertion(format!("Add returned {sum}")));
            }
        }
        other => {
            return Err(TestError::Assertion(format!(
                "expected a response, got {other:?}"
            )));
        }
    }
    Ok(())
}

/// Server-initiated request reaches the caller's registered callback and
/// the result comes back typed (the reverse-RPC direction).
pub async fn run_callback_round_trip() -> Result<(), TestError> {
    let (client, server) = linked_channels();
    let callbacks = crosswire_core::CallbackRouter::builder()
        .endpoint("Notify", |e| {
            e.method("Ping", |(): ()| async move { Ok("pong".to_string()) })
        })
        .build();
    client.set_router(Arc::new(callbacks));
    spawn(&client);
    spawn(&server);

    let response = server
        .call("Notify", "Ping", vec![], CallOptions::default())
        .await?;
    let answer: String = parse(&response)?;
    if answer != "pong" {
        return Err(TestError::Assertion(format!("callback returned {answer:?}")));
    }
    Ok(())
}

/// Unknown endpoint and unknown method produce error responses, never
/// hangs or crashes.
pub async fn run_unknown_targets_answer_with_errors() -> Result<(), TestError> {
    let (caller, server) = linked_channels();
    server.set_router(Arc::new(calc_router()));
    spawn(&caller);
    spawn(&server);

    let response = caller
        .call("Clock", "Now", vec![], CallOptions::default())
        .await?;
    let error = response
        .error
        .ok_or_else(|| TestError::Assertion("unknown endpoint did not error".into()))?;
    if error.type_name != "EndpointNotFoundError"
        || error.message != "no callback registered for endpoint Clock"
    {
        return Err(TestError::Assertion(format!(
            "unexpected endpoint error: {} / {}",
            error.type_name, error.message
        )));
    }

    let response = caller
        .call("Calc", "Sub", vec![], CallOptions::default())
        .await?;
    let error = response
        .error
        .ok_or_else(|| TestError::Assertion("unknown method did not error".into()))?;
    if error.type_name != "MissingMethodError" || !error.message.contains("Sub") {
        return Err(TestError::Assertion(format!(
            "unexpected method error: {} / {}",
            error.type_name, error.message
        )));
    }
    Ok(())
}
