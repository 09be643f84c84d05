//! Bidirectional RPC scenarios.
//!
//! Both peers of one connection can call each other: the side that
//! originated the connection still serves its registered callbacks. These
//! scenarios cover the patterns that matter in practice: a plain echo, a
//! nested callback issued while serving a request, and repeated callbacks
//! from inside one handler.

use std::sync::Arc;

use crosswire_core::{CallOptions, CallbackRouter, MethodError};

use crate::{TestError, arg, linked_channels, parse, spawn};

/// Scenarios for bidirectional RPC testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidirectionalScenario {
    /// A calls B, B echoes back.
    SimpleEcho,

    /// A calls B; B calls back into A while serving the request.
    NestedCallback,

    /// A calls B; B calls back into A several times and combines results.
    MultipleNestedCallbacks,
}

/// Run a bidirectional RPC scenario, panicking on failure.
pub async fn run_bidirectional_scenario(scenario: BidirectionalScenario) {
    let result = match scenario {
        BidirectionalScenario::SimpleEcho => run_simple_echo().await,
        BidirectionalScenario::NestedCallback => run_nested_callback().await,
        BidirectionalScenario::MultipleNestedCallbacks => run_multiple_nested().await,
    };

    if let Err(e) = result {
        panic!("bidirectional scenario {scenario:?} failed: {e}");
    }
}

async fn run_simple_echo() -> Result<(), TestError> {
    let (a, b) = linked_channels();

    let echo = CallbackRouter::builder()
        .endpoint("Echo", |e| {
            e.method("Say", |(s,): (String,)| async move { Ok(s) })
        })
        .build();
    b.set_router(Arc::new(echo));
    spawn(&a);
    spawn(&b);

    let response = a
        .call(
            "Echo",
            "Say",
            vec![arg(&"hello".to_string())],
            CallOptions::default(),
        )
        .await?;
    let echoed: String = parse(&response)?;
    if echoed != "hello" {
        return Err(TestError::Assertion(format!(
            "expected echo 'hello', got {echoed:?}"
        )));
    }
    Ok(())
}

async fn run_nested_callback() -> Result<(), TestError> {
    let (a, b) = linked_channels();

    // A serves "Host.GetPrefix".
    let host = CallbackRouter::builder()
        .endpoint("Host", |e| {
            e.method("GetPrefix", |(): ()| async move { Ok("PREFIX:".to_string()) })
        })
        .build();
    a.set_router(Arc::new(host));

    // B serves "Fmt.Format": fetches A's prefix, then appends the input.
    let b_handle = b.clone();
    let fmt = CallbackRouter::builder()
        .endpoint("Fmt", move |e| {
            let channel = b_handle.clone();
            e.method("Format", move |(input,): (String,)| {
                let channel = channel.clone();
                async move {
                    let response = channel
                        .call("Host", "GetPrefix", vec![], CallOptions::default())
                        .await
                        .map_err(|e| {
                            MethodError::new("CallbackError", format!("callback failed: {e}"))
                        })?;
                    let prefix: String = parse(&response)
                        .map_err(|e| MethodError::new("CallbackError", e.to_string()))?;
                    Ok(format!("{prefix}{input}"))
                }
            })
        })
        .build();
    b.set_router(Arc::new(fmt));

    spawn(&a);
    spawn(&b);

    let response = a
        .call(
            "Fmt",
            "Format",
            vec![arg(&"test".to_string())],
            CallOptions::default(),
        )
        .await?;
    let formatted: String = parse(&response)?;
    if formatted != "PREFIX:test" {
        return Err(TestError::Assertion(format!(
            "expected 'PREFIX:test', got {formatted:?}"
        )));
    }
    Ok(())
}

async fn run_multiple_nested() -> Result<(), TestError> {
    let (a, b) = linked_channels();

    // A serves "Host.GetValue": returns "value_" + key.
    let host = CallbackRouter::builder()
        .endpoint("Host", |e| {
            e.method("GetValue", |(key,): (String,)| async move {
                Ok(format!("value_{key}"))
            })
        })
        .build();
    a.set_router(Arc::new(host));

    // B serves "Agg.Combine": calls A's GetValue for each key and joins.
    let b_handle = b.clone();
    let agg = CallbackRouter::builder()
        .endpoint("Agg", move |e| {
            let channel = b_handle.clone();
            e.method("Combine", move |(): ()| {
                let channel = channel.clone();
                async move {
                    let mut parts = Vec::new();
                    for key in ["a", "b", "c"] {
                        let response = channel
                            .call(
                                "Host",
                                "GetValue",
                                vec![arg(&key.to_string())],
                                CallOptions::default(),
                            )
                            .await
                            .map_err(|e| {
                                MethodError::new("CallbackError", format!("callback failed: {e}"))
                            })?;
                        let value: String = parse(&response)
                            .map_err(|e| MethodError::new("CallbackError", e.to_string()))?;
                        parts.push(value);
                    }
                    Ok(parts.join(","))
                }
            })
        })
        .build();
    b.set_router(Arc::new(agg));

    spawn(&a);
    spawn(&b);

    let response = a
        .call("Agg", "Combine", vec![], CallOptions::default())
        .await?;
    let combined: String = parse(&response)?;
    if combined != "value_a,value_b,value_c" {
        return Err(TestError::Assertion(format!(
            "expected 'value_a,value_b,value_c', got {combined:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simple_echo() {
        run_bidirectional_scenario(BidirectionalScenario::SimpleEcho).await;
    }

    #[tokio::test]
    async fn nested_callback() {
        run_bidirectional_scenario(BidirectionalScenario::NestedCallback).await;
    }

    #[tokio::test]
    async fn multiple_nested_callbacks() {
        run_bidirectional_scenario(BidirectionalScenario::MultipleNestedCallbacks).await;
    }
}
