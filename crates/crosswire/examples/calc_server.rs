//! TCP calculator server.
//!
//! Run the server with: `cargo run --example calc_server -p crosswire`
//! Then connect with a client (see the calc_client example).

use std::sync::Arc;

use crosswire::prelude::*;
use crosswire::server;
use tokio::net::TcpListener;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn std::error::Error>> {
    let router = Arc::new(
        CallbackRouter::builder()
            .endpoint("Calc", |e| {
                e.method("Add", |(a, b): (i32, i32)| async move {
                    println!("  Add({a}, {b}) called");
                    Ok(a + b)
                })
                .method("Multiply", |(a, b): (i32, i32)| async move {
                    println!("  Multiply({a}, {b}) called");
                    Ok(a * b)
                })
                .method("Divide", |(a, b): (i32, i32)| async move {
                    println!("  Divide({a}, {b}) called");
                    if b == 0 {
                        return Err(MethodError::new("MathError", "division by zero"));
                    }
                    Ok(a / b)
                })
            })
            .build(),
    );

    let addr = "127.0.0.1:9000";
    let listener = TcpListener::bind(addr).await?;
    println!("Calculator server listening on {addr}");

    server::serve_listener(listener, router).await?;
    Ok(())
}
