//! TCP calculator client.
//!
//! First start the server: `cargo run --example calc_server -p crosswire`
//! Then run the client: `cargo run --example calc_client -p crosswire`

use std::sync::Arc;
use std::time::Duration;

use crosswire::prelude::*;

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
    let address = Address::Tcp("127.0.0.1:9000".into());
    println!("Calling {address}...");

    let pool = ConnectionPool::new(Arc::new(SocketConnector::new()));
    let calc = ServiceClient::builder("Calc", address)
        .default_timeout(Duration::from_secs(5))
        .build(&pool);

    let sum: i32 = calc.call("Add").arg(10).arg(20).send().await?;
    println!("Add(10, 20) = {sum}");

    let product: i32 = calc.call("Multiply").arg(6).arg(7).send().await?;
    println!("Multiply(6, 7) = {product}");

    match calc.call("Divide").arg(1).arg(0).send::<i32>().await {
        Err(RpcError::Remote(e)) => println!("Divide(1, 0) failed remotely: {e}"),
        other => println!("Divide(1, 0) returned {other:?}"),
    }

    pool.dispose().await;
    println!("Done!");
    Ok(())
}
