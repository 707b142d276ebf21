//! Server command implementation

use anyhow::Result;
use steady_core::BehaviorEngine;

pub async fn cmd_serve(engine: BehaviorEngine, host: &str, port: u16) -> Result<()> {
    println!("🚀 Starting Steady API server...");
    println!("   Listening: http://{}:{}", host, port);
    println!(
        "   Retries per write: {}",
        engine.config().max_write_retries
    );
    println!();
    println!("   Press Ctrl+C to stop");

    steady_server::serve(engine, host, port).await
}
