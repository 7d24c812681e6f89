//! Simple SDK Example
//!
//! Demonstrates basic usage of the PyRunner SDK.
//!
//! # Usage
//!
//! 1. Start the daemon:
//!    ```bash
//!    cargo run --package pyrunner-daemon
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --example simple
//!    ```

use pyrunner_sdk::{PyRunnerClient, RunRequest};
use std::time::Duration;

const ASYNC_SCRIPT: &str = r#"
import asyncio

async def main():
    for i in range(3):
        print("tick", i, flush=True)
        await asyncio.sleep(0.5)
    with open("report.txt", "w") as f:
        f.write("done\n")
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("PyRunner SDK - Simple Example");
    println!("=============================\n");

    // 1. Connect to daemon
    println!("1. Connecting to daemon...");
    let client = PyRunnerClient::connect("http://127.0.0.1:9537").await?;
    println!("   ✓ Connected\n");

    // 2. Synchronous run
    println!("2. Running a script...");
    let result = client.run(RunRequest::new("print(sum(range(10)))")).await?;
    println!("   ✓ {:?} in {:.2}s", result.outcome, result.elapsed_seconds);
    println!("     stdout: {}", result.stdout.trim_end());

    // 3. A blocked import
    println!("3. Running a script that imports socket...");
    let result = client.run(RunRequest::new("import socket")).await?;
    println!("   ✓ {:?}: {}\n", result.outcome, result.stderr.trim_end());

    // 4. Background job with async code, restricted writes
    println!("4. Submitting a background job...");
    let job = client
        .submit(
            RunRequest::new(ASYNC_SCRIPT)
                .allow_async(true)
                .restrict_writes(true)
                // asyncio is on the default denylist
                .blocked_modules(["os", "subprocess", "socket"]),
        )
        .await?;
    println!("   ✓ Job {} submitted", job.job_id);

    let status = loop {
        let status = client.status(&job.job_id).await?;
        if status.state.is_terminal() {
            break status;
        }
        println!("     live: {:?}", status.stdout);
        tokio::time::sleep(Duration::from_millis(400)).await;
    };
    println!("   ✓ Job ended: {:?}\n", status.state);

    // 5. Download what it wrote
    if let Some(result) = status.result {
        println!("5. Files left by run {}:", result.run_id);
        for file in &result.files {
            let content = client.read_file(&result.run_id, &file.path).await?;
            println!(
                "     - {} ({} bytes): {:?}",
                file.path,
                file.size_bytes,
                String::from_utf8_lossy(&content)
            );
        }
    }

    println!("\n✓ Example completed successfully!");

    Ok(())
}
