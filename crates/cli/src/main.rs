//! PyRunner CLI - Command-line interface for the PyRunner daemon

use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9537";
const DEFAULT_TIMEOUT_SECS: u64 = 8;
const MIN_TIMEOUT_SECS: u64 = 2;
const MAX_TIMEOUT_SECS: u64 = 60;

#[derive(Parser)]
#[command(name = "pyrunner")]
#[command(about = "Run Python snippets through the PyRunner daemon", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, global = true, env = "PYRUNNER_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script (FILE, or stdin when omitted or "-")
    Run {
        file: Option<PathBuf>,

        /// Wall-clock limit in seconds (2-60)
        #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout: u64,

        /// Clamp --timeout into range instead of letting the daemon reject it
        #[arg(long)]
        clamp_timeout: bool,

        /// Allow top-level await and drive a coroutine left by the script
        #[arg(long = "async")]
        allow_async: bool,

        /// Block writes outside the run's scratch directory
        #[arg(long)]
        restrict_writes: bool,

        /// Module to reject in the import pre-check (repeatable; replaces the default list)
        #[arg(long = "block", value_name = "MODULE")]
        block: Vec<String>,

        /// Disable the import pre-check entirely
        #[arg(long, conflicts_with = "block")]
        no_denylist: bool,

        /// Submit as a background job and print its ID
        #[arg(long)]
        background: bool,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a background job (live output while it runs)
    Status {
        job_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Cancel a background job
    Cancel { job_id: String },

    /// List files a run left in its scratch directory
    Files { run_id: String },

    /// Download one file from a run's scratch directory
    Download {
        run_id: String,
        path: String,

        /// Output path ("-" for stdout); defaults to the file's name
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run only the import pre-check
    Check {
        file: Option<PathBuf>,

        #[arg(long = "block", value_name = "MODULE")]
        block: Vec<String>,
    },

    /// Show daemon statistics
    Stats,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize)]
struct ScratchFile {
    path: String,
    size_bytes: u64,
}

#[derive(Deserialize)]
struct RunResult {
    run_id: String,
    outcome: String,
    stdout: String,
    stderr: String,
    elapsed_seconds: f64,
    timed_out: bool,
    exit_code: Option<i32>,
    truncated: bool,
    files: Vec<ScratchFile>,
}

#[derive(Tabled)]
struct FileRow {
    path: String,
    size_bytes: u64,
}

#[derive(Tabled)]
struct JobRow {
    job_id: String,
    state: String,
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

/// Script source from a file, or stdin for `None` / `-`
fn read_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display())),
        _ => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("Cannot read script from stdin")?;
            Ok(source)
        }
    }
}

fn effective_timeout(timeout: u64, clamp: bool) -> u64 {
    if clamp {
        timeout.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
    } else {
        timeout
    }
}

/// `None` lets the daemon apply its default denylist
fn blocked_modules(block: Vec<String>, no_denylist: bool) -> Option<Vec<String>> {
    if no_denylist {
        Some(Vec::new())
    } else if block.is_empty() {
        None
    } else {
        Some(block)
    }
}

fn print_result(result: &RunResult) {
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    let _ = std::io::stdout().flush();

    let outcome = match result.outcome.as_str() {
        "COMPLETED" => result.outcome.green().bold(),
        "TIMED_OUT" => result.outcome.yellow().bold(),
        _ => result.outcome.red().bold(),
    };
    eprintln!();
    eprintln!(
        "{} {} in {:.2}s (run {}{})",
        "●".bold(),
        outcome,
        result.elapsed_seconds,
        result.run_id,
        result
            .exit_code
            .map(|code| format!(", exit {}", code))
            .unwrap_or_default()
    );
    if result.timed_out {
        eprintln!("  {}", "Interpreter was killed at the deadline".yellow());
    }
    if result.truncated {
        eprintln!("  {}", "Output was truncated".yellow());
    }
    if !result.files.is_empty() {
        let rows: Vec<FileRow> = result
            .files
            .iter()
            .map(|f| FileRow {
                path: f.path.clone(),
                size_bytes: f.size_bytes,
            })
            .collect();
        eprintln!("{}", Table::new(rows));
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            timeout,
            clamp_timeout,
            allow_async,
            restrict_writes,
            block,
            no_denylist,
            background,
            json,
        } => {
            let source = read_source(file.as_deref())?;
            let mut params = json!({
                "source_code": source,
                "timeout_seconds": effective_timeout(timeout, clamp_timeout),
                "allow_async": allow_async,
                "restrict_writes": restrict_writes,
            });
            if let Some(modules) = blocked_modules(block, no_denylist) {
                params["blocked_modules"] = json!(modules);
            }

            if background {
                let submitted = call_rpc(&cli.rpc_url, "exec.submit.v1", params).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&submitted)?);
                } else {
                    println!("{}", "✓ Job submitted".green().bold());
                    let row = JobRow {
                        job_id: submitted["job_id"].as_str().unwrap_or_default().to_string(),
                        state: submitted["state"].as_str().unwrap_or_default().to_string(),
                    };
                    println!("{}", Table::new(vec![row]));
                }
                return Ok(ExitCode::SUCCESS);
            }

            let value = call_rpc(&cli.rpc_url, "exec.run.v1", params).await?;
            let result: RunResult =
                serde_json::from_value(value.clone()).context("Unexpected run result")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_result(&result);
            }

            if result.outcome == "COMPLETED" {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Status { job_id, json } => {
            let status = call_rpc(&cli.rpc_url, "exec.status.v1", json!({ "job_id": job_id })).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(ExitCode::SUCCESS);
            }

            let row = JobRow {
                job_id: job_id.clone(),
                state: status["state"].as_str().unwrap_or_default().to_string(),
            };
            println!("{}", Table::new(vec![row]));

            match status.get("result").filter(|r| !r.is_null()) {
                Some(result) => {
                    let result: RunResult = serde_json::from_value(result.clone())
                        .context("Unexpected run result")?;
                    print_result(&result);
                }
                None => {
                    print!("{}", status["stdout"].as_str().unwrap_or_default());
                    eprint!("{}", status["stderr"].as_str().unwrap_or_default());
                    if let Some(error) = status["error"].as_str() {
                        eprintln!("{} {}", "Error:".red().bold(), error);
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Cancel { job_id } => {
            let result = call_rpc(&cli.rpc_url, "exec.cancel.v1", json!({ "job_id": job_id })).await?;
            if result["cancelled"].as_bool().unwrap_or(false) {
                println!("{}", format!("✓ Job {} cancelled", job_id).green().bold());
            } else {
                println!("{}", format!("○ Job {} had already finished", job_id).yellow());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Files { run_id } => {
            let result = call_rpc(&cli.rpc_url, "files.list.v1", json!({ "run_id": run_id })).await?;
            let files: Vec<ScratchFile> = serde_json::from_value(result["files"].clone())?;
            if files.is_empty() {
                println!("{}", "No files".yellow());
            } else {
                let rows: Vec<FileRow> = files
                    .into_iter()
                    .map(|f| FileRow {
                        path: f.path,
                        size_bytes: f.size_bytes,
                    })
                    .collect();
                println!("{}", Table::new(rows));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Download {
            run_id,
            path,
            output,
        } => {
            let result = call_rpc(
                &cli.rpc_url,
                "files.read.v1",
                json!({ "run_id": run_id, "path": path }),
            )
            .await?;
            let encoded = result["content_base64"]
                .as_str()
                .context("Missing file content")?;
            let content = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .context("Invalid base64 content")?;

            let output = output.unwrap_or_else(|| {
                Path::new(&path)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(&path))
            });
            if output == Path::new("-") {
                std::io::stdout().write_all(&content)?;
            } else {
                std::fs::write(&output, &content)
                    .with_context(|| format!("Cannot write {}", output.display()))?;
                eprintln!(
                    "{}",
                    format!("✓ {} bytes written to {}", content.len(), output.display()).green()
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Check { file, block } => {
            let source = read_source(file.as_deref())?;
            let mut params = json!({ "source_code": source });
            if !block.is_empty() {
                params["blocked_modules"] = json!(block);
            }

            let result = call_rpc(&cli.rpc_url, "policy.check.v1", params).await?;
            if result["allowed"].as_bool().unwrap_or(false) {
                println!("{}", "✓ No blocked imports found".green().bold());
                Ok(ExitCode::SUCCESS)
            } else {
                println!(
                    "{} {}",
                    "✗".red().bold(),
                    result["message"].as_str().unwrap_or("Blocked import found")
                );
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Stats => {
            println!("{}", "PyRunner Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Version:".bold(), stats["version"]);
                    println!();
                    println!("  {} {}", "Runs started:".bold(), stats["runs_started"]);
                    println!("  {} {}", "Free run slots:".bold(), stats["available_run_slots"]);
                    println!("  {} {}", "Jobs running:".bold(), stats["jobs"]["running"]);
                    println!("  {} {}", "Jobs finished:".bold(), stats["jobs"]["finished"]);
                    println!("  {} {}", "Jobs failed:".bold(), stats["jobs"]["failed"]);
                    println!("  {} {}", "Jobs cancelled:".bold(), stats["jobs"]["cancelled"]);
                    println!();
                    println!(
                        "  {} {:.1}%",
                        "CPU:".bold(),
                        stats["cpu_usage_percent"].as_f64().unwrap_or(0.0)
                    );
                    println!(
                        "  {} {} / {} MB",
                        "Memory:".bold(),
                        stats["memory_used_mb"],
                        stats["memory_total_mb"]
                    );
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
