//! CodeAtlas CLI
//!
//! Command-line interface for managing the CodeAtlas daemon and querying
//! the code graph.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codeatlas_core::IndexEvent;
use codeatlas_ipc::{IpcClient, Request, Response, ResponseData};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codeatlas")]
#[command(about = "CodeAtlas - a live structural graph of your source tree")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the CodeAtlas daemon
    Start {
        /// Run in foreground (for debugging)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the CodeAtlas daemon
    Stop,

    /// Show daemon status
    Status,

    /// Index a directory
    Index {
        /// Directory to index (default: current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Incrementally re-index the current root
    Refresh {
        /// Directory to refresh (default: the indexed root)
        path: Option<String>,
    },

    /// Watch the indexed root for changes
    Watch {
        /// Directory to watch (default: the indexed root)
        path: Option<String>,
    },

    /// Stop watching
    Unwatch,

    /// Search entities by name
    Search {
        /// Name or name fragment to search for
        term: String,

        /// Restrict to a node label (e.g. Function, Class)
        #[arg(short, long)]
        label: Vec<String>,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 25)]
        limit: usize,
    },

    /// Print the graph projection as JSON
    Graph {
        /// Root to project (default: the indexed root)
        path: Option<String>,
    },

    /// Print an indexed file's content
    Read {
        /// Root-relative file path
        path: String,
    },

    /// Check if daemon is running
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Simple logging for CLI
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt().with_target(false).init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { foreground } => cmd_start(foreground).await,
        Commands::Stop => cmd_stop().await,
        Commands::Status => cmd_status().await,
        Commands::Index { path } => cmd_index(&path).await,
        Commands::Refresh { path } => cmd_refresh(path.as_deref()).await,
        Commands::Watch { path } => cmd_watch(path.as_deref()).await,
        Commands::Unwatch => cmd_unwatch().await,
        Commands::Search { term, label, limit } => cmd_search(&term, label, limit).await,
        Commands::Graph { path } => cmd_graph(path.as_deref()).await,
        Commands::Read { path } => cmd_read(&path).await,
        Commands::Ping => cmd_ping().await,
    }
}

async fn cmd_start(foreground: bool) -> Result<()> {
    if foreground {
        println!("Starting CodeAtlas daemon in foreground...");
        println!("Press Ctrl+C to stop.");

        // Execute daemon directly
        let status = std::process::Command::new("codeatlas-daemon")
            .status()
            .context("Failed to start daemon. Is codeatlas-daemon in PATH?")?;

        if !status.success() {
            anyhow::bail!("Daemon exited with error");
        }
    } else {
        // Check if already running
        if IpcClient::new().is_daemon_running() {
            println!("CodeAtlas daemon is already running.");
            return Ok(());
        }

        // Start in background
        let child = std::process::Command::new("codeatlas-daemon")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .context("Failed to start daemon")?;

        println!("✓ CodeAtlas daemon started (PID: {})", child.id());
    }

    Ok(())
}

async fn cmd_stop() -> Result<()> {
    let client = IpcClient::new();

    if !client.is_daemon_running() {
        println!("CodeAtlas daemon is not running.");
        return Ok(());
    }

    match client.request(Request::Shutdown).await {
        Ok(Response::Ack) => {
            println!("✓ CodeAtlas daemon stopping...");

            // Wait a moment for cleanup
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;

            if !client.is_daemon_running() {
                println!("✓ Daemon stopped.");
            }
        }
        Ok(resp) => {
            println!("Unexpected response: {:?}", resp);
        }
        Err(e) => {
            println!("Failed to stop daemon: {}", e);
        }
    }

    Ok(())
}

async fn cmd_status() -> Result<()> {
    let client = IpcClient::new();

    if !client.is_daemon_running() {
        println!("CodeAtlas daemon is not running.");
        println!("\nStart with: codeatlas start");
        return Ok(());
    }

    match client.request(Request::Status).await {
        Ok(Response::Ok {
            data:
                Some(ResponseData::Status {
                    version,
                    uptime_secs,
                    root,
                    watching,
                    files,
                    nodes,
                    edges,
                }),
        }) => {
            println!("CodeAtlas Daemon v{}", version);
            println!();
            println!("  Status:     Running");
            println!("  Uptime:     {}", format_duration(uptime_secs));
            match root {
                Some(root) => println!("  Root:       {}", root.display()),
                None => println!("  Root:       (none indexed)"),
            }
            println!("  Watching:   {}", if watching { "yes" } else { "no" });
            println!();
            println!("  Files:      {}", files);
            println!("  Nodes:      {}", nodes);
            println!("  Edges:      {}", edges);
        }
        Ok(Response::Error { message, .. }) => {
            println!("Failed to get status: {}", message);
        }
        Ok(_) => {
            println!("Unexpected status response");
        }
        Err(e) => {
            println!("Failed to get status: {}", e);
        }
    }

    Ok(())
}

async fn cmd_index(path: &str) -> Result<()> {
    let root = PathBuf::from(path).canonicalize().context("Invalid path")?;

    let client = IpcClient::new();
    if !client.is_daemon_running() {
        println!("✗ Daemon not running. Start with: codeatlas start");
        return Ok(());
    }

    println!("Indexing {}", root.display());
    run_indexing(Request::IndexDirectory { path: root }).await
}

async fn cmd_refresh(path: Option<&str>) -> Result<()> {
    let client = IpcClient::new();
    if !client.is_daemon_running() {
        println!("✗ Daemon not running. Start with: codeatlas start");
        return Ok(());
    }

    let path = match path {
        Some(p) => Some(PathBuf::from(p).canonicalize().context("Invalid path")?),
        None => None,
    };
    run_indexing(Request::RefreshDirectory { path }).await
}

/// Send an indexing request while streaming progress events, then print
/// the run summary.
async fn run_indexing(request: Request) -> Result<()> {
    let subscription = IpcClient::new().subscribe().await.ok();

    let request_task = tokio::spawn(async move { IpcClient::new().request(request).await });

    if let Some(mut subscription) = subscription {
        let mut request_task = request_task;
        loop {
            tokio::select! {
                result = &mut request_task => {
                    print_index_response(result?)?;
                    return Ok(());
                }
                frame = subscription.next_event() => {
                    match frame {
                        Ok(Some(frame)) => print_event(&frame.event),
                        // Stream ended; fall back to waiting on the response.
                        _ => {
                            print_index_response(request_task.await?)?;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    print_index_response(request_task.await?)?;
    Ok(())
}

fn print_event(event: &IndexEvent) {
    match event {
        IndexEvent::Progress { message } => println!("  {}", message),
        IndexEvent::Warning { kind, message } => println!("  ⚠ [{}] {}", kind, message),
        IndexEvent::Fatal { kind, message } => println!("  ✗ [{}] {}", kind, message),
        IndexEvent::Complete { .. } => {}
    }
}

fn print_index_response(
    response: std::result::Result<Response, codeatlas_ipc::IpcError>,
) -> Result<()> {
    match response {
        Ok(Response::Ok {
            data: Some(ResponseData::Summary { summary }),
        }) => {
            println!();
            println!(
                "✓ Done: {} indexed, {} unchanged, {} deleted, {} failed ({} entities)",
                summary.files_indexed,
                summary.files_unchanged,
                summary.files_deleted,
                summary.files_failed,
                summary.entities
            );
        }
        Ok(Response::Error { message, .. }) => {
            println!("✗ Indexing failed: {}", message);
        }
        Ok(_) => {
            println!("✗ Unexpected response");
        }
        Err(e) => {
            println!("✗ Error: {}", e);
        }
    }
    Ok(())
}

async fn cmd_watch(path: Option<&str>) -> Result<()> {
    let client = IpcClient::new();
    if !client.is_daemon_running() {
        println!("✗ Daemon not running. Start with: codeatlas start");
        return Ok(());
    }

    let path = match path {
        Some(p) => Some(PathBuf::from(p).canonicalize().context("Invalid path")?),
        None => None,
    };

    match client.request(Request::StartWatching { path }).await {
        Ok(Response::Ack) => println!("✓ Watching for changes"),
        Ok(Response::Error { message, .. }) => println!("✗ Watch failed: {}", message),
        Ok(_) => println!("✗ Unexpected response"),
        Err(e) => println!("✗ Error: {}", e),
    }

    Ok(())
}

async fn cmd_unwatch() -> Result<()> {
    let client = IpcClient::new();
    if !client.is_daemon_running() {
        println!("✗ Daemon not running");
        return Ok(());
    }

    match client.request(Request::StopWatching).await {
        Ok(Response::Ack) => println!("✓ Stopped watching"),
        Ok(_) => println!("✗ Unexpected response"),
        Err(e) => println!("✗ Error: {}", e),
    }

    Ok(())
}

async fn cmd_search(term: &str, labels: Vec<String>, limit: usize) -> Result<()> {
    let client = IpcClient::new();
    if !client.is_daemon_running() {
        println!("✗ Daemon not running");
        return Ok(());
    }

    let labels = if labels.is_empty() { None } else { Some(labels) };
    match client
        .request(Request::Search {
            term: term.to_string(),
            labels,
            limit,
        })
        .await
    {
        Ok(Response::Ok {
            data: Some(ResponseData::SearchResults { hits }),
        }) => {
            if hits.is_empty() {
                println!("No matches for '{}'", term);
                return Ok(());
            }
            for hit in hits {
                match hit.start_line {
                    Some(line) => {
                        println!("{:<10} {}  {}:{}", hit.kind, hit.name, hit.path, line)
                    }
                    None => println!("{:<10} {}  {}", hit.kind, hit.name, hit.path),
                }
            }
        }
        Ok(Response::Error { message, .. }) => println!("✗ Search failed: {}", message),
        Ok(_) => println!("✗ Unexpected response"),
        Err(e) => println!("✗ Error: {}", e),
    }

    Ok(())
}

async fn cmd_graph(path: Option<&str>) -> Result<()> {
    let client = IpcClient::new();
    if !client.is_daemon_running() {
        println!("✗ Daemon not running");
        return Ok(());
    }

    let path = match path {
        Some(p) => Some(PathBuf::from(p).canonicalize().context("Invalid path")?),
        None => None,
    };
    match client.request(Request::GetGraph { path }).await {
        Ok(Response::Ok {
            data: Some(ResponseData::Graph { graph }),
        }) => {
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Ok(Response::Error { message, .. }) => println!("✗ Failed to load graph: {}", message),
        Ok(_) => println!("✗ Unexpected response"),
        Err(e) => println!("✗ Error: {}", e),
    }

    Ok(())
}

async fn cmd_read(path: &str) -> Result<()> {
    let client = IpcClient::new();
    if !client.is_daemon_running() {
        println!("✗ Daemon not running");
        return Ok(());
    }

    match client
        .request(Request::ReadFileContent {
            path: path.to_string(),
        })
        .await
    {
        Ok(Response::Ok {
            data: Some(ResponseData::FileContent { content, .. }),
        }) => {
            print!("{}", content);
        }
        Ok(Response::Error { message, .. }) => println!("✗ {}", message),
        Ok(_) => println!("✗ Unexpected response"),
        Err(e) => println!("✗ Error: {}", e),
    }

    Ok(())
}

async fn cmd_ping() -> Result<()> {
    let client = IpcClient::new();

    if !client.is_daemon_running() {
        println!("✗ Daemon not running");
        return Ok(());
    }

    let start = std::time::Instant::now();
    match client.request(Request::Ping).await {
        Ok(Response::Ok {
            data: Some(ResponseData::Pong { .. }),
        }) => {
            let elapsed = start.elapsed();
            println!("✓ Pong! ({:.2}ms)", elapsed.as_secs_f64() * 1000.0);
        }
        Ok(_) => {
            println!("✗ Unexpected response");
        }
        Err(e) => {
            println!("✗ Error: {}", e);
        }
    }

    Ok(())
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}
