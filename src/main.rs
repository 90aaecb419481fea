//! CLI entry point: `glyphgrid server <dbfile> [port]` and `glyphgrid client
//! <address> [port [logfile]]`. This binary is ambient plumbing around the core
//! (spec.md §1 scopes the terminal UI, input, and CLI parsing out of the core);
//! it exists to give the library crates a runnable shape.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use glyphgrid_log::info;
use glyphgrid_server::Server;
use glyphgrid_store::PersistentPool;

const DEFAULT_PORT: u16 = 8000;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the authoritative server, persisting to `dbfile`.
    Server {
        dbfile: PathBuf,
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Connect to a running server.
    Client {
        address: String,
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Write logs here instead of stderr, so they don't collide with a terminal UI.
        logfile: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::Server { dbfile, port } => run_server(dbfile, port).await,
        Command::Client {
            address,
            port,
            logfile,
        } => run_client(address, port, logfile).await,
    }
}

async fn run_server(dbfile: PathBuf, port: u16) -> anyhow::Result<()> {
    glyphgrid_log::init_stderr("info");

    let pool = Arc::new(PersistentPool::open(&dbfile)?);
    let server = Server::bind(port).await?;

    tokio::select! {
        result = server.serve(pool.clone()) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    // Clean shutdown sequence (spec.md §5): final save, then empty-row GC.
    pool.save_changes().await?;
    pool.remove_empty().await?;
    Ok(())
}

async fn run_client(address: String, port: u16, logfile: Option<PathBuf>) -> anyhow::Result<()> {
    match &logfile {
        Some(path) => glyphgrid_log::init_file(path, "info")?,
        None => glyphgrid_log::init_stderr("info"),
    }

    let (redraw_tx, _redraw_rx) = tokio::sync::watch::channel(());
    let (_pool, _connection) = glyphgrid_client::Connection::connect(&address, port, redraw_tx).await?;

    // The terminal UI, input loop, and viewport scrolling that would normally drive
    // the pool from here are out of scope for the core (spec.md §1); this binary
    // just keeps the connection alive until asked to exit.
    tokio::signal::ctrl_c().await?;
    Ok(())
}
