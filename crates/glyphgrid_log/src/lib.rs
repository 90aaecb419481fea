//! Logging setup for the `glyphgrid` binaries.
//!
//! * `trace`: spammy wire-level detail (individual frames).
//! * `debug`: things that might be useful when debugging a session.
//! * `info`: connect/disconnect, flush ticks, eviction.
//! * `warn`: recoverable problems (malformed frames, rejected edits).
//! * `error`: store failures, unrecoverable connection errors.

pub use tracing::{debug, error, info, trace, warn};

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

/// Installs a `tracing` subscriber that writes to stderr, honoring `RUST_LOG`.
///
/// `default_filter` is used when `RUST_LOG` is unset. Safe to call more than once;
/// only the first call takes effect.
pub fn init_stderr(default_filter: &str) {
    static START: Once = Once::new();
    let default_filter = default_filter.to_owned();
    START.call_once(move || {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    });
}

/// Installs a `tracing` subscriber that appends to `path`, honoring `RUST_LOG`.
pub fn init_file(path: &Path, default_filter: &str) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let file = Arc::new(Mutex::new(file));

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(move || SharedFile(file.clone()))
        .init();

    Ok(())
}

struct SharedFile(Arc<Mutex<std::fs::File>>);

impl io::Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log file mutex poisoned").write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().expect("log file mutex poisoned").flush()
    }
}
