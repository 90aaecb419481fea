//! Helpers for error handling shared across the server and client.

/// Format an error, including its chain of sources.
///
/// Always use this when displaying an error to a human.
pub fn format(error: impl AsRef<dyn std::error::Error>) -> String {
    fn format_impl(error: &dyn std::error::Error) -> String {
        let mut string = error.to_string();
        for source in std::iter::successors(error.source(), |error| error.source()) {
            string.push_str(" -> ");
            string.push_str(&source.to_string());
        }
        string
    }

    format_impl(error.as_ref())
}

/// Errors that represent a misuse of the chunk pool contract rather than external failure.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// `load(single)` was called on a pool specialization that only supports batched loads.
    #[error("load() of a single position is unsupported on this pool; use load_list()")]
    UnsupportedSingleLoad,
}

pub trait ResultExt<T> {
    /// Logs a warning if there is an `Err`, but only logs the exact same message once.
    fn warn_on_err_once(self, msg: impl std::fmt::Display) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn warn_on_err_once(self, msg: impl std::fmt::Display) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("{msg}: {err}");
                None
            }
        }
    }
}
