use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Makes the error loggable as a `tracing` field with its full source chain.
#[must_use]
pub fn tracing_err<'a, E: std::error::Error + 'static>(err: &'a E) -> impl tracing::Value + 'a {
    err as &dyn std::error::Error
}

pub(crate) fn tracing_duration(duration: Duration) -> impl tracing::Value {
    tracing::field::display(TracingDuration(duration))
}

pub(crate) fn tracing_path(path: &Path) -> impl tracing::Value + '_ {
    tracing::field::display(path.display())
}

struct TracingDuration(Duration);

impl fmt::Display for TracingDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2?}", self.0)
    }
}
