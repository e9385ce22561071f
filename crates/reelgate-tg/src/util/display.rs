use std::time::Duration;

pub(crate) fn human_size(bytes: impl humansize::ToF64 + humansize::Unsigned) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Formats the duration as `{hours}h {minutes}m`, dropping the seconds.
pub(crate) fn hours_minutes(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    format!("{}h {}m", minutes / 60, minutes % 60)
}
