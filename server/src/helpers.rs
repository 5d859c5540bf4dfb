//! Small shared helpers.

/// Log a line prefixed with the acting mob's oid.
#[macro_export]
macro_rules! moblog {
    ($oid:expr, $fmt:expr $(, $args:expr)*) => {
        log::info!(concat!("mob {}: ", $fmt), $oid $(, $args)*);
    };
}

/// Capitalize the first character of a display string.
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Render a millisecond span as a compact human duration.
pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    }
}
