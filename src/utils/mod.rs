//! Utilities module for logging, error handling and formatting helpers

pub mod error;
pub mod logging;

pub use error::{ResNetError, Result, ResultExt};
pub use logging::{init_logging, LogConfig, TrainingLogger};

use std::time::Duration;

/// Render an elapsed time as `42.0s`, `3m 07s` or `2h 15m`
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    match total {
        0..=59 => format!("{:.1}s", elapsed.as_secs_f64()),
        60..=3599 => format!("{}m {:02}s", total / 60, total % 60),
        _ => format!("{}h {:02}m", total / 3600, (total % 3600) / 60),
    }
}

/// Group digits in threes: `42658945` becomes `42,658,945`
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;

    let mut groups: Vec<&str> = Vec::new();
    if head > 0 {
        groups.push(&digits[..head]);
    }
    groups.extend(
        digits.as_bytes()[head..]
            .chunks(3)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok()),
    );
    groups.join(",")
}
