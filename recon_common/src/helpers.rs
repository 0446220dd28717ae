use std::time::Duration;

/// Parse a whole number of seconds into a [`Duration`]. Returns `None` for empty, negative or non-numeric input.
pub fn parse_seconds(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
