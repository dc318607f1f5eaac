use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds, truncated to the 32-bit RTMP clock
pub fn current_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_timestamp_advances() {
        let start = current_timestamp();
        thread::sleep(Duration::from_millis(10));
        assert!(current_timestamp().wrapping_sub(start) >= 10);
    }
}
