//! Display helpers for command output

use std::time::Duration;

pub mod logging;

const BYTE_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// `mm:ss.mmm`, or `h:mm:ss.mmm` past the hour
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    match secs / 3600 {
        0 => format!("{:02}:{:02}.{:03}", secs / 60, secs % 60, millis),
        hours => format!("{}:{:02}:{:02}.{:03}", hours, (secs / 60) % 60, secs % 60, millis),
    }
}

/// Binary-prefixed size with two decimals above one KiB
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < BYTE_UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, BYTE_UNITS[0])
    } else {
        format!("{:.2} {}", value, BYTE_UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(61_250)), "01:01.250");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "1:02:05.000");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MiB");
    }
}
