//! Human-readable byte formatting for progress output

const UNITS: [&str; 8] = ["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
const THRESH: f64 = 1000.0;

/// Format a byte count with SI units, one decimal place
pub fn human_size(bytes: u64) -> String {
    if (bytes as f64) < THRESH {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / THRESH;
    let mut unit = 0;
    while value >= THRESH && unit < UNITS.len() - 1 {
        value /= THRESH;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Format a rate as a size per second
pub fn human_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", human_size(bytes_per_sec.max(0.0) as u64))
}
