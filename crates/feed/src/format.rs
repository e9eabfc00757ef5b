/// Compact counter text: `999`, `1.5K`, `2M`.
pub fn format_count(count: u64) -> String {
    fn compact(value: f64, suffix: &str) -> String {
        let s = format!("{value:.1}");
        format!("{}{suffix}", s.strip_suffix(".0").unwrap_or(&s))
    }
    if count >= 1_000_000 {
        compact(count as f64 / 1_000_000.0, "M")
    } else if count >= 1000 {
        compact(count as f64 / 1000.0, "K")
    } else {
        count.to_string()
    }
}
