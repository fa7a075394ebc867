use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub fn truncate_unicode(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if width + ch_width > max_width.saturating_sub(1) {
            result.push('\u{2026}');
            break;
        }
        result.push(ch);
        width += ch_width;
    }
    result
}

/// Left-align `s` in a column of `width` display cells, truncating if needed.
pub fn pad_unicode(s: &str, width: usize) -> String {
    let cut = truncate_unicode(s, width);
    let fill = width.saturating_sub(cut.width());
    format!("{cut}{}", " ".repeat(fill))
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    const TB: u64 = 1024 * GB;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.0} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// `[d-]hh:mm:ss`, the way `ps` prints elapsed time.
pub fn format_duration_secs(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if days > 0 {
        format!("{days}-{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// Cumulative CPU time as `m:ss.cc`.
pub fn format_cpu_time(micros: u64) -> String {
    let centis = micros / 10_000;
    let minutes = centis / 6000;
    let seconds = (centis / 100) % 60;
    format!("{minutes}:{seconds:02}.{:02}", centis % 100)
}

pub fn format_percent(value: f32) -> String {
    format!("{value:.1}%")
}

/// Hundredths of a degree Celsius.
pub fn format_centi_celsius(value: i64) -> String {
    format!("{:.1}°C", value as f64 / 100.0)
}

/// Bytes per interval as a per-second rate.
pub fn format_rate(bytes: u64, interval_secs: f64) -> String {
    if interval_secs <= 0.0 {
        return format!("{}/s", format_bytes(0));
    }
    format!("{}/s", format_bytes((bytes as f64 / interval_secs) as u64))
}
