use chrono::{Datelike, Duration, NaiveDate};

/// Number of days the habit tracker looks back over.
pub const WINDOW_DAYS: usize = 7;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Consecutive completed days counted back from the most recent one.
///
/// `days` is ordered oldest to newest. Input of the wrong length is
/// normalized to the window first: missing entries count as not
/// completed, extra entries beyond the newest seven are ignored.
pub fn streak(days: &[bool]) -> u8 {
    let window = normalize(days);
    let mut count = 0u8;
    for completed in window.iter().rev() {
        if !completed {
            break;
        }
        count += 1;
    }
    count
}

/// Pads at the oldest end with `false` or keeps the newest seven.
pub fn normalize(days: &[bool]) -> [bool; WINDOW_DAYS] {
    let mut window = [false; WINDOW_DAYS];
    let take = days.len().min(WINDOW_DAYS);
    let source = &days[days.len() - take..];
    window[WINDOW_DAYS - take..].copy_from_slice(source);
    window
}

/// Short weekday names for the window ending on `today`, oldest first.
pub fn day_labels(today: NaiveDate) -> [&'static str; WINDOW_DAYS] {
    let mut labels = [""; WINDOW_DAYS];
    for (slot, back) in (0..WINDOW_DAYS).rev().enumerate() {
        let day = today - Duration::days(back as i64);
        labels[slot] = WEEKDAYS[day.weekday().num_days_from_sunday() as usize];
    }
    labels
}

/// Fraction of the target reached, clamped to `[0, 1]`.
pub fn progress(streak: u8, target: u32) -> f64 {
    if target == 0 {
        return 0.0;
    }
    (f64::from(streak) / f64::from(target)).clamp(0.0, 1.0)
}

/// Parses a compact flag list such as `1101111`, `x.xxxxx` or
/// `true,false,true`.
pub fn parse_flags(raw: &str) -> Option<Vec<bool>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains(',') {
        return trimmed
            .split(',')
            .map(|part| match part.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "y" | "yes" | "x" => Some(true),
                "false" | "f" | "0" | "n" | "no" | "." | "-" => Some(false),
                _ => None,
            })
            .collect();
    }

    trimmed
        .chars()
        .map(|ch| match ch {
            '1' | 'x' | 'X' | 'y' | 'Y' => Some(true),
            '0' | '.' | '-' | 'n' | 'N' => Some(false),
            _ => None,
        })
        .collect()
}
