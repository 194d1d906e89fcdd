//! Presentation helpers shared by every screen: avatar initials and colours,
//! HTML escaping, relative timestamps, durations and byte sizes.
//!
//! Date labels follow the pt-BR conventions of the UI (`Hoje`, `Ontem`,
//! `DD/MM`).

use std::fmt::Display;

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Utc, Weekday};

use crate::constants::COLOR_PALETTE;

/// First letter of the first two words, upper-cased. Empty names give `?`.
pub fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .collect();
    if letters.is_empty() {
        "?".to_string()
    } else {
        letters.to_uppercase()
    }
}

/// Deterministic avatar colour for an id.
///
/// Uses the 32-bit `h * 31 + c` string hash over UTF-16 code units, with the
/// shift evaluated in 32-bit arithmetic and the accumulator kept wide, so the
/// same id maps to the same palette entry on every client.
pub fn str_color(s: &str) -> &'static str {
    let mut hash: i64 = 0;
    let mut buf = [0u16; 2];
    for ch in s.chars() {
        let unit = ch.encode_utf16(&mut buf)[0] as i64;
        let shifted = (hash as i32).wrapping_shl(5) as i64;
        hash = unit + (shifted - hash);
    }
    COLOR_PALETTE[(hash.unsigned_abs() % COLOR_PALETTE.len() as u64) as usize]
}

/// Escape text for interpolation into HTML.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// The instant `seconds` seconds before now.
pub fn ago(seconds: i64) -> DateTime<Utc> {
    Utc::now() - Duration::seconds(seconds)
}

const YESTERDAY: &str = "Ontem";
const TODAY: &str = "Hoje";

fn within_two_days<Tz: TimeZone>(ts: &DateTime<Tz>, now: &DateTime<Tz>) -> bool {
    now.clone().signed_duration_since(ts.clone()) < Duration::hours(48)
}

/// Conversation-list timestamp in the local timezone.
pub fn format_time(ts: DateTime<Utc>) -> String {
    format_time_at(&ts.with_timezone(&Local), &Local::now())
}

/// Same calendar day → `HH:MM`; less than 48 hours old → `Ontem`; otherwise `DD/MM`.
pub fn format_time_at<Tz: TimeZone>(ts: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    if ts.date_naive() == now.date_naive() {
        ts.format("%H:%M").to_string()
    } else if within_two_days(ts, now) {
        YESTERDAY.to_string()
    } else {
        ts.format("%d/%m").to_string()
    }
}

/// Day separator label in the local timezone.
pub fn format_date(ts: DateTime<Utc>) -> String {
    format_date_at(&ts.with_timezone(&Local), &Local::now())
}

/// Same calendar day → `Hoje`; less than 48 hours old → `Ontem`; otherwise
/// the long form, e.g. `segunda-feira, 06 de janeiro`.
pub fn format_date_at<Tz: TimeZone>(ts: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    if ts.date_naive() == now.date_naive() {
        TODAY.to_string()
    } else if within_two_days(ts, now) {
        YESTERDAY.to_string()
    } else {
        format!(
            "{}, {:02} de {}",
            weekday_name(ts.weekday()),
            ts.day(),
            month_name(ts.month())
        )
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "segunda-feira",
        Weekday::Tue => "terça-feira",
        Weekday::Wed => "quarta-feira",
        Weekday::Thu => "quinta-feira",
        Weekday::Fri => "sexta-feira",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

fn month_name(month: u32) -> &'static str {
    const MONTHS: [&str; 12] = [
        "janeiro", "fevereiro", "março", "abril", "maio", "junho", "julho", "agosto",
        "setembro", "outubro", "novembro", "dezembro",
    ];
    MONTHS[(month.clamp(1, 12) - 1) as usize]
}

/// Call duration as `MM:SS`.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Byte count as `B`, `KB` or `MB` with one decimal.
pub fn bytes_human(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1_048_576 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn initials_take_two_words() {
        assert_eq!(initials("Amina Chissano"), "AC");
        assert_eq!(initials("  joão   da machava "), "JD");
        assert_eq!(initials("sofia"), "S");
        assert_eq!(initials(""), "?");
        assert_eq!(initials("   "), "?");
    }

    #[test]
    fn str_color_is_deterministic_and_in_palette() {
        let a = str_color("u1");
        assert_eq!(a, str_color("u1"));
        assert!(COLOR_PALETTE.contains(&a));
        assert_eq!(str_color(""), COLOR_PALETTE[0]);
        // "a" hashes to 97, 97 % 8 = 1
        assert_eq!(str_color("a"), COLOR_PALETTE[1]);
        // long ids exercise the 32-bit shift wrap
        let long = "f47ac10b-58cc-4372-a567-0e02b2c3d479".repeat(4);
        assert!(COLOR_PALETTE.contains(&str_color(&long)));
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & Jerry</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; Jerry&lt;/b&gt;"
        );
        assert_eq!(escape_html("olá"), "olá");
    }

    #[test]
    fn relative_time_same_day_is_clock_time() {
        let now = at("2025-01-10T15:00:00Z");
        let ts = now - Duration::minutes(30);
        assert_eq!(format_time_at(&ts, &now), "14:30");
    }

    #[test]
    fn relative_time_thirty_hours_is_yesterday() {
        let now = at("2025-01-10T15:00:00Z");
        let ts = now - Duration::hours(30);
        assert_eq!(format_time_at(&ts, &now), "Ontem");
    }

    #[test]
    fn relative_time_older_is_calendar_date() {
        let now = at("2025-01-10T15:00:00Z");
        let ts = now - Duration::days(5);
        assert_eq!(format_time_at(&ts, &now), "05/01");
    }

    #[test]
    fn date_labels() {
        let now = at("2025-01-10T15:00:00Z");
        assert_eq!(format_date_at(&(now - Duration::hours(1)), &now), "Hoje");
        assert_eq!(format_date_at(&(now - Duration::hours(20)), &now), "Ontem");
        assert_eq!(
            format_date_at(&at("2025-01-06T10:00:00Z"), &now),
            "segunda-feira, 06 de janeiro"
        );
    }

    #[test]
    fn durations_and_sizes() {
        assert_eq!(format_duration(222), "03:42");
        assert_eq!(format_duration(5), "00:05");
        assert_eq!(bytes_human(512), "512 B");
        assert_eq!(bytes_human(1536), "1.5 KB");
        assert_eq!(bytes_human(5 * 1_048_576), "5.0 MB");
    }
}
