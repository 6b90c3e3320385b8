use chrono::{Duration, NaiveDate, NaiveTime};

/// How the classifier arrived at its verdict. `Heuristic` means the label
/// could not be parsed and was passed conservatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Parsed,
    Heuristic,
}

#[derive(Debug, Clone, Copy)]
pub struct Recency {
    pub within_window: bool,
    pub confidence: Confidence,
}

impl Recency {
    fn parsed(within_window: bool) -> Self {
        Recency {
            within_window,
            confidence: Confidence::Parsed,
        }
    }
}

/// Classify a sidebar time label against a lookback window of `days_back`
/// days ending at `today`.
///
/// The sidebar renders free text: relative units ("5 min", "2 hr", "now"),
/// time-of-day for today ("2:01 PM"), "Yesterday", or calendar dates
/// ("Feb 16", "Jan 3, 2024"). Relative and time-of-day labels always pass.
/// Labels that fit none of these shapes pass conservatively.
pub fn classify_recency(label: &str, days_back: i64, today: NaiveDate) -> Recency {
    let t = label.trim().to_lowercase();

    if t == "now" || t.contains("min") || t.contains("hr") || t.contains("hour") {
        return Recency::parsed(true);
    }
    if is_time_of_day(&t) {
        return Recency::parsed(true);
    }
    if t.contains("yesterday") {
        return Recency::parsed(days_back >= 1);
    }

    if let Some(date) = parse_calendar_label(&t, today) {
        let cutoff = today - Duration::days(days_back);
        return Recency::parsed(date >= cutoff);
    }

    Recency {
        within_window: true,
        confidence: Confidence::Heuristic,
    }
}

/// A bare clock time means the conversation was active today.
fn is_time_of_day(label: &str) -> bool {
    NaiveTime::parse_from_str(label, "%I:%M %p").is_ok()
        || NaiveTime::parse_from_str(label, "%I:%M%p").is_ok()
}

fn has_year(label: &str) -> bool {
    let digits: Vec<bool> = label.chars().map(|c| c.is_ascii_digit()).collect();
    digits.windows(4).any(|w| w.iter().all(|&d| d))
}

/// Parse labels like "Feb 16" or "Jan 3, 2024". Labels without a year get the
/// current year appended, matching how the sidebar abbreviates recent dates.
fn parse_calendar_label(label: &str, today: NaiveDate) -> Option<NaiveDate> {
    use chrono::Datelike;

    let candidate = if has_year(label) {
        label.to_string()
    } else {
        format!("{}, {}", label, today.year())
    };

    const FORMATS: &[&str] = &["%b %d, %Y", "%b %d %Y", "%m/%d/%Y"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&candidate, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 20).unwrap()
    }

    #[test]
    fn relative_units_always_pass() {
        for label in ["5 min", "23 hr", "2 hours", "now"] {
            let r = classify_recency(label, 1, today());
            assert!(r.within_window, "{label} should pass");
            assert_eq!(r.confidence, Confidence::Parsed);
        }
    }

    #[test]
    fn time_of_day_means_today() {
        assert!(classify_recency("2:01 PM", 1, today()).within_window);
        assert!(classify_recency("9:48 am", 7, today()).within_window);
    }

    #[test]
    fn yesterday_needs_at_least_one_day() {
        assert!(classify_recency("Yesterday", 1, today()).within_window);
        assert!(classify_recency("Yesterday", 7, today()).within_window);
        assert!(!classify_recency("Yesterday", 0, today()).within_window);
    }

    #[test]
    fn calendar_dates_compare_against_cutoff() {
        // Feb 16 is four days before the fixed "today" of Feb 20
        assert!(!classify_recency("Feb 16", 1, today()).within_window);
        assert!(classify_recency("Feb 16", 7, today()).within_window);
        assert!(classify_recency("Feb 19, 2026", 1, today()).within_window);
        assert!(!classify_recency("Jan 3, 2024", 30, today()).within_window);
    }

    #[test]
    fn unparseable_labels_pass_conservatively() {
        let r = classify_recency("Sunday", 1, today());
        assert!(r.within_window);
        assert_eq!(r.confidence, Confidence::Heuristic);
    }
}
