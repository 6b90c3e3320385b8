use crate::api::{BulkFetch, ThreadResult};
use crate::recency::classify_recency;
use crate::sidebar::{self, SidebarEntry};
use crate::thread::{self, Extraction};
use crate::wait::poll;
use anyhow::Result;
use chromiumoxide::Page;
use chrono::NaiveDate;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BulkOptions {
    pub max_conversations: usize,
    pub max_messages_per_thread: usize,
    /// Only fetch threads whose sidebar time label falls within the last N days.
    pub days_back: Option<i64>,
    /// Only fetch conversations whose name contains one of these substrings.
    pub names_only: Option<Vec<String>>,
    /// Budget for a navigated thread to render its messages.
    pub render_wait_ms: u64,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            max_conversations: 25,
            max_messages_per_thread: 50,
            days_back: None,
            names_only: None,
            render_wait_ms: 3000,
        }
    }
}

const SCROLL_BOTTOM_JS: &str = r#"
    (() => {
        const nav = document.querySelector('mws-conversations-list nav') ||
                    document.querySelector('mws-conversations-list');
        if (!nav) return false;
        nav.scrollTop = nav.scrollHeight;
        return true;
    })()
"#;

const SCROLL_TOP_JS: &str = r#"
    (() => {
        const nav = document.querySelector('mws-conversations-list nav') ||
                    document.querySelector('mws-conversations-list');
        if (nav) nav.scrollTop = 0;
        return true;
    })()
"#;

async fn sidebar_item_count(page: &Page) -> Result<usize> {
    let result = page
        .evaluate("document.querySelectorAll('mws-conversation-list-item').length")
        .await?;
    Ok(result.into_value::<usize>().unwrap_or(0))
}

async fn message_count(page: &Page) -> Result<usize> {
    let result = page
        .evaluate("document.querySelectorAll('mws-message-wrapper').length")
        .await?;
    Ok(result.into_value::<usize>().unwrap_or(0))
}

async fn thread_cleared(page: &Page) -> Result<Option<()>> {
    Ok((message_count(page).await? == 0).then_some(()))
}

async fn thread_rendered(page: &Page) -> Result<Option<()>> {
    Ok((message_count(page).await? > 0).then_some(()))
}

/// Scroll the sidebar to the bottom until three consecutive attempts load no
/// new items, or twice the requested conversation count is visible. Leaves
/// the sidebar scrolled back to the top so entries are clickable.
async fn expand_sidebar(page: &Page, max_conversations: usize) -> Result<()> {
    let mut prev_count = 0usize;
    let mut stable_rounds = 0u32;

    while stable_rounds < 3 {
        let has_nav = page
            .evaluate(SCROLL_BOTTOM_JS)
            .await?
            .into_value::<bool>()
            .unwrap_or(false);
        if !has_nav {
            return Ok(());
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        let count = sidebar_item_count(page).await?;
        if count == prev_count {
            stable_rounds += 1;
        } else {
            prev_count = count;
            stable_rounds = 0;
        }
        // Safety: don't scroll forever
        if count >= max_conversations * 2 {
            break;
        }
    }

    page.evaluate(SCROLL_TOP_JS).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    Ok(())
}

/// The sidebar prepends "Muted " to muted conversation names.
fn strip_muted(name: &str) -> &str {
    match name.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("muted ") => name[6..].trim_start(),
        _ => name,
    }
}

/// Apply the recency window, then the name allow-list, then the count cap,
/// preserving sidebar order throughout.
pub fn select_conversations(
    entries: Vec<SidebarEntry>,
    options: &BulkOptions,
    today: NaiveDate,
) -> Vec<SidebarEntry> {
    let mut selected: Vec<SidebarEntry> = entries
        .into_iter()
        .filter(|e| match options.days_back {
            Some(days) => classify_recency(&e.time, days, today).within_window,
            None => true,
        })
        .filter(|e| match &options.names_only {
            Some(names) if !names.is_empty() => {
                let name = e.name.to_lowercase();
                names.iter().any(|n| name.contains(&n.to_lowercase()))
            }
            _ => true,
        })
        .collect();
    selected.truncate(options.max_conversations);
    selected
}

/// Visit each selected conversation in order, wait for it to render, and
/// extract its thread. A conversation whose link no longer resolves is
/// skipped; one that renders nothing still yields an empty thread. Nothing
/// aborts the batch.
pub async fn bulk_fetch_threads(page: &Page, options: &BulkOptions) -> Result<BulkFetch> {
    let started = Instant::now();

    expand_sidebar(page, options.max_conversations).await?;

    let entries = sidebar::snapshot(page).await?;
    let today = chrono::Local::now().date_naive();
    let selected = select_conversations(entries, options, today);
    info!(selected = selected.len(), "conversations selected for fetch");

    let mut threads: Vec<ThreadResult> = Vec::new();
    let mut total_messages = 0usize;

    for entry in &selected {
        if !sidebar::open_entry(page, entry).await? {
            warn!(name = %entry.name, "conversation link no longer resolves, skipping");
            continue;
        }

        // The previous thread's messages may linger briefly after the click
        poll(Duration::from_millis(50), Duration::from_millis(500), || {
            thread_cleared(page)
        })
        .await?;

        let rendered = poll(
            Duration::from_millis(50),
            Duration::from_millis(options.render_wait_ms),
            || thread_rendered(page),
        )
        .await?;
        if rendered.is_ready() {
            tokio::time::sleep(Duration::from_millis(150)).await;
        }

        let (_, records) = thread::snapshot(page).await?;
        let partner = strip_muted(&entry.name);
        let display_name = if partner.is_empty() {
            entry.name.clone()
        } else {
            partner.to_string()
        };

        let messages = match thread::assemble(partner, records, options.max_messages_per_thread) {
            Extraction::Ok { messages, .. } => messages,
            Extraction::Empty { .. } => Vec::new(),
        };
        total_messages += messages.len();

        threads.push(ThreadResult {
            name: display_name,
            conv_id: entry.conv_id.clone(),
            sidebar_time: entry.time.clone(),
            message_count: messages.len(),
            messages,
        });
    }

    Ok(BulkFetch {
        status: "ok".to_string(),
        threads_fetched: threads.len(),
        total_messages,
        elapsed_ms: started.elapsed().as_millis() as u64,
        threads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, time: &str) -> SidebarEntry {
        SidebarEntry {
            name: name.to_string(),
            snippet: String::new(),
            time: time.to_string(),
            unread: false,
            conv_id: String::new(),
            href: String::new(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 20).unwrap()
    }

    #[test]
    fn recency_window_drops_stale_dates_keeps_relative_labels() {
        let entries = vec![
            entry("Ross", "5 min"),
            entry("Jen", "Feb 10"),
            entry("Sam", "2:01 PM"),
        ];
        let options = BulkOptions {
            days_back: Some(1),
            ..Default::default()
        };
        let selected = select_conversations(entries, &options, today());
        let names: Vec<&str> = selected.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Ross", "Sam"]);
    }

    #[test]
    fn name_allow_list_is_case_insensitive_and_order_preserving() {
        let entries = vec![
            entry("Ross Smith", "5 min"),
            entry("Jen", "5 min"),
            entry("rossella", "5 min"),
        ];
        let options = BulkOptions {
            names_only: Some(vec!["ROSS".to_string()]),
            ..Default::default()
        };
        let selected = select_conversations(entries, &options, today());
        let names: Vec<&str> = selected.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Ross Smith", "rossella"]);
    }

    #[test]
    fn empty_allow_list_selects_everything() {
        let entries = vec![entry("A", "5 min"), entry("B", "5 min")];
        let options = BulkOptions {
            names_only: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(select_conversations(entries, &options, today()).len(), 2);
    }

    #[test]
    fn selection_caps_at_max_conversations() {
        let entries: Vec<SidebarEntry> = (0..40)
            .map(|i| entry(&format!("c{}", i), "5 min"))
            .collect();
        let options = BulkOptions::default();
        let selected = select_conversations(entries, &options, today());
        assert_eq!(selected.len(), 25);
        assert_eq!(selected[0].name, "c0");
    }

    #[test]
    fn muted_prefix_is_stripped_case_insensitively() {
        assert_eq!(strip_muted("Muted Ross"), "Ross");
        assert_eq!(strip_muted("muted Ross"), "Ross");
        assert_eq!(strip_muted("Ross"), "Ross");
        assert_eq!(strip_muted("Mutedly"), "Mutedly");
    }
}
