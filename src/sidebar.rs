use crate::api::ConversationSummary;
use anyhow::Result;
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};

/// One conversation entry as snapshotted from the sidebar DOM.
///
/// `conv_id` is the opaque segment after `/conversations/` in the entry's
/// navigation href; it stays stable while the sidebar re-orders, so it is the
/// preferred way to find the entry again later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidebarEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub unread: bool,
    #[serde(rename = "convId", default)]
    pub conv_id: String,
    #[serde(default)]
    pub href: String,
}

/// Snapshot every visible conversation entry. Names drop the "Muted " prefix
/// the sidebar prepends; entries without a dedicated name element fall back
/// to the first non-empty line of the item's inner text.
const SNAPSHOT_JS: &str = r#"
    (() => {
        const entries = [];
        document.querySelectorAll('mws-conversation-list-item').forEach(item => {
            const nameEl = item.querySelector('.name');
            let name = nameEl ? nameEl.textContent.trim().replace(/^Muted\s+/i, '') : '';
            const snippetEl = item.querySelector('mws-conversation-snippet');
            let snippet = snippetEl ? snippetEl.textContent.trim() : '';
            if (!name) {
                const lines = item.innerText.split('\n').filter(l => l.trim());
                name = lines[0] || 'Unknown';
                if (!snippet) snippet = lines[1] || '';
            }
            let timeEl = item.querySelector('mws-relative-timestamp');
            if (!timeEl) timeEl = item.querySelector('.list-item-info');
            const link = item.querySelector('a[href]');
            const href = (link && link.getAttribute('href')) || '';
            const convId = href.includes('/conversations/') ? href.split('/conversations/')[1] : '';
            entries.push({
                name,
                snippet,
                time: timeEl ? timeEl.textContent.trim() : '',
                unread: !!item.querySelector('.text-content.unread'),
                convId,
                href,
            });
        });
        return JSON.stringify(entries);
    })()
"#;

pub async fn snapshot(page: &Page) -> Result<Vec<SidebarEntry>> {
    let result = page.evaluate(SNAPSHOT_JS).await?;
    let raw = result.into_value::<String>().unwrap_or_default();
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

/// Case-insensitive substring match over entry names, in sidebar order.
pub fn find_matches<'a>(entries: &'a [SidebarEntry], query: &str) -> Vec<&'a SidebarEntry> {
    let q = query.to_lowercase();
    entries
        .iter()
        .filter(|e| e.name.to_lowercase().contains(&q))
        .collect()
}

/// A name query resolves to exactly one entry, or the operation stops.
pub enum Resolution<'a> {
    None,
    One(&'a SidebarEntry),
    Many(Vec<&'a SidebarEntry>),
}

pub fn resolve<'a>(entries: &'a [SidebarEntry], query: &str) -> Resolution<'a> {
    let mut matches = find_matches(entries, query);
    match matches.len() {
        0 => Resolution::None,
        1 => Resolution::One(matches.remove(0)),
        _ => Resolution::Many(matches),
    }
}

fn to_summaries(entries: Vec<SidebarEntry>, limit: usize) -> Vec<ConversationSummary> {
    entries
        .into_iter()
        .take(limit)
        .map(|e| ConversationSummary {
            name: e.name,
            snippet: e.snippet,
            time: e.time,
            unread: e.unread,
        })
        .collect()
}

fn unread_summaries(entries: Vec<SidebarEntry>) -> Vec<ConversationSummary> {
    let unread: Vec<SidebarEntry> = entries.into_iter().filter(|e| e.unread).collect();
    let count = unread.len();
    to_summaries(unread, count)
}

/// List up to `limit` visible conversations in sidebar order.
pub async fn list_conversations(page: &Page, limit: usize) -> Result<Vec<ConversationSummary>> {
    let entries = snapshot(page).await?;
    Ok(to_summaries(entries, limit))
}

/// List conversations carrying an unread indicator.
pub async fn check_new_messages(page: &Page) -> Result<Vec<ConversationSummary>> {
    let entries = snapshot(page).await?;
    Ok(unread_summaries(entries))
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NavigateOutcome {
    Ok {
        name: String,
        #[serde(rename = "matchCount")]
        match_count: usize,
    },
    Error {
        error: String,
        #[serde(rename = "matchCount")]
        match_count: usize,
    },
    Ambiguous {
        error: String,
        matches: Vec<String>,
        #[serde(rename = "matchCount")]
        match_count: usize,
    },
}

/// Turn a query into an outcome without touching the page. Separated from
/// the click so the zero/one/many policy is testable on its own.
pub fn resolve_navigation(entries: &[SidebarEntry], name: &str) -> std::result::Result<SidebarEntry, NavigateOutcome> {
    match resolve(entries, name) {
        Resolution::None => Err(NavigateOutcome::Error {
            error: format!("No conversation found for: \"{}\"", name),
            match_count: 0,
        }),
        Resolution::Many(matches) => {
            let names: Vec<String> = matches.iter().map(|m| m.name.clone()).collect();
            let count = names.len();
            Err(NavigateOutcome::Ambiguous {
                error: format!("Multiple conversations match \"{}\"", name),
                matches: names,
                match_count: count,
            })
        }
        Resolution::One(entry) => Ok(entry.clone()),
    }
}

async fn try_click(page: &Page, script: String) -> Result<bool> {
    let result = page.evaluate(script).await?;
    Ok(result.into_value::<bool>().unwrap_or(false))
}

/// Click a sidebar entry's navigation link. Looks the link up fresh by
/// conversation ID first (the sidebar re-orders under us), then falls back
/// to the href captured at snapshot time. Returns false if neither resolves.
pub async fn open_entry(page: &Page, entry: &SidebarEntry) -> Result<bool> {
    if !entry.conv_id.is_empty() {
        let selector = crate::browser::conversation_link_selector(&entry.conv_id);
        let script = format!(
            r#"
            (() => {{
                const link = document.querySelector('{}');
                if (!link) return false;
                link.click();
                return true;
            }})()
        "#,
            selector
        );
        if try_click(page, script).await? {
            return Ok(true);
        }
    }

    if !entry.href.is_empty() {
        let script = format!(
            r#"
            (() => {{
                const link = document.querySelector('mws-conversation-list-item a[href="{}"]');
                if (!link) return false;
                link.click();
                return true;
            }})()
        "#,
            entry.href
        );
        if try_click(page, script).await? {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Click into the conversation uniquely matching `name`. Returns immediately
/// after triggering navigation; callers wait for the thread to render before
/// extracting.
pub async fn navigate_to_conversation(page: &Page, name: &str) -> Result<NavigateOutcome> {
    let entries = snapshot(page).await?;
    let entry = match resolve_navigation(&entries, name) {
        Ok(entry) => entry,
        Err(outcome) => return Ok(outcome),
    };

    open_entry(page, &entry).await?;

    Ok(NavigateOutcome::Ok {
        name: entry.name,
        match_count: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, unread: bool) -> SidebarEntry {
        SidebarEntry {
            name: name.to_string(),
            snippet: format!("last message from {}", name),
            time: "5 min".to_string(),
            unread,
            conv_id: String::new(),
            href: String::new(),
        }
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let entries = vec![entry("Ross Smith", false), entry("Jen", false)];
        let matches = find_matches(&entries, "ROSS");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "Ross Smith");
    }

    #[test]
    fn zero_matches_resolve_to_error() {
        let entries = vec![entry("Jen", false)];
        let outcome = resolve_navigation(&entries, "Ross").unwrap_err();
        match outcome {
            NavigateOutcome::Error { match_count, .. } => assert_eq!(match_count, 0),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn multiple_matches_resolve_to_ambiguous_with_all_candidates() {
        let entries = vec![
            entry("Ross Smith", false),
            entry("Jen", false),
            entry("Rossella", false),
        ];
        let outcome = resolve_navigation(&entries, "ross").unwrap_err();
        match outcome {
            NavigateOutcome::Ambiguous {
                matches,
                match_count,
                ..
            } => {
                assert_eq!(match_count, 2);
                assert_eq!(matches, vec!["Ross Smith", "Rossella"]);
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn unique_match_resolves_to_the_entry() {
        let entries = vec![entry("Ross Smith", false), entry("Jen", false)];
        let resolved = resolve_navigation(&entries, "jen").unwrap();
        assert_eq!(resolved.name, "Jen");
    }

    #[test]
    fn limit_truncates_instead_of_erroring() {
        let entries = vec![entry("A", false), entry("B", false), entry("C", false)];
        assert!(to_summaries(entries.clone(), 0).is_empty());
        assert_eq!(to_summaries(entries.clone(), 1).len(), 1);
        assert_eq!(to_summaries(entries, 30).len(), 3);
    }

    #[test]
    fn unread_filter_keeps_order() {
        let entries = vec![entry("A", true), entry("B", false), entry("C", true)];
        let unread = unread_summaries(entries);
        let names: Vec<&str> = unread.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[test]
    fn snapshot_records_deserialize_from_page_json() {
        let raw = r#"[{"name":"Ross Smith","snippet":"see you then","time":"2:01 PM","unread":true,"convId":"123abc","href":"/web/conversations/123abc"}]"#;
        let entries: Vec<SidebarEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries[0].conv_id, "123abc");
        assert!(entries[0].unread);
    }
}
