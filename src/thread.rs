use crate::api::ThreadMessage;
use anyhow::Result;
use chromiumoxide::Page;
use serde::Deserialize;

/// One rendered message part, before sender attribution. `timestamp` is the
/// per-message time label when the wrapper carries one, else the nearest
/// preceding date-separator label, else empty.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub outgoing: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawThread {
    #[serde(default)]
    partner: String,
    #[serde(default)]
    records: Vec<RawMessage>,
}

/// Snapshot the open conversation in one pass, document order.
///
/// Timestamp inheritance walks backward from each message wrapper through its
/// preceding siblings until it hits a date separator or the previous message
/// wrapper, mirroring how the page scopes separator labels to the messages
/// below them.
const EXTRACT_JS: &str = r#"
    (() => {
        const headerEl = document.querySelector('.title-container .title h2') ||
                         document.querySelector('div.title h2') ||
                         document.querySelector('[data-e2e-conversation-name]');
        let partner = headerEl ? headerEl.innerText.trim() : '';
        if (!partner) {
            for (const h2 of document.querySelectorAll('h2')) {
                const text = h2.textContent.trim();
                if (!h2.classList.contains('name') && text.length > 0 && text.length < 60) {
                    partner = text;
                    break;
                }
            }
        }

        const records = [];
        let dateLabel = '';
        document.querySelectorAll('mws-message-wrapper').forEach(wrapper => {
            let prev = wrapper.previousElementSibling;
            while (prev) {
                if (prev.classList && (prev.classList.contains('date-separator') ||
                    prev.tagName === 'MWS-RELATIVE-TIMESTAMP' ||
                    prev.classList.contains('separator'))) {
                    dateLabel = prev.innerText.trim();
                    break;
                }
                if (prev.tagName === 'MWS-MESSAGE-WRAPPER') break;
                prev = prev.previousElementSibling;
            }

            const outgoing = wrapper.getAttribute('is-outgoing') === 'true';
            let time = '';
            const timeEl = wrapper.querySelector('.message-timestamp, .timestamp, mws-message-status time, [data-e2e-message-timestamp]');
            if (timeEl) time = timeEl.innerText.trim();

            wrapper.querySelectorAll('mws-text-message-part').forEach(part => {
                const text = part.innerText.trim();
                if (text) records.push({ text, timestamp: time || dateLabel || '', outgoing });
            });
        });

        return JSON.stringify({ partner, records });
    })()
"#;

/// Read the open conversation's heading and rendered messages. Pure read,
/// no page mutation.
pub async fn snapshot(page: &Page) -> Result<(String, Vec<RawMessage>)> {
    let result = page.evaluate(EXTRACT_JS).await?;
    let raw = result.into_value::<String>().unwrap_or_default();
    let parsed: RawThread = serde_json::from_str(&raw).unwrap_or_default();
    Ok((parsed.partner, parsed.records))
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Extraction {
    Ok {
        #[serde(rename = "partnerName")]
        partner_name: String,
        #[serde(rename = "totalMessages")]
        total_messages: usize,
        returned: usize,
        messages: Vec<ThreadMessage>,
    },
    Empty {
        #[serde(rename = "partnerName")]
        partner_name: String,
        messages: Vec<ThreadMessage>,
    },
}

/// Keep the last `limit` items, preserving order. Truncation drops from the
/// oldest end, never the newest.
pub fn tail<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if items.len() > limit {
        let excess = items.len() - limit;
        items.drain(..excess);
    }
    items
}

/// Attribute senders and apply the tail cap. An empty record list is a valid
/// empty state, not an error.
pub fn assemble(partner_name: &str, records: Vec<RawMessage>, limit: usize) -> Extraction {
    let partner = if partner_name.is_empty() {
        "Them"
    } else {
        partner_name
    };

    if records.is_empty() {
        return Extraction::Empty {
            partner_name: partner.to_string(),
            messages: Vec::new(),
        };
    }

    let total = records.len();
    let messages: Vec<ThreadMessage> = tail(records, limit)
        .into_iter()
        .map(|r| ThreadMessage {
            from: if r.outgoing {
                "You".to_string()
            } else {
                partner.to_string()
            },
            text: r.text,
            timestamp: r.timestamp,
            is_outgoing: r.outgoing,
        })
        .collect();

    Extraction::Ok {
        partner_name: partner.to_string(),
        total_messages: total,
        returned: messages.len(),
        messages,
    }
}

/// Extract the currently open conversation, newest-last, capped to the last
/// `limit` messages.
pub async fn extract_messages(page: &Page, limit: usize) -> Result<Extraction> {
    let (partner, records) = snapshot(page).await?;
    Ok(assemble(&partner, records, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, outgoing: bool) -> RawMessage {
        RawMessage {
            text: text.to_string(),
            timestamp: "Feb 16".to_string(),
            outgoing,
        }
    }

    #[test]
    fn tail_keeps_the_newest_end() {
        let items: Vec<i32> = (1..=10).collect();
        assert_eq!(tail(items, 3), vec![8, 9, 10]);
    }

    #[test]
    fn tail_under_limit_is_untouched() {
        let items = vec![1, 2];
        assert_eq!(tail(items, 5), vec![1, 2]);
    }

    #[test]
    fn cap_reports_total_and_returned_counts() {
        let records: Vec<RawMessage> =
            (0..10).map(|i| record(&format!("m{}", i), false)).collect();
        match assemble("Ross", records, 3) {
            Extraction::Ok {
                total_messages,
                returned,
                messages,
                ..
            } => {
                assert_eq!(total_messages, 10);
                assert_eq!(returned, 3);
                let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
                assert_eq!(texts, vec!["m7", "m8", "m9"]);
            }
            other => panic!("expected ok, got {:?}", other),
        }
    }

    #[test]
    fn outgoing_messages_come_from_you() {
        let records = vec![record("hi", true), record("hey", false)];
        match assemble("Ross", records, 40) {
            Extraction::Ok { messages, .. } => {
                assert_eq!(messages[0].from, "You");
                assert!(messages[0].is_outgoing);
                assert_eq!(messages[1].from, "Ross");
                assert!(!messages[1].is_outgoing);
            }
            other => panic!("expected ok, got {:?}", other),
        }
    }

    #[test]
    fn no_rendered_messages_is_empty_not_error() {
        match assemble("Ross", Vec::new(), 40) {
            Extraction::Empty {
                partner_name,
                messages,
            } => {
                assert_eq!(partner_name, "Ross");
                assert!(messages.is_empty());
            }
            other => panic!("expected empty, got {:?}", other),
        }
    }

    #[test]
    fn missing_heading_falls_back_to_them() {
        match assemble("", vec![record("hi", false)], 40) {
            Extraction::Ok {
                partner_name,
                messages,
                ..
            } => {
                assert_eq!(partner_name, "Them");
                assert_eq!(messages[0].from, "Them");
            }
            other => panic!("expected ok, got {:?}", other),
        }
    }

    #[test]
    fn raw_records_deserialize_from_page_json() {
        let raw = r#"{"partner":"Ross","records":[{"text":"see you","timestamp":"2:01 PM","outgoing":false}]}"#;
        let parsed: RawThread = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.partner, "Ross");
        assert_eq!(parsed.records[0].timestamp, "2:01 PM");
    }
}
