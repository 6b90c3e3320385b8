use crate::browser::{click_at, press_key, type_text};
use crate::sidebar::{self, Resolution};
use crate::wait::{Polled, poll};
use anyhow::Result;
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(150);
/// Budget for the compose input to appear after navigation.
const INPUT_WAIT: Duration = Duration::from_millis(5000);
/// Budget for the send control to become enabled after text insertion.
const SEND_READY_WAIT: Duration = Duration::from_millis(5000);
/// Settle after dispatching input events, before polling the send control.
const NOTIFY_SETTLE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SendOutcome {
    Ok {
        name: String,
    },
    Error {
        error: String,
    },
    Ambiguous {
        error: String,
        matches: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StartOutcome {
    Ok { recipient: String },
    Error { error: String },
}

#[derive(Debug, Deserialize)]
struct Position {
    x: f64,
    y: f64,
}

/// Focus and select the compose input if it exists. Selecting means the CDP
/// text insertion replaces any draft instead of appending to it.
async fn focus_compose_input(page: &Page) -> Result<Option<()>> {
    let script = r#"
        (() => {
            const input = document.querySelector('mws-message-compose textarea.input') ||
                          document.querySelector('mws-message-compose textarea');
            if (!input) return false;
            input.focus();
            input.select();
            return true;
        })()
    "#;
    let result = page.evaluate(script).await?;
    Ok(result.into_value::<bool>().unwrap_or(false).then_some(()))
}

/// Dispatch the input/change notifications the page observes to enable its
/// send control.
async fn notify_compose_input(page: &Page) -> Result<bool> {
    let script = r#"
        (() => {
            const input = document.querySelector('mws-message-compose textarea.input') ||
                          document.querySelector('mws-message-compose textarea');
            if (!input) return false;
            input.dispatchEvent(new Event('input', { bubbles: true }));
            input.dispatchEvent(new Event('change', { bubbles: true }));
            return true;
        })()
    "#;
    let result = page.evaluate(script).await?;
    Ok(result.into_value::<bool>().unwrap_or(false))
}

/// Center coordinates of a send control that is enabled, not hidden, and has
/// non-zero rendered size. The page keeps a duplicate zero-sized control in
/// the DOM; the size check picks the live one.
async fn send_button_position(page: &Page) -> Result<Option<(f64, f64)>> {
    let script = r#"
        (() => {
            const buttons = document.querySelectorAll(
                'mws-message-send-button button[type="submit"], mws-message-send-button button');
            for (const btn of buttons) {
                if (btn.disabled) continue;
                if (btn.getAttribute('aria-hidden') === 'true') continue;
                const rect = btn.getBoundingClientRect();
                if (rect.width === 0 || rect.height === 0) continue;
                return JSON.stringify({ x: rect.x + rect.width / 2, y: rect.y + rect.height / 2 });
            }
            return null;
        })()
    "#;
    let result = page.evaluate(script).await?;
    let raw = result.into_value::<Option<String>>().unwrap_or(None);
    Ok(raw
        .and_then(|s| serde_json::from_str::<Position>(&s).ok())
        .map(|p| (p.x, p.y)))
}

/// Inject `text` into the focused compose input and activate the send
/// control once it reports ready. Returns the error outcome to surface when
/// a step never becomes ready.
async fn type_and_send(page: &Page, text: &str) -> Result<Option<String>> {
    type_text(page, text).await?;
    if !notify_compose_input(page).await? {
        return Ok(Some("Message input box disappeared during compose".to_string()));
    }
    tokio::time::sleep(NOTIFY_SETTLE).await;

    let position = poll(POLL_INTERVAL, SEND_READY_WAIT, || send_button_position(page)).await?;
    match position {
        Polled::Ready((x, y)) => {
            debug!(x, y, "send control ready");
            click_at(page, x, y).await?;
            Ok(None)
        }
        Polled::TimedOut => {
            warn!("send control never became ready");
            Ok(Some("Send button not found".to_string()))
        }
    }
}

/// Send `text` to the conversation uniquely matching `name`. Name resolution
/// follows the directory policy: zero matches error, multiple matches are
/// reported without any action taken.
pub async fn send_message(page: &Page, name: &str, text: &str) -> Result<SendOutcome> {
    let entries = sidebar::snapshot(page).await?;
    let entry = match sidebar::resolve(&entries, name) {
        Resolution::None => {
            return Ok(SendOutcome::Error {
                error: format!("No conversation found for: \"{}\"", name),
            });
        }
        Resolution::Many(matches) => {
            return Ok(SendOutcome::Ambiguous {
                error: format!("Multiple conversations match \"{}\"", name),
                matches: matches.iter().map(|m| m.name.clone()).collect(),
            });
        }
        Resolution::One(entry) => entry.clone(),
    };

    if !sidebar::open_entry(page, &entry).await? {
        return Ok(SendOutcome::Error {
            error: format!("Conversation entry for \"{}\" is no longer clickable", entry.name),
        });
    }

    let input = poll(POLL_INTERVAL, INPUT_WAIT, || focus_compose_input(page)).await?;
    if !input.is_ready() {
        return Ok(SendOutcome::Error {
            error: "Could not find the message input box".to_string(),
        });
    }

    match type_and_send(page, text).await? {
        None => Ok(SendOutcome::Ok { name: entry.name }),
        Some(error) => Ok(SendOutcome::Error { error }),
    }
}

async fn click_start_chat(page: &Page) -> Result<bool> {
    let script = r#"
        (() => {
            const els = Array.from(document.querySelectorAll('button, a'));
            const btn = els.find(el => {
                const label = (el.getAttribute('aria-label') || '').toLowerCase();
                const text = (el.innerText || '').toLowerCase().trim();
                return text === 'start chat' || label.includes('start chat');
            });
            if (!btn) return false;
            btn.click();
            return true;
        })()
    "#;
    let result = page.evaluate(script).await?;
    Ok(result.into_value::<bool>().unwrap_or(false))
}

async fn focus_recipient_input(page: &Page) -> Result<Option<()>> {
    let script = r#"
        (() => {
            const input = document.querySelector(
                'mws-chips-input input, input[placeholder*="name"], input[placeholder*="phone"], input[placeholder*="To"]');
            if (!input) return false;
            input.focus();
            return true;
        })()
    "#;
    let result = page.evaluate(script).await?;
    Ok(result.into_value::<bool>().unwrap_or(false).then_some(()))
}

async fn notify_recipient_input(page: &Page) -> Result<()> {
    let script = r#"
        (() => {
            const input = document.querySelector(
                'mws-chips-input input, input[placeholder*="name"], input[placeholder*="phone"], input[placeholder*="To"]');
            if (input) input.dispatchEvent(new Event('input', { bubbles: true }));
            return true;
        })()
    "#;
    page.evaluate(script).await?;
    Ok(())
}

/// Open composition toward a brand new recipient and send `text`. The
/// recipient identifier goes into the freshly-appeared chips input and is
/// confirmed with Enter before the usual compose/send sequence runs.
pub async fn start_new_message(page: &Page, recipient: &str, text: &str) -> Result<StartOutcome> {
    if !click_start_chat(page).await? {
        return Ok(StartOutcome::Error {
            error: "Could not find the \"Start chat\" button".to_string(),
        });
    }

    let to_input = poll(POLL_INTERVAL, INPUT_WAIT, || focus_recipient_input(page)).await?;
    if !to_input.is_ready() {
        return Ok(StartOutcome::Error {
            error: "Could not find the recipient input field".to_string(),
        });
    }

    type_text(page, recipient).await?;
    notify_recipient_input(page).await?;
    press_key(page, "Enter", None, Some(800)).await?;

    let input = poll(POLL_INTERVAL, INPUT_WAIT, || focus_compose_input(page)).await?;
    if !input.is_ready() {
        return Ok(StartOutcome::Error {
            error: "Message input box never appeared; the recipient may need to be picked from the dropdown"
                .to_string(),
        });
    }

    match type_and_send(page, text).await? {
        None => Ok(StartOutcome::Ok {
            recipient: recipient.to_string(),
        }),
        Some(error) => Ok(StartOutcome::Error { error }),
    }
}
