use crate::browser::{connect_or_start_browser, find_messages_page};
use crate::bulk::BulkOptions;
use crate::compose::{SendOutcome, StartOutcome};
use crate::sidebar::NavigateOutcome;
use crate::thread::Extraction;
use anyhow::Result;
use chromiumoxide::browser::Browser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub name: String,
    pub snippet: String,
    pub time: String,
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub from: String,
    pub text: String,
    pub timestamp: String,
    #[serde(rename = "isOutgoing")]
    pub is_outgoing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadResult {
    pub name: String,
    #[serde(rename = "convId")]
    pub conv_id: String,
    #[serde(rename = "sidebarTime")]
    pub sidebar_time: String,
    #[serde(rename = "messageCount")]
    pub message_count: usize,
    pub messages: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkFetch {
    pub status: String,
    #[serde(rename = "threadsFetched")]
    pub threads_fetched: usize,
    #[serde(rename = "totalMessages")]
    pub total_messages: usize,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    pub threads: Vec<ThreadResult>,
}

pub struct Client {
    port: u16,
}

impl Client {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Attach to the browser and find the Messages tab. The returned
    /// `Browser` must stay alive for the page handle to remain usable.
    async fn session(&self) -> Result<(Browser, chromiumoxide::Page)> {
        let browser = connect_or_start_browser(self.port).await?;
        let page = find_messages_page(&browser).await?;
        Ok((browser, page))
    }

    pub async fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let (_browser, page) = self.session().await?;
        crate::sidebar::list_conversations(&page, limit).await
    }

    pub async fn check_new_messages(&self) -> Result<Vec<ConversationSummary>> {
        let (_browser, page) = self.session().await?;
        crate::sidebar::check_new_messages(&page).await
    }

    pub async fn navigate_to_conversation(&self, name: &str) -> Result<NavigateOutcome> {
        let (_browser, page) = self.session().await?;
        crate::sidebar::navigate_to_conversation(&page, name).await
    }

    pub async fn extract_messages(&self, limit: usize) -> Result<Extraction> {
        let (_browser, page) = self.session().await?;
        crate::thread::extract_messages(&page, limit).await
    }

    pub async fn send_message(&self, name: &str, text: &str) -> Result<SendOutcome> {
        let (_browser, page) = self.session().await?;
        crate::compose::send_message(&page, name, text).await
    }

    pub async fn start_new_message(&self, recipient: &str, text: &str) -> Result<StartOutcome> {
        let (_browser, page) = self.session().await?;
        crate::compose::start_new_message(&page, recipient, text).await
    }

    pub async fn bulk_fetch_threads(&self, options: BulkOptions) -> Result<BulkFetch> {
        let (_browser, page) = self.session().await?;
        crate::bulk::bulk_fetch_threads(&page, &options).await
    }
}
