use anyhow::Result;
use clap::{Parser, Subcommand};
use messages_web::bulk::BulkOptions;
use messages_web::compose::{SendOutcome, StartOutcome};
use messages_web::sidebar::NavigateOutcome;
use messages_web::thread::Extraction;
use messages_web::{api::Client, browser, config};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "messages-web")]
#[command(about = "CLI to access Google Messages Web via browser automation")]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Chrome debugging port (default: 9222)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List visible conversations
    List {
        /// Maximum number of conversations
        #[arg(short = 'n', long, default_value = "30")]
        max: usize,
    },
    /// List conversations with unread messages
    Unread,
    /// Open a conversation by name (does not wait for it to render)
    Open {
        /// Conversation name (case-insensitive substring)
        name: String,
    },
    /// Read messages from the currently open conversation
    Read {
        /// Maximum number of messages, newest kept
        #[arg(short = 'n', long, default_value = "40")]
        max: usize,
    },
    /// Send a message to an existing conversation
    Send {
        /// Conversation name (case-insensitive substring)
        name: String,
        /// Message text
        text: String,
    },
    /// Start a new conversation
    New {
        /// Recipient phone number or name
        recipient: String,
        /// Message text
        text: String,
    },
    /// Fetch full threads from multiple conversations
    Fetch {
        /// Maximum number of conversations
        #[arg(short = 'n', long, default_value = "25")]
        max: usize,
        /// Per-thread message cap, newest kept
        #[arg(long, default_value = "50")]
        max_messages: usize,
        /// Only fetch threads with activity in the last N days
        #[arg(long)]
        days_back: Option<i64>,
        /// Only fetch conversations whose name contains this substring (repeatable)
        #[arg(long = "name")]
        names: Vec<String>,
        /// Per-conversation render wait budget in milliseconds
        #[arg(long)]
        render_wait_ms: Option<u64>,
    },
    /// Test connection to browser
    Test,
    /// Inspect DOM to find selectors
    Inspect,
    /// Configure settings
    Config {
        /// Set default port
        #[arg(long)]
        port: Option<u16>,
        /// Set default render wait for fetch, in milliseconds
        #[arg(long)]
        render_wait_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config()?;
    let port = cli.port.unwrap_or_else(|| cfg.port());

    match cli.command {
        Commands::Config {
            port: new_port,
            render_wait_ms,
        } => {
            let mut cfg = config::load_config()?;
            if new_port.is_none() && render_wait_ms.is_none() {
                println!("Current settings:");
                println!("  port: {}", cfg.port());
                println!("  render_wait_ms: {}", cfg.render_wait_ms());
            } else {
                if let Some(p) = new_port {
                    cfg.port = Some(p);
                    println!("Port set to: {}", p);
                }
                if let Some(ms) = render_wait_ms {
                    cfg.render_wait_ms = Some(ms);
                    println!("Render wait set to: {}ms", ms);
                }
                config::save_config(&cfg)?;
            }
        }
        Commands::List { max } => {
            let client = Client::new(port);
            let conversations = client.list_conversations(max).await?;

            if cli.json {
                println!("{}", serde_json::to_string(&conversations)?);
            } else if conversations.is_empty() {
                println!("No conversations found. Make sure Messages is open and paired.");
            } else {
                for conv in &conversations {
                    let unread = if conv.unread { "*" } else { " " };
                    println!("{}{} | {} | {}", unread, conv.name, conv.time, conv.snippet);
                }
            }
        }
        Commands::Unread => {
            let client = Client::new(port);
            let conversations = client.check_new_messages().await?;

            if cli.json {
                println!("{}", serde_json::to_string(&conversations)?);
            } else if conversations.is_empty() {
                println!("No unread conversations.");
            } else {
                for conv in &conversations {
                    println!("{} | {} | {}", conv.name, conv.time, conv.snippet);
                }
            }
        }
        Commands::Open { name } => {
            let client = Client::new(port);
            let outcome = client.navigate_to_conversation(&name).await?;

            if cli.json {
                println!("{}", serde_json::to_string(&outcome)?);
            } else {
                match outcome {
                    NavigateOutcome::Ok { name, .. } => {
                        println!("Opened: {}", name);
                        println!("Give the thread a moment to render, then run: messages-web read");
                    }
                    NavigateOutcome::Error { error, .. } => println!("{}", error),
                    NavigateOutcome::Ambiguous { error, matches, .. } => {
                        println!("{}:", error);
                        for m in matches {
                            println!("  - {}", m);
                        }
                    }
                }
            }
        }
        Commands::Read { max } => {
            let client = Client::new(port);
            let extraction = client.extract_messages(max).await?;

            if cli.json {
                println!("{}", serde_json::to_string(&extraction)?);
            } else {
                match extraction {
                    Extraction::Ok {
                        partner_name,
                        total_messages,
                        returned,
                        messages,
                    } => {
                        println!(
                            "{} ({} of {} messages)",
                            partner_name, returned, total_messages
                        );
                        println!("---");
                        for msg in &messages {
                            if msg.timestamp.is_empty() {
                                println!("{}: {}", msg.from, msg.text);
                            } else {
                                println!("[{}] {}: {}", msg.timestamp, msg.from, msg.text);
                            }
                        }
                    }
                    Extraction::Empty { partner_name, .. } => {
                        println!("No messages rendered for {}.", partner_name);
                    }
                }
            }
        }
        Commands::Send { name, text } => {
            let client = Client::new(port);
            let outcome = client.send_message(&name, &text).await?;

            if cli.json {
                println!("{}", serde_json::to_string(&outcome)?);
            } else {
                match outcome {
                    SendOutcome::Ok { name } => println!("Sent to {}: \"{}\"", name, text),
                    SendOutcome::Error { error } => println!("{}", error),
                    SendOutcome::Ambiguous { error, matches } => {
                        println!("{}:", error);
                        for m in matches {
                            println!("  - {}", m);
                        }
                    }
                }
            }
        }
        Commands::New { recipient, text } => {
            let client = Client::new(port);
            let outcome = client.start_new_message(&recipient, &text).await?;

            if cli.json {
                println!("{}", serde_json::to_string(&outcome)?);
            } else {
                match outcome {
                    StartOutcome::Ok { recipient } => {
                        println!("Sent to {}: \"{}\"", recipient, text)
                    }
                    StartOutcome::Error { error } => println!("{}", error),
                }
            }
        }
        Commands::Fetch {
            max,
            max_messages,
            days_back,
            names,
            render_wait_ms,
        } => {
            let options = BulkOptions {
                max_conversations: max,
                max_messages_per_thread: max_messages,
                days_back,
                names_only: if names.is_empty() { None } else { Some(names) },
                render_wait_ms: render_wait_ms.unwrap_or_else(|| cfg.render_wait_ms()),
            };

            let client = Client::new(port);
            let result = client.bulk_fetch_threads(options).await?;

            if cli.json {
                println!("{}", serde_json::to_string(&result)?);
            } else {
                println!(
                    "Fetched {} threads, {} messages in {}ms",
                    result.threads_fetched, result.total_messages, result.elapsed_ms
                );
                for thread in &result.threads {
                    println!(
                        "  {} [{}]: {} messages",
                        thread.name, thread.sidebar_time, thread.message_count
                    );
                }
            }
        }
        Commands::Test => {
            test_connection(port).await?;
        }
        Commands::Inspect => {
            let info = messages_web::inspect::inspect_dom(port).await?;
            println!("{}", info);
        }
    }

    Ok(())
}

async fn test_connection(port: u16) -> Result<()> {
    let browser_instance = browser::connect_or_start_browser(port).await?;
    let pages = browser_instance.pages().await?;

    println!("Connected to browser successfully!");
    println!("Found {} pages:", pages.len());

    let timeout = std::time::Duration::from_secs(2);
    for page in &pages {
        let url_result = tokio::time::timeout(timeout, page.url()).await;
        let url = match url_result {
            Ok(Ok(Some(u))) => u,
            Ok(Ok(None)) => "(no url)".to_string(),
            Ok(Err(_)) => "(error getting url)".to_string(),
            Err(_) => "(timeout getting url)".to_string(),
        };
        let is_messages = url.contains("messages.google.com");
        let marker = if is_messages { " <-- Messages" } else { "" };
        let title = tokio::time::timeout(timeout, page.evaluate("document.title"))
            .await
            .ok()
            .and_then(|r| r.ok())
            .and_then(|r| r.into_value::<String>().ok())
            .unwrap_or_else(|| "(no title)".to_string());
        println!("  {} [{}]{}", title, url, marker);
    }

    match browser::find_messages_page(&browser_instance).await {
        Ok(page) => {
            let url = tokio::time::timeout(timeout, page.url())
                .await
                .ok()
                .and_then(|r| r.ok())
                .flatten()
                .unwrap_or_default();
            println!("\nMessages tab found: {}", url);
        }
        Err(_) => {
            println!("\nNo Messages tab found. Open messages.google.com/web in the browser.");
        }
    }

    Ok(())
}
