use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tanya_core::config::{self, TanyaConfig};
use tanya_core::model::*;
use tanya_core::storage::{create_backend, Storage, StorageBackend};
use tanya_core::transfer;

#[derive(Parser)]
#[command(name = "tanya", about = "Tanya: durable chat history", version)]
enum Cli {
    /// List conversations, most recently active first
    List {
        /// Only show conversations whose title or preview contains this text
        #[arg(short, long)]
        query: Option<String>,
        /// Output raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show a conversation with all of its messages
    Show {
        /// Conversation ID (full or a unique prefix of at least 4 characters)
        id: String,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Start a new, empty conversation
    New {
        /// Title (defaults to the configured chat.default_title)
        #[arg(short, long)]
        title: Option<String>,
    },
    /// Rename a conversation
    Rename {
        /// Conversation ID (full or unique prefix)
        id: String,
        /// New title
        title: String,
    },
    /// Delete a conversation and all of its messages
    Delete {
        /// Conversation ID (full or unique prefix)
        id: String,
        /// Required: deletion cannot be undone
        #[arg(long)]
        confirm: bool,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Export conversations to a JSON bundle
    Export {
        /// Output file path
        #[arg(short, long, default_value = "tanya-export.json")]
        output: String,
        /// Export only this conversation
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Import conversations from a JSON bundle (always under new IDs)
    Import {
        /// Input file path
        path: String,
    },
    /// Rebuild the listing index of the JSON store from the conversation files
    Reindex,
    /// Show storage backend, location and counts
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tanya_core=warn".into()),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let config = TanyaConfig::load(Some(&std::env::current_dir()?))
        .unwrap_or_else(|_| TanyaConfig::default_config());

    run(cli, &config).await
}

async fn run(cli: Cli, config: &TanyaConfig) -> Result<()> {
    let storage = create_backend(config)
        .await
        .context("failed to open conversation store")?;

    match cli {
        Cli::List { query, json } => cmd_list(&storage, query.as_deref(), json).await,
        Cli::Show { id, json } => cmd_show(&storage, &id, json).await,
        Cli::New { title } => cmd_new(&storage, title.as_deref()).await,
        Cli::Rename { id, title } => cmd_rename(&storage, &id, &title).await,
        Cli::Delete { id, confirm, json } => cmd_delete(&storage, &id, confirm, json).await,
        Cli::Export {
            output,
            conversation,
        } => cmd_export(&storage, &output, conversation.as_deref()).await,
        Cli::Import { path } => cmd_import(&storage, config, &path).await,
        Cli::Reindex => cmd_reindex(&storage).await,
        Cli::Status => cmd_status(&storage, config).await,
    }
}

/// Accept a full session ID or a unique prefix of one.
async fn resolve_session_id(storage: &Storage, id: &str) -> Result<String> {
    match storage.get_session(id).await {
        Ok(session) => return Ok(session.id),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }

    if id.len() < 4 {
        anyhow::bail!("conversation not found: {id}");
    }

    let matches: Vec<SessionSummary> = storage
        .list_sessions()
        .await?
        .into_iter()
        .filter(|s| s.id.starts_with(id))
        .collect();

    match matches.as_slice() {
        [] => anyhow::bail!("conversation not found: {id}"),
        [only] => Ok(only.id.clone()),
        many => anyhow::bail!(
            "ambiguous prefix '{id}' matches {} conversations, use more characters",
            many.len()
        ),
    }
}

fn short_id(id: &str) -> &str {
    truncate_chars(id, 8)
}

fn role_label(role: Role) -> String {
    let api = ApiRole::from(role);
    match role {
        Role::Human => api.as_str().green().to_string(),
        Role::Assistant => api.as_str().blue().to_string(),
    }
}

// -- Commands --

async fn cmd_list(storage: &Storage, query: Option<&str>, json: bool) -> Result<()> {
    let summaries = storage
        .list_sessions()
        .await
        .context("failed to list conversations")?;
    let summaries = match query {
        Some(q) => search_sessions(summaries, q),
        None => summaries,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("{}", "No conversations.".dimmed());
        return Ok(());
    }

    for s in &summaries {
        println!(
            "{}  {}  {}  {}",
            short_id(&s.id).cyan(),
            s.last_active_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            s.title.bold(),
            format!("({} msgs)", s.message_count).dimmed()
        );
        if let Some(preview) = &s.preview {
            println!("          {}", preview.dimmed());
        }
    }
    println!();
    println!("{} conversations", summaries.len().to_string().cyan());
    Ok(())
}

async fn cmd_show(storage: &Storage, id: &str, json: bool) -> Result<()> {
    let id = resolve_session_id(storage, id).await?;
    let conversation = transfer::load_conversation(storage, &id).await?;

    if json {
        let bundle = transfer::ExportedConversation::from(&conversation);
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    let session = &conversation.session;
    println!("{}", session.title.bold());
    println!("  {}       {}", "ID:".dimmed(), session.id.cyan());
    println!(
        "  {}  {}",
        "Created:".dimmed(),
        session.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  {}   {}",
        "Active:".dimmed(),
        session.last_active_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!();

    if conversation.messages.is_empty() {
        println!("{}", "No messages.".dimmed());
    }
    for m in &conversation.messages {
        println!(
            "{} {} {}",
            format!("[{}]", m.order_index).dimmed(),
            role_label(m.role),
            m.created_at.format("%H:%M:%S").to_string().dimmed()
        );
        println!("{}", m.content);
        if m.tool_calls.is_some() {
            println!("{}", "(tool calls attached)".yellow());
        }
        println!();
    }
    Ok(())
}

async fn cmd_new(storage: &Storage, title: Option<&str>) -> Result<()> {
    let session = storage
        .create_session(title)
        .await
        .context("failed to create conversation")?;
    println!("{} {} ({})", "Created:".green(), session.title, session.id.cyan());
    Ok(())
}

async fn cmd_rename(storage: &Storage, id: &str, title: &str) -> Result<()> {
    let id = resolve_session_id(storage, id).await?;
    let session = storage
        .rename_session(&id, title)
        .await
        .context("failed to rename conversation")?;
    println!(
        "{} {} ({})",
        "Renamed:".green(),
        session.title,
        short_id(&session.id).cyan()
    );
    Ok(())
}

async fn cmd_delete(storage: &Storage, id: &str, confirm: bool, json: bool) -> Result<()> {
    if !confirm {
        anyhow::bail!("delete requires --confirm flag: the conversation and its messages are removed permanently");
    }
    let id = resolve_session_id(storage, id).await?;
    let session = storage.get_session(&id).await?;
    storage
        .delete_session(&id)
        .await
        .context("failed to delete conversation")?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "deleted": session.id, "title": session.title })
        );
    } else {
        println!(
            "{} {} ({})",
            "Deleted:".red(),
            session.title,
            short_id(&session.id).cyan()
        );
    }
    Ok(())
}

async fn cmd_export(storage: &Storage, output: &str, conversation: Option<&str>) -> Result<()> {
    let bundle = match conversation {
        Some(id) => {
            let id = resolve_session_id(storage, id).await?;
            transfer::export_one(storage, &id).await?
        }
        None => transfer::export_all(storage).await?,
    };

    let text = serde_json::to_string_pretty(&bundle)?;
    std::fs::write(output, text).with_context(|| format!("failed to write {output}"))?;

    println!(
        "{} {} conversations ({} messages) to {}",
        "Exported".green(),
        bundle.total_conversations.to_string().cyan(),
        bundle.total_messages,
        output
    );
    Ok(())
}

async fn cmd_import(storage: &Storage, config: &TanyaConfig, path: &str) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let report = transfer::import_json(storage, &text, &config.chat.import_title)
        .await
        .context("import rejected")?;

    println!(
        "{} {} conversations ({} messages)",
        "Imported".green(),
        report.imported.to_string().cyan(),
        report.messages
    );
    for err in &report.errors {
        println!("  {} {}", "!".yellow(), err);
    }
    Ok(())
}

async fn cmd_reindex(storage: &Storage) -> Result<()> {
    match storage {
        Storage::Json(json) => {
            let count = json
                .rebuild_index()
                .await
                .context("failed to rebuild index")?;
            println!(
                "{} index with {} conversations",
                "Rebuilt".green(),
                count.to_string().cyan()
            );
        }
        Storage::Sqlite(_) => {
            println!("{}", "SQLite backend keeps no separate index; nothing to do.".dimmed());
        }
    }
    Ok(())
}

async fn cmd_status(storage: &Storage, config: &TanyaConfig) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    println!("{}", format!("Tanya Status v{version}").bold());

    let info = storage.info().await;
    println!("  {}   {}", "Backend:".dimmed(), info.backend);
    println!("  {}  {}", "Location:".dimmed(), info.location);
    if let Some(v) = info.schema_version {
        println!("  {}    schema v{v}", "Schema:".dimmed());
    }

    match storage.list_sessions().await {
        Ok(summaries) => {
            let messages: usize = summaries.iter().map(|s| s.message_count).sum();
            println!(
                "  {}  {}",
                "Sessions:".dimmed(),
                summaries.len().to_string().cyan()
            );
            println!("  {}  {}", "Messages:".dimmed(), messages.to_string().cyan());
        }
        Err(e) => println!("  {}  {} - {}", "Sessions:".dimmed(), "unavailable".red(), e),
    }

    if let Some(root) = config::config_root() {
        println!(
            "  {}    {}",
            "Config:".dimmed(),
            root.join("config.toml").display()
        );
    }
    println!(
        "  {}  preview {} chars, default title \"{}\"",
        "Settings:".dimmed(),
        config.listing.preview_chars,
        config.chat.default_title
    );
    Ok(())
}
