//! Chat command implementations

use anyhow::{Context, Result};
use tally_core::ai::Providers;
use tally_core::db::Database;
use tally_core::models::ChatDirection;
use tally_core::{ChatService, HeuristicAssistant, Intent, PromptLibrary, ProviderSettings};

use super::{print_warnings, truncate};

/// Build the chat service from the provider config and prompt library
pub fn load_chat_service(db: &Database) -> Result<ChatService> {
    let settings = ProviderSettings::load().context("Failed to load provider config")?;
    let providers = Providers::from_settings(&settings).context("Failed to set up providers")?;
    let prompts = PromptLibrary::load().context("Failed to load prompts")?;
    Ok(ChatService::new(db.clone(), providers, prompts))
}

pub async fn cmd_chat(
    service: &ChatService,
    user: &str,
    message: &str,
    provider: Option<&str>,
) -> Result<()> {
    let exchange = service.handle(user, message, provider).await?;

    println!();
    println!("💬 {}", exchange.reply);

    if exchange.agent["selected"] == true {
        println!(
            "   🔧 {} via {}",
            exchange.agent["tool"].as_str().unwrap_or_default(),
            exchange.provider.as_deref().unwrap_or("unknown")
        );
    }
    if exchange.degraded {
        println!("   ⚠️  No completion provider answered. Try 'tally quick' for offline entry.");
    }
    print_warnings(&exchange.warnings);

    Ok(())
}

pub fn cmd_quick(db: &Database, user: &str, message: &str) -> Result<()> {
    let reply = HeuristicAssistant::new(db.clone()).handle(user, message)?;

    db.add_chat(user, message, ChatDirection::User)?;
    db.add_chat(user, &reply.reply, ChatDirection::Agent)?;

    match reply.intent {
        Intent::RecordTransaction { .. } => println!("✅ {}", reply.reply),
        Intent::QueryData => println!("📊 {}", reply.reply),
    }
    print_warnings(&reply.warnings);

    Ok(())
}

pub fn cmd_history(db: &Database, user: &str, limit: i64) -> Result<()> {
    let records = db.chat_history(user, limit)?;

    if records.is_empty() {
        println!("No chat history yet. Try: tally chat lunch 30 yuan");
        return Ok(());
    }

    println!();
    println!("🗨️  Recent Messages");
    println!("   ─────────────────────────────────────────────────────────────");

    // Oldest first reads like a conversation
    for record in records.iter().rev() {
        let who = match record.direction {
            ChatDirection::User => "you",
            ChatDirection::Agent => "tally",
        };
        println!(
            "   {} │ {:>5} │ {}",
            record.date.format("%Y-%m-%d %H:%M"),
            who,
            truncate(&record.content, 60)
        );
    }

    Ok(())
}
