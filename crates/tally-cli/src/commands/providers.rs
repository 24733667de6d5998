//! Function registry and provider command implementations

use anyhow::{Context, Result};
use tally_core::ai::Providers;
use tally_core::tools;
use tally_core::ProviderSettings;

pub fn cmd_tools() -> Result<()> {
    println!();
    println!("🔧 Assistant Tools");
    println!("   ─────────────────────────────────────────────────────────────");
    for spec in tools::registry() {
        println!("   {}({})", spec.name, spec.params.join(", "));
        println!("      {}", spec.description);
    }
    Ok(())
}

pub async fn cmd_providers(check: bool) -> Result<()> {
    let settings = ProviderSettings::load().context("Failed to load provider config")?;
    let providers = Providers::from_settings(&settings).context("Failed to set up providers")?;

    println!();
    match &settings.source {
        Some(path) => println!("🤖 Providers (from {})", path.display()),
        None => println!("🤖 Providers (built-in defaults)"),
    }
    println!("   Primary:  {}", providers.primary_name());
    println!(
        "   Fallback: {}",
        providers.fallback_name().unwrap_or("(none)")
    );
    println!("   ─────────────────────────────────────────────────────────────");

    if check {
        for status in providers.check_all().await {
            let mark = if status.healthy { "✅" } else { "❌" };
            println!(
                "   {} {:<10} {:<18} {:<20} {}",
                mark, status.name, status.backend, status.model, status.host
            );
        }
    } else {
        for info in providers.list() {
            println!(
                "   {:<10} {:<18} {:<20} {}",
                info.name, info.backend, info.model, info.host
            );
        }
        println!();
        println!("   Use --check to test connectivity.");
    }

    Ok(())
}
