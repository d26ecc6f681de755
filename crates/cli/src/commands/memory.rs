//! `zaibridge memory`: Inspect and edit the assistant memory.

use zaibridge_config::AppConfig;
use zaibridge_memory::AssistantMemory;

async fn open() -> Result<AssistantMemory, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(AssistantMemory::open(config.storage_dir(), config.entry_id.as_str()).await)
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let memory = open().await?;
    let doc = memory.snapshot().await;

    println!("Assistant Memory");
    println!("================");
    println!("  File:          {}", memory.path().display());
    println!("  Preferences:   {}", doc.preferences.len());
    println!("  Notes:         {}", doc.notes.len());
    println!("  Context keys:  {}", doc.context.len());
    println!("  Interactions:  {}", doc.stats.total_interactions);

    let prompt = memory.build_memory_prompt().await;
    println!();
    if prompt.is_empty() {
        println!("  (nothing remembered yet)");
    } else {
        println!("{prompt}");
    }

    if !doc.stats.frequent_commands.is_empty() {
        let mut ranked: Vec<_> = doc.stats.frequent_commands.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1));
        println!();
        println!("### Frequent Commands");
        for (command, count) in ranked.into_iter().take(5) {
            println!("- {command} ({count})");
        }
    }
    Ok(())
}

pub async fn add_note(text: &str, tags: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let memory = open().await?;
    memory.add_note(text, tags).await?;
    println!("Noted.");
    Ok(())
}

pub async fn add_preference(
    text: &str,
    category: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let memory = open().await?;
    if memory.add_preference(text, category).await? {
        println!("Preference saved.");
    } else {
        println!("Already remembered.");
    }
    Ok(())
}

pub async fn set(key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let memory = open().await?;
    memory.set_context(key, value).await?;
    println!("Set {key}.");
    Ok(())
}

pub async fn clear(delete_file: bool) -> Result<(), Box<dyn std::error::Error>> {
    let memory = open().await?;
    if delete_file {
        memory.delete_storage().await?;
        println!("Deleted {}", memory.path().display());
    } else {
        memory.clear().await?;
        println!("Memory cleared.");
    }
    Ok(())
}
