//! Entry listing and remote writes

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, Entry, EntryValue};
use crate::output::{format_persistent, print_json, print_success, print_table, OutputFormat};

/// Row for entries table
#[derive(Tabled, Serialize)]
struct EntryRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Persistent")]
    persistent: String,
}

impl From<&Entry> for EntryRow {
    fn from(entry: &Entry) -> Self {
        Self {
            key: entry.key.clone(),
            kind: entry.value.type_name().to_string(),
            value: entry.value.to_string(),
            persistent: format_persistent(entry.persistent),
        }
    }
}

/// List entries, optionally under a key prefix
pub async fn list_entries(
    client: &ApiClient,
    prefix: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let entries = client.list_entries(prefix.as_deref()).await?;

    match format {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Table => {
            let rows: Vec<EntryRow> = entries.iter().map(EntryRow::from).collect();
            print_table(&rows, format);
            if !rows.is_empty() {
                println!("\nTotal: {} entries", rows.len());
            }
        }
    }

    Ok(())
}

/// Show a single entry
pub async fn get_entry(client: &ApiClient, key: &str, format: OutputFormat) -> Result<()> {
    let entry = client.get_entry(key).await?;

    match format {
        OutputFormat::Json => print_json(&entry),
        OutputFormat::Table => {
            println!("{} = {}", entry.key.cyan(), entry.value.to_string().bold());
            println!(
                "type: {}  persistent: {}",
                entry.value.type_name(),
                format_persistent(entry.persistent)
            );
        }
    }

    Ok(())
}

/// Write a value the way a remote dashboard would
pub async fn set_entry(
    client: &ApiClient,
    key: &str,
    raw: &str,
    format: OutputFormat,
) -> Result<()> {
    let value = EntryValue::parse(raw);
    let entry = client.set_entry(key, value).await?;

    match format {
        OutputFormat::Json => print_json(&entry),
        OutputFormat::Table => {
            print_success(&format!("{} = {}", entry.key, entry.value));
            println!("Applied on the agent's next control cycle");
        }
    }

    Ok(())
}
