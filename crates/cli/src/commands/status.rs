//! Agent health and readiness

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_warning, OutputFormat};

/// Show agent health and readiness
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "health": health,
            "readiness": readiness,
        })),
        OutputFormat::Table => {
            println!("{}", "Agent Status".bold());
            println!("{}", "=".repeat(50));
            println!("Health:     {}", color_status(&health.status));
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Readiness:  {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                print_warning(reason);
            }
            println!();

            println!("{}", "Components".bold());
            println!("{}", "-".repeat(50));
            let mut names: Vec<&String> = health.components.keys().collect();
            names.sort();
            for name in names {
                let component = &health.components[name];
                match &component.message {
                    Some(message) => println!(
                        "{:<14} {}  {}",
                        name,
                        color_status(&component.status),
                        message.dimmed()
                    ),
                    None => println!("{:<14} {}", name, color_status(&component.status)),
                }
            }
        }
    }

    Ok(())
}
