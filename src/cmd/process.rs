//! Local pipeline commands: `supportdesk process` and `process-pending`.

use anyhow::Result;

use supportdesk::config::SupportConfig;
use supportdesk::errors::SupportError;
use supportdesk::support::db::{DbHandle, SupportDb};
use supportdesk::support::server::build_agent;

fn open_handle(config: &SupportConfig) -> Result<DbHandle> {
    Ok(DbHandle::new(SupportDb::new(&config.database.path)?))
}

pub async fn cmd_process(
    config: &SupportConfig,
    email: &str,
    subject: &str,
    message: &str,
) -> Result<()> {
    let db = open_handle(config)?;
    let agent = build_agent(db.clone(), config);

    let lookup = email.trim().to_string();
    let client = db
        .call(move |db| db.get_client_by_email(&lookup))
        .await?
        .ok_or_else(|| SupportError::ClientNotFound {
            email: email.trim().to_string(),
        })?;

    let (email, subject, message) = (
        client.email.clone(),
        subject.to_string(),
        message.to_string(),
    );
    let name = client.display_name();
    let ticket = db
        .call(move |db| db.create_ticket(&email, Some(&name), &subject, &message))
        .await?;
    tracing::info!(ticket = %ticket.ticket_id, "Ticket created");

    let handled = agent.handle_ticket(&ticket).await?;
    println!("{}", serde_json::to_string_pretty(&handled)?);
    Ok(())
}

pub async fn cmd_process_pending(config: &SupportConfig, limit: usize) -> Result<()> {
    let db = open_handle(config)?;
    let agent = build_agent(db, config);

    let results = agent.process_pending(limit).await?;
    if results.is_empty() {
        println!("No pending tickets.");
        return Ok(());
    }

    for item in &results {
        if item.success {
            println!(
                "  ok    {}  {}  quality {:.2}",
                item.ticket_id,
                item.category.map(|c| c.as_str()).unwrap_or("-"),
                item.quality_score.unwrap_or(0.0)
            );
        } else {
            println!(
                "  fail  {}  {}",
                item.ticket_id,
                item.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    let ok = results.iter().filter(|r| r.success).count();
    println!();
    println!("{} processed, {} failed", ok, results.len() - ok);
    Ok(())
}
