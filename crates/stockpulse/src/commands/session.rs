use chrono::{DateTime, Utc};
use stockpulse_core::SessionRecord;

use super::Context;

fn format_record(record: &SessionRecord) -> String {
    let started = DateTime::<Utc>::from_timestamp_millis(record.stored_at)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "?".to_string());
    format!(
        "  {} | task:{} kind:{} started:{}",
        record.subject, record.task_id, record.analysis_kind, started
    )
}

pub fn run_list() -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let records = ctx.sessions().list()?;
    if records.is_empty() {
        println!("No saved sessions");
        return Ok(());
    }

    println!("Sessions ({})", records.len());
    println!("=============");
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

pub fn run_show(company: &str) -> anyhow::Result<()> {
    let ctx = Context::load()?;
    match ctx.sessions().load(company) {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("No live session for {}", company),
    }
    Ok(())
}

pub fn run_clear(company: &str) -> anyhow::Result<()> {
    let ctx = Context::load()?;
    ctx.sessions().clear(company)?;
    println!("Cleared session for {}", company);
    Ok(())
}
