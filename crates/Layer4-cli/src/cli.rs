//! Non-interactive subcommands

use plexus_core::{EntityQuery, Host};
use plexus_foundation::{ActivityRecord, EventRecord};
use plexus_sdk::{CancellationToken, CommandContext};
use std::time::Duration;
use tracing::info;

/// `--filter key=value`
pub fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

pub fn build_query(
    entity_type: Option<String>,
    filters: Vec<(String, String)>,
    capabilities: Vec<String>,
    limit: Option<usize>,
    offset: Option<usize>,
    sort: Option<String>,
    desc: bool,
) -> EntityQuery {
    let mut query = match entity_type {
        Some(ty) => EntityQuery::of_type(ty),
        None => EntityQuery::new(),
    };
    for (key, value) in filters {
        query = query.with_filter(key, value);
    }
    for capability in capabilities {
        query = query.with_capability(capability);
    }
    if let Some(limit) = limit {
        query = query.with_limit(limit);
    }
    if let Some(offset) = offset {
        query = query.with_offset(offset);
    }
    if let Some(field) = sort {
        query = query.sorted_by(field, desc);
    }
    query
}

pub async fn list_plugins(host: &Host) -> anyhow::Result<()> {
    let plugins = host.registry().all().await;
    if plugins.is_empty() {
        println!("No plugins registered.");
        return Ok(());
    }

    println!("{:<16} {:<10} {:<6} {}", "Name", "Version", "Core", "Capabilities");
    println!("{}", "-".repeat(72));
    for plugin in plugins {
        let info = plugin.info();
        let capabilities = plugin.capabilities();
        println!(
            "{:<16} {:<10} {:<6} {}",
            info.name,
            info.version,
            if info.is_core { "yes" } else { "" },
            capabilities.join(", ")
        );
    }
    Ok(())
}

pub async fn list_commands(host: &Host) -> anyhow::Result<()> {
    let commands = host.list_commands().await;
    if commands.is_empty() {
        println!("No commands available.");
        return Ok(());
    }

    for command in commands {
        println!("{}:{}", command.plugin, command.name);
        println!("    {}", command.description);
        if !command.usage.is_empty() {
            println!("    usage: {}", command.usage);
        }
    }
    Ok(())
}

pub async fn run_command(host: &Host, name: &str, args: &[String]) -> anyhow::Result<()> {
    let working_dir = std::env::current_dir()?;
    let cancel = CancellationToken::new();

    // Ctrl-C → 명령 취소
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let ctx = CommandContext::stdio(working_dir).with_cancel(cancel);
    let result = host.run_command(name, args, ctx).await;
    ctrl_c.abort();

    Ok(result?)
}

pub async fn query(host: &Host, query: &EntityQuery) -> anyhow::Result<()> {
    let entities = host.entities().query(query).await?;
    for entity in &entities {
        println!("{}", serde_json::to_string(&entity.to_json())?);
    }
    info!(count = entities.len(), "Query finished");
    Ok(())
}

pub async fn list_events(host: &Host, limit: u32) -> anyhow::Result<()> {
    let events = host.store().recent_events(limit).await?;
    if events.is_empty() {
        println!("No events recorded.");
        return Ok(());
    }

    println!("{:<20} {:<24} {:<14} {}", "Time", "Type", "Session", "Source");
    println!("{}", "-".repeat(72));
    for event in events {
        print_event(&event);
    }
    Ok(())
}

fn print_event(event: &EventRecord) {
    println!(
        "{:<20} {:<24} {:<14} {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.event_type,
        short_id(&event.session_id),
        event.source
    );
}

pub async fn list_sessions(host: &Host, limit: Option<u32>) -> anyhow::Result<()> {
    let sessions = host.store().list_activity(limit).await?;
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<14} {:<8} {:<8} {:<20} {}",
        "Session", "Status", "Events", "Last seen", "Last event"
    );
    println!("{}", "-".repeat(80));
    for session in sessions {
        print_session(&session);
    }
    Ok(())
}

fn print_session(session: &ActivityRecord) {
    println!(
        "{:<14} {:<8} {:<8} {:<20} {}",
        short_id(&session.session_id),
        if session.ended { "ended" } else { "active" },
        session.event_count,
        session.last_seen.format("%Y-%m-%d %H:%M:%S"),
        session.last_event_type
    );
}

/// 파이프라인을 켜고 Ctrl-C까지 대기
pub async fn watch(host: &Host, interval_secs: u64) -> anyhow::Result<()> {
    host.start().await?;
    eprintln!("Watching events. Press Ctrl-C to stop.");

    let mut ticker = (interval_secs > 0)
        .then(|| tokio::time::interval(Duration::from_secs(interval_secs)));

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = async {
                match ticker.as_mut() {
                    Some(ticker) => { ticker.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                let metrics = host.dispatcher().metrics().await;
                info!(
                    processed = metrics.processed,
                    failed = metrics.failed,
                    queued = metrics.queue_len,
                    "Pipeline metrics"
                );
            }
        }
    }

    host.stop().await?;
    let metrics = host.dispatcher().metrics().await;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse_filter("status=done").unwrap(),
            ("status".to_string(), "done".to_string())
        );
        assert_eq!(
            parse_filter("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_filter("status").is_err());
        assert!(parse_filter("=done").is_err());
    }

    #[test]
    fn test_build_query() {
        let query = build_query(
            Some("task".into()),
            vec![("status".into(), "done".into())],
            vec!["trackable".into()],
            Some(10),
            Some(5),
            Some("due_date".into()),
            true,
        );
        assert_eq!(query.entity_type.as_deref(), Some("task"));
        assert_eq!(query.filters.get("status").map(String::as_str), Some("done"));
        assert_eq!(query.capabilities, vec!["trackable"]);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, 5);
        assert_eq!(query.sort_by.as_deref(), Some("due_date"));
        assert!(query.descending);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
    }
}
