//! Hooks plugin - 에디터/도구 훅 페이로드를 이벤트로
//!
//! ```text
//! echo '{"session_id":"abc","hook_event_name":"PreToolUse",...}' | plexus run emit
//! ```
//!
//! 이벤트 타입은 인자로 주거나, 없으면 `hook_event_name`에서 유도합니다.

use async_trait::async_trait;
use plexus_sdk::{
    Command, CommandContext, CommandProvider, Event, Plugin, PluginError, PluginInfo, Result,
};
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::debug;

pub const HOOKS_PLUGIN: &str = "hooks";

/// 세션 id 환경변수 (페이로드에 없을 때)
pub const SESSION_ENV: &str = "PLEXUS_SESSION_ID";

pub struct HooksPlugin;

impl Plugin for HooksPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(HOOKS_PLUGIN, env!("CARGO_PKG_VERSION"))
            .with_description("Turns hook payloads into events")
            .core()
    }

    fn as_command_provider(&self) -> Option<&dyn CommandProvider> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl CommandProvider for HooksPlugin {
    fn commands(&self) -> Vec<Arc<dyn Command>> {
        vec![Arc::new(EmitCommand)]
    }
}

/// 훅 이름 → 이벤트 타입
pub fn hook_event_type(hook: &str) -> String {
    match hook {
        "SessionStart" => "session.started".to_string(),
        "SessionEnd" => "session.ended".to_string(),
        "UserPromptSubmit" => "chat.started".to_string(),
        "Stop" => "chat.ended".to_string(),
        "PreToolUse" => "tool.pre_use".to_string(),
        "PostToolUse" => "tool.post_use".to_string(),
        other => format!("hook.{}", snake_case(other)),
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

struct EmitCommand;

#[derive(Debug, Default, PartialEq)]
struct EmitArgs {
    event_type: Option<String>,
    session: Option<String>,
}

fn parse_args(args: &[String]) -> Result<EmitArgs> {
    let mut parsed = EmitArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--session" | "-s" => {
                let value = iter
                    .next()
                    .ok_or_else(|| PluginError::invalid("--session needs a value"))?;
                parsed.session = Some(value.clone());
            }
            flag if flag.starts_with('-') => {
                return Err(PluginError::invalid(format!("unknown flag '{}'", flag)));
            }
            value => {
                if parsed.event_type.is_some() {
                    return Err(PluginError::invalid(format!("unexpected argument '{}'", value)));
                }
                parsed.event_type = Some(value.to_string());
            }
        }
    }
    Ok(parsed)
}

fn str_field<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

#[async_trait]
impl Command for EmitCommand {
    fn name(&self) -> &str {
        "emit"
    }

    fn description(&self) -> &str {
        "Read a hook payload (JSON) from stdin and emit it as an event"
    }

    fn usage(&self) -> &str {
        "emit [event-type] [--session <id>]"
    }

    async fn execute(&self, ctx: &mut CommandContext, args: &[String]) -> Result<()> {
        let args = parse_args(args)?;

        let mut raw = String::new();
        ctx.stdin.read_to_string(&mut raw).await?;

        let payload = if raw.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => map,
                _ => return Err(PluginError::invalid("hook payload must be a JSON object")),
            }
        };

        let hook = str_field(&payload, "hook_event_name").map(str::to_string);
        let event_type = args
            .event_type
            .or_else(|| hook.as_deref().map(hook_event_type))
            .ok_or_else(|| {
                PluginError::invalid("no event type given and payload has no hook_event_name")
            })?;

        let session_id = args
            .session
            .or_else(|| str_field(&payload, "session_id").map(str::to_string))
            .or_else(|| std::env::var(SESSION_ENV).ok().filter(|s| !s.is_empty()))
            .ok_or_else(|| PluginError::invalid("no session id in arguments, payload or environment"))?;

        let cwd = str_field(&payload, "cwd")
            .map(str::to_string)
            .unwrap_or_else(|| ctx.working_dir().display().to_string());

        let mut event = Event::new(event_type, HOOKS_PLUGIN)
            .with_session(session_id)
            .with_metadata("cwd", cwd);
        if let Some(hook) = hook {
            event = event.with_metadata("hook", hook);
        }
        event.payload = payload;

        debug!(parent: &ctx.span, event_type = %event.event_type, "Emitting hook event");
        ctx.emit_event(event).await
    }
}
