//! Command Routing - 명령어 이름 → 소유 플러그인
//!
//! `name` 또는 `plugin:name` 형태로 찾습니다. 이름이 겹치면 플러그인 이름순으로
//! 먼저 오는 쪽이 이깁니다.

use crate::plugin::PluginRegistry;
use plexus_foundation::{Error, Result};
use plexus_sdk::{Capability, Command, CommandContext};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// 명령어 목록 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    pub plugin: String,
    pub name: String,
    pub description: String,
    pub usage: String,
}

pub struct CommandRouter {
    registry: Arc<PluginRegistry>,
}

impl CommandRouter {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// 모든 명령어 (이름, 플러그인 순)
    pub async fn list(&self) -> Vec<CommandInfo> {
        let mut commands: Vec<CommandInfo> = self
            .all_commands()
            .await
            .into_iter()
            .map(|(plugin, command)| CommandInfo {
                plugin,
                name: command.name().to_string(),
                description: command.description().to_string(),
                usage: command.usage().to_string(),
            })
            .collect();

        commands.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.plugin.cmp(&b.plugin)));
        commands
    }

    /// 이름으로 명령어 찾기
    pub async fn resolve(&self, name: &str) -> Result<(String, Arc<dyn Command>)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("command name is empty".to_string()));
        }

        let (plugin_filter, command_name) = match name.split_once(':') {
            Some((plugin, command)) => (Some(plugin), command),
            None => (None, name),
        };

        self.all_commands()
            .await
            .into_iter()
            .filter(|(plugin, _)| plugin_filter.map_or(true, |p| p == plugin.as_str()))
            .find(|(_, command)| command.name() == command_name)
            .ok_or_else(|| Error::NotFound(format!("command '{}'", name)))
    }

    /// 명령어 실행
    pub async fn execute(&self, name: &str, args: &[String], ctx: &mut CommandContext) -> Result<()> {
        let (plugin, command) = self.resolve(name).await?;

        let span = info_span!("command", plugin = %plugin, command = %command.name());
        ctx.span = span.clone();

        debug!(parent: &span, args = ?args, "Executing command");
        command
            .execute(ctx, args)
            .instrument(span)
            .await
            .map_err(Error::from)
    }

    async fn all_commands(&self) -> Vec<(String, Arc<dyn Command>)> {
        let mut commands = Vec::new();
        for plugin in self.registry.with_capability(Capability::CommandProvider).await {
            let Some(provider) = plugin.as_command_provider() else {
                continue;
            };
            let name = plugin.info().name;
            commands.extend(provider.commands().into_iter().map(|c| (name.clone(), c)));
        }
        commands
    }
}
