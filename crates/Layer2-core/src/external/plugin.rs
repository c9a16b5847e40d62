//! External Plugin - 서브프로세스를 SDK capability 계약으로 감싸기
//!
//! 시작 시 `info`로 선언된 capability를 받고, 동기 메서드가 필요한
//! `entity_types`와 `commands`는 미리 받아 캐시합니다.

use super::transport::StdioTransport;
use async_trait::async_trait;
use plexus_foundation::ExternalPluginConfig;
use plexus_sdk::{
    CancellationToken, Capability, Command, CommandContext, CommandProvider, Entity,
    EntityProvider, EntityQuery, EntityTypeDescriptor, EntityUpdate, EntityUpdater, EventEmitter,
    EventSink, Plugin, PluginError, PluginInfo, RecordEntity, Result,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// `info` 응답
#[derive(Debug, Deserialize)]
struct InfoReply {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_plugin_version")]
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    capabilities: Vec<String>,
}

fn default_plugin_version() -> String {
    "0.0.0".to_string()
}

/// `commands` 응답 항목
#[derive(Debug, Clone, Deserialize)]
struct CommandSpec {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    usage: Option<String>,
}

/// 서브프로세스 플러그인
pub struct ExternalPlugin {
    info: PluginInfo,
    declared: Vec<Capability>,
    transport: Arc<StdioTransport>,
    entity_types: Vec<EntityTypeDescriptor>,
    commands: Vec<Arc<dyn Command>>,
}

impl ExternalPlugin {
    /// 설정에 따라 프로세스를 띄우고 핸드셰이크
    pub async fn spawn(config: &ExternalPluginConfig) -> plexus_foundation::Result<Self> {
        let (program, args) = config.command_line()?;
        let transport =
            StdioTransport::spawn(&config.name, &program, &args, &config.env).await?;
        Ok(Self::connect(&config.name, transport).await?)
    }

    /// 이미 연결된 transport로 핸드셰이크
    pub async fn connect(name: &str, transport: StdioTransport) -> Result<Self> {
        let transport = Arc::new(transport);

        let reply: InfoReply = serde_json::from_value(transport.request("info", Value::Null).await?)
            .map_err(|e| PluginError::invalid(format!("malformed info reply: {}", e)))?;

        if let Some(ref reported) = reply.name {
            if reported != name {
                debug!(plugin = %name, reported = %reported, "Plugin reports a different name");
            }
        }

        let declared: Vec<Capability> = reply
            .capabilities
            .iter()
            .filter_map(|c| {
                let parsed = Capability::parse(c);
                if parsed.is_none() {
                    warn!(plugin = %name, capability = %c, "Unknown capability declared");
                }
                parsed
            })
            .collect();

        let entity_types = if declared.contains(&Capability::EntityProvider) {
            serde_json::from_value(transport.request("entity_types", Value::Null).await?)
                .map_err(|e| PluginError::invalid(format!("malformed entity_types reply: {}", e)))?
        } else {
            Vec::new()
        };

        let commands: Vec<Arc<dyn Command>> = if declared.contains(&Capability::CommandProvider) {
            let specs: Vec<CommandSpec> =
                serde_json::from_value(transport.request("commands", Value::Null).await?)
                    .map_err(|e| PluginError::invalid(format!("malformed commands reply: {}", e)))?;
            specs
                .into_iter()
                .map(|spec| {
                    Arc::new(ExternalCommand {
                        transport: Arc::clone(&transport),
                        spec,
                    }) as Arc<dyn Command>
                })
                .collect()
        } else {
            Vec::new()
        };

        let info = PluginInfo::new(name, reply.version).with_description(reply.description);

        Ok(Self {
            info,
            declared,
            transport,
            entity_types,
            commands,
        })
    }

    fn declares(&self, capability: Capability) -> bool {
        self.declared.contains(&capability)
    }

    /// `shutdown` 요청 후 프로세스 종료
    pub async fn shutdown(&self) {
        if self.transport.is_connected() {
            if let Err(e) = self
                .transport
                .request_with_timeout("shutdown", Value::Null, Duration::from_secs(2))
                .await
            {
                debug!(plugin = %self.info.name, error = %e, "Shutdown request failed");
            }
        }
        self.transport.close().await;
    }
}

fn entity_from_value(value: Value) -> Result<Box<dyn Entity>> {
    let entity: RecordEntity = serde_json::from_value(value)
        .map_err(|e| PluginError::invalid(format!("malformed entity: {}", e)))?;
    Ok(Box::new(entity))
}

impl Plugin for ExternalPlugin {
    fn info(&self) -> PluginInfo {
        self.info.clone()
    }

    fn capabilities(&self) -> Vec<String> {
        self.declared.iter().map(|c| c.as_str().to_string()).collect()
    }

    fn as_entity_provider(&self) -> Option<&dyn EntityProvider> {
        if self.declares(Capability::EntityProvider) {
            Some(self)
        } else {
            None
        }
    }

    fn as_entity_updater(&self) -> Option<&dyn EntityUpdater> {
        if self.declares(Capability::EntityUpdater) {
            Some(self)
        } else {
            None
        }
    }

    fn as_command_provider(&self) -> Option<&dyn CommandProvider> {
        if self.declares(Capability::CommandProvider) {
            Some(self)
        } else {
            None
        }
    }

    fn as_event_emitter(&self) -> Option<&dyn EventEmitter> {
        if self.declares(Capability::EventEmitter) {
            Some(self)
        } else {
            None
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl EntityProvider for ExternalPlugin {
    fn entity_types(&self) -> Vec<EntityTypeDescriptor> {
        self.entity_types.clone()
    }

    async fn query(&self, query: &EntityQuery) -> Result<Vec<Box<dyn Entity>>> {
        let reply = self
            .transport
            .request("query", serde_json::to_value(query)?)
            .await?;

        let Value::Array(items) = reply else {
            return Err(PluginError::invalid("query reply must be an array"));
        };
        items.into_iter().map(entity_from_value).collect()
    }

    async fn get_entity(&self, id: &str) -> Result<Box<dyn Entity>> {
        let reply = self.transport.request("get_entity", json!({ "id": id })).await?;
        if reply.is_null() {
            return Err(PluginError::not_found(id));
        }
        entity_from_value(reply)
    }
}

#[async_trait]
impl EntityUpdater for ExternalPlugin {
    async fn update_entity(&self, update: &EntityUpdate) -> Result<Box<dyn Entity>> {
        let reply = self
            .transport
            .request("update_entity", serde_json::to_value(update)?)
            .await?;
        entity_from_value(reply)
    }
}

impl CommandProvider for ExternalPlugin {
    fn commands(&self) -> Vec<Arc<dyn Command>> {
        self.commands.clone()
    }
}

#[async_trait]
impl EventEmitter for ExternalPlugin {
    async fn start_event_stream(&self, cancel: CancellationToken, sink: EventSink) -> Result<()> {
        self.transport.attach_events(sink).await;

        // 취소되면 알림 연결을 끊음
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            cancel.cancelled().await;
            transport.detach_events().await;
        });

        self.transport.request("start_events", Value::Null).await?;
        Ok(())
    }

    async fn stop_event_stream(&self) -> Result<()> {
        let result = self.transport.request("stop_events", Value::Null).await;
        self.transport.detach_events().await;
        result.map(|_| ())
    }
}

// ============================================================================
// ExternalCommand
// ============================================================================

struct ExternalCommand {
    transport: Arc<StdioTransport>,
    spec: CommandSpec,
}

#[async_trait]
impl Command for ExternalCommand {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn usage(&self) -> &str {
        self.spec.usage.as_deref().unwrap_or(&self.spec.name)
    }

    async fn execute(&self, ctx: &mut CommandContext, args: &[String]) -> Result<()> {
        let cwd = ctx.working_dir().display().to_string();
        let reply = self
            .transport
            .request(
                "execute",
                json!({
                    "command": self.spec.name,
                    "args": args,
                    "cwd": cwd,
                }),
            )
            .await?;

        if let Some(stdout) = reply.get("stdout").and_then(Value::as_str) {
            ctx.stdout.write_all(stdout.as_bytes()).await?;
            ctx.stdout.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::transport::WireRequest;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    /// 스크립트대로 답하는 가짜 자식 프로세스
    fn fake_child(replies: fn(&WireRequest) -> Value) -> StdioTransport {
        let (host_out, child_in) = duplex(8192);
        let (mut child_out, host_in) = duplex(8192);

        tokio::spawn(async move {
            let mut lines = BufReader::new(child_in).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: WireRequest = serde_json::from_str(&line).unwrap();
                let mut reply = replies(&request);
                reply["id"] = json!(request.id);
                if child_out
                    .write_all(format!("{}\n", reply).as_bytes())
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        StdioTransport::from_streams("notes", host_out, host_in)
    }

    fn notes_child(request: &WireRequest) -> Value {
        match request.method.as_str() {
            "info" => json!({"result": {
                "version": "1.2.0",
                "description": "Notes",
                "capabilities": ["IEntityProvider", "ICommandProvider", "IBogus"]
            }}),
            "entity_types" => json!({"result": [{"name": "note", "description": "Notes"}]}),
            "commands" => json!({"result": [{"name": "greet", "description": "Say hi"}]}),
            "query" => json!({"result": [
                {"id": "n-1", "type": "note", "fields": {"status": "open"}},
                {"id": "n-2", "type": "note"}
            ]}),
            "get_entity" => json!({"error": {"code": -32001, "message": "no such note"}}),
            "execute" => json!({"result": {"stdout": "hi there\n"}}),
            _ => json!({"error": {"code": -32601, "message": "unknown method"}}),
        }
    }

    #[tokio::test]
    async fn test_handshake_and_probes() {
        let plugin = ExternalPlugin::connect("notes", fake_child(notes_child))
            .await
            .unwrap();

        assert_eq!(plugin.info().version, "1.2.0");
        assert_eq!(
            plugin.capabilities(),
            vec!["IEntityProvider".to_string(), "ICommandProvider".to_string()]
        );
        assert!(plugin.as_entity_provider().is_some());
        assert!(plugin.as_command_provider().is_some());
        assert!(plugin.as_entity_updater().is_none());
        assert!(plugin.as_event_emitter().is_none());
        assert_eq!(plugin.entity_types()[0].name, "note");
    }

    #[tokio::test]
    async fn test_query_and_errors() {
        let plugin = ExternalPlugin::connect("notes", fake_child(notes_child))
            .await
            .unwrap();

        let found = plugin.query(&EntityQuery::of_type("note")).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].as_trackable().is_some());
        assert!(found[1].as_trackable().is_none());

        assert!(matches!(
            plugin.get_entity("n-9").await,
            Err(PluginError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_external_command() {
        let plugin = ExternalPlugin::connect("notes", fake_child(notes_child))
            .await
            .unwrap();
        let command = plugin.commands().remove(0);
        assert_eq!(command.usage(), "greet");

        let (mut reader, writer) = duplex(256);
        let mut ctx = CommandContext::new(
            "/tmp",
            Box::new(tokio::io::empty()),
            Box::new(writer),
            Box::new(tokio::io::sink()),
        );
        command.execute(&mut ctx, &[]).await.unwrap();
        drop(ctx);

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut out)
            .await
            .unwrap();
        assert_eq!(out, "hi there\n");
    }
}
