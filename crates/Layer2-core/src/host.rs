//! Host - 구성 루트
//!
//! 레지스트리, 저장소, 디스패처, 엔티티/명령 라우팅을 한 번 만들어
//! 명시적으로 넘겨줍니다.

use crate::builtin::{HooksPlugin, SessionsPlugin};
use crate::command::{CommandInfo, CommandRouter};
use crate::dispatch::EventDispatcher;
use crate::entity::EntityService;
use crate::external::ExternalPlugin;
use crate::plugin::PluginRegistry;
use plexus_foundation::{EventStore, PlexusConfig, Result, Storage};
use plexus_sdk::{CommandContext, Plugin, PluginInfo};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Host {
    config: PlexusConfig,
    registry: Arc<PluginRegistry>,
    store: Arc<dyn EventStore>,
    dispatcher: Arc<EventDispatcher>,
    entities: EntityService,
    commands: CommandRouter,
}

impl Host {
    /// 저장소를 직접 지정 (테스트, 임베딩)
    pub fn new(config: PlexusConfig, store: Arc<dyn EventStore>) -> Self {
        let registry = Arc::new(PluginRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&store),
            config.dispatcher.clone(),
        ));

        Self {
            entities: EntityService::new(Arc::clone(&registry)),
            commands: CommandRouter::new(Arc::clone(&registry)),
            config,
            registry,
            store,
            dispatcher,
        }
    }

    /// `<data_dir>/plexus.db`를 열고 core + 외부 플러그인까지 등록
    pub async fn open(config: PlexusConfig) -> Result<Self> {
        let storage = Storage::new(&config.data_dir()?)?;
        let host = Self::new(config, Arc::new(storage));

        host.register_builtins().await?;
        host.load_external_plugins().await;
        Ok(host)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// 플러그인 등록 (event emitter면 producer로도 등록)
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> Result<PluginInfo> {
        let info = self.registry.register(Arc::clone(&plugin)).await?;
        if plugin.as_event_emitter().is_some() {
            self.dispatcher.register_producer(plugin).await?;
        }
        Ok(info)
    }

    pub async fn register_builtins(&self) -> Result<()> {
        self.register(Arc::new(HooksPlugin)).await?;
        self.register(Arc::new(SessionsPlugin::new(Arc::clone(&self.store))))
            .await?;
        Ok(())
    }

    /// 설정된 서브프로세스 플러그인 로드
    ///
    /// 실패한 플러그인은 경고 후 건너뛰고, 로드된 이름을 돌려줍니다.
    pub async fn load_external_plugins(&self) -> Vec<String> {
        let mut loaded = Vec::new();

        for config in self.config.external_plugins.iter().filter(|p| p.enabled) {
            let plugin = match ExternalPlugin::spawn(config).await {
                Ok(plugin) => Arc::new(plugin),
                Err(e) => {
                    warn!(plugin = %config.name, error = %e, "Failed to start external plugin");
                    continue;
                }
            };

            match self.register(plugin.clone()).await {
                Ok(_) => loaded.push(config.name.clone()),
                Err(e) => {
                    warn!(plugin = %config.name, error = %e, "Failed to register external plugin");
                    plugin.shutdown().await;
                }
            }
        }

        if !loaded.is_empty() {
            info!(plugins = ?loaded, "Loaded external plugins");
        }
        loaded
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &PlexusConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn entities(&self) -> &EntityService {
        &self.entities
    }

    pub fn commands(&self) -> &CommandRouter {
        &self.commands
    }

    pub async fn list_commands(&self) -> Vec<CommandInfo> {
        self.commands.list().await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub async fn start(&self) -> Result<()> {
        self.dispatcher.start().await
    }

    pub async fn stop(&self) -> Result<()> {
        self.dispatcher.stop().await
    }

    /// 명령 실행
    ///
    /// 파이프라인이 꺼져 있으면 실행 동안만 켜서 emit된 이벤트가 저장되게 합니다.
    pub async fn run_command(
        &self,
        name: &str,
        args: &[String],
        ctx: CommandContext,
    ) -> Result<()> {
        let started_here = !self.dispatcher.is_running().await;
        if started_here {
            self.dispatcher.start().await?;
        }

        let mut ctx = ctx.with_events(self.dispatcher.sink().await?);
        let result = self.commands.execute(name, args, &mut ctx).await;
        drop(ctx);

        if started_here {
            if let Err(e) = self.dispatcher.stop().await {
                warn!(error = %e, "Failed to stop event pipeline after command");
            }
        }
        result
    }

    /// 파이프라인 정지 + 외부 프로세스 종료
    pub async fn shutdown(&self) {
        if self.dispatcher.is_running().await {
            if let Err(e) = self.dispatcher.stop().await {
                warn!(error = %e, "Failed to stop event pipeline");
            }
        }

        for plugin in self.registry.all().await {
            if let Some(external) = plugin.as_any().downcast_ref::<ExternalPlugin>() {
                external.shutdown().await;
            }
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("data_dir", &self.config.data_dir)
            .finish_non_exhaustive()
    }
}
