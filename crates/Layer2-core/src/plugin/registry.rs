//! Plugin Registry - 플러그인 저장소
//!
//! 등록 시점에 모든 capability probe를 한 번 실행하고 결과를 인덱스로
//! 캐시합니다. 이후 조회는 probe를 다시 부르지 않습니다.

use plexus_foundation::{Error, Result};
use plexus_sdk::{Capability, Plugin, PluginInfo};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 등록된 플러그인 항목
struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    info: PluginInfo,
    capabilities: Vec<Capability>,
}

#[derive(Default)]
struct RegistryInner {
    /// 이름순 정렬 (BTreeMap)
    plugins: BTreeMap<String, PluginEntry>,

    /// capability -> 플러그인 이름들
    by_capability: HashMap<Capability, BTreeSet<String>>,
}

/// 플러그인 레지스트리 - 이름과 capability로 인덱싱
pub struct PluginRegistry {
    inner: RwLock<RegistryInner>,
}

impl PluginRegistry {
    /// 새 레지스트리 생성
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// 플러그인 등록
    ///
    /// 같은 이름이 이미 있으면 `AlreadyExists`, 레지스트리는 변경되지 않음
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> Result<PluginInfo> {
        let info = plugin.info();
        let name = info.name.clone();

        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "plugin name must not be empty".to_string(),
            ));
        }
        if name.trim() != name {
            return Err(Error::InvalidArgument(format!(
                "plugin name '{}' has leading or trailing whitespace",
                name
            )));
        }

        let mut inner = self.inner.write().await;

        if inner.plugins.contains_key(&name) {
            return Err(Error::AlreadyExists(format!("plugin '{}'", name)));
        }

        let capabilities: Vec<Capability> = Capability::ALL
            .into_iter()
            .filter(|cap| cap.is_supported_by(plugin.as_ref()))
            .collect();

        for cap in &capabilities {
            inner
                .by_capability
                .entry(*cap)
                .or_default()
                .insert(name.clone());
        }

        let declared = plugin.capabilities();
        for cap in &capabilities {
            if !declared.iter().any(|d| d == cap.as_str()) {
                debug!(plugin = %name, capability = %cap, "Capability probed but not declared");
            }
        }

        info!(
            plugin = %name,
            version = %info.version,
            capabilities = ?capabilities,
            "Registered plugin"
        );

        inner.plugins.insert(
            name,
            PluginEntry {
                plugin,
                info: info.clone(),
                capabilities,
            },
        );

        Ok(info)
    }

    /// 플러그인 조회
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        let inner = self.inner.read().await;
        inner
            .plugins
            .get(name)
            .map(|entry| Arc::clone(&entry.plugin))
            .ok_or_else(|| Error::NotFound(format!("plugin '{}'", name)))
    }

    /// 모든 플러그인 (이름순)
    pub async fn all(&self) -> Vec<Arc<dyn Plugin>> {
        let inner = self.inner.read().await;
        inner
            .plugins
            .values()
            .map(|entry| Arc::clone(&entry.plugin))
            .collect()
    }

    /// 모든 플러그인 정보 (이름순)
    pub async fn infos(&self) -> Vec<PluginInfo> {
        let inner = self.inner.read().await;
        inner.plugins.values().map(|entry| entry.info.clone()).collect()
    }

    /// 특정 capability를 지원하는 플러그인 (이름순)
    pub async fn with_capability(&self, capability: Capability) -> Vec<Arc<dyn Plugin>> {
        let inner = self.inner.read().await;
        let Some(names) = inner.by_capability.get(&capability) else {
            return Vec::new();
        };

        names
            .iter()
            .filter_map(|name| inner.plugins.get(name))
            .map(|entry| Arc::clone(&entry.plugin))
            .collect()
    }

    /// 캐시된 probe 결과로 지원 여부 확인
    pub async fn supports(&self, name: &str, capability: Capability) -> bool {
        let inner = self.inner.read().await;
        inner
            .by_capability
            .get(&capability)
            .is_some_and(|names| names.contains(name))
    }

    /// 플러그인의 캐시된 capability 목록
    pub async fn capabilities_of(&self, name: &str) -> Result<Vec<Capability>> {
        let inner = self.inner.read().await;
        inner
            .plugins
            .get(name)
            .map(|entry| entry.capabilities.clone())
            .ok_or_else(|| Error::NotFound(format!("plugin '{}'", name)))
    }

    /// 플러그인 존재 여부 확인
    pub async fn contains(&self, name: &str) -> bool {
        let inner = self.inner.read().await;
        inner.plugins.contains_key(name)
    }

    /// 플러그인 수
    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.plugins.len()
    }

    /// 비어있는지 확인
    pub async fn is_empty(&self) -> bool {
        let inner = self.inner.read().await;
        inner.plugins.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use plexus_sdk::{
        EventEmitter, EventSink, CancellationToken, Result as PluginResult,
    };
    use std::any::Any;

    struct TestPlugin {
        name: String,
    }

    impl Plugin for TestPlugin {
        fn info(&self) -> PluginInfo {
            PluginInfo::new(&self.name, "0.1.0")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Emitter;

    impl Plugin for Emitter {
        fn info(&self) -> PluginInfo {
            PluginInfo::new("emitter", "0.1.0")
        }

        fn as_event_emitter(&self) -> Option<&dyn EventEmitter> {
            Some(self)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[async_trait]
    impl EventEmitter for Emitter {
        async fn start_event_stream(
            &self,
            _cancel: CancellationToken,
            _sink: EventSink,
        ) -> PluginResult<()> {
            Ok(())
        }

        async fn stop_event_stream(&self) -> PluginResult<()> {
            Ok(())
        }
    }

    fn plugin(name: &str) -> Arc<dyn Plugin> {
        Arc::new(TestPlugin { name: name.into() })
    }

    #[tokio::test]
    async fn test_register_plugin() {
        let registry = PluginRegistry::new();
        registry.register(plugin("notes")).await.unwrap();

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("notes").await.unwrap().info().name, "notes");

        let all = registry.all().await;
        assert_eq!(all.iter().filter(|p| p.info().name == "notes").count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let registry = PluginRegistry::new();
        registry.register(plugin("notes")).await.unwrap();

        let err = registry.register(plugin("notes")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let registry = PluginRegistry::new();
        let err = registry.register(plugin("  ")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_padded_name_rejected() {
        let registry = PluginRegistry::new();
        for name in [" notes", "notes ", "\tnotes"] {
            let err = registry.register(plugin(name)).await.unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{:?}", name);
        }
        assert!(registry.is_empty().await);

        registry.register(plugin("notes")).await.unwrap();
        assert!(registry.get("notes").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.get("ghost").await,
            Err(Error::NotFound(_))
        ));
        assert!(registry.capabilities_of("ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_sorted_snapshots() {
        let registry = PluginRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(plugin(name)).await.unwrap();
        }

        let names: Vec<_> = registry.infos().await.into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_capability_index() {
        let registry = PluginRegistry::new();
        registry.register(plugin("plain")).await.unwrap();
        registry.register(Arc::new(Emitter)).await.unwrap();

        let emitters = registry.with_capability(Capability::EventEmitter).await;
        assert_eq!(emitters.len(), 1);
        assert_eq!(emitters[0].info().name, "emitter");

        assert!(registry.supports("emitter", Capability::EventEmitter).await);
        assert!(!registry.supports("plain", Capability::EventEmitter).await);
        assert!(registry
            .with_capability(Capability::EntityProvider)
            .await
            .is_empty());
        assert_eq!(
            registry.capabilities_of("emitter").await.unwrap(),
            vec![Capability::EventEmitter]
        );
        assert!(registry.contains("plain").await);
    }
}
