//! Entity Service - 엔티티 쿼리 라우팅
//!
//! 레지스트리의 entity provider들에게 쿼리를 동시에 보내고, 결과를
//! 어댑터로 감싼 뒤 전역으로 필터/정렬/페이징합니다.

use super::adapter::{query_to_sdk, type_info_from_sdk, EntityAdapter};
use super::{EntityQuery, EntityTypeInfo};
use crate::plugin::PluginRegistry;
use futures::future::join_all;
use plexus_foundation::{Error, Result};
use plexus_sdk::{Capability, EntityUpdate, Plugin};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct EntityService {
    registry: Arc<PluginRegistry>,
}

impl EntityService {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// 모든 provider의 엔티티 타입 (플러그인 이름 태그)
    pub async fn entity_types(&self) -> Vec<EntityTypeInfo> {
        let mut types = Vec::new();
        for plugin in self.registry.with_capability(Capability::EntityProvider).await {
            let Some(provider) = plugin.as_entity_provider() else {
                continue;
            };
            let name = plugin.info().name;
            types.extend(
                provider
                    .entity_types()
                    .iter()
                    .map(|descriptor| type_info_from_sdk(descriptor, &name)),
            );
        }
        types
    }

    /// 전체 provider에 쿼리
    ///
    /// 실패한 provider는 경고 후 건너뜁니다.
    pub async fn query(&self, query: &EntityQuery) -> Result<Vec<EntityAdapter>> {
        validate(query)?;

        let providers = self.providers_for(query).await;
        if providers.is_empty() {
            return Ok(Vec::new());
        }

        // provider는 offset+limit 까지만 돌려주면 충분 (각자 같은 기준으로 정렬)
        let mut sdk_query = query_to_sdk(query);
        sdk_query.offset = 0;
        sdk_query.limit = query.limit.map(|limit| query.offset.saturating_add(limit));
        let sdk_query = &sdk_query;

        let results = join_all(providers.iter().map(|plugin| async move {
            let name = plugin.info().name;
            let outcome = match plugin.as_entity_provider() {
                Some(provider) => provider.query(sdk_query).await,
                None => Ok(Vec::new()),
            };
            (name, outcome)
        }))
        .await;

        let mut entities = Vec::new();
        for (plugin, outcome) in results {
            match outcome {
                Ok(found) => {
                    debug!(plugin = %plugin, count = found.len(), "Provider answered query");
                    entities.extend(
                        found
                            .into_iter()
                            .filter(|e| sdk_query.matches(e.as_ref()))
                            .map(|e| EntityAdapter::new(e, plugin.clone())),
                    );
                }
                Err(e) => warn!(plugin = %plugin, error = %e, "Entity query failed"),
            }
        }

        if sdk_query.sort_by.is_some() {
            entities.sort_by(|a, b| sdk_query.compare(a.inner(), b.inner()));
        }

        let page = query_to_sdk(query);
        Ok(page.page(entities))
    }

    /// 특정 플러그인의 엔티티 하나
    pub async fn get_entity(&self, plugin: &str, id: &str) -> Result<EntityAdapter> {
        let plugin_ref = self.registry.get(plugin).await?;
        let provider = plugin_ref.as_entity_provider().ok_or_else(|| {
            Error::NotFound(format!("plugin '{}' does not provide entities", plugin))
        })?;

        let entity = provider.get_entity(id).await?;
        Ok(EntityAdapter::new(entity, plugin))
    }

    /// 엔티티 수정 (updater가 아니면 ReadOnly)
    pub async fn update_entity(&self, plugin: &str, update: &EntityUpdate) -> Result<EntityAdapter> {
        if update.id.trim().is_empty() {
            return Err(Error::InvalidArgument("entity id is empty".to_string()));
        }

        let plugin_ref = self.registry.get(plugin).await?;
        let updater = plugin_ref
            .as_entity_updater()
            .ok_or_else(|| Error::ReadOnly(format!("plugin '{}' is read-only", plugin)))?;

        let entity = updater.update_entity(update).await?;
        Ok(EntityAdapter::new(entity, plugin))
    }

    async fn providers_for(&self, query: &EntityQuery) -> Vec<Arc<dyn Plugin>> {
        let providers = self.registry.with_capability(Capability::EntityProvider).await;
        let Some(ref wanted) = query.entity_type else {
            return providers;
        };

        providers
            .into_iter()
            .filter(|plugin| {
                plugin.as_entity_provider().is_some_and(|provider| {
                    provider.entity_types().iter().any(|t| &t.name == wanted)
                })
            })
            .collect()
    }
}

fn validate(query: &EntityQuery) -> Result<()> {
    if let Some(ref entity_type) = query.entity_type {
        if entity_type.trim().is_empty() {
            return Err(Error::InvalidArgument("entity type filter is empty".to_string()));
        }
    }
    if query.filters.keys().any(|key| key.trim().is_empty()) {
        return Err(Error::InvalidArgument("filter key is empty".to_string()));
    }
    if query.capabilities.iter().any(|cap| cap.trim().is_empty()) {
        return Err(Error::InvalidArgument("capability filter is empty".to_string()));
    }
    Ok(())
}
