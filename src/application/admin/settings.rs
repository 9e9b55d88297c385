use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::application::error::ServiceError;
use crate::application::index_sync::{IndexSync, ReindexSummary};
use crate::application::repos::{SettingsRepo, UpdateSettingParams};
use crate::cache::CacheTrigger;
use crate::domain::entities::SettingRecord;
use crate::domain::validation::Violations;

use super::trimmed;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingInput {
    pub name: Option<String>,
    pub icp: Option<String>,
    pub copyright: Option<String>,
}

#[derive(Clone)]
pub struct AdminSettingsService {
    repo: Arc<dyn SettingsRepo>,
    sync: IndexSync,
    cache: Arc<CacheTrigger>,
}

impl AdminSettingsService {
    pub fn new(repo: Arc<dyn SettingsRepo>, sync: IndexSync, cache: Arc<CacheTrigger>) -> Self {
        Self { repo, sync, cache }
    }

    pub async fn get(&self) -> Result<SettingRecord, ServiceError> {
        self.repo
            .find_setting()
            .await?
            .ok_or(ServiceError::NotFound("setting"))
    }

    pub async fn update(&self, input: SettingInput) -> Result<SettingRecord, ServiceError> {
        let mut v = Violations::new();
        v.optional_length("name", input.name.as_deref(), 1, 255);
        v.into_result()?;

        let params = UpdateSettingParams {
            name: trimmed(input.name),
            icp: trimmed(input.icp),
            copyright: trimmed(input.copyright),
        };
        let setting = self.repo.update_setting(params).await?;
        self.cache.setting_updated().await?;
        Ok(setting)
    }

    /// Drop every cache entry.
    pub async fn flush_cache(&self) -> Result<(), ServiceError> {
        self.cache.flush_all().await?;
        info!("Cache flushed");
        Ok(())
    }

    pub async fn reindex(&self) -> Result<ReindexSummary, ServiceError> {
        self.sync.reindex().await
    }
}
