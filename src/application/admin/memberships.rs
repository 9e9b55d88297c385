use std::sync::Arc;

use serde::Deserialize;

use crate::application::error::ServiceError;
use crate::application::repos::{
    CreateMembershipParams, MembershipsRepo, UpdateMembershipParams,
};
use crate::cache::{CacheAside, CacheKey, CacheTrigger};
use crate::domain::entities::MembershipRecord;
use crate::domain::validation::Violations;

use super::{rank_value, trimmed};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipInput {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub duration_months: Option<i64>,
    pub rank: Option<i64>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct AdminMembershipService {
    repo: Arc<dyn MembershipsRepo>,
    reader: CacheAside,
    cache: Arc<CacheTrigger>,
}

impl AdminMembershipService {
    pub fn new(
        repo: Arc<dyn MembershipsRepo>,
        reader: CacheAside,
        cache: Arc<CacheTrigger>,
    ) -> Self {
        Self {
            repo,
            reader,
            cache,
        }
    }

    pub async fn list(&self) -> Result<Vec<MembershipRecord>, ServiceError> {
        Ok(self.repo.list_memberships().await?)
    }

    pub async fn get(&self, id: i64) -> Result<MembershipRecord, ServiceError> {
        let repo = self.repo.clone();
        self.reader
            .get_or_load(&CacheKey::Membership(id), || async move {
                repo.find_membership(id)
                    .await?
                    .ok_or(ServiceError::NotFound("membership"))
            })
            .await
    }

    pub async fn create(&self, input: MembershipInput) -> Result<MembershipRecord, ServiceError> {
        let mut v = Violations::new();
        v.length("name", input.name.as_deref(), 2, 45);
        v.check(input.price.is_some(), "price is required");
        v.non_negative("price", input.price);
        v.check(input.duration_months.is_some(), "durationMonths is required");
        v.non_negative("durationMonths", input.duration_months);
        v.non_negative("rank", input.rank);
        v.into_result()?;

        let params = CreateMembershipParams {
            name: trimmed(input.name).unwrap_or_default(),
            price: input.price.unwrap_or_default(),
            duration_months: months(input.duration_months)?.unwrap_or_default(),
            rank: input.rank.map(|r| rank_value(Some(r))).transpose()?.unwrap_or(1),
            description: input.description,
        };
        let membership = self.repo.create_membership(params).await?;
        self.cache.membership_changed(membership.id).await?;
        Ok(membership)
    }

    pub async fn update(
        &self,
        id: i64,
        input: MembershipInput,
    ) -> Result<MembershipRecord, ServiceError> {
        let mut v = Violations::new();
        v.optional_length("name", input.name.as_deref(), 2, 45);
        v.non_negative("price", input.price);
        v.non_negative("durationMonths", input.duration_months);
        v.non_negative("rank", input.rank);
        v.into_result()?;

        let params = UpdateMembershipParams {
            name: trimmed(input.name),
            price: input.price,
            duration_months: months(input.duration_months)?,
            rank: input.rank.map(|r| rank_value(Some(r))).transpose()?,
            description: input.description,
        };
        let membership = self.repo.update_membership(id, params).await?;
        self.cache.membership_changed(id).await?;
        Ok(membership)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.get(id).await?;
        self.repo.delete_membership(id).await?;
        self.cache.membership_changed(id).await?;
        Ok(())
    }
}

fn months(value: Option<i64>) -> Result<Option<i32>, ServiceError> {
    value
        .map(|m| {
            i32::try_from(m).map_err(|_| ServiceError::validation("durationMonths is out of range"))
        })
        .transpose()
}
