use std::sync::Arc;

use crate::application::error::ServiceError;
use crate::application::pagination::{Page, PageParams};
use crate::application::repos::{OrderQueryFilter, OrdersRepo};
use crate::domain::entities::OrderRecord;

#[derive(Clone)]
pub struct AdminOrderService {
    repo: Arc<dyn OrdersRepo>,
}

impl AdminOrderService {
    pub fn new(repo: Arc<dyn OrdersRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(
        &self,
        filter: &OrderQueryFilter,
        page: PageParams,
    ) -> Result<Page<OrderRecord>, ServiceError> {
        Ok(self.repo.list_orders(filter, page).await?)
    }

    pub async fn get(&self, id: i64) -> Result<OrderRecord, ServiceError> {
        self.repo
            .find_order(id)
            .await?
            .ok_or(ServiceError::NotFound("order"))
    }
}
