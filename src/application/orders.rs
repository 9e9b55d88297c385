use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::application::error::ServiceError;
use crate::application::pagination::{Page, PageParams};
use crate::application::repos::{
    CreateOrderParams, MembershipsRepo, OrderQueryFilter, OrdersRepo,
};
use crate::domain::entities::OrderRecord;
use crate::domain::validation::Violations;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    pub membership_id: Option<i64>,
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrdersRepo>,
    memberships: Arc<dyn MembershipsRepo>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrdersRepo>, memberships: Arc<dyn MembershipsRepo>) -> Self {
        Self {
            orders,
            memberships,
        }
    }

    /// Place a pending order for a membership at its current price.
    pub async fn create(
        &self,
        user_id: i64,
        input: CreateOrderInput,
    ) -> Result<OrderRecord, ServiceError> {
        let mut v = Violations::new();
        v.positive("membershipId", input.membership_id);
        v.into_result()?;

        let membership = self
            .memberships
            .find_membership(input.membership_id.unwrap_or_default())
            .await?
            .ok_or(ServiceError::NotFound("membership"))?;

        let params = CreateOrderParams {
            out_trade_no: Uuid::new_v4().simple().to_string(),
            user_id,
            membership_id: membership.id,
            subject: membership.name.clone(),
            total_amount: membership.price,
        };
        let order = self.orders.create_order(params).await?;
        info!(
            order_id = order.id,
            out_trade_no = %order.out_trade_no,
            user_id,
            "Order created"
        );
        Ok(order)
    }

    pub async fn list(
        &self,
        user_id: i64,
        page: PageParams,
    ) -> Result<Page<OrderRecord>, ServiceError> {
        let filter = OrderQueryFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        Ok(self.orders.list_orders(&filter, page).await?)
    }

    /// Other users' orders are indistinguishable from missing ones.
    pub async fn get(&self, user_id: i64, out_trade_no: &str) -> Result<OrderRecord, ServiceError> {
        self.orders
            .find_order_by_trade_no(out_trade_no)
            .await?
            .filter(|order| order.user_id == user_id)
            .ok_or(ServiceError::NotFound("order"))
    }
}
