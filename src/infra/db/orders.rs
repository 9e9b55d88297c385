use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::{
        pagination::{Page, PageParams},
        repos::{CreateOrderParams, OrderQueryFilter, OrdersRepo, RepoError},
    },
    domain::{entities::OrderRecord, types::OrderStatus},
};

use super::{PostgresRepositories, map_sqlx_error, util::convert_count};

const ORDER_COLUMNS: &str = "id, out_trade_no, user_id, membership_id, subject, total_amount, \
    status, paid_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    out_trade_no: String,
    user_id: i64,
    membership_id: i64,
    subject: String,
    total_amount: i64,
    status: OrderStatus,
    paid_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<OrderRow> for OrderRecord {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            out_trade_no: row.out_trade_no,
            user_id: row.user_id,
            membership_id: row.membership_id,
            subject: row.subject,
            total_amount: row.total_amount,
            status: row.status,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    fn apply_order_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderQueryFilter) {
        qb.push(" WHERE 1=1");
        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ");
            qb.push_bind(user_id);
        }
        if let Some(out_trade_no) = filter.out_trade_no.as_deref().filter(|v| !v.is_empty()) {
            qb.push(" AND out_trade_no = ");
            qb.push_bind(out_trade_no.to_string());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }
    }
}

#[async_trait]
impl OrdersRepo for PostgresRepositories {
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, RepoError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO orders (out_trade_no, user_id, membership_id, subject, total_amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(params.out_trade_no)
        .bind(params.user_id)
        .bind(params.membership_id)
        .bind(params.subject)
        .bind(params.total_amount)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn list_orders(
        &self,
        filter: &OrderQueryFilter,
        page: PageParams,
    ) -> Result<Page<OrderRecord>, RepoError> {
        let (offset, limit) = page.sql_bounds();

        let mut qb = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        Self::apply_order_filter(&mut qb, filter);
        qb.push(" ORDER BY id DESC OFFSET ");
        qb.push_bind(offset);
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        let rows = qb
            .build_query_as::<OrderRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM orders");
        Self::apply_order_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Page {
            items: rows.into_iter().map(OrderRecord::from).collect(),
            total: convert_count(total)?,
        })
    }

    async fn find_order(&self, id: i64) -> Result<Option<OrderRecord>, RepoError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(OrderRecord::from))
    }

    async fn find_order_by_trade_no(
        &self,
        out_trade_no: &str,
    ) -> Result<Option<OrderRecord>, RepoError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE out_trade_no = $1"
        ))
        .bind(out_trade_no)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(OrderRecord::from))
    }
}
