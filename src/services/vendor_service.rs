//! Vendor side of the quotation workflow: listing incoming quotations and
//! the SENT -> CONFIRMED / CANCELLED decisions.
//!
//! Approval is a whole-order status flip guarded by "the caller owns at
//! least one item in the order". Multi-vendor carts would need per-vendor
//! sub-orders for a stricter model; see DESIGN.md.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::OrderWithItems,
    dto::orders::QuotationStatusDto,
    dto::vendor::VendorOrderList,
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{ActiveModel as OrderActive, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::VendorQuotationQuery,
    services::order_service::{build_order_number, parse_status, parse_status_input, OrderRow},
    state::AppState,
};

#[derive(FromRow)]
struct ItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    price_at_booking: i64,
    created_at: DateTime<Utc>,
}

/// Orders containing at least one of the vendor's products, filtered to the
/// requested status (default: everything past DRAFT). Line items belonging
/// to other vendors are never included.
pub async fn list_quotations(
    state: &AppState,
    user: &AuthUser,
    query: VendorQuotationQuery,
) -> AppResult<ApiResponse<VendorOrderList>> {
    crate::middleware::auth::ensure_vendor(user)?;

    let (page, limit, offset) = query.pagination.normalize();
    let statuses: Vec<String> = match query.status.as_ref().filter(|s| !s.is_empty()) {
        Some(status) => vec![parse_status_input(status)?.as_str().to_string()],
        None => [
            OrderStatus::Sent,
            OrderStatus::Confirmed,
            OrderStatus::Paid,
            OrderStatus::Cancelled,
        ]
        .iter()
        .map(|s| s.as_str().to_string())
        .collect(),
    };

    let orders = sqlx::query_as::<_, OrderRow>(
        r#"
        SELECT o.* FROM orders o
        WHERE o.status = ANY($2)
          AND EXISTS (
            SELECT 1 FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = o.id AND p.vendor_id = $1
          )
        ORDER BY o.created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user.user_id)
    .bind(&statuses)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM orders o
        WHERE o.status = ANY($2)
          AND EXISTS (
            SELECT 1 FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = o.id AND p.vendor_id = $1
          )
        "#,
    )
    .bind(user.user_id)
    .bind(&statuses)
    .fetch_one(&state.pool)
    .await?;

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let item_rows = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT oi.* FROM order_items oi
        JOIN products p ON p.id = oi.product_id
        WHERE p.vendor_id = $1 AND oi.order_id = ANY($2)
        ORDER BY oi.created_at
        "#,
    )
    .bind(user.user_id)
    .bind(&order_ids)
    .fetch_all(&state.pool)
    .await?;

    let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in item_rows {
        items_by_order
            .entry(row.order_id)
            .or_default()
            .push(OrderItem {
                id: row.id,
                order_id: row.order_id,
                product_id: row.product_id,
                quantity: row.quantity,
                start_date: row.start_date,
                end_date: row.end_date,
                price_at_booking: row.price_at_booking,
                created_at: row.created_at,
            });
    }

    let items = orders
        .into_iter()
        .map(|row| {
            let order = row.into_order()?;
            let items = items_by_order.remove(&order.id).unwrap_or_default();
            Ok(OrderWithItems { order, items })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "OK",
        VendorOrderList { items },
        Some(meta),
    ))
}

/// SENT -> CONFIRMED. Reserves stock for every item with a conditional
/// decrement inside the same transaction; any shortfall aborts the approval.
pub async fn approve_quotation(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<QuotationStatusDto>> {
    crate::middleware::auth::ensure_vendor(user)?;

    let txn = state.orm.begin().await?;

    let (order, items) = lock_sent_order(&txn, user, id).await?;

    for item in &items {
        let updated = Products::update_many()
            .col_expr(
                ProdCol::Stock,
                Expr::col(ProdCol::Stock).sub(item.quantity),
            )
            .filter(
                Condition::all()
                    .add(ProdCol::Id.eq(item.product_id))
                    .add(ProdCol::Stock.gte(item.quantity)),
            )
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            return Err(AppError::Conflict(format!(
                "insufficient stock for product {}",
                item.product_id
            )));
        }
    }

    let order_number = order
        .order_number
        .clone()
        .unwrap_or_else(|| build_order_number(order.id));

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Confirmed.as_str().to_string());
    active.order_number = Set(Some(order_number));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "quotation_approved",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Quotation approved",
        QuotationStatusDto {
            id: order.id,
            status: OrderStatus::Confirmed,
        },
        Some(Meta::empty()),
    ))
}

/// SENT -> CANCELLED. No stock is touched; nothing was reserved yet.
pub async fn reject_quotation(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<QuotationStatusDto>> {
    crate::middleware::auth::ensure_vendor(user)?;

    let txn = state.orm.begin().await?;

    let (order, _items) = lock_sent_order(&txn, user, id).await?;

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "quotation_rejected",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Quotation rejected",
        QuotationStatusDto {
            id: order.id,
            status: OrderStatus::Cancelled,
        },
        Some(Meta::empty()),
    ))
}

/// Lock the order row, check the vendor owns at least one of its items, and
/// require SENT status. Ownership is checked before status so an outsider
/// learns nothing about the order's state.
async fn lock_sent_order(
    txn: &DatabaseTransaction,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<(OrderModel, Vec<OrderItemModel>)> {
    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(txn)
        .await?;

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let owned = Products::find()
        .filter(
            Condition::all()
                .add(ProdCol::Id.is_in(product_ids))
                .add(ProdCol::VendorId.eq(user.user_id)),
        )
        .count(txn)
        .await?;
    if owned == 0 {
        return Err(AppError::Forbidden);
    }

    let status = parse_status(&order.status)?;
    if status != OrderStatus::Sent {
        return Err(AppError::Conflict(format!(
            "cannot decide quotation in status {status}"
        )));
    }

    Ok((order, items))
}
