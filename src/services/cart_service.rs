//! Cart mutations. A cart is an order in DRAFT status; every item change and
//! the total/date-bound recompute it triggers commit in one transaction.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, ModelTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartDto, CartItemDto, UpdateCartItemRequest},
    dto::orders::OrderWithItems,
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders,
            Model as OrderModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{OrderStatus, PricingPeriod},
    pricing,
    response::{ApiResponse, Meta},
    services::order_service::{order_from_entity, order_item_from_entity},
    state::AppState,
};

#[derive(FromRow)]
struct CartItemRow {
    id: Uuid,
    product_id: Uuid,
    product_name: String,
    pricing_period: String,
    quantity: i32,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    price_at_booking: i64,
}

/// Current DRAFT order with its items, or `None` when the customer has no
/// open cart. Read-only; no draft is created here.
pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let order = sqlx::query_as::<_, super::order_service::OrderRow>(
        "SELECT * FROM orders WHERE customer_id = $1 AND status = 'DRAFT'",
    )
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    let Some(order) = order else {
        return Ok(ApiResponse {
            message: "No open cart".into(),
            data: None,
            meta: Some(Meta::empty()),
        });
    };

    let rows = sqlx::query_as::<_, CartItemRow>(
        r#"
        SELECT oi.id, oi.product_id, p.name AS product_name, p.pricing_period,
               oi.quantity, oi.start_date, oi.end_date, oi.price_at_booking
        FROM order_items oi
        JOIN products p ON p.id = oi.product_id
        WHERE oi.order_id = $1
        ORDER BY oi.created_at
        "#,
    )
    .bind(order.id)
    .fetch_all(&state.pool)
    .await?;

    let items = rows
        .into_iter()
        .map(|row| {
            let pricing_period = PricingPeriod::from_str(&row.pricing_period)
                .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?;
            Ok(CartItemDto {
                id: row.id,
                product_id: row.product_id,
                product_name: row.product_name,
                pricing_period,
                quantity: row.quantity,
                start_date: row.start_date,
                end_date: row.end_date,
                price_at_booking: row.price_at_booking,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let data = CartDto {
        order: order.into_order()?,
        items,
    };
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.quantity < 1 {
        return Err(AppError::BadRequest(
            "quantity must be at least 1".to_string(),
        ));
    }

    let txn = state.orm.begin().await?;

    let product = Products::find_by_id(payload.product_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    // Reject misconfigured pricing before anything is written.
    let period = PricingPeriod::from_str(&product.pricing_period)
        .map_err(AppError::BadRequest)?;
    if pricing::period_length_ms(period, product.custom_period_hours).is_none() {
        return Err(AppError::BadRequest(format!(
            "product {} has no valid custom period length",
            product.id
        )));
    }

    let draft = find_or_create_draft(&txn, user.user_id).await?;

    OrderItemActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(draft.id),
        product_id: Set(product.id),
        quantity: Set(payload.quantity),
        start_date: Set(payload.start_date.into()),
        end_date: Set(payload.end_date.into()),
        price_at_booking: Set(product.price),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let order = recompute_order(&txn, draft).await?;
    let items = load_items(&txn, order.id).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        Some("order_items"),
        Some(serde_json::json!({
            "order_id": order.id,
            "product_id": product.id,
            "quantity": payload.quantity,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Added to cart",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if let Some(quantity) = payload.quantity
        && quantity < 1
    {
        return Err(AppError::BadRequest(
            "quantity must be at least 1".to_string(),
        ));
    }

    let txn = state.orm.begin().await?;

    let item = OrderItems::find_by_id(item_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let order = lock_draft_order(&txn, item.order_id, user).await?;

    let mut active: OrderItemActive = item.into();
    if let Some(quantity) = payload.quantity {
        active.quantity = Set(quantity);
    }
    if let Some(start_date) = payload.start_date {
        active.start_date = Set(start_date.into());
    }
    if let Some(end_date) = payload.end_date {
        active.end_date = Set(end_date.into());
    }
    active.update(&txn).await?;

    let order = recompute_order(&txn, order).await?;
    let items = load_items(&txn, order.id).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        Some("order_items"),
        Some(serde_json::json!({ "item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Cart item updated",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn remove_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let item = OrderItems::find_by_id(item_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let order = lock_draft_order(&txn, item.order_id, user).await?;

    item.delete(&txn).await?;

    let order = recompute_order(&txn, order).await?;
    let items = load_items(&txn, order.id).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("order_items"),
        Some(serde_json::json!({ "item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Cart item removed",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Reuse the customer's DRAFT order under row lock, inserting one when none
/// exists. A partial unique index on (customer_id) WHERE status = 'DRAFT'
/// backstops the at-most-one-draft invariant against concurrent first adds.
pub async fn find_or_create_draft(
    txn: &DatabaseTransaction,
    customer_id: Uuid,
) -> AppResult<OrderModel> {
    let existing = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::CustomerId.eq(customer_id))
                .add(OrderCol::Status.eq(OrderStatus::Draft.as_str())),
        )
        .lock(LockType::Update)
        .one(txn)
        .await?;

    if let Some(order) = existing {
        return Ok(order);
    }

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        order_number: Set(None),
        status: Set(OrderStatus::Draft.as_str().to_string()),
        total_amount: Set(0),
        start_date: Set(None),
        end_date: Set(None),
        gateway_order_id: Set(None),
        payment_id: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await?;

    Ok(order)
}

/// Recompute the order total and date bounds from its current items inside
/// the caller's transaction, keeping the stored aggregate consistent with
/// the item rows it summarizes.
pub async fn recompute_order(
    txn: &DatabaseTransaction,
    order: OrderModel,
) -> AppResult<OrderModel> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(txn)
        .await?;

    let mut active: OrderActive = order.into();

    if items.is_empty() {
        active.total_amount = Set(0);
        active.start_date = Set(None);
        active.end_date = Set(None);
        active.updated_at = Set(Utc::now().into());
        return Ok(active.update(txn).await?);
    }

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let periods: HashMap<Uuid, (PricingPeriod, Option<i32>)> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(txn)
        .await?
        .into_iter()
        .map(|p| {
            let period = PricingPeriod::from_str(&p.pricing_period)
                .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?;
            Ok((p.id, (period, p.custom_period_hours)))
        })
        .collect::<AppResult<_>>()?;

    let mut total: i64 = 0;
    let mut start = None;
    let mut end = None;

    for item in &items {
        let (period, custom_hours) = periods
            .get(&item.product_id)
            .copied()
            .ok_or(AppError::NotFound)?;
        let period_ms = pricing::period_length_ms(period, custom_hours).ok_or_else(|| {
            AppError::BadRequest(format!(
                "product {} has no valid custom period length",
                item.product_id
            ))
        })?;
        let duration = pricing::billable_duration(period_ms, item.start_date.into(), item.end_date.into());
        total += pricing::line_total(item.price_at_booking, item.quantity, duration);

        start = Some(match start {
            None => item.start_date,
            Some(s) if item.start_date < s => item.start_date,
            Some(s) => s,
        });
        end = Some(match end {
            None => item.end_date,
            Some(e) if item.end_date > e => item.end_date,
            Some(e) => e,
        });
    }

    active.total_amount = Set(total);
    active.start_date = Set(start);
    active.end_date = Set(end);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(txn).await?)
}

/// Lock the parent order and check the caller owns it and it is still a
/// draft. Items are immutable once the quotation is submitted.
async fn lock_draft_order(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    user: &AuthUser,
) -> AppResult<OrderModel> {
    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.customer_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    if order.status != OrderStatus::Draft.as_str() {
        return Err(AppError::Conflict(format!(
            "cart is locked in status {}",
            order.status
        )));
    }
    Ok(order)
}

async fn load_items(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> AppResult<Vec<crate::models::OrderItem>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(txn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect())
}
