//! Order lifecycle: quotation submission, status polling, the two-phase
//! payment protocol, and the customer's order history.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{
        OrderList, OrderWithItems, PayOrderRequest, PaymentIntentDto, QuotationStatusDto,
        VerifyPaymentRequest,
    },
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders,
            Model as OrderModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Raw sqlx row for the orders table, used on the read side.
#[derive(FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub order_number: Option<String>,
    pub status: String,
    pub total_amount: i64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub gateway_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn into_order(self) -> AppResult<Order> {
        let status = parse_status(&self.status)?;
        Ok(Order {
            id: self.id,
            customer_id: self.customer_id,
            order_number: self.order_number,
            status,
            total_amount: self.total_amount,
            start_date: self.start_date,
            end_date: self.end_date,
            gateway_order_id: self.gateway_order_id,
            payment_id: self.payment_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::CustomerId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = parse_status_input(status)?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "OK",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::CustomerId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

/// DRAFT -> SENT. Requires a non-empty cart; assigns the order number.
pub async fn submit_quotation(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<QuotationStatusDto>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::CustomerId.eq(user.user_id))
                .add(OrderCol::Status.eq(OrderStatus::Draft.as_str())),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::BadRequest("Cart is empty".to_string()))?;

    let item_count = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .count(&txn)
        .await?;
    if item_count == 0 {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }

    let order_number = order
        .order_number
        .clone()
        .unwrap_or_else(|| build_order_number(order.id));

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Sent.as_str().to_string());
    active.order_number = Set(Some(order_number));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "quotation_submitted",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Quotation submitted",
        QuotationStatusDto {
            id: order.id,
            status: OrderStatus::Sent,
        },
        Some(Meta::empty()),
    ))
}

/// The customer's most recent non-DRAFT order, or null when none exists.
/// Clients poll this to learn whether the vendor has decided.
pub async fn quotation_status(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<QuotationStatusDto>> {
    let row: Option<(Uuid, String)> = sqlx::query_as(
        r#"
        SELECT id, status FROM orders
        WHERE customer_id = $1 AND status <> 'DRAFT'
        ORDER BY updated_at DESC
        LIMIT 1
        "#,
    )
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    let data = match row {
        Some((id, status)) => Some(QuotationStatusDto {
            id,
            status: parse_status(&status)?,
        }),
        None => None,
    };

    Ok(ApiResponse {
        message: "OK".into(),
        data,
        meta: Some(Meta::empty()),
    })
}

/// Phase one of payment: create a gateway intent for the order's current
/// total. The gateway reference lands on the order via a conditional update
/// so a concurrent transition cannot attach it to a non-CONFIRMED order.
pub async fn pay_order(
    state: &AppState,
    user: &AuthUser,
    payload: PayOrderRequest,
) -> AppResult<ApiResponse<PaymentIntentDto>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::CustomerId.eq(user.user_id))
                .add(OrderCol::Id.eq(payload.order_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let status = parse_status(&order.status)?;
    if status != OrderStatus::Confirmed {
        return Err(AppError::Conflict(format!(
            "cannot pay order in status {status}"
        )));
    }

    let receipt = order
        .order_number
        .clone()
        .unwrap_or_else(|| order.id.to_string());
    let currency = state.payment.currency.clone();
    let gateway_order_id = state
        .payment
        .create_intent(order.total_amount, &currency, &receipt)
        .await?;

    let updated = Orders::update_many()
        .col_expr(
            OrderCol::GatewayOrderId,
            Expr::value(Some(gateway_order_id.clone())),
        )
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(order.id))
                .add(OrderCol::Status.eq(OrderStatus::Confirmed.as_str())),
        )
        .exec(&state.orm)
        .await?;
    if updated.rows_affected == 0 {
        return Err(AppError::Conflict(
            "order is no longer CONFIRMED".to_string(),
        ));
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "payment_intent_created",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "gateway_order_id": gateway_order_id,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment intent created",
        PaymentIntentDto {
            order_id: order.id,
            gateway_order_id,
            amount: order.total_amount,
            currency,
        },
        Some(Meta::empty()),
    ))
}

/// Phase two: verify the gateway's signed callback and flip
/// CONFIRMED -> PAID. A bad signature rolls everything back, so payment can
/// be retried; an already-PAID order is rejected without mutation.
pub async fn verify_payment(
    state: &AppState,
    user: &AuthUser,
    payload: VerifyPaymentRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::CustomerId.eq(user.user_id))
                .add(OrderCol::Id.eq(payload.order_id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let status = parse_status(&order.status)?;
    if status == OrderStatus::Paid {
        return Err(AppError::Conflict("order is already PAID".to_string()));
    }
    if status != OrderStatus::Confirmed {
        return Err(AppError::Conflict(format!(
            "cannot record payment in status {status}"
        )));
    }

    // The stored reference may be absent when the callback beat the intent
    // bookkeeping; a mismatch against a stored one is always rejected.
    if let Some(stored) = &order.gateway_order_id
        && stored != &payload.gateway_order_id
    {
        return Err(AppError::BadRequest(
            "unknown gateway order reference".to_string(),
        ));
    }

    if !state.payment.verify_signature(
        &payload.gateway_order_id,
        &payload.payment_id,
        &payload.signature,
    ) {
        return Err(AppError::Gateway("payment signature mismatch".to_string()));
    }

    let order_number = order
        .order_number
        .clone()
        .unwrap_or_else(|| format!("ORD-{}", Utc::now().timestamp_millis()));

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Paid.as_str().to_string());
    active.order_number = Set(Some(order_number));
    active.gateway_order_id = Set(Some(payload.gateway_order_id));
    active.payment_id = Set(Some(payload.payment_id.clone()));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_paid",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "payment_id": payload.payment_id,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment recorded",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

pub(crate) fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    let status = parse_status(&model.status)?;
    Ok(Order {
        id: model.id,
        customer_id: model.customer_id,
        order_number: model.order_number,
        status,
        total_amount: model.total_amount,
        start_date: model.start_date.map(|dt| dt.with_timezone(&Utc)),
        end_date: model.end_date.map(|dt| dt.with_timezone(&Utc)),
        gateway_order_id: model.gateway_order_id,
        payment_id: model.payment_id,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        start_date: model.start_date.with_timezone(&Utc),
        end_date: model.end_date.with_timezone(&Utc),
        price_at_booking: model.price_at_booking,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

/// A status read back from the database is trusted; failure to parse it is
/// an internal fault, not caller error.
pub(crate) fn parse_status(raw: &str) -> AppResult<OrderStatus> {
    OrderStatus::from_str(raw).map_err(|err| AppError::Internal(anyhow::anyhow!(err)))
}

/// A status supplied by a caller gets the validation treatment instead.
pub(crate) fn parse_status_input(raw: &str) -> AppResult<OrderStatus> {
    OrderStatus::from_str(raw).map_err(AppError::BadRequest)
}

pub(crate) fn build_order_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("ORD-{}-{}", date, short)
}
