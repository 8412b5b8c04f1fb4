use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{
        OrderList, OrderWithItems, PayOrderRequest, PaymentIntentDto, QuotationStatusDto,
        VerifyPaymentRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::{cart, params::OrderListQuery},
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/submit-quotation", post(submit_quotation))
        .route("/quotation-status", get(quotation_status))
        .route("/pay", post(pay_order))
        .route("/pay/verify", post(verify_payment))
        .route("/{id}", get(get_order))
        .nest("/cart", cart::router())
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by order status"),
    ),
    responses(
        (status = 200, description = "Customer order history", body = ApiResponse<OrderList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/submit-quotation",
    responses(
        (status = 200, description = "Draft submitted as quotation", body = ApiResponse<QuotationStatusDto>),
        (status = 400, description = "Cart is empty"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn submit_quotation(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<QuotationStatusDto>>> {
    let resp = order_service::submit_quotation(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/quotation-status",
    responses(
        (status = 200, description = "Most recent non-draft order status, null when none", body = ApiResponse<QuotationStatusDto>),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn quotation_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<QuotationStatusDto>>> {
    let resp = order_service::quotation_status(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/pay",
    request_body = PayOrderRequest,
    responses(
        (status = 200, description = "Payment intent created", body = ApiResponse<PaymentIntentDto>),
        (status = 409, description = "Order is not CONFIRMED"),
        (status = 502, description = "Payment gateway unreachable"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn pay_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PayOrderRequest>,
) -> AppResult<Json<ApiResponse<PaymentIntentDto>>> {
    let resp = order_service::pay_order(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/pay/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified, order is PAID", body = ApiResponse<OrderWithItems>),
        (status = 409, description = "Order is not CONFIRMED or already PAID"),
        (status = 502, description = "Signature mismatch"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<VerifyPaymentRequest>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::verify_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}
