use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use uuid::Uuid;

use crate::{
    dto::orders::QuotationStatusDto,
    dto::vendor::VendorOrderList,
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::VendorQuotationQuery,
    services::vendor_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quotations", get(list_quotations))
        .route("/quotations/{id}/approve", patch(approve_quotation))
        .route("/quotations/{id}/reject", patch(reject_quotation))
}

#[utoipa::path(
    get,
    path = "/api/vendor/quotations",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by order status, default all non-draft"),
    ),
    responses(
        (status = 200, description = "Quotations containing the vendor's products, items filtered to the vendor", body = ApiResponse<VendorOrderList>),
        (status = 403, description = "Caller is not a vendor"),
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn list_quotations(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<VendorQuotationQuery>,
) -> AppResult<Json<ApiResponse<VendorOrderList>>> {
    let resp = vendor_service::list_quotations(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/vendor/quotations/{id}/approve",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Quotation approved, stock reserved", body = ApiResponse<QuotationStatusDto>),
        (status = 403, description = "None of the order's items belong to the caller"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is not SENT or stock is insufficient"),
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn approve_quotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<QuotationStatusDto>>> {
    let resp = vendor_service::approve_quotation(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/vendor/quotations/{id}/reject",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Quotation rejected", body = ApiResponse<QuotationStatusDto>),
        (status = 403, description = "None of the order's items belong to the caller"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is not SENT"),
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor"
)]
pub async fn reject_quotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<QuotationStatusDto>>> {
    let resp = vendor_service::reject_quotation(&state, &user, id).await?;
    Ok(Json(resp))
}
