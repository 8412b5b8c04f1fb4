use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::orders::OrderWithItems;

/// Vendor's view of incoming quotations. Each order carries only the line
/// items referencing the vendor's own products.
#[derive(Debug, Serialize, ToSchema)]
pub struct VendorOrderList {
    pub items: Vec<OrderWithItems>,
}
