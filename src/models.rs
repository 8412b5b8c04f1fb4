use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle state of an order. A quotation is not a separate record; it is
/// an order whose status has progressed to `Sent` or beyond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Sent,
    Confirmed,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Sent => "SENT",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(OrderStatus::Draft),
            "SENT" => Ok(OrderStatus::Sent),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "PAID" => Ok(OrderStatus::Paid),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Billing period unit for a product's price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingPeriod {
    Hourly,
    Daily,
    Weekly,
    Custom,
}

impl PricingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingPeriod::Hourly => "HOURLY",
            PricingPeriod::Daily => "DAILY",
            PricingPeriod::Weekly => "WEEKLY",
            PricingPeriod::Custom => "CUSTOM",
        }
    }
}

impl FromStr for PricingPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOURLY" => Ok(PricingPeriod::Hourly),
            "DAILY" => Ok(PricingPeriod::Daily),
            "WEEKLY" => Ok(PricingPeriod::Weekly),
            "CUSTOM" => Ok(PricingPeriod::Custom),
            other => Err(format!("unknown pricing period: {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Price in minor currency units per pricing period.
    pub price: i64,
    pub pricing_period: PricingPeriod,
    pub custom_period_hours: Option<i32>,
    pub stock: i32,
    pub vendor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub order_number: Option<String>,
    pub status: OrderStatus,
    /// Always equals the sum of line totals across current items; minor units.
    pub total_amount: i64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub gateway_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Unit price snapshotted when the item entered the cart.
    pub price_at_booking: i64,
    pub created_at: DateTime<Utc>,
}
