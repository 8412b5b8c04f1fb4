//! Pure pricing and duration arithmetic. No I/O, no floating point on the
//! money path; all amounts are minor currency units.

use chrono::{DateTime, Utc};

use crate::models::PricingPeriod;

pub const MS_PER_HOUR: i64 = 3_600_000;
pub const MS_PER_DAY: i64 = 86_400_000;
pub const MS_PER_WEEK: i64 = 604_800_000;

/// Length of one billing period in milliseconds. `Custom` requires a
/// positive hour count; `None` means the product's pricing is misconfigured
/// and callers should reject the operation.
pub fn period_length_ms(period: PricingPeriod, custom_period_hours: Option<i32>) -> Option<i64> {
    match period {
        PricingPeriod::Hourly => Some(MS_PER_HOUR),
        PricingPeriod::Daily => Some(MS_PER_DAY),
        PricingPeriod::Weekly => Some(MS_PER_WEEK),
        PricingPeriod::Custom => custom_period_hours
            .filter(|h| *h > 0)
            .map(|h| i64::from(h) * MS_PER_HOUR),
    }
}

/// Rounded count of billing periods covered by the span, never below 1.
///
/// The span is taken as `|end - start|`: an inverted range bills as if the
/// dates were reversed rather than producing a zero or negative duration.
/// Any positive sub-period gap still bills one full period, so misaligned
/// dates can never produce a zero-cost booking.
pub fn billable_duration(period_ms: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let span_ms = (end - start).num_milliseconds().abs();
    let rounded = (span_ms + period_ms / 2) / period_ms;
    rounded.max(1)
}

pub fn line_total(price_at_booking: i64, quantity: i32, duration: i64) -> i64 {
    price_at_booking * i64::from(quantity) * duration
}
