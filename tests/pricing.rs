use axum_rental_api::models::PricingPeriod;
use axum_rental_api::pricing::{
    MS_PER_DAY, MS_PER_HOUR, MS_PER_WEEK, billable_duration, line_total, period_length_ms,
};
use chrono::{DateTime, Duration, Utc};

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid timestamp")
}

#[test]
fn exact_multi_day_span_bills_per_day() {
    let start = ts("2026-01-10T09:00:00Z");
    let end = start + Duration::days(3);
    assert_eq!(billable_duration(MS_PER_DAY, start, end), 3);
}

#[test]
fn sub_period_gap_bills_one_unit() {
    // Two hours on a daily product must never be free.
    let start = ts("2026-01-10T09:00:00Z");
    let end = start + Duration::hours(2);
    assert_eq!(billable_duration(MS_PER_DAY, start, end), 1);
}

#[test]
fn zero_length_span_bills_one_unit() {
    let start = ts("2026-01-10T09:00:00Z");
    assert_eq!(billable_duration(MS_PER_DAY, start, start), 1);
}

#[test]
fn inverted_range_bills_as_if_reversed() {
    let start = ts("2026-01-13T09:00:00Z");
    let end = ts("2026-01-10T09:00:00Z");
    assert_eq!(billable_duration(MS_PER_DAY, start, end), 3);
}

#[test]
fn durations_round_to_nearest_period() {
    let start = ts("2026-01-10T00:00:00Z");
    // 33 hours is 1.375 days, rounds down.
    assert_eq!(billable_duration(MS_PER_DAY, start, start + Duration::hours(33)), 1);
    // 36 hours is 1.5 days, rounds up.
    assert_eq!(billable_duration(MS_PER_DAY, start, start + Duration::hours(36)), 2);
    // 10 days is about 1.43 weeks, rounds down to one week.
    assert_eq!(billable_duration(MS_PER_WEEK, start, start + Duration::days(10)), 1);
    // 90 minutes on an hourly product rounds up to two hours.
    assert_eq!(
        billable_duration(MS_PER_HOUR, start, start + Duration::minutes(90)),
        2
    );
}

#[test]
fn custom_period_uses_configured_hours() {
    let period_ms = period_length_ms(PricingPeriod::Custom, Some(72)).expect("72h period");
    assert_eq!(period_ms, 72 * MS_PER_HOUR);

    let start = ts("2026-01-10T00:00:00Z");
    // Five days over a 3-day block rounds to two blocks.
    assert_eq!(billable_duration(period_ms, start, start + Duration::days(5)), 2);
}

#[test]
fn custom_period_without_hours_is_invalid() {
    assert_eq!(period_length_ms(PricingPeriod::Custom, None), None);
    assert_eq!(period_length_ms(PricingPeriod::Custom, Some(0)), None);
    assert_eq!(period_length_ms(PricingPeriod::Custom, Some(-4)), None);
}

#[test]
fn builtin_period_lengths() {
    assert_eq!(period_length_ms(PricingPeriod::Hourly, None), Some(MS_PER_HOUR));
    assert_eq!(period_length_ms(PricingPeriod::Daily, None), Some(MS_PER_DAY));
    assert_eq!(period_length_ms(PricingPeriod::Weekly, None), Some(MS_PER_WEEK));
}

#[test]
fn line_totals_compose_into_order_total() {
    // Worked example: product A 800/day qty 2 for 3 days, product B 100/day
    // qty 1 for 1 day.
    let start = ts("2026-01-10T09:00:00Z");
    let a = line_total(800, 2, billable_duration(MS_PER_DAY, start, start + Duration::days(3)));
    let b = line_total(100, 1, billable_duration(MS_PER_DAY, start, start + Duration::days(1)));
    assert_eq!(a, 4800);
    assert_eq!(b, 100);
    assert_eq!(a + b, 4900);
}
