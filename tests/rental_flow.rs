use axum_rental_api::{
    config::{AppConfig, PaymentConfig},
    db::{create_orm_conn, create_pool, run_migrations},
    dto::cart::{AddToCartRequest, UpdateCartItemRequest},
    dto::orders::{PayOrderRequest, VerifyPaymentRequest},
    entity::{products::ActiveModel as ProductActive, users::ActiveModel as UserActive},
    error::AppError,
    middleware::auth::AuthUser,
    models::OrderStatus,
    payment::PaymentGateway,
    routes::params::{OrderListQuery, Pagination, SortOrder, VendorQuotationQuery},
    services::{cart_service, order_service, vendor_service},
    state::AppState,
};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use sha2::Sha256;
use uuid::Uuid;

const PAYMENT_SECRET: &str = "test-payment-secret";

// Full lifecycle: cart assembly with total recomputation, quotation
// submission, vendor approval with stock reservation, two-phase payment,
// and the vendor-isolation and idempotence guarantees along the way.
#[tokio::test]
async fn rental_order_lifecycle_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let customer_id = create_user(&state, "customer", "customer@example.com").await?;
    let customer2_id = create_user(&state, "customer", "customer2@example.com").await?;
    let vendor_id = create_user(&state, "vendor", "vendor@example.com").await?;
    let vendor2_id = create_user(&state, "vendor", "vendor2@example.com").await?;

    let prod_a = create_product(&state, vendor_id, "Excavator 3T", 800, "DAILY", None, 10).await?;
    let prod_b = create_product(&state, vendor_id, "Party Tent", 100, "DAILY", None, 5).await?;
    let prod_c = create_product(&state, vendor2_id, "Camera Kit", 200, "DAILY", None, 5).await?;

    let customer = AuthUser {
        user_id: customer_id,
        role: "customer".into(),
    };
    let customer2 = AuthUser {
        user_id: customer2_id,
        role: "customer".into(),
    };
    let vendor = AuthUser {
        user_id: vendor_id,
        role: "vendor".into(),
    };
    let vendor2 = AuthUser {
        user_id: vendor2_id,
        role: "vendor".into(),
    };

    let a_start: DateTime<Utc> = "2026-01-10T09:00:00Z".parse()?;
    let a_end = a_start + Duration::days(3);
    let b_end = a_start + Duration::days(1);

    // --- cart assembly and the total invariant ---

    let resp = cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: prod_a,
            quantity: 2,
            start_date: a_start,
            end_date: a_end,
        },
    )
    .await?;
    let data = resp.data.unwrap();
    let draft_id = data.order.id;
    assert_eq!(data.order.status, OrderStatus::Draft);
    assert_eq!(data.order.total_amount, 800 * 2 * 3);
    assert_eq!(data.order.start_date, Some(a_start));
    assert_eq!(data.order.end_date, Some(a_end));

    let resp = cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: prod_b,
            quantity: 1,
            start_date: a_start,
            end_date: b_end,
        },
    )
    .await?;
    let data = resp.data.unwrap();
    // Single-draft invariant: the second add reuses the same order.
    assert_eq!(data.order.id, draft_id);
    assert_eq!(data.order.total_amount, 4900);
    assert_eq!(data.order.start_date, Some(a_start));
    assert_eq!(data.order.end_date, Some(a_end));
    assert_eq!(data.items.len(), 2);

    let item_b = data
        .items
        .iter()
        .find(|i| i.product_id == prod_b)
        .unwrap()
        .id;

    let resp = cart_service::update_cart_item(
        &state,
        &customer,
        item_b,
        UpdateCartItemRequest {
            quantity: Some(3),
            start_date: None,
            end_date: None,
        },
    )
    .await?;
    assert_eq!(resp.data.unwrap().order.total_amount, 4800 + 300);

    let resp = cart_service::remove_cart_item(&state, &customer, item_b).await?;
    assert_eq!(resp.data.unwrap().order.total_amount, 4800);

    let resp = cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: prod_b,
            quantity: 1,
            start_date: a_start,
            end_date: b_end,
        },
    )
    .await?;
    assert_eq!(resp.data.unwrap().order.total_amount, 4900);

    // --- input validation ---

    let err = cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: prod_a,
            quantity: 0,
            start_date: a_start,
            end_date: a_end,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: Uuid::new_v4(),
            quantity: 1,
            start_date: a_start,
            end_date: a_end,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Another customer cannot touch this cart's items.
    let err = cart_service::remove_cart_item(
        &state,
        &customer2,
        resp_item_id(&state, &customer).await?,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // --- empty cart edge cases ---

    let err = order_service::submit_quotation(&state, &customer2)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let resp = cart_service::add_to_cart(
        &state,
        &customer2,
        AddToCartRequest {
            product_id: prod_c,
            quantity: 1,
            start_date: a_start,
            end_date: b_end,
        },
    )
    .await?;
    let data = resp.data.unwrap();
    let c2_item = data.items[0].id;
    let resp = cart_service::remove_cart_item(&state, &customer2, c2_item).await?;
    let data = resp.data.unwrap();
    assert_eq!(data.order.total_amount, 0);
    assert_eq!(data.order.start_date, None);
    assert_eq!(data.order.end_date, None);

    // --- quotation submission and approval ---

    let resp = order_service::submit_quotation(&state, &customer).await?;
    let quotation = resp.data.unwrap();
    assert_eq!(quotation.id, draft_id);
    assert_eq!(quotation.status, OrderStatus::Sent);

    let resp = order_service::quotation_status(&state, &customer).await?;
    assert_eq!(resp.data.unwrap().status, OrderStatus::Sent);

    // Paying before approval is a state conflict.
    let err = order_service::pay_order(
        &state,
        &customer,
        PayOrderRequest { order_id: draft_id },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // A vendor owning none of the items cannot decide the quotation.
    let err = vendor_service::approve_quotation(&state, &vendor2, draft_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let resp = vendor_service::approve_quotation(&state, &vendor, draft_id).await?;
    assert_eq!(resp.data.unwrap().status, OrderStatus::Confirmed);

    // Stock was reserved inside the approval transaction.
    assert_eq!(product_stock(&state, prod_a).await?, 8);
    assert_eq!(product_stock(&state, prod_b).await?, 4);

    // Approving twice is illegal.
    let err = vendor_service::approve_quotation(&state, &vendor, draft_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // --- two-phase payment ---

    let resp = order_service::pay_order(
        &state,
        &customer,
        PayOrderRequest { order_id: draft_id },
    )
    .await?;
    let intent = resp.data.unwrap();
    assert!(intent.gateway_order_id.starts_with("pg_"));
    assert_eq!(intent.amount, 4900);

    let err = order_service::verify_payment(
        &state,
        &customer,
        VerifyPaymentRequest {
            order_id: draft_id,
            gateway_order_id: intent.gateway_order_id.clone(),
            payment_id: "pay_42".into(),
            signature: "deadbeef".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Gateway(_)));

    // The failed verification left the order CONFIRMED and payable.
    let resp = order_service::get_order(&state, &customer, draft_id).await?;
    assert_eq!(resp.data.unwrap().order.status, OrderStatus::Confirmed);

    let signature = sign(&intent.gateway_order_id, "pay_42");
    let resp = order_service::verify_payment(
        &state,
        &customer,
        VerifyPaymentRequest {
            order_id: draft_id,
            gateway_order_id: intent.gateway_order_id.clone(),
            payment_id: "pay_42".into(),
            signature: signature.clone(),
        },
    )
    .await?;
    let paid = resp.data.unwrap().order;
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(paid.status.is_terminal());
    assert_eq!(paid.total_amount, 4900);
    let order_number = paid.order_number.clone().expect("order number assigned");

    // Idempotence guard: a second callback must not double-record.
    let err = order_service::verify_payment(
        &state,
        &customer,
        VerifyPaymentRequest {
            order_id: draft_id,
            gateway_order_id: intent.gateway_order_id,
            payment_id: "pay_42".into(),
            signature,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let resp = order_service::get_order(&state, &customer, draft_id).await?;
    let order = resp.data.unwrap().order;
    assert_eq!(order.total_amount, 4900);
    assert_eq!(order.order_number, Some(order_number));

    let resp = order_service::list_orders(
        &state,
        &customer,
        OrderListQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            status: Some("PAID".into()),
            sort_order: Some(SortOrder::Desc),
        },
    )
    .await?;
    assert_eq!(resp.data.unwrap().items.len(), 1);

    // --- vendor isolation on a shared order ---

    cart_service::add_to_cart(
        &state,
        &customer2,
        AddToCartRequest {
            product_id: prod_a,
            quantity: 1,
            start_date: a_start,
            end_date: b_end,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &state,
        &customer2,
        AddToCartRequest {
            product_id: prod_c,
            quantity: 1,
            start_date: a_start,
            end_date: b_end,
        },
    )
    .await?;
    let resp = order_service::submit_quotation(&state, &customer2).await?;
    let shared_id = resp.data.unwrap().id;

    let query = || VendorQuotationQuery {
        pagination: Pagination {
            page: Some(1),
            per_page: Some(20),
        },
        status: None,
    };

    let resp = vendor_service::list_quotations(&state, &vendor, query()).await?;
    let listed = resp.data.unwrap();
    let shared = listed
        .items
        .iter()
        .find(|o| o.order.id == shared_id)
        .expect("shared order listed for vendor");
    assert!(shared.items.iter().all(|i| i.product_id == prod_a));

    let resp = vendor_service::list_quotations(&state, &vendor2, query()).await?;
    let listed = resp.data.unwrap();
    let shared = listed
        .items
        .iter()
        .find(|o| o.order.id == shared_id)
        .expect("shared order listed for second vendor");
    assert!(shared.items.iter().all(|i| i.product_id == prod_c));

    // A customer cannot call vendor endpoints at all.
    let err = vendor_service::list_quotations(&state, &customer, query())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Either vendor with an item in the order may reject it.
    let resp = vendor_service::reject_quotation(&state, &vendor2, shared_id).await?;
    assert_eq!(resp.data.unwrap().status, OrderStatus::Cancelled);

    let resp = order_service::quotation_status(&state, &customer2).await?;
    assert_eq!(resp.data.unwrap().status, OrderStatus::Cancelled);

    Ok(())
}

fn sign(gateway_order_id: &str, payment_id: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(PAYMENT_SECRET.as_bytes()).expect("hmac key");
    mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, audit_logs, products, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    let payment_config = PaymentConfig {
        base_url: None,
        key_id: "pg_test".into(),
        key_secret: PAYMENT_SECRET.into(),
        currency: "USD".into(),
    };
    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "test-jwt-secret".into(),
        payment: payment_config.clone(),
    };

    Ok(AppState {
        pool,
        orm,
        payment: PaymentGateway::new(&payment_config),
        config,
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_product(
    state: &AppState,
    vendor_id: Uuid,
    name: &str,
    price: i64,
    period: &str,
    custom_period_hours: Option<i32>,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        pricing_period: Set(period.to_string()),
        custom_period_hours: Set(custom_period_hours),
        stock: Set(stock),
        vendor_id: Set(vendor_id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product.id)
}

async fn product_stock(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let row: (i32,) = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(row.0)
}

/// First item id of the caller's current draft cart.
async fn resp_item_id(state: &AppState, user: &AuthUser) -> anyhow::Result<Uuid> {
    let resp = cart_service::get_cart(state, user).await?;
    let cart = resp.data.expect("open cart");
    Ok(cart.items[0].id)
}
