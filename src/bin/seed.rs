use axum_rental_api::{
    config::AppConfig,
    db::create_pool,
    middleware::auth::{Claims, ROLE_CUSTOMER, ROLE_VENDOR},
    models::PricingPeriod,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let customer_id = ensure_user(&pool, "customer@example.com", ROLE_CUSTOMER).await?;
    let vendor_id = ensure_user(&pool, "vendor@example.com", ROLE_VENDOR).await?;
    seed_products(&pool, vendor_id).await?;

    // Dev bearer tokens so the API can be exercised without an identity issuer.
    let customer_token = dev_token(&config.jwt_secret, customer_id, ROLE_CUSTOMER)?;
    let vendor_token = dev_token(&config.jwt_secret, vendor_id, ROLE_VENDOR)?;

    println!("Seed completed.");
    println!("Customer {customer_id}: Bearer {customer_token}");
    println!("Vendor   {vendor_id}: Bearer {vendor_token}");
    Ok(())
}

async fn ensure_user(pool: &sqlx::PgPool, email: &str, role: &str) -> anyhow::Result<Uuid> {
    // DO UPDATE so RETURNING yields the id for pre-existing users too.
    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool, vendor_id: Uuid) -> anyhow::Result<()> {
    use PricingPeriod::{Custom, Daily, Hourly, Weekly};

    let products: Vec<(&str, &str, i64, PricingPeriod, Option<i32>, i32)> = vec![
        ("Excavator 3T", "Mini excavator with operator manual", 80000, Daily, None, 4),
        ("Party Tent 6x12", "Frame tent incl. sidewalls", 45000, Daily, None, 10),
        ("Floor Sander", "Belt sander for hardwood floors", 1500, Hourly, None, 6),
        ("Camera Kit Pro", "Cinema camera with lens set", 210000, Weekly, None, 3),
        ("Scaffold Tower", "Billed per 3-day block", 30000, Custom, Some(72), 12),
    ];

    for (name, desc, price, period, custom_hours, stock) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, pricing_period, custom_period_hours, stock, vendor_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(period.as_str())
        .bind(custom_hours)
        .bind(stock)
        .bind(vendor_id)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}

fn dev_token(secret: &str, user_id: Uuid, role: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + 60 * 60 * 24 * 30) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}
