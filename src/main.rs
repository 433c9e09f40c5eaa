//! Gift Storefront - HTTP service

use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use gift_storefront::domain::pricing::{self, PriceRule};
use gift_storefront::{notify, BusinessSettings, Card, Hint, Order, OrderItemPayload, ProductSnapshot, StorefrontError};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)] pub struct AppState { pub db: sqlx::PgPool, pub nats: Option<async_nats::Client> }

type ApiError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> ApiError { (StatusCode::INTERNAL_SERVER_ERROR, StorefrontError::StorageError(e.to_string()).to_string()) }
fn not_found(e: StorefrontError) -> ApiError { (StatusCode::NOT_FOUND, e.to_string()) }

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let db = PgPoolOptions::new().max_connections(10).connect(&std::env::var("DATABASE_URL")?).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let nats = match std::env::var("NATS_URL") {
        Ok(url) => async_nats::connect(&url).await.map_err(|e| tracing::warn!(error = %e, "NATS unavailable, notifications disabled")).ok(),
        Err(_) => None,
    };
    let state = AppState { db, nats };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "gift-storefront"})) }))
        .route("/api/v1/cards", get(list_cards).post(create_card))
        .route("/api/v1/cards/:id", get(get_card).put(update_card).delete(delete_card))
        .route("/api/v1/cards/:id/price", get(preview_price))
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/hints", get(list_hints).post(create_hint))
        .route("/api/v1/settings", get(get_settings).put(update_settings))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "4000".to_string());
    tracing::info!("gift-storefront listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

// =============================================================================
// Cards
// =============================================================================

#[derive(Debug, Deserialize)] pub struct ListCardsParams { pub sort: Option<String>, pub min_price: Option<i64>, pub max_price: Option<i64>, pub search: Option<String>, pub limit: Option<u32> }

async fn list_cards(State(s): State<AppState>, Query(p): Query<ListCardsParams>) -> Result<Json<Vec<Card>>, ApiError> {
    // Sort keys match the storefront UI: popularity or derived numeric price.
    let order_by = match p.sort.as_deref() {
        Some("views") => "views_count DESC",
        Some("price_asc") => "price_number ASC",
        Some("price_desc") => "price_number DESC",
        _ => "created_at DESC",
    };
    let query = format!(
        "SELECT * FROM cards WHERE price_number BETWEEN $1 AND $2 AND ($3::text IS NULL OR title ILIKE '%' || $3 || '%') ORDER BY {} LIMIT $4",
        order_by
    );
    let cards = sqlx::query_as::<_, Card>(&query)
        .bind(p.min_price.unwrap_or(0)).bind(p.max_price.unwrap_or(i64::MAX)).bind(&p.search).bind(i64::from(p.limit.unwrap_or(50).min(200)))
        .fetch_all(&s.db).await.map_err(internal)?;
    Ok(Json(cards))
}

async fn get_card(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Card>, ApiError> {
    // Every fetch counts a view; views feed the popularity sort.
    sqlx::query_as::<_, Card>("UPDATE cards SET views_count = views_count + 1 WHERE id = $1 RETURNING *")
        .bind(id).fetch_optional(&s.db).await.map_err(internal)?.map(Json).ok_or_else(|| not_found(StorefrontError::CardNotFound))
}

#[derive(Debug, Deserialize)]
pub struct UpsertCardRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)] pub price: String,
    #[serde(default)] pub colors: Vec<String>,
    #[serde(default)] pub counts: Vec<String>,
    #[serde(default)] pub packages: Vec<String>,
    #[serde(default)] pub sizes: Vec<String>,
    #[serde(default)] pub prices: Vec<PriceRule>,
    #[serde(default)] pub images: Vec<String>,
}

fn rules_json(rules: &[PriceRule]) -> serde_json::Value {
    serde_json::to_value(rules).unwrap_or_else(|_| serde_json::Value::Array(vec![]))
}

async fn create_card(State(s): State<AppState>, Json(r): Json<UpsertCardRequest>) -> Result<(StatusCode, Json<Card>), ApiError> {
    let price_number = pricing::parse_amount(&r.price);
    let card = sqlx::query_as::<_, Card>("INSERT INTO cards (id, title, description, price, price_number, colors, counts, packages, sizes, price_rules, images, views_count, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, NOW(), NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(&r.title).bind(&r.description).bind(&r.price).bind(price_number)
        .bind(&r.colors).bind(&r.counts).bind(&r.packages).bind(&r.sizes).bind(rules_json(&r.prices)).bind(&r.images)
        .fetch_one(&s.db).await.map_err(internal)?;
    Ok((StatusCode::CREATED, Json(card)))
}

async fn update_card(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<UpsertCardRequest>) -> Result<Json<Card>, ApiError> {
    let price_number = pricing::parse_amount(&r.price);
    let card = sqlx::query_as::<_, Card>("UPDATE cards SET title = $2, description = $3, price = $4, price_number = $5, colors = $6, counts = $7, packages = $8, sizes = $9, price_rules = $10, images = $11, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(&r.title).bind(&r.description).bind(&r.price).bind(price_number)
        .bind(&r.colors).bind(&r.counts).bind(&r.packages).bind(&r.sizes).bind(rules_json(&r.prices)).bind(&r.images)
        .fetch_optional(&s.db).await.map_err(internal)?.ok_or_else(|| not_found(StorefrontError::CardNotFound))?;
    Ok(Json(card))
}

async fn delete_card(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    sqlx::query("DELETE FROM cards WHERE id = $1").bind(id).execute(&s.db).await.map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)] pub struct PricePreviewParams { pub color: Option<String>, pub count: Option<String>, pub package: Option<String>, pub size: Option<String>, pub qty: Option<u32> }
#[derive(Debug, Serialize)] pub struct PricePreview { pub unit_price: String, pub quantity: u32, pub total: String }

/// Resolves the unit price for a variant selection and previews the price
/// for `qty` units, without creating a cart.
async fn preview_price(State(s): State<AppState>, Path(id): Path<Uuid>, Query(p): Query<PricePreviewParams>) -> Result<Json<PricePreview>, ApiError> {
    let card = sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = $1")
        .bind(id).fetch_optional(&s.db).await.map_err(internal)?.ok_or_else(|| not_found(StorefrontError::CardNotFound))?;
    let selection = pricing::VariantSelection { color: p.color, count: p.count, package: p.package, size: p.size };
    let card_pricing = card.pricing();
    let unit_price = pricing::resolve_price(&card_pricing, &selection).to_string();
    let quantity = p.qty.unwrap_or(1);
    let total = pricing::multiply_price(&unit_price, quantity);
    Ok(Json(PricePreview { unit_price, quantity, total }))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1))] pub name: String,
    #[validate(length(min = 1))] pub phone: String,
    #[serde(default)] pub anonymous: bool,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    pub postcard_text: Option<String>,
    pub comment: Option<String>,
    pub delivery: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub delivery_date: Option<String>,
    pub delivery_time: Option<String>,
    #[serde(default)] pub request_address: bool,
    #[serde(default)] pub request_datetime: bool,
    #[serde(default)] pub items: Vec<OrderItemPayload>,
}

async fn create_order(State(s): State<AppState>, Json(r): Json<CreateOrderRequest>) -> Result<(StatusCode, Json<Order>), ApiError> {
    r.validate().map_err(|e| (StatusCode::BAD_REQUEST, StorefrontError::InvalidRequest(e.to_string()).to_string()))?;
    let lines: Vec<_> = r.items.iter().map(OrderItemPayload::to_cart_line).collect();
    let total = pricing::compute_total(&lines);
    let items = serde_json::to_value(&r.items).map_err(internal)?;
    let order_number = format!("ORD-{:08}", rand::random::<u32>());

    let order = sqlx::query_as::<_, Order>("INSERT INTO orders (id, order_number, name, phone, anonymous, receiver_name, receiver_phone, postcard_text, comment, delivery, city, address, delivery_date, delivery_time, request_address, request_datetime, items, total_display, total_amount, notified, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, FALSE, NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(&order_number).bind(&r.name).bind(&r.phone).bind(r.anonymous)
        .bind(&r.receiver_name).bind(&r.receiver_phone).bind(&r.postcard_text).bind(&r.comment)
        .bind(&r.delivery).bind(&r.city).bind(&r.address).bind(&r.delivery_date).bind(&r.delivery_time)
        .bind(r.request_address).bind(r.request_datetime).bind(&items).bind(&total.display).bind(total.amount)
        .fetch_one(&s.db).await.map_err(internal)?;

    tracing::info!(order = %order.order_number, total = order.total_amount, "order created");
    match notify::publish(s.nats.as_ref(), notify::ORDERS_SUBJECT, notify::format_order_message(&order)).await {
        Ok(()) => { sqlx::query("UPDATE orders SET notified = TRUE WHERE id = $1").bind(order.id).execute(&s.db).await.ok(); }
        Err(e) => tracing::warn!(order = %order.order_number, error = %e, "order notification not relayed"),
    }
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)] pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32> }
#[derive(Debug, Serialize)] pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: i64, pub page: u32 }

async fn list_orders(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<Order>>, ApiError> {
    let page = p.page.unwrap_or(1).max(1); let per_page = p.per_page.unwrap_or(20).min(100);
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2")
        .bind(i64::from(per_page)).bind(i64::from((page - 1) * per_page)).fetch_all(&s.db).await.map_err(internal)?;
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders").fetch_one(&s.db).await.map_err(internal)?;
    Ok(Json(PaginatedResponse { data: orders, total: total.0, page }))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>, ApiError> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&s.db).await.map_err(internal)?.map(Json).ok_or_else(|| not_found(StorefrontError::OrderNotFound))
}

// =============================================================================
// Hints
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateHintRequest {
    #[validate(length(min = 1))] pub name: String,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    #[serde(default)] pub product: ProductSnapshot,
}

async fn create_hint(State(s): State<AppState>, Json(r): Json<CreateHintRequest>) -> Result<(StatusCode, Json<Hint>), ApiError> {
    r.validate().map_err(|e| (StatusCode::BAD_REQUEST, StorefrontError::InvalidRequest(e.to_string()).to_string()))?;
    let product = serde_json::to_value(&r.product).map_err(internal)?;
    let hint = sqlx::query_as::<_, Hint>("INSERT INTO hints (id, name, receiver_name, receiver_phone, product, notified, created_at) VALUES ($1, $2, $3, $4, $5, FALSE, NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(&r.name).bind(&r.receiver_name).bind(&r.receiver_phone).bind(&product)
        .fetch_one(&s.db).await.map_err(internal)?;

    match notify::publish(s.nats.as_ref(), notify::HINTS_SUBJECT, notify::format_hint_message(&hint)).await {
        Ok(()) => { sqlx::query("UPDATE hints SET notified = TRUE WHERE id = $1").bind(hint.id).execute(&s.db).await.ok(); }
        Err(e) => tracing::warn!(hint = %hint.id, error = %e, "hint notification not relayed"),
    }
    Ok((StatusCode::CREATED, Json(hint)))
}

async fn list_hints(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<Hint>>, ApiError> {
    let page = p.page.unwrap_or(1).max(1); let per_page = p.per_page.unwrap_or(20).min(100);
    let hints = sqlx::query_as::<_, Hint>("SELECT * FROM hints ORDER BY created_at DESC LIMIT $1 OFFSET $2")
        .bind(i64::from(per_page)).bind(i64::from((page - 1) * per_page)).fetch_all(&s.db).await.map_err(internal)?;
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM hints").fetch_one(&s.db).await.map_err(internal)?;
    Ok(Json(PaginatedResponse { data: hints, total: total.0, page }))
}

// =============================================================================
// Business settings
// =============================================================================

async fn get_settings(State(s): State<AppState>) -> Result<Json<BusinessSettings>, ApiError> {
    let settings = sqlx::query_as::<_, BusinessSettings>("SELECT * FROM business_settings ORDER BY created_at LIMIT 1")
        .fetch_optional(&s.db).await.map_err(internal)?;
    Ok(Json(settings.unwrap_or_else(BusinessSettings::defaults)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)] pub business_name: String,
    #[serde(default)] pub logo_url: String,
    #[serde(default)] pub tagline: String,
    #[serde(default)] pub advantages: String,
    #[serde(default)] pub phone_number: String,
    #[serde(default)] pub telegram_url: String,
    #[serde(default)] pub whatsapp_url: String,
    #[serde(default)] pub address: String,
    #[serde(default)] pub yandex_map_url: String,
    #[serde(default)] pub yandex_reviews_url: String,
    #[serde(default)] pub call_to_action: String,
    #[serde(default = "empty_faq")] pub faq: serde_json::Value,
}

fn empty_faq() -> serde_json::Value { serde_json::Value::Array(vec![]) }

async fn update_settings(State(s): State<AppState>, Json(r): Json<UpdateSettingsRequest>) -> Result<Json<BusinessSettings>, ApiError> {
    let name = if r.business_name.is_empty() { "LB".to_string() } else { r.business_name };
    let updated = sqlx::query_as::<_, BusinessSettings>("UPDATE business_settings SET business_name = $1, logo_url = $2, tagline = $3, advantages = $4, phone_number = $5, telegram_url = $6, whatsapp_url = $7, address = $8, yandex_map_url = $9, yandex_reviews_url = $10, call_to_action = $11, faq = $12, updated_at = NOW() RETURNING *")
        .bind(&name).bind(&r.logo_url).bind(&r.tagline).bind(&r.advantages).bind(&r.phone_number)
        .bind(&r.telegram_url).bind(&r.whatsapp_url).bind(&r.address).bind(&r.yandex_map_url)
        .bind(&r.yandex_reviews_url).bind(&r.call_to_action).bind(&r.faq)
        .fetch_optional(&s.db).await.map_err(internal)?;
    if let Some(settings) = updated { return Ok(Json(settings)); }
    let created = sqlx::query_as::<_, BusinessSettings>("INSERT INTO business_settings (id, business_name, logo_url, tagline, advantages, phone_number, telegram_url, whatsapp_url, address, yandex_map_url, yandex_reviews_url, call_to_action, faq, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(&name).bind(&r.logo_url).bind(&r.tagline).bind(&r.advantages).bind(&r.phone_number)
        .bind(&r.telegram_url).bind(&r.whatsapp_url).bind(&r.address).bind(&r.yandex_map_url)
        .bind(&r.yandex_reviews_url).bind(&r.call_to_action).bind(&r.faq)
        .fetch_one(&s.db).await.map_err(internal)?;
    Ok(Json(created))
}
