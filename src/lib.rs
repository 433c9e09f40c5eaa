//! Gift Storefront Backend
//!
//! Backend for a gifting business storefront.
//!
//! ## Features
//! - Product catalog ("cards") with variant attributes and conditional prices
//! - Order and hint (gift suggestion) intake
//! - Price resolution and cart totals
//! - Operator notifications relayed over NATS
//! - Business-level settings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::pricing::{CartLine, PriceRule, ProductPricing, VariantSelection};

pub mod domain;
pub mod notify;

// =============================================================================
// Catalog
// =============================================================================

/// One catalog entry. `price` is the display string shown to customers;
/// `price_number` is derived from it at write time and exists only for
/// sorting and range filtering.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Card {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: String,
    pub price_number: i64,
    pub colors: Vec<String>,
    pub counts: Vec<String>,
    pub packages: Vec<String>,
    pub sizes: Vec<String>,
    pub price_rules: serde_json::Value,
    pub images: Vec<String>,
    pub views_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Pricing view of this card. Malformed stored rules degrade to "no
    /// overrides" rather than failing the request.
    pub fn pricing(&self) -> ProductPricing {
        let price_overrides: Vec<PriceRule> =
            serde_json::from_value(self.price_rules.clone()).unwrap_or_default();
        ProductPricing { base_price: self.price.clone(), price_overrides }
    }
}

// =============================================================================
// Orders and hints
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub name: String,
    pub phone: String,
    pub anonymous: bool,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    pub postcard_text: Option<String>,
    pub comment: Option<String>,
    pub delivery: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub delivery_date: Option<String>,
    pub delivery_time: Option<String>,
    pub request_address: bool,
    pub request_datetime: bool,
    pub items: serde_json::Value,
    pub total_display: String,
    pub total_amount: i64,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Hint {
    pub id: Uuid,
    pub name: String,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    pub product: serde_json::Value,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
}

/// Product state captured inside an order or hint payload: enough to resolve
/// the price the customer saw, independent of later catalog edits. Wire keys
/// are camelCase (`selectedColor` etc.).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub prices: Vec<PriceRule>,
    #[serde(default)]
    pub selected_color: Option<String>,
    #[serde(default)]
    pub selected_count: Option<String>,
    #[serde(default)]
    pub selected_package: Option<String>,
    #[serde(default)]
    pub selected_size: Option<String>,
}

impl ProductSnapshot {
    pub fn pricing(&self) -> ProductPricing {
        ProductPricing { base_price: self.price.clone(), price_overrides: self.prices.clone() }
    }

    pub fn selection(&self) -> VariantSelection {
        VariantSelection {
            color: self.selected_color.clone(),
            count: self.selected_count.clone(),
            package: self.selected_package.clone(),
            size: self.selected_size.clone(),
        }
    }
}

/// One entry of an order's `items` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderItemPayload {
    pub product: ProductSnapshot,
    pub count: u32,
}

impl OrderItemPayload {
    pub fn to_cart_line(&self) -> CartLine {
        CartLine {
            pricing: self.product.pricing(),
            selection: self.product.selection(),
            quantity: self.count,
        }
    }
}

// =============================================================================
// Business settings
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct BusinessSettings {
    pub id: Uuid,
    pub business_name: String,
    pub logo_url: String,
    pub tagline: String,
    pub advantages: String,
    pub phone_number: String,
    pub telegram_url: String,
    pub whatsapp_url: String,
    pub address: String,
    pub yandex_map_url: String,
    pub yandex_reviews_url: String,
    pub call_to_action: String,
    pub faq: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BusinessSettings {
    /// Defaults served when no settings row exists yet.
    pub fn defaults() -> Self {
        Self {
            id: Uuid::nil(),
            business_name: "LB".to_string(),
            logo_url: String::new(),
            tagline: String::new(),
            advantages: String::new(),
            phone_number: String::new(),
            telegram_url: String::new(),
            whatsapp_url: String::new(),
            address: String::new(),
            yandex_map_url: String::new(),
            yandex_reviews_url: String::new(),
            call_to_action: String::new(),
            faq: serde_json::Value::Array(vec![]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Card not found")]
    CardNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::{compute_total, resolve_price};

    #[test]
    fn test_order_item_payload_wire_shape() {
        // Order intake JSON uses camelCase selected-attribute keys.
        let item: OrderItemPayload = serde_json::from_value(serde_json::json!({
            "product": {
                "title": "Roses",
                "price": "500 ₽",
                "prices": [{"colors": ["red"], "price": "450 ₽"}],
                "selectedColor": "red"
            },
            "count": 2
        }))
        .unwrap();
        let line = item.to_cart_line();
        assert_eq!(resolve_price(&line.pricing, &line.selection), "450 ₽");
        assert_eq!(compute_total(&[line]).amount, 900);
    }

    #[test]
    fn test_card_pricing_tolerates_malformed_rules() {
        let mut card = Card {
            id: Uuid::nil(),
            title: "Roses".into(),
            description: None,
            price: "500 ₽".into(),
            price_number: 500,
            colors: vec![],
            counts: vec![],
            packages: vec![],
            sizes: vec![],
            price_rules: serde_json::json!("not an array"),
            images: vec![],
            views_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(card.pricing().price_overrides.is_empty());
        card.price_rules = serde_json::json!([{"colors": [], "price": "450 ₽"}]);
        assert_eq!(card.pricing().price_overrides.len(), 1);
    }
}
