//! Operator notifications.
//!
//! New orders and hints are rendered as HTML messages and published to NATS;
//! the operator-facing bot consumes them from there. Publishing is
//! best-effort: a storefront request never fails because the relay is down.

use crate::domain::pricing::{compute_total, multiply_price, resolve_price, VariantSelection};
use crate::{Hint, Order, OrderItemPayload, ProductSnapshot, StorefrontError};

pub const HINTS_SUBJECT: &str = "storefront.hints";
pub const ORDERS_SUBJECT: &str = "storefront.orders";

/// Comma-joined summary of the chosen variant options, e.g. `"red, 15, box"`.
/// Unselected attributes are omitted.
pub fn selection_summary(selection: &VariantSelection) -> String {
    [&selection.color, &selection.count, &selection.package, &selection.size]
        .into_iter()
        .flatten()
        .filter(|v| !v.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

fn item_line(product: &ProductSnapshot) -> String {
    let pricing = product.pricing();
    let selection = product.selection();
    let summary = selection_summary(&selection);
    let unit = resolve_price(&pricing, &selection).to_string();
    if summary.is_empty() {
        format!("- {}, {} / pc", product.title, unit)
    } else {
        format!("- {}, {}, {} / pc", product.title, summary, unit)
    }
}

pub fn format_hint_message(hint: &Hint) -> String {
    let product: ProductSnapshot =
        serde_json::from_value(hint.product.clone()).unwrap_or_default();
    format!(
        "<b>Hint</b>\n\n\
         from: {}\n\
         receiver: {}\n\
         receiver phone: {}\n\n\
         {}\n\n\
         <i>{}</i>",
        hint.name,
        hint.receiver_name.as_deref().unwrap_or("-"),
        hint.receiver_phone.as_deref().unwrap_or("-"),
        item_line(&product),
        hint.created_at.format("%Y-%m-%d %H:%M"),
    )
}

pub fn format_order_message(order: &Order) -> String {
    let items: Vec<OrderItemPayload> =
        serde_json::from_value(order.items.clone()).unwrap_or_default();
    let lines: Vec<_> = items.iter().map(OrderItemPayload::to_cart_line).collect();
    let total = compute_total(&lines);

    let mut body = String::new();
    for item in &items {
        let line = item_line(&item.product);
        let unit = resolve_price(&item.product.pricing(), &item.product.selection()).to_string();
        body.push_str(&format!("{} x {} = {}\n", line, item.count, multiply_price(&unit, item.count)));
    }

    let mut msg = format!(
        "<b>Order {}</b>\n\n\
         from: {}\n\
         phone: {}\n",
        order.order_number, order.name, order.phone,
    );
    if order.anonymous {
        msg.push_str("anonymous sender\n");
    }
    if let Some(receiver) = order.receiver_name.as_deref() {
        msg.push_str(&format!("receiver: {}\n", receiver));
    }
    if let Some(phone) = order.receiver_phone.as_deref() {
        msg.push_str(&format!("receiver phone: {}\n", phone));
    }
    if let Some(text) = order.postcard_text.as_deref() {
        msg.push_str(&format!("postcard text: {}\n", text));
    }
    if let Some(comment) = order.comment.as_deref() {
        msg.push_str(&format!("comment: {}\n", comment));
    }
    if let Some(delivery) = order.delivery.as_deref() {
        msg.push_str(&format!("delivery: {}\n", delivery));
    }
    match (order.city.as_deref(), order.address.as_deref()) {
        _ if order.request_address => msg.push_str("address: ask the receiver\n"),
        (Some(city), Some(address)) => msg.push_str(&format!("address: {}, {}\n", city, address)),
        (_, Some(address)) => msg.push_str(&format!("address: {}\n", address)),
        _ => {}
    }
    if order.request_datetime {
        msg.push_str("date: ask the receiver\n");
    } else if let (Some(date), Some(time)) = (order.delivery_date.as_deref(), order.delivery_time.as_deref()) {
        msg.push_str(&format!("date: {} {}\n", date, time));
    }

    msg.push_str(&format!(
        "\n{}\nTotal: {}\n\n<i>{}</i>",
        body.trim_end(),
        total.display,
        order.created_at.format("%Y-%m-%d %H:%M"),
    ));
    msg
}

/// Publishes one rendered message. Callers mark the row as notified on
/// success and log on failure; a down relay never fails the storefront
/// request.
pub async fn publish(
    client: Option<&async_nats::Client>,
    subject: &str,
    message: String,
) -> crate::Result<()> {
    let client = client
        .ok_or_else(|| StorefrontError::NotificationError("relay not configured".to_string()))?;
    client
        .publish(subject.to_string(), message.into())
        .await
        .map_err(|e| StorefrontError::NotificationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn snapshot() -> serde_json::Value {
        serde_json::json!({
            "title": "Roses",
            "price": "500 ₽",
            "prices": [{"colors": ["red"], "price": "450 ₽"}],
            "selectedColor": "red",
            "selectedCount": "15"
        })
    }

    #[test]
    fn test_selection_summary_skips_absent() {
        let s = VariantSelection {
            color: Some("red".into()),
            count: Some("15".into()),
            package: None,
            size: Some(String::new()),
        };
        assert_eq!(selection_summary(&s), "red, 15");
        assert_eq!(selection_summary(&VariantSelection::default()), "");
    }

    #[test]
    fn test_hint_message_uses_resolved_price() {
        let hint = Hint {
            id: Uuid::nil(),
            name: "Anna".into(),
            receiver_name: Some("Maria".into()),
            receiver_phone: Some("+7 900 000-00-00".into()),
            product: snapshot(),
            notified: false,
            created_at: Utc::now(),
        };
        let msg = format_hint_message(&hint);
        assert!(msg.starts_with("<b>Hint</b>"));
        assert!(msg.contains("- Roses, red, 15, 450 ₽ / pc"));
        assert!(msg.contains("receiver: Maria"));
    }

    #[test]
    fn test_order_message_totals() {
        let order = Order {
            id: Uuid::nil(),
            order_number: "ORD-00000001".into(),
            name: "Ivan".into(),
            phone: "+7 911 000-00-00".into(),
            anonymous: true,
            receiver_name: Some("Olga".into()),
            receiver_phone: None,
            postcard_text: None,
            comment: None,
            delivery: Some("courier".into()),
            city: Some("Moscow".into()),
            address: Some("Arbat 1".into()),
            delivery_date: None,
            delivery_time: None,
            request_address: false,
            request_datetime: true,
            items: serde_json::json!([{"product": snapshot(), "count": 2}]),
            total_display: "900".into(),
            total_amount: 900,
            notified: false,
            created_at: Utc::now(),
        };
        let msg = format_order_message(&order);
        assert!(msg.contains("anonymous sender"));
        assert!(msg.contains("x 2 = 900"));
        assert!(msg.contains("Total: 900"));
        assert!(msg.contains("address: Moscow, Arbat 1"));
        assert!(msg.contains("date: ask the receiver"));
    }
}
