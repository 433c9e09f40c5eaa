//! Price resolution and cart totals.
//!
//! Catalog prices are display strings (`"1 200 ₽"`), not numbers. A card may
//! carry ordered conditional price rules keyed on the four variant attribute
//! families; the first rule whose constraints all match the customer's
//! selection supplies the unit price, otherwise the base price applies.
//! Amounts are only parsed to integers at aggregation time, leniently: a
//! price that yields no digits counts as zero rather than failing the order.

use serde::{Deserialize, Serialize};

/// A conditional price. An empty constraint set means "this attribute is
/// unconstrained" and matches any selection, including an absent one.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PriceRule {
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub counts: Vec<String>,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    pub price: String,
}

impl PriceRule {
    /// True iff all four attribute constraints accept the selection.
    pub fn matches(&self, selection: &VariantSelection) -> bool {
        constraint_matches(&self.colors, selection.color.as_deref())
            && constraint_matches(&self.counts, selection.count.as_deref())
            && constraint_matches(&self.packages, selection.package.as_deref())
            && constraint_matches(&self.sizes, selection.size.as_deref())
    }
}

fn constraint_matches(allowed: &[String], selected: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    selected.is_some_and(|v| allowed.iter().any(|a| a == v))
}

/// Pricing data of one catalog card: a base price plus ordered overrides.
#[derive(Clone, Debug, Default)]
pub struct ProductPricing {
    pub base_price: String,
    pub price_overrides: Vec<PriceRule>,
}

/// The customer's chosen options for one cart line. Absent means the
/// customer made no selection for that attribute.
#[derive(Clone, Debug, Default)]
pub struct VariantSelection {
    pub color: Option<String>,
    pub count: Option<String>,
    pub package: Option<String>,
    pub size: Option<String>,
}

/// One cart or order line: a priced product, a selection and a unit count.
#[derive(Clone, Debug)]
pub struct CartLine {
    pub pricing: ProductPricing,
    pub selection: VariantSelection,
    pub quantity: u32,
}

/// An aggregated cart value: the raw integer for persistence and the
/// space-grouped display string for messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartTotal {
    pub display: String,
    pub amount: i64,
}

/// Picks the unit price for a selection: the first matching override wins,
/// otherwise the base price.
///
/// Rule order is load-bearing. In particular a rule with all four constraint
/// sets empty matches everything and, placed first, shadows every later
/// rule. That is inherited behavior the catalog relies on; do not reorder or
/// switch to most-specific-match.
pub fn resolve_price<'a>(pricing: &'a ProductPricing, selection: &VariantSelection) -> &'a str {
    pricing
        .price_overrides
        .iter()
        .find(|rule| rule.matches(selection))
        .map(|rule| rule.price.as_str())
        .unwrap_or(&pricing.base_price)
}

/// Sums a cart. Each line's resolved price string is parsed leniently, so a
/// malformed catalog price degrades that line to zero instead of failing the
/// whole order.
pub fn compute_total(lines: &[CartLine]) -> CartTotal {
    let amount = lines
        .iter()
        .map(|line| parse_amount(resolve_price(&line.pricing, &line.selection)) * i64::from(line.quantity))
        .sum();
    CartTotal { display: format_amount(amount), amount }
}

/// "Price for N units" preview: parse one display price, multiply, reformat.
pub fn multiply_price(price: &str, multiplier: u32) -> String {
    format_amount(parse_amount(price) * i64::from(multiplier))
}

/// Parses a display price to whole units by keeping only ASCII digits.
/// Empty or unparsable input is zero, never an error.
pub fn parse_amount(price: &str) -> i64 {
    let digits: String = price.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Formats an amount with space-separated groups of three digits, no
/// currency glyph: `1234567` -> `"1 234 567"`.
pub fn format_amount(amount: i64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let offset = digits.len() % 3;
    for (i, c) in digits.char_indices() {
        if i > 0 && i % 3 == offset % 3 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(colors: &[&str], counts: &[&str], packages: &[&str], sizes: &[&str], price: &str) -> PriceRule {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        PriceRule {
            colors: owned(colors),
            counts: owned(counts),
            packages: owned(packages),
            sizes: owned(sizes),
            price: price.into(),
        }
    }

    fn select(color: Option<&str>) -> VariantSelection {
        VariantSelection { color: color.map(String::from), ..Default::default() }
    }

    #[test]
    fn test_no_overrides_falls_back_to_base() {
        let pricing = ProductPricing { base_price: "1 200 ₽".into(), price_overrides: vec![] };
        assert_eq!(resolve_price(&pricing, &select(Some("red"))), "1 200 ₽");
        assert_eq!(resolve_price(&pricing, &VariantSelection::default()), "1 200 ₽");
    }

    #[test]
    fn test_first_match_wins() {
        let pricing = ProductPricing {
            base_price: "500 ₽".into(),
            price_overrides: vec![
                rule(&["red"], &[], &[], &[], "450 ₽"),
                rule(&["red"], &[], &[], &[], "400 ₽"),
            ],
        };
        assert_eq!(resolve_price(&pricing, &select(Some("red"))), "450 ₽");
    }

    #[test]
    fn test_unconstrained_rule_matches_everything() {
        // The catch-all shadows every rule after it. Historical behavior.
        let pricing = ProductPricing {
            base_price: "500 ₽".into(),
            price_overrides: vec![
                rule(&[], &[], &[], &[], "999 ₽"),
                rule(&["red"], &[], &[], &[], "450 ₽"),
            ],
        };
        assert_eq!(resolve_price(&pricing, &select(Some("red"))), "999 ₽");
        assert_eq!(resolve_price(&pricing, &VariantSelection::default()), "999 ₽");
    }

    #[test]
    fn test_non_member_selection_fails_rule() {
        let pricing = ProductPricing {
            base_price: "500 ₽".into(),
            price_overrides: vec![rule(&["red", "blue"], &[], &[], &[], "450 ₽")],
        };
        assert_eq!(resolve_price(&pricing, &select(Some("green"))), "500 ₽");
    }

    #[test]
    fn test_absent_selection_fails_constrained_rule() {
        let pricing = ProductPricing {
            base_price: "500 ₽".into(),
            price_overrides: vec![rule(&["red"], &[], &[], &[], "450 ₽")],
        };
        assert_eq!(resolve_price(&pricing, &VariantSelection::default()), "500 ₽");
    }

    #[test]
    fn test_all_four_attributes_must_match() {
        let pricing = ProductPricing {
            base_price: "500 ₽".into(),
            price_overrides: vec![rule(&["red"], &["15"], &[], &[], "450 ₽")],
        };
        // Color matches but count is absent against a constrained set.
        assert_eq!(resolve_price(&pricing, &select(Some("red"))), "500 ₽");
        let full = VariantSelection {
            color: Some("red".into()),
            count: Some("15".into()),
            ..Default::default()
        };
        assert_eq!(resolve_price(&pricing, &full), "450 ₽");
    }

    #[test]
    fn test_parse_amount_lenient() {
        assert_eq!(parse_amount("1 200 ₽"), 1200);
        assert_eq!(parse_amount(""), 0);
        assert_eq!(parse_amount("—"), 0);
        assert_eq!(parse_amount("по запросу"), 0);
    }

    #[test]
    fn test_format_amount_groups_of_three() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(900), "900");
        assert_eq!(format_amount(3600), "3 600");
        assert_eq!(format_amount(1234567), "1 234 567");
    }

    #[test]
    fn test_multiply_price() {
        assert_eq!(multiply_price("1 200 ₽", 3), "3 600");
        assert_eq!(multiply_price("", 5), "0");
    }

    #[test]
    fn test_compute_total_end_to_end() {
        let line = CartLine {
            pricing: ProductPricing {
                base_price: "500 ₽".into(),
                price_overrides: vec![rule(&["red"], &[], &[], &[], "450 ₽")],
            },
            selection: select(Some("red")),
            quantity: 2,
        };
        assert_eq!(resolve_price(&line.pricing, &line.selection), "450 ₽");
        let total = compute_total(&[line]);
        assert_eq!(total.amount, 900);
        assert_eq!(total.display, "900");
    }

    #[test]
    fn test_compute_total_multi_line() {
        let cheap = CartLine {
            pricing: ProductPricing { base_price: "450 ₽".into(), price_overrides: vec![] },
            selection: VariantSelection::default(),
            quantity: 2,
        };
        let dear = CartLine {
            pricing: ProductPricing { base_price: "1 234 567 ₽".into(), price_overrides: vec![] },
            selection: VariantSelection::default(),
            quantity: 1,
        };
        let total = compute_total(&[cheap, dear]);
        assert_eq!(total.amount, 1_235_467);
        assert_eq!(total.display, "1 235 467");
    }

    #[test]
    fn test_compute_total_malformed_price_is_zero() {
        let bad = CartLine {
            pricing: ProductPricing { base_price: "—".into(), price_overrides: vec![] },
            selection: VariantSelection::default(),
            quantity: 3,
        };
        let good = CartLine {
            pricing: ProductPricing { base_price: "100 ₽".into(), price_overrides: vec![] },
            selection: VariantSelection::default(),
            quantity: 1,
        };
        let total = compute_total(&[bad, good]);
        assert_eq!(total.amount, 100);
    }
}
