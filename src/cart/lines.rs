//! Cart Lines

use std::str::FromStr;

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{cart::errors::ValidationError, uuids::TypedUuid};

/// Cart line identifier.
pub type LineId = TypedUuid<CartLine>;

/// A provisional order line the customer has not submitted yet.
///
/// This is also the persisted shape: the durable store holds a JSON array
/// of these records per identity-scoped key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Line id, assigned when the line is first inserted.
    #[serde(default)]
    pub id: LineId,

    /// Coarse classification, e.g. the livestock species.
    pub category: String,

    /// Item identity.
    #[serde(default)]
    pub item_key: Option<String>,

    /// Item display name.
    #[serde(default)]
    pub item_label: Option<String>,

    /// Finer classification (the cut).
    #[serde(default)]
    pub sub_item: Option<String>,

    /// Ordered amount, possibly fractional.
    #[serde(
        default,
        deserialize_with = "lenient_quantity",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub quantity: Decimal,

    /// Unit-of-measure code.
    #[serde(default)]
    pub unit: String,

    /// Free-text annotation.
    #[serde(default)]
    pub note: Option<String>,

    /// When the line's equivalence class was first inserted.
    #[serde(default = "Timestamp::now")]
    pub created_at: Timestamp,
}

impl CartLine {
    /// The value used as the item identity: `item_key`, else `item_label`.
    pub fn item_identity(&self) -> Option<&str> {
        present(self.item_key.as_deref()).or_else(|| present(self.item_label.as_deref()))
    }

    /// The name shown to the customer: `item_label`, else `item_key`.
    pub fn display_label(&self) -> &str {
        present(self.item_label.as_deref())
            .or_else(|| present(self.item_key.as_deref()))
            .unwrap_or_default()
    }
}

/// Input for adding a line to the cart.
///
/// Carries no id or timestamp; the store stamps those on insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartLine {
    /// Coarse classification. Required.
    #[serde(default)]
    pub category: String,

    /// Item identity. Required unless `item_label` is given.
    #[serde(default)]
    pub item_key: Option<String>,

    /// Item display name.
    #[serde(default)]
    pub item_label: Option<String>,

    /// Finer classification (the cut).
    #[serde(default)]
    pub sub_item: Option<String>,

    /// Ordered amount. Must be positive.
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub quantity: Decimal,

    /// Unit code; the configured default unit is used when absent.
    #[serde(default)]
    pub unit: Option<String>,

    /// Free-text annotation.
    #[serde(default)]
    pub note: Option<String>,
}

impl NewCartLine {
    /// Create a line for `item_key` in `category`.
    pub fn new(
        category: impl Into<String>,
        item_key: impl Into<String>,
        quantity: impl Into<Decimal>,
    ) -> Self {
        Self {
            category: category.into(),
            item_key: Some(item_key.into()),
            quantity: quantity.into(),
            ..Self::default()
        }
    }

    /// Set the display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.item_label = Some(label.into());
        self
    }

    /// Set the sub-item (cut).
    #[must_use]
    pub fn with_sub_item(mut self, sub_item: impl Into<String>) -> Self {
        self.sub_item = Some(sub_item.into());
        self
    }

    /// Set the unit code.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Check the fields every cart line must carry.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid field: category, then item
    /// identity, then a positive quantity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if present(Some(&self.category)).is_none() {
            return Err(ValidationError::MissingCategory);
        }

        if present(self.item_key.as_deref())
            .or_else(|| present(self.item_label.as_deref()))
            .is_none()
        {
            return Err(ValidationError::MissingItem);
        }

        if self.quantity <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveQuantity);
        }

        Ok(())
    }

    /// Build the stored line, stamping a fresh id and creation time.
    pub(crate) fn into_line(self, default_unit: &str, now: Timestamp) -> CartLine {
        let unit = present(self.unit.as_deref())
            .unwrap_or(default_unit)
            .to_string();

        CartLine {
            id: LineId::new(),
            category: self.category.trim().to_string(),
            item_key: self.item_key,
            item_label: self.item_label,
            sub_item: self.sub_item.filter(|sub_item| !sub_item.trim().is_empty()),
            quantity: self.quantity,
            unit,
            note: self.note,
            created_at: now,
        }
    }
}

/// A partial edit to an existing line.
///
/// `None` leaves a field untouched. The category is fixed at creation and
/// cannot be patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartLinePatch {
    /// New display label.
    pub item_label: Option<String>,

    /// New sub-item; `Some(None)` clears it.
    pub sub_item: Option<Option<String>>,

    /// New quantity. Must be positive.
    pub quantity: Option<Decimal>,

    /// New unit code.
    pub unit: Option<String>,

    /// New note; `Some(None)` clears it.
    pub note: Option<Option<String>>,
}

impl CartLinePatch {
    /// Patch that only changes the quantity.
    pub fn quantity(quantity: impl Into<Decimal>) -> Self {
        Self {
            quantity: Some(quantity.into()),
            ..Self::default()
        }
    }

    /// Patch that only changes the unit.
    pub fn unit(unit: impl Into<String>) -> Self {
        Self {
            unit: Some(unit.into()),
            ..Self::default()
        }
    }

    /// Patch that only changes the note.
    pub fn note(note: Option<String>) -> Self {
        Self {
            note: Some(note),
            ..Self::default()
        }
    }

    /// Reject patches that would leave the line without a positive quantity
    /// or without a unit.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPositiveQuantity`] for a zero or negative
    /// quantity, or [`ValidationError::BlankUnit`] for a blank unit.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quantity.is_some_and(|quantity| quantity <= Decimal::ZERO) {
            return Err(ValidationError::NonPositiveQuantity);
        }

        if self.unit.as_deref().is_some_and(|unit| unit.trim().is_empty()) {
            return Err(ValidationError::BlankUnit);
        }

        Ok(())
    }

    pub(crate) fn apply_to(self, line: &mut CartLine) {
        if let Some(item_label) = self.item_label {
            line.item_label = Some(item_label);
        }
        if let Some(sub_item) = self.sub_item {
            line.sub_item = sub_item;
        }
        if let Some(quantity) = self.quantity {
            line.quantity = quantity;
        }
        if let Some(unit) = present(self.unit.as_deref()) {
            line.unit = unit.to_string();
        }
        if let Some(note) = self.note {
            line.note = note;
        }
    }
}

/// Coerce a loosely typed JSON quantity into a decimal.
///
/// Numbers and numeric strings are parsed; anything else is zero.
pub fn coerce_quantity(value: &Value) -> Decimal {
    match value {
        Value::Number(number) => parse_decimal(&number.to_string()),
        Value::String(text) => parse_decimal(text.trim()),
        _ => Decimal::ZERO,
    }
}

fn parse_decimal(text: &str) -> Decimal {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .unwrap_or(Decimal::ZERO)
}

fn lenient_quantity<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;

    Ok(coerce_quantity(&value))
}

pub(crate) fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn coerce_quantity_handles_numbers_and_strings() {
        assert_eq!(coerce_quantity(&json!(2)), Decimal::from(2));
        assert_eq!(coerce_quantity(&json!(2.5)), Decimal::new(25, 1));
        assert_eq!(coerce_quantity(&json!(" 1.25 ")), Decimal::new(125, 2));
        assert_eq!(coerce_quantity(&json!("1e2")), Decimal::from(100));
    }

    #[test]
    fn coerce_quantity_defaults_garbage_to_zero() {
        assert_eq!(coerce_quantity(&json!("lots")), Decimal::ZERO);
        assert_eq!(coerce_quantity(&json!(null)), Decimal::ZERO);
        assert_eq!(coerce_quantity(&json!([1])), Decimal::ZERO);
    }

    #[test]
    fn persisted_line_tolerates_missing_fields() -> TestResult {
        let line: CartLine = serde_json::from_value(json!({
            "category": "pork",
            "itemLabel": "belly",
            "quantity": "3"
        }))?;

        assert_eq!(line.quantity, Decimal::from(3));
        assert_eq!(line.unit, "");
        assert_eq!(line.item_identity(), Some("belly"));

        Ok(())
    }

    #[test]
    fn persisted_line_round_trips_through_json() -> TestResult {
        let line = NewCartLine::new("beef", "rib", Decimal::new(25, 1))
            .with_unit("KG")
            .with_note("thick")
            .into_line("KG", Timestamp::now());

        let json = serde_json::to_value(&line)?;
        let back: CartLine = serde_json::from_value(json.clone())?;

        assert_eq!(json["itemKey"], "rib");
        assert_eq!(json["quantity"], json!(2.5));
        assert_eq!(back, line);

        Ok(())
    }

    #[test]
    fn into_line_defaults_blank_unit() {
        let line = NewCartLine::new("beef", "rib", 1)
            .with_unit("  ")
            .into_line("BOX", Timestamp::now());

        assert_eq!(line.unit, "BOX");
    }

    #[test]
    fn item_identity_falls_back_to_label() {
        let mut line = NewCartLine::new("beef", " ", 1)
            .with_label("Ribeye")
            .into_line("KG", Timestamp::now());

        assert_eq!(line.item_identity(), Some("Ribeye"));

        line.item_label = None;

        assert_eq!(line.item_identity(), None);
        assert_eq!(line.display_label(), "");
    }

    #[test]
    fn validate_requires_category_item_and_quantity() {
        let missing_item = NewCartLine {
            category: "X".to_string(),
            ..NewCartLine::default()
        };

        assert_eq!(missing_item.validate(), Err(ValidationError::MissingItem));
        assert_eq!(
            NewCartLine::new(" ", "rib", 1).validate(),
            Err(ValidationError::MissingCategory)
        );
        assert_eq!(
            NewCartLine::new("beef", "rib", 0).validate(),
            Err(ValidationError::NonPositiveQuantity)
        );
        assert_eq!(
            NewCartLine::new("beef", "rib", -2).validate(),
            Err(ValidationError::NonPositiveQuantity)
        );
        assert_eq!(NewCartLine::new("beef", "rib", 1).validate(), Ok(()));
    }

    #[test]
    fn validate_accepts_label_without_key() {
        let line = NewCartLine {
            category: "beef".to_string(),
            item_label: Some("Ribeye".to_string()),
            quantity: Decimal::new(5, 1),
            ..NewCartLine::default()
        };

        assert_eq!(line.validate(), Ok(()));
    }

    #[test]
    fn patch_rejects_non_positive_quantity() {
        assert_eq!(
            CartLinePatch::quantity(0).validate(),
            Err(ValidationError::NonPositiveQuantity)
        );
        assert_eq!(CartLinePatch::unit("BOX").validate(), Ok(()));
    }

    #[test]
    fn patch_rejects_blank_unit_and_trims_the_rest() {
        assert_eq!(
            CartLinePatch::unit("  ").validate(),
            Err(ValidationError::BlankUnit)
        );

        let mut line = NewCartLine::new("beef", "rib", 1).into_line("KG", Timestamp::now());

        CartLinePatch::unit(" BOX ").apply_to(&mut line);

        assert_eq!(line.unit, "BOX");
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut line = NewCartLine::new("beef", "rib", 1)
            .with_note("keep")
            .into_line("KG", Timestamp::now());

        CartLinePatch::quantity(4).apply_to(&mut line);

        assert_eq!(line.quantity, Decimal::from(4));
        assert_eq!(line.note.as_deref(), Some("keep"));
        assert_eq!(line.unit, "KG");
    }
}
