//! Self-describing field lists and the accessor that reads and writes them.
//!
//! # Design
//! On the wire a field names its own value slot:
//!
//! ```json
//! { "label": "Priority", "type": "menuItem", "menuItem": { "id": 3, "label": "Immediate" } }
//! ```
//!
//! `Field` decodes that into a closed `FieldValue` enum, so a field always
//! has exactly one slot. Tags this crate has no shape for, and known tags
//! whose slot does not have the expected shape (a `null` date, say), decode
//! to `FieldValue::Other` and are re-encoded exactly as received. Any other
//! keys on the field object ride along in `Field::extra`. Together that keeps
//! read-modify-write of whole records lossless, and reading never fails on
//! one odd slot.

use serde::de::{self, Unexpected};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::FieldError;

/// Wire type tags.
pub mod tags {
    pub const STRING: &str = "string";
    pub const NUMBER: &str = "number";
    pub const BOOLEAN: &str = "boolean";
    pub const DATE_TIME: &str = "dateTime";
    pub const MENU_ITEM: &str = "menuItem";
    pub const FORMATTED_STRING: &str = "formattedString";
    pub const USER: &str = "user";
}

/// A menu selection. `id` is the resolved identifier; the backend resolves
/// by `label` when `id` is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub label: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A text block that may carry rich formatting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedString {
    #[serde(default, deserialize_with = "bool_or_string")]
    pub is_formatted: bool,
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A reference to a backend user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub username: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The value slot of a field, one variant per known type tag.
///
/// Serializes as the bare slot contents, without label or tag.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Number(Number),
    Boolean(bool),
    DateTime(String),
    MenuItem(MenuItem),
    FormattedString(FormattedString),
    User(UserRef),
    Other { type_tag: String, value: Value },
}

impl FieldValue {
    /// Decode the slot stored under `type_tag`. A slot that does not fit the
    /// tag's shape is kept verbatim as `Other`.
    pub fn from_slot(type_tag: &str, slot: Value) -> Self {
        let decoded = match type_tag {
            tags::STRING => String::deserialize(&slot).map(FieldValue::String),
            tags::NUMBER => Number::deserialize(&slot).map(FieldValue::Number),
            tags::BOOLEAN => bool::deserialize(&slot).map(FieldValue::Boolean),
            tags::DATE_TIME => String::deserialize(&slot).map(FieldValue::DateTime),
            tags::MENU_ITEM => MenuItem::deserialize(&slot).map(FieldValue::MenuItem),
            tags::FORMATTED_STRING => FormattedString::deserialize(&slot).map(FieldValue::FormattedString),
            tags::USER => UserRef::deserialize(&slot).map(FieldValue::User),
            _ => {
                return FieldValue::Other {
                    type_tag: type_tag.to_string(),
                    value: slot,
                }
            }
        };
        decoded.unwrap_or_else(|e| {
            tracing::debug!(type_tag, "keeping undecodable slot as-is: {e}");
            FieldValue::Other {
                type_tag: type_tag.to_string(),
                value: slot,
            }
        })
    }

    /// An empty value of a known type, `None` for tags without a shape.
    fn blank(type_tag: &str) -> Option<Self> {
        Some(match type_tag {
            tags::STRING => FieldValue::String(String::new()),
            tags::NUMBER => FieldValue::Number(Number::from(0)),
            tags::BOOLEAN => FieldValue::Boolean(false),
            tags::DATE_TIME => FieldValue::DateTime(String::new()),
            tags::MENU_ITEM => FieldValue::MenuItem(MenuItem::default()),
            tags::FORMATTED_STRING => FieldValue::FormattedString(FormattedString::default()),
            tags::USER => FieldValue::User(UserRef::default()),
            _ => return None,
        })
    }

    pub fn type_tag(&self) -> &str {
        match self {
            FieldValue::String(_) => tags::STRING,
            FieldValue::Number(_) => tags::NUMBER,
            FieldValue::Boolean(_) => tags::BOOLEAN,
            FieldValue::DateTime(_) => tags::DATE_TIME,
            FieldValue::MenuItem(_) => tags::MENU_ITEM,
            FieldValue::FormattedString(_) => tags::FORMATTED_STRING,
            FieldValue::User(_) => tags::USER,
            FieldValue::Other { type_tag, .. } => type_tag,
        }
    }

    /// The human-readable text of the value: the string itself, a menu
    /// item's label, a text block's text or a user's name.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::DateTime(s) => Some(s),
            FieldValue::MenuItem(item) => Some(&item.label),
            FieldValue::FormattedString(text) => Some(&text.text),
            FieldValue::User(user) => Some(&user.username),
            FieldValue::Other { value, .. } => value.as_str(),
            FieldValue::Number(_) | FieldValue::Boolean(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The slot as raw JSON.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) | FieldValue::DateTime(s) => Value::String(s.clone()),
            FieldValue::Number(n) => Value::Number(n.clone()),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Other { value, .. } => value.clone(),
            structured => serde_json::to_value(structured).unwrap_or(Value::Null),
        }
    }

    fn assign(&mut self, label: &str, new_value: Value) -> Result<(), FieldError> {
        if let FieldValue::Other { type_tag, .. } = &*self {
            // A known tag whose slot was unreadable (typically null) gets a
            // fresh value of its own type.
            let Some(mut fresh) = FieldValue::blank(type_tag) else {
                return Err(FieldError::UnsupportedType {
                    label: label.to_string(),
                    type_tag: type_tag.clone(),
                });
            };
            fresh.assign(label, new_value)?;
            *self = fresh;
            return Ok(());
        }
        match (self, new_value) {
            (FieldValue::MenuItem(item), Value::String(text)) => {
                // A new label invalidates the resolved id.
                item.label = text;
                item.id = None;
            }
            (FieldValue::FormattedString(block), Value::String(text)) => {
                block.text = text;
                block.is_formatted = false;
            }
            (FieldValue::User(user), Value::String(name)) => user.username = name,
            (FieldValue::String(slot), Value::String(text))
            | (FieldValue::DateTime(slot), Value::String(text)) => *slot = text,
            (FieldValue::Number(slot), Value::Number(n)) => *slot = n,
            (FieldValue::Boolean(slot), Value::Bool(b)) => *slot = b,
            (slot, _) => {
                return Err(FieldError::ValueMismatch {
                    label: label.to_string(),
                    type_tag: slot.type_tag().to_string(),
                    expected: slot.expected_input(),
                });
            }
        }
        Ok(())
    }

    fn expected_input(&self) -> &'static str {
        match self {
            FieldValue::Number(_) => "a number",
            FieldValue::Boolean(_) => "a boolean",
            _ => "a string",
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::String(s) | FieldValue::DateTime(s) => s.serialize(serializer),
            FieldValue::Number(n) => n.serialize(serializer),
            FieldValue::Boolean(b) => b.serialize(serializer),
            FieldValue::MenuItem(item) => item.serialize(serializer),
            FieldValue::FormattedString(block) => block.serialize(serializer),
            FieldValue::User(user) => user.serialize(serializer),
            FieldValue::Other { value, .. } => value.serialize(serializer),
        }
    }
}

/// One entry of a record's field list.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: String,
    pub value: FieldValue,
    /// Keys of the field object other than `label`, `type` and the slot.
    pub extra: Map<String, Value>,
}

impl Field {
    pub fn new(label: impl Into<String>, value: FieldValue) -> Self {
        Self {
            label: label.into(),
            value,
            extra: Map::new(),
        }
    }

    pub fn string(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(label, FieldValue::String(text.into()))
    }

    pub fn date_time(label: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self::new(label, FieldValue::DateTime(timestamp.into()))
    }

    pub fn menu_item(label: impl Into<String>, item_label: impl Into<String>) -> Self {
        Self::new(
            label,
            FieldValue::MenuItem(MenuItem {
                label: item_label.into(),
                ..MenuItem::default()
            }),
        )
    }

    /// A plain, unformatted text block.
    pub fn text(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            label,
            FieldValue::FormattedString(FormattedString {
                text: text.into(),
                ..FormattedString::default()
            }),
        )
    }

    pub fn user(label: impl Into<String>, username: impl Into<String>) -> Self {
        Self::new(
            label,
            FieldValue::User(UserRef {
                username: username.into(),
                ..UserRef::default()
            }),
        )
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let type_tag = self.value.type_tag();
        let mut map = serializer.serialize_map(Some(3 + self.extra.len()))?;
        map.serialize_entry("label", &self.label)?;
        map.serialize_entry("type", type_tag)?;
        map.serialize_entry(type_tag, &self.value)?;
        for (key, value) in &self.extra {
            if key != "label" && key != "type" && key != type_tag {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::<String, Value>::deserialize(deserializer)?;
        let label = take_string::<D::Error>(&mut map, "label")?;
        let type_tag = take_string::<D::Error>(&mut map, "type")?;
        let slot = map.remove(&type_tag).ok_or_else(|| {
            <D::Error as de::Error>::custom(format!("field '{label}' has no '{type_tag}' value"))
        })?;
        Ok(Field {
            label,
            value: FieldValue::from_slot(&type_tag, slot),
            extra: map,
        })
    }
}

fn take_string<E: de::Error>(map: &mut Map<String, Value>, key: &'static str) -> Result<String, E> {
    match map.remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(E::custom(format!("field '{key}' must be a string"))),
        None => Err(E::missing_field(key)),
    }
}

fn bool_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Flag::Text(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        Flag::Text(s) => Err(de::Error::invalid_value(Unexpected::Str(&s), &"a boolean")),
    }
}

/// Value of the first field labelled `label`, or `None` if there is none.
pub fn get_value<'a>(fields: &'a [Field], label: &str) -> Option<&'a FieldValue> {
    fields.iter().find(|f| f.label == label).map(|f| &f.value)
}

/// Write `new_value` into the first field labelled `label`.
///
/// A missing label is a no-op: callers routinely update optional fields
/// that a given record may not carry. Structured types keep their shape:
/// menu items get a new label and lose their id, text blocks become plain
/// text, user references get a new username.
pub fn set_value(fields: &mut [Field], label: &str, new_value: Value) -> Result<(), FieldError> {
    let Some(field) = fields.iter_mut().find(|f| f.label == label) else {
        return Ok(());
    };
    field.value.assign(&field.label, new_value)
}

/// Decode the `fields` array of a record. A record without one has no fields.
pub fn read_fields(record: &Value) -> Result<Vec<Field>, serde_json::Error> {
    match record.get("fields") {
        Some(fields) => Vec::<Field>::deserialize(fields),
        None => Ok(Vec::new()),
    }
}

/// Replace the `fields` array of a record.
pub fn write_fields(record: &mut Value, fields: &[Field]) -> Result<(), serde_json::Error> {
    let encoded = serde_json::to_value(fields)?;
    if let Value::Object(map) = record {
        map.insert("fields".to_string(), encoded);
    }
    Ok(())
}
