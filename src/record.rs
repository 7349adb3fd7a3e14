// Record Model - the typed intermediate representation produced by the
// processing pipeline and consumed exactly once by operation dispatch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which persisted entity a record targets, derived from the DN's leading
/// naming attribute (`cn` -> User, `ou` -> Group). IncludeGroup records are
/// only ever synthesized inside group dispatch, never parsed from LDIF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    Group,
    IncludeGroup,
}

/// The mutation a record asks for, derived from the LDIF `changetype`
/// control plus co-present keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    Create,
    Update,
    Delete,
    Move,
    Attach,
    Detach,
}

impl OperationType {
    /// Past-tense verb used in audit event names (`user_created`, ...).
    pub fn audit_verb(&self) -> &'static str {
        match self {
            OperationType::Create => "created",
            OperationType::Update => "updated",
            OperationType::Delete => "deleted",
            OperationType::Move => "moved",
            OperationType::Attach => "attached",
            OperationType::Detach => "detached",
        }
    }
}

/// A decoded LDIF attribute value: single-valued attributes collapse to a
/// plain string, multi-valued attributes stay ordered lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Single(String),
    Many(Vec<String>),
}

impl AttrValue {
    /// The scalar view: a single value as-is, a list's first element.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Single(v) => Some(v),
            AttrValue::Many(values) => values.first().map(String::as_str),
        }
    }

    /// The list view: a single value becomes a one-element list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            AttrValue::Single(v) => vec![v.clone()],
            AttrValue::Many(values) => values.clone(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Single(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Single(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(values: Vec<String>) -> Self {
        AttrValue::Many(values)
    }
}

/// The working attribute map threaded through every pipeline stage.
pub type AttrMap = HashMap<String, AttrValue>;

/// One fully processed LDIF entry, ready for dispatch.
#[derive(Debug, Clone)]
pub struct Record {
    /// The entry's full distinguished name, kept for error context.
    pub dn: String,
    /// The naming attribute value: `cn` for a user, `ou` for a group.
    pub identifier: String,
    pub entity_kind: EntityKind,
    pub operation: OperationType,
    /// Attributes filtered to the supported LDIF schema.
    pub attributes: AttrMap,
    /// Attributes outside the supported schema; populated for User records
    /// only and persisted as an opaque JSON blob.
    pub custom_attributes: AttrMap,
}

impl Default for Record {
    fn default() -> Self {
        Record {
            dn: String::new(),
            identifier: String::new(),
            entity_kind: EntityKind::User,
            operation: OperationType::Create,
            attributes: AttrMap::new(),
            custom_attributes: AttrMap::new(),
        }
    }
}

impl Record {
    /// Scalar view of a supported attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttrValue::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_value_views() {
        let single = AttrValue::from("5001");
        assert_eq!(single.as_str(), Some("5001"));
        assert_eq!(single.to_list(), vec!["5001"]);

        let many = AttrValue::from(vec!["5001".to_string(), "5002".to_string()]);
        assert_eq!(many.as_str(), Some("5001"));
        assert_eq!(many.to_list(), vec!["5001", "5002"]);
    }

    #[test]
    fn test_record_defaults() {
        let record = Record::default();
        assert_eq!(record.entity_kind, EntityKind::User);
        assert_eq!(record.operation, OperationType::Create);
        assert!(record.attributes.is_empty());
        assert!(record.custom_attributes.is_empty());
    }
}
