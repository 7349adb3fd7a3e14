// Processing Pipeline - an ordered chain of stages that turn one raw
// LDIF entry into a fully populated Record.
//
// Stage order is a compile-time array position. A later stage may rely on
// fields set by an earlier one (the operation stage reads the entity kind
// set by the DN stage), so the order in STAGES is part of the contract.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::mappings;
use crate::patterns;
use crate::record::{AttrMap, AttrValue, EntityKind, OperationType, Record};

/// The reader's native representation of one entry: every attribute maps
/// to a list of raw byte values.
pub type RawEntry = HashMap<String, Vec<Vec<u8>>>;

type Stage = fn(&str, &mut AttrMap, &mut Record) -> Result<()>;

/// Stages applied after `stringify`, strictly in this order.
const STAGES: &[Stage] = &[
    validate_entry,
    process_dn,
    process_password,
    process_operation,
    filter_attributes,
    extract_custom_attributes,
];

/// Run the whole pipeline for one entry. Any validation failure aborts
/// with the offending DN and attribute context.
pub fn process_entry(dn: &str, raw: RawEntry) -> Result<Record> {
    let mut entry = stringify(dn, raw)?;
    let mut record = Record::default();

    for stage in STAGES {
        stage(dn, &mut entry, &mut record)?;
    }

    Ok(record)
}

/// Stage 1: decode raw byte values into scalars or ordered lists.
/// Single-valued attributes collapse to a plain string.
pub fn stringify(dn: &str, raw: RawEntry) -> Result<AttrMap> {
    let mut entry = AttrMap::with_capacity(raw.len());

    for (attribute, values) in raw {
        let mut decoded = Vec::with_capacity(values.len());
        for value in values {
            let text = String::from_utf8(value)
                .map_err(|_| Error::invalid_value(dn, &attribute, "value is not valid UTF-8"))?;
            decoded.push(text);
        }

        let value = if decoded.len() == 1 {
            AttrValue::Single(decoded.into_iter().next().unwrap())
        } else {
            AttrValue::Many(decoded)
        };
        entry.insert(attribute, value);
    }

    Ok(entry)
}

/// Stage 2: reject the entry, and with it the whole file, on any
/// malformed DN or attribute value.
pub fn validate_entry(dn: &str, entry: &mut AttrMap, _record: &mut Record) -> Result<()> {
    if !patterns::is_valid_dn(dn) {
        return Err(Error::InvalidDistinguishedName { dn: dn.to_string() });
    }

    if let Some(password) = entry.get("userPassword").and_then(AttrValue::as_str) {
        if patterns::decompose_password(password).is_none() {
            return Err(Error::invalid_value(
                dn,
                "userPassword",
                "expected `{scheme}hash`",
            ));
        }
    }

    if let Some(new_superior) = entry.get("newsuperior").and_then(AttrValue::as_str) {
        if !patterns::is_valid_dn(new_superior) {
            return Err(Error::invalid_value(
                dn,
                "newsuperior",
                "not a valid distinguished name",
            ));
        }
    }

    if let Some(newrdn) = entry.get("newrdn").and_then(AttrValue::as_str) {
        if patterns::extract_newrdn(newrdn).is_none() {
            return Err(Error::invalid_value(dn, "newrdn", "expected `cn=<value>`"));
        }
    }

    if let Some(member_uid) = entry.get("memberUid") {
        let all_numeric = member_uid
            .to_list()
            .iter()
            .all(|uid| !uid.is_empty() && uid.chars().all(|c| c.is_ascii_digit()));
        if !all_numeric {
            return Err(Error::invalid_value(dn, "memberUid", "expected numeric uid"));
        }
    }

    Ok(())
}

/// Stage 3: set the entity kind and identifier from the DN.
pub fn process_dn(dn: &str, _entry: &mut AttrMap, record: &mut Record) -> Result<()> {
    let (id_attribute, identifier) = patterns::decompose_dn(dn)
        .ok_or_else(|| Error::InvalidDistinguishedName { dn: dn.to_string() })?;

    record.dn = dn.to_string();
    record.entity_kind = if id_attribute == mappings::USER_IDENTIFIER_ATTRIBUTE {
        EntityKind::User
    } else {
        EntityKind::Group
    };
    record.identifier = identifier;

    Ok(())
}

/// Stage 4: replace `userPassword` with the scheme-specific synthetic
/// attribute holding the bare hash.
pub fn process_password(dn: &str, entry: &mut AttrMap, _record: &mut Record) -> Result<()> {
    let Some(password) = entry.get("userPassword").and_then(AttrValue::as_str) else {
        return Ok(());
    };

    let (scheme, hash) = patterns::decompose_password(password)
        .ok_or_else(|| Error::invalid_value(dn, "userPassword", "expected `{scheme}hash`"))?;

    let attribute = mappings::password_attribute(&scheme).ok_or_else(|| {
        Error::invalid_value(
            dn,
            "userPassword",
            format!("unsupported password scheme `{scheme}`"),
        )
    })?;

    entry.insert(attribute.to_string(), AttrValue::Single(hash));
    entry.remove("userPassword");

    Ok(())
}

/// Stage 5: the operation decision table, evaluated on `changetype` plus
/// co-present control keys; first match wins.
pub fn process_operation(dn: &str, entry: &mut AttrMap, record: &mut Record) -> Result<()> {
    let changetype = entry
        .get("changetype")
        .and_then(AttrValue::as_str)
        .map(str::to_owned);

    match changetype.as_deref() {
        Some("modrdn") | Some("moddn") if entry.contains_key("newsuperior") => {
            record.operation = OperationType::Move;
            let target = entry
                .get("newsuperior")
                .and_then(AttrValue::as_str)
                .unwrap_or_default()
                .to_string();

            match record.entity_kind {
                EntityKind::User => {
                    // The user's destination group, by name.
                    entry.insert(
                        "ou".to_string(),
                        AttrValue::Single(patterns::extract_identifier(&target)),
                    );
                }
                _ => {
                    entry.insert(
                        "newParentGroup".to_string(),
                        AttrValue::Single(patterns::extract_identifier(&target)),
                    );
                    entry.insert(
                        "parentGroup".to_string(),
                        AttrValue::Single(patterns::extract_parent_group(dn)),
                    );
                }
            }
        }

        Some("modrdn") | Some("moddn") if entry.contains_key("newrdn") => {
            record.operation = OperationType::Update;
            let newrdn = entry
                .get("newrdn")
                .and_then(AttrValue::as_str)
                .and_then(patterns::extract_newrdn)
                .unwrap_or_default();
            entry.insert("cn".to_string(), AttrValue::Single(newrdn));
        }

        Some("modify") if entry.contains_key("memberUid") => {
            record.operation = if entry.contains_key("add") {
                OperationType::Attach
            } else {
                OperationType::Detach
            };
        }

        Some("modify") => {
            record.operation = OperationType::Update;
            // `delete: <attr>` clears the named attribute.
            if let Some(targets) = entry.get("delete").map(AttrValue::to_list) {
                for attribute in targets {
                    entry.insert(attribute, AttrValue::Single(String::new()));
                }
            }
        }

        Some("delete") => {
            record.operation = OperationType::Delete;
        }

        _ => {
            record.operation = OperationType::Create;
            if record.entity_kind == EntityKind::Group {
                entry.insert(
                    "parentGroup".to_string(),
                    AttrValue::Single(patterns::extract_parent_group(dn)),
                );
            }
        }
    }

    Ok(())
}

/// Stage 6: strip the LDIF control keys and keep only the supported
/// schema attributes.
pub fn filter_attributes(_dn: &str, entry: &mut AttrMap, record: &mut Record) -> Result<()> {
    entry.retain(|attribute, _| !mappings::is_sanitize_attribute(attribute));

    record.attributes = entry
        .iter()
        .filter(|(attribute, _)| mappings::is_supported_attribute(attribute))
        .map(|(attribute, value)| (attribute.clone(), value.clone()))
        .collect();

    Ok(())
}

/// Stage 7: collect everything outside the supported schema; User records
/// only.
pub fn extract_custom_attributes(
    _dn: &str,
    entry: &mut AttrMap,
    record: &mut Record,
) -> Result<()> {
    if record.entity_kind != EntityKind::User {
        return Ok(());
    }

    record.custom_attributes = entry
        .iter()
        .filter(|(attribute, _)| !mappings::is_supported_attribute(attribute))
        .map(|(attribute, value)| (attribute.clone(), value.clone()))
        .collect();

    Ok(())
}
