// Operation Dispatch - maps each processed Record to idempotent
// relational mutations, one handler per (entity kind, operation).
//
// Missing rows are never fatal here: update/delete/move/attach/detach
// against state that does not exist locally are silent no-ops, since
// directory changes may race ahead of local replicas. Validation failures
// and storage errors abort the whole file.

use rusqlite::Connection;

use crate::audit::AuditLogger;
use crate::db::{self, Group, User};
use crate::error::{Error, Result};
use crate::mappings;
use crate::pipeline::{self, RawEntry};
use crate::record::{AttrValue, EntityKind, OperationType, Record};

/// Shared select/create/update/delete/move contract; one implementation
/// per entity kind.
pub trait EntityOps {
    fn create(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()>;
    fn update(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()>;
    fn delete(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()>;
    fn move_record(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()>;
}

fn audit_event(kind: &str, operation: OperationType, identifier: &str) -> String {
    format!("authz_admin:{kind}_{}:{identifier}", operation.audit_verb())
}

fn scalar(value: &AttrValue) -> String {
    value.as_str().unwrap_or_default().to_string()
}

/// Parse a numeric column value; an empty string clears to zero.
fn parse_number(dn: &str, attribute: &str, value: &AttrValue) -> Result<i64> {
    let text = value.as_str().unwrap_or_default();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse()
        .map_err(|_| Error::invalid_value(dn, attribute, "expected a numeric value"))
}

// ============================================================================
// USER OPERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct UserOps;

impl UserOps {
    /// Apply every mapped record attribute onto the user row.
    fn apply_attributes(&self, user: &mut User, record: &Record) -> Result<()> {
        for (attribute, value) in &record.attributes {
            let Some(column) = mappings::user_column(attribute) else {
                continue;
            };

            match column {
                "name" => user.name = scalar(value),
                "uid_number" => {
                    user.uid_number = parse_number(&record.dn, attribute, value)?
                }
                "gid_number" => {
                    user.gid_number = parse_number(&record.dn, attribute, value)?
                }
                "email" => user.email = scalar(value),
                "surname" => user.surname = scalar(value),
                "given_name" => user.given_name = scalar(value),
                "password_sha256" => user.password_sha256 = scalar(value),
                "password_bcrypt" => user.password_bcrypt = scalar(value),
                "login_shell" => user.login_shell = scalar(value),
                "home_directory" => user.home_directory = scalar(value),
                "account_status" => user.account_status = scalar(value),
                "yubi_key" => user.yubi_key = scalar(value),
                // Multiple keys are stored newline-delimited
                "ssh_keys" => user.ssh_keys = value.to_list().join("\n"),
                _ => {}
            }
        }

        Ok(())
    }
}

impl EntityOps for UserOps {
    fn create(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()> {
        let mut user = User {
            name: record.identifier.clone(),
            ..User::default()
        };
        self.apply_attributes(&mut user, record)?;

        if !record.custom_attributes.is_empty() {
            user.custom_attributes = db::attr_map_to_json(&record.custom_attributes);
        }

        db::insert_user(conn, &user)?;

        audit.log_event(
            &audit_event("user", OperationType::Create, &record.identifier),
            &format!("User `{}` was created", record.identifier),
            &[("user", record.identifier.clone())],
        );

        Ok(())
    }

    fn update(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()> {
        let Some(mut user) = db::get_user_by_name(conn, &record.identifier)? else {
            tracing::debug!(user = %record.identifier, "update skipped, user not found");
            return Ok(());
        };

        self.apply_attributes(&mut user, record)?;

        // New custom keys overwrite, existing ones are preserved
        for (key, value) in db::attr_map_to_json(&record.custom_attributes) {
            user.custom_attributes.insert(key, value);
        }

        db::update_user(conn, &record.identifier, &user)?;

        audit.log_event(
            &audit_event("user", OperationType::Update, &record.identifier),
            &format!("User `{}` was updated", record.identifier),
            &[("user", record.identifier.clone())],
        );

        Ok(())
    }

    fn delete(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()> {
        if !db::delete_user(conn, &record.identifier)? {
            tracing::debug!(user = %record.identifier, "delete skipped, user not found");
            return Ok(());
        }

        audit.log_event(
            &audit_event("user", OperationType::Delete, &record.identifier),
            &format!("User `{}` was deleted", record.identifier),
            &[("user", record.identifier.clone())],
        );

        Ok(())
    }

    /// Reassign the user's primary group to the group named by `ou`.
    fn move_record(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()> {
        let Some(mut user) = db::get_user_by_name(conn, &record.identifier)? else {
            tracing::debug!(user = %record.identifier, "move skipped, user not found");
            return Ok(());
        };

        let group_name = record.attribute("ou").unwrap_or_default();
        let Some(group) = db::get_group_by_name(conn, group_name)? else {
            tracing::debug!(group = %group_name, "move skipped, target group not found");
            return Ok(());
        };

        user.gid_number = group.gid_number;
        db::update_user(conn, &record.identifier, &user)?;

        audit.log_event(
            &audit_event("user", OperationType::Move, &record.identifier),
            &format!("User `{}` was moved to a different group", record.identifier),
            &[
                ("group", group.name.clone()),
                ("user", record.identifier.clone()),
            ],
        );

        Ok(())
    }
}

// ============================================================================
// GROUP OPERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupOps;

impl GroupOps {
    fn apply_attributes(&self, group: &mut Group, record: &Record) -> Result<()> {
        for (attribute, value) in &record.attributes {
            match mappings::group_column(attribute) {
                Some("name") => group.name = scalar(value),
                Some("gid_number") => {
                    group.gid_number = parse_number(&record.dn, attribute, value)?
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Resolve the uids named by `memberUid` to users; unknown uids are
    /// skipped.
    fn member_users(&self, conn: &Connection, record: &Record) -> Result<(Vec<i64>, Vec<User>)> {
        let member_uid = record
            .attributes
            .get("memberUid")
            .map(AttrValue::to_list)
            .unwrap_or_default();

        let mut uid_numbers = Vec::with_capacity(member_uid.len());
        for uid in &member_uid {
            let parsed = uid.parse().map_err(|_| {
                Error::invalid_value(&record.dn, "memberUid", "expected numeric uid")
            })?;
            uid_numbers.push(parsed);
        }

        let mut users = Vec::new();
        for uid_number in &uid_numbers {
            if let Some(user) = db::get_user_by_uid(conn, *uid_number)? {
                users.push(user);
            }
        }

        Ok((uid_numbers, users))
    }

    /// Add the group's gid to every named user's secondary-group set.
    pub fn attach(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()> {
        let Some(group) = db::get_group_by_name(conn, &record.identifier)? else {
            tracing::debug!(group = %record.identifier, "attach skipped, group not found");
            return Ok(());
        };

        let (uid_numbers, users) = self.member_users(conn, record)?;
        let gid = group.gid_number.to_string();
        for mut user in users {
            user.other_groups.insert(gid.clone());
            db::update_user(conn, &user.name.clone(), &user)?;
        }

        audit.log_event(
            &audit_event("group", OperationType::Attach, &record.identifier),
            &format!("Attached users to group `{}`", record.identifier),
            &[
                ("group", record.identifier.clone()),
                (
                    "uids",
                    uid_numbers
                        .iter()
                        .map(i64::to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                ),
            ],
        );

        Ok(())
    }

    /// Remove the group's gid from every named user's secondary-group set.
    pub fn detach(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()> {
        let Some(group) = db::get_group_by_name(conn, &record.identifier)? else {
            tracing::debug!(group = %record.identifier, "detach skipped, group not found");
            return Ok(());
        };

        let (uid_numbers, users) = self.member_users(conn, record)?;
        let gid = group.gid_number.to_string();
        for mut user in users {
            user.other_groups.remove(&gid);
            db::update_user(conn, &user.name.clone(), &user)?;
        }

        audit.log_event(
            &audit_event("group", OperationType::Detach, &record.identifier),
            &format!("Detached users from group `{}`", record.identifier),
            &[
                ("group", record.identifier.clone()),
                (
                    "uids",
                    uid_numbers
                        .iter()
                        .map(i64::to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                ),
            ],
        );

        Ok(())
    }
}

impl EntityOps for GroupOps {
    fn create(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()> {
        let mut group = Group {
            name: record.identifier.clone(),
            gid_number: 0,
        };
        self.apply_attributes(&mut group, record)?;
        if !record.attributes.contains_key("gidNumber") {
            return Err(Error::invalid_value(
                &record.dn,
                "gidNumber",
                "required to create a group",
            ));
        }

        db::insert_group(conn, &group)?;

        let parent_group = record.attribute("parentGroup").unwrap_or_default().to_string();
        if !parent_group.is_empty() {
            // Link the new group under its parent by synthesizing a move
            let mut association = record.clone();
            association.operation = OperationType::Move;
            association.attributes.insert(
                "newParentGroup".to_string(),
                AttrValue::Single(parent_group.clone()),
            );
            self.move_record(conn, audit, &association)?;
        }

        audit.log_event(
            &audit_event("group", OperationType::Create, &record.identifier),
            &format!("Group `{}` was created", record.identifier),
            &[
                ("group", record.identifier.clone()),
                ("parent_group", parent_group),
            ],
        );

        Ok(())
    }

    fn update(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()> {
        let Some(mut group) = db::get_group_by_name(conn, &record.identifier)? else {
            tracing::debug!(group = %record.identifier, "update skipped, group not found");
            return Ok(());
        };

        self.apply_attributes(&mut group, record)?;
        db::update_group(conn, &record.identifier, &group)?;

        audit.log_event(
            &audit_event("group", OperationType::Update, &record.identifier),
            &format!("Group `{}` was updated", record.identifier),
            &[("group", record.identifier.clone())],
        );

        Ok(())
    }

    fn delete(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()> {
        if !db::delete_group(conn, &record.identifier)? {
            tracing::debug!(group = %record.identifier, "delete skipped, group not found");
            return Ok(());
        }

        audit.log_event(
            &audit_event("group", OperationType::Delete, &record.identifier),
            &format!("Group `{}` was deleted", record.identifier),
            &[("group", record.identifier.clone())],
        );

        Ok(())
    }

    /// Re-parent the group. The existing nesting edge is matched by
    /// (current parent, group) and updated in place; when no such edge
    /// exists yet, a fresh (new parent, group) edge covers first-time
    /// nesting. A group keeps at most one parent either way.
    fn move_record(&self, conn: &Connection, audit: &AuditLogger, record: &Record) -> Result<()> {
        let Some(group) = db::get_group_by_name(conn, &record.identifier)? else {
            tracing::debug!(group = %record.identifier, "move skipped, group not found");
            return Ok(());
        };

        let new_parent_name = record.attribute("newParentGroup").unwrap_or_default();
        let Some(new_parent) = db::get_group_by_name(conn, new_parent_name)? else {
            tracing::debug!(group = %new_parent_name, "move skipped, new parent not found");
            return Ok(());
        };

        let current_parent = match record.attribute("parentGroup") {
            Some(name) if !name.is_empty() => db::get_group_by_name(conn, name)?,
            _ => None,
        };

        let existing_edge = match &current_parent {
            Some(parent) => {
                db::get_include_group(conn, parent.gid_number, group.gid_number)?
            }
            None => None,
        };

        match existing_edge {
            Some(edge) => {
                db::reparent_include_group(conn, edge.id, new_parent.gid_number)?;
            }
            None => {
                db::insert_include_group(conn, new_parent.gid_number, group.gid_number)?;
            }
        }

        audit.log_event(
            &audit_event("group", OperationType::Move, &record.identifier),
            &format!("Changed parent of group `{}`", record.identifier),
            &[
                ("group", record.identifier.clone()),
                ("parent_group", new_parent.name.clone()),
            ],
        );

        Ok(())
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Routes each record to its handler by (entity kind, operation).
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    users: UserOps,
    groups: GroupOps,
    audit: AuditLogger,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    pub fn dispatch(&self, conn: &Connection, record: &Record) -> Result<()> {
        match (record.entity_kind, record.operation) {
            (EntityKind::User, OperationType::Create) => {
                self.users.create(conn, &self.audit, record)
            }
            (EntityKind::User, OperationType::Update) => {
                self.users.update(conn, &self.audit, record)
            }
            (EntityKind::User, OperationType::Delete) => {
                self.users.delete(conn, &self.audit, record)
            }
            (EntityKind::User, OperationType::Move) => {
                self.users.move_record(conn, &self.audit, record)
            }
            (EntityKind::Group, OperationType::Create) => {
                self.groups.create(conn, &self.audit, record)
            }
            (EntityKind::Group, OperationType::Update) => {
                self.groups.update(conn, &self.audit, record)
            }
            (EntityKind::Group, OperationType::Delete) => {
                self.groups.delete(conn, &self.audit, record)
            }
            (EntityKind::Group, OperationType::Move) => {
                self.groups.move_record(conn, &self.audit, record)
            }
            (EntityKind::Group, OperationType::Attach) => {
                self.groups.attach(conn, &self.audit, record)
            }
            (EntityKind::Group, OperationType::Detach) => {
                self.groups.detach(conn, &self.audit, record)
            }
            (kind, operation) => Err(Error::invalid_value(
                &record.dn,
                "changetype",
                format!("operation {operation:?} is not supported for {kind:?} entries"),
            )),
        }
    }
}

/// Apply a whole LDIF file's worth of entries inside one transaction.
///
/// Entries are processed strictly in input order. Any pipeline validation
/// failure or storage error aborts and rolls back everything; on success
/// all mutations commit together.
pub fn apply_records<I>(conn: &mut Connection, entries: I) -> Result<()>
where
    I: IntoIterator<Item = (String, RawEntry)>,
{
    let dispatcher = Dispatcher::new();
    let tx = conn.transaction()?;

    for (dn, raw) in entries {
        let record = pipeline::process_entry(&dn, raw)?;
        dispatcher.dispatch(&tx, &record)?;
    }

    tx.commit()?;
    Ok(())
}
