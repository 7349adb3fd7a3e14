// Persistence schema and row codecs for the glauth-compatible backend.
//
// Table and column names follow glauth's SQL plugin layout
// (users / ldapgroups / includegroups / capabilities). The domain structs
// hold decoded values; the delimited-text and JSON encodings live only in
// the row mapping here.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::Result;
use crate::record::{AttrMap, AttrValue};

/// One row of the users table.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub name: String,
    pub uid_number: i64,
    /// Primary group, foreign key to ldapgroups.gidnumber.
    pub gid_number: i64,
    /// Secondary group gids, kept as a set in memory and serialized as
    /// comma-delimited text in the othergroups column.
    pub other_groups: BTreeSet<String>,
    pub given_name: String,
    pub surname: String,
    pub email: String,
    pub login_shell: String,
    pub home_directory: String,
    pub disabled: bool,
    pub password_sha256: String,
    pub password_bcrypt: String,
    pub otp_secret: String,
    pub yubi_key: String,
    pub ssh_keys: String,
    pub account_status: String,
    /// Opaque custom-attribute blob, JSON-encoded in the custattr column.
    pub custom_attributes: JsonMap<String, JsonValue>,
}

impl Default for User {
    fn default() -> Self {
        User {
            name: String::new(),
            uid_number: 0,
            gid_number: 0,
            other_groups: BTreeSet::new(),
            given_name: String::new(),
            surname: String::new(),
            email: String::new(),
            login_shell: String::new(),
            home_directory: String::new(),
            disabled: false,
            password_sha256: String::new(),
            password_bcrypt: String::new(),
            otp_secret: String::new(),
            yubi_key: String::new(),
            ssh_keys: String::new(),
            account_status: String::new(),
            custom_attributes: JsonMap::new(),
        }
    }
}

/// One row of the ldapgroups table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub gid_number: i64,
}

/// One nesting edge of the includegroups table; both sides reference
/// ldapgroups.gidnumber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeGroup {
    pub id: i64,
    pub parent_group_id: i64,
    pub child_group_id: i64,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS ldapgroups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            gidnumber INTEGER UNIQUE NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            uidnumber INTEGER NOT NULL,
            primarygroup INTEGER NOT NULL
                REFERENCES ldapgroups (gidnumber) ON UPDATE CASCADE,
            othergroups TEXT NOT NULL DEFAULT '',
            givenname TEXT NOT NULL DEFAULT '',
            sn TEXT NOT NULL DEFAULT '',
            mail TEXT NOT NULL DEFAULT '',
            loginshell TEXT NOT NULL DEFAULT '',
            homedirectory TEXT NOT NULL DEFAULT '',
            disabled SMALLINT NOT NULL DEFAULT 0,
            passsha256 TEXT NOT NULL DEFAULT '',
            passbcrypt TEXT NOT NULL DEFAULT '',
            otpsecret TEXT NOT NULL DEFAULT '',
            yubikey TEXT NOT NULL DEFAULT '',
            sshkeys TEXT NOT NULL DEFAULT '',
            accountstatus TEXT NOT NULL DEFAULT '',
            custattr TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS includegroups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parentgroupid INTEGER NOT NULL
                REFERENCES ldapgroups (gidnumber) ON UPDATE CASCADE,
            includegroupid INTEGER NOT NULL
                REFERENCES ldapgroups (gidnumber) ON UPDATE CASCADE
        );

        CREATE TABLE IF NOT EXISTS capabilities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            userid INTEGER NOT NULL,
            action TEXT NOT NULL DEFAULT 'search',
            object TEXT
        );",
    )?;

    Ok(())
}

// ============================================================================
// CODECS (storage boundary only)
// ============================================================================

/// Serialize a secondary-group set to the delimited othergroups column.
pub fn encode_group_set(groups: &BTreeSet<String>) -> String {
    groups.iter().cloned().collect::<Vec<_>>().join(",")
}

/// Decode the othergroups column back into a set.
pub fn decode_group_set(text: &str) -> BTreeSet<String> {
    if text.is_empty() {
        return BTreeSet::new();
    }
    text.split(',').map(str::to_string).collect()
}

/// Convert a pipeline attribute map into the JSON shape persisted in the
/// custattr column: single values become strings, multi values arrays.
pub fn attr_map_to_json(attributes: &AttrMap) -> JsonMap<String, JsonValue> {
    attributes
        .iter()
        .map(|(name, value)| {
            let json = match value {
                AttrValue::Single(v) => JsonValue::String(v.clone()),
                AttrValue::Many(values) => {
                    JsonValue::Array(values.iter().cloned().map(JsonValue::String).collect())
                }
            };
            (name.clone(), json)
        })
        .collect()
}

fn encode_custom_attributes(attributes: &JsonMap<String, JsonValue>) -> String {
    JsonValue::Object(attributes.clone()).to_string()
}

fn decode_custom_attributes(text: &str) -> JsonMap<String, JsonValue> {
    serde_json::from_str::<JsonValue>(text)
        .ok()
        .and_then(|value| match value {
            JsonValue::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

// ============================================================================
// USERS
// ============================================================================

const USER_COLUMNS: &str = "name, uidnumber, primarygroup, othergroups, givenname, sn, mail, \
     loginshell, homedirectory, disabled, passsha256, passbcrypt, otpsecret, yubikey, sshkeys, \
     accountstatus, custattr";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let other_groups: String = row.get(3)?;
    let disabled: i64 = row.get(9)?;
    let custattr: String = row.get(16)?;

    Ok(User {
        name: row.get(0)?,
        uid_number: row.get(1)?,
        gid_number: row.get(2)?,
        other_groups: decode_group_set(&other_groups),
        given_name: row.get(4)?,
        surname: row.get(5)?,
        email: row.get(6)?,
        login_shell: row.get(7)?,
        home_directory: row.get(8)?,
        disabled: disabled != 0,
        password_sha256: row.get(10)?,
        password_bcrypt: row.get(11)?,
        otp_secret: row.get(12)?,
        yubi_key: row.get(13)?,
        ssh_keys: row.get(14)?,
        account_status: row.get(15)?,
        custom_attributes: decode_custom_attributes(&custattr),
    })
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO users ({USER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            user.name,
            user.uid_number,
            user.gid_number,
            encode_group_set(&user.other_groups),
            user.given_name,
            user.surname,
            user.email,
            user.login_shell,
            user.home_directory,
            user.disabled as i64,
            user.password_sha256,
            user.password_bcrypt,
            user.otp_secret,
            user.yubi_key,
            user.ssh_keys,
            user.account_status,
            encode_custom_attributes(&user.custom_attributes),
        ],
    )?;

    Ok(())
}

pub fn get_user_by_name(conn: &Connection, name: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE name = ?1"),
            params![name],
            row_to_user,
        )
        .optional()?;

    Ok(user)
}

pub fn get_user_by_uid(conn: &Connection, uid_number: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE uidnumber = ?1"),
            params![uid_number],
            row_to_user,
        )
        .optional()?;

    Ok(user)
}

/// Write a full user row back, located by its original name. Returns false
/// when no row matched.
pub fn update_user(conn: &Connection, original_name: &str, user: &User) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET
            name = ?1, uidnumber = ?2, primarygroup = ?3, othergroups = ?4,
            givenname = ?5, sn = ?6, mail = ?7, loginshell = ?8, homedirectory = ?9,
            disabled = ?10, passsha256 = ?11, passbcrypt = ?12, otpsecret = ?13,
            yubikey = ?14, sshkeys = ?15, accountstatus = ?16, custattr = ?17
         WHERE name = ?18",
        params![
            user.name,
            user.uid_number,
            user.gid_number,
            encode_group_set(&user.other_groups),
            user.given_name,
            user.surname,
            user.email,
            user.login_shell,
            user.home_directory,
            user.disabled as i64,
            user.password_sha256,
            user.password_bcrypt,
            user.otp_secret,
            user.yubi_key,
            user.ssh_keys,
            user.account_status,
            encode_custom_attributes(&user.custom_attributes),
            original_name,
        ],
    )?;

    Ok(changed > 0)
}

pub fn delete_user(conn: &Connection, name: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM users WHERE name = ?1", params![name])?;
    Ok(changed > 0)
}

// ============================================================================
// GROUPS
// ============================================================================

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        name: row.get(0)?,
        gid_number: row.get(1)?,
    })
}

pub fn insert_group(conn: &Connection, group: &Group) -> Result<()> {
    conn.execute(
        "INSERT INTO ldapgroups (name, gidnumber) VALUES (?1, ?2)",
        params![group.name, group.gid_number],
    )?;

    Ok(())
}

pub fn get_group_by_name(conn: &Connection, name: &str) -> Result<Option<Group>> {
    let group = conn
        .query_row(
            "SELECT name, gidnumber FROM ldapgroups WHERE name = ?1",
            params![name],
            row_to_group,
        )
        .optional()?;

    Ok(group)
}

pub fn update_group(conn: &Connection, original_name: &str, group: &Group) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE ldapgroups SET name = ?1, gidnumber = ?2 WHERE name = ?3",
        params![group.name, group.gid_number, original_name],
    )?;

    Ok(changed > 0)
}

pub fn delete_group(conn: &Connection, name: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM ldapgroups WHERE name = ?1", params![name])?;
    Ok(changed > 0)
}

// ============================================================================
// INCLUDE GROUPS
// ============================================================================

fn row_to_include_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<IncludeGroup> {
    Ok(IncludeGroup {
        id: row.get(0)?,
        parent_group_id: row.get(1)?,
        child_group_id: row.get(2)?,
    })
}

pub fn get_include_group(
    conn: &Connection,
    parent_gid: i64,
    child_gid: i64,
) -> Result<Option<IncludeGroup>> {
    let edge = conn
        .query_row(
            "SELECT id, parentgroupid, includegroupid FROM includegroups
             WHERE parentgroupid = ?1 AND includegroupid = ?2",
            params![parent_gid, child_gid],
            row_to_include_group,
        )
        .optional()?;

    Ok(edge)
}

pub fn list_include_groups_by_child(
    conn: &Connection,
    child_gid: i64,
) -> Result<Vec<IncludeGroup>> {
    let mut stmt = conn.prepare(
        "SELECT id, parentgroupid, includegroupid FROM includegroups
         WHERE includegroupid = ?1",
    )?;

    let edges = stmt
        .query_map(params![child_gid], row_to_include_group)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(edges)
}

pub fn insert_include_group(conn: &Connection, parent_gid: i64, child_gid: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO includegroups (parentgroupid, includegroupid) VALUES (?1, ?2)",
        params![parent_gid, child_gid],
    )?;

    Ok(())
}

pub fn reparent_include_group(conn: &Connection, edge_id: i64, new_parent_gid: i64) -> Result<()> {
    conn.execute(
        "UPDATE includegroups SET parentgroupid = ?1 WHERE id = ?2",
        params![new_parent_gid, edge_id],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn test_user(name: &str, uid: i64, gid: i64) -> User {
        User {
            name: name.to_string(),
            uid_number: uid,
            gid_number: gid,
            email: "j@x.com".to_string(),
            ..User::default()
        }
    }

    #[test]
    fn test_group_set_codec() {
        let mut groups = BTreeSet::new();
        groups.insert("5501".to_string());
        groups.insert("5502".to_string());

        let encoded = encode_group_set(&groups);
        assert_eq!(encoded, "5501,5502");
        assert_eq!(decode_group_set(&encoded), groups);
        assert!(decode_group_set("").is_empty());
    }

    #[test]
    fn test_user_round_trip() {
        let conn = test_conn();
        insert_group(
            &conn,
            &Group {
                name: "superheros".to_string(),
                gid_number: 5501,
            },
        )
        .unwrap();

        let mut user = test_user("johndoe", 5001, 5501);
        user.other_groups.insert("5502".to_string());
        user.custom_attributes.insert(
            "employeeNumber".to_string(),
            JsonValue::String("42".to_string()),
        );
        insert_user(&conn, &user).unwrap();

        let stored = get_user_by_name(&conn, "johndoe").unwrap().unwrap();
        assert_eq!(stored, user);

        let by_uid = get_user_by_uid(&conn, 5001).unwrap().unwrap();
        assert_eq!(by_uid.name, "johndoe");
    }

    #[test]
    fn test_user_name_is_unique() {
        let conn = test_conn();
        insert_group(
            &conn,
            &Group {
                name: "g".to_string(),
                gid_number: 5501,
            },
        )
        .unwrap();

        insert_user(&conn, &test_user("johndoe", 5001, 5501)).unwrap();
        let err = insert_user(&conn, &test_user("johndoe", 5002, 5501));
        assert!(err.is_err());
    }

    #[test]
    fn test_update_missing_user_is_noop() {
        let conn = test_conn();
        let updated = update_user(&conn, "ghost", &test_user("ghost", 1, 1)).unwrap();
        assert!(!updated);
    }

    #[test]
    fn test_delete_user() {
        let conn = test_conn();
        insert_group(
            &conn,
            &Group {
                name: "g".to_string(),
                gid_number: 5501,
            },
        )
        .unwrap();
        insert_user(&conn, &test_user("johndoe", 5001, 5501)).unwrap();

        assert!(delete_user(&conn, "johndoe").unwrap());
        assert!(get_user_by_name(&conn, "johndoe").unwrap().is_none());
        // Second delete is a no-op
        assert!(!delete_user(&conn, "johndoe").unwrap());
    }

    #[test]
    fn test_group_round_trip_and_gid_unique() {
        let conn = test_conn();
        let group = Group {
            name: "superheros".to_string(),
            gid_number: 5501,
        };
        insert_group(&conn, &group).unwrap();

        assert_eq!(
            get_group_by_name(&conn, "superheros").unwrap().unwrap(),
            group
        );
        assert!(insert_group(
            &conn,
            &Group {
                name: "other".to_string(),
                gid_number: 5501,
            }
        )
        .is_err());
    }

    #[test]
    fn test_dangling_primary_group_rejected() {
        let conn = test_conn();
        // No group carries gid 9999
        assert!(insert_user(&conn, &test_user("johndoe", 5001, 9999)).is_err());
    }

    #[test]
    fn test_gid_renumber_cascades_to_users() {
        let conn = test_conn();
        insert_group(
            &conn,
            &Group {
                name: "g".to_string(),
                gid_number: 5501,
            },
        )
        .unwrap();
        insert_user(&conn, &test_user("johndoe", 5001, 5501)).unwrap();

        update_group(
            &conn,
            "g",
            &Group {
                name: "g".to_string(),
                gid_number: 6000,
            },
        )
        .unwrap();

        let user = get_user_by_name(&conn, "johndoe").unwrap().unwrap();
        assert_eq!(user.gid_number, 6000);
    }

    #[test]
    fn test_include_group_edges() {
        let conn = test_conn();
        insert_group(
            &conn,
            &Group {
                name: "parent".to_string(),
                gid_number: 5501,
            },
        )
        .unwrap();
        insert_group(
            &conn,
            &Group {
                name: "child".to_string(),
                gid_number: 5502,
            },
        )
        .unwrap();
        insert_group(
            &conn,
            &Group {
                name: "stepparent".to_string(),
                gid_number: 5503,
            },
        )
        .unwrap();

        insert_include_group(&conn, 5501, 5502).unwrap();
        let edge = get_include_group(&conn, 5501, 5502).unwrap().unwrap();
        assert_eq!(edge.parent_group_id, 5501);
        assert_eq!(edge.child_group_id, 5502);

        reparent_include_group(&conn, edge.id, 5503).unwrap();
        assert!(get_include_group(&conn, 5501, 5502).unwrap().is_none());
        assert_eq!(list_include_groups_by_child(&conn, 5502).unwrap().len(), 1);
    }

    #[test]
    fn test_custom_attributes_codec() {
        let mut attrs = AttrMap::new();
        attrs.insert("employeeNumber".to_string(), AttrValue::from("42"));
        attrs.insert(
            "ability".to_string(),
            AttrValue::from(vec!["hacking".to_string(), "fly".to_string()]),
        );

        let json = attr_map_to_json(&attrs);
        assert_eq!(json["employeeNumber"], JsonValue::String("42".to_string()));
        assert_eq!(json["ability"], serde_json::json!(["hacking", "fly"]));

        let text = encode_custom_attributes(&json);
        assert_eq!(decode_custom_attributes(&text), json);
        assert!(decode_custom_attributes("not json").is_empty());
    }
}
