// Fixed LDIF attribute tables: column mappings, sanitize list,
// password scheme registry. Shared by the pipeline and the dispatch layer.

/// Naming attribute that marks a user DN (`cn=...`).
pub const USER_IDENTIFIER_ATTRIBUTE: &str = "cn";

/// Naming attribute that marks a group DN (`ou=...`).
pub const GROUP_IDENTIFIER_ATTRIBUTE: &str = "ou";

/// Application id stamped on every security audit event.
pub const AUDIT_APP_ID: &str = "identity_platform.glauth_utils_operator";

/// LDIF control keys stripped before attribute filtering. They steer the
/// operation decision but never map to a column.
pub const LDIF_SANITIZE_ATTRIBUTES: &[&str] = &[
    "changetype",
    "add",
    "replace",
    "delete",
    "deleteoldrdn",
    "newrdn",
    "newsuperior",
    "objectClass",
];

/// LDIF attribute -> users table column.
pub const LDIF_TO_USER_COLUMNS: &[(&str, &str)] = &[
    ("cn", "name"),
    ("uidNumber", "uid_number"),
    ("gidNumber", "gid_number"),
    ("mail", "email"),
    ("sn", "surname"),
    ("givenName", "given_name"),
    ("passwordSha256", "password_sha256"),
    ("passwordBcrypt", "password_bcrypt"),
    ("loginShell", "login_shell"),
    ("homeDirectory", "home_directory"),
    ("accountStatus", "account_status"),
    ("yubiKeyId", "yubi_key"),
    ("sshPublicKey", "ssh_keys"),
];

/// LDIF attribute -> ldapgroups table column.
pub const LDIF_TO_GROUP_COLUMNS: &[(&str, &str)] = &[
    ("ou", "name"),
    ("gidNumber", "gid_number"),
    ("memberUid", "member_uid"),
];

/// LDIF attribute -> includegroups table column.
pub const LDIF_TO_INCLUDE_GROUP_COLUMNS: &[(&str, &str)] = &[
    ("parentGroup", "parent_group"),
    ("childGroup", "child_group"),
];

/// Synthetic keys produced by the operation stage; carried through attribute
/// filtering even though no column maps to them directly.
pub const CUSTOM_ADDITIONAL_ATTRIBUTES: &[&str] = &["newParentGroup"];

/// Password scheme prefix (lowercased) -> synthetic attribute name.
pub const PASSWORD_ALGORITHM_REGISTRY: &[(&str, &str)] = &[
    ("sha256", "passwordSha256"),
    ("bcrypt", "passwordBcrypt"),
];

/// Look up the column a user LDIF attribute maps to.
pub fn user_column(attribute: &str) -> Option<&'static str> {
    lookup(LDIF_TO_USER_COLUMNS, attribute)
}

/// Look up the column a group LDIF attribute maps to.
pub fn group_column(attribute: &str) -> Option<&'static str> {
    lookup(LDIF_TO_GROUP_COLUMNS, attribute)
}

/// Look up the synthetic attribute a password scheme maps to.
pub fn password_attribute(scheme: &str) -> Option<&'static str> {
    let scheme = scheme.to_lowercase();
    PASSWORD_ALGORITHM_REGISTRY
        .iter()
        .find(|(prefix, _)| *prefix == scheme)
        .map(|(_, attr)| *attr)
}

/// True when the attribute belongs to the supported LDIF schema.
pub fn is_supported_attribute(attribute: &str) -> bool {
    lookup(LDIF_TO_USER_COLUMNS, attribute).is_some()
        || lookup(LDIF_TO_GROUP_COLUMNS, attribute).is_some()
        || lookup(LDIF_TO_INCLUDE_GROUP_COLUMNS, attribute).is_some()
        || CUSTOM_ADDITIONAL_ATTRIBUTES.contains(&attribute)
}

/// True when the attribute gets stripped during the sanitize pass.
pub fn is_sanitize_attribute(attribute: &str) -> bool {
    LDIF_SANITIZE_ATTRIBUTES.contains(&attribute)
}

fn lookup(
    table: &'static [(&'static str, &'static str)],
    attribute: &str,
) -> Option<&'static str> {
    table
        .iter()
        .find(|(ldif, _)| *ldif == attribute)
        .map(|(_, column)| *column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_column_mapping() {
        assert_eq!(user_column("cn"), Some("name"));
        assert_eq!(user_column("uidNumber"), Some("uid_number"));
        assert_eq!(user_column("sshPublicKey"), Some("ssh_keys"));
        assert_eq!(user_column("ou"), None);
    }

    #[test]
    fn test_group_column_mapping() {
        assert_eq!(group_column("ou"), Some("name"));
        assert_eq!(group_column("gidNumber"), Some("gid_number"));
        assert_eq!(group_column("cn"), None);
    }

    #[test]
    fn test_password_attribute_is_case_insensitive() {
        assert_eq!(password_attribute("SHA256"), Some("passwordSha256"));
        assert_eq!(password_attribute("bcrypt"), Some("passwordBcrypt"));
        assert_eq!(password_attribute("md5"), None);
    }

    #[test]
    fn test_supported_set_includes_synthetic_keys() {
        assert!(is_supported_attribute("newParentGroup"));
        assert!(is_supported_attribute("parentGroup"));
        assert!(!is_supported_attribute("employeeNumber"));
    }

    #[test]
    fn test_sanitize_set() {
        assert!(is_sanitize_attribute("changetype"));
        assert!(is_sanitize_attribute("objectClass"));
        assert!(!is_sanitize_attribute("cn"));
    }
}
