// Pattern Library - compiled matchers for DN decomposition, password
// scheme extraction, newrdn extraction and group hierarchy walking.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Match the leading `cn=` or `ou=` pair of a DN.
    /// e.g. "cn=hackers,ou=superheros,dc=glauth,dc=com"
    /// captures id_attribute = "cn" and identifier = "hackers".
    static ref IDENTIFIER_REGEX: Regex =
        Regex::new(r"(?i)^(?P<id_attribute>cn|ou)=(?P<identifier>.+?),").unwrap();

    /// Match a `newrdn` value of the form "cn=hackers".
    static ref NEWRDN_REGEX: Regex =
        Regex::new(r"(?i)^cn=(?P<newrdn>[^,]+)").unwrap();

    /// Match every `ou=` token in a DN, in order.
    /// e.g. "ou=superheros,ou=caped,dc=glauth,dc=com" yields
    /// "superheros" then "caped".
    static ref GROUP_HIERARCHY_REGEX: Regex =
        Regex::new(r"(?i)ou=([^,]+)").unwrap();

    /// Match a `userPassword` value of the form "{SHA256}hash".
    static ref PASSWORD_REGEX: Regex =
        Regex::new(r"(?i)^\{(?P<prefix>.+?)\}(?P<password>.+)$").unwrap();
}

/// Decompose a DN into its leading naming attribute and identifier.
///
/// Returns `(id_attribute, identifier)`, e.g.
/// `("cn", "johndoe")` for "cn=johndoe,ou=users,dc=glauth,dc=com".
pub fn decompose_dn(dn: &str) -> Option<(String, String)> {
    let caps = IDENTIFIER_REGEX.captures(dn)?;
    Some((
        caps["id_attribute"].to_lowercase(),
        caps["identifier"].to_string(),
    ))
}

/// True when the string begins with a recognized naming attribute.
pub fn is_valid_dn(dn: &str) -> bool {
    IDENTIFIER_REGEX.is_match(dn)
}

/// Extract the identifier from a DN-shaped value, e.g. the `newsuperior`
/// target. Empty string when the value does not decompose.
pub fn extract_identifier(haystack: &str) -> String {
    decompose_dn(haystack)
        .map(|(_, identifier)| identifier)
        .unwrap_or_default()
}

/// Decompose a `{scheme}hash` password value into `(scheme, hash)`.
pub fn decompose_password(value: &str) -> Option<(String, String)> {
    let caps = PASSWORD_REGEX.captures(value)?;
    Some((caps["prefix"].to_string(), caps["password"].to_string()))
}

/// Extract the value from a `newrdn` of the form "cn=<value>".
pub fn extract_newrdn(value: &str) -> Option<String> {
    NEWRDN_REGEX
        .captures(value)
        .map(|caps| caps["newrdn"].to_string())
}

/// Walk every `ou=` token of a DN, in order.
pub fn group_hierarchy(dn: &str) -> Vec<String> {
    GROUP_HIERARCHY_REGEX
        .captures_iter(dn)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// The immediate parent of the group named by this DN: the second `ou=`
/// token when present, empty otherwise.
pub fn extract_parent_group(dn: &str) -> String {
    group_hierarchy(dn).into_iter().nth(1).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_user_dn() {
        let (attr, id) = decompose_dn("cn=johndoe,ou=superheros,dc=glauth,dc=com").unwrap();
        assert_eq!(attr, "cn");
        assert_eq!(id, "johndoe");
    }

    #[test]
    fn test_decompose_group_dn() {
        let (attr, id) = decompose_dn("ou=superheros,dc=glauth,dc=com").unwrap();
        assert_eq!(attr, "ou");
        assert_eq!(id, "superheros");
    }

    #[test]
    fn test_decompose_dn_is_case_insensitive() {
        let (attr, id) = decompose_dn("CN=JohnDoe,dc=glauth,dc=com").unwrap();
        assert_eq!(attr, "cn");
        assert_eq!(id, "JohnDoe");
    }

    #[test]
    fn test_invalid_dns_rejected() {
        // Unknown naming attribute
        assert!(!is_valid_dn("x=foo,dc=glauth,dc=com"));
        // No trailing component at all
        assert!(!is_valid_dn("cn=hackers"));
        assert!(decompose_dn("uid=1000,dc=glauth,dc=com").is_none());
    }

    #[test]
    fn test_decompose_password() {
        let (scheme, hash) = decompose_password("{SHA256}6478579e37aff45f013e14eeb30b3cc56c72ccdc310123bcdf53e0333e3f416a").unwrap();
        assert_eq!(scheme, "SHA256");
        assert!(hash.starts_with("6478579e"));
    }

    #[test]
    fn test_malformed_passwords_rejected() {
        assert!(decompose_password("xyz").is_none());
        assert!(decompose_password("{}xyz").is_none());
        assert!(decompose_password("{SHA256}").is_none());
    }

    #[test]
    fn test_extract_newrdn() {
        assert_eq!(extract_newrdn("cn=hacker"), Some("hacker".to_string()));
        assert_eq!(extract_newrdn("ou=svcaccts"), None);
    }

    #[test]
    fn test_group_hierarchy_in_order() {
        let hierarchy = group_hierarchy("ou=superheros,ou=caped,ou=human,dc=glauth,dc=com");
        assert_eq!(hierarchy, vec!["superheros", "caped", "human"]);
    }

    #[test]
    fn test_extract_parent_group() {
        assert_eq!(
            extract_parent_group("ou=superheros,ou=caped,dc=glauth,dc=com"),
            "caped"
        );
        // Top-level group has no parent
        assert_eq!(extract_parent_group("ou=superheros,dc=glauth,dc=com"), "");
    }

    #[test]
    fn test_extract_identifier_from_newsuperior() {
        assert_eq!(
            extract_identifier("ou=svcaccts,dc=glauth,dc=com"),
            "svcaccts"
        );
        assert_eq!(extract_identifier("ou=svcaccts"), "");
    }
}
