//! Search filters
//!
//! A small filter algebra with LDAP string rendering. `matches` evaluates a
//! filter against an entry the way a server would, including the synthesized
//! `objectClass`, `objectCategory`, `distinguishedName` and `name` attributes.

use std::fmt;

use super::dn::DistinguishedName;
use super::entry::Entry;

const MATCHING_RULE_BIT_AND: &str = "1.2.840.113556.1.4.803";
const MATCHING_RULE_BIT_OR: &str = "1.2.840.113556.1.4.804";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Equals(String, String),
    Present(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// All bits of the mask set
    BitAnd(String, i64),
    /// Any bit of the mask set
    BitOr(String, i64),
}

impl Filter {
    pub fn eq(attribute: &str, value: impl Into<String>) -> Self {
        Filter::Equals(attribute.to_string(), value.into())
    }

    pub fn present(attribute: &str) -> Self {
        Filter::Present(attribute.to_string())
    }

    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    pub fn bit_and(attribute: &str, mask: i64) -> Self {
        Filter::BitAnd(attribute.to_string(), mask)
    }

    pub fn bit_or(attribute: &str, mask: i64) -> Self {
        Filter::BitOr(attribute.to_string(), mask)
    }

    /// Evaluate against an entry.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::Equals(attr, value) => {
                synthesized(entry, attr).map_or_else(
                    || entry.values(attr).iter().any(|v| v.matches_text(value)),
                    |s| s.eq_ignore_ascii_case(value),
                )
            }
            Filter::Present(attr) => synthesized(entry, attr).is_some() || entry.contains(attr),
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Filter::Not(filter) => !filter.matches(entry),
            Filter::BitAnd(attr, mask) => entry.int(attr).map_or(false, |v| v & mask == *mask),
            Filter::BitOr(attr, mask) => entry.int(attr).map_or(false, |v| v & mask != 0),
        }
    }
}

fn synthesized(entry: &Entry, attribute: &str) -> Option<String> {
    match attribute.to_ascii_lowercase().as_str() {
        "objectclass" | "objectcategory" => Some(entry.object_class().to_string()),
        "distinguishedname" => Some(entry.dn().to_string()),
        "name" | "cn" => DistinguishedName::parse(entry.dn())
            .ok()
            .map(|dn| dn.leaf_value()),
        _ => None,
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equals(attr, value) => write!(f, "({}={})", attr, escape(value)),
            Filter::Present(attr) => write!(f, "({}=*)", attr),
            Filter::And(filters) => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Or(filters) => {
                write!(f, "(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Not(filter) => write!(f, "(!{})", filter),
            Filter::BitAnd(attr, mask) => write!(f, "({}:{}:={})", attr, MATCHING_RULE_BIT_AND, mask),
            Filter::BitOr(attr, mask) => write!(f, "({}:{}:={})", attr, MATCHING_RULE_BIT_OR, mask),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::store::AttributeValue;

    fn cross_ref(flags: i64) -> Entry {
        let mut attrs = BTreeMap::new();
        attrs.insert("systemFlags".to_string(), vec![AttributeValue::Int(flags)]);
        attrs.insert("nCName".to_string(), vec!["DC=app,DC=corp,DC=com".into()]);
        Entry::bound("dc1", "CN=app,CN=Partitions,CN=Configuration,DC=corp,DC=com", "crossRef", attrs)
    }

    fn partition_filter() -> Filter {
        Filter::And(vec![
            Filter::eq("objectCategory", "crossRef"),
            Filter::bit_or("systemFlags", 1),
            Filter::not(Filter::bit_and("systemFlags", 2)),
            Filter::eq("nCName", "dc=APP,dc=corp,dc=com"),
        ])
    }

    #[test]
    fn test_partition_filter_matches_non_domain_cross_ref() {
        assert!(partition_filter().matches(&cross_ref(5)));
    }

    #[test]
    fn test_partition_filter_skips_domain_cross_ref() {
        assert!(!partition_filter().matches(&cross_ref(3)));
        assert!(!partition_filter().matches(&cross_ref(0)));
    }

    #[test]
    fn test_synthesized_name() {
        assert!(Filter::eq("name", "app").matches(&cross_ref(5)));
        assert!(Filter::present("distinguishedName").matches(&cross_ref(5)));
    }

    #[test]
    fn test_display() {
        let rendered = partition_filter().to_string();
        assert!(rendered.starts_with("(&(objectCategory=crossRef)"));
        assert!(rendered.contains("(systemFlags:1.2.840.113556.1.4.804:=1)"));
        assert!(rendered.contains("(!(systemFlags:1.2.840.113556.1.4.803:=2))"));
        assert_eq!(Filter::eq("cn", "a*(b)").to_string(), "(cn=a\\2a\\28b\\29)");
    }
}
