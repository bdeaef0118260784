//! Distinguished names
//!
//! Only the slice of DN handling this crate needs: component splitting with
//! backslash escapes, case-insensitive comparison, parent/leaf access and the
//! DC-component to DNS-name conversion used for partition names.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{DirectoryError, DirectoryResult};

static ATTRIBUTE_TYPE: OnceLock<Option<Regex>> = OnceLock::new();

/// Descriptor (`cn`, `msDS-X`) or numeric OID (`2.5.4.3`)
fn is_attribute_type(s: &str) -> bool {
    ATTRIBUTE_TYPE
        .get_or_init(|| Regex::new(r"^(?:[A-Za-z][A-Za-z0-9-]*|[0-9]+(?:\.[0-9]+)*)$").ok())
        .as_ref()
        .map_or(false, |re| re.is_match(s))
}

/// One `type=value` component; `value` keeps its escapes
#[derive(Debug, Clone)]
pub struct Rdn {
    attribute: String,
    value: String,
}

impl Rdn {
    /// Attribute type, e.g. `DC`
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Value with escapes removed
    pub fn value(&self) -> String {
        unescape(&self.value)
    }

    fn eq_ignore_case(&self, other: &Rdn) -> bool {
        self.attribute.eq_ignore_ascii_case(&other.attribute)
            && unescape(&self.value).eq_ignore_ascii_case(&unescape(&other.value))
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, self.value)
    }
}

/// A parsed distinguished name, leaf first
#[derive(Debug, Clone)]
pub struct DistinguishedName {
    components: Vec<Rdn>,
}

impl DistinguishedName {
    /// Parse a DN. Fails with `InvalidArgument` on any syntax problem.
    pub fn parse(dn: &str) -> DirectoryResult<Self> {
        let invalid = |reason: &str| DirectoryError::invalid_argument("distinguished_name", reason);

        if dn.trim().is_empty() {
            return Err(invalid("must not be empty"));
        }

        let mut components = Vec::new();
        for raw in split_unescaped(dn, ',') {
            let raw = raw.trim();
            let (attribute, value) = split_once_unescaped(raw, '=')
                .ok_or_else(|| invalid("component is missing '='"))?;
            let attribute = attribute.trim();
            let value = value.trim();

            if !is_attribute_type(attribute) {
                return Err(invalid("malformed attribute type"));
            }
            if value.is_empty() {
                return Err(invalid("component value must not be empty"));
            }
            if value.ends_with('\\') && !value.ends_with("\\\\") {
                return Err(invalid("dangling escape"));
            }

            components.push(Rdn {
                attribute: attribute.to_string(),
                value: value.to_string(),
            });
        }

        Ok(Self { components })
    }

    /// Build `DC=a,DC=b,...` from `a.b...`.
    pub fn from_dns_name(dns_name: &str) -> DirectoryResult<Self> {
        if dns_name.is_empty() || dns_name.split('.').any(str::is_empty) {
            return Err(DirectoryError::invalid_argument(
                "dns_name",
                "must be a dotted name without empty labels",
            ));
        }
        let dn = dns_name
            .split('.')
            .map(|label| format!("DC={}", escape_value(label)))
            .collect::<Vec<_>>()
            .join(",");
        Self::parse(&dn)
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always false for a parsed DN
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components, leaf first
    pub fn components(&self) -> &[Rdn] {
        &self.components
    }

    /// Leaf component as text, e.g. `DC=app`
    pub fn rdn(&self) -> String {
        self.components[0].to_string()
    }

    /// Unescaped value of the leaf component
    pub fn leaf_value(&self) -> String {
        self.components[0].value()
    }

    /// Parent DN, `None` for a single-component DN
    pub fn parent(&self) -> Option<DistinguishedName> {
        if self.components.len() < 2 {
            return None;
        }
        Some(Self {
            components: self.components[1..].to_vec(),
        })
    }

    /// Convert a DC-only DN into a DNS name.
    pub fn to_dns_name(&self) -> DirectoryResult<String> {
        let mut labels = Vec::with_capacity(self.components.len());
        for component in &self.components {
            if !component.attribute.eq_ignore_ascii_case("DC") {
                return Err(DirectoryError::invalid_argument(
                    "distinguished_name",
                    "only DC components can be converted to a DNS name",
                ));
            }
            labels.push(component.value());
        }
        Ok(labels.join("."))
    }

    /// Case-insensitive equality, ignoring whitespace around components
    pub fn eq_ignore_case(&self, other: &DistinguishedName) -> bool {
        self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.eq_ignore_case(b))
    }

    /// Whether `self` is `ancestor` or lies beneath it
    pub fn is_within(&self, ancestor: &DistinguishedName) -> bool {
        if ancestor.components.len() > self.components.len() {
            return false;
        }
        let offset = self.components.len() - ancestor.components.len();
        self.components[offset..]
            .iter()
            .zip(&ancestor.components)
            .all(|(a, b)| a.eq_ignore_case(b))
    }

    /// Normalized text form used as a lookup key
    pub fn normalized(&self) -> String {
        self.components
            .iter()
            .map(|c| {
                format!(
                    "{}={}",
                    c.attribute.to_ascii_lowercase(),
                    escape_value(&c.value()).to_ascii_lowercase()
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .components
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{}", joined)
    }
}

/// Compare two DN strings; unparsable input falls back to plain comparison.
pub fn dn_equals(a: &str, b: &str) -> bool {
    match (DistinguishedName::parse(a), DistinguishedName::parse(b)) {
        (Ok(a), Ok(b)) => a.eq_ignore_case(&b),
        _ => a.eq_ignore_ascii_case(b),
    }
}

/// Escape a value for use inside an RDN.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn split_unescaped(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn split_once_unescaped(s: &str, separator: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            return Some((&s[..i], &s[i + c.len_utf8()..]));
        }
    }
    None
}
