//! Field path parsing
//!
//! A field path is either a plain column (`display_name`), a custom field
//! (`MyContactFields.FavColor`), a custom field attribute
//! (`MyContactFields.FavColor.label`), or a wildcard (`*`, `Group.*`).

use crate::core::error::ValidationError;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Syntactic form of a field path, before it is resolved against a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    /// A column of the base entity
    Column(String),
    /// A field of a custom group, optionally with a derived attribute
    Custom {
        group: String,
        field: String,
        attribute: Option<String>,
    },
    /// `*`: every base column
    AllColumns,
    /// `Group.*`: every field of a custom group
    AllCustom { group: String },
}

impl FieldPath {
    /// Parse a dotted path
    pub fn parse(path: &str) -> Result<Self, ValidationError> {
        let malformed = |message: &str| ValidationError::MalformedPath {
            path: path.to_string(),
            message: message.to_string(),
        };

        if path == "*" {
            return Ok(FieldPath::AllColumns);
        }

        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() > 3 {
            return Err(malformed("at most three segments are allowed"));
        }

        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            let wildcard_ok = i == 1 && last == 1;
            if *segment == "*" && wildcard_ok {
                continue;
            }
            if !is_identifier(segment) {
                return Err(malformed(&format!("'{}' is not a valid name", segment)));
            }
        }

        Ok(match segments.as_slice() {
            [column] => FieldPath::Column(column.to_string()),
            [group, "*"] => FieldPath::AllCustom {
                group: group.to_string(),
            },
            [group, field] => FieldPath::Custom {
                group: group.to_string(),
                field: field.to_string(),
                attribute: None,
            },
            [group, field, attribute] => FieldPath::Custom {
                group: group.to_string(),
                field: field.to_string(),
                attribute: Some(attribute.to_string()),
            },
            _ => return Err(malformed("empty path")),
        })
    }

    /// Name of the custom group this path addresses, if any
    pub fn group(&self) -> Option<&str> {
        match self {
            FieldPath::Custom { group, .. } | FieldPath::AllCustom { group } => Some(group),
            _ => None,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Column(c) => write!(f, "{}", c),
            FieldPath::Custom {
                group,
                field,
                attribute: None,
            } => write!(f, "{}.{}", group, field),
            FieldPath::Custom {
                group,
                field,
                attribute: Some(attr),
            } => write!(f, "{}.{}.{}", group, field, attr),
            FieldPath::AllColumns => write!(f, "*"),
            FieldPath::AllCustom { group } => write!(f, "{}.*", group),
        }
    }
}

fn is_identifier(s: &str) -> bool {
    static IDENT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = IDENT_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
    regex.is_match(s)
}

/// Turn a free-form label into an identifier usable as a name
pub fn munge_name(label: &str) -> String {
    static NON_IDENT: OnceLock<Regex> = OnceLock::new();
    let regex = NON_IDENT.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]+").unwrap());
    let munged = regex.replace_all(label.trim(), "_").to_string();
    match munged.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("_{}", munged),
        Some(_) => munged,
        None => "_".to_string(),
    }
}
