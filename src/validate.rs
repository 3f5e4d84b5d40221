//! Field-level validation rules.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::schema::FieldDescriptor;

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}-\d{8}$|^\d{4}-\d{7}$|^\d{11}$").expect("phone pattern"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([-+.]\w+)*@\w+([-.]\w+)*\.\w+([-.]\w+)*$").expect("email pattern")
});
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?|ftp)://[^\s/$.?#][^\s]*$").expect("url pattern"));
static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+$").expect("integer pattern"));

/// Named formats accepted in a descriptor's `x-validator` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Phone,
    Email,
    Url,
    Integer,
}

impl Format {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "phone" => Some(Format::Phone),
            "email" => Some(Format::Email),
            "url" => Some(Format::Url),
            "integer" => Some(Format::Integer),
            _ => None,
        }
    }

    fn regex(&self) -> &'static Regex {
        match self {
            Format::Phone => &*PHONE,
            Format::Email => &*EMAIL,
            Format::Url => &*URL,
            Format::Integer => &*INTEGER,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Format::Phone => "a valid phone number",
            Format::Email => "a valid email address",
            Format::Url => "a valid URL",
            Format::Integer => "an integer",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => self.regex().is_match(s),
            Value::Number(n) => self.regex().is_match(&n.to_string()),
            _ => false,
        }
    }
}

/// `null`, `""` and `[]` count as "no value".
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Error messages for `value` under `descriptor`'s rules; empty when valid.
///
/// Formats are only checked on non-empty values, so an optional field may be
/// left blank.
pub fn check(name: &str, descriptor: &FieldDescriptor, value: &Value) -> Vec<String> {
    let title = descriptor.display_title(name);
    if is_empty(value) {
        return if descriptor.required {
            vec![format!("{title} is required")]
        } else {
            Vec::new()
        };
    }
    let Some(validator) = descriptor.validator.as_deref() else {
        return Vec::new();
    };
    match Format::parse(validator) {
        Some(format) if !format.matches(value) => {
            vec![format!("{title} must be {}", format.describe())]
        }
        Some(_) => Vec::new(),
        None => {
            warn!(field = name, validator, "unknown validator ignored");
            Vec::new()
        }
    }
}
