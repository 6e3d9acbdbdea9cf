//! Per-field predicates. Validation never touches other fields; the session
//! keeps the resulting annotations.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::FieldId;

pub const INVALID_IP: &str = "Invalid IP address";
pub const INVALID_VLAN: &str = "Invalid VLAN range (1-4094)";

/// Upper VLAN bound, exclusive.
const VLAN_LIMIT: u32 = 4094;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum Check {
    Ip,
    Vlan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Validation {
    fn pass() -> Self {
        Validation {
            valid: true,
            message: None,
        }
    }

    fn fail(message: &str) -> Self {
        Validation {
            valid: false,
            message: Some(message.to_string()),
        }
    }
}

pub fn validate(check: Check, value: &str) -> Validation {
    let ok = match check {
        Check::Ip => is_valid_ip(value),
        Check::Vlan => is_valid_vlan(value),
    };
    match (ok, check) {
        (true, _) => Validation::pass(),
        (false, Check::Ip) => Validation::fail(INVALID_IP),
        (false, Check::Vlan) => Validation::fail(INVALID_VLAN),
    }
}

fn ip_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let octet = r"(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)";
        Regex::new(&format!(r"^{octet}\.{octet}\.{octet}\.{octet}$"))
            .unwrap_or_else(|e| panic!("IPv4 pattern does not compile: {e}"))
    })
}

/// Dotted quad, octets 0-255. Surrounding whitespace is ignored.
pub fn is_valid_ip(value: &str) -> bool {
    ip_pattern().is_match(value.trim())
}

/// Positive integer below 4094. Zero and blanks are rejected.
pub fn is_valid_vlan(value: &str) -> bool {
    match value.trim().parse::<u32>() {
        Ok(vlan) => vlan > 0 && vlan < VLAN_LIMIT,
        Err(_) => false,
    }
}

/// Inline error annotations, at most one per field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    errors: BTreeMap<FieldId, String>,
}

impl Annotations {
    /// Show or clear the annotation for `field`. Returns true when the
    /// rendered state changed.
    pub fn apply(&mut self, field: &FieldId, result: &Validation) -> bool {
        match &result.message {
            Some(message) if !result.valid => {
                self.errors.insert(field.clone(), message.clone()).as_ref() != Some(message)
            }
            _ => self.errors.remove(field).is_some(),
        }
    }

    pub fn get(&self, field: &FieldId) -> Option<&str> {
        self.errors.get(field).map(|m| m.as_str())
    }

    pub fn remove(&mut self, field: &FieldId) {
        self.errors.remove(field);
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&FieldId) -> bool) {
        self.errors.retain(|field, _| keep(field));
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &str)> {
        self.errors.iter().map(|(f, m)| (f, m.as_str()))
    }
}
