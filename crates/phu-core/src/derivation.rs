//! Cross-field derivation: one changed seed field produces the full set of
//! dependent updates in a single pass. Derived values are never fed back in.

use serde::{Deserialize, Serialize};

use crate::catalog::{PortCatalog, PortTable};
use crate::{FieldId, FieldRef, Site};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Transform {
    /// Integer seed plus `step` per position.
    IncrementInt { step: i64 },
    /// Seed with a literal appended, e.g. a `:B` backup circuit ID.
    SuffixAppend { text: String },
    /// The digit at `position` is bumped by `step`, the rest is kept.
    OffsetDigit {
        #[serde(default)]
        position: usize,
        step: i64,
    },
    /// Same ordinal in the backup list of the device family named by
    /// `family_field`.
    Correlate {
        table: PortTable,
        family_field: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Target {
    /// Instances 2..=N of the source field in the same site. Only index 1
    /// seeds this target.
    Siblings,
    /// One field; service references resolve at the source's index.
    Field(FieldRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DerivationRule {
    pub source: FieldRef,
    pub transform: Transform,
    pub target: Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldUpdate {
    pub field: FieldId,
    pub value: String,
}

impl FieldUpdate {
    pub fn new(field: FieldId, value: impl Into<String>) -> Self {
        FieldUpdate {
            field,
            value: value.into(),
        }
    }
}

/// Read access to live form state needed by derivation.
pub trait FormView {
    fn value(&self, field: &FieldId) -> Option<&str>;
    fn service_count(&self, site: Site) -> usize;

    fn contains(&self, field: &FieldId) -> bool {
        self.value(field).is_some()
    }
}

/// Every update implied by `field` changing to `value`. Pure: nothing is
/// applied, and fields that do not exist in the live form are left out.
pub fn derive(
    view: &impl FormView,
    catalog: &PortCatalog,
    rules: &[DerivationRule],
    field: &FieldId,
    value: &str,
) -> Vec<FieldUpdate> {
    let mut updates = Vec::new();

    for rule in rules.iter().filter(|r| r.source.matches(field)) {
        match &rule.target {
            Target::Siblings => {
                let FieldId::Service { site, index, name } = field else {
                    continue;
                };
                if *index != 1 {
                    continue;
                }
                for i in 2..=view.service_count(*site) {
                    let sibling = FieldId::service(*site, i, name.as_str());
                    if !view.contains(&sibling) {
                        continue;
                    }
                    match apply(&rule.transform, value, (i - 1) as i64, view, catalog) {
                        Some(v) => updates.push(FieldUpdate::new(sibling, v)),
                        None => break,
                    }
                }
            }
            Target::Field(target) => {
                let Some(target_id) = target.resolve(field.index()) else {
                    continue;
                };
                if target_id == *field || !view.contains(&target_id) {
                    continue;
                }
                if let Some(v) = apply(&rule.transform, value, 1, view, catalog) {
                    updates.push(FieldUpdate::new(target_id, v));
                }
            }
        }
    }

    if !updates.is_empty() {
        tracing::debug!(source = %field, count = updates.len(), "derived field updates");
    }
    updates
}

/// Value for the target at `position` steps from the seed, or None when the
/// transform does not apply to this seed.
fn apply(
    transform: &Transform,
    seed: &str,
    position: i64,
    view: &impl FormView,
    catalog: &PortCatalog,
) -> Option<String> {
    match transform {
        Transform::IncrementInt { step } => {
            let base = parse_leading_int(seed)?;
            base.checked_add(step.checked_mul(position)?)
                .map(|v| v.to_string())
        }
        Transform::SuffixAppend { text } => Some(format!("{seed}{text}")),
        Transform::OffsetDigit { position: at, step } => offset_digit(seed, *at, *step),
        Transform::Correlate {
            table,
            family_field,
        } => {
            let family = view.value(&FieldId::standalone(family_field.as_str()))?;
            catalog
                .correlate(*table, family, seed)
                .map(|p| p.to_string())
        }
    }
}

/// `parseInt`-style: optional leading whitespace and sign, then as many
/// digits as there are. Trailing text is ignored.
pub fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    let n: i64 = rest[..end].parse().ok()?;
    Some(if negative { -n } else { n })
}

/// Bump the digit at `at`. A non-digit there, or no character at all at the
/// end of the seed, becomes the literal "NaN". None past the end.
pub fn offset_digit(seed: &str, at: usize, step: i64) -> Option<String> {
    let chars: Vec<char> = seed.chars().collect();
    if at > chars.len() {
        return None;
    }
    let bumped = match chars.get(at).and_then(|c| c.to_digit(10)) {
        Some(d) => (d as i64 + step).to_string(),
        None => "NaN".to_string(),
    };
    let head: String = chars[..at].iter().collect();
    let tail: String = chars.get(at + 1..).unwrap_or_default().iter().collect();
    Some(format!("{head}{bumped}{tail}"))
}
