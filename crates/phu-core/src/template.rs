//! Static form shapes: standalone fields, the repeatable service block, and
//! the rules that tie fields together. Templates are read-only once loaded.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::catalog::{PortRole, PortTable};
use crate::derivation::{DerivationRule, Target, Transform};
use crate::validate::Check;
use crate::{Error, FieldRef, Site, SiteType, Store};

const BUILTIN_TEMPLATES: &[&str] = &[
    include_str!("../templates/oh_srx.json"),
    include_str!("../templates/oh_decom.json"),
    include_str!("../templates/internet.json"),
];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    #[default]
    Text,
    Select,
    Numeric,
}

/// Options of a select filled from the port catalog, chosen by the value of
/// a standalone "device family" field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRef {
    pub table: PortTable,
    pub family_field: String,
    pub role: PortRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldTemplate {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<Check>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_from: Option<CatalogRef>,
    /// Only present on dual-site forms.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dual_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelBinding {
    pub text: String,
    /// Base name of the field this label points at.
    #[serde(rename = "for")]
    pub target: String,
    /// Append the block index to the label text.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub numbered: bool,
}

/// Shape of one repeatable service block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplate {
    #[serde(default = "default_header")]
    pub header: String,
    pub fields: Vec<FieldTemplate>,
    #[serde(default)]
    pub labels: Vec<LabelBinding>,
}

fn default_header() -> String {
    "Service".to_string()
}

impl ServiceTemplate {
    pub fn field(&self, name: &str) -> Option<&FieldTemplate> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum Topology {
    Single,
    Dual,
    #[default]
    Either,
}

impl Topology {
    pub fn allows(self, site_type: SiteType) -> bool {
        matches!(
            (self, site_type),
            (Topology::Either, _)
                | (Topology::Single, SiteType::Single)
                | (Topology::Dual, SiteType::Dual)
        )
    }
}

/// Shows `when_equal` fields and hides `otherwise` fields while the source
/// holds `equals`, and the reverse for any other value. Service references
/// resolve at the index of the changed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRule {
    pub source: FieldRef,
    pub equals: String,
    #[serde(default)]
    pub when_equal: Vec<FieldRef>,
    #[serde(default)]
    pub otherwise: Vec<FieldRef>,
}

/// Marks `fields` required while the source holds `equals`, optional for
/// any other value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequirementRule {
    pub source: FieldRef,
    pub equals: String,
    pub fields: Vec<FieldRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolTemplate {
    pub id: String,
    pub members: Vec<FieldRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormTemplate {
    pub id: String,
    pub title: String,
    /// Submitted as `circuitType`.
    pub circuit_type: String,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub standalone: Vec<FieldTemplate>,
    pub service: ServiceTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_service: Option<ServiceTemplate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<DerivationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visibility: Vec<VisibilityRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<RequirementRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pools: Vec<PoolTemplate>,
}

impl FormTemplate {
    pub fn service_template(&self, site: Site) -> Option<&ServiceTemplate> {
        match site {
            Site::Primary => Some(&self.service),
            Site::Backup => self.backup_service.as_ref(),
        }
    }

    pub fn standalone_field(&self, name: &str) -> Option<&FieldTemplate> {
        self.standalone.iter().find(|f| f.name == name)
    }

    pub fn field(&self, r: &FieldRef) -> Option<&FieldTemplate> {
        match r {
            FieldRef::Standalone { field } => self.standalone_field(field),
            FieldRef::Service { site, field } => self.service_template(*site)?.field(field),
        }
    }

    /// Structural checks run on every template before it is used.
    pub fn check(&self) -> Result<(), Error> {
        let invalid = |reason: String| Error::InvalidTemplate {
            template: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("template id is empty".to_string()));
        }
        unique_names(&self.standalone).map_err(|n| invalid(format!("duplicate field '{n}'")))?;
        unique_names(&self.service.fields)
            .map_err(|n| invalid(format!("duplicate service field '{n}'")))?;
        if let Some(backup) = &self.backup_service {
            unique_names(&backup.fields)
                .map_err(|n| invalid(format!("duplicate backup service field '{n}'")))?;
        }
        if self.topology != Topology::Single && self.backup_service.is_none() {
            return Err(invalid("dual-site topology needs a backupService".to_string()));
        }

        let all_fields = self
            .standalone
            .iter()
            .chain(&self.service.fields)
            .chain(self.backup_service.iter().flat_map(|b| &b.fields));
        for field in all_fields {
            if let Some(source) = &field.options_from {
                if self.standalone_field(&source.family_field).is_none() {
                    return Err(invalid(format!(
                        "'{}' takes options from unknown field '{}'",
                        field.name, source.family_field
                    )));
                }
            }
        }

        let known = |r: &FieldRef| -> Result<(), Error> {
            match self.field(r) {
                Some(_) => Ok(()),
                None => Err(invalid(format!("reference to unknown field {r:?}"))),
            }
        };

        for rule in &self.rules {
            known(&rule.source)?;
            let service_source = matches!(rule.source, FieldRef::Service { .. });
            match &rule.target {
                Target::Siblings if !service_source => {
                    return Err(invalid(format!(
                        "'{}' is standalone and has no siblings",
                        rule.source.field()
                    )));
                }
                Target::Siblings => {}
                Target::Field(target) => {
                    known(target)?;
                    if matches!(target, FieldRef::Service { .. }) && !service_source {
                        return Err(invalid(format!(
                            "standalone '{}' cannot target a service field",
                            rule.source.field()
                        )));
                    }
                    if target == &rule.source {
                        return Err(invalid(format!(
                            "'{}' derives into itself",
                            rule.source.field()
                        )));
                    }
                }
            }
            if let Transform::Correlate { family_field, .. } = &rule.transform {
                if self.standalone_field(family_field).is_none() {
                    return Err(invalid(format!("unknown family field '{family_field}'")));
                }
            }
        }

        for rule in &self.visibility {
            known(&rule.source)?;
            for r in rule.when_equal.iter().chain(&rule.otherwise) {
                known(r)?;
            }
        }

        for rule in &self.requirements {
            known(&rule.source)?;
            for r in &rule.fields {
                known(r)?;
            }
        }

        let mut pool_ids = HashSet::new();
        let mut pooled: Vec<&FieldRef> = Vec::new();
        for pool in &self.pools {
            if !pool_ids.insert(pool.id.as_str()) {
                return Err(invalid(format!("duplicate pool '{}'", pool.id)));
            }
            for member in &pool.members {
                known(member)?;
                if pooled.contains(&member) {
                    return Err(invalid(format!(
                        "'{}' belongs to more than one pool",
                        member.field()
                    )));
                }
                pooled.push(member);
            }
        }

        Ok(())
    }
}

fn unique_names(fields: &[FieldTemplate]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for f in fields {
        if !seen.insert(f.name.as_str()) {
            return Err(f.name.clone());
        }
    }
    Ok(())
}

/// JSON schema of the template format, for authoring user templates.
pub fn template_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(FormTemplate)).unwrap_or_default()
}

/// Form templates by id. Built-in templates are compiled in; user templates
/// from the store override them by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, FormTemplate>,
}

impl TemplateRegistry {
    pub fn builtin() -> Result<Self, Error> {
        let mut registry = TemplateRegistry::default();
        for raw in BUILTIN_TEMPLATES {
            let template: FormTemplate = serde_json::from_str(raw)?;
            registry.insert(template)?;
        }
        Ok(registry)
    }

    /// Built-in templates plus every readable user template. A broken user
    /// template is skipped so it cannot hide the others.
    pub fn load(store: &Store) -> Result<Self, Error> {
        let mut registry = TemplateRegistry::builtin()?;
        for name in store.list_templates()? {
            match store.read_template(&name) {
                Ok(template) => {
                    tracing::debug!(template = %template.id, "loaded user template");
                    registry.insert(template)?;
                }
                Err(e) => tracing::warn!(template = %name, error = %e, "skipping user template"),
            }
        }
        Ok(registry)
    }

    pub fn insert(&mut self, template: FormTemplate) -> Result<(), Error> {
        template.check()?;
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&FormTemplate> {
        self.templates.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&FormTemplate, Error> {
        self.get(id)
            .ok_or_else(|| Error::UnknownTemplate(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(|k| k.as_str())
    }
}
