//! One user's working copy of a form. Owns the generated blocks, pool claims
//! and validation annotations, and runs the per-change pipeline: apply the
//! value, derive once, apply derived values through the pools, refresh
//! dependent options and visibility, validate what changed.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::catalog::PortCatalog;
use crate::cloning::{FieldInstance, ServiceBlockInstance, SiteSlot};
use crate::derivation::{self, FieldUpdate, FormView};
use crate::pool::{ExclusivityTracker, OptionState};
use crate::template::{CatalogRef, FormTemplate};
use crate::validate::{self, Annotations, Validation};
use crate::{Error, FieldId, FieldRef, Site, SiteType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub site_type: SiteType,
    pub services: usize,
}

/// Result of one user edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeOutcome {
    /// Values written besides the edited field, in application order.
    pub updates: Vec<FieldUpdate>,
    /// Derived values dropped because their pool value is held elsewhere.
    pub rejected: Vec<FieldUpdate>,
    /// Validation of every changed field that has a check.
    pub validations: Vec<(FieldId, Validation)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub filled: usize,
    pub total: usize,
    pub percent: u8,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSnapshot {
    pub name: String,
    pub label: String,
    pub value: String,
    pub required: bool,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionState>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSnapshot {
    pub header: String,
    pub collapse_id: String,
    pub fields: Vec<FieldSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSnapshot {
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<Generation>,
    pub fields: Vec<FieldSnapshot>,
    pub blocks: BTreeMap<Site, Vec<BlockSnapshot>>,
    pub progress: Progress,
}

#[derive(Debug, Clone)]
pub struct FormSession {
    template: FormTemplate,
    catalog: PortCatalog,
    generation: Option<Generation>,
    standalone: Vec<FieldInstance>,
    sites: BTreeMap<Site, SiteSlot>,
    tracker: ExclusivityTracker,
    annotations: Annotations,
}

impl FormSession {
    pub fn new(template: FormTemplate, catalog: PortCatalog) -> Self {
        let standalone = template
            .standalone
            .iter()
            .map(|f| FieldInstance::from_template(f, FieldId::standalone(f.name.as_str())))
            .collect();
        let mut sites = BTreeMap::new();
        sites.insert(Site::Primary, SiteSlot::Template);
        if template.backup_service.is_some() {
            sites.insert(Site::Backup, SiteSlot::Template);
        }
        let tracker = ExclusivityTracker::new(&template.pools);
        FormSession {
            template,
            catalog,
            generation: None,
            standalone,
            sites,
            tracker,
            annotations: Annotations::default(),
        }
    }

    pub fn template(&self) -> &FormTemplate {
        &self.template
    }

    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    pub fn standalone(&self) -> &[FieldInstance] {
        &self.standalone
    }

    pub fn blocks(&self, site: Site) -> &[ServiceBlockInstance] {
        self.sites.get(&site).map(|s| s.blocks()).unwrap_or(&[])
    }

    /// Whether the site's section still shows the canonical block template.
    /// None when the section was dropped (backup on a single-site form).
    pub fn is_template(&self, site: Site) -> Option<bool> {
        self.sites.get(&site).map(|s| s.is_template())
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn tracker(&self) -> &ExclusivityTracker {
        &self.tracker
    }

    /// Build the service blocks. Regeneration discards every block and pool
    /// claim and starts over; standalone values that still exist are kept.
    pub fn generate(&mut self, site_type: Option<SiteType>, services: Option<usize>) -> Result<(), Error> {
        let (Some(site_type), Some(services)) = (site_type, services) else {
            return Err(Error::MissingSelection);
        };
        if !self.template.topology.allows(site_type) {
            return Err(Error::UnsupportedTopology {
                template: self.template.id.clone(),
                site_type,
            });
        }

        let mut sites = BTreeMap::new();
        for &site in site_type.sites() {
            let block = self.template.service_template(site).ok_or_else(|| {
                Error::UnsupportedTopology {
                    template: self.template.id.clone(),
                    site_type,
                }
            })?;
            let mut slot = SiteSlot::Template;
            slot.generate(block, services, site)?;
            sites.insert(site, slot);
        }

        let previous = std::mem::take(&mut self.standalone);
        self.standalone = self
            .template
            .standalone
            .iter()
            .filter(|f| site_type == SiteType::Dual || !f.dual_only)
            .map(|f| {
                let mut field = FieldInstance::from_template(f, FieldId::standalone(f.name.as_str()));
                if let Some(old) = previous.iter().find(|o| o.id == field.id) {
                    field.value = old.value.clone();
                    field.visible = old.visible;
                }
                field
            })
            .collect();
        self.sites = sites;
        self.tracker.reset();
        let standalone_ids: Vec<FieldId> = self.standalone.iter().map(|f| f.id.clone()).collect();
        self.annotations.retain(|f| standalone_ids.contains(f));
        self.generation = Some(Generation { site_type, services });

        self.refresh_options(None, false);
        self.reclaim_standalone();
        let sources: Vec<FieldId> = self
            .fields()
            .filter(|f| self.template.requirements.iter().any(|r| r.source.matches(&f.id)))
            .map(|f| f.id.clone())
            .collect();
        for source in &sources {
            self.apply_requirements(source);
        }

        tracing::info!(
            template = %self.template.id,
            site_type = %site_type,
            services,
            "form generated"
        );
        Ok(())
    }

    /// Back to the freshly loaded form.
    pub fn reset(&mut self) {
        *self = FormSession::new(self.template.clone(), self.catalog.clone());
    }

    pub fn field(&self, id: &FieldId) -> Option<&FieldInstance> {
        match id {
            FieldId::Standalone { .. } => self.standalone.iter().find(|f| f.id == *id),
            FieldId::Service { site, index, name } => self
                .sites
                .get(site)?
                .blocks()
                .get(index.checked_sub(1)?)?
                .field(name),
        }
    }

    fn field_mut(&mut self, id: &FieldId) -> Option<&mut FieldInstance> {
        match id {
            FieldId::Standalone { .. } => self.standalone.iter_mut().find(|f| f.id == *id),
            FieldId::Service { site, index, name } => self
                .sites
                .get_mut(site)?
                .blocks_mut()
                .get_mut(index.checked_sub(1)?)?
                .field_mut(name),
        }
    }

    /// Every live field, standalone first, then blocks by site and index.
    pub fn fields(&self) -> impl Iterator<Item = &FieldInstance> {
        self.standalone.iter().chain(
            self.sites
                .values()
                .flat_map(|slot| slot.blocks())
                .flat_map(|block| block.fields.iter()),
        )
    }

    /// Look a field up by its submitted name, e.g. `serviceVlanBackup2`.
    pub fn resolve(&self, wire_name: &str) -> Option<FieldId> {
        self.fields()
            .find(|f| f.id.wire_name() == wire_name)
            .map(|f| f.id.clone())
    }

    /// Apply a user edit and everything that follows from it.
    pub fn set_value(&mut self, id: &FieldId, value: &str) -> Result<ChangeOutcome, Error> {
        self.admit(id, value)?;
        self.write(id, value);

        let mut outcome = ChangeOutcome::default();
        let mut changed = vec![id.clone()];

        let derived = derivation::derive(&*self, &self.catalog, &self.template.rules, id, value);
        for update in derived {
            if let Err(e) = self.admit(&update.field, &update.value) {
                tracing::warn!(field = %update.field, error = %e, "dropping derived value");
                outcome.rejected.push(update);
                continue;
            }
            self.write(&update.field, &update.value);
            changed.push(update.field.clone());
            outcome.updates.push(update);
        }

        let families: Vec<String> = changed
            .iter()
            .filter(|f| matches!(f, FieldId::Standalone { .. }))
            .map(|f| f.name().to_string())
            .filter(|name| self.is_family_field(name))
            .collect();
        for family in families {
            for cleared in self.refresh_options(Some(family.as_str()), true) {
                changed.push(cleared.field.clone());
                outcome.updates.push(cleared);
            }
        }

        for field in &changed {
            self.apply_visibility(field);
            self.apply_requirements(field);
        }

        let mut seen = Vec::new();
        for field in changed {
            if seen.contains(&field) {
                continue;
            }
            if let Some(result) = self.check(&field) {
                self.annotations.apply(&field, &result);
                outcome.validations.push((field.clone(), result));
            }
            seen.push(field);
        }

        Ok(outcome)
    }

    /// Check a select's value against its options and route it through the
    /// field's pool. Nothing is written.
    fn admit(&mut self, id: &FieldId, value: &str) -> Result<(), Error> {
        let field = self
            .field(id)
            .ok_or_else(|| Error::UnknownField(id.wire_name()))?;
        if !value.is_empty() && !field.options.is_empty() && !field.options.iter().any(|o| o == value) {
            return Err(Error::UnknownOption {
                field: id.clone(),
                value: value.to_string(),
            });
        }
        self.tracker.assign(id, value)
    }

    /// Validate `value` against `id`'s check without touching any state.
    /// Fields without a check always pass.
    pub fn validate(&self, id: &FieldId, value: &str) -> Result<Validation, Error> {
        let field = self
            .field(id)
            .ok_or_else(|| Error::UnknownField(id.wire_name()))?;
        Ok(match field.check {
            Some(check) => validate::validate(check, value),
            None => Validation {
                valid: true,
                message: None,
            },
        })
    }

    fn check(&self, id: &FieldId) -> Option<Validation> {
        let field = self.field(id)?;
        field.check.map(|c| validate::validate(c, &field.value))
    }

    /// Options of a select with the pool state applied.
    pub fn options(&self, id: &FieldId) -> Result<Vec<OptionState>, Error> {
        let field = self
            .field(id)
            .ok_or_else(|| Error::UnknownField(id.wire_name()))?;
        Ok(self.tracker.options(id, &field.options))
    }

    pub fn progress(&self) -> Progress {
        let (filled, total) = self
            .fields()
            .filter(|f| f.required)
            .fold((0, 0), |(filled, total), f| {
                (filled + usize::from(f.is_filled()), total + 1)
            });
        let percent = if total == 0 {
            100
        } else {
            (filled * 100 / total) as u8
        };
        Progress {
            filled,
            total,
            percent,
            complete: filled == total,
        }
    }

    /// Name/value pairs for submission, in form order.
    pub fn form_data(&self) -> Vec<(String, String)> {
        let mut data = vec![("circuitType".to_string(), self.template.circuit_type.clone())];
        if let Some(generation) = self.generation {
            data.push(("siteType".to_string(), generation.site_type.to_string()));
            data.push(("numServices".to_string(), generation.services.to_string()));
        }
        data.extend(self.fields().map(|f| (f.id.wire_name(), f.value.clone())));
        data
    }

    /// Form data ready to send; only a generated form can be submitted.
    pub fn submission(&self) -> Result<Vec<(String, String)>, Error> {
        if self.generation.is_none() {
            return Err(Error::NotGenerated);
        }
        Ok(self.form_data())
    }

    pub fn snapshot(&self) -> FormSnapshot {
        let field_snapshot = |f: &FieldInstance| FieldSnapshot {
            name: f.id.wire_name(),
            label: f.label.clone(),
            value: f.value.clone(),
            required: f.required,
            visible: f.visible,
            error: self.annotations.get(&f.id).map(|m| m.to_string()),
            options: self.tracker.options(&f.id, &f.options),
        };
        let blocks = self
            .sites
            .iter()
            .map(|(site, slot)| {
                let blocks = slot
                    .blocks()
                    .iter()
                    .map(|b| BlockSnapshot {
                        header: b.header.clone(),
                        collapse_id: b.collapse_id.clone(),
                        fields: b.fields.iter().map(field_snapshot).collect(),
                    })
                    .collect();
                (*site, blocks)
            })
            .collect();
        FormSnapshot {
            template: self.template.id.clone(),
            generation: self.generation,
            fields: self.standalone.iter().map(field_snapshot).collect(),
            blocks,
            progress: self.progress(),
        }
    }

    fn write(&mut self, id: &FieldId, value: &str) {
        if let Some(field) = self.field_mut(id) {
            field.value = value.to_string();
        }
    }

    fn is_family_field(&self, name: &str) -> bool {
        self.catalog_fields()
            .iter()
            .any(|(_, source)| source.family_field == name)
    }

    /// Live fields whose options come from the catalog.
    fn catalog_fields(&self) -> Vec<(FieldId, CatalogRef)> {
        let mut out = Vec::new();
        for field in &self.standalone {
            if let Some(source) = self
                .template
                .standalone_field(field.id.name())
                .and_then(|t| t.options_from.clone())
            {
                out.push((field.id.clone(), source));
            }
        }
        for (site, slot) in &self.sites {
            let Some(block_template) = self.template.service_template(*site) else {
                continue;
            };
            for field in slot.blocks().iter().flat_map(|b| &b.fields) {
                if let Some(source) = block_template
                    .field(field.id.name())
                    .and_then(|t| t.options_from.clone())
                {
                    out.push((field.id.clone(), source));
                }
            }
        }
        out
    }

    /// Reload catalog options, for one family field or all of them. Values no
    /// longer offered, or all values when `clear` is set, are cleared and
    /// their claims released. Returns the cleared fields.
    fn refresh_options(&mut self, family: Option<&str>, clear: bool) -> Vec<FieldUpdate> {
        let targets: Vec<(FieldId, CatalogRef)> = self
            .catalog_fields()
            .into_iter()
            .filter(|(_, source)| family.map_or(true, |f| source.family_field == f))
            .collect();

        let mut cleared = Vec::new();
        for (id, source) in targets {
            let family_value = self
                .value(&FieldId::standalone(source.family_field.as_str()))
                .unwrap_or_default()
                .to_string();
            let ports: Vec<String> = self
                .catalog
                .ports(source.table, &family_value, source.role)
                .map(|p| p.to_vec())
                .unwrap_or_default();

            let stale = match self.field_mut(&id) {
                Some(field) => {
                    let stale = field.is_filled() && (clear || !ports.contains(&field.value));
                    field.options = ports;
                    if stale {
                        field.value.clear();
                    }
                    stale
                }
                None => false,
            };
            if stale {
                if let Err(e) = self.tracker.assign(&id, "") {
                    tracing::warn!(field = %id, error = %e, "could not release claim");
                }
                self.annotations.remove(&id);
                cleared.push(FieldUpdate::new(id, ""));
            }
        }
        cleared.extend(self.restock_pools());
        cleared
    }

    /// Set each pool's values to the union of its live members' options.
    /// Members whose claim vanished with the old values are cleared.
    fn restock_pools(&mut self) -> Vec<FieldUpdate> {
        let stock: Vec<(String, Vec<String>)> = self
            .tracker
            .pools()
            .iter()
            .map(|pool| {
                let values = self
                    .fields()
                    .filter(|f| pool.is_member(&f.id))
                    .flat_map(|f| f.options.iter().cloned())
                    .collect();
                (pool.id().to_string(), values)
            })
            .collect();

        let mut cleared = Vec::new();
        for (pool, values) in stock {
            let dropped = match self.tracker.restock(&pool, values) {
                Ok(dropped) => dropped,
                Err(e) => {
                    tracing::warn!(pool = %pool, error = %e, "could not restock pool");
                    continue;
                }
            };
            for id in dropped {
                self.write(&id, "");
                self.annotations.remove(&id);
                cleared.push(FieldUpdate::new(id, ""));
            }
        }
        cleared
    }

    /// After a pool reset, put standalone pool members' values back.
    fn reclaim_standalone(&mut self) {
        let claimed: Vec<(FieldId, String)> = self
            .standalone
            .iter()
            .filter(|f| f.is_filled() && self.tracker.pool_of(&f.id).is_some())
            .map(|f| (f.id.clone(), f.value.clone()))
            .collect();
        for (id, value) in claimed {
            if let Err(e) = self.tracker.assign(&id, &value) {
                tracing::warn!(field = %id, error = %e, "clearing conflicting value");
                self.write(&id, "");
            }
        }
    }

    fn apply_visibility(&mut self, source: &FieldId) {
        let Some(value) = self.value(source).map(|v| v.to_string()) else {
            return;
        };
        let mut toggles: Vec<(FieldId, bool)> = Vec::new();
        for rule in self.template.visibility.iter().filter(|r| r.source.matches(source)) {
            let equal = value == rule.equals;
            let mut push = |refs: &[FieldRef], visible: bool| {
                toggles.extend(
                    refs.iter()
                        .filter_map(|r| r.resolve(source.index()))
                        .map(|id| (id, visible)),
                );
            };
            push(&rule.when_equal, equal);
            push(&rule.otherwise, !equal);
        }
        for (id, visible) in toggles {
            if let Some(field) = self.field_mut(&id) {
                field.visible = visible;
            }
        }
    }

    fn apply_requirements(&mut self, source: &FieldId) {
        let Some(value) = self.value(source).map(|v| v.to_string()) else {
            return;
        };
        let index = source.index();
        let toggles: Vec<(FieldId, bool)> = self
            .template
            .requirements
            .iter()
            .filter(|r| r.source.matches(source))
            .flat_map(|rule| {
                let required = value == rule.equals;
                rule.fields
                    .iter()
                    .filter_map(move |r| r.resolve(index))
                    .map(move |id| (id, required))
            })
            .collect();
        for (id, required) in toggles {
            if let Some(field) = self.field_mut(&id) {
                field.required = required;
            }
        }
    }
}

impl FormView for FormSession {
    fn value(&self, field: &FieldId) -> Option<&str> {
        self.field(field).map(|f| f.value.as_str())
    }

    fn service_count(&self, site: Site) -> usize {
        self.blocks(site).len()
    }
}
