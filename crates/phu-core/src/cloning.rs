//! Turns one service block template into N numbered instances.

use serde::Serialize;

use crate::template::{FieldKind, FieldTemplate, ServiceTemplate};
use crate::validate::Check;
use crate::{Error, FieldId, Site};

/// A live field: identity, template attributes and current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInstance {
    pub id: FieldId,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<Check>,
    pub value: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub visible: bool,
}

impl FieldInstance {
    pub fn from_template(template: &FieldTemplate, id: FieldId) -> Self {
        FieldInstance {
            id,
            label: template.label.clone(),
            kind: template.kind,
            required: template.required,
            check: template.validate,
            value: String::new(),
            options: template.options.clone(),
            visible: true,
        }
    }

    pub fn is_filled(&self) -> bool {
        !self.value.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelInstance {
    pub text: String,
    /// None when the template label pointed at no field.
    pub target: Option<FieldId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBlockInstance {
    pub site: Site,
    pub index: usize,
    /// "Service #i".
    pub header: String,
    /// Id of the collapsible section, `collapseService{Site}{i}`.
    pub collapse_id: String,
    pub fields: Vec<FieldInstance>,
    pub labels: Vec<LabelInstance>,
}

impl ServiceBlockInstance {
    pub fn field(&self, name: &str) -> Option<&FieldInstance> {
        self.fields.iter().find(|f| f.id.name() == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldInstance> {
        self.fields.iter_mut().find(|f| f.id.name() == name)
    }
}

/// Clone `template` `count` times for `site`, in index order.
pub fn generate(
    template: &ServiceTemplate,
    count: usize,
    site: Site,
) -> Result<Vec<ServiceBlockInstance>, Error> {
    if count < 1 {
        return Err(Error::InvalidServiceCount(count));
    }
    let blocks: Vec<ServiceBlockInstance> = (1..=count)
        .map(|index| clone_block(template, index, site))
        .collect();
    tracing::debug!(site = site.label(), count, "generated service blocks");
    Ok(blocks)
}

fn clone_block(template: &ServiceTemplate, index: usize, site: Site) -> ServiceBlockInstance {
    let fields: Vec<FieldInstance> = template
        .fields
        .iter()
        .map(|f| FieldInstance::from_template(f, FieldId::service(site, index, f.name.as_str())))
        .collect();

    let labels = template
        .labels
        .iter()
        .map(|label| {
            let target = fields
                .iter()
                .find(|f| f.id.name() == label.target)
                .map(|f| f.id.clone());
            if target.is_none() {
                tracing::warn!(
                    label = %label.text,
                    target = %label.target,
                    site = site.label(),
                    index,
                    "no field for label, leaving it unbound"
                );
            }
            let text = if label.numbered {
                format!("{}{}", label.text, index)
            } else {
                label.text.clone()
            };
            LabelInstance { text, target }
        })
        .collect();

    ServiceBlockInstance {
        site,
        index,
        header: format!("{} #{}", template.header, index),
        collapse_id: format!("collapseService{}{}", site.label(), index),
        fields,
        labels,
    }
}

/// What a site's section of the live form currently holds: the canonical
/// block template, or the instances generated from it. Never both.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SiteSlot {
    #[default]
    Template,
    Generated(Vec<ServiceBlockInstance>),
}

impl SiteSlot {
    /// Replace the template (or earlier instances) with `count` new ones.
    pub fn generate(&mut self, template: &ServiceTemplate, count: usize, site: Site) -> Result<(), Error> {
        let blocks = generate(template, count, site)?;
        *self = SiteSlot::Generated(blocks);
        Ok(())
    }

    pub fn blocks(&self) -> &[ServiceBlockInstance] {
        match self {
            SiteSlot::Template => &[],
            SiteSlot::Generated(blocks) => blocks,
        }
    }

    pub fn blocks_mut(&mut self) -> &mut [ServiceBlockInstance] {
        match self {
            SiteSlot::Template => &mut [],
            SiteSlot::Generated(blocks) => blocks,
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(self, SiteSlot::Template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::LabelBinding;
    use std::collections::HashSet;

    fn field(name: &str) -> FieldTemplate {
        FieldTemplate {
            name: name.to_string(),
            label: name.to_string(),
            kind: FieldKind::Text,
            required: true,
            validate: None,
            options: vec![],
            options_from: None,
            dual_only: false,
        }
    }

    fn template() -> ServiceTemplate {
        ServiceTemplate {
            header: "Service".into(),
            fields: vec![field("serviceVlan"), field("serviceClci")],
            labels: vec![
                LabelBinding {
                    text: "VLAN ".into(),
                    target: "serviceVlan".into(),
                    numbered: true,
                },
                LabelBinding {
                    text: "Circuit ID".into(),
                    target: "serviceClci".into(),
                    numbered: false,
                },
            ],
        }
    }

    #[test]
    fn ids_are_numbered_and_unique() {
        for count in 1..=6 {
            let blocks = generate(&template(), count, Site::Primary).unwrap();
            assert_eq!(blocks.len(), count);
            let names: Vec<String> = blocks
                .iter()
                .flat_map(|b| b.fields.iter().map(|f| f.id.wire_name()))
                .collect();
            let unique: HashSet<&String> = names.iter().collect();
            assert_eq!(unique.len(), names.len());
            for i in 1..=count {
                assert!(names.contains(&format!("serviceVlan{i}")));
            }
        }
    }

    #[test]
    fn blocks_are_in_index_order_with_headers() {
        let blocks = generate(&template(), 3, Site::Backup).unwrap();
        let indices: Vec<usize> = blocks.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(blocks[1].header, "Service #2");
        assert_eq!(blocks[1].collapse_id, "collapseServiceBackup2");
        assert_eq!(
            blocks[2].field("serviceClci").unwrap().id.wire_name(),
            "serviceClciBackup3"
        );
    }

    #[test]
    fn labels_follow_their_field() {
        let blocks = generate(&template(), 2, Site::Primary).unwrap();
        let label = &blocks[1].labels[0];
        assert_eq!(label.text, "VLAN 2");
        assert_eq!(
            label.target,
            Some(FieldId::service(Site::Primary, 2, "serviceVlan"))
        );
        assert_eq!(blocks[1].labels[1].text, "Circuit ID");
    }

    #[test]
    fn dangling_label_does_not_fail_batch() {
        let mut t = template();
        t.labels.push(LabelBinding {
            text: "Ghost".into(),
            target: "serviceGhost".into(),
            numbered: false,
        });
        let blocks = generate(&t, 3, Site::Primary).unwrap();
        assert_eq!(blocks.len(), 3);
        for block in &blocks {
            assert_eq!(block.labels[2].target, None);
            assert!(block.labels[0].target.is_some());
        }
    }

    #[test]
    fn zero_count_is_rejected() {
        assert!(matches!(
            generate(&template(), 0, Site::Primary),
            Err(Error::InvalidServiceCount(0))
        ));
    }

    #[test]
    fn slot_retires_template() {
        let mut slot = SiteSlot::default();
        assert!(slot.is_template());
        assert!(slot.blocks().is_empty());

        slot.generate(&template(), 2, Site::Primary).unwrap();
        assert!(!slot.is_template());
        assert_eq!(slot.blocks().len(), 2);

        slot.generate(&template(), 5, Site::Primary).unwrap();
        assert_eq!(slot.blocks().len(), 5);

        assert!(slot.generate(&template(), 0, Site::Primary).is_err());
        assert_eq!(slot.blocks().len(), 5);
    }
}
