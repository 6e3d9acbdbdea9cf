//! Exclusive claims over a shared set of values (physical ports). A value
//! claimed by one member is unselectable at every other member.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::template::PoolTemplate;
use crate::{Error, FieldId, FieldRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionState {
    pub value: String,
    pub disabled: bool,
}

#[derive(Debug, Clone)]
pub struct ResourcePool {
    id: String,
    members: Vec<FieldRef>,
    values: BTreeSet<String>,
    claims: BTreeMap<FieldId, String>,
}

impl ResourcePool {
    pub fn new(id: impl Into<String>, members: Vec<FieldRef>) -> Self {
        ResourcePool {
            id: id.into(),
            members,
            values: BTreeSet::new(),
            claims: BTreeMap::new(),
        }
    }

    pub fn from_template(template: &PoolTemplate) -> Self {
        ResourcePool::new(template.id.clone(), template.members.clone())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_member(&self, field: &FieldId) -> bool {
        self.members.iter().any(|m| m.matches(field))
    }

    /// Replace the pool's values with what its members currently offer.
    /// Claims on values that are gone are dropped; their holders are returned.
    pub fn restock<I, S>(&mut self, values: I) -> Vec<FieldId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values
            .into_iter()
            .map(Into::into)
            .filter(|v| !v.is_empty())
            .collect();
        let stale: Vec<FieldId> = self
            .claims
            .iter()
            .filter(|(_, v)| !self.values.contains(*v))
            .map(|(f, _)| f.clone())
            .collect();
        for field in &stale {
            self.claims.remove(field);
        }
        tracing::debug!(pool = %self.id, values = self.values.len(), dropped = stale.len(), "pool restocked");
        stale
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(value)
    }

    /// Values not currently claimed by any member.
    pub fn available(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter(|v| self.holder(v).is_none())
            .map(|v| v.as_str())
    }

    pub fn claim_of(&self, field: &FieldId) -> Option<&str> {
        self.claims.get(field).map(|v| v.as_str())
    }

    pub fn holder(&self, value: &str) -> Option<&FieldId> {
        self.claims
            .iter()
            .find(|(_, v)| v.as_str() == value)
            .map(|(f, _)| f)
    }

    /// Move `field`'s claim to `value`. An empty value only releases. A value
    /// the pool does not hold, or one held by another member, is refused and
    /// nothing changes. Returns the released value, if any.
    pub fn select(&mut self, field: &FieldId, value: &str) -> Result<Option<String>, Error> {
        if !self.is_member(field) {
            return Err(Error::NotPoolMember {
                pool: self.id.clone(),
                field: field.clone(),
            });
        }
        if !value.is_empty() {
            if !self.values.contains(value) {
                return Err(Error::UnknownOption {
                    field: field.clone(),
                    value: value.to_string(),
                });
            }
            if let Some(holder) = self.holder(value) {
                if holder != field {
                    return Err(Error::ResourceClaimed {
                        pool: self.id.clone(),
                        value: value.to_string(),
                        holder: holder.clone(),
                    });
                }
            }
        }

        let released = self.claims.remove(field);
        if !value.is_empty() {
            self.claims.insert(field.clone(), value.to_string());
        }
        tracing::debug!(pool = %self.id, field = %field, value, "pool selection");
        Ok(released.filter(|v| v != value))
    }

    pub fn release(&mut self, field: &FieldId) -> Option<String> {
        self.claims.remove(field)
    }

    /// A value is selectable at `field` when nobody holds it or `field` does.
    pub fn is_selectable(&self, field: &FieldId, value: &str) -> bool {
        value.is_empty() || self.holder(value).map_or(true, |h| h == field)
    }

    pub fn options(&self, field: &FieldId, values: &[String]) -> Vec<OptionState> {
        values
            .iter()
            .map(|v| OptionState {
                value: v.clone(),
                disabled: !self.is_selectable(field, v),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.claims.clear();
        self.values.clear();
    }

    pub fn claims(&self) -> impl Iterator<Item = (&FieldId, &str)> {
        self.claims.iter().map(|(f, v)| (f, v.as_str()))
    }
}

/// All pools of a form, addressed by id.
#[derive(Debug, Clone, Default)]
pub struct ExclusivityTracker {
    pools: Vec<ResourcePool>,
}

impl ExclusivityTracker {
    pub fn new(templates: &[PoolTemplate]) -> Self {
        ExclusivityTracker {
            pools: templates.iter().map(ResourcePool::from_template).collect(),
        }
    }

    pub fn pool(&self, id: &str) -> Option<&ResourcePool> {
        self.pools.iter().find(|p| p.id == id)
    }

    pub fn pool_of(&self, field: &FieldId) -> Option<&ResourcePool> {
        self.pools.iter().find(|p| p.is_member(field))
    }

    fn pool_of_mut(&mut self, field: &FieldId) -> Option<&mut ResourcePool> {
        self.pools.iter_mut().find(|p| p.is_member(field))
    }

    pub fn select(&mut self, pool_id: &str, field: &FieldId, value: &str) -> Result<Option<String>, Error> {
        let pool = self
            .pools
            .iter_mut()
            .find(|p| p.id == pool_id)
            .ok_or_else(|| Error::UnknownPool(pool_id.to_string()))?;
        pool.select(field, value)
    }

    /// Route a value change through the field's pool. Fields outside every
    /// pool always succeed.
    pub fn assign(&mut self, field: &FieldId, value: &str) -> Result<(), Error> {
        match self.pool_of_mut(field) {
            Some(pool) => pool.select(field, value).map(|_| ()),
            None => Ok(()),
        }
    }

    pub fn restock(&mut self, pool_id: &str, values: Vec<String>) -> Result<Vec<FieldId>, Error> {
        let pool = self
            .pools
            .iter_mut()
            .find(|p| p.id == pool_id)
            .ok_or_else(|| Error::UnknownPool(pool_id.to_string()))?;
        Ok(pool.restock(values))
    }

    pub fn options(&self, field: &FieldId, values: &[String]) -> Vec<OptionState> {
        match self.pool_of(field) {
            Some(pool) => pool.options(field, values),
            None => values
                .iter()
                .map(|v| OptionState {
                    value: v.clone(),
                    disabled: false,
                })
                .collect(),
        }
    }

    /// Drop every claim; used when the form is regenerated.
    pub fn reset(&mut self) {
        for pool in &mut self.pools {
            pool.clear();
        }
    }

    pub fn pools(&self) -> &[ResourcePool] {
        &self.pools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Site;

    fn port(i: usize) -> FieldId {
        FieldId::service(Site::Primary, i, "serviceCpePort")
    }

    fn pool() -> ResourcePool {
        let mut pool = ResourcePool::new(
            "cpePorts",
            vec![FieldRef::Service {
                site: Site::Primary,
                field: "serviceCpePort".into(),
            }],
        );
        pool.restock(["A", "B", "C"]);
        pool
    }

    fn disabled(pool: &ResourcePool, field: &FieldId) -> Vec<String> {
        let values: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        pool.options(field, &values)
            .into_iter()
            .filter(|o| o.disabled)
            .map(|o| o.value)
            .collect()
    }

    fn assert_injective(pool: &ResourcePool) {
        let claimed: Vec<&str> = pool.claims().map(|(_, v)| v).collect();
        let unique: BTreeSet<&str> = claimed.iter().copied().collect();
        assert_eq!(claimed.len(), unique.len());
    }

    #[test]
    fn claimed_value_disabled_elsewhere_only() {
        let mut pool = pool();
        pool.select(&port(1), "A").unwrap();

        assert_eq!(disabled(&pool, &port(1)), Vec::<String>::new());
        assert_eq!(disabled(&pool, &port(2)), vec!["A"]);
        assert!(!pool.is_selectable(&port(2), "A"));
        assert!(pool.is_selectable(&port(1), "A"));

        let err = pool.select(&port(2), "A").unwrap_err();
        assert!(matches!(err, Error::ResourceClaimed { ref holder, .. } if *holder == port(1)));
        assert_eq!(pool.claim_of(&port(2)), None);

        pool.select(&port(1), "").unwrap();
        assert_eq!(disabled(&pool, &port(2)), Vec::<String>::new());
        pool.select(&port(2), "A").unwrap();
        assert_injective(&pool);
    }

    #[test]
    fn reselect_releases_previous_claim() {
        let mut pool = pool();
        pool.select(&port(1), "A").unwrap();
        let released = pool.select(&port(1), "B").unwrap();
        assert_eq!(released.as_deref(), Some("A"));
        assert_eq!(pool.available().collect::<Vec<_>>(), vec!["A", "C"]);
        assert_eq!(disabled(&pool, &port(2)), vec!["B"]);
        assert_injective(&pool);
    }

    #[test]
    fn selecting_same_value_again_is_stable() {
        let mut pool = pool();
        pool.select(&port(1), "C").unwrap();
        assert_eq!(pool.select(&port(1), "C").unwrap(), None);
        assert_eq!(pool.claim_of(&port(1)), Some("C"));
    }

    #[test]
    fn non_members_are_refused() {
        let mut pool = pool();
        let other = FieldId::service(Site::Backup, 1, "serviceCpePort");
        assert!(matches!(
            pool.select(&other, "A"),
            Err(Error::NotPoolMember { .. })
        ));
    }

    #[test]
    fn tracker_routes_by_membership() {
        let templates = vec![PoolTemplate {
            id: "cpePorts".into(),
            members: vec![FieldRef::Service {
                site: Site::Primary,
                field: "serviceCpePort".into(),
            }],
        }];
        let mut tracker = ExclusivityTracker::new(&templates);
        let vlan = FieldId::service(Site::Primary, 1, "serviceVlan");

        tracker.assign(&vlan, "100").unwrap();
        assert!(tracker.restock("missing", vec![]).is_err());
        tracker
            .restock("cpePorts", vec!["A".into(), "B".into(), "C".into()])
            .unwrap();
        tracker.assign(&port(1), "A").unwrap();
        assert!(tracker.assign(&port(2), "A").is_err());
        assert!(tracker.select("missing", &port(2), "B").is_err());
        tracker.select("cpePorts", &port(2), "B").unwrap();

        let claims: Vec<_> = tracker.pool("cpePorts").unwrap().claims().collect();
        assert_eq!(claims.len(), 2);

        tracker.reset();
        assert_eq!(tracker.pool("cpePorts").unwrap().claims().count(), 0);
    }

    #[test]
    fn values_outside_the_pool_are_refused() {
        let mut pool = pool();
        let err = pool.select(&port(1), "Z").unwrap_err();
        assert!(matches!(err, Error::UnknownOption { ref value, .. } if value == "Z"));
        assert_eq!(pool.claim_of(&port(1)), None);
        assert!(!pool.contains("Z"));
        assert_eq!(pool.available().count(), 3);
    }

    #[test]
    fn restock_replaces_values_and_drops_stale_claims() {
        let mut pool = pool();
        pool.select(&port(1), "A").unwrap();
        pool.select(&port(2), "C").unwrap();

        let dropped = pool.restock(["A", "B"]);
        assert_eq!(dropped, vec![port(2)]);
        assert_eq!(pool.claim_of(&port(1)), Some("A"));
        assert_eq!(pool.claim_of(&port(2)), None);
        assert_eq!(pool.available().collect::<Vec<_>>(), vec!["B"]);
        assert!(pool.select(&port(2), "C").is_err());
    }
}
