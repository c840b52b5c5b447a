use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::property::{PropertyId, TenantId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

/// A logical bundle of properties. When `sync_prices` is set, every member
/// carries the effective price of the main property. Members are weak
/// references: deleting a property never cascades through the group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub tenant_id: TenantId,
    pub name: String,
    pub main_property_id: Option<PropertyId>,
    pub member_property_ids: Vec<PropertyId>,
    pub sync_prices: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// Validates the main-in-members invariant and, given the member sets of
    /// the tenant's other groups, the closure rule: a property must not
    /// appear in two groups of the same tenant.
    pub fn validate(&self, sibling_members: &[(GroupId, Vec<PropertyId>)]) -> Result<(), DomainError> {
        if let Some(main) = &self.main_property_id {
            if !self.member_property_ids.contains(main) {
                return Err(DomainError::GroupMissingMain { group_id: self.id.clone() });
            }
        }

        for (index, member) in self.member_property_ids.iter().enumerate() {
            if self.member_property_ids[..index].contains(member) {
                return Err(DomainError::GroupCycle {
                    group_id: self.id.clone(),
                    property_id: member.clone(),
                });
            }
        }

        for (sibling_id, members) in sibling_members {
            if *sibling_id == self.id {
                continue;
            }
            for member in &self.member_property_ids {
                if members.contains(member) {
                    return Err(DomainError::GroupCycle {
                        group_id: self.id.clone(),
                        property_id: member.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn is_member(&self, property_id: &PropertyId) -> bool {
        self.member_property_ids.contains(property_id)
    }

    /// Members other than the main property, in declaration order.
    pub fn secondary_members(&self) -> Vec<PropertyId> {
        self.member_property_ids
            .iter()
            .filter(|id| Some(*id) != self.main_property_id.as_ref())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::property::{PropertyId, TenantId};
    use crate::errors::DomainError;

    use super::{Group, GroupId};

    fn group(members: &[&str], main: Option<&str>) -> Group {
        Group {
            id: GroupId("G-1".to_string()),
            tenant_id: TenantId("T-1".to_string()),
            name: "Beach cluster".to_string(),
            main_property_id: main.map(|id| PropertyId(id.to_string())),
            member_property_ids: members.iter().map(|id| PropertyId(id.to_string())).collect(),
            sync_prices: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn main_must_be_a_member() {
        let g = group(&["A", "B"], Some("C"));
        assert!(matches!(g.validate(&[]), Err(DomainError::GroupMissingMain { .. })));
    }

    #[test]
    fn null_main_is_allowed() {
        let g = group(&["A", "B"], None);
        g.validate(&[]).expect("group without main is valid");
    }

    #[test]
    fn duplicate_member_across_tenant_groups_is_a_cycle() {
        let g = group(&["A", "B"], Some("A"));
        let siblings = vec![(GroupId("G-2".to_string()), vec![PropertyId("B".to_string())])];
        let error = g.validate(&siblings).expect_err("duplicate membership");
        assert!(matches!(error, DomainError::GroupCycle { property_id, .. } if property_id.0 == "B"));
    }

    #[test]
    fn own_group_is_ignored_in_closure_check() {
        let g = group(&["A", "B"], Some("A"));
        let siblings =
            vec![(GroupId("G-1".to_string()), vec![PropertyId("A".to_string()), PropertyId("B".to_string())])];
        g.validate(&siblings).expect("own previous membership does not conflict");
    }

    #[test]
    fn secondary_members_exclude_main() {
        let g = group(&["A", "B", "C"], Some("A"));
        let secondary: Vec<String> = g.secondary_members().into_iter().map(|id| id.0).collect();
        assert_eq!(secondary, vec!["B".to_string(), "C".to_string()]);
    }
}
