//! Role tags and resolution of roles to roster people.
//!
//! Templates assign work to roles; projects assign it to people. A
//! [`RosterSnapshot`] is taken once per instantiation and every task's roles
//! are resolved against that same snapshot.

use crate::error::UnresolvedRoleWarning;
use crate::types::{Person, PersonId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Closed set of responsibilities shared by template authoring and the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Advisor,
    AssociateAdvisor,
    ClientService,
    Paraplanner,
    Operations,
    EstateAttorney,
    TaxPlanner,
    InsuranceSpecialist,
    Compliance,
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::Advisor,
        Role::AssociateAdvisor,
        Role::ClientService,
        Role::Paraplanner,
        Role::Operations,
        Role::EstateAttorney,
        Role::TaxPlanner,
        Role::InsuranceSpecialist,
        Role::Compliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Advisor => "advisor",
            Role::AssociateAdvisor => "associate_advisor",
            Role::ClientService => "client_service",
            Role::Paraplanner => "paraplanner",
            Role::Operations => "operations",
            Role::EstateAttorney => "estate_attorney",
            Role::TaxPlanner => "tax_planner",
            Role::InsuranceSpecialist => "insurance_specialist",
            Role::Compliance => "compliance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Role::ALL.into_iter().find(|role| role.as_str() == s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active people indexed by role, frozen at the moment it was taken.
#[derive(Debug, Clone, Default)]
pub struct RosterSnapshot {
    by_role: BTreeMap<Role, Vec<PersonId>>,
    active_count: usize,
}

impl RosterSnapshot {
    /// Snapshot the active members of `people`. Inactive entries are dropped.
    pub fn new(people: &[Person]) -> Self {
        let mut by_role: BTreeMap<Role, Vec<PersonId>> = BTreeMap::new();
        let mut active_count = 0;

        for person in people.iter().filter(|p| p.active) {
            active_count += 1;
            for role in &person.roles {
                let ids = by_role.entry(*role).or_default();
                if !ids.contains(&person.id) {
                    ids.push(person.id.clone());
                }
            }
        }

        Self {
            by_role,
            active_count,
        }
    }

    /// Active people carrying `role`, in roster order.
    pub fn people_with(&self, role: Role) -> &[PersonId] {
        self.by_role.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }
}

/// Outcome of resolving one task's roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleResolution {
    /// Union of people across all roles, first-seen order, no duplicates.
    pub assigned_to: Vec<PersonId>,
    /// Roles that matched nobody.
    pub unmatched: Vec<Role>,
}

impl RoleResolution {
    pub fn warnings(&self, task_id: &str) -> Vec<UnresolvedRoleWarning> {
        self.unmatched
            .iter()
            .map(|role| UnresolvedRoleWarning {
                task_id: task_id.to_string(),
                role: *role,
            })
            .collect()
    }
}

/// Resolve role tags to the union of active people carrying any of them.
pub fn resolve_roles(roles: &[Role], roster: &RosterSnapshot) -> RoleResolution {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut resolution = RoleResolution::default();

    for role in roles {
        let people = roster.people_with(*role);
        if people.is_empty() {
            if !resolution.unmatched.contains(role) {
                resolution.unmatched.push(*role);
            }
            continue;
        }
        for person in people {
            if seen.insert(person.as_str()) {
                resolution.assigned_to.push(person.clone());
            }
        }
    }

    resolution
}
