use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// A named capability such as `patients:read` or `billing:write`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Permission(pub String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Permission {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Static role -> permission mapping.
///
/// Defined by the ERP's role administration outside this core and loaded
/// once; the guard treats it as read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolePermissionTable {
    grants: HashMap<Uuid, HashSet<Permission>>,
}

impl RolePermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, role_id: Uuid, permission: Permission) -> &mut Self {
        self.grants.entry(role_id).or_default().insert(permission);
        self
    }

    pub fn permissions_for(&self, role_id: &Uuid) -> Option<&HashSet<Permission>> {
        self.grants.get(role_id)
    }

    /// All permissions held across a set of roles.
    pub fn permissions_for_roles(&self, role_ids: &[Uuid]) -> HashSet<Permission> {
        role_ids
            .iter()
            .filter_map(|id| self.grants.get(id))
            .flatten()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissions_union_across_roles() {
        let nurse = Uuid::new_v4();
        let billing_clerk = Uuid::new_v4();

        let mut table = RolePermissionTable::new();
        table.grant(nurse, Permission::from("patients:read"));
        table.grant(nurse, Permission::from("vitals:write"));
        table.grant(billing_clerk, Permission::from("billing:write"));

        let held = table.permissions_for_roles(&[nurse, billing_clerk]);
        assert_eq!(held.len(), 3);
        assert!(held.contains(&Permission::from("vitals:write")));

        let held = table.permissions_for_roles(&[Uuid::new_v4()]);
        assert!(held.is_empty());
    }
}
