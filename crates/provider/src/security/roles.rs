//! Role hierarchy helpers and the action-permission table.

use std::collections::HashMap;

use crate::core::Role;

/// Ordinal role check against a set of acceptable roles.
///
/// With `use_hierarchy`, a role satisfies the requirement when its ordinal
/// is at or above the minimum ordinal among `required`. Without a
/// hierarchy, only exact set-membership satisfies it.
pub fn satisfies_requirement(user_role: Role, required: &[Role], use_hierarchy: bool) -> bool {
    if use_hierarchy {
        match required.iter().map(|r| r.ordinal()).min() {
            Some(minimum) => user_role.ordinal() >= minimum,
            // An empty requirement grants nothing.
            None => false,
        }
    } else {
        required.contains(&user_role)
    }
}

/// Static action → minimum-role table.
///
/// Unknown actions are denied by default; a lookup miss is a deny, not an
/// error, and callers log it at warn level.
#[derive(Debug, Clone)]
pub struct ActionTable {
    actions: HashMap<&'static str, Role>,
}

impl ActionTable {
    /// The built-in back-office action table.
    pub fn standard() -> Self {
        let mut actions = HashMap::new();
        actions.insert("view_recipes", Role::Staff);
        actions.insert("view_deliveries", Role::Staff);
        actions.insert("view_menu", Role::Staff);
        actions.insert("record_deliveries", Role::Supervisor);
        actions.insert("edit_recipes", Role::Supervisor);
        actions.insert("record_production", Role::Supervisor);
        actions.insert("delete_deliveries", Role::Manager);
        actions.insert("edit_menu_prices", Role::Manager);
        actions.insert("manage_vendors", Role::Manager);
        actions.insert("manage_users", Role::Owner);
        actions.insert("manage_billing", Role::Owner);
        Self { actions }
    }

    /// Creates an empty table (every action denied).
    pub fn empty() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Registers or overrides an action's minimum role.
    pub fn with_action(mut self, action: &'static str, minimum: Role) -> Self {
        self.actions.insert(action, minimum);
        self
    }

    /// Returns the minimum role for an action, or `None` for unknown actions.
    pub fn minimum_role(&self, action: &str) -> Option<Role> {
        self.actions.get(action).copied()
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_satisfies_upward() {
        assert!(satisfies_requirement(Role::Owner, &[Role::Manager], true));
        assert!(satisfies_requirement(Role::Manager, &[Role::Manager], true));
        assert!(!satisfies_requirement(Role::Supervisor, &[Role::Manager], true));
    }

    #[test]
    fn test_hierarchy_uses_minimum_of_required() {
        // Supervisor meets the lower bound of {Supervisor, Owner}.
        assert!(satisfies_requirement(
            Role::Supervisor,
            &[Role::Owner, Role::Supervisor],
            true
        ));
        assert!(!satisfies_requirement(
            Role::Staff,
            &[Role::Owner, Role::Supervisor],
            true
        ));
    }

    #[test]
    fn test_exact_membership_without_hierarchy() {
        assert!(satisfies_requirement(Role::Manager, &[Role::Manager], false));
        // Owner outranks Manager but is not in the set.
        assert!(!satisfies_requirement(Role::Owner, &[Role::Manager], false));
    }

    #[test]
    fn test_empty_requirement_denies() {
        assert!(!satisfies_requirement(Role::Owner, &[], true));
        assert!(!satisfies_requirement(Role::Owner, &[], false));
    }

    #[test]
    fn test_standard_table_boundaries() {
        let table = ActionTable::standard();
        assert_eq!(table.minimum_role("view_recipes"), Some(Role::Staff));
        assert_eq!(table.minimum_role("delete_deliveries"), Some(Role::Manager));
        assert_eq!(table.minimum_role("manage_billing"), Some(Role::Owner));
        assert_eq!(table.minimum_role("reboot_pos_terminal"), None);
    }

    #[test]
    fn test_with_action_overrides() {
        let table = ActionTable::standard().with_action("delete_deliveries", Role::Owner);
        assert_eq!(table.minimum_role("delete_deliveries"), Some(Role::Owner));
    }
}
