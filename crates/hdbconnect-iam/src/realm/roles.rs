//! Role inheritance graph and permission expansion

use std::collections::{BTreeSet, HashMap, HashSet};

use super::config::RoleConfig;

/// Role graph of one realm
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    roles: HashMap<String, RoleConfig>,
}

impl RoleGraph {
    #[must_use]
    pub fn new(roles: &[RoleConfig]) -> Self {
        Self {
            roles: roles
                .iter()
                .map(|role| (role.name.clone(), role.clone()))
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Permissions granted by `assigned` roles, including everything they inherit.
    ///
    /// Unknown role names contribute nothing. Every role is visited at most once
    /// per call, so the walk terminates even on a graph that was never validated.
    #[must_use]
    pub fn expand<S: AsRef<str>>(&self, assigned: &[S]) -> Vec<String> {
        let mut permissions = BTreeSet::new();
        let mut visited = HashSet::new();

        for role in assigned {
            self.collect(role.as_ref(), &mut visited, &mut permissions);
        }

        permissions.into_iter().collect()
    }

    fn collect<'a>(
        &'a self,
        role: &'a str,
        visited: &mut HashSet<&'a str>,
        permissions: &mut BTreeSet<String>,
    ) {
        if !visited.insert(role) {
            return;
        }
        let Some(config) = self.roles.get(role) else {
            return;
        };

        permissions.extend(config.permissions.iter().cloned());
        for parent in &config.inherits {
            self.collect(parent, visited, permissions);
        }
    }

    /// First inheritance cycle found, as the path that closes it
    ///
    /// Roles are checked in name order so the reported cycle is stable.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut names: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        names.sort_unstable();

        let mut done = HashSet::new();
        for name in names {
            let mut path = Vec::new();
            if let Some(cycle) = self.walk(name, &mut path, &mut done) {
                return Some(cycle);
            }
        }
        None
    }

    fn walk<'a>(
        &'a self,
        role: &'a str,
        path: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(start) = path.iter().position(|r| *r == role) {
            let mut cycle: Vec<String> = path[start..].iter().map(|r| (*r).to_string()).collect();
            cycle.push(role.to_string());
            return Some(cycle);
        }
        if done.contains(role) {
            return None;
        }

        path.push(role);
        if let Some(config) = self.roles.get(role) {
            for parent in &config.inherits {
                if let Some(cycle) = self.walk(parent, path, done) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        done.insert(role);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str, permissions: &[&str], inherits: &[&str]) -> RoleConfig {
        RoleConfig {
            name: name.to_string(),
            permissions: permissions.iter().map(|p| (*p).to_string()).collect(),
            inherits: inherits.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    #[test]
    fn test_expand_single_role() {
        let graph = RoleGraph::new(&[role("reader", &["docs:read"], &[])]);
        assert_eq!(graph.expand(&["reader"]), vec!["docs:read"]);
    }

    #[test]
    fn test_expand_transitive() {
        let graph = RoleGraph::new(&[
            role("admin", &["users:delete"], &["editor"]),
            role("editor", &["docs:write"], &["reader"]),
            role("reader", &["docs:read"], &[]),
        ]);

        let perms = graph.expand(&["admin"]);
        assert_eq!(perms, vec!["docs:read", "docs:write", "users:delete"]);
    }

    #[test]
    fn test_expand_deduplicates_diamond() {
        let graph = RoleGraph::new(&[
            role("top", &[], &["left", "right"]),
            role("left", &["a"], &["base"]),
            role("right", &["b"], &["base"]),
            role("base", &["a", "base"], &[]),
        ]);

        assert_eq!(graph.expand(&["top", "left"]), vec!["a", "b", "base"]);
    }

    #[test]
    fn test_expand_unknown_role_is_empty() {
        let graph = RoleGraph::new(&[role("reader", &["docs:read"], &["ghost"])]);
        assert!(graph.expand(&["nobody"]).is_empty());
        assert_eq!(graph.expand(&["reader"]), vec!["docs:read"]);
    }

    #[test]
    fn test_expand_terminates_on_cycle() {
        let graph = RoleGraph::new(&[role("a", &["x"], &["b"]), role("b", &["y"], &["a"])]);
        assert_eq!(graph.expand(&["a"]), vec!["x", "y"]);
    }

    #[test]
    fn test_find_cycle_none() {
        let graph = RoleGraph::new(&[
            role("admin", &[], &["editor"]),
            role("editor", &[], &["reader"]),
            role("reader", &[], &[]),
        ]);
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_find_cycle_self_reference() {
        let graph = RoleGraph::new(&[role("loop", &[], &["loop"])]);
        assert_eq!(graph.find_cycle(), Some(vec!["loop".into(), "loop".into()]));
    }

    #[test]
    fn test_find_cycle_mutual() {
        let graph = RoleGraph::new(&[
            role("a", &[], &["b"]),
            role("b", &[], &["c"]),
            role("c", &[], &["a"]),
        ]);
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle, vec!["a", "b", "c", "a"]);
    }
}
