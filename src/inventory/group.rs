//! A named set of hosts with variables and child/parent relations.

use indexmap::IndexSet;
use serde_json::Value;

use crate::vars::Vars;

/// A group of hosts. Two groups always exist: `all` and `ungrouped`.
#[derive(Debug, Clone, Default)]
pub struct Group {
    /// Group name
    pub name: String,
    /// Group variables
    pub vars: Vars,
    hosts: IndexSet<String>,
    children: IndexSet<String>,
    parents: IndexSet<String>,
}

impl Group {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Host names directly in this group, in declaration order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    /// Child group names, in declaration order.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    /// Parent group names.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.parents.iter().map(String::as_str)
    }

    /// True when the group holds no hosts and no children.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.children.is_empty()
    }

    pub(crate) fn add_host(&mut self, host: impl Into<String>) {
        self.hosts.insert(host.into());
    }

    pub(crate) fn add_child(&mut self, child: impl Into<String>) {
        self.children.insert(child.into());
    }

    pub(crate) fn add_parent(&mut self, parent: impl Into<String>) {
        self.parents.insert(parent.into());
    }

    pub(crate) fn set_var(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn membership_and_relations() {
        let mut g = Group::new("web");
        g.add_host("web01");
        g.add_host("web02");
        g.add_host("web01");
        g.add_child("web-eu");
        g.set_var("http_port", json!(80));

        assert_eq!(g.hosts().collect::<Vec<_>>(), vec!["web01", "web02"]);
        assert_eq!(g.children().collect::<Vec<_>>(), vec!["web-eu"]);
        assert_eq!(g.vars["http_port"], json!(80));
        assert!(!g.is_empty());
    }
}
