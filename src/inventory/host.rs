//! A single target host.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::vars::Vars;

/// Connection transport for a host, derived from `ansible_connection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Local,
    Ssh,
    WinRm,
}

/// A named target with a variable mapping and group memberships.
///
/// Hosts are created during inventory parsing and immutable during
/// execution; per-run mutation happens on the scheduler's host context.
#[derive(Debug, Clone)]
pub struct Host {
    /// Inventory name of the host
    pub name: String,
    /// Host variables (inventory line, host_vars/, dynamic source)
    pub vars: Vars,
    groups: BTreeSet<String>,
}

impl Host {
    /// Creates a host with the given variables.
    pub fn new(name: impl Into<String>, vars: Vars) -> Self {
        Self {
            name: name.into(),
            vars,
            groups: BTreeSet::new(),
        }
    }

    /// The network address to connect to (`ansible_host`, defaulting to the
    /// inventory name).
    pub fn address(&self) -> String {
        self.var_str("ansible_host")
            .unwrap_or_else(|| self.name.clone())
    }

    /// Connection port (`ansible_port`), when set.
    pub fn port(&self) -> Option<u16> {
        match self.vars.get("ansible_port") {
            Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// Remote user (`ansible_user`), when set.
    pub fn user(&self) -> Option<String> {
        self.var_str("ansible_user")
    }

    /// The transport for this host. Unset `ansible_connection` defaults to
    /// ssh, except for localhost which connects locally.
    pub fn transport(&self) -> Transport {
        match self.var_str("ansible_connection").as_deref() {
            Some("local") => Transport::Local,
            Some("winrm") | Some("psrp") => Transport::WinRm,
            Some(_) => Transport::Ssh,
            None => {
                if self.name == "localhost" || self.name == "127.0.0.1" {
                    Transport::Local
                } else {
                    Transport::Ssh
                }
            }
        }
    }

    /// True for hosts remoted over WinRM.
    pub fn is_windows(&self) -> bool {
        self.transport() == Transport::WinRm
            || self
                .var_str("ansible_os_family")
                .map(|f| f.eq_ignore_ascii_case("windows"))
                .unwrap_or(false)
    }

    /// Groups this host belongs to.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    /// True when the host is a member of `group`.
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    pub(crate) fn add_group(&mut self, group: impl Into<String>) {
        self.groups.insert(group.into());
    }

    pub(crate) fn set_var(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// String view of a variable.
    pub fn var_str(&self, key: &str) -> Option<String> {
        match self.vars.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// All host variables including the computed `inventory_hostname`,
    /// `inventory_hostname_short` and `ansible_host`.
    pub fn all_vars(&self) -> Vars {
        let mut vars = self.vars.clone();
        vars.insert("inventory_hostname".into(), Value::String(self.name.clone()));
        let short = self.name.split('.').next().unwrap_or(&self.name);
        vars.insert(
            "inventory_hostname_short".into(),
            Value::String(short.to_string()),
        );
        vars.insert("ansible_host".into(), Value::String(self.address()));
        vars
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Host {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn address_defaults_to_name() {
        let host = Host::new("web01.example.com", Vars::new());
        assert_eq!(host.address(), "web01.example.com");
    }

    #[test]
    fn ansible_host_overrides_address() {
        let mut vars = Vars::new();
        vars.insert("ansible_host".into(), json!("10.0.0.5"));
        let host = Host::new("web01", vars);
        assert_eq!(host.address(), "10.0.0.5");
    }

    #[test]
    fn computed_vars_present() {
        let host = Host::new("db1.internal.net", Vars::new());
        let vars = host.all_vars();
        assert_eq!(vars["inventory_hostname"], json!("db1.internal.net"));
        assert_eq!(vars["inventory_hostname_short"], json!("db1"));
    }

    #[test]
    fn transport_resolution() {
        let mut vars = Vars::new();
        vars.insert("ansible_connection".into(), json!("winrm"));
        assert_eq!(Host::new("w", vars).transport(), Transport::WinRm);

        assert_eq!(Host::new("localhost", Vars::new()).transport(), Transport::Local);
        assert_eq!(Host::new("remote1", Vars::new()).transport(), Transport::Ssh);
    }

    #[test]
    fn port_accepts_number_and_string() {
        let mut vars = Vars::new();
        vars.insert("ansible_port".into(), json!(2222));
        assert_eq!(Host::new("h", vars).port(), Some(2222));

        let mut vars = Vars::new();
        vars.insert("ansible_port".into(), json!("2200"));
        assert_eq!(Host::new("h", vars).port(), Some(2200));
    }
}
