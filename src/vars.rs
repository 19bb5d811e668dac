//! Variable handling and precedence.
//!
//! Variables flow into a task from many sources. Instead of building the
//! effective mapping by repeated in-place updates, [`LayeredVars`] keeps one
//! map per source layer and flattens them in a fixed order, so precedence is
//! inspectable and testable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The variable mapping type used throughout the engine.
///
/// Insertion order is preserved so that playbook declaration order stays
/// observable in rendered output and machine results.
pub type Vars = IndexMap<String, Value>;

/// Variable precedence levels, lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Precedence {
    /// Role `defaults/main.yml` (lowest priority)
    RoleDefaults = 1,
    /// Group `all` variables
    GroupAll = 2,
    /// Variables from the other groups the host belongs to
    GroupVars = 3,
    /// Host variables (inventory line, host_vars/)
    HostVars = 4,
    /// Gathered facts
    Facts = 5,
    /// Role `vars/main.yml`
    RoleVars = 6,
    /// Play `vars` and `vars_files`
    PlayVars = 7,
    /// `set_fact` results
    SetFacts = 8,
    /// Registered task results
    Registered = 9,
    /// Task-level `vars`
    TaskVars = 10,
    /// `--extra-vars` (highest priority)
    ExtraVars = 11,
}

impl Precedence {
    /// All levels in resolution order (lowest to highest).
    pub fn all() -> impl Iterator<Item = Precedence> {
        [
            Precedence::RoleDefaults,
            Precedence::GroupAll,
            Precedence::GroupVars,
            Precedence::HostVars,
            Precedence::Facts,
            Precedence::RoleVars,
            Precedence::PlayVars,
            Precedence::SetFacts,
            Precedence::Registered,
            Precedence::TaskVars,
            Precedence::ExtraVars,
        ]
        .into_iter()
    }
}

/// An explicit stack of variable layers with a defined resolution order.
#[derive(Debug, Clone, Default)]
pub struct LayeredVars {
    layers: std::collections::BTreeMap<Precedence, Vars>,
}

impl LayeredVars {
    /// Creates an empty layered store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a mapping into the given layer, overriding existing keys of
    /// the same layer.
    pub fn extend(&mut self, precedence: Precedence, vars: Vars) {
        let layer = self.layers.entry(precedence).or_default();
        for (k, v) in vars {
            layer.insert(k, v);
        }
    }

    /// Sets a single variable at the given layer.
    pub fn set(&mut self, precedence: Precedence, key: impl Into<String>, value: Value) {
        self.layers
            .entry(precedence)
            .or_default()
            .insert(key.into(), value);
    }

    /// Resolves a key, highest layer wins.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.layers
            .values()
            .rev()
            .find_map(|layer| layer.get(key))
    }

    /// Flattens all layers into one mapping, lowest first so higher layers
    /// override.
    pub fn flatten(&self) -> Vars {
        let mut merged = Vars::new();
        for layer in self.layers.values() {
            for (k, v) in layer {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }
}

/// Converts a YAML value into a JSON value.
///
/// Mapping keys must be strings (or scalars, which are stringified); other
/// key shapes are rejected by the caller's deserialization before we get
/// here.
pub fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                serde_json::Number::from_f64(n.as_f64().unwrap_or(0.0))
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => {
            Value::Array(seq.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s,
                    other => yaml_scalar_to_string(&other),
                };
                out.insert(key, yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

/// Parses a YAML string into a variable mapping. Empty content yields an
/// empty mapping.
pub fn vars_from_yaml_str(content: &str) -> Result<Vars, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(Vars::new());
    }
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;
    Ok(match yaml_to_json(value) {
        Value::Object(map) => map.into_iter().collect(),
        _ => Vars::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn higher_layer_wins() {
        let mut layered = LayeredVars::new();
        layered.set(Precedence::GroupAll, "port", json!(80));
        layered.set(Precedence::HostVars, "port", json!(8080));
        layered.set(Precedence::ExtraVars, "port", json!(9090));

        assert_eq!(layered.get("port"), Some(&json!(9090)));
        assert_eq!(layered.flatten().get("port"), Some(&json!(9090)));
    }

    #[test]
    fn lower_layer_visible_when_unshadowed() {
        let mut layered = LayeredVars::new();
        layered.set(Precedence::RoleDefaults, "a", json!(1));
        layered.set(Precedence::PlayVars, "b", json!(2));

        let flat = layered.flatten();
        assert_eq!(flat.get("a"), Some(&json!(1)));
        assert_eq!(flat.get("b"), Some(&json!(2)));
    }

    #[test]
    fn yaml_conversion_preserves_structure() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("a: 1\nb:\n  - x\n  - true\nc: {d: null}").unwrap();
        let json = yaml_to_json(yaml);
        assert_eq!(json, json!({"a": 1, "b": ["x", true], "c": {"d": null}}));
    }

    #[test]
    fn vars_from_empty_string() {
        assert!(vars_from_yaml_str("").unwrap().is_empty());
        assert!(vars_from_yaml_str("  \n").unwrap().is_empty());
    }
}
