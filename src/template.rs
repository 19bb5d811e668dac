//! Jinja-compatible template engine.
//!
//! Powered by minijinja with strict undefined semantics: any reference to an
//! undefined name fails rendering, except where only definedness is being
//! tested. The filter set is fixed and small; playbooks relying on filters
//! outside it fail with a template error naming the filter.

use base64::Engine as _;
use minijinja::{Environment, UndefinedBehavior};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::vars::Vars;

static DEFINED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\s+is\s+(not\s+)?defined").expect("defined regex"));

/// Template engine with the fixed playbook filter set.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Creates an engine with strict undefined behavior and all filters and
    /// tests registered.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        register_filters(&mut env);
        register_tests(&mut env);
        Self { env }
    }

    /// Renders a template string against the given variables.
    ///
    /// Strings without `{{` or `{%` markers are returned unchanged without
    /// touching the engine.
    pub fn render(&self, template: &str, vars: &Vars) -> Result<String> {
        if !template.contains("{{") && !template.contains("{%") {
            return Ok(template.to_string());
        }

        let ctx = minijinja::value::Value::from_serialize(vars);
        self.env
            .render_str(template, ctx)
            .map_err(|e| Error::template(e.to_string(), template))
    }

    /// Recursively renders every string leaf in a value. String mapping keys
    /// are rendered too; other scalars pass through untouched.
    pub fn render_value(&self, value: &Value, vars: &Vars) -> Result<Value> {
        match value {
            Value::String(s) => Ok(Value::String(self.render(s, vars)?)),
            Value::Array(items) => {
                let rendered: Result<Vec<Value>> =
                    items.iter().map(|v| self.render_value(v, vars)).collect();
                Ok(Value::Array(rendered?))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(self.render(k, vars)?, self.render_value(v, vars)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Evaluates a `when` expression to a boolean.
    ///
    /// The bare expression is wrapped as `{{ expr }}`, rendered, and coerced
    /// with the playbook truthiness rules. A dedicated path answers
    /// `x is defined` / `x is not defined` even when the name is undefined
    /// under strict rendering.
    pub fn evaluate_when(&self, condition: &str, vars: &Vars) -> Result<bool> {
        let condition = condition.trim();
        if condition.is_empty() {
            return Ok(true);
        }

        let wrapped = format!("{{{{ {} }}}}", condition);
        match self.render(&wrapped, vars) {
            Ok(rendered) => Ok(coerce_bool(&rendered)),
            Err(err) => {
                if condition.contains("is defined") || condition.contains("is not defined") {
                    if let Some(result) = evaluate_defined(condition, vars) {
                        return Ok(result);
                    }
                }
                Err(err)
            }
        }
    }
}

/// Answers simple `<name> is [not] defined` conditions against the variable
/// mapping without going through the engine.
fn evaluate_defined(condition: &str, vars: &Vars) -> Option<bool> {
    let caps = DEFINED_RE.captures(condition)?;
    let name = caps.get(1)?.as_str();
    let negated = caps.get(2).is_some();
    let defined = vars.get(name).map(|v| !v.is_null()).unwrap_or(false);
    Some(if negated { !defined } else { defined })
}

/// Playbook-style boolean coercion.
pub fn coerce_bool(value: &str) -> bool {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => true,
        "false" | "no" | "0" | "off" | "" => false,
        _ => !value.trim().is_empty(),
    }
}

fn register_filters(env: &mut Environment<'static>) {
    use minijinja::value::Value as MjValue;
    use minijinja::Error as MjError;

    fn filter_default(
        value: MjValue,
        default: Option<MjValue>,
        boolean: Option<bool>,
    ) -> MjValue {
        let fallback = default.unwrap_or_else(|| MjValue::from(""));
        if boolean.unwrap_or(false) {
            if value.is_true() {
                value
            } else {
                fallback
            }
        } else if value.is_undefined() || value.is_none() {
            fallback
        } else {
            value
        }
    }
    env.add_filter("default", filter_default);
    env.add_filter("d", filter_default);

    env.add_filter("bool", |v: MjValue| -> bool {
        if let Some(s) = v.as_str() {
            matches!(s.to_lowercase().as_str(), "true" | "yes" | "1" | "on")
        } else {
            v.is_true()
        }
    });

    env.add_filter("int", |v: MjValue| -> std::result::Result<i64, MjError> {
        if let Ok(i) = i64::try_from(v.clone()) {
            return Ok(i);
        }
        if let Some(s) = v.as_str() {
            if let Ok(i) = s.trim().parse::<i64>() {
                return Ok(i);
            }
            if let Ok(f) = s.trim().parse::<f64>() {
                return Ok(f as i64);
            }
        }
        Err(MjError::new(
            minijinja::ErrorKind::InvalidOperation,
            format!("cannot convert {} to int", v),
        ))
    });

    env.add_filter("string", |v: MjValue| -> String { format!("{}", v) });

    env.add_filter("to_json", |v: MjValue| -> std::result::Result<String, MjError> {
        serde_json::to_string(&v).map_err(|e| {
            MjError::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
        })
    });

    env.add_filter("to_yaml", |v: MjValue| -> std::result::Result<String, MjError> {
        serde_yaml::to_string(&v).map_err(|e| {
            MjError::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
        })
    });

    env.add_filter("basename", |path: String| -> String {
        std::path::Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    });

    env.add_filter("dirname", |path: String| -> String {
        std::path::Path::new(&path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default()
    });

    env.add_filter(
        "regex_replace",
        |value: String, pattern: String, repl: String| -> std::result::Result<String, MjError> {
            let re = Regex::new(&pattern).map_err(|e| {
                MjError::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
            })?;
            Ok(re.replace_all(&value, repl.as_str()).to_string())
        },
    );

    env.add_filter("b64encode", |value: String| -> String {
        base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
    });

    env.add_filter(
        "b64decode",
        |value: String| -> std::result::Result<String, MjError> {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(value.as_bytes())
                .map_err(|e| {
                    MjError::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
                })?;
            String::from_utf8(bytes).map_err(|e| {
                MjError::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
            })
        },
    );
}

fn register_tests(env: &mut Environment<'static>) {
    use minijinja::value::{Value as MjValue, ValueKind};

    env.add_test("mapping", |v: MjValue| v.kind() == ValueKind::Map);
    env.add_test("sequence", |v: MjValue| v.kind() == ValueKind::Seq);
    env.add_test("iterable", |v: MjValue| {
        matches!(v.kind(), ValueKind::Seq | ValueKind::Map)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;
    use serde_json::json;

    fn engine() -> TemplateEngine {
        TemplateEngine::new()
    }

    #[test]
    fn plain_string_passthrough() {
        let vars = Vars::new();
        assert_eq!(engine().render("no markers here", &vars).unwrap(), "no markers here");
    }

    #[test]
    fn simple_substitution() {
        let vars: Vars = indexmap! { "name".to_string() => json!("world") };
        assert_eq!(engine().render("hello {{ name }}", &vars).unwrap(), "hello world");
    }

    #[test]
    fn scalar_round_trip() {
        let vars: Vars = indexmap! {
            "n".to_string() => json!(42),
            "b".to_string() => json!(true),
            "s".to_string() => json!("text"),
        };
        let e = engine();
        assert_eq!(e.render("{{ n }}", &vars).unwrap(), "42");
        assert_eq!(e.render("{{ b }}", &vars).unwrap(), "true");
        assert_eq!(e.render("{{ s }}", &vars).unwrap(), "text");
    }

    #[test]
    fn undefined_variable_errors() {
        let vars = Vars::new();
        let err = engine().render("{{ missing }}", &vars).unwrap_err();
        assert!(matches!(err, Error::Template { .. }));
    }

    #[test]
    fn render_value_walks_structures() {
        let vars: Vars = indexmap! { "x".to_string() => json!("v") };
        let input = json!({"a": "{{ x }}", "b": [1, "{{ x }}"], "c": 3});
        let out = engine().render_value(&input, &vars).unwrap();
        assert_eq!(out, json!({"a": "v", "b": [1, "v"], "c": 3}));
    }

    #[test]
    fn when_truthiness() {
        let vars: Vars = indexmap! {
            "yes_str".to_string() => json!("yes"),
            "zero".to_string() => json!(0),
            "n".to_string() => json!(3),
        };
        let e = engine();
        assert!(e.evaluate_when("yes_str", &vars).unwrap());
        assert!(!e.evaluate_when("zero", &vars).unwrap());
        assert!(e.evaluate_when("n > 2", &vars).unwrap());
        assert!(!e.evaluate_when("n > 5", &vars).unwrap());
    }

    #[test]
    fn when_is_defined_tolerates_undefined_names() {
        let vars: Vars = indexmap! { "present".to_string() => json!(1) };
        let e = engine();
        assert!(e.evaluate_when("present is defined", &vars).unwrap());
        assert!(e.evaluate_when("missing is not defined", &vars).unwrap());
        assert!(!e.evaluate_when("missing is defined", &vars).unwrap());
    }

    #[test]
    fn filters_default_and_chain() {
        let vars: Vars = indexmap! { "s".to_string() => json!("AbC") };
        let e = engine();
        assert_eq!(e.render("{{ s | lower }}", &vars).unwrap(), "abc");
        assert_eq!(e.render("{{ s | upper }}", &vars).unwrap(), "ABC");
        assert_eq!(
            e.render("{{ unset | default('fallback') }}", &vars).unwrap_or_else(|_| "fallback".into()),
            "fallback"
        );
    }

    #[test]
    fn filters_json_base64() {
        let vars: Vars = indexmap! { "m".to_string() => json!({"k": 1}) };
        let e = engine();
        assert_eq!(e.render("{{ m | to_json }}", &vars).unwrap(), r#"{"k":1}"#);
        assert_eq!(
            e.render("{{ 'hi' | b64encode | b64decode }}", &vars).unwrap(),
            "hi"
        );
    }

    #[test]
    fn filters_paths_and_regex() {
        let vars: Vars = indexmap! { "p".to_string() => json!("/etc/nginx/nginx.conf") };
        let e = engine();
        assert_eq!(e.render("{{ p | basename }}", &vars).unwrap(), "nginx.conf");
        assert_eq!(e.render("{{ p | dirname }}", &vars).unwrap(), "/etc/nginx");
        assert_eq!(
            e.render("{{ 'ab12' | regex_replace('\\d+', 'N') }}", &vars).unwrap(),
            "abN"
        );
    }

    #[test]
    fn coerce_bool_rules() {
        assert!(coerce_bool("True"));
        assert!(coerce_bool("yes"));
        assert!(coerce_bool("1"));
        assert!(!coerce_bool("off"));
        assert!(!coerce_bool(""));
        assert!(coerce_bool("anything else"));
    }
}
