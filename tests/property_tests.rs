//! Property-based checks for the quantified invariants: range expansion,
//! template round-trips, and vault round-trips.

use proptest::prelude::*;

use runbook::inventory::expand_host_range;
use runbook::template::TemplateEngine;
use runbook::vars::Vars;
use runbook::vault::{VaultLib, VaultSecret};

proptest! {
    #[test]
    fn range_expansion_counts_and_padding(start in 0u32..50, len in 0u32..30, width in 1usize..4) {
        let end = start + len;
        let pattern = format!("web[{:0w$}:{:0w$}].example.com", start, end, w = width);
        let expanded = expand_host_range(&pattern).unwrap();

        prop_assert_eq!(expanded.len() as u32, len + 1);
        for (i, name) in expanded.iter().enumerate() {
            let expected = format!("web{:0w$}.example.com", start + i as u32, w = width);
            prop_assert_eq!(name, &expected);
        }
    }

    #[test]
    fn inverted_ranges_always_error(start in 1u32..100, delta in 1u32..50) {
        let pattern = format!("h[{}:{}]", start + delta, start);
        prop_assert!(expand_host_range(&pattern).is_err());
    }

    #[test]
    fn template_scalar_round_trip(n in any::<i64>()) {
        let engine = TemplateEngine::new();
        let mut vars = Vars::new();
        vars.insert("x".to_string(), serde_json::json!(n));
        let rendered = engine.render("{{ x }}", &vars).unwrap();
        prop_assert_eq!(rendered, n.to_string());
    }

    #[test]
    fn template_passthrough_without_markers(s in "[a-zA-Z0-9 ,.:/_-]{0,60}") {
        let engine = TemplateEngine::new();
        let rendered = engine.render(&s, &Vars::new()).unwrap();
        prop_assert_eq!(rendered, s);
    }

    #[test]
    fn vault_round_trip_arbitrary_bytes(data in proptest::collection::vec(any::<u8>(), 0..512), password in "[a-zA-Z0-9]{1,24}") {
        let mut vault = VaultLib::new();
        vault.add_secret(VaultSecret::new(password));
        let blob = vault.encrypt(&data).unwrap();
        let decrypted = vault.decrypt(&blob).unwrap();
        prop_assert_eq!(decrypted, data);
    }
}

#[test]
fn template_string_round_trip() {
    let engine = TemplateEngine::new();
    let mut vars = Vars::new();
    vars.insert("v".to_string(), serde_json::json!("plain value"));
    assert_eq!(engine.render("{{ v }}", &vars).unwrap(), "plain value");
}
