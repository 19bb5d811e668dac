//! Inventory integration: files on disk, vars directories, dynamic
//! scripts, and the inventory tool output.

use std::path::Path;

use runbook::inventory::InventoryManager;
use runbook::vault::{VaultLib, VaultSecret};

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn range_with_difference_pattern() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "hosts.ini", "[web]\nweb[01:03]\n\n[db]\ndb1\n");

    let vault = VaultLib::new();
    let inv = InventoryManager::parse(&dir.path().join("hosts.ini"), &vault)
        .await
        .unwrap();

    let names: Vec<&str> = inv
        .get_hosts("web:!web02")
        .iter()
        .map(|h| h.name.as_str())
        .collect();
    assert_eq!(names, vec!["web01", "web03"]);
}

#[tokio::test]
async fn directory_source_is_order_independent() {
    // The same hosts split across files must resolve identically
    // regardless of file naming, thanks to the sorted-listing rule.
    async fn build(file_a: &str, file_b: &str) -> Vec<String> {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), file_a, "[web]\nweb01\nweb02\n");
        write(dir.path(), file_b, "[db]\ndb1\n\n[site:children]\nweb\ndb\n");
        let vault = VaultLib::new();
        let inv = InventoryManager::parse(dir.path(), &vault).await.unwrap();
        let mut names: Vec<String> = inv
            .get_hosts("site")
            .iter()
            .map(|h| h.name.clone())
            .collect();
        names.sort();
        names
    }

    let forward = build("01-web.ini", "02-db.ini").await;
    let reversed = build("02-web.ini", "01-db.ini").await;
    assert_eq!(forward, reversed);
}

#[tokio::test]
async fn group_vars_and_host_vars_directories() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "hosts.ini", "[web]\nweb01\nweb02\n");
    write(dir.path(), "group_vars/web.yml", "tier: frontend\nport: 80\n");
    write(dir.path(), "host_vars/web01.yml", "port: 8080\n");

    let vault = VaultLib::new();
    let inv = InventoryManager::parse(&dir.path().join("hosts.ini"), &vault)
        .await
        .unwrap();

    let web01 = inv.get_host_vars("web01");
    assert_eq!(web01["tier"], serde_json::json!("frontend"));
    // host_vars override group_vars
    assert_eq!(web01["port"], serde_json::json!(8080));

    let web02 = inv.get_host_vars("web02");
    assert_eq!(web02["port"], serde_json::json!(80));
}

#[tokio::test]
async fn vault_encrypted_group_vars_are_decrypted() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "hosts.ini", "[web]\nweb01\n");

    let mut vault = VaultLib::new();
    vault.add_secret(VaultSecret::new("pw"));
    let blob = vault.encrypt(b"api_key: sekrit\n").unwrap();
    write(dir.path(), "group_vars/web.yml", &blob);

    let inv = InventoryManager::parse(&dir.path().join("hosts.ini"), &vault)
        .await
        .unwrap();
    assert_eq!(
        inv.get_host_vars("web01")["api_key"],
        serde_json::json!("sekrit")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn dynamic_inventory_script() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("inventory.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\nif [ \"$1\" = \"--list\" ]; then\n  echo '{\"group\": [\"h1\", \"h2\"]}'\nfi\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let vault = VaultLib::new();
    let inv = InventoryManager::parse(&script, &vault).await.unwrap();

    assert_eq!(inv.get_hosts("group").len(), 2);
    assert_eq!(inv.get_hosts("all").len(), 2);
    assert!(inv.get_host("h1").unwrap().in_group("group"));
}

#[cfg(unix)]
#[tokio::test]
async fn failing_dynamic_inventory_is_an_error() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("broken.sh");
    std::fs::write(&script, "#!/bin/sh\nexit 3\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let vault = VaultLib::new();
    let err = InventoryManager::parse(&script, &vault).await.unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn list_json_and_graph_output() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "hosts.ini",
        "[web]\nweb01 ansible_user=deploy\n\n[site:children]\nweb\n",
    );

    let vault = VaultLib::new();
    let inv = InventoryManager::parse(&dir.path().join("hosts.ini"), &vault)
        .await
        .unwrap();

    let doc = inv.to_list_json();
    assert_eq!(
        doc["_meta"]["hostvars"]["web01"]["ansible_user"],
        serde_json::json!("deploy")
    );
    assert_eq!(doc["web"]["hosts"], serde_json::json!(["web01"]));

    let graph = inv.to_graph();
    assert!(graph.starts_with("@all:"));
    assert!(graph.contains("@site:"));
    assert!(graph.contains("web01"));
}
