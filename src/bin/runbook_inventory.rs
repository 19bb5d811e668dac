//! runbook-inventory - inspect an inventory source.
//!
//! `--list` emits the full inventory as JSON with `_meta.hostvars`,
//! `--host <name>` emits one host's variables, `--graph` prints the group
//! tree rooted at `@all`.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use runbook::inventory::InventoryManager;
use runbook::vault::{VaultLib, VaultSecret};

#[derive(Parser, Debug)]
#[command(
    name = "runbook-inventory",
    version,
    about = "Show inventory information",
    after_help = "Examples:\n  runbook-inventory -i inventory.ini --list\n  runbook-inventory -i hosts --host web01\n  runbook-inventory -i inventory/ --graph"
)]
struct Cli {
    /// Inventory file or directory
    #[arg(short = 'i', long = "inventory")]
    inventory: PathBuf,

    /// Output all hosts and groups as JSON
    #[arg(long = "list", conflicts_with_all = ["host", "graph"])]
    list: bool,

    /// Output one host's variables as JSON
    #[arg(long = "host", conflicts_with = "graph")]
    host: Option<String>,

    /// Output the inventory graph
    #[arg(long = "graph")]
    graph: bool,

    /// File holding the at-rest-secret passphrase
    #[arg(long = "vault-password-file")]
    vault_password_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut vault = VaultLib::new();
    if let Some(path) = &cli.vault_password_file {
        vault.add_secret(VaultSecret::from_file(path)?);
    }

    let inventory = match InventoryManager::parse(&cli.inventory, &vault).await {
        Ok(inventory) => inventory,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    if cli.list {
        println!("{}", serde_json::to_string_pretty(&inventory.to_list_json())?);
        return Ok(());
    }

    if let Some(host) = &cli.host {
        if inventory.get_host(host).is_none() {
            eprintln!("ERROR: Host '{}' not found in inventory", host);
            std::process::exit(1);
        }
        let vars: serde_json::Map<String, serde_json::Value> =
            inventory.get_host_vars(host).into_iter().collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::Value::Object(vars))?
        );
        return Ok(());
    }

    if cli.graph {
        print!("{}", inventory.to_graph());
        return Ok(());
    }

    // No action: default to --list, matching the reference tool
    println!("{}", serde_json::to_string_pretty(&inventory.to_list_json())?);
    Ok(())
}
