//! # Runbook - a playbook-compatible configuration management orchestrator
//!
//! Runbook reads a declarative playbook and an inventory, opens connections
//! to the targeted hosts (local, SSH, WinRM), and executes an ordered
//! sequence of tasks across those hosts with bounded parallelism,
//! idempotent modules, conditionals, loops, handlers and block-level
//! failure isolation. It consumes the same on-disk file shapes as the
//! well-known playbook runtime it re-implements.
//!
//! ## Core concepts
//!
//! - **Playbooks**: YAML files of plays; each play binds a host pattern to
//!   an ordered task list plus handlers
//! - **Inventory**: hosts and groups from INI/YAML/JSON files, directories,
//!   or dynamic scripts
//! - **Modules**: the leaves that perform the actual work on targets
//! - **Connections**: the transport layer (local, SSH, WinRM)
//! - **Handlers**: tasks triggered at most once per host when notified
//!
//! ## Quick example
//!
//! ```rust,ignore
//! use runbook::runner::{Runner, RunnerOptions};
//!
//! let options = RunnerOptions {
//!     inventory: "inventory.ini".into(),
//!     playbooks: vec!["site.yml".into()],
//!     forks: 10,
//!     ..Default::default()
//! };
//! std::process::exit(Runner::new(options)?.run());
//! ```

#![warn(clippy::all)]

/// Error types and exit-code mapping.
pub mod error;

/// Variable layering and precedence.
pub mod vars;

/// Jinja-compatible template engine with the fixed filter set.
pub mod template;

/// At-rest-secret (vault) decryption and encryption.
pub mod vault;

/// Task/play/run result aggregation and machine output.
pub mod results;

/// Host and group inventory management and pattern resolution.
pub mod inventory;

/// Playbook parsing and lowering (roles, includes, blocks).
pub mod playbook;

/// Role loading.
pub mod roles;

/// Task and role inclusion.
pub mod include;

/// Connection layer: local, SSH and WinRM transports.
pub mod connection;

/// Module contract, argument helpers and the static registry.
pub mod modules;

/// The linear-strategy execution engine.
pub mod executor;

/// Reporting seam: human console output vs silent JSON.
pub mod callback;

/// The runner facade wiring everything together.
pub mod runner;

/// Configuration file support.
pub mod config;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
