//! Windows module variants, executed over the WinRM connection as
//! PowerShell.

pub mod win_command;
pub mod win_copy;
pub mod win_file;
pub mod win_service;
pub mod win_user;

/// Escapes a string for a single-quoted PowerShell literal.
pub(crate) fn ps_quote(s: &str) -> String {
    s.replace('\'', "''")
}
