//! # Credential Persistence
//!
//! Tokens survive restarts in a per-database file so a reconnecting client
//! presents the identity it was issued rather than minting a new one.
//!
//! The format is deliberately plain: `{dir}/{database}.creds` holding
//! `identity\ntoken` in UTF-8. The default directory is
//! `$HOME/.spacetimedb_client_credentials`, or the literal directory name
//! in the working directory when `HOME` is unset.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// One database's saved identity and token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Hex-rendered identity.
    pub identity: String,
    /// Bearer token.
    pub token: String,
}

/// The default credentials directory.
pub fn default_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".spacetimedb_client_credentials"),
        None => PathBuf::from(".spacetimedb_client_credentials"),
    }
}

fn file_path(dir: &Path, database: &str) -> PathBuf {
    dir.join(format!("{database}.creds"))
}

/// Saves credentials for a database, creating the directory if needed.
pub fn save(dir: &Path, database: &str, creds: &Credentials) -> Result<()> {
    fs::create_dir_all(dir)?;
    let path = file_path(dir, database);
    fs::write(&path, format!("{}\n{}", creds.identity, creds.token))?;
    debug!(path = %path.display(), "saved credentials");
    Ok(())
}

/// Loads credentials for a database. A missing file is `Ok(None)`.
pub fn load(dir: &Path, database: &str) -> Result<Option<Credentials>> {
    let path = file_path(dir, database);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let (identity, token) = text.split_once('\n').ok_or_else(|| {
        Error::InvalidResponse(format!("malformed credentials file {}", path.display()))
    })?;
    Ok(Some(Credentials {
        identity: identity.to_string(),
        token: token.trim_end_matches('\n').to_string(),
    }))
}

/// Deletes a database's credentials. Deleting what does not exist is fine.
pub fn delete(dir: &Path, database: &str) -> Result<()> {
    match fs::remove_file(file_path(dir, database)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
