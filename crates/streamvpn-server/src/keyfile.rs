// ============================================
// File: crates/streamvpn-server/src/keyfile.rs
// ============================================
//! # Keyfile
//!
//! ## Creation Reason
//! Maps a client-asserted identity to a pre-shared secret. The handshake
//! consults it on every connection, but the result does not yet gate
//! anything.
//!
//! ## File Format
//! ```text
//! # identity   secret
//! tun0         0f1e2d3c4b5a
//! laptop-7     correct-horse
//! ```
//! One entry per line, whitespace separated. Blank lines and lines
//! starting with `#` are ignored. Extra fields after the secret are
//! rejected.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Secrets are zeroized on drop and must never be logged
//! - Duplicate identities: the last entry wins (a warning is logged)
//!
//! ## Last Modified
//! v0.1.0 - Initial keyfile parser

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{Result, ServerError};

/// Outcome of a keyfile lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLookup<'a> {
    /// The identity has an entry.
    Found(&'a str),
    /// No entry for the identity.
    NotFound,
}

impl KeyLookup<'_> {
    /// Returns `true` if an entry was found.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Parsed keyfile contents.
#[derive(Default)]
pub struct Keyfile {
    entries: HashMap<String, Zeroizing<String>>,
}

impl Keyfile {
    /// Creates an empty keyfile; every lookup misses.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads and parses the keyfile at `path`.
    ///
    /// # Errors
    /// Returns `Keyfile` if the file cannot be read or a line is malformed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let content = Zeroizing::new(
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ServerError::keyfile(&path_str, e.to_string()))?,
        );

        let keyfile = Self::parse(&content).map_err(|reason| ServerError::keyfile(&path_str, reason))?;
        info!(path = %path_str, entries = keyfile.len(), "Keyfile loaded");
        Ok(keyfile)
    }

    /// Parses keyfile text.
    ///
    /// # Errors
    /// Returns the reason (with 1-based line number) for the first
    /// malformed line.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut entries = HashMap::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(identity), Some(secret), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(format!(
                    "line {}: expected '<identity> <secret>'",
                    index + 1
                ));
            };

            if entries
                .insert(identity.to_string(), Zeroizing::new(secret.to_string()))
                .is_some()
            {
                warn!(identity, line = index + 1, "Duplicate keyfile entry, later one wins");
            }
        }

        Ok(Self { entries })
    }

    /// Looks up the secret for `identity`.
    #[must_use]
    pub fn lookup(&self, identity: &str) -> KeyLookup<'_> {
        self.entries
            .get(identity)
            .map_or(KeyLookup::NotFound, |secret| KeyLookup::Found(secret.as_str()))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Keyfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyfile")
            .field("entries", &self.entries.len())
            .finish()
    }
}
