//! Users that face recognition can resolve to.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::CamwatchError;

/// Placeholder for secret fields once an identity leaves the lookup layer.
pub const REDACTED: &str = "*****";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Identity {
    pub fn new(user_id: u64, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Copy with every secret field masked.
    pub fn redacted(&self) -> Self {
        Self {
            user_id: self.user_id,
            name: self.name.clone(),
            secret: self.secret.as_ref().map(|_| REDACTED.to_string()),
        }
    }
}

/// Authenticated identity slot shared between the capture thread and callers.
pub type SharedIdentity = Arc<Mutex<Option<Identity>>>;

/// Resolves recognized names to users.
pub trait UserDirectory: Send + Sync {
    /// `Ok(None)` when no user has this name. Errors are lookup failures.
    fn find_by_name(&self, name: &str) -> Result<Option<Identity>>;
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: HashMap<String, Identity>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = Identity>) -> Self {
        let mut directory = Self::new();
        for user in users {
            directory.insert(user);
        }
        directory
    }

    pub fn insert(&mut self, identity: Identity) {
        self.users.insert(identity.name.clone(), identity);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_by_name(&self, name: &str) -> Result<Option<Identity>> {
        Ok(self.users.get(name).cloned())
    }
}

/// Directory backed by a JSON array of users, re-read on every lookup so edits apply
/// without a restart.
#[derive(Debug, Clone)]
pub struct JsonUserDirectory {
    path: PathBuf,
}

impl JsonUserDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<InMemoryUserDirectory> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read users file {}", self.path.display()))?;
        let users: Vec<Identity> = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid users file {}: {}", self.path.display(), e))?;
        Ok(InMemoryUserDirectory::with_users(users))
    }
}

impl UserDirectory for JsonUserDirectory {
    fn find_by_name(&self, name: &str) -> Result<Option<Identity>> {
        let directory = self
            .load()
            .map_err(|err| CamwatchError::lookup(format!("{:#}", err)))?;
        directory.find_by_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn redaction_masks_secrets_only() {
        let alice = Identity::new(7, "alice").with_secret("hunter2");
        let shown = alice.redacted();
        assert_eq!(shown.user_id, 7);
        assert_eq!(shown.name, "alice");
        assert_eq!(shown.secret.as_deref(), Some(REDACTED));
        assert_eq!(Identity::new(8, "bob").redacted().secret, None);
    }

    #[test]
    fn json_directory_reads_users() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"[{{"user_id": 1, "name": "alice", "secret": "pw"}}, {{"user_id": 2, "name": "bob"}}]"#
        )?;
        let directory = JsonUserDirectory::new(file.path());
        assert_eq!(directory.find_by_name("bob")?, Some(Identity::new(2, "bob")));
        assert_eq!(directory.find_by_name("carol")?, None);
        Ok(())
    }

    #[test]
    fn missing_users_file_is_a_lookup_error() {
        let directory = JsonUserDirectory::new("/nonexistent/users.json");
        let err = directory.find_by_name("alice").unwrap_err();
        assert!(matches!(
            crate::error::category(&err),
            Some(CamwatchError::Lookup(_))
        ));
    }
}
