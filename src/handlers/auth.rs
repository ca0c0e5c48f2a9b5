use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::capture::FrameHandler;
use crate::face::{IdentityPredictor, UNKNOWN_LABEL};
use crate::frame::Frame;
use crate::identity::{SharedIdentity, UserDirectory};

/// Face-recognition voting.
///
/// Every frame's recognized names each get one vote. The moment a name's tally reaches the
/// threshold it is looked up once; a found user becomes the authenticated identity (redacted)
/// and later frames are ignored. A failed lookup is not retried within the attempt.
pub struct AuthenticationHandler {
    predictor: Arc<dyn IdentityPredictor>,
    users: Arc<dyn UserDirectory>,
    threshold: u32,
    identity: SharedIdentity,
    tally: HashMap<String, u32>,
}

impl AuthenticationHandler {
    pub fn new(
        predictor: Arc<dyn IdentityPredictor>,
        users: Arc<dyn UserDirectory>,
        threshold: u32,
        identity: SharedIdentity,
    ) -> Self {
        Self {
            predictor,
            users,
            threshold: threshold.max(1),
            identity,
            tally: HashMap::new(),
        }
    }

    pub fn votes(&self, name: &str) -> u32 {
        self.tally.get(name).copied().unwrap_or(0)
    }

    /// Start a new attempt: forget every vote.
    pub fn reset(&mut self) {
        self.tally.clear();
    }

    fn is_resolved(&self) -> Result<bool> {
        let guard = self
            .identity
            .lock()
            .map_err(|_| anyhow!("identity lock poisoned"))?;
        Ok(guard.is_some())
    }

    fn resolve(&self, name: &str) -> Result<bool> {
        let user = match self.users.find_by_name(name) {
            Ok(Some(user)) => user,
            Ok(None) => {
                log::info!("recognized '{}' has no matching user", name);
                return Ok(false);
            }
            Err(err) => {
                log::warn!("user lookup for '{}' failed: {:#}", name, err);
                return Ok(false);
            }
        };
        log::info!("user {} authenticated", user.name);
        let mut guard = self
            .identity
            .lock()
            .map_err(|_| anyhow!("identity lock poisoned"))?;
        *guard = Some(user.redacted());
        Ok(true)
    }
}

impl FrameHandler for AuthenticationHandler {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn handle(&mut self, frame: &mut Frame, _now: Instant) -> Result<()> {
        if self.is_resolved()? {
            return Ok(());
        }
        for name in self.predictor.predict_identities(frame)? {
            if name == UNKNOWN_LABEL {
                continue;
            }
            let votes = self.tally.entry(name.clone()).or_insert(0);
            *votes += 1;
            log::debug!("'{}' has {} votes", name, votes);
            if *votes == self.threshold && self.resolve(&name)? {
                break;
            }
        }
        Ok(())
    }
}
