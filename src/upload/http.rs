use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::Duration;

use super::store::RemoteStore;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// PUTs each file to `<base_url>/<file name>`. The response body, trimmed, is the remote id.
pub struct HttpStore {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(UPLOAD_TIMEOUT).build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }
}

impl RemoteStore for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    fn upload_file(&self, path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("upload path {} has no file name", path.display()))?;
        let bytes =
            std::fs::read(path).with_context(|| format!("read upload {}", path.display()))?;
        let url = format!("{}/{}", self.base_url, file_name);
        let response = self
            .agent
            .put(&url)
            .set("Content-Type", "image/gif")
            .send_bytes(&bytes)
            .with_context(|| format!("upload {} to {}", file_name, url))?;
        let body = response
            .into_string()
            .with_context(|| format!("read upload response from {}", url))?;
        let remote_id = body.trim();
        Ok(if remote_id.is_empty() {
            url
        } else {
            remote_id.to_string()
        })
    }
}
