//! HTTP-backed sessions for website publish targets.

use std::sync::Arc;

use reqwest::{Client, Url};

use crate::{
    application::publish::{CmsClient, CmsError, GitHost, Integrations},
    domain::targets::{CmsTarget, GitTarget},
};

use super::{ghost::GhostClient, github::GitHubClient};

/// Builds clients that share one connection pool.
pub struct HttpIntegrations {
    client: Client,
    github_api: Url,
}

impl HttpIntegrations {
    pub fn new(client: Client, github_api: Url) -> Self {
        Self { client, github_api }
    }
}

impl Integrations for HttpIntegrations {
    fn cms_client(&self, target: &CmsTarget) -> Result<Arc<dyn CmsClient>, CmsError> {
        let client = GhostClient::new(self.client.clone(), target)?;
        Ok(Arc::new(client))
    }

    fn git_host(&self, target: &GitTarget) -> Arc<dyn GitHost> {
        Arc::new(GitHubClient::new(
            self.client.clone(),
            self.github_api.clone(),
            target.api_key.clone(),
        ))
    }
}
