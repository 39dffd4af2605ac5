//! GitHub REST adapter for single issue lookups.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use xref_core::ResolvedSecondary;
use xref_http::{classify_status, HttpClientConfig, ResponseClass};

use crate::{LookupError, SecondaryTracker};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct GithubIssue {
    id: u64,
    number: u64,
    title: String,
    state: String,
    html_url: String,
}

impl From<GithubIssue> for ResolvedSecondary {
    fn from(issue: GithubIssue) -> Self {
        Self {
            id: issue.id,
            number: issue.number,
            title: issue.title,
            status: issue.state.to_lowercase(),
            url: issue.html_url,
        }
    }
}

/// Map one HTTP response onto a lookup result.
async fn read_issue(resp: reqwest::Response) -> Result<ResolvedSecondary, LookupError> {
    let status = resp.status();
    match classify_status(status) {
        ResponseClass::Success => {
            let issue: GithubIssue = resp
                .json()
                .await
                .map_err(|e| LookupError::Transport(format!("decoding issue: {e}")))?;
            Ok(issue.into())
        }
        ResponseClass::NotFound => Err(LookupError::NotFound),
        ResponseClass::RateLimited => Err(LookupError::RateLimited),
        ResponseClass::Failed => Err(LookupError::Transport(format!(
            "http status {} for {}",
            status.as_u16(),
            resp.url()
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct GithubAdapter {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubAdapter {
    pub fn new(
        token: Option<String>,
        base_url: impl Into<String>,
        http: &HttpClientConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: xref_http::build_client(http)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn issue_url(&self, repository: &str, number: u64) -> String {
        format!("{}/repos/{repository}/issues/{number}", self.base_url)
    }
}

#[async_trait]
impl SecondaryTracker for GithubAdapter {
    async fn lookup(
        &self,
        repository: &str,
        number: u64,
    ) -> Result<ResolvedSecondary, LookupError> {
        let url = self.issue_url(repository, number);
        debug!(%url, "github lookup");
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        read_issue(resp).await
    }
}
