//! GitLab repository tags API implementation

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::discovery::error::TagError;
use crate::discovery::tags::TagDiscovery;
use crate::version::semver::SemVer;

/// Default base URL for the GitLab API
pub const DEFAULT_BASE_URL: &str = "https://gitlab.com/api/v4";

/// Response item from the GitLab tags API
#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Tag discovery backed by `GET /projects/{id}/repository/tags`
pub struct GitLabTags {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl GitLabTags {
    pub fn new(
        base_url: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TagError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent("version-service")
                .timeout(timeout)
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.filter(|token| !token.is_empty()),
        })
    }
}

/// Pick the highest tag that parses as a version, tolerating a `v` prefix
fn find_latest_version(tags: &[Tag]) -> Option<String> {
    tags.iter()
        .filter_map(|tag| {
            let stripped = tag.name.strip_prefix('v').unwrap_or(&tag.name);
            SemVer::parse(stripped).ok().map(|parsed| (stripped, parsed))
        })
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(stripped, _)| stripped.to_string())
}

#[async_trait::async_trait]
impl TagDiscovery for GitLabTags {
    async fn latest_tag(&self, group_id: &str) -> Result<Option<String>, TagError> {
        let Some(token) = &self.access_token else {
            debug!("GitLab access token not configured, skipping tag lookup");
            return Ok(None);
        };

        let url = format!("{}/projects/{}/repository/tags", self.base_url, group_id);

        let response = self
            .client
            .get(&url)
            .header("PRIVATE-TOKEN", token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("GitLab project {} not found", group_id);
            return Ok(None);
        }

        if !status.is_success() {
            warn!("GitLab API returned status {}: {}", status, url);
            return Err(TagError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let tags: Vec<Tag> = response.json().await.map_err(|e| {
            warn!("Failed to parse GitLab tags response: {}", e);
            TagError::InvalidResponse(e.to_string())
        })?;

        let latest = find_latest_version(&tags);
        match &latest {
            Some(version) => info!("Found latest tag {} for project {}", version, group_id),
            None => debug!("No version tags found for project {}", group_id),
        }

        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use rstest::rstest;

    fn tags(names: &[&str]) -> Vec<Tag> {
        names
            .iter()
            .map(|n| Tag {
                name: n.to_string(),
            })
            .collect()
    }

    #[rstest]
    #[case(&["v1.0.0", "v1.2.0", "v1.1.9"], Some("1.2.0"))]
    #[case(&["2.0.0-rc1", "2.0.0", "release-3"], Some("2.0.0"))]
    #[case(&["2.0.0-beta", "2.0.0-alpha"], Some("2.0.0-beta"))]
    #[case(&["latest", "stable"], None)]
    #[case(&[], None)]
    fn find_latest_version_picks_highest(#[case] names: &[&str], #[case] expected: Option<&str>) {
        assert_eq!(
            find_latest_version(&tags(names)),
            expected.map(|s| s.to_string())
        );
    }

    fn client(url: &str, token: Option<&str>) -> GitLabTags {
        GitLabTags::new(url, token.map(String::from), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn latest_tag_returns_highest_semver_tag() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/projects/5678/repository/tags")
            .match_header("PRIVATE-TOKEN", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"name": "v3.1.0", "commit": {"id": "a"}},
                    {"name": "v3.10.0", "commit": {"id": "b"}},
                    {"name": "nightly", "commit": {"id": "c"}}
                ]"#,
            )
            .create_async()
            .await;

        let result = client(&server.url(), Some("secret"))
            .latest_tag("5678")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, Some("3.10.0".to_string()));
    }

    #[tokio::test]
    async fn latest_tag_returns_none_for_unknown_project() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/projects/404/repository/tags")
            .with_status(404)
            .with_body(r#"{"message": "404 Project Not Found"}"#)
            .create_async()
            .await;

        let result = client(&server.url(), Some("secret"))
            .latest_tag("404")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn latest_tag_errors_on_server_failure() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/projects/1/repository/tags")
            .with_status(500)
            .create_async()
            .await;

        let result = client(&server.url(), Some("secret")).latest_tag("1").await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(TagError::UnexpectedStatus { status: 500 })
        ));
    }

    #[tokio::test]
    async fn latest_tag_skips_request_without_token() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let result = client(&server.url(), None).latest_tag("1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn latest_tag_rejects_malformed_body() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/projects/1/repository/tags")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let result = client(&server.url(), Some("secret")).latest_tag("1").await;

        assert!(matches!(result, Err(TagError::InvalidResponse(_))));
    }
}
