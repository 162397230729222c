//! Source repository push
//!
//! A push adds files as new blobs and one commit on top of the branch tip,
//! then moves the branch. It never rolls back a local build; failures are
//! reported alongside the successful build.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use blockyard_types::RepositoryLink;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("no credentials configured for repository push")]
    MissingCredentials,

    #[error("invalid repository '{0}', expected owner/name")]
    InvalidRepository(String),

    #[error("repository API returned HTTP {status} for {url}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("repository request failed: {0}")]
    Request(String),

    #[error("unexpected repository response: {0}")]
    InvalidResponse(String),
}

pub type PushResult<T> = Result<T, PushError>;

/// File to commit, path relative to the repository root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFile {
    pub path: String,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Commit `files` onto the link's default branch and return the commit id
    async fn push(
        &self,
        link: &RepositoryLink,
        message: &str,
        files: &[PushFile],
    ) -> PushResult<String>;
}

#[derive(Debug, Deserialize)]
struct RefObject {
    object: ShaRef,
}

#[derive(Debug, Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitObject {
    tree: ShaRef,
}

/// GitHub git-data API client
#[derive(Debug, Clone)]
pub struct GitHubRepository {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubRepository {
    pub fn new(api_base: &str, token: Option<String>, timeout: Duration) -> PushResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("blockyard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PushError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, url: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
    ) -> PushResult<T> {
        let token = self.token.as_deref().ok_or(PushError::MissingCredentials)?;
        let mut request = self.request(method, &url, token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PushError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Http {
                url,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PushError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl SourceRepository for GitHubRepository {
    async fn push(
        &self,
        link: &RepositoryLink,
        message: &str,
        files: &[PushFile],
    ) -> PushResult<String> {
        if self.token.is_none() {
            return Err(PushError::MissingCredentials);
        }
        let repo = link.full_name.trim_matches('/');
        if repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(PushError::InvalidRepository(link.full_name.clone()));
        }
        let base = format!("{}/repos/{}/git", self.api_base, repo);
        let branch = &link.default_branch;

        let head: RefObject = self
            .call(Method::GET, format!("{}/ref/heads/{}", base, branch), None)
            .await?;
        let parent: CommitObject = self
            .call(
                Method::GET,
                format!("{}/commits/{}", base, head.object.sha),
                None,
            )
            .await?;

        let mut tree = Vec::with_capacity(files.len());
        for file in files {
            let blob: ShaRef = self
                .call(
                    Method::POST,
                    format!("{}/blobs", base),
                    Some(json!({
                        "content": BASE64.encode(&file.content),
                        "encoding": "base64",
                    })),
                )
                .await?;
            debug!(path = %file.path, sha = %blob.sha, "Blob created");
            tree.push(json!({
                "path": file.path,
                "mode": "100644",
                "type": "blob",
                "sha": blob.sha,
            }));
        }

        let new_tree: ShaRef = self
            .call(
                Method::POST,
                format!("{}/trees", base),
                Some(json!({ "base_tree": parent.tree.sha, "tree": tree })),
            )
            .await?;
        let commit: ShaRef = self
            .call(
                Method::POST,
                format!("{}/commits", base),
                Some(json!({
                    "message": message,
                    "tree": new_tree.sha,
                    "parents": [head.object.sha],
                })),
            )
            .await?;
        let _: Value = self
            .call(
                Method::PATCH,
                format!("{}/refs/heads/{}", base, branch),
                Some(json!({ "sha": commit.sha, "force": false })),
            )
            .await?;

        info!(repository = repo, branch = %branch, commit = %commit.sha, "Build pushed");
        Ok(commit.sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::routing::{get, patch, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<String>>>;

    async fn serve(calls: Calls) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let git = "/repos/acme/lobby/git";
        let app = Router::new()
            .route(
                &format!("{git}/ref/heads/main"),
                get(|| async { Json(json!({ "object": { "sha": "head" } })) }),
            )
            .route(
                &format!("{git}/commits/head"),
                get(|| async { Json(json!({ "tree": { "sha": "tree0" } })) }),
            )
            .route(
                &format!("{git}/blobs"),
                post(|State(calls): State<Calls>, Json(body): Json<Value>| async move {
                    calls.lock().unwrap().push(format!("blob:{}", body["encoding"]));
                    Json(json!({ "sha": "blob" }))
                }),
            )
            .route(
                &format!("{git}/trees"),
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["base_tree"], "tree0");
                    Json(json!({ "sha": "tree1" }))
                }),
            )
            .route(
                &format!("{git}/commits"),
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["parents"][0], "head");
                    Json(json!({ "sha": "commit1" }))
                }),
            )
            .route(
                &format!("{git}/refs/heads/main"),
                patch(|State(calls): State<Calls>, Json(body): Json<Value>| async move {
                    calls.lock().unwrap().push(format!("ref:{}", body["sha"]));
                    Json(json!({ "object": { "sha": "commit1" } }))
                }),
            )
            .with_state(calls);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    fn link() -> RepositoryLink {
        RepositoryLink {
            url: "https://github.com/acme/lobby".into(),
            full_name: "acme/lobby".into(),
            default_branch: "main".into(),
        }
    }

    #[tokio::test]
    async fn test_push_creates_commit_on_branch_tip() {
        let calls = Calls::default();
        let base = serve(calls.clone()).await;
        let repo =
            GitHubRepository::new(&base, Some("t".into()), Duration::from_secs(5)).unwrap();

        let files = vec![
            PushFile {
                path: "manifests/abc.json".into(),
                content: b"{}".to_vec(),
            },
            PushFile {
                path: "dist/lobby-abc.zip".into(),
                content: b"PK".to_vec(),
            },
        ];
        let commit = repo.push(&link(), "Build abc", &files).await.unwrap();

        assert_eq!(commit, "commit1");
        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec!["blob:\"base64\"", "blob:\"base64\"", "ref:\"commit1\""]
        );
    }

    #[tokio::test]
    async fn test_push_without_token_fails() {
        let repo =
            GitHubRepository::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
        let err = repo.push(&link(), "m", &[]).await.unwrap_err();
        assert!(matches!(err, PushError::MissingCredentials));
    }
}
