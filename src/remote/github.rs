use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, trace};
use reqwest::{blocking::Client, StatusCode};
use serde::Deserialize;

use crate::model::{
    identity::RepositoryIdentity,
    tree::{FileHandle, TreeListing},
};

use super::{describe, RemoteApi, RemoteError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Forge REST API speaking the GitHub dialect: recursive tree listings and
/// base64 encoded blob contents.
pub struct GitHubApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ContentResponse {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

impl GitHubApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(GitHubApi {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token,
        })
    }

    pub fn tree_url(&self, identity: &RepositoryIdentity, reference: &str) -> String {
        format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.base_url, identity.owner, identity.name, reference
        )
    }

    pub fn contents_url(&self, identity: &RepositoryIdentity, path: &str, revision: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.base_url, identity.owner, identity.name, path, revision
        )
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, RemoteError> {
        trace!("GET {}", url);
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        Ok(request.send()?)
    }
}

impl RemoteApi for GitHubApi {
    fn list_tree(
        &self,
        identity: &RepositoryIdentity,
        reference: &str,
    ) -> Result<TreeListing, RemoteError> {
        let url = self.tree_url(identity, reference);
        let response = self.get(&url)?;
        match response.status() {
            StatusCode::OK => {
                let listing: TreeListing = response.json()?;
                debug!(
                    "Listed {} entries of {} ({})",
                    listing.tree.len(),
                    identity.full_name(),
                    reference
                );
                Ok(listing)
            }
            StatusCode::NOT_FOUND => Err(RemoteError::RepositoryNotFound {
                repository: identity.full_name(),
                reference: reference.to_owned(),
                url,
            }),
            status => Err(RemoteError::TreeListingFailed {
                repository: identity.full_name(),
                reference: reference.to_owned(),
                status: status.as_u16(),
                url,
            }),
        }
    }

    fn fetch(
        &self,
        identity: &RepositoryIdentity,
        handle: &FileHandle,
    ) -> Result<Vec<u8>, RemoteError> {
        let url = match handle {
            FileHandle::Object { url } => url.clone(),
            FileHandle::AtRevision { path, revision } => {
                self.contents_url(identity, path, revision)
            }
        };
        let failed = |reason: String| RemoteError::DownloadFailed {
            repository: identity.full_name(),
            location: describe(handle),
            reason,
        };

        let response = self
            .get(&url)
            .map_err(|error| failed(format!("{error}\n{url}")))?;
        if response.status() != StatusCode::OK {
            return Err(failed(format!("{}\n{}", response.status(), url)));
        }
        let content: ContentResponse = response
            .json()
            .map_err(|error| failed(format!("invalid response: {error}")))?;
        decode_content(&content).map_err(failed)
    }
}

fn decode_content(response: &ContentResponse) -> Result<Vec<u8>, String> {
    match response.encoding.as_deref() {
        None | Some("base64") => {
            let compact: String = response
                .content
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(compact)
                .map_err(|error| format!("invalid base64 content: {error}"))
        }
        Some(other) => Err(format!("unsupported content encoding `{other}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        collections::HashMap,
        io::{BufRead, BufReader, Write},
        net::TcpListener,
    };

    use pretty_assertions::assert_eq;

    use crate::model::tree::EntryKind;

    /// Serves canned `(status, body)` responses keyed by request target.
    fn serve(routes: Vec<(&str, u16, &str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let routes: HashMap<String, (u16, String)> = routes
            .into_iter()
            .map(|(target, status, body)| (target.to_owned(), (status, body.to_owned())))
            .collect();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut header = String::new();
                    if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                        break;
                    }
                }
                let target = request_line.split_whitespace().nth(1).unwrap_or_default();
                let (status, body) = routes
                    .get(target)
                    .cloned()
                    .unwrap_or((404, r#"{"message": "Not Found"}"#.to_owned()));
                write!(
                    stream,
                    "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .unwrap();
            }
        });
        format!("http://{address}")
    }

    fn widgets() -> RepositoryIdentity {
        RepositoryIdentity::from_url("https://github.com/acme/widgets.git").unwrap()
    }

    #[test]
    fn api_urls() {
        let api = GitHubApi::new("https://api.github.com/", None).unwrap();
        let identity = RepositoryIdentity::from_url("git@github.com:nf-core/modules.git").unwrap();
        assert_eq!(
            api.tree_url(&identity, "master"),
            "https://api.github.com/repos/nf-core/modules/git/trees/master?recursive=1"
        );
        assert_eq!(
            api.contents_url(&identity, "modules/fastqc/main.nf", "abc123"),
            "https://api.github.com/repos/nf-core/modules/contents/modules/fastqc/main.nf?ref=abc123"
        );
    }

    #[test]
    fn decodes_wrapped_base64() {
        let response: ContentResponse = serde_json::from_str(
            r#"{"sha": "65ba", "size": 11, "content": "aGVsbG8g\nd29ybGQ=\n", "encoding": "base64"}"#,
        )
        .unwrap();
        assert_eq!(decode_content(&response).unwrap(), b"hello world".to_vec());
    }

    #[test]
    fn rejects_unknown_encoding() {
        let response = ContentResponse {
            content: "hello".to_owned(),
            encoding: Some("utf-16".to_owned()),
        };
        assert!(decode_content(&response).is_err());
    }

    #[test]
    fn tree_listing_status_mapping() {
        let base = serve(vec![
            (
                "/repos/acme/widgets/git/trees/main?recursive=1",
                200,
                r#"{"sha": "abc", "truncated": true, "tree": [{"path": "modules/fastqc/main.nf", "type": "blob", "url": "blob-url"}]}"#,
            ),
            ("/repos/acme/widgets/git/trees/broken?recursive=1", 500, "{}"),
        ]);
        let api = GitHubApi::new(base, None).unwrap();

        // Truncation is judged by the tree snapshot, not here.
        let listing = api.list_tree(&widgets(), "main").unwrap();
        assert!(listing.truncated);
        assert_eq!(listing.tree.len(), 1);
        assert_eq!(listing.tree[0].kind, EntryKind::Blob);
        assert_eq!(listing.tree[0].url, "blob-url");

        assert!(matches!(
            api.list_tree(&widgets(), "missing").unwrap_err(),
            RemoteError::RepositoryNotFound { .. }
        ));
        assert!(matches!(
            api.list_tree(&widgets(), "broken").unwrap_err(),
            RemoteError::TreeListingFailed { status: 500, .. }
        ));
    }

    #[test]
    fn fetch_status_mapping() {
        let base = serve(vec![
            (
                "/repos/acme/widgets/contents/modules/fastqc/main.nf?ref=abc123",
                200,
                r#"{"content": "aGVsbG8g\nd29ybGQ=\n", "encoding": "base64"}"#,
            ),
            ("/blobs/forbidden", 403, r#"{"message": "rate limited"}"#),
        ]);
        let api = GitHubApi::new(base.clone(), None).unwrap();

        let handle = FileHandle::AtRevision {
            path: "modules/fastqc/main.nf".to_owned(),
            revision: "abc123".to_owned(),
        };
        assert_eq!(api.fetch(&widgets(), &handle).unwrap(), b"hello world".to_vec());

        let forbidden = FileHandle::Object {
            url: format!("{base}/blobs/forbidden"),
        };
        match api.fetch(&widgets(), &forbidden).unwrap_err() {
            RemoteError::DownloadFailed {
                location, reason, ..
            } => {
                assert_eq!(location, format!("{base}/blobs/forbidden"));
                assert!(reason.starts_with("403"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn fetch_transport_failure_names_the_file() {
        let address = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let api = GitHubApi::new(format!("http://{address}"), None).unwrap();
        let handle = FileHandle::AtRevision {
            path: "modules/fastqc/main.nf".to_owned(),
            revision: "abc123".to_owned(),
        };
        match api.fetch(&widgets(), &handle).unwrap_err() {
            RemoteError::DownloadFailed { location, .. } => {
                assert_eq!(location, "modules/fastqc/main.nf@abc123");
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
