mod git;
mod github;

pub use github::GitHubApi;

use thiserror::Error;

use crate::model::{
    identity::RepositoryIdentity,
    tree::{FileHandle, TreeListing},
};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Repository or branch not found: {repository} ({reference})\n{url}")]
    RepositoryNotFound {
        repository: String,
        reference: String,
        url: String,
    },
    #[error("Could not fetch the tree of {repository} ({reference}): {status}\n{url}")]
    TreeListingFailed {
        repository: String,
        reference: String,
        status: u16,
        url: String,
    },
    #[error("Could not download {location} from {repository}: {reason}")]
    DownloadFailed {
        repository: String,
        location: String,
        reason: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

/// Source of tree listings and file contents for one repository.
pub trait RemoteApi {
    /// Recursive listing of the tree at `reference`.
    fn list_tree(
        &self,
        identity: &RepositoryIdentity,
        reference: &str,
    ) -> Result<TreeListing, RemoteError>;

    /// Raw content of the file a handle points to.
    fn fetch(&self, identity: &RepositoryIdentity, handle: &FileHandle)
        -> Result<Vec<u8>, RemoteError>;
}

fn describe(handle: &FileHandle) -> String {
    match handle {
        FileHandle::Object { url } => url.clone(),
        FileHandle::AtRevision { path, revision } => format!("{path}@{revision}"),
    }
}
