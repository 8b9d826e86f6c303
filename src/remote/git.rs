use git2::{ObjectType, Oid, TreeWalkMode, TreeWalkResult};

use crate::{
    git::repository::CachedRepository,
    model::{
        identity::RepositoryIdentity,
        tree::{EntryKind, FileHandle, TreeEntry, TreeListing},
    },
};

use super::{describe, RemoteApi, RemoteError};

/// Reads trees and blobs straight from the local clone. Object handles carry
/// the blob id.
impl RemoteApi for CachedRepository<'_> {
    fn list_tree(
        &self,
        _identity: &RepositoryIdentity,
        reference: &str,
    ) -> Result<TreeListing, RemoteError> {
        let tree = self.git_repo().revparse_single(reference)?.peel_to_tree()?;
        let mut entries = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            let Some(name) = entry.name() else {
                return TreeWalkResult::Skip;
            };
            let kind = match entry.kind() {
                Some(ObjectType::Blob) => EntryKind::Blob,
                Some(ObjectType::Tree) => EntryKind::Tree,
                Some(ObjectType::Commit) => EntryKind::Commit,
                _ => return TreeWalkResult::Ok,
            };
            entries.push(TreeEntry {
                path: format!("{root}{name}"),
                kind,
                url: entry.id().to_string(),
            });
            TreeWalkResult::Ok
        })?;

        Ok(TreeListing {
            truncated: false,
            tree: entries,
        })
    }

    fn fetch(
        &self,
        identity: &RepositoryIdentity,
        handle: &FileHandle,
    ) -> Result<Vec<u8>, RemoteError> {
        let repo = self.git_repo();
        let blob = match handle {
            FileHandle::Object { url } => Oid::from_str(url).and_then(|oid| repo.find_blob(oid)),
            FileHandle::AtRevision { path, revision } => repo
                .revparse_single(&format!("{revision}:{path}"))
                .and_then(|object| object.peel_to_blob()),
        };
        blob.map(|blob| blob.content().to_vec())
            .map_err(|error| RemoteError::DownloadFailed {
                repository: identity.full_name(),
                location: describe(handle),
                reason: error.message().to_owned(),
            })
    }
}
