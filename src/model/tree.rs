use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::component::{is_test_path, ComponentType};

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Tree listing of {repository} at {reference} was truncated")]
    TruncatedTree {
        repository: String,
        reference: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    Commit,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Where the object can be retrieved from: an API url or an object id.
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeListing {
    #[serde(default)]
    pub truncated: bool,
    pub tree: Vec<TreeEntry>,
}

/// How to retrieve the content of one file of a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileHandle {
    /// An object of the tracked tree.
    Object { url: String },
    /// A file at a specific commit.
    AtRevision { path: String, revision: String },
}

/// Snapshot of the files of the tracked revision.
#[derive(Debug, Clone, Default)]
pub struct RemoteFileTree {
    entries: BTreeMap<String, TreeEntry>,
}

impl RemoteFileTree {
    pub fn from_listing(
        listing: TreeListing,
        repository: &str,
        reference: &str,
    ) -> Result<RemoteFileTree, TreeError> {
        if listing.truncated {
            return Err(TreeError::TruncatedTree {
                repository: repository.to_owned(),
                reference: reference.to_owned(),
            });
        }
        let entries = listing
            .tree
            .into_iter()
            .map(|entry| (entry.path.clone(), entry))
            .collect();
        Ok(RemoteFileTree { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of every component with an entry file, test directories excluded.
    pub fn available_components(&self, component_type: ComponentType) -> BTreeSet<String> {
        let prefix = format!("{}/", component_type.dir_name());
        let suffix = format!("/{}", component_type.entry_file());
        self.entries
            .values()
            .filter(|entry| entry.kind == EntryKind::Blob && !is_test_path(&entry.path))
            .filter_map(|entry| {
                entry
                    .path
                    .strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(&suffix))
                    .map(str::to_owned)
            })
            .collect()
    }

    /// Files belonging to a component keyed by their repository path.
    ///
    /// With a revision the handles address that commit instead of the
    /// tracked tree.
    pub fn file_handles_for(
        &self,
        component_type: ComponentType,
        name: &str,
        revision: Option<&str>,
    ) -> BTreeMap<String, FileHandle> {
        let prefix = format!("{}/{}/", component_type.dir_name(), name);
        self.entries
            .values()
            .filter(|entry| {
                entry.kind == EntryKind::Blob
                    && entry.path.starts_with(&prefix)
                    && !is_test_path(&entry.path[prefix.len()..])
            })
            .map(|entry| {
                let handle = match revision {
                    Some(revision) if !revision.is_empty() => FileHandle::AtRevision {
                        path: entry.path.clone(),
                        revision: revision.to_owned(),
                    },
                    _ => FileHandle::Object {
                        url: entry.url.clone(),
                    },
                };
                (entry.path.clone(), handle)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn blob(path: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_owned(),
            kind: EntryKind::Blob,
            url: format!("https://example.com/blobs/{}", path.replace('/', "_")),
        }
    }

    fn dir(path: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_owned(),
            kind: EntryKind::Tree,
            url: String::new(),
        }
    }

    fn tree(entries: Vec<TreeEntry>) -> RemoteFileTree {
        RemoteFileTree::from_listing(
            TreeListing {
                truncated: false,
                tree: entries,
            },
            "nf-core/modules",
            "master",
        )
        .unwrap()
    }

    #[test]
    fn lists_components_excluding_tests() {
        let tree = tree(vec![
            dir("modules"),
            dir("modules/fastqc"),
            blob("modules/fastqc/main.nf"),
            blob("modules/fastqc/meta.yml"),
            blob("modules/fastqc/tests/main.nf"),
        ]);
        assert_eq!(
            tree.available_components(ComponentType::Module),
            BTreeSet::from(["fastqc".to_owned()])
        );
    }

    #[test]
    fn lists_nested_components_per_type() {
        let tree = tree(vec![
            blob("modules/samtools/sort/main.nf"),
            blob("modules/samtools/index/main.nf"),
            blob("modules/samtools/index/tests/main.nf"),
            blob("subworkflows/bam_stats/main.nf"),
            blob("tests/modules/samtools/sort/main.nf"),
            blob("modules/README.md"),
        ]);
        assert_eq!(
            tree.available_components(ComponentType::Module),
            BTreeSet::from(["samtools/index".to_owned(), "samtools/sort".to_owned()])
        );
        assert_eq!(
            tree.available_components(ComponentType::Subworkflow),
            BTreeSet::from(["bam_stats".to_owned()])
        );
    }

    #[test]
    fn file_handles_skip_tests_and_other_components() {
        let tree = tree(vec![
            dir("modules/fastqc"),
            blob("modules/fastqc/main.nf"),
            blob("modules/fastqc/meta.yml"),
            blob("modules/fastqc/tests/main.nf.test"),
            blob("modules/fastqcx/main.nf"),
        ]);
        let handles = tree.file_handles_for(ComponentType::Module, "fastqc", None);
        assert_eq!(
            handles.keys().cloned().collect::<Vec<_>>(),
            vec!["modules/fastqc/main.nf", "modules/fastqc/meta.yml"]
        );
        assert_eq!(
            handles["modules/fastqc/main.nf"],
            FileHandle::Object {
                url: "https://example.com/blobs/modules_fastqc_main.nf".to_owned()
            }
        );
    }

    #[test]
    fn file_handles_address_revision() {
        let tree = tree(vec![blob("modules/fastqc/main.nf")]);
        let handles = tree.file_handles_for(ComponentType::Module, "fastqc", Some("abc123"));
        assert_eq!(
            handles["modules/fastqc/main.nf"],
            FileHandle::AtRevision {
                path: "modules/fastqc/main.nf".to_owned(),
                revision: "abc123".to_owned(),
            }
        );
        let handles = tree.file_handles_for(ComponentType::Module, "fastqc", Some(""));
        assert!(matches!(
            handles["modules/fastqc/main.nf"],
            FileHandle::Object { .. }
        ));
    }

    #[test]
    fn rejects_truncated_listing() {
        let listing: TreeListing = serde_json::from_str(
            r#"{"sha": "abc", "truncated": true, "tree": [{"path": "modules", "type": "tree", "sha": "1", "url": "u"}]}"#,
        )
        .unwrap();
        let err = RemoteFileTree::from_listing(listing, "nf-core/modules", "master")
            .expect_err("should reject truncated tree");
        assert!(matches!(err, TreeError::TruncatedTree { .. }));
    }
}
