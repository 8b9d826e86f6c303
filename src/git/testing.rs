use std::path::Path;

use git2::{Repository, RepositoryInitOptions, Signature};

/// Creates an empty repository to serve as `origin` and returns it with its
/// `file://` url.
pub fn init_origin(dir: &Path, branch: &str) -> (Repository, String) {
    let path = dir.join("remotes").join("acme").join("components");
    let mut options = RepositoryInitOptions::new();
    options.initial_head(branch);
    let repo = Repository::init_opts(&path, &options).unwrap();
    let url = format!("file://{}", path.display());
    (repo, url)
}

/// Writes the files into the working tree and commits them on HEAD.
pub fn commit_files(repo: &Repository, files: &[(&str, &str)]) -> String {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for (path, content) in files {
        let full_path = workdir.join(path);
        std::fs::create_dir_all(full_path.parent().unwrap()).unwrap();
        std::fs::write(&full_path, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = Signature::now("Test", "test@example.com").unwrap();
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        &format!("Update {}", files.len()),
        &tree,
        &parents,
    )
    .unwrap()
    .to_string()
}
