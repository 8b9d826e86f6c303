use thiserror::Error;

pub mod component;
pub mod identity;
pub mod manifest;
pub mod tree;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading configuration: {0}")]
    IO(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Could not extract an owner and a repository name from the remote `{url}`")]
    MalformedRemote { url: String },
    #[error("Unknown component type `{0}`")]
    InvalidComponentType(String),
    #[error("Invalid component name `{0}`")]
    InvalidComponentName(String),
}
