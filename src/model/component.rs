use std::{
    fmt::{Display, Write},
    path::PathBuf,
    str::FromStr,
};

use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};

use crate::model::ParseError;

/// Name of the file every installed component must contain.
pub const ENTRY_FILE: &str = "main.nf";
/// Install directory reserved for project-local components.
pub const LOCAL_INSTALL_DIR: &str = "local";

const TEST_SEGMENTS: [&str; 2] = ["test", "tests"];

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize, Ord, PartialOrd)]
pub enum ComponentType {
    #[serde(rename = "modules")]
    Module,
    #[serde(rename = "subworkflows")]
    Subworkflow,
}

impl ComponentType {
    pub const ALL: [ComponentType; 2] = [ComponentType::Module, ComponentType::Subworkflow];

    /// Top-level directory holding components of this type, both in the
    /// remote repository and in a project.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ComponentType::Module => "modules",
            ComponentType::Subworkflow => "subworkflows",
        }
    }

    pub fn entry_file(&self) -> &'static str {
        ENTRY_FILE
    }

    /// Singular, human readable name.
    pub fn noun(&self) -> &'static str {
        match self {
            ComponentType::Module => "module",
            ComponentType::Subworkflow => "subworkflow",
        }
    }

    /// `<type>/<install_dir>/<name>` relative to the project root.
    pub fn install_path(&self, install_dir: &str, name: &str) -> PathBuf {
        let mut path = PathBuf::from(self.dir_name());
        path.push(install_dir);
        path.extend(name.split('/'));
        path
    }
}

impl FromStr for ComponentType {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "modules" | "module" => Ok(ComponentType::Module),
            "subworkflows" | "subworkflow" => Ok(ComponentType::Subworkflow),
            other => Err(ParseError::InvalidComponentType(other.to_owned())),
        }
    }
}

impl Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// True when any segment of a `/`-separated path names a test directory.
pub fn is_test_path(path: &str) -> bool {
    path.split('/').any(|segment| TEST_SEGMENTS.contains(&segment))
}

/// A component name is one or more `/`-separated segments, none of them
/// empty, `.` or `..`.
pub fn validate_name(name: &str) -> Result<(), ParseError> {
    let valid = !name.contains('\\')
        && name
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(ParseError::InvalidComponentName(name.to_owned()))
    }
}

/// Commit a component is pinned to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub enum Revision {
    Pinned {
        sha: String,
    },
    /// Installed before tracking started, the originating commit is unknown.
    #[default]
    Unresolved,
}

impl Revision {
    pub fn pinned(sha: impl Into<String>) -> Revision {
        Revision::Pinned { sha: sha.into() }
    }

    pub fn sha(&self) -> Option<&str> {
        match self {
            Revision::Pinned { sha } => Some(sha),
            Revision::Unresolved => None,
        }
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Revision::Pinned { sha } => f.write_str(sha),
            Revision::Unresolved => f.write_char('?'),
        }
    }
}

impl Serialize for Revision {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Revision::Pinned { sha } => serializer.serialize_str(sha),
            Revision::Unresolved => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RevisionVisitor;

        impl<'de> Visitor<'de> for RevisionVisitor {
            type Value = Revision;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a commit sha or null")
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Revision::Unresolved)
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Revision::Unresolved)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Revision::pinned(v))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Revision::pinned(v))
            }
        }

        deserializer.deserialize_any(RevisionVisitor)
    }
}
