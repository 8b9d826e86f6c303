use std::path::PathBuf;

use clap::Parser;

use crate::model::component::ComponentType;

/// Installs and tracks workflow components from git repositories.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Workflow project directory
    #[clap(short, long, global = true, default_value = ".")]
    pub dir: PathBuf,
    /// Remote of the component repository
    #[clap(short, long, global = true)]
    pub remote: Option<String>,
    /// Branch of the component repository
    #[clap(short, long, global = true)]
    pub branch: Option<String>,
    /// Forge API used to read component files instead of the local clone
    #[clap(long, global = true)]
    pub api_url: Option<String>,
    #[clap(long, global = true)]
    pub cache_directory: Option<PathBuf>,
    /// Kind of component to operate on
    #[clap(short = 't', long = "type", global = true, default_value = "modules")]
    pub component_type: ComponentType,
}

#[derive(Debug, Parser)]
pub enum Command {
    ///Lists the components of the remote repository, or the installed ones
    List {
        #[clap(short, long)]
        installed: bool,
    },
    ///Installs a component into the project
    Install {
        name: String,
        ///Commit to install instead of the latest one
        #[clap(short, long)]
        sha: Option<String>,
        ///Reinstall when already installed
        #[clap(short, long)]
        force: bool,
    },
    ///Moves an installed component to another revision
    Update {
        name: String,
        #[clap(short, long)]
        sha: Option<String>,
    },
    ///Removes a component from the project
    Remove { name: String },
    ///Repairs the directory layout and the manifest of the project
    Check,
    ///Deletes the local clones of component repositories
    ClearCache,
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn parse_install() {
        let args = CliArgs::parse_from([
            "modkeeper",
            "install",
            "samtools/sort",
            "--type",
            "subworkflows",
            "--sha",
            "abc123",
        ]);
        assert_eq!(args.component_type, ComponentType::Subworkflow);
        assert!(matches!(
            args.cmd,
            Command::Install { ref name, sha: Some(ref sha), force: false }
                if name == "samtools/sort" && sha == "abc123"
        ));
    }
}
