use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModuleArg {
    Api,
    Ui,
    Ssh,
    All,
}

#[derive(Debug, Parser)]
#[command(
    name = "gauntlet",
    version,
    about = "Declarative test automation: api, ui and ssh cases from JSON documents"
)]
pub struct Cli {
    /// Module to run.
    #[arg(long, value_enum, default_value = "all")]
    pub module: ModuleArg,

    /// Submodule scope, either plain (`user`, requires --module) or
    /// qualified (`api.user`).
    #[arg(long)]
    pub submodule: Option<String>,

    /// Target environment; selects the config_<env>.yaml overlay.
    #[arg(long, default_value = "test", env = "GAUNTLET_ENV")]
    pub env: String,

    /// Worker pool size; 1 means strictly sequential.
    #[arg(long, default_value_t = 1)]
    pub parallel: usize,

    /// Only run cases carrying at least one of these tags.
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Root of the case tree (<root>/<module>/testcases/...).
    #[arg(long, default_value = "testcases")]
    pub cases_root: PathBuf,

    /// Configuration directory.
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// Directory for screenshots and session logs.
    #[arg(long, default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Write a JSON report to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// List configured submodules and exit.
    #[arg(long)]
    pub list_modules: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once(&"gauntlet").chain(args)).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.module, ModuleArg::All);
        assert_eq!(cli.env, "test");
        assert_eq!(cli.parallel, 1);
        assert!(cli.tags.is_empty());
        assert_eq!(cli.cases_root, PathBuf::from("testcases"));
        assert!(cli.report.is_none());
        assert!(!cli.list_modules);
    }

    #[test]
    fn tags_split_on_commas() {
        let cli = parse(&["--tags", "smoke,regression"]);
        assert_eq!(cli.tags, vec!["smoke", "regression"]);
    }

    #[test]
    fn module_values_parse() {
        assert_eq!(parse(&["--module", "api"]).module, ModuleArg::Api);
        assert_eq!(parse(&["--module", "ssh"]).module, ModuleArg::Ssh);
        assert!(Cli::try_parse_from(["gauntlet", "--module", "db"]).is_err());
    }
}
