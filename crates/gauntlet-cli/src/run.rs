//! Run orchestration: resolve scope, load config and cases, execute each
//! selected backend through the shared scheduler, report.

use std::sync::Arc;

use gauntlet_core::config::Config;
use gauntlet_core::engine::api::ApiInterpreter;
use gauntlet_core::engine::scheduler::Scheduler;
use gauntlet_core::engine::ssh::SshInterpreter;
use gauntlet_core::engine::ui::UiInterpreter;
use gauntlet_core::engine::Aggregator;
use gauntlet_core::model::{ApiCase, CaseStatus, Module, SshCase, UiCase};
use gauntlet_core::{report, store};

use crate::args::{Cli, ModuleArg};
use crate::exit_codes;

/// Resolve `--module` and `--submodule` into the backends to run and the
/// submodule scope. A qualified submodule (`api.user`) pins the backend;
/// a plain one requires an explicit `--module`.
pub fn resolve_scope(
    module: ModuleArg,
    submodule: Option<&str>,
) -> anyhow::Result<(Vec<Module>, Option<String>)> {
    let all = vec![Module::Api, Module::Ui, Module::Ssh];
    let Some(submodule) = submodule.filter(|s| !s.is_empty()) else {
        let modules = match module {
            ModuleArg::Api => vec![Module::Api],
            ModuleArg::Ui => vec![Module::Ui],
            ModuleArg::Ssh => vec![Module::Ssh],
            ModuleArg::All => all,
        };
        return Ok((modules, None));
    };

    if let Some((prefix, sub)) = submodule.split_once('.') {
        let pinned = match prefix {
            "api" => Module::Api,
            "ui" => Module::Ui,
            "ssh" => Module::Ssh,
            other => anyhow::bail!("unknown module in submodule scope: {other}"),
        };
        return Ok((vec![pinned], Some(sub.to_string())));
    }

    let pinned = match module {
        ModuleArg::Api => Module::Api,
        ModuleArg::Ui => Module::Ui,
        ModuleArg::Ssh => Module::Ssh,
        ModuleArg::All => anyhow::bail!("--submodule {submodule} requires --module"),
    };
    Ok((vec![pinned], Some(submodule.to_string())))
}

pub async fn run(args: Cli) -> anyhow::Result<i32> {
    let config = Config::load(&args.config_dir, &args.env)?;

    if args.list_modules {
        let filter = match args.module {
            ModuleArg::All => None,
            m => Some(module_name(m)),
        };
        for key in config.modules_list(filter) {
            println!("{key}");
        }
        return Ok(exit_codes::SUCCESS);
    }

    let (modules, submodule) = resolve_scope(args.module, args.submodule.as_deref())?;
    let scope = submodule.as_deref();
    tracing::info!(
        env = %args.env,
        modules = ?modules.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        submodule = scope.unwrap_or("-"),
        parallel = args.parallel,
        "starting gauntlet run"
    );
    let scheduler = Scheduler::new(args.parallel);
    let mut aggregator = Aggregator::new();

    for module in modules {
        let cases_dir = args
            .cases_root
            .join(module.as_str())
            .join("testcases");
        match module {
            Module::Api => {
                let cases = store::load_cases::<ApiCase>(&cases_dir, scope, &args.tags);
                let interpreter = Arc::new(ApiInterpreter::new(config.api_for(scope)));
                aggregator.extend(scheduler.run(interpreter, cases).await);
            }
            Module::Ui => {
                let cases = store::load_cases::<UiCase>(&cases_dir, scope, &args.tags);
                let interpreter = Arc::new(UiInterpreter::new(
                    config.ui_for(scope),
                    args.artifacts_dir.join("screenshots"),
                ));
                aggregator.extend(scheduler.run(interpreter, cases).await);
            }
            Module::Ssh => {
                let cases = store::load_cases::<SshCase>(&cases_dir, scope, &args.tags);
                let interpreter = Arc::new(SshInterpreter::new(
                    config.ssh_for(scope),
                    args.artifacts_dir.join("logs"),
                ));
                aggregator.extend(scheduler.run(interpreter, cases).await);
            }
        }
    }

    let results = aggregator.into_results();
    report::print_summary(&results);
    if let Some(out) = &args.report {
        report::json::write_json(&results, out)?;
    }

    let failed = results.iter().any(|r| r.status == CaseStatus::Failed);
    Ok(if failed {
        exit_codes::CASES_FAILED
    } else {
        exit_codes::SUCCESS
    })
}

fn module_name(module: ModuleArg) -> &'static str {
    match module {
        ModuleArg::Api => "api",
        ModuleArg::Ui => "ui",
        ModuleArg::Ssh => "ssh",
        ModuleArg::All => "all",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_scope_needs_an_explicit_module() {
        assert!(resolve_scope(ModuleArg::All, Some("user")).is_err());

        let (modules, sub) = resolve_scope(ModuleArg::Api, Some("user")).unwrap();
        assert_eq!(modules, vec![Module::Api]);
        assert_eq!(sub.as_deref(), Some("user"));
    }

    #[test]
    fn qualified_scope_pins_the_module() {
        let (modules, sub) = resolve_scope(ModuleArg::All, Some("ssh.deploy")).unwrap();
        assert_eq!(modules, vec![Module::Ssh]);
        assert_eq!(sub.as_deref(), Some("deploy"));

        assert!(resolve_scope(ModuleArg::All, Some("db.user")).is_err());
    }

    #[test]
    fn no_scope_runs_the_selected_modules() {
        let (modules, sub) = resolve_scope(ModuleArg::All, None).unwrap();
        assert_eq!(modules, vec![Module::Api, Module::Ui, Module::Ssh]);
        assert!(sub.is_none());

        let (modules, _) = resolve_scope(ModuleArg::Ui, Some("")).unwrap();
        assert_eq!(modules, vec![Module::Ui]);
    }
}
