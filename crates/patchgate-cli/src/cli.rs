//! Command-line definition

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

/// Base URL browser verification visits when `--verify-url` is absent
pub const DEFAULT_VERIFY_URL: &str = "http://localhost:3000";

fn ticket_arg() -> Arg {
    Arg::new("ticket")
        .required(true)
        .value_name("TICKET")
        .help("Ticket key, e.g. SPE-123")
}

fn run_command() -> Command {
    Command::new("run")
        .about("Run the pipeline for one ticket")
        .arg(ticket_arg())
        .arg(
            Arg::new("branch")
                .long("branch")
                .num_args(0..=1)
                .value_name("NAME")
                .help("Work on a branch in the main checkout instead of a worktree"),
        )
        .arg(
            Arg::new("base-commit")
                .long("base-commit")
                .value_name("SHA")
                .help("Start the workspace from this commit"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Fetch the ticket, then report without touching anything"),
        )
        .arg(
            Arg::new("verify")
                .long("verify")
                .action(ArgAction::SetTrue)
                .help("Run browser verification after the verifier"),
        )
        .arg(
            Arg::new("verify-url")
                .long("verify-url")
                .value_name("URL")
                .default_value(DEFAULT_VERIFY_URL)
                .help("Base URL of the deployed application"),
        )
        .arg(
            Arg::new("audit-log")
                .long("audit-log")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Append audit entries to this JSON Lines file"),
        )
        .arg(
            Arg::new("audit-stderr")
                .long("audit-stderr")
                .action(ArgAction::SetTrue)
                .help("Echo audit entries to stderr"),
        )
        .arg(
            Arg::new("summary")
                .long("summary")
                .action(ArgAction::SetTrue)
                .help("Write AGENT_SUMMARY.md to the workspace root"),
        )
        .arg(
            Arg::new("summary-metadata")
                .long("summary-metadata")
                .action(ArgAction::SetTrue)
                .help("Include a metadata section in the summary"),
        )
        .arg(
            Arg::new("summary-path")
                .long("summary-path")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .conflicts_with("summary-to-contexts")
                .help("Write the summary to this file instead"),
        )
        .arg(
            Arg::new("summary-to-contexts")
                .long("summary-to-contexts")
                .action(ArgAction::SetTrue)
                .help("Write the summary under the contexts directory, keeping old versions"),
        )
        .arg(
            Arg::new("context")
                .long("context")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Codebase context file (default: <contexts>/<repo>/AGENT.md)"),
        )
        .arg(
            Arg::new("info-file")
                .long("info-file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append)
                .help("Extra information for the planner and implementer"),
        )
        .arg(
            Arg::new("info-text")
                .long("info-text")
                .value_name("TEXT")
                .action(ArgAction::Append)
                .help("Extra information for the planner and implementer"),
        )
}

/// The `patchgate` command
#[must_use]
pub fn command() -> Command {
    Command::new("patchgate")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Guarded execution pipeline: ticket -> workspace -> plan -> implement -> verify")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("TOML config file (default: $PATCHGATE_CONFIG)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("More diagnostics (-v debug, -vv trace)"),
        )
        .subcommand(run_command())
        .subcommand(
            Command::new("cleanup")
                .about("Remove the workspace of a ticket")
                .arg(ticket_arg()),
        )
        .subcommand(
            Command::new("ticket")
                .about("Fetch and print a ticket")
                .arg(ticket_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("context")
                .about("Codebase context document")
                .subcommand_required(true)
                .subcommand(Command::new("show").about("Print the context document"))
                .subcommand(Command::new("path").about("Print where the context document lives")),
        )
        .subcommand(Command::new("health").about("Check configuration and tools"))
        .subcommand(
            Command::new("audit")
                .about("Audit log tools")
                .subcommand_required(true)
                .subcommand(
                    Command::new("verify")
                        .about("Verify the hash chain of an audit log file")
                        .arg(
                            Arg::new("file")
                                .required(true)
                                .value_name("FILE")
                                .value_parser(value_parser!(PathBuf)),
                        ),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn bare_branch_flag_has_no_name() {
        let matches = command()
            .try_get_matches_from(["patchgate", "run", "SPE-1", "--branch"])
            .unwrap();
        let (_, run) = matches.subcommand().unwrap();
        assert!(run.contains_id("branch"));
        assert_eq!(run.get_one::<String>("branch"), None);
        assert_eq!(
            run.get_one::<String>("verify-url").map(String::as_str),
            Some(DEFAULT_VERIFY_URL)
        );
    }

    #[test]
    fn info_flags_repeat() {
        let matches = command()
            .try_get_matches_from([
                "patchgate", "run", "SPE-1", "--info-text", "a", "--info-text", "b",
            ])
            .unwrap();
        let (_, run) = matches.subcommand().unwrap();
        let texts: Vec<_> = run.get_many::<String>("info-text").unwrap().collect();
        assert_eq!(texts, ["a", "b"]);
    }

    #[test]
    fn summary_targets_conflict() {
        let result = command().try_get_matches_from([
            "patchgate",
            "run",
            "SPE-1",
            "--summary-path",
            "out.md",
            "--summary-to-contexts",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn config_is_global() {
        let matches = command()
            .try_get_matches_from(["patchgate", "health", "--config", "pg.toml", "-vv"])
            .unwrap();
        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("pg.toml"))
        );
        assert_eq!(matches.get_count("verbose"), 2);
    }
}
