//! VGit CLI - virtual branches over a single git working directory.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    output::set_quiet(cli.quiet);

    let result = match cli.command {
        Commands::Init { base } => commands::init::run(base.as_deref()),
        Commands::Branch { name } => commands::branch::run_create(name.as_deref()),
        Commands::List { json } => commands::status::run_list(json),
        Commands::Switch { name } => commands::branch::run_switch(&name),
        Commands::Rename { old, new } => commands::branch::run_rename(&old, &new),
        Commands::Reorder { name, position } => commands::branch::run_reorder(&name, position),
        Commands::Delete { name, force } => commands::delete::run(&name, force),
        Commands::Add { selectors, hunks, branch } => {
            commands::add::run(&selectors, &hunks, branch.as_deref())
        }
        Commands::Unclaim { selectors, hunks, all } => commands::unclaim::run(&selectors, &hunks, all),
        Commands::Status { json } => commands::status::run(json),
        Commands::Apply { name } => commands::apply::run_apply(&name),
        Commands::Unapply { name } => commands::apply::run_unapply(&name),
        Commands::Commit { message, branch } => commands::commit::run(&message, branch.as_deref()),
        Commands::Push { branch, remote, force, integrated, yes } => {
            commands::push::run(branch.as_deref(), remote.as_deref(), force, integrated, yes)
        }
        Commands::Log { branch, max_count, oneline } => {
            commands::log::run(branch.as_deref(), max_count, oneline)
        }
        Commands::Recover => commands::recover::run(),
        Commands::Completions { shell } => commands::completions::run(shell),
    };

    if let Err(e) = result {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

/// Log to stderr, filtered by `VGIT_LOG` (default `warn`, `debug` with -v).
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("VGIT_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
