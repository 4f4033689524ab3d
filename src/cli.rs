use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Dependency-ordered, idempotent deployment of playbooks to hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge hosts to the state the playbook describes
    Run(RunArgs),

    /// List tasks in planned order with their tags and dependencies
    ListTasks(ListTasksArgs),

    /// Print a template rendered for a host
    Render(RenderArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared Arguments
// ============================================================================

#[derive(Parser)]
pub struct SourceArgs {
    /// Playbook file (default: ./deckhand.toml, then the config directory)
    #[arg(short, long, env = "DECKHAND_PLAYBOOK")]
    pub playbook: Option<PathBuf>,

    /// Inventory file (default: ./inventory.toml, then the config directory;
    /// without one, the local machine)
    #[arg(short, long, env = "DECKHAND_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Override a variable: key=value, value parsed as TOML when possible
    #[arg(short = 'e', long = "extra-var", value_name = "KEY=VALUE")]
    pub extra_vars: Vec<String>,

    /// Extra variables file (TOML), may be repeated
    #[arg(long, value_name = "FILE")]
    pub vars_file: Vec<PathBuf>,
}

// ============================================================================
// Run
// ============================================================================

#[derive(Parser)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Only run on these hosts or groups (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub limit: Vec<String>,

    /// Only run tasks with these tags, plus what they depend on (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// List the tags used by the playbook and exit
    #[arg(long)]
    pub list_tags: bool,

    /// Report what would change without changing anything
    #[arg(long)]
    pub check: bool,

    /// Show content diffs for files that change
    #[arg(long)]
    pub diff: bool,

    /// Keep running tasks that do not depend on a failed one
    #[arg(long)]
    pub continue_on_error: bool,

    /// Retry attempts for connection errors and timeouts
    #[arg(short, long, default_value = "0")]
    pub retries: u32,

    /// Timeout for each command sent to a host, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of hosts to run on at once
    #[arg(short, long, default_value = "5")]
    pub forks: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per task
    Text,
    /// Run reports as JSON on stdout
    Json,
}

// ============================================================================
// List Tasks / Render
// ============================================================================

#[derive(Parser)]
pub struct ListTasksArgs {
    /// Playbook file (default: ./deckhand.toml, then the config directory)
    #[arg(short, long, env = "DECKHAND_PLAYBOOK")]
    pub playbook: Option<PathBuf>,

    /// Only list tasks with these tags, plus what they depend on (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Vec<String>,
}

#[derive(Parser)]
pub struct RenderArgs {
    /// Template id, relative to the playbook's templates directory
    pub template: String,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Host whose variables are used (default: the first inventory host)
    #[arg(long)]
    pub host: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "deckhand",
            "-vv",
            "run",
            "--tags",
            "nginx,serverpkgs",
            "--limit",
            "web",
            "-e",
            "port=8080",
            "-e",
            "app_name=shop",
            "--check",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.tags, ["nginx", "serverpkgs"]);
        assert_eq!(args.limit, ["web"]);
        assert_eq!(args.source.extra_vars, ["port=8080", "app_name=shop"]);
        assert!(args.check && !args.diff);
        assert_eq!(args.forks, 5);
        assert_eq!(args.retries, 0);
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_render_args() {
        let cli = Cli::try_parse_from(["deckhand", "render", "nginx.conf.j2", "--host", "web1"])
            .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.template, "nginx.conf.j2");
        assert_eq!(args.host.as_deref(), Some("web1"));
    }
}
