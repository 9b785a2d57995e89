use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use wpsync::commands::{self, HookEvent, Settings, SyncRequest};
use wpsync::config::ModuleKind;
use wpsync::module::MissingPolicy;

/// wpsync - keep WordPress modules and Composer in step
///
/// Moves plugins and themes out of the WordPress tree, turns the ones that
/// exist as packages into Composer requirements and links everything back
/// through a symlink farm.
///
/// Examples:
///   wpsync sync                        # Synchronize plugins and themes
///   wpsync hook post-update-cmd        # Run from a Composer script
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root holding composer.json (defaults to the current directory)
    #[arg(
        long = "root",
        short = 'r',
        env = "WPSYNC_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub root: Option<PathBuf>,

    /// WP-CLI binary (defaults to vendor/bin/wp, then wp on PATH)
    #[arg(long = "wp-cli", env = "WPSYNC_WP_CLI", value_name = "PATH", global = true)]
    pub wp_cli: Option<PathBuf>,

    /// Seconds to wait for each WP-CLI call
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Allow asking questions on the terminal
    #[arg(long, global = true)]
    pub interactive: bool,

    /// What to do with modules WordPress no longer knows
    #[arg(
        long = "on-missing",
        value_enum,
        default_value_t = MissingPolicy::Warn,
        global = true
    )]
    pub on_missing: MissingPolicy,

    /// Exit with an error when a module type fails
    #[arg(long, global = true)]
    pub strict: bool,

    /// Only use installed packages, never query repositories
    #[arg(
        long,
        env = "WPSYNC_NO_NETWORK",
        value_parser = clap::builder::BoolishValueParser::new(),
        global = true
    )]
    pub offline: bool,

    /// More output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Synchronize module directories with Composer
    Sync(SyncArgs),

    /// Run the work attached to a Composer event
    Hook(HookArgs),

    /// Show where modules live
    Status,
}

#[derive(clap::Args, Debug)]
pub struct SyncArgs {
    /// Module type to synchronize (repeatable; all when omitted)
    #[arg(long = "type", value_enum, value_name = "TYPE")]
    pub kinds: Vec<ModuleKind>,

    /// Treat the pass as a fresh install
    #[arg(long)]
    pub fresh: bool,

    /// Package just installed by Composer (repeatable)
    #[arg(long, value_name = "PACKAGE")]
    pub installed: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct HookArgs {
    /// The Composer event
    #[arg(value_enum)]
    pub event: HookEvent,

    /// Package the event is about (repeatable)
    #[arg(long = "package", value_name = "PACKAGE")]
    pub packages: Vec<String>,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            root: self.root.clone(),
            wp_cli: self.wp_cli.clone(),
            timeout: self.timeout.map(Duration::from_secs),
            interactive: self.interactive,
            missing_policy: self.on_missing,
            offline: self.offline,
        }
    }

    fn default_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.default_filter()))
        .init();
    let runtime = wpsync::runtime::RealRuntime;
    let settings = cli.settings();

    let failed = match &cli.command {
        Commands::Sync(args) => {
            let request = SyncRequest {
                kinds: args.kinds.clone(),
                fresh: args.fresh,
                installed: args.installed.clone(),
            };
            commands::sync(&runtime, &settings, &request)?.failed
        }
        Commands::Hook(args) => commands::hook(&runtime, &settings, args.event, &args.packages)?
            .map(|outcome| outcome.failed)
            .unwrap_or_default(),
        Commands::Status => {
            commands::status(&runtime, &settings)?;
            Vec::new()
        }
    };

    if cli.strict && !failed.is_empty() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
