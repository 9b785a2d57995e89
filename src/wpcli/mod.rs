//! WP-CLI invocation.
//!
//! WordPress is asked two things: whether it is installed, and which plugins
//! or themes it currently recognizes.

mod output;

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ModuleType;
use crate::error::ReconcileError;
use crate::runtime::{CommandOutput, Runtime};

pub use output::{VisibleModules, parse_module_list};

/// A single `--key` flag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    /// Encoded as `--key=value`
    Value(String),
    /// Encoded as `--key` when true, omitted when false
    Switch(bool),
}

/// Flags are kept sorted so command lines are deterministic.
pub type Flags = BTreeMap<String, FlagValue>;

/// Encode a command line: `<group> <subcommand> --flag=value --switch ...`.
pub fn encode_args(group: &str, subcommand: &str, flags: &Flags) -> Vec<String> {
    let mut args = vec![group.to_string(), subcommand.to_string()];
    for (key, value) in flags {
        match value {
            FlagValue::Value(v) => args.push(format!("--{}={}", key, v)),
            FlagValue::Switch(true) => args.push(format!("--{}", key)),
            FlagValue::Switch(false) => {}
        }
    }
    args
}

/// Source of the modules WordPress currently recognizes.
pub trait ModuleVisibility {
    fn visible_modules(&self, module_type: &ModuleType) -> Result<VisibleModules, ReconcileError>;
}

pub struct WpCli<'a, R: Runtime> {
    runtime: &'a R,
    binary: PathBuf,
    wordpress_dir: PathBuf,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl<'a, R: Runtime> WpCli<'a, R> {
    pub fn new(
        runtime: &'a R,
        binary: PathBuf,
        wordpress_dir: PathBuf,
        working_dir: PathBuf,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runtime,
            binary,
            wordpress_dir,
            working_dir,
            timeout,
        }
    }

    /// Pick the WP-CLI binary: an explicit path, the one Composer installed
    /// into `<vendor>/bin`, or `wp` from `PATH`.
    pub fn resolve_binary(runtime: &R, explicit: Option<&Path>, vendor_dir: &Path) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        let vendored = vendor_dir.join("bin").join("wp");
        if runtime.exists(&vendored) {
            return vendored;
        }
        PathBuf::from("wp")
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run `wp <group> <subcommand>` against the project's WordPress.
    #[tracing::instrument(skip(self, flags))]
    pub fn run(&self, group: &str, subcommand: &str, flags: &Flags) -> Result<CommandOutput> {
        let mut flags = flags.clone();
        flags.insert(
            "path".to_string(),
            FlagValue::Value(self.wordpress_dir.display().to_string()),
        );
        if self.runtime.is_privileged() {
            flags.insert("allow-root".to_string(), FlagValue::Switch(true));
        }

        let args = encode_args(group, subcommand, &flags);
        let output = self
            .runtime
            .run_command(&self.binary, &args, &self.working_dir, self.timeout)?;
        debug!("wp {} {} exited with {}", group, subcommand, output.code);
        Ok(output)
    }

    /// Whether WordPress reports itself installed. Any failure means no.
    pub fn is_installed(&self) -> bool {
        match self.run("core", "is-installed", &Flags::new()) {
            Ok(output) => output.success(),
            Err(e) => {
                warn!("Could not run WP-CLI: {:#}", e);
                false
            }
        }
    }

    /// Modules of `module_type` known to WordPress, with their versions.
    #[tracing::instrument(skip(self, module_type), fields(kind = %module_type.kind))]
    pub fn list_modules(&self, module_type: &ModuleType) -> Result<VisibleModules, ReconcileError> {
        let (group, subcommand) = &module_type.list_command;
        let command = format!("{} {}", group, subcommand);

        let mut flags = Flags::new();
        flags.insert("format".to_string(), FlagValue::Value("json".to_string()));
        flags.insert(
            "fields".to_string(),
            FlagValue::Value("name,version".to_string()),
        );

        let output = self.run(group, subcommand, &flags)?;
        if !output.success() {
            return Err(ReconcileError::CommandFailed {
                command,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        parse_module_list(&output.stdout)
            .map_err(|reason| ReconcileError::UnparseableOutput { command, reason })
    }
}

impl<R: Runtime> ModuleVisibility for WpCli<'_, R> {
    fn visible_modules(&self, module_type: &ModuleType) -> Result<VisibleModules, ReconcileError> {
        self.list_modules(module_type)
    }
}
