//! Run configuration
//!
//! Options are resolved once per invocation from (in order of precedence) an
//! explicit config file, `vibrissa.json` / `vibrissa.jsonc` in the working
//! directory, or the `vibrissa` field of `package.json`, merged over the
//! built-in defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{RunnerError, RunnerResult};

/// Config file names probed in the working directory, in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["vibrissa.json", "vibrissa.jsonc"];

/// Field of `package.json` that may hold the configuration.
pub const PACKAGE_JSON_FIELD: &str = "vibrissa";

/// How to launch the server under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Executable to launch
    #[serde(rename = "cmd")]
    pub command: String,

    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory (relative paths resolve against the run's base dir)
    #[serde(default = "default_server_cwd")]
    pub cwd: PathBuf,

    /// Variables overlaid on the host environment
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_server_cwd() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "node".to_string(),
            args: vec!["dist/index.js".to_string()],
            cwd: default_server_cwd(),
            env: HashMap::new(),
        }
    }
}

/// Shell commands run around the server lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Runs before the server is spawned; a failure aborts the run
    #[serde(default)]
    pub before: Option<String>,

    /// Runs after the server is terminated; failures are only logged
    #[serde(default)]
    pub after: Option<String>,
}

/// Fully resolved options for exactly one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub server: ServerConfig,

    /// Patterns selecting case files
    pub globs: Vec<String>,

    /// Reserved: cases always run one at a time
    pub concurrency: usize,

    /// Per-case timeout in milliseconds
    pub timeout_ms: u64,

    /// Stop the case loop after the first failure
    pub fail_fast: bool,

    /// Where to write the JSON summary, if anywhere
    pub report_path: Option<PathBuf>,

    pub hooks: Option<HooksConfig>,

    /// Directory that relative globs, server cwd and report path resolve against
    pub base_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            globs: vec!["tests/integration/**/*.json".to_string()],
            concurrency: 4,
            timeout_ms: 15_000,
            fail_fast: false,
            report_path: None,
            hooks: None,
            base_dir: PathBuf::from("."),
        }
    }
}

impl RunOptions {
    /// Per-case timeout as a `Duration`
    pub fn case_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// How long to wait for the server to come up.
    ///
    /// Bounded to 2..=10 seconds regardless of the per-case timeout.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.clamp(2_000, 10_000))
    }

    /// Resolve a possibly relative path against `base_dir`
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> RunnerResult<()> {
        if self.concurrency == 0 {
            return Err(RunnerError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.server.command.trim().is_empty() {
            return Err(RunnerError::InvalidConfig(
                "server.cmd must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay the fields present in a partial config
    pub fn merge(mut self, partial: PartialRunOptions) -> Self {
        if let Some(server) = partial.server {
            if let Some(command) = server.command {
                self.server.command = command;
            }
            if let Some(args) = server.args {
                self.server.args = args;
            }
            if let Some(cwd) = server.cwd {
                self.server.cwd = cwd;
            }
            if let Some(env) = server.env {
                self.server.env = env;
            }
        }
        if let Some(globs) = partial.globs {
            self.globs = globs;
        }
        if let Some(concurrency) = partial.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(timeout_ms) = partial.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(fail_fast) = partial.fail_fast {
            self.fail_fast = fail_fast;
        }
        if partial.report_path.is_some() {
            self.report_path = partial.report_path;
        }
        if partial.hooks.is_some() {
            self.hooks = partial.hooks;
        }
        self
    }
}

/// Run options as they appear on disk; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialRunOptions {
    pub server: Option<PartialServerConfig>,
    pub globs: Option<Vec<String>>,
    pub concurrency: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub fail_fast: Option<bool>,
    pub report_path: Option<PathBuf>,
    pub hooks: Option<HooksConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialServerConfig {
    #[serde(rename = "cmd")]
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub cwd: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
}

/// Remove `//` and `/* */` comments that sit outside string literals.
///
/// Newlines ending line comments are kept so error positions stay meaningful.
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if !escaped && c == q {
                quote = None;
            }
            escaped = !escaped && c == '\\';
            continue;
        }

        match (c, chars.peek()) {
            ('/', Some('/')) => {
                chars.next();
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push(c);
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        break;
                    }
                }
            }
            ('"' | '\'' | '`', _) => {
                quote = Some(c);
                escaped = false;
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}

/// Parse a JSON-with-comments config file
pub fn load_config_from_path(path: &Path) -> RunnerResult<PartialRunOptions> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&strip_json_comments(&raw)).map_err(|source| RunnerError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Locate and parse the config for `cwd`, if there is one
pub fn load_config_file(
    cwd: &Path,
    explicit_path: Option<&Path>,
) -> RunnerResult<Option<PartialRunOptions>> {
    if let Some(explicit) = explicit_path {
        let path = if explicit.is_absolute() {
            explicit.to_path_buf()
        } else {
            cwd.join(explicit)
        };
        if !path.exists() {
            return Err(RunnerError::ConfigNotFound(path));
        }
        debug!(path = %path.display(), "Loading explicit config");
        return load_config_from_path(&path).map(Some);
    }

    for name in CONFIG_FILE_NAMES {
        let path = cwd.join(name);
        if path.exists() {
            debug!(path = %path.display(), "Loading config");
            return load_config_from_path(&path).map(Some);
        }
    }

    let package_json = cwd.join("package.json");
    if package_json.exists() {
        let raw = std::fs::read_to_string(&package_json)?;
        let pkg: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| RunnerError::ConfigParse {
                path: package_json.clone(),
                source,
            })?;
        if let Some(section) = pkg.get(PACKAGE_JSON_FIELD).filter(|v| v.is_object()) {
            debug!(path = %package_json.display(), "Loading config from package.json");
            let partial = serde_json::from_value(section.clone()).map_err(|source| {
                RunnerError::ConfigParse {
                    path: package_json.clone(),
                    source,
                }
            })?;
            return Ok(Some(partial));
        }
    }

    Ok(None)
}

/// Resolve the options for a run rooted at `cwd`
pub fn resolve_options(cwd: &Path, explicit_path: Option<&Path>) -> RunnerResult<RunOptions> {
    let defaults = RunOptions {
        base_dir: cwd.to_path_buf(),
        ..RunOptions::default()
    };
    let resolved = match load_config_file(cwd, explicit_path)? {
        Some(partial) => defaults.merge(partial),
        None => defaults,
    };
    Ok(resolved)
}
