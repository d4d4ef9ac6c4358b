use crate::error::SandboxError;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Commands refused by every sandbox unless replaced.
pub const DEFAULT_DENIED_COMMANDS: &[&str] = &[
    r"rm\s+-rf\s+/(\s|$)",     // rm -rf /
    r"rm\s+-r\s+-f\s+/(\s|$)", // rm -r -f /
    r"rm\s+-f\s+-r\s+/(\s|$)", // rm -f -r /
    r"^sudo\s",
    r"chmod\s+-R\s+777\s+/",
    r"mkfs\.",
    r"dd\s+if=",
    r">\s*/dev/sd",
    r":\(\)\s*\{.*\};\s*:", // fork bomb
    r"\b(shutdown|reboot|poweroff)\b",
];

static DEFAULT_DENIED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DEFAULT_DENIED_COMMANDS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Limits applied to every tool call.
///
/// Paths are resolved relative to `workspace`. When `restrict_to_workspace`
/// is set, filesystem tools and `exec` refuse any path that resolves outside
/// it. Denied command patterns are enforced regardless of the flag.
///
/// # Example
///
/// ```rust
/// use nanogate::SandboxConfig;
/// use std::time::Duration;
///
/// let sandbox = SandboxConfig::new("/srv/assistant")
///     .with_timeout(Duration::from_secs(30))
///     .with_restrict_to_workspace(true);
///
/// assert!(sandbox.check_path("notes/todo.md").is_ok());
/// assert!(sandbox.check_path("/etc/passwd").is_err());
/// ```
#[derive(Clone, Debug)]
pub struct SandboxConfig {
    /// Root directory tools operate in
    pub workspace: PathBuf,
    /// Hard wall-clock limit for one tool call
    pub timeout: Duration,
    /// Reject paths that resolve outside `workspace`
    pub restrict_to_workspace: bool,
    /// Tool output beyond this many characters is cut and flagged
    pub max_output_chars: usize,
    denied_commands: Vec<Regex>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            timeout: Duration::from_secs(60),
            restrict_to_workspace: false,
            max_output_chars: 10_000,
            denied_commands: DEFAULT_DENIED.clone(),
        }
    }
}

impl SandboxConfig {
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_restrict_to_workspace(mut self, restrict: bool) -> Self {
        self.restrict_to_workspace = restrict;
        self
    }

    #[must_use]
    pub const fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max;
        self
    }

    /// Replace the denied command patterns.
    ///
    /// # Errors
    /// Returns [`SandboxError::InvalidPattern`] for the first pattern that is
    /// not a valid regex.
    pub fn with_denied_commands<I, S>(mut self, patterns: I) -> Result<Self, SandboxError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.denied_commands = patterns
            .into_iter()
            .map(|pattern| compile_pattern(pattern.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Add one denied command pattern to the current set.
    ///
    /// # Errors
    /// Returns [`SandboxError::InvalidPattern`] if `pattern` is not a valid regex.
    pub fn deny_command(mut self, pattern: &str) -> Result<Self, SandboxError> {
        self.denied_commands.push(compile_pattern(pattern)?);
        Ok(self)
    }

    /// Source text of the denied command patterns.
    #[must_use]
    pub fn denied_commands(&self) -> impl Iterator<Item = &str> {
        self.denied_commands.iter().map(Regex::as_str)
    }

    /// Workspace root with symlinks resolved where it exists.
    #[must_use]
    pub fn workspace_root(&self) -> PathBuf {
        resolve_existing_prefix(&normalize(&absolute(&self.workspace)))
    }

    /// Resolve `path` against the workspace. `~` expands to the home directory.
    /// The result is normalized and does not need to exist.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve_from(&self.workspace_root(), path)
    }

    /// Resolve `path` and, when restriction is on, verify it stays inside the
    /// workspace.
    ///
    /// # Errors
    /// Returns [`SandboxError::OutsideWorkspace`] for paths that escape the workspace.
    pub fn check_path(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let root = self.workspace_root();
        let resolved = resolve_from(&root, path);
        if self.restrict_to_workspace && !resolved.starts_with(&root) {
            return Err(SandboxError::OutsideWorkspace {
                path: path.to_string(),
                workspace: root.display().to_string(),
            });
        }
        Ok(resolved)
    }

    /// Screen a shell command before it is spawned.
    ///
    /// Denied patterns always apply. With restriction on, every token that
    /// looks like a path (absolute, `~`, or containing `..`) must resolve
    /// inside the workspace.
    ///
    /// # Errors
    /// Returns [`SandboxError::DeniedCommand`] or [`SandboxError::OutsideWorkspace`].
    pub fn check_command(&self, command: &str, working_dir: &Path) -> Result<(), SandboxError> {
        let normalized = command.trim();
        if let Some(pattern) = self
            .denied_commands
            .iter()
            .find(|pattern| pattern.is_match(normalized))
        {
            log::warn!("Blocked command matching '{pattern}': {normalized}");
            return Err(SandboxError::DeniedCommand(normalized.to_string()));
        }

        if !self.restrict_to_workspace {
            return Ok(());
        }

        let root = self.workspace_root();
        for token in path_like_tokens(normalized) {
            let resolved = resolve_from(working_dir, token);
            if !resolved.starts_with(&root) {
                return Err(SandboxError::OutsideWorkspace {
                    path: token.to_string(),
                    workspace: root.display().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Tokens of a shell command that name filesystem locations.
fn path_like_tokens(command: &str) -> impl Iterator<Item = &str> {
    command
        .split(|c: char| {
            c.is_whitespace()
                || matches!(c, ';' | '|' | '&' | '<' | '>' | '(' | ')' | '\'' | '"' | '=' | '`')
        })
        .filter(|token| !token.is_empty())
        .filter(|token| *token != "/dev/null")
        .filter(|token| token.starts_with('/') || token.starts_with('~') || token.contains(".."))
}

fn resolve_from(base: &Path, path: &str) -> PathBuf {
    let expanded = expand_home(path);
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    resolve_existing_prefix(&normalize(&joined))
}

fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor of `path` and re-append the
/// rest, so symlinks inside the workspace cannot point outside it unnoticed.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in rest.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, SandboxError> {
    Regex::new(pattern).map_err(|e| SandboxError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
