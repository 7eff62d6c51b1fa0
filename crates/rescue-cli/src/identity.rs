//! Caller identity resolution for CLI commands.
//!
//! Contributor: `--as` flag > `RESCUE_CONTRIBUTOR` env > `USER` env (TTY only).
//! Role: `--role` flag > `RESCUE_ROLE` env > reporter.

use rescue_core::{Caller, Role};
use rescue_core::model::ContributorId;
use std::env;

/// Errors from identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityError {
    /// Human-readable description.
    pub message: String,
    /// Machine error code.
    pub code: &'static str,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdentityError {}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_contributor_with(cli_flag: Option<&str>, env: &dyn EnvReader) -> Option<String> {
    if let Some(who) = cli_flag.map(str::trim).filter(|who| !who.is_empty()) {
        return Some(who.to_string());
    }

    if let Some(val) = env.get("RESCUE_CONTRIBUTOR") {
        return Some(val.trim().to_string());
    }

    if env.is_tty() {
        return env.get("USER");
    }

    None
}

fn resolve_role_with(cli_flag: Option<&str>, env: &dyn EnvReader) -> Result<Role, IdentityError> {
    let raw = cli_flag
        .map(str::to_string)
        .filter(|raw| !raw.trim().is_empty())
        .or_else(|| env.get("RESCUE_ROLE"));

    let Some(raw) = raw else {
        return Ok(Role::Reporter);
    };

    raw.parse().map_err(|_| IdentityError {
        message: format!("Unknown role '{raw}'. Expected reporter or admin."),
        code: "invalid_role",
    })
}

fn require_caller_with(
    as_flag: Option<&str>,
    role_flag: Option<&str>,
    env: &dyn EnvReader,
) -> Result<Caller, IdentityError> {
    let contributor = resolve_contributor_with(as_flag, env).ok_or_else(|| IdentityError {
        message: "Contributor identity required. \
                  Set --as or the RESCUE_CONTRIBUTOR environment variable."
            .to_string(),
        code: "missing_identity",
    })?;
    let role = resolve_role_with(role_flag, env)?;
    Ok(Caller {
        contributor: ContributorId::new(contributor),
        role,
    })
}

/// Resolve the calling identity and role, returning an error if either is
/// missing or malformed.
pub fn require_caller(
    as_flag: Option<&str>,
    role_flag: Option<&str>,
) -> Result<Caller, IdentityError> {
    require_caller_with(as_flag, role_flag, &RealEnv)
}
