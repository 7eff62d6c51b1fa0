//! Caller identity and role gating.
//!
//! Identity is issued elsewhere and trusted verbatim; this module only
//! decides whether a role may perform an action.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::EngineError;
use crate::model::{ContributorId, ParseEnumError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Reporter,
    Administrator,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reporter => "reporter",
            Self::Administrator => "administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reporter" => Ok(Self::Reporter),
            "administrator" | "admin" => Ok(Self::Administrator),
            _ => Err(ParseEnumError {
                expected: "role",
                got: s.to_string(),
            }),
        }
    }
}

/// Engine operations subject to role checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    FindCandidates,
    CreateCase,
    MergeIntoCase,
    ViewCase,
    ListCases,
    SetStatus,
    DeleteCase,
}

impl Action {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FindCandidates => "find candidates",
            Self::CreateCase => "create cases",
            Self::MergeIntoCase => "merge into cases",
            Self::ViewCase => "view cases",
            Self::ListCases => "list all cases",
            Self::SetStatus => "change case status",
            Self::DeleteCase => "delete cases",
        }
    }

    /// Minimum role required to perform this action.
    #[must_use]
    pub const fn required_role(self) -> Role {
        match self {
            Self::ListCases | Self::SetStatus | Self::DeleteCase => Role::Administrator,
            Self::FindCandidates | Self::CreateCase | Self::MergeIntoCase | Self::ViewCase => {
                Role::Reporter
            }
        }
    }
}

/// The authenticated identity behind an engine call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caller {
    pub contributor: ContributorId,
    pub role: Role,
}

impl Caller {
    #[must_use]
    pub fn reporter(contributor: impl Into<String>) -> Self {
        Self {
            contributor: ContributorId::new(contributor),
            role: Role::Reporter,
        }
    }

    #[must_use]
    pub fn administrator(contributor: impl Into<String>) -> Self {
        Self {
            contributor: ContributorId::new(contributor),
            role: Role::Administrator,
        }
    }

    /// Check that this caller's role permits `action`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AccessDenied`] when the action needs the
    /// administrator role and the caller is a reporter.
    pub fn authorize(&self, action: Action) -> Result<(), EngineError> {
        match (action.required_role(), self.role) {
            (Role::Administrator, Role::Reporter) => Err(EngineError::AccessDenied {
                role: self.role.as_str(),
                action: action.as_str(),
            }),
            _ => Ok(()),
        }
    }
}
