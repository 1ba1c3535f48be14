// src/outcome.rs

//! Uniform result of package and distribution operations
//!
//! Install, remove and update report a success flag plus a human-readable
//! message instead of going through [`crate::Error`]. The "no action needed"
//! case stays distinguishable from a real failure.

use std::fmt;

pub const MSG_SUCCESS: &str = "Success";
pub const MSG_UNSUPPORTED_PACKAGE: &str = "Unsupported package format";
pub const MSG_UNSUPPORTED_DISTRIBUTION: &str = "Unsupported distribution format";
pub const MSG_UP_TO_DATE: &str = "Package is already installed and updating is not required";
pub const MSG_VIRTUAL_UP_TO_DATE: &str =
    "This virtual package is already installed and updating is not required";
pub const MSG_NO_PACKAGE_SOURCE: &str = "No suitable package source found";
pub const MSG_LATEST_INSTALLED: &str =
    "The latest package revision is already installed and there is no newer one found";
pub const MSG_NOT_INSTALLED: &str = "No such package installed";
pub const MSG_DIST_EXISTS: &str = "A distribution with such name already exists";
pub const MSG_NO_DIST_SOURCE: &str = "No suitable distro source found";

/// Outcome of a mutating operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The operation changed the distribution
    Success,
    /// Nothing to do; the requested state is already in place
    Satisfied(String),
    /// The operation could not be carried out
    Failed(String),
}

impl Outcome {
    pub fn satisfied(msg: impl Into<String>) -> Self {
        Outcome::Satisfied(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Outcome::Failed(msg.into())
    }

    /// True only for [`Outcome::Success`]
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, Outcome::Satisfied(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Success => MSG_SUCCESS,
            Outcome::Satisfied(msg) | Outcome::Failed(msg) => msg,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
