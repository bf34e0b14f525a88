// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Build phases
//!
//! Phases are the only ordering relation between stages: every stage in a
//! lower phase runs (or is skipped as complete) before any stage in a higher
//! phase starts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A totally ordered build phase
///
/// Declaration order is execution order. New phases may only be appended
/// between existing ones in a way that keeps the relative order stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Prepare,
    Downloads,
    Dependencies,
    Autogen,
    Configure,
    Build,
    Install,
    Commit,
    Export,
    Final,
}

impl Phase {
    /// Every phase in ascending order
    pub const ALL: [Phase; 10] = [
        Phase::Prepare,
        Phase::Downloads,
        Phase::Dependencies,
        Phase::Autogen,
        Phase::Configure,
        Phase::Build,
        Phase::Install,
        Phase::Commit,
        Phase::Export,
        Phase::Final,
    ];

    /// Lowercase name used in configuration and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Downloads => "downloads",
            Phase::Dependencies => "dependencies",
            Phase::Autogen => "autogen",
            Phase::Configure => "configure",
            Phase::Build => "build",
            Phase::Install => "install",
            Phase::Commit => "commit",
            Phase::Export => "export",
            Phase::Final => "final",
        }
    }

    /// Phases up to and including `self`, ascending
    pub fn up_to(self) -> impl DoubleEndedIterator<Item = Phase> {
        Self::ALL.into_iter().filter(move |phase| *phase <= self)
    }

    /// Phases from `self` onwards, ascending
    pub fn and_later(self) -> impl DoubleEndedIterator<Item = Phase> {
        Self::ALL.into_iter().filter(move |phase| *phase >= self)
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Build
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(Phase::as_str).collect();
                format!("Unknown phase '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}
