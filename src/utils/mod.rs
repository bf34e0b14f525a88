// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Utility modules
//!
//! Common utilities for the buildline CLI.

pub mod colors;
pub mod paths;
pub mod spinner;

pub use colors::*;
pub use paths::{contains_path, normalize_path};
pub use spinner::*;
