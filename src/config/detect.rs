// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Build system detection

use std::path::{Path, PathBuf};

const JUSTFILES: [&str; 3] = ["justfile", "Justfile", ".justfile"];

/// Files whose changes can alter the set or shape of stages
const BUILD_DEFINITIONS: [&str; 3] = ["meson.build", "meson_options.txt", "meson.options"];

/// Guess the build system from the files in `srcdir`
pub fn detect_build_system(srcdir: &Path) -> Option<&'static str> {
    if srcdir.join("meson.build").is_file() {
        Some("meson")
    } else if find_justfile(srcdir).is_some() {
        Some("just")
    } else {
        None
    }
}

pub fn find_justfile(srcdir: &Path) -> Option<PathBuf> {
    JUSTFILES
        .iter()
        .map(|name| srcdir.join(name))
        .find(|path| path.is_file())
}

/// Whether `path` is a build definition or project config file
pub fn is_build_definition(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    BUILD_DEFINITIONS.contains(&name)
        || JUSTFILES.contains(&name)
        || super::CONFIG_FILES.contains(&name)
}
