//! Runner command templates.

use std::path::Path;

use fiddle_core::{RunnerError, Version};

/// Replaced with the version under test.
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// Replaced with the directory holding the fiddle files.
pub const DIR_PLACEHOLDER: &str = "{dir}";

/// Substitute placeholders in `template`.
///
/// When no argument mentions [`DIR_PLACEHOLDER`] the fiddle directory is
/// appended as the last argument, which is where `electron` expects the app.
pub fn expand_command(
    template: &[String],
    version: &Version,
    dir: &Path,
) -> Result<Vec<String>, RunnerError> {
    if template.is_empty() {
        return Err(RunnerError::EmptyCommand);
    }

    let version = version.to_string();
    let dir = dir.display().to_string();
    let mut argv: Vec<String> = template
        .iter()
        .map(|arg| {
            arg.replace(VERSION_PLACEHOLDER, &version)
                .replace(DIR_PLACEHOLDER, &dir)
        })
        .collect();
    if !template.iter().any(|arg| arg.contains(DIR_PLACEHOLDER)) {
        argv.push(dir);
    }
    Ok(argv)
}
