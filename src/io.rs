use std::fmt::Display;
use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use console::Style;
use glob::{Pattern, glob};

use crate::error::Result;

const ANSI_BLUE: Style = Style::new().blue();

pub(crate) fn as_overhead(duration: Duration) -> impl Display {
    ANSI_BLUE.apply_to(format!("{}ms", duration.as_millis()))
}

/// Create every directory (and its parents) if it doesn't exist yet.
pub fn ensure_directories<P: AsRef<Utf8Path>>(dirs: &[P]) -> Result<()> {
    for dir in dirs {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        tracing::trace!(%dir, "directory ready");
    }
    Ok(())
}

/// All regular files below `root`, in sorted order. A missing root yields
/// nothing.
pub(crate) fn files_under(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let pattern = format!("{}/**/*", Pattern::escape(root.as_str()));

    let mut files = Vec::new();
    for path in glob(&pattern)? {
        let path = Utf8PathBuf::try_from(path?)?;
        if path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Archive entry name of `path` relative to `root`, always `/` separated.
pub(crate) fn entry_name(root: &Utf8Path, path: &Utf8Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let name = relative
        .components()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join("/");

    (!name.is_empty()).then_some(name)
}
