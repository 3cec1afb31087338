//! Incremental construction of compiler invocation tokens.
use std::path::absolute;

use camino::{Utf8Path, Utf8PathBuf};

/// Separator used when joining classpath entries into a single token.
pub const PATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

/// Separator used when joining friend paths into `-Xfriend-paths`.
pub const FRIEND_PATHS_SEPARATOR: &str = ",";

/// An ordered list of arguments for one compiler invocation.
///
/// Empty values are skipped silently, so the same task always produces the
/// same sequence of tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationArgs {
    args: Vec<String>,
}

impl CompilationArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.args.push(name.into());
        self
    }

    /// Appends `name value`, or nothing at all when `value` is empty.
    pub fn flag_value(mut self, name: impl Into<String>, value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        if !value.is_empty() {
            self.args.push(name.into());
            self.args.push(value.to_owned());
        }
        self
    }

    /// Makes every path absolute and folds the collection into one token
    /// with `formatter`. Appends nothing for an empty collection.
    pub fn absolute_paths<P, F>(mut self, paths: &[P], formatter: F) -> Self
    where
        P: AsRef<Utf8Path>,
        F: FnOnce(&[Utf8PathBuf]) -> String,
    {
        if let Some(value) = format_absolute(paths, formatter) {
            self.args.push(value);
        }
        self
    }

    /// Like [`CompilationArgs::absolute_paths`], with `name` emitted before
    /// the formatted token.
    pub fn flag_paths<P, F>(mut self, name: impl Into<String>, paths: &[P], formatter: F) -> Self
    where
        P: AsRef<Utf8Path>,
        F: FnOnce(&[Utf8PathBuf]) -> String,
    {
        if let Some(value) = format_absolute(paths, formatter) {
            self.args.push(name.into());
            self.args.push(value);
        }
        self
    }

    pub fn values<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.args
            .extend(values.into_iter().map(|v| v.as_ref().to_owned()));
        self
    }

    /// Appends the tokens `transform` splits out of `text`, unless `text` is empty.
    pub fn given_not_empty<'t, F, I>(self, text: &'t str, transform: F) -> Self
    where
        F: FnOnce(&'t str) -> I,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        if text.is_empty() {
            self
        } else {
            self.values(transform(text))
        }
    }

    pub fn list(self) -> Vec<String> {
        self.args
    }
}

/// Joins paths with [`PATH_SEPARATOR`].
pub fn join_paths(paths: &[Utf8PathBuf]) -> String {
    join_with(paths, PATH_SEPARATOR)
}

pub(crate) fn join_with(paths: &[Utf8PathBuf], separator: &str) -> String {
    paths
        .iter()
        .map(|path| path.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

fn format_absolute<P, F>(paths: &[P], formatter: F) -> Option<String>
where
    P: AsRef<Utf8Path>,
    F: FnOnce(&[Utf8PathBuf]) -> String,
{
    if paths.is_empty() {
        return None;
    }

    let paths: Vec<_> = paths.iter().map(|p| to_absolute(p.as_ref())).collect();
    Some(formatter(&paths))
}

/// Resolves against the working directory without touching the filesystem.
/// Paths that cannot be resolved as UTF-8 are kept as given.
fn to_absolute(path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    absolute(path)
        .ok()
        .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
        .unwrap_or_else(|| path.to_path_buf())
}
