//! Classification of source files by kind.
use camino::{Utf8Path, Utf8PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Kotlin,
    Java,
}

impl SourceKind {
    /// Classify a file by its suffix. Anything that is neither `.kt` nor
    /// `.java` has no kind.
    pub fn of(path: impl AsRef<Utf8Path>) -> Option<Self> {
        match path.as_ref().extension() {
            Some("kt") => Some(SourceKind::Kotlin),
            Some("java") => Some(SourceKind::Java),
            _ => None,
        }
    }
}

/// Whether a file (or archive entry) name is a JVM source file.
pub fn is_jvm_source_file(name: &str) -> bool {
    SourceKind::of(name).is_some()
}

/// Split `sources` by kind, keeping encounter order. Unrecognised files are
/// dropped.
pub fn partition_jvm_sources<I>(
    sources: I,
    mut kotlin: impl FnMut(Utf8PathBuf),
    mut java: impl FnMut(Utf8PathBuf),
) where
    I: IntoIterator<Item = Utf8PathBuf>,
{
    for path in sources {
        match SourceKind::of(&path) {
            Some(SourceKind::Kotlin) => kotlin(path),
            Some(SourceKind::Java) => java(path),
            None => tracing::debug!(%path, "ignoring file that is not a JVM source"),
        }
    }
}
