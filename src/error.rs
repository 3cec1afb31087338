use camino::Utf8PathBuf;
use thiserror::Error;

pub type Result<T, E = BuilderError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Archive error.\n{0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't walk directory.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Couldn't read task descriptor.\n{0}")]
    Descriptor(#[from] serde_json::Error),

    #[error("Archive entry '{0}' escapes the extraction directory")]
    UnsafeEntry(String),

    #[error("Internal consistency check failed: {0}")]
    Precondition(String),

    #[error("Output '{0}' already exists")]
    OutputExists(Utf8PathBuf),

    #[error("Compiler plugin arguments:\n{0}")]
    Plugin(anyhow::Error),

    #[error("{phase} failed with status {status}")]
    CompilationFailed {
        phase: &'static str,
        status: i32,
        output: Vec<String>,
    },
}

impl BuilderError {
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        BuilderError::Precondition(message.into())
    }

    /// Errors which signal a broken pipeline or environment rather than a
    /// failure reported by an external tool.
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            BuilderError::CompilationFailed { .. } | BuilderError::Plugin(_)
        )
    }

    /// Diagnostic lines captured from the compiler, if this is a compiler failure.
    pub fn compiler_output(&self) -> Option<&[String]> {
        match self {
            BuilderError::CompilationFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}
