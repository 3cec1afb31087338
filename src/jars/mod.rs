//! Reading and writing jar archives.
//!
//! Every archive written here is normalized: entries are sorted by name,
//! timestamps and permissions are fixed, and the manifest always comes first.
//! Writing the same inputs twice produces identical bytes.
mod creator;
mod extractor;

pub use creator::{JarCreator, SourceJarCreator};
pub use extractor::SourceJarExtractor;

pub const MANIFEST_DIR: &str = "META-INF/";
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";
