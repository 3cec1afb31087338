use std::collections::HashSet;
use std::fs::{self, File};
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use zip::ZipArchive;

use crate::error::{BuilderError, Result};

/// Expands source jars into a directory, keeping only matching entries.
pub struct SourceJarExtractor {
    dest_dir: Utf8PathBuf,
    file_matcher: fn(&str) -> bool,
    jar_files: Vec<Utf8PathBuf>,
}

impl SourceJarExtractor {
    pub fn new(dest_dir: impl Into<Utf8PathBuf>, file_matcher: fn(&str) -> bool) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            file_matcher,
            jar_files: Vec::new(),
        }
    }

    pub fn add_jars<I, P>(&mut self, jars: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.jar_files.extend(jars.into_iter().map(Into::into));
        self
    }

    /// Extract every jar in order and return the paths of the extracted
    /// files, each listed once, in first-seen order. When several jars hold
    /// the same entry the first one wins.
    pub fn execute(&self) -> Result<Vec<Utf8PathBuf>> {
        fs::create_dir_all(&self.dest_dir)?;

        let mut seen = HashSet::new();
        let mut sources = Vec::new();

        for jar in &self.jar_files {
            self.extract(jar, &mut seen, &mut sources)?;
        }

        tracing::debug!(dest = %self.dest_dir, count = sources.len(), "expanded source jars");
        Ok(sources)
    }

    fn extract(
        &self,
        jar: &Utf8Path,
        seen: &mut HashSet<Utf8PathBuf>,
        extracted: &mut Vec<Utf8PathBuf>,
    ) -> Result<()> {
        let mut archive = ZipArchive::new(File::open(jar)?)?;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() || !(self.file_matcher)(entry.name()) {
                tracing::trace!(%jar, name = entry.name(), "skipping entry");
                continue;
            }

            let relative = entry
                .enclosed_name()
                .map(|p| p.to_path_buf())
                .ok_or_else(|| BuilderError::UnsafeEntry(entry.name().to_string()))?;
            let target = self.dest_dir.join(Utf8PathBuf::try_from(relative)?);
            if !seen.insert(target.clone()) {
                tracing::debug!(%jar, name = entry.name(), "duplicate entry, keeping the first one");
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&target)?;
            io::copy(&mut entry, &mut file)?;

            extracted.push(target);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jars::testing::write_zip;
    use crate::sources::is_jvm_source_file;

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_extracts_only_matching_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        let jar = root.join("in/lib-sources.jar");
        write_zip(
            &jar,
            &[
                ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\r\n"),
                ("com/", ""),
                ("com/lib/Bar.kt", "package com.lib"),
                ("com/lib/Baz.java", "package com.lib;"),
                ("com/lib/notes.txt", "ignored"),
            ],
        );

        let dest = root.join("temp/_srcjars");
        let sources = SourceJarExtractor::new(&dest, is_jvm_source_file)
            .add_jars([&jar])
            .execute()
            .unwrap();

        assert_eq!(
            sources,
            [dest.join("com/lib/Bar.kt"), dest.join("com/lib/Baz.java")]
        );
        assert_eq!(
            fs::read_to_string(dest.join("com/lib/Bar.kt")).unwrap(),
            "package com.lib"
        );
        assert!(!dest.join("com/lib/notes.txt").exists());
    }

    #[test]
    fn test_duplicate_entries_across_jars_listed_once() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        let first = root.join("a.srcjar");
        let second = root.join("b.srcjar");
        write_zip(&first, &[("x/A.kt", "first"), ("x/B.kt", "b")]);
        write_zip(&second, &[("x/A.kt", "second")]);

        let dest = root.join("out");
        let sources = SourceJarExtractor::new(&dest, is_jvm_source_file)
            .add_jars([&first, &second])
            .execute()
            .unwrap();

        assert_eq!(sources, [dest.join("x/A.kt"), dest.join("x/B.kt")]);
        assert_eq!(fs::read_to_string(dest.join("x/A.kt")).unwrap(), "first");
    }

    #[test]
    fn test_rejects_escaping_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        let jar = root.join("evil.srcjar");
        write_zip(&jar, &[("../../Evil.kt", "nope")]);

        let err = SourceJarExtractor::new(root.join("out"), is_jvm_source_file)
            .add_jars([&jar])
            .execute()
            .unwrap_err();

        assert!(matches!(err, BuilderError::UnsafeEntry(_)));
    }

    #[test]
    fn test_missing_jar_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);

        let result = SourceJarExtractor::new(root.join("out"), is_jvm_source_file)
            .add_jars([root.join("missing.srcjar")])
            .execute();

        assert!(matches!(result, Err(BuilderError::Io(_))));
    }
}
