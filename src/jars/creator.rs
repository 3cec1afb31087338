use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::{MANIFEST_DIR, MANIFEST_NAME};
use crate::error::Result;
use crate::io::{entry_name, files_under};

const CREATED_BY: &str = "bazel";

#[derive(Debug, Clone)]
enum Entry {
    Directory,
    File(Utf8PathBuf),
}

/// Builds a normalized jar from directories and individual files.
///
/// When two inputs map to the same entry name the first one wins.
#[derive(Debug)]
pub struct JarCreator {
    path: Utf8PathBuf,
    entries: BTreeMap<String, Entry>,
    target_label: Option<String>,
    injecting_rule_kind: Option<String>,
}

impl JarCreator {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            target_label: None,
            injecting_rule_kind: None,
        }
    }

    /// Add every file below `dir`, named relative to it. A missing directory
    /// contributes nothing.
    pub fn add_directory(&mut self, dir: impl AsRef<Utf8Path>) -> Result<()> {
        let dir = dir.as_ref();
        for file in files_under(dir)? {
            if let Some(name) = entry_name(dir, &file) {
                self.add_entry(name, file);
            }
        }
        Ok(())
    }

    /// Add a single file under `name`, together with its parent directories.
    /// Returns `false` if the name was already taken.
    pub fn add_entry(&mut self, name: impl Into<String>, file: impl Into<Utf8PathBuf>) -> bool {
        let name = name.into();
        if name == MANIFEST_NAME || name == MANIFEST_DIR {
            tracing::debug!(%name, "manifest is generated, skipping input entry");
            return false;
        }
        if self.entries.contains_key(&name) {
            tracing::debug!(jar = %self.path, %name, "duplicate entry, keeping the first one");
            return false;
        }

        let mut end = 0;
        while let Some(offset) = name[end..].find('/') {
            end += offset + 1;
            if &name[..end] != MANIFEST_DIR {
                self.entries
                    .entry(name[..end].to_string())
                    .or_insert(Entry::Directory);
            }
        }

        self.entries.insert(name, Entry::File(file.into()));
        true
    }

    /// Record which target and rule produced this jar in its manifest.
    pub fn set_jar_owner(&mut self, label: impl Into<String>, rule_kind: impl Into<String>) {
        self.target_label = Some(label.into());
        self.injecting_rule_kind = Some(rule_kind.into());
    }

    pub fn manifest(&self) -> String {
        let mut manifest = String::from("Manifest-Version: 1.0\r\n");
        manifest.push_str(&format!("Created-By: {CREATED_BY}\r\n"));
        if let Some(label) = &self.target_label {
            manifest.push_str(&format!("Target-Label: {label}\r\n"));
        }
        if let Some(kind) = &self.injecting_rule_kind {
            manifest.push_str(&format!("Injecting-Rule-Kind: {kind}\r\n"));
        }
        manifest.push_str("\r\n");
        manifest
    }

    /// Write the jar, replacing any existing file at its path.
    pub fn execute(self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        self.write_to(file)
    }

    /// Write the jar into an already opened file.
    pub fn write_to(self, file: File) -> Result<()> {
        let mut zip = ZipWriter::new(file);
        zip.add_directory(MANIFEST_DIR, options(0o755))?;
        zip.start_file(MANIFEST_NAME, options(0o644))?;
        zip.write_all(self.manifest().as_bytes())?;

        for (name, entry) in &self.entries {
            match entry {
                Entry::Directory => zip.add_directory(name.as_str(), options(0o755))?,
                Entry::File(source) => {
                    zip.start_file(name.as_str(), options(0o644))?;
                    zip.write_all(&fs::read(source)?)?;
                }
            }
        }

        zip.finish()?;
        tracing::debug!(jar = %self.path, entries = self.entries.len(), "wrote jar");
        Ok(())
    }
}

fn options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(mode)
}

/// Builds a jar from source files.
///
/// Relative sources keep their own path. Absolute sources are named relative
/// to the base directory, or by their file name when outside of it, so the
/// jar does not depend on where the build runs.
#[derive(Debug)]
pub struct SourceJarCreator {
    jar: JarCreator,
    base_dir: Option<Utf8PathBuf>,
}

impl SourceJarCreator {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            jar: JarCreator::new(path),
            base_dir: None,
        }
    }

    pub fn relative_to(&mut self, dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn add_sources<I, P>(&mut self, sources: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Utf8Path>,
    {
        for source in sources {
            let source = source.as_ref();
            let name = self.source_name(source);

            if !name.is_empty() {
                self.jar.add_entry(name, source);
            }
        }
    }

    pub fn write_to(self, file: File) -> Result<()> {
        self.jar.write_to(file)
    }

    fn source_name(&self, source: &Utf8Path) -> String {
        if source.is_relative() {
            return relative_name(source);
        }

        self.base_dir
            .as_deref()
            .and_then(|base| entry_name(base, source))
            .or_else(|| source.file_name().map(String::from))
            .unwrap_or_default()
    }
}

/// `/`-joined normal components; roots, prefixes and `.`/`..` are dropped.
fn relative_name(path: &Utf8Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Utf8Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jars::testing::{entry_names, read_entry};

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    fn write(path: Utf8PathBuf, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_jar_merges_directories_first_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        write(root.join("classes/com/example/Foo.class"), "foo");
        write(root.join("classes/com/example/Shared.class"), "from classes");
        write(root.join("generated/com/example/Shared.class"), "from generated");
        write(root.join("generated/com/gen/Gen.class"), "gen");

        let jar = root.join("out/lib.jar");
        let mut creator = JarCreator::new(&jar);
        creator.add_directory(root.join("classes")).unwrap();
        creator.add_directory(root.join("generated")).unwrap();
        creator.set_jar_owner("//pkg:lib", "kt_jvm_library");
        creator.execute().unwrap();

        assert_eq!(
            entry_names(&jar),
            [
                "META-INF/",
                "META-INF/MANIFEST.MF",
                "com/",
                "com/example/",
                "com/example/Foo.class",
                "com/example/Shared.class",
                "com/gen/",
                "com/gen/Gen.class",
            ]
        );
        assert_eq!(read_entry(&jar, "com/example/Shared.class"), "from classes");
        assert_eq!(
            read_entry(&jar, MANIFEST_NAME),
            "Manifest-Version: 1.0\r\nCreated-By: bazel\r\nTarget-Label: //pkg:lib\r\nInjecting-Rule-Kind: kt_jvm_library\r\n\r\n"
        );
    }

    #[test]
    fn test_jar_skips_input_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        write(root.join("classes/META-INF/MANIFEST.MF"), "bogus");
        write(root.join("classes/META-INF/lib.kotlin_module"), "module");

        let jar = root.join("lib.jar");
        let mut creator = JarCreator::new(&jar);
        creator.add_directory(root.join("classes")).unwrap();
        creator.execute().unwrap();

        assert_eq!(
            entry_names(&jar),
            ["META-INF/", "META-INF/MANIFEST.MF", "META-INF/lib.kotlin_module"]
        );
        assert!(read_entry(&jar, MANIFEST_NAME).starts_with("Manifest-Version: 1.0\r\n"));
    }

    #[test]
    fn test_jar_is_reproducible() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        write(root.join("classes/b/B.class"), "b");
        write(root.join("classes/a/A.class"), "a");

        let build = |name: &str| {
            let jar = root.join(name);
            let mut creator = JarCreator::new(&jar);
            creator.add_directory(root.join("classes")).unwrap();
            creator.set_jar_owner("//x:y", "kt_jvm_library");
            creator.execute().unwrap();
            fs::read(jar).unwrap()
        };

        assert_eq!(build("one.jar"), build("two.jar"));
    }

    #[test]
    fn test_source_jar_names() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        write(root.join("work/src/Main.kt"), "main");
        write(root.join("elsewhere/Other.java"), "other");

        let jar = root.join("sources.jar");
        let mut creator = SourceJarCreator::new(&jar);
        creator.relative_to(root.join("work"));
        creator.add_sources([root.join("work/src/Main.kt"), root.join("elsewhere/Other.java")]);
        creator.write_to(File::create(&jar).unwrap()).unwrap();

        assert_eq!(
            entry_names(&jar),
            ["META-INF/", "META-INF/MANIFEST.MF", "Other.java", "src/", "src/Main.kt"]
        );
    }

    #[test]
    fn test_source_jar_independent_of_location() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);

        let build = |dir: &str| {
            let source = root.join(dir).join("src/Foo.kt");
            write(source.clone(), "class Foo");
            let jar = root.join(format!("{dir}.jar"));
            let mut creator = SourceJarCreator::new(&jar);
            creator.relative_to(root.join("unrelated"));
            creator.add_sources([&source]);
            creator.write_to(File::create(&jar).unwrap()).unwrap();
            (entry_names(&jar), fs::read(&jar).unwrap())
        };

        let (first_names, first_bytes) = build("first");
        let (second_names, second_bytes) = build("second");
        assert_eq!(first_names, ["META-INF/", "META-INF/MANIFEST.MF", "Foo.kt"]);
        assert_eq!(first_names, second_names);
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn test_relative_name() {
        assert_eq!(relative_name(Utf8Path::new("./src/a/Foo.kt")), "src/a/Foo.kt");
        assert_eq!(relative_name(Utf8Path::new("/abs/Foo.kt")), "abs/Foo.kt");
    }
}
