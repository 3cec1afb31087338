//! The compilation task descriptor.
//!
//! A [`CompilationTask`] describes one compilation unit: its sources, classpath,
//! working directories and outputs. It is never mutated in place; every stage of
//! the pipeline derives a new task through [`CompilationTask::update`].
use std::fmt::{self, Display, Formatter};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of the scratch directory (under [`Directories::temp`]) that bundled
/// source archives are expanded into.
pub const SOURCE_JARS_DIR: &str = "_srcjars";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Jvm,
    Js,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    #[default]
    Library,
    Binary,
    Test,
    Import,
}

/// Switches that make the task context more talkative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugFlag {
    /// Route tool output and task dumps through the trace channel.
    Trace,
    /// Record and report the duration of every step.
    Timings,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainInfo {
    pub api_version: String,
    pub language_version: String,
    pub jvm_target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Info {
    pub label: String,
    pub module_name: String,
    pub platform: Platform,
    pub rule_kind: RuleKind,
    pub toolchain: ToolchainInfo,
    /// Extra compiler flags, whitespace separated, passed through verbatim.
    pub passthrough_flags: String,
    pub debug: Vec<DebugFlag>,
}

impl Info {
    /// The Bazel rule kind, e.g. `kt_jvm_library`.
    pub fn bazel_rule_kind(&self) -> String {
        format!("kt_{}_{}", self.platform, self.rule_kind)
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Jvm => f.write_str("jvm"),
            Platform::Js => f.write_str("js"),
        }
    }
}

impl Display for RuleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Library => f.write_str("library"),
            RuleKind::Binary => f.write_str("binary"),
            RuleKind::Test => f.write_str("test"),
            RuleKind::Import => f.write_str("import"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Directories {
    /// Scratch space, bundled source archives are expanded below it.
    pub temp: Utf8PathBuf,
    pub generated_sources: Utf8PathBuf,
    pub generated_classes: Utf8PathBuf,
    pub classes: Utf8PathBuf,
}

impl Directories {
    /// Where bundled source archives get expanded.
    pub fn source_jars(&self) -> Utf8PathBuf {
        self.temp.join(SOURCE_JARS_DIR)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Inputs {
    pub kotlin_sources: Vec<Utf8PathBuf>,
    pub java_sources: Vec<Utf8PathBuf>,
    pub source_jars: Vec<Utf8PathBuf>,
    pub classpath: Vec<Utf8PathBuf>,
    pub processors: Vec<String>,
    pub processorpaths: Vec<Utf8PathBuf>,
    pub friend_paths: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Outputs {
    /// The class archive.
    pub jar: Utf8PathBuf,
    /// The source archive.
    pub srcjar: Utf8PathBuf,
}

/// Immutable description of a single compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationTask {
    pub info: Info,
    pub directories: Directories,
    pub inputs: Inputs,
    pub outputs: Outputs,
}

impl CompilationTask {
    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }

    /// Parse a task from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a task from a JSON file.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())?;
        Self::from_json(&data)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Start a builder seeded with a copy of this task.
    pub fn to_builder(&self) -> TaskBuilder {
        TaskBuilder { task: self.clone() }
    }

    /// Derive a new task, leaving `self` untouched.
    pub fn update(&self, block: impl FnOnce(&mut TaskBuilder)) -> Self {
        let mut builder = self.to_builder();
        block(&mut builder);
        builder.build()
    }
}

/// Accumulates changes for a new [`CompilationTask`].
#[derive(Debug, Clone, Default)]
pub struct TaskBuilder {
    task: CompilationTask,
}

impl TaskBuilder {
    pub fn build(&self) -> CompilationTask {
        self.task.clone()
    }

    pub fn label(&mut self, label: impl Into<String>) -> &mut Self {
        self.task.info.label = label.into();
        self
    }

    pub fn module_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.task.info.module_name = name.into();
        self
    }

    pub fn platform(&mut self, platform: Platform) -> &mut Self {
        self.task.info.platform = platform;
        self
    }

    pub fn rule_kind(&mut self, kind: RuleKind) -> &mut Self {
        self.task.info.rule_kind = kind;
        self
    }

    pub fn toolchain(
        &mut self,
        api_version: impl Into<String>,
        language_version: impl Into<String>,
        jvm_target: impl Into<String>,
    ) -> &mut Self {
        self.task.info.toolchain = ToolchainInfo {
            api_version: api_version.into(),
            language_version: language_version.into(),
            jvm_target: jvm_target.into(),
        };
        self
    }

    pub fn passthrough_flags(&mut self, flags: impl Into<String>) -> &mut Self {
        self.task.info.passthrough_flags = flags.into();
        self
    }

    pub fn debug(&mut self, flag: DebugFlag) -> &mut Self {
        if !self.task.info.debug.contains(&flag) {
            self.task.info.debug.push(flag);
        }
        self
    }

    /// Lay out the four working directories below a single root.
    pub fn directories_under(&mut self, root: impl AsRef<Utf8Path>) -> &mut Self {
        let root = root.as_ref();
        self.task.directories = Directories {
            temp: root.join("temp"),
            generated_sources: root.join("generatedSources"),
            generated_classes: root.join("generatedClasses"),
            classes: root.join("classes"),
        };
        self
    }

    pub fn directories(&mut self, directories: Directories) -> &mut Self {
        self.task.directories = directories;
        self
    }

    pub fn outputs(
        &mut self,
        jar: impl Into<Utf8PathBuf>,
        srcjar: impl Into<Utf8PathBuf>,
    ) -> &mut Self {
        self.task.outputs = Outputs {
            jar: jar.into(),
            srcjar: srcjar.into(),
        };
        self
    }

    pub fn add_kotlin_sources<I, P>(&mut self, sources: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.task
            .inputs
            .kotlin_sources
            .extend(sources.into_iter().map(Into::into));
        self
    }

    pub fn add_java_sources<I, P>(&mut self, sources: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.task
            .inputs
            .java_sources
            .extend(sources.into_iter().map(Into::into));
        self
    }

    pub fn add_source_jars<I, P>(&mut self, jars: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.task
            .inputs
            .source_jars
            .extend(jars.into_iter().map(Into::into));
        self
    }

    pub fn add_classpath<I, P>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.task
            .inputs
            .classpath
            .extend(entries.into_iter().map(Into::into));
        self
    }

    pub fn add_friend_paths<I, P>(&mut self, paths: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.task
            .inputs
            .friend_paths
            .extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn add_processors<I, S>(&mut self, processors: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task
            .inputs
            .processors
            .extend(processors.into_iter().map(Into::into));
        self
    }

    pub fn add_processorpaths<I, P>(&mut self, paths: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.task
            .inputs
            .processorpaths
            .extend(paths.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompilationTask {
        CompilationTask::builder()
            .label("//foo:bar")
            .module_name("bar")
            .toolchain("1.9", "1.9", "11")
            .directories_under("out")
            .outputs("out/bar.jar", "out/bar-sources.jar")
            .add_kotlin_sources(["Foo.kt"])
            .build()
    }

    #[test]
    fn test_update_leaves_previous_task_untouched() {
        let task = sample();
        let updated = task.update(|b| {
            b.add_kotlin_sources(["Bar.kt"]);
        });

        assert_eq!(task.inputs.kotlin_sources, vec![Utf8PathBuf::from("Foo.kt")]);
        assert_eq!(
            updated.inputs.kotlin_sources,
            vec![Utf8PathBuf::from("Foo.kt"), Utf8PathBuf::from("Bar.kt")]
        );
    }

    #[test]
    fn test_directories_under() {
        let task = sample();
        assert_eq!(task.directories.classes, Utf8Path::new("out/classes"));
        assert_eq!(
            task.directories.source_jars(),
            Utf8Path::new("out/temp/_srcjars")
        );
    }

    #[test]
    fn test_bazel_rule_kind() {
        let mut info = Info::default();
        assert_eq!(info.bazel_rule_kind(), "kt_jvm_library");

        info.platform = Platform::Js;
        info.rule_kind = RuleKind::Test;
        assert_eq!(info.bazel_rule_kind(), "kt_js_test");
    }

    #[test]
    fn test_json_roundtrip_preserves_order() {
        let task = sample().update(|b| {
            b.add_java_sources(["b/B.java", "a/A.java"])
                .debug(DebugFlag::Trace);
        });

        let parsed = CompilationTask::from_json(&task.to_json().unwrap()).unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn test_from_json_defaults_missing_fields() {
        let task = CompilationTask::from_json(
            r#"{
                "info": { "label": "//x:y", "rule_kind": "binary", "debug": ["timings"] },
                "inputs": { "kotlin_sources": ["Main.kt"] }
            }"#,
        )
        .unwrap();

        assert_eq!(task.info.rule_kind, RuleKind::Binary);
        assert_eq!(task.info.debug, vec![DebugFlag::Timings]);
        assert!(task.inputs.java_sources.is_empty());
        assert_eq!(task.outputs, Outputs::default());
    }
}
