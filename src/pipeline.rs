//! The stages of a Kotlin/JVM compilation.
//!
//! Each stage borrows a [`CompilationTask`] and either returns a new task or
//! produces an output on disk. The expected order is:
//!
//! 1. [`CompilationTask::pre_processing_steps`] creates the working
//!    directories and expands bundled source jars.
//! 2. [`CompilationTask::run_annotation_processors`] runs kapt when processors
//!    are declared and folds the generated sources back in.
//! 3. [`CompilationTask::compile_kotlin`] runs the compiler.
//! 4. [`CompilationTask::create_output_jar`] and
//!    [`CompilationTask::produce_source_jar`] package the results.
use std::env;
use std::fs::File;
use std::io::ErrorKind;

use camino::Utf8PathBuf;

use crate::args::{CompilationArgs, FRIEND_PATHS_SEPARATOR, join_paths, join_with};
use crate::context::TaskContext;
use crate::error::{BuilderError, Result};
use crate::io::{ensure_directories, files_under};
use crate::jars::{JarCreator, SourceJarCreator, SourceJarExtractor};
use crate::sources::{is_jvm_source_file, partition_jvm_sources};
use crate::task::CompilationTask;
use crate::toolchain::{KotlinCompiler, PluginArgsEncoder};

impl CompilationTask {
    /// Classpath and toolchain flags shared by every invocation.
    pub fn base_args(&self) -> CompilationArgs {
        let toolchain = &self.info.toolchain;
        CompilationArgs::new()
            .flag_paths("-cp", &self.inputs.classpath, join_paths)
            .flag_value("-api-version", &toolchain.api_version)
            .flag_value("-language-version", &toolchain.language_version)
            .flag_value("-jvm-target", &toolchain.jvm_target)
            .flag_value("-module-name", &self.info.module_name)
    }

    /// [`CompilationTask::base_args`] plus friend paths, the output directory
    /// and the passthrough flags.
    pub fn common_args(&self) -> CompilationArgs {
        self.base_args()
            .absolute_paths(&self.inputs.friend_paths, |paths| {
                format!("-Xfriend-paths={}", join_with(paths, FRIEND_PATHS_SEPARATOR))
            })
            .flag_value("-d", &self.directories.classes)
            .given_not_empty(&self.info.passthrough_flags, str::split_whitespace)
    }

    /// The full argument list of the main compiler invocation.
    pub fn compiler_args(&self) -> Vec<String> {
        self.common_args()
            .values(&self.inputs.java_sources)
            .values(&self.inputs.kotlin_sources)
            .list()
    }

    /// Create the working directories, then expand any bundled source jars.
    pub fn pre_processing_steps(&self, context: &TaskContext) -> Result<Self> {
        let dirs = &self.directories;
        ensure_directories(&[
            &dirs.temp,
            &dirs.generated_sources,
            &dirs.generated_classes,
            &dirs.classes,
        ])?;

        context.execute("expand sources", || self.expand_with_source_jar_sources())
    }

    /// Fold the sources of every bundled source jar into a new task. Without
    /// source jars this is the identity.
    ///
    /// Only `temp` is checked; the extractor creates `temp/_srcjars` itself.
    pub fn expand_with_source_jar_sources(&self) -> Result<Self> {
        if self.inputs.source_jars.is_empty() {
            return Ok(self.clone());
        }

        if !self.directories.temp.is_dir() {
            return Err(BuilderError::precondition(format!(
                "temp directory '{}' must exist before source jars are expanded",
                self.directories.temp
            )));
        }

        let sources = SourceJarExtractor::new(self.directories.source_jars(), is_jvm_source_file)
            .add_jars(&self.inputs.source_jars)
            .execute()?;

        Ok(self.expand_with_sources(sources))
    }

    /// Run kapt when annotation processors are declared, then fold the
    /// generated sources into a new task. Running this twice duplicates the
    /// generated sources.
    pub fn run_annotation_processors(
        &self,
        context: &TaskContext,
        encoder: &dyn PluginArgsEncoder,
        compiler: &dyn KotlinCompiler,
    ) -> Result<Self> {
        if self.inputs.processors.is_empty() {
            return Ok(self.clone());
        }

        let name = format!("kapt ({})", self.inputs.processors.join(", "));
        context.execute(&name, || {
            let plugin_args = encoder
                .encode(context, self)
                .map_err(BuilderError::Plugin)?;

            let args = self
                .common_args()
                .values(plugin_args)
                .values(&self.inputs.kotlin_sources)
                .values(&self.inputs.java_sources)
                .list();

            let output = context.execute_compiler_task(
                "kapt",
                &args,
                compiler,
                true,
                !context.is_tracing(),
            )?;

            context.when_tracing(|ctx| ctx.print_lines("kapt output", &output));

            self.expand_with_generated_sources()
        })
    }

    /// Fold every file below the generated sources directory into a new task.
    pub fn expand_with_generated_sources(&self) -> Result<Self> {
        let sources = files_under(&self.directories.generated_sources)?;
        Ok(self.expand_with_sources(sources))
    }

    /// Compile the Kotlin sources (Java sources are passed along for
    /// reference) into the classes directory.
    pub fn compile_kotlin(
        &self,
        context: &TaskContext,
        compiler: &dyn KotlinCompiler,
        print_on_fail: bool,
    ) -> Result<Vec<String>> {
        let args = self.compiler_args();
        context.execute_compiler_task("kotlinc", &args, compiler, print_on_fail, true)
    }

    /// Jar the compiled and the generated classes together.
    pub fn create_output_jar(&self) -> Result<()> {
        let mut jar = JarCreator::new(&self.outputs.jar);
        jar.add_directory(&self.directories.classes)?;
        jar.add_directory(&self.directories.generated_classes)?;
        jar.set_jar_owner(&self.info.label, self.info.bazel_rule_kind());
        jar.execute()
    }

    /// Jar the task's own sources. The source jar must not exist yet.
    ///
    /// Call this on the task as supplied: bundled and generated sources are
    /// already packaged elsewhere and must stay out. Absolute paths are named
    /// relative to the working directory.
    pub fn produce_source_jar(&self) -> Result<()> {
        let source_jars = self.directories.source_jars();
        if !self.inputs.source_jars.is_empty() && !source_jars.is_dir() {
            return Err(BuilderError::precondition(format!(
                "source jars were declared but '{source_jars}' was never expanded"
            )));
        }

        let working_dir = Utf8PathBuf::try_from(env::current_dir()?)?;
        let path = &self.outputs.srcjar;
        let file = File::create_new(path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => BuilderError::OutputExists(path.clone()),
            _ => BuilderError::Io(e),
        })?;

        let mut creator = SourceJarCreator::new(path);
        creator.relative_to(working_dir);
        creator.add_sources(&self.inputs.java_sources);
        creator.add_sources(&self.inputs.kotlin_sources);
        creator.write_to(file)
    }

    fn expand_with_sources(&self, sources: impl IntoIterator<Item = Utf8PathBuf>) -> Self {
        self.update(|builder| {
            let mut kotlin = Vec::new();
            let mut java = Vec::new();
            partition_jvm_sources(sources, |p| kotlin.push(p), |p| java.push(p));
            builder.add_kotlin_sources(kotlin).add_java_sources(java);
        })
    }
}
