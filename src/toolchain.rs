//! Contracts for the external tools the pipeline drives, plus default shims.
use std::io::{self, Write};
use std::process::{Command, Stdio};

use camino::Utf8PathBuf;

use crate::context::TaskContext;
use crate::task::CompilationTask;

/// Something that can run the Kotlin compiler.
///
/// Implementations write whatever the compiler prints to `out` and return its
/// exit status; zero means success.
pub trait KotlinCompiler {
    fn compile(&self, args: &[String], out: &mut dyn Write) -> io::Result<i32>;
}

impl<F> KotlinCompiler for F
where
    F: Fn(&[String], &mut dyn Write) -> io::Result<i32>,
{
    fn compile(&self, args: &[String], out: &mut dyn Write) -> io::Result<i32> {
        self(args, out)
    }
}

/// Runs a compiler executable as a child process.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: Utf8PathBuf,
    leading_args: Vec<String>,
}

impl ProcessCompiler {
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before the task's own, e.g. JVM options for a wrapper script.
    pub fn leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl KotlinCompiler for ProcessCompiler {
    fn compile(&self, args: &[String], out: &mut dyn Write) -> io::Result<i32> {
        tracing::debug!(program = %self.program, "spawning compiler");

        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        out.write_all(&output.stdout)?;
        out.write_all(&output.stderr)?;

        // Killed by a signal
        Ok(output.status.code().unwrap_or(-1))
    }
}

/// Produces the extra arguments that enable a compiler plugin for a task.
pub trait PluginArgsEncoder {
    fn encode(&self, context: &TaskContext, task: &CompilationTask) -> anyhow::Result<Vec<String>>;
}

impl<F> PluginArgsEncoder for F
where
    F: Fn(&TaskContext, &CompilationTask) -> anyhow::Result<Vec<String>>,
{
    fn encode(&self, context: &TaskContext, task: &CompilationTask) -> anyhow::Result<Vec<String>> {
        self(context, task)
    }
}

pub const KAPT_PLUGIN_ID: &str = "org.jetbrains.kotlin.kapt3";

/// Encodes the kapt plugin options for a task's annotation processors.
#[derive(Debug, Clone)]
pub struct KaptEncoder {
    plugin_jar: Utf8PathBuf,
}

impl KaptEncoder {
    pub fn new(plugin_jar: impl Into<Utf8PathBuf>) -> Self {
        Self {
            plugin_jar: plugin_jar.into(),
        }
    }
}

impl PluginArgsEncoder for KaptEncoder {
    fn encode(&self, context: &TaskContext, task: &CompilationTask) -> anyhow::Result<Vec<String>> {
        anyhow::ensure!(
            !self.plugin_jar.as_str().is_empty(),
            "kapt plugin jar is not configured"
        );

        let dirs = &task.directories;
        let mut options = vec![
            ("sources", dirs.generated_sources.to_string()),
            ("classes", dirs.generated_classes.to_string()),
            ("stubs", dirs.temp.join("stubs").to_string()),
            ("incrementalData", dirs.temp.join("incrementalData").to_string()),
        ];
        options.extend(
            task.inputs
                .processorpaths
                .iter()
                .map(|path| ("apclasspath", path.to_string())),
        );
        options.extend(
            task.inputs
                .processors
                .iter()
                .map(|processor| ("processors", processor.clone())),
        );
        options.push(("aptMode", "stubsAndApt".into()));
        options.push(("correctErrorTypes", "true".into()));
        if context.is_tracing() {
            options.push(("verbose", "true".into()));
        }

        let mut args = vec![format!("-Xplugin={}", self.plugin_jar)];
        for (key, value) in options {
            args.push("-P".into());
            args.push(format!("plugin:{KAPT_PLUGIN_ID}:{key}={value}"));
        }

        Ok(args)
    }
}
