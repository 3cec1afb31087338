use crate::context::TaskContext;
use crate::error::Result;
use crate::task::CompilationTask;
use crate::toolchain::{KotlinCompiler, PluginArgsEncoder};

/// Runs the whole pipeline for one Kotlin/JVM compilation unit.
///
/// The executor holds no per-task state, so one instance can serve many
/// tasks, each with its own [`TaskContext`].
pub struct KotlinJvmTaskExecutor<C, E> {
    compiler: C,
    plugin_args_encoder: E,
}

impl<C, E> KotlinJvmTaskExecutor<C, E>
where
    C: KotlinCompiler,
    E: PluginArgsEncoder,
{
    pub fn new(compiler: C, plugin_args_encoder: E) -> Self {
        Self {
            compiler,
            plugin_args_encoder,
        }
    }

    /// Stage, generate, compile and package `task`.
    ///
    /// Returns the compiler output of the main compilation. On error nothing
    /// is cleaned up; the caller owns the task's directories.
    pub fn execute(&self, context: &TaskContext, task: &CompilationTask) -> Result<Vec<String>> {
        if let Some(json) = context.when_tracing(|_| task.to_json()) {
            let json = json?;
            context.print_lines("jvm task message", &json.lines().collect::<Vec<_>>());
        }

        let expanded = task.pre_processing_steps(context)?;
        let processed = expanded.run_annotation_processors(
            context,
            &self.plugin_args_encoder,
            &self.compiler,
        )?;

        let output = context.execute("compile classes", || {
            processed.compile_kotlin(context, &self.compiler, true)
        })?;

        context.execute("create jar", || processed.create_output_jar())?;
        // Bundled and generated sources stay out of the source jar.
        context.execute("produce src jar", || task.produce_source_jar())?;

        context.finish()?;
        tracing::info!(label = context.label(), "compilation unit complete");

        Ok(output)
    }
}
