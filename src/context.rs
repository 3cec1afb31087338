//! The execution context threaded through every pipeline stage.
//!
//! A [`TaskContext`] belongs to one compilation unit. It knows whether tracing
//! and timings are enabled, owns the sink that tool output is written to, and
//! wraps each named step in a `tracing` span.
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use console::style;

use crate::error::{BuilderError, Result};
use crate::io::as_overhead;
use crate::task::{DebugFlag, Info};
use crate::toolchain::KotlinCompiler;

const TRACE_TARGET: &str = "kotlin_builder::trace";

/// Duration of one named step, with its nesting depth.
#[derive(Debug, Clone)]
pub struct StepTiming {
    pub name: String,
    pub depth: usize,
    pub duration: Duration,
}

#[derive(Default)]
struct State {
    depth: usize,
    timings: Vec<StepTiming>,
}

pub struct TaskContext {
    label: String,
    flags: Vec<DebugFlag>,
    working_dir: Option<Utf8PathBuf>,
    out: Mutex<Box<dyn Write + Send>>,
    state: Mutex<State>,
}

impl TaskContext {
    /// A context writing tool output to stderr.
    pub fn new(info: &Info) -> Self {
        Self::with_output(info, io::stderr())
    }

    pub fn with_output(info: &Info, out: impl Write + Send + 'static) -> Self {
        Self {
            label: info.label.clone(),
            flags: info.debug.clone(),
            working_dir: None,
            out: Mutex::new(Box::new(out)),
            state: Mutex::new(State::default()),
        }
    }

    /// Strip this directory from the start of compiler output lines.
    pub fn working_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_tracing(&self) -> bool {
        self.flags.contains(&DebugFlag::Trace)
    }

    pub fn is_timing(&self) -> bool {
        self.flags.contains(&DebugFlag::Timings)
    }

    /// Run `block` only when tracing is enabled.
    pub fn when_tracing<T>(&self, block: impl FnOnce(&Self) -> T) -> Option<T> {
        self.is_tracing().then(|| block(self))
    }

    /// Run a named step inside its own span, recording its duration.
    pub fn execute<T, E>(&self, name: &str, block: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let span = tracing::info_span!("step", label = %self.label, step = name);
        let _enter = span.enter();

        let index = {
            let mut state = self.state();
            state.depth += 1;
            let depth = state.depth - 1;
            self.is_timing().then(|| {
                state.timings.push(StepTiming {
                    name: name.to_string(),
                    depth,
                    duration: Duration::ZERO,
                });
                state.timings.len() - 1
            })
        };

        let start = Instant::now();
        let result = block();
        let elapsed = start.elapsed();

        let mut state = self.state();
        state.depth -= 1;
        if let Some(index) = index {
            state.timings[index].duration = elapsed;
        }
        tracing::debug!(elapsed = ?elapsed, ok = result.is_ok(), "step finished");

        result
    }

    /// Emit `lines` on the trace channel under `header`.
    pub fn print_lines<S: AsRef<str>>(&self, header: &str, lines: &[S]) {
        tracing::info!(target: TRACE_TARGET, label = %self.label, "{header}:");
        for line in lines {
            tracing::info!(target: TRACE_TARGET, label = %self.label, "|  {}", line.as_ref());
        }
    }

    /// Invoke `compiler` with `args`, capturing its output.
    ///
    /// A non-zero status is turned into [`BuilderError::CompilationFailed`]
    /// carrying the captured lines verbatim.
    pub fn execute_compiler_task(
        &self,
        phase: &'static str,
        args: &[String],
        compiler: &dyn KotlinCompiler,
        print_on_fail: bool,
        print_on_success: bool,
    ) -> Result<Vec<String>> {
        tracing::debug!(phase, args = args.len(), "invoking compiler");

        let mut buffer = Vec::new();
        let status = compiler.compile(args, &mut buffer)?;
        let output: Vec<String> = String::from_utf8_lossy(&buffer)
            .lines()
            .map(String::from)
            .collect();

        if status != 0 {
            if print_on_fail {
                self.print_compiler_output(&output)?;
            }
            return Err(BuilderError::CompilationFailed {
                phase,
                status,
                output,
            });
        }

        if print_on_success {
            self.print_compiler_output(&output)?;
        }

        Ok(output)
    }

    /// Write compiler output to the sink, relative to the working directory.
    pub fn print_compiler_output<S: AsRef<str>>(&self, lines: &[S]) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        for line in lines {
            writeln!(out, "{}", self.trim_working_dir(line.as_ref()))?;
        }
        out.flush()?;
        Ok(())
    }

    fn trim_working_dir<'a>(&self, line: &'a str) -> &'a str {
        let Some(dir) = &self.working_dir else {
            return line;
        };

        line.strip_prefix(dir.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(line)
    }

    pub fn timings(&self) -> Vec<StepTiming> {
        self.state().timings.clone()
    }

    /// Write the timings report to the sink when timings are enabled.
    pub fn finish(&self) -> Result<()> {
        if !self.is_timing() {
            return Ok(());
        }

        let report = render_timings(&self.label, &self.timings());
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(report.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn render_timings(label: &str, timings: &[StepTiming]) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "{} {}", style("timings for").bold(), label);
    for timing in timings {
        let _ = writeln!(
            report,
            "|  {}* {}: {}",
            "  ".repeat(timing.depth),
            timing.name,
            as_overhead(timing.duration)
        );
    }
    report
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("label", &self.label)
            .field("flags", &self.flags)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;

    /// A cloneable sink so tests can read back what the context wrote.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub(crate) fn contents(&self) -> String {
            let bytes = self.0.lock().unwrap().clone();
            console::strip_ansi_codes(&String::from_utf8(bytes).unwrap()).into_owned()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn info(flags: &[DebugFlag]) -> Info {
        Info {
            label: "//pkg:lib".into(),
            debug: flags.to_vec(),
            ..Info::default()
        }
    }

    fn echo(status: i32) -> impl Fn(&[String], &mut dyn Write) -> io::Result<i32> {
        move |args: &[String], out: &mut dyn Write| {
            writeln!(out, "/work/src/Foo.kt:1: {}", args.join(" "))?;
            Ok(status)
        }
    }

    #[test]
    fn test_when_tracing() {
        let quiet = TaskContext::with_output(&info(&[]), io::sink());
        assert_eq!(quiet.when_tracing(|_| 1), None);

        let loud = TaskContext::with_output(&info(&[DebugFlag::Trace]), io::sink());
        assert_eq!(loud.when_tracing(|_| 1), Some(1));
    }

    #[test]
    fn test_print_lines_bypasses_output_sink() {
        let buffer = SharedBuffer::default();
        let ctx = TaskContext::with_output(&info(&[DebugFlag::Trace]), buffer.clone());

        ctx.print_lines("kapt output", &["note: one", "", "note: two"]);
        ctx.print_lines("jvm task message", &[String::from("{}")]);

        assert_eq!(buffer.contents(), "");
    }

    #[test]
    fn test_compiler_success_prints_trimmed_output() {
        let buffer = SharedBuffer::default();
        let ctx = TaskContext::with_output(&info(&[]), buffer.clone()).working_dir("/work");

        let lines = ctx
            .execute_compiler_task("kotlinc", &["-d".into(), "out".into()], &echo(0), true, true)
            .unwrap();

        assert_eq!(lines, ["/work/src/Foo.kt:1: -d out"]);
        assert_eq!(buffer.contents(), "src/Foo.kt:1: -d out\n");
    }

    #[test]
    fn test_compiler_failure_carries_output() {
        let buffer = SharedBuffer::default();
        let ctx = TaskContext::with_output(&info(&[]), buffer.clone());

        let err = ctx
            .execute_compiler_task("kotlinc", &["x".into()], &echo(1), false, true)
            .unwrap_err();

        assert!(!err.is_internal());
        assert_eq!(err.compiler_output().unwrap(), ["/work/src/Foo.kt:1: x"]);
        assert!(matches!(err, BuilderError::CompilationFailed { status: 1, .. }));
        // print_on_fail was off
        assert_eq!(buffer.contents(), "");
    }

    #[test]
    fn test_execute_records_nested_timings() {
        let buffer = SharedBuffer::default();
        let ctx = TaskContext::with_output(&info(&[DebugFlag::Timings]), buffer.clone());

        let value = ctx
            .execute("outer", || ctx.execute("inner", || Ok::<_, BuilderError>(7)))
            .unwrap();
        assert_eq!(value, 7);

        let timings = ctx.timings();
        assert_eq!(timings.len(), 2);
        assert_eq!((timings[0].name.as_str(), timings[0].depth), ("outer", 0));
        assert_eq!((timings[1].name.as_str(), timings[1].depth), ("inner", 1));

        ctx.finish().unwrap();
        let report = buffer.contents();
        assert!(report.starts_with("timings for //pkg:lib\n"));
        assert!(report.contains("|  * outer: "));
        assert!(report.contains("|    * inner: "));
    }

    #[test]
    fn test_execute_without_timings_records_nothing() {
        let ctx = TaskContext::with_output(&info(&[]), io::sink());
        let err = ctx
            .execute("failing", || Err::<(), _>(BuilderError::precondition("boom")))
            .unwrap_err();

        assert!(err.is_internal());
        assert!(ctx.timings().is_empty());
    }
}
