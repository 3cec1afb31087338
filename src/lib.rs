#![forbid(unsafe_code)]
//! Compilation pipeline for Kotlin/JVM build actions.
//!
//! A build action hands over a [`CompilationTask`] describing one compilation
//! unit. [`KotlinJvmTaskExecutor`] stages its sources, runs annotation
//! processing, invokes the compiler and packages the class jar and the source
//! jar. The compiler and the kapt plugin are supplied by the caller through
//! [`KotlinCompiler`] and [`PluginArgsEncoder`].

mod args;
mod context;
mod error;
mod executor;
mod io;
pub mod jars;
#[cfg(feature = "logging")]
mod logging;
mod pipeline;
mod sources;
mod task;
mod toolchain;

pub use crate::args::{CompilationArgs, FRIEND_PATHS_SEPARATOR, PATH_SEPARATOR, join_paths};
pub use crate::context::{StepTiming, TaskContext};
pub use crate::error::*;
pub use crate::executor::KotlinJvmTaskExecutor;
pub use crate::io::ensure_directories;
#[cfg(feature = "logging")]
pub use crate::logging::init_logging;
pub use crate::sources::{SourceKind, is_jvm_source_file, partition_jvm_sources};
pub use crate::task::*;
pub use crate::toolchain::{
    KAPT_PLUGIN_ID, KaptEncoder, KotlinCompiler, PluginArgsEncoder, ProcessCompiler,
};
