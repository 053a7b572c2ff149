//! logweave weaver
//!
//! Build-time instrumentation for compiled modules. Every type that holds a
//! private readonly `ILogger<T>` field gets a logging call at the start of
//! each of its instance methods, formatted with the method's parameter
//! names and values, and optionally a second call before every return.
//!
//! ```text
//! Module ──► Weaver::execute
//!              ├─ matcher   find LoggerExtensions.LogInformation in references
//!              ├─ synth     resolve Array.Empty<object>() when exit logging is on
//!              └─ per type with a logger field (discover)
//!                   └─ per instance method: plan_method ─► apply_plan (splice)
//! ```

#![warn(rust_2018_idioms)]

pub mod config;
pub mod discover;
pub mod error;
pub mod matcher;
pub mod report;
pub mod resolver;
pub mod splice;
pub mod synth;
pub mod weaver;

pub use config::{CallablePattern, ConfigError, FieldPattern, WeaverConfig, DEFAULT_SCAN_MODULES};
pub use discover::{field_ref, find_logger_field};
pub use error::{HelperError, MatchError, ResolveError, SpliceError, WeaveError, WeaveResult};
pub use matcher::{find_in_module, find_logging_callable, is_logging_callable};
pub use report::{Diagnostic, DiagnosticLevel, InstrumentedMethod, SkippedMethod, WeaveReport};
pub use resolver::{DirectoryResolver, MemoryResolver, ModuleResolver};
pub use splice::{apply_plan, insert_before, plan_method, Applied, ExitMode, MethodPlan};
pub use synth::{
    build_entry_sequence, build_exit_sequence, find_empty_array_method, format_string,
    InjectionSequence,
};
pub use weaver::Weaver;
