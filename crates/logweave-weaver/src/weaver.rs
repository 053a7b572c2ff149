//! Weaver driver
//!
//! One pass over a module: resolve the logging callable once, resolve the
//! empty-array helper once when exit logging is on, then instrument every
//! instance method with a body on every type that carries a logger field.

use crate::config::{ConfigError, WeaverConfig};
use crate::discover::{field_ref, find_logger_field};
use crate::error::{WeaveError, WeaveResult};
use crate::matcher::find_logging_callable;
use crate::report::{InstrumentedMethod, WeaveReport};
use crate::resolver::ModuleResolver;
use crate::splice::{apply_plan, plan_method, ExitMode};
use crate::synth::find_empty_array_method;
use logweave_il::{MethodDef, Module};
use std::path::Path;
use tracing::{debug, trace};

/// The logging weaver
#[derive(Debug, Clone, Default)]
pub struct Weaver {
    config: WeaverConfig,
}

impl Weaver {
    /// Create a weaver with the given configuration
    pub fn new(config: WeaverConfig) -> Self {
        Self { config }
    }

    /// Create a weaver from a `logweave.toml` file
    pub fn from_config_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(WeaverConfig::from_file(path)?))
    }

    /// The active configuration
    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    /// Modules the host must make available for type information
    pub fn assemblies_for_scanning(&self) -> &[String] {
        &self.config.scan_modules
    }

    /// Whether `method` receives logging calls
    fn is_candidate(method: &MethodDef) -> bool {
        !method.is_constructor() && !method.is_static && method.has_body()
    }

    /// Instrument `module` in place
    ///
    /// Never fails as a whole: missing dependencies and per-method failures
    /// are recorded in the returned report. Running the pass twice
    /// instruments twice.
    pub fn execute<R: ModuleResolver + ?Sized>(
        &self,
        module: &mut Module,
        resolver: &R,
    ) -> WeaveReport {
        let mut report = WeaveReport::new();

        let callable = match find_logging_callable(
            module,
            resolver,
            &self.config.logging_callable,
            &mut report,
        ) {
            Ok(callable) => callable,
            Err(err) => {
                report.warning(err.to_string());
                return report;
            }
        };
        report.callable = Some(callable.clone());

        let helper = self
            .config
            .exit_logging
            .then(|| find_empty_array_method(module, resolver, &self.config.scan_modules));
        let exit = match &helper {
            None => ExitMode::Disabled,
            Some(Ok(empty_array)) => ExitMode::Enabled {
                empty_array,
                message: &self.config.exit_message,
            },
            Some(Err(err)) => {
                report.error(err.to_string());
                ExitMode::Unavailable(err)
            }
        };

        for ty in &mut module.types {
            let logger = match find_logger_field(ty, &self.config.logger_field) {
                Some(field) => field_ref(ty, field),
                None => {
                    trace!(type_name = %ty.full_name(), "no logger field");
                    continue;
                }
            };
            let type_name = ty.full_name();
            debug!(type_name = %type_name, field = %logger.name, "instrumenting type");

            for method in ty.methods.iter_mut().filter(|m| Self::is_candidate(m)) {
                let applied = plan_method(method, &logger, &callable, exit)
                    .and_then(|plan| apply_plan(method, plan).map_err(WeaveError::from));
                match applied {
                    Ok(applied) => {
                        debug!(
                            type_name = %type_name,
                            method = %method.name,
                            exit_sites = applied.exit_sites,
                            "instrumented method"
                        );
                        if let Some(body) = &method.body {
                            trace!("{}::{}\n{}", type_name, method.name, body.listing());
                        }
                        report.instrumented.push(InstrumentedMethod {
                            type_name: type_name.clone(),
                            method: method.name.clone(),
                            entry: applied.entry,
                            exit_sites: applied.exit_sites,
                        });
                    }
                    Err(err) => report.skip(&type_name, &method.name, err),
                }
            }
        }

        report
    }

    /// Load a module file, instrument it, and write the result
    pub fn weave_file<R: ModuleResolver + ?Sized>(
        &self,
        input: &Path,
        output: &Path,
        resolver: &R,
    ) -> WeaveResult<WeaveReport> {
        let mut module = Module::load(input)?;
        let report = self.execute(&mut module, resolver);
        module.save(output)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryResolver;
    use logweave_il::{Instruction, MethodBody, Opcode, TypeSig, Visibility};

    fn method(name: &str, is_static: bool, body: Option<MethodBody>) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            visibility: Visibility::Public,
            is_static,
            generic_params: Vec::new(),
            params: Vec::new(),
            return_type: TypeSig::Void,
            body,
        }
    }

    #[test]
    fn test_candidate_filter() {
        let body = || Some(MethodBody::from_instructions(vec![Instruction::ret()]).unwrap());

        assert!(Weaver::is_candidate(&method("Run", false, body())));
        assert!(!Weaver::is_candidate(&method(".ctor", false, body())));
        assert!(!Weaver::is_candidate(&method(".cctor", true, body())));
        assert!(!Weaver::is_candidate(&method("Create", true, body())));
        assert!(!Weaver::is_candidate(&method("Abstract", false, None)));
    }

    #[test]
    fn test_assemblies_for_scanning() {
        let weaver = Weaver::default();
        assert_eq!(
            weaver.assemblies_for_scanning(),
            &[
                "netstandard",
                "mscorlib",
                "Microsoft.Extensions.Logging",
                "Microsoft.Extensions.Logging.Abstractions"
            ]
        );
    }

    #[test]
    fn test_missing_callable_skips_everything() {
        let mut module = Module::new("App");
        let mut ty = logweave_il::TypeDef::new("App", "Worker");
        ty.methods.push(method(
            "Run",
            false,
            Some(MethodBody::from_instructions(vec![Instruction::simple(Opcode::Nop), Instruction::ret()]).unwrap()),
        ));
        module.types.push(ty);

        let report = Weaver::default().execute(&mut module, &MemoryResolver::new());

        assert!(report.callable.is_none());
        assert_eq!(report.instrumented_count(), 0);
        assert_eq!(
            report.diagnostics.last().map(|d| d.message.as_str()),
            Some("Could not locate non-generic LoggerExtensions.LogInformation(ILogger, string, object[])")
        );
        let body = module.types[0].methods[0].body.as_ref().unwrap();
        assert_eq!(body.instructions.len(), 2);
    }
}
