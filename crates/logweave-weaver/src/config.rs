//! Weaver configuration (logweave.toml)
//!
//! Every field has a default, so an empty file configures the standard
//! `ILogger<T>` / `LoggerExtensions.LogInformation` patterns with entry
//! logging only.

use logweave_il::{TypeName, TypeSig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Modules the host must make available for type information
pub const DEFAULT_SCAN_MODULES: [&str; 4] = [
    "netstandard",
    "mscorlib",
    "Microsoft.Extensions.Logging",
    "Microsoft.Extensions.Logging.Abstractions",
];

/// Weaver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeaverConfig {
    /// Also log before every return
    #[serde(default)]
    pub exit_logging: bool,

    /// Message passed to the logging call on exit
    #[serde(default = "default_exit_message")]
    pub exit_message: String,

    /// Modules searched for the core library's `System.Array`
    #[serde(default = "default_scan_modules")]
    pub scan_modules: Vec<String>,

    /// Which field carries the logger
    #[serde(default)]
    pub logger_field: FieldPattern,

    /// Which external method performs the logging
    #[serde(default)]
    pub logging_callable: CallablePattern,
}

fn default_exit_message() -> String {
    "Method exit".to_string()
}

fn default_scan_modules() -> Vec<String> {
    DEFAULT_SCAN_MODULES.iter().map(|s| s.to_string()).collect()
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            exit_logging: false,
            exit_message: default_exit_message(),
            scan_modules: default_scan_modules(),
            logger_field: FieldPattern::default(),
            logging_callable: CallablePattern::default(),
        }
    }
}

impl WeaverConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: WeaverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging_callable.method.is_empty() {
            return Err(ConfigError::ValidationError(
                "Logging method name cannot be empty".to_string(),
            ));
        }
        if self.logging_callable.declaring_type.is_empty() {
            return Err(ConfigError::ValidationError(
                "Logging declaring type cannot be empty".to_string(),
            ));
        }
        if self.logging_callable.parameters.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Logging method {} must match at least one parameter",
                self.logging_callable.method
            )));
        }
        if self.logger_field.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "Logger field type name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pattern for the logger-carrying field
///
/// The field must be private, assign-once and non-static; its declared type
/// must be an instance of this open generic type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldPattern {
    /// Namespace of the open generic type
    #[serde(default = "default_logging_namespace")]
    pub namespace: String,

    /// Name of the open generic type, with arity suffix
    #[serde(default = "default_logger_type")]
    pub name: String,
}

fn default_logging_namespace() -> String {
    "Microsoft.Extensions.Logging".to_string()
}

fn default_logger_type() -> String {
    "ILogger`1".to_string()
}

impl Default for FieldPattern {
    fn default() -> Self {
        Self {
            namespace: default_logging_namespace(),
            name: default_logger_type(),
        }
    }
}

impl FieldPattern {
    /// Whether `ty` is an instantiation of the pattern's open generic type
    pub fn matches(&self, ty: &TypeSig) -> bool {
        ty.open_definition().is_some_and(|definition: &TypeName| {
            definition.namespace == self.namespace && definition.name == self.name
        })
    }
}

/// Pattern for the logging callable
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallablePattern {
    /// Namespace of the declaring type
    #[serde(default = "default_logging_namespace")]
    pub namespace: String,

    /// Declaring type name
    #[serde(default = "default_declaring_type")]
    pub declaring_type: String,

    /// Method name
    #[serde(default = "default_method")]
    pub method: String,

    /// Full names of the leading parameters, in order
    #[serde(default = "default_parameters")]
    pub parameters: Vec<String>,
}

fn default_declaring_type() -> String {
    "LoggerExtensions".to_string()
}

fn default_method() -> String {
    "LogInformation".to_string()
}

fn default_parameters() -> Vec<String> {
    vec![
        "Microsoft.Extensions.Logging.ILogger".to_string(),
        "System.String".to_string(),
        "System.Object[]".to_string(),
    ]
}

impl Default for CallablePattern {
    fn default() -> Self {
        Self {
            namespace: default_logging_namespace(),
            declaring_type: default_declaring_type(),
            method: default_method(),
            parameters: default_parameters(),
        }
    }
}

/// Short display name for a parameter full name (`System.String` -> `string`)
fn short_type_name(full_name: &str) -> String {
    let (base, suffix) = match full_name.strip_suffix("[]") {
        Some(base) => (base, "[]"),
        None => (full_name, ""),
    };
    let short = match base {
        "System.String" => "string",
        "System.Object" => "object",
        "System.Int32" => "int",
        "System.Boolean" => "bool",
        other => other.rsplit('.').next().unwrap_or(other),
    };
    format!("{}{}", short, suffix)
}

impl CallablePattern {
    /// Human-readable signature, e.g.
    /// `LoggerExtensions.LogInformation(ILogger, string, object[])`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.parameters.iter().map(|p| short_type_name(p)).collect();
        format!(
            "{}.{}({})",
            self.declaring_type,
            self.method,
            params.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = WeaverConfig::from_toml_str("").unwrap();
        assert_eq!(config, WeaverConfig::default());
        assert!(!config.exit_logging);
        assert_eq!(config.exit_message, "Method exit");
        assert_eq!(config.scan_modules.len(), 4);
        assert_eq!(config.logger_field.name, "ILogger`1");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
exit_logging = true
exit_message = "Leaving"
scan_modules = ["System.Private.CoreLib"]

[logger_field]
namespace = "Acme.Logging"
name = "ITracer`1"

[logging_callable]
namespace = "Acme.Logging"
declaring_type = "TracerExtensions"
method = "Trace"
parameters = ["Acme.Logging.ITracer", "System.String", "System.Object[]"]
"#;

        let config = WeaverConfig::from_toml_str(toml).unwrap();
        assert!(config.exit_logging);
        assert_eq!(config.exit_message, "Leaving");
        assert_eq!(config.scan_modules, vec!["System.Private.CoreLib"]);
        assert_eq!(config.logger_field.namespace, "Acme.Logging");
        assert_eq!(config.logging_callable.method, "Trace");
    }

    #[test]
    fn test_partial_table_keeps_other_defaults() {
        let config = WeaverConfig::from_toml_str("[logging_callable]\nmethod = \"LogDebug\"\n").unwrap();
        assert_eq!(config.logging_callable.method, "LogDebug");
        assert_eq!(config.logging_callable.declaring_type, "LoggerExtensions");
        assert_eq!(config.logging_callable.parameters.len(), 3);
    }

    #[test]
    fn test_invalid_empty_method_name() {
        let result = WeaverConfig::from_toml_str("[logging_callable]\nmethod = \"\"\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_no_parameters() {
        let result = WeaverConfig::from_toml_str("[logging_callable]\nparameters = []\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_empty_field_type() {
        let result = WeaverConfig::from_toml_str("[logger_field]\nname = \"\"\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = WeaverConfig::from_toml_str("exit_logging = \"yes\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logweave.toml");
        std::fs::write(&path, "exit_logging = true\n").unwrap();

        let config = WeaverConfig::from_file(&path).unwrap();
        assert!(config.exit_logging);
        assert!(matches!(
            WeaverConfig::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_signature_rendering() {
        assert_eq!(
            CallablePattern::default().signature(),
            "LoggerExtensions.LogInformation(ILogger, string, object[])"
        );
    }

    #[test]
    fn test_field_pattern_matches_any_argument() {
        let pattern = FieldPattern::default();
        let logger_of = |arg: TypeSig| TypeSig::GenericInst {
            definition: TypeName::new("Microsoft.Extensions.Logging", "ILogger`1"),
            value_type: false,
            args: vec![arg],
        };

        assert!(pattern.matches(&logger_of(TypeSig::class("App", "Worker"))));
        assert!(pattern.matches(&logger_of(TypeSig::Var(0))));
        assert!(!pattern.matches(&TypeSig::class("Microsoft.Extensions.Logging", "ILogger")));
        assert!(!pattern.matches(&TypeSig::String));
    }
}
