//! Module format
//!
//! A module is the unit the rewriter works on: its declared types with their
//! fields, methods and bodies, plus the names of the external modules it
//! references. Modules persist as JSON.

use crate::body::MethodBody;
use crate::types::{TypeName, TypeSig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Module loading and saving errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or structurally invalid JSON
    #[error("Invalid module JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reference to an external module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleReference {
    /// Module name
    pub name: String,
    /// Version, if the reference pins one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ModuleReference {
    /// Unversioned reference
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }
}

/// Member accessibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Accessible only inside the declaring type
    #[default]
    Private,
    /// Accessible to subtypes in the same module
    FamilyAndAssembly,
    /// Accessible inside the declaring module
    Assembly,
    /// Accessible to subtypes
    Family,
    /// Accessible to subtypes or inside the declaring module
    FamilyOrAssembly,
    /// Accessible everywhere
    Public,
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Declared type
    pub field_type: TypeSig,
    /// Accessibility
    #[serde(default)]
    pub visibility: Visibility,
    /// Whether the field is static
    #[serde(default)]
    pub is_static: bool,
    /// Whether the field can only be assigned during construction
    #[serde(default)]
    pub is_init_only: bool,
}

/// Formal parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    /// Declared name
    pub name: String,
    /// Declared type
    pub param_type: TypeSig,
}

impl ParamDef {
    /// Create a parameter
    pub fn new(name: impl Into<String>, param_type: TypeSig) -> Self {
        Self {
            name: name.into(),
            param_type,
        }
    }
}

/// Method definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDef {
    /// Method name (`.ctor` / `.cctor` for constructors)
    pub name: String,
    /// Accessibility
    #[serde(default)]
    pub visibility: Visibility,
    /// Whether the method is static
    #[serde(default)]
    pub is_static: bool,
    /// Generic parameter names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_params: Vec<String>,
    /// Formal parameters, in declaration order
    #[serde(default)]
    pub params: Vec<ParamDef>,
    /// Return type
    #[serde(default = "void")]
    pub return_type: TypeSig,
    /// Body, absent for abstract and extern methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MethodBody>,
}

fn void() -> TypeSig {
    TypeSig::Void
}

impl MethodDef {
    /// Whether this is an instance or type constructor
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }

    /// Whether the method has a body
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Whether the method declares generic parameters
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// Whether `ret` leaves a value on the stack
    pub fn returns_value(&self) -> bool {
        self.return_type != TypeSig::Void
    }

    /// Types of the argument slots, `this` first on instance methods
    pub fn argument_types(&self, declaring: &TypeDef) -> Vec<TypeSig> {
        let receiver = (!self.is_static).then(|| declaring.self_type());
        receiver
            .into_iter()
            .chain(self.params.iter().map(|p| p.param_type.clone()))
            .collect()
    }

    /// Full name: `ReturnType DeclaringType::Name(ParamTypes)`
    pub fn full_name(&self, declaring: &TypeDef) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| p.param_type.full_name())
            .collect();
        format!(
            "{} {}::{}({})",
            self.return_type.full_name(),
            declaring.full_name(),
            self.name,
            params.join(",")
        )
    }
}

/// Type definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    /// Namespace (empty for the global namespace)
    #[serde(default)]
    pub namespace: String,
    /// Type name, including the generic arity suffix
    pub name: String,
    /// Whether this is a value type
    #[serde(default)]
    pub is_value_type: bool,
    /// Generic parameter names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_params: Vec<String>,
    /// Fields, in declaration order
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Methods, in declaration order
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Create an empty type
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            is_value_type: false,
            generic_params: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Namespace-qualified name
    pub fn type_name(&self) -> TypeName {
        TypeName::new(self.namespace.clone(), self.name.clone())
    }

    /// Full name: `Namespace.Name`
    pub fn full_name(&self) -> String {
        self.type_name().full_name()
    }

    /// The type as seen from inside its own methods
    ///
    /// Generic types are instantiated over their own parameters (`Foo<!0>`),
    /// which is how member references made from within the type read.
    pub fn self_type(&self) -> TypeSig {
        if self.generic_params.is_empty() {
            if self.is_value_type {
                TypeSig::ValueType(self.type_name())
            } else {
                TypeSig::Class(self.type_name())
            }
        } else {
            TypeSig::GenericInst {
                definition: self.type_name(),
                value_type: self.is_value_type,
                args: (0..self.generic_params.len() as u16).map(TypeSig::Var).collect(),
            }
        }
    }

    /// Whether the type declares any methods
    pub fn has_methods(&self) -> bool {
        !self.methods.is_empty()
    }

    /// First method with the given name
    pub fn find_method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// First field with the given name
    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A compiled module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Module defining the base object type, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_library: Option<String>,
    /// Referenced external modules, in declaration order
    #[serde(default)]
    pub references: Vec<ModuleReference>,
    /// Declared types, in declaration order
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

impl Module {
    /// Create a new empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            core_library: None,
            references: Vec::new(),
            types: Vec::new(),
        }
    }

    /// First type with the given namespace and name
    pub fn find_type(&self, namespace: &str, name: &str) -> Option<&TypeDef> {
        self.types
            .iter()
            .find(|t| t.namespace == namespace && t.name == name)
    }

    /// Parse a module from JSON
    pub fn from_json(json: &str) -> Result<Self, ModuleError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the module to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ModuleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a module from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write the module to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModuleError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
