//! Type signatures
//!
//! Types are described structurally, the way compiled metadata encodes them.
//! Names render in the host metadata's full-name syntax (`System.Int32`,
//! `System.Object[]`, ``Microsoft.Extensions.Logging.ILogger`1<App.Worker>``)
//! so discovery patterns can be written as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A namespace-qualified type name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeName {
    /// Namespace (empty for the global namespace)
    #[serde(default)]
    pub namespace: String,
    /// Simple name, including the generic arity suffix (e.g. ``ILogger`1``)
    pub name: String,
}

impl TypeName {
    /// Create a new type name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Full name: `Namespace.Name`, or just `Name` in the global namespace
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// How a value of some type occupies an object-reference slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Needs boxing to become an object reference
    Value,
    /// Already an object reference; needs at most an upcast
    Reference,
}

/// A type signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSig {
    /// `System.Void`
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Char`
    Char,
    /// `System.SByte`
    I1,
    /// `System.Byte`
    U1,
    /// `System.Int16`
    I2,
    /// `System.UInt16`
    U2,
    /// `System.Int32`
    I4,
    /// `System.UInt32`
    U4,
    /// `System.Int64`
    I8,
    /// `System.UInt64`
    U8,
    /// `System.Single`
    R4,
    /// `System.Double`
    R8,
    /// `System.IntPtr`
    #[serde(rename = "intptr")]
    IntPtr,
    /// `System.UIntPtr`
    #[serde(rename = "uintptr")]
    UIntPtr,
    /// `System.String`
    String,
    /// `System.Object`
    Object,
    /// A named reference type
    Class(TypeName),
    /// A named value type
    ValueType(TypeName),
    /// A single-dimensional, zero-based array
    Array(Box<TypeSig>),
    /// A generic type instantiated with type arguments
    GenericInst {
        /// The open generic definition
        definition: TypeName,
        /// Whether the definition is a value type
        #[serde(default)]
        value_type: bool,
        /// Type arguments
        args: Vec<TypeSig>,
    },
    /// Generic parameter of the enclosing type (`!n`)
    Var(u16),
    /// Generic parameter of the enclosing method (`!!n`)
    #[serde(rename = "mvar")]
    MVar(u16),
    /// Managed reference to a value (`T&`)
    #[serde(rename = "byref")]
    ByRef(Box<TypeSig>),
}

impl TypeSig {
    /// Named reference type
    pub fn class(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeSig::Class(TypeName::new(namespace, name))
    }

    /// Named value type
    pub fn value_type(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeSig::ValueType(TypeName::new(namespace, name))
    }

    /// Array of the given element type
    pub fn array_of(element: TypeSig) -> Self {
        TypeSig::Array(Box::new(element))
    }

    /// `System.Object[]`
    pub fn object_array() -> Self {
        TypeSig::array_of(TypeSig::Object)
    }

    /// Managed reference to the given type
    pub fn by_ref(element: TypeSig) -> Self {
        TypeSig::ByRef(Box::new(element))
    }

    /// Full name in host metadata syntax
    pub fn full_name(&self) -> String {
        match self {
            TypeSig::Void => "System.Void".to_string(),
            TypeSig::Boolean => "System.Boolean".to_string(),
            TypeSig::Char => "System.Char".to_string(),
            TypeSig::I1 => "System.SByte".to_string(),
            TypeSig::U1 => "System.Byte".to_string(),
            TypeSig::I2 => "System.Int16".to_string(),
            TypeSig::U2 => "System.UInt16".to_string(),
            TypeSig::I4 => "System.Int32".to_string(),
            TypeSig::U4 => "System.UInt32".to_string(),
            TypeSig::I8 => "System.Int64".to_string(),
            TypeSig::U8 => "System.UInt64".to_string(),
            TypeSig::R4 => "System.Single".to_string(),
            TypeSig::R8 => "System.Double".to_string(),
            TypeSig::IntPtr => "System.IntPtr".to_string(),
            TypeSig::UIntPtr => "System.UIntPtr".to_string(),
            TypeSig::String => "System.String".to_string(),
            TypeSig::Object => "System.Object".to_string(),
            TypeSig::Class(name) | TypeSig::ValueType(name) => name.full_name(),
            TypeSig::Array(element) => format!("{}[]", element.full_name()),
            TypeSig::GenericInst {
                definition, args, ..
            } => {
                let args: Vec<String> = args.iter().map(TypeSig::full_name).collect();
                format!("{}<{}>", definition.full_name(), args.join(","))
            }
            TypeSig::Var(index) => format!("!{}", index),
            TypeSig::MVar(index) => format!("!!{}", index),
            TypeSig::ByRef(element) => format!("{}&", element.full_name()),
        }
    }

    /// Whether values of this type live on the stack unboxed
    ///
    /// Generic parameters report `false` here because their instantiation is
    /// unknown; see [`TypeSig::kind`] for the storage decision.
    pub fn is_value_type(&self) -> bool {
        match self {
            TypeSig::Boolean
            | TypeSig::Char
            | TypeSig::I1
            | TypeSig::U1
            | TypeSig::I2
            | TypeSig::U2
            | TypeSig::I4
            | TypeSig::U4
            | TypeSig::I8
            | TypeSig::U8
            | TypeSig::R4
            | TypeSig::R8
            | TypeSig::IntPtr
            | TypeSig::UIntPtr
            | TypeSig::ValueType(_) => true,
            TypeSig::GenericInst { value_type, .. } => *value_type,
            _ => false,
        }
    }

    /// Whether this is an unbound generic parameter
    pub fn is_generic_parameter(&self) -> bool {
        matches!(self, TypeSig::Var(_) | TypeSig::MVar(_))
    }

    /// Classify how a value of this type becomes an object reference
    ///
    /// Generic parameters are boxed: `box` is a no-op for reference
    /// instantiations and required for value instantiations. A by-ref is
    /// classified by the type it points at.
    pub fn kind(&self) -> TypeKind {
        match self {
            TypeSig::ByRef(element) => element.kind(),
            ty if ty.is_value_type() || ty.is_generic_parameter() => TypeKind::Value,
            _ => TypeKind::Reference,
        }
    }

    /// The open generic definition, if this is a generic instance
    pub fn open_definition(&self) -> Option<&TypeName> {
        match self {
            TypeSig::GenericInst { definition, .. } => Some(definition),
            _ => None,
        }
    }

    /// The element type of a by-ref or array
    pub fn element_type(&self) -> Option<&TypeSig> {
        match self {
            TypeSig::ByRef(element) | TypeSig::Array(element) => Some(element),
            _ => None,
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_full_names() {
        assert_eq!(TypeSig::I4.full_name(), "System.Int32");
        assert_eq!(TypeSig::String.full_name(), "System.String");
        assert_eq!(TypeSig::object_array().full_name(), "System.Object[]");
        assert_eq!(TypeSig::by_ref(TypeSig::R8).full_name(), "System.Double&");
    }

    #[test]
    fn test_generic_instance_full_name() {
        let logger = TypeSig::GenericInst {
            definition: TypeName::new("Microsoft.Extensions.Logging", "ILogger`1"),
            value_type: false,
            args: vec![TypeSig::class("SmokeTest", "Test")],
        };
        assert_eq!(
            logger.full_name(),
            "Microsoft.Extensions.Logging.ILogger`1<SmokeTest.Test>"
        );
        assert_eq!(
            logger.open_definition().map(TypeName::full_name).as_deref(),
            Some("Microsoft.Extensions.Logging.ILogger`1")
        );
    }

    #[test]
    fn test_global_namespace_name() {
        assert_eq!(TypeName::new("", "Program").full_name(), "Program");
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(TypeSig::I4.kind(), TypeKind::Value);
        assert_eq!(TypeSig::value_type("System", "Guid").kind(), TypeKind::Value);
        assert_eq!(TypeSig::String.kind(), TypeKind::Reference);
        assert_eq!(TypeSig::object_array().kind(), TypeKind::Reference);
        assert_eq!(TypeSig::class("App", "Order").kind(), TypeKind::Reference);
        assert_eq!(TypeSig::Var(0).kind(), TypeKind::Value);
        assert_eq!(TypeSig::MVar(1).kind(), TypeKind::Value);
        assert_eq!(TypeSig::by_ref(TypeSig::I8).kind(), TypeKind::Value);
        assert_eq!(TypeSig::by_ref(TypeSig::String).kind(), TypeKind::Reference);
    }

    #[test]
    fn test_generic_parameter_is_not_value_type() {
        assert!(!TypeSig::Var(0).is_value_type());
        assert!(TypeSig::Var(0).is_generic_parameter());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&TypeSig::object_array()).unwrap();
        assert_eq!(json, r#"{"array":"object"}"#);
        let parsed: TypeSig = serde_json::from_str(r#"{"class":{"namespace":"App","name":"Order"}}"#).unwrap();
        assert_eq!(parsed, TypeSig::class("App", "Order"));
    }
}
