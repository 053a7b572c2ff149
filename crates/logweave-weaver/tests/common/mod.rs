//! Shared fixtures for weaver integration tests

#![allow(dead_code)]

use logweave_il::{
    ExceptionHandler, FieldDef, FieldRef, HandlerKind, Instruction, MethodBody, MethodDef,
    MethodRef, Module, ModuleReference, Opcode, ParamDef, TypeDef, TypeName, TypeSig, Visibility,
};
use logweave_weaver::MemoryResolver;

pub const ABSTRACTIONS: &str = "Microsoft.Extensions.Logging.Abstractions";
pub const CORE_LIBRARY: &str = "System.Private.CoreLib";

pub fn logger_of(ty: TypeSig) -> TypeSig {
    TypeSig::GenericInst {
        definition: TypeName::new("Microsoft.Extensions.Logging", "ILogger`1"),
        value_type: false,
        args: vec![ty],
    }
}

pub fn test_type() -> TypeSig {
    TypeSig::class("SmokeTest", "Test")
}

pub fn logger_field() -> FieldDef {
    FieldDef {
        name: "_logger".to_string(),
        field_type: logger_of(test_type()),
        visibility: Visibility::Private,
        is_static: false,
        is_init_only: true,
    }
}

pub fn logger_ref() -> FieldRef {
    FieldRef {
        declaring_type: test_type(),
        name: "_logger".to_string(),
        field_type: logger_of(test_type()),
    }
}

pub fn method(name: &str, params: Vec<ParamDef>, return_type: TypeSig, body: MethodBody) -> MethodDef {
    MethodDef {
        name: name.to_string(),
        visibility: Visibility::Public,
        is_static: false,
        generic_params: Vec::new(),
        params,
        return_type,
        body: Some(body),
    }
}

pub fn int_params(names: &[&str]) -> Vec<ParamDef> {
    names.iter().map(|n| ParamDef::new(*n, TypeSig::I4)).collect()
}

fn log_information(generic: bool) -> MethodDef {
    let params = vec![
        ParamDef::new("logger", TypeSig::class("Microsoft.Extensions.Logging", "ILogger")),
        ParamDef::new("message", TypeSig::String),
        ParamDef::new("args", TypeSig::object_array()),
    ];
    MethodDef {
        name: "LogInformation".to_string(),
        visibility: Visibility::Public,
        is_static: true,
        generic_params: if generic { vec!["T0".to_string()] } else { Vec::new() },
        params,
        return_type: TypeSig::Void,
        body: None,
    }
}

/// Logging abstractions; the generic overload is declared first
pub fn abstractions() -> Module {
    let mut extensions = TypeDef::new("Microsoft.Extensions.Logging", "LoggerExtensions");
    extensions.methods.push(log_information(true));
    extensions.methods.push(log_information(false));

    let mut module = Module::new(ABSTRACTIONS);
    module.types.push(extensions);
    module
}

/// Core library defining `System.Array::Empty<T>()`
pub fn core_library() -> Module {
    let mut array = TypeDef::new("System", "Array");
    array.methods.push(MethodDef {
        name: "Empty".to_string(),
        visibility: Visibility::Public,
        is_static: true,
        generic_params: vec!["T".to_string()],
        params: Vec::new(),
        return_type: TypeSig::array_of(TypeSig::MVar(0)),
        body: None,
    });

    let mut module = Module::new(CORE_LIBRARY);
    module.types.push(array);
    module
}

pub fn resolver() -> MemoryResolver {
    MemoryResolver::new()
        .with_module(abstractions())
        .with_module(core_library())
}

fn instance_call(name: &str) -> Instruction {
    Instruction::call(MethodRef {
        scope: None,
        declaring_type: test_type(),
        name: name.to_string(),
        has_this: true,
        params: vec![TypeSig::I4, TypeSig::I4],
        return_type: TypeSig::I4,
        generic_args: Vec::new(),
    })
}

fn binary(op: Opcode) -> MethodBody {
    let mut body = MethodBody::from_instructions(vec![
        Instruction::ldarg(1),
        Instruction::ldarg(2),
        Instruction::simple(op),
        Instruction::ret(),
    ]).unwrap();
    body.max_stack = 2;
    body
}

/// `int DoSomething(int oo, int bb) => SumNumbers(ProductOfNumbers(oo, 3), bb);`
pub fn do_something_body() -> MethodBody {
    let mut body = MethodBody::from_instructions(vec![
        Instruction::ldarg(0),
        Instruction::ldarg(0),
        Instruction::ldarg(1),
        Instruction::ldc_i4(3),
        instance_call("ProductOfNumbers"),
        Instruction::ldarg(2),
        instance_call("SumNumbers"),
        Instruction::ret(),
    ]).unwrap();
    body.max_stack = 4;
    body
}

/// `int Max(int a, int b) { if (a > b) return a; return b; }`
pub fn max_body() -> MethodBody {
    let mut body = MethodBody::new();
    let return_b = body.instructions.push(Instruction::ldarg(2)).unwrap();
    body.instructions.push(Instruction::ret()).unwrap();
    for instr in [
        Instruction::ldarg(1),
        Instruction::ldarg(2),
        Instruction::branch(Opcode::Ble, return_b),
        Instruction::ldarg(1),
        Instruction::ret(),
    ] {
        body.instructions.insert_before(return_b, instr).unwrap();
    }
    body.max_stack = 2;
    body
}

/// `void Guarded() { try { } finally { } }`
pub fn guarded_body() -> MethodBody {
    let mut body = MethodBody::new();
    let try_start = body.instructions.push(Instruction::simple(Opcode::Nop)).unwrap();
    let leave = body.instructions.push(Instruction::simple(Opcode::Nop)).unwrap();
    let handler_start = body.instructions.push(Instruction::simple(Opcode::Nop)).unwrap();
    body.instructions.push(Instruction::simple(Opcode::Endfinally)).unwrap();
    let end = body.instructions.push(Instruction::ret()).unwrap();

    if let Some(instr) = body.instructions.get_mut(leave) {
        *instr = Instruction::branch(Opcode::Leave, end);
    }
    body.handlers.push(ExceptionHandler {
        kind: HandlerKind::Finally,
        try_start,
        try_end: Some(handler_start),
        handler_start,
        handler_end: Some(end),
    });
    body.max_stack = 0;
    body
}

fn constructor() -> MethodDef {
    let mut body = MethodBody::from_instructions(vec![
        Instruction::ldarg(0),
        Instruction::ldarg(1),
        Instruction::new(Opcode::Stfld, logweave_il::Operand::Field(logger_ref())),
        Instruction::ret(),
    ]).unwrap();
    body.max_stack = 2;
    method(
        ".ctor",
        vec![ParamDef::new("logger", logger_of(test_type()))],
        TypeSig::Void,
        body,
    )
}

/// `SmokeTest.Test` with its logger field and every sample method
pub fn smoke_type() -> TypeDef {
    let mut ty = TypeDef::new("SmokeTest", "Test");
    ty.fields.push(logger_field());
    ty.methods.push(constructor());
    ty.methods.push(method(
        "SumNumbers",
        int_params(&["a", "b"]),
        TypeSig::I4,
        binary(Opcode::Add),
    ));
    ty.methods.push(method(
        "ProductOfNumbers",
        int_params(&["a", "b"]),
        TypeSig::I4,
        binary(Opcode::Mul),
    ));
    ty.methods.push(method(
        "DoSomething",
        int_params(&["oo", "bb"]),
        TypeSig::I4,
        do_something_body(),
    ));
    ty.methods.push(method("Max", int_params(&["a", "b"]), TypeSig::I4, max_body()));
    ty.methods.push(method("Guarded", Vec::new(), TypeSig::Void, guarded_body()));

    let mut factory = method(
        "Create",
        Vec::new(),
        TypeSig::Void,
        MethodBody::from_instructions(vec![Instruction::ret()]).unwrap(),
    );
    factory.is_static = true;
    ty.methods.push(factory);
    ty
}

/// A type with methods but no logger
pub fn plain_type() -> TypeDef {
    let mut ty = TypeDef::new("SmokeTest", "Plain");
    ty.methods.push(method(
        "Run",
        Vec::new(),
        TypeSig::Void,
        MethodBody::from_instructions(vec![Instruction::simple(Opcode::Nop), Instruction::ret()]).unwrap(),
    ));
    ty
}

/// The module under rewrite
pub fn smoke_test() -> Module {
    let mut module = Module::new("SmokeTest");
    module.core_library = Some(CORE_LIBRARY.to_string());
    module.references = vec![
        ModuleReference::new(CORE_LIBRARY),
        ModuleReference::new(ABSTRACTIONS),
    ];
    module.types.push(smoke_type());
    module.types.push(plain_type());
    module
}

pub fn find_method<'a>(module: &'a Module, type_name: &str, name: &str) -> &'a MethodDef {
    module
        .types
        .iter()
        .find(|ty| ty.name == type_name)
        .and_then(|ty| ty.find_method(name))
        .unwrap_or_else(|| panic!("{}::{} not in module", type_name, name))
}

pub fn body<'a>(module: &'a Module, type_name: &str, name: &str) -> &'a MethodBody {
    find_method(module, type_name, name)
        .body
        .as_ref()
        .unwrap_or_else(|| panic!("{}::{} has no body", type_name, name))
}

pub fn ops(body: &MethodBody) -> Vec<Opcode> {
    body.instructions.iter().map(|(_, instr)| instr.op).collect()
}
