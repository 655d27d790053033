//! Shared fixtures: a small DSL for building host-program type tables.

#![allow(dead_code)]

use verigen::analysis::{self, Analysis, Config};
use verigen::diagnostics::{AnalysisError, SourceContext};
use verigen::model::{ConstDecl, FieldDecl, MethodSig, Span, Type, TypeId, TypeKind, TypeTable};
use verigen::rules::Registry;

/// The package path validator structs are declared in by default.
pub const APP_PKG: &str = "example.com/app";

pub struct HostTypes {
    pub table: TypeTable,
    pub string: TypeId,
    pub int: TypeId,
    pub float64: TypeId,
    pub boolean: TypeId,
    pub any: TypeId,
    pub error: TypeId,
    pub any_slice: TypeId,
}

impl HostTypes {
    pub fn new() -> Self {
        let mut table = TypeTable::new();
        let string = table.add(Type::basic(TypeKind::String));
        let int = table.add(Type::basic(TypeKind::Int));
        let float64 = table.add(Type::basic(TypeKind::Float64));
        let boolean = table.add(Type::basic(TypeKind::Bool));
        let any = table.add(Type {
            kind: TypeKind::Interface,
            is_empty_interface: true,
            ..Type::default()
        });
        let error = table.add(Type {
            kind: TypeKind::Interface,
            name: "error".into(),
            ..Type::default()
        });
        let any_slice = table.add(Type {
            kind: TypeKind::Slice,
            elem: Some(any),
            ..Type::default()
        });
        Self {
            table,
            string,
            int,
            float64,
            boolean,
            any,
            error,
            any_slice,
        }
    }

    pub fn ptr(&mut self, elem: TypeId) -> TypeId {
        self.table.add(Type {
            kind: TypeKind::Ptr,
            elem: Some(elem),
            ..Type::default()
        })
    }

    pub fn slice(&mut self, elem: TypeId) -> TypeId {
        self.table.add(Type {
            kind: TypeKind::Slice,
            elem: Some(elem),
            ..Type::default()
        })
    }

    pub fn array(&mut self, len: u64, elem: TypeId) -> TypeId {
        self.table.add(Type {
            kind: TypeKind::Array,
            array_len: len,
            elem: Some(elem),
            ..Type::default()
        })
    }

    pub fn map(&mut self, key: TypeId, elem: TypeId) -> TypeId {
        self.table.add(Type {
            kind: TypeKind::Map,
            key: Some(key),
            elem: Some(elem),
            ..Type::default()
        })
    }

    /// A named basic type declared in the application package.
    pub fn named(&mut self, name: &str, kind: TypeKind) -> TypeId {
        self.table.add(Type {
            kind,
            name: name.into(),
            pkg_path: APP_PKG.into(),
            pkg_name: "app".into(),
            is_exported: true,
            ..Type::default()
        })
    }

    /// A named basic type with an `IsValid() bool` method.
    pub fn named_with_is_valid(&mut self, name: &str, kind: TypeKind) -> TypeId {
        let boolean = self.boolean;
        self.table.add(Type {
            kind,
            name: name.into(),
            pkg_path: APP_PKG.into(),
            pkg_name: "app".into(),
            is_exported: true,
            methods: vec![MethodSig {
                name: "IsValid".into(),
                params: vec![],
                results: vec![boolean],
                is_variadic: false,
            }],
            ..Type::default()
        })
    }

    /// Declares a typed constant of the given named type.
    pub fn constant(&mut self, name: &str, type_id: TypeId) {
        let pkg_path = self.table.get(type_id).pkg_path.clone();
        self.table.consts.push(ConstDecl {
            name: name.into(),
            pkg_path,
            type_id,
        });
    }

    /// An anonymous-package struct used as a nested field type.
    pub fn strukt(&mut self, name: &str, fields: Vec<FieldDecl>) -> TypeId {
        self.table.add(Type {
            kind: TypeKind::Struct,
            name: name.into(),
            pkg_path: APP_PKG.into(),
            pkg_name: "app".into(),
            is_exported: true,
            fields,
            ..Type::default()
        })
    }

    /// A validator struct type with optional hook methods.
    pub fn validator(&mut self, name: &str, fields: Vec<FieldDecl>) -> TypeId {
        self.validator_with_hooks(name, fields, &[])
    }

    pub fn validator_with_hooks(
        &mut self,
        name: &str,
        fields: Vec<FieldDecl>,
        hooks: &[&str],
    ) -> TypeId {
        let error = self.error;
        let methods = hooks
            .iter()
            .map(|h| MethodSig {
                name: (*h).to_string(),
                params: vec![],
                results: vec![error],
                is_variadic: false,
            })
            .collect();
        self.table.add(Type {
            kind: TypeKind::Struct,
            name: name.into(),
            pkg_path: APP_PKG.into(),
            pkg_name: "app".into(),
            is_exported: true,
            fields,
            methods,
            ..Type::default()
        })
    }

    /// A type satisfying the error constructor capability.
    pub fn error_constructor(&mut self) -> TypeId {
        let (string, any, any_slice, error) = (self.string, self.any, self.any_slice, self.error);
        self.table.add(Type {
            kind: TypeKind::Struct,
            name: "ErrorConstructor".into(),
            pkg_path: APP_PKG.into(),
            pkg_name: "app".into(),
            is_exported: true,
            methods: vec![MethodSig {
                name: "Error".into(),
                params: vec![string, any, string, any_slice],
                results: vec![error],
                is_variadic: true,
            }],
            ..Type::default()
        })
    }

    /// A type satisfying the error aggregator capability.
    pub fn error_aggregator(&mut self) -> TypeId {
        let (string, any, any_slice, error) = (self.string, self.any, self.any_slice, self.error);
        self.table.add(Type {
            kind: TypeKind::Struct,
            name: "ErrorAggregator".into(),
            pkg_path: APP_PKG.into(),
            pkg_name: "app".into(),
            is_exported: true,
            methods: vec![
                MethodSig {
                    name: "Error".into(),
                    params: vec![string, any, string, any_slice],
                    results: vec![],
                    is_variadic: true,
                },
                MethodSig {
                    name: "Out".into(),
                    params: vec![],
                    results: vec![error],
                    is_variadic: false,
                },
            ],
            ..Type::default()
        })
    }
}

pub fn field(name: &str, tag: &str, type_id: TypeId) -> FieldDecl {
    FieldDecl {
        name: name.into(),
        tag: tag.into(),
        type_id: Some(type_id),
        is_embedded: false,
        is_exported: name.chars().next().is_some_and(|c| c.is_uppercase()),
        span: Span::default(),
    }
}

pub fn src() -> SourceContext {
    SourceContext::from_file("app/validators.src", "// host declarations under test")
}

pub fn analyze(ht: &HostTypes, target: TypeId) -> Result<Analysis, AnalysisError> {
    analysis::analyze(
        &ht.table,
        target,
        &src(),
        Span::default(),
        &Config::default(),
        &Registry::new(),
    )
}

pub fn analyze_with(
    ht: &HostTypes,
    target: TypeId,
    config: &Config,
    registry: &Registry,
) -> Result<Analysis, AnalysisError> {
    analysis::analyze(&ht.table, target, &src(), Span::default(), config, registry)
}

pub fn analyze_ok(ht: &HostTypes, target: TypeId) -> Analysis {
    analyze(ht, target).expect("analysis should succeed")
}

/// Analyzes and synthesizes, returning the pretty-printed Validate method.
pub fn validate_method(ht: &HostTypes, target: TypeId) -> String {
    let an = analyze_ok(ht, target);
    let registry = Registry::new();
    let file = verigen::codegen::synthesize(&an, &ht.table, &registry);
    file.decls[0].pretty()
}
