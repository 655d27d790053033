//! Language-neutral description of host-program types.
//!
//! Types are stored in an arena ([`TypeTable`]) and referenced by index
//! ([`TypeId`]), which keeps cyclic struct types representable without
//! reference counting. All nodes carry enough named identity and method-set
//! information for the analyzer to detect capabilities and check rule
//! compatibility; the source-program loader is responsible for populating
//! the table.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// A half-open byte range into the declaring source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Index of a [`Type`] in its [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

/// The specific kind of a host-program type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TypeKind {
    #[default]
    Invalid,

    // basic
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UnsafePointer,

    // composite
    Array,
    Interface,
    Map,
    Ptr,
    Slice,
    Struct,
    Chan,
    Func,
}

impl TypeKind {
    pub fn is_basic(self) -> bool {
        matches!(
            self,
            TypeKind::Bool
                | TypeKind::Int
                | TypeKind::Int8
                | TypeKind::Int16
                | TypeKind::Int32
                | TypeKind::Int64
                | TypeKind::Uint
                | TypeKind::Uint8
                | TypeKind::Uint16
                | TypeKind::Uint32
                | TypeKind::Uint64
                | TypeKind::Uintptr
                | TypeKind::Float32
                | TypeKind::Float64
                | TypeKind::Complex64
                | TypeKind::Complex128
                | TypeKind::String
                | TypeKind::UnsafePointer
        )
    }

    /// Numeric kinds; complex widths are deliberately excluded.
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeKind::Int
                | TypeKind::Int8
                | TypeKind::Int16
                | TypeKind::Int32
                | TypeKind::Int64
        ) || self.is_unsigned()
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            TypeKind::Uint
                | TypeKind::Uint8
                | TypeKind::Uint16
                | TypeKind::Uint32
                | TypeKind::Uint64
                | TypeKind::Uintptr
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypeKind::Float32 | TypeKind::Float64)
    }

    /// Kinds the host `len` builtin accepts.
    pub fn has_length(self) -> bool {
        matches!(
            self,
            TypeKind::String | TypeKind::Slice | TypeKind::Array | TypeKind::Map
        )
    }

    /// Kinds that admit a nil value.
    pub fn is_nilable(self) -> bool {
        matches!(
            self,
            TypeKind::Ptr | TypeKind::Slice | TypeKind::Map | TypeKind::Interface
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::Invalid => "<invalid>",
            TypeKind::Bool => "bool",
            TypeKind::Int => "int",
            TypeKind::Int8 => "int8",
            TypeKind::Int16 => "int16",
            TypeKind::Int32 => "int32",
            TypeKind::Int64 => "int64",
            TypeKind::Uint => "uint",
            TypeKind::Uint8 => "uint8",
            TypeKind::Uint16 => "uint16",
            TypeKind::Uint32 => "uint32",
            TypeKind::Uint64 => "uint64",
            TypeKind::Uintptr => "uintptr",
            TypeKind::Float32 => "float32",
            TypeKind::Float64 => "float64",
            TypeKind::Complex64 => "complex64",
            TypeKind::Complex128 => "complex128",
            TypeKind::String => "string",
            TypeKind::UnsafePointer => "unsafe.Pointer",
            TypeKind::Array => "array",
            TypeKind::Interface => "interface",
            TypeKind::Map => "map",
            TypeKind::Ptr => "ptr",
            TypeKind::Slice => "slice",
            TypeKind::Struct => "struct",
            TypeKind::Chan => "chan",
            TypeKind::Func => "func",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single type descriptor.
///
/// Invariants: `elem` is present exactly when the kind is array, slice, map,
/// or ptr; `key` exactly when the kind is map; `fields` is non-empty only for
/// struct kinds; a named type is identified by `(pkg_path, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Type {
    pub kind: TypeKind,
    /// Name of a named type, or empty for unnamed types.
    pub name: String,
    /// Import path of the declaring package, empty for universe types.
    pub pkg_path: String,
    /// Short name of the declaring package.
    pub pkg_name: String,
    /// Whether the type is declared outside the package under analysis.
    pub is_imported: bool,
    pub is_exported: bool,
    pub is_empty_interface: bool,
    /// The "byte" alias (uint8).
    pub is_byte: bool,
    /// The "rune" alias (int32).
    pub is_rune: bool,
    /// Array length when kind is array.
    pub array_len: u64,
    /// Map key type.
    pub key: Option<TypeId>,
    /// Array/slice/map element type, or the pointed-to type for ptr.
    pub elem: Option<TypeId>,
    /// Declared fields when kind is struct.
    pub fields: Vec<FieldDecl>,
    /// The type's method set; used for capability detection.
    pub methods: Vec<MethodSig>,
}

impl Type {
    pub fn basic(kind: TypeKind) -> Self {
        Type {
            kind,
            ..Type::default()
        }
    }

    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    /// Looks up a method by exact name.
    pub fn method(&self, name: &str) -> Option<&MethodSig> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// A raw struct field declaration as provided by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FieldDecl {
    pub name: String,
    /// The full structured tag string, e.g. `is:"required,email"`.
    pub tag: String,
    pub type_id: Option<TypeId>,
    pub is_embedded: bool,
    pub is_exported: bool,
    /// Position of the declaration in the declaring source.
    pub span: Span,
}

/// A method signature, sufficient for capability detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<TypeId>,
    pub results: Vec<TypeId>,
    pub is_variadic: bool,
}

/// A typed constant declaration, used for enum-membership rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDecl {
    pub name: String,
    pub pkg_path: String,
    pub type_id: TypeId,
}

// ============================================================================
// TYPE TABLE
// ============================================================================

/// Arena of type descriptors for one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeTable {
    types: Vec<Type>,
    /// Typed constants declared across the loaded packages.
    pub consts: Vec<ConstDecl>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, t: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(t);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    /// Mutable access for loaders that patch forward slots, e.g. to close
    /// cyclic struct types.
    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    /// The element type of a composite; panics if the table violates the
    /// composite invariant (a loader bug, not a user error).
    pub fn elem(&self, id: TypeId) -> TypeId {
        self.get(id).elem.expect("composite type has no elem")
    }

    pub fn key(&self, id: TypeId) -> TypeId {
        self.get(id).key.expect("map type has no key")
    }

    /// Strips pointer kinds down to the first non-pointer type.
    pub fn ptr_base(&self, id: TypeId) -> TypeId {
        let mut id = id;
        while self.get(id).kind == TypeKind::Ptr {
            id = self.elem(id);
        }
        id
    }

    /// Number of pointer indirections before the base type.
    pub fn ptr_depth(&self, id: TypeId) -> usize {
        let mut id = id;
        let mut n = 0;
        while self.get(id).kind == TypeKind::Ptr {
            id = self.elem(id);
            n += 1;
        }
        n
    }

    /// All typed constants whose type is `id`.
    pub fn consts_of(&self, id: TypeId) -> Vec<&ConstDecl> {
        self.consts.iter().filter(|c| c.type_id == id).collect()
    }

    // ------------------------------------------------------------------------
    // identity queries
    // ------------------------------------------------------------------------

    /// The host `error` interface: a named, package-less interface.
    pub fn is_error(&self, id: TypeId) -> bool {
        let t = self.get(id);
        t.kind == TypeKind::Interface && t.name == "error" && t.pkg_path.is_empty()
    }

    pub fn is_empty_interface(&self, id: TypeId) -> bool {
        self.get(id).is_empty_interface
    }

    pub fn is_empty_interface_slice(&self, id: TypeId) -> bool {
        let t = self.get(id);
        t.kind == TypeKind::Slice && t.elem.is_some_and(|e| self.is_empty_interface(e))
    }

    pub fn is_string(&self, id: TypeId) -> bool {
        self.get(id).kind == TypeKind::String
    }

    pub fn is_bool(&self, id: TypeId) -> bool {
        self.get(id).kind == TypeKind::Bool
    }

    // ------------------------------------------------------------------------
    // equality & convertibility
    // ------------------------------------------------------------------------

    /// Reports whether two types are equal. Unnamed struct, non-empty
    /// interface, func, and chan types are not handled and compare unequal.
    pub fn equal(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        let (ta, tb) = (self.get(a), self.get(b));
        if ta.kind != tb.kind {
            return false;
        }

        if ta.is_named() || tb.is_named() {
            return ta.name == tb.name && ta.pkg_path == tb.pkg_path;
        }
        if ta.kind.is_basic() {
            return true; // same kind, both unnamed
        }

        match ta.kind {
            TypeKind::Array => {
                ta.array_len == tb.array_len && self.equal(self.elem(a), self.elem(b))
            }
            TypeKind::Map => {
                self.equal(self.key(a), self.key(b)) && self.equal(self.elem(a), self.elem(b))
            }
            TypeKind::Slice | TypeKind::Ptr => self.equal(self.elem(a), self.elem(b)),
            TypeKind::Interface => ta.is_empty_interface && tb.is_empty_interface,
            _ => false,
        }
    }

    /// Reports whether a value of type `from` can be used where `to` is
    /// expected, per the conversion rules of the rule checker.
    pub fn convertible(&self, from: TypeId, to: TypeId) -> bool {
        if self.equal(from, to) {
            return true;
        }
        let (tf, tt) = (self.get(from), self.get(to));
        if tt.is_empty_interface {
            return true;
        }
        if tf.kind.is_basic() && tf.kind == tt.kind {
            return true;
        }
        if tf.kind.is_numeric() && tt.kind.is_numeric() {
            return true;
        }
        if self.is_string_byte_pair(from, to) || self.is_string_byte_pair(to, from) {
            return true;
        }
        match (tf.kind, tt.kind) {
            (TypeKind::Slice, TypeKind::Slice) | (TypeKind::Ptr, TypeKind::Ptr) => {
                self.equal(self.elem(from), self.elem(to))
            }
            (TypeKind::Array, TypeKind::Array) => {
                tf.array_len == tt.array_len && self.equal(self.elem(from), self.elem(to))
            }
            (TypeKind::Map, TypeKind::Map) => {
                self.equal(self.key(from), self.key(to))
                    && self.equal(self.elem(from), self.elem(to))
            }
            _ => false,
        }
    }

    // string <-> []byte and string <-> []rune are always convertible
    fn is_string_byte_pair(&self, a: TypeId, b: TypeId) -> bool {
        let (ta, tb) = (self.get(a), self.get(b));
        if ta.kind != TypeKind::String || tb.kind != TypeKind::Slice {
            return false;
        }
        let ek = self.get(self.elem(b)).kind;
        ek == TypeKind::Uint8 || ek == TypeKind::Int32
    }

    // ------------------------------------------------------------------------
    // display
    // ------------------------------------------------------------------------

    /// Renders a type the way it would appear in host source.
    pub fn display(&self, id: TypeId) -> String {
        let t = self.get(id);
        if t.is_named() {
            if t.is_imported {
                return format!("{}.{}", t.pkg_name, t.name);
            }
            return t.name.clone();
        }

        if t.is_byte {
            return "byte".into();
        }
        if t.is_rune {
            return "rune".into();
        }
        if t.kind.is_basic() {
            return t.kind.as_str().into();
        }

        match t.kind {
            TypeKind::Array => format!("[{}]{}", t.array_len, self.display(self.elem(id))),
            TypeKind::Interface => {
                if t.is_empty_interface {
                    "interface{}".into()
                } else {
                    "interface{ ... }".into()
                }
            }
            TypeKind::Map => format!(
                "map[{}]{}",
                self.display(self.key(id)),
                self.display(self.elem(id))
            ),
            TypeKind::Ptr => format!("*{}", self.display(self.elem(id))),
            TypeKind::Slice => format!("[]{}", self.display(self.elem(id))),
            TypeKind::Struct => {
                if t.fields.is_empty() {
                    "struct{}".into()
                } else {
                    "struct{ ... }".into()
                }
            }
            TypeKind::Chan => "<chan>".into(),
            TypeKind::Func => "<func>".into(),
            _ => "<unknown>".into(),
        }
    }
}
