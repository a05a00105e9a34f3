//! Type system for Sinter (spec §3, §4.3).
//!
//! `Type` is the closed sum of everything a Sinter expression can be typed
//! as. `ClassType` carries everything the code generator needs to lay out
//! an instance and build its vtable. `TypeRegistry` is the interning table:
//! pointer-to and array-of construction is idempotent (spec §4.3), and
//! classes are referenced by name rather than by cyclic `Rc`/`RefCell` —
//! the registry is the single owner, matching the "arena-and-index" design
//! note in spec §9.

use crate::ast::{Expr, FieldAttributes, Visibility};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Boolean,
}

impl PrimitiveType {
    /// Widening order from spec §4.4: byte < short < int < long < float < double.
    pub fn rank(self) -> u8 {
        match self {
            PrimitiveType::Byte => 0,
            PrimitiveType::Short => 1,
            PrimitiveType::Int => 2,
            PrimitiveType::Long => 3,
            PrimitiveType::Float => 4,
            PrimitiveType::Double => 5,
            PrimitiveType::Boolean => u8::MAX,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveType::Float | PrimitiveType::Double)
    }

    pub fn size(self) -> usize {
        match self {
            PrimitiveType::Byte => 1,
            PrimitiveType::Short => 2,
            PrimitiveType::Int => 4,
            PrimitiveType::Long => 8,
            PrimitiveType::Float => 4,
            PrimitiveType::Double => 8,
            PrimitiveType::Boolean => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Boolean => "boolean",
        }
    }

    pub fn llvm(self) -> &'static str {
        match self {
            PrimitiveType::Byte => "i8",
            PrimitiveType::Short => "i16",
            PrimitiveType::Int => "i32",
            PrimitiveType::Long => "i64",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Boolean => "i1",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "byte" => PrimitiveType::Byte,
            "short" => PrimitiveType::Short,
            "int" => PrimitiveType::Int,
            "long" => PrimitiveType::Long,
            "float" => PrimitiveType::Float,
            "double" => PrimitiveType::Double,
            "boolean" => PrimitiveType::Boolean,
            _ => return None,
        })
    }
}

/// Function-signature type, used for `ClassName.new` and free-standing
/// function values (spec §3, §4.4 `MethodCall on a function-typed callee`).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub params: Vec<Type>,
    pub return_type: Box<Type>,
}

/// The full type sum (spec §3's "Type" data model entry).
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Primitive(PrimitiveType),
    Void,
    Null,
    Str,
    DStr,
    Pointer(Box<Type>),
    Array(Box<Type>, Option<usize>),
    Class(String),
    Function(Box<FunctionSignature>),
}

impl Type {
    pub fn pointer_to(inner: Type) -> Type {
        Type::Pointer(Box::new(inner))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Primitive(p) if !matches!(p, PrimitiveType::Boolean))
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Name used in diagnostics and as a key for interning.
    pub fn name(&self) -> String {
        match self {
            Type::Primitive(p) => p.name().to_string(),
            Type::Void => "void".to_string(),
            Type::Null => "null".to_string(),
            Type::Str => "str".to_string(),
            Type::DStr => "d_str".to_string(),
            Type::Pointer(inner) => format!("{}*", inner.name()),
            Type::Array(inner, Some(n)) => format!("{}[{}]", inner.name(), n),
            Type::Array(inner, None) => format!("{}[]", inner.name()),
            Type::Class(name) => name.clone(),
            Type::Function(sig) => {
                let params: Vec<String> = sig.params.iter().map(Type::name).collect();
                format!("({}) -> {}", params.join(", "), sig.return_type.name())
            }
        }
    }

    /// Byte size of a value of this type. Class sizes are looked up in the
    /// registry (they depend on the full field layout); everything else is
    /// self-describing.
    pub fn size_of(&self, registry: &TypeRegistry) -> usize {
        match self {
            Type::Primitive(p) => p.size(),
            Type::Void => 0,
            Type::Null => 8,
            Type::Str => 8,
            Type::DStr => 8,
            Type::Pointer(_) => 8,
            Type::Array(inner, Some(n)) => inner.size_of(registry) * n,
            Type::Array(_, None) => 8,
            Type::Class(name) => registry
                .get_class(name)
                .map(|c| c.struct_size)
                .unwrap_or(8),
            Type::Function(_) => 8,
        }
    }

    /// Textual LLVM IR type (spec §3: "an LLVM-IR textual form").
    pub fn llvm_ir(&self) -> String {
        match self {
            Type::Primitive(p) => p.llvm().to_string(),
            Type::Void => "void".to_string(),
            Type::Null => "ptr".to_string(),
            Type::Str => "ptr".to_string(),
            Type::DStr => "ptr".to_string(),
            Type::Pointer(_) => "ptr".to_string(),
            Type::Array(_, _) => "ptr".to_string(),
            Type::Class(name) => format!("%class.{}", name),
            Type::Function(sig) => {
                let params: Vec<String> = sig.params.iter().map(Type::llvm_ir).collect();
                format!("{} ({})", sig.return_type.llvm_ir(), params.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: Type,
    pub offset: usize,
    pub is_const: bool,
    pub visibility: Visibility,
    pub attributes: FieldAttributes,
    pub initializer: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub owner_class: String,
    pub return_type: Type,
    pub param_types: Vec<Type>,
    pub param_names: Vec<String>,
    pub is_static: bool,
    pub visibility: Visibility,
    /// -1 for static methods (spec §3's FieldInfo/MethodInfo data model).
    pub vtable_index: i32,
}

impl MethodInfo {
    pub fn symbol(&self) -> String {
        format!("{}_{}", self.owner_class, self.name)
    }
}

/// One slot in a class's vtable: which class's implementation currently
/// fills it. A subclass that doesn't override inherits the parent's slot
/// verbatim (spec §3 invariant on vtable prefixes).
#[derive(Debug, Clone)]
pub struct VtableSlot {
    pub method_name: String,
    pub owner_class: String,
}

#[derive(Debug, Clone)]
pub struct ClassType {
    pub name: String,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub vtable: Vec<VtableSlot>,
    pub struct_size: usize,
}

impl ClassType {
    pub fn new(name: impl Into<String>) -> Self {
        ClassType {
            name: name.into(),
            parent: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            vtable: Vec::new(),
            // Offset 0 is always reserved for the vtable pointer slot
            // (spec §3 invariant: "all classes carry one, even with no
            // virtual methods").
            struct_size: 8,
        }
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_own_method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Append a field, assigning it an aligned offset and growing the
    /// struct size (spec §3 invariant: offset aligned to the field's own
    /// size, monotonically increasing).
    pub fn add_field(&mut self, mut field: FieldInfo, registry: &TypeRegistry) {
        let size = field.field_type.size_of(registry);
        let align = size.max(1);
        let aligned = self.struct_size.div_ceil(align) * align;
        field.offset = aligned;
        self.struct_size = aligned + size;
        self.fields.push(field);
    }
}

#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub methods: Vec<MethodSig>,
}

#[derive(Debug, Clone)]
pub struct MethodSig {
    pub name: String,
    pub param_types: Vec<Type>,
    pub return_type: Type,
}

/// Interning table for every type visible to the compilation, plus the
/// class/interface registry. Grows monotonically during analysis, then
/// read-only during code generation (spec §3 Lifecycles).
#[derive(Debug, Default)]
pub struct TypeRegistry {
    classes: HashMap<String, ClassType>,
    class_order: Vec<String>,
    interfaces: HashMap<String, InterfaceInfo>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn register_class(&mut self, class: ClassType) -> Result<(), String> {
        if self.classes.contains_key(&class.name) {
            return Err(format!("Duplicate class definition: '{}'", class.name));
        }
        self.class_order.push(class.name.clone());
        self.classes.insert(class.name.clone(), class);
        Ok(())
    }

    pub fn get_class(&self, name: &str) -> Option<&ClassType> {
        self.classes.get(name)
    }

    pub fn get_class_mut(&mut self, name: &str) -> Option<&mut ClassType> {
        self.classes.get_mut(name)
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Classes in declaration order, for deterministic code generation.
    pub fn classes_in_order(&self) -> impl Iterator<Item = &ClassType> {
        self.class_order.iter().filter_map(|n| self.classes.get(n))
    }

    pub fn register_interface(&mut self, iface: InterfaceInfo) -> Result<(), String> {
        if self.interfaces.contains_key(&iface.name) {
            return Err(format!("Duplicate interface definition: '{}'", iface.name));
        }
        self.interfaces.insert(iface.name.clone(), iface);
        Ok(())
    }

    pub fn get_interface(&self, name: &str) -> Option<&InterfaceInfo> {
        self.interfaces.get(name)
    }

    /// Walks the parent chain: is `sub` the same class as, or transitively
    /// derived from, `sup`? (spec §4.4 pointer compatibility rule).
    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        let mut current = self.classes.get(sub).and_then(|c| c.parent.clone());
        while let Some(name) = current {
            if name == sup {
                return true;
            }
            current = self.classes.get(&name).and_then(|c| c.parent.clone());
        }
        false
    }

    /// Resolves a method starting at `class_name` and walking up through
    /// its parent chain, the way an inherited-but-not-overridden call does.
    pub fn resolve_method(&self, class_name: &str, method: &str) -> Option<&MethodInfo> {
        let mut current = Some(class_name.to_string());
        while let Some(name) = current {
            let class = self.classes.get(&name)?;
            if let Some(m) = class.find_own_method(method) {
                return Some(m);
            }
            current = class.parent.clone();
        }
        None
    }

    /// Adds a field to an already-registered class, handling the borrow
    /// split `ClassType::add_field` needs (it takes `&TypeRegistry` for
    /// class-typed field sizing while also being a method *on* a class the
    /// registry owns) by briefly removing the class from the map.
    pub fn add_field_to_class(&mut self, class_name: &str, field: FieldInfo) {
        if let Some(mut class) = self.classes.remove(class_name) {
            class.add_field(field, self);
            self.classes.insert(class_name.to_string(), class);
        }
    }

    /// Seeds `class_name`'s fields and vtable from its parent's
    /// already-finalized layout: an exact copy, ready for the subclass's own
    /// members to append to (new fields) or replace in place (overriding
    /// methods, matched by slot index in `analyze_method`). Must be called
    /// with the parent already fully analyzed, i.e. in parent-before-child
    /// order.
    pub fn seed_inheritance(&mut self, class_name: &str) {
        let Some(parent_name) = self.classes.get(class_name).and_then(|c| c.parent.clone()) else {
            return;
        };
        let Some(parent) = self.classes.get(&parent_name) else {
            return;
        };
        let parent_fields = parent.fields.clone();
        let parent_vtable = parent.vtable.clone();
        let parent_struct_size = parent.struct_size;
        if let Some(class) = self.classes.get_mut(class_name) {
            class.fields = parent_fields;
            class.vtable = parent_vtable;
            class.struct_size = parent_struct_size;
        }
    }

    pub fn resolve_field(&self, class_name: &str, field: &str) -> Option<&FieldInfo> {
        let mut current = Some(class_name.to_string());
        while let Some(name) = current {
            let class = self.classes.get(&name)?;
            if let Some(f) = class.find_field(field) {
                return Some(f);
            }
            current = class.parent.clone();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_widening_order() {
        assert!(PrimitiveType::Byte.rank() < PrimitiveType::Short.rank());
        assert!(PrimitiveType::Int.rank() < PrimitiveType::Long.rank());
        assert!(PrimitiveType::Long.rank() < PrimitiveType::Float.rank());
        assert!(PrimitiveType::Float.rank() < PrimitiveType::Double.rank());
    }

    #[test]
    fn field_offsets_are_aligned_and_after_vtable_slot() {
        let registry = TypeRegistry::new();
        let mut class = ClassType::new("Hospital");
        class.add_field(
            FieldInfo {
                name: "flag".to_string(),
                field_type: Type::Primitive(PrimitiveType::Boolean),
                offset: 0,
                is_const: false,
                visibility: Visibility::Public,
                attributes: FieldAttributes::default(),
                initializer: None,
            },
            &registry,
        );
        class.add_field(
            FieldInfo {
                name: "n".to_string(),
                field_type: Type::Primitive(PrimitiveType::Int),
                offset: 0,
                is_const: false,
                visibility: Visibility::Public,
                attributes: FieldAttributes::default(),
                initializer: None,
            },
            &registry,
        );
        assert_eq!(class.fields[0].offset, 8);
        assert!(class.fields[1].offset >= 8);
        assert_eq!(class.fields[1].offset % 4, 0);
    }

    #[test]
    fn is_subclass_walks_parent_chain() {
        let mut registry = TypeRegistry::new();
        registry.register_class(ClassType::new("A")).unwrap();
        let mut b = ClassType::new("B");
        b.parent = Some("A".to_string());
        registry.register_class(b).unwrap();
        let mut c = ClassType::new("C");
        c.parent = Some("B".to_string());
        registry.register_class(c).unwrap();
        assert!(registry.is_subclass("C", "A"));
        assert!(registry.is_subclass("C", "C"));
        assert!(!registry.is_subclass("A", "C"));
    }

    #[test]
    fn duplicate_class_registration_is_rejected() {
        let mut registry = TypeRegistry::new();
        registry.register_class(ClassType::new("A")).unwrap();
        assert!(registry.register_class(ClassType::new("A")).is_err());
    }
}
