// src/sema/types.rs
//! The closed type set. Every type carries three capability axes:
//! whether it has a runtime form (scoreboards, selectors, tags),
//! whether it has a compile-time form, and whether it can be stored as
//! an entity or struct field.

/// Index into the entity template registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateId(pub u32);

/// Index into the struct template registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(pub u32);

/// Index into the user function table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Index into the loaded module table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Bool,
    /// Compile-time only
    Float,
    /// Compile-time only; covers plain and formatted strings
    Str,
    Pos,
    Rot,
    Offset,
    /// Runtime-only set of entities (a command tag)
    Engroup(TemplateId),
    /// Compile-time predicate builder
    Enfilter,
    /// Instance of an entity template
    Entity(TemplateId),
    /// Instance of a struct template
    Struct(StructId),
    List,
    Map,
    Function,
    None,
    /// Top type for untyped compile-time values (templates, modules,
    /// type values themselves)
    Any,
}

impl Type {
    /// Can values of this type be materialized in the world?
    pub fn has_runtime_form(&self) -> bool {
        matches!(
            self,
            Type::Int | Type::Bool | Type::Engroup(_) | Type::Entity(_) | Type::Struct(_)
        )
    }

    /// Can values of this type exist during compilation?
    pub fn has_compile_time_form(&self) -> bool {
        !matches!(self, Type::Engroup(_) | Type::Entity(_) | Type::Struct(_))
    }

    /// Can this type be an entity attribute? Struct fields are checked
    /// recursively by the registry.
    pub fn storable_as_entity_field(&self) -> bool {
        matches!(self, Type::Int | Type::Bool | Type::Struct(_))
    }

    /// Struct fields additionally admit entity groups; a struct
    /// containing one is then itself barred from entity storage.
    pub fn storable_as_struct_field(&self) -> bool {
        matches!(
            self,
            Type::Int | Type::Bool | Type::Struct(_) | Type::Engroup(_)
        )
    }

    /// Base display name; template and struct names are filled in by
    /// the analyzer, which owns the registries.
    pub fn base_name(&self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Bool => "bool",
            Type::Float => "float",
            Type::Str => "str",
            Type::Pos => "Pos",
            Type::Rot => "Rot",
            Type::Offset => "Offset",
            Type::Engroup(_) => "Engroup",
            Type::Enfilter => "Enfilter",
            Type::Entity(_) => "entity",
            Type::Struct(_) => "struct",
            Type::List => "list",
            Type::Map => "map",
            Type::Function => "function",
            Type::None => "None",
            Type::Any => "Any",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storability_axes() {
        assert!(Type::Int.has_runtime_form());
        assert!(Type::Int.has_compile_time_form());
        assert!(Type::Bool.has_runtime_form());

        assert!(!Type::Float.has_runtime_form());
        assert!(!Type::Str.has_runtime_form());
        assert!(!Type::List.has_runtime_form());
        assert!(!Type::Map.has_runtime_form());
        assert!(!Type::Pos.has_runtime_form());

        assert!(Type::Engroup(TemplateId(0)).has_runtime_form());
        assert!(!Type::Engroup(TemplateId(0)).has_compile_time_form());
    }

    #[test]
    fn field_storability() {
        assert!(Type::Int.storable_as_entity_field());
        assert!(Type::Bool.storable_as_struct_field());
        assert!(!Type::Str.storable_as_entity_field());
        assert!(Type::Engroup(TemplateId(0)).storable_as_struct_field());
        assert!(!Type::Engroup(TemplateId(0)).storable_as_entity_field());
    }
}
