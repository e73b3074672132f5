// src/sema/entity.rs
//! Entity and struct template registries.
//!
//! Registration runs the whole merge: C3 linearization, attribute and
//! method dictionaries folded along the MRO, qualifier checks. A
//! template that fails any check is never registered.

use miette::SourceSpan;

use crate::codegen::cmds::ExecuteSub;
use crate::errors::SemaError;
use crate::frontend::Interner;
use crate::frontend::ast::{FuncDef, MethodQualifier, Symbol};
use crate::sema::mro::c3_linearize;
use crate::sema::types::{StructId, TemplateId, Type};

/// Where one entity attribute lives at runtime
#[derive(Debug, Clone, PartialEq)]
pub enum FieldStorage {
    /// A score on the entity itself, under a dedicated objective
    Score { objective: String, ty: Type },
    /// A struct attribute: one storage per leaf field
    Struct {
        id: StructId,
        fields: Vec<(Symbol, FieldStorage)>,
    },
}

impl FieldStorage {
    pub fn ty(&self) -> Type {
        match self {
            FieldStorage::Score { ty, .. } => *ty,
            FieldStorage::Struct { id, .. } => Type::Struct(*id),
        }
    }
}

/// One method as defined on a template
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub def: FuncDef,
    pub qualifier: MethodQualifier,
    /// Resolved result type (a missing annotation resolves to `None`)
    pub result_ty: Type,
    /// True for the `new` constructor method
    pub is_new: bool,
}

#[derive(Debug)]
pub struct EntityTemplate {
    pub name: String,
    pub parents: Vec<TemplateId>,
    /// C3 linearization, this template first
    pub mro: Vec<TemplateId>,
    /// Identity tag added to every instance summoned as exactly this
    /// template
    pub runtime_tag: String,
    /// `@type` meta, inherited along the MRO
    pub etype: String,
    /// `@position` meta: summon context and coordinates
    pub spawn_context: Vec<ExecuteSub>,
    pub spawn_coords: String,
    /// Attributes introduced by this template itself
    pub own_fields: Vec<(Symbol, FieldStorage)>,
    /// Attributes merged along the MRO
    pub fields: Vec<(Symbol, FieldStorage)>,
    /// Methods defined directly on this template
    pub own_methods: Vec<(Symbol, MethodInfo)>,
}

impl EntityTemplate {
    pub fn field(&self, name: Symbol) -> Option<&FieldStorage> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, f)| f)
    }

    pub fn own_method(&self, name: Symbol) -> Option<&MethodInfo> {
        self.own_methods
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, m)| m)
    }

    pub fn has_new(&self) -> bool {
        self.own_methods.iter().any(|(_, m)| m.is_new)
    }
}

/// Everything the analyzer hands over for one `entity` definition
pub struct TemplateDef {
    pub name: String,
    pub parents: Vec<TemplateId>,
    pub etype: Option<String>,
    pub spawn_context: Option<Vec<ExecuteSub>>,
    pub spawn_coords: Option<String>,
    /// Fields this definition introduces
    pub fields: Vec<(Symbol, FieldStorage, SourceSpan)>,
    pub methods: Vec<(Symbol, MethodInfo, SourceSpan)>,
    pub span: SourceSpan,
}

#[derive(Debug, Default)]
pub struct EntityRegistry {
    templates: Vec<EntityTemplate>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TemplateId) -> &EntityTemplate {
        &self.templates[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TemplateId> + use<> {
        (0..self.templates.len() as u32).map(TemplateId)
    }

    /// `a` is `b` or derives from `b`
    pub fn is_subtemplate(&self, a: TemplateId, b: TemplateId) -> bool {
        self.get(a).mro.contains(&b)
    }

    /// First implementation of `name` along `id`'s MRO.
    pub fn resolve_method(&self, id: TemplateId, name: Symbol) -> Option<(TemplateId, &MethodInfo)> {
        for &tid in &self.get(id).mro {
            if let Some(info) = self.get(tid).own_method(name) {
                return Some((tid, info));
            }
        }
        None
    }

    /// The most basal template in `id`'s MRO declaring `name` as
    /// virtual; overrides share this root's result storage.
    pub fn virtual_root(&self, id: TemplateId, name: Symbol) -> Option<TemplateId> {
        self.get(id)
            .mro
            .iter()
            .rev()
            .find(|&&tid| {
                self.get(tid)
                    .own_method(name)
                    .map(|m| m.qualifier == MethodQualifier::Virtual)
                    .unwrap_or(false)
            })
            .copied()
    }

    /// Every registered template that is `base` or derives from it.
    pub fn subtemplates_of(&self, base: TemplateId) -> Vec<TemplateId> {
        self.ids()
            .filter(|&id| self.is_subtemplate(id, base))
            .collect()
    }

    pub fn register(
        &mut self,
        def: TemplateDef,
        runtime_tag: String,
        interner: &Interner,
    ) -> Result<TemplateId, SemaError> {
        let id = TemplateId(self.templates.len() as u32);

        let parent_mros: Vec<Vec<TemplateId>> = def
            .parents
            .iter()
            .map(|p| self.get(*p).mro.clone())
            .collect();
        let mro = c3_linearize(id, &def.parents, &parent_mros)
            .ok_or(SemaError::Mro { span: def.span })?;

        // Inherit metas along the MRO (nearest wins)
        let mut etype = def.etype;
        let mut spawn_context = def.spawn_context;
        let mut spawn_coords = def.spawn_coords;
        for &tid in mro.iter().skip(1) {
            let parent = self.get(tid);
            if etype.is_none() && !parent.etype.is_empty() {
                etype = Some(parent.etype.clone());
            }
            if spawn_coords.is_none() && !parent.spawn_coords.is_empty() {
                spawn_context = Some(parent.spawn_context.clone());
                spawn_coords = Some(parent.spawn_coords.clone());
            }
        }

        // Merge attributes from the most basal template forward so
        // sibling conflicts surface as duplicates.
        let mut fields: Vec<(Symbol, FieldStorage)> = Vec::new();
        for &tid in mro.iter().skip(1).rev() {
            for (name, storage) in self.get(tid).own_fields.clone() {
                if fields.iter().any(|(n, _)| *n == name) {
                    return Err(SemaError::EFieldMultipleDefs {
                        attr: interner.resolve(name).to_string(),
                        span: def.span,
                    });
                }
                fields.push((name, storage));
            }
        }
        let mut own_fields = Vec::new();
        for (name, storage, span) in &def.fields {
            if fields.iter().any(|(n, _)| n == name) {
                return Err(SemaError::EFieldMultipleDefs {
                    attr: interner.resolve(*name).to_string(),
                    span: *span,
                });
            }
            fields.push((*name, storage.clone()));
            own_fields.push((*name, storage.clone()));
        }

        // Attribute and method namespaces are disjoint across the MRO
        for (name, _, span) in &def.methods {
            if fields.iter().any(|(n, _)| n == name) {
                return Err(SemaError::MethodAttrConflict {
                    name: interner.resolve(*name).to_string(),
                    span: *span,
                });
            }
        }
        for (name, _, span) in &def.fields {
            let clashes = mro
                .iter()
                .skip(1)
                .any(|&tid| self.get(tid).own_method(*name).is_some());
            if clashes {
                return Err(SemaError::MethodAttrConflict {
                    name: interner.resolve(*name).to_string(),
                    span: *span,
                });
            }
        }

        // Method qualifier checks against the bases
        for (name, info, span) in &def.methods {
            let shadowed = mro
                .iter()
                .skip(1)
                .find_map(|&tid| self.get(tid).own_method(*name));
            self.check_method(interner.resolve(*name), info, shadowed, *span)?;
        }

        // Inherited virtual chains must also agree across the merge:
        // two unrelated bases each declaring their own virtual of the
        // same name reach this template with distinct roots, even when
        // it redeclares nothing itself.
        let mut inherited_roots: Vec<(Symbol, TemplateId)> = Vec::new();
        for &tid in mro.iter().skip(1) {
            for (mname, _) in &self.get(tid).own_methods {
                if def.methods.iter().any(|(n, _, _)| n == mname) {
                    // Own redeclarations were validated above
                    continue;
                }
                let Some(root) = self.virtual_root(tid, *mname) else {
                    continue;
                };
                match inherited_roots.iter().find(|(n, _)| n == mname) {
                    Some((_, prev)) if *prev != root => {
                        return Err(SemaError::MultipleVirtualMethod {
                            name: interner.resolve(*mname).to_string(),
                            span: def.span,
                        });
                    }
                    Some(_) => {}
                    None => inherited_roots.push((*mname, root)),
                }
            }
        }

        // At most one `new` across the whole MRO
        let own_new = def.methods.iter().filter(|(_, m, _)| m.is_new).count();
        let inherited_new = mro
            .iter()
            .skip(1)
            .filter(|&&tid| self.get(tid).has_new())
            .count();
        if own_new + inherited_new > 1 {
            let span = def
                .methods
                .iter()
                .find(|(_, m, _)| m.is_new)
                .map(|(_, _, s)| *s)
                .unwrap_or(def.span);
            return Err(SemaError::MultipleNewMethods { span });
        }

        self.templates.push(EntityTemplate {
            name: def.name,
            parents: def.parents,
            mro,
            runtime_tag,
            etype: etype.unwrap_or_else(|| "minecraft:armor_stand".to_string()),
            spawn_context: spawn_context.unwrap_or_default(),
            spawn_coords: spawn_coords.unwrap_or_else(|| "~ ~ ~".to_string()),
            own_fields,
            fields,
            own_methods: def.methods.into_iter().map(|(n, m, _)| (n, m)).collect(),
        });
        Ok(id)
    }

    fn check_method(
        &self,
        name: &str,
        info: &MethodInfo,
        shadowed: Option<&MethodInfo>,
        span: SourceSpan,
    ) -> Result<(), SemaError> {
        let q = info.qualifier;
        let Some(base) = shadowed else {
            if q == MethodQualifier::Override {
                return Err(SemaError::NotOverriding {
                    name: name.to_string(),
                    span,
                });
            }
            return Ok(());
        };
        let bq = base.qualifier;
        // Static and instance methods never shadow each other
        if bq == MethodQualifier::Static && q != MethodQualifier::Static {
            return Err(SemaError::InstOverrideStatic {
                name: name.to_string(),
                span,
            });
        }
        if bq != MethodQualifier::Static && q == MethodQualifier::Static {
            return Err(SemaError::StaticOverrideInst {
                name: name.to_string(),
                span,
            });
        }
        match (bq, q) {
            (MethodQualifier::Virtual | MethodQualifier::Override, MethodQualifier::Virtual) => {
                Err(SemaError::MultipleVirtualMethod {
                    name: name.to_string(),
                    span,
                })
            }
            (MethodQualifier::Virtual | MethodQualifier::Override, MethodQualifier::Override) => {
                if base.result_ty != info.result_ty {
                    return Err(SemaError::OverrideResultMismatch {
                        name: name.to_string(),
                        expected: base.result_ty.base_name().to_string(),
                        found: info.result_ty.base_name().to_string(),
                        span,
                    });
                }
                Ok(())
            }
            (MethodQualifier::Virtual | MethodQualifier::Override, _) => {
                Err(SemaError::OverrideQualifier {
                    name: name.to_string(),
                    span,
                })
            }
            (MethodQualifier::None, MethodQualifier::Virtual) => {
                Err(SemaError::VirtualOverrideNonVirtual {
                    name: name.to_string(),
                    span,
                })
            }
            (MethodQualifier::None, MethodQualifier::Override) => Err(SemaError::NotOverriding {
                name: name.to_string(),
                span,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructTemplate {
    pub name: String,
    pub fields: Vec<(Symbol, Type)>,
}

impl StructTemplate {
    pub fn field_ty(&self, name: Symbol) -> Option<Type> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }
}

#[derive(Debug, Default)]
pub struct StructRegistry {
    structs: Vec<StructTemplate>,
}

impl StructRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: StructId) -> &StructTemplate {
        &self.structs[id.0 as usize]
    }

    pub fn register(
        &mut self,
        name: String,
        bases: &[StructId],
        own_fields: Vec<(Symbol, Type, SourceSpan)>,
        span: SourceSpan,
        interner: &Interner,
    ) -> Result<StructId, SemaError> {
        let mut fields: Vec<(Symbol, Type)> = Vec::new();
        for &base in bases {
            for (fname, fty) in self.get(base).fields.clone() {
                if fields.iter().any(|(n, _)| *n == fname) {
                    return Err(SemaError::SFieldMultipleDefs {
                        attr: interner.resolve(fname).to_string(),
                        span,
                    });
                }
                fields.push((fname, fty));
            }
        }
        for (fname, fty, fspan) in own_fields {
            if fields.iter().any(|(n, _)| *n == fname) {
                return Err(SemaError::SFieldMultipleDefs {
                    attr: interner.resolve(fname).to_string(),
                    span: fspan,
                });
            }
            fields.push((fname, fty));
        }
        let id = StructId(self.structs.len() as u32);
        self.structs.push(StructTemplate { name, fields });
        Ok(id)
    }

    /// Does this struct (transitively) contain a field an entity
    /// cannot store?
    pub fn entity_unsupported_field(&self, id: StructId) -> Option<(Symbol, Type)> {
        for (name, ty) in &self.get(id).fields {
            match ty {
                Type::Struct(inner) => {
                    if let Some(found) = self.entity_unsupported_field(*inner) {
                        return Some(found);
                    }
                }
                ty if !ty.storable_as_entity_field() => return Some((*name, *ty)),
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{Block, FuncFlavor, ParamPort};
    use crate::frontend::Span;

    fn interner_with(names: &[&str]) -> Interner {
        let mut interner = Interner::new();
        for n in names {
            interner.intern(n);
        }
        interner
    }

    fn dummy_def(name: Symbol) -> FuncDef {
        FuncDef {
            name,
            flavor: FuncFlavor::Runtime,
            qualifier: MethodQualifier::None,
            params: vec![],
            result_ty: None,
            result_port: ParamPort::ByValue,
            body: Block {
                stmts: vec![],
                span: Span::default(),
            },
            span: Span::default(),
        }
    }

    fn method(name: Symbol, qualifier: MethodQualifier, result_ty: Type) -> MethodInfo {
        let mut def = dummy_def(name);
        def.qualifier = qualifier;
        MethodInfo {
            def,
            qualifier,
            result_ty,
            is_new: false,
        }
    }

    fn template(name: &str, parents: Vec<TemplateId>) -> TemplateDef {
        TemplateDef {
            name: name.to_string(),
            parents,
            etype: None,
            spawn_context: None,
            spawn_coords: None,
            fields: vec![],
            methods: vec![],
            span: (0, 0).into(),
        }
    }

    #[test]
    fn diamond_mro() {
        let interner = interner_with(&[]);
        let mut reg = EntityRegistry::new();
        let a = reg
            .register(template("A", vec![]), "t1".into(), &interner)
            .unwrap();
        let b = reg
            .register(template("B", vec![a]), "t2".into(), &interner)
            .unwrap();
        let c = reg
            .register(template("C", vec![a]), "t3".into(), &interner)
            .unwrap();
        let d = reg
            .register(template("D", vec![b, c]), "t4".into(), &interner)
            .unwrap();
        assert_eq!(reg.get(d).mro, vec![d, b, c, a]);
        assert!(reg.is_subtemplate(d, a));
        assert!(!reg.is_subtemplate(a, d));
    }

    #[test]
    fn diamond_fields_do_not_conflict_with_themselves() {
        let interner = interner_with(&["hp"]);
        let mut reg = EntityRegistry::new();
        let mut base = template("A", vec![]);
        base.fields.push((
            Symbol(0),
            FieldStorage::Score {
                objective: "acacia1".into(),
                ty: Type::Int,
            },
            (0, 0).into(),
        ));
        let a = reg.register(base, "t1".into(), &interner).unwrap();
        let b = reg
            .register(template("B", vec![a]), "t2".into(), &interner)
            .unwrap();
        let c = reg
            .register(template("C", vec![a]), "t3".into(), &interner)
            .unwrap();
        // A's field reaches D through both B and C, but it is the same
        // field, not a conflict.
        let d = reg
            .register(template("D", vec![b, c]), "t4".into(), &interner)
            .unwrap();
        assert_eq!(reg.get(d).fields.len(), 1);
    }

    #[test]
    fn sibling_fields_conflict() {
        let interner = interner_with(&["hp"]);
        let mut reg = EntityRegistry::new();
        let field = |obj: &str| FieldStorage::Score {
            objective: obj.into(),
            ty: Type::Int,
        };
        let mut b = template("B", vec![]);
        b.fields.push((Symbol(0), field("acacia1"), (0, 0).into()));
        let b = reg.register(b, "t1".into(), &interner).unwrap();
        let mut c = template("C", vec![]);
        c.fields.push((Symbol(0), field("acacia2"), (0, 0).into()));
        let c = reg.register(c, "t2".into(), &interner).unwrap();
        let err = reg.register(template("D", vec![b, c]), "t3".into(), &interner);
        assert!(matches!(err, Err(SemaError::EFieldMultipleDefs { .. })));
    }

    #[test]
    fn inconsistent_bases_fail_and_register_nothing() {
        let interner = interner_with(&[]);
        let mut reg = EntityRegistry::new();
        let a = reg
            .register(template("A", vec![]), "t1".into(), &interner)
            .unwrap();
        let b = reg
            .register(template("B", vec![a]), "t2".into(), &interner)
            .unwrap();
        let c = reg
            .register(template("C", vec![a]), "t3".into(), &interner)
            .unwrap();
        let x = reg
            .register(template("X", vec![b, c]), "t4".into(), &interner)
            .unwrap();
        let y = reg
            .register(template("Y", vec![c, b]), "t5".into(), &interner)
            .unwrap();
        let before = reg.len();
        let err = reg.register(template("Z", vec![x, y]), "t6".into(), &interner);
        assert!(matches!(err, Err(SemaError::Mro { .. })));
        assert_eq!(reg.len(), before);
    }

    #[test]
    fn override_must_shadow_virtual() {
        let interner = interner_with(&["m"]);
        let mut reg = EntityRegistry::new();
        let m = Symbol(0);
        let mut base = template("A", vec![]);
        base.methods.push((
            m,
            method(m, MethodQualifier::Virtual, Type::None),
            (0, 0).into(),
        ));
        let a = reg.register(base, "t1".into(), &interner).unwrap();

        let mut sub = template("B", vec![a]);
        sub.methods.push((
            m,
            method(m, MethodQualifier::Override, Type::None),
            (0, 0).into(),
        ));
        assert!(reg.register(sub, "t2".into(), &interner).is_ok());

        let mut bad = template("C", vec![a]);
        bad.methods.push((
            m,
            method(m, MethodQualifier::None, Type::None),
            (0, 0).into(),
        ));
        assert!(matches!(
            reg.register(bad, "t3".into(), &interner),
            Err(SemaError::OverrideQualifier { .. })
        ));
    }

    #[test]
    fn override_result_type_must_match() {
        let interner = interner_with(&["m"]);
        let mut reg = EntityRegistry::new();
        let m = Symbol(0);
        let mut base = template("A", vec![]);
        base.methods.push((
            m,
            method(m, MethodQualifier::Virtual, Type::Int),
            (0, 0).into(),
        ));
        let a = reg.register(base, "t1".into(), &interner).unwrap();

        let mut bad = template("B", vec![a]);
        bad.methods.push((
            m,
            method(m, MethodQualifier::Override, Type::Bool),
            (0, 0).into(),
        ));
        assert!(matches!(
            reg.register(bad, "t2".into(), &interner),
            Err(SemaError::OverrideResultMismatch { .. })
        ));
    }

    #[test]
    fn override_without_base_is_rejected() {
        let interner = interner_with(&["m"]);
        let mut reg = EntityRegistry::new();
        let m = Symbol(0);
        let mut bad = template("A", vec![]);
        bad.methods.push((
            m,
            method(m, MethodQualifier::Override, Type::None),
            (0, 0).into(),
        ));
        assert!(matches!(
            reg.register(bad, "t1".into(), &interner),
            Err(SemaError::NotOverriding { .. })
        ));
    }

    #[test]
    fn static_instance_mismatch() {
        let interner = interner_with(&["m"]);
        let mut reg = EntityRegistry::new();
        let m = Symbol(0);
        let mut base = template("A", vec![]);
        base.methods.push((
            m,
            method(m, MethodQualifier::Static, Type::None),
            (0, 0).into(),
        ));
        let a = reg.register(base, "t1".into(), &interner).unwrap();

        let mut bad = template("B", vec![a]);
        bad.methods.push((
            m,
            method(m, MethodQualifier::None, Type::None),
            (0, 0).into(),
        ));
        assert!(matches!(
            reg.register(bad, "t2".into(), &interner),
            Err(SemaError::InstOverrideStatic { .. })
        ));
    }

    #[test]
    fn multiple_new_methods_rejected() {
        let interner = interner_with(&["new"]);
        let mut reg = EntityRegistry::new();
        let n = Symbol(0);
        let mut base = template("A", vec![]);
        let mut info = method(n, MethodQualifier::None, Type::None);
        info.is_new = true;
        base.methods.push((n, info.clone(), (0, 0).into()));
        let a = reg.register(base, "t1".into(), &interner).unwrap();

        let mut bad = template("B", vec![a]);
        bad.methods.push((n, info, (0, 0).into()));
        assert!(matches!(
            reg.register(bad, "t2".into(), &interner),
            Err(SemaError::MultipleNewMethods { .. })
        ));
    }

    #[test]
    fn inherited_unrelated_virtuals_conflict() {
        let interner = interner_with(&["m"]);
        let mut reg = EntityRegistry::new();
        let m = Symbol(0);
        let mut a = template("A", vec![]);
        a.methods.push((
            m,
            method(m, MethodQualifier::Virtual, Type::None),
            (0, 0).into(),
        ));
        let a = reg.register(a, "t1".into(), &interner).unwrap();
        let mut b = template("B", vec![]);
        b.methods.push((
            m,
            method(m, MethodQualifier::Virtual, Type::None),
            (0, 0).into(),
        ));
        let b = reg.register(b, "t2".into(), &interner).unwrap();

        // C redeclares nothing, yet inherits two distinct virtual
        // roots for the same name.
        let err = reg.register(template("C", vec![a, b]), "t3".into(), &interner);
        assert!(matches!(
            err,
            Err(SemaError::MultipleVirtualMethod { .. })
        ));
    }

    #[test]
    fn diamond_overrides_of_one_root_merge() {
        let interner = interner_with(&["m"]);
        let mut reg = EntityRegistry::new();
        let m = Symbol(0);
        let mut base = template("A", vec![]);
        base.methods.push((
            m,
            method(m, MethodQualifier::Virtual, Type::None),
            (0, 0).into(),
        ));
        let a = reg.register(base, "t1".into(), &interner).unwrap();
        let mut b = template("B", vec![a]);
        b.methods.push((
            m,
            method(m, MethodQualifier::Override, Type::None),
            (0, 0).into(),
        ));
        let b = reg.register(b, "t2".into(), &interner).unwrap();
        let mut c = template("C", vec![a]);
        c.methods.push((
            m,
            method(m, MethodQualifier::Override, Type::None),
            (0, 0).into(),
        ));
        let c = reg.register(c, "t3".into(), &interner).unwrap();

        // Both overrides share A's root, so the join is consistent
        assert!(reg.register(template("D", vec![b, c]), "t4".into(), &interner).is_ok());
    }

    #[test]
    fn virtual_root_is_most_basal() {
        let interner = interner_with(&["m"]);
        let mut reg = EntityRegistry::new();
        let m = Symbol(0);
        let mut base = template("A", vec![]);
        base.methods.push((
            m,
            method(m, MethodQualifier::Virtual, Type::Int),
            (0, 0).into(),
        ));
        let a = reg.register(base, "t1".into(), &interner).unwrap();
        let mut sub = template("B", vec![a]);
        sub.methods.push((
            m,
            method(m, MethodQualifier::Override, Type::Int),
            (0, 0).into(),
        ));
        let b = reg.register(sub, "t2".into(), &interner).unwrap();
        assert_eq!(reg.virtual_root(b, m), Some(a));
        let (def_tpl, _) = reg.resolve_method(b, m).unwrap();
        assert_eq!(def_tpl, b);
    }

    #[test]
    fn struct_merge_rejects_duplicates() {
        let interner = interner_with(&["x"]);
        let mut reg = StructRegistry::new();
        let base = reg
            .register(
                "P".into(),
                &[],
                vec![(Symbol(0), Type::Int, (0, 0).into())],
                (0, 0).into(),
                &interner,
            )
            .unwrap();
        let err = reg.register(
            "Q".into(),
            &[base],
            vec![(Symbol(0), Type::Bool, (0, 0).into())],
            (0, 0).into(),
            &interner,
        );
        assert!(matches!(err, Err(SemaError::SFieldMultipleDefs { .. })));
    }

    #[test]
    fn entity_unsupported_struct_field_detected() {
        let interner = interner_with(&["g", "x"]);
        let mut reg = StructRegistry::new();
        let holder = reg
            .register(
                "G".into(),
                &[],
                vec![(Symbol(0), Type::Engroup(TemplateId(0)), (0, 0).into())],
                (0, 0).into(),
                &interner,
            )
            .unwrap();
        assert!(reg.entity_unsupported_field(holder).is_some());

        let plain = reg
            .register(
                "P".into(),
                &[],
                vec![(Symbol(1), Type::Int, (0, 0).into())],
                (0, 0).into(),
                &interner,
            )
            .unwrap();
        assert!(reg.entity_unsupported_field(plain).is_none());
    }
}
