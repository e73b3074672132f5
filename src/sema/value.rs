// src/sema/value.rs
//! The analyzer's value model. Every expression evaluates to a
//! `Value`, which lives in exactly one world: compile-time
//! (`Value::Const`) or runtime (everything else). Assignable runtime
//! locations are `Place`s; bindings and references hold places, and
//! reading a place produces a value.

use crate::codegen::cmds::{Command, ExecuteSub, RawtextPart, ScbSlot};
use crate::codegen::selector::{EntityFilter, McSelector};
use crate::frontend::ast::Symbol;
use crate::sema::builtins::BuiltinFunc;
use crate::sema::types::{FuncId, ModuleId, StructId, TemplateId, Type};

/// Hashable compile-time map key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstKey {
    Int(i32),
    Bool(bool),
    Str(String),
}

impl ConstKey {
    pub fn display(&self) -> String {
        match self {
            ConstKey::Int(v) => v.to_string(),
            ConstKey::Bool(v) => if *v { "True" } else { "False" }.to_string(),
            ConstKey::Str(s) => format!("\"{}\"", s),
        }
    }

    pub fn to_value(&self) -> ConstValue {
        match self {
            ConstKey::Int(v) => ConstValue::Int(*v),
            ConstKey::Bool(v) => ConstValue::Bool(*v),
            ConstKey::Str(s) => ConstValue::Str(s.clone()),
        }
    }
}

/// Insertion-ordered compile-time map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstMap {
    pub entries: Vec<(ConstKey, ConstValue)>,
}

impl ConstMap {
    pub fn get(&self, key: &ConstKey) -> Option<&ConstValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: ConstKey, value: ConstValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A formatted string: rawtext components plus the commands that must
/// run before the text is displayed (score materializations).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FStrValue {
    pub deps: Vec<Command>,
    pub parts: Vec<RawtextPart>,
}

impl FStrValue {
    pub fn push_text(&mut self, text: &str) {
        if let Some(RawtextPart::Text(last)) = self.parts.last_mut() {
            last.push_str(text);
        } else {
            self.parts.push(RawtextPart::Text(text.to_string()));
        }
    }

    pub fn push_score(&mut self, slot: &ScbSlot) {
        self.parts.push(RawtextPart::Score {
            name: slot.target.clone(),
            objective: slot.objective.clone(),
        });
    }
}

/// An execution anchor: `positioned`/`rotated` context subcommands.
/// The anchored point is always `~ ~ ~` under this context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosValue {
    pub context: Vec<ExecuteSub>,
}

impl PosValue {
    pub fn absolute(x: f64, y: f64, z: f64) -> Self {
        Self {
            context: vec![ExecuteSub::env(
                "positioned",
                format!("{} {} {}", coord(x), coord(y), coord(z)),
            )],
        }
    }

    pub fn shifted(&self, offset: &OffsetValue) -> Self {
        let mut context = self.context.clone();
        context.push(ExecuteSub::env("positioned", offset.coords()));
        Self { context }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotValue {
    pub yaw: f64,
    pub pitch: f64,
}

impl RotValue {
    pub fn context(&self) -> ExecuteSub {
        ExecuteSub::env("rotated", format!("{} {}", coord(self.yaw), coord(self.pitch)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OffsetValue {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl OffsetValue {
    pub fn coords(&self) -> String {
        format!("~{} ~{} ~{}", coord_rel(self.dx), coord_rel(self.dy), coord_rel(self.dz))
    }
}

fn coord(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

fn coord_rel(v: f64) -> String {
    if v == 0.0 { String::new() } else { coord(v) }
}

/// A compile-time value
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Bool(bool),
    Float(f64),
    Str(String),
    FStr(FStrValue),
    Pos(PosValue),
    Rot(RotValue),
    Offset(OffsetValue),
    Filter(EntityFilter),
    List(Vec<ConstValue>),
    Map(ConstMap),
    None,
    /// A type used as a value (`int`, `Engroup[T]`, ...)
    Type(Type),
}

impl ConstValue {
    pub fn ty(&self) -> Type {
        match self {
            ConstValue::Int(_) => Type::Int,
            ConstValue::Bool(_) => Type::Bool,
            ConstValue::Float(_) => Type::Float,
            ConstValue::Str(_) | ConstValue::FStr(_) => Type::Str,
            ConstValue::Pos(_) => Type::Pos,
            ConstValue::Rot(_) => Type::Rot,
            ConstValue::Offset(_) => Type::Offset,
            ConstValue::Filter(_) => Type::Enfilter,
            ConstValue::List(_) => Type::List,
            ConstValue::Map(_) => Type::Map,
            ConstValue::None => Type::None,
            ConstValue::Type(_) => Type::Any,
        }
    }

    /// Textual form for `${...}` raw-command interpolation. None for
    /// values that have no command representation.
    pub fn cmd_str(&self) -> Option<String> {
        match self {
            ConstValue::Int(v) => Some(v.to_string()),
            ConstValue::Bool(v) => Some(if *v { "1" } else { "0" }.to_string()),
            ConstValue::Float(v) => Some(v.to_string()),
            ConstValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<ConstKey> {
        match self {
            ConstValue::Int(v) => Some(ConstKey::Int(*v)),
            ConstValue::Bool(v) => Some(ConstKey::Bool(*v)),
            ConstValue::Str(s) => Some(ConstKey::Str(s.clone())),
            _ => None,
        }
    }
}

/// An assignable runtime location
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    /// One scoreboard cell holding an int or a bool
    Score { slot: ScbSlot, ty: Type },
    /// An entity handle: the tag names the current referent
    Entity { tag: String, template: TemplateId },
    /// An entity group: tag membership is the set
    Group { tag: String, template: TemplateId },
    /// A struct instance: one place per field
    Struct {
        id: StructId,
        fields: Vec<(Symbol, Place)>,
    },
}

impl Place {
    pub fn ty(&self) -> Type {
        match self {
            Place::Score { ty, .. } => *ty,
            Place::Entity { template, .. } => Type::Entity(*template),
            Place::Group { template, .. } => Type::Engroup(*template),
            Place::Struct { id, .. } => Type::Struct(*id),
        }
    }
}

/// A runtime boolean that has not been stored yet: a conjunction of
/// execute subcommands, true iff all pass. `deps` must run first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    pub deps: Vec<Command>,
    pub subs: Vec<ExecuteSub>,
}

/// A runtime entity reference
#[derive(Debug, Clone, PartialEq)]
pub struct EntityValue {
    pub template: TemplateId,
    /// Static view after casting to a base template
    pub cast: Option<TemplateId>,
    pub sel: McSelector,
    /// Set when this reference is a variable (retaggable)
    pub tag: Option<String>,
}

impl EntityValue {
    pub fn effective_template(&self) -> TemplateId {
        self.cast.unwrap_or(self.template)
    }
}

/// A named non-data value: functions, templates, modules
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallableRef {
    Func(FuncId),
    Builtin(BuiltinFunc),
    Template(TemplateId),
    Struct(StructId),
    Module(ModuleId),
}

/// The result of analyzing an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Const(ConstValue),
    /// Runtime int or bool in a slot; `assignable` when backed by a
    /// variable rather than a temporary
    Score {
        slot: ScbSlot,
        ty: Type,
        assignable: bool,
    },
    /// Runtime bool not yet materialized into a slot
    Condition(Condition),
    Entity(EntityValue),
    Group {
        tag: String,
        template: TemplateId,
        assignable: bool,
    },
    Struct {
        id: StructId,
        fields: Vec<(Symbol, Value)>,
        assignable: bool,
    },
    Callable(CallableRef),
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Value::Const(c) => c.ty(),
            Value::Score { ty, .. } => *ty,
            Value::Condition(_) => Type::Bool,
            Value::Entity(e) => Type::Entity(e.effective_template()),
            Value::Group { template, .. } => Type::Engroup(*template),
            Value::Struct { id, .. } => Type::Struct(*id),
            Value::Callable(CallableRef::Func(_) | CallableRef::Builtin(_)) => Type::Function,
            Value::Callable(_) => Type::Any,
        }
    }

    /// The assignable location behind this value, if any.
    pub fn place(&self) -> Option<Place> {
        match self {
            Value::Score {
                slot,
                ty,
                assignable: true,
            } => Some(Place::Score {
                slot: slot.clone(),
                ty: *ty,
            }),
            Value::Entity(EntityValue {
                template,
                tag: Some(tag),
                ..
            }) => Some(Place::Entity {
                tag: tag.clone(),
                template: *template,
            }),
            Value::Group {
                tag,
                template,
                assignable: true,
            } => Some(Place::Group {
                tag: tag.clone(),
                template: *template,
            }),
            Value::Struct {
                id,
                fields,
                assignable: true,
            } => {
                let mut places = Vec::new();
                for (name, value) in fields {
                    places.push((*name, value.place()?));
                }
                Some(Place::Struct {
                    id: *id,
                    fields: places,
                })
            }
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Value::Const(_))
    }

    pub fn from_place(place: &Place) -> Value {
        match place {
            Place::Score { slot, ty } => Value::Score {
                slot: slot.clone(),
                ty: *ty,
                assignable: true,
            },
            Place::Entity { tag, template } => Value::Entity(EntityValue {
                template: *template,
                cast: None,
                sel: McSelector::tagged(tag),
                tag: Some(tag.clone()),
            }),
            Place::Group { tag, template } => Value::Group {
                tag: tag.clone(),
                template: *template,
                assignable: true,
            },
            Place::Struct { id, fields } => Value::Struct {
                id: *id,
                fields: fields
                    .iter()
                    .map(|(name, p)| (*name, Value::from_place(p)))
                    .collect(),
                assignable: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_value_types() {
        assert_eq!(ConstValue::Int(1).ty(), Type::Int);
        assert_eq!(ConstValue::Str("x".into()).ty(), Type::Str);
        assert_eq!(ConstValue::FStr(FStrValue::default()).ty(), Type::Str);
        assert_eq!(ConstValue::None.ty(), Type::None);
    }

    #[test]
    fn cmd_str_formats() {
        assert_eq!(ConstValue::Int(-3).cmd_str().unwrap(), "-3");
        assert_eq!(ConstValue::Bool(true).cmd_str().unwrap(), "1");
        assert_eq!(ConstValue::Str("say".into()).cmd_str().unwrap(), "say");
        assert!(ConstValue::List(vec![]).cmd_str().is_none());
    }

    #[test]
    fn const_map_preserves_insertion_order() {
        let mut map = ConstMap::default();
        map.insert(ConstKey::Str("b".into()), ConstValue::Int(1));
        map.insert(ConstKey::Str("a".into()), ConstValue::Int(2));
        map.insert(ConstKey::Str("b".into()), ConstValue::Int(3));
        assert_eq!(map.len(), 2);
        assert_eq!(map.entries[0].0, ConstKey::Str("b".into()));
        assert_eq!(map.get(&ConstKey::Str("b".into())), Some(&ConstValue::Int(3)));
    }

    #[test]
    fn fstr_merges_adjacent_text() {
        let mut f = FStrValue::default();
        f.push_text("a");
        f.push_text("b");
        f.push_score(&ScbSlot::new("acacia1", "acacia"));
        f.push_text("c");
        assert_eq!(f.parts.len(), 3);
        assert_eq!(f.parts[0], RawtextPart::Text("ab".to_string()));
    }

    #[test]
    fn pos_offset_coords() {
        let pos = PosValue::absolute(10.0, 64.5, -3.0);
        assert_eq!(
            pos.context[0].resolve(),
            "positioned 10 64.5 -3"
        );
        let off = OffsetValue {
            dx: 1.0,
            dy: 0.0,
            dz: -2.0,
        };
        assert_eq!(off.coords(), "~1 ~ ~-2");
    }

    #[test]
    fn value_from_score_place_is_assignable() {
        let place = Place::Score {
            slot: ScbSlot::new("acacia1", "acacia"),
            ty: Type::Int,
        };
        match Value::from_place(&place) {
            Value::Score { assignable, ty, .. } => {
                assert!(assignable);
                assert_eq!(ty, Type::Int);
            }
            other => panic!("expected Score, got {other:?}"),
        }
    }
}
