// src/sema/scope.rs

use rustc_hash::FxHashMap;

use crate::frontend::ast::Symbol;
use crate::sema::builtins::BuiltinFunc;
use crate::sema::types::{FuncId, ModuleId, StructId, TemplateId};
use crate::sema::value::{ConstValue, EntityValue, Place};

/// Which world a scope executes in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum World {
    Runtime,
    CompileTime,
}

/// What a name resolves to
#[derive(Debug, Clone)]
pub enum Binding {
    /// Runtime variable occupying storage
    Var(Place),
    /// Compile-time constant
    Const(ConstValue),
    /// Alias for another assignable location
    Ref(Place),
    Func(FuncId),
    Builtin(BuiltinFunc),
    Template(TemplateId),
    StructTpl(StructId),
    Module(ModuleId),
}

impl Binding {
    /// Runtime bindings cannot be read from a compile-time scope.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Binding::Var(_) | Binding::Ref(_))
    }
}

#[derive(Debug)]
pub struct Frame {
    bindings: FxHashMap<Symbol, Binding>,
    pub world: World,
    /// `self` for entity method bodies
    pub self_value: Option<EntityValue>,
    /// Frames that belong to a function body stop result lookups
    pub function_boundary: bool,
}

impl Frame {
    fn new(world: World) -> Self {
        Self {
            bindings: FxHashMap::default(),
            world,
            self_value: None,
            function_boundary: false,
        }
    }
}

/// Lexical scope stack. The bottom frame holds the builtin names, the
/// next one the module globals.
#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new(World::Runtime)],
        }
    }

    pub fn push(&mut self, world: World) {
        self.frames.push(Frame::new(world));
    }

    pub fn push_function(&mut self, world: World, self_value: Option<EntityValue>) {
        let mut frame = Frame::new(world);
        frame.function_boundary = true;
        frame.self_value = self_value;
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Pop the innermost frame and hand back its bindings (module
    /// export collection).
    pub fn pop_with_bindings(&mut self) -> FxHashMap<Symbol, Binding> {
        self.frames
            .pop()
            .map(|f| f.bindings)
            .unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Truncate back to a saved depth (error-path cleanup).
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth.max(1));
    }

    pub fn world(&self) -> World {
        self.frames.last().map(|f| f.world).unwrap_or(World::Runtime)
    }

    pub fn define(&mut self, name: Symbol, binding: Binding) {
        self.frames
            .last_mut()
            .expect("scope stack never empty")
            .bindings
            .insert(name, binding);
    }

    /// Define in the bottom-most (builtin) frame.
    pub fn define_builtin(&mut self, name: Symbol, binding: Binding) {
        self.frames[0].bindings.insert(name, binding);
    }

    pub fn lookup(&self, name: Symbol) -> Option<&Binding> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.bindings.get(&name))
    }

    /// Is `name` bound in the innermost frame?
    pub fn defined_here(&self, name: Symbol) -> bool {
        self.frames
            .last()
            .map(|f| f.bindings.contains_key(&name))
            .unwrap_or(false)
    }

    /// The `self` of the innermost function frame, if any.
    pub fn current_self(&self) -> Option<&EntityValue> {
        for frame in self.frames.iter().rev() {
            if let Some(v) = &frame.self_value {
                return Some(v);
            }
            if frame.function_boundary {
                break;
            }
        }
        None
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::cmds::ScbSlot;
    use crate::sema::types::Type;

    fn score_place(n: &str) -> Place {
        Place::Score {
            slot: ScbSlot::new(n, "acacia"),
            ty: Type::Int,
        }
    }

    #[test]
    fn lookup_walks_outward() {
        let mut scopes = ScopeStack::new();
        scopes.define(Symbol(0), Binding::Var(score_place("outer")));
        scopes.push(World::Runtime);
        scopes.define(Symbol(1), Binding::Var(score_place("inner")));

        assert!(scopes.lookup(Symbol(0)).is_some());
        assert!(scopes.lookup(Symbol(1)).is_some());
        scopes.pop();
        assert!(scopes.lookup(Symbol(1)).is_none());
    }

    #[test]
    fn inner_frame_shadows_outer() {
        let mut scopes = ScopeStack::new();
        scopes.define(Symbol(0), Binding::Const(ConstValue::Int(1)));
        scopes.push(World::Runtime);
        scopes.define(Symbol(0), Binding::Const(ConstValue::Int(2)));
        match scopes.lookup(Symbol(0)) {
            Some(Binding::Const(ConstValue::Int(2))) => {}
            other => panic!("expected shadowing binding, got {other:?}"),
        }
        assert!(scopes.defined_here(Symbol(0)));
    }

    #[test]
    fn world_tracks_innermost_frame() {
        let mut scopes = ScopeStack::new();
        assert_eq!(scopes.world(), World::Runtime);
        scopes.push(World::CompileTime);
        assert_eq!(scopes.world(), World::CompileTime);
    }

    #[test]
    fn runtime_bindings_are_flagged() {
        assert!(Binding::Var(score_place("x")).is_runtime());
        assert!(!Binding::Const(ConstValue::Int(1)).is_runtime());
    }
}
