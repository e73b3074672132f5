// src/sema/analyzer.rs
//! The analyzer walks the AST once, assigning every expression a type
//! and a world (runtime or compile-time), folding constants, and
//! lowering runtime operations into command sequences. Compile-time
//! constructs are fully evaluated here and never reach the output.

use miette::SourceSpan;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::codegen::alloc::Allocator;
use crate::codegen::cmds::{Command, ExecuteSub, McFunctionFile, ScbSlot};
use crate::codegen::output::Output;
use crate::codegen::selector::McSelector;
use crate::compiler::Config;
use crate::errors::{CompileError, EmitError, SemaError, Traced};
use crate::frontend::ast::*;
use crate::frontend::{Interner, Parser, Span};
use crate::module::ModuleLoader;
use crate::sema::entity::{EntityRegistry, FieldStorage, MethodInfo, StructRegistry, TemplateDef};
use crate::sema::scope::{Binding, ScopeStack, World};
use crate::sema::types::{FuncId, ModuleId, TemplateId, Type};
use crate::sema::value::{
    ConstValue, Condition, EntityValue, Place, PosValue, Value,
};

/// A user function definition waiting for (or sharing) compiled specs
#[derive(Debug)]
pub struct UserFunc {
    pub def: FuncDef,
    pub name: String,
}

/// One compiled body of a runtime function or method. Const-port
/// parameters produce one spec per distinct constant tuple.
#[derive(Debug, Clone)]
pub struct RtSpec {
    pub file_path: String,
    pub params: Vec<SpecParam>,
    pub result: Option<Place>,
    pub result_ty: Type,
}

#[derive(Debug, Clone)]
pub struct SpecParam {
    pub name: Symbol,
    pub port: ParamPort,
    pub ty: Type,
    pub place: Option<Place>,
    pub default: Option<ConstValue>,
}

/// Key for the compiled-spec cache. The string is the serialized
/// const-port argument tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpecKey {
    Func(FuncId, String),
    Method(TemplateId, Symbol, String),
}

/// Where `result` statements deliver their value
#[derive(Debug, Clone)]
pub enum ResultCtx {
    /// Pre-allocated storable result storage
    Place(Place),
    /// Compile-time result value
    ConstSlot(Option<ConstValue>),
    /// Reference result: the place of the result expression
    RefSlot(Option<Place>),
    /// Function declares no result
    NoneResult,
}

/// Per-function analysis state
#[derive(Debug)]
pub struct FuncCtx {
    pub flavor: FuncFlavor,
    pub result: ResultCtx,
    pub result_ty: Type,
    /// Inline functions with const or reference results allow only one
    /// `result` on any analyzed path
    pub single_result: bool,
    pub results_seen: usize,
    pub new_ctx: Option<NewCtx>,
    pub name: String,
}

/// Set while analyzing a `new` method body
#[derive(Debug, Clone)]
pub struct NewCtx {
    pub template: TemplateId,
    pub instance_tag: String,
}

#[derive(Debug)]
pub struct ModuleData {
    pub name: String,
    pub exports: FxHashMap<Symbol, Binding>,
}

pub struct Analyzer<'cfg> {
    pub config: &'cfg Config,
    pub interner: Interner,
    pub scopes: ScopeStack,
    pub alloc: Allocator,
    pub entities: EntityRegistry,
    pub structs: StructRegistry,
    pub funcs: Vec<UserFunc>,
    pub specs: FxHashMap<SpecKey, RtSpec>,
    /// Shared result storage per (virtual root, method)
    pub dispatch_results: FxHashMap<(TemplateId, Symbol), Place>,
    pub files: Vec<McFunctionFile>,
    buffers: Vec<Vec<Command>>,
    pub init_cmds: Vec<Command>,
    pub interfaces: Vec<String>,
    pub modules: Vec<ModuleData>,
    pub loader: ModuleLoader,
    pub ctx: Vec<FuncCtx>,
    trace: Vec<(String, SourceSpan)>,
    /// Source attached to the first error (module imports have their
    /// own source text)
    pub error_source: Option<(String, String)>,
    pub object_template: TemplateId,
    pub sym_new: Symbol,
}

impl<'cfg> Analyzer<'cfg> {
    pub fn new(config: &'cfg Config, mut interner: Interner, loader: ModuleLoader) -> Self {
        let mut alloc = Allocator::new(
            &config.scoreboard,
            &config.entity_tag_prefix,
            &config.internal_folder,
        );
        let mut entities = EntityRegistry::new();
        let mut scopes = ScopeStack::new();

        // The implicit root template every entity derives from
        let object_tag = alloc.tag();
        let object_template = entities
            .register(
                TemplateDef {
                    name: "Object".to_string(),
                    parents: vec![],
                    etype: None,
                    spawn_context: None,
                    spawn_coords: None,
                    fields: vec![],
                    methods: vec![],
                    span: (0, 0).into(),
                },
                object_tag,
                &interner,
            )
            .expect("root template always linearizes");

        // Builtin type names
        let builtin_types: &[(&str, Type)] = &[
            ("int", Type::Int),
            ("bool", Type::Bool),
            ("float", Type::Float),
            ("str", Type::Str),
            ("Pos", Type::Pos),
            ("Rot", Type::Rot),
            ("Offset", Type::Offset),
            ("Engroup", Type::Engroup(object_template)),
            ("Enfilter", Type::Enfilter),
            ("Any", Type::Any),
        ];
        for (name, ty) in builtin_types {
            let sym = interner.intern(name);
            scopes.define_builtin(sym, Binding::Const(ConstValue::Type(*ty)));
        }
        let object_sym = interner.intern("Object");
        scopes.define_builtin(object_sym, Binding::Template(object_template));

        let sym_new = interner.intern("new");

        Self {
            config,
            interner,
            scopes,
            alloc,
            entities,
            structs: StructRegistry::new(),
            funcs: Vec::new(),
            specs: FxHashMap::default(),
            dispatch_results: FxHashMap::default(),
            files: Vec::new(),
            buffers: vec![Vec::new()],
            init_cmds: Vec::new(),
            interfaces: Vec::new(),
            modules: Vec::new(),
            loader,
            ctx: Vec::new(),
            trace: Vec::new(),
            error_source: None,
            object_template,
            sym_new,
        }
    }

    // --- Small helpers ---

    pub fn emit(&mut self, cmd: Command) {
        self.buffers.last_mut().expect("buffer stack").push(cmd);
    }

    pub fn emit_all(&mut self, cmds: impl IntoIterator<Item = Command>) {
        self.buffers.last_mut().expect("buffer stack").extend(cmds);
    }

    pub fn push_buffer(&mut self) {
        self.buffers.push(Vec::new());
    }

    pub fn pop_buffer(&mut self) -> Vec<Command> {
        self.buffers.pop().expect("buffer stack underflow")
    }

    /// Store commands as a fresh internal file, returning its path.
    pub fn new_file(&mut self, commands: Vec<Command>) -> String {
        let path = self.alloc.file_path();
        self.files.push(McFunctionFile {
            path: path.clone(),
            commands,
        });
        path
    }

    /// Call path for `function` commands: function folder prefix plus
    /// the file's own path.
    pub fn call_path(&self, path: &str) -> String {
        if self.config.function_folder.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.config.function_folder, path)
        }
    }

    pub fn err(&self, e: SemaError) -> CompileError {
        let mut traced = Traced::new(e);
        for (msg, span) in self.trace.iter().rev() {
            traced = traced.with_frame(msg.clone(), *span);
        }
        CompileError::Sema(traced)
    }

    pub fn name_of(&self, sym: Symbol) -> String {
        self.interner.resolve(sym).to_string()
    }

    pub fn type_name(&self, ty: Type) -> String {
        match ty {
            Type::Engroup(t) => format!("Engroup[{}]", self.entities.get(t).name),
            Type::Entity(t) => self.entities.get(t).name.clone(),
            Type::Struct(s) => self.structs.get(s).name.clone(),
            other => other.base_name().to_string(),
        }
    }

    /// Assignment compatibility with entity covariance.
    pub fn types_match(&self, expected: Type, found: Type) -> bool {
        match (expected, found) {
            (Type::Any, _) => true,
            (Type::Entity(a), Type::Entity(b)) => self.entities.is_subtemplate(b, a),
            (Type::Engroup(a), Type::Engroup(b)) => self.entities.is_subtemplate(b, a),
            (a, b) => a == b,
        }
    }

    pub fn buffer_depth(&self) -> usize {
        self.buffers.len()
    }

    pub fn in_const_context(&self) -> bool {
        self.scopes.world() == World::CompileTime
    }

    // --- Entry point ---

    pub fn analyze(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.stmts {
            self.statement(stmt)?;
        }
        Ok(())
    }

    /// Assemble the final output tree.
    pub fn finish(mut self) -> Result<Output, CompileError> {
        let main_cmds = self.buffers.pop().expect("main buffer");
        debug!(
            files = self.files.len(),
            interfaces = self.interfaces.len(),
            "assembling output"
        );

        let mut init = Vec::new();
        if self.config.debug_comments {
            init.push(Command::Comment(
                "Initialize Acacia. Run this once before anything else.".to_string(),
            ));
        }
        init.push(Command::ScbObjAdd {
            name: self.config.scoreboard.clone(),
        });
        for obj in self.alloc.extra_objectives() {
            init.push(Command::ScbObjAdd { name: obj.clone() });
        }
        for (value, slot) in self.alloc.int_consts() {
            init.push(Command::ScbSetConst {
                slot: slot.clone(),
                value,
            });
        }
        init.extend(self.init_cmds.drain(..));

        let mut files = Vec::new();
        match &self.config.init_file {
            Some(name) => {
                files.push(McFunctionFile {
                    path: self.config.main_file.clone(),
                    commands: main_cmds,
                });
                files.push(McFunctionFile {
                    path: name.clone(),
                    commands: init,
                });
            }
            None => {
                init.extend(main_cmds);
                files.push(McFunctionFile {
                    path: self.config.main_file.clone(),
                    commands: init,
                });
            }
        }
        files.extend(self.files);
        Ok(Output { files })
    }

    // --- Statements ---

    pub fn statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match &stmt.kind {
            StmtKind::Pass => Ok(()),
            StmtKind::Expr(expr) => {
                self.analyze_expr(expr)?;
                Ok(())
            }
            StmtKind::VarDecl { name, ty, init } => self.var_decl(*name, ty, init.as_ref(), stmt),
            StmtKind::AutoDecl { name, init } => self.auto_decl(*name, init, stmt),
            StmtKind::ConstDecl { name, ty, init } => self.const_decl(*name, ty.as_ref(), init, stmt),
            StmtKind::RefDecl { name, ty, target } => self.ref_decl(*name, ty.as_ref(), target, stmt),
            StmtKind::Assign { target, value } => self.assign(target, value),
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value),
            StmtKind::If { arms, orelse } => self.if_stmt(arms, orelse.as_ref()),
            StmtKind::While { cond, body } => self.while_stmt(cond, body),
            StmtKind::For {
                var,
                iterable,
                body,
            } => self.for_stmt(*var, iterable, body),
            StmtKind::FuncDef(def) => self.func_def(def),
            StmtKind::EntityDef(def) => self.entity_def(def),
            StmtKind::StructDef(def) => self.struct_def(def),
            StmtKind::InterfaceDef { path, body } => self.interface_def(path, body, stmt),
            StmtKind::Command(segments) => self.command_stmt(segments, stmt),
            StmtKind::Result(value) => self.result_stmt(value.as_ref(), stmt),
            StmtKind::NewCall { args, kwargs } => self.new_call(args, kwargs, stmt),
            StmtKind::Import { path } => self.import_stmt(path, stmt),
        }
    }

    pub fn block(&mut self, block: &Block) -> Result<(), CompileError> {
        for stmt in &block.stmts {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn block_scoped(&mut self, block: &Block) -> Result<(), CompileError> {
        let world = self.scopes.world();
        self.scopes.push(world);
        let result = self.block(block);
        self.scopes.pop();
        result
    }

    // --- Declarations ---

    fn var_decl(
        &mut self,
        name: Symbol,
        ty: &Expr,
        init: Option<&Expr>,
        stmt: &Stmt,
    ) -> Result<(), CompileError> {
        if self.scopes.defined_here(name) {
            return Err(self.err(SemaError::ShadowedName {
                name: self.name_of(name),
                span: stmt.span.into(),
            }));
        }
        let declared = self.resolve_type_expr(ty)?;
        if !declared.has_runtime_form() {
            return Err(self.err(SemaError::NotStorableType {
                ty: self.type_name(declared),
                span: ty.span.into(),
            }));
        }
        if self.in_const_context() {
            return Err(self.err(SemaError::RuntimeStmtInConstContext {
                span: stmt.span.into(),
            }));
        }
        let place = self.allocate_place(declared, ty.span)?;
        self.init_place(&place);
        if let Some(init) = init {
            let value = self.analyze_expr(init)?;
            if !self.types_match(declared, value.ty()) {
                return Err(self.err(SemaError::WrongAssignType {
                    expected: self.type_name(declared),
                    found: self.type_name(value.ty()),
                    span: init.span.into(),
                }));
            }
            self.store_initial(&place, &value, init.span)?;
        }
        self.scopes.define(name, Binding::Var(place));
        Ok(())
    }

    fn auto_decl(&mut self, name: Symbol, init: &Expr, stmt: &Stmt) -> Result<(), CompileError> {
        if self.scopes.defined_here(name) {
            return Err(self.err(SemaError::ShadowedName {
                name: self.name_of(name),
                span: stmt.span.into(),
            }));
        }
        let value = self.analyze_expr(init)?;
        self.bind_value(name, value, init.span)
    }

    /// Bind a fresh name to a value: runtime values get storage (or
    /// adopt the fresh location they already carry), compile-time
    /// values become constants.
    fn bind_value(&mut self, name: Symbol, value: Value, span: Span) -> Result<(), CompileError> {
        match value {
            Value::Const(c) => {
                let ty = c.ty();
                if ty.has_runtime_form() && !self.in_const_context() {
                    // Implicit promotion: a constant of a runtime-form
                    // type declares a runtime variable.
                    let place = self.allocate_place(ty, span)?;
                    self.store_initial(&place, &Value::Const(c), span)?;
                    self.scopes.define(name, Binding::Var(place));
                } else {
                    self.scopes.define(name, Binding::Const(c));
                }
                Ok(())
            }
            // Runtime values get their own storage; copying through
            // `store_value` keeps the new variable independent of the
            // source location (retagging, slot copies).
            v @ (Value::Entity(_)
            | Value::Group { .. }
            | Value::Struct { .. }
            | Value::Score { .. }
            | Value::Condition(_)) => {
                let ty = v.ty();
                let place = self.allocate_place(ty, span)?;
                self.store_value(&place, &v, span)?;
                self.scopes.define(name, Binding::Var(place));
                Ok(())
            }
            Value::Callable(_) => Err(self.err(SemaError::CantRef { span: span.into() })),
        }
    }

    fn const_decl(
        &mut self,
        name: Symbol,
        ty: Option<&Expr>,
        init: &Expr,
        stmt: &Stmt,
    ) -> Result<(), CompileError> {
        if self.scopes.defined_here(name) {
            return Err(self.err(SemaError::ShadowedName {
                name: self.name_of(name),
                span: stmt.span.into(),
            }));
        }
        let value = self.analyze_expr(init)?;
        let constant = self.require_const(value, init)?;
        if let Some(ty) = ty {
            let declared = self.resolve_type_expr(ty)?;
            if !self.types_match(declared, constant.ty()) {
                return Err(self.err(SemaError::WrongAssignType {
                    expected: self.type_name(declared),
                    found: self.type_name(constant.ty()),
                    span: init.span.into(),
                }));
            }
        }
        self.scopes.define(name, Binding::Const(constant));
        Ok(())
    }

    /// Demand a compile-time value, naming the runtime offender.
    pub fn require_const(&self, value: Value, expr: &Expr) -> Result<ConstValue, CompileError> {
        match value {
            Value::Const(c) => Ok(c),
            _ => Err(self.err(match &expr.kind {
                ExprKind::Ident(sym) => SemaError::NotConstName {
                    name: self.name_of(*sym),
                    span: expr.span.into(),
                },
                ExprKind::Attribute { name, .. } => SemaError::NotConstAttr {
                    attr: self.name_of(*name),
                    span: expr.span.into(),
                },
                _ => SemaError::NotConstName {
                    name: "<expression>".to_string(),
                    span: expr.span.into(),
                },
            })),
        }
    }

    fn ref_decl(
        &mut self,
        name: Symbol,
        ty: Option<&Expr>,
        target: &Expr,
        stmt: &Stmt,
    ) -> Result<(), CompileError> {
        if self.scopes.defined_here(name) {
            return Err(self.err(SemaError::ShadowedName {
                name: self.name_of(name),
                span: stmt.span.into(),
            }));
        }
        let value = self.analyze_expr(target)?;
        let Some(place) = value.place() else {
            return Err(self.err(SemaError::CantRef {
                span: target.span.into(),
            }));
        };
        if let Some(ty) = ty {
            let declared = self.resolve_type_expr(ty)?;
            if !self.types_match(declared, place.ty()) {
                return Err(self.err(SemaError::WrongAssignType {
                    expected: self.type_name(declared),
                    found: self.type_name(place.ty()),
                    span: target.span.into(),
                }));
            }
        }
        self.scopes.define(name, Binding::Ref(place));
        Ok(())
    }

    // --- Assignment ---

    fn assign(&mut self, target: &Expr, value_expr: &Expr) -> Result<(), CompileError> {
        // Assignment to an unbound name declares it
        if let ExprKind::Ident(name) = target.kind {
            match self.scopes.lookup(name) {
                None => {
                    let value = self.analyze_expr(value_expr)?;
                    return self.bind_value(name, value, value_expr.span);
                }
                Some(Binding::Const(_)) => {
                    return Err(self.err(SemaError::AssignToConst {
                        name: self.name_of(name),
                        span: target.span.into(),
                    }));
                }
                _ => {}
            }
        }
        let place = self.resolve_place(target)?;
        let value = self.analyze_expr(value_expr)?;
        if !self.types_match(place.ty(), value.ty()) {
            return Err(self.err(SemaError::WrongAssignType {
                expected: self.type_name(place.ty()),
                found: self.type_name(value.ty()),
                span: value_expr.span.into(),
            }));
        }
        self.store_value(&place, &value, value_expr.span)
    }

    fn aug_assign(
        &mut self,
        target: &Expr,
        op: BinaryOp,
        value_expr: &Expr,
    ) -> Result<(), CompileError> {
        let place = self.resolve_place(target)?;
        let Place::Score { slot, ty: Type::Int } = &place else {
            return Err(self.err(SemaError::InvalidOperand {
                op: format!("{}=", op.as_str()),
                operands: self.type_name(place.ty()),
                span: target.span.into(),
            }));
        };
        let slot = slot.clone();
        let value = self.analyze_expr(value_expr)?;
        self.augment_slot(&slot, op, &value, value_expr.span)
    }

    /// The assignable location a target expression denotes.
    pub fn resolve_place(&mut self, target: &Expr) -> Result<Place, CompileError> {
        match &target.kind {
            ExprKind::Ident(name) => match self.scopes.lookup(*name) {
                None => Err(self.err(SemaError::NameNotDefined {
                    name: self.name_of(*name),
                    span: target.span.into(),
                })),
                Some(Binding::Var(place)) | Some(Binding::Ref(place)) => Ok(place.clone()),
                Some(Binding::Const(_)) => Err(self.err(SemaError::AssignToConst {
                    name: self.name_of(*name),
                    span: target.span.into(),
                })),
                Some(_) => Err(self.err(SemaError::CantRef {
                    span: target.span.into(),
                })),
            },
            _ => {
                let value = self.analyze_expr(target)?;
                value.place().ok_or_else(|| {
                    self.err(SemaError::CantRef {
                        span: target.span.into(),
                    })
                })
            }
        }
    }

    // --- Control flow ---

    fn if_stmt(&mut self, arms: &[IfArm], orelse: Option<&Block>) -> Result<(), CompileError> {
        let Some((first, rest)) = arms.split_first() else {
            if let Some(block) = orelse {
                return self.block_scoped(block);
            }
            return Ok(());
        };

        let cond_value = self.analyze_expr(&first.cond)?;
        match self.to_condition(cond_value, &first.cond)? {
            Ok(true) => {
                // Statically selected branch: only it reaches the
                // output, dead branches never emit.
                self.block_scoped(&first.body)
            }
            Ok(false) => self.if_stmt(rest, orelse),
            Err(cond) => {
                self.emit_all(cond.deps.iter().cloned());

                // Analyze the taken branch into its own buffer
                self.push_buffer();
                let world = self.scopes.world();
                self.scopes.push(world);
                let body_result = self.block(&first.body);
                self.scopes.pop();
                let then_cmds = self.pop_buffer();
                body_result?;

                let has_else = !rest.is_empty() || orelse.is_some();
                if !has_else {
                    self.emit_branch(cond.subs, then_cmds);
                    return Ok(());
                }

                // Materialize the condition so both branches test the
                // same frozen answer
                let flag = self.materialize_condition(&cond);

                self.push_buffer();
                let else_result = self.if_stmt(rest, orelse);
                let else_cmds = self.pop_buffer();
                else_result?;

                self.emit_branch(
                    vec![ExecuteSub::ScoreMatch {
                        slot: flag.clone(),
                        range: "1".to_string(),
                        invert: false,
                    }],
                    then_cmds,
                );
                self.emit_branch(
                    vec![ExecuteSub::ScoreMatch {
                        slot: flag,
                        range: "0".to_string(),
                        invert: false,
                    }],
                    else_cmds,
                );
                Ok(())
            }
        }
    }

    /// Emit a guarded body: small bodies are inlined one command at a
    /// time under the guard, larger ones become an internal file.
    fn emit_branch(&mut self, subs: Vec<ExecuteSub>, cmds: Vec<Command>) {
        if cmds.is_empty() {
            return;
        }
        let real_lines = cmds.iter().filter(|c| !c.is_comment()).count();
        let single = real_lines == 1;
        if self.config.optimize && real_lines <= self.config.max_inline && (single || subs.len() == 1)
        {
            for cmd in cmds {
                if cmd.is_comment() {
                    self.emit(cmd);
                } else {
                    self.emit(Command::execute(subs.clone(), cmd));
                }
            }
        } else {
            let path = self.new_file(cmds);
            let call = self.call_path(&path);
            self.emit(Command::execute(subs, Command::InvokeFunction { path: call }));
        }
    }

    /// Freeze a condition into a 0/1 slot.
    pub fn materialize_condition(&mut self, cond: &Condition) -> ScbSlot {
        let slot = self.alloc.slot();
        self.emit_all(cond.deps.iter().cloned());
        self.emit(Command::ScbSetConst {
            slot: slot.clone(),
            value: 0,
        });
        self.emit(Command::execute(
            cond.subs.clone(),
            Command::ScbSetConst {
                slot: slot.clone(),
                value: 1,
            },
        ));
        slot
    }

    fn while_stmt(&mut self, cond: &Expr, body: &Block) -> Result<(), CompileError> {
        // The condition re-evaluates before every iteration, so its
        // lowering commands are captured as dependencies instead of
        // flowing into the surrounding buffer.
        self.push_buffer();
        let analyzed = self.analyze_expr(cond);
        let cond_cmds = self.pop_buffer();
        let cond_value = analyzed?;
        let classified = self.to_condition_while(cond_value, cond)?;
        let classified = match classified {
            Err(mut c) => {
                let mut deps = cond_cmds;
                deps.extend(c.deps);
                c.deps = deps;
                Err(c)
            }
            ok => ok,
        };
        match classified {
            Ok(true) => Err(self.err(SemaError::EndlessWhileLoop {
                span: cond.span.into(),
            })),
            Ok(false) => Ok(()),
            Err(c) => {
                // Body file tail-calls itself while the condition holds
                self.push_buffer();
                let world = self.scopes.world();
                self.scopes.push(world);
                let body_result = self.block(body);
                self.scopes.pop();
                let mut body_cmds = self.pop_buffer();
                body_result?;

                let path = self.alloc.file_path();
                let call = self.call_path(&path);
                body_cmds.extend(c.deps.iter().cloned());
                body_cmds.push(Command::execute(
                    c.subs.clone(),
                    Command::InvokeFunction { path: call.clone() },
                ));
                self.files.push(McFunctionFile {
                    path,
                    commands: body_cmds,
                });

                self.emit_all(c.deps.iter().cloned());
                self.emit(Command::execute(
                    c.subs,
                    Command::InvokeFunction { path: call },
                ));
                Ok(())
            }
        }
    }

    fn for_stmt(&mut self, var: Symbol, iterable: &Expr, body: &Block) -> Result<(), CompileError> {
        let value = self.analyze_expr(iterable)?;
        let items: Vec<ConstValue> = match value {
            Value::Const(ConstValue::List(items)) => items,
            Value::Const(ConstValue::Map(map)) => {
                map.entries.iter().map(|(k, _)| k.to_value()).collect()
            }
            other => {
                return Err(self.err(SemaError::NotIterable {
                    ty: self.type_name(other.ty()),
                    span: iterable.span.into(),
                }));
            }
        };
        // Unroll: the body is re-analyzed once per element
        for item in items {
            let world = self.scopes.world();
            self.scopes.push(world);
            self.scopes.define(var, Binding::Const(item));
            let result = self.block(body);
            self.scopes.pop();
            result?;
        }
        Ok(())
    }

    // --- result / new / commands / interfaces / imports ---

    fn result_stmt(&mut self, value: Option<&Expr>, stmt: &Stmt) -> Result<(), CompileError> {
        if self.ctx.is_empty() {
            return Err(self.err(SemaError::ResultOutOfScope {
                span: stmt.span.into(),
            }));
        }
        let single = self.ctx.last().unwrap().single_result;
        let seen = self.ctx.last().unwrap().results_seen;
        if single && seen > 0 {
            return Err(self.err(SemaError::MultipleResults {
                span: stmt.span.into(),
            }));
        }
        if self.ctx.last().unwrap().new_ctx.is_some() && value.is_some() {
            return Err(self.err(SemaError::InitializerResult {
                span: stmt.span.into(),
            }));
        }

        let analyzed = match value {
            Some(expr) => Some((self.analyze_expr(expr)?, expr)),
            None => None,
        };

        let result_ctx = self.ctx.last().unwrap().result.clone();
        match (result_ctx, analyzed) {
            (ResultCtx::NoneResult, None) => {}
            (ResultCtx::NoneResult, Some((_, expr))) => {
                return Err(self.err(SemaError::WrongAssignType {
                    expected: "None".to_string(),
                    found: "a value".to_string(),
                    span: expr.span.into(),
                }));
            }
            (ResultCtx::Place(place), Some((value, expr))) => {
                if !self.types_match(place.ty(), value.ty()) {
                    return Err(self.err(SemaError::WrongAssignType {
                        expected: self.type_name(place.ty()),
                        found: self.type_name(value.ty()),
                        span: expr.span.into(),
                    }));
                }
                self.store_value(&place, &value, expr.span)?;
            }
            (ResultCtx::Place(_), None) => {}
            (ResultCtx::ConstSlot(_), Some((value, expr))) => {
                let constant = match value {
                    Value::Const(c) => c,
                    _ => {
                        return Err(self.err(SemaError::NonRtResult {
                            span: expr.span.into(),
                        }));
                    }
                };
                if let Some(FuncCtx {
                    result: ResultCtx::ConstSlot(slot),
                    ..
                }) = self.ctx.last_mut()
                {
                    *slot = Some(constant);
                }
            }
            (ResultCtx::ConstSlot(_), None) => {}
            (ResultCtx::RefSlot(_), Some((value, expr))) => {
                let Some(place) = value.place() else {
                    return Err(self.err(SemaError::CantRef {
                        span: expr.span.into(),
                    }));
                };
                if let Some(FuncCtx {
                    result: ResultCtx::RefSlot(slot),
                    ..
                }) = self.ctx.last_mut()
                {
                    *slot = Some(place);
                }
            }
            (ResultCtx::RefSlot(_), None) => {}
        }
        if let Some(ctx) = self.ctx.last_mut() {
            ctx.results_seen += 1;
        }
        Ok(())
    }

    fn new_call(
        &mut self,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        stmt: &Stmt,
    ) -> Result<(), CompileError> {
        let Some(new_ctx) = self.ctx.last().and_then(|c| c.new_ctx.clone()) else {
            return Err(self.err(SemaError::NewOutOfScope {
                span: stmt.span.into(),
            }));
        };
        if !args.is_empty() {
            return Err(self.err(SemaError::TooManyArgs {
                span: stmt.span.into(),
            }));
        }

        let mut etype_override = None;
        let mut pos_override: Option<(Vec<ExecuteSub>, String)> = None;
        for (name, expr) in kwargs {
            let key = self.name_of(*name);
            let value = self.analyze_expr(expr)?;
            let constant = self.require_const(value, expr)?;
            match (key.as_str(), constant) {
                ("type", ConstValue::Str(s)) => etype_override = Some(s),
                ("pos", ConstValue::Pos(p)) => {
                    pos_override = Some((p.context, "~ ~ ~".to_string()));
                }
                ("pos", ConstValue::Str(s)) => pos_override = Some((vec![], s)),
                (key, _) => {
                    return Err(self.err(SemaError::UnexpectedKeywordArg {
                        arg: key.to_string(),
                        span: expr.span.into(),
                    }));
                }
            }
        }

        self.emit_summon(new_ctx.template, &new_ctx.instance_tag, etype_override, pos_override);
        Ok(())
    }

    /// Summon one instance of a template and attach its identity and
    /// instance tags.
    pub fn emit_summon(
        &mut self,
        template: TemplateId,
        instance_tag: &str,
        etype_override: Option<String>,
        pos_override: Option<(Vec<ExecuteSub>, String)>,
    ) {
        let tpl = self.entities.get(template);
        let etype = etype_override.unwrap_or_else(|| tpl.etype.clone());
        let (context, coords) = pos_override
            .unwrap_or_else(|| (tpl.spawn_context.clone(), tpl.spawn_coords.clone()));
        let runtime_tag = tpl.runtime_tag.clone();
        let name = self.alloc.entity_name();

        self.emit(Command::execute(
            context,
            Command::Raw(format!("summon {} {} {}", etype, name, coords)),
        ));
        let selector = format!("@e[name={}]", name);
        self.emit(Command::TagAdd {
            target: selector.clone(),
            tag: runtime_tag,
        });
        self.emit(Command::TagAdd {
            target: selector,
            tag: instance_tag.to_string(),
        });
    }

    fn command_stmt(
        &mut self,
        segments: &[CommandSegment],
        stmt: &Stmt,
    ) -> Result<(), CompileError> {
        if self.in_const_context() {
            return Err(self.err(SemaError::RuntimeStmtInConstContext {
                span: stmt.span.into(),
            }));
        }
        let mut text = String::new();
        for segment in segments {
            match segment {
                CommandSegment::Text(t) => text.push_str(t),
                CommandSegment::Interp { name, span } => {
                    let binding = self.scopes.lookup(*name).cloned();
                    let constant = match binding {
                        None => {
                            return Err(self.err(SemaError::NameNotDefined {
                                name: self.name_of(*name),
                                span: (*span).into(),
                            }));
                        }
                        Some(Binding::Const(c)) => c,
                        Some(_) => {
                            return Err(self.err(SemaError::NotConstName {
                                name: self.name_of(*name),
                                span: (*span).into(),
                            }));
                        }
                    };
                    let Some(rendered) = constant.cmd_str() else {
                        return Err(self.err(SemaError::InvalidCommandInterp {
                            name: self.name_of(*name),
                            span: (*span).into(),
                        }));
                    };
                    text.push_str(&rendered);
                }
            }
        }
        self.emit(Command::Raw(text));
        Ok(())
    }

    fn interface_def(
        &mut self,
        path: &[String],
        body: &Block,
        stmt: &Stmt,
    ) -> Result<(), CompileError> {
        if self.in_const_context() {
            return Err(self.err(SemaError::RuntimeStmtInConstContext {
                span: stmt.span.into(),
            }));
        }
        let joined = path.join("/");
        let reserved = joined == self.config.main_file
            || self.config.init_file.as_deref() == Some(joined.as_str());
        if reserved {
            return Err(CompileError::Emit(EmitError::ReservedInterfacePath {
                path: joined,
                span: stmt.span.into(),
            }));
        }
        if self.interfaces.contains(&joined) {
            return Err(CompileError::Emit(EmitError::DuplicateInterface {
                path: joined,
                span: stmt.span.into(),
            }));
        }
        self.interfaces.push(joined.clone());

        self.push_buffer();
        if self.config.debug_comments {
            self.emit(Command::Comment(format!("interface {}", path.join("."))));
        }
        self.scopes.push(World::Runtime);
        let result = self.block(body);
        self.scopes.pop();
        let cmds = self.pop_buffer();
        result?;
        self.files.push(McFunctionFile {
            path: joined,
            commands: cmds,
        });
        Ok(())
    }

    fn import_stmt(&mut self, path: &[Symbol], stmt: &Stmt) -> Result<(), CompileError> {
        let segments: Vec<String> = path.iter().map(|s| self.name_of(*s)).collect();
        let bind_name = *path.last().expect("import path non-empty");
        let dotted = segments.join(".");

        // Builtin modules shadow source files
        if segments.len() == 1 {
            if let Some(exports) = crate::sema::builtins::builtin_module_exports(&segments[0]) {
                let mut map = FxHashMap::default();
                for (name, export) in exports {
                    let sym = self.interner.intern(name);
                    let binding = match export {
                        crate::sema::builtins::BuiltinExport::Func(f) => Binding::Builtin(*f),
                        crate::sema::builtins::BuiltinExport::Str(s) => {
                            Binding::Const(ConstValue::Str(s.to_string()))
                        }
                    };
                    map.insert(sym, binding);
                }
                let id = ModuleId(self.modules.len() as u32);
                self.modules.push(ModuleData {
                    name: dotted,
                    exports: map,
                });
                self.scopes.define(bind_name, Binding::Module(id));
                return Ok(());
            }
        }

        let seg_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        let Some(resolved) = self.loader.resolve(&seg_refs) else {
            return Err(CompileError::Emit(EmitError::ModuleNotFound {
                name: dotted,
                span: stmt.span.into(),
            }));
        };
        if let Some(id) = self.loader.cached(&resolved) {
            self.scopes.define(bind_name, Binding::Module(id));
            return Ok(());
        }
        if self.loader.is_loading(&resolved) {
            return Err(CompileError::Emit(EmitError::CircularParse {
                name: dotted,
                span: stmt.span.into(),
            }));
        }

        let source = std::fs::read_to_string(&resolved)
            .map_err(|e| CompileError::Emit(EmitError::Io(e)))?;
        self.loader.begin(resolved.clone());
        debug!(module = %dotted, "compiling imported module");

        let interner = std::mem::take(&mut self.interner);
        let mut parser = match Parser::with_interner(&source, interner) {
            Ok(p) => p,
            Err(e) => {
                self.error_source = Some((dotted, source.clone()));
                return Err(e);
            }
        };
        let program = match parser.parse_program() {
            Ok(p) => p,
            Err(e) => {
                self.interner = parser.into_interner();
                self.error_source = Some((dotted, source.clone()));
                return Err(e);
            }
        };
        self.interner = parser.into_interner();

        // Module globals live in their own frame; its bindings become
        // the exports. Top-level module commands run at the import
        // site.
        self.trace
            .push((format!("importing `{}`", dotted), stmt.span.into()));
        self.scopes.push(World::Runtime);
        let depth = self.scopes.depth();
        let result = self.analyze(&program);
        self.scopes.truncate(depth);
        if let Err(e) = result {
            if self.error_source.is_none() {
                self.error_source = Some((dotted, source));
            }
            return Err(e);
        }
        self.trace.pop();
        let exports = self.scopes.pop_with_bindings();

        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleData {
            name: dotted,
            exports,
        });
        self.loader.finish(resolved, id);
        self.scopes.define(bind_name, Binding::Module(id));
        Ok(())
    }

    // --- Functions ---

    fn func_def(&mut self, def: &FuncDef) -> Result<(), CompileError> {
        let name = self.name_of(def.name);
        self.validate_ports(def)?;
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(UserFunc {
            def: def.clone(),
            name,
        });
        self.scopes.define(def.name, Binding::Func(id));

        // Runtime functions without const-port parameters have a
        // single body; compile it now so unused functions are still
        // checked. Const-port functions specialize per call.
        if def.flavor == FuncFlavor::Runtime
            && !def.params.iter().any(|p| p.port == ParamPort::Const)
        {
            self.compile_func_spec(id, &[])?;
        }
        Ok(())
    }

    fn validate_ports(&self, def: &FuncDef) -> Result<(), CompileError> {
        for param in &def.params {
            let bad = match def.flavor {
                FuncFlavor::Runtime | FuncFlavor::Inline => false,
                FuncFlavor::Const => param.port == ParamPort::ByRef,
            };
            if bad {
                return Err(self.err(SemaError::InvalidParamPort {
                    arg: self.name_of(param.name),
                    span: param.span.into(),
                }));
            }
        }
        // Reference and const results only make sense when the body is
        // expanded at the call site
        if def.result_port != ParamPort::ByValue && def.flavor == FuncFlavor::Runtime {
            return Err(self.err(SemaError::InvalidParamPort {
                arg: "result".to_string(),
                span: def.span.into(),
            }));
        }
        Ok(())
    }

    /// Resolve a parameter's declared type, falling back to the type
    /// of its default value.
    pub fn param_type(&mut self, param: &Param) -> Result<(Type, Option<ConstValue>), CompileError> {
        let default = match &param.default {
            Some(expr) => {
                let value = self.analyze_expr(expr)?;
                let constant = match value {
                    Value::Const(c) => c,
                    _ => {
                        let kind = if param.port == ParamPort::Const {
                            SemaError::ArgDefaultNotConst {
                                arg: self.name_of(param.name),
                                span: expr.span.into(),
                            }
                        } else {
                            SemaError::NonRefArgDefaultNotConst {
                                arg: self.name_of(param.name),
                                span: expr.span.into(),
                            }
                        };
                        return Err(self.err(kind));
                    }
                };
                Some(constant)
            }
            None => None,
        };
        let ty = match &param.ty {
            Some(expr) => self.resolve_type_expr(expr)?,
            None => match &default {
                Some(c) => c.ty(),
                None => {
                    return Err(self.err(SemaError::InvalidTypeSpec {
                        ty: self.name_of(param.name),
                        span: param.span.into(),
                    }));
                }
            },
        };
        Ok((ty, default))
    }

    /// Compile one runtime-function body. `const_args` supplies the
    /// values of const-port parameters in declaration order.
    pub fn compile_func_spec(
        &mut self,
        id: FuncId,
        const_args: &[(Symbol, ConstValue)],
    ) -> Result<RtSpec, CompileError> {
        let def = self.funcs[id.0 as usize].def.clone();
        let fn_name = self.funcs[id.0 as usize].name.clone();
        let key = SpecKey::Func(id, const_key(const_args));
        if let Some(spec) = self.specs.get(&key) {
            return Ok(spec.clone());
        }

        let mut params = Vec::new();
        for param in &def.params {
            let (ty, default) = self.param_type(param)?;
            let place = match param.port {
                ParamPort::Const => None,
                _ => {
                    if !ty.has_runtime_form() {
                        return Err(self.err(SemaError::NotStorableType {
                            ty: self.type_name(ty),
                            span: param.span.into(),
                        }));
                    }
                    Some(self.allocate_place(ty, param.span)?)
                }
            };
            params.push(SpecParam {
                name: param.name,
                port: param.port,
                ty,
                place,
                default,
            });
        }

        let result_ty = match &def.result_ty {
            Some(expr) => self.resolve_type_expr(expr)?,
            None => Type::None,
        };
        let result = if result_ty == Type::None {
            None
        } else {
            if !result_ty.has_runtime_form() {
                return Err(self.err(SemaError::NotStorableType {
                    ty: self.type_name(result_ty),
                    span: def.span.into(),
                }));
            }
            Some(self.allocate_place(result_ty, def.span)?)
        };

        let file_path = self.alloc.file_path();
        let spec = RtSpec {
            file_path: file_path.clone(),
            params: params.clone(),
            result: result.clone(),
            result_ty,
        };
        // Register before analyzing the body so recursion finds it
        self.specs.insert(key, spec.clone());

        self.scopes.push_function(World::Runtime, None);
        for spec_param in &params {
            match (&spec_param.place, &spec_param.port) {
                (Some(place), _) => {
                    self.scopes
                        .define(spec_param.name, Binding::Var(place.clone()));
                }
                (None, ParamPort::Const) => {
                    let value = const_args
                        .iter()
                        .find(|(n, _)| *n == spec_param.name)
                        .map(|(_, v)| v.clone())
                        .or_else(|| spec_param.default.clone())
                        .expect("const param has call value or default");
                    self.scopes.define(spec_param.name, Binding::Const(value));
                }
                _ => unreachable!(),
            }
        }
        self.ctx.push(FuncCtx {
            flavor: FuncFlavor::Runtime,
            result: match &result {
                Some(place) => ResultCtx::Place(place.clone()),
                None => ResultCtx::NoneResult,
            },
            result_ty,
            single_result: false,
            results_seen: 0,
            new_ctx: None,
            name: fn_name.clone(),
        });
        self.push_buffer();
        if self.config.debug_comments {
            self.emit(Command::Comment(format!("function {}", fn_name)));
        }
        let body_result = self.block(&def.body);
        let cmds = self.pop_buffer();
        self.ctx.pop();
        self.scopes.pop();
        body_result?;

        self.files.push(McFunctionFile {
            path: file_path,
            commands: cmds,
        });
        Ok(spec)
    }

    // --- Structs ---

    fn struct_def(&mut self, def: &StructDef) -> Result<(), CompileError> {
        let mut bases = Vec::new();
        for base in &def.bases {
            let value = self.analyze_expr(base)?;
            match value {
                Value::Callable(crate::sema::value::CallableRef::Struct(id)) => bases.push(id),
                other => {
                    return Err(self.err(SemaError::InvalidTypeSpec {
                        ty: self.type_name(other.ty()),
                        span: base.span.into(),
                    }));
                }
            }
        }
        let mut own_fields = Vec::new();
        for field in &def.fields {
            let ty = self.resolve_type_expr(&field.ty)?;
            if !ty.storable_as_struct_field() {
                return Err(self.err(SemaError::UnsupportedSField {
                    ty: self.type_name(ty),
                    span: field.ty.span.into(),
                }));
            }
            own_fields.push((field.name, ty, field.span.into()));
        }
        let name = self.name_of(def.name);
        let id = self
            .structs
            .register(name, &bases, own_fields, def.span.into(), &self.interner)
            .map_err(|e| self.err(e))?;
        self.scopes.define(def.name, Binding::StructTpl(id));
        Ok(())
    }

    // --- Entities ---

    fn entity_def(&mut self, def: &EntityDef) -> Result<(), CompileError> {
        let mut parents = Vec::new();
        for base in &def.bases {
            let value = self.analyze_expr(base)?;
            match value {
                Value::Callable(crate::sema::value::CallableRef::Template(id)) => parents.push(id),
                other => {
                    return Err(self.err(SemaError::InvalidTypeSpec {
                        ty: self.type_name(other.ty()),
                        span: base.span.into(),
                    }));
                }
            }
        }
        if parents.is_empty() {
            parents.push(self.object_template);
        }

        let mut etype = None;
        let mut spawn_context = None;
        let mut spawn_coords = None;
        for meta in &def.metas {
            let key = self.name_of(meta.name);
            let value = self.analyze_expr(&meta.value)?;
            let constant = self.require_const(value, &meta.value)?;
            match (key.as_str(), constant) {
                ("type", ConstValue::Str(s)) => etype = Some(s),
                ("type", _) => {
                    return Err(self.err(SemaError::EntityMetaType {
                        name: key,
                        expected: "a string".to_string(),
                        span: meta.span.into(),
                    }));
                }
                ("position", ConstValue::Pos(PosValue { context })) => {
                    spawn_context = Some(context);
                    spawn_coords = Some("~ ~ ~".to_string());
                }
                ("position", ConstValue::Str(s)) => {
                    spawn_context = Some(vec![]);
                    spawn_coords = Some(s);
                }
                ("position", _) => {
                    return Err(self.err(SemaError::EntityMetaType {
                        name: key,
                        expected: "a string or Pos".to_string(),
                        span: meta.span.into(),
                    }));
                }
                (_, _) => {
                    return Err(self.err(SemaError::InvalidEntityMeta {
                        name: key,
                        span: meta.span.into(),
                    }));
                }
            }
        }

        let mut fields = Vec::new();
        for field in &def.fields {
            let ty = self.resolve_type_expr(&field.ty)?;
            if !ty.storable_as_entity_field() {
                return Err(self.err(SemaError::UnsupportedEField {
                    ty: self.type_name(ty),
                    span: field.ty.span.into(),
                }));
            }
            if let Type::Struct(sid) = ty {
                if let Some((fname, fty)) = self.structs.entity_unsupported_field(sid) {
                    return Err(self.err(SemaError::UnsupportedEFieldInStruct {
                        attr: self.name_of(fname),
                        ty: self.type_name(fty),
                        span: field.ty.span.into(),
                    }));
                }
            }
            let storage = self.entity_field_storage(ty);
            fields.push((field.name, storage, field.span.into()));
        }

        let mut methods: Vec<(Symbol, MethodInfo, SourceSpan)> = Vec::new();
        for m in &def.methods {
            let is_new = m.name == self.sym_new;
            if m.flavor == FuncFlavor::Const && m.qualifier != MethodQualifier::Static {
                return Err(self.err(SemaError::ConstMethodNotStatic {
                    span: m.span.into(),
                }));
            }
            if matches!(
                m.qualifier,
                MethodQualifier::Virtual | MethodQualifier::Override
            ) && m.flavor != FuncFlavor::Runtime
            {
                return Err(self.err(SemaError::VirtualMethodFlavor {
                    span: m.span.into(),
                }));
            }
            let result_ty = match &m.result_ty {
                Some(expr) => self.resolve_type_expr(expr)?,
                None => Type::None,
            };
            methods.push((
                m.name,
                MethodInfo {
                    def: m.clone(),
                    qualifier: m.qualifier,
                    result_ty,
                    is_new,
                },
                m.span.into(),
            ));
        }

        let runtime_tag = self.alloc.tag();
        let name = self.name_of(def.name);
        let id = self
            .entities
            .register(
                TemplateDef {
                    name,
                    parents,
                    etype,
                    spawn_context,
                    spawn_coords,
                    fields,
                    methods,
                    span: def.span.into(),
                },
                runtime_tag,
                &self.interner,
            )
            .map_err(|e| self.err(e))?;
        self.scopes.define(def.name, Binding::Template(id));

        // Compile runtime method bodies now: every defined method is
        // checked even if never called.
        let method_names: Vec<Symbol> = self
            .entities
            .get(id)
            .own_methods
            .iter()
            .filter(|(_, m)| {
                m.def.flavor == FuncFlavor::Runtime
                    && !m.is_new
                    && !m.def.params.iter().any(|p| p.port == ParamPort::Const)
            })
            .map(|(n, _)| *n)
            .collect();
        for mname in method_names {
            self.compile_method_spec(id, mname, &[])?;
        }
        Ok(())
    }

    /// Allocate storage for one entity attribute.
    fn entity_field_storage(&mut self, ty: Type) -> FieldStorage {
        match ty {
            Type::Struct(sid) => {
                let fields = self.structs.get(sid).fields.clone();
                let storages = fields
                    .into_iter()
                    .map(|(name, fty)| (name, self.entity_field_storage(fty)))
                    .collect();
                FieldStorage::Struct { id: sid, fields: storages }
            }
            ty => FieldStorage::Score {
                objective: self.alloc.objective(),
                ty,
            },
        }
    }

    /// Compile one method body for its defining template, with `self`
    /// bound to `@s`.
    pub fn compile_method_spec(
        &mut self,
        defining: TemplateId,
        method: Symbol,
        const_args: &[(Symbol, ConstValue)],
    ) -> Result<RtSpec, CompileError> {
        let key = SpecKey::Method(defining, method, const_key(const_args));
        if let Some(spec) = self.specs.get(&key) {
            return Ok(spec.clone());
        }
        let info = self
            .entities
            .get(defining)
            .own_method(method)
            .expect("method spec for defined method")
            .clone();
        let def = info.def.clone();
        let tpl_name = self.entities.get(defining).name.clone();
        let method_name = format!("{}.{}", tpl_name, self.name_of(method));

        let mut params = Vec::new();
        for param in &def.params {
            let (ty, default) = self.param_type(param)?;
            let place = match param.port {
                ParamPort::Const => None,
                _ => Some(self.allocate_place(ty, param.span)?),
            };
            params.push(SpecParam {
                name: param.name,
                port: param.port,
                ty,
                place,
                default,
            });
        }

        let result_ty = info.result_ty;
        let result = if result_ty == Type::None {
            None
        } else {
            if !result_ty.has_runtime_form() {
                return Err(self.err(SemaError::NotStorableType {
                    ty: self.type_name(result_ty),
                    span: def.span.into(),
                }));
            }
            // Overrides of a virtual share the root's result storage
            match self.entities.virtual_root(defining, method) {
                Some(root) => {
                    if let Some(place) = self.dispatch_results.get(&(root, method)) {
                        Some(place.clone())
                    } else {
                        let place = self.allocate_place(result_ty, def.span)?;
                        self.dispatch_results
                            .insert((root, method), place.clone());
                        Some(place)
                    }
                }
                None => Some(self.allocate_place(result_ty, def.span)?),
            }
        };

        let file_path = self.alloc.file_path();
        let spec = RtSpec {
            file_path: file_path.clone(),
            params: params.clone(),
            result: result.clone(),
            result_ty,
        };
        self.specs.insert(key, spec.clone());

        let self_value = if info.qualifier == MethodQualifier::Static {
            None
        } else {
            Some(EntityValue {
                template: defining,
                cast: None,
                sel: McSelector::with_var('s'),
                tag: None,
            })
        };
        self.scopes.push_function(World::Runtime, self_value);
        for spec_param in &params {
            match (&spec_param.place, &spec_param.port) {
                (Some(place), _) => {
                    self.scopes
                        .define(spec_param.name, Binding::Var(place.clone()));
                }
                (None, ParamPort::Const) => {
                    let value = const_args
                        .iter()
                        .find(|(n, _)| *n == spec_param.name)
                        .map(|(_, v)| v.clone())
                        .or_else(|| spec_param.default.clone())
                        .expect("const param has call value or default");
                    self.scopes.define(spec_param.name, Binding::Const(value));
                }
                _ => unreachable!(),
            }
        }
        self.ctx.push(FuncCtx {
            flavor: FuncFlavor::Runtime,
            result: match &result {
                Some(place) => ResultCtx::Place(place.clone()),
                None => ResultCtx::NoneResult,
            },
            result_ty,
            single_result: false,
            results_seen: 0,
            new_ctx: None,
            name: method_name.clone(),
        });
        self.push_buffer();
        if self.config.debug_comments {
            self.emit(Command::Comment(format!("method {}", method_name)));
        }
        let body_result = self.block(&def.body);
        let cmds = self.pop_buffer();
        self.ctx.pop();
        self.scopes.pop();
        body_result?;

        self.files.push(McFunctionFile {
            path: file_path,
            commands: cmds,
        });
        Ok(spec)
    }

    /// Push a trace frame around a compile-time call.
    pub fn with_trace<T>(
        &mut self,
        message: String,
        span: Span,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        self.trace.push((message, span.into()));
        let result = f(self);
        if result.is_ok() {
            self.trace.pop();
        }
        result
    }
}

/// Serialize const-port argument values into a cache key.
pub fn const_key(args: &[(Symbol, ConstValue)]) -> String {
    let mut out = String::new();
    for (name, value) in args {
        out.push_str(&format!("{}={:?};", name.0, value));
    }
    out
}
