// src/sema/exprs.rs
//! Expression analysis and lowering. Every expression resolves to a
//! `Value` in exactly one world; runtime operations append commands to
//! the current buffer as they are lowered.

use crate::codegen::cmds::{Command, ExecuteSub, RawtextPart, ScbCompareOp, ScbOp, ScbSlot};
use crate::codegen::selector::{EntityFilter, McSelector};
use crate::errors::{CompileError, SemaError};
use crate::frontend::Span;
use crate::frontend::ast::*;
use crate::sema::analyzer::{Analyzer, FuncCtx, ResultCtx};
use crate::sema::builtins::BuiltinFunc;
use crate::sema::consteval;
use crate::sema::entity::FieldStorage;
use crate::sema::scope::{Binding, World};
use crate::sema::types::{StructId, TemplateId, Type};
use crate::sema::value::{
    CallableRef, Condition, ConstMap, ConstValue, EntityValue, FStrValue, OffsetValue, Place,
    PosValue, RotValue, Value,
};

/// An integer operand for scoreboard lowering
enum IntOperand {
    Const(i32),
    Slot(ScbSlot),
}

/// One matched call argument: its value plus the source expression
/// (absent when a default filled the slot).
struct ArgValue<'a> {
    value: Value,
    expr: Option<&'a Expr>,
}

impl Analyzer<'_> {
    // --- Entry ---

    pub fn analyze_expr(&mut self, expr: &Expr) -> Result<Value, CompileError> {
        match &expr.kind {
            ExprKind::Int(v) => Ok(Value::Const(ConstValue::Int(*v))),
            ExprKind::Float(v) => Ok(Value::Const(ConstValue::Float(*v))),
            ExprKind::Bool(v) => Ok(Value::Const(ConstValue::Bool(*v))),
            ExprKind::NoneLit => Ok(Value::Const(ConstValue::None)),
            ExprKind::Str(parts) => self.analyze_string(parts, expr),
            ExprKind::ScoreLit { target, objective } => Ok(Value::Score {
                slot: ScbSlot::new(target.clone(), objective.clone()),
                ty: Type::Int,
                assignable: true,
            }),
            ExprKind::Ident(name) => self.analyze_ident(*name, expr),
            ExprKind::SelfRef => match self.scopes.current_self() {
                Some(v) => Ok(Value::Entity(v.clone())),
                None => Err(self.err(SemaError::NameNotDefined {
                    name: "self".to_string(),
                    span: expr.span.into(),
                })),
            },
            ExprKind::Unary { op, operand } => self.analyze_unary(*op, operand, expr),
            ExprKind::Binary { op, lhs, rhs } => self.analyze_binary(*op, lhs, rhs, expr),
            ExprKind::Compare { first, rest } => self.analyze_compare(first, rest, expr),
            ExprKind::Call {
                callee,
                args,
                kwargs,
            } => self.analyze_call(callee, args, kwargs, expr),
            ExprKind::Attribute {
                obj,
                name,
                name_span,
            } => self.analyze_attribute(obj, *name, *name_span),
            ExprKind::Subscript { obj, index } => self.analyze_subscript(obj, index, expr),
            ExprKind::List(items) => {
                let mut values = Vec::new();
                for item in items {
                    let v = self.analyze_expr(item)?;
                    values.push(self.require_const(v, item)?);
                }
                Ok(Value::Const(ConstValue::List(values)))
            }
            ExprKind::Map(entries) => {
                let mut map = ConstMap::default();
                for (key_expr, value_expr) in entries {
                    let key_value = self.analyze_expr(key_expr)?;
                    let key_const = self.require_const(key_value, key_expr)?;
                    let key = key_const.as_key().ok_or_else(|| {
                        self.err(SemaError::InvalidMapKey {
                            ty: self.type_name(key_const.ty()),
                            span: key_expr.span.into(),
                        })
                    })?;
                    let v = self.analyze_expr(value_expr)?;
                    let v = self.require_const(v, value_expr)?;
                    map.insert(key, v);
                }
                Ok(Value::Const(ConstValue::Map(map)))
            }
        }
    }

    fn analyze_ident(&mut self, name: Symbol, expr: &Expr) -> Result<Value, CompileError> {
        let Some(binding) = self.scopes.lookup(name) else {
            return Err(self.err(SemaError::NameNotDefined {
                name: self.name_of(name),
                span: expr.span.into(),
            }));
        };
        if self.in_const_context() && binding.is_runtime() {
            return Err(self.err(SemaError::NonRtName {
                name: self.name_of(name),
                span: expr.span.into(),
            }));
        }
        Ok(Self::binding_value(&binding.clone()))
    }

    pub fn binding_value(binding: &Binding) -> Value {
        match binding {
            Binding::Var(place) | Binding::Ref(place) => Value::from_place(place),
            Binding::Const(c) => Value::Const(c.clone()),
            Binding::Func(id) => Value::Callable(CallableRef::Func(*id)),
            Binding::Builtin(f) => Value::Callable(CallableRef::Builtin(*f)),
            Binding::Template(t) => Value::Callable(CallableRef::Template(*t)),
            Binding::StructTpl(s) => Value::Callable(CallableRef::Struct(*s)),
            Binding::Module(m) => Value::Callable(CallableRef::Module(*m)),
        }
    }

    // --- Types ---

    pub fn resolve_type_expr(&mut self, expr: &Expr) -> Result<Type, CompileError> {
        let value = self.analyze_expr(expr)?;
        match value {
            Value::Const(ConstValue::Type(ty)) => Ok(ty),
            Value::Const(ConstValue::None) => Ok(Type::None),
            Value::Callable(CallableRef::Template(t)) => Ok(Type::Entity(t)),
            Value::Callable(CallableRef::Struct(s)) => Ok(Type::Struct(s)),
            other => Err(self.err(SemaError::InvalidTypeSpec {
                ty: self.type_name(other.ty()),
                span: expr.span.into(),
            })),
        }
    }

    // --- Storage ---

    pub fn allocate_place(&mut self, ty: Type, span: Span) -> Result<Place, CompileError> {
        match ty {
            Type::Int | Type::Bool => Ok(Place::Score {
                slot: self.alloc.slot(),
                ty,
            }),
            Type::Entity(template) => Ok(Place::Entity {
                tag: self.alloc.tag(),
                template,
            }),
            Type::Engroup(template) => Ok(Place::Group {
                tag: self.alloc.tag(),
                template,
            }),
            Type::Struct(id) => {
                let fields = self.structs.get(id).fields.clone();
                let mut places = Vec::new();
                for (name, fty) in fields {
                    places.push((name, self.allocate_place(fty, span)?));
                }
                Ok(Place::Struct { id, fields: places })
            }
            other => Err(self.err(SemaError::NotStorableType {
                ty: self.type_name(other),
                span: span.into(),
            })),
        }
    }

    /// Commands establishing a freshly declared place (group handles
    /// start empty).
    pub fn init_place(&mut self, place: &Place) {
        match place {
            Place::Group { tag, .. } | Place::Entity { tag, .. } => {
                self.emit(Command::TagRemove {
                    target: format!("@e[tag={}]", tag),
                    tag: tag.clone(),
                });
            }
            Place::Struct { fields, .. } => {
                let fields = fields.clone();
                for (_, p) in &fields {
                    self.init_place(p);
                }
            }
            Place::Score { .. } => {}
        }
    }

    /// First store into a fresh declaration: constant scores at the
    /// top level are sunk into the init file.
    pub fn store_initial(
        &mut self,
        place: &Place,
        value: &Value,
        span: Span,
    ) -> Result<(), CompileError> {
        if self.is_top_level_const_init(place, value) {
            if let (Place::Score { slot, .. }, Value::Const(c)) = (place, value) {
                let raw = match c {
                    ConstValue::Int(v) => *v,
                    ConstValue::Bool(b) => *b as i32,
                    _ => unreachable!("checked by is_top_level_const_init"),
                };
                self.init_cmds.push(Command::ScbSetConst {
                    slot: slot.clone(),
                    value: raw,
                });
                return Ok(());
            }
        }
        self.store_value(place, value, span)
    }

    fn is_top_level_const_init(&self, place: &Place, value: &Value) -> bool {
        self.buffer_depth() == 1
            && self.ctx.is_empty()
            && matches!(place, Place::Score { .. })
            && matches!(
                value,
                Value::Const(ConstValue::Int(_)) | Value::Const(ConstValue::Bool(_))
            )
    }

    /// Write a type-checked value into a place.
    pub fn store_value(
        &mut self,
        place: &Place,
        value: &Value,
        span: Span,
    ) -> Result<(), CompileError> {
        match (place, value) {
            (Place::Score { slot, ty: Type::Int }, Value::Const(ConstValue::Int(v))) => {
                self.emit(Command::ScbSetConst {
                    slot: slot.clone(),
                    value: *v,
                });
                Ok(())
            }
            (Place::Score { slot, ty: Type::Bool }, Value::Const(ConstValue::Bool(b))) => {
                self.emit(Command::ScbSetConst {
                    slot: slot.clone(),
                    value: *b as i32,
                });
                Ok(())
            }
            (Place::Score { slot, .. }, Value::Score { slot: src, .. }) => {
                self.emit(Command::ScbOperation {
                    op: ScbOp::Assign,
                    lhs: slot.clone(),
                    rhs: src.clone(),
                });
                Ok(())
            }
            (Place::Score { slot, ty: Type::Bool }, Value::Condition(cond)) => {
                let cond = cond.clone();
                let slot = slot.clone();
                self.emit_all(cond.deps.iter().cloned());
                self.emit(Command::ScbSetConst {
                    slot: slot.clone(),
                    value: 0,
                });
                self.emit(Command::execute(
                    cond.subs,
                    Command::ScbSetConst { slot, value: 1 },
                ));
                Ok(())
            }
            (Place::Entity { tag, .. }, Value::Entity(e)) => {
                let tag = tag.clone();
                let sel = e.sel.to_str();
                self.emit(Command::TagRemove {
                    target: format!("@e[tag={}]", tag),
                    tag: tag.clone(),
                });
                self.emit(Command::TagAdd { target: sel, tag });
                Ok(())
            }
            (Place::Group { tag, .. }, Value::Group { tag: src, .. }) => {
                let tag = tag.clone();
                let src = src.clone();
                self.emit(Command::TagRemove {
                    target: format!("@e[tag={}]", tag),
                    tag: tag.clone(),
                });
                self.emit(Command::TagAdd {
                    target: format!("@e[tag={}]", src),
                    tag,
                });
                Ok(())
            }
            (Place::Struct { fields, .. }, Value::Struct { fields: src, .. }) => {
                let fields = fields.clone();
                for (name, field_place) in &fields {
                    let Some((_, field_value)) = src.iter().find(|(n, _)| n == name) else {
                        continue;
                    };
                    self.store_value(field_place, &field_value.clone(), span)?;
                }
                Ok(())
            }
            (place, value) => Err(self.err(SemaError::WrongAssignType {
                expected: self.type_name(place.ty()),
                found: self.type_name(value.ty()),
                span: span.into(),
            })),
        }
    }

    /// Copy one place's contents into another of the same shape.
    pub fn copy_place(&mut self, dst: &Place, src: &Place, span: Span) -> Result<(), CompileError> {
        let value = Value::from_place(src);
        self.store_value(dst, &value, span)
    }

    pub fn augment_slot(
        &mut self,
        slot: &ScbSlot,
        op: BinaryOp,
        value: &Value,
        span: Span,
    ) -> Result<(), CompileError> {
        let operand = self.int_operand(value, span)?;
        self.apply_int_op(slot, op, operand);
        Ok(())
    }

    fn int_operand(&mut self, value: &Value, span: Span) -> Result<IntOperand, CompileError> {
        match value {
            Value::Const(ConstValue::Int(v)) => Ok(IntOperand::Const(*v)),
            Value::Score {
                slot, ty: Type::Int, ..
            } => Ok(IntOperand::Slot(slot.clone())),
            other => Err(self.err(SemaError::InvalidOperand {
                op: "arithmetic".to_string(),
                operands: self.type_name(other.ty()),
                span: span.into(),
            })),
        }
    }

    fn apply_int_op(&mut self, slot: &ScbSlot, op: BinaryOp, operand: IntOperand) {
        match (op, operand) {
            (BinaryOp::Add, IntOperand::Const(v)) => self.emit(Command::ScbAddConst {
                slot: slot.clone(),
                value: v,
            }),
            (BinaryOp::Sub, IntOperand::Const(v)) => self.emit(Command::ScbRemoveConst {
                slot: slot.clone(),
                value: v,
            }),
            (op, IntOperand::Const(v)) => {
                let rhs = self.alloc.int_const(v);
                self.emit(Command::ScbOperation {
                    op: scb_op(op),
                    lhs: slot.clone(),
                    rhs,
                });
            }
            (op, IntOperand::Slot(rhs)) => self.emit(Command::ScbOperation {
                op: scb_op(op),
                lhs: slot.clone(),
                rhs,
            }),
        }
    }

    // --- Conditions ---

    /// Classify a value as an if-condition: folded constant or a
    /// runtime condition.
    pub fn to_condition(
        &mut self,
        value: Value,
        expr: &Expr,
    ) -> Result<Result<bool, Condition>, CompileError> {
        match self.value_condition(value) {
            Some(out) => Ok(out),
            None => Err(self.err(SemaError::WrongIfCondition {
                found: "non-bool".to_string(),
                span: expr.span.into(),
            })),
        }
    }

    pub fn to_condition_while(
        &mut self,
        value: Value,
        expr: &Expr,
    ) -> Result<Result<bool, Condition>, CompileError> {
        match self.value_condition(value) {
            Some(out) => Ok(out),
            None => Err(self.err(SemaError::WrongWhileCondition {
                found: "non-bool".to_string(),
                span: expr.span.into(),
            })),
        }
    }

    fn value_condition(&mut self, value: Value) -> Option<Result<bool, Condition>> {
        match value {
            Value::Const(ConstValue::Bool(b)) => Some(Ok(b)),
            Value::Score {
                slot, ty: Type::Bool, ..
            } => Some(Err(Condition {
                deps: vec![],
                subs: vec![ExecuteSub::ScoreMatch {
                    slot,
                    range: "1".to_string(),
                    invert: false,
                }],
            })),
            Value::Condition(c) => Some(Err(c)),
            _ => None,
        }
    }

    // --- Operators ---

    fn analyze_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let value = self.analyze_expr(operand)?;
        if let Value::Const(c) = &value {
            return match consteval::unary(op, c, expr.span.into())? {
                Some(folded) => Ok(Value::Const(folded)),
                None => Err(self.invalid_operand(op.as_str(), &[&value], expr)),
            };
        }
        match op {
            UnaryOp::Not => {
                let Some(Err(cond)) = self.value_condition(value.clone()) else {
                    return Err(self.invalid_operand("not", &[&value], expr));
                };
                if cond.subs.len() == 1 {
                    if let Some(inverted) = cond.subs[0].inverted() {
                        return Ok(Value::Condition(Condition {
                            deps: cond.deps,
                            subs: vec![inverted],
                        }));
                    }
                }
                let slot = self.materialize_condition(&cond);
                Ok(Value::Condition(Condition {
                    deps: vec![],
                    subs: vec![ExecuteSub::ScoreMatch {
                        slot,
                        range: "0".to_string(),
                        invert: false,
                    }],
                }))
            }
            UnaryOp::Pos => match &value {
                Value::Score { ty: Type::Int, .. } => Ok(value),
                _ => Err(self.invalid_operand("+", &[&value], expr)),
            },
            UnaryOp::Neg => match &value {
                Value::Score {
                    slot, ty: Type::Int, ..
                } => {
                    let temp = self.alloc.slot();
                    self.emit(Command::ScbSetConst {
                        slot: temp.clone(),
                        value: 0,
                    });
                    self.emit(Command::ScbOperation {
                        op: ScbOp::SubEq,
                        lhs: temp.clone(),
                        rhs: slot.clone(),
                    });
                    Ok(Value::Score {
                        slot: temp,
                        ty: Type::Int,
                        assignable: false,
                    })
                }
                _ => Err(self.invalid_operand("-", &[&value], expr)),
            },
        }
    }

    fn analyze_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let left = self.analyze_expr(lhs)?;
        let right = self.analyze_expr(rhs)?;

        if let (Value::Const(a), Value::Const(b)) = (&left, &right) {
            return match consteval::binary(op, a, b, expr.span.into())? {
                Some(folded) => Ok(Value::Const(folded)),
                None => Err(self.invalid_operand(op.as_str(), &[&left, &right], expr)),
            };
        }

        match op {
            BinaryOp::And | BinaryOp::Or => self.logic_op(op, left, right, expr),
            _ => {
                // Repeating a compile-time list takes a literal factor
                if matches!(left, Value::Const(ConstValue::List(_)))
                    || matches!(right, Value::Const(ConstValue::List(_)))
                {
                    return Err(self.err(SemaError::ListMulTimesNonLiteral {
                        span: expr.span.into(),
                    }));
                }
                if left.ty() != Type::Int || right.ty() != Type::Int {
                    return Err(self.invalid_operand(op.as_str(), &[&left, &right], expr));
                }
                let temp = self.alloc.slot();
                match self.int_operand(&left, lhs.span)? {
                    IntOperand::Const(v) => self.emit(Command::ScbSetConst {
                        slot: temp.clone(),
                        value: v,
                    }),
                    IntOperand::Slot(src) => self.emit(Command::ScbOperation {
                        op: ScbOp::Assign,
                        lhs: temp.clone(),
                        rhs: src,
                    }),
                }
                let operand = self.int_operand(&right, rhs.span)?;
                self.apply_int_op(&temp, op, operand);
                Ok(Value::Score {
                    slot: temp,
                    ty: Type::Int,
                    assignable: false,
                })
            }
        }
    }

    fn logic_op(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let lc = self.value_condition(left.clone()).ok_or_else(|| {
            self.invalid_operand(op.as_str(), &[&left], expr)
        })?;
        let rc = self.value_condition(right.clone()).ok_or_else(|| {
            self.invalid_operand(op.as_str(), &[&right], expr)
        })?;
        match op {
            BinaryOp::And => match (lc, rc) {
                (Ok(false), _) | (_, Ok(false)) => Ok(Value::Const(ConstValue::Bool(false))),
                (Ok(true), other) | (other, Ok(true)) => Ok(match other {
                    Ok(b) => Value::Const(ConstValue::Bool(b)),
                    Err(c) => Value::Condition(c),
                }),
                (Err(a), Err(b)) => {
                    let mut deps = a.deps;
                    deps.extend(b.deps);
                    let mut subs = a.subs;
                    subs.extend(b.subs);
                    Ok(Value::Condition(Condition { deps, subs }))
                }
            },
            BinaryOp::Or => match (lc, rc) {
                (Ok(true), _) | (_, Ok(true)) => Ok(Value::Const(ConstValue::Bool(true))),
                (Ok(false), other) | (other, Ok(false)) => Ok(match other {
                    Ok(b) => Value::Const(ConstValue::Bool(b)),
                    Err(c) => Value::Condition(c),
                }),
                (Err(a), Err(b)) => {
                    // Both sides materialize; their sum being positive
                    // is the disjunction.
                    let sa = self.materialize_condition(&a);
                    let sb = self.materialize_condition(&b);
                    let sum = self.alloc.slot();
                    self.emit(Command::ScbOperation {
                        op: ScbOp::Assign,
                        lhs: sum.clone(),
                        rhs: sa,
                    });
                    self.emit(Command::ScbOperation {
                        op: ScbOp::AddEq,
                        lhs: sum.clone(),
                        rhs: sb,
                    });
                    Ok(Value::Condition(Condition {
                        deps: vec![],
                        subs: vec![ExecuteSub::ScoreMatch {
                            slot: sum,
                            range: "1..".to_string(),
                            invert: false,
                        }],
                    }))
                }
            },
            _ => unreachable!(),
        }
    }

    fn analyze_compare(
        &mut self,
        first: &Expr,
        rest: &[(CompareOp, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let mut operands = vec![(self.analyze_expr(first)?, first)];
        for (_, e) in rest {
            operands.push((self.analyze_expr(e)?, e));
        }

        let mut subs: Vec<ExecuteSub> = Vec::new();
        let mut const_false = false;
        for (i, (op, _)) in rest.iter().enumerate() {
            let (ref lv, le) = operands[i];
            let (ref rv, re) = operands[i + 1];
            match (lv, rv) {
                (Value::Const(a), Value::Const(b)) => {
                    match consteval::compare(*op, a, b) {
                        Some(true) => {}
                        Some(false) => const_false = true,
                        None => {
                            return Err(self.invalid_operand(op.as_str(), &[lv, rv], expr));
                        }
                    }
                }
                _ => {
                    let lhs = self.comparable_int(lv, le)?;
                    let rhs = self.comparable_int(rv, re)?;
                    match self.lower_comparison(*op, lhs, rhs) {
                        Some(Some(sub)) => subs.push(sub),
                        Some(None) => {}
                        None => const_false = true,
                    }
                }
            }
        }
        if const_false {
            return Ok(Value::Const(ConstValue::Bool(false)));
        }
        if subs.is_empty() {
            return Ok(Value::Const(ConstValue::Bool(true)));
        }
        Ok(Value::Condition(Condition { deps: vec![], subs }))
    }

    fn comparable_int(&mut self, value: &Value, expr: &Expr) -> Result<IntOperand, CompileError> {
        match value {
            Value::Const(ConstValue::Int(v)) => Ok(IntOperand::Const(*v)),
            Value::Score {
                slot, ty: Type::Int, ..
            } => Ok(IntOperand::Slot(slot.clone())),
            other => Err(self.err(SemaError::InvalidOperand {
                op: "comparison".to_string(),
                operands: self.type_name(other.ty()),
                span: expr.span.into(),
            })),
        }
    }

    /// Lower one comparison. Outer None: statically false. Inner None:
    /// statically true.
    fn lower_comparison(
        &mut self,
        op: CompareOp,
        lhs: IntOperand,
        rhs: IntOperand,
    ) -> Option<Option<ExecuteSub>> {
        match (lhs, rhs) {
            (IntOperand::Const(a), IntOperand::Const(b)) => {
                let holds =
                    consteval::compare(op, &ConstValue::Int(a), &ConstValue::Int(b)).unwrap_or(false);
                if holds { Some(None) } else { None }
            }
            (IntOperand::Slot(slot), IntOperand::Const(n)) => {
                self.match_range(op, slot, n)
            }
            (IntOperand::Const(n), IntOperand::Slot(slot)) => {
                self.match_range(op.flipped(), slot, n)
            }
            (IntOperand::Slot(a), IntOperand::Slot(b)) => Some(Some(match op {
                CompareOp::Eq => ExecuteSub::ScoreComp {
                    lhs: a,
                    op: ScbCompareOp::Eq,
                    rhs: b,
                    invert: false,
                },
                CompareOp::Ne => ExecuteSub::ScoreComp {
                    lhs: a,
                    op: ScbCompareOp::Eq,
                    rhs: b,
                    invert: true,
                },
                CompareOp::Lt => ExecuteSub::ScoreComp {
                    lhs: a,
                    op: ScbCompareOp::Lt,
                    rhs: b,
                    invert: false,
                },
                CompareOp::Le => ExecuteSub::ScoreComp {
                    lhs: a,
                    op: ScbCompareOp::Lte,
                    rhs: b,
                    invert: false,
                },
                CompareOp::Gt => ExecuteSub::ScoreComp {
                    lhs: a,
                    op: ScbCompareOp::Gt,
                    rhs: b,
                    invert: false,
                },
                CompareOp::Ge => ExecuteSub::ScoreComp {
                    lhs: a,
                    op: ScbCompareOp::Gte,
                    rhs: b,
                    invert: false,
                },
            })),
        }
    }

    /// `score <op> n` as a `matches` range.
    fn match_range(
        &mut self,
        op: CompareOp,
        slot: ScbSlot,
        n: i32,
    ) -> Option<Option<ExecuteSub>> {
        let sub = |range: String, invert: bool| {
            Some(Some(ExecuteSub::ScoreMatch { slot: slot.clone(), range, invert }))
        };
        match op {
            CompareOp::Eq => sub(n.to_string(), false),
            CompareOp::Ne => sub(n.to_string(), true),
            CompareOp::Le => sub(format!("..{}", n), false),
            CompareOp::Ge => sub(format!("{}..", n), false),
            CompareOp::Lt => {
                if n == i32::MIN {
                    None
                } else {
                    sub(format!("..{}", n - 1), false)
                }
            }
            CompareOp::Gt => {
                if n == i32::MAX {
                    None
                } else {
                    sub(format!("{}..", n + 1), false)
                }
            }
        }
    }

    fn invalid_operand(&self, op: &str, values: &[&Value], expr: &Expr) -> CompileError {
        let names: Vec<String> = values.iter().map(|v| self.type_name(v.ty())).collect();
        self.err(SemaError::InvalidOperand {
            op: op.to_string(),
            operands: names.join(", "),
            span: expr.span.into(),
        })
    }

    // --- Strings ---

    fn analyze_string(&mut self, parts: &[StrPart], _expr: &Expr) -> Result<Value, CompileError> {
        let all_literal = parts.iter().all(|p| matches!(p, StrPart::Literal(_)));
        if all_literal {
            let mut text = String::new();
            for part in parts {
                if let StrPart::Literal(t) = part {
                    text.push_str(t);
                }
            }
            return Ok(Value::Const(ConstValue::Str(text)));
        }

        let mut fstr = FStrValue::default();
        let mut all_const_text = true;
        for part in parts {
            match part {
                StrPart::Literal(t) => fstr.push_text(t),
                StrPart::Expr(hole) => {
                    let value = self.analyze_expr(hole)?;
                    match value {
                        Value::Const(ConstValue::Int(v)) => fstr.push_text(&v.to_string()),
                        Value::Const(ConstValue::Bool(b)) => {
                            fstr.push_text(if b { "1" } else { "0" })
                        }
                        Value::Const(ConstValue::Float(v)) => fstr.push_text(&v.to_string()),
                        Value::Const(ConstValue::Str(s)) => fstr.push_text(&s),
                        Value::Const(ConstValue::FStr(inner)) => {
                            fstr.deps.extend(inner.deps);
                            for part in inner.parts {
                                match part {
                                    RawtextPart::Text(t) => fstr.push_text(&t),
                                    other => fstr.parts.push(other),
                                }
                            }
                            all_const_text = false;
                        }
                        Value::Score { slot, .. } => {
                            fstr.push_score(&slot);
                            all_const_text = false;
                        }
                        Value::Condition(cond) => {
                            let slot = self.materialize_condition(&cond);
                            fstr.push_score(&slot);
                            all_const_text = false;
                        }
                        other => {
                            return Err(self.err(SemaError::InvalidOperand {
                                op: "format".to_string(),
                                operands: self.type_name(other.ty()),
                                span: hole.span.into(),
                            }));
                        }
                    }
                }
            }
        }
        if all_const_text {
            // Every hole folded to text: the result is a plain string
            let mut text = String::new();
            for part in &fstr.parts {
                if let RawtextPart::Text(t) = part {
                    text.push_str(t);
                }
            }
            return Ok(Value::Const(ConstValue::Str(text)));
        }
        Ok(Value::Const(ConstValue::FStr(fstr)))
    }

    // --- Attribute access ---

    fn analyze_attribute(
        &mut self,
        obj: &Expr,
        name: Symbol,
        name_span: Span,
    ) -> Result<Value, CompileError> {
        let value = self.analyze_expr(obj)?;
        self.attribute_of(value, name, name_span)
    }

    fn attribute_of(
        &mut self,
        value: Value,
        name: Symbol,
        name_span: Span,
    ) -> Result<Value, CompileError> {
        match &value {
            Value::Callable(CallableRef::Module(id)) => {
                let Some(binding) = self.modules[id.0 as usize].exports.get(&name).cloned() else {
                    return Err(self.err(SemaError::HasNoAttribute {
                        ty: format!("module '{}'", self.modules[id.0 as usize].name),
                        attr: self.name_of(name),
                        span: name_span.into(),
                    }));
                };
                if self.in_const_context() && binding.is_runtime() {
                    return Err(self.err(SemaError::NonRtName {
                        name: self.name_of(name),
                        span: name_span.into(),
                    }));
                }
                Ok(Self::binding_value(&binding))
            }
            Value::Entity(e) => {
                let template = e.effective_template();
                if let Some(storage) = self.entities.get(template).field(name).cloned() {
                    let place = self.entity_field_place(e, &storage);
                    return Ok(Value::from_place(&place));
                }
                Err(self.err(SemaError::HasNoAttribute {
                    ty: self.type_name(Type::Entity(template)),
                    attr: self.name_of(name),
                    span: name_span.into(),
                }))
            }
            Value::Struct { fields, id, .. } => fields
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| {
                    self.err(SemaError::HasNoAttribute {
                        ty: self.type_name(Type::Struct(*id)),
                        attr: self.name_of(name),
                        span: name_span.into(),
                    })
                }),
            other => Err(self.err(SemaError::HasNoAttribute {
                ty: self.type_name(other.ty()),
                attr: self.name_of(name),
                span: name_span.into(),
            })),
        }
    }

    /// Storage of one entity attribute as seen through a reference.
    fn entity_field_place(&self, entity: &EntityValue, storage: &FieldStorage) -> Place {
        match storage {
            FieldStorage::Score { objective, ty } => Place::Score {
                slot: ScbSlot::new(entity.sel.to_str(), objective.clone()),
                ty: *ty,
            },
            FieldStorage::Struct { id, fields } => Place::Struct {
                id: *id,
                fields: fields
                    .iter()
                    .map(|(n, s)| (*n, self.entity_field_place(entity, s)))
                    .collect(),
            },
        }
    }

    // --- Subscripts ---

    fn analyze_subscript(
        &mut self,
        obj: &Expr,
        index: &Expr,
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let obj_value = self.analyze_expr(obj)?;
        let index_value = self.analyze_expr(index)?;
        match &obj_value {
            // `Engroup[T]` re-parameterizes the group type
            Value::Const(ConstValue::Type(Type::Engroup(_))) => {
                match index_value {
                    Value::Callable(CallableRef::Template(t)) => {
                        Ok(Value::Const(ConstValue::Type(Type::Engroup(t))))
                    }
                    other => Err(self.err(SemaError::InvalidTypeSpec {
                        ty: self.type_name(other.ty()),
                        span: index.span.into(),
                    })),
                }
            }
            Value::Const(c @ (ConstValue::List(_) | ConstValue::Map(_))) => {
                let index_const = self.require_const(index_value, index)?;
                match consteval::subscript(c, &index_const, expr.span.into())? {
                    Some(v) => Ok(Value::Const(v)),
                    None => Err(self.err(SemaError::NoGetItem {
                        ty: self.type_name(obj_value.ty()),
                        span: expr.span.into(),
                    })),
                }
            }
            other => Err(self.err(SemaError::NoGetItem {
                ty: self.type_name(other.ty()),
                span: expr.span.into(),
            })),
        }
    }

    // --- Calls ---

    fn analyze_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        // Method-shaped calls dispatch on the receiver
        if let ExprKind::Attribute {
            obj,
            name,
            name_span,
        } = &callee.kind
        {
            let receiver = self.analyze_expr(obj)?;
            match receiver {
                Value::Entity(e) => {
                    return self.call_entity_method(e, *name, args, kwargs, expr);
                }
                Value::Group { tag, template, .. } => {
                    return self.call_group_method(tag, template, *name, args, kwargs, expr);
                }
                Value::Const(ConstValue::Filter(f)) => {
                    return self.call_filter_method(f, *name, args, kwargs, expr);
                }
                Value::Const(ConstValue::Pos(p)) => {
                    return self.call_pos_method(p, *name, args, kwargs, expr);
                }
                other => {
                    let target = self.attribute_of(other, *name, *name_span)?;
                    return self.call_value(target, args, kwargs, expr);
                }
            }
        }
        let value = self.analyze_expr(callee)?;
        self.call_value(value, args, kwargs, expr)
    }

    fn call_value(
        &mut self,
        value: Value,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        match value {
            Value::Callable(CallableRef::Func(id)) => self.call_user_func(id, args, kwargs, expr),
            Value::Callable(CallableRef::Builtin(f)) => self.call_builtin(f, args, kwargs, expr),
            Value::Callable(CallableRef::Template(t)) => {
                self.instantiate_template(t, args, kwargs, expr)
            }
            Value::Callable(CallableRef::Struct(s)) => {
                self.construct_struct(s, args, kwargs, expr)
            }
            Value::Const(ConstValue::Type(ty)) => self.call_type_value(ty, args, kwargs, expr),
            other => Err(self.err(SemaError::Uncallable {
                ty: self.type_name(other.ty()),
                span: expr.span.into(),
            })),
        }
    }

    /// Match call arguments against a parameter list.
    fn match_args<'a>(
        &mut self,
        params: &[(Symbol, Option<ConstValue>)],
        args: &'a [Expr],
        kwargs: &'a [(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Vec<ArgValue<'a>>, CompileError> {
        if args.len() > params.len() {
            return Err(self.err(SemaError::TooManyArgs {
                span: expr.span.into(),
            }));
        }
        let mut matched: Vec<Option<ArgValue>> = Vec::new();
        for arg in args {
            let value = self.analyze_expr(arg)?;
            matched.push(Some(ArgValue {
                value,
                expr: Some(arg),
            }));
        }
        matched.resize_with(params.len(), || None);

        for (name, value_expr) in kwargs {
            let Some(idx) = params.iter().position(|(n, _)| n == name) else {
                return Err(self.err(SemaError::UnexpectedKeywordArg {
                    arg: self.name_of(*name),
                    span: value_expr.span.into(),
                }));
            };
            if matched[idx].is_some() {
                return Err(self.err(SemaError::ArgMultipleValues {
                    arg: self.name_of(*name),
                    span: value_expr.span.into(),
                }));
            }
            let value = self.analyze_expr(value_expr)?;
            matched[idx] = Some(ArgValue {
                value,
                expr: Some(value_expr),
            });
        }

        let mut out = Vec::new();
        for (slot, (name, default)) in matched.into_iter().zip(params) {
            match slot {
                Some(v) => out.push(v),
                None => match default {
                    Some(c) => out.push(ArgValue {
                        value: Value::Const(c.clone()),
                        expr: None,
                    }),
                    None => {
                        return Err(self.err(SemaError::MissingArg {
                            arg: self.name_of(*name),
                            span: expr.span.into(),
                        }));
                    }
                },
            }
        }
        Ok(out)
    }

    /// Parameter descriptors for matching: name, port, type, default.
    fn resolve_params(
        &mut self,
        def: &FuncDef,
    ) -> Result<Vec<(Symbol, ParamPort, Type, Option<ConstValue>)>, CompileError> {
        let mut out = Vec::new();
        for param in &def.params {
            let (ty, default) = self.param_type(param)?;
            out.push((param.name, param.port, ty, default));
        }
        Ok(out)
    }

    fn call_user_func(
        &mut self,
        id: crate::sema::types::FuncId,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let def = self.funcs[id.0 as usize].def.clone();
        let name = self.funcs[id.0 as usize].name.clone();
        match def.flavor {
            FuncFlavor::Runtime => self.call_runtime_func(id, &def, &name, args, kwargs, expr),
            FuncFlavor::Inline => self.with_trace(
                format!("calling `{}`", name),
                expr.span,
                |a| a.call_inline(&def, &name, None, args, kwargs, expr),
            ),
            FuncFlavor::Const => self.with_trace(
                format!("calling `{}`", name),
                expr.span,
                |a| a.call_const_fn(&def, &name, args, kwargs, expr),
            ),
        }
    }

    fn call_runtime_func(
        &mut self,
        id: crate::sema::types::FuncId,
        def: &FuncDef,
        name: &str,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        if self.in_const_context() {
            return Err(self.err(SemaError::RuntimeStmtInConstContext {
                span: expr.span.into(),
            }));
        }
        let params = self.resolve_params(def)?;
        let match_params: Vec<(Symbol, Option<ConstValue>)> =
            params.iter().map(|(n, _, _, d)| (*n, d.clone())).collect();
        let matched = self.match_args(&match_params, args, kwargs, expr)?;

        let const_args = self.extract_const_args(&params, &matched)?;
        let spec = self.with_trace(format!("calling `{}`", name), expr.span, |a| {
            a.compile_func_spec(id, &const_args)
        })?;

        self.pass_runtime_args(&spec.params, &matched, expr)?;
        let call = self.call_path(&spec.file_path);
        self.emit(Command::InvokeFunction { path: call });
        self.copy_back_refs(&spec.params, &matched, expr)?;
        self.read_result(&spec.result, spec.result_ty, expr)
    }

    fn extract_const_args(
        &mut self,
        params: &[(Symbol, ParamPort, Type, Option<ConstValue>)],
        matched: &[ArgValue],
    ) -> Result<Vec<(Symbol, ConstValue)>, CompileError> {
        let mut out = Vec::new();
        for ((name, port, _, _), arg) in params.iter().zip(matched) {
            if *port != ParamPort::Const {
                continue;
            }
            match &arg.value {
                Value::Const(c) => out.push((*name, c.clone())),
                _ => {
                    let span = arg.expr.map(|e| e.span).unwrap_or_default();
                    return Err(self.err(SemaError::ArgNotConst {
                        arg: self.name_of(*name),
                        span: span.into(),
                    }));
                }
            }
        }
        Ok(out)
    }

    fn pass_runtime_args(
        &mut self,
        params: &[crate::sema::analyzer::SpecParam],
        matched: &[ArgValue],
        expr: &Expr,
    ) -> Result<(), CompileError> {
        for (spec_param, arg) in params.iter().zip(matched) {
            let Some(place) = &spec_param.place else {
                continue;
            };
            if !self.types_match(spec_param.ty, arg.value.ty()) {
                let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                return Err(self.err(SemaError::WrongArgType {
                    arg: self.name_of(spec_param.name),
                    expected: self.type_name(spec_param.ty),
                    found: self.type_name(arg.value.ty()),
                    span: span.into(),
                }));
            }
            if spec_param.port == ParamPort::ByRef && arg.value.place().is_none() {
                let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                return Err(self.err(SemaError::CantRefArg {
                    arg: self.name_of(spec_param.name),
                    span: span.into(),
                }));
            }
            let place = place.clone();
            self.store_value(&place, &arg.value, expr.span)?;
        }
        Ok(())
    }

    /// Reference parameters write back to the caller's location after
    /// the call.
    fn copy_back_refs(
        &mut self,
        params: &[crate::sema::analyzer::SpecParam],
        matched: &[ArgValue],
        expr: &Expr,
    ) -> Result<(), CompileError> {
        for (spec_param, arg) in params.iter().zip(matched) {
            if spec_param.port != ParamPort::ByRef {
                continue;
            }
            let (Some(param_place), Some(caller_place)) = (&spec_param.place, arg.value.place())
            else {
                continue;
            };
            let param_place = param_place.clone();
            self.copy_place(&caller_place, &param_place, expr.span)?;
        }
        Ok(())
    }

    /// Copy a call's result storage into a fresh temporary.
    fn read_result(
        &mut self,
        result: &Option<Place>,
        result_ty: Type,
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        match result {
            None => Ok(Value::Const(ConstValue::None)),
            Some(place) => {
                let temp = self.allocate_place(result_ty, expr.span)?;
                let place = place.clone();
                self.copy_place(&temp, &place, expr.span)?;
                match temp {
                    Place::Score { slot, ty } => Ok(Value::Score {
                        slot,
                        ty,
                        assignable: false,
                    }),
                    other => Ok(Value::from_place(&other)),
                }
            }
        }
    }

    /// Expand an inline function at the call site.
    pub fn call_inline(
        &mut self,
        def: &FuncDef,
        name: &str,
        self_value: Option<EntityValue>,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let params = self.resolve_params(def)?;
        let match_params: Vec<(Symbol, Option<ConstValue>)> =
            params.iter().map(|(n, _, _, d)| (*n, d.clone())).collect();
        let matched = self.match_args(&match_params, args, kwargs, expr)?;

        let world = self.scopes.world();
        self.scopes.push_function(world, self_value);
        let mut bind_err = None;
        for ((pname, port, ty, _), arg) in params.iter().zip(&matched) {
            let result = self.bind_inline_param(*pname, *port, *ty, arg, expr);
            if let Err(e) = result {
                bind_err = Some(e);
                break;
            }
        }
        if let Some(e) = bind_err {
            self.scopes.pop();
            return Err(e);
        }

        let result_ty = match &def.result_ty {
            Some(e) => match self.resolve_type_expr(e) {
                Ok(t) => t,
                Err(err) => {
                    self.scopes.pop();
                    return Err(err);
                }
            },
            None => Type::None,
        };
        let result_ctx = match def.result_port {
            ParamPort::ByRef => ResultCtx::RefSlot(None),
            ParamPort::Const => ResultCtx::ConstSlot(None),
            ParamPort::ByValue => {
                if result_ty == Type::None {
                    ResultCtx::NoneResult
                } else {
                    match self.allocate_place(result_ty, def.span) {
                        Ok(place) => ResultCtx::Place(place),
                        Err(e) => {
                            self.scopes.pop();
                            return Err(e);
                        }
                    }
                }
            }
        };
        self.ctx.push(FuncCtx {
            flavor: FuncFlavor::Inline,
            result: result_ctx,
            result_ty,
            single_result: def.result_port != ParamPort::ByValue,
            results_seen: 0,
            new_ctx: None,
            name: name.to_string(),
        });

        let body_result = self.block(&def.body);
        let ctx = self.ctx.pop().expect("inline ctx");
        self.scopes.pop();
        body_result?;

        match ctx.result {
            ResultCtx::NoneResult => Ok(Value::Const(ConstValue::None)),
            ResultCtx::Place(place) => Ok(Value::from_place(&place)),
            ResultCtx::ConstSlot(v) => Ok(Value::Const(v.unwrap_or(ConstValue::None))),
            ResultCtx::RefSlot(Some(place)) => Ok(Value::from_place(&place)),
            ResultCtx::RefSlot(None) => Ok(Value::Const(ConstValue::None)),
        }
    }

    fn bind_inline_param(
        &mut self,
        name: Symbol,
        port: ParamPort,
        ty: Type,
        arg: &ArgValue,
        expr: &Expr,
    ) -> Result<(), CompileError> {
        if !self.types_match(ty, arg.value.ty()) {
            let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
            return Err(self.err(SemaError::WrongArgType {
                arg: self.name_of(name),
                expected: self.type_name(ty),
                found: self.type_name(arg.value.ty()),
                span: span.into(),
            }));
        }
        match port {
            ParamPort::Const => match &arg.value {
                Value::Const(c) => {
                    self.scopes.define(name, Binding::Const(c.clone()));
                    Ok(())
                }
                _ => {
                    let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                    Err(self.err(SemaError::ArgNotConst {
                        arg: self.name_of(name),
                        span: span.into(),
                    }))
                }
            },
            ParamPort::ByRef => match arg.value.place() {
                Some(place) => {
                    self.scopes.define(name, Binding::Ref(place));
                    Ok(())
                }
                None => {
                    let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                    Err(self.err(SemaError::CantRefArg {
                        arg: self.name_of(name),
                        span: span.into(),
                    }))
                }
            },
            ParamPort::ByValue => match &arg.value {
                // Constants forward unchanged so they stay usable in
                // compile-time positions inside the body
                Value::Const(c) => {
                    self.scopes.define(name, Binding::Const(c.clone()));
                    Ok(())
                }
                value => {
                    let place = self.allocate_place(ty, expr.span)?;
                    self.store_value(&place, &value.clone(), expr.span)?;
                    self.scopes.define(name, Binding::Var(place));
                    Ok(())
                }
            },
        }
    }

    /// Evaluate a compile-time function.
    pub fn call_const_fn(
        &mut self,
        def: &FuncDef,
        name: &str,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let params = self.resolve_params(def)?;
        let match_params: Vec<(Symbol, Option<ConstValue>)> =
            params.iter().map(|(n, _, _, d)| (*n, d.clone())).collect();
        let matched = self.match_args(&match_params, args, kwargs, expr)?;

        self.scopes.push_function(World::CompileTime, None);
        for ((pname, _, ty, _), arg) in params.iter().zip(&matched) {
            let constant = match &arg.value {
                Value::Const(c) => c.clone(),
                _ => {
                    self.scopes.pop();
                    let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                    return Err(self.err(SemaError::ArgNotConst {
                        arg: self.name_of(*pname),
                        span: span.into(),
                    }));
                }
            };
            if !self.types_match(*ty, constant.ty()) {
                self.scopes.pop();
                let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                return Err(self.err(SemaError::WrongArgType {
                    arg: self.name_of(*pname),
                    expected: self.type_name(*ty),
                    found: self.type_name(constant.ty()),
                    span: span.into(),
                }));
            }
            self.scopes.define(*pname, Binding::Const(constant));
        }

        let result_ty = match &def.result_ty {
            Some(e) => match self.resolve_type_expr(e) {
                Ok(t) => t,
                Err(err) => {
                    self.scopes.pop();
                    return Err(err);
                }
            },
            None => Type::Any,
        };
        self.ctx.push(FuncCtx {
            flavor: FuncFlavor::Const,
            result: ResultCtx::ConstSlot(None),
            result_ty,
            single_result: false,
            results_seen: 0,
            new_ctx: None,
            name: name.to_string(),
        });

        let body_result = self.block(&def.body);
        let ctx = self.ctx.pop().expect("const ctx");
        self.scopes.pop();
        body_result?;

        let value = match ctx.result {
            ResultCtx::ConstSlot(Some(v)) => v,
            _ => ConstValue::None,
        };
        if result_ty != Type::Any && !self.types_match(result_ty, value.ty()) {
            return Err(self.err(SemaError::WrongAssignType {
                expected: self.type_name(result_ty),
                found: self.type_name(value.ty()),
                span: expr.span.into(),
            }));
        }
        Ok(Value::Const(value))
    }

    // --- Entity instantiation and methods ---

    fn instantiate_template(
        &mut self,
        template: TemplateId,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        if self.in_const_context() {
            return Err(self.err(SemaError::RuntimeStmtInConstContext {
                span: expr.span.into(),
            }));
        }
        let instance_tag = self.alloc.tag();
        let entity = EntityValue {
            template,
            cast: None,
            sel: McSelector::tagged(&instance_tag),
            tag: Some(instance_tag.clone()),
        };

        let new_info = self
            .entities
            .resolve_method(template, self.sym_new)
            .map(|(dt, info)| (dt, info.clone()));
        match new_info {
            None => {
                if !args.is_empty() || !kwargs.is_empty() {
                    return Err(self.err(SemaError::TooManyArgs {
                        span: expr.span.into(),
                    }));
                }
                self.emit_summon(template, &instance_tag, None, None);
            }
            Some((_, info)) => {
                // The constructor body expands at the creation site so
                // each instance gets its own tag.
                let def = info.def.clone();
                let tpl_name = self.entities.get(template).name.clone();
                let params = self.resolve_params(&def)?;
                let match_params: Vec<(Symbol, Option<ConstValue>)> =
                    params.iter().map(|(n, _, _, d)| (*n, d.clone())).collect();
                let matched = self.match_args(&match_params, args, kwargs, expr)?;

                self.scopes
                    .push_function(World::Runtime, Some(entity.clone()));
                for ((pname, port, ty, _), arg) in params.iter().zip(&matched) {
                    if let Err(e) = self.bind_inline_param(*pname, *port, *ty, arg, expr) {
                        self.scopes.pop();
                        return Err(e);
                    }
                }
                self.ctx.push(FuncCtx {
                    flavor: FuncFlavor::Inline,
                    result: ResultCtx::NoneResult,
                    result_ty: Type::None,
                    single_result: false,
                    results_seen: 0,
                    new_ctx: Some(crate::sema::analyzer::NewCtx {
                        template,
                        instance_tag: instance_tag.clone(),
                    }),
                    name: format!("{}.new", tpl_name),
                });
                let body_result = self.with_trace(
                    format!("calling `{}.new`", tpl_name),
                    expr.span,
                    |a| a.block(&def.body),
                );
                self.ctx.pop();
                self.scopes.pop();
                body_result?;
            }
        }
        Ok(Value::Entity(entity))
    }

    fn call_entity_method(
        &mut self,
        entity: EntityValue,
        method: Symbol,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let static_tpl = entity.effective_template();
        let resolved = self
            .entities
            .resolve_method(static_tpl, method)
            .map(|(dt, info)| (dt, info.clone()));
        let Some((defining, info)) = resolved else {
            return Err(self.err(SemaError::HasNoAttribute {
                ty: self.type_name(Type::Entity(static_tpl)),
                attr: self.name_of(method),
                span: expr.span.into(),
            }));
        };
        let def = info.def.clone();
        let method_name = format!(
            "{}.{}",
            self.entities.get(defining).name,
            self.name_of(method)
        );

        match def.flavor {
            FuncFlavor::Const => self.with_trace(
                format!("calling `{}`", method_name),
                expr.span,
                |a| a.call_const_fn(&def, &method_name, args, kwargs, expr),
            ),
            FuncFlavor::Inline => {
                let self_value = if info.qualifier == MethodQualifier::Static {
                    None
                } else {
                    Some(entity.clone())
                };
                self.with_trace(format!("calling `{}`", method_name), expr.span, |a| {
                    a.call_inline(&def, &method_name, self_value, args, kwargs, expr)
                })
            }
            FuncFlavor::Runtime => {
                let params = self.resolve_params(&def)?;
                let match_params: Vec<(Symbol, Option<ConstValue>)> =
                    params.iter().map(|(n, _, _, d)| (*n, d.clone())).collect();
                let matched = self.match_args(&match_params, args, kwargs, expr)?;
                let const_args = self.extract_const_args(&params, &matched)?;

                if info.qualifier == MethodQualifier::Static {
                    let spec = self.compile_method_spec(defining, method, &const_args)?;
                    self.pass_runtime_args(&spec.params, &matched, expr)?;
                    let call = self.call_path(&spec.file_path);
                    self.emit(Command::InvokeFunction { path: call });
                    self.copy_back_refs(&spec.params, &matched, expr)?;
                    return self.read_result(&spec.result, spec.result_ty, expr);
                }

                let is_virtual = self.entities.virtual_root(static_tpl, method).is_some();
                if !is_virtual {
                    let spec = self.compile_method_spec(defining, method, &const_args)?;
                    self.pass_runtime_args(&spec.params, &matched, expr)?;
                    let call = self.call_path(&spec.file_path);
                    self.emit(Command::execute(
                        vec![ExecuteSub::env("as", entity.sel.to_str())],
                        Command::InvokeFunction { path: call },
                    ));
                    self.copy_back_refs(&spec.params, &matched, expr)?;
                    return self.read_result(&spec.result, spec.result_ty, expr);
                }

                // Virtual dispatch: one tag-guarded line per concrete
                // template, each resolving the method through its own
                // MRO.
                let concrete = self.entities.subtemplates_of(static_tpl);
                let mut impls: Vec<(TemplateId, TemplateId)> = Vec::new();
                for w in concrete {
                    if let Some((dt, _)) = self.entities.resolve_method(w, method) {
                        impls.push((w, dt));
                    }
                }
                let mut result_spec: Option<crate::sema::analyzer::RtSpec> = None;
                let mut seen_dts: Vec<TemplateId> = Vec::new();
                for (_, dt) in &impls {
                    if !seen_dts.contains(dt) {
                        seen_dts.push(*dt);
                    }
                }
                // Each defining template has its own parameter slots;
                // copy the arguments into every distinct
                // implementation. Only the result storage is shared
                // across the overrides, so any spec can read it.
                for dt in &seen_dts {
                    let spec = self.compile_method_spec(*dt, method, &const_args)?;
                    self.pass_runtime_args(&spec.params, &matched, expr)?;
                    if result_spec.is_none() {
                        result_spec = Some(spec);
                    }
                }
                for (w, dt) in &impls {
                    let spec = self.compile_method_spec(*dt, method, &const_args)?;
                    let wtag = self.entities.get(*w).runtime_tag.clone();
                    let mut sel = entity.sel.clone();
                    sel.tag(&wtag);
                    let call = self.call_path(&spec.file_path);
                    self.emit(Command::execute(
                        vec![ExecuteSub::env("as", sel.to_str())],
                        Command::InvokeFunction { path: call },
                    ));
                }
                // Reference parameters write back from whichever
                // implementation actually ran: one guarded copy per
                // dispatch line, using the same tag test.
                for (w, dt) in &impls {
                    let spec = self.compile_method_spec(*dt, method, &const_args)?;
                    if spec.params.iter().all(|p| p.port != ParamPort::ByRef) {
                        continue;
                    }
                    let wtag = self.entities.get(*w).runtime_tag.clone();
                    let mut sel = entity.sel.clone();
                    sel.tag(&wtag);
                    let guard = ExecuteSub::Entity {
                        selector: sel.to_str(),
                        invert: false,
                    };
                    self.push_buffer();
                    let copied = self.copy_back_refs(&spec.params, &matched, expr);
                    let cmds = self.pop_buffer();
                    copied?;
                    for cmd in cmds {
                        self.emit(Command::execute(vec![guard.clone()], cmd));
                    }
                }
                let spec = result_spec.expect("virtual call has at least one implementation");
                self.read_result(&spec.result, spec.result_ty, expr)
            }
        }
    }

    // --- Groups ---

    fn call_group_method(
        &mut self,
        tag: String,
        template: TemplateId,
        method: Symbol,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let name = self.name_of(method);
        let group_value = |tag: String| Value::Group {
            tag,
            template,
            assignable: false,
        };
        match name.as_str() {
            "select" | "drop" | "filter" => {
                let matched = self.match_args(&[(method, None)], args, kwargs, expr)?;
                // One argument slot named after the method keeps the
                // matcher simple; the argument is the filter.
                let arg = &matched[0];
                let Value::Const(ConstValue::Filter(filter)) = &arg.value else {
                    let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                    return Err(self.err(SemaError::WrongArgType {
                        arg: "filter".to_string(),
                        expected: "Enfilter".to_string(),
                        found: self.type_name(arg.value.ty()),
                        span: span.into(),
                    }));
                };
                match name.as_str() {
                    "select" => {
                        let cmds = filter.dump(&format!("tag {{selected}} add {}", tag), None);
                        self.emit_all(cmds);
                    }
                    "drop" => {
                        let cmds = filter.dump(&format!("tag {{selected}} remove {}", tag), None);
                        self.emit_all(cmds);
                    }
                    _ => {
                        // Keep only members also matched by the filter
                        let keep = self.alloc.tag();
                        let cmds = filter.dump(&format!("tag {{selected}} add {}", keep), None);
                        self.emit_all(cmds);
                        self.emit(Command::TagRemove {
                            target: format!("@e[tag={},tag=!{}]", tag, keep),
                            tag: tag.clone(),
                        });
                        self.emit(Command::TagRemove {
                            target: format!("@e[tag={}]", keep),
                            tag: keep,
                        });
                    }
                }
                Ok(group_value(tag))
            }
            "extend" | "subtract" | "intersect" => {
                let matched = self.match_args(&[(method, None)], args, kwargs, expr)?;
                let arg = &matched[0];
                let Value::Group { tag: other, .. } = &arg.value else {
                    let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                    return Err(self.err(SemaError::WrongArgType {
                        arg: "other".to_string(),
                        expected: "Engroup".to_string(),
                        found: self.type_name(arg.value.ty()),
                        span: span.into(),
                    }));
                };
                let other = other.clone();
                match name.as_str() {
                    "extend" => self.emit(Command::TagAdd {
                        target: format!("@e[tag={}]", other),
                        tag: tag.clone(),
                    }),
                    "subtract" => self.emit(Command::TagRemove {
                        target: format!("@e[tag={}]", other),
                        tag: tag.clone(),
                    }),
                    _ => self.emit(Command::TagRemove {
                        target: format!("@e[tag=!{}]", other),
                        tag: tag.clone(),
                    }),
                }
                Ok(group_value(tag))
            }
            "clear" => {
                self.match_args(&[], args, kwargs, expr)?;
                self.emit(Command::TagRemove {
                    target: format!("@e[tag={}]", tag),
                    tag: tag.clone(),
                });
                Ok(group_value(tag))
            }
            "size" => {
                self.match_args(&[], args, kwargs, expr)?;
                let temp = self.alloc.slot();
                self.emit(Command::ScbSetConst {
                    slot: temp.clone(),
                    value: 0,
                });
                self.emit(Command::execute(
                    vec![ExecuteSub::env("as", format!("@e[tag={}]", tag))],
                    Command::ScbAddConst {
                        slot: temp.clone(),
                        value: 1,
                    },
                ));
                Ok(Value::Score {
                    slot: temp,
                    ty: Type::Int,
                    assignable: false,
                })
            }
            _ => Err(self.err(SemaError::HasNoAttribute {
                ty: self.type_name(Type::Engroup(template)),
                attr: name,
                span: expr.span.into(),
            })),
        }
    }

    // --- Filters ---

    fn call_filter_method(
        &mut self,
        filter: EntityFilter,
        method: Symbol,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let name = self.name_of(method);
        let sym = method;
        let mut f = filter;
        match name.as_str() {
            "all_players" => {
                self.match_args(&[], args, kwargs, expr)?;
                f.need_set_selector_var('a', &mut self.alloc);
                f.entity_type = Some("player".to_string());
            }
            "random" => {
                let type_sym = self.interner.intern("type");
                let limit_sym = self.interner.intern("limit");
                let matched = self.match_args(
                    &[
                        (type_sym, Some(ConstValue::None)),
                        (limit_sym, Some(ConstValue::Int(1))),
                    ],
                    args,
                    kwargs,
                    expr,
                )?;
                let ty = self.opt_const_str(&matched[0], "type", expr)?;
                let limit = self.const_int(&matched[1], "limit", expr)?;
                let inferred = match (&f.entity_type, ty) {
                    (None, None) => {
                        return Err(self.err(SemaError::MissingArg {
                            arg: "type".to_string(),
                            span: expr.span.into(),
                        }));
                    }
                    (None, Some(t)) => t,
                    (Some(prev), None) => prev.clone(),
                    (Some(prev), Some(t)) => {
                        if *prev != t {
                            return Err(self.err(SemaError::WrongArgType {
                                arg: "type".to_string(),
                                expected: prev.clone(),
                                found: t,
                                span: expr.span.into(),
                            }));
                        }
                        t
                    }
                };
                let sel = f.need_set_selector_var('r', &mut self.alloc);
                if !sel.has_arg("type") {
                    sel.entity_type(&inferred);
                }
                sel.limit(limit);
                f.entity_type = Some(inferred);
                f.seal_stage();
            }
            "nearest_from" | "farthest_from" => {
                let origin_sym = self.interner.intern("origin");
                let limit_sym = self.interner.intern("limit");
                let matched = self.match_args(
                    &[(origin_sym, None), (limit_sym, Some(ConstValue::Int(1)))],
                    args,
                    kwargs,
                    expr,
                )?;
                let pos = self.const_pos(&matched[0], "origin", expr)?;
                let limit = self.const_int(&matched[1], "limit", expr)?;
                let limit = if name == "farthest_from" { -limit } else { limit };
                f.need_set_selector_var('e', &mut self.alloc);
                let sel = f.need_set_context(pos.context, &mut self.alloc);
                sel.limit(limit);
                f.seal_stage();
            }
            "distance_from" => {
                let origin_sym = self.interner.intern("origin");
                let min_sym = self.interner.intern("min");
                let max_sym = self.interner.intern("max");
                let matched = self.match_args(
                    &[
                        (origin_sym, None),
                        (min_sym, Some(ConstValue::None)),
                        (max_sym, Some(ConstValue::None)),
                    ],
                    args,
                    kwargs,
                    expr,
                )?;
                let pos = self.const_pos(&matched[0], "origin", expr)?;
                let min = self.opt_const_float(&matched[1], "min", expr)?;
                let max = self.opt_const_float(&matched[2], "max", expr)?;
                let sel = f.need_set_context(pos.context, &mut self.alloc);
                sel.distance(min, max);
            }
            "is_type" | "is_not_type" | "has_tag" | "has_no_tag" | "is_name" => {
                let matched = self.match_args(&[(sym, None)], args, kwargs, expr)?;
                let text = self.const_str(&matched[0], &name, expr)?;
                match name.as_str() {
                    "is_type" => {
                        let sel = f.new_if_got(&["type"], &mut self.alloc);
                        sel.entity_type(&text);
                        f.entity_type = Some(text);
                    }
                    "is_not_type" => f.last_selector(&mut self.alloc).entity_type_n(&text),
                    "has_tag" => f.last_selector(&mut self.alloc).tag(&text),
                    "has_no_tag" => f.last_selector(&mut self.alloc).tag_n(&text),
                    _ => {
                        let sel = f.new_if_got(&["name"], &mut self.alloc);
                        sel.name(&text);
                    }
                }
            }
            _ => {
                return Err(self.err(SemaError::HasNoAttribute {
                    ty: "Enfilter".to_string(),
                    attr: name,
                    span: expr.span.into(),
                }));
            }
        }
        Ok(Value::Const(ConstValue::Filter(f)))
    }

    fn call_pos_method(
        &mut self,
        pos: PosValue,
        method: Symbol,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        let name = self.name_of(method);
        match name.as_str() {
            "offset" => {
                let off_sym = self.interner.intern("offset");
                let matched = self.match_args(&[(off_sym, None)], args, kwargs, expr)?;
                let arg = &matched[0];
                let Value::Const(ConstValue::Offset(off)) = &arg.value else {
                    let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                    return Err(self.err(SemaError::WrongArgType {
                        arg: "offset".to_string(),
                        expected: "Offset".to_string(),
                        found: self.type_name(arg.value.ty()),
                        span: span.into(),
                    }));
                };
                Ok(Value::Const(ConstValue::Pos(pos.shifted(off))))
            }
            "rotated" => {
                let rot_sym = self.interner.intern("rot");
                let matched = self.match_args(&[(rot_sym, None)], args, kwargs, expr)?;
                let arg = &matched[0];
                let Value::Const(ConstValue::Rot(rot)) = &arg.value else {
                    let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                    return Err(self.err(SemaError::WrongArgType {
                        arg: "rot".to_string(),
                        expected: "Rot".to_string(),
                        found: self.type_name(arg.value.ty()),
                        span: span.into(),
                    }));
                };
                let mut out = pos.clone();
                out.context.push(rot.context());
                Ok(Value::Const(ConstValue::Pos(out)))
            }
            _ => Err(self.err(SemaError::HasNoAttribute {
                ty: "Pos".to_string(),
                attr: name,
                span: expr.span.into(),
            })),
        }
    }

    // --- Type constructors ---

    fn call_type_value(
        &mut self,
        ty: Type,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        match ty {
            Type::Engroup(template) => {
                self.match_args(&[], args, kwargs, expr)?;
                if self.in_const_context() {
                    return Err(self.err(SemaError::RuntimeStmtInConstContext {
                        span: expr.span.into(),
                    }));
                }
                let tag = self.alloc.tag();
                self.emit(Command::TagRemove {
                    target: format!("@e[tag={}]", tag),
                    tag: tag.clone(),
                });
                Ok(Value::Group {
                    tag,
                    template,
                    assignable: true,
                })
            }
            Type::Enfilter => {
                self.match_args(&[], args, kwargs, expr)?;
                Ok(Value::Const(ConstValue::Filter(EntityFilter::new())))
            }
            Type::Pos => {
                let coords = self.three_floats(args, kwargs, expr)?;
                Ok(Value::Const(ConstValue::Pos(PosValue::absolute(
                    coords.0, coords.1, coords.2,
                ))))
            }
            Type::Offset => {
                let coords = self.three_floats(args, kwargs, expr)?;
                Ok(Value::Const(ConstValue::Offset(OffsetValue {
                    dx: coords.0,
                    dy: coords.1,
                    dz: coords.2,
                })))
            }
            Type::Rot => {
                let yaw_sym = self.interner.intern("yaw");
                let pitch_sym = self.interner.intern("pitch");
                let matched =
                    self.match_args(&[(yaw_sym, None), (pitch_sym, None)], args, kwargs, expr)?;
                let yaw = self.const_float(&matched[0], "yaw", expr)?;
                let pitch = self.const_float(&matched[1], "pitch", expr)?;
                Ok(Value::Const(ConstValue::Rot(RotValue { yaw, pitch })))
            }
            other => Err(self.err(SemaError::Uncallable {
                ty: self.type_name(other),
                span: expr.span.into(),
            })),
        }
    }

    fn three_floats(
        &mut self,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<(f64, f64, f64), CompileError> {
        let x_sym = self.interner.intern("x");
        let y_sym = self.interner.intern("y");
        let z_sym = self.interner.intern("z");
        let matched =
            self.match_args(&[(x_sym, None), (y_sym, None), (z_sym, None)], args, kwargs, expr)?;
        Ok((
            self.const_float(&matched[0], "x", expr)?,
            self.const_float(&matched[1], "y", expr)?,
            self.const_float(&matched[2], "z", expr)?,
        ))
    }

    // --- Struct construction ---

    fn construct_struct(
        &mut self,
        id: StructId,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        if self.in_const_context() {
            return Err(self.err(SemaError::RuntimeStmtInConstContext {
                span: expr.span.into(),
            }));
        }
        if !args.is_empty() {
            return Err(self.err(SemaError::TooManyArgs {
                span: expr.span.into(),
            }));
        }
        let place = self.allocate_place(Type::Struct(id), expr.span)?;
        self.init_place(&place);
        let Place::Struct { fields, .. } = &place else {
            unreachable!()
        };
        let fields = fields.clone();
        for (name, value_expr) in kwargs {
            let Some((_, field_place)) = fields.iter().find(|(n, _)| n == name) else {
                return Err(self.err(SemaError::UnexpectedKeywordArg {
                    arg: self.name_of(*name),
                    span: value_expr.span.into(),
                }));
            };
            let value = self.analyze_expr(value_expr)?;
            if !self.types_match(field_place.ty(), value.ty()) {
                return Err(self.err(SemaError::WrongArgType {
                    arg: self.name_of(*name),
                    expected: self.type_name(field_place.ty()),
                    found: self.type_name(value.ty()),
                    span: value_expr.span.into(),
                }));
            }
            self.store_value(field_place, &value, value_expr.span)?;
        }
        Ok(Value::from_place(&place))
    }

    // --- Builtins ---

    fn call_builtin(
        &mut self,
        func: BuiltinFunc,
        args: &[Expr],
        kwargs: &[(Symbol, Expr)],
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        match func {
            BuiltinFunc::PrintTell => {
                let text_sym = self.interner.intern("text");
                let target_sym = self.interner.intern("target");
                let matched = self.match_args(
                    &[
                        (text_sym, None),
                        (target_sym, Some(ConstValue::Str("@a".to_string()))),
                    ],
                    args,
                    kwargs,
                    expr,
                )?;
                let target = self.const_str(&matched[1], "target", expr)?;
                let components = self.text_components(&matched[0], expr)?;
                self.emit(Command::Rawtext {
                    prefix: format!("tellraw {}", target),
                    components,
                });
                Ok(Value::Const(ConstValue::None))
            }
            BuiltinFunc::PrintTitle => {
                let syms: Vec<Symbol> = ["text", "target", "mode", "fade_in", "stay_time", "fade_out"]
                    .iter()
                    .map(|n| self.interner.intern(n))
                    .collect();
                let matched = self.match_args(
                    &[
                        (syms[0], None),
                        (syms[1], Some(ConstValue::Str("@a".to_string()))),
                        (syms[2], Some(ConstValue::Str("title".to_string()))),
                        (syms[3], Some(ConstValue::Int(10))),
                        (syms[4], Some(ConstValue::Int(70))),
                        (syms[5], Some(ConstValue::Int(20))),
                    ],
                    args,
                    kwargs,
                    expr,
                )?;
                let target = self.const_str(&matched[1], "target", expr)?;
                let mode = self.const_str(&matched[2], "mode", expr)?;
                if !matches!(mode.as_str(), "title" | "subtitle" | "actionbar") {
                    return Err(self.err(SemaError::WrongArgType {
                        arg: "mode".to_string(),
                        expected: "title, subtitle or actionbar".to_string(),
                        found: mode,
                        span: expr.span.into(),
                    }));
                }
                let fade_in = self.const_int(&matched[3], "fade_in", expr)?;
                let stay_time = self.const_int(&matched[4], "stay_time", expr)?;
                let fade_out = self.const_int(&matched[5], "fade_out", expr)?;
                let custom = (fade_in, stay_time, fade_out) != (10, 70, 20);
                if custom {
                    self.emit(Command::Raw(format!(
                        "titleraw {} times {} {} {}",
                        target, fade_in, stay_time, fade_out
                    )));
                }
                let components = self.text_components(&matched[0], expr)?;
                self.emit(Command::Rawtext {
                    prefix: format!("titleraw {} {}", target, mode),
                    components,
                });
                if custom {
                    self.emit(Command::Raw(format!("titleraw {} reset", target)));
                }
                Ok(Value::Const(ConstValue::None))
            }
            BuiltinFunc::PrintTitleClear => {
                let target_sym = self.interner.intern("target");
                let matched = self.match_args(
                    &[(target_sym, Some(ConstValue::Str("@a".to_string())))],
                    args,
                    kwargs,
                    expr,
                )?;
                let target = self.const_str(&matched[0], "target", expr)?;
                self.emit(Command::Raw(format!("titleraw {} clear", target)));
                Ok(Value::Const(ConstValue::None))
            }
            BuiltinFunc::MathRandint => {
                let min_sym = self.interner.intern("min");
                let max_sym = self.interner.intern("max");
                let matched =
                    self.match_args(&[(min_sym, None), (max_sym, None)], args, kwargs, expr)?;
                let min = self.const_int(&matched[0], "min", expr)?;
                let max = self.const_int(&matched[1], "max", expr)?;
                if min > max {
                    return Err(self.err(SemaError::ConstArithmetic {
                        msg: "empty random range".to_string(),
                        span: expr.span.into(),
                    }));
                }
                let slot = self.alloc.slot();
                self.emit(Command::ScbRandom {
                    slot: slot.clone(),
                    min,
                    max,
                });
                Ok(Value::Score {
                    slot,
                    ty: Type::Int,
                    assignable: false,
                })
            }
            BuiltinFunc::MathMin | BuiltinFunc::MathMax => {
                let a_sym = self.interner.intern("a");
                let b_sym = self.interner.intern("b");
                let matched =
                    self.match_args(&[(a_sym, None), (b_sym, None)], args, kwargs, expr)?;
                if let (Value::Const(ConstValue::Int(a)), Value::Const(ConstValue::Int(b))) =
                    (&matched[0].value, &matched[1].value)
                {
                    let v = if func == BuiltinFunc::MathMin {
                        (*a).min(*b)
                    } else {
                        (*a).max(*b)
                    };
                    return Ok(Value::Const(ConstValue::Int(v)));
                }
                let temp = self.alloc.slot();
                let a = self.int_operand(&matched[0].value, expr.span)?;
                match a {
                    IntOperand::Const(v) => self.emit(Command::ScbSetConst {
                        slot: temp.clone(),
                        value: v,
                    }),
                    IntOperand::Slot(s) => self.emit(Command::ScbOperation {
                        op: ScbOp::Assign,
                        lhs: temp.clone(),
                        rhs: s,
                    }),
                }
                let b = self.int_operand(&matched[1].value, expr.span)?;
                let rhs = match b {
                    IntOperand::Const(v) => self.alloc.int_const(v),
                    IntOperand::Slot(s) => s,
                };
                self.emit(Command::ScbOperation {
                    op: if func == BuiltinFunc::MathMin {
                        ScbOp::Min
                    } else {
                        ScbOp::Max
                    },
                    lhs: temp.clone(),
                    rhs,
                });
                Ok(Value::Score {
                    slot: temp,
                    ty: Type::Int,
                    assignable: false,
                })
            }
            BuiltinFunc::MathPow => {
                let base_sym = self.interner.intern("base");
                let exp_sym = self.interner.intern("exp");
                let matched =
                    self.match_args(&[(base_sym, None), (exp_sym, None)], args, kwargs, expr)?;
                let base = self.const_int(&matched[0], "base", expr)?;
                let exp = self.const_int(&matched[1], "exp", expr)?;
                if exp < 0 {
                    return Err(self.err(SemaError::ConstArithmetic {
                        msg: "negative power".to_string(),
                        span: expr.span.into(),
                    }));
                }
                let value = base.checked_pow(exp as u32).ok_or_else(|| {
                    self.err(SemaError::ConstArithmetic {
                        msg: "integer overflow".to_string(),
                        span: expr.span.into(),
                    })
                })?;
                Ok(Value::Const(ConstValue::Int(value)))
            }
            BuiltinFunc::WorldSetblock => {
                let pos_sym = self.interner.intern("pos");
                let block_sym = self.interner.intern("block");
                let matched =
                    self.match_args(&[(pos_sym, None), (block_sym, None)], args, kwargs, expr)?;
                let pos = self.const_pos(&matched[0], "pos", expr)?;
                let block = self.const_str(&matched[1], "block", expr)?;
                self.emit(Command::execute(
                    pos.context,
                    Command::Raw(format!("setblock ~ ~ ~ {}", block)),
                ));
                Ok(Value::Const(ConstValue::None))
            }
            BuiltinFunc::WorldFill => {
                let syms: Vec<Symbol> = ["from", "offset", "block"]
                    .iter()
                    .map(|n| self.interner.intern(n))
                    .collect();
                let matched = self.match_args(
                    &[(syms[0], None), (syms[1], None), (syms[2], None)],
                    args,
                    kwargs,
                    expr,
                )?;
                let pos = self.const_pos(&matched[0], "from", expr)?;
                let arg = &matched[1];
                let Value::Const(ConstValue::Offset(offset)) = &arg.value else {
                    let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                    return Err(self.err(SemaError::WrongArgType {
                        arg: "offset".to_string(),
                        expected: "Offset".to_string(),
                        found: self.type_name(arg.value.ty()),
                        span: span.into(),
                    }));
                };
                let offset = *offset;
                let block = self.const_str(&matched[2], "block", expr)?;
                self.emit(Command::execute(
                    pos.context,
                    Command::Raw(format!("fill ~ ~ ~ {} {}", offset.coords(), block)),
                ));
                Ok(Value::Const(ConstValue::None))
            }
            BuiltinFunc::WorldTp => {
                let target_sym = self.interner.intern("target");
                let pos_sym = self.interner.intern("pos");
                let matched =
                    self.match_args(&[(target_sym, None), (pos_sym, None)], args, kwargs, expr)?;
                let selector = match &matched[0].value {
                    Value::Entity(e) => e.sel.to_str(),
                    Value::Group { tag, .. } => format!("@e[tag={}]", tag),
                    Value::Const(ConstValue::Str(s)) => s.clone(),
                    other => {
                        return Err(self.err(SemaError::WrongArgType {
                            arg: "target".to_string(),
                            expected: "an entity, group or selector string".to_string(),
                            found: self.type_name(other.ty()),
                            span: expr.span.into(),
                        }));
                    }
                };
                let pos = self.const_pos(&matched[1], "pos", expr)?;
                self.emit(Command::execute(
                    pos.context,
                    Command::Raw(format!("tp {} ~ ~ ~", selector)),
                ));
                Ok(Value::Const(ConstValue::None))
            }
        }
    }

    /// Rawtext components for a print argument (string or formatted
    /// string); emits the formatted string's dependencies first.
    fn text_components(
        &mut self,
        arg: &ArgValue,
        expr: &Expr,
    ) -> Result<Vec<RawtextPart>, CompileError> {
        match &arg.value {
            Value::Const(ConstValue::Str(s)) => Ok(vec![RawtextPart::Text(s.clone())]),
            Value::Const(ConstValue::FStr(f)) => {
                let f = f.clone();
                self.emit_all(f.deps);
                Ok(f.parts)
            }
            other => {
                let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                Err(self.err(SemaError::WrongArgType {
                    arg: "text".to_string(),
                    expected: "str".to_string(),
                    found: self.type_name(other.ty()),
                    span: span.into(),
                }))
            }
        }
    }

    // --- Const argument helpers ---

    fn const_str(
        &mut self,
        arg: &ArgValue,
        name: &str,
        expr: &Expr,
    ) -> Result<String, CompileError> {
        match &arg.value {
            Value::Const(ConstValue::Str(s)) => Ok(s.clone()),
            Value::Const(_) => {
                let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                Err(self.err(SemaError::WrongArgType {
                    arg: name.to_string(),
                    expected: "str".to_string(),
                    found: self.type_name(arg.value.ty()),
                    span: span.into(),
                }))
            }
            _ => {
                let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                Err(self.err(SemaError::ArgNotConst {
                    arg: name.to_string(),
                    span: span.into(),
                }))
            }
        }
    }

    fn opt_const_str(
        &mut self,
        arg: &ArgValue,
        name: &str,
        expr: &Expr,
    ) -> Result<Option<String>, CompileError> {
        if matches!(arg.value, Value::Const(ConstValue::None)) {
            return Ok(None);
        }
        self.const_str(arg, name, expr).map(Some)
    }

    fn const_int(&mut self, arg: &ArgValue, name: &str, expr: &Expr) -> Result<i32, CompileError> {
        match &arg.value {
            Value::Const(ConstValue::Int(v)) => Ok(*v),
            Value::Const(_) => {
                let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                Err(self.err(SemaError::WrongArgType {
                    arg: name.to_string(),
                    expected: "int".to_string(),
                    found: self.type_name(arg.value.ty()),
                    span: span.into(),
                }))
            }
            _ => {
                let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                Err(self.err(SemaError::ArgNotConst {
                    arg: name.to_string(),
                    span: span.into(),
                }))
            }
        }
    }

    fn const_float(
        &mut self,
        arg: &ArgValue,
        name: &str,
        expr: &Expr,
    ) -> Result<f64, CompileError> {
        match &arg.value {
            Value::Const(ConstValue::Float(v)) => Ok(*v),
            Value::Const(ConstValue::Int(v)) => Ok(*v as f64),
            _ => {
                let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                Err(self.err(SemaError::WrongArgType {
                    arg: name.to_string(),
                    expected: "float".to_string(),
                    found: self.type_name(arg.value.ty()),
                    span: span.into(),
                }))
            }
        }
    }

    fn opt_const_float(
        &mut self,
        arg: &ArgValue,
        name: &str,
        expr: &Expr,
    ) -> Result<Option<f64>, CompileError> {
        if matches!(arg.value, Value::Const(ConstValue::None)) {
            return Ok(None);
        }
        self.const_float(arg, name, expr).map(Some)
    }

    fn const_pos(
        &mut self,
        arg: &ArgValue,
        name: &str,
        expr: &Expr,
    ) -> Result<PosValue, CompileError> {
        match &arg.value {
            Value::Const(ConstValue::Pos(p)) => Ok(p.clone()),
            _ => {
                let span = arg.expr.map(|e| e.span).unwrap_or(expr.span);
                Err(self.err(SemaError::WrongArgType {
                    arg: name.to_string(),
                    expected: "Pos".to_string(),
                    found: self.type_name(arg.value.ty()),
                    span: span.into(),
                }))
            }
        }
    }

}

fn scb_op(op: BinaryOp) -> ScbOp {
    match op {
        BinaryOp::Add => ScbOp::AddEq,
        BinaryOp::Sub => ScbOp::SubEq,
        BinaryOp::Mul => ScbOp::MulEq,
        BinaryOp::Div => ScbOp::DivEq,
        BinaryOp::Mod => ScbOp::ModEq,
        BinaryOp::And | BinaryOp::Or => unreachable!("logical ops never reach scoreboards"),
    }
}
