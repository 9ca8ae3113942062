//! Tree-walking interpreter (spec §4.5, §4.6).
//!
//! Grounded on the teacher's dispatch-by-node-kind shape (`expressions.rs`)
//! combined with its generic-tracer technique (`tracer.rs`): the evaluator
//! takes a `Box<dyn Trace>` and calls its hooks unconditionally, so
//! `Compile` (a [`NoopTrace`]) and `Annotate` (an [`AnnotateTrace`]) share
//! one code path.

use std::{rc::Rc, str::FromStr};

use indexmap::IndexMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;

use crate::{
    ast::{AngleUnit, BinaryOp, Expr, ExprKind, ForBinding, LayerKind, Loc, Program, Span, Stmt, StmtKind, TemplatePart, TextChild, UnaryOp},
    environment::Environment,
    error::{CompileError, ErrorKind, Result},
    layer::{ContextSnapshot, Layer, LayerBody, LayerOutput, TextElement, TextNode},
    path_context::PathContext,
    pathblock::PathBlockData,
    stdlib,
    stdlib::log::{LogEntry, LogPart},
    trace::Trace,
    value::{LayerReference, Point, ProjectedPath, UserFunction, Value},
};

/// Spec §5: "bounds iterations to an implementation constant (≥ 10 000)".
pub const MAX_RANGE_ITERATIONS: u64 = 10_000;
/// Guards unbounded user-function recursion; not specified numerically, but
/// spec §5 requires *some* bound ("no timeouts; large inputs are the
/// caller's concern" still implies a hard stack-safety backstop).
pub const MAX_CALL_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub to_fixed: Option<u32>,
    pub seed_random: Option<u64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CompileResult {
    pub layers: Vec<LayerOutput>,
    pub logs: Vec<LogEntry>,
    pub context: ContextSnapshot,
    pub path: Option<String>,
}

/// Unwind signal for `return` (spec §9 "return as unwind"), distinct from
/// `CompileError` propagation.
enum Flow {
    Normal,
    Return(Value),
}

fn path_letter_arity(letter: char) -> usize {
    match letter.to_ascii_uppercase() {
        'M' | 'L' | 'T' => 2,
        'H' | 'V' => 1,
        'C' => 6,
        'S' | 'Q' => 4,
        'A' => 7,
        'Z' => 0,
        _ => unreachable!("not a path command letter: {letter}"),
    }
}

pub struct Evaluator<'src> {
    source: &'src str,
    layers: Vec<Layer>,
    current_layer: Option<usize>,
    in_apply: bool,
    path_block_stack: Vec<PathContext>,
    logs: Vec<LogEntry>,
    rng: ChaCha8Rng,
    to_fixed: Option<u32>,
    call_depth: usize,
    trace: Box<dyn Trace>,
}

impl<'src> Evaluator<'src> {
    pub fn new(source: &'src str, options: CompileOptions, trace: Box<dyn Trace>) -> Self {
        let rng = match options.seed_random {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            source,
            layers: Vec::new(),
            current_layer: None,
            in_apply: false,
            path_block_stack: Vec::new(),
            logs: Vec::new(),
            rng,
            to_fixed: options.to_fixed,
            call_depth: 0,
            trace,
        }
    }

    pub fn run(mut self, program: &Program) -> Result<(CompileResult, Box<dyn Trace>)> {
        let global = Environment::root();
        for stmt in program {
            self.eval_stmt(stmt, &global)?;
        }
        let trace = std::mem::replace(&mut self.trace, Box::new(crate::trace::NoopTrace));
        let result = self.into_result()?;
        Ok((result, trace))
    }

    fn into_result(self) -> Result<CompileResult> {
        let layers: Vec<LayerOutput> = self.layers.iter().map(LayerOutput::from).collect();
        let context = match self.layers.iter().find(|l| l.is_default) {
            Some(l) => match &l.body {
                LayerBody::Path(ctx) => ContextSnapshot { position: ctx.position, subpath_start: ctx.subpath_start },
                LayerBody::Text(_) => ContextSnapshot { position: Point::new(0.0, 0.0), subpath_start: Point::new(0.0, 0.0) },
            },
            None => ContextSnapshot { position: Point::new(0.0, 0.0), subpath_start: Point::new(0.0, 0.0) },
        };
        let path = layers.iter().find(|l| l.is_default).filter(|l| l.kind == "path").and_then(|l| l.data.clone());
        Ok(CompileResult { layers, logs: self.logs, context, path })
    }

    // ---- active path context routing (spec §4.4) -------------------------

    fn active_path_ctx(&mut self, letter: char, loc: Loc) -> Result<&mut PathContext> {
        if !self.path_block_stack.is_empty() {
            if letter.is_ascii_uppercase() {
                return Err(CompileError::new(
                    ErrorKind::PathBlockRestriction,
                    "absolute path commands are not allowed inside a path block",
                    loc,
                ));
            }
            return Ok(self.path_block_stack.last_mut().unwrap());
        }
        if let Some(idx) = self.current_layer {
            return match self.layers[idx].kind {
                LayerKind::Path => Ok(self.layers[idx].path_context_mut().unwrap()),
                LayerKind::Text => Err(CompileError::new(ErrorKind::LayerError, "path commands cannot be routed into a TextLayer", loc)),
            };
        }
        self.default_layer_ctx_mut(loc)
    }

    fn default_layer_ctx_mut(&mut self, loc: Loc) -> Result<&mut PathContext> {
        if let Some(idx) = self.layers.iter().position(|l| l.is_default) {
            return match self.layers[idx].kind {
                LayerKind::Path => Ok(self.layers[idx].path_context_mut().unwrap()),
                LayerKind::Text => Err(CompileError::new(ErrorKind::LayerError, "path commands cannot be routed into a default TextLayer", loc)),
            };
        }
        self.layers.push(Layer::new_path("default".to_string(), true, IndexMap::new()));
        let idx = self.layers.len() - 1;
        Ok(self.layers[idx].path_context_mut().unwrap())
    }

    // ---- statements (spec §4.5) -------------------------------------------

    fn eval_block(&mut self, stmts: &[Stmt], env: &Environment) -> Result<Flow> {
        for stmt in stmts {
            match self.eval_stmt(stmt, env)? {
                Flow::Normal => {}
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_stmt(&mut self, stmt: &Stmt, env: &Environment) -> Result<Flow> {
        if !self.path_block_stack.is_empty() {
            if let StmtKind::LayerDefine { .. } | StmtKind::LayerApply { .. } | StmtKind::Text { .. } = &stmt.kind {
                return Err(CompileError::new(
                    ErrorKind::PathBlockRestriction,
                    "layer definitions, apply blocks, and text statements are not allowed inside a path block",
                    stmt.span.loc,
                ));
            }
        }
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                let v = self.eval_expr(value, env)?;
                env.declare(name.clone(), v);
                Ok(Flow::Normal)
            }
            StmtKind::Assign { name, value } => {
                let v = self.eval_expr(value, env)?;
                if !env.assign_nearest(name, v) {
                    return Err(CompileError::new(ErrorKind::AssignmentError, format!("cannot assign to undeclared variable `{name}`"), stmt.span.loc));
                }
                Ok(Flow::Normal)
            }
            StmtKind::PathCommand { letter, args } => {
                self.eval_path_command(*letter, args, env, stmt.span.loc)?;
                Ok(Flow::Normal)
            }
            StmtKind::ForRange { var, start, end, body } => self.eval_for_range(var, start, end, body, env, stmt.span),
            StmtKind::ForEach { binding, iterable, body } => self.eval_for_each(binding, iterable, body, env, stmt.span.loc),
            StmtKind::If { cond, then_body, else_ifs, else_body } => self.eval_if(cond, then_body, else_ifs, else_body, env),
            StmtKind::FnDecl { name, params, body } => {
                let func = UserFunction { name: name.clone(), params: params.clone(), body: Rc::new(body.clone()), captured_env: env.clone() };
                env.declare(name.clone(), Value::Function(Rc::new(func)));
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                let v = match value {
                    Some(e) => self.eval_expr(e, env)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(v))
            }
            StmtKind::LayerDefine { kind, name, style, is_default } => {
                self.eval_layer_define(*kind, name, style, *is_default, env, stmt.span.loc)?;
                Ok(Flow::Normal)
            }
            StmtKind::LayerApply { name, body } => self.eval_layer_apply(name, body, env, stmt.span.loc),
            StmtKind::Text { x, y, extra, children } => {
                self.eval_text_stmt(x, y, extra, children, env, stmt.span.loc)?;
                Ok(Flow::Normal)
            }
            StmtKind::ExprStmt(expr) => {
                self.eval_expr(expr, env)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn eval_path_command(&mut self, letter: char, args: &[Expr], env: &Environment, loc: Loc) -> Result<()> {
        let expected = path_letter_arity(letter);
        if args.len() != expected {
            return Err(CompileError::new(
                ErrorKind::ArgumentError,
                format!("path command `{letter}` expects {expected} argument(s), got {}", args.len()),
                loc,
            ));
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let v = self.eval_expr(arg, env)?;
            values.push(match v {
                Value::Number(n, _) => n,
                Value::Null => return Err(CompileError::new(ErrorKind::NullUsage, "null cannot be used as a path argument", arg.span.loc)),
                other => return Err(CompileError::new(ErrorKind::TypeError, format!("path arguments must be numbers, got {}", other.kind_name()), arg.span.loc)),
            });
        }
        let to_fixed = self.to_fixed;
        let ctx = self.active_path_ctx(letter, loc)?;
        ctx.emit(letter, &values, to_fixed);
        let token = ctx.tokens.last().cloned().unwrap_or_default();
        self.trace.on_command(&token);
        Ok(())
    }

    fn eval_for_range(&mut self, var: &str, start: &Expr, end: &Expr, body: &[Stmt], env: &Environment, span: Span) -> Result<Flow> {
        let start_v = self.require_number(start, env)?;
        let end_v = self.require_number(end, env)?;
        if !start_v.is_finite() || !end_v.is_finite() {
            return Err(CompileError::new(ErrorKind::RangeError, "for-range bounds must be finite", span.loc));
        }
        let ascending = start_v <= end_v;
        let count = (end_v - start_v).abs().round() as u64 + 1;
        if count > MAX_RANGE_ITERATIONS {
            return Err(CompileError::new(ErrorKind::RangeError, format!("for-loop exceeds the maximum of {MAX_RANGE_ITERATIONS} iterations"), span.loc));
        }
        let header = format!("for ({var} in {}..{})", crate::numeric::format_number(start_v, None), crate::numeric::format_number(end_v, None));
        self.trace.on_for_loop(&header, span.loc.line, Some(count));
        let mut i = start_v as i64;
        let step: i64 = if ascending { 1 } else { -1 };
        for n in 0..count {
            self.trace.on_iteration(i);
            let iter_env = env.child();
            iter_env.declare(var.to_string(), Value::number(i as f64));
            match self.eval_block(body, &iter_env)? {
                Flow::Normal => {}
                ret @ Flow::Return(_) => {
                    self.trace.end_for_loop();
                    return Ok(ret);
                }
            }
            if n + 1 < count {
                i += step;
            }
        }
        self.trace.end_for_loop();
        Ok(Flow::Normal)
    }

    fn eval_for_each(&mut self, binding: &ForBinding, iterable: &Expr, body: &[Stmt], env: &Environment, loc: Loc) -> Result<Flow> {
        let iter_value = self.eval_expr(iterable, env)?;
        let items: Vec<Value> = match &iter_value {
            Value::Array(arr) => arr.borrow().clone(),
            other => return Err(CompileError::new(ErrorKind::TypeError, format!("for-each requires an array, got {}", other.kind_name()), loc)),
        };
        let header = "for-each".to_string();
        self.trace.on_for_loop(&header, loc.line, Some(items.len() as u64));
        for (idx, item) in items.into_iter().enumerate() {
            self.trace.on_iteration(idx as i64);
            let iter_env = env.child();
            match binding {
                ForBinding::Single(name) => iter_env.declare(name.clone(), item),
                ForBinding::ItemIndex(item_name, idx_name) => {
                    iter_env.declare(item_name.clone(), item);
                    iter_env.declare(idx_name.clone(), Value::number(idx as f64));
                }
            }
            match self.eval_block(body, &iter_env)? {
                Flow::Normal => {}
                ret @ Flow::Return(_) => {
                    self.trace.end_for_loop();
                    return Ok(ret);
                }
            }
        }
        self.trace.end_for_loop();
        Ok(Flow::Normal)
    }

    fn eval_if(&mut self, cond: &Expr, then_body: &[Stmt], else_ifs: &[(Expr, Vec<Stmt>)], else_body: &Option<Vec<Stmt>>, env: &Environment) -> Result<Flow> {
        if self.eval_expr(cond, env)?.is_truthy() {
            return self.eval_block(then_body, &env.child());
        }
        for (c, body) in else_ifs {
            if self.eval_expr(c, env)?.is_truthy() {
                return self.eval_block(body, &env.child());
            }
        }
        if let Some(body) = else_body {
            return self.eval_block(body, &env.child());
        }
        Ok(Flow::Normal)
    }

    fn eval_layer_define(&mut self, kind: LayerKind, name: &Expr, style: &Expr, is_default: bool, env: &Environment, loc: Loc) -> Result<()> {
        let name_v = self.eval_expr(name, env)?;
        let name = match name_v {
            Value::Str(s) => s.to_string(),
            other => return Err(CompileError::new(ErrorKind::TypeError, format!("layer name must be a string, got {}", other.kind_name()), loc)),
        };
        if self.layers.iter().any(|l| l.name == name) {
            return Err(CompileError::new(ErrorKind::LayerError, format!("duplicate layer name `{name}`"), loc));
        }
        if is_default && self.layers.iter().any(|l| l.is_default) {
            return Err(CompileError::new(ErrorKind::LayerError, "only one layer may be marked default", loc));
        }
        let style_v = self.eval_expr(style, env)?;
        let styles = match style_v {
            Value::StyleBlock(map) => (*map).clone(),
            other => return Err(CompileError::new(ErrorKind::TypeError, format!("layer style must be a style block, got {}", other.kind_name()), loc)),
        };
        let layer = match kind {
            LayerKind::Path => Layer::new_path(name, is_default, styles),
            LayerKind::Text => Layer::new_text(name, is_default, styles),
        };
        self.layers.push(layer);
        Ok(())
    }

    fn eval_layer_apply(&mut self, name: &Expr, body: &[Stmt], env: &Environment, loc: Loc) -> Result<Flow> {
        if self.in_apply {
            return Err(CompileError::new(ErrorKind::LayerError, "apply blocks cannot be nested", loc));
        }
        let name_v = self.eval_expr(name, env)?;
        let name = match name_v {
            Value::Str(s) => s.to_string(),
            other => return Err(CompileError::new(ErrorKind::TypeError, format!("layer name must be a string, got {}", other.kind_name()), loc)),
        };
        let idx = self.layers.iter().position(|l| l.name == name).ok_or_else(|| CompileError::new(ErrorKind::LayerError, format!("undefined layer `{name}`"), loc))?;
        self.current_layer = Some(idx);
        self.in_apply = true;
        let result = self.eval_block(body, &env.child());
        self.in_apply = false;
        self.current_layer = None;
        result
    }

    fn eval_text_stmt(&mut self, x: &Expr, y: &Expr, extra: &[Expr], children: &[TextChild], env: &Environment, loc: Loc) -> Result<()> {
        let in_text_layer = matches!(self.current_layer, Some(idx) if self.layers[idx].kind == LayerKind::Text);
        if !in_text_layer {
            return Err(CompileError::new(ErrorKind::LayerError, "text(...) is only allowed inside a TextLayer apply block", loc));
        }
        let x = self.require_number(x, env)?;
        let y = self.require_number(y, env)?;
        let mut rotation = None;
        let mut styles = None;
        for e in extra {
            match self.eval_expr(e, env)? {
                Value::Number(n, _) => rotation = Some(n),
                Value::StyleBlock(map) => styles = Some((*map).clone()),
                other => return Err(CompileError::new(ErrorKind::TypeError, format!("text() extra argument must be a number (rotation) or a style block, got {}", other.kind_name()), e.span.loc)),
            }
        }
        let child_env = env.child();
        let text_children = self.eval_text_children(children, &child_env)?;
        let element = TextElement { x, y, rotation, styles, children: text_children };
        let idx = self.current_layer.expect("checked above");
        match &mut self.layers[idx].body {
            LayerBody::Text(elements) => elements.push(element),
            LayerBody::Path(_) => unreachable!("current layer kind already checked to be Text"),
        }
        Ok(())
    }

    fn eval_text_children(&mut self, children: &[TextChild], env: &Environment) -> Result<Vec<TextNode>> {
        let mut out = Vec::new();
        for child in children {
            self.eval_text_child(child, env, &mut out)?;
        }
        Ok(out)
    }

    fn eval_text_child(&mut self, child: &TextChild, env: &Environment, out: &mut Vec<TextNode>) -> Result<()> {
        match child {
            TextChild::Run(template) => {
                let text = self.eval_template_text(template, env)?;
                out.push(TextNode::Run { text });
            }
            TextChild::Tspan { dx, dy, rotation, text } => {
                let dx = dx.as_ref().map(|e| self.require_number(e, env)).transpose()?;
                let dy = dy.as_ref().map(|e| self.require_number(e, env)).transpose()?;
                let rotation = rotation.as_ref().map(|e| self.require_number(e, env)).transpose()?;
                let text = self.eval_template_text(text, env)?;
                out.push(TextNode::Tspan { dx, dy, rotation, text });
            }
            TextChild::Let { name, value } => {
                let v = self.eval_expr(value, env)?;
                env.declare(name.clone(), v);
            }
            TextChild::If { cond, then_body, else_ifs, else_body } => {
                if self.eval_expr(cond, env)?.is_truthy() {
                    out.extend(self.eval_text_children(then_body, &env.child())?);
                    return Ok(());
                }
                for (c, body) in else_ifs {
                    if self.eval_expr(c, env)?.is_truthy() {
                        out.extend(self.eval_text_children(body, &env.child())?);
                        return Ok(());
                    }
                }
                if let Some(body) = else_body {
                    out.extend(self.eval_text_children(body, &env.child())?);
                }
            }
            TextChild::ForRange { var, start, end, body } => {
                let start_v = self.require_number(start, env)?;
                let end_v = self.require_number(end, env)?;
                if !start_v.is_finite() || !end_v.is_finite() {
                    return Err(CompileError::new(ErrorKind::RangeError, "for-range bounds must be finite", start.span.loc));
                }
                let ascending = start_v <= end_v;
                let count = (end_v - start_v).abs().round() as u64 + 1;
                if count > MAX_RANGE_ITERATIONS {
                    return Err(CompileError::new(ErrorKind::RangeError, format!("for-loop exceeds the maximum of {MAX_RANGE_ITERATIONS} iterations"), start.span.loc));
                }
                let mut i = start_v as i64;
                let step: i64 = if ascending { 1 } else { -1 };
                for n in 0..count {
                    let iter_env = env.child();
                    iter_env.declare(var.clone(), Value::number(i as f64));
                    out.extend(self.eval_text_children(body, &iter_env)?);
                    if n + 1 < count {
                        i += step;
                    }
                }
            }
            TextChild::ForEach { binding, iterable, body } => {
                let iter_value = self.eval_expr(iterable, env)?;
                let items: Vec<Value> = match &iter_value {
                    Value::Array(arr) => arr.borrow().clone(),
                    other => return Err(CompileError::new(ErrorKind::TypeError, format!("for-each requires an array, got {}", other.kind_name()), iterable.span.loc)),
                };
                for (idx, item) in items.into_iter().enumerate() {
                    let iter_env = env.child();
                    match binding {
                        ForBinding::Single(name) => iter_env.declare(name.clone(), item),
                        ForBinding::ItemIndex(item_name, idx_name) => {
                            iter_env.declare(item_name.clone(), item);
                            iter_env.declare(idx_name.clone(), Value::number(idx as f64));
                        }
                    }
                    out.extend(self.eval_text_children(body, &iter_env)?);
                }
            }
        }
        Ok(())
    }

    fn eval_template_text(&mut self, expr: &Expr, env: &Environment) -> Result<String> {
        match self.eval_expr(expr, env)? {
            Value::Str(s) => Ok(s.to_string()),
            other => Ok(other.display_form()),
        }
    }

    fn require_number(&mut self, expr: &Expr, env: &Environment) -> Result<f64> {
        match self.eval_expr(expr, env)? {
            Value::Number(n, _) => Ok(n),
            other => Err(CompileError::new(ErrorKind::TypeError, format!("expected a number, got {}", other.kind_name()), expr.span.loc)),
        }
    }

    // ---- expressions (spec §4.6) ------------------------------------------

    fn eval_expr(&mut self, expr: &Expr, env: &Environment) -> Result<Value> {
        match &expr.kind {
            ExprKind::Number(v, unit) => Ok(Value::Number(*v, *unit)),
            ExprKind::Str(s) => Ok(Value::string(s.as_str())),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Ident(name) => crate::environment::require_lookup(env, name, expr.span.loc.line, expr.span.loc.column),
            ExprKind::Array(items) => {
                let mut vals = Vec::with_capacity(items.len());
                for item in items {
                    vals.push(self.eval_expr(item, env)?);
                }
                Ok(Value::array(vals))
            }
            ExprKind::Template(parts) => {
                let mut s = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Str(text) => s.push_str(text),
                        TemplatePart::Interp(e) => s.push_str(&self.eval_expr(e, env)?.display_form()),
                    }
                }
                Ok(Value::string(s))
            }
            ExprKind::Unary { op, expr: inner } => self.eval_unary(*op, inner, env),
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, env, expr.span),
            ExprKind::Calc(inner) => self.eval_expr(inner, env),
            ExprKind::Call { callee, args } => self.eval_call(callee, args, env, expr.span),
            ExprKind::MethodCall { receiver, name, args } => self.eval_method_call(receiver, name, args, env, expr.span.loc),
            ExprKind::Index { receiver, index } => self.eval_index(receiver, index, env, expr.span.loc),
            ExprKind::Property { receiver, name } => self.eval_property(receiver, name, env, expr.span.loc),
            ExprKind::PathBlock(stmts) => self.eval_path_block(stmts, env, expr.span.loc),
            ExprKind::StyleBlock(entries) => {
                let mut map = IndexMap::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.clone());
                }
                Ok(Value::StyleBlock(Rc::new(map)))
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, inner: &Expr, env: &Environment) -> Result<Value> {
        let v = self.eval_expr(inner, env)?;
        match op {
            UnaryOp::Neg => match v {
                Value::Number(n, unit) => Ok(Value::Number(-n, unit)),
                other => Err(CompileError::new(ErrorKind::TypeError, format!("unary `-` requires a number, got {}", other.kind_name()), inner.span.loc)),
            },
            UnaryOp::Not => Ok(Value::number(if v.is_truthy() { 0.0 } else { 1.0 })),
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, env: &Environment, span: Span) -> Result<Value> {
        match op {
            BinaryOp::And => {
                let l = self.eval_expr(left, env)?;
                if !l.is_truthy() {
                    return Ok(Value::number(0.0));
                }
                let r = self.eval_expr(right, env)?;
                Ok(Value::number(if r.is_truthy() { 1.0 } else { 0.0 }))
            }
            BinaryOp::Or => {
                let l = self.eval_expr(left, env)?;
                if l.is_truthy() {
                    return Ok(Value::number(1.0));
                }
                let r = self.eval_expr(right, env)?;
                Ok(Value::number(if r.is_truthy() { 1.0 } else { 0.0 }))
            }
            BinaryOp::Eq => {
                let (l, r) = (self.eval_expr(left, env)?, self.eval_expr(right, env)?);
                Ok(Value::number(if l.structural_eq(&r) { 1.0 } else { 0.0 }))
            }
            BinaryOp::Ne => {
                let (l, r) = (self.eval_expr(left, env)?, self.eval_expr(right, env)?);
                Ok(Value::number(if l.structural_eq(&r) { 0.0 } else { 1.0 }))
            }
            BinaryOp::Merge => {
                let (l, r) = (self.eval_expr(left, env)?, self.eval_expr(right, env)?);
                match (l, r) {
                    (Value::StyleBlock(a), Value::StyleBlock(b)) => {
                        let mut merged = (*a).clone();
                        for (k, v) in b.iter() {
                            merged.insert(k.clone(), v.clone());
                        }
                        Ok(Value::StyleBlock(Rc::new(merged)))
                    }
                    _ => Err(CompileError::new(ErrorKind::TypeError, "`<<` requires two style blocks", span.loc)),
                }
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let a = self.require_number(left, env)?;
                let b = self.require_number(right, env)?;
                let r = match op {
                    BinaryOp::Lt => a < b,
                    BinaryOp::Le => a <= b,
                    BinaryOp::Gt => a > b,
                    BinaryOp::Ge => a >= b,
                    _ => unreachable!(),
                };
                Ok(Value::number(if r { 1.0 } else { 0.0 }))
            }
            BinaryOp::Add | BinaryOp::Sub => {
                let (a, ua) = self.require_number_with_unit(left, env)?;
                let (b, ub) = self.require_number_with_unit(right, env)?;
                if ua != ub && ua != AngleUnit::None && ub != AngleUnit::None {
                    return Err(CompileError::new(ErrorKind::AngleUnitMismatch, "cannot add/subtract different angle units", span.loc));
                }
                let unit = if ua == AngleUnit::None { ub } else { ua };
                let v = if op == BinaryOp::Add { a + b } else { a - b };
                Ok(Value::Number(v, unit))
            }
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let (a, ua) = self.require_number_with_unit(left, env)?;
                let (b, ub) = self.require_number_with_unit(right, env)?;
                let unit = match (ua, ub) {
                    (AngleUnit::Rad, AngleUnit::Rad) => AngleUnit::None,
                    (AngleUnit::Rad, AngleUnit::None) | (AngleUnit::None, AngleUnit::Rad) => AngleUnit::Rad,
                    (AngleUnit::None, AngleUnit::None) => AngleUnit::None,
                };
                let v = match op {
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Rem => a % b,
                    _ => unreachable!(),
                };
                Ok(Value::Number(v, unit))
            }
        }
    }

    fn require_number_with_unit(&mut self, expr: &Expr, env: &Environment) -> Result<(f64, AngleUnit)> {
        match self.eval_expr(expr, env)? {
            Value::Number(n, u) => Ok((n, u)),
            Value::Null => Err(CompileError::new(ErrorKind::NullUsage, "null cannot be used in arithmetic", expr.span.loc)),
            other => Err(CompileError::new(ErrorKind::TypeError, format!("arithmetic requires numbers, got {}", other.kind_name()), expr.span.loc)),
        }
    }

    fn eval_call(&mut self, callee: &str, args: &[Expr], env: &Environment, span: Span) -> Result<Value> {
        if callee == "log" {
            return self.eval_log(args, env, span.loc.line);
        }
        if callee == "layer" {
            if args.len() != 1 {
                return Err(CompileError::new(ErrorKind::ArgumentError, format!("`layer` expects 1 argument, got {}", args.len()), span.loc));
            }
            return match self.eval_expr(&args[0], env)? {
                Value::Str(s) => Ok(Value::LayerReference(LayerReference { name: s.to_string() })),
                other => Err(CompileError::new(ErrorKind::TypeError, format!("`layer` expects a string name, got {}", other.kind_name()), span.loc)),
            };
        }
        if let Some(v) = env.lookup(callee) {
            return match v {
                Value::Function(f) => self.call_user_function(&f, args, env, span),
                other => Err(CompileError::new(ErrorKind::TypeError, format!("`{callee}` is not callable (found {})", other.kind_name()), span.loc)),
            };
        }
        if stdlib::is_builtin(callee) {
            let mut values: SmallVec<[Value; 3]> = SmallVec::with_capacity(args.len());
            for a in args {
                values.push(self.eval_expr(a, env)?);
            }
            let rendered = render_call(callee, args, self.source);
            self.trace.on_call(&rendered, span.loc.line);
            if callee == "Point" {
                return stdlib::point::construct(&values, span.loc);
            }
            if let Some(c) = stdlib::math::constant(callee) {
                return Ok(Value::number(c));
            }
            if let Ok(func) = stdlib::math::MathFunction::from_str(callee) {
                return stdlib::math::call(func, &values, &mut self.rng, span.loc);
            }
            let to_fixed = self.to_fixed;
            let ctx = self.active_path_ctx('M', span.loc)?;
            return stdlib::shapes::call(callee, &values, ctx, to_fixed, span.loc);
        }
        Err(CompileError::new(ErrorKind::UndefinedFunction, format!("undefined function `{callee}`"), span.loc))
    }

    fn call_user_function(&mut self, func: &Rc<UserFunction>, args: &[Expr], env: &Environment, span: Span) -> Result<Value> {
        if args.len() != func.params.len() {
            return Err(CompileError::new(
                ErrorKind::ArityMismatch,
                format!("`{}` expects {} argument(s), got {}", func.name, func.params.len(), args.len()),
                span.loc,
            ));
        }
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(CompileError::new(ErrorKind::RangeError, "maximum call depth exceeded", span.loc));
        }
        let mut values: SmallVec<[Value; 3]> = SmallVec::with_capacity(args.len());
        for a in args {
            values.push(self.eval_expr(a, env)?);
        }
        let rendered = render_call(&func.name, args, self.source);
        self.trace.on_call(&rendered, span.loc.line);

        let call_env = func.captured_env.child();
        for (param, value) in func.params.iter().zip(values) {
            call_env.declare(param.clone(), value);
        }
        self.call_depth += 1;
        let flow = self.eval_block(&func.body, &call_env);
        self.call_depth -= 1;
        match flow? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(Value::Null),
        }
    }

    fn eval_log(&mut self, args: &[Expr], env: &Environment, line: u32) -> Result<Value> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            if let ExprKind::Str(s) = &arg.kind {
                parts.push(LogPart::String { value: s.clone() });
            } else {
                let value = self.eval_expr(arg, env)?;
                let label = arg.span.text(self.source).to_string();
                parts.push(stdlib::log::value_part(&label, &value));
            }
        }
        self.logs.push(LogEntry { line, parts });
        Ok(Value::Null)
    }

    fn eval_method_call(&mut self, receiver: &Expr, name: &str, args: &[Expr], env: &Environment, loc: Loc) -> Result<Value> {
        let recv = self.eval_expr(receiver, env)?;
        let mut values: SmallVec<[Value; 3]> = SmallVec::with_capacity(args.len());
        for a in args {
            values.push(self.eval_expr(a, env)?);
        }
        match recv {
            Value::Array(arr) => self.eval_array_method(&arr, name, &values, loc),
            Value::Str(s) => eval_string_method(&s, name, &values, loc),
            Value::Point(p) => stdlib::point::method(p, name, &values, loc),
            Value::PathBlock(block) => self.eval_path_geometry_method(&block, Point::new(0.0, 0.0), name, &values, loc),
            Value::ProjectedPath(proj) => self.eval_path_geometry_method(&proj.block, proj.origin, name, &values, loc),
            other => Err(CompileError::new(ErrorKind::TypeError, format!("`{}` has no method `{name}`", other.kind_name()), loc)),
        }
    }

    fn eval_array_method(&self, arr: &crate::value::ArrayHandle, name: &str, args: &[Value], loc: Loc) -> Result<Value> {
        match name {
            "push" => {
                let v = args.first().cloned().unwrap_or(Value::Null);
                arr.borrow_mut().push(v);
                Ok(Value::number(arr.borrow().len() as f64))
            }
            "pop" => Ok(arr.borrow_mut().pop().unwrap_or(Value::Null)),
            "shift" => {
                let mut b = arr.borrow_mut();
                if b.is_empty() { Ok(Value::Null) } else { Ok(b.remove(0)) }
            }
            "unshift" => {
                let v = args.first().cloned().unwrap_or(Value::Null);
                arr.borrow_mut().insert(0, v);
                Ok(Value::number(arr.borrow().len() as f64))
            }
            "empty" => Ok(Value::number(if arr.borrow().is_empty() { 1.0 } else { 0.0 })),
            other => Err(CompileError::new(ErrorKind::TypeError, format!("Array has no method `{other}`"), loc)),
        }
    }

    fn eval_path_geometry_method(&mut self, block: &Rc<PathBlockData>, origin: Point, name: &str, args: &[Value], loc: Loc) -> Result<Value> {
        match name {
            "draw" => {
                if !self.path_block_stack.is_empty() {
                    return Err(CompileError::new(ErrorKind::PathBlockRestriction, "draw() is not allowed inside a path block", loc));
                }
                let to_fixed = self.to_fixed;
                let ctx = self.active_path_ctx('m', loc)?;
                let origin = ctx.position;
                for cmd in &block.sub_path_commands {
                    ctx.emit(cmd.command, &cmd.args, to_fixed);
                }
                Ok(Value::ProjectedPath(ProjectedPath { block: block.clone(), origin }))
            }
            "project" => {
                if !self.path_block_stack.is_empty() {
                    return Err(CompileError::new(ErrorKind::PathBlockRestriction, "project() is not allowed inside a path block", loc));
                }
                let x = require_num(args, 0, loc)?;
                let y = require_num(args, 1, loc)?;
                Ok(Value::ProjectedPath(ProjectedPath { block: block.clone(), origin: Point::new(x, y) }))
            }
            "get" => {
                let t = require_num(args, 0, loc)?;
                let p = block.get(t).map_err(|e| relocate(e, loc))?;
                Ok(Value::Point(Point::new(origin.x + p.x, origin.y + p.y)))
            }
            "tangent" => {
                let t = require_num(args, 0, loc)?;
                let (p, angle) = block.tangent(t).map_err(|e| relocate(e, loc))?;
                Ok(Value::array(vec![Value::Point(Point::new(origin.x + p.x, origin.y + p.y)), Value::number(angle)]))
            }
            "normal" => {
                let t = require_num(args, 0, loc)?;
                let (p, angle) = block.normal(t).map_err(|e| relocate(e, loc))?;
                Ok(Value::array(vec![Value::Point(Point::new(origin.x + p.x, origin.y + p.y)), Value::number(angle)]))
            }
            "partition" => {
                let n = require_num(args, 0, loc)?;
                let entries = block.partition(n).map_err(|e| relocate(e, loc))?;
                Ok(Value::array(
                    entries
                        .into_iter()
                        .map(|(p, angle)| Value::array(vec![Value::Point(Point::new(origin.x + p.x, origin.y + p.y)), Value::number(angle)]))
                        .collect(),
                ))
            }
            other => Err(CompileError::new(ErrorKind::TypeError, format!("PathBlock has no method `{other}`"), loc)),
        }
    }

    fn eval_index(&mut self, receiver: &Expr, index: &Expr, env: &Environment, loc: Loc) -> Result<Value> {
        let recv = self.eval_expr(receiver, env)?;
        let i = self.require_number(index, env)?;
        if i.fract() != 0.0 || !i.is_finite() {
            return Err(CompileError::new(ErrorKind::TypeError, "index must be a finite integer", index.span.loc));
        }
        let i = i as i64;
        match recv {
            Value::Array(arr) => {
                let b = arr.borrow();
                let idx = if i < 0 { i + b.len() as i64 } else { i };
                if idx < 0 {
                    return Err(CompileError::new(ErrorKind::IndexOutOfBounds, "array index out of bounds", loc));
                }
                b.get(idx as usize).cloned().ok_or_else(|| CompileError::new(ErrorKind::IndexOutOfBounds, "array index out of bounds", loc))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = if i < 0 { i + chars.len() as i64 } else { i };
                if idx < 0 || idx as usize >= chars.len() {
                    return Err(CompileError::new(ErrorKind::IndexOutOfBounds, "string index out of bounds", loc));
                }
                Ok(Value::string(chars[idx as usize].to_string()))
            }
            other => Err(CompileError::new(ErrorKind::TypeError, format!("cannot index into {}", other.kind_name()), loc)),
        }
    }

    fn eval_property(&mut self, receiver: &Expr, name: &str, env: &Environment, loc: Loc) -> Result<Value> {
        let recv = self.eval_expr(receiver, env)?;
        match recv {
            Value::Point(p) => stdlib::point::property(p, name, loc),
            Value::Array(arr) => match name {
                "length" => Ok(Value::number(arr.borrow().len() as f64)),
                other => Err(CompileError::new(ErrorKind::TypeError, format!("Array has no property `{other}`"), loc)),
            },
            Value::Str(s) => match name {
                "length" => Ok(Value::number(s.chars().count() as f64)),
                other => Err(CompileError::new(ErrorKind::TypeError, format!("String has no property `{other}`"), loc)),
            },
            Value::StyleBlock(map) => {
                let kebab = camel_to_kebab(name);
                map.get(&kebab).map(|v| Value::string(v.as_str())).ok_or_else(|| CompileError::new(ErrorKind::TypeError, format!("StyleBlock has no property `{name}`"), loc))
            }
            Value::PathBlock(block) => path_block_property(&block, Point::new(0.0, 0.0), name, loc),
            Value::ProjectedPath(proj) => path_block_property(&proj.block, proj.origin, name, loc),
            Value::LayerReference(r) => match name {
                "name" => Ok(Value::string(r.name.clone())),
                other => Err(CompileError::new(ErrorKind::TypeError, format!("LayerReference has no property `{other}`"), loc)),
            },
            other => Err(CompileError::new(ErrorKind::TypeError, format!("{} has no property `{name}`", other.kind_name()), loc)),
        }
    }

    fn eval_path_block(&mut self, stmts: &[Stmt], env: &Environment, loc: Loc) -> Result<Value> {
        if !self.path_block_stack.is_empty() {
            return Err(CompileError::new(ErrorKind::PathBlockRestriction, "path blocks cannot be nested", loc));
        }
        self.path_block_stack.push(PathContext::new_path_block());
        let block_env = env.child();
        let result = self.eval_block(stmts, &block_env);
        let ctx = self.path_block_stack.pop().expect("just pushed");
        result?;
        let data = PathBlockData::from_context(&ctx);
        Ok(Value::PathBlock(Rc::new(data)))
    }
}

fn require_num(args: &[Value], i: usize, loc: Loc) -> Result<f64> {
    match args.get(i) {
        Some(Value::Number(n, _)) => Ok(*n),
        Some(other) => Err(CompileError::new(ErrorKind::TypeError, format!("expected a number, got {}", other.kind_name()), loc)),
        None => Err(CompileError::new(ErrorKind::ArgumentError, "missing argument", loc)),
    }
}

fn relocate(e: CompileError, loc: Loc) -> CompileError {
    CompileError::new(e.kind, e.message, loc)
}

fn path_block_property(block: &Rc<PathBlockData>, origin: Point, name: &str, loc: Loc) -> Result<Value> {
    match name {
        "length" => Ok(Value::number(block.length)),
        "startPoint" => Ok(Value::Point(Point::new(origin.x + block.start_point.x, origin.y + block.start_point.y))),
        "endPoint" => Ok(Value::Point(Point::new(origin.x + block.end_point.x, origin.y + block.end_point.y))),
        "vertices" => Ok(Value::array(block.vertices.iter().map(|p| Value::Point(Point::new(origin.x + p.x, origin.y + p.y))).collect())),
        "subPathCount" => Ok(Value::number(block.sub_path_count as f64)),
        "subPathCommands" => Ok(Value::array(
            block
                .sub_path_commands
                .iter()
                .map(|c| {
                    Value::array(vec![
                        Value::string(c.command.to_string()),
                        Value::array(c.args.iter().map(|a| Value::number(*a)).collect()),
                        Value::Point(Point::new(origin.x + c.start.x, origin.y + c.start.y)),
                        Value::Point(Point::new(origin.x + c.end.x, origin.y + c.end.y)),
                    ])
                })
                .collect(),
        )),
        other => Err(CompileError::new(ErrorKind::TypeError, format!("PathBlock has no property `{other}`"), loc)),
    }
}

fn camel_to_kebab(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn eval_string_method(s: &str, name: &str, args: &[Value], loc: Loc) -> Result<Value> {
    match name {
        "split" => Ok(Value::array(s.chars().map(|c| Value::string(c.to_string())).collect())),
        "append" => {
            let other = require_str(args, 0, loc)?;
            Ok(Value::string(format!("{s}{other}")))
        }
        "prepend" => {
            let other = require_str(args, 0, loc)?;
            Ok(Value::string(format!("{other}{s}")))
        }
        "includes" => {
            let other = require_str(args, 0, loc)?;
            Ok(Value::number(if s.contains(&other) { 1.0 } else { 0.0 }))
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let norm = |v: i64| if v < 0 { (v + len).max(0) } else { v.min(len) };
            let start = norm(require_num(args, 0, loc)? as i64);
            let end = match args.get(1) {
                Some(Value::Number(n, _)) => norm(*n as i64),
                _ => len,
            };
            let (start, end) = (start.min(end).max(0) as usize, end.max(start).min(len) as usize);
            Ok(Value::string(chars[start..end].iter().collect::<String>()))
        }
        "empty" => Ok(Value::number(if s.is_empty() { 1.0 } else { 0.0 })),
        other => Err(CompileError::new(ErrorKind::TypeError, format!("String has no method `{other}`"), loc)),
    }
}

fn require_str(args: &[Value], i: usize, loc: Loc) -> Result<String> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(CompileError::new(ErrorKind::TypeError, format!("expected a string, got {}", other.kind_name()), loc)),
        None => Err(CompileError::new(ErrorKind::ArgumentError, "missing argument", loc)),
    }
}

fn render_call(name: &str, args: &[Expr], source: &str) -> String {
    let rendered_args: Vec<&str> = args.iter().map(|a| a.span.text(source)).collect();
    format!("{name}({})", rendered_args.join(", "))
}
