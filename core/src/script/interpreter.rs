//! Tree-walking evaluator.
//!
//! The root scope holds `Math`; the model scope below it holds the primitive
//! bindings as parameters of the model function. There is no other ambient state,
//! so a script can only reach what is listed there.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ast::*;
use super::bindings::{call_primitive, Primitive};
use super::heap::Heap;
use super::parser::parse_program;
use super::value::{
    join_array, number_to_string, ArrayMethod, ArrayRef, MathFn, NativeFn, Object, ObjectRef, Value,
};
use super::{ScriptError, ScriptResult};
use crate::kernel::GeometryKernel;

/// Execution budget for a single script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    pub max_steps: u64,
    pub max_call_depth: usize,
    /// Statements and expressions being evaluated at once, across all calls.
    pub max_nesting: usize,
    /// Largest polygon count a single solid may reach.
    pub max_polygons: usize,
    /// Bytes of strings, arrays and objects a run may allocate in total.
    pub max_heap_bytes: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_steps: 2_000_000,
            max_call_depth: 128,
            max_nesting: 1024,
            max_polygons: 250_000,
            max_heap_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingKind {
    Const,
    Let,
    Var,
    Param,
    Function,
}

impl From<DeclKind> for BindingKind {
    fn from(kind: DeclKind) -> Self {
        match kind {
            DeclKind::Const => BindingKind::Const,
            DeclKind::Let => BindingKind::Let,
            DeclKind::Var => BindingKind::Var,
        }
    }
}

struct Binding {
    value: Value,
    kind: BindingKind,
}

/// Lexical scope.
pub struct Scope {
    vars: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    fn new(parent: Option<Rc<Scope>>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent,
        })
    }

    fn child(self: &Rc<Self>) -> Rc<Self> {
        Scope::new(Some(self.clone()))
    }

    fn declare(&self, name: &str, value: Value, kind: BindingKind) -> ScriptResult<()> {
        let mut vars = self.vars.borrow_mut();
        if let Some(existing) = vars.get(name) {
            let lexical = |k: BindingKind| matches!(k, BindingKind::Const | BindingKind::Let);
            if lexical(existing.kind) || lexical(kind) {
                return Err(ScriptError::Syntax {
                    message: format!("Identifier '{}' has already been declared", name),
                    line: 0,
                    column: 0,
                });
            }
        }
        vars.insert(name.to_string(), Binding { value, kind });
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.vars.borrow().get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    fn assign(&self, name: &str, value: Value) -> ScriptResult<()> {
        if let Some(binding) = self.vars.borrow_mut().get_mut(name) {
            if binding.kind == BindingKind::Const {
                return Err(ScriptError::Type("Assignment to constant variable.".into()));
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(ScriptError::Reference(name.to_string())),
        }
    }
}

/// A script function value together with the scope it closes over.
pub struct Closure {
    pub def: Rc<FunctionDef>,
    scope: Rc<Scope>,
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Assignable location, resolved once for compound updates.
enum Place {
    Var(String),
    Property(ObjectRef, String),
    Element(ArrayRef, usize),
}

/// Restores the nesting counter when an evaluation frame ends.
struct NestingGuard<'a>(&'a Cell<usize>);

impl Drop for NestingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Evaluates one script at a time against a geometry kernel.
///
/// Arrays and objects a script creates live until the interpreter is dropped,
/// which empties them; inspect a result before that.
pub struct Interpreter {
    kernel: Arc<dyn GeometryKernel>,
    limits: ScriptLimits,
    steps: Cell<u64>,
    depth: Cell<usize>,
    nesting: Cell<usize>,
    heap: Heap,
    captured: RefCell<Vec<Rc<Scope>>>,
}

impl Interpreter {
    pub fn new(kernel: Arc<dyn GeometryKernel>, limits: ScriptLimits) -> Self {
        Self {
            kernel,
            limits,
            steps: Cell::new(0),
            depth: Cell::new(0),
            nesting: Cell::new(0),
            heap: Heap::new(limits.max_heap_bytes),
            captured: RefCell::new(Vec::new()),
        }
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    /// Bytes charged against the memory budget by the last run.
    pub fn heap_used(&self) -> usize {
        self.heap.used()
    }

    /// Parse and run a script, returning the value of its top-level `return`.
    pub fn evaluate(&self, source: &str) -> ScriptResult<Value> {
        let program = parse_program(source)?;
        self.run(&program)
    }

    pub fn run(&self, program: &Program) -> ScriptResult<Value> {
        self.steps.set(0);
        self.depth.set(0);
        self.nesting.set(0);
        self.heap.reset_usage();

        let root = Scope::new(None);
        root.declare("Math", self.math_object()?, BindingKind::Const)?;

        let model = root.child();
        for primitive in Primitive::ALL {
            model.declare(
                primitive.name(),
                Value::Native(NativeFn::Primitive(primitive)),
                BindingKind::Param,
            )?;
        }

        match self.exec_body(&program.body, &model)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    fn tick(&self) -> ScriptResult<()> {
        let steps = self.steps.get() + 1;
        self.steps.set(steps);
        if steps > self.limits.max_steps {
            return Err(ScriptError::Budget(format!(
                "script exceeded the budget of {} evaluation steps",
                self.limits.max_steps
            )));
        }
        Ok(())
    }

    fn enter(&self) -> ScriptResult<NestingGuard<'_>> {
        let nesting = self.nesting.get();
        if nesting >= self.limits.max_nesting {
            return Err(ScriptError::Range("Maximum call stack size exceeded".into()));
        }
        self.nesting.set(nesting + 1);
        Ok(NestingGuard(&self.nesting))
    }

    /// Text of a value, charged against the memory budget.
    fn text(&self, value: &Value, max_len: usize) -> ScriptResult<String> {
        value.to_text(max_len).map_err(|e| self.heap.text_error(e))
    }

    fn math_object(&self) -> ScriptResult<Value> {
        let mut math = Object::new();
        math.set("PI", Value::Number(std::f64::consts::PI));
        math.set("E", Value::Number(std::f64::consts::E));
        for f in MathFn::ALL {
            math.set(f.name(), Value::Native(NativeFn::Math(f)));
        }
        self.heap.object(math)
    }

    // === Statements ===

    /// Run statements directly in `scope`, hoisting function declarations first.
    fn exec_body(&self, body: &[Stmt], scope: &Rc<Scope>) -> ScriptResult<Flow> {
        for stmt in body {
            if let Stmt::FunctionDecl(def) = stmt {
                let closure = self.make_closure(def, scope)?;
                let name = def.name.as_deref().unwrap_or_default();
                scope.declare(name, closure, BindingKind::Function)?;
            }
        }
        for stmt in body {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&self, stmt: &Stmt, scope: &Rc<Scope>) -> ScriptResult<Flow> {
        self.tick()?;
        let _nesting = self.enter()?;
        match stmt {
            Stmt::VarDecl { kind, declarations } => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(expr) => self.eval(expr, scope)?,
                        None => Value::Undefined,
                    };
                    scope.declare(name, value, (*kind).into())?;
                }
                Ok(Flow::Normal)
            }
            Stmt::FunctionDecl(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.exec_stmt(consequent, scope)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let loop_scope = scope.child();
                if let Some(init) = init {
                    self.exec_stmt(init, &loop_scope)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.eval(test, &loop_scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec_stmt(body, &loop_scope.child())? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &loop_scope)?;
                    }
                    self.tick()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::ForOf {
                kind,
                name,
                iterable,
                body,
            } => {
                let items = match self.eval(iterable, scope)? {
                    Value::Array(items) => {
                        self.heap.charge_values(items.borrow().len())?;
                        items.borrow().clone()
                    }
                    Value::Str(s) => {
                        self.heap.charge_values(s.len())?;
                        s.chars().map(|c| Value::string(c.to_string())).collect()
                    }
                    other => {
                        return Err(ScriptError::Type(format!(
                            "{} is not iterable",
                            other.to_display_string()
                        )))
                    }
                };
                for item in items {
                    let iteration = scope.child();
                    iteration.declare(name, item, (*kind).into())?;
                    match self.exec_stmt(body, &iteration)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::While { test, body } => {
                while self.eval(test, scope)?.truthy() {
                    match self.exec_stmt(body, &scope.child())? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.tick()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => self.exec_body(body, &scope.child()),
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    // === Expressions ===

    fn eval(&self, expr: &Expr, scope: &Rc<Scope>) -> ScriptResult<Value> {
        self.tick()?;
        let _nesting = self.enter()?;
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::string(s)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Template(chunks) => {
                let mut out = String::new();
                for chunk in chunks {
                    match chunk {
                        TemplateChunk::Text(text) => out.push_str(text),
                        TemplateChunk::Expr(expr) => {
                            let value = self.eval(expr, scope)?;
                            let room = self.heap.remaining().saturating_sub(out.len());
                            out.push_str(&self.text(&value, room)?);
                        }
                    }
                }
                self.heap.string(out)
            }
            Expr::Ident(name) => scope
                .lookup(name)
                .ok_or_else(|| ScriptError::Reference(name.clone())),
            Expr::Array(elements) => {
                let items = self.eval_elements(elements, scope)?;
                self.heap.array(items)
            }
            Expr::Object(properties) => {
                let mut object = Object::new();
                for property in properties {
                    match property {
                        Property::Pair(key, value) => {
                            object.set(key.clone(), self.eval(value, scope)?);
                        }
                        Property::Spread(expr) => match self.eval(expr, scope)? {
                            Value::Object(other) => {
                                for (k, v) in other.borrow().entries() {
                                    object.set(k.clone(), v.clone());
                                }
                            }
                            Value::Array(items) => {
                                for (i, v) in items.borrow().iter().enumerate() {
                                    object.set(i.to_string(), v.clone());
                                }
                            }
                            _ => {}
                        },
                    }
                }
                self.heap.object(object)
            }
            Expr::Member { object, property } => {
                let target = self.eval(object, scope)?;
                get_member(&target, property)
            }
            Expr::Index { object, index } => {
                let target = self.eval(object, scope)?;
                let key = self.eval(index, scope)?;
                get_index(&target, &key)
            }
            Expr::Call { callee, args } => {
                let function = self.eval(callee, scope)?;
                let args = self.eval_elements(args, scope)?;
                self.call_value(&function, args, &callee.describe())
            }
            Expr::Function(def) => self.make_closure(def, scope),
            Expr::Unary { op, operand } => {
                if let (UnaryOperator::TypeOf, Expr::Ident(name)) = (op, operand.as_ref()) {
                    // typeof tolerates undeclared names
                    let value = scope.lookup(name).unwrap_or(Value::Undefined);
                    return Ok(Value::string(value.type_of()));
                }
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOperator::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOperator::TypeOf => Ok(Value::string(value.type_of())),
                    UnaryOperator::Neg => Ok(Value::Number(-numeric_operand(&value, "-")?)),
                    UnaryOperator::Plus => Ok(Value::Number(numeric_operand(&value, "+")?)),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary_op(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                let short_circuit = match op {
                    LogicalOperator::And => !left.truthy(),
                    LogicalOperator::Or => left.truthy(),
                    LogicalOperator::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Assign { op, target, value } => {
                let place = self.resolve_place(target, scope)?;
                let new_value = match op {
                    AssignOperator::Assign => self.eval(value, scope)?,
                    compound => {
                        let current = self.read_place(&place, scope)?;
                        let rhs = self.eval(value, scope)?;
                        let op = match compound {
                            AssignOperator::Add => BinaryOperator::Add,
                            AssignOperator::Sub => BinaryOperator::Sub,
                            AssignOperator::Mul => BinaryOperator::Mul,
                            _ => BinaryOperator::Div,
                        };
                        self.binary_op(op, &current, &rhs)?
                    }
                };
                self.write_place(place, new_value.clone(), scope)?;
                Ok(new_value)
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let place = self.resolve_place(target, scope)?;
                let symbol = if *increment { "++" } else { "--" };
                let old = numeric_operand(&self.read_place(&place, scope)?, symbol)?;
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.write_place(place, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
        }
    }

    fn eval_elements(&self, elements: &[Element], scope: &Rc<Scope>) -> ScriptResult<Vec<Value>> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Element::Item(expr) => values.push(self.eval(expr, scope)?),
                Element::Spread(expr) => match self.eval(expr, scope)? {
                    Value::Array(items) => {
                        self.heap.charge_values(items.borrow().len())?;
                        values.extend(items.borrow().iter().cloned())
                    }
                    Value::Str(s) => {
                        self.heap.charge_values(s.len())?;
                        values.extend(s.chars().map(|c| Value::string(c.to_string())))
                    }
                    other => {
                        return Err(ScriptError::Type(format!(
                            "{} is not iterable",
                            other.to_display_string()
                        )))
                    }
                },
            }
        }
        Ok(values)
    }

    fn make_closure(&self, def: &Rc<FunctionDef>, scope: &Rc<Scope>) -> ScriptResult<Value> {
        self.heap.charge(mem::size_of::<Closure>())?;
        self.captured.borrow_mut().push(scope.clone());
        Ok(Value::Function(Rc::new(Closure {
            def: def.clone(),
            scope: scope.clone(),
        })))
    }

    fn resolve_place(&self, target: &Expr, scope: &Rc<Scope>) -> ScriptResult<Place> {
        match target {
            Expr::Ident(name) => Ok(Place::Var(name.clone())),
            Expr::Member { object, property } => {
                let object = self.eval(object, scope)?;
                place_for(&object, Value::string(property))
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, scope)?;
                let key = self.eval(index, scope)?;
                place_for(&object, key)
            }
            _ => Err(ScriptError::Syntax {
                message: "Invalid left-hand side in assignment".into(),
                line: 0,
                column: 0,
            }),
        }
    }

    fn read_place(&self, place: &Place, scope: &Rc<Scope>) -> ScriptResult<Value> {
        match place {
            Place::Var(name) => scope
                .lookup(name)
                .ok_or_else(|| ScriptError::Reference(name.clone())),
            Place::Property(object, key) => {
                Ok(object.borrow().get(key).cloned().unwrap_or(Value::Undefined))
            }
            Place::Element(items, index) => {
                Ok(items.borrow().get(*index).cloned().unwrap_or(Value::Undefined))
            }
        }
    }

    fn write_place(&self, place: Place, value: Value, scope: &Rc<Scope>) -> ScriptResult<()> {
        match place {
            Place::Var(name) => scope.assign(&name, value),
            Place::Property(object, key) => {
                if !object.borrow().contains_key(&key) {
                    self.heap.charge_entry(&key)?;
                }
                object.borrow_mut().set(key, value);
                Ok(())
            }
            Place::Element(items, index) => {
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    self.heap.charge_values(index + 1 - items.len())?;
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
                Ok(())
            }
        }
    }

    // === Calls ===

    pub(crate) fn call_value(&self, function: &Value, args: Vec<Value>, label: &str) -> ScriptResult<Value> {
        match function {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Native(NativeFn::Primitive(primitive)) => {
                let result = call_primitive(self.kernel.as_ref(), &self.limits, *primitive, &args)?;
                self.heap.adopt(&result)?;
                Ok(result)
            }
            Value::Native(NativeFn::Math(f)) => {
                let numbers: Vec<f64> = args.iter().map(Value::to_number).collect();
                Ok(Value::Number(f.apply(&numbers)))
            }
            Value::Native(NativeFn::Array(method, target)) => self.call_array_method(*method, target, args),
            _ => Err(ScriptError::Type(format!("{} is not a function", label))),
        }
    }

    fn call_closure(&self, closure: &Closure, args: Vec<Value>) -> ScriptResult<Value> {
        let depth = self.depth.get();
        if depth >= self.limits.max_call_depth {
            return Err(ScriptError::Range("Maximum call stack size exceeded".into()));
        }
        self.depth.set(depth + 1);
        let result = self.invoke(closure, args);
        self.depth.set(depth);
        result
    }

    fn invoke(&self, closure: &Closure, args: Vec<Value>) -> ScriptResult<Value> {
        let scope = closure.scope.child();
        let mut args = args.into_iter();
        for param in &closure.def.params {
            let mut value = args.next().unwrap_or(Value::Undefined);
            if let (Value::Undefined, Some(default)) = (&value, &param.default) {
                value = self.eval(default, &scope)?;
            }
            scope.declare(&param.name, value, BindingKind::Param)?;
        }
        match &closure.def.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => match self.exec_body(body, &scope)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
        }
    }

    fn callback(&self, args: &[Value], method: &str) -> ScriptResult<Value> {
        match args.first() {
            Some(f @ (Value::Function(_) | Value::Native(_))) => Ok(f.clone()),
            other => Err(ScriptError::Type(format!(
                "{} is not a function (in Array.{})",
                other.map(Value::to_display_string).unwrap_or_else(|| "undefined".into()),
                method
            ))),
        }
    }

    fn call_array_method(&self, method: ArrayMethod, target: &ArrayRef, args: Vec<Value>) -> ScriptResult<Value> {
        // Callbacks may mutate the array, so iterate over a snapshot
        let snapshot = || -> ScriptResult<Vec<Value>> {
            self.heap.charge_values(target.borrow().len())?;
            Ok(target.borrow().clone())
        };
        match method {
            ArrayMethod::Push => {
                self.heap.charge_values(args.len())?;
                let mut items = target.borrow_mut();
                items.extend(args);
                Ok(Value::Number(items.len() as f64))
            }
            ArrayMethod::Map | ArrayMethod::ForEach | ArrayMethod::Filter => {
                let name = match method {
                    ArrayMethod::Map => "map",
                    ArrayMethod::ForEach => "forEach",
                    _ => "filter",
                };
                let f = self.callback(&args, name)?;
                let mut out = Vec::new();
                for (i, item) in snapshot()?.into_iter().enumerate() {
                    let result = self.call_value(
                        &f,
                        vec![item.clone(), Value::Number(i as f64), Value::Array(target.clone())],
                        name,
                    )?;
                    match method {
                        ArrayMethod::Map => out.push(result),
                        ArrayMethod::Filter if result.truthy() => out.push(item),
                        _ => {}
                    }
                }
                if method == ArrayMethod::ForEach {
                    Ok(Value::Undefined)
                } else {
                    self.heap.array(out)
                }
            }
            ArrayMethod::Reduce => {
                let f = self.callback(&args, "reduce")?;
                let items = snapshot()?;
                let mut iter = items.into_iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first,
                        None => {
                            return Err(ScriptError::Type(
                                "Reduce of empty array with no initial value".into(),
                            ))
                        }
                    },
                };
                for (i, item) in iter {
                    acc = self.call_value(
                        &f,
                        vec![acc, item, Value::Number(i as f64), Value::Array(target.clone())],
                        "reduce",
                    )?;
                }
                Ok(acc)
            }
            ArrayMethod::Concat => {
                let extra: usize = args
                    .iter()
                    .map(|arg| match arg {
                        Value::Array(items) => items.borrow().len(),
                        _ => 1,
                    })
                    .sum();
                self.heap.charge_values(extra)?;
                let mut out = snapshot()?;
                for arg in args {
                    match arg {
                        Value::Array(items) => out.extend(items.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                }
                self.heap.array(out)
            }
            ArrayMethod::Slice => {
                let items = snapshot()?;
                let len = items.len() as f64;
                let bound = |value: Option<&Value>, default: f64| -> usize {
                    let n = match value {
                        None | Some(Value::Undefined) => default,
                        Some(v) => v.to_number(),
                    };
                    let n = if n.is_nan() { 0.0 } else { n.trunc() };
                    let n = if n < 0.0 { (len + n).max(0.0) } else { n.min(len) };
                    n as usize
                };
                let start = bound(args.first(), 0.0);
                let end = bound(args.get(1), len);
                self.heap.array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
            }
            ArrayMethod::Join => {
                let separator = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(v) => self.text(v, self.heap.remaining())?,
                };
                let joined = join_array(target, &separator, self.heap.remaining())
                    .map_err(|e| self.heap.text_error(e))?;
                self.heap.string(joined)
            }
        }
    }

    fn binary_op(&self, op: BinaryOperator, left: &Value, right: &Value) -> ScriptResult<Value> {
        use BinaryOperator::*;
        match op {
            StrictEq => return Ok(Value::Bool(left.strict_equals(right))),
            StrictNotEq => return Ok(Value::Bool(!left.strict_equals(right))),
            Eq => return Ok(Value::Bool(left.loose_equals(right))),
            NotEq => return Ok(Value::Bool(!left.loose_equals(right))),
            _ => {}
        }

        let symbol = match op {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Rem => "%",
            Pow => "**",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            _ => ">=",
        };
        let a = numeric_operand(left, symbol)?;
        let b = numeric_operand(right, symbol)?;

        if op == Add {
            let stringy = |v: &Value| matches!(v, Value::Str(_) | Value::Array(_) | Value::Object(_));
            if stringy(left) || stringy(right) {
                let room = self.heap.remaining();
                let mut s = self.text(left, room)?;
                let rest = self.text(right, room - s.len())?;
                s.push_str(&rest);
                return self.heap.string(s);
            }
        }

        if let (Value::Str(x), Value::Str(y)) = (left, right) {
            let ordering = x.cmp(y);
            let result = match op {
                Lt => ordering.is_lt(),
                Le => ordering.is_le(),
                Gt => ordering.is_gt(),
                Ge => ordering.is_ge(),
                _ => false,
            };
            if matches!(op, Lt | Le | Gt | Ge) {
                return Ok(Value::Bool(result));
            }
        }

        Ok(match op {
            Add => Value::Number(a + b),
            Sub => Value::Number(a - b),
            Mul => Value::Number(a * b),
            Div => Value::Number(a / b),
            Rem => Value::Number(a % b),
            Pow => Value::Number(a.powf(b)),
            Lt => Value::Bool(a < b),
            Le => Value::Bool(a <= b),
            Gt => Value::Bool(a > b),
            _ => Value::Bool(a >= b),
        })
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        // Closures and the scopes they capture can reference each other
        for scope in self.captured.borrow().iter() {
            scope.vars.borrow_mut().clear();
        }
        self.heap.release();
    }
}

fn opaque_error(value: &Value, property: &str) -> ScriptError {
    ScriptError::Type(format!(
        "Cannot access property '{}' of a {}; geometry values can only be passed to primitives",
        property,
        value.kind()
    ))
}

fn get_member(target: &Value, property: &str) -> ScriptResult<Value> {
    match target {
        Value::Undefined | Value::Null => Err(ScriptError::Type(format!(
            "Cannot read properties of {} (reading '{}')",
            target.kind(),
            property
        ))),
        Value::Solid(_) | Value::Profile(_) => Err(opaque_error(target, property)),
        Value::Array(items) => {
            if property == "length" {
                return Ok(Value::Number(items.borrow().len() as f64));
            }
            if let Some(method) = ArrayMethod::from_name(property) {
                return Ok(Value::Native(NativeFn::Array(method, items.clone())));
            }
            match property.parse::<usize>() {
                Ok(index) => Ok(items.borrow().get(index).cloned().unwrap_or(Value::Undefined)),
                Err(_) => Ok(Value::Undefined),
            }
        }
        Value::Str(s) => {
            if property == "length" {
                Ok(Value::Number(s.chars().count() as f64))
            } else {
                Ok(Value::Undefined)
            }
        }
        Value::Object(object) => Ok(object.borrow().get(property).cloned().unwrap_or(Value::Undefined)),
        _ => Ok(Value::Undefined),
    }
}

fn array_index(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => Some(*n as usize),
        _ => None,
    }
}

fn property_key(key: &Value) -> String {
    match key {
        Value::Number(n) => number_to_string(*n),
        Value::Str(s) => s.to_string(),
        other => other.to_display_string(),
    }
}

fn get_index(target: &Value, key: &Value) -> ScriptResult<Value> {
    match (target, array_index(key)) {
        (Value::Array(items), Some(index)) => {
            Ok(items.borrow().get(index).cloned().unwrap_or(Value::Undefined))
        }
        (Value::Str(s), Some(index)) => Ok(s
            .chars()
            .nth(index)
            .map(|c| Value::string(c.to_string()))
            .unwrap_or(Value::Undefined)),
        _ => get_member(target, &property_key(key)),
    }
}

fn place_for(object: &Value, key: Value) -> ScriptResult<Place> {
    match object {
        Value::Array(items) => match array_index(&key) {
            Some(index) => Ok(Place::Element(items.clone(), index)),
            None => Err(ScriptError::Type(format!(
                "Cannot assign to array property '{}'",
                property_key(&key)
            ))),
        },
        Value::Object(obj) => Ok(Place::Property(obj.clone(), property_key(&key))),
        Value::Undefined | Value::Null => Err(ScriptError::Type(format!(
            "Cannot set properties of {} (setting '{}')",
            object.kind(),
            property_key(&key)
        ))),
        Value::Solid(_) | Value::Profile(_) => Err(opaque_error(object, &property_key(&key))),
        other => Err(ScriptError::Type(format!(
            "Cannot create property '{}' on {}",
            property_key(&key),
            other.kind()
        ))),
    }
}

fn numeric_operand(value: &Value, symbol: &str) -> ScriptResult<f64> {
    if value.is_geometry() {
        return Err(ScriptError::Type(format!(
            "Cannot apply '{}' to a {}; combine solids with union, subtract or intersect",
            symbol,
            value.kind()
        )));
    }
    Ok(value.to_number())
}

/// Run a script against `kernel` with the given budget.
pub fn run_script(source: &str, kernel: Arc<dyn GeometryKernel>, limits: ScriptLimits) -> ScriptResult<Value> {
    Interpreter::new(kernel, limits).evaluate(source)
}
