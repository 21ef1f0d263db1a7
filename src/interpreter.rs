//=============================================
// src/interpreter.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript evaluator
// Objective: Tree-walk parsed programs with lexical scoping, control-flow
//            signals, builtin dispatch, and module/screen integration
//=============================================

//=============================================
//            Section 1: Imports
//=============================================

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::arrays::ArrayHandle;
use crate::ast::{
    ArraySpec, AssignTarget, BinaryOp, Expr, FunctionDecl, Program, ScreenDecl, Stmt,
    TypeAnnotation, UnaryOp,
};
use crate::builtins;
use crate::error::{ScriptError, ScriptResult};
use crate::maps::MapHandle;
use crate::modules::{ModuleResolver, SharedResolver};
use crate::records::RecordTypeDef;
use crate::scheduler::Scheduler;
use crate::screen::ScreenRegistry;
use crate::value::{DataType, Value};

//=============================================
//            Section 2: Shared Runtime State
//=============================================

/// Where `print` and error reports go. `Capture` lets tests and embedding
/// hosts collect output instead of writing to stdout.
#[derive(Clone)]
pub enum OutputSink {
    Stdout,
    Capture(Arc<Mutex<Vec<String>>>),
}

impl OutputSink {
    pub fn capture() -> (OutputSink, Arc<Mutex<Vec<String>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        (OutputSink::Capture(Arc::clone(&buffer)), buffer)
    }

    pub fn println(&self, text: &str) {
        match self {
            OutputSink::Stdout => println!("{}", text),
            OutputSink::Capture(buffer) => buffer.lock().push(text.to_string()),
        }
    }
}

/// State shared by every interpreter attached to one runtime: the function
/// table, type aliases, screen variables, and the output sink. All of it is
/// safe to touch from any evaluation thread.
pub struct RuntimeShared {
    pub functions: RwLock<HashMap<String, Arc<FunctionDecl>>>,
    pub aliases: RwLock<HashMap<String, TypeAnnotation>>,
    pub screens: ScreenRegistry,
    pub output: OutputSink,
}

impl RuntimeShared {
    pub fn new(output: OutputSink) -> Arc<Self> {
        Arc::new(Self {
            functions: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            screens: ScreenRegistry::new(),
            output,
        })
    }
}

//=============================================
//            Section 3: Environments
//=============================================

#[derive(Debug, Clone)]
struct Variable {
    value: Value,
    mutable: bool,
    declared: Option<TypeAnnotation>,
}

/// One lexical scope. Child scopes keep a reference to their parent for
/// lookup only; dropping a child never drops live parents used elsewhere.
#[derive(Debug)]
struct Scope {
    vars: HashMap<String, Variable>,
    parent: Option<Env>,
}

type Env = Rc<std::cell::RefCell<Scope>>;

fn new_scope(parent: Option<Env>) -> Env {
    Rc::new(std::cell::RefCell::new(Scope {
        vars: HashMap::new(),
        parent,
    }))
}

//=============================================
//            Section 4: Control-Flow Signals
//=============================================

/// Statement outcome, propagated upward until a loop absorbs Break/Continue
/// or a function call absorbs Return.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

//=============================================
//            Section 5: Interpreter
//=============================================

/// One evaluation context. Each screen thread (and each callback on the
/// render thread) gets its own interpreter; they share state only through
/// [`RuntimeShared`].
pub struct Interpreter {
    shared: Arc<RuntimeShared>,
    scheduler: Arc<Scheduler>,
    resolver: SharedResolver,
    globals: Env,
    env: Env,
    current_screen: Option<String>,
    import_dirs: Vec<PathBuf>,
    call_depth: usize,
    max_call_depth: usize,
}

impl Interpreter {
    pub fn new(
        shared: Arc<RuntimeShared>,
        scheduler: Arc<Scheduler>,
        resolver: SharedResolver,
    ) -> Self {
        let globals = new_scope(None);
        let max_call_depth = std::env::var("EMBER_MAX_CALL_DEPTH")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(200);
        Self {
            shared,
            scheduler,
            resolver,
            env: Rc::clone(&globals),
            globals,
            current_screen: None,
            import_dirs: Vec::new(),
            call_depth: 0,
            max_call_depth,
        }
    }

    pub fn shared(&self) -> &Arc<RuntimeShared> {
        &self.shared
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn resolver(&self) -> &SharedResolver {
        &self.resolver
    }

    pub fn output(&self) -> &OutputSink {
        &self.shared.output
    }

    pub fn current_screen(&self) -> Option<&str> {
        self.current_screen.as_deref()
    }

    pub fn set_current_screen(&mut self, screen: Option<String>) {
        self.current_screen = screen;
    }

    //=============================================
    //            Section 6: Program Execution
    //=============================================

    /// Execute a parsed unit. `origin` is the script's own path; it anchors
    /// relative imports and owns the unit's declarations in the
    /// duplicate-name registry.
    pub fn execute(
        &mut self,
        program: &Program,
        origin: Option<&Path>,
    ) -> ScriptResult<Option<Value>> {
        let owner = origin
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("<main>"));
        self.resolver
            .borrow_mut()
            .register_declarations(program, &owner)?;
        self.hoist_functions(program);

        let base_dir = origin.and_then(Path::parent).map(Path::to_path_buf);
        if let Some(dir) = base_dir {
            self.import_dirs.push(dir);
        } else {
            self.import_dirs.push(
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            );
        }
        let result = self.run_top_level(program);
        self.import_dirs.pop();
        result
    }

    fn run_top_level(&mut self, program: &Program) -> ScriptResult<Option<Value>> {
        for stmt in &program.statements {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                Flow::Return(value) => return Ok(Some(value)),
                Flow::Break | Flow::Continue => {
                    return Err(ScriptError::runtime(
                        stmt_line(stmt),
                        "break/continue outside of a loop",
                    ));
                }
            }
        }
        Ok(None)
    }

    fn hoist_functions(&mut self, program: &Program) {
        let mut functions = self.shared.functions.write();
        for decl in program.functions() {
            functions.insert(decl.name.clone(), Arc::clone(decl));
        }
    }

    /// Invoke a named function against the loaded unit, e.g. a callback.
    pub fn invoke(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
        self.call_function(&name.to_lowercase(), args, 0)
    }

    //=============================================
    //            Section 7: Statements
    //=============================================

    fn exec_block(&mut self, statements: &[Stmt]) -> ScriptResult<Flow> {
        let parent = Rc::clone(&self.env);
        self.env = new_scope(Some(Rc::clone(&parent)));
        let result = self.exec_statements(statements);
        self.env = parent;
        result
    }

    fn exec_statements(&mut self, statements: &[Stmt]) -> ScriptResult<Flow> {
        for stmt in statements {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> ScriptResult<Flow> {
        match stmt {
            Stmt::VarDecl {
                name,
                ty,
                init,
                mutable,
                line,
            } => {
                let raw = match init {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Null,
                };
                let value = match ty {
                    Some(annotation) => {
                        self.apply_annotation(raw, annotation, init.is_some(), *line)?
                    }
                    None => raw,
                };
                self.env.borrow_mut().vars.insert(
                    name.clone(),
                    Variable {
                        value,
                        mutable: *mutable,
                        declared: ty.clone(),
                    },
                );
                Ok(Flow::Normal)
            }

            Stmt::Assign { target, value, line } => {
                let value = self.eval_expr(value)?;
                self.assign(target, value, *line)?;
                Ok(Flow::Normal)
            }

            Stmt::Print { args, line: _ } => {
                let mut text = String::new();
                for arg in args {
                    text.push_str(&self.eval_expr(arg)?.to_string());
                }
                self.shared.output.println(&text);
                Ok(Flow::Normal)
            }

            Stmt::ExprStmt { expr, .. } => {
                self.eval_expr(expr)?;
                Ok(Flow::Normal)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval_expr(condition)?.is_truthy() {
                    self.exec_block(then_branch)
                } else if let Some(branch) = else_branch {
                    self.exec_block(branch)
                } else {
                    Ok(Flow::Normal)
                }
            }

            Stmt::While { condition, body, .. } => {
                while self.eval_expr(condition)?.is_truthy() {
                    match self.exec_block(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::DoWhile { body, condition, .. } => {
                loop {
                    match self.exec_block(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                    if !self.eval_expr(condition)?.is_truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::For {
                init,
                condition,
                update,
                body,
                ..
            } => {
                let parent = Rc::clone(&self.env);
                self.env = new_scope(Some(Rc::clone(&parent)));
                let result = (|| {
                    self.exec_stmt(init)?;
                    loop {
                        if !self.eval_expr(condition)?.is_truthy() {
                            return Ok(Flow::Normal);
                        }
                        match self.exec_block(body)? {
                            Flow::Normal | Flow::Continue => {}
                            Flow::Break => return Ok(Flow::Normal),
                            ret @ Flow::Return(_) => return Ok(ret),
                        }
                        self.exec_stmt(update)?;
                    }
                })();
                self.env = parent;
                result
            }

            Stmt::Foreach {
                variable,
                iterable,
                body,
                line,
            } => self.exec_foreach(variable, iterable, body, *line),

            Stmt::FunctionDecl { decl } => {
                // Top-level declarations were hoisted; re-registering here
                // keeps late declarations inside imported units callable.
                self.shared
                    .functions
                    .write()
                    .insert(decl.name.clone(), Arc::clone(decl));
                Ok(Flow::Normal)
            }

            Stmt::ScreenDecl { decl } => {
                self.exec_screen_decl(decl)?;
                Ok(Flow::Normal)
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }

            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),

            Stmt::Import { path, line } => {
                self.exec_import(path, *line)?;
                Ok(Flow::Normal)
            }

            Stmt::Typedef { name, ty, line: _ } => {
                self.shared
                    .aliases
                    .write()
                    .insert(name.to_lowercase(), ty.clone());
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_foreach(
        &mut self,
        variable: &str,
        iterable: &Expr,
        body: &[Stmt],
        line: usize,
    ) -> ScriptResult<Flow> {
        let subject = self.eval_expr(iterable)?;
        match subject {
            Value::Array(handle) => {
                let mut index: i64 = 0;
                // Length is re-read every pass so dynamic growth during the
                // loop is observed, like live iteration over the storage.
                while (index as usize) < handle.len() {
                    let item = handle.get(index, line)?;
                    match self.run_loop_body(variable, item, body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                    index += 1;
                }
                Ok(Flow::Normal)
            }
            Value::Map(handle) => {
                for key in handle.keys() {
                    match self.run_loop_body(variable, Value::Str(key), body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Value::Str(text) => {
                for c in text.chars() {
                    match self.run_loop_body(variable, Value::Str(c.to_string()), body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            other => Err(ScriptError::runtime(
                line,
                format!("Value of type '{}' is not iterable", other.type_name()),
            )),
        }
    }

    fn run_loop_body(
        &mut self,
        variable: &str,
        item: Value,
        body: &[Stmt],
    ) -> ScriptResult<Flow> {
        let parent = Rc::clone(&self.env);
        self.env = new_scope(Some(Rc::clone(&parent)));
        self.env.borrow_mut().vars.insert(
            variable.to_string(),
            Variable {
                value: item,
                mutable: true,
                declared: None,
            },
        );
        let result = self.exec_statements(body);
        self.env = parent;
        result
    }

    fn exec_screen_decl(&mut self, decl: &ScreenDecl) -> ScriptResult<()> {
        self.shared.screens.declare(&decl.name);
        for var in &decl.vars {
            let raw = match &var.init {
                Some(expr) => self.eval_expr(expr)?,
                None => Value::Null,
            };
            let value = match &var.ty {
                Some(annotation) => {
                    self.apply_annotation(raw, annotation, var.init.is_some(), var.line)?
                }
                None => raw,
            };
            self.shared.screens.set_var(&decl.name, &var.name, value);
        }
        Ok(())
    }

    //=============================================
    //            Section 8: Imports
    //=============================================

    fn exec_import(&mut self, literal: &str, line: usize) -> ScriptResult<()> {
        let base = self.import_dirs.last().cloned();
        let normalized = ModuleResolver::normalize(literal, base.as_deref());
        debug!("import '{}' -> {}", literal, normalized.display());

        // Cycle check comes before any cache access; the guard pops the
        // import stack on every exit path.
        let _guard = ModuleResolver::begin_import(&self.resolver, &normalized)?;

        let cached = self.resolver.borrow().cached(&normalized);
        let program = match cached {
            Some(program) => program,
            None => {
                let source = fs::read_to_string(&normalized).map_err(|err| {
                    ScriptError::runtime(
                        line,
                        format!("Failed to read import '{}': {}", normalized.display(), err),
                    )
                })?;
                let program = Arc::new(crate::parse(&source)?);
                self.resolver
                    .borrow_mut()
                    .insert(normalized.clone(), Arc::clone(&program));
                self.resolver
                    .borrow_mut()
                    .register_declarations(&program, &normalized)?;
                program
            }
        };

        self.hoist_functions(&program);

        // A unit's top-level statements run once per root execution; later
        // imports reuse the registered declarations.
        if !self.resolver.borrow_mut().mark_executed(&normalized) {
            return Ok(());
        }

        let dir = normalized
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.import_dirs.push(dir);
        let result = self.run_imported_unit(&program);
        self.import_dirs.pop();
        result
    }

    fn run_imported_unit(&mut self, program: &Program) -> ScriptResult<()> {
        for stmt in &program.statements {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                Flow::Return(_) => break,
                Flow::Break | Flow::Continue => {
                    return Err(ScriptError::runtime(
                        stmt_line(stmt),
                        "break/continue outside of a loop",
                    ));
                }
            }
        }
        Ok(())
    }

    //=============================================
    //            Section 9: Declarations & Types
    //=============================================

    fn resolve_annotation(
        &self,
        annotation: &TypeAnnotation,
        line: usize,
    ) -> ScriptResult<TypeAnnotation> {
        match annotation {
            TypeAnnotation::Named(name) => {
                let aliases = self.shared.aliases.read();
                match aliases.get(&name.to_lowercase()) {
                    Some(resolved) => Ok(resolved.clone()),
                    None => Err(ScriptError::runtime(
                        line,
                        format!("Unknown type '{}'", name),
                    )),
                }
            }
            other => Ok(other.clone()),
        }
    }

    /// Fit a freshly evaluated value to a declared type: scalars coerce,
    /// arrays take their declared shape, maps adopt the declared ordering
    /// discipline, record values validate against the record type.
    fn apply_annotation(
        &mut self,
        value: Value,
        annotation: &TypeAnnotation,
        had_init: bool,
        line: usize,
    ) -> ScriptResult<Value> {
        let annotation = self.resolve_annotation(annotation, line)?;
        match &annotation {
            TypeAnnotation::Scalar(dt) => {
                if !had_init {
                    return Ok(Value::Null);
                }
                if value.is_container() {
                    return Err(ScriptError::type_conversion(
                        line,
                        format!("Cannot store {} in a {} variable", value.type_name(), dt.name()),
                    ));
                }
                dt.coerce(value, line)
            }
            TypeAnnotation::Array(spec) => self.fit_array(value, spec, had_init, line),
            TypeAnnotation::Map { sorted } => match value {
                Value::Null => Ok(Value::Map(MapHandle::new(*sorted))),
                Value::Map(handle) => {
                    if handle.is_sorted() == *sorted {
                        Ok(Value::Map(handle))
                    } else if *sorted {
                        Ok(Value::Map(handle.to_sorted()))
                    } else {
                        Ok(Value::Map(handle.to_unsorted()))
                    }
                }
                other => Err(ScriptError::type_conversion(
                    line,
                    format!("Cannot use {} as a map", other.type_name()),
                )),
            },
            TypeAnnotation::Record(def) => match value {
                Value::Null => Ok(Value::Null),
                Value::Record(handle) => Ok(Value::Record(handle)),
                Value::Map(handle) => {
                    let record = RecordTypeDef::construct(def, handle.entries(), line)?;
                    Ok(Value::Record(record))
                }
                other => Err(ScriptError::type_conversion(
                    line,
                    format!("Cannot use {} as a record", other.type_name()),
                )),
            },
            TypeAnnotation::Named(_) => unreachable!("aliases resolve above"),
        }
    }

    fn fit_array(
        &mut self,
        value: Value,
        spec: &ArraySpec,
        had_init: bool,
        line: usize,
    ) -> ScriptResult<Value> {
        match value {
            Value::Null if !had_init => Ok(Value::Array(ArrayHandle::from_spec(spec, line)?)),
            Value::Array(source) => {
                if spec.dims.is_empty() {
                    if source.elem_type() == DataType::Any && spec.elem != DataType::Any {
                        // A literal arrives as an untyped dynamic array;
                        // rebuild it with the declared element type so the
                        // coercion rules apply from the start.
                        let target = ArrayHandle::from_values(spec.elem, Vec::new());
                        for value in source.snapshot() {
                            target.push(value, line)?;
                        }
                        return Ok(Value::Array(target));
                    }
                    // Adopting an existing array keeps the shared reference.
                    Ok(Value::Array(source))
                } else {
                    let target = ArrayHandle::from_spec(spec, line)?;
                    let len = source.len();
                    for i in 0..len {
                        target.set(i as i64, source.get(i as i64, line)?, line)?;
                    }
                    Ok(Value::Array(target))
                }
            }
            other => Err(ScriptError::type_conversion(
                line,
                format!("Cannot use {} as an array", other.type_name()),
            )),
        }
    }

    //=============================================
    //            Section 10: Assignment & Lookup
    //=============================================

    fn assign(&mut self, target: &AssignTarget, value: Value, line: usize) -> ScriptResult<()> {
        match target {
            AssignTarget::Variable(name) => self.assign_variable(name, value, line),
            AssignTarget::Index { target, index } => {
                let container = self.eval_expr(target)?;
                let index = self.eval_expr(index)?;
                match container {
                    Value::Array(handle) => {
                        let idx = expect_index(&index, line)?;
                        handle.set(idx, value, line)
                    }
                    Value::Map(handle) => {
                        let key = index.to_string();
                        handle.set(key, value);
                        Ok(())
                    }
                    Value::Record(handle) => match &index {
                        Value::Str(field) => handle.set(field, value, line),
                        other => Err(ScriptError::runtime(
                            line,
                            format!("Record index must be a field name, got {}", other.type_name()),
                        )),
                    },
                    other => Err(ScriptError::runtime(
                        line,
                        format!("Cannot index-assign into {}", other.type_name()),
                    )),
                }
            }
            AssignTarget::Member { target, field } => {
                let container = self.eval_expr(target)?;
                match container {
                    Value::Record(handle) => handle.set(field, value, line),
                    Value::Map(handle) => {
                        handle.set(field.clone(), value);
                        Ok(())
                    }
                    other => Err(ScriptError::runtime(
                        line,
                        format!("Cannot assign to member of {}", other.type_name()),
                    )),
                }
            }
        }
    }

    fn assign_variable(&mut self, name: &str, value: Value, line: usize) -> ScriptResult<()> {
        let mut scope = Some(Rc::clone(&self.env));
        while let Some(env) = scope {
            let mut borrowed = env.borrow_mut();
            if let Some(variable) = borrowed.vars.get(name) {
                if !variable.mutable {
                    return Err(ScriptError::runtime(
                        line,
                        format!("Cannot assign to constant '{}'", name),
                    ));
                }
                let declared = variable.declared.clone();
                drop(borrowed);
                let fitted = match &declared {
                    Some(annotation) => self.apply_annotation(value, annotation, true, line)?,
                    None => value,
                };
                env.borrow_mut()
                    .vars
                    .get_mut(name)
                    .expect("variable present")
                    .value = fitted;
                return Ok(());
            }
            scope = borrowed.parent.clone();
        }
        Err(ScriptError::runtime(
            line,
            format!("Variable '{}' not found", name),
        ))
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = Some(Rc::clone(&self.env));
        while let Some(env) = scope {
            let borrowed = env.borrow();
            if let Some(variable) = borrowed.vars.get(name) {
                return Some(variable.value.clone());
            }
            scope = borrowed.parent.clone();
        }
        None
    }

    //=============================================
    //            Section 11: Expressions
    //=============================================

    pub fn eval_expr(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Literal { value, .. } => Ok(Value::from(value)),

            Expr::Variable { name, line } => self.lookup(name).ok_or_else(|| {
                ScriptError::runtime(*line, format!("Variable '{}' not found", name))
            }),

            Expr::Binary {
                op, left, right, line,
            } => match op {
                // Logical operators short-circuit.
                BinaryOp::And => {
                    let l = self.eval_expr(left)?;
                    if !l.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    let r = self.eval_expr(right)?;
                    Ok(Value::Bool(r.is_truthy()))
                }
                BinaryOp::Or => {
                    let l = self.eval_expr(left)?;
                    if l.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    let r = self.eval_expr(right)?;
                    Ok(Value::Bool(r.is_truthy()))
                }
                _ => {
                    let l = self.eval_expr(left)?;
                    let r = self.eval_expr(right)?;
                    eval_binary(*op, l, r, *line)
                }
            },

            Expr::Unary { op, operand, line } => {
                let value = self.eval_expr(operand)?;
                match (op, value) {
                    (UnaryOp::Negate, Value::Int(n)) => Ok(Value::Int(-n)),
                    (UnaryOp::Negate, Value::Long(n)) => Ok(Value::Long(-n)),
                    (UnaryOp::Negate, Value::Float(n)) => Ok(Value::Float(-n)),
                    (UnaryOp::Negate, Value::Double(n)) => Ok(Value::Double(-n)),
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Negate, other) => Err(ScriptError::runtime(
                        *line,
                        format!("Cannot negate {}", other.type_name()),
                    )),
                }
            }

            Expr::Call { name, args, line } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg)?);
                }
                self.call_function(name, values, *line)
            }

            Expr::Index { target, index, line } => {
                let container = self.eval_expr(target)?;
                let index = self.eval_expr(index)?;
                self.eval_index(container, index, *line)
            }

            Expr::Member { target, field, line } => {
                let subject = self.eval_expr(target)?;
                self.eval_member(subject, field, *line)
            }

            Expr::ArrayLiteral { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element)?);
                }
                Ok(Value::Array(ArrayHandle::from_values(DataType::Any, values)))
            }

            Expr::MapLiteral { entries, .. } => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, expr) in entries {
                    values.push((key.clone(), self.eval_expr(expr)?));
                }
                Ok(Value::Map(MapHandle::from_entries(values, false)))
            }
        }
    }

    fn eval_index(&mut self, container: Value, index: Value, line: usize) -> ScriptResult<Value> {
        match container {
            Value::Array(handle) => {
                let idx = expect_index(&index, line)?;
                handle.get(idx, line)
            }
            Value::Map(handle) => Ok(handle.get(&index.to_string()).unwrap_or(Value::Null)),
            Value::Record(handle) => match &index {
                Value::Str(field) => handle.get(field).ok_or_else(|| {
                    ScriptError::runtime(line, format!("Record has no field '{}'", field))
                }),
                other => Err(ScriptError::runtime(
                    line,
                    format!("Record index must be a field name, got {}", other.type_name()),
                )),
            },
            Value::Str(text) => {
                let idx = expect_index(&index, line)?;
                let chars: Vec<char> = text.chars().collect();
                if idx < 0 || idx as usize >= chars.len() {
                    return Err(ScriptError::ArrayIndex {
                        line,
                        index: idx,
                        length: chars.len(),
                    });
                }
                Ok(Value::Str(chars[idx as usize].to_string()))
            }
            other => Err(ScriptError::runtime(
                line,
                format!("Cannot index {}", other.type_name()),
            )),
        }
    }

    fn eval_member(&mut self, subject: Value, field: &str, line: usize) -> ScriptResult<Value> {
        match (&subject, field) {
            (Value::Array(handle), "length" | "size") => Ok(Value::Int(handle.len() as i32)),
            (Value::Map(handle), "length" | "size") => Ok(Value::Int(handle.len() as i32)),
            (Value::Str(s), "length" | "size") => Ok(Value::Int(s.chars().count() as i32)),
            (Value::Map(handle), _) => Ok(handle.get(field).unwrap_or(Value::Null)),
            (Value::Record(handle), _) => handle.get(field).ok_or_else(|| {
                ScriptError::runtime(line, format!("Record has no field '{}'", field))
            }),
            (other, _) => Err(ScriptError::runtime(
                line,
                format!("Cannot access '{}' on {}", field, other.type_name()),
            )),
        }
    }

    //=============================================
    //            Section 12: Calls & Dispatch
    //=============================================

    /// Resolve a call by (possibly dotted) name. A registered builtin
    /// namespace wins; an unregistered namespace falls through so the same
    /// syntax serves qualified-looking user functions.
    pub fn call_function(
        &mut self,
        name: &str,
        args: Vec<Value>,
        line: usize,
    ) -> ScriptResult<Value> {
        if let Some((namespace, function)) = name.split_once('.') {
            if builtins::namespace_registered(namespace) {
                return builtins::dispatch(self, namespace, function, line, &args);
            }
        }

        let decl = self.shared.functions.read().get(name).cloned();
        if let Some(decl) = decl {
            return self.call_user_function(&decl, args, line);
        }

        // A variable bound to a function reference is callable by its name.
        if let Some(Value::FunctionRef(target)) = self.lookup(name) {
            let decl = self.shared.functions.read().get(&target).cloned();
            if let Some(decl) = decl {
                return self.call_user_function(&decl, args, line);
            }
        }

        Err(ScriptError::UndefinedFunction {
            line,
            name: name.to_string(),
        })
    }

    fn call_user_function(
        &mut self,
        decl: &FunctionDecl,
        args: Vec<Value>,
        line: usize,
    ) -> ScriptResult<Value> {
        if args.len() != decl.params.len() {
            return Err(ScriptError::runtime(
                line,
                format!(
                    "Function '{}' expects {} arguments, got {}",
                    decl.name,
                    decl.params.len(),
                    args.len()
                ),
            ));
        }
        if self.call_depth >= self.max_call_depth {
            return Err(ScriptError::runtime(line, "Call depth limit exceeded"));
        }

        // Fresh scope chained to the definition scope, never the caller's:
        // lexical, not dynamic, scoping.
        let caller_env = Rc::clone(&self.env);
        self.env = new_scope(Some(Rc::clone(&self.globals)));
        self.call_depth += 1;

        let bind = || -> ScriptResult<Flow> {
            for (param, arg) in decl.params.iter().zip(args.into_iter()) {
                let value = match &param.ty {
                    Some(annotation) => self.apply_annotation(arg, annotation, true, decl.line)?,
                    None => arg,
                };
                self.env.borrow_mut().vars.insert(
                    param.name.clone(),
                    Variable {
                        value,
                        mutable: true,
                        declared: param.ty.clone(),
                    },
                );
            }
            self.exec_statements(&decl.body)
        };
        let result = bind();

        self.call_depth -= 1;
        self.env = caller_env;

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Break | Flow::Continue => Err(ScriptError::runtime(
                decl.line,
                "break/continue outside of a loop",
            )),
            Flow::Normal => Ok(Value::Null),
        }
    }
}

//=============================================
//            Section 13: Arithmetic
//=============================================

fn expect_index(value: &Value, line: usize) -> ScriptResult<i64> {
    match value {
        Value::Int(n) => Ok(*n as i64),
        Value::Long(n) => Ok(*n),
        other => Err(ScriptError::runtime(
            line,
            format!("Index must be an integer, got {}", other.type_name()),
        )),
    }
}

/// Numeric promotion lattice for mixed-width operands.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NumericWidth {
    Int,
    Long,
    Float,
    Double,
}

fn width_of(value: &Value) -> Option<NumericWidth> {
    match value {
        Value::Int(_) => Some(NumericWidth::Int),
        Value::Long(_) => Some(NumericWidth::Long),
        Value::Float(_) => Some(NumericWidth::Float),
        Value::Double(_) => Some(NumericWidth::Double),
        _ => None,
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value, line: usize) -> ScriptResult<Value> {
    use BinaryOp::*;
    match op {
        Equal => return Ok(Value::Bool(left.loose_equals(&right))),
        NotEqual => return Ok(Value::Bool(!left.loose_equals(&right))),
        Less | LessEqual | Greater | GreaterEqual => {
            let ordering = left.compare(&right).ok_or_else(|| {
                ScriptError::runtime(
                    line,
                    format!(
                        "Cannot compare {} with {}",
                        left.type_name(),
                        right.type_name()
                    ),
                )
            })?;
            let result = match op {
                Less => ordering.is_lt(),
                LessEqual => ordering.is_le(),
                Greater => ordering.is_gt(),
                GreaterEqual => ordering.is_ge(),
                _ => unreachable!(),
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    // `+` with a string operand concatenates; dates and every other value
    // stringify on the way in.
    if op == Add {
        if let (Value::Str(l), r) = (&left, &right) {
            return Ok(Value::Str(format!("{}{}", l, r)));
        }
        if let (l, Value::Str(r)) = (&left, &right) {
            return Ok(Value::Str(format!("{}{}", l, r)));
        }
    }

    let (lw, rw) = match (width_of(&left), width_of(&right)) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            return Err(ScriptError::runtime(
                line,
                format!(
                    "Operands must be numbers for '{:?}', got {} and {}",
                    op,
                    left.type_name(),
                    right.type_name()
                ),
            ));
        }
    };
    let width = lw.max(rw);

    if op == Power {
        let l = left.as_f64().unwrap();
        let r = right.as_f64().unwrap();
        return Ok(Value::Double(l.powf(r)));
    }

    let zero_divisor = matches!(op, Divide | Modulo) && right.as_f64() == Some(0.0);
    if zero_divisor {
        return match op {
            Modulo => Err(ScriptError::ModuloByZero { line }),
            _ => Err(ScriptError::runtime(line, "Division by zero")),
        };
    }

    macro_rules! arith {
        ($lhs:expr, $rhs:expr, $wrap:path) => {{
            let a = $lhs;
            let b = $rhs;
            match op {
                Add => $wrap(a + b),
                Subtract => $wrap(a - b),
                Multiply => $wrap(a * b),
                Divide => $wrap(a / b),
                // Remainder after truncating division: sign follows the
                // dividend, for floats as well as integers.
                Modulo => $wrap(a % b),
                _ => unreachable!(),
            }
        }};
    }

    let result = match width {
        NumericWidth::Int => {
            let a = match &left {
                Value::Int(n) => *n,
                _ => unreachable!(),
            };
            let b = match &right {
                Value::Int(n) => *n,
                _ => unreachable!(),
            };
            match op {
                Add => Value::Int(a.wrapping_add(b)),
                Subtract => Value::Int(a.wrapping_sub(b)),
                Multiply => Value::Int(a.wrapping_mul(b)),
                Divide => Value::Int(a.wrapping_div(b)),
                Modulo => Value::Int(a.wrapping_rem(b)),
                _ => unreachable!(),
            }
        }
        NumericWidth::Long => {
            let a = as_long(&left);
            let b = as_long(&right);
            match op {
                Add => Value::Long(a.wrapping_add(b)),
                Subtract => Value::Long(a.wrapping_sub(b)),
                Multiply => Value::Long(a.wrapping_mul(b)),
                Divide => Value::Long(a.wrapping_div(b)),
                Modulo => Value::Long(a.wrapping_rem(b)),
                _ => unreachable!(),
            }
        }
        NumericWidth::Float => arith!(as_float(&left), as_float(&right), Value::Float),
        NumericWidth::Double => arith!(
            left.as_f64().unwrap(),
            right.as_f64().unwrap(),
            Value::Double
        ),
    };
    Ok(result)
}

fn as_long(value: &Value) -> i64 {
    match value {
        Value::Int(n) => *n as i64,
        Value::Long(n) => *n,
        _ => unreachable!(),
    }
}

fn as_float(value: &Value) -> f32 {
    match value {
        Value::Int(n) => *n as f32,
        Value::Long(n) => *n as f32,
        Value::Float(n) => *n,
        _ => unreachable!(),
    }
}

fn stmt_line(stmt: &Stmt) -> usize {
    match stmt {
        Stmt::VarDecl { line, .. }
        | Stmt::Assign { line, .. }
        | Stmt::Print { line, .. }
        | Stmt::ExprStmt { line, .. }
        | Stmt::If { line, .. }
        | Stmt::While { line, .. }
        | Stmt::DoWhile { line, .. }
        | Stmt::For { line, .. }
        | Stmt::Foreach { line, .. }
        | Stmt::Return { line, .. }
        | Stmt::Break { line }
        | Stmt::Continue { line }
        | Stmt::Import { line, .. }
        | Stmt::Typedef { line, .. } => *line,
        Stmt::FunctionDecl { decl } => decl.line,
        Stmt::ScreenDecl { decl } => decl.line,
    }
}

//=============================================
//            Section 14: Tests
//=============================================
