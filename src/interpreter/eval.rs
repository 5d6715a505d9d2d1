//! Tree-walking evaluator.
//!
//! Statement and expression evaluation are async so a `~ATH` wait can
//! suspend the current task arbitrarily deep inside rite calls; everything
//! between wait points runs to completion synchronously. The interpreter is
//! a cheap-to-clone handle over shared state, because bifurcated branches
//! and entity lifecycles run as sibling scheduler tasks over the same
//! entity table, branch set, and global scope.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::error::{AthError, Result, Span};
use crate::runtime::entity::{
    composite_lifecycle, resource_lifecycle, CompositeOp, Entity, EntityKind, Reaper,
};
use crate::runtime::host::{Host, HostFuture};
use crate::runtime::scheduler::{yield_now, SchedHandle, Scheduler, Task};
use crate::syntax::{
    ast::{DieTarget, EntityClass, EntityExpr, ImportArgs},
    parse_source, BinaryOp, Expr, Literal, Program, Stmt, UnaryOp,
};

use super::builtins;
use super::control::{EvalResult, ExecResult, Flow};
use super::scope::{AssignError, Scope, ScopeRef};
use super::value::{UserRite, Value};

type LocalFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

struct State {
    host: Rc<dyn Host>,
    globals: ScopeRef,
    entities: RefCell<HashMap<String, Rc<Entity>>>,
    branch_names: RefCell<HashSet<String>>,
    sched: SchedHandle,
    reaper: Reaper,
    /// Paths of `.~ATH` modules currently being loaded, outermost first.
    import_stack: Vec<String>,
}

/// The !~ATH interpreter.
#[derive(Clone)]
pub struct Interpreter {
    state: Rc<State>,
}

impl Interpreter {
    /// Create an interpreter over the given host adapter.
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self {
            state: Rc::new(State {
                host,
                globals: Scope::root(),
                entities: RefCell::new(HashMap::new()),
                branch_names: RefCell::new(HashSet::new()),
                sched: SchedHandle::new(),
                reaper: Reaper::new(),
                import_stack: Vec::new(),
            }),
        }
    }

    /// Child interpreter for a module load: shares the host, scheduler, and
    /// reap queue, but gets a fresh global scope and entity table.
    fn module_child(&self, path: &str) -> Self {
        let mut import_stack = self.state.import_stack.clone();
        import_stack.push(path.to_string());
        Self {
            state: Rc::new(State {
                host: Rc::clone(&self.state.host),
                globals: Scope::root(),
                entities: RefCell::new(HashMap::new()),
                branch_names: RefCell::new(HashSet::new()),
                sched: self.state.sched.clone(),
                reaper: self.state.reaper.clone(),
                import_stack,
            }),
        }
    }

    /// Execute a program to completion: run the top-level statement stream,
    /// release every entity once it is exhausted, then drain all pending
    /// tasks. Fails if any uncaught error escaped the main task or a branch.
    pub fn run(&self, program: &Program) -> Result<()> {
        self.install_this();
        let mut scheduler = Scheduler::new(self.state.sched.clone(), self.state.reaper.clone());

        let interp = self.clone();
        let statements = program.statements.clone();
        let main = Task::new("main", async move {
            let scope = interp.state.globals.clone();
            for stmt in &statements {
                if let Err(flow) = interp.exec_stmt(stmt, &scope).await {
                    return Err(flow.into_error(stmt.span()));
                }
            }
            if interp.this_is_alive() {
                tracing::warn!("program ended without THIS.DIE()");
            }
            Ok(())
        });

        scheduler.run(&*self.state.host, main, || self.release_entities())
    }

    fn install_this(&self) -> Rc<Entity> {
        let this = Entity::new("THIS", EntityKind::This, self.state.reaper.clone());
        self.state
            .entities
            .borrow_mut()
            .insert("THIS".to_string(), Rc::clone(&this));
        this
    }

    fn this_is_alive(&self) -> bool {
        self.state
            .entities
            .borrow()
            .get("THIS")
            .is_some_and(|e| e.is_alive())
    }

    /// `die()` every entity in the table so host resources are released and
    /// their waiters unblock during the final drain.
    fn release_entities(&self) {
        for entity in self.state.entities.borrow().values() {
            entity.die();
        }
    }

    fn entity(&self, name: &str) -> Option<Rc<Entity>> {
        self.state.entities.borrow().get(name).cloned()
    }

    // ============ Statements ============

    fn exec_stmt<'a>(&'a self, stmt: &'a Stmt, scope: &'a ScopeRef) -> LocalFuture<'a, ExecResult> {
        Box::pin(async move {
            match stmt {
                Stmt::Import { class, name, args, span } => {
                    self.exec_import(*class, name, args, *span, scope).await
                }
                Stmt::Bifurcate { entity, left, right, span } => {
                    self.exec_bifurcate(entity, left, right, *span)
                }
                Stmt::AthLoop { condition, body, execute, span } => {
                    self.exec_ath_loop(condition, body, execute, *span, scope).await
                }
                Stmt::Die { target, .. } => self.kill_target(target),
                Stmt::VarDecl { name, value, .. } => {
                    let value = self.eval_expr(value, scope).await?;
                    scope.borrow_mut().define(name.clone(), value, false);
                    Ok(())
                }
                Stmt::ConstDecl { name, value, .. } => {
                    let value = self.eval_expr(value, scope).await?;
                    scope.borrow_mut().define(name.clone(), value, true);
                    Ok(())
                }
                Stmt::Assign { target, value, .. } => self.exec_assign(target, value, scope).await,
                Stmt::RiteDef { name, params, body, .. } => {
                    let rite = UserRite {
                        name: name.clone(),
                        params: params.clone(),
                        body: Rc::new(body.clone()),
                        closure: Rc::clone(scope),
                    };
                    scope
                        .borrow_mut()
                        .define(name.clone(), Value::Rite(Rc::new(rite)), true);
                    Ok(())
                }
                Stmt::Conditional { condition, then_branch, else_branch, .. } => {
                    let condition = self.eval_expr(condition, scope).await?;
                    if condition.is_truthy() {
                        self.exec_block(then_branch, scope).await
                    } else if let Some(else_branch) = else_branch {
                        self.exec_block(else_branch, scope).await
                    } else {
                        Ok(())
                    }
                }
                Stmt::Attempt { body, error_name, salvage, .. } => {
                    match self.exec_block(body, scope).await {
                        Ok(()) => Ok(()),
                        // BEQUEATH is control flow, not an error.
                        Err(Flow::Bequeath(value)) => Err(Flow::Bequeath(value)),
                        Err(Flow::Error(err)) => {
                            let salvage_scope = Scope::child(scope);
                            salvage_scope.borrow_mut().define(
                                error_name.clone(),
                                Value::Str(err.message),
                                false,
                            );
                            self.exec_block(salvage, &salvage_scope).await
                        }
                    }
                }
                Stmt::Condemn { message, span } => {
                    let message = self.eval_expr(message, scope).await?.stringify();
                    Err(Flow::Error(AthError::condemn(message, *span)))
                }
                Stmt::Bequeath { value, .. } => {
                    let value = match value {
                        Some(expr) => self.eval_expr(expr, scope).await?,
                        None => Value::Void,
                    };
                    Err(Flow::Bequeath(value))
                }
                Stmt::Expr { expr, .. } => {
                    self.eval_expr(expr, scope).await?;
                    Ok(())
                }
            }
        })
    }

    async fn exec_block(&self, statements: &[Stmt], scope: &ScopeRef) -> ExecResult {
        for stmt in statements {
            self.exec_stmt(stmt, scope).await?;
        }
        Ok(())
    }

    async fn exec_import(
        &self,
        class: EntityClass,
        name: &str,
        args: &ImportArgs,
        span: Span,
        scope: &ScopeRef,
    ) -> ExecResult {
        // Re-importing a name kills the predecessor before the replacement
        // is constructed.
        if let Some(old) = self.entity(name) {
            old.die();
        }

        let entity = match (class, args) {
            (EntityClass::Timer, ImportArgs::Duration(duration)) => {
                let ms = duration.millis();
                if ms < 1 {
                    return Err(Flow::constraint(
                        format!("Timer duration must be at least 1ms (got {}ms)", ms),
                        duration.span,
                    ));
                }
                let entity = Entity::new(name, EntityKind::Timer { duration_ms: ms }, self.reaper());
                self.spawn_resource(&entity, self.state.host.spawn_timer(ms));
                entity
            }
            (EntityClass::Process, ImportArgs::Exprs(exprs)) => {
                let mut argv = Vec::new();
                for expr in exprs {
                    argv.push(self.eval_expr(expr, scope).await?.stringify());
                }
                if argv.is_empty() {
                    return Err(Flow::constraint("Process requires at least a command", span));
                }
                let resource = self
                    .state
                    .host
                    .spawn_process(&argv)
                    .map_err(|err| Flow::Error(err.into_ath().with_span(span)))?;
                let entity = Entity::new(name, EntityKind::Process { argv }, self.reaper());
                self.spawn_resource(&entity, resource);
                entity
            }
            (EntityClass::Connection, ImportArgs::Exprs(exprs)) => {
                if exprs.len() != 2 {
                    return Err(Flow::constraint("Connection requires host and port", span));
                }
                let host = self.eval_expr(&exprs[0], scope).await?;
                let port = self.eval_expr(&exprs[1], scope).await?;
                let Value::Str(host) = host else {
                    return Err(Flow::type_error("Connection host must be a string", span));
                };
                let Value::Integer(port) = port else {
                    return Err(Flow::type_error("Connection port must be an integer", span));
                };
                let resource = self
                    .state
                    .host
                    .open_connection(&host, port)
                    .map_err(|err| Flow::Error(err.into_ath().with_span(span)))?;
                let entity = Entity::new(name, EntityKind::Connection { host, port }, self.reaper());
                self.spawn_resource(&entity, resource);
                entity
            }
            (EntityClass::Watcher, ImportArgs::Exprs(exprs)) => {
                if exprs.len() != 1 {
                    return Err(Flow::constraint("Watcher requires a filepath", span));
                }
                let path = self.eval_expr(&exprs[0], scope).await?;
                let Value::Str(path) = path else {
                    return Err(Flow::type_error("Watcher filepath must be a string", span));
                };
                let entity = Entity::new(
                    name,
                    EntityKind::Watcher { path: path.clone() },
                    self.reaper(),
                );
                // A watcher on a `.~ATH` file additionally loads it as a
                // module; the entity still watches its path.
                if path.ends_with(".~ATH") {
                    self.load_module(&entity, &path, span).await?;
                }
                let resource = self
                    .state
                    .host
                    .watch_path(&path)
                    .map_err(|err| Flow::Error(err.into_ath().with_span(span)))?;
                self.spawn_resource(&entity, resource);
                entity
            }
            _ => unreachable!("parser pairs each import class with its argument shape"),
        };

        self.state
            .entities
            .borrow_mut()
            .insert(name.to_string(), entity);
        Ok(())
    }

    fn reaper(&self) -> Reaper {
        self.state.reaper.clone()
    }

    fn spawn_resource(&self, entity: &Rc<Entity>, resource: HostFuture) {
        self.state.sched.spawn(Task::new(
            format!("{} lifecycle", entity.name()),
            resource_lifecycle(Rc::clone(entity), resource),
        ));
    }

    fn exec_bifurcate(&self, entity: &str, left: &str, right: &str, span: Span) -> ExecResult {
        if !self.state.entities.borrow().contains_key(entity) {
            return Err(Flow::lookup(
                format!("Cannot bifurcate unknown entity: {}", entity),
                span,
            ));
        }
        for name in [left, right] {
            let branch = Entity::new(name, EntityKind::Branch, self.reaper());
            self.state
                .entities
                .borrow_mut()
                .insert(name.to_string(), branch);
            self.state.branch_names.borrow_mut().insert(name.to_string());
        }
        Ok(())
    }

    async fn exec_ath_loop(
        &self,
        condition: &EntityExpr,
        body: &[Stmt],
        execute: &[Stmt],
        span: Span,
        scope: &ScopeRef,
    ) -> ExecResult {
        if let EntityExpr::Ident { name, .. } = condition {
            if self.state.branch_names.borrow().contains(name) {
                return self.exec_branch_mode(name, body, execute, span, scope).await;
            }
        }

        // Wait mode. The body may only hold nested ~ATH statements; they are
        // validated but not executed.
        for stmt in body {
            if !matches!(stmt, Stmt::AthLoop { .. }) {
                return Err(Flow::constraint(
                    "Only nested ~ATH statements are allowed in a wait body",
                    stmt.span(),
                ));
            }
        }

        let entity = self.resolve_entity(condition)?;
        entity.death().await;
        self.exec_block(execute, scope).await
    }

    async fn exec_branch_mode(
        &self,
        name: &str,
        body: &[Stmt],
        execute: &[Stmt],
        span: Span,
        scope: &ScopeRef,
    ) -> ExecResult {
        let branch = self
            .entity(name)
            .ok_or_else(|| Flow::lookup(format!("Unknown entity: {}", name), span))?;
        if !matches!(branch.kind(), EntityKind::Branch) {
            return Err(Flow::constraint(
                format!("{} is not a branch entity", name),
                span,
            ));
        }

        let interp = self.clone();
        let body = body.to_vec();
        let execute = execute.to_vec();
        let scope = Rc::clone(scope);
        self.state.sched.spawn(Task::new(
            format!("branch {}", name),
            async move {
                let result = async {
                    interp.exec_block(&body, &scope).await?;
                    interp.exec_block(&execute, &scope).await
                }
                .await;
                // Completion is death, even when the branch failed; the
                // error then still surfaces as a program failure.
                branch.complete();
                result.map_err(|flow| flow.into_error(span))
            },
        ));

        // Give the branch a chance to reach its first suspension before the
        // parent continues.
        yield_now().await;
        Ok(())
    }

    fn resolve_entity(&self, expr: &EntityExpr) -> std::result::Result<Rc<Entity>, Flow> {
        match expr {
            EntityExpr::Ident { name, span } => self
                .entity(name)
                .ok_or_else(|| Flow::lookup(format!("Unknown entity: {}", name), *span)),
            EntityExpr::And { left, right, .. } => {
                let left = self.resolve_entity(left)?;
                let right = self.resolve_entity(right)?;
                Ok(self.spawn_composite(CompositeOp::And, vec![left, right]))
            }
            EntityExpr::Or { left, right, .. } => {
                let left = self.resolve_entity(left)?;
                let right = self.resolve_entity(right)?;
                Ok(self.spawn_composite(CompositeOp::Or, vec![left, right]))
            }
            EntityExpr::Not { operand, .. } => {
                let operand = self.resolve_entity(operand)?;
                Ok(self.spawn_composite(CompositeOp::Not, vec![operand]))
            }
        }
    }

    /// Composite entities are anonymous: they live outside the entity table
    /// and reference their operands without owning them.
    fn spawn_composite(&self, op: CompositeOp, operands: Vec<Rc<Entity>>) -> Rc<Entity> {
        let name = match op {
            CompositeOp::And => format!("({} && {})", operands[0].name(), operands[1].name()),
            CompositeOp::Or => format!("({} || {})", operands[0].name(), operands[1].name()),
            CompositeOp::Not => format!("(!{})", operands[0].name()),
        };
        let entity = Entity::new(name, EntityKind::Composite { op }, self.reaper());
        self.state.sched.spawn(Task::new(
            format!("composite {}", entity.name()),
            composite_lifecycle(Rc::clone(&entity), op, operands),
        ));
        entity
    }

    fn kill_target(&self, target: &DieTarget) -> ExecResult {
        match target {
            DieTarget::Ident { name, span } => {
                let entity = self
                    .entity(name)
                    .ok_or_else(|| Flow::lookup(format!("Unknown entity: {}", name), *span))?;
                entity.die();
                Ok(())
            }
            DieTarget::Pair { left, right, .. } => {
                self.kill_target(left)?;
                self.kill_target(right)
            }
        }
    }

    async fn exec_assign(&self, target: &Expr, value: &Expr, scope: &ScopeRef) -> ExecResult {
        let value = self.eval_expr(value, scope).await?;
        match target {
            Expr::Identifier { name, span } => {
                scope.borrow_mut().assign(name, value).map_err(|err| match err {
                    AssignError::Undefined => {
                        Flow::lookup(format!("Undefined variable: {}", name), *span)
                    }
                    AssignError::Constant => {
                        Flow::constraint(format!("Cannot reassign constant: {}", name), *span)
                    }
                })
            }
            Expr::Index { object, index, span } => {
                let object = self.eval_expr(object, scope).await?;
                let index = self.eval_expr(index, scope).await?;
                match object {
                    Value::Array(items) => {
                        let Value::Integer(i) = index else {
                            return Err(Flow::type_error("Array index must be an integer", *span));
                        };
                        let mut items = items.borrow_mut();
                        if i < 0 || i as usize >= items.len() {
                            return Err(Flow::type_error(
                                format!("Array index out of bounds: {}", i),
                                *span,
                            ));
                        }
                        items[i as usize] = value;
                        Ok(())
                    }
                    Value::Map(entries) => {
                        entries.borrow_mut().insert(index.stringify(), value);
                        Ok(())
                    }
                    _ => Err(Flow::type_error("Cannot index non-collection", *span)),
                }
            }
            Expr::Member { object, member, span } => {
                let object = self.eval_expr(object, scope).await?;
                match object {
                    Value::Map(entries) => {
                        entries.borrow_mut().insert(member.clone(), value);
                        Ok(())
                    }
                    _ => Err(Flow::type_error("Cannot access member of non-map", *span)),
                }
            }
            other => Err(Flow::constraint("Invalid assignment target", other.span())),
        }
    }

    async fn load_module(&self, entity: &Rc<Entity>, path: &str, span: Span) -> ExecResult {
        if self.state.import_stack.iter().any(|p| p == path) {
            let mut chain = self.state.import_stack.clone();
            chain.push(path.to_string());
            return Err(Flow::constraint(
                format!("Circular import detected: {}", chain.join(" -> ")),
                span,
            ));
        }

        let source = self.state.host.scry(Some(path)).map_err(|err| {
            Flow::constraint(format!("Cannot read module '{}': {}", path, err), span)
        })?;
        let program = parse_source(&source).map_err(|err| {
            Flow::constraint(format!("Error in module '{}': {}", path, err), span)
        })?;

        let child = self.module_child(path);
        child.install_this();
        let scope = child.state.globals.clone();
        for stmt in &program.statements {
            if let Err(flow) = child.exec_stmt(stmt, &scope).await {
                let err = flow.into_error(stmt.span());
                child.release_entities();
                return Err(Flow::constraint(
                    format!("Error in module '{}': {}", path, err),
                    span,
                ));
            }
        }
        child.release_entities();

        entity.set_exports(child.state.globals.borrow().local_bindings());
        Ok(())
    }

    // ============ Expressions ============

    fn eval_expr<'a>(&'a self, expr: &'a Expr, scope: &'a ScopeRef) -> LocalFuture<'a, EvalResult> {
        Box::pin(async move {
            match expr {
                Expr::Literal { value, .. } => Ok(match value {
                    Literal::Integer(n) => Value::Integer(*n),
                    Literal::Float(x) => Value::Float(*x),
                    Literal::Str(s) => Value::Str(s.clone()),
                    Literal::Boolean(b) => Value::Boolean(*b),
                    Literal::Void => Value::Void,
                }),
                Expr::Identifier { name, span } => self.eval_identifier(name, *span, scope),
                Expr::Binary { op, left, right, span } => {
                    match op {
                        // AND/OR short-circuit and return the deciding left
                        // value, not a coerced boolean.
                        BinaryOp::And => {
                            let left = self.eval_expr(left, scope).await?;
                            if !left.is_truthy() {
                                return Ok(left);
                            }
                            self.eval_expr(right, scope).await
                        }
                        BinaryOp::Or => {
                            let left = self.eval_expr(left, scope).await?;
                            if left.is_truthy() {
                                return Ok(left);
                            }
                            self.eval_expr(right, scope).await
                        }
                        _ => {
                            let left = self.eval_expr(left, scope).await?;
                            let right = self.eval_expr(right, scope).await?;
                            apply_binary(*op, left, right, *span)
                        }
                    }
                }
                Expr::Unary { op, operand, span } => {
                    let operand = self.eval_expr(operand, scope).await?;
                    apply_unary(*op, operand, *span)
                }
                Expr::Call { callee, args, span } => {
                    let callee = self.eval_expr(callee, scope).await?;
                    let mut evaluated = Vec::with_capacity(args.len());
                    for arg in args {
                        evaluated.push(self.eval_expr(arg, scope).await?);
                    }
                    match callee {
                        Value::Builtin(builtin) => builtin
                            .call(&*self.state.host, evaluated)
                            .map_err(|err| Flow::Error(err.with_span(*span))),
                        Value::Rite(rite) => self.call_rite(&rite, evaluated, *span).await,
                        other => Err(Flow::type_error(
                            format!("Cannot call {}", other.stringify()),
                            *span,
                        )),
                    }
                }
                Expr::Index { object, index, span } => {
                    let object = self.eval_expr(object, scope).await?;
                    let index = self.eval_expr(index, scope).await?;
                    eval_index(object, index, *span)
                }
                Expr::Member { object, member, span } => {
                    let object = self.eval_expr(object, scope).await?;
                    eval_member(object, member, *span)
                }
                Expr::Array { elements, .. } => {
                    let mut values = Vec::with_capacity(elements.len());
                    for element in elements {
                        values.push(self.eval_expr(element, scope).await?);
                    }
                    Ok(Value::array(values))
                }
                Expr::Map { entries, .. } => {
                    let mut map = indexmap::IndexMap::new();
                    for (key, value) in entries {
                        map.insert(key.clone(), self.eval_expr(value, scope).await?);
                    }
                    Ok(Value::map(map))
                }
            }
        })
    }

    fn eval_identifier(&self, name: &str, span: Span, scope: &ScopeRef) -> EvalResult {
        if name == "THIS" {
            return self
                .entity("THIS")
                .map(Value::Entity)
                .ok_or_else(|| Flow::lookup("Unknown entity: THIS", span));
        }
        // Built-ins resolve before user bindings and cannot be shadowed.
        if let Some(builtin) = builtins::lookup(name) {
            return Ok(Value::Builtin(builtin));
        }
        if let Some(value) = scope.borrow().get(name) {
            return Ok(value);
        }
        // Watcher entities loaded as modules are readable by name.
        if let Some(entity) = self.entity(name) {
            if entity.is_module() {
                return Ok(Value::Entity(entity));
            }
        }
        Err(Flow::lookup(format!("Undefined variable: {}", name), span))
    }

    async fn call_rite(&self, rite: &Rc<UserRite>, args: Vec<Value>, span: Span) -> EvalResult {
        if args.len() != rite.params.len() {
            return Err(Flow::constraint(
                format!(
                    "Rite '{}' expects {} arguments, got {}",
                    rite.name,
                    rite.params.len(),
                    args.len()
                ),
                span,
            ));
        }

        let call_scope = Scope::child(&rite.closure);
        {
            let mut call_scope = call_scope.borrow_mut();
            for (param, arg) in rite.params.iter().zip(args) {
                call_scope.define(param.clone(), arg, false);
            }
        }

        let body = Rc::clone(&rite.body);
        match self.exec_block(&body, &call_scope).await {
            Ok(()) => Ok(Value::Void),
            Err(Flow::Bequeath(value)) => Ok(value),
            Err(flow) => Err(flow),
        }
    }
}

// ============ Value-level operator semantics ============

fn apply_binary(op: BinaryOp, left: Value, right: Value, span: Span) -> EvalResult {
    match op {
        BinaryOp::Add => {
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                return Ok(Value::Str(left.stringify() + &right.stringify()));
            }
            match (&left, &right) {
                (Value::Integer(a), Value::Integer(b)) => a
                    .checked_add(*b)
                    .map(Value::Integer)
                    .ok_or_else(|| Flow::constraint("integer overflow", span)),
                _ => numeric_pair(&left, &right)
                    .map(|(a, b)| Value::Float(a + b))
                    .ok_or_else(|| {
                        Flow::type_error(
                            format!("Cannot add {} and {}", left.stringify(), right.stringify()),
                            span,
                        )
                    }),
            }
        }
        BinaryOp::Sub => match (&left, &right) {
            (Value::Integer(a), Value::Integer(b)) => a
                .checked_sub(*b)
                .map(Value::Integer)
                .ok_or_else(|| Flow::constraint("integer overflow", span)),
            _ => numeric_pair(&left, &right)
                .map(|(a, b)| Value::Float(a - b))
                .ok_or_else(|| {
                    Flow::type_error(
                        format!(
                            "Cannot subtract {} from {}",
                            right.stringify(),
                            left.stringify()
                        ),
                        span,
                    )
                }),
        },
        BinaryOp::Mul => match (&left, &right) {
            (Value::Integer(a), Value::Integer(b)) => a
                .checked_mul(*b)
                .map(Value::Integer)
                .ok_or_else(|| Flow::constraint("integer overflow", span)),
            _ => numeric_pair(&left, &right)
                .map(|(a, b)| Value::Float(a * b))
                .ok_or_else(|| {
                    Flow::type_error(
                        format!(
                            "Cannot multiply {} by {}",
                            left.stringify(),
                            right.stringify()
                        ),
                        span,
                    )
                }),
        },
        BinaryOp::Div => {
            let Some((a, b)) = numeric_pair(&left, &right) else {
                return Err(Flow::type_error(
                    format!("Cannot divide {} by {}", left.stringify(), right.stringify()),
                    span,
                ));
            };
            if b == 0.0 {
                return Err(Flow::constraint("Division by zero", span));
            }
            match (&left, &right) {
                // Integer division truncates toward zero.
                (Value::Integer(x), Value::Integer(y)) => x
                    .checked_div(*y)
                    .map(Value::Integer)
                    .ok_or_else(|| Flow::constraint("integer overflow", span)),
                _ => Ok(Value::Float(a / b)),
            }
        }
        BinaryOp::Rem => match (&left, &right) {
            (Value::Integer(a), Value::Integer(b)) => {
                if *b == 0 {
                    return Err(Flow::constraint("Modulo by zero", span));
                }
                a.checked_rem(*b)
                    .map(Value::Integer)
                    .ok_or_else(|| Flow::constraint("integer overflow", span))
            }
            _ => Err(Flow::type_error(
                format!(
                    "Cannot modulo {} by {}",
                    left.stringify(),
                    right.stringify()
                ),
                span,
            )),
        },
        BinaryOp::Eq => Ok(Value::Boolean(left == right)),
        BinaryOp::NotEq => Ok(Value::Boolean(left != right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                _ => match numeric_pair(&left, &right) {
                    Some((a, b)) => a.partial_cmp(&b),
                    None => {
                        return Err(Flow::type_error(
                            format!(
                                "Cannot compare {} and {}",
                                left.stringify(),
                                right.stringify()
                            ),
                            span,
                        ));
                    }
                },
            };
            let result = match (op, ordering) {
                (_, None) => false, // NaN comparisons
                (BinaryOp::Lt, Some(ord)) => ord.is_lt(),
                (BinaryOp::Gt, Some(ord)) => ord.is_gt(),
                (BinaryOp::Le, Some(ord)) => ord.is_le(),
                (BinaryOp::Ge, Some(ord)) => ord.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::Boolean(result))
        }
        BinaryOp::And | BinaryOp::Or => {
            unreachable!("short-circuit operators are handled before operand evaluation")
        }
    }
}

fn numeric_pair(left: &Value, right: &Value) -> Option<(f64, f64)> {
    Some((left.as_number()?, right.as_number()?))
}

fn apply_unary(op: UnaryOp, operand: Value, span: Span) -> EvalResult {
    match op {
        UnaryOp::Not => Ok(Value::Boolean(!operand.is_truthy())),
        UnaryOp::Neg => match operand {
            Value::Integer(n) => n
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| Flow::constraint("integer overflow", span)),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(Flow::type_error(
                format!("Cannot negate {}", other.stringify()),
                span,
            )),
        },
    }
}

fn eval_index(object: Value, index: Value, span: Span) -> EvalResult {
    match object {
        Value::Array(items) => {
            let Value::Integer(i) = index else {
                return Err(Flow::type_error("Array index must be an integer", span));
            };
            let items = items.borrow();
            if i < 0 || i as usize >= items.len() {
                return Err(Flow::type_error(
                    format!("Array index out of bounds: {}", i),
                    span,
                ));
            }
            Ok(items[i as usize].clone())
        }
        Value::Map(entries) => {
            let key = index.stringify();
            entries
                .borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| Flow::lookup(format!("Key not found in map: {}", key), span))
        }
        Value::Str(text) => {
            let Value::Integer(i) = index else {
                return Err(Flow::type_error("String index must be an integer", span));
            };
            if i < 0 {
                return Err(Flow::type_error(
                    format!("String index out of bounds: {}", i),
                    span,
                ));
            }
            text.chars()
                .nth(i as usize)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| {
                    Flow::type_error(format!("String index out of bounds: {}", i), span)
                })
        }
        other => Err(Flow::type_error(
            format!("Cannot index {}", other.stringify()),
            span,
        )),
    }
}

fn eval_member(object: Value, member: &str, span: Span) -> EvalResult {
    match object {
        Value::Map(entries) => entries
            .borrow()
            .get(member)
            .cloned()
            .ok_or_else(|| Flow::lookup(format!("Key not found in map: {}", member), span)),
        Value::Entity(entity) if entity.is_module() => entity.export(member).ok_or_else(|| {
            Flow::lookup(
                format!("Module '{}' has no export '{}'", entity.name(), member),
                span,
            )
        }),
        other => Err(Flow::type_error(
            format!("Cannot access member of {}", other.stringify()),
            span,
        )),
    }
}
