//! Type propagation over the IR
//!
//! Resolves the hardware type and shape of every expression node. Literal
//! constants are weak: they adopt the type of the operand they meet. Local
//! variables take the type of their first strongly typed assignment, found by
//! iterating over all assignments until nothing changes.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{Span, UnaryOp};
use crate::error::{CompileError, CompileResult};
use crate::hardware::{HardwareType, ScalarKind};
use crate::ir::{Constant, Lambda, Module, NodeId, NodeKind};
use crate::operators::{classify_intrinsic, Intrinsic};

/// Type and shape of a value
#[derive(Debug, Clone, PartialEq)]
struct Typing {
    ty: HardwareType,
    shape: Vec<usize>,
    /// Derived from literals only
    weak: bool,
}

impl Typing {
    fn strong(ty: HardwareType, shape: Vec<usize>) -> Self {
        Self {
            ty,
            shape,
            weak: false,
        }
    }

    fn scalar(kind: ScalarKind) -> Self {
        Self::strong(HardwareType::scalar(kind), Vec::new())
    }

    fn is_array(&self) -> bool {
        !self.shape.is_empty()
    }

    /// Element of an array
    fn element(&self) -> Self {
        Self::strong(self.ty, Vec::new())
    }
}

/// Arithmetic result of two scalar operands
fn combine(left: &Typing, right: &Typing) -> Typing {
    match (left.weak, right.weak) {
        (true, true) => Typing {
            ty: left.ty.join(right.ty),
            shape: Vec::new(),
            weak: true,
        },
        (true, false) => right.element(),
        (false, true) => left.element(),
        (false, false) => Typing::strong(left.ty.join(right.ty), Vec::new()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Trial typing of an assignment; unresolved locals yield `None`
    Probe,
    /// Final typing; every node is recorded
    Stamp,
}

struct Inference<'m> {
    module: &'m Module,
    mode: Mode,
    /// Resolved local variables
    locals: &'m HashMap<String, Typing>,
    /// Every loop variable name, used while probing
    loop_vars: &'m HashSet<String>,
    /// Lambda parameters and, while stamping, enclosing loop variables
    scopes: Vec<HashMap<String, Typing>>,
    /// Locals assigned so far in program order
    defined: HashSet<String>,
    stamps: Vec<(NodeId, Typing)>,
    return_type: Option<Typing>,
}

impl<'m> Inference<'m> {
    fn new(
        module: &'m Module,
        mode: Mode,
        locals: &'m HashMap<String, Typing>,
        loop_vars: &'m HashSet<String>,
    ) -> Self {
        Self {
            module,
            mode,
            locals,
            loop_vars,
            scopes: Vec::new(),
            defined: HashSet::new(),
            stamps: Vec::new(),
            return_type: None,
        }
    }

    fn span(&self, id: NodeId) -> Span {
        self.module.node(id).span
    }

    fn error(&self, id: NodeId, message: impl Into<String>) -> CompileError {
        CompileError::type_error_at(self.span(id), message)
    }

    fn record(&mut self, id: NodeId, typing: Typing) -> Typing {
        if self.mode == Mode::Stamp {
            self.stamps.push((id, typing.clone()));
        }
        typing
    }

    fn visit_block(&mut self, body: &[NodeId]) -> CompileResult<()> {
        for &stmt in body {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, id: NodeId) -> CompileResult<()> {
        let module = self.module;
        match module.kind(id) {
            NodeKind::Assign { target, value } => {
                let value_typing = self.require(*value)?;
                let target_typing = match module.kind(*target) {
                    NodeKind::Var(name) => {
                        let typing = self.resolve_local(*target, name)?;
                        self.defined.insert(name.clone());
                        self.record(*target, typing)
                    }
                    _ => self.require(*target)?,
                };
                if target_typing.shape != value_typing.shape {
                    return Err(self.error(
                        id,
                        format!(
                            "cannot assign a value of shape {:?} to a target of shape {:?}",
                            value_typing.shape, target_typing.shape
                        ),
                    ));
                }
            }
            NodeKind::AugAssign { target, value, .. } => {
                let target_typing = self.require(*target)?;
                let value_typing = self.require(*value)?;
                if target_typing.is_array() || value_typing.is_array() {
                    return Err(self.error(id, "augmented assignment on arrays requires an array operator"));
                }
            }
            NodeKind::If { test, body, orelse } => {
                self.require(*test)?;
                self.visit_block(body)?;
                self.visit_block(orelse)?;
            }
            NodeKind::For {
                var,
                start,
                stop,
                step,
                body,
            } => {
                for bound in [*start, *stop, *step] {
                    let typing = self.require(bound)?;
                    if typing.is_array() || !typing.ty.is_integral() {
                        return Err(self.error(bound, "loop bounds must be integers"));
                    }
                }
                let mut scope = HashMap::new();
                scope.insert(var.clone(), Typing::scalar(ScalarKind::Int32));
                self.scopes.push(scope);
                let result = self.visit_block(body);
                self.scopes.pop();
                result?;
            }
            NodeKind::While { test, body } => {
                self.require(*test)?;
                self.visit_block(body)?;
            }
            NodeKind::Return(value) => {
                if let Some(value) = value {
                    let typing = self.require(*value)?;
                    if self.return_type.is_none() {
                        self.return_type = Some(typing);
                    }
                }
            }
            NodeKind::ExprStmt(expr) => {
                self.require(*expr)?;
            }
            NodeKind::Break | NodeKind::Continue | NodeKind::Pass => {}
            _ => return Err(self.error(id, "expression in statement position")),
        }
        Ok(())
    }

    /// Typing of an expression that must resolve
    fn require(&mut self, id: NodeId) -> CompileResult<Typing> {
        match self.infer(id)? {
            Some(typing) => Ok(typing),
            None => Err(self.error(id, "type depends on an unresolved variable")),
        }
    }

    /// Type a local variable's assignment target
    fn resolve_local(&self, id: NodeId, name: &str) -> CompileResult<Typing> {
        self.locals
            .get(name)
            .cloned()
            .ok_or_else(|| self.error(id, format!("cannot infer a type for `{}`", name)))
    }

    fn lookup_var(&self, id: NodeId, name: &str) -> CompileResult<Option<Typing>> {
        if let Some(typing) = self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return Ok(Some(typing.clone()));
        }
        if self.mode == Mode::Probe && self.loop_vars.contains(name) {
            return Ok(Some(Typing::scalar(ScalarKind::Int32)));
        }
        if self.module.function.local(name).is_none() {
            return Err(self.error(id, format!("unbound name `{}`", name)));
        }
        match self.mode {
            Mode::Probe => Ok(self.locals.get(name).cloned()),
            Mode::Stamp => {
                if !self.defined.contains(name) {
                    return Err(self.error(id, format!("`{}` is used before definition", name)));
                }
                self.resolve_local(id, name).map(Some)
            }
        }
    }

    /// Type an expression; `None` only while probing unresolved locals
    fn infer(&mut self, id: NodeId) -> CompileResult<Option<Typing>> {
        macro_rules! infer {
            ($id:expr) => {
                match self.infer($id)? {
                    Some(typing) => typing,
                    None => return Ok(None),
                }
            };
        }

        let module = self.module;
        let typing = match module.kind(id) {
            NodeKind::Const(value) => {
                let kind = match value {
                    Constant::Int(_) => ScalarKind::Int32,
                    Constant::Float(_) => ScalarKind::Float32,
                    Constant::Bool(_) => ScalarKind::Bool,
                };
                Typing {
                    ty: HardwareType::scalar(kind),
                    shape: Vec::new(),
                    weak: true,
                }
            }
            NodeKind::Param(name) => {
                let descriptor = module.function.argument(name).ok_or_else(|| {
                    CompileError::argument(format!("parameter `{}` has no argument descriptor", name))
                })?;
                Typing::strong(descriptor.hardware_type, descriptor.shape.clone())
            }
            NodeKind::Var(name) => match self.lookup_var(id, name)? {
                Some(typing) => typing,
                None => return Ok(None),
            },
            NodeKind::Index { base, indices } => {
                let base_typing = infer!(*base);
                if !base_typing.is_array() {
                    return Err(self.error(id, "cannot index a scalar"));
                }
                if indices.len() > base_typing.shape.len() {
                    return Err(self.error(
                        id,
                        format!(
                            "too many indices: {} for an array of rank {}",
                            indices.len(),
                            base_typing.shape.len()
                        ),
                    ));
                }
                for &index in indices {
                    let index_typing = infer!(index);
                    if index_typing.is_array() || !index_typing.ty.is_integral() {
                        return Err(self.error(index, "array index must be an integer"));
                    }
                }
                Typing::strong(base_typing.ty, base_typing.shape[indices.len()..].to_vec())
            }
            NodeKind::Binary { left, right, .. } => {
                let l = infer!(*left);
                let r = infer!(*right);
                if l.is_array() || r.is_array() {
                    return Err(self.error(id, "arithmetic on arrays requires an array operator such as `map`"));
                }
                combine(&l, &r)
            }
            NodeKind::Compare { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                let l = infer!(*left);
                let r = infer!(*right);
                if l.is_array() || r.is_array() {
                    return Err(self.error(id, "comparison of arrays"));
                }
                Typing::scalar(ScalarKind::Bool)
            }
            NodeKind::Unary { op, operand } => {
                let operand_typing = infer!(*operand);
                if operand_typing.is_array() {
                    return Err(self.error(id, "unary operation on an array"));
                }
                match op {
                    UnaryOp::Not => Typing::scalar(ScalarKind::Bool),
                    UnaryOp::Neg | UnaryOp::Plus | UnaryOp::Invert => operand_typing,
                }
            }
            NodeKind::Select { test, body, orelse } => {
                infer!(*test);
                let b = infer!(*body);
                let o = infer!(*orelse);
                if b.is_array() || o.is_array() {
                    return Err(self.error(id, "conditional expression on arrays"));
                }
                combine(&b, &o)
            }
            NodeKind::Call { func, args } => {
                let mut arg_typings = Vec::with_capacity(args.len());
                for &arg in args {
                    arg_typings.push(infer!(arg));
                }
                self.type_call(id, func, &arg_typings)?
            }
            NodeKind::Map { func, inputs } => {
                let mut input_typings = Vec::with_capacity(inputs.len());
                for &input in inputs {
                    input_typings.push(infer!(input));
                }
                let shape = self.common_shape(id, "map", &input_typings)?;
                let elements: Vec<Typing> = input_typings.iter().map(Typing::element).collect();
                match self.infer_lambda(id, func, &elements)? {
                    Some(body) => Typing::strong(body.ty, shape),
                    None => return Ok(None),
                }
            }
            NodeKind::Dot { left, right } => {
                let l = infer!(*left);
                let r = infer!(*right);
                self.common_shape(id, "dot", &[l.clone(), r.clone()])?;
                Typing::strong(l.ty.join(r.ty), Vec::new())
            }
            NodeKind::Reduce { func, input, init } => {
                let input_typing = infer!(*input);
                self.common_shape(id, "reduce", std::slice::from_ref(&input_typing))?;
                if let Some(init) = init {
                    let init_typing = infer!(*init);
                    if init_typing.is_array() {
                        return Err(self.error(*init, "reduce initial value must be a scalar"));
                    }
                }
                let element = input_typing.element();
                match self.infer_lambda(id, func, &[element.clone(), element])? {
                    Some(body) => Typing::strong(body.ty, Vec::new()),
                    None => return Ok(None),
                }
            }
            NodeKind::Fused { .. } => {
                return Err(self.error(id, "fused operators are created after typing"));
            }
            _ => return Err(self.error(id, "statement in expression position")),
        };
        Ok(Some(self.record(id, typing)))
    }

    /// Type a lambda body with its parameters bound to `params`
    fn infer_lambda(&mut self, id: NodeId, func: &Lambda, params: &[Typing]) -> CompileResult<Option<Typing>> {
        if func.params.len() != params.len() {
            return Err(self.error(
                id,
                format!(
                    "lambda takes {} parameter(s) but the operator supplies {}",
                    func.params.len(),
                    params.len()
                ),
            ));
        }
        let scope = func.params.iter().cloned().zip(params.iter().cloned()).collect();
        self.scopes.push(scope);
        let body = self.infer(func.body);
        self.scopes.pop();
        let body = body?;
        if body.as_ref().map_or(false, Typing::is_array) {
            return Err(self.error(func.body, "lambda body must produce a scalar"));
        }
        Ok(body)
    }

    fn common_shape(&self, id: NodeId, operator: &str, inputs: &[Typing]) -> CompileResult<Vec<usize>> {
        let shape = inputs.first().map(|t| t.shape.clone()).unwrap_or_default();
        if shape.is_empty() {
            return Err(self.error(id, format!("`{}` operands must be arrays", operator)));
        }
        if inputs.iter().any(|t| t.shape != shape) {
            let shapes: Vec<_> = inputs.iter().map(|t| t.shape.clone()).collect();
            return Err(self.error(
                id,
                format!("`{}` operands differ in shape: {:?}", operator, shapes),
            ));
        }
        Ok(shape)
    }

    fn type_call(&self, id: NodeId, func: &str, args: &[Typing]) -> CompileResult<Typing> {
        let Some(intrinsic) = classify_intrinsic(func) else {
            // Unknown functions are typed optimistically; code generation
            // rejects them later
            let joined = args.iter().fold(None, |acc: Option<Typing>, t| match acc {
                None => Some(t.element()),
                Some(acc) => Some(combine(&acc, t)),
            });
            return Ok(joined
                .map(|t| Typing::strong(t.ty, Vec::new()))
                .unwrap_or_else(|| Typing::scalar(ScalarKind::Int32)));
        };

        if args.len() != intrinsic.arity() {
            return Err(self.error(
                id,
                format!("`{}` takes {} argument(s), got {}", func, intrinsic.arity(), args.len()),
            ));
        }

        let typing = match intrinsic {
            Intrinsic::Elementwise(_) => {
                let (l, r) = (&args[0], &args[1]);
                if l.shape != r.shape {
                    return Err(self.error(
                        id,
                        format!("`{}` operands differ in shape: {:?} and {:?}", func, l.shape, r.shape),
                    ));
                }
                let ty = combine(&l.element(), &r.element()).ty;
                Typing::strong(ty, l.shape.clone())
            }
            Intrinsic::Dot => {
                self.common_shape(id, func, args)?;
                Typing::strong(args[0].ty.join(args[1].ty), Vec::new())
            }
            Intrinsic::Sum => {
                self.common_shape(id, func, args)?;
                Typing::strong(args[0].ty, Vec::new())
            }
            Intrinsic::Math(math) => {
                if math.arity() == 2 {
                    if args.iter().any(Typing::is_array) {
                        return Err(self.error(id, format!("`{}` of arrays", func)));
                    }
                    combine(&args[0], &args[1])
                } else {
                    let arg = &args[0];
                    let ty = if math.is_transcendental() && arg.ty.is_integral() {
                        HardwareType::scalar(ScalarKind::Float32)
                    } else {
                        arg.ty
                    };
                    Typing {
                        ty,
                        shape: arg.shape.clone(),
                        weak: arg.weak,
                    }
                }
            }
        };
        Ok(typing)
    }
}

/// Type propagation pass
#[derive(Debug, Default)]
pub struct Typer;

impl Typer {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&mut self, module: &mut Module) -> CompileResult<()> {
        let (assignments, loop_vars) = collect_assignments(module);
        let locals = resolve_locals(module, &assignments, &loop_vars)?;

        let (stamps, return_type) = {
            let mut inference = Inference::new(module, Mode::Stamp, &locals, &loop_vars);
            inference.visit_block(&module.body)?;
            (inference.stamps, inference.return_type)
        };

        for (id, typing) in stamps {
            let node = module.node_mut(id);
            debug_assert!(node.ty.is_none(), "node {} typed twice", id);
            node.ty = Some(typing.ty);
            node.shape = typing.shape;
        }
        for local in &mut module.function.locals {
            if let Some(typing) = locals.get(&local.name) {
                local.ty = Some(typing.ty);
                local.shape = typing.shape.clone();
            }
        }
        if let Some(typing) = return_type {
            module.function.return_type = Some(typing.ty);
            module.function.return_shape = typing.shape;
        }

        debug!(
            function = %module.function.name,
            locals = module.function.locals.len(),
            return_type = ?module.function.return_type,
            "types resolved"
        );
        Ok(())
    }
}

/// Assignments to locals in program order, and all loop variable names
fn collect_assignments(module: &Module) -> (Vec<(String, NodeId)>, HashSet<String>) {
    let mut assignments = Vec::new();
    let mut loop_vars = HashSet::new();
    for id in module.preorder() {
        match module.kind(id) {
            NodeKind::Assign { target, value } | NodeKind::AugAssign { target, value, .. } => {
                if let NodeKind::Var(name) = module.kind(*target) {
                    if module.function.local(name).is_some() {
                        assignments.push((name.clone(), *value));
                    }
                }
            }
            NodeKind::For { var, .. } => {
                loop_vars.insert(var.clone());
            }
            _ => {}
        }
    }
    (assignments, loop_vars)
}

/// Fixpoint over assignments: a local takes its first strongly typed
/// assignment; when no strong assignment resolves, weakly typed ones settle
/// the remaining locals before iterating again
fn resolve_locals(
    module: &Module,
    assignments: &[(String, NodeId)],
    loop_vars: &HashSet<String>,
) -> CompileResult<HashMap<String, Typing>> {
    let mut resolved: HashMap<String, Typing> = HashMap::new();
    loop {
        let mut progress = false;
        let mut weak: HashMap<String, Typing> = HashMap::new();

        for (name, value) in assignments {
            if resolved.contains_key(name) {
                continue;
            }
            let mut probe = Inference::new(module, Mode::Probe, &resolved, loop_vars);
            let typing = probe.infer(*value)?;
            match typing {
                Some(typing) if !typing.weak => {
                    resolved.insert(name.clone(), typing);
                    progress = true;
                }
                Some(typing) => {
                    weak.entry(name.clone()).or_insert(typing);
                }
                None => {}
            }
        }

        if progress {
            continue;
        }
        if weak.is_empty() {
            break;
        }
        for (name, typing) in weak {
            resolved.insert(name, Typing { weak: false, ..typing });
        }
    }

    for local in &module.function.locals {
        if !resolved.contains_key(&local.name) {
            return Err(CompileError::type_error(format!(
                "cannot infer a type for `{}`",
                local.name
            )));
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{kernel_definition, Analyzer};
    use crate::args::{extract_arguments, ArgSpec};
    use crate::linker::ParentMap;
    use crate::parser::parse_module;
    use pretty_assertions::assert_eq;

    fn typed(source: &str, args: &[ArgSpec]) -> CompileResult<Module> {
        let ast = parse_module(source)?;
        let parents = ParentMap::link(&ast);
        let params = kernel_definition(&ast)?.params.clone();
        let arguments = extract_arguments(&params, args)?;
        let mut module = Analyzer::new(&parents).analyze(&ast, arguments)?;
        Typer::new().run(&mut module)?;
        Ok(module)
    }

    fn fixed8() -> ArgSpec {
        ArgSpec::record(["total32bits", "dec16bits"], &[8])
    }

    #[test]
    fn test_weak_literal_adopts_operand_type() {
        let module = typed(
            "def f(a):\n    x = a[0] * 2\n    return x\n",
            &[fixed8()],
        )
        .unwrap();
        assert_eq!(module.function.local("x").unwrap().ty, HardwareType::fixed(32, 16));
        assert_eq!(module.function.return_type, HardwareType::fixed(32, 16));
    }

    #[test]
    fn test_fixed_binary_grows() {
        let module = typed(
            "def f(a, b):\n    return a[0] + b[0]\n",
            &[fixed8(), ArgSpec::record(["total16bits", "dec8bits"], &[8])],
        )
        .unwrap();
        assert_eq!(module.function.return_type, HardwareType::fixed(34, 16));
    }

    #[test]
    fn test_local_takes_first_strong_assignment() {
        let module = typed(
            "def f(a):\n    s = 0\n    for i in range(8):\n        s += a[i]\n    return s\n",
            &[ArgSpec::named("float32", &[8])],
        )
        .unwrap();
        assert_eq!(
            module.function.local("s").unwrap().ty,
            Some(HardwareType::scalar(ScalarKind::Float32))
        );
    }

    #[test]
    fn test_weak_only_local_uses_default() {
        let module = typed(
            "def f(a):\n    k = 3\n    t = k + 1\n    a[0] = t\n",
            &[ArgSpec::named("int16", &[2])],
        )
        .unwrap();
        assert_eq!(
            module.function.local("t").unwrap().ty,
            Some(HardwareType::scalar(ScalarKind::Int32))
        );
        assert!(module.function.return_type.is_none());
    }

    #[test]
    fn test_map_shape_and_type() {
        let module = typed(
            "def f(a, b):\n    t = map(lambda x, y: x * y, a, b)\n    return t[0]\n",
            &[ArgSpec::named("int8", &[8]), ArgSpec::named("int16", &[8])],
        )
        .unwrap();
        let local = module.function.local("t").unwrap();
        assert_eq!(local.ty, Some(HardwareType::scalar(ScalarKind::Int16)));
        assert_eq!(local.shape, vec![8]);
    }

    #[test]
    fn test_every_expression_is_typed() {
        let module = typed(
            "def f(a, b):\n    s = 0.0\n    for i in range(4):\n        s += a[i] * b[i]\n    return s\n",
            &[ArgSpec::named("float32", &[4]), ArgSpec::named("float32", &[4])],
        )
        .unwrap();
        for id in module.preorder() {
            let node = module.node(id);
            assert_eq!(node.ty.is_some(), !node.is_statement(), "node {}", id);
        }
    }

    #[test]
    fn test_unbound_and_undefined_names() {
        let err = typed("def f(a):\n    return a[0] + q\n", &[fixed8()]).unwrap_err();
        assert!(err.to_string().contains("unbound name `q`"));

        let err = typed(
            "def f(a):\n    a[0] = t\n    t = 1\n",
            &[ArgSpec::named("int32", &[2])],
        )
        .unwrap_err();
        assert!(err.to_string().contains("used before definition"));
    }

    #[test]
    fn test_shape_errors() {
        let err = typed(
            "def f(a, b):\n    return dot(a, b)\n",
            &[ArgSpec::named("float32", &[4]), ArgSpec::named("float32", &[5])],
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::TypeInferenceError { location: Some(_), .. }));

        let err = typed("def f(a):\n    return a[0][1]\n", &[ArgSpec::named("float32", &[4])])
            .unwrap_err();
        assert!(err.to_string().contains("too many indices"));
    }
}
