//! Analyzer lowering the source AST to the domain IR
//!
//! Accepts exactly one function definition and rejects every construct the
//! hardware backend cannot express, naming the construct and its location.

use std::collections::HashSet;

use tracing::debug;

use crate::args::ArgumentMap;
use crate::ast::{self, *};
use crate::error::{CompileError, CompileResult};
use crate::ir::{Constant, FunctionInfo, Lambda, Module, NodeId, NodeKind};
use crate::linker::ParentMap;
use crate::operators::{classify_operator, OperatorKind};

/// Module names whose attributes are library functions, not methods
const LIBRARY_MODULES: &[&str] = &["np", "numpy", "math"];

/// The single kernel definition of a source module
///
/// Top-level `import`/`from` lines and docstrings are tolerated; any other
/// top-level statement is rejected.
pub fn kernel_definition(module: &ast::Module) -> CompileResult<&FunctionDef> {
    let mut found: Option<&FunctionDef> = None;
    for stmt in &module.body {
        match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                if found.is_some() {
                    return Err(CompileError::unsupported(
                        format!("second function definition `{}`", def.name),
                        stmt.span,
                    ));
                }
                found = Some(def);
            }
            StmtKind::Foreign { keyword } if keyword == "import" || keyword == "from" => {}
            StmtKind::Expr(Expr {
                kind: ExprKind::Str(_),
                ..
            }) => {}
            _ => {
                return Err(CompileError::unsupported(
                    "top-level statement outside the kernel function",
                    stmt.span,
                ))
            }
        }
    }
    found.ok_or_else(|| CompileError::unsupported("source without a function definition", Span::default()))
}

/// Analyzer for a linked source AST
pub struct Analyzer<'a> {
    parents: &'a ParentMap<AstId>,
    /// Loop statements seen so far
    loops: HashSet<AstId>,
    /// Operator calls seen so far
    operator_calls: HashSet<AstId>,
    /// Nesting depth of lambda bodies being lowered
    lambda_depth: usize,
}

impl<'a> Analyzer<'a> {
    pub fn new(parents: &'a ParentMap<AstId>) -> Self {
        Self {
            parents,
            loops: HashSet::new(),
            operator_calls: HashSet::new(),
            lambda_depth: 0,
        }
    }

    /// Lower the kernel of `source` into an IR module
    pub fn analyze(mut self, source: &ast::Module, arguments: ArgumentMap) -> CompileResult<Module> {
        let def = kernel_definition(source)?;

        for param in &def.params {
            if !arguments.contains_key(param) {
                return Err(CompileError::argument(format!(
                    "parameter `{}` has no argument descriptor",
                    param
                )));
            }
        }

        let mut module = Module::new(FunctionInfo::new(&def.name, def.params.clone(), arguments));

        let body = match def.body.split_first() {
            Some((first, rest)) if is_docstring(first) => rest,
            _ => &def.body[..],
        };
        module.body = self.lower_block(&mut module, body)?;
        module.relink();

        debug!(
            function = %def.name,
            nodes = module.len(),
            locals = module.function.locals.len(),
            "lowered kernel"
        );
        Ok(module)
    }

    fn lower_block(&mut self, module: &mut Module, body: &[Stmt]) -> CompileResult<Vec<NodeId>> {
        body.iter().map(|stmt| self.lower_stmt(module, stmt)).collect()
    }

    fn lower_stmt(&mut self, module: &mut Module, stmt: &Stmt) -> CompileResult<NodeId> {
        let span = stmt.span;
        let kind = match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                return Err(CompileError::unsupported(
                    format!("nested function definition `{}`", def.name),
                    span,
                ))
            }
            StmtKind::Assign { target, value } => {
                let value = self.lower_expr(module, value)?;
                let target = self.lower_target(module, target, true)?;
                NodeKind::Assign { target, value }
            }
            StmtKind::AugAssign { target, op, value } => {
                let value = self.lower_expr(module, value)?;
                let target = self.lower_target(module, target, false)?;
                NodeKind::AugAssign {
                    target,
                    op: *op,
                    value,
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                if !orelse.is_empty() {
                    return Err(CompileError::unsupported("`else` clause on a `for` loop", span));
                }
                let var = target.as_name().ok_or_else(|| {
                    CompileError::unsupported(
                        format!("loop target {} (only a name is allowed)", target.describe()),
                        target.span,
                    )
                })?;
                let (start, stop, step) = self.lower_range(module, iter)?;
                self.loops.insert(stmt.id);
                let body = self.lower_block(module, body)?;
                NodeKind::For {
                    var: var.to_string(),
                    start,
                    stop,
                    step,
                    body,
                }
            }
            StmtKind::While { test, body, orelse } => {
                if !orelse.is_empty() {
                    return Err(CompileError::unsupported("`else` clause on a `while` loop", span));
                }
                let test = self.lower_expr(module, test)?;
                self.loops.insert(stmt.id);
                let body = self.lower_block(module, body)?;
                NodeKind::While { test, body }
            }
            StmtKind::If { test, body, orelse } => {
                let test = self.lower_expr(module, test)?;
                let body = self.lower_block(module, body)?;
                let orelse = self.lower_block(module, orelse)?;
                NodeKind::If { test, body, orelse }
            }
            StmtKind::Return(value) => match value {
                None
                | Some(Expr {
                    kind: ExprKind::NoneLit,
                    ..
                }) => NodeKind::Return(None),
                Some(Expr {
                    kind: ExprKind::Tuple(_),
                    span,
                    ..
                }) => return Err(CompileError::unsupported("returning multiple values", *span)),
                Some(value) => NodeKind::Return(Some(self.lower_expr(module, value)?)),
            },
            StmtKind::Expr(expr) => NodeKind::ExprStmt(self.lower_expr(module, expr)?),
            StmtKind::Pass => NodeKind::Pass,
            StmtKind::Break | StmtKind::Continue => {
                if !self.inside_loop(stmt.id) {
                    let word = if matches!(stmt.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    return Err(CompileError::unsupported(format!("`{}` outside a loop", word), span));
                }
                if matches!(stmt.kind, StmtKind::Break) {
                    NodeKind::Break
                } else {
                    NodeKind::Continue
                }
            }
            StmtKind::Foreign { keyword } => {
                return Err(CompileError::unsupported(format!("`{}` statement", keyword), span))
            }
        };
        Ok(module.add(kind, span))
    }

    /// Whether a loop encloses the node before the function boundary
    fn inside_loop(&self, id: AstId) -> bool {
        self.parents
            .ancestors(id)
            .any(|ancestor| self.loops.contains(&ancestor))
    }

    fn lower_range(&mut self, module: &mut Module, iter: &Expr) -> CompileResult<(NodeId, NodeId, NodeId)> {
        let not_range = || {
            CompileError::unsupported(
                format!("iteration over {} (only `range` loops are supported)", iter.describe()),
                iter.span,
            )
        };
        let ExprKind::Call { func, args, keywords } = &iter.kind else {
            return Err(not_range());
        };
        if func.as_name() != Some("range") {
            return Err(not_range());
        }
        if !keywords.is_empty() {
            return Err(CompileError::unsupported("keyword arguments to `range`", iter.span));
        }

        let span = iter.span;
        let bound = |module: &mut Module, this: &mut Self, value: Option<&Expr>, default: i64| match value {
            Some(expr) => this.lower_expr(module, expr),
            None => Ok(module.add(NodeKind::Const(Constant::Int(default)), span)),
        };
        match args.as_slice() {
            [stop] => Ok((
                bound(module, self, None, 0)?,
                bound(module, self, Some(stop), 0)?,
                bound(module, self, None, 1)?,
            )),
            [start, stop] => Ok((
                bound(module, self, Some(start), 0)?,
                bound(module, self, Some(stop), 0)?,
                bound(module, self, None, 1)?,
            )),
            [start, stop, step] => {
                let start = bound(module, self, Some(start), 0)?;
                let stop = bound(module, self, Some(stop), 0)?;
                let lowered = bound(module, self, Some(step), 1)?;
                if module.kind(lowered) == &NodeKind::Const(Constant::Int(0)) {
                    return Err(CompileError::unsupported("`range` with a zero step", step.span));
                }
                Ok((start, stop, lowered))
            }
            _ => Err(CompileError::unsupported(
                format!("`range` with {} arguments", args.len()),
                span,
            )),
        }
    }

    /// Lower an assignment target; plain names become locals when `declare`
    fn lower_target(&mut self, module: &mut Module, target: &Expr, declare: bool) -> CompileResult<NodeId> {
        match &target.kind {
            ExprKind::Name(name) => {
                if module.function.argument(name).is_some() {
                    return Ok(module.add(NodeKind::Param(name.clone()), target.span));
                }
                if declare {
                    module.function.declare_local(name);
                }
                Ok(module.add(NodeKind::Var(name.clone()), target.span))
            }
            ExprKind::Subscript { .. } => self.lower_expr(module, target),
            ExprKind::Tuple(_) | ExprKind::List(_) => {
                Err(CompileError::unsupported("tuple assignment", target.span))
            }
            _ => Err(CompileError::unsupported(
                format!("assignment to {}", target.describe()),
                target.span,
            )),
        }
    }

    fn lower_expr(&mut self, module: &mut Module, expr: &Expr) -> CompileResult<NodeId> {
        let span = expr.span;
        let kind = match &expr.kind {
            ExprKind::Int(n) => NodeKind::Const(Constant::Int(*n)),
            ExprKind::Float(n) => NodeKind::Const(Constant::Float(*n)),
            ExprKind::Bool(b) => NodeKind::Const(Constant::Bool(*b)),
            ExprKind::Name(name) => {
                if module.function.argument(name).is_some() {
                    NodeKind::Param(name.clone())
                } else {
                    NodeKind::Var(name.clone())
                }
            }
            ExprKind::Binary { op, left, right } => {
                if *op == BinOp::MatMul {
                    return Err(CompileError::unsupported("`@` matrix multiplication", span));
                }
                NodeKind::Binary {
                    op: *op,
                    left: self.lower_expr(module, left)?,
                    right: self.lower_expr(module, right)?,
                }
            }
            ExprKind::Unary { op, operand } => match (op, &operand.kind) {
                (UnaryOp::Neg, ExprKind::Int(n)) => NodeKind::Const(Constant::Int(-n)),
                (UnaryOp::Neg, ExprKind::Float(n)) => NodeKind::Const(Constant::Float(-n)),
                _ => NodeKind::Unary {
                    op: *op,
                    operand: self.lower_expr(module, operand)?,
                },
            },
            ExprKind::BoolOp { op, left, right } => NodeKind::Logical {
                op: *op,
                left: self.lower_expr(module, left)?,
                right: self.lower_expr(module, right)?,
            },
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => {
                let (op, right) = match (ops.as_slice(), comparators.as_slice()) {
                    ([op], [right]) => (*op, right),
                    _ => return Err(CompileError::unsupported("chained comparison", span)),
                };
                match op {
                    CmpOp::Identity => return Err(CompileError::unsupported("`is` comparison", span)),
                    CmpOp::Membership => return Err(CompileError::unsupported("`in` membership test", span)),
                    _ => {}
                }
                NodeKind::Compare {
                    op,
                    left: self.lower_expr(module, left)?,
                    right: self.lower_expr(module, right)?,
                }
            }
            ExprKind::IfExp { test, body, orelse } => NodeKind::Select {
                test: self.lower_expr(module, test)?,
                body: self.lower_expr(module, body)?,
                orelse: self.lower_expr(module, orelse)?,
            },
            ExprKind::Call {
                func,
                args,
                keywords,
            } => return self.lower_call(module, expr, func, args, keywords),
            ExprKind::Subscript { .. } => return self.lower_index(module, expr),
            ExprKind::Lambda { .. } => {
                let placement = match self.parents.parent(expr.id) {
                    Some(parent) if self.operator_calls.contains(&parent) => {
                        "lambda in place of an array operand"
                    }
                    _ => "lambda outside an operator call",
                };
                return Err(CompileError::unsupported(placement, span));
            }
            ExprKind::Attribute { .. } => {
                let name = expr.dotted_name().unwrap_or_else(|| "attribute".to_string());
                return Err(CompileError::unsupported(format!("attribute access `{}`", name), span));
            }
            ExprKind::NoneLit
            | ExprKind::Str(_)
            | ExprKind::Slice { .. }
            | ExprKind::Tuple(_)
            | ExprKind::List(_)
            | ExprKind::Dict
            | ExprKind::ListComp => {
                return Err(CompileError::unsupported(expr.describe(), span));
            }
        };
        Ok(module.add(kind, span))
    }

    /// `a[i][j]` and `a[i, j]` both become one multi-index node
    fn lower_index(&mut self, module: &mut Module, expr: &Expr) -> CompileResult<NodeId> {
        let mut levels = Vec::new();
        let mut base = expr;
        while let ExprKind::Subscript { value, index } = &base.kind {
            levels.push(index.as_ref());
            base = value;
        }
        levels.reverse();

        let base_id = self.lower_expr(module, base)?;
        let mut indices = Vec::new();
        for index in levels {
            let parts = match &index.kind {
                ExprKind::Tuple(items) => items.iter().collect::<Vec<_>>(),
                _ => vec![index],
            };
            for part in parts {
                if matches!(part.kind, ExprKind::Slice { .. }) {
                    return Err(CompileError::unsupported("slice", part.span));
                }
                indices.push(self.lower_expr(module, part)?);
            }
        }

        Ok(module.add(
            NodeKind::Index {
                base: base_id,
                indices,
            },
            expr.span,
        ))
    }

    fn lower_call(
        &mut self,
        module: &mut Module,
        call: &Expr,
        func: &Expr,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> CompileResult<NodeId> {
        let span = call.span;
        if !keywords.is_empty() {
            return Err(CompileError::unsupported(
                format!("keyword argument `{}`", keywords[0].name),
                keywords[0].value.span,
            ));
        }

        match &func.kind {
            ExprKind::Name(name) => {
                if name == "range" {
                    return Err(CompileError::unsupported("`range` outside a `for` loop", span));
                }
                if name == "len" {
                    return self.fold_len(module, call, args);
                }
                if let Some(kind) = classify_operator(name) {
                    return self.lower_operator(module, call, kind, None, args);
                }
            }
            ExprKind::Attribute { value, attr } => {
                let is_library = value
                    .as_name()
                    .map_or(false, |base| LIBRARY_MODULES.contains(&base));
                if !is_library {
                    if let Some(kind) = classify_operator(attr) {
                        return self.lower_operator(module, call, kind, Some(value), args);
                    }
                }
            }
            _ => {}
        }

        let name = func
            .dotted_name()
            .ok_or_else(|| CompileError::unsupported("call of a computed function", span))?;
        let args = args
            .iter()
            .map(|arg| self.lower_expr(module, arg))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(module.add(NodeKind::Call { func: name, args }, span))
    }

    /// `len(a)` of an array parameter is its leading dimension
    fn fold_len(&mut self, module: &mut Module, call: &Expr, args: &[Expr]) -> CompileResult<NodeId> {
        let length = match args {
            [arg] => arg
                .as_name()
                .and_then(|name| module.function.argument(name))
                .and_then(|descriptor| descriptor.shape.first().copied()),
            _ => None,
        };
        let length = length.ok_or_else(|| {
            CompileError::unsupported("`len` of something other than an array parameter", call.span)
        })?;
        Ok(module.add(NodeKind::Const(Constant::Int(length as i64)), call.span))
    }

    fn lower_operator(
        &mut self,
        module: &mut Module,
        call: &Expr,
        kind: OperatorKind,
        receiver: Option<&Expr>,
        args: &[Expr],
    ) -> CompileResult<NodeId> {
        let span = call.span;
        if self.lambda_depth > 0 {
            return Err(CompileError::unsupported(
                format!("`{}` inside a lambda", kind),
                span,
            ));
        }
        self.operator_calls.insert(call.id);

        let arity_error = || {
            let given = args.len() + usize::from(receiver.is_some());
            CompileError::unsupported(format!("`{}` with {} operand(s)", kind, given), span)
        };

        // Method calls supply the first array operand as the receiver
        let (func, operands): (Option<&Expr>, Vec<&Expr>) = match kind {
            OperatorKind::Map | OperatorKind::Reduce => {
                let (func, rest) = args.split_first().ok_or_else(arity_error)?;
                (Some(func), receiver.into_iter().chain(rest).collect())
            }
            OperatorKind::Dot => (None, receiver.into_iter().chain(args).collect()),
        };

        let node = match kind {
            OperatorKind::Map => {
                let func = func.ok_or_else(arity_error)?;
                if operands.is_empty() {
                    return Err(arity_error());
                }
                let inputs = operands
                    .iter()
                    .map(|operand| self.lower_expr(module, operand))
                    .collect::<CompileResult<Vec<_>>>()?;
                let func = self.lower_lambda(module, func)?;
                NodeKind::Map { func, inputs }
            }
            OperatorKind::Dot => match operands.as_slice() {
                [left, right] => NodeKind::Dot {
                    left: self.lower_expr(module, left)?,
                    right: self.lower_expr(module, right)?,
                },
                _ => return Err(arity_error()),
            },
            OperatorKind::Reduce => {
                let func = func.ok_or_else(arity_error)?;
                let (input, init) = match operands.as_slice() {
                    [input] => (*input, None),
                    [input, init] => (*input, Some(*init)),
                    _ => return Err(arity_error()),
                };
                let input = self.lower_expr(module, input)?;
                let init = init.map(|init| self.lower_expr(module, init)).transpose()?;
                let func = self.lower_lambda(module, func)?;
                NodeKind::Reduce { func, input, init }
            }
        };
        Ok(module.add(node, span))
    }

    fn lower_lambda(&mut self, module: &mut Module, func: &Expr) -> CompileResult<Lambda> {
        let ExprKind::Lambda { params, body } = &func.kind else {
            return Err(CompileError::unsupported(
                format!("operator function given as {} (expected a lambda)", func.describe()),
                func.span,
            ));
        };
        self.lambda_depth += 1;
        let body = self.lower_expr(module, body);
        self.lambda_depth -= 1;
        Ok(Lambda {
            params: params.clone(),
            body: body?,
        })
    }
}

fn is_docstring(stmt: &Stmt) -> bool {
    matches!(
        &stmt.kind,
        StmtKind::Expr(Expr {
            kind: ExprKind::Str(_),
            ..
        })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{extract_arguments, ArgSpec};
    use crate::parser::parse_module;

    fn analyze(source: &str, args: &[ArgSpec]) -> CompileResult<Module> {
        let ast = parse_module(source)?;
        let parents = ParentMap::link(&ast);
        let params = kernel_definition(&ast)?.params.clone();
        let arguments = extract_arguments(&params, args)?;
        Analyzer::new(&parents).analyze(&ast, arguments)
    }

    fn vec4() -> ArgSpec {
        ArgSpec::named("float32", &[4])
    }

    fn unsupported_construct(result: CompileResult<Module>) -> String {
        match result {
            Err(CompileError::UnsupportedSyntaxError { construct, .. }) => construct,
            other => panic!("expected unsupported syntax, got {:?}", other.map(|m| m.to_string())),
        }
    }

    #[test]
    fn test_lower_simple_loop() {
        let module = analyze(
            "def vadd(a, b, c):\n    \"\"\"Add vectors.\"\"\"\n    for i in range(4):\n        c[i] = a[i] + b[i]\n",
            &[vec4(), vec4(), vec4()],
        )
        .unwrap();
        assert_eq!(module.function.name, "vadd");
        assert_eq!(module.body.len(), 1);
        match module.kind(module.body[0]) {
            NodeKind::For { var, start, stop, step, body } => {
                assert_eq!(var, "i");
                assert_eq!(module.kind(*start), &NodeKind::Const(Constant::Int(0)));
                assert_eq!(module.kind(*stop), &NodeKind::Const(Constant::Int(4)));
                assert_eq!(module.kind(*step), &NodeKind::Const(Constant::Int(1)));
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected loop, got {:?}", other),
        }
        assert!(module.function.locals.is_empty());
    }

    #[test]
    fn test_method_chain_operators() {
        let module = analyze(
            "def f(a, b):\n    return a.map(lambda x: x * x).dot(b)\n",
            &[vec4(), vec4()],
        )
        .unwrap();
        let NodeKind::Return(Some(value)) = module.kind(module.body[0]) else {
            panic!("expected return");
        };
        let NodeKind::Dot { left, right } = module.kind(*value) else {
            panic!("expected dot");
        };
        assert!(matches!(module.kind(*left), NodeKind::Map { .. }));
        assert_eq!(module.kind(*right), &NodeKind::Param("b".into()));
    }

    #[test]
    fn test_multi_index_and_len() {
        let module = analyze(
            "def f(m):\n    s = 0\n    for i in range(len(m)):\n        s += m[i][1] + m[i, 0]\n    return s\n",
            &[ArgSpec::named("int32", &[3, 2])],
        )
        .unwrap();
        assert_eq!(module.function.locals.len(), 1);
        let NodeKind::For { stop, body, .. } = module.kind(module.body[1]) else {
            panic!("expected loop");
        };
        assert_eq!(module.kind(*stop), &NodeKind::Const(Constant::Int(3)));
        let NodeKind::AugAssign { value, .. } = module.kind(body[0]) else {
            panic!("expected augmented assignment");
        };
        let NodeKind::Binary { left, right, .. } = module.kind(*value) else {
            panic!("expected binary");
        };
        for index in [left, right] {
            assert!(matches!(module.kind(*index), NodeKind::Index { indices, .. } if indices.len() == 2));
        }
    }

    #[test]
    fn test_rejects_foreign_statements() {
        let construct = unsupported_construct(analyze(
            "def f(a):\n    import os\n    return a[0]\n",
            &[vec4()],
        ));
        assert_eq!(construct, "`import` statement");

        let construct = unsupported_construct(analyze(
            "def f(a):\n    b = [x for x in a]\n",
            &[vec4()],
        ));
        assert_eq!(construct, "list comprehension");
    }

    #[test]
    fn test_rejects_misplaced_constructs() {
        let construct = unsupported_construct(analyze("def f(a):\n    break\n", &[vec4()]));
        assert_eq!(construct, "`break` outside a loop");

        let construct = unsupported_construct(analyze(
            "def f(a):\n    g = lambda x: x\n",
            &[vec4()],
        ));
        assert_eq!(construct, "lambda outside an operator call");

        let construct = unsupported_construct(analyze(
            "def f(a):\n    def g(x):\n        return x\n",
            &[vec4()],
        ));
        assert!(construct.starts_with("nested function definition"));
    }

    #[test]
    fn test_break_inside_loop_is_accepted() {
        let module = analyze(
            "def f(a):\n    for i in range(4):\n        if a[i] > 0.0:\n            break\n",
            &[vec4()],
        );
        assert!(module.is_ok());
    }

    #[test]
    fn test_zero_range_step_is_rejected() {
        let err = analyze("def f(a):\n    for i in range(0, 4, 0):\n        a[i] = 0.0\n", &[vec4()]).unwrap_err();
        assert_eq!(err.location(), Some(Span::new(2, 26)));
        assert_eq!(unsupported_construct(Err(err)), "`range` with a zero step");

        assert!(analyze("def f(a):\n    for i in range(3, 0, -1):\n        a[i] = 0.0\n", &[vec4()]).is_ok());
    }

    #[test]
    fn test_error_location() {
        let err = analyze("def f(a):\n    x = a[0]\n    y = a[1:2]\n", &[vec4()]).unwrap_err();
        assert_eq!(err.location(), Some(Span::new(3, 11)));
    }

    #[test]
    fn test_single_definition_required() {
        let source = "def f(a):\n    pass\n\ndef g(a):\n    pass\n";
        let ast = parse_module(source).unwrap();
        assert!(kernel_definition(&ast).is_err());

        let ast = parse_module("import numpy as np\n\ndef f(a):\n    pass\n").unwrap();
        assert_eq!(kernel_definition(&ast).unwrap().name, "f");
    }
}
