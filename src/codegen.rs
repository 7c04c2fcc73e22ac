//! HLS C code generator
//!
//! Renders the final IR as a single synthesizable C++ function. Array
//! operators become loop nests: every operator inside a statement is hoisted
//! in evaluation order into a temporary before the statement itself is
//! emitted, except that a map assigned to an array is written straight into
//! its target.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use tracing::debug;

use crate::ast::{BinOp, BoolOp, CmpOp, Span, UnaryOp};
use crate::error::{CompileError, CompileResult};
use crate::hardware::{CompileMetadata, HardwareType, Pragma};
use crate::ir::{Constant, Lambda, Module, NodeId, NodeKind, Operand, OperatorConfig};
use crate::operators::{classify_intrinsic, ElementwiseOp, Intrinsic, MathFn};

const HEADERS: [&str; 3] = ["ap_int.h", "ap_fixed.h", "hls_math.h"];
const INDENT: &str = "    ";

/// Metadata for a generated kernel
pub fn kernel_metadata(module: &Module, project_path: PathBuf) -> CompileMetadata {
    CompileMetadata {
        project_path,
        top_function_name: module.function.name.clone(),
        num_bundles: module.function.parameters().filter(|arg| arg.is_array()).count(),
        returns_void: module.function.return_type.is_none(),
    }
}

/// Code generator for one kernel
pub struct CodeGenerator<'m> {
    module: &'m Module,
    out: String,
    depth: usize,
    /// Enclosing source loops
    loops: usize,
    temps: usize,
    /// Operators already emitted, by the temporary holding their result
    hoisted: HashMap<NodeId, String>,
    /// Lambda parameters bound to element expressions, innermost last
    bindings: Vec<HashMap<String, String>>,
}

impl<'m> CodeGenerator<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            out: String::new(),
            depth: 0,
            loops: 0,
            temps: 0,
            hoisted: HashMap::new(),
            bindings: Vec::new(),
        }
    }

    /// Render the kernel as HLS C++
    pub fn generate(mut self) -> CompileResult<String> {
        let module = self.module;
        let function = &module.function;
        if !function.return_shape.is_empty() {
            return Err(CompileError::codegen(format!(
                "`{}` returns an array; write results into an argument instead",
                function.name
            )));
        }

        for header in HEADERS {
            self.line(format!("#include <{}>", header));
        }
        self.line("");

        let return_type = function
            .return_type
            .map(|ty| ty.c_type())
            .unwrap_or_else(|| "void".to_string());
        let params: Vec<String> = function
            .parameters()
            .map(|arg| declarator(&arg.hardware_type, &arg.name, &arg.shape))
            .collect();
        self.line(format!("{} {}({}) {{", return_type, function.name, params.join(", ")));
        self.depth += 1;

        let mut bundle = 0;
        for arg in function.parameters() {
            if arg.is_array() {
                self.line(format!(
                    "#pragma HLS INTERFACE m_axi port={} offset=slave bundle=gmem{}",
                    arg.name, bundle
                ));
                bundle += 1;
            } else {
                self.line(format!("#pragma HLS INTERFACE s_axilite port={}", arg.name));
            }
        }
        self.line("#pragma HLS INTERFACE s_axilite port=return");

        if !function.locals.is_empty() {
            self.line("");
        }
        for local in &function.locals {
            let ty = local.ty.ok_or_else(|| {
                CompileError::codegen(format!("local `{}` has no type", local.name))
            })?;
            self.line(format!("{};", declarator(&ty, &local.name, &local.shape)));
        }
        self.line("");

        self.block(&module.body)?;

        self.depth -= 1;
        self.line("}");

        debug!(
            function = %module.function.name,
            bytes = self.out.len(),
            temporaries = self.temps,
            "generated HLS C"
        );
        Ok(self.out)
    }

    fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    fn pragmas(&mut self, pragmas: &[Pragma]) {
        for pragma in pragmas {
            self.line(pragma.render());
        }
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let name = format!("{}{}", prefix, self.temps);
        self.temps += 1;
        name
    }

    fn ty(&self, id: NodeId) -> CompileResult<HardwareType> {
        let node = self.module.node(id);
        node.ty.ok_or_else(|| {
            CompileError::codegen(format!("expression at {} has no resolved type", node.span))
        })
    }

    // Statements

    fn block(&mut self, body: &[NodeId]) -> CompileResult<()> {
        for &stmt in body {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, id: NodeId) -> CompileResult<()> {
        let module = self.module;
        let node = module.node(id);
        match &node.kind {
            NodeKind::Assign { target, value } => {
                if module.node(*target).shape.is_empty() {
                    self.hoist(*value)?;
                    let target = self.expr(*target)?;
                    let value = self.expr(*value)?;
                    self.line(format!("{} = {};", target, value));
                } else {
                    self.array_assign(*target, *value)?;
                }
            }
            NodeKind::AugAssign { target, op, value } => {
                self.hoist(*value)?;
                let target_text = self.expr(*target)?;
                let value_text = self.expr(*value)?;
                match compound_operator(*op, &self.ty(*target)?) {
                    Some(symbol) => self.line(format!("{} {}= {};", target_text, symbol, value_text)),
                    None => {
                        let ty = self.ty(*target)?;
                        let combined = binary(*op, &target_text, &value_text, &ty, node.span)?;
                        self.line(format!("{} = {};", target_text, combined));
                    }
                }
            }
            NodeKind::If { test, body, orelse } => {
                self.hoist(*test)?;
                let test = self.expr(*test)?;
                self.line(format!("if ({}) {{", test));
                self.nested(body)?;
                if !orelse.is_empty() {
                    self.line("} else {");
                    self.nested(orelse)?;
                }
                self.line("}");
            }
            NodeKind::For {
                var,
                start,
                stop,
                step,
                body,
            } => {
                for &bound in &[*start, *stop, *step] {
                    self.no_operators(bound, "loop bounds")?;
                }
                let start = self.expr(*start)?;
                let stop_text = self.expr(*stop)?;
                let (compare, increment) = match module.kind(*step) {
                    NodeKind::Const(Constant::Int(1)) => ("<", format!("{}++", var)),
                    NodeKind::Const(Constant::Int(-1)) => (">", format!("{}--", var)),
                    NodeKind::Const(Constant::Int(n)) if *n < 0 => (">", format!("{} -= {}", var, -n)),
                    _ => ("<", format!("{} += {}", var, self.expr(*step)?)),
                };
                self.line(format!(
                    "for (int {var} = {start}; {var} {compare} {stop}; {increment}) {{",
                    var = var,
                    start = start,
                    compare = compare,
                    stop = stop_text,
                    increment = increment
                ));
                self.loop_body(&node.pragmas, body)?;
            }
            NodeKind::While { test, body } => {
                self.no_operators(*test, "a `while` condition")?;
                let test = self.expr(*test)?;
                self.line(format!("while ({}) {{", test));
                self.loop_body(&node.pragmas, body)?;
            }
            NodeKind::Return(value) => match value {
                Some(value) => {
                    if !module.node(*value).shape.is_empty() {
                        return Err(CompileError::codegen(format!(
                            "array return at {}",
                            node.span
                        )));
                    }
                    self.hoist(*value)?;
                    let value = self.expr(*value)?;
                    self.line(format!("return {};", value));
                }
                None => self.line("return;"),
            },
            NodeKind::Break | NodeKind::Continue => {
                let keyword = if matches!(node.kind, NodeKind::Break) {
                    "break"
                } else {
                    "continue"
                };
                if self.loops == 0 {
                    return Err(CompileError::codegen(format!(
                        "`{}` outside a loop at {}",
                        keyword, node.span
                    )));
                }
                self.line(format!("{};", keyword));
            }
            NodeKind::Pass => {}
            NodeKind::ExprStmt(expr) => {
                self.hoist(*expr)?;
                if !module.node(*expr).is_operator() {
                    let text = self.expr(*expr)?;
                    self.line(format!("{};", text));
                }
            }
            _ => {
                return Err(CompileError::codegen(format!(
                    "expression in statement position at {}",
                    node.span
                )))
            }
        }
        Ok(())
    }

    fn nested(&mut self, body: &[NodeId]) -> CompileResult<()> {
        self.depth += 1;
        let result = self.block(body);
        self.depth -= 1;
        result
    }

    fn loop_body(&mut self, pragmas: &[Pragma], body: &[NodeId]) -> CompileResult<()> {
        self.depth += 1;
        self.pragmas(pragmas);
        self.loops += 1;
        let result = self.block(body);
        self.loops -= 1;
        self.depth -= 1;
        result?;
        self.line("}");
        Ok(())
    }

    fn no_operators(&self, id: NodeId, place: &str) -> CompileResult<()> {
        let module = self.module;
        match module.subtree(id).into_iter().find(|&n| module.node(n).is_operator()) {
            Some(op) => Err(CompileError::codegen(format!(
                "array operator in {} at {}",
                place,
                module.node(op).span
            ))),
            None => Ok(()),
        }
    }

    /// Whole-array assignment: operators write into the target, anything
    /// else is copied element by element
    fn array_assign(&mut self, target: NodeId, value: NodeId) -> CompileResult<()> {
        let module = self.module;
        let target_text = self.expr(target)?;
        let writes_array = match module.kind(value) {
            NodeKind::Map { .. } => true,
            NodeKind::Fused { stages } => matches!(
                stages.last().map(|stage| &stage.config),
                Some(OperatorConfig::Map { .. })
            ),
            _ => false,
        };
        if writes_array {
            self.hoist_operands(value)?;
            self.operator(value, Some(target_text))?;
            return Ok(());
        }

        self.hoist(value)?;
        let value_text = self.expr(value)?;
        let shape = module.node(target).shape.clone();
        let index = self.open_nest(&shape, &[]);
        self.line(format!("{}{} = {}{};", target_text, index, value_text, index));
        self.close_nest(shape.len());
        Ok(())
    }

    // Loop nests

    /// Open one loop per dimension, returning the element subscript
    fn open_nest(&mut self, shape: &[usize], pragmas: &[Pragma]) -> String {
        let mut index = String::new();
        for (d, extent) in shape.iter().enumerate() {
            self.line(format!(
                "for (int __i{d} = 0; __i{d} < {extent}; __i{d}++) {{",
                d = d,
                extent = extent
            ));
            self.depth += 1;
            let _ = write!(index, "[__i{}]", d);
        }
        self.pragmas(pragmas);
        index
    }

    fn close_nest(&mut self, dims: usize) {
        for _ in 0..dims {
            self.depth -= 1;
            self.line("}");
        }
    }

    /// Condition that holds on the first iteration of a nest
    fn first_iteration(dims: usize) -> String {
        (0..dims)
            .map(|d| format!("__i{} == 0", d))
            .collect::<Vec<_>>()
            .join(" && ")
    }

    // Operators

    /// Emit every operator below `id` (and `id` itself) ahead of the
    /// statement that uses it
    fn hoist(&mut self, id: NodeId) -> CompileResult<()> {
        let module = self.module;
        let node = module.node(id);
        if node.is_operator() {
            self.hoist_operands(id)?;
            let result = self.operator(id, None)?;
            self.hoisted.insert(id, result);
            return Ok(());
        }
        for child in node.children() {
            self.hoist(child)?;
        }
        Ok(())
    }

    fn hoist_operands(&mut self, id: NodeId) -> CompileResult<()> {
        let module = self.module;
        let operands: Vec<NodeId> = match module.kind(id) {
            NodeKind::Map { inputs, .. } => inputs.clone(),
            NodeKind::Dot { left, right } => vec![*left, *right],
            NodeKind::Reduce { input, init, .. } => std::iter::once(*input).chain(*init).collect(),
            NodeKind::Fused { stages } => stages
                .iter()
                .flat_map(|stage| {
                    let init = match &stage.config {
                        OperatorConfig::Reduce { init, .. } => *init,
                        _ => None,
                    };
                    stage
                        .operands
                        .iter()
                        .filter_map(|operand| match operand {
                            Operand::Node(id) => Some(*id),
                            Operand::Chained => None,
                        })
                        .chain(init)
                        .collect::<Vec<_>>()
                })
                .collect(),
            _ => Vec::new(),
        };
        for operand in operands {
            self.hoist(operand)?;
        }
        Ok(())
    }

    /// Emit one operator; returns the array or scalar holding its result
    fn operator(&mut self, id: NodeId, dest: Option<String>) -> CompileResult<String> {
        let module = self.module;
        let node = module.node(id);
        let ty = self.ty(id)?;
        match &node.kind {
            NodeKind::Map { func, inputs } => {
                let dest = self.array_dest(dest, &ty, &node.shape);
                let index = self.open_nest(&node.shape, &node.pragmas);
                let elements = self.elements(inputs, &index)?;
                let value = self.apply(func, elements)?;
                self.line(format!("{}{} = {};", dest, index, value));
                self.close_nest(node.shape.len());
                Ok(dest)
            }
            NodeKind::Dot { left, right } => {
                let acc = self.fresh("__t");
                self.line(format!("{} {} = 0;", ty.c_type(), acc));
                let shape = module.node(*left).shape.clone();
                let index = self.open_nest(&shape, &node.pragmas);
                let l = self.expr(*left)?;
                let r = self.expr(*right)?;
                self.line(format!("{} += {}{} * {}{};", acc, l, index, r, index));
                self.close_nest(shape.len());
                Ok(acc)
            }
            NodeKind::Reduce { func, input, init } => {
                let acc = self.accumulator(&ty, *init)?;
                let shape = module.node(*input).shape.clone();
                let index = self.open_nest(&shape, &node.pragmas);
                let element = format!("{}{}", self.expr(*input)?, index);
                self.reduce_step(func, &acc, element, init.is_none(), shape.len())?;
                self.close_nest(shape.len());
                Ok(acc)
            }
            NodeKind::Fused { stages } => {
                let (first, tail) = match (stages.first(), stages.last()) {
                    (Some(first), Some(tail)) => (first, tail),
                    _ => return Err(CompileError::codegen("empty fused operator")),
                };
                let shape = first.shape.clone();
                let result = match &tail.config {
                    OperatorConfig::Map { .. } => self.array_dest(dest, &ty, &node.shape),
                    OperatorConfig::Dot => {
                        let acc = self.fresh("__t");
                        self.line(format!("{} {} = 0;", ty.c_type(), acc));
                        acc
                    }
                    OperatorConfig::Reduce { init, .. } => self.accumulator(&ty, *init)?,
                };

                let index = self.open_nest(&shape, &node.pragmas);
                let mut chained = String::new();
                for (k, stage) in stages.iter().enumerate() {
                    let mut operands = Vec::with_capacity(stage.operands.len());
                    for operand in &stage.operands {
                        operands.push(match operand {
                            Operand::Chained => chained.clone(),
                            Operand::Node(input) => format!("{}{}", self.expr(*input)?, index),
                        });
                    }
                    let last = k + 1 == stages.len();
                    match &stage.config {
                        OperatorConfig::Map { func } => {
                            let value = self.apply(func, operands)?;
                            if last {
                                self.line(format!("{}{} = {};", result, index, value));
                            } else {
                                let stage_ty = stage.ty.ok_or_else(|| {
                                    CompileError::codegen("fused stage has no resolved type")
                                })?;
                                let scalar = self.fresh("__s");
                                self.line(format!("{} {} = {};", stage_ty.c_type(), scalar, value));
                                chained = scalar;
                            }
                        }
                        OperatorConfig::Dot => {
                            self.line(format!("{} += {} * {};", result, operands[0], operands[1]));
                        }
                        OperatorConfig::Reduce { func, init } => {
                            let element = operands.into_iter().next().unwrap_or_default();
                            self.reduce_step(func, &result, element, init.is_none(), shape.len())?;
                        }
                    }
                }
                self.close_nest(shape.len());
                Ok(result)
            }
            _ => Err(CompileError::codegen(format!(
                "expected an array operator at {}",
                node.span
            ))),
        }
    }

    fn array_dest(&mut self, dest: Option<String>, ty: &HardwareType, shape: &[usize]) -> String {
        dest.unwrap_or_else(|| {
            let temp = self.fresh("__t");
            self.line(format!("{};", declarator(ty, &temp, shape)));
            temp
        })
    }

    fn accumulator(&mut self, ty: &HardwareType, init: Option<NodeId>) -> CompileResult<String> {
        let acc = self.fresh("__t");
        match init {
            Some(init) => {
                let init = self.expr(init)?;
                self.line(format!("{} {} = {};", ty.c_type(), acc, init));
            }
            None => self.line(format!("{} {};", ty.c_type(), acc)),
        }
        Ok(acc)
    }

    /// One reduction update; without an initial value the first element
    /// seeds the accumulator
    fn reduce_step(
        &mut self,
        func: &Lambda,
        acc: &str,
        element: String,
        seed: bool,
        dims: usize,
    ) -> CompileResult<()> {
        let update = self.apply(func, vec![acc.to_string(), element.clone()])?;
        if seed {
            self.line(format!("if ({}) {{", Self::first_iteration(dims)));
            self.line(format!("{}{} = {};", INDENT, acc, element));
            self.line("} else {");
            self.line(format!("{}{} = {};", INDENT, acc, update));
            self.line("}");
        } else {
            self.line(format!("{} = {};", acc, update));
        }
        Ok(())
    }

    fn elements(&mut self, inputs: &[NodeId], index: &str) -> CompileResult<Vec<String>> {
        inputs
            .iter()
            .map(|&input| Ok(format!("{}{}", self.expr(input)?, index)))
            .collect()
    }

    /// Render a lambda body with its parameters bound to `args`
    fn apply(&mut self, func: &Lambda, args: Vec<String>) -> CompileResult<String> {
        if func.params.len() != args.len() {
            return Err(CompileError::codegen(format!(
                "lambda takes {} parameter(s), operator supplies {}",
                func.params.len(),
                args.len()
            )));
        }
        self.bindings
            .push(func.params.iter().cloned().zip(args).collect());
        let body = self.expr(func.body);
        self.bindings.pop();
        body
    }

    // Expressions

    fn expr(&mut self, id: NodeId) -> CompileResult<String> {
        if let Some(temp) = self.hoisted.get(&id) {
            return Ok(temp.clone());
        }
        let module = self.module;
        let node = module.node(id);
        let text = match &node.kind {
            NodeKind::Const(value) => match value {
                Constant::Int(n) => n.to_string(),
                Constant::Float(x) => format!("{:?}", x),
                Constant::Bool(b) => b.to_string(),
            },
            NodeKind::Param(name) => name.clone(),
            NodeKind::Var(name) => self
                .bindings
                .iter()
                .rev()
                .find_map(|scope| scope.get(name).cloned())
                .unwrap_or_else(|| name.clone()),
            NodeKind::Index { base, indices } => {
                let mut text = self.expr(*base)?;
                for &index in indices {
                    let index = self.expr(index)?;
                    let _ = write!(text, "[{}]", index);
                }
                text
            }
            NodeKind::Binary { op, left, right } => {
                let l = self.expr(*left)?;
                let r = self.expr(*right)?;
                binary(*op, &l, &r, &self.ty(id)?, node.span)?
            }
            NodeKind::Compare { op, left, right } => {
                let symbol = match op {
                    CmpOp::Eq => "==",
                    CmpOp::NotEq => "!=",
                    CmpOp::Lt => "<",
                    CmpOp::LtE => "<=",
                    CmpOp::Gt => ">",
                    CmpOp::GtE => ">=",
                    CmpOp::Identity | CmpOp::Membership => {
                        return Err(CompileError::codegen(format!(
                            "identity or membership test at {}",
                            node.span
                        )))
                    }
                };
                format!("({} {} {})", self.expr(*left)?, symbol, self.expr(*right)?)
            }
            NodeKind::Logical { op, left, right } => {
                let symbol = match op {
                    BoolOp::And => "&&",
                    BoolOp::Or => "||",
                };
                format!("({} {} {})", self.expr(*left)?, symbol, self.expr(*right)?)
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.expr(*operand)?;
                match op {
                    UnaryOp::Neg => format!("(-{})", operand),
                    UnaryOp::Plus => operand,
                    UnaryOp::Not => format!("(!{})", operand),
                    UnaryOp::Invert => format!("(~{})", operand),
                }
            }
            NodeKind::Select { test, body, orelse } => format!(
                "({} ? {} : {})",
                self.expr(*test)?,
                self.expr(*body)?,
                self.expr(*orelse)?
            ),
            NodeKind::Call { func, args } => {
                let mut rendered = Vec::with_capacity(args.len());
                for &arg in args {
                    rendered.push(self.expr(arg)?);
                }
                self.call(func, &rendered, id)?
            }
            NodeKind::Map { .. } | NodeKind::Dot { .. } | NodeKind::Reduce { .. } | NodeKind::Fused { .. } => {
                return Err(CompileError::codegen(format!(
                    "array operator at {} was not emitted",
                    node.span
                )))
            }
            _ => {
                return Err(CompileError::codegen(format!(
                    "statement in expression position at {}",
                    node.span
                )))
            }
        };
        Ok(text)
    }

    fn call(&self, func: &str, args: &[String], id: NodeId) -> CompileResult<String> {
        let span = self.module.node(id).span;
        let intrinsic = classify_intrinsic(func).ok_or_else(|| {
            CompileError::codegen(format!("call to `{}` at {} has no HLS equivalent", func, span))
        })?;
        if args.len() != intrinsic.arity() {
            return Err(CompileError::codegen(format!(
                "`{}` at {} takes {} argument(s)",
                func,
                span,
                intrinsic.arity()
            )));
        }
        let text = match intrinsic {
            Intrinsic::Math(MathFn::Min) | Intrinsic::Elementwise(ElementwiseOp::Minimum) => {
                format!("({a} < {b} ? {a} : {b})", a = args[0], b = args[1])
            }
            Intrinsic::Math(MathFn::Max) | Intrinsic::Elementwise(ElementwiseOp::Maximum) => {
                format!("({a} > {b} ? {a} : {b})", a = args[0], b = args[1])
            }
            Intrinsic::Math(math) => match math.hls_name() {
                Some(name) => format!("{}({})", name, args[0]),
                None => return Err(CompileError::codegen(format!("`{}` has no HLS equivalent", func))),
            },
            Intrinsic::Elementwise(op) => {
                let op = match op {
                    ElementwiseOp::Add => BinOp::Add,
                    ElementwiseOp::Subtract => BinOp::Sub,
                    ElementwiseOp::Multiply => BinOp::Mul,
                    _ => BinOp::Div,
                };
                binary(op, &args[0], &args[1], &self.ty(id)?, span)?
            }
            Intrinsic::Dot | Intrinsic::Sum => {
                return Err(CompileError::codegen(format!(
                    "`{}` at {} applied to scalars",
                    func, span
                )))
            }
        };
        Ok(text)
    }
}

/// `T name` or `T name[d0][d1]...`
fn declarator(ty: &HardwareType, name: &str, shape: &[usize]) -> String {
    let mut text = format!("{} {}", ty.c_type(), name);
    for extent in shape {
        let _ = write!(text, "[{}]", extent);
    }
    text
}

/// C compound-assignment operator, when one has the source semantics
fn compound_operator(op: BinOp, ty: &HardwareType) -> Option<&'static str> {
    match op {
        BinOp::Add => Some("+"),
        BinOp::Sub => Some("-"),
        BinOp::Mul => Some("*"),
        BinOp::Div => Some("/"),
        BinOp::FloorDiv if ty.is_integral() => Some("/"),
        BinOp::Mod if ty.is_integral() => Some("%"),
        BinOp::BitAnd => Some("&"),
        BinOp::BitOr => Some("|"),
        BinOp::BitXor => Some("^"),
        BinOp::Shl => Some("<<"),
        BinOp::Shr => Some(">>"),
        BinOp::FloorDiv | BinOp::Mod | BinOp::Pow | BinOp::MatMul => None,
    }
}

fn binary(op: BinOp, l: &str, r: &str, ty: &HardwareType, span: Span) -> CompileResult<String> {
    let text = match op {
        BinOp::Pow => format!("hls::pow({}, {})", l, r),
        BinOp::FloorDiv if !ty.is_integral() => format!("hls::floor({} / {})", l, r),
        BinOp::Mod if !ty.is_integral() => format!("hls::fmod({}, {})", l, r),
        BinOp::MatMul => {
            return Err(CompileError::codegen(format!(
                "matrix multiplication operator at {} (use `dot` or loops)",
                span
            )))
        }
        BinOp::FloorDiv => format!("({} / {})", l, r),
        _ => format!("({} {} {})", l, op.symbol(), r),
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{kernel_definition, Analyzer};
    use crate::args::{extract_arguments, ArgSpec};
    use crate::chaining::ChainRewriter;
    use crate::linker::ParentMap;
    use crate::optimizer::Optimizer;
    use crate::parser::parse_module;
    use crate::typer::Typer;
    use pretty_assertions::assert_eq;

    fn lowered(source: &str, args: &[ArgSpec]) -> Module {
        let ast = parse_module(source).unwrap();
        let parents = ParentMap::link(&ast);
        let params = kernel_definition(&ast).unwrap().params.clone();
        let arguments = extract_arguments(&params, args).unwrap();
        let mut module = Analyzer::new(&parents).analyze(&ast, arguments).unwrap();
        Typer::new().run(&mut module).unwrap();
        Optimizer::default().run(&mut module);
        module.relink();
        ChainRewriter::new().run(&mut module);
        module
    }

    fn generate(source: &str, args: &[ArgSpec]) -> CompileResult<String> {
        CodeGenerator::new(&lowered(source, args)).generate()
    }

    fn vec4() -> ArgSpec {
        ArgSpec::named("float32", &[4])
    }

    #[test]
    fn test_signature_and_interfaces() {
        let code = generate(
            "def scale(a, n):\n    for i in range(n):\n        a[i] = a[i] * 2\n",
            &[ArgSpec::named("int16", &[64]), ArgSpec::named("int32", &[])],
        )
        .unwrap();
        assert!(code.starts_with("#include <ap_int.h>\n#include <ap_fixed.h>\n#include <hls_math.h>\n"));
        assert!(code.contains("void scale(short a[64], int n) {"));
        assert!(code.contains("#pragma HLS INTERFACE m_axi port=a offset=slave bundle=gmem0"));
        assert!(code.contains("#pragma HLS INTERFACE s_axilite port=n"));
        assert!(code.contains("#pragma HLS INTERFACE s_axilite port=return"));
        assert!(code.contains("for (int i = 0; i < n; i++) {\n        #pragma HLS pipeline II=1\n"));
        assert!(code.contains("a[i] = (a[i] * 2);"));
    }

    #[test]
    fn test_dot_loop_nest() {
        let code = generate(
            "def vdot(a, b):\n    s = 0.0\n    for i in range(4):\n        s += a[i] * b[i]\n    return s\n",
            &[vec4(), vec4()],
        )
        .unwrap();
        let expected = "\
#include <ap_int.h>
#include <ap_fixed.h>
#include <hls_math.h>

float vdot(float a[4], float b[4]) {
    #pragma HLS INTERFACE m_axi port=a offset=slave bundle=gmem0
    #pragma HLS INTERFACE m_axi port=b offset=slave bundle=gmem1
    #pragma HLS INTERFACE s_axilite port=return

    float s;

    s = 0.0;
    float __t0 = 0;
    for (int __i0 = 0; __i0 < 4; __i0++) {
        #pragma HLS pipeline II=1
        __t0 += a[__i0] * b[__i0];
    }
    s += __t0;
    return s;
}
";
        assert_eq!(code, expected);
    }

    #[test]
    fn test_fused_map_reduce() {
        let code = generate(
            "def sq(a):\n    return a.map(lambda x: x * x).reduce(lambda p, q: p + q)\n",
            &[vec4()],
        )
        .unwrap();
        assert!(code.contains("float __s1 = (a[__i0] * a[__i0]);"));
        assert!(code.contains("if (__i0 == 0) {"));
        assert!(code.contains("__t0 = __s1;"));
        assert!(code.contains("__t0 = (__t0 + __s1);"));
        assert!(code.contains("return __t0;"));
    }

    #[test]
    fn test_map_into_argument() {
        let code = generate(
            "def add(a, b, c):\n    c = map(lambda x, y: x + y, a, b)\n",
            &[vec4(), vec4(), vec4()],
        )
        .unwrap();
        assert!(code.contains("c[__i0] = (a[__i0] + b[__i0]);"));
        assert!(!code.contains("__t"));
    }

    #[test]
    fn test_fixed_point_types() {
        let fixed = ArgSpec::record(["total32bits", "dec16bits"], &[8]);
        let code = generate(
            "def fx(a, b):\n    s = a[0] + b[0]\n    return s\n",
            &[fixed.clone(), fixed],
        )
        .unwrap();
        assert!(code.contains("ap_fixed<34, 16> fx(ap_fixed<32, 16> a[8], ap_fixed<32, 16> b[8]) {"));
        assert!(code.contains("ap_fixed<34, 16> s;"));
    }

    #[test]
    fn test_math_and_floor_division() {
        let code = generate(
            "def m(a):\n    a[0] = math.sqrt(a[1]) + a[2] // 2.0 + max(a[3], 0.0) + a[1] ** 2\n",
            &[vec4()],
        )
        .unwrap();
        assert!(code.contains("hls::sqrt(a[1])"));
        assert!(code.contains("hls::floor(a[2] / 2.0)"));
        assert!(code.contains("(a[3] > 0.0 ? a[3] : 0.0)"));
        assert!(code.contains("hls::pow(a[1], 2)"));
    }

    #[test]
    fn test_unknown_call_rejected() {
        let err = generate("def u(a):\n    return helper(a[0])\n", &[vec4()]).unwrap_err();
        assert!(matches!(err, CompileError::CodeGenError { .. }));
        assert!(err.to_string().contains("`helper`"));
    }

    #[test]
    fn test_metadata() {
        let module = lowered(
            "def k(a, b, n):\n    return a[0] + b[0] + n\n",
            &[vec4(), vec4(), ArgSpec::named("float32", &[])],
        );
        let metadata = kernel_metadata(&module, PathBuf::from("ws/k"));
        assert_eq!(metadata.num_bundles, 2);
        assert!(!metadata.returns_void);
        assert_eq!(metadata.top_function_name, "k");
    }
}
