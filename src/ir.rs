//! Domain IR for hardware kernels
//!
//! A [`Module`] owns an arena of [`Node`]s addressed by [`NodeId`]. Each node
//! owns its children by id (the graph is a tree, ids are never shared) and
//! carries the hardware type and shape resolved by the type propagator.
//! Parent links live in a side table that is rebuilt by [`Module::relink`]
//! after every restructuring pass.

use std::fmt;

use crate::args::{ArgDescriptor, ArgumentMap};
use crate::ast::{BinOp, BoolOp, CmpOp, Span, UnaryOp};
use crate::hardware::{HardwareType, Pragma};
use crate::linker::{ParentMap, Tree};
use crate::operators::OperatorKind;

pub use crate::id::NodeId;

/// Literal values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            // Debug formatting keeps the decimal point on whole numbers
            Constant::Float(n) => write!(f, "{:?}", n),
            Constant::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Element function of an operator; `body` may refer to `params` as `Var`s
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: NodeId,
}

/// Configuration of one array operator, independent of its operands
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorConfig {
    Map { func: Lambda },
    Dot,
    Reduce { func: Lambda, init: Option<NodeId> },
}

impl OperatorConfig {
    pub fn kind(&self) -> OperatorKind {
        match self {
            OperatorConfig::Map { .. } => OperatorKind::Map,
            OperatorConfig::Dot => OperatorKind::Dot,
            OperatorConfig::Reduce { .. } => OperatorKind::Reduce,
        }
    }
}

/// Operand of a fused stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// The element produced by the previous stage
    Chained,
    Node(NodeId),
}

/// One operator of a fused chain
#[derive(Debug, Clone, PartialEq)]
pub struct FusedStage {
    pub config: OperatorConfig,
    pub operands: Vec<Operand>,
    pub ty: Option<HardwareType>,
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // Statements
    Assign {
        target: NodeId,
        value: NodeId,
    },
    AugAssign {
        target: NodeId,
        op: BinOp,
        value: NodeId,
    },
    If {
        test: NodeId,
        body: Vec<NodeId>,
        orelse: Vec<NodeId>,
    },
    /// `for var in range(start, stop, step)`
    For {
        var: String,
        start: NodeId,
        stop: NodeId,
        step: NodeId,
        body: Vec<NodeId>,
    },
    While {
        test: NodeId,
        body: Vec<NodeId>,
    },
    Return(Option<NodeId>),
    Break,
    Continue,
    Pass,
    ExprStmt(NodeId),

    // Expressions
    Const(Constant),
    Param(String),
    /// Local variable, loop variable or lambda parameter
    Var(String),
    /// `base[i0, i1, ...]`
    Index {
        base: NodeId,
        indices: Vec<NodeId>,
    },
    Binary {
        op: BinOp,
        left: NodeId,
        right: NodeId,
    },
    Compare {
        op: CmpOp,
        left: NodeId,
        right: NodeId,
    },
    /// `and` / `or`
    Logical {
        op: BoolOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    /// `body if test else orelse`
    Select {
        test: NodeId,
        body: NodeId,
        orelse: NodeId,
    },
    /// Call to anything that is not an array operator
    Call {
        func: String,
        args: Vec<NodeId>,
    },
    Map {
        func: Lambda,
        inputs: Vec<NodeId>,
    },
    Dot {
        left: NodeId,
        right: NodeId,
    },
    Reduce {
        func: Lambda,
        input: NodeId,
        init: Option<NodeId>,
    },
    Fused {
        stages: Vec<FusedStage>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: Option<HardwareType>,
    /// Array dimensions, empty for scalars
    pub shape: Vec<usize>,
    pub pragmas: Vec<Pragma>,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            ty: None,
            shape: Vec::new(),
            pragmas: Vec::new(),
            span,
        }
    }

    /// Child ids in evaluation order
    pub fn children(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Assign { target, value } | NodeKind::AugAssign { target, value, .. } => {
                vec![*target, *value]
            }
            NodeKind::If { test, body, orelse } => std::iter::once(*test)
                .chain(body.iter().copied())
                .chain(orelse.iter().copied())
                .collect(),
            NodeKind::For {
                start,
                stop,
                step,
                body,
                ..
            } => [*start, *stop, *step]
                .into_iter()
                .chain(body.iter().copied())
                .collect(),
            NodeKind::While { test, body } => {
                std::iter::once(*test).chain(body.iter().copied()).collect()
            }
            NodeKind::Return(value) => value.iter().copied().collect(),
            NodeKind::ExprStmt(expr) => vec![*expr],
            NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Pass
            | NodeKind::Const(_)
            | NodeKind::Param(_)
            | NodeKind::Var(_) => Vec::new(),
            NodeKind::Index { base, indices } => {
                std::iter::once(*base).chain(indices.iter().copied()).collect()
            }
            NodeKind::Binary { left, right, .. }
            | NodeKind::Compare { left, right, .. }
            | NodeKind::Logical { left, right, .. }
            | NodeKind::Dot { left, right } => vec![*left, *right],
            NodeKind::Unary { operand, .. } => vec![*operand],
            NodeKind::Select { test, body, orelse } => vec![*test, *body, *orelse],
            NodeKind::Call { args, .. } => args.clone(),
            NodeKind::Map { func, inputs } => {
                inputs.iter().copied().chain(std::iter::once(func.body)).collect()
            }
            NodeKind::Reduce { func, input, init } => std::iter::once(*input)
                .chain(std::iter::once(func.body))
                .chain(init.iter().copied())
                .collect(),
            NodeKind::Fused { stages } => stages
                .iter()
                .flat_map(|stage| {
                    let operands = stage.operands.iter().filter_map(|operand| match operand {
                        Operand::Node(id) => Some(*id),
                        Operand::Chained => None,
                    });
                    let extras: Vec<NodeId> = match &stage.config {
                        OperatorConfig::Map { func } => vec![func.body],
                        OperatorConfig::Dot => Vec::new(),
                        OperatorConfig::Reduce { func, init } => {
                            std::iter::once(func.body).chain(init.iter().copied()).collect()
                        }
                    };
                    operands.chain(extras).collect::<Vec<_>>()
                })
                .collect(),
        }
    }

    pub fn is_statement(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Assign { .. }
                | NodeKind::AugAssign { .. }
                | NodeKind::If { .. }
                | NodeKind::For { .. }
                | NodeKind::While { .. }
                | NodeKind::Return(_)
                | NodeKind::Break
                | NodeKind::Continue
                | NodeKind::Pass
                | NodeKind::ExprStmt(_)
        )
    }

    pub fn is_loop(&self) -> bool {
        matches!(self.kind, NodeKind::For { .. } | NodeKind::While { .. })
    }

    /// Map, Dot, Reduce or a fused chain of them
    pub fn is_operator(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Map { .. } | NodeKind::Dot { .. } | NodeKind::Reduce { .. } | NodeKind::Fused { .. }
        )
    }

    /// Array inputs of an unfused operator
    pub fn operator_inputs(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Map { inputs, .. } => inputs.clone(),
            NodeKind::Dot { left, right } => vec![*left, *right],
            NodeKind::Reduce { input, .. } => vec![*input],
            _ => Vec::new(),
        }
    }
}

/// A local variable of the kernel
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVar {
    pub name: String,
    pub ty: Option<HardwareType>,
    pub shape: Vec<usize>,
}

/// Function-level metadata
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    /// Parameter names in declaration order
    pub params: Vec<String>,
    pub arguments: ArgumentMap,
    /// Locals in order of first assignment
    pub locals: Vec<LocalVar>,
    pub return_type: Option<HardwareType>,
    pub return_shape: Vec<usize>,
}

impl FunctionInfo {
    pub fn new(name: impl Into<String>, params: Vec<String>, arguments: ArgumentMap) -> Self {
        Self {
            name: name.into(),
            params,
            arguments,
            locals: Vec::new(),
            return_type: None,
            return_shape: Vec::new(),
        }
    }

    pub fn local(&self, name: &str) -> Option<&LocalVar> {
        self.locals.iter().find(|local| local.name == name)
    }

    pub fn local_mut(&mut self, name: &str) -> Option<&mut LocalVar> {
        self.locals.iter_mut().find(|local| local.name == name)
    }

    /// Register a local; returns false if it already existed
    pub fn declare_local(&mut self, name: &str) -> bool {
        if self.local(name).is_some() {
            return false;
        }
        self.locals.push(LocalVar {
            name: name.to_string(),
            ty: None,
            shape: Vec::new(),
        });
        true
    }

    pub fn argument(&self, name: &str) -> Option<&ArgDescriptor> {
        self.arguments.get(name)
    }

    /// Descriptors in parameter order
    pub fn parameters(&self) -> impl Iterator<Item = &ArgDescriptor> + '_ {
        self.params.iter().filter_map(move |name| self.arguments.get(name))
    }
}

/// A lowered kernel
#[derive(Debug, Clone)]
pub struct Module {
    pub function: FunctionInfo,
    /// Top-level statements of the kernel body
    pub body: Vec<NodeId>,
    nodes: Vec<Node>,
    parents: ParentMap<NodeId>,
}

impl Module {
    pub fn new(function: FunctionInfo) -> Self {
        Self {
            function,
            body: Vec::new(),
            nodes: Vec::new(),
            parents: ParentMap::default(),
        }
    }

    /// Allocate an untyped node
    pub fn add(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len());
        self.nodes.push(Node::new(kind, span));
        id
    }

    /// Allocate a node whose type is already known
    pub fn add_typed(
        &mut self,
        kind: NodeKind,
        span: Span,
        ty: Option<HardwareType>,
        shape: Vec<usize>,
    ) -> NodeId {
        let id = self.add(kind, span);
        let node = &mut self.nodes[id.index()];
        node.ty = ty;
        node.shape = shape;
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    /// Swap a node's kind in place, keeping its id, type and location
    pub fn replace(&mut self, id: NodeId, kind: NodeKind) -> NodeKind {
        std::mem::replace(&mut self.nodes[id.index()].kind, kind)
    }

    /// Arena size, including nodes no longer reachable
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.parent(id)
    }

    pub fn parents(&self) -> &ParentMap<NodeId> {
        &self.parents
    }

    /// Recompute the parent table from the current tree
    pub fn relink(&mut self) {
        self.parents = ParentMap::link(&*self);
    }

    /// Reachable nodes in pre-order
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        self.walk(&mut |_, id| order.push(id));
        order
    }

    /// A node and its descendants in pre-order
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        self.walk_from(None, id, &mut |_, node| order.push(node));
        order
    }

    fn walk_from(
        &self,
        parent: Option<NodeId>,
        id: NodeId,
        visit: &mut dyn FnMut(Option<NodeId>, NodeId),
    ) {
        visit(parent, id);
        for child in self.node(id).children() {
            self.walk_from(Some(id), child, visit);
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, depth: usize) -> fmt::Result {
        let node = self.node(id);
        write!(f, "{:indent$}{} {}", "", id, self.label(node), indent = depth * 2)?;
        if let Some(ty) = &node.ty {
            write!(f, " : {}", ty)?;
        }
        if !node.shape.is_empty() {
            write!(f, " {:?}", node.shape)?;
        }
        for pragma in &node.pragmas {
            write!(f, " @{}", pragma)?;
        }
        writeln!(f)?;
        for child in node.children() {
            self.fmt_node(f, child, depth + 1)?;
        }
        Ok(())
    }

    fn label(&self, node: &Node) -> String {
        match &node.kind {
            NodeKind::Assign { .. } => "Assign".to_string(),
            NodeKind::AugAssign { op, .. } => format!("AugAssign {}=", op.symbol()),
            NodeKind::If { .. } => "If".to_string(),
            NodeKind::For { var, .. } => format!("For {}", var),
            NodeKind::While { .. } => "While".to_string(),
            NodeKind::Return(_) => "Return".to_string(),
            NodeKind::Break => "Break".to_string(),
            NodeKind::Continue => "Continue".to_string(),
            NodeKind::Pass => "Pass".to_string(),
            NodeKind::ExprStmt(_) => "ExprStmt".to_string(),
            NodeKind::Const(value) => format!("Const {}", value),
            NodeKind::Param(name) => format!("Param {}", name),
            NodeKind::Var(name) => format!("Var {}", name),
            NodeKind::Index { .. } => "Index".to_string(),
            NodeKind::Binary { op, .. } => format!("Binary {}", op.symbol()),
            NodeKind::Compare { op, .. } => format!("Compare {}", op.symbol()),
            NodeKind::Logical { op, .. } => format!("Logical {:?}", op),
            NodeKind::Unary { op, .. } => format!("Unary {:?}", op),
            NodeKind::Select { .. } => "Select".to_string(),
            NodeKind::Call { func, .. } => format!("Call {}", func),
            NodeKind::Map { func, .. } => format!("Map lambda {}", func.params.join(", ")),
            NodeKind::Dot { .. } => "Dot".to_string(),
            NodeKind::Reduce { func, .. } => format!("Reduce lambda {}", func.params.join(", ")),
            NodeKind::Fused { stages } => {
                let kinds: Vec<String> = stages.iter().map(|s| s.config.kind().to_string()).collect();
                format!("Fused {}", kinds.join(" -> "))
            }
        }
    }
}

impl Tree for Module {
    type Id = NodeId;

    fn walk(&self, visit: &mut dyn FnMut(Option<NodeId>, NodeId)) {
        for &root in &self.body {
            self.walk_from(None, root, visit);
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .function
            .parameters()
            .map(|arg| {
                if arg.is_array() {
                    format!("{}: {}{:?}", arg.name, arg.hardware_type, arg.shape)
                } else {
                    format!("{}: {}", arg.name, arg.hardware_type)
                }
            })
            .collect();
        write!(f, "def {}({})", self.function.name, params.join(", "))?;
        if let Some(ty) = &self.function.return_type {
            write!(f, " -> {}", ty)?;
        }
        writeln!(f)?;
        for local in &self.function.locals {
            match &local.ty {
                Some(ty) => writeln!(f, "  local {}: {} {:?}", local.name, ty, local.shape)?,
                None => writeln!(f, "  local {}", local.name)?,
            }
        }
        for &stmt in &self.body {
            self.fmt_node(f, stmt, 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Module {
        let mut module = Module::new(FunctionInfo::new("f", Vec::new(), ArgumentMap::new()));
        let span = Span::default();
        let target = module.add(NodeKind::Var("s".into()), span);
        let one = module.add(NodeKind::Const(Constant::Int(1)), span);
        let two = module.add(NodeKind::Const(Constant::Float(2.0)), span);
        let sum = module.add(
            NodeKind::Binary {
                op: BinOp::Add,
                left: one,
                right: two,
            },
            span,
        );
        let assign = module.add(NodeKind::Assign { target, value: sum }, span);
        module.body.push(assign);
        module
    }

    #[test]
    fn test_relink_after_insertion() {
        let mut module = sample();
        module.relink();
        let assign = module.body[0];
        let sum = module.node(assign).children()[1];
        assert_eq!(module.parent(sum), Some(assign));

        // Wrap the sum in a negation and relink
        let fresh = module.add(NodeKind::Pass, Span::default());
        let old = module.replace(sum, NodeKind::Unary { op: UnaryOp::Neg, operand: fresh });
        assert!(matches!(old, NodeKind::Binary { .. }));
        assert!(!module.parents().contains(fresh));
        module.relink();
        assert_eq!(module.parent(fresh), Some(sum));
    }

    #[test]
    fn test_relink_idempotent() {
        let mut module = sample();
        module.relink();
        let first = module.parents().clone();
        module.relink();
        assert_eq!(&first, module.parents());
        assert_eq!(module.preorder().len(), 5);
    }

    #[test]
    fn test_display_dump() {
        let module = sample();
        let dump = module.to_string();
        assert!(dump.starts_with("def f()"));
        assert!(dump.contains("Const 2.0"));
        assert!(dump.contains("Binary +"));
    }
}
