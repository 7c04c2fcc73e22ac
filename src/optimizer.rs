//! IR optimizer
//!
//! Two rewrites run in order:
//! 1. Operator synthesis turns library calls and simple counted loops into
//!    native `Map`/`Dot`/`Reduce` nodes. Rewritten nodes keep their ids and
//!    the types resolved by the type propagator.
//! 2. Pragma insertion annotates loops and operators as decided by a
//!    [`PragmaPolicy`].

use std::collections::HashSet;

use tracing::debug;

use crate::ast::{BinOp, Span};
use crate::config::DEFAULT_UNROLL_LIMIT;
use crate::hardware::{HardwareType, Pragma};
use crate::ir::{Constant, Lambda, Module, NodeId, NodeKind};
use crate::operators::{classify_intrinsic, ElementwiseOp, Intrinsic, OperatorKind};

/// What the optimizer knows about a loop when choosing its pragmas
///
/// [`HeuristicPolicy`] ignores `reduction` and `depth`; they are filled in
/// for custom [`PragmaPolicy`] implementations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopFacts {
    /// Iteration count when all bounds are constant
    pub trip_count: Option<u64>,
    /// No loop nested inside
    pub innermost: bool,
    pub contains_operator: bool,
    /// An array is written at one index and read at another
    pub carried_dependence: bool,
    /// A scalar accumulates across iterations
    pub reduction: bool,
    /// Number of enclosing loops
    pub depth: usize,
}

/// Decides which pragmas to attach
pub trait PragmaPolicy {
    fn loop_pragmas(&self, facts: &LoopFacts) -> Vec<Pragma>;

    /// `shape` is the operand shape the operator iterates over
    fn operator_pragmas(&self, kind: OperatorKind, shape: &[usize]) -> Vec<Pragma>;
}

/// Default policy: pipeline innermost loops and operators, fully unroll
/// short constant-count loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicPolicy {
    pub unroll_limit: u64,
}

impl HeuristicPolicy {
    pub fn new(unroll_limit: u64) -> Self {
        Self { unroll_limit }
    }
}

impl Default for HeuristicPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_UNROLL_LIMIT)
    }
}

impl PragmaPolicy for HeuristicPolicy {
    fn loop_pragmas(&self, facts: &LoopFacts) -> Vec<Pragma> {
        if !facts.innermost || facts.contains_operator || facts.carried_dependence {
            return Vec::new();
        }
        match facts.trip_count {
            Some(0) => Vec::new(),
            Some(n) if n <= self.unroll_limit => vec![Pragma::Unroll { factor: None }],
            _ => vec![Pragma::Pipeline { ii: 1 }],
        }
    }

    fn operator_pragmas(&self, _kind: OperatorKind, _shape: &[usize]) -> Vec<Pragma> {
        vec![Pragma::Pipeline { ii: 1 }]
    }
}

/// Optimizer pass over a typed module
pub struct Optimizer<P: PragmaPolicy> {
    policy: P,
    synthesized: usize,
}

impl<P: PragmaPolicy> Optimizer<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            synthesized: 0,
        }
    }

    /// Number of operators synthesized so far
    pub fn synthesized(&self) -> usize {
        self.synthesized
    }

    pub fn run(&mut self, module: &mut Module) {
        self.synthesize_calls(module);
        self.synthesize_loops(module);
        self.insert_pragmas(module);
    }

    // Library calls

    fn synthesize_calls(&mut self, module: &mut Module) {
        for id in module.preorder() {
            let NodeKind::Call { func, args } = module.kind(id) else {
                continue;
            };
            let Some(intrinsic) = classify_intrinsic(func) else {
                continue;
            };
            let (func, args) = (func.clone(), args.clone());
            let array = !module.node(id).shape.is_empty();
            let span = module.node(id).span;
            let ty = module.node(id).ty;

            let kind = match intrinsic {
                Intrinsic::Elementwise(op) if array => {
                    let element_types: Vec<_> = args.iter().map(|&a| module.node(a).ty).collect();
                    let (params, vars) = lambda_vars(module, "__x", &element_types, span);
                    let body = elementwise(module, op, vars[0], vars[1], ty, span);
                    NodeKind::Map {
                        func: Lambda { params, body },
                        inputs: args,
                    }
                }
                Intrinsic::Elementwise(op) => elementwise_kind(op, args[0], args[1]),
                Intrinsic::Math(math) if array && math.arity() == 1 => {
                    let element_types = [module.node(args[0]).ty];
                    let (params, vars) = lambda_vars(module, "__x", &element_types, span);
                    let body = module.add_typed(
                        NodeKind::Call {
                            func: func.clone(),
                            args: vars,
                        },
                        span,
                        ty,
                        Vec::new(),
                    );
                    NodeKind::Map {
                        func: Lambda { params, body },
                        inputs: args,
                    }
                }
                Intrinsic::Dot => NodeKind::Dot {
                    left: args[0],
                    right: args[1],
                },
                Intrinsic::Sum => NodeKind::Reduce {
                    func: sum_lambda(module, ty, span),
                    input: args[0],
                    init: None,
                },
                Intrinsic::Math(_) => continue,
            };
            debug!(node = %id, call = %func, "synthesized operator from library call");
            module.replace(id, kind);
            self.synthesized += 1;
        }
    }

    // Counted loops

    fn synthesize_loops(&mut self, module: &mut Module) {
        for id in module.preorder() {
            let Some(counted) = CountedLoop::match_loop(module, id) else {
                continue;
            };
            let rewritten = counted
                .as_map(module, id)
                .or_else(|| counted.as_accumulation(module));
            if let Some(kind) = rewritten {
                debug!(node = %id, var = %counted.var, "synthesized operator from loop");
                module.replace(id, kind);
                self.synthesized += 1;
            }
        }
    }

    // Pragmas

    fn insert_pragmas(&self, module: &mut Module) {
        let nodes = module.preorder();
        for &id in &nodes {
            module.node_mut(id).pragmas.clear();
        }
        module.relink();

        for &id in &nodes {
            let node = module.node(id);
            let pragmas = if node.is_loop() {
                let facts = loop_facts(module, id);
                self.policy.loop_pragmas(&facts)
            } else if node.is_operator() {
                let kind = match &node.kind {
                    NodeKind::Map { .. } => OperatorKind::Map,
                    NodeKind::Dot { .. } => OperatorKind::Dot,
                    _ => OperatorKind::Reduce,
                };
                let shape = node
                    .operator_inputs()
                    .first()
                    .map(|&input| module.node(input).shape.clone())
                    .unwrap_or_default();
                self.policy.operator_pragmas(kind, &shape)
            } else {
                continue;
            };
            if !pragmas.is_empty() {
                debug!(node = %id, ?pragmas, "pragmas");
            }
            module.node_mut(id).pragmas = pragmas;
        }
    }
}

impl Default for Optimizer<HeuristicPolicy> {
    fn default() -> Self {
        Self::new(HeuristicPolicy::default())
    }
}

/// Fresh lambda parameters `<prefix>0, <prefix>1, ...` with one typed `Var`
/// node per parameter
fn lambda_vars(
    module: &mut Module,
    prefix: &str,
    types: &[Option<HardwareType>],
    span: Span,
) -> (Vec<String>, Vec<NodeId>) {
    types
        .iter()
        .enumerate()
        .map(|(k, ty)| {
            let name = format!("{}{}", prefix, k);
            let var = module.add_typed(NodeKind::Var(name.clone()), span, *ty, Vec::new());
            (name, var)
        })
        .unzip()
}

fn elementwise_kind(op: ElementwiseOp, left: NodeId, right: NodeId) -> NodeKind {
    let binary = |op| NodeKind::Binary { op, left, right };
    match op {
        ElementwiseOp::Add => binary(BinOp::Add),
        ElementwiseOp::Subtract => binary(BinOp::Sub),
        ElementwiseOp::Multiply => binary(BinOp::Mul),
        ElementwiseOp::Divide => binary(BinOp::Div),
        ElementwiseOp::Maximum => NodeKind::Call {
            func: "max".to_string(),
            args: vec![left, right],
        },
        ElementwiseOp::Minimum => NodeKind::Call {
            func: "min".to_string(),
            args: vec![left, right],
        },
    }
}

fn elementwise(
    module: &mut Module,
    op: ElementwiseOp,
    left: NodeId,
    right: NodeId,
    ty: Option<HardwareType>,
    span: Span,
) -> NodeId {
    module.add_typed(elementwise_kind(op, left, right), span, ty, Vec::new())
}

/// `lambda __acc, __x: __acc + __x`
fn sum_lambda(module: &mut Module, ty: Option<HardwareType>, span: Span) -> Lambda {
    let acc = module.add_typed(NodeKind::Var("__acc".into()), span, ty, Vec::new());
    let x = module.add_typed(NodeKind::Var("__x".into()), span, ty, Vec::new());
    let body = module.add_typed(
        NodeKind::Binary {
            op: BinOp::Add,
            left: acc,
            right: x,
        },
        span,
        ty,
        Vec::new(),
    );
    Lambda {
        params: vec!["__acc".into(), "__x".into()],
        body,
    }
}

fn const_int(module: &Module, id: NodeId) -> Option<i64> {
    match module.kind(id) {
        NodeKind::Const(Constant::Int(n)) => Some(*n),
        _ => None,
    }
}

fn array_name(kind: &NodeKind) -> Option<&str> {
    match kind {
        NodeKind::Param(name) | NodeKind::Var(name) => Some(name),
        _ => None,
    }
}

/// `for var in range(n)` with a single statement body
struct CountedLoop {
    var: String,
    count: usize,
    stmt: NodeId,
}

impl CountedLoop {
    fn match_loop(module: &Module, id: NodeId) -> Option<Self> {
        let NodeKind::For {
            var,
            start,
            stop,
            step,
            body,
        } = module.kind(id)
        else {
            return None;
        };
        if const_int(module, *start)? != 0 || const_int(module, *step)? != 1 || body.len() != 1 {
            return None;
        }
        let count = usize::try_from(const_int(module, *stop)?).ok().filter(|&n| n > 0)?;
        Some(Self {
            var: var.clone(),
            count,
            stmt: body[0],
        })
    }

    /// `x[var]` with `x` a 1-D array of the loop's length; returns the base
    fn element_read(&self, module: &Module, id: NodeId) -> Option<NodeId> {
        let NodeKind::Index { base, indices } = module.kind(id) else {
            return None;
        };
        let [index] = indices.as_slice() else {
            return None;
        };
        if !matches!(module.kind(*index), NodeKind::Var(name) if *name == self.var) {
            return None;
        }
        array_name(module.kind(*base))?;
        (module.node(*base).shape == [self.count]).then_some(*base)
    }

    /// Gather the element reads of `id`; false if the loop variable or
    /// `target` is used any other way, or an operator is present
    fn scan(&self, module: &Module, id: NodeId, target: &str, reads: &mut Vec<NodeId>) -> bool {
        if self.element_read(module, id).is_some() {
            reads.push(id);
            return true;
        }
        let node = module.node(id);
        if node.is_operator() {
            return false;
        }
        if let Some(name) = array_name(&node.kind) {
            if name == self.var || name == target {
                return false;
            }
        }
        node.children()
            .into_iter()
            .all(|child| self.scan(module, child, target, reads))
    }

    /// `c[i] = f(a[i], b[i], ...)` → `c = map(lambda ...: f(...), a, b, ...)`
    fn as_map(&self, module: &mut Module, id: NodeId) -> Option<NodeKind> {
        let NodeKind::Assign { target, value } = module.kind(self.stmt).clone() else {
            return None;
        };
        let target_base = self.element_read(module, target)?;
        let target_name = array_name(module.kind(target_base))?.to_string();

        let mut reads = Vec::new();
        if !self.scan(module, value, &target_name, &mut reads) || reads.is_empty() {
            return None;
        }

        let mut names: Vec<String> = Vec::new();
        let mut inputs = Vec::new();
        let mut params = Vec::new();
        for read in reads {
            let NodeKind::Index { base, .. } = module.kind(read).clone() else {
                continue;
            };
            let name = array_name(module.kind(base))?.to_string();
            let k = match names.iter().position(|n| *n == name) {
                Some(k) => k,
                None => {
                    names.push(name);
                    inputs.push(base);
                    params.push(format!("__x{}", params.len()));
                    params.len() - 1
                }
            };
            module.replace(read, NodeKind::Var(params[k].clone()));
        }

        let span = module.node(id).span;
        let ty = module.node(value).ty;
        let map = module.add_typed(
            NodeKind::Map {
                func: Lambda {
                    params,
                    body: value,
                },
                inputs,
            },
            span,
            ty,
            vec![self.count],
        );
        Some(NodeKind::Assign {
            target: target_base,
            value: map,
        })
    }

    /// `s += a[i] * b[i]` → `s += dot(a, b)`, `s += a[i]` → `s += reduce(+, a)`
    fn as_accumulation(&self, module: &mut Module) -> Option<NodeKind> {
        let NodeKind::AugAssign {
            target,
            op: BinOp::Add,
            value,
        } = module.kind(self.stmt).clone()
        else {
            return None;
        };
        let target_name = array_name(module.kind(target))?.to_string();
        if !module.node(target).shape.is_empty() {
            return None;
        }

        if let Some(input) = self.element_read(module, value) {
            if array_name(module.kind(input)) == Some(target_name.as_str()) {
                return None;
            }
            let ty = module.node(value).ty;
            let span = module.node(value).span;
            let func = sum_lambda(module, ty, span);
            module.replace(
                value,
                NodeKind::Reduce {
                    func,
                    input,
                    init: None,
                },
            );
        } else {
            let NodeKind::Binary {
                op: BinOp::Mul,
                left,
                right,
            } = module.kind(value).clone()
            else {
                return None;
            };
            let left = self.element_read(module, left)?;
            let right = self.element_read(module, right)?;
            module.replace(value, NodeKind::Dot { left, right });
        }

        Some(NodeKind::AugAssign {
            target,
            op: BinOp::Add,
            value,
        })
    }
}

/// Structural equality of two index expressions
fn same_expr(module: &Module, a: NodeId, b: NodeId) -> bool {
    match (module.kind(a), module.kind(b)) {
        (NodeKind::Const(x), NodeKind::Const(y)) => x == y,
        (NodeKind::Var(x), NodeKind::Var(y)) | (NodeKind::Param(x), NodeKind::Param(y)) => x == y,
        (
            NodeKind::Binary {
                op: o1,
                left: l1,
                right: r1,
            },
            NodeKind::Binary {
                op: o2,
                left: l2,
                right: r2,
            },
        ) => o1 == o2 && same_expr(module, *l1, *l2) && same_expr(module, *r1, *r2),
        (
            NodeKind::Unary {
                op: o1,
                operand: x,
            },
            NodeKind::Unary {
                op: o2,
                operand: y,
            },
        ) => o1 == o2 && same_expr(module, *x, *y),
        (
            NodeKind::Index {
                base: b1,
                indices: i1,
            },
            NodeKind::Index {
                base: b2,
                indices: i2,
            },
        ) => same_expr(module, *b1, *b2) && same_indices(module, i1, i2),
        _ => false,
    }
}

fn same_indices(module: &Module, a: &[NodeId], b: &[NodeId]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| same_expr(module, x, y))
}

fn trip_count(module: &Module, id: NodeId) -> Option<u64> {
    let NodeKind::For {
        start, stop, step, ..
    } = module.kind(id)
    else {
        return None;
    };
    let (start, stop, step) = (
        const_int(module, *start)?,
        const_int(module, *stop)?,
        const_int(module, *step)?,
    );
    let distance = match step {
        0 => return None,
        s if s > 0 => stop - start,
        _ => start - stop,
    };
    let step = step.unsigned_abs();
    Some(if distance <= 0 {
        0
    } else {
        (distance as u64).div_ceil(step)
    })
}

fn loop_facts(module: &Module, id: NodeId) -> LoopFacts {
    let nodes = module.subtree(id);
    let inner = &nodes[1..];

    let mut writes: Vec<(String, Vec<NodeId>)> = Vec::new();
    let mut write_targets = HashSet::new();
    let mut reduction = false;
    for &node in inner {
        let (target, value) = match module.kind(node) {
            NodeKind::AugAssign { target, .. } => (*target, None),
            NodeKind::Assign { target, value } => (*target, Some(*value)),
            _ => continue,
        };
        match module.kind(target) {
            NodeKind::Index { base, indices } => {
                if let Some(name) = array_name(module.kind(*base)) {
                    writes.push((name.to_string(), indices.clone()));
                    write_targets.insert(target);
                }
            }
            NodeKind::Var(name) => {
                let self_reference = value.map_or(true, |value| {
                    module
                        .subtree(value)
                        .iter()
                        .any(|&n| matches!(module.kind(n), NodeKind::Var(v) if v == name))
                });
                reduction |= self_reference;
            }
            _ => {}
        }
    }

    let carried_dependence = inner.iter().any(|&node| {
        if write_targets.contains(&node) {
            return false;
        }
        let NodeKind::Index { base, indices } = module.kind(node) else {
            return false;
        };
        let Some(name) = array_name(module.kind(*base)) else {
            return false;
        };
        writes
            .iter()
            .any(|(written, at)| written == name && !same_indices(module, at, indices))
    });

    let depth = module
        .parents()
        .ancestors(id)
        .filter(|&ancestor| module.node(ancestor).is_loop())
        .count();

    LoopFacts {
        trip_count: trip_count(module, id),
        innermost: !inner.iter().any(|&n| module.node(n).is_loop()),
        contains_operator: inner.iter().any(|&n| module.node(n).is_operator()),
        carried_dependence,
        reduction,
        depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{kernel_definition, Analyzer};
    use crate::args::{extract_arguments, ArgSpec};
    use crate::linker::ParentMap;
    use crate::parser::parse_module;
    use crate::typer::Typer;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn optimized(source: &str, args: &[ArgSpec]) -> Module {
        let ast = parse_module(source).unwrap();
        let parents = ParentMap::link(&ast);
        let params = kernel_definition(&ast).unwrap().params.clone();
        let arguments = extract_arguments(&params, args).unwrap();
        let mut module = Analyzer::new(&parents).analyze(&ast, arguments).unwrap();
        Typer::new().run(&mut module).unwrap();
        Optimizer::default().run(&mut module);
        module.relink();
        module
    }

    fn vec4() -> ArgSpec {
        ArgSpec::named("float32", &[4])
    }

    fn first_stmt(module: &Module) -> &NodeKind {
        module.kind(module.body[0])
    }

    #[test]
    fn test_policy_rules() {
        let policy = HeuristicPolicy::default();
        let short = LoopFacts {
            trip_count: Some(4),
            innermost: true,
            ..LoopFacts::default()
        };
        assert_eq!(policy.loop_pragmas(&short), vec![Pragma::Unroll { factor: None }]);

        let long = LoopFacts {
            trip_count: Some(64),
            ..short.clone()
        };
        assert_eq!(policy.loop_pragmas(&long), vec![Pragma::Pipeline { ii: 1 }]);

        let unknown = LoopFacts {
            trip_count: None,
            ..short.clone()
        };
        assert_eq!(policy.loop_pragmas(&unknown), vec![Pragma::Pipeline { ii: 1 }]);

        let outer = LoopFacts {
            innermost: false,
            ..short.clone()
        };
        assert!(policy.loop_pragmas(&outer).is_empty());

        let carried = LoopFacts {
            carried_dependence: true,
            ..long
        };
        assert!(policy.loop_pragmas(&carried).is_empty());
    }

    /// Records the facts of every loop it is asked about
    #[derive(Default)]
    struct Recorder(Rc<RefCell<Vec<LoopFacts>>>);

    impl PragmaPolicy for Recorder {
        fn loop_pragmas(&self, facts: &LoopFacts) -> Vec<Pragma> {
            self.0.borrow_mut().push(facts.clone());
            Vec::new()
        }

        fn operator_pragmas(&self, _kind: OperatorKind, _shape: &[usize]) -> Vec<Pragma> {
            Vec::new()
        }
    }

    #[test]
    fn test_custom_policy_sees_loop_facts() {
        let source = "\
def f(a, b):
    s = 0.0
    for i in range(4):
        for j in range(2):
            t = a[i] * b[j]
            s += t
    return s
";
        let ast = parse_module(source).unwrap();
        let parents = ParentMap::link(&ast);
        let params = kernel_definition(&ast).unwrap().params.clone();
        let arguments = extract_arguments(&params, &[vec4(), vec4()]).unwrap();
        let mut module = Analyzer::new(&parents).analyze(&ast, arguments).unwrap();
        Typer::new().run(&mut module).unwrap();

        let recorder = Recorder::default();
        let facts = Rc::clone(&recorder.0);
        Optimizer::new(recorder).run(&mut module);

        let facts = facts.borrow();
        assert_eq!(facts.len(), 2);
        assert_eq!(
            facts[0],
            LoopFacts {
                trip_count: Some(4),
                innermost: false,
                contains_operator: false,
                carried_dependence: false,
                reduction: true,
                depth: 0,
            }
        );
        assert_eq!(facts[1].trip_count, Some(2));
        assert!(facts[1].innermost);
        assert!(facts[1].reduction);
        assert_eq!(facts[1].depth, 1);
    }

    #[test]
    fn test_numpy_calls_become_operators() {
        let module = optimized(
            "def f(a, b):\n    return np.sum(np.multiply(a, b)) + np.dot(a, b)\n",
            &[vec4(), vec4()],
        );
        let NodeKind::Return(Some(value)) = first_stmt(&module) else {
            panic!("expected return");
        };
        let NodeKind::Binary { left, right, .. } = module.kind(*value) else {
            panic!("expected binary");
        };
        let NodeKind::Reduce { input, init, .. } = module.kind(*left) else {
            panic!("expected reduce");
        };
        assert!(init.is_none());
        assert!(matches!(module.kind(*input), NodeKind::Map { .. }));
        assert_eq!(module.node(*input).shape, vec![4]);
        assert!(matches!(module.kind(*right), NodeKind::Dot { .. }));
        assert_eq!(module.node(*right).pragmas, vec![Pragma::Pipeline { ii: 1 }]);
    }

    #[test]
    fn test_elementwise_loop_becomes_map() {
        let module = optimized(
            "def f(a, b, c):\n    for i in range(4):\n        c[i] = a[i] * b[i] + a[i]\n",
            &[vec4(), vec4(), vec4()],
        );
        let NodeKind::Assign { target, value } = first_stmt(&module) else {
            panic!("expected assign");
        };
        assert_eq!(module.kind(*target), &NodeKind::Param("c".into()));
        let NodeKind::Map { func, inputs } = module.kind(*value) else {
            panic!("expected map");
        };
        assert_eq!(func.params, vec!["__x0".to_string(), "__x1".to_string()]);
        assert_eq!(inputs.len(), 2);
        assert_eq!(module.node(*value).shape, vec![4]);
    }

    #[test]
    fn test_accumulation_loops() {
        let module = optimized(
            "def f(a, b):\n    s = 0.0\n    for i in range(4):\n        s += a[i] * b[i]\n    return s\n",
            &[vec4(), vec4()],
        );
        let NodeKind::AugAssign { value, .. } = module.kind(module.body[1]) else {
            panic!("expected augmented assignment");
        };
        assert!(matches!(module.kind(*value), NodeKind::Dot { .. }));

        let module = optimized(
            "def f(a):\n    s = 0.0\n    for i in range(4):\n        s += a[i]\n    return s\n",
            &[vec4()],
        );
        let NodeKind::AugAssign { value, .. } = module.kind(module.body[1]) else {
            panic!("expected augmented assignment");
        };
        assert!(matches!(module.kind(*value), NodeKind::Reduce { .. }));
    }

    #[test]
    fn test_loop_pragmas() {
        let module = optimized(
            "def f(a, b):\n    for i in range(1, 16):\n        a[i] = a[i - 1] + b[i]\n    for j in range(16):\n        b[j] = b[j] * 2.0 + a[15 - j]\n",
            &[ArgSpec::named("float32", &[16]), ArgSpec::named("float32", &[16])],
        );
        // a[i] depends on a[i - 1]
        assert!(module.node(module.body[0]).pragmas.is_empty());
        assert_eq!(module.node(module.body[1]).pragmas, vec![Pragma::Pipeline { ii: 1 }]);
    }

    #[test]
    fn test_trip_count() {
        let module = optimized(
            "def f(a):\n    for i in range(10, 0, -3):\n        a[i] = 0\n",
            &[ArgSpec::named("int32", &[16])],
        );
        assert_eq!(trip_count(&module, module.body[0]), Some(4));
        assert_eq!(
            module.node(module.body[0]).pragmas,
            vec![Pragma::Unroll { factor: None }]
        );
    }
}
