//! Operator chaining
//!
//! Fuses producer/consumer pairs of array operators so that the generated
//! loop nest streams elements from one stage into the next instead of
//! materializing the intermediate array.
//!
//! Variable chains are inlined first: `t = map(...)` directly followed by
//! the simple statement consuming `t` becomes a single expression when `t`
//! is assigned and read exactly once. A consumer inside an `if`, `for` or
//! `while` block is never inlined into, since the map would then run after
//! writes in that block. Expression chains `Map* -> (Map | Dot | Reduce)`
//! are then collapsed into one `Fused` node.

use std::collections::HashMap;

use tracing::debug;

use crate::ir::{FusedStage, Module, NodeId, NodeKind, Operand, OperatorConfig};

#[derive(Debug, Default)]
pub struct ChainRewriter {
    inlined: usize,
    fused: usize,
}

impl ChainRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables inlined into their consumer
    pub fn inlined(&self) -> usize {
        self.inlined
    }

    /// Fused nodes created
    pub fn fused(&self) -> usize {
        self.fused
    }

    pub fn run(&mut self, module: &mut Module) {
        let usage = usage(module);
        let body = std::mem::take(&mut module.body);
        module.body = self.inline_block(module, &usage, body);
        module.relink();

        for tail in self.chain_tails(module) {
            self.fuse(module, tail);
        }
        module.relink();

        debug!(inlined = self.inlined, fused = self.fused, "operator chaining");
    }

    // Variable chains

    fn inline_block(&mut self, module: &mut Module, usage: &Usage, block: Vec<NodeId>) -> Vec<NodeId> {
        for &stmt in &block {
            let rebuilt = match module.kind(stmt).clone() {
                NodeKind::If { test, body, orelse } => NodeKind::If {
                    test,
                    body: self.inline_block(module, usage, body),
                    orelse: self.inline_block(module, usage, orelse),
                },
                NodeKind::For {
                    var,
                    start,
                    stop,
                    step,
                    body,
                } => NodeKind::For {
                    var,
                    start,
                    stop,
                    step,
                    body: self.inline_block(module, usage, body),
                },
                NodeKind::While { test, body } => NodeKind::While {
                    test,
                    body: self.inline_block(module, usage, body),
                },
                _ => continue,
            };
            module.replace(stmt, rebuilt);
        }

        let mut kept = Vec::with_capacity(block.len());
        for (k, &stmt) in block.iter().enumerate() {
            let inlined = block
                .get(k + 1)
                .map_or(false, |&next| self.try_inline(module, usage, stmt, next));
            if !inlined {
                kept.push(stmt);
            }
        }
        kept
    }

    /// Inline `stmt` (`t = map(...)`) into the operator of `next` reading `t`
    fn try_inline(&mut self, module: &mut Module, usage: &Usage, stmt: NodeId, next: NodeId) -> bool {
        let NodeKind::Assign { target, value } = *module.kind(stmt) else {
            return false;
        };
        let NodeKind::Var(name) = module.kind(target) else {
            return false;
        };
        if !matches!(module.kind(value), NodeKind::Map { .. }) || module.function.local(name).is_none() {
            return false;
        }
        if usage.get(name) != Some(&(1, 1)) || !is_simple(module, next) {
            return false;
        }
        let name = name.clone();

        let consumer = module.subtree(next).into_iter().find_map(|id| {
            let input = module
                .node(id)
                .operator_inputs()
                .into_iter()
                .find(|&input| matches!(module.kind(input), NodeKind::Var(v) if *v == name))?;
            Some((id, input))
        });
        let Some((operator, read)) = consumer else {
            return false;
        };

        substitute_input(module, operator, read, value);
        module.function.locals.retain(|local| local.name != name);
        debug!(variable = %name, operator = %operator, "inlined map into its consumer");
        self.inlined += 1;
        true
    }

    // Expression chains

    /// Operators that end a chain: not fusable themselves, fed by a
    /// fusable map
    fn chain_tails(&self, module: &Module) -> Vec<NodeId> {
        module
            .preorder()
            .into_iter()
            .filter(|&id| {
                module.node(id).is_operator()
                    && !fusable(module, id)
                    && chained_input(module, id).is_some()
            })
            .collect()
    }

    fn fuse(&mut self, module: &mut Module, tail: NodeId) {
        // Innermost stage first
        let mut chain = vec![tail];
        let mut current = tail;
        while let Some(input) = chained_input(module, current) {
            chain.push(input);
            current = input;
        }
        chain.reverse();

        let mut stages = Vec::with_capacity(chain.len());
        let mut previous = None;
        for &id in &chain {
            let node = module.node(id);
            let operand = |input: NodeId| {
                if Some(input) == previous {
                    Operand::Chained
                } else {
                    Operand::Node(input)
                }
            };
            let (config, operands) = match &node.kind {
                NodeKind::Map { func, inputs } => (
                    OperatorConfig::Map { func: func.clone() },
                    inputs.iter().map(|&input| operand(input)).collect(),
                ),
                NodeKind::Dot { left, right } => (OperatorConfig::Dot, vec![operand(*left), operand(*right)]),
                NodeKind::Reduce { func, input, init } => (
                    OperatorConfig::Reduce {
                        func: func.clone(),
                        init: *init,
                    },
                    vec![operand(*input)],
                ),
                _ => return,
            };
            stages.push(FusedStage {
                config,
                operands,
                ty: node.ty,
                shape: node.shape.clone(),
            });
            previous = Some(id);
        }

        debug!(
            tail = %tail,
            stages = stages.len(),
            "fused operator chain"
        );
        module.replace(tail, NodeKind::Fused { stages });
        self.fused += 1;
    }
}

/// Assignments to and reads of every variable, by name
type Usage = HashMap<String, (usize, usize)>;

fn usage(module: &Module) -> Usage {
    let order = module.preorder();
    let mut usage = Usage::new();
    let mut targets = Vec::new();
    for &id in &order {
        if let NodeKind::Assign { target, .. } | NodeKind::AugAssign { target, .. } = module.kind(id) {
            if let NodeKind::Var(name) = module.kind(*target) {
                usage.entry(name.clone()).or_default().0 += 1;
                targets.push(*target);
            }
        }
    }
    for &id in &order {
        if let NodeKind::Var(name) = module.kind(id) {
            if !targets.contains(&id) {
                usage.entry(name.clone()).or_default().1 += 1;
            }
        }
    }
    usage
}

/// Statements that evaluate their expressions before any write of their own
fn is_simple(module: &Module, stmt: NodeId) -> bool {
    matches!(
        module.kind(stmt),
        NodeKind::Assign { .. } | NodeKind::AugAssign { .. } | NodeKind::Return(_) | NodeKind::ExprStmt(_)
    )
}

fn substitute_input(module: &mut Module, operator: NodeId, old: NodeId, new: NodeId) {
    let swap = |id: &mut NodeId| {
        if *id == old {
            *id = new;
        }
    };
    let mut kind = module.kind(operator).clone();
    match &mut kind {
        NodeKind::Map { inputs, .. } => inputs.iter_mut().for_each(swap),
        NodeKind::Dot { left, right } => {
            swap(left);
            swap(right);
        }
        NodeKind::Reduce { input, .. } => swap(input),
        _ => return,
    }
    module.replace(operator, kind);
}

/// The single map feeding an operator, if there is exactly one
fn chained_input(module: &Module, id: NodeId) -> Option<NodeId> {
    let maps: Vec<NodeId> = module
        .node(id)
        .operator_inputs()
        .into_iter()
        .filter(|&input| matches!(module.kind(input), NodeKind::Map { .. }))
        .collect();
    match maps.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

/// A map that can be fused into the operator consuming it
fn fusable(module: &Module, id: NodeId) -> bool {
    if !matches!(module.kind(id), NodeKind::Map { .. }) {
        return false;
    }
    module
        .parent(id)
        .map_or(false, |parent| chained_input(module, parent) == Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{kernel_definition, Analyzer};
    use crate::args::{extract_arguments, ArgSpec};
    use crate::hardware::{HardwareType, ScalarKind};
    use crate::linker::ParentMap;
    use crate::optimizer::Optimizer;
    use crate::parser::parse_module;
    use crate::typer::Typer;
    use pretty_assertions::assert_eq;

    fn chained(source: &str, args: &[ArgSpec]) -> (Module, ChainRewriter) {
        let ast = parse_module(source).unwrap();
        let parents = ParentMap::link(&ast);
        let params = kernel_definition(&ast).unwrap().params.clone();
        let arguments = extract_arguments(&params, args).unwrap();
        let mut module = Analyzer::new(&parents).analyze(&ast, arguments).unwrap();
        Typer::new().run(&mut module).unwrap();
        Optimizer::default().run(&mut module);
        module.relink();
        let mut rewriter = ChainRewriter::new();
        rewriter.run(&mut module);
        (module, rewriter)
    }

    fn vec4() -> ArgSpec {
        ArgSpec::named("float32", &[4])
    }

    fn returned(module: &Module) -> NodeId {
        let last = *module.body.last().unwrap();
        match module.kind(last) {
            NodeKind::Return(Some(value)) => *value,
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_map_into_dot() {
        let (module, rewriter) = chained(
            "def f(a, b):\n    return a.map(lambda x: x * x).dot(b)\n",
            &[vec4(), vec4()],
        );
        assert_eq!(rewriter.fused(), 1);
        let value = returned(&module);
        let NodeKind::Fused { stages } = module.kind(value) else {
            panic!("expected fused node");
        };
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].config.kind().to_string(), "map");
        assert_eq!(stages[0].shape, vec![4]);
        assert_eq!(stages[1].operands[0], Operand::Chained);
        assert!(matches!(stages[1].operands[1], Operand::Node(_)));

        let node = module.node(value);
        assert_eq!(node.ty, Some(HardwareType::scalar(ScalarKind::Float32)));
        assert!(node.shape.is_empty());
    }

    #[test]
    fn test_variable_chain() {
        let (module, rewriter) = chained(
            "def f(a):\n    t = map(lambda x: x * 2.0, a)\n    return reduce(lambda p, q: p + q, t)\n",
            &[vec4()],
        );
        assert_eq!(rewriter.inlined(), 1);
        assert_eq!(module.body.len(), 1);
        assert!(module.function.local("t").is_none());
        let NodeKind::Fused { stages } = module.kind(returned(&module)) else {
            panic!("expected fused node");
        };
        let kinds: Vec<String> = stages.iter().map(|s| s.config.kind().to_string()).collect();
        assert_eq!(kinds, vec!["map", "reduce"]);
    }

    #[test]
    fn test_shared_map_not_fused() {
        let (module, rewriter) = chained(
            "def f(a, b):\n    t = map(lambda x: x + 1.0, a)\n    s = dot(t, b) + dot(t, a)\n    return s\n",
            &[vec4(), vec4()],
        );
        assert_eq!(rewriter.inlined(), 0);
        assert_eq!(rewriter.fused(), 0);
        assert!(module.function.local("t").is_some());
        assert!(module
            .preorder()
            .into_iter()
            .all(|id| !matches!(module.kind(id), NodeKind::Fused { .. })));
    }

    #[test]
    fn test_map_map_reduce_fuses_three_stages() {
        let source = "\
def f(a):
    t = map(lambda x: x + 1.0, a)
    u = map(lambda y: y * y, t)
    return reduce(lambda p, q: p + q, u)
";
        let (module, rewriter) = chained(source, &[vec4()]);
        assert_eq!(rewriter.inlined(), 2);
        assert_eq!(rewriter.fused(), 1);
        assert_eq!(module.body.len(), 1);
        assert!(module.function.local("t").is_none());
        assert!(module.function.local("u").is_none());

        let NodeKind::Fused { stages } = module.kind(returned(&module)) else {
            panic!("expected fused node");
        };
        let kinds: Vec<String> = stages.iter().map(|s| s.config.kind().to_string()).collect();
        assert_eq!(kinds, vec!["map", "map", "reduce"]);
        assert!(matches!(stages[0].operands.as_slice(), [Operand::Node(_)]));
        assert_eq!(stages[1].operands, vec![Operand::Chained]);
        assert_eq!(stages[2].operands, vec![Operand::Chained]);
    }

    #[test]
    fn test_consumer_inside_block_is_not_inlined() {
        let guarded = "\
def f(a, b):
    s = 0.0
    t = map(lambda x: x * 2.0, a)
    if b[0] > 0.0:
        a[0] = 0.0
        s = dot(t, b)
    return s
";
        let looped = "\
def f(a, b):
    s = 0.0
    t = map(lambda x: x * 2.0, a)
    for i in range(4):
        a[i] = 0.0
        s += dot(t, b)
    return s
";
        for source in [guarded, looped] {
            let (module, rewriter) = chained(source, &[vec4(), vec4()]);
            assert_eq!(rewriter.inlined(), 0);
            assert_eq!(rewriter.fused(), 0);
            assert!(module.function.local("t").is_some());
            assert_eq!(module.body.len(), 4);
            let NodeKind::Assign { value, .. } = module.kind(module.body[1]) else {
                panic!("expected the map assignment to stay in place");
            };
            assert!(matches!(module.kind(*value), NodeKind::Map { .. }));
        }
    }

    #[test]
    fn test_map_chain_into_array() {
        let (module, _) = chained(
            "def f(a, b, c):\n    c = a.map(lambda x: x + 1.0).map(lambda y, z: y * z, b)\n    return c.reduce(lambda p, q: p + q)\n",
            &[vec4(), vec4(), vec4()],
        );
        let NodeKind::Assign { value, .. } = module.kind(module.body[0]) else {
            panic!("expected assign");
        };
        let NodeKind::Fused { stages } = module.kind(*value) else {
            panic!("expected fused map chain");
        };
        assert_eq!(stages.len(), 2);
        assert!(matches!(
            stages[1].operands.as_slice(),
            [Operand::Chained, Operand::Node(_)]
        ));
    }
}
