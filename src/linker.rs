//! Parent links for tree-shaped programs
//!
//! Nodes never point at their parents. Instead a [`ParentMap`] side table is
//! computed from a walk over the tree. It is rebuilt from scratch every time
//! it is linked, so linking twice gives the same table and nodes inserted by
//! a rewrite are picked up by the next link.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::ast::{self, AstId, Expr, ExprKind, Stmt, StmtKind};

/// A tree whose nodes are named by copyable ids
pub trait Tree {
    type Id: Copy + Eq + Hash + Debug;

    /// Visit every reachable node once, together with its parent
    /// (`None` for roots). Parents are visited before their children.
    fn walk(&self, visit: &mut dyn FnMut(Option<Self::Id>, Self::Id));
}

/// Side table mapping each node to its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentMap<Id: Eq + Hash> {
    parents: HashMap<Id, Option<Id>>,
}

impl<Id: Copy + Eq + Hash + Debug> ParentMap<Id> {
    /// Link a tree: record `child -> parent` for every edge
    pub fn link<T: Tree<Id = Id> + ?Sized>(tree: &T) -> Self {
        let mut parents = HashMap::new();
        tree.walk(&mut |parent, child| {
            parents.insert(child, parent);
        });
        Self { parents }
    }

    /// Parent of a node; `None` for roots and for unlinked nodes
    pub fn parent(&self, id: Id) -> Option<Id> {
        self.parents.get(&id).copied().flatten()
    }

    /// Whether the node was reached by the last link
    pub fn contains(&self, id: Id) -> bool {
        self.parents.contains_key(&id)
    }

    /// Strict ancestors of a node, nearest first
    pub fn ancestors(&self, id: Id) -> impl Iterator<Item = Id> + '_ {
        std::iter::successors(self.parent(id), move |&current| self.parent(current))
    }

    /// Number of linked nodes
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

impl<Id: Eq + Hash> Default for ParentMap<Id> {
    fn default() -> Self {
        Self {
            parents: HashMap::new(),
        }
    }
}

impl Tree for ast::Module {
    type Id = AstId;

    fn walk(&self, visit: &mut dyn FnMut(Option<AstId>, AstId)) {
        for stmt in &self.body {
            walk_stmt(stmt, None, visit);
        }
    }
}

fn walk_stmt(stmt: &Stmt, parent: Option<AstId>, visit: &mut dyn FnMut(Option<AstId>, AstId)) {
    visit(parent, stmt.id);
    let me = Some(stmt.id);
    match &stmt.kind {
        StmtKind::FunctionDef(def) => {
            for decorator in &def.decorators {
                walk_expr(decorator, me, visit);
            }
            walk_block(&def.body, me, visit);
        }
        StmtKind::Assign { target, value } | StmtKind::AugAssign { target, value, .. } => {
            walk_expr(target, me, visit);
            walk_expr(value, me, visit);
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
        } => {
            walk_expr(target, me, visit);
            walk_expr(iter, me, visit);
            walk_block(body, me, visit);
            walk_block(orelse, me, visit);
        }
        StmtKind::While { test, body, orelse } | StmtKind::If { test, body, orelse } => {
            walk_expr(test, me, visit);
            walk_block(body, me, visit);
            walk_block(orelse, me, visit);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                walk_expr(value, me, visit);
            }
        }
        StmtKind::Expr(expr) => walk_expr(expr, me, visit),
        StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Foreign { .. } => {}
    }
}

fn walk_block(body: &[Stmt], parent: Option<AstId>, visit: &mut dyn FnMut(Option<AstId>, AstId)) {
    for stmt in body {
        walk_stmt(stmt, parent, visit);
    }
}

fn walk_expr(expr: &Expr, parent: Option<AstId>, visit: &mut dyn FnMut(Option<AstId>, AstId)) {
    visit(parent, expr.id);
    let me = Some(expr.id);
    match &expr.kind {
        ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Bool(_)
        | ExprKind::NoneLit
        | ExprKind::Str(_)
        | ExprKind::Name(_)
        | ExprKind::Dict
        | ExprKind::ListComp => {}
        ExprKind::Binary { left, right, .. } | ExprKind::BoolOp { left, right, .. } => {
            walk_expr(left, me, visit);
            walk_expr(right, me, visit);
        }
        ExprKind::Unary { operand, .. } => walk_expr(operand, me, visit),
        ExprKind::Compare {
            left, comparators, ..
        } => {
            walk_expr(left, me, visit);
            for comparator in comparators {
                walk_expr(comparator, me, visit);
            }
        }
        ExprKind::IfExp { test, body, orelse } => {
            walk_expr(test, me, visit);
            walk_expr(body, me, visit);
            walk_expr(orelse, me, visit);
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            walk_expr(func, me, visit);
            for arg in args {
                walk_expr(arg, me, visit);
            }
            for keyword in keywords {
                walk_expr(&keyword.value, me, visit);
            }
        }
        ExprKind::Attribute { value, .. } => walk_expr(value, me, visit),
        ExprKind::Subscript { value, index } => {
            walk_expr(value, me, visit);
            walk_expr(index, me, visit);
        }
        ExprKind::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                walk_expr(part, me, visit);
            }
        }
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            for item in items {
                walk_expr(item, me, visit);
            }
        }
        ExprKind::Lambda { body, .. } => walk_expr(body, me, visit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    const KERNEL: &str = "def vadd(a, b, c):\n    for i in range(4):\n        c[i] = a[i] + b[i]\n";

    #[test]
    fn test_link_records_parents() {
        let module = parse_module(KERNEL).unwrap();
        let parents = ParentMap::link(&module);

        let def_stmt = &module.body[0];
        assert_eq!(parents.parent(def_stmt.id), None);
        assert!(parents.contains(def_stmt.id));

        if let StmtKind::FunctionDef(def) = &def_stmt.kind {
            let loop_stmt = &def.body[0];
            assert_eq!(parents.parent(loop_stmt.id), Some(def_stmt.id));
            if let StmtKind::For { body, .. } = &loop_stmt.kind {
                let assign = &body[0];
                assert_eq!(parents.parent(assign.id), Some(loop_stmt.id));
                let ancestors: Vec<_> = parents.ancestors(assign.id).collect();
                assert_eq!(ancestors, vec![loop_stmt.id, def_stmt.id]);
            } else {
                panic!("Expected For statement");
            }
        } else {
            panic!("Expected function definition");
        }
    }

    #[test]
    fn test_link_is_idempotent() {
        let module = parse_module(KERNEL).unwrap();
        let first = ParentMap::link(&module);
        let second = ParentMap::link(&module);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }
}
