//! Memoized bottom-up traversals of the expression DAG.
//!
//! A [Walker] computes one value per node from the values of its children. Each distinct node is
//! visited at most once per walker instance, even when it is shared by several parents.

mod evaluator;
mod extractors;
mod quantifiers;
mod simplifier;
mod substituter;

pub use evaluator::*;
pub use extractors::*;
pub use quantifiers::*;
pub use simplifier::*;
pub use substituter::*;

use smallvec::SmallVec;

use crate::*;

pub type Memo<T> = hashbrown::HashMap<ExprId, T>;

/// Decision taken before visiting the children of a node.
pub enum Visit<T> {
    /// Walk the children, then call [Walker::visit] on the node.
    Children,
    /// The value of the node is known, its children are not walked.
    Done(T),
}

pub trait Walker {
    type Output: Clone;

    fn memo(&mut self) -> &mut Memo<Self::Output>;

    /// Called when a node is first reached, before any of its children.
    fn pre_visit(&mut self, _env: &Environment, _id: ExprId, _expr: &Expr) -> Result<Visit<Self::Output>, EvalError> {
        Ok(Visit::Children)
    }

    /// Computes the value of a node, given the values of its children (in order).
    fn visit(
        &mut self,
        env: &Environment,
        id: ExprId,
        expr: &Expr,
        args: &[Self::Output],
    ) -> Result<Self::Output, EvalError>;

    /// Post-order traversal of the DAG rooted in `root`.
    ///
    /// The traversal uses an explicit stack so that deep expressions do not overflow the call stack.
    /// It may be called recursively from [Walker::pre_visit].
    fn walk(&mut self, env: &Environment, root: ExprId) -> Result<Self::Output, EvalError> {
        if let Some(res) = self.memo().get(&root) {
            return Ok(res.clone());
        }
        // (node, children_pushed)
        let mut stack: Vec<(ExprId, bool)> = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if self.memo().contains_key(&id) {
                continue;
            }
            let node = env.node(id);
            let expr = node.expr();
            let children = expr.children();
            if !expanded {
                match self.pre_visit(env, id, expr)? {
                    Visit::Done(value) => {
                        self.memo().insert(id, value);
                    }
                    Visit::Children => {
                        stack.push((id, true));
                        for c in children.iter().rev() {
                            if !self.memo().contains_key(c) {
                                stack.push((*c, false));
                            }
                        }
                    }
                }
            } else {
                let memo = self.memo();
                let args: SmallVec<[Self::Output; 3]> = children.iter().map(|c| memo[c].clone()).collect();
                let value = self.visit(env, id, expr, &args)?;
                self.memo().insert(id, value);
            }
        }
        Ok(self.memo()[&root].clone())
    }
}

/// Rebuilds `expr` with new children, reusing `id` when nothing changed.
pub(crate) fn rebuild(env: &Environment, id: ExprId, expr: &Expr, args: &[ExprId]) -> Result<ExprId, EvalError> {
    if expr.children().as_slice() == args {
        Ok(id)
    } else {
        Ok(env.intern(expr.with_children(args))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts the number of nodes in a tree, visiting shared nodes once.
    struct Counter {
        visits: usize,
        memo: Memo<usize>,
    }

    impl Walker for Counter {
        type Output = usize;

        fn memo(&mut self) -> &mut Memo<usize> {
            &mut self.memo
        }

        fn visit(&mut self, _: &Environment, _: ExprId, _: &Expr, args: &[usize]) -> Result<usize, EvalError> {
            self.visits += 1;
            Ok(1 + args.iter().sum::<usize>())
        }
    }

    #[test]
    fn shared_nodes_are_visited_once() -> anyhow::Result<()> {
        let mut env = Environment::new();
        let f = env.fluents.add_fluent("f", vec![], Type::INT, None)?;
        let f = env.fluent(f, [])?;
        let one = env.int(1);
        // f + 1, used three times
        let shared = env.plus([f, one])?;
        let le = env.le(shared, shared)?;
        let lt = env.lt(shared, env.int(5))?;
        let root = env.and([le, lt, le])?;

        let mut counter = Counter {
            visits: 0,
            memo: Default::default(),
        };
        let tree_size = counter.walk(&env, root)?;
        // distinct nodes: f, 1, shared, le, 5, lt, root
        assert_eq!(counter.visits, 7);
        // tree size counts edges: root + 2*(le: 1 + 2*3) + lt: 1 + 3 + 1
        assert_eq!(tree_size, 1 + 2 * 7 + 5);

        // a second walk is answered by the memo
        counter.walk(&env, root)?;
        assert_eq!(counter.visits, 7);
        Ok(())
    }

    #[test]
    fn deep_expressions_do_not_overflow() -> anyhow::Result<()> {
        let env = Environment::new();
        let mut e = env.bool(true);
        for _ in 0..100_000 {
            e = env.not(e)?;
        }
        let mut counter = Counter {
            visits: 0,
            memo: Default::default(),
        };
        assert_eq!(counter.walk(&env, e)?, 100_001);
        Ok(())
    }
}
