//! 化简（常量折叠 + 死 continuation 消除）
//!
//! 以导入的方式重建程序：从所有 external continuation 出发，
//! 把 body 逐个导入新的 Program，导入时折叠常量。
//! 导入结果中仍然引用到的 continuation 才会入队，
//! 从未入队的 continuation 被丢弃。
//!
//! 旧句柄 → 新句柄的翻译表保证共享不丢失，并保证在环上终止。

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::IrError;
use crate::program::{IntrinsicOp, Literal, Name, NodeData, NodeId, PrimOp, Program};

/// 化简统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimplifyStats {
    /// 导入的 continuation 数
    pub imported: usize,
    /// 折叠掉的 PrimOp / Cast 数
    pub folded: usize,
    /// 条件已知而坍缩为直接调用的 BRANCH 数
    pub branches_collapsed: usize,
    /// 丢弃的 continuation 数
    pub dropped: usize,
    /// 翻译表命中次数
    pub memo_hits: usize,
}

pub struct Simplifier<'p> {
    old: &'p Program,
    new: Program,
    queue: VecDeque<Name>,
    enqueued: HashSet<Name>,
    translated: HashMap<NodeId, NodeId>,
    stats: SimplifyStats,
}

impl<'p> Simplifier<'p> {
    pub fn new(program: &'p Program) -> Self {
        Simplifier {
            old: program,
            new: Program::with_capacity(program.arena().len()),
            queue: VecDeque::new(),
            enqueued: HashSet::new(),
            translated: HashMap::new(),
            stats: SimplifyStats::default(),
        }
    }

    /// 执行化简
    ///
    /// Returns:
    ///     (Program, SimplifyStats): 化简后的程序与统计信息
    pub fn run(mut self) -> Result<(Program, SimplifyStats), IrError> {
        let roots: Vec<Name> = self.old.externals().map(|c| c.name.clone()).collect();
        for root in roots {
            self.enqueue(root);
        }

        while let Some(name) = self.queue.pop_front() {
            let old = self.old.resolve(&name)?;
            let body = self.import(old.body)?;
            self.new
                .define(name, old.signature.clone(), body, old.attributes)?;
            self.stats.imported += 1;
            self.enqueue_references(body)?;
        }

        self.stats.dropped = self.old.labels().len() - self.new.labels().len();
        log::debug!(
            "simplify: kept {} continuations, dropped {}, folded {} expressions, collapsed {} branches",
            self.stats.imported,
            self.stats.dropped,
            self.stats.folded,
            self.stats.branches_collapsed
        );

        Ok((self.new, self.stats))
    }

    fn enqueue(&mut self, name: Name) {
        if self.enqueued.insert(name.clone()) {
            self.queue.push_back(name);
        }
    }

    /// 新 body 中仍然存在的名字引用入队
    fn enqueue_references(&mut self, body: NodeId) -> Result<(), IrError> {
        let mut stack = vec![body];
        let mut seen = HashSet::new();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            match self.new.node(id) {
                NodeData::Abstraction { target } | NodeData::Parameter { target, .. } => {
                    let target = self.old.resolve(target)?.name.clone();
                    self.enqueue(target);
                }
                node => stack.extend(node.children()),
            }
        }

        Ok(())
    }

    fn import(&mut self, id: NodeId) -> Result<NodeId, IrError> {
        if let Some(&new) = self.translated.get(&id) {
            self.stats.memo_hits += 1;
            return Ok(new);
        }

        let new = match self.old.node(id).clone() {
            NodeData::Call { callee, arguments } => {
                let callee = self.import(callee)?;
                let arguments = self.import_all(&arguments)?;
                self.new.intern(NodeData::Call { callee, arguments })
            }
            NodeData::Intrinsic { op, arguments } => self.import_intrinsic(op, &arguments)?,
            NodeData::PrimOp { op, operands } => self.import_prim_op(op, &operands)?,
            NodeData::Cast { source, dst } => {
                let source = self.import(source)?;
                let folded = self
                    .literal(source)
                    .and_then(|literal| literal.cast(&dst).ok());
                match folded {
                    Some(literal) => {
                        self.stats.folded += 1;
                        self.quote(literal)
                    }
                    None => self.new.intern(NodeData::Cast { source, dst }),
                }
            }
            NodeData::Abstraction { target } => {
                self.old.resolve(&target)?;
                self.new.intern(NodeData::Abstraction { target })
            }
            NodeData::Parameter { target, index } => {
                self.old.parameter(&target, index)?;
                self.new.intern(NodeData::Parameter { target, index })
            }
            NodeData::Quote(literal) => self.quote(literal),
            node @ NodeData::Continuation { .. } => {
                return Err(IrError::NotAnExpression { kind: node.kind() })
            }
        };

        self.translated.insert(id, new);
        Ok(new)
    }

    fn import_all(&mut self, ids: &[NodeId]) -> Result<Vec<NodeId>, IrError> {
        ids.iter().map(|id| self.import(*id)).collect()
    }

    fn import_intrinsic(
        &mut self,
        op: IntrinsicOp,
        arguments: &[NodeId],
    ) -> Result<NodeId, IrError> {
        match op {
            IntrinsicOp::Branch => {
                let [condition, on_true, on_false] = arguments else {
                    return Err(IrError::MalformedBranch(arguments.len()));
                };
                let condition = self.import(*condition)?;
                if let Some(taken) = self.literal(condition).and_then(Literal::as_bool) {
                    let target = if taken { *on_true } else { *on_false };
                    let callee = self.import(target)?;
                    self.stats.branches_collapsed += 1;
                    log::trace!("BRANCH on {taken} collapsed");
                    return Ok(self.new.intern(NodeData::Call {
                        callee,
                        arguments: Vec::new(),
                    }));
                }
                let on_true = self.import(*on_true)?;
                let on_false = self.import(*on_false)?;
                Ok(self.new.intern(NodeData::Intrinsic {
                    op,
                    arguments: vec![condition, on_true, on_false],
                }))
            }
        }
    }

    fn import_prim_op(&mut self, op: PrimOp, operands: &[NodeId]) -> Result<NodeId, IrError> {
        let operands = self.import_all(operands)?;

        let literals: Option<Vec<Literal>> = operands
            .iter()
            .map(|id| self.literal(*id).cloned())
            .collect();
        if let Some(literals) = literals {
            match op.evaluate(&literals) {
                Ok(value) => {
                    self.stats.folded += 1;
                    return Ok(self.quote(value));
                }
                // 例如除以 0：保留原表达式，留到运行时报错
                Err(err) => log::trace!("not folding {op}: {err}"),
            }
        }

        if let Some(simplified) = self.identity(op, &operands) {
            self.stats.folded += 1;
            return Ok(simplified);
        }

        Ok(self.new.intern(NodeData::PrimOp { op, operands }))
    }

    /// 代数恒等式，另一个操作数未知时同样适用
    fn identity(&mut self, op: PrimOp, operands: &[NodeId]) -> Option<NodeId> {
        let [lhs, rhs] = *operands else {
            return None;
        };
        let int = |this: &Self, id| this.literal(id).and_then(Literal::as_int);
        let boolean = |this: &Self, id| this.literal(id).and_then(Literal::as_bool);

        match op {
            PrimOp::Mul => {
                if int(self, lhs) == Some(0) || int(self, rhs) == Some(0) {
                    Some(self.quote(Literal::Int(0)))
                } else if int(self, rhs) == Some(1) {
                    Some(lhs)
                } else if int(self, lhs) == Some(1) {
                    Some(rhs)
                } else {
                    None
                }
            }
            PrimOp::Div | PrimOp::Mod if int(self, rhs) == Some(1) => Some(lhs),
            PrimOp::And if boolean(self, lhs) == Some(false) || boolean(self, rhs) == Some(false) => {
                Some(self.quote(Literal::Bool(false)))
            }
            PrimOp::Or if boolean(self, lhs) == Some(true) || boolean(self, rhs) == Some(true) => {
                Some(self.quote(Literal::Bool(true)))
            }
            _ => None,
        }
    }

    /// 新程序中 `id` 若为已知字面量则返回之
    fn literal(&self, id: NodeId) -> Option<&Literal> {
        self.new.node(id).known_literal()
    }

    fn quote(&mut self, literal: Literal) -> NodeId {
        self.new.intern(NodeData::Quote(literal))
    }
}

/// 化简整个程序
pub fn simplify(program: &Program) -> Result<Program, IrError> {
    Simplifier::new(program).run().map(|(program, _)| program)
}

impl Program {
    pub fn simplify(&self) -> Result<Program, IrError> {
        simplify(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::fixtures;
    use crate::program::{FnType, Type};

    /// `f : fn(int, fn(int)) = k(expr)`，`k = f.args[1]`
    fn with_result<F>(build: F) -> (Program, Program)
    where
        F: FnOnce(&mut ProgramBuilder) -> NodeId,
    {
        let mut b = ProgramBuilder::new();
        let expr = build(&mut b);
        let k = b.param("f", 1);
        let body = b.call(k, [expr]);
        b.define_external("f", "fn(int, fn(int))".parse().unwrap(), body)
            .unwrap();
        let program = b.finish();
        let simplified = program.simplify().unwrap();
        (program, simplified)
    }

    fn result_of(program: &Program) -> String {
        let f = program.resolve("f").unwrap();
        match program.node(f.body) {
            NodeData::Call { arguments, .. } => program.display_node(arguments[0]).to_string(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_fold_all_known() {
        let (_, simplified) = with_result(|b| {
            let two = b.int(2);
            let three = b.int(3);
            let four = b.int(4);
            let sum = b.add(two, three);
            b.mul(sum, four)
        });
        assert_eq!(result_of(&simplified), "20");
    }

    #[test]
    fn test_mul_by_zero_with_unknown_operand() {
        let (_, simplified) = with_result(|b| {
            let x = b.param("f", 0);
            let zero = b.int(0);
            b.mul(x, zero)
        });
        assert_eq!(result_of(&simplified), "0");
    }

    #[test]
    fn test_identities() {
        let (_, s) = with_result(|b| {
            let x = b.param("f", 0);
            let one = b.int(1);
            b.div(x, one)
        });
        assert_eq!(result_of(&s), "f.args[0]");

        let (_, s) = with_result(|b| {
            let x = b.param("f", 0);
            let one = b.int(1);
            b.mul(one, x)
        });
        assert_eq!(result_of(&s), "f.args[0]");

        let (_, s) = with_result(|b| {
            let x = b.param("f", 0);
            let one = b.int(1);
            b.modulo(x, one)
        });
        assert_eq!(result_of(&s), "f.args[0]");

        let (_, s) = with_result(|b| {
            let x = b.param("f", 0);
            let zero = b.int(0);
            let cond = b.inf(x, zero);
            let no = b.boolean(false);
            let and = b.and(cond, no);
            b.cast(and, Type::Int)
        });
        assert_eq!(result_of(&s), "0");

        let (_, s) = with_result(|b| {
            let x = b.param("f", 0);
            let zero = b.int(0);
            let cond = b.inf(x, zero);
            let yes = b.boolean(true);
            let or = b.or(yes, cond);
            b.cast(or, Type::Int)
        });
        assert_eq!(result_of(&s), "1");
    }

    #[test]
    fn test_division_by_zero_left_unfolded() {
        let (_, s) = with_result(|b| {
            let one = b.int(1);
            let zero = b.int(0);
            b.div(one, zero)
        });
        assert_eq!(result_of(&s), "(1 / 0)");
    }

    #[test]
    fn test_bottom_is_not_known() {
        let (_, s) = with_result(|b| {
            let unknown = b.bottom(Type::Int);
            let two = b.int(2);
            b.add(unknown, two)
        });
        assert_eq!(result_of(&s), "(⊥ + 2)");
    }

    #[test]
    fn test_cast_folding() {
        let (_, s) = with_result(|b| {
            let five = b.int(5);
            let flag = b.cast(five, Type::Bool);
            b.cast(flag, Type::Int)
        });
        assert_eq!(result_of(&s), "1");

        // 未知 source 上的 Cast 保留
        let (_, s) = with_result(|b| {
            let x = b.param("f", 0);
            let flag = b.cast(x, Type::Bool);
            b.cast(flag, Type::Int)
        });
        assert_eq!(result_of(&s), "((f.args[0] as bool) as int)");
    }

    fn branch_program(condition: bool) -> Program {
        let mut b = ProgramBuilder::new();
        let cond = b.boolean(condition);
        let on_true = b.fn_ref("on_true");
        let on_false = b.fn_ref("on_false");
        let body = b.branch(cond, on_true, on_false);
        b.define_external("start", FnType::default(), body).unwrap();

        for name in ["on_true", "on_false"] {
            let start = b.fn_ref("start");
            let body = b.call(start, []);
            b.define(name, FnType::default(), body).unwrap();
        }
        b.finish()
    }

    #[test]
    fn test_branch_folding() {
        let simplified = branch_program(true).simplify().unwrap();
        let start = simplified.resolve("start").unwrap();
        assert_eq!(simplified.display_node(start.body).to_string(), "on_true()");
        assert!(simplified.contains("on_true"));
        assert!(!simplified.contains("on_false"));

        let simplified = branch_program(false).simplify().unwrap();
        let start = simplified.resolve("start").unwrap();
        assert_eq!(simplified.display_node(start.body).to_string(), "on_false()");
        assert!(!simplified.contains("on_true"));
    }

    #[test]
    fn test_dead_continuations_dropped() {
        let program = fixtures::factorial().unwrap();
        let (simplified, stats) = Simplifier::new(&program).run().unwrap();
        assert_eq!(simplified.labels().len(), 6);
        assert_eq!(stats.dropped, 0);

        // 没有 external 根时全部丢弃
        let closed = program.with_external("fac", false).unwrap();
        let (simplified, stats) = Simplifier::new(&closed).run().unwrap();
        assert!(simplified.labels().is_empty());
        assert_eq!(stats.dropped, 6);
    }

    #[test]
    fn test_folded_operand_does_not_keep_continuation_alive() {
        // f 的结果是 (g as int) * 0，g 被折叠掉后不再存活
        let mut b = ProgramBuilder::new();
        let g = b.fn_ref("g");
        let g_int = b.cast(g, Type::Int);
        let zero = b.int(0);
        let product = b.mul(g_int, zero);
        let k = b.param("f", 0);
        let body = b.call(k, [product]);
        b.define_external("f", "fn(fn(int))".parse().unwrap(), body)
            .unwrap();
        let f = b.fn_ref("f");
        let body = b.call(f, [f]);
        b.define("g", FnType::default(), body).unwrap();
        let program = b.finish();

        let simplified = program.simplify().unwrap();
        assert!(!simplified.contains("g"));
        assert_eq!(simplified.simplify().unwrap(), simplified);
    }

    #[test]
    fn test_idempotent_on_factorial() {
        let program = fixtures::factorial().unwrap();
        let once = program.simplify().unwrap();
        let twice = once.simplify().unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, program);
    }

    #[test]
    fn test_malformed_branch_is_fatal() {
        let mut b = ProgramBuilder::new();
        let cond = b.boolean(true);
        let body = b.intrinsic(IntrinsicOp::Branch, [cond]);
        b.define_external("f", FnType::default(), body).unwrap();
        let program = b.finish();
        assert_eq!(program.simplify(), Err(IrError::MalformedBranch(1)));
    }

    #[test]
    fn test_memo_preserves_sharing() {
        let (_, s) = with_result(|b| {
            let x = b.param("f", 0);
            let two = b.int(2);
            let shared = b.add(x, two);
            b.mul(shared, shared)
        });
        let f = s.resolve("f").unwrap();
        let NodeData::Call { arguments, .. } = s.node(f.body) else {
            panic!("expected call");
        };
        let NodeData::PrimOp { operands, .. } = s.node(arguments[0]) else {
            panic!("expected prim op");
        };
        assert_eq!(operands[0], operands[1]);
    }
}
