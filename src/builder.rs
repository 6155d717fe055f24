//! Program 构造器
//!
//! 所有构造方法返回节点句柄；`Abstraction` / `Parameter` 可以在目标
//! continuation 定义之前创建（名字引用在遍历时才解析），
//! 因此递归与互相引用的 continuation 可以按任意顺序定义。

use crate::error::IrError;
use crate::program::{
    Attributes, FnType, IntrinsicOp, Literal, Name, NodeData, NodeId, PrimOp, Program, Type,
};

pub struct ProgramBuilder {
    program: Program,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        ProgramBuilder {
            program: Program::new(),
        }
    }

    /// 预分配节点容量
    pub fn with_capacity(capacity: usize) -> Self {
        ProgramBuilder {
            program: Program::with_capacity(capacity),
        }
    }

    /// 从已有程序继续构造
    pub fn from_program(program: Program) -> Self {
        ProgramBuilder { program }
    }

    // ========================================================================
    // 表达式
    // ========================================================================

    pub fn literal(&mut self, literal: Literal) -> NodeId {
        self.program.intern(NodeData::Quote(literal))
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.literal(Literal::Int(value))
    }

    pub fn boolean(&mut self, value: bool) -> NodeId {
        self.literal(Literal::Bool(value))
    }

    /// 该类型的未知值
    pub fn bottom(&mut self, ty: Type) -> NodeId {
        self.literal(Literal::Bottom(ty))
    }

    /// `name` 的第 `index` 个参数
    pub fn param(&mut self, name: &str, index: usize) -> NodeId {
        self.program.intern(NodeData::Parameter {
            target: Name::from(name),
            index,
        })
    }

    /// 对 continuation `name` 的引用（求值为闭包）
    pub fn fn_ref(&mut self, name: &str) -> NodeId {
        self.program.intern(NodeData::Abstraction {
            target: Name::from(name),
        })
    }

    pub fn prim(&mut self, op: PrimOp, operands: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.program.intern(NodeData::PrimOp {
            op,
            operands: operands.into_iter().collect(),
        })
    }

    pub fn add(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.prim(PrimOp::Add, [lhs, rhs])
    }

    pub fn sub(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.prim(PrimOp::Sub, [lhs, rhs])
    }

    pub fn mul(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.prim(PrimOp::Mul, [lhs, rhs])
    }

    pub fn div(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.prim(PrimOp::Div, [lhs, rhs])
    }

    pub fn modulo(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.prim(PrimOp::Mod, [lhs, rhs])
    }

    pub fn and(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.prim(PrimOp::And, [lhs, rhs])
    }

    pub fn or(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.prim(PrimOp::Or, [lhs, rhs])
    }

    pub fn not(&mut self, operand: NodeId) -> NodeId {
        self.prim(PrimOp::Not, [operand])
    }

    pub fn inf(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.prim(PrimOp::Inf, [lhs, rhs])
    }

    pub fn infeq(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.prim(PrimOp::InfEq, [lhs, rhs])
    }

    pub fn eq(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.prim(PrimOp::Eq, [lhs, rhs])
    }

    pub fn cast(&mut self, source: NodeId, dst: Type) -> NodeId {
        self.program.intern(NodeData::Cast { source, dst })
    }

    // ========================================================================
    // Body
    // ========================================================================

    pub fn call(&mut self, callee: NodeId, arguments: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.program.intern(NodeData::Call {
            callee,
            arguments: arguments.into_iter().collect(),
        })
    }

    pub fn intrinsic(
        &mut self,
        op: IntrinsicOp,
        arguments: impl IntoIterator<Item = NodeId>,
    ) -> NodeId {
        self.program.intern(NodeData::Intrinsic {
            op,
            arguments: arguments.into_iter().collect(),
        })
    }

    /// BRANCH(condition, on_true, on_false)
    pub fn branch(&mut self, condition: NodeId, on_true: NodeId, on_false: NodeId) -> NodeId {
        self.intrinsic(IntrinsicOp::Branch, [condition, on_true, on_false])
    }

    // ========================================================================
    // Continuation
    // ========================================================================

    /// 定义 continuation
    ///
    /// Returns:
    ///     NodeId: 该 continuation 的 Abstraction 句柄
    pub fn define(&mut self, name: &str, signature: FnType, body: NodeId) -> Result<NodeId, IrError> {
        self.define_with(name, signature, body, Attributes::default())
    }

    /// 定义 external continuation（化简时的存活根）
    pub fn define_external(
        &mut self,
        name: &str,
        signature: FnType,
        body: NodeId,
    ) -> Result<NodeId, IrError> {
        self.define_with(name, signature, body, Attributes::external())
    }

    fn define_with(
        &mut self,
        name: &str,
        signature: FnType,
        body: NodeId,
        attributes: Attributes,
    ) -> Result<NodeId, IrError> {
        let continuation = self
            .program
            .define(Name::from(name), signature, body, attributes)?;
        Ok(continuation.abstraction)
    }

    pub fn mark_external(&mut self, name: &str) -> Result<(), IrError> {
        self.program.set_external(name, true)
    }

    /// 构造中的程序（只读）
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn finish(self) -> Program {
        log::debug!(
            "built program: {} continuations, {} nodes",
            self.program.labels().len(),
            self.program.arena().len()
        );
        self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_references() {
        let mut b = ProgramBuilder::with_capacity(16);
        // g 在定义之前就被引用
        let g = b.fn_ref("g");
        let body = b.call(g, []);
        let f = b.define_external("f", FnType::default(), body).unwrap();
        let body = b.call(f, []);
        b.define("g", FnType::default(), body).unwrap();
        let program = b.finish();

        program.validate().unwrap();
        assert!(program.resolve("f").unwrap().is_external());
        assert!(!program.resolve("g").unwrap().is_external());
        assert_eq!(program.resolve("g").unwrap().abstraction, g);
    }

    #[test]
    fn test_hash_consing_through_builder() {
        let mut b = ProgramBuilder::new();
        let x = b.param("f", 0);
        let one = b.int(1);
        assert_eq!(b.add(x, one), b.add(x, one));
        assert_ne!(b.add(x, one), b.add(one, x));
        assert_eq!(b.int(1), one);
    }

    #[test]
    fn test_mark_external() {
        let mut b = ProgramBuilder::new();
        let f = b.fn_ref("f");
        let body = b.call(f, []);
        b.define("f", FnType::default(), body).unwrap();
        b.mark_external("f").unwrap();
        assert!(b.program().resolve("f").unwrap().is_external());
        assert_eq!(
            b.mark_external("g"),
            Err(IrError::UnboundName(Name::from("g")))
        );
    }

    #[test]
    fn test_display_built_program() {
        let mut b = ProgramBuilder::new();
        let x = b.param("f", 0);
        let not_x = b.not(x);
        let as_int = b.cast(not_x, Type::Int);
        let k = b.param("f", 1);
        let body = b.call(k, [as_int]);
        b.define("f", "fn(bool, fn(int))".parse().unwrap(), body)
            .unwrap();
        let program = b.finish();

        assert_eq!(
            program.to_string(),
            "f : fn(bool, fn(int)) = f.args[1](((!f.args[0]) as int))\n"
        );
    }
}
