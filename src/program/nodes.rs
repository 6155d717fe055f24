//! Thorin IR 节点类型
//!
//! 所有节点（continuation、body、expression）共用一个句柄空间：
//! 子节点以 `NodeId` 引用，`Abstraction` / `Parameter` 只保存名字，
//! 通过所属 `Program` 的 labels 解析（弱引用，不拥有目标）。

use std::fmt;
use std::sync::Arc;

use super::values::{FnType, Literal, Type};
use crate::error::EvalError;

pub type NodeId = u32;

/// Continuation 名字（使用 Arc 支持零拷贝共享）
pub type Name = Arc<str>;

/// 原始运算
///
/// 元数与操作数/结果类型按运算固定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Not,
    Inf,
    InfEq,
    Eq,
}

impl PrimOp {
    pub const ALL: [PrimOp; 11] = [
        PrimOp::Add,
        PrimOp::Sub,
        PrimOp::Mul,
        PrimOp::Div,
        PrimOp::Mod,
        PrimOp::And,
        PrimOp::Or,
        PrimOp::Not,
        PrimOp::Inf,
        PrimOp::InfEq,
        PrimOp::Eq,
    ];

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "+" | "ADD" => Some(PrimOp::Add),
            "-" | "SUB" => Some(PrimOp::Sub),
            "*" | "MUL" => Some(PrimOp::Mul),
            "/" | "DIV" => Some(PrimOp::Div),
            "%" | "MOD" => Some(PrimOp::Mod),
            "&&" | "AND" => Some(PrimOp::And),
            "||" | "OR" => Some(PrimOp::Or),
            "!" | "NOT" => Some(PrimOp::Not),
            "<" | "INF" => Some(PrimOp::Inf),
            "<=" | "INFEQ" => Some(PrimOp::InfEq),
            "==" | "EQ" => Some(PrimOp::Eq),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimOp::Add => "ADD",
            PrimOp::Sub => "SUB",
            PrimOp::Mul => "MUL",
            PrimOp::Div => "DIV",
            PrimOp::Mod => "MOD",
            PrimOp::And => "AND",
            PrimOp::Or => "OR",
            PrimOp::Not => "NOT",
            PrimOp::Inf => "INF",
            PrimOp::InfEq => "INFEQ",
            PrimOp::Eq => "EQ",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            PrimOp::Add => "+",
            PrimOp::Sub => "-",
            PrimOp::Mul => "*",
            PrimOp::Div => "/",
            PrimOp::Mod => "%",
            PrimOp::And => "&&",
            PrimOp::Or => "||",
            PrimOp::Not => "!",
            PrimOp::Inf => "<",
            PrimOp::InfEq => "<=",
            PrimOp::Eq => "==",
        }
    }

    #[inline]
    pub fn arity(self) -> usize {
        match self {
            PrimOp::Not => 1,
            _ => 2,
        }
    }

    /// 操作数类型（所有操作数相同）
    pub fn operand_type(self) -> Type {
        match self {
            PrimOp::And | PrimOp::Or | PrimOp::Not => Type::Bool,
            _ => Type::Int,
        }
    }

    pub fn result_type(self) -> Type {
        match self {
            PrimOp::Add | PrimOp::Sub | PrimOp::Mul | PrimOp::Div | PrimOp::Mod => Type::Int,
            _ => Type::Bool,
        }
    }

    /// 运算表：对已知字面量直接求值
    ///
    /// 解释器和常量折叠共用此表。整数运算按补码回绕，
    /// DIV/MOD 向零截断，除数为 0 时报错。
    pub fn evaluate(self, operands: &[Literal]) -> Result<Literal, EvalError> {
        if operands.len() != self.arity() {
            return Err(EvalError::Arity {
                op: self,
                expected: self.arity(),
                actual: operands.len(),
            });
        }

        let int = |i: usize| {
            operands[i]
                .as_int()
                .ok_or_else(|| EvalError::ExpectedInt(operands[i].clone()))
        };
        let boolean = |i: usize| {
            operands[i]
                .as_bool()
                .ok_or_else(|| EvalError::ExpectedBool(operands[i].clone()))
        };

        let result = match self {
            PrimOp::Add => Literal::Int(int(0)?.wrapping_add(int(1)?)),
            PrimOp::Sub => Literal::Int(int(0)?.wrapping_sub(int(1)?)),
            PrimOp::Mul => Literal::Int(int(0)?.wrapping_mul(int(1)?)),
            PrimOp::Div | PrimOp::Mod => {
                let (lhs, rhs) = (int(0)?, int(1)?);
                if rhs == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                if self == PrimOp::Div {
                    Literal::Int(lhs.wrapping_div(rhs))
                } else {
                    Literal::Int(lhs.wrapping_rem(rhs))
                }
            }
            PrimOp::And => Literal::Bool(boolean(0)? && boolean(1)?),
            PrimOp::Or => Literal::Bool(boolean(0)? || boolean(1)?),
            PrimOp::Not => Literal::Bool(!boolean(0)?),
            PrimOp::Inf => Literal::Bool(int(0)? < int(1)?),
            PrimOp::InfEq => Literal::Bool(int(0)? <= int(1)?),
            PrimOp::Eq => Literal::Bool(int(0)? == int(1)?),
        };
        Ok(result)
    }
}

impl fmt::Display for PrimOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 原始控制操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicOp {
    /// BRANCH(condition: bool, on_true: fn(), on_false: fn())
    Branch,
}

impl IntrinsicOp {
    #[inline]
    pub fn arity(self) -> usize {
        match self {
            IntrinsicOp::Branch => 3,
        }
    }
}

impl fmt::Display for IntrinsicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntrinsicOp::Branch => f.write_str("BRANCH"),
        }
    }
}

/// IR 节点数据
///
/// 存放在 `NodeArena` 中并按结构去重（hash-consing），
/// 因此同一 Program 内结构相等等价于句柄相等。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeData {
    /// Continuation: 带类型参数的具名基本块
    ///
    /// 身份由 (name, signature, body) 决定，属性不参与比较。
    Continuation {
        name: Name,
        signature: FnType,
        body: NodeId,
    },

    /// Call: 求值 callee 得到闭包，绑定实参并跳转
    Call {
        callee: NodeId,
        arguments: Vec<NodeId>,
    },

    /// Intrinsic: 原始控制操作（目前只有 BRANCH）
    Intrinsic {
        op: IntrinsicOp,
        arguments: Vec<NodeId>,
    },

    /// PrimOp: 算术 / 逻辑 / 比较运算
    PrimOp { op: PrimOp, operands: Vec<NodeId> },

    /// Abstraction: 按名字引用另一个 continuation，求值为闭包
    Abstraction { target: Name },

    /// Parameter: continuation `target` 的第 `index` 个参数
    Parameter { target: Name, index: usize },

    /// Quote: 嵌入的常量
    Quote(Literal),

    /// Cast: int ↔ bool 显式转换
    Cast { source: NodeId, dst: Type },
}

impl NodeData {
    /// 是否可以作为 continuation 的 body
    #[inline]
    pub fn is_body(&self) -> bool {
        matches!(self, NodeData::Call { .. } | NodeData::Intrinsic { .. })
    }

    /// 是否为纯表达式
    #[inline]
    pub fn is_expression(&self) -> bool {
        !self.is_body() && !matches!(self, NodeData::Continuation { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NodeData::Continuation { .. } => "Continuation",
            NodeData::Call { .. } => "Call",
            NodeData::Intrinsic { .. } => "Intrinsic",
            NodeData::PrimOp { .. } => "PrimOp",
            NodeData::Abstraction { .. } => "Abstraction",
            NodeData::Parameter { .. } => "Parameter",
            NodeData::Quote(_) => "Quote",
            NodeData::Cast { .. } => "Cast",
        }
    }

    /// 按句柄持有的子节点（不含按名字解析的引用）
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeData::Continuation { body, .. } => vec![*body],
            NodeData::Call { callee, arguments } => {
                let mut children = Vec::with_capacity(arguments.len() + 1);
                children.push(*callee);
                children.extend_from_slice(arguments);
                children
            }
            NodeData::Intrinsic { arguments, .. } => arguments.clone(),
            NodeData::PrimOp { operands, .. } => operands.clone(),
            NodeData::Cast { source, .. } => vec![*source],
            NodeData::Abstraction { .. } | NodeData::Parameter { .. } | NodeData::Quote(_) => {
                Vec::new()
            }
        }
    }

    /// 比较除子节点句柄以外的所有字段
    ///
    /// 配合 `children()` 可以跨 arena 做结构比较。
    pub fn shallow_eq(&self, other: &NodeData) -> bool {
        match (self, other) {
            (
                NodeData::Continuation {
                    name: a,
                    signature: s,
                    ..
                },
                NodeData::Continuation {
                    name: b,
                    signature: t,
                    ..
                },
            ) => a == b && s == t,
            (NodeData::Call { arguments: a, .. }, NodeData::Call { arguments: b, .. }) => {
                a.len() == b.len()
            }
            (
                NodeData::Intrinsic {
                    op: a,
                    arguments: x,
                },
                NodeData::Intrinsic {
                    op: b,
                    arguments: y,
                },
            ) => a == b && x.len() == y.len(),
            (
                NodeData::PrimOp { op: a, operands: x },
                NodeData::PrimOp { op: b, operands: y },
            ) => a == b && x.len() == y.len(),
            (NodeData::Abstraction { target: a }, NodeData::Abstraction { target: b }) => a == b,
            (
                NodeData::Parameter {
                    target: a,
                    index: i,
                },
                NodeData::Parameter {
                    target: b,
                    index: j,
                },
            ) => a == b && i == j,
            (NodeData::Quote(a), NodeData::Quote(b)) => a == b,
            (NodeData::Cast { dst: a, .. }, NodeData::Cast { dst: b, .. }) => a == b,
            _ => false,
        }
    }

    /// 若为已知字面量（非 Bottom）则返回之
    pub fn known_literal(&self) -> Option<&Literal> {
        match self {
            NodeData::Quote(literal) if literal.is_known() => Some(literal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prim_op_from_symbol() {
        assert_eq!(PrimOp::from_symbol("+"), Some(PrimOp::Add));
        assert_eq!(PrimOp::from_symbol("MUL"), Some(PrimOp::Mul));
        assert_eq!(PrimOp::from_symbol("<="), Some(PrimOp::InfEq));
        assert_eq!(PrimOp::from_symbol("INFEQ"), Some(PrimOp::InfEq));
        assert_eq!(PrimOp::from_symbol("!"), Some(PrimOp::Not));
        assert_eq!(PrimOp::from_symbol("??"), None);

        for op in PrimOp::ALL {
            assert_eq!(PrimOp::from_symbol(op.symbol()), Some(op));
            assert_eq!(PrimOp::from_symbol(op.name()), Some(op));
        }
    }

    #[test]
    fn test_prim_op_evaluate() {
        use Literal::{Bool, Int};

        assert_eq!(PrimOp::Add.evaluate(&[Int(2), Int(3)]), Ok(Int(5)));
        assert_eq!(PrimOp::Sub.evaluate(&[Int(2), Int(3)]), Ok(Int(-1)));
        assert_eq!(PrimOp::Mul.evaluate(&[Int(6), Int(7)]), Ok(Int(42)));
        assert_eq!(PrimOp::Div.evaluate(&[Int(-7), Int(2)]), Ok(Int(-3)));
        assert_eq!(PrimOp::Mod.evaluate(&[Int(-7), Int(2)]), Ok(Int(-1)));
        assert_eq!(PrimOp::And.evaluate(&[Bool(true), Bool(false)]), Ok(Bool(false)));
        assert_eq!(PrimOp::Or.evaluate(&[Bool(true), Bool(false)]), Ok(Bool(true)));
        assert_eq!(PrimOp::Not.evaluate(&[Bool(true)]), Ok(Bool(false)));
        assert_eq!(PrimOp::Inf.evaluate(&[Int(1), Int(1)]), Ok(Bool(false)));
        assert_eq!(PrimOp::InfEq.evaluate(&[Int(1), Int(1)]), Ok(Bool(true)));
        assert_eq!(PrimOp::Eq.evaluate(&[Int(4), Int(4)]), Ok(Bool(true)));
    }

    #[test]
    fn test_prim_op_evaluate_errors() {
        use Literal::{Bool, Int};

        assert_eq!(
            PrimOp::Div.evaluate(&[Int(1), Int(0)]),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(
            PrimOp::Mod.evaluate(&[Int(1), Int(0)]),
            Err(EvalError::DivisionByZero)
        );
        assert!(matches!(
            PrimOp::Add.evaluate(&[Int(1)]),
            Err(EvalError::Arity { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            PrimOp::Add.evaluate(&[Int(1), Bool(true)]),
            Err(EvalError::ExpectedInt(_))
        ));
        assert!(matches!(
            PrimOp::Not.evaluate(&[Literal::Bottom(Type::Bool)]),
            Err(EvalError::ExpectedBool(_))
        ));
        // 回绕而非 panic
        assert_eq!(
            PrimOp::Add.evaluate(&[Int(i64::MAX), Int(1)]),
            Ok(Int(i64::MIN))
        );
        assert_eq!(
            PrimOp::Div.evaluate(&[Int(i64::MIN), Int(-1)]),
            Ok(Int(i64::MIN))
        );
    }

    #[test]
    fn test_node_children() {
        let call = NodeData::Call {
            callee: 3,
            arguments: vec![1, 2],
        };
        assert_eq!(call.children(), vec![3, 1, 2]);
        assert!(call.is_body());
        assert!(!call.is_expression());

        let param = NodeData::Parameter {
            target: Name::from("f"),
            index: 0,
        };
        assert!(param.children().is_empty());
        assert!(param.is_expression());
    }

    #[test]
    fn test_shallow_eq() {
        let a = NodeData::PrimOp {
            op: PrimOp::Add,
            operands: vec![0, 1],
        };
        let b = NodeData::PrimOp {
            op: PrimOp::Add,
            operands: vec![7, 8],
        };
        let c = NodeData::PrimOp {
            op: PrimOp::Sub,
            operands: vec![0, 1],
        };
        assert!(a.shallow_eq(&b));
        assert!(!a.shallow_eq(&c));
        assert!(!a.shallow_eq(&NodeData::Quote(Literal::Int(0))));
    }
}
