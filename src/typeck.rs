//! 类型检查
//!
//! 只读地重新推导每个表达式的类型并与期望比较。
//! 核心变换不做类型检查；在良类型的程序上运行它们才能保证输出良类型。

use std::collections::HashMap;

use crate::error::{IrError, TypeError};
use crate::program::{Continuation, IntrinsicOp, Name, NodeData, NodeId, Program, Type};

/// 一次类型检查的状态
///
/// 表达式的类型与所在 continuation 无关，按 NodeId 缓存；
/// hash-consing 共享的子表达式只推导一次。
pub struct TypeChecker<'p> {
    program: &'p Program,
    types: HashMap<NodeId, Type>,
}

impl<'p> TypeChecker<'p> {
    pub fn new(program: &'p Program) -> Self {
        TypeChecker {
            program,
            types: HashMap::new(),
        }
    }

    /// 检查所有 continuation
    pub fn check_program(&mut self) -> Result<(), TypeError> {
        let program = self.program;
        for continuation in program.continuations() {
            self.check_continuation(continuation)?;
        }
        log::debug!(
            "type check: {} continuations ok, {} expressions typed",
            program.labels().len(),
            self.types.len()
        );
        Ok(())
    }

    /// 检查单个 continuation 的 body
    pub fn check_continuation(&mut self, continuation: &Continuation) -> Result<(), TypeError> {
        let program = self.program;
        let name = &continuation.name;

        match program.node(continuation.body) {
            NodeData::Call { callee, arguments } => {
                let callee_type = self.type_of(name, *callee)?;
                let Type::Fn(signature) = callee_type else {
                    return Err(TypeError::NotCallable {
                        continuation: name.clone(),
                        actual: callee_type,
                    });
                };
                if signature.arity() != arguments.len() {
                    return Err(TypeError::ArgumentCount {
                        continuation: name.clone(),
                        expected: signature.arity(),
                        actual: arguments.len(),
                    });
                }
                for (expected, argument) in signature.params.iter().zip(arguments) {
                    self.expect(name, *argument, expected)?;
                }
                Ok(())
            }
            NodeData::Intrinsic {
                op: IntrinsicOp::Branch,
                arguments,
            } => {
                let [condition, on_true, on_false] = arguments.as_slice() else {
                    return Err(IrError::MalformedBranch(arguments.len()).into());
                };
                self.expect(name, *condition, &Type::Bool)?;
                let target = Type::func([]);
                self.expect(name, *on_true, &target)?;
                self.expect(name, *on_false, &target)
            }
            node => Err(IrError::NotABody {
                name: name.clone(),
                kind: node.kind(),
            }
            .into()),
        }
    }

    fn expect(&mut self, continuation: &Name, expr: NodeId, expected: &Type) -> Result<(), TypeError> {
        let actual = self.type_of(continuation, expr)?;
        if &actual != expected {
            return Err(TypeError::Mismatch {
                continuation: continuation.clone(),
                expected: expected.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// 推导表达式的类型（带缓存）
    ///
    /// Args:
    ///     continuation: 表达式所在的 continuation（用于错误信息）
    pub fn type_of(&mut self, continuation: &Name, expr: NodeId) -> Result<Type, TypeError> {
        if let Some(ty) = self.types.get(&expr) {
            return Ok(ty.clone());
        }
        let ty = self.infer(continuation, expr)?;
        self.types.insert(expr, ty.clone());
        Ok(ty)
    }

    fn infer(&mut self, continuation: &Name, expr: NodeId) -> Result<Type, TypeError> {
        let program = self.program;
        match program.node(expr) {
            NodeData::PrimOp { op, operands } => {
                if operands.len() != op.arity() {
                    return Err(TypeError::Arity {
                        continuation: continuation.clone(),
                        op: op.to_string(),
                        expected: op.arity(),
                        actual: operands.len(),
                    });
                }
                let operand_type = op.operand_type();
                for operand in operands {
                    self.expect(continuation, *operand, &operand_type)?;
                }
                Ok(op.result_type())
            }
            NodeData::Abstraction { target } => {
                Ok(Type::Fn(program.resolve(target)?.signature.clone()))
            }
            NodeData::Parameter { target, index } => {
                program.parameter(target, *index)?;
                let signature = &program.resolve(target)?.signature;
                Ok(signature.params[*index].clone())
            }
            NodeData::Quote(literal) => Ok(literal.ty()),
            NodeData::Cast { source, dst } => {
                let from = self.type_of(continuation, *source)?;
                match (&from, dst) {
                    (Type::Int, Type::Bool) | (Type::Bool, Type::Int) => Ok(dst.clone()),
                    _ => Err(TypeError::UnsupportedCast {
                        continuation: continuation.clone(),
                        from,
                        to: dst.clone(),
                    }),
                }
            }
            node => Err(IrError::NotAnExpression { kind: node.kind() }.into()),
        }
    }
}

/// 检查所有 continuation
pub fn type_check(program: &Program) -> Result<(), TypeError> {
    TypeChecker::new(program).check_program()
}

/// 检查单个 continuation 的 body
pub fn check_continuation(program: &Program, continuation: &Continuation) -> Result<(), TypeError> {
    TypeChecker::new(program).check_continuation(continuation)
}

/// 推导单个表达式的类型
pub fn type_of(program: &Program, continuation: &Name, expr: NodeId) -> Result<Type, TypeError> {
    TypeChecker::new(program).type_of(continuation, expr)
}

impl Program {
    pub fn type_check(&self) -> Result<(), TypeError> {
        type_check(self)
    }
}
