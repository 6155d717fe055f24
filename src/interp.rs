//! 参考解释器
//!
//! 单步语义：`step(continuation, env) → (next, env')`，
//! 由 `Interpreter::run` 的 trampoline 循环驱动。
//!
//! 环境是持久化映射（`im::HashMap`），闭包捕获时只做 O(1) 克隆。

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{EvalError, IrError};
use crate::program::{IntrinsicOp, Literal, Name, NodeData, NodeId, Program};

/// continuation 名字 → 该 continuation 最近一次被调用时的实参
pub type Environment = im::HashMap<Name, Vec<Value>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(Literal),
    Closure(Closure),
}

/// 闭包：continuation 加上创建时的环境
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub continuation: Name,
    pub environment: Environment,
}

impl Value {
    pub fn int(value: i64) -> Self {
        Value::Literal(Literal::Int(value))
    }

    pub fn boolean(value: bool) -> Self {
        Value::Literal(Literal::Bool(value))
    }

    pub fn as_literal(&self) -> Result<&Literal, EvalError> {
        match self {
            Value::Literal(literal) => Ok(literal),
            Value::Closure(_) => Err(EvalError::NotALiteral),
        }
    }

    pub fn as_closure(&self) -> Result<&Closure, EvalError> {
        match self {
            Value::Closure(closure) => Ok(closure),
            Value::Literal(literal) => Err(EvalError::NotAClosure(literal.to_string())),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Literal(literal) => literal.as_int(),
            Value::Closure(_) => None,
        }
    }
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        Value::Literal(literal)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(literal) => write!(f, "{literal}"),
            Value::Closure(closure) => write!(f, "<closure {}>", closure.continuation),
        }
    }
}

/// 在环境中求值一个表达式
pub fn evaluate(program: &Program, expr: NodeId, env: &Environment) -> Result<Value, EvalError> {
    Evaluator::new(program, env).eval(expr)
}

/// 单个环境下的求值，结果按 NodeId 缓存
///
/// 同一步内环境不变，共享的子表达式只求值一次。
struct Evaluator<'a> {
    program: &'a Program,
    env: &'a Environment,
    values: HashMap<NodeId, Value>,
}

impl<'a> Evaluator<'a> {
    fn new(program: &'a Program, env: &'a Environment) -> Self {
        Evaluator {
            program,
            env,
            values: HashMap::new(),
        }
    }

    fn eval(&mut self, expr: NodeId) -> Result<Value, EvalError> {
        if let Some(value) = self.values.get(&expr) {
            return Ok(value.clone());
        }
        let value = self.compute(expr)?;
        self.values.insert(expr, value.clone());
        Ok(value)
    }

    fn compute(&mut self, expr: NodeId) -> Result<Value, EvalError> {
        let (program, env) = (self.program, self.env);
        match program.node(expr) {
            NodeData::PrimOp { op, operands } => {
                let literals = operands
                    .iter()
                    .map(|operand| self.eval(*operand)?.as_literal().cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                op.evaluate(&literals).map(Value::Literal)
            }
            NodeData::Abstraction { target } => {
                let continuation = program.resolve(target)?;
                Ok(Value::Closure(Closure {
                    continuation: continuation.name.clone(),
                    environment: env.clone(),
                }))
            }
            NodeData::Parameter { target, index } => {
                program.parameter(target, *index)?;
                env.get(target)
                    .and_then(|arguments| arguments.get(*index))
                    .cloned()
                    .ok_or_else(|| EvalError::UnboundParameter {
                        name: target.clone(),
                        index: *index,
                    })
            }
            NodeData::Quote(literal) => Ok(Value::Literal(literal.clone())),
            NodeData::Cast { source, dst } => {
                let value = self.eval(*source)?;
                value.as_literal()?.cast(dst).map(Value::Literal)
            }
            node => Err(IrError::NotAnExpression { kind: node.kind() }.into()),
        }
    }
}

/// 执行 `continuation` 的 body 一步
///
/// Returns:
///     (Name, Environment): 下一个 continuation 及其环境
pub fn step(
    program: &Program,
    continuation: &str,
    env: &Environment,
) -> Result<(Name, Environment), EvalError> {
    let current = program.resolve(continuation)?;
    let mut evaluator = Evaluator::new(program, env);

    match program.node(current.body) {
        NodeData::Call { callee, arguments } => {
            let callee = evaluator.eval(*callee)?;
            let closure = callee.as_closure()?;
            let arguments = arguments
                .iter()
                .map(|argument| evaluator.eval(*argument))
                .collect::<Result<Vec<_>, _>>()?;
            enter(program, closure, arguments)
        }
        NodeData::Intrinsic {
            op: IntrinsicOp::Branch,
            arguments,
        } => {
            let [condition, on_true, on_false] = arguments.as_slice() else {
                return Err(IrError::MalformedBranch(arguments.len()).into());
            };
            let condition = evaluator.eval(*condition)?;
            let literal = condition.as_literal()?;
            let taken = literal
                .as_bool()
                .ok_or_else(|| EvalError::ExpectedBool(literal.clone()))?;
            let target = evaluator.eval(if taken { *on_true } else { *on_false })?;
            enter(program, target.as_closure()?, Vec::new())
        }
        node => Err(IrError::NotABody {
            name: current.name.clone(),
            kind: node.kind(),
        }
        .into()),
    }
}

/// 绑定实参并进入闭包
fn enter(
    program: &Program,
    closure: &Closure,
    arguments: Vec<Value>,
) -> Result<(Name, Environment), EvalError> {
    let target = program.resolve(&closure.continuation)?;
    if arguments.len() != target.arity() {
        return Err(EvalError::ArgumentCount {
            name: target.name.clone(),
            expected: target.arity(),
            actual: arguments.len(),
        });
    }
    let environment = closure.environment.update(target.name.clone(), arguments);
    Ok((target.name.clone(), environment))
}

/// 停机状态：即将进入的 continuation 及其实参
#[derive(Debug, Clone, PartialEq)]
pub struct Halt {
    pub continuation: Name,
    pub arguments: Vec<Value>,
    pub steps: usize,
}

/// Trampoline 解释器
///
/// 配置项：
/// - `halt_on(name)`：即将进入 `name` 时停机（通常是返回 continuation）
/// - `with_step_limit(n)`：超过 `n` 步报 `StepLimitExceeded`
pub struct Interpreter<'p> {
    program: &'p Program,
    halt_on: HashSet<Name>,
    step_limit: Option<usize>,
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p Program) -> Self {
        Interpreter {
            program,
            halt_on: HashSet::new(),
            step_limit: None,
        }
    }

    pub fn halt_on(mut self, name: &str) -> Self {
        self.halt_on.insert(Name::from(name));
        self
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = Some(limit);
        self
    }

    /// 顶层闭包（空环境）
    pub fn closure(&self, name: &str) -> Result<Value, EvalError> {
        let continuation = self.program.resolve(name)?;
        Ok(Value::Closure(Closure {
            continuation: continuation.name.clone(),
            environment: Environment::new(),
        }))
    }

    /// 以 `arguments` 调用 `entry`，运行到停机
    pub fn run(&self, entry: &str, arguments: Vec<Value>) -> Result<Halt, EvalError> {
        let Value::Closure(closure) = self.closure(entry)? else {
            return Err(EvalError::NotAClosure(entry.to_string()));
        };
        let (mut current, mut env) = enter(self.program, &closure, arguments)?;
        let mut steps = 0usize;

        loop {
            if self.halt_on.contains(&current) {
                log::debug!("halted on {} after {} steps", current, steps);
                let arguments = env.get(&current).cloned().unwrap_or_default();
                return Ok(Halt {
                    continuation: current,
                    arguments,
                    steps,
                });
            }
            if let Some(limit) = self.step_limit {
                if steps >= limit {
                    return Err(EvalError::StepLimitExceeded(limit));
                }
            }

            log::trace!("step {}: {}", steps, current);
            let (next, next_env) = step(self.program, &current, &env)?;
            current = next;
            env = next_env;
            steps += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::fixtures;
    use crate::program::{FnType, PrimOp, Type};

    fn factorial(n: i64) -> Result<Halt, EvalError> {
        let program = fixtures::factorial_with_return().unwrap();
        let interpreter = Interpreter::new(&program)
            .halt_on("ret")
            .with_step_limit(10_000);
        let ret = interpreter.closure("ret")?;
        interpreter.run("fac", vec![Value::int(n), ret])
    }

    #[test]
    fn test_factorial_of_seven() {
        let halt = factorial(7).unwrap();
        assert_eq!(&*halt.continuation, "ret");
        assert_eq!(halt.arguments, vec![Value::int(5040)]);
    }

    #[test]
    fn test_factorial_small_inputs() {
        assert_eq!(factorial(0).unwrap().arguments, vec![Value::int(1)]);
        assert_eq!(factorial(1).unwrap().arguments, vec![Value::int(1)]);
        assert_eq!(factorial(5).unwrap().arguments, vec![Value::int(120)]);
    }

    #[test]
    fn test_step_binds_arguments() {
        let program = fixtures::factorial_with_return().unwrap();
        let interpreter = Interpreter::new(&program);
        let ret = interpreter.closure("ret").unwrap();
        let env = Environment::new().update(Name::from("fac"), vec![Value::int(3), ret]);

        // fac(3, ret)：3 <= 0 为假，跳到 else
        let (next, env) = step(&program, "fac", &env).unwrap();
        assert_eq!(&*next, "else");
        assert_eq!(env.get("else"), Some(&Vec::new()));

        // else → head(2, 1)
        let (next, env) = step(&program, &next, &env).unwrap();
        assert_eq!(&*next, "head");
        assert_eq!(env.get("head"), Some(&vec![Value::int(2), Value::int(1)]));
        // fac 的绑定经由闭包环境传递下去
        assert!(env.contains_key("fac"));
    }

    #[test]
    fn test_step_limit() {
        let program = fixtures::factorial_with_return().unwrap();
        let interpreter = Interpreter::new(&program).with_step_limit(3);
        let ret = interpreter.closure("ret").unwrap();
        assert_eq!(
            interpreter.run("fac", vec![Value::int(7), ret]),
            Err(EvalError::StepLimitExceeded(3))
        );
    }

    #[test]
    fn test_argument_count_checked() {
        let program = fixtures::factorial_with_return().unwrap();
        let interpreter = Interpreter::new(&program);
        assert!(matches!(
            interpreter.run("fac", vec![Value::int(7)]),
            Err(EvalError::ArgumentCount { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_branch_target_must_be_closure() {
        let mut b = ProgramBuilder::new();
        let cond = b.boolean(true);
        let not_a_closure = b.int(1);
        let f = b.fn_ref("f");
        let body = b.branch(cond, not_a_closure, f);
        b.define("f", FnType::default(), body).unwrap();
        let program = b.finish();

        assert_eq!(
            step(&program, "f", &Environment::new()),
            Err(EvalError::NotAClosure("1".to_string()))
        );
    }

    #[test]
    fn test_evaluate_expressions() {
        let mut b = ProgramBuilder::new();
        let x = b.param("f", 0);
        let one = b.int(1);
        let sum = b.add(x, one);
        let positive = b.cast(sum, Type::Bool);
        let back = b.cast(positive, Type::Int);
        let k = b.param("f", 1);
        let body = b.call(k, [back]);
        b.define("f", "fn(int, fn(int))".parse().unwrap(), body)
            .unwrap();
        let program = b.finish();

        let env = Environment::new().update(Name::from("f"), vec![Value::int(4), Value::int(0)]);
        assert_eq!(evaluate(&program, sum, &env), Ok(Value::int(5)));
        assert_eq!(evaluate(&program, positive, &env), Ok(Value::boolean(true)));
        assert_eq!(evaluate(&program, back, &env), Ok(Value::int(1)));

        // 参数未绑定
        assert!(matches!(
            evaluate(&program, x, &Environment::new()),
            Err(EvalError::UnboundParameter { index: 0, .. })
        ));
    }

    #[test]
    fn test_prim_op_table_shared_with_folding() {
        let mut b = ProgramBuilder::new();
        let seven = b.int(7);
        let zero = b.int(0);
        let div = b.prim(PrimOp::Div, [seven, zero]);
        let program = b.program().clone();
        assert_eq!(
            evaluate(&program, div, &Environment::new()),
            Err(EvalError::DivisionByZero)
        );
    }
}
