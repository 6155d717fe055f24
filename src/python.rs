//! Python 绑定（feature `python`）
//!
//! Python 只持有轻量级的 NodeId（4 字节）与 Program 的不可变快照。

use std::cell::RefCell;
use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::builder::ProgramBuilder;
use crate::interp::{Interpreter, Value};
use crate::mangle::Substitutions;
use crate::program::{FnType, Literal, Name, NodeData, NodeId, PrimOp, Program, Type};

fn value_error(err: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn parse_type(s: &str) -> PyResult<Type> {
    s.parse().map_err(value_error)
}

fn parse_signature(s: &str) -> PyResult<FnType> {
    s.parse().map_err(value_error)
}

/// 程序构造器
///
/// 使用 RefCell 支持内部可变性（单线程）
#[pyclass(name = "Builder", unsendable)]
pub struct PyBuilder {
    inner: RefCell<ProgramBuilder>,
}

/// Python 传入的句柄必须来自同一个 arena
fn check_handles(program: &Program, ids: &[NodeId]) -> PyResult<()> {
    let len = program.arena().len();
    match ids.iter().find(|id| **id as usize >= len) {
        Some(id) => Err(PyValueError::new_err(format!("unknown node handle {id}"))),
        None => Ok(()),
    }
}

impl PyBuilder {
    fn check(&self, ids: &[NodeId]) -> PyResult<()> {
        check_handles(self.inner.borrow().program(), ids)
    }
}

#[pymethods]
impl PyBuilder {
    #[new]
    fn new() -> Self {
        PyBuilder {
            inner: RefCell::new(ProgramBuilder::new()),
        }
    }

    /// 创建带预分配容量的构造器
    #[staticmethod]
    fn with_capacity(capacity: usize) -> Self {
        PyBuilder {
            inner: RefCell::new(ProgramBuilder::with_capacity(capacity)),
        }
    }

    fn int(&self, value: i64) -> u32 {
        self.inner.borrow_mut().int(value)
    }

    fn boolean(&self, value: bool) -> u32 {
        self.inner.borrow_mut().boolean(value)
    }

    /// 未知值
    ///
    /// Args:
    ///     ty: 类型字符串，如 "int" / "fn(int)"
    fn bottom(&self, ty: &str) -> PyResult<u32> {
        let ty = parse_type(ty)?;
        Ok(self.inner.borrow_mut().bottom(ty))
    }

    fn param(&self, name: &str, index: usize) -> u32 {
        self.inner.borrow_mut().param(name, index)
    }

    fn fn_ref(&self, name: &str) -> u32 {
        self.inner.borrow_mut().fn_ref(name)
    }

    /// 原始运算
    ///
    /// Args:
    ///     op: 运算符号或名字，如 "+" / "MUL" / "<="
    ///     operands: 操作数句柄
    fn prim(&self, op: &str, operands: Vec<u32>) -> PyResult<u32> {
        let op = PrimOp::from_symbol(op)
            .ok_or_else(|| PyValueError::new_err(format!("unknown operator `{op}`")))?;
        self.check(&operands)?;
        Ok(self.inner.borrow_mut().prim(op, operands))
    }

    fn cast(&self, source: u32, ty: &str) -> PyResult<u32> {
        let ty = parse_type(ty)?;
        self.check(&[source])?;
        Ok(self.inner.borrow_mut().cast(source, ty))
    }

    fn call(&self, callee: u32, arguments: Vec<u32>) -> PyResult<u32> {
        self.check(&[callee])?;
        self.check(&arguments)?;
        Ok(self.inner.borrow_mut().call(callee, arguments))
    }

    fn branch(&self, condition: u32, on_true: u32, on_false: u32) -> PyResult<u32> {
        self.check(&[condition, on_true, on_false])?;
        Ok(self.inner.borrow_mut().branch(condition, on_true, on_false))
    }

    /// 定义 continuation
    ///
    /// Returns:
    ///     int: 该 continuation 的 Abstraction 句柄
    ///
    /// Raises:
    ///     ValueError: 名字重复或 body 不是 Call / BRANCH
    #[pyo3(signature = (name, signature, body, external = false))]
    fn define(&self, name: &str, signature: &str, body: u32, external: bool) -> PyResult<u32> {
        let signature = parse_signature(signature)?;
        self.check(&[body])?;
        let mut builder = self.inner.borrow_mut();
        let result = if external {
            builder.define_external(name, signature, body)
        } else {
            builder.define(name, signature, body)
        };
        result.map_err(value_error)
    }

    /// 当前程序的快照
    fn build(&self) -> PyProgram {
        PyProgram {
            inner: self.inner.borrow().program().clone(),
        }
    }

    fn __repr__(&self) -> String {
        let builder = self.inner.borrow();
        format!(
            "<Builder continuations={} nodes={}>",
            builder.program().labels().len(),
            builder.program().arena().len()
        )
    }
}

/// 不可变程序；所有变换返回新的 Program
#[pyclass(name = "Program", unsendable)]
#[derive(Clone)]
pub struct PyProgram {
    inner: Program,
}

#[pymethods]
impl PyProgram {
    #[getter]
    fn labels(&self) -> Vec<String> {
        self.inner.labels().keys().map(|name| name.to_string()).collect()
    }

    #[getter]
    fn externals(&self) -> Vec<String> {
        self.inner.externals().map(|c| c.name.to_string()).collect()
    }

    /// `name` 的第 `index` 个参数句柄
    fn param(&self, name: &str, index: usize) -> PyResult<u32> {
        self.inner.parameter(name, index).map_err(value_error)
    }

    /// 插入字面量节点（用作替换表的值）
    fn quote(&mut self, value: i64) -> u32 {
        self.inner.intern(NodeData::Quote(Literal::Int(value)))
    }

    /// 插入参数节点（目标可以尚未定义，例如特化的新入口）
    fn parameter_node(&mut self, name: &str, index: usize) -> u32 {
        self.inner.intern(NodeData::Parameter {
            target: Name::from(name),
            index,
        })
    }

    fn validate(&self) -> PyResult<()> {
        self.inner.validate().map_err(value_error)
    }

    fn type_check(&self) -> PyResult<()> {
        self.inner.type_check().map_err(value_error)
    }

    fn simplify(&self) -> PyResult<PyProgram> {
        let inner = self.inner.simplify().map_err(value_error)?;
        Ok(PyProgram { inner })
    }

    /// Returns:
    ///     List[str]: scope 内的 continuation 名字
    fn scope(&self, entry: &str) -> PyResult<Vec<String>> {
        let scope = self.inner.scope(entry).map_err(value_error)?;
        Ok(scope.continuations.iter().map(|n| n.to_string()).collect())
    }

    /// Returns:
    ///     List[Tuple[str, str, int, bool]]: (caller, callee, order, is_simple)
    fn call_graph(&self) -> PyResult<Vec<(String, String, u32, bool)>> {
        let graph = self.inner.call_graph().map_err(value_error)?;
        let mut edges = Vec::new();
        for node in graph.nodes() {
            for (callee, call) in graph.calls(&node.name) {
                edges.push((
                    node.name.to_string(),
                    callee.to_string(),
                    call.order,
                    call.is_simple,
                ));
            }
        }
        Ok(edges)
    }

    fn to_dot(&self) -> PyResult<String> {
        self.inner.to_dot().map_err(value_error)
    }

    fn call_graph_dot(&self) -> PyResult<String> {
        let graph = self.inner.call_graph().map_err(value_error)?;
        crate::dot::call_graph_to_dot(&graph).map_err(value_error)
    }

    /// 特化
    ///
    /// Args:
    ///     entry: 被特化的 continuation
    ///     new_name: 新入口名字
    ///     signature: 新入口签名字符串
    ///     substitutions: 句柄 → 句柄
    fn mangle(
        &self,
        entry: &str,
        new_name: &str,
        signature: &str,
        substitutions: HashMap<u32, u32>,
    ) -> PyResult<PyProgram> {
        let signature = parse_signature(signature)?;
        let substitutions: Substitutions = substitutions.into_iter().collect();
        for (from, to) in &substitutions {
            check_handles(&self.inner, &[*from, *to])?;
        }
        let inner = self
            .inner
            .mangle(entry, new_name, signature, &substitutions)
            .map_err(value_error)?;
        Ok(PyProgram { inner })
    }

    fn update_callsites(&self, old: &str, new: &str, mapping: Vec<usize>) -> PyResult<PyProgram> {
        let inner = self
            .inner
            .update_callsites(old, new, &mapping)
            .map_err(value_error)?;
        Ok(PyProgram { inner })
    }

    fn with_external(&self, name: &str, external: bool) -> PyResult<PyProgram> {
        let inner = self
            .inner
            .with_external(name, external)
            .map_err(value_error)?;
        Ok(PyProgram { inner })
    }

    /// 运行 `entry(*arguments, halt_on)`，返回停机时的整数实参
    ///
    /// `halt_on` 的闭包作为最后一个实参追加。
    #[pyo3(signature = (entry, arguments, halt_on, step_limit = None))]
    fn run(
        &self,
        entry: &str,
        arguments: Vec<i64>,
        halt_on: &str,
        step_limit: Option<usize>,
    ) -> PyResult<Vec<i64>> {
        let mut interpreter = Interpreter::new(&self.inner).halt_on(halt_on);
        if let Some(limit) = step_limit {
            interpreter = interpreter.with_step_limit(limit);
        }
        let mut values: Vec<Value> = arguments.into_iter().map(Value::int).collect();
        values.push(interpreter.closure(halt_on).map_err(value_error)?);

        let halt = interpreter.run(entry, values).map_err(value_error)?;
        halt.arguments
            .iter()
            .map(|value| {
                value
                    .as_int()
                    .ok_or_else(|| PyValueError::new_err(format!("non-integer result {value}")))
            })
            .collect()
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }

    fn __repr__(&self) -> String {
        format!(
            "<Program continuations={} nodes={}>",
            self.inner.labels().len(),
            self.inner.arena().len()
        )
    }
}

/// Python 模块定义
#[pymodule]
fn thorin_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyBuilder>()?;
    m.add_class::<PyProgram>()?;
    Ok(())
}
