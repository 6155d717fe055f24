//! Program 与 Continuation
//!
//! `Program` 是名字到 `Continuation` 的映射，拥有全部节点。
//! Program 构造后不再变化：每个变换都返回新的 Program（克隆 Arena 后追加），
//! 未被改动的句柄保持不变，因此共享得以保留。

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;

use super::arena::NodeArena;
use super::nodes::{Name, NodeData, NodeId};
use super::values::FnType;
use crate::error::IrError;

/// Continuation 属性
///
/// 不参与 continuation 的相等性比较。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Attributes {
    /// 存活根（类似导出符号），死代码消除时必须保留
    pub is_external: bool,
}

impl Attributes {
    pub fn external() -> Self {
        Attributes { is_external: true }
    }
}

/// 已注册的 continuation
///
/// `abstraction` 与 `parameters` 是派生句柄，注册时即已插入 Arena。
#[derive(Debug, Clone)]
pub struct Continuation {
    pub name: Name,
    pub signature: FnType,
    pub body: NodeId,
    /// 自身的 `NodeData::Continuation` 句柄
    pub node: NodeId,
    /// 指向自己的 `Abstraction` 句柄
    pub abstraction: NodeId,
    /// 每个参数一个 `Parameter` 句柄，下标 0..n-1
    pub parameters: Vec<NodeId>,
    pub attributes: Attributes,
}

impl Continuation {
    #[inline]
    pub fn arity(&self) -> usize {
        self.signature.arity()
    }

    pub fn parameter(&self, index: usize) -> Option<NodeId> {
        self.parameters.get(index).copied()
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.attributes.is_external
    }
}

/// Program - 名字唯一的 continuation 集合
#[derive(Debug, Clone, Default)]
pub struct Program {
    arena: NodeArena,
    labels: IndexMap<Name, Continuation>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            arena: NodeArena::new(),
            labels: IndexMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Program {
            arena: NodeArena::with_capacity(capacity),
            labels: IndexMap::new(),
        }
    }

    pub fn labels(&self) -> &IndexMap<Name, Continuation> {
        &self.labels
    }

    pub fn continuations(&self) -> impl Iterator<Item = &Continuation> + '_ {
        self.labels.values()
    }

    /// 所有标记为 external 的 continuation（存活根）
    pub fn externals(&self) -> impl Iterator<Item = &Continuation> + '_ {
        self.labels.values().filter(|c| c.is_external())
    }

    pub fn get(&self, name: &str) -> Option<&Continuation> {
        self.labels.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    /// 解析名字，未定义时报错
    pub fn resolve(&self, name: &str) -> Result<&Continuation, IrError> {
        self.labels
            .get(name)
            .ok_or_else(|| IrError::UnboundName(Name::from(name)))
    }

    /// `name` 的第 `index` 个参数句柄
    pub fn parameter(&self, name: &str, index: usize) -> Result<NodeId, IrError> {
        let continuation = self.resolve(name)?;
        continuation
            .parameter(index)
            .ok_or_else(|| IrError::ParameterOutOfRange {
                name: continuation.name.clone(),
                index,
                arity: continuation.arity(),
            })
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &NodeData {
        self.arena.get(id)
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// 向 Arena 插入一个独立节点
    ///
    /// 不改变任何 label，因此对程序语义不可见；
    /// 用于构造替换表的值（例如新 continuation 的 `Parameter`）。
    pub fn intern(&mut self, data: NodeData) -> NodeId {
        self.arena.intern(data)
    }

    /// 返回一个修改了 external 标记的新 Program
    pub fn with_external(&self, name: &str, is_external: bool) -> Result<Program, IrError> {
        let mut program = self.clone();
        program.set_external(name, is_external)?;
        Ok(program)
    }

    pub(crate) fn set_external(&mut self, name: &str, is_external: bool) -> Result<(), IrError> {
        let continuation = self
            .labels
            .get_mut(name)
            .ok_or_else(|| IrError::UnboundName(Name::from(name)))?;
        continuation.attributes.is_external = is_external;
        Ok(())
    }

    /// 生成未被占用的新名字：`<base>_<n>`
    pub fn fresh_name(&self, base: &str, reserved: &HashSet<Name>) -> Name {
        let mut n = 1usize;
        loop {
            let candidate = format!("{base}_{n}");
            if !self.labels.contains_key(candidate.as_str()) && !reserved.contains(candidate.as_str())
            {
                return Name::from(candidate);
            }
            n += 1;
        }
    }

    /// 注册新的 continuation
    ///
    /// 同时插入其 Continuation 节点、Abstraction 与全部 Parameter 节点。
    pub(crate) fn define(
        &mut self,
        name: Name,
        signature: FnType,
        body: NodeId,
        attributes: Attributes,
    ) -> Result<&Continuation, IrError> {
        if self.labels.contains_key(&name) {
            return Err(IrError::DuplicateLabel(name));
        }
        self.register(name, signature, body, attributes)
    }

    /// 替换已有 continuation 的 body，签名与属性不变
    pub(crate) fn redefine(&mut self, name: &str, body: NodeId) -> Result<&Continuation, IrError> {
        let existing = self.resolve(name)?;
        let (name, signature, attributes) = (
            existing.name.clone(),
            existing.signature.clone(),
            existing.attributes,
        );
        self.register(name, signature, body, attributes)
    }

    fn register(
        &mut self,
        name: Name,
        signature: FnType,
        body: NodeId,
        attributes: Attributes,
    ) -> Result<&Continuation, IrError> {
        if !self.arena.get(body).is_body() {
            return Err(IrError::NotABody {
                name,
                kind: self.arena.get(body).kind(),
            });
        }

        let node = self.arena.intern(NodeData::Continuation {
            name: name.clone(),
            signature: signature.clone(),
            body,
        });
        let abstraction = self.arena.intern(NodeData::Abstraction {
            target: name.clone(),
        });
        let parameters = (0..signature.arity())
            .map(|index| {
                self.arena.intern(NodeData::Parameter {
                    target: name.clone(),
                    index,
                })
            })
            .collect();

        let continuation = Continuation {
            name: name.clone(),
            signature,
            body,
            node,
            abstraction,
            parameters,
            attributes,
        };
        let (index, _) = self.labels.insert_full(name, continuation);
        Ok(&self.labels[index])
    }

    /// 以可读形式显示某个节点
    pub fn display_node(&self, id: NodeId) -> NodeDisplay<'_> {
        NodeDisplay { program: self, id }
    }
}

/// 跨 Arena 的结构相等
///
/// 同名 label 的签名、属性与 body 结构都相等。
/// 表达式内部不会成环（环只经由名字形成），因此成对遍历必然终止。
/// 共享子表达式按 `(NodeId, NodeId)` 对只比较一次，代价与节点对数成正比。
impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        let mut seen = HashSet::new();
        self.labels.len() == other.labels.len()
            && self.labels.values().all(|c| {
                other.labels.get(&c.name).is_some_and(|o| {
                    c.signature == o.signature
                        && c.attributes == o.attributes
                        && nodes_equal(self, c.body, other, o.body, &mut seen)
                })
            })
    }
}

/// Args:
///     seen: 已展开的节点对；任一对不等即整体返回 false，因此已展开的对可视为相等
fn nodes_equal(
    a: &Program,
    x: NodeId,
    b: &Program,
    y: NodeId,
    seen: &mut HashSet<(NodeId, NodeId)>,
) -> bool {
    let mut stack = vec![(x, y)];

    while let Some((x, y)) = stack.pop() {
        if !seen.insert((x, y)) {
            continue;
        }
        let (lhs, rhs) = (a.node(x), b.node(y));
        if !lhs.shallow_eq(rhs) {
            return false;
        }
        let (lhs, rhs) = (lhs.children(), rhs.children());
        if lhs.len() != rhs.len() {
            return false;
        }
        stack.extend(lhs.into_iter().zip(rhs));
    }

    true
}

pub struct NodeDisplay<'p> {
    program: &'p Program,
    id: NodeId,
}

impl NodeDisplay<'_> {
    fn child(&self, id: NodeId) -> Self {
        NodeDisplay {
            program: self.program,
            id,
        }
    }

    fn list(&self, f: &mut fmt::Formatter<'_>, ids: &[NodeId]) -> fmt::Result {
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", self.child(*id))?;
        }
        Ok(())
    }
}

impl fmt::Display for NodeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.program.node(self.id) {
            NodeData::Continuation { name, .. } => f.write_str(name),
            NodeData::Call { callee, arguments } => {
                write!(f, "{}(", self.child(*callee))?;
                self.list(f, arguments)?;
                f.write_str(")")
            }
            NodeData::Intrinsic { op, arguments } => {
                write!(f, "{op}(")?;
                self.list(f, arguments)?;
                f.write_str(")")
            }
            NodeData::PrimOp { op, operands } => match operands.as_slice() {
                [operand] => write!(f, "({}{})", op.symbol(), self.child(*operand)),
                [lhs, rhs] => write!(
                    f,
                    "({} {} {})",
                    self.child(*lhs),
                    op.symbol(),
                    self.child(*rhs)
                ),
                _ => {
                    write!(f, "{op}(")?;
                    self.list(f, operands)?;
                    f.write_str(")")
                }
            },
            NodeData::Abstraction { target } => f.write_str(target),
            NodeData::Parameter { target, index } => write!(f, "{target}.args[{index}]"),
            NodeData::Quote(literal) => write!(f, "{literal}"),
            NodeData::Cast { source, dst } => write!(f, "({} as {dst})", self.child(*source)),
        }
    }
}

/// 每个 label 一行：`name : signature = body`
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for continuation in self.labels.values() {
            if continuation.is_external() {
                f.write_str("extern ")?;
            }
            writeln!(
                f,
                "{} : {} = {}",
                continuation.name,
                continuation.signature,
                self.display_node(continuation.body)
            )?;
        }
        Ok(())
    }
}
