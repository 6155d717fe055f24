//! 图遍历
//!
//! 节点图可能有环（递归 continuation 经由名字引用自身），
//! 所有遍历都带 visited 集合，并使用显式栈（避免栈溢出）。
//!
//! 边规则：
//! - `Continuation` → body，然后是每个参数
//! - `Call` → callee，然后是每个实参
//! - `Intrinsic` → 每个实参
//! - `PrimOp` → 每个操作数
//! - `Abstraction(name)` → 解析得到的 Continuation
//! - `Parameter(name, i)` → 解析得到的第 i 个参数（即自身，只做校验）
//! - `Cast` → source
//! - `Quote` → 无

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;

use crate::error::IrError;
use crate::program::{NodeData, NodeId, Program};

/// 节点的直接后继
///
/// 名字引用在此解析，未定义的名字、越界参数与畸形 BRANCH 立即报错。
pub fn successors(program: &Program, id: NodeId) -> Result<Vec<NodeId>, IrError> {
    let successors = match program.node(id) {
        NodeData::Continuation { name, body, .. } => {
            let continuation = program.resolve(name)?;
            let mut successors = Vec::with_capacity(continuation.parameters.len() + 1);
            successors.push(*body);
            successors.extend_from_slice(&continuation.parameters);
            successors
        }
        NodeData::Intrinsic { op, arguments } => {
            if arguments.len() != op.arity() {
                return Err(IrError::MalformedBranch(arguments.len()));
            }
            arguments.clone()
        }
        NodeData::Abstraction { target } => vec![program.resolve(target)?.node],
        NodeData::Parameter { target, index } => {
            program.parameter(target, *index)?;
            Vec::new()
        }
        node => node.children(),
    };
    Ok(successors)
}

/// 从 `start` 深度优先遍历子图（前序）
///
/// 已在 `visited` 中的节点直接跳过，因此每个节点最多访问一次。
///
/// Args:
///     start: 起点
///     visited: 跨多次调用共享的已访问集合
///     visitor: 每个新节点调用一次
pub fn visit_subgraph<F>(
    program: &Program,
    start: NodeId,
    visited: &mut HashSet<NodeId>,
    mut visitor: F,
) -> Result<(), IrError>
where
    F: FnMut(NodeId, &NodeData),
{
    let mut stack = vec![start];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let successors = successors(program, id)?;
        visitor(id, program.node(id));
        // 逆序入栈，保证按边的顺序出栈
        stack.extend(successors.into_iter().rev());
    }

    Ok(())
}

/// 从每个 continuation 出发遍历整个程序，共享一个 visited 集合
pub fn visit_graph<F>(program: &Program, mut visitor: F) -> Result<(), IrError>
where
    F: FnMut(NodeId, &NodeData),
{
    let mut visited = HashSet::new();
    for continuation in program.continuations() {
        visit_subgraph(program, continuation.node, &mut visited, &mut visitor)?;
    }
    Ok(())
}

/// 从 `roots` 可达的全部节点，按首次访问顺序
pub fn reachable(
    program: &Program,
    roots: impl IntoIterator<Item = NodeId>,
) -> Result<IndexSet<NodeId>, IrError> {
    let mut visited = HashSet::new();
    let mut order = IndexSet::new();
    for root in roots {
        visit_subgraph(program, root, &mut visited, |id, _| {
            order.insert(id);
        })?;
    }
    Ok(order)
}

/// 反向边索引：节点 → 直接引用它的节点
///
/// Program 不可变，因此从不增量维护；程序变化后重新构建。
#[derive(Debug, Clone, Default)]
pub struct Uses {
    users: HashMap<NodeId, IndexSet<NodeId>>,
}

impl Uses {
    pub fn build(program: &Program) -> Result<Self, IrError> {
        let mut nodes = Vec::new();
        visit_graph(program, |id, _| nodes.push(id))?;

        let mut users: HashMap<NodeId, IndexSet<NodeId>> = HashMap::with_capacity(nodes.len());
        for user in nodes {
            for used in successors(program, user)? {
                users.entry(used).or_default().insert(user);
            }
        }

        Ok(Uses { users })
    }

    /// 直接引用 `id` 的节点（无则为空）
    pub fn of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.users.get(&id).into_iter().flatten().copied()
    }

    pub fn contains(&self, id: NodeId, user: NodeId) -> bool {
        self.users.get(&id).is_some_and(|users| users.contains(&user))
    }

    /// 有使用者的节点数
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Program {
    pub fn uses(&self) -> Result<Uses, IrError> {
        Uses::build(self)
    }

    /// 检查所有名字引用都可解析、BRANCH 元数正确
    pub fn validate(&self) -> Result<(), IrError> {
        visit_graph(self, |_, _| {})
    }
}
