//! Scope 分析
//!
//! `scope(entry)`：从 entry 的参数出发，沿 *uses*（而非 defs）反复扩展
//! 得到的节点集合。数据只能经由参数流入一个局部子图，
//! 因此这些节点无法被 entry 之外的调用点观察到，特化时可以安全克隆。
//! 某个 continuation 进入 scope 时，它的参数也随之进入，
//! 因此读取嵌套循环参数的 continuation 同样属于外层 scope。
//! 到达 entry 本身时该分支终止，entry 不在结果中。

use std::collections::{HashMap, VecDeque};

use indexmap::IndexSet;

use crate::error::IrError;
use crate::program::{Name, NodeData, NodeId, Program};
use crate::visit::Uses;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub entry: Name,
    /// scope 内的全部节点（按发现顺序）
    pub nodes: IndexSet<NodeId>,
    /// scope 内的 continuation 名字（不含 entry）
    pub continuations: IndexSet<Name>,
}

impl Scope {
    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    #[inline]
    pub fn contains_continuation(&self, name: &str) -> bool {
        self.continuations.contains(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// 针对一个 Program 的 scope 查询
///
/// 反向边索引只构建一次，结果按 entry 缓存。
pub struct ScopeAnalysis<'p> {
    program: &'p Program,
    uses: Uses,
    cache: HashMap<Name, Scope>,
}

impl<'p> ScopeAnalysis<'p> {
    pub fn new(program: &'p Program) -> Result<Self, IrError> {
        Ok(ScopeAnalysis {
            program,
            uses: Uses::build(program)?,
            cache: HashMap::new(),
        })
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn uses(&self) -> &Uses {
        &self.uses
    }

    /// 计算（或取缓存的）`entry` 的 scope
    pub fn scope(&mut self, entry: &str) -> Result<&Scope, IrError> {
        let continuation = self.program.resolve(entry)?;
        let name = continuation.name.clone();
        if !self.cache.contains_key(&name) {
            let scope = compute(self.program, &self.uses, &name)?;
            log::trace!("scope({}) = {:?}", name, scope.continuations);
            self.cache.insert(name.clone(), scope);
        }
        Ok(&self.cache[&name])
    }
}

fn compute(program: &Program, uses: &Uses, entry: &Name) -> Result<Scope, IrError> {
    let continuation = program.resolve(entry)?;
    let entry_node = continuation.node;

    let mut nodes: IndexSet<NodeId> = continuation.parameters.iter().copied().collect();
    let mut queue: VecDeque<NodeId> = continuation.parameters.iter().copied().collect();

    while let Some(id) = queue.pop_front() {
        if id == entry_node {
            continue;
        }
        let mut found: Vec<NodeId> = uses.of(id).collect();
        // 进入 scope 的 continuation 连同其参数一起
        if let NodeData::Continuation { name, .. } = program.node(id) {
            found.extend_from_slice(&program.resolve(name)?.parameters);
        }
        for next in found {
            if nodes.insert(next) {
                queue.push_back(next);
            }
        }
    }
    nodes.shift_remove(&entry_node);

    let continuations = nodes
        .iter()
        .filter_map(|id| match program.node(*id) {
            NodeData::Continuation { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect();

    Ok(Scope {
        entry: entry.clone(),
        nodes,
        continuations,
    })
}

/// 单次 scope 查询
pub fn scope(program: &Program, entry: &str) -> Result<Scope, IrError> {
    let uses = Uses::build(program)?;
    let name = program.resolve(entry)?.name.clone();
    compute(program, &uses, &name)
}

impl Program {
    pub fn scope(&self, entry: &str) -> Result<Scope, IrError> {
        scope(self, entry)
    }
}
