//! 调用图
//!
//! 每个 continuation 一个节点；body 中出现的每个不同的 `Abstraction`
//! （callee、实参，以及 PrimOp / Cast 的操作数内部）产生一条出边。
//!
//! 边属性：
//! - `order`：被调用者签名的阶
//! - `is_simple`：调用者仍在被调用者的 scope 内，即这是跳回循环头的回边，
//!   而不是对独立函数的调用

use indexmap::{IndexMap, IndexSet};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::IrError;
use crate::program::{FnType, Name, NodeData, NodeId, Program};
use crate::scope::ScopeAnalysis;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallNode {
    pub name: Name,
    pub signature: FnType,
    /// continuation 签名的阶
    pub order: u32,
    pub is_external: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub order: u32,
    pub is_simple: bool,
}

pub type Graph = DiGraph<CallNode, Call>;

#[derive(Debug, Clone)]
pub struct CallGraph {
    graph: Graph,
    index: IndexMap<Name, NodeIndex>,
}

impl CallGraph {
    pub fn build(program: &Program) -> Result<Self, IrError> {
        let mut graph = Graph::with_capacity(program.labels().len(), program.labels().len());
        let mut index = IndexMap::with_capacity(program.labels().len());

        for continuation in program.continuations() {
            let node = graph.add_node(CallNode {
                name: continuation.name.clone(),
                signature: continuation.signature.clone(),
                order: continuation.signature.order(),
                is_external: continuation.is_external(),
            });
            index.insert(continuation.name.clone(), node);
        }

        let mut analysis = ScopeAnalysis::new(program)?;

        for continuation in program.continuations() {
            let from = index[&continuation.name];
            for target in called_names(program, continuation.body)? {
                let callee = program.resolve(&target)?;
                let is_simple = analysis
                    .scope(&target)?
                    .contains_continuation(&continuation.name);

                graph.add_edge(
                    from,
                    index[&callee.name],
                    Call {
                        order: callee.signature.order(),
                        is_simple,
                    },
                );
            }
        }

        log::debug!(
            "call graph: {} continuations, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(CallGraph { graph, index })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node(&self, name: &str) -> Option<&CallNode> {
        self.index.get(name).map(|ix| &self.graph[*ix])
    }

    /// 按 Program 中 label 的顺序
    pub fn nodes(&self) -> impl Iterator<Item = &CallNode> + '_ {
        self.index.values().map(|ix| &self.graph[*ix])
    }

    /// `from → to` 的边（不存在则为 None）
    pub fn edge(&self, from: &str, to: &str) -> Option<&Call> {
        let from = *self.index.get(from)?;
        let to = *self.index.get(to)?;
        self.graph
            .find_edge(from, to)
            .map(|edge| &self.graph[edge])
    }

    /// `from` 的所有出边
    pub fn calls<'g>(&'g self, from: &str) -> impl Iterator<Item = (&'g Name, &'g Call)> + 'g {
        self.neighbours(from, Direction::Outgoing)
    }

    /// 调用 `to` 的所有边
    pub fn callers<'g>(&'g self, to: &str) -> impl Iterator<Item = (&'g Name, &'g Call)> + 'g {
        self.neighbours(to, Direction::Incoming)
    }

    fn neighbours<'g>(
        &'g self,
        name: &str,
        direction: Direction,
    ) -> impl Iterator<Item = (&'g Name, &'g Call)> + 'g {
        let mut edges: Vec<_> = self
            .index
            .get(name)
            .into_iter()
            .flat_map(|ix| self.graph.edges_directed(*ix, direction))
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (edge.id(), &self.graph[other].name, edge.weight())
            })
            .collect();
        // petgraph 按插入逆序返回边
        edges.sort_by_key(|(id, _, _)| *id);
        edges.into_iter().map(|(_, name, call)| (name, call))
    }

    /// 所有回边 `(caller, callee)`
    pub fn loop_edges(&self) -> impl Iterator<Item = (&Name, &Name)> + '_ {
        self.graph
            .edge_references()
            .filter(|edge| edge.weight().is_simple)
            .map(|edge| (&self.graph[edge.source()].name, &self.graph[edge.target()].name))
    }
}

/// body 中出现的所有不同的 continuation 引用（按出现顺序）
fn called_names(program: &Program, body: NodeId) -> Result<IndexSet<Name>, IrError> {
    let mut names = IndexSet::new();
    let mut stack = vec![body];

    while let Some(id) = stack.pop() {
        match program.node(id) {
            NodeData::Abstraction { target } => {
                program.resolve(target)?;
                names.insert(target.clone());
            }
            NodeData::Parameter { .. } | NodeData::Quote(_) | NodeData::Continuation { .. } => {}
            node => stack.extend(node.children().into_iter().rev()),
        }
    }

    Ok(names)
}

impl Program {
    pub fn call_graph(&self) -> Result<CallGraph, IrError> {
        CallGraph::build(self)
    }
}
