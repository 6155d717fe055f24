//! Thorin Node Arena
//!
//! 存储所有 IR 节点的中央仓库，按结构去重（hash-consing）。
//! 调用方只持有轻量级 Handle（`NodeId`），所有数据都在 Arena 中。

use indexmap::IndexSet;

use super::nodes::{NodeData, NodeId};

/// Node Arena - 去重的节点存储
///
/// 这是 Handle-based 架构的核心：
/// - `NodeId` 是插入顺序下标，从不失效
/// - 插入结构相等的节点返回已有句柄，因此结构相等 ⇔ 句柄相等
/// - 子节点以句柄存储，哈希和比较都是浅层的（O(子节点数)）
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    nodes: IndexSet<NodeData>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        NodeArena {
            nodes: IndexSet::with_capacity(capacity),
        }
    }

    /// 插入节点（已存在则复用）
    ///
    /// Returns:
    ///     NodeId: 节点句柄
    pub fn intern(&mut self, data: NodeData) -> NodeId {
        let (index, _) = self.nodes.insert_full(data);
        index as NodeId
    }

    /// 查找结构相等的已有节点，不插入
    pub fn lookup(&self, data: &NodeData) -> Option<NodeId> {
        self.nodes.get_index_of(data).map(|index| index as NodeId)
    }

    /// 获取节点引用
    ///
    /// 句柄必须来自同一个 Arena。
    #[inline]
    pub fn get(&self, id: NodeId) -> &NodeData {
        &self.nodes[id as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodeData)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, data)| (index as NodeId, data))
    }
}
