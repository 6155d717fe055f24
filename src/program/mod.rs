//! Thorin IR 数据模型
//!
//! - `nodes`: 节点类型与原始运算
//! - `values`: 类型与字面量
//! - `arena`: 去重的节点存储
//! - `labels`: Program / Continuation

pub mod arena;
pub mod labels;
pub mod nodes;
pub mod values;

pub use arena::NodeArena;
pub use labels::{Attributes, Continuation, NodeDisplay, Program};
pub use nodes::{IntrinsicOp, Name, NodeData, NodeId, PrimOp};
pub use values::{FnType, Literal, Type};
