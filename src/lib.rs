//! Thorin 风格的 CPS 中间表示
//!
//! 程序是一组具名 continuation，所有表达式节点在 arena 中 hash-consing，
//! 节点之间用 NodeId（u32）互相引用。在此之上提供：
//!
//! - `visit`：显式栈遍历与反向边（uses）索引
//! - `scope`：沿参数的使用者扩展出的局部子图
//! - `callgraph`：continuation 之间的调用图（petgraph）
//! - `mangle`：按替换表克隆 scope 实现特化，并改写调用点
//! - `simplify`：常量折叠、分支消解、死 continuation 消除
//! - `interp` / `typeck` / `dot`：解释执行、类型检查与 Graphviz 导出

pub mod builder;
pub mod callgraph;
pub mod dot;
pub mod error;
pub mod interp;
pub mod mangle;
pub mod program;
pub mod scope;
pub mod simplify;
pub mod typeck;
pub mod visit;

#[cfg(feature = "python")]
mod python;

#[doc(hidden)]
pub mod fixtures;

pub use builder::ProgramBuilder;
pub use callgraph::CallGraph;
pub use error::{EvalError, IrError, TypeError};
pub use interp::{Interpreter, Value};
pub use program::{FnType, Literal, Name, NodeData, NodeId, PrimOp, Program, Type};
pub use scope::Scope;
pub use simplify::{SimplifyStats, Simplifier};
