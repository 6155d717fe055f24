//! Graphviz 导出
//!
//! - `program_to_dot`：从 external 根出发画出节点图
//! - `call_graph_to_dot`：调用图，回边用虚线，边标签为阶

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::{self, Write};

use thiserror::Error;

use crate::callgraph::CallGraph;
use crate::error::IrError;
use crate::program::{NodeData, NodeId, Program};

#[derive(Debug, Error)]
pub enum DotError {
    #[error(transparent)]
    Ir(#[from] IrError),
    #[error("failed to write dot output")]
    Fmt(#[from] fmt::Error),
}

/// 转义 DOT 双引号字符串中的 `"` 与 `\`
fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['"', '\\']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        if matches!(c, '"' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

struct Appearance {
    shape: &'static str,
    color: &'static str,
    style: &'static str,
}

impl Appearance {
    const fn new(shape: &'static str, color: &'static str, style: &'static str) -> Self {
        Appearance {
            shape,
            color,
            style,
        }
    }
}

#[derive(Clone, Copy)]
enum Arrow {
    DataDependency,
    ControlFlow,
    ContinuationBody,
    ParameterOf,
    ArgumentOf,
}

impl Arrow {
    fn head(self) -> &'static str {
        match self {
            Arrow::DataDependency => "vee",
            Arrow::ControlFlow => "normal",
            Arrow::ContinuationBody | Arrow::ParameterOf => "none",
            Arrow::ArgumentOf => "empty",
        }
    }
}

/// 节点图写出器
pub struct ProgramDot<'p, W: Write> {
    program: &'p Program,
    done: HashSet<NodeId>,
    pub writer: W,
}

impl<'p, W: Write> ProgramDot<'p, W> {
    pub fn new(program: &'p Program, writer: W) -> Self {
        ProgramDot {
            program,
            done: HashSet::new(),
            writer,
        }
    }

    /// 写出整个图；没有 external 根时从所有 label 出发
    pub fn write(mut self) -> Result<W, DotError> {
        let mut roots: Vec<NodeId> = self.program.externals().map(|c| c.node).collect();
        if roots.is_empty() {
            roots = self.program.continuations().map(|c| c.node).collect();
        }

        writeln!(self.writer, "digraph Program {{")?;
        writeln!(self.writer, "    bgcolor=transparent;")?;
        for root in roots {
            self.dump(root)?;
        }
        writeln!(self.writer, "}}")?;
        Ok(self.writer)
    }

    fn dump(&mut self, root: NodeId) -> Result<(), DotError> {
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            if !self.done.insert(id) {
                continue;
            }
            let program = self.program;
            let node = program.node(id);
            self.node(id, node)?;

            match node {
                NodeData::Continuation { name, body, .. } => {
                    let continuation = program.resolve(name)?;
                    self.arrow(id, *body, Arrow::ContinuationBody, None)?;
                    stack.push(*body);
                    stack.extend(continuation.parameters.iter().rev());
                }
                NodeData::Call { callee, arguments } => {
                    self.arrow(id, *callee, Arrow::ControlFlow, None)?;
                    for (i, argument) in arguments.iter().enumerate() {
                        self.arrow(*argument, id, Arrow::ArgumentOf, Some(format!("arg{i}")))?;
                    }
                    stack.extend(arguments.iter().rev());
                    stack.push(*callee);
                }
                NodeData::Intrinsic { arguments, .. } => {
                    for (i, argument) in arguments.iter().enumerate() {
                        self.arrow(*argument, id, Arrow::ArgumentOf, Some(format!("arg{i}")))?;
                    }
                    stack.extend(arguments.iter().rev());
                }
                NodeData::PrimOp { operands, .. } => {
                    for (i, operand) in operands.iter().enumerate() {
                        self.arrow(id, *operand, Arrow::DataDependency, Some(format!("op{i}")))?;
                    }
                    stack.extend(operands.iter().rev());
                }
                NodeData::Abstraction { target } => {
                    let resolved = program.resolve(target)?.node;
                    self.arrow(id, resolved, Arrow::DataDependency, None)?;
                    stack.push(resolved);
                }
                NodeData::Parameter { target, index } => {
                    program.parameter(target, *index)?;
                    let resolved = program.resolve(target)?.node;
                    self.arrow(id, resolved, Arrow::ParameterOf, None)?;
                    stack.push(resolved);
                }
                NodeData::Cast { source, .. } => {
                    self.arrow(id, *source, Arrow::DataDependency, None)?;
                    stack.push(*source);
                }
                NodeData::Quote(_) => {}
            }
        }

        Ok(())
    }

    fn node(&mut self, id: NodeId, node: &NodeData) -> fmt::Result {
        let label = match node {
            NodeData::Continuation {
                name, signature, ..
            } => format!("{name} : {signature}"),
            NodeData::Call { .. } => "Call()".to_string(),
            NodeData::Intrinsic { op, .. } => op.to_string(),
            NodeData::PrimOp { op, .. } => op.symbol().to_string(),
            NodeData::Abstraction { target } => format!("&{target}"),
            NodeData::Parameter { index, .. } => format!("param{index}"),
            NodeData::Quote(literal) => format!("{literal} : {}", literal.ty()),
            NodeData::Cast { dst, .. } => format!("cast({dst})"),
        };
        let appearance = self.appearance(node);
        writeln!(
            self.writer,
            "    n{id} [label=\"{}\", shape={}, color={}, style={}];",
            escape(&label),
            appearance.shape,
            appearance.color,
            appearance.style
        )
    }

    fn appearance(&self, node: &NodeData) -> Appearance {
        match node {
            NodeData::Continuation { name, .. } => {
                let external = self.program.get(name).is_some_and(|c| c.is_external());
                if external {
                    Appearance::new("rectangle", "pink", "filled")
                } else {
                    Appearance::new("rectangle", "black", "solid")
                }
            }
            NodeData::Parameter { .. } => Appearance::new("ellipse", "lightgrey", "solid"),
            NodeData::Intrinsic { .. } => Appearance::new("rectangle", "lightblue", "filled"),
            NodeData::Call { .. } => Appearance::new("rectangle", "orange", "filled"),
            NodeData::Abstraction { .. } => Appearance::new("ellipse", "orange", "solid"),
            NodeData::Cast { .. } | NodeData::PrimOp { .. } => {
                Appearance::new("ellipse", "darkseagreen1", "filled")
            }
            NodeData::Quote(_) => Appearance::new("ellipse", "black", "dotted"),
        }
    }

    fn arrow(&mut self, src: NodeId, dst: NodeId, arrow: Arrow, label: Option<String>) -> fmt::Result {
        write!(self.writer, "    n{src} -> n{dst} [arrowhead={}", arrow.head())?;
        if let Some(label) = label {
            write!(self.writer, ", label=\"{label}\"")?;
        }
        writeln!(self.writer, ", fontsize=8, fontcolor=grey];")
    }
}

/// 节点图的 DOT 文本
pub fn program_to_dot(program: &Program) -> Result<String, DotError> {
    ProgramDot::new(program, String::new()).write()
}

/// 调用图的 DOT 文本
pub fn call_graph_to_dot(graph: &CallGraph) -> Result<String, DotError> {
    let mut out = String::new();
    writeln!(out, "digraph CallGraph {{")?;
    writeln!(out, "    bgcolor=transparent;")?;

    for node in graph.nodes() {
        let name = escape(&node.name);
        let (color, style) = if node.is_external {
            ("pink", "filled")
        } else {
            ("black", "solid")
        };
        writeln!(
            out,
            "    \"{name}\" [label=\"{name} : {}\", shape=rectangle, color={color}, style={style}];",
            node.signature
        )?;
    }
    for node in graph.nodes() {
        for (callee, call) in graph.calls(&node.name) {
            let style = if call.is_simple { "dashed" } else { "solid" };
            writeln!(
                out,
                "    \"{}\" -> \"{}\" [label=\"{}\", style={style}, fontsize=8, fontcolor=grey];",
                escape(&node.name),
                escape(callee),
                call.order
            )?;
        }
    }

    writeln!(out, "}}")?;
    Ok(out)
}

impl Program {
    pub fn to_dot(&self) -> Result<String, DotError> {
        program_to_dot(self)
    }
}
