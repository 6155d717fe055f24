//! 特化（mangling）
//!
//! - `mangle`：克隆 `scope(entry)` 中的 continuation，并在克隆与新入口中
//!   应用替换表，得到签名更窄的新 continuation
//! - `update_callsites`：把对旧 continuation 的调用改写为对新 continuation 的调用
//!
//! 原 entry 不会被删除；需要死代码消除时，先取消其 external 标记再运行化简。

use std::collections::{HashMap, HashSet};

use crate::error::IrError;
use crate::program::{Attributes, FnType, Name, NodeData, NodeId, Program};
use crate::visit::visit_graph;

/// 替换表：旧句柄 → 新句柄（同一 Program 内）
pub type Substitutions = HashMap<NodeId, NodeId>;

/// 在表达式树上应用替换表
///
/// 命中替换表的节点整体替换；否则递归重建其子节点。
/// 叶子（Abstraction / Parameter / Quote）除非直接命中，否则原样返回。
/// 重建经由 hash-consing：子节点都未变化时得到的就是原句柄。
pub struct Substituter<'s> {
    substitutions: &'s Substitutions,
    cache: HashMap<NodeId, NodeId>,
}

impl<'s> Substituter<'s> {
    pub fn new(substitutions: &'s Substitutions) -> Self {
        Substituter {
            substitutions,
            cache: HashMap::new(),
        }
    }

    pub fn apply(&mut self, program: &mut Program, id: NodeId) -> NodeId {
        if let Some(&replacement) = self.substitutions.get(&id) {
            return replacement;
        }
        if let Some(&cached) = self.cache.get(&id) {
            return cached;
        }

        let rebuilt = match program.node(id).clone() {
            NodeData::Call { callee, arguments } => {
                let callee = self.apply(program, callee);
                let arguments = self.apply_all(program, &arguments);
                program.intern(NodeData::Call { callee, arguments })
            }
            NodeData::Intrinsic { op, arguments } => {
                let arguments = self.apply_all(program, &arguments);
                program.intern(NodeData::Intrinsic { op, arguments })
            }
            NodeData::PrimOp { op, operands } => {
                let operands = self.apply_all(program, &operands);
                program.intern(NodeData::PrimOp { op, operands })
            }
            NodeData::Cast { source, dst } => {
                let source = self.apply(program, source);
                program.intern(NodeData::Cast { source, dst })
            }
            NodeData::Continuation { .. }
            | NodeData::Abstraction { .. }
            | NodeData::Parameter { .. }
            | NodeData::Quote(_) => id,
        };

        self.cache.insert(id, rebuilt);
        rebuilt
    }

    fn apply_all(&mut self, program: &mut Program, ids: &[NodeId]) -> Vec<NodeId> {
        ids.iter().map(|id| self.apply(program, *id)).collect()
    }
}

/// 特化 `entry`
///
/// Args:
///     entry: 被特化的 continuation
///     new_name: 新入口的名字（不能已存在）
///     new_signature: 新入口的签名
///     substitutions: 用户给定的替换（通常把 entry 的参数映射为字面量、
///         外层参数或新入口的参数）
///
/// Returns:
///     Program: 追加了新入口与 scope 克隆的新程序
pub fn mangle(
    program: &Program,
    entry: &str,
    new_name: &str,
    new_signature: FnType,
    substitutions: &Substitutions,
) -> Result<Program, IrError> {
    let scope = program.scope(entry)?;
    let entry = program.resolve(entry)?;
    if program.contains(new_name) {
        return Err(IrError::DuplicateLabel(Name::from(new_name)));
    }

    let mut mangled = program.clone();
    let mut substitutions = substitutions.clone();

    // scope 内的 continuation 各取一个新名字，内部引用一并改名
    let mut reserved: HashSet<Name> = HashSet::new();
    reserved.insert(Name::from(new_name));
    let mut clones = Vec::with_capacity(scope.continuations.len());
    for name in &scope.continuations {
        let original = program.resolve(name)?;
        let fresh = mangled.fresh_name(name, &reserved);
        reserved.insert(fresh.clone());

        let abstraction = mangled.intern(NodeData::Abstraction {
            target: fresh.clone(),
        });
        substitutions.entry(original.abstraction).or_insert(abstraction);
        for (index, parameter) in original.parameters.iter().enumerate() {
            let renamed = mangled.intern(NodeData::Parameter {
                target: fresh.clone(),
                index,
            });
            substitutions.entry(*parameter).or_insert(renamed);
        }
        clones.push((original, fresh));
    }

    let mut substituter = Substituter::new(&substitutions);

    let body = substituter.apply(&mut mangled, entry.body);
    mangled.define(
        Name::from(new_name),
        new_signature,
        body,
        Attributes::default(),
    )?;

    for (original, fresh) in clones {
        let body = substituter.apply(&mut mangled, original.body);
        mangled.define(
            fresh,
            original.signature.clone(),
            body,
            Attributes::default(),
        )?;
    }

    log::debug!(
        "mangle({}) -> {}: cloned {} continuations",
        entry.name,
        new_name,
        scope.continuations.len()
    );

    Ok(mangled)
}

/// 把所有 `old(args…)` 改写为 `new(args[mapping[0]], args[mapping[1]], …)`
///
/// 其余节点结构不变。
pub fn update_callsites(
    program: &Program,
    old: &str,
    new: &str,
    mapping: &[usize],
) -> Result<Program, IrError> {
    let old = program.resolve(old)?;
    let new = program.resolve(new)?;
    if let Some(&index) = mapping.iter().find(|&&index| index >= old.arity()) {
        return Err(IrError::ArgumentMapping {
            index,
            arity: old.arity(),
        });
    }

    let mut callsites = Vec::new();
    visit_graph(program, |id, node| {
        if let NodeData::Call { callee, arguments } = node {
            if *callee == old.abstraction {
                callsites.push((id, arguments.clone()));
            }
        }
    })?;

    let mut updated = program.clone();
    let mut substitutions = Substitutions::with_capacity(callsites.len());
    for (id, arguments) in &callsites {
        let arguments = mapping
            .iter()
            .map(|&index| {
                arguments
                    .get(index)
                    .copied()
                    .ok_or(IrError::ArgumentMapping {
                        index,
                        arity: arguments.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let call = updated.intern(NodeData::Call {
            callee: new.abstraction,
            arguments,
        });
        substitutions.insert(*id, call);
    }

    let bodies: Vec<(Name, NodeId)> = program
        .continuations()
        .map(|c| (c.name.clone(), c.body))
        .collect();
    let mut substituter = Substituter::new(&substitutions);
    let mut rewritten = 0usize;
    for (name, body) in bodies {
        let new_body = substituter.apply(&mut updated, body);
        if new_body != body {
            updated.redefine(&name, new_body)?;
            rewritten += 1;
        }
    }

    log::debug!(
        "update_callsites({} -> {}): {} call sites in {} continuations",
        old.name,
        new.name,
        callsites.len(),
        rewritten
    );

    Ok(updated)
}

impl Program {
    pub fn mangle(
        &self,
        entry: &str,
        new_name: &str,
        new_signature: FnType,
        substitutions: &Substitutions,
    ) -> Result<Program, IrError> {
        mangle(self, entry, new_name, new_signature, substitutions)
    }

    pub fn update_callsites(
        &self,
        old: &str,
        new: &str,
        mapping: &[usize],
    ) -> Result<Program, IrError> {
        update_callsites(self, old, new, mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::program::{Literal, Type};

    #[test]
    fn test_substitute_shares_unchanged_nodes() {
        let mut program = fixtures::factorial().unwrap();
        let body = program.resolve("body").unwrap().body;

        let empty = Substitutions::new();
        let mut substituter = Substituter::new(&empty);
        assert_eq!(substituter.apply(&mut program, body), body);
    }

    #[test]
    fn test_substitute_rebuilds_ancestors() {
        let mut program = fixtures::factorial().unwrap();
        let head = program.resolve("head").unwrap().clone();
        let seven = program.intern(NodeData::Quote(Literal::Int(7)));

        let mut substitutions = Substitutions::new();
        substitutions.insert(head.parameters[0], seven);
        let mut substituter = Substituter::new(&substitutions);
        let body = program.resolve("body").unwrap().body;
        let new_body = substituter.apply(&mut program, body);

        assert_ne!(new_body, body);
        let text = program.display_node(new_body).to_string();
        assert_eq!(text, "head((7 + 1), (7 * head.args[1]))");
    }

    #[test]
    fn test_mangle_clones_scope() {
        let program = fixtures::factorial().unwrap();
        let head = program.resolve("head").unwrap();
        let fac = program.resolve("fac").unwrap();

        // head 的 i 固定为 1，r 变为新入口的唯一参数
        let mut program = program.clone();
        let one = program.intern(NodeData::Quote(Literal::Int(1)));
        let r = program.intern(NodeData::Parameter {
            target: Name::from("head_r"),
            index: 0,
        });
        let substitutions: Substitutions =
            [(head.parameters[0], one), (head.parameters[1], r)].into();

        let mangled = program
            .mangle("head", "head_r", FnType::new([Type::Int]), &substitutions)
            .unwrap();

        assert!(mangled.contains("head"));
        assert!(mangled.contains("head_r"));
        assert!(mangled.contains("body_1"));
        assert!(mangled.contains("next_1"));
        assert!(!mangled.contains("fac_1"));
        assert_eq!(mangled.labels().len(), 9);

        // 新入口跳到克隆出来的 body_1 / next_1
        let entry = mangled.resolve("head_r").unwrap();
        assert_eq!(
            mangled.display_node(entry.body).to_string(),
            "BRANCH((1 <= fac.args[0]), body_1, next_1)"
        );
        // 克隆体内的参数引用也被替换
        let next = mangled.resolve("next_1").unwrap();
        assert_eq!(
            mangled.display_node(next.body).to_string(),
            "fac.args[1](head_r.args[0])"
        );
        // scope 外的 continuation 原样保留
        assert_eq!(mangled.resolve("fac").unwrap().body, fac.body);
        mangled.validate().unwrap();
    }

    #[test]
    fn test_mangle_rejects_existing_name() {
        let program = fixtures::factorial().unwrap();
        let result = program.mangle("head", "body", FnType::default(), &Substitutions::new());
        assert_eq!(result.err(), Some(IrError::DuplicateLabel(Name::from("body"))));
    }

    #[test]
    fn test_update_callsites() {
        let program = fixtures::factorial().unwrap();
        let head = program.resolve("head").unwrap();

        let mut program = program.clone();
        let r = program.intern(NodeData::Parameter {
            target: Name::from("head_r"),
            index: 0,
        });
        let one = program.intern(NodeData::Quote(Literal::Int(1)));
        let substitutions: Substitutions =
            [(head.parameters[0], one), (head.parameters[1], r)].into();
        let mangled = program
            .mangle("head", "head_r", FnType::new([Type::Int]), &substitutions)
            .unwrap();

        // 只保留第二个实参
        let updated = mangled.update_callsites("head", "head_r", &[1]).unwrap();
        let els = updated.resolve("else").unwrap();
        assert_eq!(updated.display_node(els.body).to_string(), "head_r(1)");
        let body = updated.resolve("body").unwrap();
        assert_eq!(
            updated.display_node(body.body).to_string(),
            "head_r((head.args[0] * head.args[1]))"
        );
        updated.validate().unwrap();
    }

    #[test]
    fn test_update_callsites_mapping_out_of_range() {
        let program = fixtures::factorial().unwrap();
        let result = program.update_callsites("head", "next", &[2]);
        assert_eq!(
            result.err(),
            Some(IrError::ArgumentMapping { index: 2, arity: 2 })
        );
    }
}
