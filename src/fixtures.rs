//! 测试用程序
//!
//! 单元测试与 `tests/` 下的集成测试共用同一份定义。

use std::collections::HashSet;

use crate::builder::ProgramBuilder;
use crate::error::IrError;
use crate::program::{FnType, NodeId, Program, Type};
use crate::visit;

/// 迭代阶乘（`fac` 为 external）
///
/// ```text
/// fac  : fn(int, fn(int)) = BRANCH((n <= 0), then, else)
/// then : fn()             = ret(1)
/// else : fn()             = head(2, 1)
/// head : fn(int, int)     = BRANCH((i <= n), body, next)
/// body : fn()             = head((i + 1), (i * r))
/// next : fn()             = ret(r)
/// ```
pub fn factorial() -> Result<Program, IrError> {
    Ok(factorial_builder()?.finish())
}

/// 阶乘加上一个返回 continuation `ret : fn(int)`，供解释器停机
pub fn factorial_with_return() -> Result<Program, IrError> {
    with_return(factorial_builder()?)
}

fn factorial_builder() -> Result<ProgramBuilder, IrError> {
    let mut b = ProgramBuilder::new();
    let n = b.param("fac", 0);
    let ret = b.param("fac", 1);

    let zero = b.int(0);
    let cond = b.infeq(n, zero);
    let then = b.fn_ref("then");
    let els = b.fn_ref("else");
    let body = b.branch(cond, then, els);
    b.define_external("fac", "fn(int, fn(int))".parse()?, body)?;

    let one = b.int(1);
    let body = b.call(ret, [one]);
    b.define("then", FnType::default(), body)?;

    let head = b.fn_ref("head");
    let two = b.int(2);
    let body = b.call(head, [two, one]);
    b.define("else", FnType::default(), body)?;

    let i = b.param("head", 0);
    let r = b.param("head", 1);
    let cond = b.infeq(i, n);
    let loop_body = b.fn_ref("body");
    let next = b.fn_ref("next");
    let body = b.branch(cond, loop_body, next);
    b.define("head", "fn(int, int)".parse()?, body)?;

    let i_next = b.add(i, one);
    let r_next = b.mul(i, r);
    let body = b.call(head, [i_next, r_next]);
    b.define("body", FnType::default(), body)?;

    let body = b.call(ret, [r]);
    b.define("next", FnType::default(), body)?;

    Ok(b)
}

/// 尾递归阶乘：循环由辅助函数 `help` 承担
///
/// ```text
/// fac   : fn(int, fn(int))               = BRANCH((n <= 1), then, else)
/// then  : fn()                           = ret(1)
/// else  : fn()                           = help(1, 1, n, ret)
/// help  : fn(int, int, int, fn(int))     = BRANCH((i <= h_n), then2, else2)
/// then2 : fn()                           = help((i + 1), (i * r), h_n, h_ret)
/// else2 : fn()                           = h_ret(r)
/// ```
pub fn factorial_tailrec() -> Result<Program, IrError> {
    Ok(factorial_tailrec_builder()?.finish())
}

pub fn factorial_tailrec_with_return() -> Result<Program, IrError> {
    with_return(factorial_tailrec_builder()?)
}

fn factorial_tailrec_builder() -> Result<ProgramBuilder, IrError> {
    let mut b = ProgramBuilder::new();
    let n = b.param("fac", 0);
    let f_ret = b.param("fac", 1);
    let one = b.int(1);

    let cond = b.infeq(n, one);
    let then = b.fn_ref("then");
    let els = b.fn_ref("else");
    let body = b.branch(cond, then, els);
    b.define_external("fac", "fn(int, fn(int))".parse()?, body)?;

    let body = b.call(f_ret, [one]);
    b.define("then", FnType::default(), body)?;

    let help = b.fn_ref("help");
    let body = b.call(help, [one, one, n, f_ret]);
    b.define("else", FnType::default(), body)?;

    let i = b.param("help", 0);
    let r = b.param("help", 1);
    let h_n = b.param("help", 2);
    let h_ret = b.param("help", 3);
    let cond = b.infeq(i, h_n);
    let then2 = b.fn_ref("then2");
    let else2 = b.fn_ref("else2");
    let body = b.branch(cond, then2, else2);
    b.define("help", "fn(int, int, int, fn(int))".parse()?, body)?;

    let i_next = b.add(i, one);
    let r_next = b.mul(i, r);
    let body = b.call(help, [i_next, r_next, h_n, h_ret]);
    b.define("then2", FnType::default(), body)?;

    let body = b.call(h_ret, [r]);
    b.define("else2", FnType::default(), body)?;

    Ok(b)
}

/// 幂运算，被 `f` 以固定指数 3 调用两次
///
/// ```text
/// f     : fn(int, int, fn(int)) = BRANCH((x < y), calcx, calcy)
/// pow   : fn(int, int)          = BRANCH((b == 0), then, else)
/// then  : fn()                  = ret(1)
/// else  : fn()                  = head(1, a)
/// head  : fn(int, int)          = BRANCH((i < b), body, next)
/// body  : fn()                  = head((i + 1), (r * a))
/// next  : fn()                  = ret(r)
/// calcx : fn()                  = pow(x, 3)
/// calcy : fn()                  = pow(y, 3)
/// ```
pub fn pow() -> Result<Program, IrError> {
    Ok(pow_builder()?.finish())
}

pub fn pow_with_return() -> Result<Program, IrError> {
    with_return(pow_builder()?)
}

fn pow_builder() -> Result<ProgramBuilder, IrError> {
    let mut b = ProgramBuilder::new();
    let x = b.param("f", 0);
    let y = b.param("f", 1);
    let ret = b.param("f", 2);

    let cond = b.inf(x, y);
    let calcx = b.fn_ref("calcx");
    let calcy = b.fn_ref("calcy");
    let body = b.branch(cond, calcx, calcy);
    b.define_external("f", "fn(int, int, fn(int))".parse()?, body)?;

    let a = b.param("pow", 0);
    let exp = b.param("pow", 1);
    let zero = b.int(0);
    let cond = b.eq(exp, zero);
    let then = b.fn_ref("then");
    let els = b.fn_ref("else");
    let body = b.branch(cond, then, els);
    b.define("pow", "fn(int, int)".parse()?, body)?;

    let one = b.int(1);
    let body = b.call(ret, [one]);
    b.define("then", FnType::default(), body)?;

    let head = b.fn_ref("head");
    let body = b.call(head, [one, a]);
    b.define("else", FnType::default(), body)?;

    let i = b.param("head", 0);
    let r = b.param("head", 1);
    let cond = b.inf(i, exp);
    let loop_body = b.fn_ref("body");
    let next = b.fn_ref("next");
    let body = b.branch(cond, loop_body, next);
    b.define("head", "fn(int, int)".parse()?, body)?;

    let i_next = b.add(i, one);
    let r_next = b.mul(r, a);
    let body = b.call(head, [i_next, r_next]);
    b.define("body", FnType::default(), body)?;

    let body = b.call(ret, [r]);
    b.define("next", FnType::default(), body)?;

    let pow = b.fn_ref("pow");
    let three = b.int(3);
    let body = b.call(pow, [x, three]);
    b.define("calcx", FnType::default(), body)?;
    let body = b.call(pow, [y, three]);
    b.define("calcy", FnType::default(), body)?;

    Ok(b)
}

/// 追加 `ret : fn(int) = ret(ret.args[0])`
fn with_return(mut b: ProgramBuilder) -> Result<Program, IrError> {
    let ret = b.fn_ref("ret");
    let value = b.param("ret", 0);
    let body = b.call(ret, [value]);
    b.define("ret", FnType::new([Type::Int]), body)?;
    Ok(b.finish())
}

/// `f : fn(int, fn(int)) = f.args[1](x)`，x 由 `f.args[0]` 连续平方 `depth` 次得到
///
/// 每一层的两个操作数是同一个节点，按树展开有 2^depth 个叶子。
pub fn squaring_chain(depth: usize) -> Result<Program, IrError> {
    let mut b = ProgramBuilder::new();
    let mut x = b.param("f", 0);
    for _ in 0..depth {
        x = b.mul(x, x);
    }
    let k = b.param("f", 1);
    let body = b.call(k, [x]);
    b.define_external("f", "fn(int, fn(int))".parse()?, body)?;
    Ok(b.finish())
}

/// 不经过 `entry` 就能从外部到达的 scope 成员
///
/// 从 scope 之外的每个 continuation 出发遍历；`entry` 与它的参数预先标记为已访问，
/// 即进入 entry（绑定其参数）是唯一的通道。
pub fn scope_escapes(program: &Program, entry: &str) -> Result<Vec<NodeId>, IrError> {
    let scope = program.scope(entry)?;
    let entry = program.resolve(entry)?;

    let mut visited: HashSet<NodeId> = entry.parameters.iter().copied().collect();
    visited.insert(entry.node);

    let mut escapes = Vec::new();
    for outside in program.continuations() {
        if outside.node == entry.node || scope.contains(outside.node) {
            continue;
        }
        visit::visit_subgraph(program, outside.node, &mut visited, |id, _| {
            if scope.contains(id) {
                escapes.push(id);
            }
        })?;
    }
    Ok(escapes)
}
