#![allow(dead_code)]

use thorin_rs::fixtures;
use thorin_rs::{FnType, Interpreter, Program, Value};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn sig(s: &str) -> FnType {
    s.parse().unwrap()
}

/// 返回 continuation `ret` 设为 external，化简之后仍可取它的闭包
fn keep_return(program: Program) -> Program {
    program.with_external("ret", true).unwrap()
}

pub fn factorial() -> Program {
    keep_return(fixtures::factorial_with_return().unwrap())
}

pub fn factorial_tailrec() -> Program {
    keep_return(fixtures::factorial_tailrec_with_return().unwrap())
}

pub fn pow() -> Program {
    keep_return(fixtures::pow_with_return().unwrap())
}

/// 运行 `entry(arguments..., ret)`，返回 ret 收到的整数
pub fn run(program: &Program, entry: &str, arguments: &[i64]) -> Vec<i64> {
    let interpreter = Interpreter::new(program)
        .halt_on("ret")
        .with_step_limit(100_000);
    let mut values: Vec<Value> = arguments.iter().copied().map(Value::int).collect();
    values.push(interpreter.closure("ret").unwrap());

    let halt = interpreter.run(entry, values).unwrap();
    halt.arguments
        .iter()
        .map(|value| value.as_int().unwrap())
        .collect()
}
