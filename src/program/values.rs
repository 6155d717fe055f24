//! Thorin IR 类型与字面量
//!
//! 静态类型（`Type` / `FnType`）以及嵌入表达式中的常量（`Literal`）。
//! 二者都没有身份，只按结构比较。

use std::fmt;
use std::str::FromStr;

use crate::error::{EvalError, IrError};

/// IR 类型
///
/// 封闭集合：两个原始类型加上函数类型。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
    Fn(FnType),
}

/// 函数类型（continuation 的签名）
///
/// 只有参数列表：CPS 中没有返回值。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FnType {
    pub params: Vec<Type>,
}

impl FnType {
    pub fn new(params: impl IntoIterator<Item = Type>) -> Self {
        FnType {
            params: params.into_iter().collect(),
        }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// 阶：无参数时为 0，否则为 1 + max(参数的阶)
    pub fn order(&self) -> u32 {
        self.params
            .iter()
            .map(Type::order)
            .max()
            .map_or(0, |max| max + 1)
    }
}

impl Type {
    /// 构造函数类型的便捷方法
    pub fn func(params: impl IntoIterator<Item = Type>) -> Self {
        Type::Fn(FnType::new(params))
    }

    /// 类型的阶（函数类型的嵌套深度），原始类型为 0
    pub fn order(&self) -> u32 {
        match self {
            Type::Int | Type::Bool => 0,
            Type::Fn(fn_type) => fn_type.order(),
        }
    }

    pub fn as_fn(&self) -> Option<&FnType> {
        match self {
            Type::Fn(fn_type) => Some(fn_type),
            _ => None,
        }
    }
}

impl From<FnType> for Type {
    fn from(fn_type: FnType) -> Self {
        Type::Fn(fn_type)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Bool => f.write_str("bool"),
            Type::Fn(fn_type) => write!(f, "{fn_type}"),
        }
    }
}

impl fmt::Display for FnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fn(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

/// 从字符串解析类型
///
/// 语法与 `Display` 输出一致：`int`、`bool`、`fn(int, fn(int))`。
impl FromStr for Type {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = TypeParser { src: s, pos: 0 };
        let ty = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos != s.len() {
            return Err(parser.error());
        }
        Ok(ty)
    }
}

impl FromStr for FnType {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Type>()? {
            Type::Fn(fn_type) => Ok(fn_type),
            _ => Err(IrError::InvalidType(s.to_string())),
        }
    }
}

struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn error(&self) -> IrError {
        IrError::InvalidType(self.src.to_string())
    }

    fn parse_type(&mut self) -> Result<Type, IrError> {
        if self.eat("int") {
            Ok(Type::Int)
        } else if self.eat("bool") {
            Ok(Type::Bool)
        } else if self.eat("fn") {
            self.parse_params().map(Type::Fn)
        } else {
            Err(self.error())
        }
    }

    fn parse_params(&mut self) -> Result<FnType, IrError> {
        if !self.eat("(") {
            return Err(self.error());
        }
        let mut params = Vec::new();
        if self.eat(")") {
            return Ok(FnType { params });
        }
        loop {
            params.push(self.parse_type()?);
            if self.eat(",") {
                continue;
            }
            if self.eat(")") {
                return Ok(FnType { params });
            }
            return Err(self.error());
        }
    }
}

/// 嵌入在 IR 中的常量
///
/// `Bottom(type)` 表示"该类型的未知值"，用于分阶段构造程序时的占位。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Bottom(Type),
    Int(i64),
    Bool(bool),
}

impl Literal {
    /// 字面量的类型
    pub fn ty(&self) -> Type {
        match self {
            Literal::Bottom(ty) => ty.clone(),
            Literal::Int(_) => Type::Int,
            Literal::Bool(_) => Type::Bool,
        }
    }

    /// 是否为已知值（非 Bottom）
    #[inline]
    pub fn is_known(&self) -> bool {
        !matches!(self, Literal::Bottom(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// int ↔ bool 显式转换
    ///
    /// - int → bool：`value > 0`
    /// - bool → int：`1` / `0`
    ///
    /// 化简器与解释器共用这一实现，保证折叠结果与求值结果一致。
    pub fn cast(&self, to: &Type) -> Result<Literal, EvalError> {
        match (self, to) {
            (Literal::Int(value), Type::Bool) => Ok(Literal::Bool(*value > 0)),
            (Literal::Bool(value), Type::Int) => Ok(Literal::Int(i64::from(*value))),
            _ => Err(EvalError::InvalidCast {
                value: self.clone(),
                to: to.clone(),
            }),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bottom(_) => f.write_str("⊥"),
            Literal::Int(value) => write!(f, "{value}"),
            Literal::Bool(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_order() {
        assert_eq!(Type::Int.order(), 0);
        assert_eq!(Type::Bool.order(), 0);
        assert_eq!(Type::func([]).order(), 0);
        assert_eq!(Type::func([Type::Int]).order(), 1);
        // fac : fn(int, fn(int)) 是二阶的
        assert_eq!(Type::func([Type::Int, Type::func([Type::Int])]).order(), 2);
    }

    #[test]
    fn test_type_display() {
        let ty = Type::func([Type::Int, Type::func([Type::Bool])]);
        assert_eq!(ty.to_string(), "fn(int, fn(bool))");
        assert_eq!(Type::func([]).to_string(), "fn()");
    }

    #[test]
    fn test_type_from_str() {
        assert_eq!("int".parse::<Type>(), Ok(Type::Int));
        assert_eq!(" bool ".parse::<Type>(), Ok(Type::Bool));
        assert_eq!("fn()".parse::<Type>(), Ok(Type::func([])));
        assert_eq!(
            "fn(int, fn(int))".parse::<Type>(),
            Ok(Type::func([Type::Int, Type::func([Type::Int])]))
        );
        assert!("fn(int".parse::<Type>().is_err());
        assert!("float".parse::<Type>().is_err());
        assert!("int int".parse::<Type>().is_err());
        assert!("int".parse::<FnType>().is_err());
    }

    #[test]
    fn test_literal_known() {
        assert!(Literal::Int(0).is_known());
        assert!(Literal::Bool(false).is_known());
        assert!(!Literal::Bottom(Type::Int).is_known());
        assert_eq!(Literal::Bottom(Type::Bool).ty(), Type::Bool);
    }

    #[test]
    fn test_literal_cast() {
        assert_eq!(Literal::Int(3).cast(&Type::Bool), Ok(Literal::Bool(true)));
        assert_eq!(Literal::Int(0).cast(&Type::Bool), Ok(Literal::Bool(false)));
        assert_eq!(Literal::Int(-2).cast(&Type::Bool), Ok(Literal::Bool(false)));
        assert_eq!(Literal::Bool(true).cast(&Type::Int), Ok(Literal::Int(1)));
        assert_eq!(Literal::Bool(false).cast(&Type::Int), Ok(Literal::Int(0)));
        assert!(Literal::Int(1).cast(&Type::Int).is_err());
        assert!(Literal::Bottom(Type::Int).cast(&Type::Bool).is_err());
    }
}
