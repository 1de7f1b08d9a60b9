//! User-declared record types with operator overrides.
//!
//! `obj point { x, y }` registers an `ObjType`; instances carry the
//! type id and a field vector. An override for operator `op` on type
//! `T` is an ordinary function named `T_op`; the VM resolves it by
//! name at dispatch time. Types do not inherit from each other.

use crate::code::{BinOp, UnOp};
use crate::errors::CalcError;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct ObjType {
    pub name: String,
    pub fields: Vec<String>,
}

impl ObjType {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    /// Name of the function overriding `op` for this type.
    pub fn override_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.name, suffix)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub type_id: usize,
    pub fields: Vec<Value>,
}

impl Object {
    pub fn new(type_id: usize, nfields: usize) -> Self {
        Object {
            type_id,
            fields: vec![Value::from_i64(0); nfields],
        }
    }

    pub fn get_field(&self, ty: &ObjType, name: &str) -> Result<&Value, CalcError> {
        let i = ty
            .field_index(name)
            .ok_or_else(|| CalcError::UndefinedField(ty.name.clone(), name.to_string()))?;
        Ok(&self.fields[i])
    }

    pub fn set_field(&mut self, ty: &ObjType, name: &str, v: Value) -> Result<(), CalcError> {
        let i = ty
            .field_index(name)
            .ok_or_else(|| CalcError::UndefinedField(ty.name.clone(), name.to_string()))?;
        self.fields[i] = v;
        Ok(())
    }
}

/// Override-function suffix for a binary operator; `None` when the
/// operator cannot be overridden.
pub fn binop_suffix(op: BinOp) -> Option<&'static str> {
    Some(match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Quo => "quo",
        BinOp::Mod => "mod",
        BinOp::Pow => "pow",
        BinOp::Eq | BinOp::Ne => "eq",
        BinOp::Lt => "lt",
        BinOp::Le => "le",
        BinOp::Gt => "gt",
        BinOp::Ge => "ge",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::Shl => "shl",
        BinOp::Shr => "shr",
    })
}

/// Override-function suffix for a unary operator.
pub fn unop_suffix(op: UnOp) -> Option<&'static str> {
    match op {
        UnOp::Neg => Some("neg"),
        UnOp::LNot => Some("not"),
        UnOp::BitNot => Some("comp"),
        UnOp::Plus => None,
    }
}

/// Suffix of the print override consulted by the print statement.
pub const PRINT_SUFFIX: &str = "print";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup() {
        let ty = ObjType {
            name: "point".to_string(),
            fields: vec!["x".to_string(), "y".to_string()],
        };
        let mut o = Object::new(0, 2);
        assert_eq!(o.get_field(&ty, "x").unwrap(), &Value::from_i64(0));
        o.set_field(&ty, "y", Value::from_i64(7)).unwrap();
        assert_eq!(o.get_field(&ty, "y").unwrap(), &Value::from_i64(7));
        assert!(o.get_field(&ty, "z").is_err());
    }

    #[test]
    fn override_names() {
        let ty = ObjType {
            name: "point".to_string(),
            fields: vec![],
        };
        assert_eq!(
            ty.override_name(binop_suffix(BinOp::Add).unwrap()),
            "point_add"
        );
        assert_eq!(
            ty.override_name(unop_suffix(UnOp::Neg).unwrap()),
            "point_neg"
        );
    }
}
