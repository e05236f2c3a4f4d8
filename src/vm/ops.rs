//! Arithmetic, comparison and logical operators.
//!
//! Mixed numeric operands are promoted to the widest kind present, in the
//! order float, int, uint, char. Integer arithmetic wraps.

use std::cmp::Ordering;

use crate::bytecode::OpCode;
use crate::error::FaultKind;

use super::heap::{FunctionTarget, Object};
use super::machine::{FaultResult, Machine};
use super::value::Value;

/// Nesting beyond which containers print as `...`.
const DISPLAY_DEPTH: usize = 8;

/// A numeric operand after promotion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Float(f32),
    Int(i32),
    UInt(u32),
    Char(u8),
}

impl Number {
    pub fn of(value: Value) -> Option<Self> {
        match value {
            Value::Float(n) => Some(Number::Float(n)),
            Value::Int(n) => Some(Number::Int(n)),
            Value::UInt(n) => Some(Number::UInt(n)),
            Value::Char(c) => Some(Number::Char(c)),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Number::Float(_) => 3,
            Number::Int(_) => 2,
            Number::UInt(_) => 1,
            Number::Char(_) => 0,
        }
    }

    fn to_f32(self) -> f32 {
        match self {
            Number::Float(n) => n,
            Number::Int(n) => n as f32,
            Number::UInt(n) => n as f32,
            Number::Char(c) => c as f32,
        }
    }

    fn to_i32(self) -> i32 {
        match self {
            Number::Float(n) => n as i32,
            Number::Int(n) => n,
            Number::UInt(n) => n as i32,
            Number::Char(c) => c as i32,
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            Number::Float(n) => n as u32,
            Number::Int(n) => n as u32,
            Number::UInt(n) => n,
            Number::Char(c) => c as u32,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Number::Float(n) => n as u8,
            Number::Int(n) => n as u8,
            Number::UInt(n) => n as u8,
            Number::Char(c) => c,
        }
    }

    /// Convert both operands to the wider of their two kinds.
    pub fn promote(left: Self, right: Self) -> (Self, Self) {
        let target = if left.rank() >= right.rank() { left } else { right };
        (target.convert(left), target.convert(right))
    }

    fn convert(self, n: Number) -> Number {
        match self {
            Number::Float(_) => Number::Float(n.to_f32()),
            Number::Int(_) => Number::Int(n.to_i32()),
            Number::UInt(_) => Number::UInt(n.to_u32()),
            Number::Char(_) => Number::Char(n.to_u8()),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Number::Float(n) => Value::Float(n),
            Number::Int(n) => Value::Int(n),
            Number::UInt(n) => Value::UInt(n),
            Number::Char(c) => Value::Char(c),
        }
    }
}

/// `+ - * / %` on two numbers.
pub fn arithmetic(op: OpCode, left: Number, right: Number) -> FaultResult<Value> {
    macro_rules! integer {
        ($a:expr, $b:expr) => {
            match op {
                OpCode::Add => $a.wrapping_add($b),
                OpCode::Sub => $a.wrapping_sub($b),
                OpCode::Mul => $a.wrapping_mul($b),
                OpCode::Div if $b == 0 => return Err(FaultKind::DivisionByZero),
                OpCode::Div => $a.wrapping_div($b),
                OpCode::Mod if $b == 0 => return Err(FaultKind::DivisionByZero),
                OpCode::Mod => $a.wrapping_rem($b),
                _ => return Err(mismatch(op, "number", "number")),
            }
        };
    }

    let result = match Number::promote(left, right) {
        (Number::Float(a), Number::Float(b)) => Number::Float(match op {
            OpCode::Add => a + b,
            OpCode::Sub => a - b,
            OpCode::Mul => a * b,
            OpCode::Div => a / b,
            OpCode::Mod => a % b,
            _ => return Err(mismatch(op, "float", "float")),
        }),
        (Number::Int(a), Number::Int(b)) => Number::Int(integer!(a, b)),
        (Number::UInt(a), Number::UInt(b)) => Number::UInt(integer!(a, b)),
        (Number::Char(a), Number::Char(b)) => Number::Char(integer!(a, b)),
        (a, b) => return Err(mismatch(op, kind(a), kind(b))),
    };
    Ok(result.into_value())
}

/// `& | ^ << >>` on integer kinds.
pub fn bitwise(op: OpCode, left: Number, right: Number) -> FaultResult<Value> {
    if matches!(left, Number::Float(_)) || matches!(right, Number::Float(_)) {
        return Err(mismatch(op, kind(left), kind(right)));
    }

    macro_rules! bits {
        ($a:expr, $b:expr) => {
            match op {
                OpCode::BitAnd => $a & $b,
                OpCode::BitOr => $a | $b,
                OpCode::BitXor => $a ^ $b,
                OpCode::Shl => $a.wrapping_shl($b as u32),
                OpCode::Shr => $a.wrapping_shr($b as u32),
                _ => return Err(mismatch(op, kind(left), kind(right))),
            }
        };
    }

    let result = match Number::promote(left, right) {
        (Number::Int(a), Number::Int(b)) => Number::Int(bits!(a, b)),
        (Number::UInt(a), Number::UInt(b)) => Number::UInt(bits!(a, b)),
        (Number::Char(a), Number::Char(b)) => Number::Char(bits!(a, b)),
        (a, b) => return Err(mismatch(op, kind(a), kind(b))),
    };
    Ok(result.into_value())
}

pub fn compare(left: Number, right: Number) -> Option<Ordering> {
    match Number::promote(left, right) {
        (Number::Float(a), Number::Float(b)) => a.partial_cmp(&b),
        (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
        (Number::UInt(a), Number::UInt(b)) => Some(a.cmp(&b)),
        (Number::Char(a), Number::Char(b)) => Some(a.cmp(&b)),
        _ => None,
    }
}

fn kind(n: Number) -> &'static str {
    match n {
        Number::Float(_) => "float",
        Number::Int(_) => "int",
        Number::UInt(_) => "uint",
        Number::Char(_) => "char",
    }
}

fn mismatch(op: OpCode, left: &'static str, right: &'static str) -> FaultKind {
    FaultKind::TypeMismatch {
        op: op.symbol(),
        left,
        right,
    }
}

impl OpCode {
    /// Source spelling of an operator opcode.
    pub fn symbol(self) -> &'static str {
        match self {
            OpCode::Add => "+",
            OpCode::Sub | OpCode::Negate => "-",
            OpCode::Mul => "*",
            OpCode::Div => "/",
            OpCode::Mod => "%",
            OpCode::BitAnd => "&",
            OpCode::BitOr => "|",
            OpCode::BitXor => "^",
            OpCode::BitNot => "~",
            OpCode::Shl => "<<",
            OpCode::Shr => ">>",
            OpCode::Eq => "==",
            OpCode::Ne => "!=",
            OpCode::Lt => "<",
            OpCode::Gt => ">",
            OpCode::Le => "<=",
            OpCode::Ge => ">=",
            OpCode::And => "&&",
            OpCode::Or => "||",
            OpCode::Not => "!",
            other => other.name(),
        }
    }
}

impl Machine {
    pub(super) fn binary(&mut self, op: OpCode) -> FaultResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = self.binary_value(op, left, right)?;
        self.push(result)
    }

    fn binary_value(&mut self, op: OpCode, left: Value, right: Value) -> FaultResult<Value> {
        match op {
            OpCode::And => return Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
            OpCode::Or => return Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
            OpCode::Eq => return Ok(Value::Bool(self.values_equal(left, right))),
            OpCode::Ne => return Ok(Value::Bool(!self.values_equal(left, right))),
            _ => {}
        }

        let is_string =
            |machine: &Machine, value: Value| machine.string_value(value).is_some();
        if op == OpCode::Add && (is_string(self, left) || is_string(self, right)) {
            let text = format!("{}{}", self.display(left), self.display(right));
            return Ok(self.alloc_string(text));
        }

        if matches!(op, OpCode::Lt | OpCode::Gt | OpCode::Le | OpCode::Ge) {
            let ordering = match (Number::of(left), Number::of(right)) {
                (Some(a), Some(b)) => compare(a, b),
                _ => match (self.string_value(left), self.string_value(right)) {
                    (Some(a), Some(b)) => Some(a.cmp(b)),
                    _ => return Err(self.operand_mismatch(op, left, right)),
                },
            };
            let result = match ordering {
                Some(ordering) => match op {
                    OpCode::Lt => ordering == Ordering::Less,
                    OpCode::Gt => ordering == Ordering::Greater,
                    OpCode::Le => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
                // NaN compares false.
                None => false,
            };
            return Ok(Value::Bool(result));
        }

        let (Some(a), Some(b)) = (Number::of(left), Number::of(right)) else {
            return Err(self.operand_mismatch(op, left, right));
        };
        match op {
            OpCode::BitAnd | OpCode::BitOr | OpCode::BitXor | OpCode::Shl | OpCode::Shr => {
                bitwise(op, a, b)
            }
            _ => arithmetic(op, a, b),
        }
    }

    pub(super) fn unary(&mut self, op: OpCode) -> FaultResult<()> {
        let operand = self.pop()?;
        let result = match (op, operand) {
            (OpCode::Not, value) => Value::Bool(!value.is_truthy()),
            (OpCode::Negate, Value::Int(n)) => Value::Int(n.wrapping_neg()),
            (OpCode::Negate, Value::UInt(n)) => Value::UInt(n.wrapping_neg()),
            (OpCode::Negate, Value::Float(n)) => Value::Float(-n),
            (OpCode::BitNot, Value::Int(n)) => Value::Int(!n),
            (OpCode::BitNot, Value::UInt(n)) => Value::UInt(!n),
            (OpCode::BitNot, Value::Char(c)) => Value::Char(!c),
            (op, value) => {
                return Err(FaultKind::TypeMismatch {
                    op: op.symbol(),
                    left: self.kind_name(value),
                    right: "nothing",
                })
            }
        };
        self.push(result)
    }

    fn operand_mismatch(&self, op: OpCode, left: Value, right: Value) -> FaultKind {
        FaultKind::TypeMismatch {
            op: op.symbol(),
            left: self.kind_name(left),
            right: self.kind_name(right),
        }
    }

    /// Numbers compare after promotion, strings by content, other heap
    /// objects by identity.
    pub fn values_equal(&self, left: Value, right: Value) -> bool {
        if let (Some(a), Some(b)) = (Number::of(left), Number::of(right)) {
            return compare(a, b) == Some(Ordering::Equal);
        }
        if let (Some(a), Some(b)) = (self.string_value(left), self.string_value(right)) {
            return a == b;
        }
        left == right
    }

    /// Text form used by `print`, `str` and string concatenation.
    pub fn display(&self, value: Value) -> String {
        let mut out = String::new();
        self.write_display(value, 0, &mut out);
        out
    }

    fn write_display(&self, value: Value, depth: usize, out: &mut String) {
        use std::fmt::Write;

        let handle = match value {
            Value::Null => return out.push_str("null"),
            Value::Bool(b) => return out.push_str(if b { "true" } else { "false" }),
            Value::Int(n) => return out.push_str(&n.to_string()),
            Value::UInt(n) => return out.push_str(&n.to_string()),
            Value::Float(n) if n.is_finite() && n.fract() == 0.0 => {
                let _ = write!(out, "{:.1}", n);
                return;
            }
            Value::Float(n) => return out.push_str(&n.to_string()),
            Value::Char(c) => return out.push(c as char),
            Value::Native(native) => {
                let _ = write!(out, "<native {}>", native.name);
                return;
            }
            Value::Object(handle) => handle,
        };

        let Ok(object) = self.heap.get(handle) else {
            return out.push_str("<collected>");
        };
        if depth >= DISPLAY_DEPTH && !matches!(object, Object::String(_)) {
            return out.push_str("...");
        }

        match object {
            Object::String(s) => out.push_str(s),
            Object::Array(values) => {
                out.push('[');
                self.write_list(values, depth, out);
                out.push(']');
            }
            Object::Structure { type_id, fields } => {
                let descriptor = self.bytecode.structure(*type_id);
                let name = descriptor.map_or("?", |d| self.bytecode.string(d.name));
                let _ = write!(out, "{} {{ ", name);
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let field_name = descriptor
                        .and_then(|d| d.fields.get(i))
                        .map_or("?", |(symbol, _)| self.bytecode.string(*symbol));
                    let _ = write!(out, "{}: ", field_name);
                    self.write_display(*field, depth + 1, out);
                }
                out.push_str(" }");
            }
            Object::NativeStructure { kind, storage } => {
                let name = self
                    .native_structures
                    .get_index(*kind)
                    .map_or("?", |(name, _)| name.as_str());
                let _ = write!(out, "{}(", name);
                self.write_list(storage, depth, out);
                out.push(')');
            }
            Object::Function(function) => match function.target {
                FunctionTarget::Local(id) => {
                    let name = self
                        .bytecode
                        .function(id)
                        .map_or("?", |f| self.bytecode.string(f.name));
                    let _ = write!(out, "<func {}>", name);
                }
                FunctionTarget::Native(native) => {
                    let _ = write!(out, "<native {}>", native.name);
                }
            },
        }
    }

    fn write_list(&self, values: &[Value], depth: usize, out: &mut String) {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_display(*value, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_order() {
        assert_eq!(
            Number::promote(Number::Int(2), Number::Float(0.5)),
            (Number::Float(2.0), Number::Float(0.5))
        );
        assert_eq!(
            Number::promote(Number::UInt(7), Number::Int(-1)),
            (Number::Int(7), Number::Int(-1))
        );
        assert_eq!(
            Number::promote(Number::Char(b'a'), Number::UInt(1)),
            (Number::UInt(97), Number::UInt(1))
        );
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(
            arithmetic(OpCode::Add, Number::Int(i32::MAX), Number::Int(1)),
            Ok(Value::Int(i32::MIN))
        );
        assert_eq!(
            arithmetic(OpCode::Div, Number::Int(7), Number::Int(2)),
            Ok(Value::Int(3))
        );
        assert_eq!(
            arithmetic(OpCode::Mod, Number::UInt(7), Number::Char(4)),
            Ok(Value::UInt(3))
        );
        assert_eq!(
            arithmetic(OpCode::Div, Number::Int(1), Number::Int(0)),
            Err(FaultKind::DivisionByZero)
        );
        assert_eq!(
            arithmetic(OpCode::Mul, Number::Int(3), Number::Float(1.5)),
            Ok(Value::Float(4.5))
        );
    }

    #[test]
    fn test_bitwise_rejects_floats() {
        assert_eq!(
            bitwise(OpCode::Shl, Number::Int(1), Number::Int(4)),
            Ok(Value::Int(16))
        );
        assert_eq!(
            bitwise(OpCode::BitAnd, Number::Float(1.0), Number::Int(1)),
            Err(FaultKind::TypeMismatch {
                op: "&",
                left: "float",
                right: "int"
            })
        );
    }

    #[test]
    fn test_compare_mixed_kinds() {
        assert_eq!(
            compare(Number::Int(2), Number::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare(Number::Char(b'b'), Number::Char(b'a')),
            Some(Ordering::Greater)
        );
    }
}
