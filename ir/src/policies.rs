//! Pure evaluation semantics for every supported `(operation, element type)`
//! pair.
//!
//! The accumulating operations (`and`, `or`, `xor`, `add`, `sub`, `mul`,
//! `div`) fold operand lists left to right through an [`Accumulator`] held at
//! the native width of the element type; the remaining operations go through
//! [`apply`]. Integer arithmetic wraps. A pair with no defined semantics
//! (e.g. `and` on `f32`) reports [`IrError::UnsupportedOperationForType`].

use crate::{IrError, Payload, PayloadValue, PrimitiveOperation, PrimitiveType};

/// A running fold value at the native width of its element type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Accumulator {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
}

impl Accumulator {
    /// Decodes `value` as an operand of type `ty`.
    pub fn new(ty: PrimitiveType, value: PayloadValue) -> Self {
        match ty {
            PrimitiveType::Bool => Self::Bool(value.to_bool()),
            PrimitiveType::Int8 => Self::Int8(value.to_i64() as i8),
            PrimitiveType::Int16 => Self::Int16(value.to_i64() as i16),
            PrimitiveType::Int32 => Self::Int32(value.to_i64() as i32),
            PrimitiveType::Int64 => Self::Int64(value.to_i64()),
            PrimitiveType::UInt8 => Self::UInt8(value.to_u64() as u8),
            PrimitiveType::UInt16 => Self::UInt16(value.to_u64() as u16),
            PrimitiveType::UInt32 => Self::UInt32(value.to_u64() as u32),
            PrimitiveType::UInt64 => Self::UInt64(value.to_u64()),
            PrimitiveType::Float => Self::Float(value.to_f32()),
            PrimitiveType::Double => Self::Double(value.to_f64()),
        }
    }

    pub fn element_type(&self) -> PrimitiveType {
        match self {
            Self::Bool(_) => PrimitiveType::Bool,
            Self::Int8(_) => PrimitiveType::Int8,
            Self::Int16(_) => PrimitiveType::Int16,
            Self::Int32(_) => PrimitiveType::Int32,
            Self::Int64(_) => PrimitiveType::Int64,
            Self::UInt8(_) => PrimitiveType::UInt8,
            Self::UInt16(_) => PrimitiveType::UInt16,
            Self::UInt32(_) => PrimitiveType::UInt32,
            Self::UInt64(_) => PrimitiveType::UInt64,
            Self::Float(_) => PrimitiveType::Float,
            Self::Double(_) => PrimitiveType::Double,
        }
    }

    /// Folds one more operand into the accumulator. `Sub` and `Div`
    /// accumulate left to right, so operand order is significant.
    pub fn accumulate(&mut self, op: PrimitiveOperation, value: PayloadValue) -> Result<(), IrError> {
        use PrimitiveOperation as Op;

        let ty = self.element_type();

        macro_rules! int_arm {
            ($acc:expr, $v:expr) => {{
                let v = $v;
                *$acc = match op {
                    Op::And => *$acc & v,
                    Op::Or => *$acc | v,
                    Op::Xor => *$acc ^ v,
                    Op::Add => $acc.wrapping_add(v),
                    Op::Sub => $acc.wrapping_sub(v),
                    Op::Mul => $acc.wrapping_mul(v),
                    Op::Div => {
                        if v == 0 {
                            return Err(IrError::DivisionByZero);
                        }
                        $acc.wrapping_div(v)
                    }
                    _ => return Err(IrError::UnsupportedOperationForType { op, ty }),
                };
            }};
        }

        macro_rules! float_arm {
            ($acc:expr, $v:expr) => {{
                let v = $v;
                *$acc = match op {
                    Op::Add => *$acc + v,
                    Op::Sub => *$acc - v,
                    Op::Mul => *$acc * v,
                    Op::Div => *$acc / v,
                    _ => return Err(IrError::UnsupportedOperationForType { op, ty }),
                };
            }};
        }

        match self {
            // Booleans accumulate arithmetic as 8-bit integers and narrow
            // back to "nonzero", matching the dynamic constant encoding.
            Self::Bool(acc) => {
                let a = *acc as u8;
                let v = value.to_bool() as u8;
                let folded = match op {
                    Op::And => a & v,
                    Op::Or => a | v,
                    Op::Xor => a ^ v,
                    Op::Add => a.wrapping_add(v),
                    Op::Sub => a.wrapping_sub(v),
                    Op::Mul => a.wrapping_mul(v),
                    Op::Div => {
                        if v == 0 {
                            return Err(IrError::DivisionByZero);
                        }
                        a / v
                    }
                    _ => return Err(IrError::UnsupportedOperationForType { op, ty }),
                };
                *acc = folded != 0;
            }
            Self::Int8(acc) => int_arm!(acc, value.to_i64() as i8),
            Self::Int16(acc) => int_arm!(acc, value.to_i64() as i16),
            Self::Int32(acc) => int_arm!(acc, value.to_i64() as i32),
            Self::Int64(acc) => int_arm!(acc, value.to_i64()),
            Self::UInt8(acc) => int_arm!(acc, value.to_u64() as u8),
            Self::UInt16(acc) => int_arm!(acc, value.to_u64() as u16),
            Self::UInt32(acc) => int_arm!(acc, value.to_u64() as u32),
            Self::UInt64(acc) => int_arm!(acc, value.to_u64()),
            Self::Float(acc) => float_arm!(acc, value.to_f32()),
            Self::Double(acc) => float_arm!(acc, value.to_f64()),
        }
        Ok(())
    }

    /// Logical inversion: the value becomes 1 if it was zero, 0 otherwise.
    /// This is `not` itself and the post-inversion step of `nand`/`nor`/
    /// `xnor`; it is not defined for floating-point element types.
    pub fn logical_not(&mut self) -> Result<(), IrError> {
        match self {
            Self::Bool(acc) => *acc = !*acc,
            Self::Int8(acc) => *acc = (*acc == 0) as i8,
            Self::Int16(acc) => *acc = (*acc == 0) as i16,
            Self::Int32(acc) => *acc = (*acc == 0) as i32,
            Self::Int64(acc) => *acc = (*acc == 0) as i64,
            Self::UInt8(acc) => *acc = (*acc == 0) as u8,
            Self::UInt16(acc) => *acc = (*acc == 0) as u16,
            Self::UInt32(acc) => *acc = (*acc == 0) as u32,
            Self::UInt64(acc) => *acc = (*acc == 0) as u64,
            Self::Float(_) | Self::Double(_) => {
                return Err(self.unsupported(PrimitiveOperation::Not));
            }
        }
        Ok(())
    }

    /// Arithmetic negation. Integers wrap; a boolean is unchanged since any
    /// nonzero value stays nonzero under negation.
    pub fn negate(&mut self) {
        match self {
            Self::Bool(_) => {}
            Self::Int8(acc) => *acc = acc.wrapping_neg(),
            Self::Int16(acc) => *acc = acc.wrapping_neg(),
            Self::Int32(acc) => *acc = acc.wrapping_neg(),
            Self::Int64(acc) => *acc = acc.wrapping_neg(),
            Self::UInt8(acc) => *acc = acc.wrapping_neg(),
            Self::UInt16(acc) => *acc = acc.wrapping_neg(),
            Self::UInt32(acc) => *acc = acc.wrapping_neg(),
            Self::UInt64(acc) => *acc = acc.wrapping_neg(),
            Self::Float(acc) => *acc = -*acc,
            Self::Double(acc) => *acc = -*acc,
        }
    }

    /// Widens the accumulated value back to its payload encoding.
    pub fn into_payload(self) -> PayloadValue {
        match self {
            Self::Bool(v) => PayloadValue::Bool(v),
            Self::Int8(v) => PayloadValue::Int(v as i64),
            Self::Int16(v) => PayloadValue::Int(v as i64),
            Self::Int32(v) => PayloadValue::Int(v as i64),
            Self::Int64(v) => PayloadValue::Int(v),
            Self::UInt8(v) => PayloadValue::UInt(v as u64),
            Self::UInt16(v) => PayloadValue::UInt(v as u64),
            Self::UInt32(v) => PayloadValue::UInt(v as u64),
            Self::UInt64(v) => PayloadValue::UInt(v),
            Self::Float(v) => PayloadValue::Float(v),
            Self::Double(v) => PayloadValue::Double(v),
        }
    }

    fn unsupported(&self, op: PrimitiveOperation) -> IrError {
        IrError::UnsupportedOperationForType { op, ty: self.element_type() }
    }
}

/// Decomposes `value`, read at type `ty`, into its bits in little-endian
/// order: element 0 of the result is the least significant bit.
pub fn split_bits(ty: PrimitiveType, value: PayloadValue) -> Result<Vec<bool>, IrError> {
    if ty.is_float() {
        return Err(IrError::UnsupportedOperationForType { op: PrimitiveOperation::Split, ty });
    }
    let raw = if ty.is_signed_int() {
        // two's complement bit pattern
        value.to_i64() as u64
    } else {
        value.to_u64()
    };
    Ok((0..ty.num_bits()).map(|i| (raw >> i) & 1 == 1).collect())
}

/// Packs booleans into a value of type `ty` using the big-endian merge
/// convention: the first boolean becomes the most significant bit, at
/// position `bits.len() - 1`.
///
/// Note the deliberate asymmetry with [`split_bits`]; merging a split
/// result back requires reversing the bit vector in between.
pub fn merge_bits(ty: PrimitiveType, bits: &[bool]) -> Result<PayloadValue, IrError> {
    if ty.is_float() {
        return Err(IrError::UnsupportedOperationForType { op: PrimitiveOperation::Merge, ty });
    }
    if bits.is_empty() || bits.len() > 64 {
        return Err(IrError::InvariantViolation(format!(
            "merge expects between 1 and 64 booleans, got {}",
            bits.len()
        )));
    }
    let mut raw: u64 = 0;
    let mut position = bits.len() - 1;
    for &bit in bits {
        if bit {
            raw |= 1u64 << position;
        }
        position = position.wrapping_sub(1);
    }
    let width = ty.num_bits();
    let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
    let narrowed = raw & mask;
    Ok(match ty {
        PrimitiveType::Bool => PayloadValue::Bool(narrowed != 0),
        ty if ty.is_unsigned_int() => PayloadValue::UInt(narrowed),
        // sign-extend from the type width
        _ => {
            let shift = 64 - width;
            PayloadValue::Int(((narrowed << shift) as i64) >> shift)
        }
    })
}

fn compare(
    op: PrimitiveOperation,
    ty: PrimitiveType,
    lhs: PayloadValue,
    rhs: PayloadValue,
) -> Result<bool, IrError> {
    use PrimitiveOperation as Op;

    macro_rules! cmp {
        ($a:expr, $b:expr) => {{
            let (a, b) = ($a, $b);
            match op {
                Op::Gt => a > b,
                Op::Ge => a >= b,
                Op::Lt => a < b,
                Op::Le => a <= b,
                Op::Eq => a == b,
                _ => unreachable!("not a comparison"),
            }
        }};
    }

    Ok(match ty {
        PrimitiveType::Bool => cmp!(lhs.to_bool() as u8, rhs.to_bool() as u8),
        PrimitiveType::Int8 => cmp!(lhs.to_i64() as i8, rhs.to_i64() as i8),
        PrimitiveType::Int16 => cmp!(lhs.to_i64() as i16, rhs.to_i64() as i16),
        PrimitiveType::Int32 => cmp!(lhs.to_i64() as i32, rhs.to_i64() as i32),
        PrimitiveType::Int64 => cmp!(lhs.to_i64(), rhs.to_i64()),
        PrimitiveType::UInt8 => cmp!(lhs.to_u64() as u8, rhs.to_u64() as u8),
        PrimitiveType::UInt16 => cmp!(lhs.to_u64() as u16, rhs.to_u64() as u16),
        PrimitiveType::UInt32 => cmp!(lhs.to_u64() as u32, rhs.to_u64() as u32),
        PrimitiveType::UInt64 => cmp!(lhs.to_u64(), rhs.to_u64()),
        PrimitiveType::Float => cmp!(lhs.to_f32(), rhs.to_f32()),
        PrimitiveType::Double => cmp!(lhs.to_f64(), rhs.to_f64()),
    })
}

fn check_arity(op: PrimitiveOperation, got: usize, want: usize) -> Result<(), IrError> {
    if got == want {
        Ok(())
    } else {
        Err(IrError::InvariantViolation(format!(
            "`{op}` expects {want} operands, got {got}"
        )))
    }
}

/// Evaluates one operation on decoded operand values.
///
/// The meaning of `ty` depends on the operation: the operand element type
/// for the accumulating, comparison and unary groups and for `split`; the
/// element type of the choices for `mux`; the packing target for `merge`.
pub fn apply(
    op: PrimitiveOperation,
    ty: PrimitiveType,
    args: &[PayloadValue],
) -> Result<Payload, IrError> {
    use PrimitiveOperation as Op;

    if args.is_empty() {
        return Err(IrError::InvariantViolation(format!("`{op}` applied to no operands")));
    }

    match op {
        _ if op.is_accumulating() => {
            let mut acc = Accumulator::new(ty, args[0]);
            for &value in &args[1..] {
                acc.accumulate(op, value)?;
            }
            Ok(Payload::scalar(acc.into_payload()))
        }
        Op::Nand | Op::Nor | Op::Xnor => {
            let base = op.inverted_base().expect("negated-result operation");
            let mut acc = Accumulator::new(ty, args[0]);
            for &value in &args[1..] {
                acc.accumulate(base, value)?;
            }
            acc.logical_not()?;
            Ok(Payload::scalar(acc.into_payload()))
        }
        _ if op.is_comparison() => {
            check_arity(op, args.len(), 2)?;
            let result = compare(op, ty, args[0], args[1])?;
            Ok(Payload::scalar(PayloadValue::Bool(result)))
        }
        Op::Not => {
            check_arity(op, args.len(), 1)?;
            let mut acc = Accumulator::new(ty, args[0]);
            acc.logical_not()?;
            Ok(Payload::scalar(acc.into_payload()))
        }
        Op::Neg => {
            check_arity(op, args.len(), 1)?;
            let mut acc = Accumulator::new(ty, args[0]);
            acc.negate();
            Ok(Payload::scalar(acc.into_payload()))
        }
        Op::Mux => {
            check_arity(op, args.len(), 3)?;
            let chosen = if args[0].to_bool() { args[1] } else { args[2] };
            Ok(Payload::scalar(Accumulator::new(ty, chosen).into_payload()))
        }
        Op::Split => {
            check_arity(op, args.len(), 1)?;
            let bits = split_bits(ty, args[0])?;
            let values = bits.into_iter().map(PayloadValue::Bool).collect::<Vec<_>>();
            let shape = vec![values.len()];
            Ok(Payload::vector(values, shape))
        }
        Op::Merge => {
            let bits = args.iter().map(|v| v.to_bool()).collect::<Vec<_>>();
            Ok(Payload::scalar(merge_bits(ty, &bits)?))
        }
        Op::Constant => {
            check_arity(op, args.len(), 1)?;
            Ok(Payload::scalar(args[0]))
        }
        _ => Err(IrError::UnsupportedOperationForType { op, ty }),
    }
}
