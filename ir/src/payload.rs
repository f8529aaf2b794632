use crate::IrError;

/// A single constant scalar, stored at the widest width of its type family.
///
/// A `u8` constant is encoded as `UInt(…)`, an `i16` as `Int(…)`, and so on.
/// The declared [`crate::DataType`] of the owning node records the narrow
/// element type; readers coerce back down when they consume the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
}

impl PayloadValue {
    /// Truthiness: any nonzero numeric value reads as `true`.
    pub fn to_bool(self) -> bool {
        match self {
            Self::Bool(v) => v,
            Self::Int(v) => v != 0,
            Self::UInt(v) => v != 0,
            Self::Float(v) => v != 0.0,
            Self::Double(v) => v != 0.0,
        }
    }

    pub fn to_i64(self) -> i64 {
        match self {
            Self::Bool(v) => v as i64,
            Self::Int(v) => v,
            Self::UInt(v) => v as i64,
            Self::Float(v) => v as i64,
            Self::Double(v) => v as i64,
        }
    }

    pub fn to_u64(self) -> u64 {
        match self {
            Self::Bool(v) => v as u64,
            Self::Int(v) => v as u64,
            Self::UInt(v) => v,
            Self::Float(v) => v as u64,
            Self::Double(v) => v as u64,
        }
    }

    pub fn to_f32(self) -> f32 {
        match self {
            Self::Bool(v) => v as u8 as f32,
            Self::Int(v) => v as f32,
            Self::UInt(v) => v as f32,
            Self::Float(v) => v,
            Self::Double(v) => v as f32,
        }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Self::Bool(v) => v as u8 as f64,
            Self::Int(v) => v as f64,
            Self::UInt(v) => v as f64,
            Self::Float(v) => v as f64,
            Self::Double(v) => v,
        }
    }
}

/// The constant value carried by a `Constant` node: either one scalar or a
/// flat vector of scalars with a row-major shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Scalar(PayloadValue),
    Vector(Vec<PayloadValue>, Vec<usize>),
}

impl Payload {
    pub fn scalar(value: PayloadValue) -> Self {
        Self::Scalar(value)
    }

    pub fn vector(values: Vec<PayloadValue>, shape: Vec<usize>) -> Self {
        Self::Vector(values, shape)
    }

    pub fn num_elements(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector(values, _) => values.len(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Scalar(_) => &[],
            Self::Vector(_, shape) => shape,
        }
    }

    /// All scalar elements in flat order.
    pub fn elements(&self) -> &[PayloadValue] {
        match self {
            Self::Scalar(value) => std::slice::from_ref(value),
            Self::Vector(values, _) => values,
        }
    }

    /// Resolves an input-edge read against this payload.
    ///
    /// An offset indexes a vector payload; scalars pass through regardless.
    /// Reading a multi-element vector without an offset is an invariant
    /// violation, as is an out-of-range offset.
    pub fn element(&self, offset: Option<u32>) -> Result<PayloadValue, IrError> {
        match (self, offset) {
            (Self::Scalar(value), _) => Ok(*value),
            (Self::Vector(values, _), Some(offset)) => {
                values.get(offset as usize).copied().ok_or_else(|| {
                    IrError::InvariantViolation(format!(
                        "offset {offset} out of range for a payload of {} elements",
                        values.len()
                    ))
                })
            }
            (Self::Vector(values, _), None) => {
                if let [single] = values.as_slice() {
                    Ok(*single)
                } else {
                    Err(IrError::InvariantViolation(format!(
                        "payload of {} elements read without an offset",
                        values.len()
                    )))
                }
            }
        }
    }
}
