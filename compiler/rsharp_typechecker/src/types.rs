//! Semantic type definitions for the R-Sharp type system

use serde::{Deserialize, Serialize};
use std::fmt;

/// The main type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RsType {
    Primitive(PrimitiveType),
    Pointer(Box<RsType>),
    Array {
        element: Box<RsType>,
        size: Option<u64>,
    },
    /// Error type for error recovery
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    I8,
    I16,
    I32,
    I64,
    /// Only meaningful as a pointee and for pointer arithmetic
    CVoid,
}

impl RsType {
    pub const I8: RsType = RsType::Primitive(PrimitiveType::I8);
    pub const I16: RsType = RsType::Primitive(PrimitiveType::I16);
    pub const I32: RsType = RsType::Primitive(PrimitiveType::I32);
    pub const I64: RsType = RsType::Primitive(PrimitiveType::I64);
    pub const C_VOID: RsType = RsType::Primitive(PrimitiveType::CVoid);

    pub fn pointer_to(inner: RsType) -> RsType {
        RsType::Pointer(Box::new(inner))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            RsType::Primitive(
                PrimitiveType::I8 | PrimitiveType::I16 | PrimitiveType::I32 | PrimitiveType::I64
            )
        )
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, RsType::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, RsType::Array { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RsType::Error)
    }

    pub fn pointee(&self) -> Option<&RsType> {
        match self {
            RsType::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Byte size per the data model: 1/2/4/8 for primitives (c_void = 1,
    /// for pointer arithmetic), 8 for pointers, element size times count
    /// for sized arrays.
    pub fn size_of(&self) -> Option<u64> {
        match self {
            RsType::Primitive(PrimitiveType::I8) => Some(1),
            RsType::Primitive(PrimitiveType::I16) => Some(2),
            RsType::Primitive(PrimitiveType::I32) => Some(4),
            RsType::Primitive(PrimitiveType::I64) => Some(8),
            RsType::Primitive(PrimitiveType::CVoid) => Some(1),
            RsType::Pointer(_) => Some(8),
            RsType::Array { element, size: Some(n) } => Some(element.size_of()? * n),
            RsType::Array { size: None, .. } => None,
            RsType::Error => None,
        }
    }
}

impl fmt::Display for RsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsType::Primitive(PrimitiveType::I8) => write!(f, "i8"),
            RsType::Primitive(PrimitiveType::I16) => write!(f, "i16"),
            RsType::Primitive(PrimitiveType::I32) => write!(f, "i32"),
            RsType::Primitive(PrimitiveType::I64) => write!(f, "i64"),
            RsType::Primitive(PrimitiveType::CVoid) => write!(f, "c_void"),
            RsType::Pointer(inner) => write!(f, "*{}", inner),
            RsType::Array { element, size: Some(n) } => write!(f, "[{}, {}]", element, n),
            RsType::Array { element, size: None } => write!(f, "[{}]", element),
            RsType::Error => write!(f, "<error>"),
        }
    }
}
