use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

/// Name of a function in the program's function table.
pub type Symbol = Arc<str>;

/// Static type of a dataflow edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    I1,
    I32,
    I64,
    F32,
    F64,
    /// Ordering token with no payload.
    Chain,
    /// A host-provided handle, identified by name only.
    Opaque(Arc<str>),
}

impl Type {
    pub fn is_integer(&self) -> bool {
        matches!(self, Type::I32 | Type::I64)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::I32 | Type::I64 | Type::F32 | Type::F64)
    }

    /// Scalar types can be printed and written as literals.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::I1 | Type::I32 | Type::I64 | Type::F32 | Type::F64)
    }

    pub fn name(&self) -> &str {
        match self {
            Type::I1 => "i1",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::Chain => "chain",
            Type::Opaque(name) => name,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Opaque(name) => write!(f, "!{}", name),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Type {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "i1" => Type::I1,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "f32" => Type::F32,
            "f64" => Type::F64,
            "chain" => Type::Chain,
            other => match other.strip_prefix('!') {
                Some(name) if !name.is_empty() => Type::Opaque(Arc::from(name)),
                _ => return Err(format!("unknown type `{}`", other)),
            },
        })
    }
}

/// Parameter and result types of a function or region body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
}

impl Signature {
    pub fn new(params: impl Into<Vec<Type>>, results: impl Into<Vec<Type>>) -> Self {
        Self {
            params: params.into(),
            results: results.into(),
        }
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) -> ({})", join(&self.params), join(&self.results))
    }
}

pub(crate) fn join(types: &[Type]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_and_opaque_types() {
        assert_eq!("i32".parse::<Type>(), Ok(Type::I32));
        assert_eq!("chain".parse::<Type>(), Ok(Type::Chain));
        assert_eq!(
            "!tensor".parse::<Type>(),
            Ok(Type::Opaque(Arc::from("tensor")))
        );
        assert!("!".parse::<Type>().is_err());
        assert!("u8".parse::<Type>().is_err());
    }

    #[test]
    fn signature_display() {
        let sig = Signature::new([Type::I32, Type::Chain], [Type::I1]);
        assert_eq!(sig.to_string(), "(i32, chain) -> (i1)");
    }
}
