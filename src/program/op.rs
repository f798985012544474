//! The closed operation catalogue.
//!
//! Every operation kind is one [`OpKind`] tag with static [`OpInfo`] metadata
//! (arity, result shape, attached regions and callees, which operands gate
//! dispatch). The verifier and the dispatcher consult the metadata instead of
//! matching on kinds wherever they can.

use std::fmt::{self, Display};

use indexmap::IndexMap;

use crate::program::types::{Symbol, Type};
use crate::runtime::value::Payload;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Call,
    Constant(Type),
    If,
    Cond,
    NewChain,
    MergeChains,
    Repeat,
    ParallelFor,
    ParallelCall,
    Return,
    Add(Type),
    And,
    Equal(Type),
    Div(Type),
    Print(Type),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Fixed(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(k) => write!(f, "{}", k),
            Arity::AtLeast(k) => write!(f, "at least {}", k),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Results {
    Fixed(usize),
    /// Taken from the attached region or the callee's signature.
    FromBody,
}

/// Which operands must be ready before an operation can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    None,
    All,
    /// Only the first `n` operands; the rest are handed over still pending.
    Prefix(usize),
}

#[derive(Clone, Copy, Debug)]
pub struct OpInfo {
    pub operands: Arity,
    pub results: Results,
    pub gate: Gate,
    pub regions: usize,
    /// Attribute names, in the canonical order the encoding writes them.
    pub attributes: &'static [&'static str],
}

impl OpKind {
    pub fn info(&self) -> OpInfo {
        let plain = OpInfo {
            operands: Arity::Fixed(2),
            results: Results::Fixed(1),
            gate: Gate::All,
            regions: 0,
            attributes: &[],
        };
        match self {
            OpKind::Call => OpInfo {
                operands: Arity::AtLeast(0),
                results: Results::FromBody,
                attributes: &["callee"],
                ..plain
            },
            OpKind::Constant(_) => OpInfo {
                operands: Arity::Fixed(0),
                gate: Gate::None,
                attributes: &["value"],
                ..plain
            },
            OpKind::If => OpInfo {
                operands: Arity::AtLeast(1),
                results: Results::FromBody,
                gate: Gate::Prefix(1),
                regions: 2,
                ..plain
            },
            OpKind::Cond => OpInfo {
                operands: Arity::AtLeast(1),
                results: Results::FromBody,
                gate: Gate::Prefix(1),
                attributes: &["true_fn", "false_fn"],
                ..plain
            },
            OpKind::NewChain => OpInfo {
                operands: Arity::Fixed(0),
                gate: Gate::None,
                ..plain
            },
            OpKind::MergeChains => OpInfo {
                operands: Arity::AtLeast(0),
                ..plain
            },
            OpKind::Repeat => OpInfo {
                operands: Arity::AtLeast(1),
                results: Results::FromBody,
                gate: Gate::Prefix(1),
                regions: 1,
                ..plain
            },
            OpKind::ParallelFor => OpInfo {
                operands: Arity::AtLeast(3),
                results: Results::FromBody,
                gate: Gate::Prefix(3),
                regions: 1,
                ..plain
            },
            OpKind::ParallelCall => OpInfo {
                operands: Arity::AtLeast(3),
                results: Results::FromBody,
                gate: Gate::Prefix(3),
                attributes: &["callee"],
                ..plain
            },
            OpKind::Return => OpInfo {
                operands: Arity::AtLeast(0),
                results: Results::Fixed(0),
                gate: Gate::None,
                ..plain
            },
            OpKind::Add(_) | OpKind::And | OpKind::Equal(_) | OpKind::Print(_) => plain,
            OpKind::Div(_) => OpInfo {
                results: Results::Fixed(2),
                ..plain
            },
        }
    }

    /// Whether the type parameter, if any, is one this kind is defined for.
    pub fn is_supported(&self) -> bool {
        match self {
            OpKind::Constant(t) | OpKind::Print(t) => t.is_scalar(),
            OpKind::Add(t) => t.is_numeric(),
            OpKind::Equal(t) => matches!(t, Type::I1 | Type::I32 | Type::I64),
            OpKind::Div(t) => t.is_integer(),
            _ => true,
        }
    }

    pub fn name(&self) -> String {
        match self {
            OpKind::Call => "call".into(),
            OpKind::Constant(t) => format!("constant.{}", t),
            OpKind::If => "if".into(),
            OpKind::Cond => "cond".into(),
            OpKind::NewChain => "new.chain".into(),
            OpKind::MergeChains => "merge.chains".into(),
            OpKind::Repeat => "repeat.i32".into(),
            OpKind::ParallelFor => "parallel_for.i32".into(),
            OpKind::ParallelCall => "parallel_call.i32".into(),
            OpKind::Return => "return".into(),
            OpKind::Add(t) => format!("add.{}", t),
            OpKind::And => "and.i1".into(),
            OpKind::Equal(t) => format!("equal.{}", t),
            OpKind::Div(t) => format!("div.{}", t),
            OpKind::Print(t) => format!("print.{}", t),
        }
    }

    pub fn from_name(name: &str) -> Option<OpKind> {
        let kind = match name {
            "call" => OpKind::Call,
            "if" => OpKind::If,
            "cond" => OpKind::Cond,
            "new.chain" => OpKind::NewChain,
            "merge.chains" => OpKind::MergeChains,
            "repeat.i32" => OpKind::Repeat,
            "parallel_for.i32" => OpKind::ParallelFor,
            "parallel_call.i32" => OpKind::ParallelCall,
            "return" => OpKind::Return,
            "and.i1" => OpKind::And,
            _ => {
                let (base, ty) = name.rsplit_once('.')?;
                let ty: Type = ty.parse().ok()?;
                match base {
                    "constant" => OpKind::Constant(ty),
                    "add" => OpKind::Add(ty),
                    "equal" => OpKind::Equal(ty),
                    "div" => OpKind::Div(ty),
                    "print" => OpKind::Print(ty),
                    _ => return None,
                }
            }
        };
        kind.is_supported().then_some(kind)
    }
}

impl Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Symbol(Symbol),
    Literal(Payload),
}

impl Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Symbol(s) => write!(f, "@{}", s),
            Attribute::Literal(p) => write!(f, "{} : {}", p, p.ty()),
        }
    }
}

/// Named attributes of an operation.
///
/// Lookup is by name only; the position an attribute is stored at carries no
/// meaning. Serializers that need a fixed order use [`Attributes::canonical`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes(IndexMap<String, Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Attribute) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Attribute) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.0.get(name)
    }

    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        match self.get(name)? {
            Attribute::Symbol(s) => Some(s),
            Attribute::Literal(_) => None,
        }
    }

    pub fn literal(&self, name: &str) -> Option<&Payload> {
        match self.get(name)? {
            Attribute::Literal(p) => Some(p),
            Attribute::Symbol(_) => None,
        }
    }

    /// Attributes in the kind's canonical order, followed by any others in
    /// insertion order.
    pub fn canonical(&self, kind: &OpKind) -> Vec<(&str, &Attribute)> {
        let order = kind.info().attributes;
        let mut out: Vec<(&str, &Attribute)> = order
            .iter()
            .filter_map(|name| self.0.get_key_value(*name))
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        out.extend(
            self.0
                .iter()
                .filter(|(k, _)| !order.contains(&k.as_str()))
                .map(|(k, v)| (k.as_str(), v)),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn names_round_trip_through_the_registry() {
        for kind in [
            OpKind::Call,
            OpKind::Constant(Type::F64),
            OpKind::If,
            OpKind::Cond,
            OpKind::NewChain,
            OpKind::MergeChains,
            OpKind::Repeat,
            OpKind::ParallelFor,
            OpKind::ParallelCall,
            OpKind::Return,
            OpKind::Add(Type::I64),
            OpKind::And,
            OpKind::Equal(Type::I32),
            OpKind::Div(Type::I32),
            OpKind::Print(Type::I1),
        ] {
            assert_eq!(OpKind::from_name(&kind.name()), Some(kind));
        }
    }

    #[test]
    fn rejects_unsupported_type_parameters() {
        assert_eq!(OpKind::from_name("div.f32"), None);
        assert_eq!(OpKind::from_name("add.i1"), None);
        assert_eq!(OpKind::from_name("print.chain"), None);
        assert_eq!(OpKind::from_name("mul.i32"), None);
    }

    #[test]
    fn cond_callees_serialize_true_first() {
        let attributes = Attributes::new()
            .with("false_fn", Attribute::Symbol(Arc::from("no")))
            .with("true_fn", Attribute::Symbol(Arc::from("yes")))
            .with("note", Attribute::Literal(Payload::I32(1)));
        let names: Vec<_> = attributes
            .canonical(&OpKind::Cond)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["true_fn", "false_fn", "note"]);
    }
}
