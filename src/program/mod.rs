//! Static program representation.
//!
//! A [`Program`] is a table of named functions whose bodies, along with every
//! nested region, live in one [`Arena`]. Bodies are flat lists of
//! [`Operation`]s over numbered [`Register`]s and end in a `return`. Regions are
//! isolated: they see only their own arguments, never the enclosing body's
//! registers.
//!
//! Programs are immutable once built and are shared between all invocations.

pub mod builder;
pub mod op;
pub mod types;
pub mod verify;

use std::fmt::{self, Display};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::runtime::arena::{Arena, Index};
use op::{Attributes, OpKind};
use types::{Signature, Symbol, Type};

pub use builder::{BodyBuilder, ProgramBuilder};

/// A body-local SSA slot. Arguments take the first registers, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(pub u32);

impl Register {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A function body or an inline region.
#[derive(Clone, Debug)]
pub struct Body {
    pub debug_name: Arc<str>,
    pub signature: Signature,
    /// Type of every register; the first `signature.params.len()` are arguments.
    pub registers: Vec<Type>,
    pub operations: Index<[Operation]>,
}

impl Body {
    pub fn arguments(&self) -> impl Iterator<Item = Register> {
        (0..self.signature.params.len() as u32).map(Register)
    }

    pub fn type_of(&self, register: Register) -> Option<&Type> {
        self.registers.get(register.index())
    }
}

#[derive(Clone, Debug)]
pub struct Operation {
    pub kind: OpKind,
    pub operands: Vec<Register>,
    pub results: Vec<Register>,
    pub attributes: Attributes,
    pub regions: Vec<Index<Body>>,
}

#[derive(Debug)]
pub struct Program {
    arena: Arena,
    functions: IndexMap<Symbol, Index<Body>>,
}

impl Program {
    pub(crate) fn from_parts(arena: Arena, functions: IndexMap<Symbol, Index<Body>>) -> Self {
        Self { arena, functions }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn body(&self, index: Index<Body>) -> &Body {
        self.arena.get(index)
    }

    pub fn operations(&self, body: &Body) -> &[Operation] {
        self.arena.get(body.operations)
    }

    pub fn function(&self, name: &str) -> Option<Index<Body>> {
        self.functions.get(name).copied()
    }

    pub fn signature(&self, name: &str) -> Option<&Signature> {
        self.function(name).map(|index| &self.body(index).signature)
    }

    /// Functions in definition order.
    pub fn functions(&self) -> impl Iterator<Item = (&Symbol, &Body)> {
        self.functions
            .iter()
            .map(|(name, index)| (name, self.arena.get(*index)))
    }
}
