use std::sync::Arc;

use indexmap::IndexMap;

use super::op::{Attribute, Attributes, OpKind};
use super::types::{Signature, Symbol, Type};
use super::{verify, Body, Operation, Program, Register};
use crate::error::{Error, Result};
use crate::runtime::arena::{Arena, Index};
use crate::runtime::value::Payload;

/// Collects function definitions and turns them into a verified [`Program`].
///
/// Callees are referenced by name and may be defined in any order, so
/// nothing is checked until [`ProgramBuilder::build`].
#[derive(Default)]
pub struct ProgramBuilder {
    arena: Arena,
    functions: IndexMap<Symbol, Index<Body>>,
    duplicate: Option<Symbol>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(
        &mut self,
        name: &str,
        signature: Signature,
        build: impl FnOnce(&mut BodyBuilder),
    ) -> &mut Self {
        let name: Symbol = Arc::from(name);
        let mut body = BodyBuilder::new(&mut self.arena, name.clone(), signature);
        build(&mut body);
        let index = body.finish();
        if self.functions.insert(name.clone(), index).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(name);
        }
        self
    }

    pub fn build(self) -> Result<Program> {
        if let Some(name) = self.duplicate {
            return Err(Error::signature(
                format!("@{}", name),
                "function is defined more than once",
            ));
        }
        let program = Program::from_parts(self.arena, self.functions);
        verify::verify(&program)?;
        Ok(program)
    }
}

/// Appends operations to one body. Result registers are allocated here, with
/// types taken from the operation kind, the attached region, or the caller.
pub struct BodyBuilder<'a> {
    arena: &'a mut Arena,
    name: Arc<str>,
    signature: Signature,
    registers: Vec<Type>,
    operations: Vec<Operation>,
    regions: usize,
}

impl<'a> BodyBuilder<'a> {
    fn new(arena: &'a mut Arena, name: Arc<str>, signature: Signature) -> Self {
        let registers = signature.params.clone();
        Self {
            arena,
            name,
            signature,
            registers,
            operations: vec![],
            regions: 0,
        }
    }

    fn finish(self) -> Index<Body> {
        let operations = self.arena.alloc_operations(self.operations);
        self.arena.alloc(Body {
            debug_name: self.name,
            signature: self.signature,
            registers: self.registers,
            operations,
        })
    }

    pub fn argument(&self, position: usize) -> Register {
        Register(position as u32)
    }

    pub fn arguments(&self) -> Vec<Register> {
        (0..self.signature.params.len() as u32).map(Register).collect()
    }

    pub fn type_of(&self, register: Register) -> Option<&Type> {
        self.registers.get(register.index())
    }

    fn fresh(&mut self, ty: Type) -> Register {
        self.registers.push(ty);
        Register(self.registers.len() as u32 - 1)
    }

    /// Append an operation of any kind. The typed helpers below all go
    /// through here.
    pub fn op(
        &mut self,
        kind: OpKind,
        operands: &[Register],
        attributes: Attributes,
        regions: Vec<Index<Body>>,
        result_types: &[Type],
    ) -> Vec<Register> {
        let results = result_types
            .iter()
            .map(|ty| self.fresh(ty.clone()))
            .collect::<Vec<_>>();
        self.operations.push(Operation {
            kind,
            operands: operands.to_vec(),
            results: results.clone(),
            attributes,
            regions,
        });
        results
    }

    fn single(&mut self, kind: OpKind, operands: &[Register], ty: Type) -> Register {
        self.op(kind, operands, Attributes::new(), vec![], &[ty])[0]
    }

    fn operand_type(&self, register: Register) -> Type {
        self.type_of(register).cloned().unwrap_or(Type::I32)
    }

    /// Build an inline region to attach to a control-flow operation.
    pub fn region(
        &mut self,
        signature: Signature,
        build: impl FnOnce(&mut BodyBuilder),
    ) -> Index<Body> {
        self.regions += 1;
        let name = Arc::from(format!("{}#{}", self.name, self.regions));
        let mut region = BodyBuilder::new(&mut *self.arena, name, signature);
        build(&mut region);
        region.finish()
    }

    fn region_results(&self, region: Index<Body>) -> Vec<Type> {
        self.arena.get(region).signature.results.clone()
    }

    pub fn constant(&mut self, value: Payload) -> Register {
        let ty = value.ty();
        self.op(
            OpKind::Constant(ty.clone()),
            &[],
            Attributes::new().with("value", Attribute::Literal(value)),
            vec![],
            &[ty],
        )[0]
    }

    pub fn new_chain(&mut self) -> Register {
        self.single(OpKind::NewChain, &[], Type::Chain)
    }

    pub fn merge_chains(&mut self, chains: &[Register]) -> Register {
        self.single(OpKind::MergeChains, chains, Type::Chain)
    }

    pub fn call(&mut self, callee: &str, args: &[Register], results: &[Type]) -> Vec<Register> {
        self.op(
            OpKind::Call,
            args,
            Attributes::new().with("callee", Attribute::Symbol(Arc::from(callee))),
            vec![],
            results,
        )
    }

    pub fn if_(
        &mut self,
        condition: Register,
        args: &[Register],
        then_region: Index<Body>,
        else_region: Index<Body>,
    ) -> Vec<Register> {
        let results = self.region_results(then_region);
        let operands = [&[condition][..], args].concat();
        self.op(
            OpKind::If,
            &operands,
            Attributes::new(),
            vec![then_region, else_region],
            &results,
        )
    }

    pub fn cond(
        &mut self,
        condition: Register,
        true_fn: &str,
        false_fn: &str,
        args: &[Register],
        results: &[Type],
    ) -> Vec<Register> {
        let operands = [&[condition][..], args].concat();
        self.op(
            OpKind::Cond,
            &operands,
            Attributes::new()
                .with("true_fn", Attribute::Symbol(Arc::from(true_fn)))
                .with("false_fn", Attribute::Symbol(Arc::from(false_fn))),
            vec![],
            results,
        )
    }

    pub fn repeat(
        &mut self,
        trip_count: Register,
        carried: &[Register],
        body: Index<Body>,
    ) -> Vec<Register> {
        let results = self.region_results(body);
        let operands = [&[trip_count][..], carried].concat();
        self.op(
            OpKind::Repeat,
            &operands,
            Attributes::new(),
            vec![body],
            &results,
        )
    }

    pub fn parallel_for(
        &mut self,
        range: [Register; 3],
        shared: &[Register],
        body: Index<Body>,
    ) -> Vec<Register> {
        let results = self.region_results(body);
        let operands = [&range[..], shared].concat();
        self.op(
            OpKind::ParallelFor,
            &operands,
            Attributes::new(),
            vec![body],
            &results,
        )
    }

    pub fn parallel_call(
        &mut self,
        range: [Register; 3],
        shared: &[Register],
        callee: &str,
        results: &[Type],
    ) -> Vec<Register> {
        let operands = [&range[..], shared].concat();
        self.op(
            OpKind::ParallelCall,
            &operands,
            Attributes::new().with("callee", Attribute::Symbol(Arc::from(callee))),
            vec![],
            results,
        )
    }

    pub fn add(&mut self, a: Register, b: Register) -> Register {
        let ty = self.operand_type(a);
        self.single(OpKind::Add(ty.clone()), &[a, b], ty)
    }

    pub fn and(&mut self, a: Register, b: Register) -> Register {
        self.single(OpKind::And, &[a, b], Type::I1)
    }

    pub fn equal(&mut self, a: Register, b: Register) -> Register {
        let ty = self.operand_type(a);
        self.single(OpKind::Equal(ty), &[a, b], Type::I1)
    }

    /// Quotient and remainder.
    pub fn div(&mut self, a: Register, b: Register) -> (Register, Register) {
        let ty = self.operand_type(a);
        let results = self.op(
            OpKind::Div(ty.clone()),
            &[a, b],
            Attributes::new(),
            vec![],
            &[ty.clone(), ty],
        );
        (results[0], results[1])
    }

    pub fn print(&mut self, value: Register, chain: Register) -> Register {
        let ty = self.operand_type(value);
        self.single(OpKind::Print(ty), &[value, chain], Type::Chain)
    }

    pub fn ret(&mut self, values: &[Register]) {
        self.op(OpKind::Return, values, Attributes::new(), vec![], &[]);
    }
}
