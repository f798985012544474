//! Eager, construction-time checks.
//!
//! Every body is checked once before anything runs: registers are defined
//! before use and exactly once, operand and result lists match the kind's
//! signature, callees exist, paired branches agree, and ranges built from
//! constants are valid. The dispatcher relies on these facts and does not
//! re-check them.

use std::collections::HashMap;

use super::op::{OpKind, Results};
use super::types::{join, Signature, Type};
use super::{Body, Operation, Program, Register};
use crate::error::{Error, Result};
use crate::runtime::parallel::check_range;
use crate::runtime::value::Payload;

pub(crate) fn verify(program: &Program) -> Result<()> {
    for (_, body) in program.functions() {
        verify_body(program, body)?;
    }
    Ok(())
}

struct Checker<'p> {
    program: &'p Program,
    body: &'p Body,
    defined: Vec<bool>,
    constants: HashMap<Register, Payload>,
}

fn verify_body(program: &Program, body: &Body) -> Result<()> {
    let operations = program.operations(body);
    let mut checker = Checker {
        program,
        body,
        defined: vec![false; body.registers.len()],
        constants: HashMap::new(),
    };
    if body.registers.len() < body.signature.params.len()
        || body.registers[..body.signature.params.len()] != body.signature.params[..]
    {
        return Err(Error::signature(
            format!("@{}", body.debug_name),
            "argument registers do not match the parameter types",
        ));
    }
    for argument in body.arguments() {
        checker.defined[argument.index()] = true;
    }

    let returns = operations
        .iter()
        .filter(|op| op.kind == OpKind::Return)
        .count();
    if returns != 1 || operations.last().map(|op| &op.kind) != Some(&OpKind::Return) {
        return Err(Error::signature(
            format!("@{}", body.debug_name),
            "body must end with exactly one return",
        ));
    }

    for op in operations {
        checker.operation(op)?;
    }
    Ok(())
}

impl Checker<'_> {
    fn name(&self, op: &Operation) -> String {
        format!("{} in @{}", op.kind, self.body.debug_name)
    }

    fn operand_types(&self, op: &Operation) -> Result<Vec<Type>> {
        op.operands
            .iter()
            .map(|register| match self.body.type_of(*register) {
                Some(ty) if self.defined[register.index()] => Ok(ty.clone()),
                _ => Err(Error::signature(
                    self.name(op),
                    format!("register {} is used before it is defined", register),
                )),
            })
            .collect()
    }

    fn callee(&self, op: &Operation, attribute: &str) -> Result<&'_ Signature> {
        let symbol = op.attributes.symbol(attribute).ok_or_else(|| {
            Error::signature(self.name(op), format!("missing `{}` attribute", attribute))
        })?;
        self.program
            .signature(symbol)
            .ok_or_else(|| Error::UnknownCallee(symbol.clone()))
    }

    fn region(&self, op: &Operation, position: usize) -> Result<&'_ Body> {
        let region = self.program.body(op.regions[position]);
        verify_body(self.program, region)?;
        Ok(region)
    }

    fn operation(&mut self, op: &Operation) -> Result<()> {
        let info = op.kind.info();
        if !op.kind.is_supported() {
            return Err(Error::signature(
                self.name(op),
                "operation is not defined for this type",
            ));
        }
        if !info.operands.accepts(op.operands.len()) {
            return Err(Error::signature(
                self.name(op),
                format!(
                    "expected {} operands, found {}",
                    info.operands,
                    op.operands.len()
                ),
            ));
        }
        if op.regions.len() != info.regions {
            return Err(Error::signature(
                self.name(op),
                format!(
                    "expected {} regions, found {}",
                    info.regions,
                    op.regions.len()
                ),
            ));
        }
        if let Results::Fixed(n) = info.results {
            if op.results.len() != n {
                return Err(Error::signature(
                    self.name(op),
                    format!("expected {} results, found {}", n, op.results.len()),
                ));
            }
        }
        let found = self.operand_types(op)?;
        let (expected, results) = self.expected(op)?;

        if expected.len() != found.len() {
            return Err(Error::signature(
                self.name(op),
                format!(
                    "operands ({}) do not match the expected ({})",
                    join(&found),
                    join(&expected)
                ),
            ));
        }
        // Operands from here on are bound to a callee's declared parameters.
        let callee_args = match op.kind {
            OpKind::Call => Some(0),
            OpKind::Cond => Some(1),
            OpKind::ParallelCall => Some(3),
            _ => None,
        };
        for (position, (expected, found)) in expected.iter().zip(&found).enumerate() {
            if expected == found {
                continue;
            }
            if callee_args.is_some_and(|first| position >= first) {
                return Err(Error::signature(
                    self.name(op),
                    format!(
                        "operand {} is {} but the callee takes {}",
                        position, found, expected
                    ),
                ));
            }
            return Err(Error::type_mismatch(self.name(op), expected, found));
        }

        let declared: Vec<Type> = op
            .results
            .iter()
            .map(|r| self.body.type_of(*r).cloned().unwrap_or(Type::Chain))
            .collect();
        if declared != results {
            return Err(Error::signature(
                self.name(op),
                format!(
                    "results ({}) do not match the expected ({})",
                    join(&declared),
                    join(&results)
                ),
            ));
        }
        for register in &op.results {
            match self.defined.get_mut(register.index()) {
                Some(defined) if !*defined => *defined = true,
                _ => {
                    return Err(Error::signature(
                        self.name(op),
                        format!("register {} is defined twice", register),
                    ))
                }
            }
        }

        if matches!(op.kind, OpKind::ParallelFor | OpKind::ParallelCall) {
            self.static_range(op)?;
        }
        if let (OpKind::Constant(_), Some(value)) = (&op.kind, op.attributes.literal("value")) {
            self.constants.insert(op.results[0], value.clone());
        }
        Ok(())
    }

    /// Expected operand types and result types of `op`.
    fn expected(&self, op: &Operation) -> Result<(Vec<Type>, Vec<Type>)> {
        let two = |t: &Type| vec![t.clone(), t.clone()];
        Ok(match &op.kind {
            OpKind::Call => {
                let callee = self.callee(op, "callee")?;
                (callee.params.clone(), callee.results.clone())
            }
            OpKind::Constant(ty) => {
                let value = op.attributes.literal("value").ok_or_else(|| {
                    Error::signature(self.name(op), "missing `value` attribute")
                })?;
                if &value.ty() != ty {
                    return Err(Error::type_mismatch(self.name(op), ty, &value.ty()));
                }
                (vec![], vec![ty.clone()])
            }
            OpKind::If => {
                let then_region = self.region(op, 0)?;
                let else_region = self.region(op, 1)?;
                if then_region.signature != else_region.signature {
                    return Err(Error::signature(
                        self.name(op),
                        format!(
                            "branches disagree: then {} vs else {}",
                            then_region.signature, else_region.signature
                        ),
                    ));
                }
                let sig = &then_region.signature;
                ([vec![Type::I1], sig.params.clone()].concat(), sig.results.clone())
            }
            OpKind::Cond => {
                let true_fn = self.callee(op, "true_fn")?;
                let false_fn = self.callee(op, "false_fn")?;
                if true_fn != false_fn {
                    return Err(Error::signature(
                        self.name(op),
                        format!(
                            "branches disagree: true {} vs false {}",
                            true_fn, false_fn
                        ),
                    ));
                }
                (
                    [vec![Type::I1], true_fn.params.clone()].concat(),
                    true_fn.results.clone(),
                )
            }
            OpKind::NewChain => (vec![], vec![Type::Chain]),
            OpKind::MergeChains => (vec![Type::Chain; op.operands.len()], vec![Type::Chain]),
            OpKind::Repeat => {
                let sig = &self.region(op, 0)?.signature;
                if sig.params != sig.results {
                    return Err(Error::signature(
                        self.name(op),
                        format!("loop body {} must return its argument types", sig),
                    ));
                }
                ([vec![Type::I32], sig.params.clone()].concat(), sig.results.clone())
            }
            OpKind::ParallelFor => {
                let sig = &self.region(op, 0)?.signature;
                self.block_signature(op, sig)?
            }
            OpKind::ParallelCall => {
                let sig = self.callee(op, "callee")?;
                self.block_signature(op, sig)?
            }
            OpKind::Return => (self.body.signature.results.clone(), vec![]),
            OpKind::Add(ty) => (two(ty), vec![ty.clone()]),
            OpKind::And => (two(&Type::I1), vec![Type::I1]),
            OpKind::Equal(ty) => (two(ty), vec![Type::I1]),
            OpKind::Div(ty) => (two(ty), two(ty)),
            OpKind::Print(ty) => (vec![ty.clone(), Type::Chain], vec![Type::Chain]),
        })
    }

    /// A block body takes `(block_start, block_end, shared...)` and returns
    /// nothing or a single chain.
    fn block_signature(&self, op: &Operation, sig: &Signature) -> Result<(Vec<Type>, Vec<Type>)> {
        if sig.params.len() < 2 || sig.params[..2] != [Type::I32, Type::I32] {
            return Err(Error::signature(
                self.name(op),
                format!("block body {} must start with (i32, i32)", sig),
            ));
        }
        if !(sig.results.is_empty() || sig.results == [Type::Chain]) {
            return Err(Error::signature(
                self.name(op),
                format!("block body {} must return nothing or a chain", sig),
            ));
        }
        Ok((
            [vec![Type::I32; 3], sig.params[2..].to_vec()].concat(),
            sig.results.clone(),
        ))
    }

    fn static_range(&self, op: &Operation) -> Result<()> {
        let constant = |i: usize| {
            self.constants
                .get(&op.operands[i])
                .and_then(Payload::as_i64)
        };
        if let (Some(start), Some(end), Some(block_size)) = (constant(0), constant(1), constant(2))
        {
            check_range(start, end, block_size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::program::types::{Signature, Type};
    use crate::program::ProgramBuilder;
    use crate::runtime::value::Payload;

    fn unary() -> Signature {
        Signature::new([Type::I32], [Type::I32])
    }

    #[test]
    fn unknown_callee() {
        let mut builder = ProgramBuilder::new();
        builder.function("main", unary(), |f| {
            let r = f.call("missing", &[f.argument(0)], &[Type::I32]);
            f.ret(&r);
        });
        assert!(matches!(builder.build(), Err(Error::UnknownCallee(name)) if &*name == "missing"));
    }

    #[test]
    fn call_result_count_must_match_callee() {
        let mut builder = ProgramBuilder::new();
        builder.function("id", unary(), |f| f.ret(&[f.argument(0)]));
        builder.function("main", Signature::new([Type::I32], []), |f| {
            f.call("id", &[f.argument(0)], &[]);
            f.ret(&[]);
        });
        assert!(matches!(
            builder.build(),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn operand_type_mismatch() {
        let mut builder = ProgramBuilder::new();
        builder.function("main", unary(), |f| {
            let wide = f.constant(Payload::I64(1));
            let sum = f.add(f.argument(0), wide);
            f.ret(&[sum]);
        });
        assert!(matches!(
            builder.build(),
            Err(Error::TypeMismatch {
                expected: Type::I32,
                found: Type::I64,
                ..
            })
        ));
    }

    #[test]
    fn callee_argument_of_the_wrong_type() {
        let mut builder = ProgramBuilder::new();
        builder.function("id", unary(), |f| f.ret(&[f.argument(0)]));
        builder.function("main", Signature::new([], [Type::I32]), |f| {
            let wide = f.constant(Payload::I64(1));
            let r = f.call("id", &[wide], &[Type::I32]);
            f.ret(&r);
        });
        assert!(matches!(
            builder.build(),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn cond_argument_of_the_wrong_type() {
        let mut builder = ProgramBuilder::new();
        builder.function("yes", unary(), |f| f.ret(&[f.argument(0)]));
        builder.function("no", unary(), |f| f.ret(&[f.argument(0)]));
        builder.function("main", Signature::new([Type::I1], [Type::I32]), |f| {
            let wide = f.constant(Payload::I64(1));
            let r = f.cond(f.argument(0), "yes", "no", &[wide], &[Type::I32]);
            f.ret(&r);
        });
        assert!(matches!(
            builder.build(),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn shared_block_argument_of_the_wrong_type() {
        let mut builder = ProgramBuilder::new();
        builder.function(
            "block",
            Signature::new([Type::I32, Type::I32, Type::I32], []),
            |f| f.ret(&[]),
        );
        builder.function("main", Signature::new([Type::I32, Type::I64], []), |f| {
            let (x, wide) = (f.argument(0), f.argument(1));
            f.parallel_call([x, x, x], &[wide], "block", &[]);
            f.ret(&[]);
        });
        assert!(matches!(
            builder.build(),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn cond_condition_must_be_boolean() {
        let mut builder = ProgramBuilder::new();
        builder.function("yes", unary(), |f| f.ret(&[f.argument(0)]));
        builder.function("no", unary(), |f| f.ret(&[f.argument(0)]));
        builder.function("main", Signature::new([Type::I32], [Type::I32]), |f| {
            let x = f.argument(0);
            let r = f.cond(x, "yes", "no", &[x], &[Type::I32]);
            f.ret(&r);
        });
        assert!(matches!(
            builder.build(),
            Err(Error::TypeMismatch {
                expected: Type::I1,
                found: Type::I32,
                ..
            })
        ));
    }

    #[test]
    fn if_branches_must_agree() {
        let mut builder = ProgramBuilder::new();
        builder.function("main", Signature::new([Type::I1], [Type::I32]), |f| {
            let then_region = f.region(Signature::new([], [Type::I32]), |r| {
                let c = r.constant(Payload::I32(1));
                r.ret(&[c]);
            });
            let else_region = f.region(Signature::new([], [Type::I64]), |r| {
                let c = r.constant(Payload::I64(1));
                r.ret(&[c]);
            });
            let results = f.if_(f.argument(0), &[], then_region, else_region);
            f.ret(&results);
        });
        assert!(matches!(
            builder.build(),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn cond_callees_must_agree() {
        let mut builder = ProgramBuilder::new();
        builder.function("yes", unary(), |f| f.ret(&[f.argument(0)]));
        builder.function("no", Signature::new([Type::I64], [Type::I32]), |f| {
            let c = f.constant(Payload::I32(0));
            f.ret(&[c]);
        });
        builder.function("main", Signature::new([Type::I1, Type::I32], [Type::I32]), |f| {
            let r = f.cond(f.argument(0), "yes", "no", &[f.argument(1)], &[Type::I32]);
            f.ret(&r);
        });
        assert!(matches!(
            builder.build(),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn missing_return() {
        let mut builder = ProgramBuilder::new();
        builder.function("main", Signature::default(), |f| {
            f.new_chain();
        });
        assert!(matches!(
            builder.build(),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn return_types_must_match_signature() {
        let mut builder = ProgramBuilder::new();
        builder.function("main", Signature::new([], [Type::I32]), |f| {
            let c = f.new_chain();
            f.ret(&[c]);
        });
        assert!(matches!(
            builder.build(),
            Err(Error::TypeMismatch {
                expected: Type::I32,
                found: Type::Chain,
                ..
            })
        ));
    }

    #[test]
    fn constant_range_with_zero_block_is_rejected() {
        let mut builder = ProgramBuilder::new();
        builder.function("main", Signature::default(), |f| {
            let start = f.constant(Payload::I32(0));
            let end = f.constant(Payload::I32(10));
            let block = f.constant(Payload::I32(0));
            let body = f.region(Signature::new([Type::I32, Type::I32], []), |r| r.ret(&[]));
            f.parallel_for([start, end, block], &[], body);
            f.ret(&[]);
        });
        assert_eq!(
            builder.build().err(),
            Some(Error::InvalidRange {
                start: 0,
                end: 10,
                block_size: 0
            })
        );
    }

    #[test]
    fn block_body_must_take_a_range() {
        let mut builder = ProgramBuilder::new();
        builder.function("main", Signature::new([Type::I32], []), |f| {
            let x = f.argument(0);
            let body = f.region(Signature::new([Type::I32], []), |r| r.ret(&[]));
            f.parallel_for([x, x, x], &[], body);
            f.ret(&[]);
        });
        assert!(matches!(
            builder.build(),
            Err(Error::SignatureMismatch { .. })
        ));
    }
}
