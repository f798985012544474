//! JSON program documents.
//!
//! A document lists functions; each body names its argument registers and
//! lists operations by catalogue name, with operands and results referring to
//! registers by name. Attributes are an ordered list of `[name, value]` pairs.
//! Their order carries no meaning when reading; [`encode`] always writes them
//! in each kind's canonical order (`true_fn` before `false_fn` for `cond`).
//!
//! ```json
//! { "functions": [ {
//!     "name": "main", "params": [], "results": ["i32"],
//!     "body": { "args": [], "ops": [
//!         { "results": ["%x"], "op": "constant.i32",
//!           "attributes": [["value", { "literal": { "type": "i32", "value": 7 } }]],
//!           "result_types": ["i32"] },
//!         { "op": "return", "operands": ["%x"] } ] } } ] }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error;
use crate::program::op::{Attribute, Attributes, OpKind};
use crate::program::types::{Signature, Type};
use crate::program::{Body, BodyBuilder, Program, ProgramBuilder, Register};
use crate::runtime::arena::Index;
use crate::runtime::value::Payload;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub functions: Vec<FunctionDoc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDoc {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub results: Vec<String>,
    pub body: BodyDoc,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyDoc {
    #[serde(default)]
    pub args: Vec<String>,
    pub ops: Vec<OpDoc>,
}

/// An inline region: a body with its own signature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionDoc {
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub results: Vec<String>,
    #[serde(flatten)]
    pub body: BodyDoc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpDoc {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<String>,
    pub op: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, AttributeDoc)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<RegionDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result_types: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeDoc {
    Symbol(String),
    Literal {
        #[serde(rename = "type")]
        ty: String,
        value: serde_json::Value,
    },
}

#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("failed to read `{path}`: {message}")]
    #[diagnostic(code(hostflow::load::io))]
    Io { path: String, message: String },

    #[error("malformed program document: {0}")]
    #[diagnostic(code(hostflow::load::json))]
    Json(#[from] serde_json::Error),

    #[error("unknown operation `{0}`")]
    #[diagnostic(
        code(hostflow::load::unknown_op),
        help("operations are named like `add.i32` or `parallel_for.i32`")
    )]
    UnknownOp(String),

    #[error("in @{function}: {message}")]
    #[diagnostic(code(hostflow::load::bad_type))]
    BadType { function: String, message: String },

    #[error("in @{function}: register `{name}` is not defined")]
    #[diagnostic(code(hostflow::load::unknown_register))]
    UnknownRegister { function: String, name: String },

    #[error("in @{function}: bad attribute `{name}` on `{op}`: {detail}")]
    #[diagnostic(code(hostflow::load::attribute))]
    Attribute {
        function: String,
        op: String,
        name: String,
        detail: String,
    },

    #[error("in @{function}: {detail}")]
    #[diagnostic(code(hostflow::load::shape))]
    Shape { function: String, detail: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Program(#[from] error::Error),
}

pub fn load(path: &Path) -> Result<Program, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse(&text)
}

pub fn parse(text: &str) -> Result<Program, LoadError> {
    let document: Document = serde_json::from_str(text)?;
    decode(&document)
}

/// Build and verify the program a document describes.
pub fn decode(document: &Document) -> Result<Program, LoadError> {
    let mut builder = ProgramBuilder::new();
    for function in &document.functions {
        let signature = Signature::new(
            types(&function.name, &function.params)?,
            types(&function.name, &function.results)?,
        );
        let mut failure = None;
        builder.function(&function.name, signature, |body| {
            if let Err(error) = Decoder::new(&function.name).body(body, &function.body) {
                failure = Some(error);
            }
        });
        if let Some(error) = failure {
            return Err(error);
        }
    }
    Ok(builder.build()?)
}

fn types(function: &str, names: &[String]) -> Result<Vec<Type>, LoadError> {
    names
        .iter()
        .map(|name| {
            name.parse().map_err(|message| LoadError::BadType {
                function: function.to_owned(),
                message,
            })
        })
        .collect()
}

struct Decoder<'d> {
    function: &'d str,
    names: HashMap<&'d str, Register>,
}

impl<'d> Decoder<'d> {
    fn new(function: &'d str) -> Self {
        Self {
            function,
            names: HashMap::new(),
        }
    }

    fn shape(&self, detail: String) -> LoadError {
        LoadError::Shape {
            function: self.function.to_owned(),
            detail,
        }
    }

    fn register(&self, name: &str) -> Result<Register, LoadError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| LoadError::UnknownRegister {
                function: self.function.to_owned(),
                name: name.to_owned(),
            })
    }

    fn body(mut self, builder: &mut BodyBuilder, doc: &'d BodyDoc) -> Result<(), LoadError> {
        let arguments = builder.arguments();
        if doc.args.len() != arguments.len() {
            return Err(self.shape(format!(
                "{} argument names for {} parameters",
                doc.args.len(),
                arguments.len()
            )));
        }
        for (name, register) in doc.args.iter().zip(arguments) {
            self.names.insert(name, register);
        }
        for op in &doc.ops {
            self.operation(builder, op)?;
        }
        Ok(())
    }

    fn operation(&mut self, builder: &mut BodyBuilder, op: &'d OpDoc) -> Result<(), LoadError> {
        let kind = OpKind::from_name(&op.op).ok_or_else(|| LoadError::UnknownOp(op.op.clone()))?;
        let operands = op
            .operands
            .iter()
            .map(|name| self.register(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut attributes = Attributes::new();
        for (name, value) in &op.attributes {
            attributes.insert(name.clone(), self.attribute(&op.op, name, value)?);
        }

        let mut regions = Vec::with_capacity(op.regions.len());
        for region in &op.regions {
            regions.push(self.region(builder, region)?);
        }

        let result_types = types(self.function, &op.result_types)?;
        if result_types.len() != op.results.len() {
            return Err(self.shape(format!(
                "`{}` names {} results but gives {} result types",
                op.op,
                op.results.len(),
                result_types.len()
            )));
        }
        let results = builder.op(kind, &operands, attributes, regions, &result_types);
        for (name, register) in op.results.iter().zip(results) {
            if self.names.insert(name, register).is_some() {
                return Err(self.shape(format!("register `{}` is defined twice", name)));
            }
        }
        Ok(())
    }

    fn attribute(
        &self,
        op: &str,
        name: &str,
        value: &AttributeDoc,
    ) -> Result<Attribute, LoadError> {
        let bad = |detail: String| LoadError::Attribute {
            function: self.function.to_owned(),
            op: op.to_owned(),
            name: name.to_owned(),
            detail,
        };
        match value {
            AttributeDoc::Symbol(symbol) => Ok(Attribute::Symbol(Arc::from(symbol.as_str()))),
            AttributeDoc::Literal { ty, value } => {
                let ty: Type = ty.parse().map_err(bad)?;
                let text = match value {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                Payload::parse_literal(&ty, &text)
                    .map(Attribute::Literal)
                    .map_err(bad)
            }
        }
    }

    fn region(&self, builder: &mut BodyBuilder, doc: &RegionDoc) -> Result<Index<Body>, LoadError> {
        let signature = Signature::new(
            types(self.function, &doc.params)?,
            types(self.function, &doc.results)?,
        );
        let mut failure = None;
        let index = builder.region(signature, |region| {
            if let Err(error) = Decoder::new(self.function).body(region, &doc.body) {
                failure = Some(error);
            }
        });
        match failure {
            Some(error) => Err(error),
            None => Ok(index),
        }
    }
}

/// Describe a program as a document, with attributes in canonical order.
pub fn encode(program: &Program) -> Document {
    Document {
        functions: program
            .functions()
            .map(|(name, body)| FunctionDoc {
                name: name.to_string(),
                params: type_names(&body.signature.params),
                results: type_names(&body.signature.results),
                body: encode_body(program, body),
            })
            .collect(),
    }
}

pub fn to_string(program: &Program) -> String {
    // A document holds only strings, lists and JSON values; it always serializes.
    serde_json::to_string_pretty(&encode(program)).unwrap_or_default()
}

fn type_names(types: &[Type]) -> Vec<String> {
    types.iter().map(Type::to_string).collect()
}

fn register_names(registers: &[Register]) -> Vec<String> {
    registers.iter().map(Register::to_string).collect()
}

fn encode_body(program: &Program, body: &Body) -> BodyDoc {
    BodyDoc {
        args: body.arguments().map(|r| r.to_string()).collect(),
        ops: program
            .operations(body)
            .iter()
            .map(|op| OpDoc {
                results: register_names(&op.results),
                op: op.kind.name(),
                operands: register_names(&op.operands),
                attributes: op
                    .attributes
                    .canonical(&op.kind)
                    .into_iter()
                    .map(|(name, value)| (name.to_owned(), encode_attribute(value)))
                    .collect(),
                regions: op
                    .regions
                    .iter()
                    .map(|index| {
                        let region = program.body(*index);
                        RegionDoc {
                            params: type_names(&region.signature.params),
                            results: type_names(&region.signature.results),
                            body: encode_body(program, region),
                        }
                    })
                    .collect(),
                result_types: op
                    .results
                    .iter()
                    .filter_map(|r| body.type_of(*r))
                    .map(Type::to_string)
                    .collect(),
            })
            .collect(),
    }
}

fn encode_attribute(attribute: &Attribute) -> AttributeDoc {
    match attribute {
        Attribute::Symbol(symbol) => AttributeDoc::Symbol(symbol.to_string()),
        Attribute::Literal(payload) => AttributeDoc::Literal {
            ty: payload.ty().to_string(),
            value: match payload {
                Payload::Bool(b) => serde_json::Value::from(*b),
                Payload::I32(i) => serde_json::Value::from(*i),
                Payload::I64(i) => serde_json::Value::from(*i),
                other => serde_json::Value::from(other.to_string()),
            },
        },
    }
}
