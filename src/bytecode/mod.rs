//! Minimal JVM bytecode model.
//!
//! The matcher only needs an ordered instruction list per method, where each
//! node carries an opcode (negative for pseudo-instructions such as labels and
//! line markers) and an optional rendered operand text. This module provides
//! that model, a [`ClassParser`] seam for plugging in a class-file decoder,
//! the default decoder ([`BytecodeParser`]) and a small class-file writer used
//! to build fixtures.

pub mod opcodes;
mod parsing;
mod writer;

pub use parsing::BytecodeParser;
pub use writer::{ClassWriter, MethodWriter};

use std::fmt;

/// One node of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: i16,
    pub operand: Option<String>,
}

impl Instruction {
    pub fn new(opcode: u8, operand: Option<String>) -> Self {
        Self { opcode: i16::from(opcode), operand }
    }

    /// Instruction from its mnemonic. Returns `None` for unknown mnemonics.
    pub fn named(mnemonic: &str, operand: Option<&str>) -> Option<Self> {
        opcodes::by_name(mnemonic).map(|opcode| Self {
            opcode,
            operand: operand.map(str::to_string),
        })
    }

    pub fn label(offset: usize) -> Self {
        Self { opcode: opcodes::LABEL, operand: Some(format!("L{}", offset)) }
    }

    pub fn line(number: u16) -> Self {
        Self { opcode: opcodes::LINE, operand: Some(number.to_string()) }
    }

    pub fn opcode_name(&self) -> &'static str {
        opcodes::name(self.opcode)
    }

    /// Labels, line markers and other non-executable nodes.
    pub fn is_pseudo(&self) -> bool {
        self.opcode < 0
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Some(operand) => write!(f, "{} {}", self.opcode_name(), operand),
            None => f.write_str(self.opcode_name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodModel {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    /// Empty for abstract and native methods
    pub instructions: Vec<Instruction>,
}

impl MethodModel {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, descriptor: D, instructions: Vec<Instruction>) -> Self {
        Self { name: name.into(), descriptor: descriptor.into(), access_flags: 0, instructions }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassModel {
    /// Internal name, e.g. `com/example/Main`
    pub name: String,
    pub super_name: Option<String>,
    pub major_version: u16,
    pub methods: Vec<MethodModel>,
}

/// Decodes raw class bytes into the instruction model.
pub trait ClassParser: Send + Sync {
    fn parse(&self, data: &[u8]) -> anyhow::Result<ClassModel>;
}

#[cfg(test)]
mod tests;
