//! Grammar entries: the building blocks of an instruction variant.

use super::text_match::TextMatcher;
use crate::bytecode::Instruction;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// Logical wrapper applied to a list of sub-entries at a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombinatorMode {
    All,
    Any,
    None,
}

impl CombinatorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CombinatorMode::All => "ALL",
            CombinatorMode::Any => "ANY",
            CombinatorMode::None => "NONE",
        }
    }
}

impl fmt::Display for CombinatorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombinatorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(CombinatorMode::All),
            "ANY" => Ok(CombinatorMode::Any),
            "NONE" => Ok(CombinatorMode::None),
            other => Err(other.to_string()),
        }
    }
}

/// Repeat bound of a wildcard run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunBound {
    Count(NonZeroU32),
    Unbounded,
}

impl RunBound {
    /// Catch-up budget this bound grants to the matcher.
    pub fn limit(&self) -> usize {
        match self {
            RunBound::Count(n) => n.get() as usize,
            RunBound::Unbounded => usize::MAX,
        }
    }
}

/// Opcode clause plus optional operand clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralInstruction {
    pub opcode: TextMatcher,
    pub operand: Option<TextMatcher>,
}

impl LiteralInstruction {
    pub fn new(opcode: TextMatcher, operand: Option<TextMatcher>) -> Self {
        Self { opcode, operand }
    }

    /// A missing operand clause, or an instruction without renderable
    /// operand text, passes the operand check.
    pub fn matches(&self, instruction: &Instruction) -> bool {
        if !self.opcode.matches(Some(instruction.opcode_name())) {
            return false;
        }
        match (&self.operand, instruction.operand.as_deref()) {
            (Some(matcher), Some(text)) => matcher.matches(Some(text)),
            _ => true,
        }
    }
}

/// One position of an instruction variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Literal(LiteralInstruction),
    /// Absorbs at most one instruction
    Wildcard,
    /// Absorbs up to the bound's count of consecutive instructions
    WildcardRun(RunBound),
    Combinator { mode: CombinatorMode, entries: Vec<Entry> },
}

impl Entry {
    pub fn literal(opcode: TextMatcher) -> Self {
        Entry::Literal(LiteralInstruction::new(opcode, None))
    }

    pub fn literal_with_operand(opcode: TextMatcher, operand: TextMatcher) -> Self {
        Entry::Literal(LiteralInstruction::new(opcode, Some(operand)))
    }

    /// Bounded run; a zero count is rejected.
    pub fn run(count: u32) -> Option<Self> {
        NonZeroU32::new(count).map(|n| Entry::WildcardRun(RunBound::Count(n)))
    }

    pub fn unbounded_run() -> Self {
        Entry::WildcardRun(RunBound::Unbounded)
    }

    pub fn all(entries: Vec<Entry>) -> Self {
        Entry::Combinator { mode: CombinatorMode::All, entries }
    }

    pub fn any(entries: Vec<Entry>) -> Self {
        Entry::Combinator { mode: CombinatorMode::Any, entries }
    }

    pub fn none(entries: Vec<Entry>) -> Self {
        Entry::Combinator { mode: CombinatorMode::None, entries }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Entry::Wildcard | Entry::WildcardRun(_))
    }

    /// Evaluate this entry against a single instruction. Wildcards match
    /// unconditionally; combinators evaluate every sub-entry here.
    pub fn matches(&self, instruction: &Instruction) -> bool {
        match self {
            Entry::Literal(literal) => literal.matches(instruction),
            Entry::Wildcard | Entry::WildcardRun(_) => true,
            Entry::Combinator { mode, entries } => match mode {
                CombinatorMode::All => entries.iter().all(|e| e.matches(instruction)),
                CombinatorMode::Any => entries.iter().any(|e| e.matches(instruction)),
                CombinatorMode::None => !entries.iter().any(|e| e.matches(instruction)),
            },
        }
    }
}
