//! Compact textual encoding of grammar entries.
//!
//! | Encoding                      | Entry                        |
//! |-------------------------------|------------------------------|
//! | `"*"`                         | single wildcard              |
//! | `"**"`                        | unbounded wildcard run       |
//! | `"*N"`                        | wildcard run bounded to N    |
//! | `{"op": "MODE text"}`         | literal, opcode clause only  |
//! | `{"op": "...", "args": "..."}`| literal with operand clause  |
//! | `{"ALL" / "ANY" / "NONE": []}`| combinator over sub-entries  |
//!
//! Decoding goes through [`RawEntry`], the serde mirror of the encoding, and
//! then compiles text matchers against the loader's [`RegexCache`].

use super::entry::{CombinatorMode, Entry, LiteralInstruction, RunBound};
use super::text_match::{RegexCache, TextMatcher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use thiserror::Error;

/// Serde shape of one encoded grammar entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    Token(String),
    Literal(RawLiteral),
    Combinator(BTreeMap<String, Vec<RawEntry>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLiteral {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("unknown wildcard token '{0}' (expected \"*\", \"**\" or \"*N\" with N > 0)")]
    BadToken(String),
    #[error("unknown match mode '{mode}' in '{encoded}'")]
    UnknownMode { mode: String, encoded: String },
    #[error("unknown combinator '{0}' (expected ALL, ANY or NONE)")]
    UnknownCombinator(String),
    #[error("combinator object must have exactly one field, found {0}")]
    CombinatorArity(usize),
}

pub fn decode(raw: &RawEntry, cache: &RegexCache) -> Result<Entry, EntryError> {
    match raw {
        RawEntry::Token(token) => decode_token(token),
        RawEntry::Literal(literal) => {
            let opcode = decode_matcher(&literal.op, cache)?;
            let operand = literal
                .args
                .as_deref()
                .map(|args| decode_matcher(args, cache))
                .transpose()?;
            Ok(Entry::Literal(LiteralInstruction::new(opcode, operand)))
        }
        RawEntry::Combinator(fields) => {
            if fields.len() != 1 {
                return Err(EntryError::CombinatorArity(fields.len()));
            }
            let Some((name, children)) = fields.iter().next() else {
                return Err(EntryError::CombinatorArity(0));
            };
            let mode = name
                .parse::<CombinatorMode>()
                .map_err(EntryError::UnknownCombinator)?;
            let entries = children
                .iter()
                .map(|child| decode(child, cache))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Entry::Combinator { mode, entries })
        }
    }
}

pub fn encode(entry: &Entry) -> RawEntry {
    match entry {
        Entry::Wildcard => RawEntry::Token("*".to_string()),
        Entry::WildcardRun(RunBound::Unbounded) => RawEntry::Token("**".to_string()),
        Entry::WildcardRun(RunBound::Count(n)) => RawEntry::Token(format!("*{}", n)),
        Entry::Literal(literal) => RawEntry::Literal(RawLiteral {
            op: literal.opcode.encode(),
            args: literal.operand.as_ref().map(TextMatcher::encode),
        }),
        Entry::Combinator { mode, entries } => {
            let mut fields = BTreeMap::new();
            fields.insert(mode.as_str().to_string(), entries.iter().map(encode).collect());
            RawEntry::Combinator(fields)
        }
    }
}

/// Decode a single entry from its JSON encoding.
pub fn from_json(value: &serde_json::Value, cache: &RegexCache) -> crate::Result<Entry> {
    let raw: RawEntry = serde_json::from_value(value.clone())?;
    decode(&raw, cache).map_err(|e| crate::HoundError::format("grammar entry", e.to_string()))
}

pub fn to_json(entry: &Entry) -> serde_json::Value {
    // RawEntry only holds strings, lists and string-keyed maps
    serde_json::to_value(encode(entry)).unwrap_or(serde_json::Value::Null)
}

fn decode_token(token: &str) -> Result<Entry, EntryError> {
    match token {
        "*" => Ok(Entry::Wildcard),
        "**" => Ok(Entry::WildcardRun(RunBound::Unbounded)),
        _ => token
            .strip_prefix('*')
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u32>().ok())
            .and_then(NonZeroU32::new)
            .map(|n| Entry::WildcardRun(RunBound::Count(n)))
            .ok_or_else(|| EntryError::BadToken(token.to_string())),
    }
}

fn decode_matcher(encoded: &str, cache: &RegexCache) -> Result<TextMatcher, EntryError> {
    TextMatcher::parse(encoded, cache).map_err(|mode| EntryError::UnknownMode {
        mode,
        encoded: encoded.to_string(),
    })
}
