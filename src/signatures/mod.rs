//! Signature grammar, its compact encoding, and signature documents.

pub mod codec;
mod entry;
mod signature;
mod text_match;

pub use codec::{EntryError, RawEntry, RawLiteral};
pub use entry::{CombinatorMode, Entry, LiteralInstruction, RunBound};
pub use signature::{
    DocumentFormat, LoadFailure, LoadReport, RawSignature, Signature, SignatureLoader,
};
pub use text_match::{RegexCache, TextMatchMode, TextMatcher};

#[cfg(test)]
mod tests;
