//! Sequence matcher: runs one instruction variant over one method body.
//!
//! The matcher walks the method's real instructions (pseudo-instructions are
//! skipped) keeping four pieces of state:
//!
//! - `start`: index where the current attempt began
//! - `index`: how many variant entries have matched so far
//! - `used` / `limit`: catch-up budget granted by the last wildcard entered
//!
//! Entering a wildcard or wildcard run sets the budget and moves on to the
//! next entry without consuming the instruction. A literal or combinator that
//! fails to match spends one unit of budget and retries the same entry on the
//! next instruction; with no budget left the attempt restarts one instruction
//! after `start`. Completed matches also restart there, so overlapping
//! matches are reported.
//!
//! The budget is only reset when a wildcard is entered, so whatever is left
//! over carries into the next attempt of the same run.

use crate::bytecode::Instruction;
use crate::paths::PathId;
use crate::results::ResultSink;
use crate::signatures::Entry;
use crate::types::{Archetype, Detection, MatchSpan};
use std::sync::Arc;
use tracing::debug;

/// Inclusive range of instruction indices covered by one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// One (signature variant, archetype) pair ready to be run over methods.
#[derive(Debug, Clone, Copy)]
pub struct SequenceMatcher<'a> {
    archetype: &'a Arc<Archetype>,
    variant: &'a str,
    entries: &'a [Entry],
}

impl<'a> SequenceMatcher<'a> {
    pub fn new(archetype: &'a Arc<Archetype>, variant: &'a str, entries: &'a [Entry]) -> Self {
        Self { archetype, variant, entries }
    }

    /// Every match in `instructions`, in discovery order.
    pub fn find_spans(&self, instructions: &[Instruction]) -> Vec<Span> {
        let mut spans = Vec::new();
        if self.entries.is_empty() {
            return spans;
        }

        let mut state = MatchState::default();
        let mut cursor = 0;
        while let Some(instruction) = instructions.get(cursor) {
            if instruction.is_pseudo() {
                cursor += 1;
                continue;
            }
            if state.index == 0 {
                state.start = cursor;
            }
            match state.step(self.entries, instruction) {
                Step::Advance => cursor += 1,
                Step::Complete => {
                    spans.push(Span { start: state.start, end: cursor });
                    cursor = state.restart();
                }
                Step::Fail => cursor = state.restart(),
            }
        }
        spans
    }

    /// Run over one method body, recording a detection per match.
    /// Returns the number of detections recorded.
    pub fn run<S: ResultSink + ?Sized>(
        &self,
        location: PathId,
        instructions: &[Instruction],
        sink: &mut S,
    ) -> usize {
        let spans = self.find_spans(instructions);
        for span in &spans {
            let detection = Detection::for_match(
                Arc::clone(self.archetype),
                location,
                MatchSpan { variant: self.variant.to_string(), start: span.start, end: span.end },
            );
            debug!(
                "{} variant '{}' matched instructions {}..={}",
                self.archetype.identifier, self.variant, span.start, span.end
            );
            sink.record(Arc::new(detection));
        }
        spans.len()
    }
}

#[derive(Debug, Default)]
struct MatchState {
    start: usize,
    index: usize,
    used: usize,
    limit: usize,
}

enum Step {
    /// Instruction consumed, attempt continues
    Advance,
    /// Last entry matched this instruction
    Complete,
    Fail,
}

impl MatchState {
    fn step(&mut self, entries: &[Entry], instruction: &Instruction) -> Step {
        loop {
            // a wildcard entered as the last entry leaves nothing to complete the match
            let Some(entry) = entries.get(self.index) else {
                return Step::Fail;
            };
            match entry {
                Entry::Wildcard => self.enter_wildcard(1),
                Entry::WildcardRun(bound) => self.enter_wildcard(bound.limit()),
                Entry::Literal(_) | Entry::Combinator { .. } => {
                    if entry.matches(instruction) {
                        self.index += 1;
                        return if self.index == entries.len() {
                            Step::Complete
                        } else {
                            Step::Advance
                        };
                    }
                    if self.used < self.limit {
                        self.used += 1;
                        return Step::Advance;
                    }
                    return Step::Fail;
                }
            }
        }
    }

    fn enter_wildcard(&mut self, limit: usize) {
        self.used = 0;
        self.limit = limit;
        self.index += 1;
    }

    /// Reset the attempt and return the cursor to resume from.
    fn restart(&mut self) -> usize {
        self.index = 0;
        self.start + 1
    }
}
