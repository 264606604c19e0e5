//! Core value types shared by signatures, the matcher and the result sink.

mod archetype;
mod detection;

pub use archetype::{Archetype, SuspicionLevel};
pub use detection::{Detection, DetectionSet, MatchSpan};

#[cfg(test)]
mod tests;
