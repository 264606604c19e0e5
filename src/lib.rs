//! classhound - static instruction-sequence signature engine for compiled
//! JVM application bundles.
//!
//! Signatures are data files: an archetype (identifier, suspicion level,
//! description) plus named variants, each an ordered list of grammar entries
//! that is matched against the instruction stream of every method.
//!
//! # Example
//!
//! ```no_run
//! use classhound::{Application, Scanner, SignatureLoader};
//!
//! let loader = SignatureLoader::new();
//! let report = loader.load_dir("signatures").unwrap();
//! let scanner = Scanner::new(report.signatures).unwrap();
//!
//! let app = Application::from_dir("unpacked-app").unwrap();
//! let results = scanner.scan(&app).unwrap();
//! for (path, hits) in results.iter() {
//!     for (archetype, detections) in hits {
//!         println!("{}: {} x{}", results.paths().display(path).unwrap(), archetype, detections.len());
//!     }
//! }
//! ```

pub mod bytecode;
pub mod config;
pub mod error;
pub mod matcher;
pub mod paths;
pub mod results;
pub mod scanner;
pub mod signatures;
pub mod types;

// Re-export commonly used types at crate root
pub use config::ScanConfig;
pub use error::{HoundError, Result};
pub use paths::{PathElement, PathId, PathKind, PathTable};
pub use results::{DefaultSink, ResultSink, ScanResults, SplittingSink};
pub use scanner::{
    Application, CancellationToken, ScanContext, ScanFeedback, ScanSummary, Scanner,
    ScannerBuilder, SplitResults,
};
pub use signatures::{Entry, LoadReport, Signature, SignatureLoader, TextMatchMode, TextMatcher};
pub use types::{Archetype, Detection, DetectionSet, SuspicionLevel};
