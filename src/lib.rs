pub use crate::diagnostics::{AnalysisError, ErrorKind, SourceContext};

pub mod analysis;
pub mod codegen;
pub mod diagnostics;
pub mod model;
pub mod rules;
pub mod tag;
