//! Style transplantation for WordprocessingML (.docx) packages: the content of one document
//! re-dressed in the style catalog of another.

pub mod config;
pub mod docx {
    pub mod merge;
    pub mod package;
    pub mod rewrite;
    pub mod scan;
    pub mod styles;
    pub mod xml;
}
pub mod error;
pub mod pipeline;
pub mod progress;

pub use error::{Diagnostic, ReferenceKind, Result, TransplantError};
pub use pipeline::{find_styles_by_text, process, ProcessingStats, Transplant};
