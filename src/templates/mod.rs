//! Saved export templates.
//!
//! A template names a single- or multi-sheet export so it can be replayed
//! later. Templates live in one JSON file managed by [`TemplateStore`].

mod model;
mod store;

pub use model::{
    ExportTemplate, ExportTemplateSummary, ExportTemplateType, SaveTemplateRequest,
    TemplateConfig, UpdateTemplateRequest,
};
pub use store::{TemplateError, TemplateResult, TemplateStore};
