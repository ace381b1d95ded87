//! # report-forge – Markdown report → styled PDF
//!
//! The pipeline stages are:
//!
//! 1. **Convert** – Markdown → HTML document ([`markdown`])
//! 2. **Parse** – HTML string → DOM tree ([`dom`])
//! 3. **Style** – cascade the report [`stylesheet`] over the DOM ([`style`])
//! 4. **Layout** – compute block and table layout with Taffy ([`layout`]),
//!    breaking styled inline runs into lines ([`inline`])
//! 5. **Paginate** – split into A4 pages and add headers/footers ([`pagination`])
//! 6. **Render** – emit PDF bytes via printpdf ([`render`])
//!
//! [`pipeline::generate_report`] runs all of them for one source file.

pub mod dom;
pub mod error;
pub mod fonts;
pub mod inline;
pub mod layout;
pub mod layout_config;
pub mod markdown;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod style;
pub mod stylesheet;

// Re-exports for convenience
pub use error::ReportError;
pub use pipeline::{generate_report, render_html, ReportConfig, ReportSummary};
pub use stylesheet::Stylesheet;
