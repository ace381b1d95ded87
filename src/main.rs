//! report-forge – renders the project report.
//!
//! Usage:
//!   report-forge
//!
//! Reads `docs/report.md` relative to the working directory and writes
//! `docs/AI_Memory_Wall_Report.pdf`. Command-line arguments are ignored.
//! Set `RUST_LOG=debug` for details.

use std::process;

use report_forge::pipeline::{generate_report, ReportConfig};

fn main() {
    env_logger::init();

    match generate_report(&ReportConfig::default()) {
        Ok(summary) => {
            log::debug!("{} pages, {} bytes", summary.pages, summary.bytes);
            println!(
                "PDF report generated successfully: {}",
                summary.output.display()
            );
        }
        Err(e) => {
            eprintln!("Error generating report: {e}");
            process::exit(1);
        }
    }
}
