//! Report compiler: project the session into a fixed tabular layout.
//!
//! [`compile`] reads the ledger and identity records and produces a
//! [`ReportLayout`]: header lines, the five fixed columns, one row per bill in
//! ledger order, and a bold total row. It never mutates anything and never
//! paginates. Pagination belongs to a [`ReportRenderer`]; the built-in
//! [`MarkdownReportRenderer`] emits GitHub-flavoured Markdown tables.
//!
//! Amounts go through [`crate::ledger::format_amount`], the same rule the
//! live table uses.

use crate::config::ReportConfig;
use crate::error::BillReconError;
use crate::ledger::{format_amount, BillLedger};
use crate::records::{PatientRecord, PolicyHolderRecord};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub heading: String,
    pub align: Alignment,
}

impl Column {
    fn left(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            align: Alignment::Left,
        }
    }

    fn right(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            align: Alignment::Right,
        }
    }
}

/// Footer row holding the formatted total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalRow {
    pub label: String,
    pub amount: String,
    pub bold: bool,
}

/// Structured projection handed to a [`ReportRenderer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLayout {
    pub title: String,
    /// Header lines, e.g. `("Patient", "Asha Rao")`.
    pub header: Vec<(String, String)>,
    pub columns: Vec<Column>,
    /// One entry per bill, cells in column order.
    pub rows: Vec<Vec<String>>,
    pub total: TotalRow,
}

/// Compile the layout for `session`.
pub fn compile(session: &Session, config: &ReportConfig) -> ReportLayout {
    compile_parts(
        session.ledger(),
        session.patient(),
        session.policy_holder(),
        config,
    )
}

/// Compile from the individual parts of a session.
pub fn compile_parts(
    ledger: &BillLedger,
    patient: &PatientRecord,
    policy_holder: &PolicyHolderRecord,
    config: &ReportConfig,
) -> ReportLayout {
    let amount_heading = if config.currency_label.is_empty() {
        "Amount".to_string()
    } else {
        format!("Amount ({})", config.currency_label)
    };

    let rows: Vec<Vec<String>> = ledger
        .iter()
        .enumerate()
        .map(|(i, bill)| {
            vec![
                (i + 1).to_string(),
                bill.biller_name.clone(),
                bill.bill_number.clone(),
                bill.bill_date.clone(),
                format_amount(bill.bill_amount),
            ]
        })
        .collect();

    debug!("Compiled report with {} rows", rows.len());

    ReportLayout {
        title: config.title.clone(),
        header: vec![
            ("Patient".to_string(), patient.name.clone()),
            ("Policy Number".to_string(), policy_holder.policy_number.clone()),
        ],
        columns: vec![
            Column::left("#"),
            Column::left("Biller Name"),
            Column::left("Bill Number"),
            Column::left("Bill Date"),
            Column::right(amount_heading),
        ],
        rows,
        total: TotalRow {
            label: "Total".to_string(),
            amount: format_amount(ledger.total()),
            bold: true,
        },
    }
}

/// Output of a [`ReportRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub content: String,
    pub page_count: usize,
}

/// Turns a [`ReportLayout`] into a paginated, printable artifact.
pub trait ReportRenderer {
    /// Number of pages `layout` occupies; always at least 1.
    fn page_count(&self, layout: &ReportLayout) -> usize;

    fn render(&self, layout: &ReportLayout) -> Result<RenderedReport, BillReconError>;
}

/// Renders GitHub-flavoured Markdown, one table per page.
///
/// Pages are separated by a horizontal rule. The total row appears only on
/// the last page; every page ends with a `Page i of n` footer.
#[derive(Debug, Clone)]
pub struct MarkdownReportRenderer {
    rows_per_page: usize,
}

impl MarkdownReportRenderer {
    pub fn new(rows_per_page: usize) -> Self {
        Self {
            rows_per_page: rows_per_page.max(1),
        }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(config.rows_per_page)
    }
}

impl Default for MarkdownReportRenderer {
    fn default() -> Self {
        Self::from_config(&ReportConfig::default())
    }
}

impl ReportRenderer for MarkdownReportRenderer {
    fn page_count(&self, layout: &ReportLayout) -> usize {
        layout.rows.len().div_ceil(self.rows_per_page).max(1)
    }

    fn render(&self, layout: &ReportLayout) -> Result<RenderedReport, BillReconError> {
        let page_count = self.page_count(layout);
        let mut out = String::new();

        let mut chunks: Vec<&[Vec<String>]> = layout.rows.chunks(self.rows_per_page).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }

        for (i, rows) in chunks.iter().enumerate() {
            let page = i + 1;
            if page > 1 {
                out.push_str("\n---\n\n");
            }
            write_page_header(&mut out, layout)?;
            write_table(&mut out, layout, rows, page == page_count)?;
            writeln!(out, "\n_Page {} of {}_", page, page_count).map_err(fmt_err)?;
        }

        Ok(RenderedReport {
            content: out,
            page_count,
        })
    }
}

fn write_page_header(out: &mut String, layout: &ReportLayout) -> Result<(), BillReconError> {
    writeln!(out, "# {}\n", layout.title).map_err(fmt_err)?;
    let last = layout.header.len().saturating_sub(1);
    for (i, (label, value)) in layout.header.iter().enumerate() {
        // Two trailing spaces force a Markdown line break.
        let br = if i < last { "  " } else { "" };
        writeln!(out, "**{}:** {}{}", label, escape_cell(value), br).map_err(fmt_err)?;
    }
    out.push('\n');
    Ok(())
}

fn write_table(
    out: &mut String,
    layout: &ReportLayout,
    rows: &[Vec<String>],
    with_total: bool,
) -> Result<(), BillReconError> {
    let headings: Vec<String> = layout.columns.iter().map(|c| escape_cell(&c.heading)).collect();
    writeln!(out, "| {} |", headings.join(" | ")).map_err(fmt_err)?;

    let rule: Vec<&str> = layout
        .columns
        .iter()
        .map(|c| match c.align {
            Alignment::Left => "---",
            Alignment::Right => "---:",
        })
        .collect();
    writeln!(out, "|{}|", rule.join("|")).map_err(fmt_err)?;

    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| escape_cell(c)).collect();
        writeln!(out, "| {} |", cells.join(" | ")).map_err(fmt_err)?;
    }

    if with_total {
        let mut cells = vec![String::new(); layout.columns.len()];
        if let Some(first_text) = cells.get_mut(1) {
            *first_text = emphasise(&layout.total.label, layout.total.bold);
        }
        if let Some(amount) = cells.last_mut() {
            *amount = emphasise(&layout.total.amount, layout.total.bold);
        }
        writeln!(out, "| {} |", cells.join(" | ")).map_err(fmt_err)?;
    }
    Ok(())
}

fn emphasise(text: &str, bold: bool) -> String {
    if bold {
        format!("**{}**", escape_cell(text))
    } else {
        escape_cell(text)
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn fmt_err(e: std::fmt::Error) -> BillReconError {
    BillReconError::Internal(format!("report formatting: {e}"))
}

/// Write a rendered report to `path` atomically (temp file + rename).
pub async fn write_report(
    path: impl AsRef<Path>,
    report: &RenderedReport,
) -> Result<(), BillReconError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BillReconError::ReportWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, &report.content)
        .await
        .map_err(|e| BillReconError::ReportWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| BillReconError::ReportWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!(
        "Wrote {}-page report to {}",
        report.page_count,
        path.display()
    );
    Ok(())
}
