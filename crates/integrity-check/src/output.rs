//! Rendering of audit reports
//!
//! Renderers return strings; the caller decides where they are written.

use crate::checker::AuditReport;
use anyhow::Result;
use chrono::{DateTime, Utc};
use integrity_common::{AggregateError, Notice, ProviderError};
use serde::Serialize;
use std::fmt::Write;

/// Plain-text rendering, one block per notice
pub fn render_text(report: &AuditReport) -> String {
    let mut out = String::new();
    for notice in &report.notices {
        let _ = writeln!(out, "NOTICE [{}]: {}\n", notice.level, notice.title);
        for line in notice.description.lines() {
            let _ = writeln!(out, "  {line}");
        }
        out.push('\n');
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    notices: &'a [Notice],
    errors: Vec<String>,
}

/// Pretty-printed JSON document with the notices and every failure
pub fn render_json(report: &AuditReport, generated_at: DateTime<Utc>) -> Result<String> {
    let errors = report
        .error
        .as_ref()
        .map(|e| e.errors().iter().map(|e| format!("{e:#}")).collect())
        .unwrap_or_default();

    let document = JsonReport {
        generated_at,
        notices: &report.notices,
        errors,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Operator hints for the provider errors buried anywhere in `error`
///
/// Walks every context chain, descending into nested aggregates. Each hint
/// appears once, in first-seen order.
pub fn error_hints(error: &AggregateError) -> Vec<&'static str> {
    let mut hints = Vec::new();
    collect_hints(error, &mut hints);
    hints
}

fn collect_hints(error: &AggregateError, hints: &mut Vec<&'static str>) {
    for e in error.errors() {
        for cause in e.chain() {
            if let Some(provider) = cause.downcast_ref::<ProviderError>() {
                if let Some(hint) = provider.suggestion() {
                    if !hints.contains(&hint) {
                        hints.push(hint);
                    }
                }
            } else if let Some(nested) = cause.downcast_ref::<AggregateError>() {
                collect_hints(nested, hints);
            }
        }
    }
}
