use crate::document::CompiledQuery;
use crate::position::PositionMapper;
use lsp_types::{Diagnostic, DiagnosticSeverity};
use promql_parser::Severity;

/// Value of [`Diagnostic::source`] for everything this server reports.
pub const SOURCE: &str = "promql-lsp";

/// Convert the errors of every query into protocol diagnostics, ordered by range start.
pub fn diagnostics(queries: &[CompiledQuery], mapper: &PositionMapper) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = queries
        .iter()
        .flat_map(|query| query.errors.iter())
        .map(|error| Diagnostic {
            range: mapper.lossy_range(error.span),
            severity: Some(match error.severity {
                Severity::Error => DiagnosticSeverity::ERROR,
                Severity::Warning => DiagnosticSeverity::WARNING,
            }),
            source: Some(SOURCE.to_string()),
            message: error.message.clone(),
            ..Default::default()
        })
        .collect();
    diagnostics.sort_by_key(|diagnostic| {
        (
            diagnostic.range.start.line,
            diagnostic.range.start.character,
        )
    });
    diagnostics
}
