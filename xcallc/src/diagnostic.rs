//!
//! Diagnostic Module - Rich Error Reporting
//!
//! Renders declaration parse errors with the offending signature text and
//! a label under the failing span, using miette.
//!
//! Usage:
//!   let reporter = DiagnosticReporter::new("float f(matrix*)", "<declare>");
//!   reporter.report_parse_error(&err);
//!

use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, LabeledSpan, NamedSource, Report, SourceSpan};
use thiserror::Error;

use crate::declare::{DeclareError, ParseError};

#[derive(Debug, Error)]
#[error("{message}")]
pub struct SignatureDiagnostic {
    message: String,
    src: NamedSource<String>,
    span: SourceSpan,
    label: String,
    help_text: Option<String>,
}

impl Diagnostic for SignatureDiagnostic {
    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(LabeledSpan::new_primary_with_span(
            Some(self.label.clone()),
            self.span,
        ))))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.help_text
            .as_ref()
            .map(|h| Box::new(h.clone()) as Box<dyn std::fmt::Display>)
    }
}

impl SignatureDiagnostic {
    pub fn from_parse_error(err: &ParseError, source: &str, origin: &str) -> Self {
        let span = err.span();
        let (label, help) = parse_error_details(err);

        Self {
            message: format!("{} at column {}", err, span.start + 1),
            src: NamedSource::new(origin, source.to_string()),
            span: (span.start as usize, span.len() as usize).into(),
            label,
            help_text: help,
        }
    }
}

fn parse_error_details(err: &ParseError) -> (String, Option<String>) {
    match err {
        ParseError::Expected { expected, .. } => (format!("expected {}", expected), None),
        ParseError::UnknownType { .. } => (
            "unknown type".to_string(),
            Some(
                "use int8, int16, int32, int64, float32, float64, bool or void \
                 (aliases: int, float, double, i8..i64, f32, f64)"
                    .to_string(),
            ),
        ),
        ParseError::UnexpectedChar { .. } => (
            "not part of a signature".to_string(),
            Some("signatures look like 'float f(float*, int32)'".to_string()),
        ),
        ParseError::UnexpectedEof { expected, .. } => (format!("expected {} here", expected), None),
        ParseError::UnclosedDelimiter { .. } => (
            "parameter list is not closed".to_string(),
            Some("add ')'".to_string()),
        ),
        ParseError::TrailingInput { .. } => (
            "unexpected after ')'".to_string(),
            Some("remove the trailing text".to_string()),
        ),
        ParseError::VoidParameter { .. } => (
            "void value parameter".to_string(),
            Some("use 'void*' for an opaque pointer or drop the parameter".to_string()),
        ),
    }
}

pub struct DiagnosticReporter<'a> {
    source: &'a str,
    origin: &'a str,
}

impl<'a> DiagnosticReporter<'a> {
    pub fn new(source: &'a str, origin: &'a str) -> Self {
        Self { source, origin }
    }

    pub fn diagnostic(&self, err: &ParseError) -> SignatureDiagnostic {
        SignatureDiagnostic::from_parse_error(err, self.source, self.origin)
    }

    pub fn report_parse_error(&self, err: &ParseError) {
        let report = Report::new(self.diagnostic(err));
        eprintln!("{:?}", report);
    }

    pub fn report_declare_error(&self, err: &DeclareError) {
        match err {
            DeclareError::Parse(parse) => self.report_parse_error(parse),
            DeclareError::Registry(registry) => eprintln!("error: {}", registry),
        }
    }

    /// Renders without colors, for logs and tests.
    pub fn render(&self, err: &ParseError) -> String {
        let mut out = String::new();
        let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
        if handler.render_report(&mut out, &self.diagnostic(err)).is_err() {
            return err.to_string();
        }
        out
    }
}
