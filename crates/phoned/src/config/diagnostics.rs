use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// An MQTT section that bridges no phones
    NoPhones,

    /// A phone without a state topic that did not ask for optimistic mode
    ForcedOptimistic { entity_id: String },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Validation(ValidationError),
}

/// Error type for validation failures
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub span: Option<Range<usize>>,
    pub source: Option<SourceInfo>,
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    use ariadne::Color;
    use ariadne::Label;
    use ariadne::Report;
    use ariadne::ReportKind;
    use ariadne::Source;

    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(warning) => {
                let warning_msg = match warning {
                    Warning::NoPhones => {
                        "Warning: [integrations.mqtt] configures no phones\n".to_string()
                    }
                    Warning::ForcedOptimistic { entity_id } => format!(
                        "Warning: {} has no state_topic and will run in optimistic mode\n",
                        entity_id
                    ),
                };
                output.extend_from_slice(warning_msg.as_bytes());
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                match (&validation_error.span, &validation_error.source) {
                    (Some(span), Some(source)) => {
                        let file_id = source.file_path.to_string_lossy().to_string();
                        let report = Report::build(ReportKind::Error, (file_id.clone(), span.clone()))
                            .with_message(format!(
                                "Invalid value for '{}'",
                                validation_error.field_path
                            ))
                            .with_label(
                                Label::new((file_id.clone(), span.clone()))
                                    .with_message(&validation_error.message)
                                    .with_color(Color::Red),
                            )
                            .finish();

                        report
                            .write((file_id, Source::from(&source.content)), &mut output)
                            .ok();
                    }
                    _ => {
                        let error_msg = format!(
                            "Validation error in '{}': {}\n",
                            validation_error.field_path, validation_error.message
                        );
                        output.extend_from_slice(error_msg.as_bytes());
                    }
                }
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}
