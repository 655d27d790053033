//! Structured analysis diagnostics.
//!
//! Every failure of the analyzer is an [`AnalysisError`]: a kind tag plus the
//! identity of the validator struct, the offending field, rule, and argument,
//! and a span into the declaring source. Analysis fails fast on the first
//! error; no partial model is ever emitted.

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use std::fmt;
use std::sync::Arc;

use crate::model::Span;
use crate::tag::RuleArg;

// ============================================================================
// SOURCE CONTEXT
// ============================================================================

/// Source context for error reporting: the name and content of the file in
/// which the validator struct under analysis is declared.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Use only when the real declaring source cannot be obtained.
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "fallback".to_string(),
            content: format!("// {context}"),
        }
    }

    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::fallback("default context")
    }
}

/// Converts a model span to a miette source span.
pub fn to_source_span(span: Span) -> SourceSpan {
    SourceSpan::from(span.start..span.end)
}

/// Placeholder span for errors not tied to a source location.
pub fn unspanned() -> SourceSpan {
    SourceSpan::from(0..0)
}

// ============================================================================
// ERROR TYPE
// ============================================================================

/// The analysis error type: what went wrong, where, and on whose behalf.
#[derive(Debug)]
pub struct AnalysisError {
    /// What went wrong (kind-specific data).
    pub kind: ErrorKind,
    /// The type name of the validator struct under analysis.
    pub validator: String,
    /// The offending field, when one is known.
    pub field: Option<FieldContext>,
    /// Where it happened.
    pub source_info: SourceInfo,
    /// How to help.
    pub diagnostic_info: DiagnosticInfo,
}

/// Identity of the field that caused an error.
#[derive(Debug, Clone)]
pub struct FieldContext {
    pub name: String,
    pub typ: String,
    pub tag: String,
}

#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

/// All analysis failure modes.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// The validator struct has no fields to validate.
    EmptyValidator,
    /// A rule name resolves to nothing in the registry.
    RuleUnknown { rule: String },
    /// A rule carries a context clause but the struct has no context option.
    RuleContextUnknown { rule: String, context: String },
    /// Wrong number of rule arguments.
    RuleArgCount {
        rule: String,
        expected: String,
        actual: usize,
    },
    /// An argument kind the rule cannot accept (e.g. a field reference
    /// where only literals are allowed).
    RuleArgKind {
        rule: String,
        arg: RuleArg,
        expected: String,
    },
    /// Two arguments of the same rule disagree on kind.
    RuleArgKindConflict { rule: String, arg: RuleArg },

    // literal type mismatches
    RuleArgTypeUint { rule: String, arg: RuleArg },
    RuleArgTypeInt { rule: String, arg: RuleArg },
    RuleArgTypeFloat { rule: String, arg: RuleArg },
    RuleArgTypeString { rule: String, arg: RuleArg },
    RuleArgTypeBool { rule: String, arg: RuleArg },

    // invalid argument values for known rules
    RuleArgValueUuidVer { rule: String, arg: RuleArg },
    RuleArgValueIpVer { rule: String, arg: RuleArg },
    RuleArgValueMacVer { rule: String, arg: RuleArg },
    RuleArgValueIsbnVer { rule: String, arg: RuleArg },
    RuleArgValueCountryCode { rule: String, arg: RuleArg },
    RuleArgValueLen { rule: String, arg: RuleArg },
    RuleArgValueIsoStd { rule: String, arg: RuleArg },
    RuleArgValueRfcStd { rule: String, arg: RuleArg },
    RuleArgValueRegexp { rule: String, arg: RuleArg },

    // field type constraints
    FieldTypeNoLength { rule: String, typ: String },
    FieldTypeNotNumeric { rule: String, typ: String },
    FieldTypeNotString { rule: String, typ: String },
    /// The field type cannot be passed to the rule's function.
    FieldTypeFuncIncompatible {
        rule: String,
        typ: String,
        func: String,
    },
    /// The rule requires a map (key rules) or map/slice/array (elem rules).
    FieldTypeNotComposite { rule: String, typ: String },
    /// `eq`/`ne` on a type without equality.
    FieldTypeNotComparable { rule: String, typ: String },
    /// `notnil` on a type that has no nil value.
    FieldTypeNotNilable { rule: String, typ: String },

    // enum rules
    EnumTypeUnnamed { typ: String },
    EnumTypeNoConstants { typ: String },
    /// The field type has no IsValid method.
    IsValidUnsupported { typ: String },

    // field keys & special fields
    FieldKeyUnknown { key: String },
    FieldKeyConflict { key: String },
    ErrorHandlerConflict { field: String },
    ContextOptionConflict { field: String },
    ContextOptionType { field: String, typ: String },
}

impl ErrorKind {
    /// Error code suffix for diagnostic codes.
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::EmptyValidator => "empty_validator",
            Self::RuleUnknown { .. } => "rule_unknown",
            Self::RuleContextUnknown { .. } => "rule_context_unknown",
            Self::RuleArgCount { .. } => "rule_arg_count",
            Self::RuleArgKind { .. } => "rule_arg_kind",
            Self::RuleArgKindConflict { .. } => "rule_arg_kind_conflict",
            Self::RuleArgTypeUint { .. } => "rule_arg_type_uint",
            Self::RuleArgTypeInt { .. } => "rule_arg_type_int",
            Self::RuleArgTypeFloat { .. } => "rule_arg_type_float",
            Self::RuleArgTypeString { .. } => "rule_arg_type_string",
            Self::RuleArgTypeBool { .. } => "rule_arg_type_bool",
            Self::RuleArgValueUuidVer { .. } => "rule_arg_value_uuid_ver",
            Self::RuleArgValueIpVer { .. } => "rule_arg_value_ip_ver",
            Self::RuleArgValueMacVer { .. } => "rule_arg_value_mac_ver",
            Self::RuleArgValueIsbnVer { .. } => "rule_arg_value_isbn_ver",
            Self::RuleArgValueCountryCode { .. } => "rule_arg_value_country_code",
            Self::RuleArgValueLen { .. } => "rule_arg_value_len",
            Self::RuleArgValueIsoStd { .. } => "rule_arg_value_iso_std",
            Self::RuleArgValueRfcStd { .. } => "rule_arg_value_rfc_std",
            Self::RuleArgValueRegexp { .. } => "rule_arg_value_regexp",
            Self::FieldTypeNoLength { .. } => "field_type_no_length",
            Self::FieldTypeNotNumeric { .. } => "field_type_not_numeric",
            Self::FieldTypeNotString { .. } => "field_type_not_string",
            Self::FieldTypeFuncIncompatible { .. } => "field_type_func_incompatible",
            Self::FieldTypeNotComposite { .. } => "field_type_not_composite",
            Self::FieldTypeNotComparable { .. } => "field_type_not_comparable",
            Self::FieldTypeNotNilable { .. } => "field_type_not_nilable",
            Self::EnumTypeUnnamed { .. } => "enum_type_unnamed",
            Self::EnumTypeNoConstants { .. } => "enum_type_no_constants",
            Self::IsValidUnsupported { .. } => "isvalid_unsupported",
            Self::FieldKeyUnknown { .. } => "field_key_unknown",
            Self::FieldKeyConflict { .. } => "field_key_conflict",
            Self::ErrorHandlerConflict { .. } => "error_handler_conflict",
            Self::ContextOptionConflict { .. } => "context_option_conflict",
            Self::ContextOptionType { .. } => "context_option_type",
        }
    }
}

impl std::error::Error for AnalysisError {}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::EmptyValidator => {
                write!(f, "{} must have at least one field to validate", self.validator)
            }
            ErrorKind::RuleUnknown { rule } => write!(f, "unknown rule '{rule}'"),
            ErrorKind::RuleContextUnknown { rule, context } => write!(
                f,
                "rule '{rule}' has context '@{context}' but the validator has no context option field"
            ),
            ErrorKind::RuleArgCount {
                rule,
                expected,
                actual,
            } => write!(
                f,
                "rule '{rule}' expects {expected} argument(s), got {actual}"
            ),
            ErrorKind::RuleArgKind {
                rule,
                arg,
                expected,
            } => write!(
                f,
                "rule '{rule}' cannot accept argument '{}'; expected {expected}",
                arg.value
            ),
            ErrorKind::RuleArgKindConflict { rule, arg } => write!(
                f,
                "rule '{rule}' argument '{}' conflicts in kind with a preceding argument",
                arg.value
            ),
            ErrorKind::RuleArgTypeUint { rule, arg } => write!(
                f,
                "rule '{rule}' argument '{}' must be an unsigned integer",
                arg.value
            ),
            ErrorKind::RuleArgTypeInt { rule, arg } => {
                write!(f, "rule '{rule}' argument '{}' must be an integer", arg.value)
            }
            ErrorKind::RuleArgTypeFloat { rule, arg } => {
                write!(f, "rule '{rule}' argument '{}' must be a float", arg.value)
            }
            ErrorKind::RuleArgTypeString { rule, arg } => {
                write!(f, "rule '{rule}' argument '{}' must be a string", arg.value)
            }
            ErrorKind::RuleArgTypeBool { rule, arg } => {
                write!(f, "rule '{rule}' argument '{}' must be a bool", arg.value)
            }
            ErrorKind::RuleArgValueUuidVer { rule, arg } => {
                write!(f, "rule '{rule}': '{}' is not a valid UUID version", arg.value)
            }
            ErrorKind::RuleArgValueIpVer { rule, arg } => {
                write!(f, "rule '{rule}': '{}' is not a valid IP version", arg.value)
            }
            ErrorKind::RuleArgValueMacVer { rule, arg } => {
                write!(f, "rule '{rule}': '{}' is not a valid MAC version", arg.value)
            }
            ErrorKind::RuleArgValueIsbnVer { rule, arg } => {
                write!(f, "rule '{rule}': '{}' is not a valid ISBN version", arg.value)
            }
            ErrorKind::RuleArgValueCountryCode { rule, arg } => {
                write!(f, "rule '{rule}': '{}' is not a valid country code", arg.value)
            }
            ErrorKind::RuleArgValueLen { rule, arg } => {
                write!(f, "rule '{rule}': '{}' is not a valid length bound", arg.value)
            }
            ErrorKind::RuleArgValueIsoStd { rule, arg } => {
                write!(f, "rule '{rule}': '{}' is not a valid ISO standard number", arg.value)
            }
            ErrorKind::RuleArgValueRfcStd { rule, arg } => {
                write!(f, "rule '{rule}': '{}' is not a valid RFC number", arg.value)
            }
            ErrorKind::RuleArgValueRegexp { rule, arg } => {
                write!(f, "rule '{rule}': '{}' is not a valid regular expression", arg.value)
            }
            ErrorKind::FieldTypeNoLength { rule, typ } => {
                write!(f, "rule '{rule}': field type {typ} has no length")
            }
            ErrorKind::FieldTypeNotNumeric { rule, typ } => {
                write!(f, "rule '{rule}': field type {typ} is not numeric")
            }
            ErrorKind::FieldTypeNotString { rule, typ } => {
                write!(f, "rule '{rule}': field type {typ} is not string")
            }
            ErrorKind::FieldTypeFuncIncompatible { rule, typ, func } => {
                write!(f, "rule '{rule}': field type {typ} cannot be passed to {func}")
            }
            ErrorKind::FieldTypeNotComposite { rule, typ } => write!(
                f,
                "rule '{rule}': field type {typ} has no key/element to validate"
            ),
            ErrorKind::FieldTypeNotComparable { rule, typ } => {
                write!(f, "rule '{rule}': field type {typ} is not comparable")
            }
            ErrorKind::FieldTypeNotNilable { rule, typ } => {
                write!(f, "rule '{rule}': field type {typ} cannot be nil")
            }
            ErrorKind::EnumTypeUnnamed { typ } => {
                write!(f, "enum rule requires a named type, got {typ}")
            }
            ErrorKind::EnumTypeNoConstants { typ } => {
                write!(f, "enum rule: no typed constants declared for {typ}")
            }
            ErrorKind::IsValidUnsupported { typ } => {
                write!(f, "isvalid rule: type {typ} has no IsValid() method")
            }
            ErrorKind::FieldKeyUnknown { key } => write!(f, "unknown field key '{key}'"),
            ErrorKind::FieldKeyConflict { key } => write!(f, "conflicting field key '{key}'"),
            ErrorKind::ErrorHandlerConflict { field } => write!(
                f,
                "field '{field}' conflicts with an already registered error handler"
            ),
            ErrorKind::ContextOptionConflict { field } => write!(
                f,
                "field '{field}' conflicts with an already registered context option"
            ),
            ErrorKind::ContextOptionType { field, typ } => write!(
                f,
                "context option field '{field}' must be a string, got {typ}"
            ),
        }
    }
}

impl Diagnostic for AnalysisError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.primary_label()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

impl AnalysisError {
    fn primary_label(&self) -> String {
        match &self.field {
            Some(field) => format!("in field '{}' ({})", field.name, field.typ),
            None => "in this validator".into(),
        }
    }
}

// ============================================================================
// REPORTER
// ============================================================================

/// Error factory bound to one validator struct's declaring source.
#[derive(Debug, Clone)]
pub struct Reporter {
    source: Arc<NamedSource<String>>,
    validator: String,
}

impl Reporter {
    pub fn new(source: &SourceContext, validator: impl Into<String>) -> Self {
        Self {
            source: source.to_named_source(),
            validator: validator.into(),
        }
    }

    pub fn report(&self, kind: ErrorKind, span: Span) -> AnalysisError {
        let error_code = format!("verigen::analysis::{}", kind.code_suffix());
        AnalysisError {
            kind,
            validator: self.validator.clone(),
            field: None,
            source_info: SourceInfo {
                source: Arc::clone(&self.source),
                primary_span: to_source_span(span),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }

    pub fn report_for_field(
        &self,
        kind: ErrorKind,
        span: Span,
        name: &str,
        typ: &str,
        tag: &str,
    ) -> AnalysisError {
        let mut err = self.report(kind, span);
        err.field = Some(FieldContext {
            name: name.into(),
            typ: typ.into(),
            tag: tag.into(),
        });
        err
    }
}
