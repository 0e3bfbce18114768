//! OperationOutcome model.
//!
//! Provides the issue vocabulary used by [`FhirError`](crate::error::FhirError)
//! and the status derivation rules for outcomes that carry several issues.

use axum::http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Issue severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Fatal error - processing cannot continue.
    Fatal,
    /// Error - processing has failed.
    Error,
    /// Warning - processing succeeded but with concerns.
    Warning,
    /// Information - informational message.
    Information,
}

impl IssueSeverity {
    /// Returns the FHIR string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Fatal => "fatal",
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Information => "information",
        }
    }

    /// Returns the tier of this severity; higher is more severe.
    pub fn rank(&self) -> u8 {
        match self {
            IssueSeverity::Fatal => 3,
            IssueSeverity::Error => 2,
            IssueSeverity::Warning => 1,
            IssueSeverity::Information => 0,
        }
    }
}

/// Issue type codes from the FHIR `issue-type` value set.
///
/// Codes outside the value set are kept verbatim in [`IssueType::Other`] so
/// that outcomes received from other servers render back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IssueType {
    /// Invalid content.
    Invalid,
    /// Structural issue.
    Structure,
    /// Required element missing.
    Required,
    /// Value out of range.
    Value,
    /// Invariant violated.
    Invariant,
    /// Security problem.
    Security,
    /// Login required.
    Login,
    /// Session expired.
    Expired,
    /// Access forbidden.
    Forbidden,
    /// Information suppressed.
    Suppressed,
    /// Processing failure.
    Processing,
    /// Content not supported.
    NotSupported,
    /// Duplicate resource.
    Duplicate,
    /// Multiple matches (ambiguous).
    MultipleMatches,
    /// Resource not found.
    NotFound,
    /// Resource was deleted.
    Deleted,
    /// Content too long.
    TooLong,
    /// Invalid code.
    CodeInvalid,
    /// Unacceptable extension.
    Extension,
    /// Operation too costly.
    TooCostly,
    /// Business rule violated.
    BusinessRule,
    /// Conflict with existing state.
    Conflict,
    /// Transient error.
    Transient,
    /// Lock error.
    LockError,
    /// Storage unavailable.
    NoStore,
    /// Unexpected exception.
    Exception,
    /// Timeout.
    Timeout,
    /// Incomplete results.
    Incomplete,
    /// Throttled.
    Throttled,
    /// Informational message.
    Informational,
    /// Success message.
    Success,
    /// Unknown user.
    Unknown,
    /// A code outside the value set.
    Other(String),
}

impl IssueType {
    /// Parses a FHIR code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "invalid" => IssueType::Invalid,
            "structure" => IssueType::Structure,
            "required" => IssueType::Required,
            "value" => IssueType::Value,
            "invariant" => IssueType::Invariant,
            "security" => IssueType::Security,
            "login" => IssueType::Login,
            "expired" => IssueType::Expired,
            "forbidden" => IssueType::Forbidden,
            "suppressed" => IssueType::Suppressed,
            "processing" => IssueType::Processing,
            "not-supported" => IssueType::NotSupported,
            "duplicate" => IssueType::Duplicate,
            "multiple-matches" => IssueType::MultipleMatches,
            "not-found" => IssueType::NotFound,
            "deleted" => IssueType::Deleted,
            "too-long" => IssueType::TooLong,
            "code-invalid" => IssueType::CodeInvalid,
            "extension" => IssueType::Extension,
            "too-costly" => IssueType::TooCostly,
            "business-rule" => IssueType::BusinessRule,
            "conflict" => IssueType::Conflict,
            "transient" => IssueType::Transient,
            "lock-error" => IssueType::LockError,
            "no-store" => IssueType::NoStore,
            "exception" => IssueType::Exception,
            "timeout" => IssueType::Timeout,
            "incomplete" => IssueType::Incomplete,
            "throttled" => IssueType::Throttled,
            "informational" => IssueType::Informational,
            "success" => IssueType::Success,
            "unknown" => IssueType::Unknown,
            other => IssueType::Other(other.to_string()),
        }
    }

    /// Returns the FHIR code string representation.
    pub fn as_str(&self) -> &str {
        match self {
            IssueType::Invalid => "invalid",
            IssueType::Structure => "structure",
            IssueType::Required => "required",
            IssueType::Value => "value",
            IssueType::Invariant => "invariant",
            IssueType::Security => "security",
            IssueType::Login => "login",
            IssueType::Expired => "expired",
            IssueType::Forbidden => "forbidden",
            IssueType::Suppressed => "suppressed",
            IssueType::Processing => "processing",
            IssueType::NotSupported => "not-supported",
            IssueType::Duplicate => "duplicate",
            IssueType::MultipleMatches => "multiple-matches",
            IssueType::NotFound => "not-found",
            IssueType::Deleted => "deleted",
            IssueType::TooLong => "too-long",
            IssueType::CodeInvalid => "code-invalid",
            IssueType::Extension => "extension",
            IssueType::TooCostly => "too-costly",
            IssueType::BusinessRule => "business-rule",
            IssueType::Conflict => "conflict",
            IssueType::Transient => "transient",
            IssueType::LockError => "lock-error",
            IssueType::NoStore => "no-store",
            IssueType::Exception => "exception",
            IssueType::Timeout => "timeout",
            IssueType::Incomplete => "incomplete",
            IssueType::Throttled => "throttled",
            IssueType::Informational => "informational",
            IssueType::Success => "success",
            IssueType::Unknown => "unknown",
            IssueType::Other(code) => code.as_str(),
        }
    }

    /// Maps the issue code to the HTTP status it implies on its own.
    pub fn http_status(&self) -> u16 {
        match self {
            IssueType::Invalid
            | IssueType::Structure
            | IssueType::Required
            | IssueType::Value
            | IssueType::Invariant
            | IssueType::Processing
            | IssueType::NotSupported
            | IssueType::CodeInvalid
            | IssueType::Extension => 400,
            IssueType::Login | IssueType::Unknown | IssueType::Expired => 401,
            IssueType::Security
            | IssueType::Forbidden
            | IssueType::Suppressed
            | IssueType::TooCostly => 403,
            IssueType::NotFound => 404,
            IssueType::Duplicate | IssueType::Conflict | IssueType::LockError => 409,
            IssueType::Deleted => 410,
            IssueType::MultipleMatches => 412,
            IssueType::TooLong => 413,
            IssueType::BusinessRule => 422,
            IssueType::Throttled => 429,
            IssueType::NoStore
            | IssueType::Exception
            | IssueType::Incomplete
            | IssueType::Other(_) => 500,
            IssueType::Transient => 503,
            IssueType::Timeout => 504,
            IssueType::Informational | IssueType::Success => 200,
        }
    }
}

impl Serialize for IssueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IssueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(IssueType::from_code(&code))
    }
}

/// An issue in an OperationOutcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// The severity of the issue.
    pub severity: IssueSeverity,
    /// The type/code of the issue.
    pub code: IssueType,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diagnostics: String,
    /// FHIRPath expressions locating the issue.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression: Vec<String>,
}

impl Issue {
    /// Creates a new issue.
    pub fn new(severity: IssueSeverity, code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            diagnostics: diagnostics.into(),
            expression: Vec::new(),
        }
    }

    /// Creates a fatal issue.
    pub fn fatal(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Fatal, code, diagnostics)
    }

    /// Creates an error issue.
    pub fn error(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, diagnostics)
    }

    /// Creates a warning issue.
    pub fn warning(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Warning, code, diagnostics)
    }

    /// Creates an information issue.
    pub fn information(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Information, code, diagnostics)
    }

    /// Sets the expression (location).
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression.push(expression.into());
        self
    }
}

/// An OperationOutcome: an ordered list of issues.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationOutcome {
    issues: Vec<Issue>,
}

impl OperationOutcome {
    /// Creates an empty outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an outcome holding a single issue.
    pub fn single(issue: Issue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    /// Adds an issue.
    pub fn add_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    /// Adds a fatal issue.
    pub fn fatal(self, code: IssueType, diagnostics: impl Into<String>) -> Self {
        self.add_issue(Issue::fatal(code, diagnostics))
    }

    /// Adds an error issue.
    pub fn error(self, code: IssueType, diagnostics: impl Into<String>) -> Self {
        self.add_issue(Issue::error(code, diagnostics))
    }

    /// Adds a warning issue.
    pub fn warning(self, code: IssueType, diagnostics: impl Into<String>) -> Self {
        self.add_issue(Issue::warning(code, diagnostics))
    }

    /// Adds an information issue.
    pub fn information(self, code: IssueType, diagnostics: impl Into<String>) -> Self {
        self.add_issue(Issue::information(code, diagnostics))
    }

    /// Returns the issues in order.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Returns true if there are any error or fatal issues.
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| matches!(i.severity, IssueSeverity::Error | IssueSeverity::Fatal))
    }

    /// Derives the HTTP status for this outcome.
    ///
    /// Only issues at the highest severity tier present are considered. If
    /// they all map to the same status, that status is returned; otherwise
    /// the statuses are rounded down to their hundred and the largest
    /// hundred wins (404 with 400 gives 400, 404 with 500 gives 500).
    pub fn http_status(&self) -> StatusCode {
        let Some(top) = self.issues.iter().map(|i| i.severity.rank()).max() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };

        let statuses: Vec<u16> = self
            .issues
            .iter()
            .filter(|i| i.severity.rank() == top)
            .map(|i| i.code.http_status())
            .collect();

        let first = statuses[0];
        let status = if statuses.iter().all(|s| *s == first) {
            first
        } else {
            statuses.iter().map(|s| s / 100 * 100).max().unwrap_or(500)
        };

        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Converts to FHIR JSON.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": self.issues
        })
    }

    /// Parses an OperationOutcome resource, returning `None` if the value is
    /// not an OperationOutcome or carries no readable issues.
    pub fn from_json(value: &Value) -> Option<Self> {
        if value.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
            return None;
        }
        let issues: Vec<Issue> = value
            .get("issue")
            .and_then(Value::as_array)?
            .iter()
            .filter_map(|issue| serde_json::from_value(issue.clone()).ok())
            .collect();
        if issues.is_empty() {
            return None;
        }
        Some(Self { issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_to_json() {
        let outcome = OperationOutcome::new().error(IssueType::NotFound, "Resource not found");
        let json = outcome.to_json();

        assert_eq!(json["resourceType"], "OperationOutcome");
        assert_eq!(json["issue"][0]["severity"], "error");
        assert_eq!(json["issue"][0]["code"], "not-found");
        assert_eq!(json["issue"][0]["diagnostics"], "Resource not found");
    }

    #[test]
    fn test_issue_with_expression() {
        let outcome = OperationOutcome::single(
            Issue::error(IssueType::Required, "Name is required").with_expression("Patient.name"),
        );
        let json = outcome.to_json();

        assert_eq!(json["issue"][0]["expression"][0], "Patient.name");
    }

    #[test]
    fn test_single_issue_status() {
        let outcome = OperationOutcome::new().error(IssueType::NotFound, "gone");
        assert_eq!(outcome.http_status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_highest_severity_wins() {
        let outcome = OperationOutcome::new()
            .warning(IssueType::NotFound, "minor")
            .fatal(IssueType::Exception, "boom");
        assert_eq!(outcome.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_tied_statuses_round_down() {
        let outcome = OperationOutcome::new()
            .error(IssueType::NotFound, "missing")
            .error(IssueType::Invalid, "bad");
        assert_eq!(outcome.http_status(), StatusCode::BAD_REQUEST);

        let outcome = OperationOutcome::new()
            .error(IssueType::NotFound, "missing")
            .error(IssueType::Conflict, "clash");
        assert_eq!(outcome.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_tied_statuses_across_hundreds() {
        let outcome = OperationOutcome::new()
            .error(IssueType::NotFound, "missing")
            .error(IssueType::Exception, "boom");
        assert_eq!(outcome.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_empty_outcome_is_server_error() {
        assert_eq!(
            OperationOutcome::new().http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": [
                {"severity": "fatal", "code": "not-supported", "diagnostics": "nope"},
                {"severity": "information", "code": "some-new-code"}
            ]
        });
        let outcome = OperationOutcome::from_json(&json).unwrap();

        assert_eq!(outcome.issues().len(), 2);
        assert_eq!(outcome.issues()[0].code, IssueType::NotSupported);
        assert_eq!(
            outcome.issues()[1].code,
            IssueType::Other("some-new-code".to_string())
        );
        assert!(outcome.has_errors());
    }

    #[test]
    fn test_unrecognised_code_renders_back_unchanged() {
        let json = serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": [
                {"severity": "error", "code": "x-vendor-quota", "diagnostics": "slow down"},
                {"severity": "error", "code": "unknown"}
            ]
        });
        let outcome = OperationOutcome::from_json(&json).unwrap();

        assert_eq!(outcome.to_json(), json);
        assert_eq!(outcome.issues()[1].code, IssueType::Unknown);
        assert_eq!(IssueType::from_code("x-vendor-quota").http_status(), 500);
        assert_eq!(IssueType::Unknown.http_status(), 401);
    }

    #[test]
    fn test_from_json_rejects_other_resources() {
        let json = serde_json::json!({"resourceType": "Patient"});
        assert!(OperationOutcome::from_json(&json).is_none());
    }
}
