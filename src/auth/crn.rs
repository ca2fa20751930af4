//! Cloud Resource Name validation.
//!
//! A CRN has ten colon-delimited segments:
//!
//! ```text
//! crn:version:cname:ctype:service-name:location:scope:service-instance:resource-type:resource
//! ```
//!
//! Everything up to and including `service-instance` is mandatory. The
//! `resource-type` and `resource` qualifiers may be empty, which is how an
//! instance-level CRN such as `crn:v1:bluemix:public:mdm:us-south:a/1234:5678::`
//! is written. One trailing `:` after the resource segment is tolerated.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SEGMENT_NAMES: [&str; 10] = [
    "crn",
    "version",
    "cname",
    "ctype",
    "service-name",
    "location",
    "scope",
    "service-instance",
    "resource-type",
    "resource",
];

/// Segments that must be non-empty (`crn` through `service-instance`).
const MANDATORY_SEGMENTS: usize = 8;

const PREFIX: &str = "crn";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrnValidationError {
    #[error("CRN is empty")]
    Empty,
    #[error("CRN must start with the 'crn' literal, found '{0}'")]
    MissingPrefix(String),
    #[error("CRN must have {expected} colon-delimited segments, found {found}")]
    SegmentCount { expected: usize, found: usize },
    #[error("CRN segment '{0}' must not be empty")]
    EmptySegment(&'static str),
}

/// A validated CRN. Holds the exact string it was validated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Crn {
    raw: String,
}

/// Validate `candidate` against the CRN schema.
pub fn validate(candidate: &str) -> Result<Crn, CrnValidationError> {
    if candidate.is_empty() {
        return Err(CrnValidationError::Empty);
    }

    let mut segments: Vec<&str> = candidate.split(':').collect();
    if segments.len() == SEGMENT_NAMES.len() + 1 && segments.last() == Some(&"") {
        segments.pop();
    }
    if segments.len() != SEGMENT_NAMES.len() {
        return Err(CrnValidationError::SegmentCount {
            expected: SEGMENT_NAMES.len(),
            found: segments.len(),
        });
    }
    if segments[0] != PREFIX {
        return Err(CrnValidationError::MissingPrefix(segments[0].to_string()));
    }
    if let Some((name, _)) = SEGMENT_NAMES
        .iter()
        .zip(&segments)
        .take(MANDATORY_SEGMENTS)
        .find(|(_, segment)| segment.is_empty())
    {
        return Err(CrnValidationError::EmptySegment(name));
    }

    Ok(Crn {
        raw: candidate.to_string(),
    })
}

impl Crn {
    pub fn parse(candidate: &str) -> Result<Self, CrnValidationError> {
        validate(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn into_inner(self) -> String {
        self.raw
    }

    fn segment(&self, index: usize) -> &str {
        self.raw.split(':').nth(index).unwrap_or("")
    }

    pub fn version(&self) -> &str {
        self.segment(1)
    }

    pub fn cname(&self) -> &str {
        self.segment(2)
    }

    pub fn ctype(&self) -> &str {
        self.segment(3)
    }

    pub fn service_name(&self) -> &str {
        self.segment(4)
    }

    pub fn location(&self) -> &str {
        self.segment(5)
    }

    pub fn scope(&self) -> &str {
        self.segment(6)
    }

    pub fn service_instance(&self) -> &str {
        self.segment(7)
    }

    /// Empty for instance-level CRNs.
    pub fn resource_type(&self) -> &str {
        self.segment(8)
    }

    pub fn resource(&self) -> &str {
        self.segment(9)
    }

    /// Account id from an account scope (`a/<account-id>`), used as the tenant id.
    pub fn tenant_id(&self) -> Option<&str> {
        self.scope()
            .strip_prefix("a/")
            .filter(|account| !account.is_empty())
    }
}

impl fmt::Display for Crn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for Crn {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Crn {
    type Err = CrnValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE_CRN: &str =
        "crn:v1:bluemix:public:mdm:us-south:a/122c69f0e8296804c9eebf4dfd4fcdc3:7d3b1c2e-1f3a-4b5c-9d8e-0a1b2c3d4e5f::";

    #[test]
    fn accepts_instance_level_crn() {
        let crn = validate(INSTANCE_CRN).unwrap();
        assert_eq!(crn.as_str(), INSTANCE_CRN);
        assert_eq!(crn.service_name(), "mdm");
        assert_eq!(crn.location(), "us-south");
        assert_eq!(crn.service_instance(), "7d3b1c2e-1f3a-4b5c-9d8e-0a1b2c3d4e5f");
        assert_eq!(crn.tenant_id(), Some("122c69f0e8296804c9eebf4dfd4fcdc3"));
        assert_eq!(crn.resource_type(), "");
    }

    #[test]
    fn accepts_trailing_terminator() {
        let raw = "crn:v1:bluemix:public:mdm:ca-tor:a/abc:instance:::";
        let crn = validate(raw).unwrap();
        assert_eq!(crn.to_string(), raw);
        assert_eq!(crn.tenant_id(), Some("abc"));
    }

    #[test]
    fn accepts_fully_qualified_crn() {
        let raw = "crn:v1:bluemix:public:mdm:eu-de:a/acc:inst:record:12345";
        let crn: Crn = raw.parse().unwrap();
        assert_eq!(crn.resource_type(), "record");
        assert_eq!(crn.resource(), "12345");
    }

    #[test]
    fn rejects_too_few_segments() {
        assert_eq!(
            validate("crn:v1:bluemix"),
            Err(CrnValidationError::SegmentCount {
                expected: 10,
                found: 3
            })
        );
    }

    #[test]
    fn rejects_too_many_segments() {
        let err = validate("crn:v1:bluemix:public:mdm:eu-de:a/acc:inst:record:12345:extra");
        assert!(matches!(err, Err(CrnValidationError::SegmentCount { found: 11, .. })));
    }

    #[test]
    fn rejects_empty_mandatory_segment() {
        assert_eq!(
            validate("crn:v1:bluemix:public::eu-de:a/acc:inst::"),
            Err(CrnValidationError::EmptySegment("service-name"))
        );
        assert_eq!(
            validate("crn:v1:bluemix:public:mdm:eu-de:a/acc:::"),
            Err(CrnValidationError::EmptySegment("service-instance"))
        );
    }

    #[test]
    fn rejects_wrong_prefix_and_empty_input() {
        assert_eq!(
            validate("urn:v1:bluemix:public:mdm:eu-de:a/acc:inst::"),
            Err(CrnValidationError::MissingPrefix("urn".to_string()))
        );
        assert_eq!(validate(""), Err(CrnValidationError::Empty));
    }

    #[test]
    fn tenant_requires_account_scope() {
        let crn = validate("crn:v1:bluemix:public:mdm:eu-de:s/space:inst::").unwrap();
        assert_eq!(crn.tenant_id(), None);
    }
}
