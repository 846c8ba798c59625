//! Analysis request types.
//!
//! [`EngineRequest`] is the loose wire shape a caller sends. It only becomes an
//! [`AnalysisRequest`] through [`AnalysisRequest::validate`], so every request
//! the engine works with is well-formed and immutable.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::{Capability, Domain};
use crate::catalog::SubjectKind;
use crate::errors::ValidationError;

lazy_static! {
    static ref URL_RE: Regex =
        Regex::new(r"^https?://[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*(:\d{1,5})?(/\S*)?$").unwrap();
    static ref HOSTNAME_RE: Regex = Regex::new(
        r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$"
    )
    .unwrap();
    static ref HEX_ADDRESS_RE: Regex = Regex::new(r"^0x[0-9a-fA-F]{1,64}$").unwrap();
    static ref BASE58_ADDRESS_RE: Regex =
        Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{26,64}$").unwrap();
    static ref CAPABILITY_RE: Regex = Regex::new(r"^[a-z][a-z0-9_]{0,63}$").unwrap();
    static ref TIMEFRAME_RE: Regex = Regex::new(r"^(\d{1,4}[hdwmy]|all)$").unwrap();
}

/// How deep an analysis should go.
///
/// Ordered: `Basic < Detailed < Comprehensive`. Catalog metrics declare the
/// minimum depth at which they are expected.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    #[default]
    Basic,
    Detailed,
    Comprehensive,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Detailed => "detailed",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Depth {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "detailed" => Ok(Self::Detailed),
            "comprehensive" => Ok(Self::Comprehensive),
            other => Err(ValidationError::UnknownDepth(other.to_string())),
        }
    }
}

/// Request as received from a caller, before validation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRequest {
    pub subject: String,
    pub domain: String,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub depth: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub requester_id: Option<String>,
}

/// A validated, immutable analysis request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    subject: String,
    domain: Domain,
    capabilities: BTreeSet<Capability>,
    depth: Depth,
    timeframe: Option<String>,
    requester_id: Option<String>,
}

impl AnalysisRequest {
    /// Validate a wire request.
    ///
    /// `subject_kind` comes from the capability catalog's entry for the
    /// request's domain; `None` (unknown domain) accepts any supported subject
    /// format.
    pub fn validate(
        request: EngineRequest,
        subject_kind: Option<SubjectKind>,
    ) -> Result<Self, ValidationError> {
        let subject = request.subject.trim().to_string();
        if subject.is_empty() {
            return Err(ValidationError::EmptySubject);
        }

        let domain = request.domain.trim().to_ascii_lowercase();
        if domain.is_empty() {
            return Err(ValidationError::EmptyDomain);
        }

        if !subject_matches(&subject, subject_kind) {
            return Err(ValidationError::MalformedSubject { subject, domain });
        }

        let mut capabilities = BTreeSet::new();
        for raw in &request.capabilities {
            let name = raw.trim().to_ascii_lowercase();
            if !CAPABILITY_RE.is_match(&name) {
                return Err(ValidationError::MalformedCapability(raw.clone()));
            }
            capabilities.insert(name);
        }
        if capabilities.is_empty() {
            return Err(ValidationError::NoCapabilities);
        }

        let depth = match request.depth.as_deref() {
            Some(raw) => raw.parse()?,
            None => Depth::default(),
        };

        let timeframe = match request.timeframe {
            Some(raw) => {
                let normalized = raw.trim().to_ascii_lowercase();
                if !TIMEFRAME_RE.is_match(&normalized) {
                    return Err(ValidationError::MalformedTimeframe(raw));
                }
                Some(normalized)
            }
            None => None,
        };

        let requester_id = request
            .requester_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        Ok(Self {
            subject,
            domain,
            capabilities,
            depth,
            timeframe,
            requester_id,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Requested capabilities, sorted and deduplicated.
    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    pub fn timeframe(&self) -> Option<&str> {
        self.timeframe.as_deref()
    }

    pub fn requester_id(&self) -> Option<&str> {
        self.requester_id.as_deref()
    }
}

fn subject_matches(subject: &str, kind: Option<SubjectKind>) -> bool {
    let web = || URL_RE.is_match(subject) || HOSTNAME_RE.is_match(subject);
    let chain = || HEX_ADDRESS_RE.is_match(subject) || BASE58_ADDRESS_RE.is_match(subject);
    match kind {
        Some(SubjectKind::Web) => web(),
        Some(SubjectKind::Chain) => chain(),
        None => web() || chain(),
    }
}

/// What a provider adapter receives for a single call: the request plus the
/// one capability this call is for.
#[derive(Clone, Copy, Debug)]
pub struct ProviderRequest<'a> {
    pub request: &'a AnalysisRequest,
    pub capability: &'a str,
}
