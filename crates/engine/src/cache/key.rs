use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::AnalysisRequest;

/// Field separator fed to the hasher so `("ab", "c")` and `("a", "bc")` differ.
const SEPARATOR: [u8; 1] = [0x1f];

/// Deterministic cache key: SHA-256 hex digest of the request's subject,
/// domain, sorted capability set, depth and timeframe.
///
/// The requester id is not part of the key.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(request: &AnalysisRequest) -> Self {
        let capabilities = request
            .capabilities()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let mut hasher = Sha256::new();
        for part in [
            request.subject(),
            request.domain(),
            capabilities.as_str(),
            request.depth().as_str(),
            request.timeframe().unwrap_or(""),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(SEPARATOR);
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a digest read back from a store.
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EngineRequest;

    fn request(capabilities: &[&str], depth: Option<&str>, requester: Option<&str>) -> AnalysisRequest {
        AnalysisRequest::validate(
            EngineRequest {
                subject: "0xABC123".to_string(),
                domain: "ethereum".to_string(),
                capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
                depth: depth.map(str::to_string),
                timeframe: None,
                requester_id: requester.map(str::to_string),
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_key_ignores_capability_order_and_requester() {
        let a = CacheKey::for_request(&request(&["tokens", "contract"], None, Some("alice")));
        let b = CacheKey::for_request(&request(&["contract", "tokens", "tokens"], None, Some("bob")));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_key_depends_on_depth_and_capabilities() {
        let basic = CacheKey::for_request(&request(&["tokens"], None, None));
        let deep = CacheKey::for_request(&request(&["tokens"], Some("comprehensive"), None));
        let more = CacheKey::for_request(&request(&["tokens", "contract"], None, None));
        assert_ne!(basic, deep);
        assert_ne!(basic, more);
    }
}
