//! Handshake types.

use serde::{Deserialize, Serialize};

use super::Implementation;
use super::capabilities::{ClientCapabilities, ServerCapabilities};
use crate::version::{ProtocolVersion, VersionRange};

/// Params of the `initialize` request.
///
/// `protocolVersion` carries the newest revision the client speaks, as MCP
/// requires; `supportedVersions` additionally advertises the full range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeRequest {
    /// Newest protocol revision the client supports
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,
    /// Full range of revisions the client supports
    #[serde(rename = "supportedVersions", default, skip_serializing_if = "Option::is_none")]
    pub supported_versions: Option<VersionRange>,
    /// Client capabilities
    pub capabilities: ClientCapabilities,
    /// Client implementation info
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Revision the server chose
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,
    /// Full range of revisions the server supports, when it advertises one
    #[serde(rename = "supportedVersions", default, skip_serializing_if = "Option::is_none")]
    pub supported_versions: Option<VersionRange>,
    /// Server capabilities
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// Server implementation info
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    /// Usage hints for the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl InitializeResult {
    /// Revisions the server supports: its advertised range, or just the
    /// revision it answered with.
    pub fn server_range(&self) -> VersionRange {
        self.supported_versions
            .clone()
            .unwrap_or_else(|| VersionRange::exactly(self.protocol_version.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_server_range_falls_back_to_single_version() {
        let result: InitializeResult = serde_json::from_value(json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "serverInfo": {"name": "srv", "version": "1.0"}
        }))
        .unwrap();
        assert_eq!(
            result.server_range(),
            VersionRange::parse("2025-03-26", "2025-03-26").unwrap()
        );
    }

    #[test]
    fn test_server_range_uses_advertised_range() {
        let result: InitializeResult = serde_json::from_value(json!({
            "protocolVersion": "5",
            "supportedVersions": {"min": "2", "max": "5"},
            "serverInfo": {"name": "srv", "version": "1.0"}
        }))
        .unwrap();
        assert_eq!(result.server_range(), VersionRange::parse("2", "5").unwrap());
    }

    #[test]
    fn test_request_wire_names() {
        let request = InitializeRequest {
            protocol_version: ProtocolVersion::parse("3").unwrap(),
            supported_versions: Some(VersionRange::parse("1", "3").unwrap()),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation::new("tether", "0.4.0"),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "protocolVersion": "3",
                "supportedVersions": {"min": "1", "max": "3"},
                "capabilities": {},
                "clientInfo": {"name": "tether", "version": "0.4.0"}
            })
        );
    }
}
