/// Protocol revisions this server can speak, oldest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Version assumed when an HTTP client omits the `MCP-Protocol-Version`
/// header, per the transport section of the MCP specification.
pub const DEFAULT_NEGOTIATED_VERSION: &str = "2025-03-26";
