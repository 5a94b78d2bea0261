//! Exoscale compute API request and response models.
//!
//! Responses are wrapped in a `<command>response` envelope; the client
//! unwraps it before deserializing into these types.

use serde::Deserialize;

// ============================================================================
// Lookup types
// ============================================================================

/// Zone.
#[derive(Debug, Clone, Deserialize)]
pub struct Zone {
    /// Zone ID.
    pub id: String,
    /// Zone name (e.g., "ch-dk-2").
    pub name: String,
}

/// `listZones` response.
#[derive(Debug, Default, Deserialize)]
pub struct ListZonesResponse {
    /// Matching zones.
    #[serde(default)]
    pub zone: Vec<Zone>,
}

/// OS template.
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    /// Template ID.
    pub id: String,
    /// Template name.
    pub name: String,
    /// Root disk size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
}

/// `listTemplates` response.
#[derive(Debug, Default, Deserialize)]
pub struct ListTemplatesResponse {
    /// Matching templates, one per disk size.
    #[serde(default)]
    pub template: Vec<Template>,
}

/// Service offering (instance size).
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceOffering {
    /// Offering ID.
    pub id: String,
    /// Offering name (e.g., "Micro").
    pub name: String,
}

/// `listServiceOfferings` response.
#[derive(Debug, Default, Deserialize)]
pub struct ListServiceOfferingsResponse {
    /// Matching offerings.
    #[serde(default)]
    pub serviceoffering: Vec<ServiceOffering>,
}

/// Security group.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityGroup {
    /// Security group ID.
    pub id: String,
    /// Security group name.
    pub name: String,
}

/// `listSecurityGroups` response.
#[derive(Debug, Default, Deserialize)]
pub struct ListSecurityGroupsResponse {
    /// Matching security groups.
    #[serde(default)]
    pub securitygroup: Vec<SecurityGroup>,
}

// ============================================================================
// Async job types
// ============================================================================

/// Response of any asynchronous command.
#[derive(Debug, Deserialize)]
pub struct AsyncJobResponse {
    /// Job ID to poll.
    pub jobid: String,
    /// Resource ID, when the API already knows it.
    #[serde(default)]
    pub id: Option<String>,
}

/// `queryAsyncJobResult` response.
#[derive(Debug, Deserialize)]
pub struct AsyncJobResult {
    /// Job ID.
    pub jobid: String,
    /// 0 = pending, 1 = success, 2 = failure.
    pub jobstatus: i32,
    /// Command-specific result or error body.
    #[serde(default)]
    pub jobresult: Option<serde_json::Value>,
}

/// Job status codes.
pub const JOB_PENDING: i32 = 0;
/// Job completed successfully.
pub const JOB_SUCCESS: i32 = 1;
/// Job failed.
pub const JOB_FAILURE: i32 = 2;

/// Result body of a finished `deployVirtualMachine` job.
#[derive(Debug, Deserialize)]
pub struct DeployJobResult {
    /// The created VM.
    pub virtualmachine: VirtualMachine,
}

/// Error body returned by the API or carried in a failed job.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// CloudStack error code (e.g., 431 for bad parameters).
    #[serde(default)]
    pub errorcode: u16,
    /// Human-readable error.
    #[serde(default)]
    pub errortext: String,
}

// ============================================================================
// Virtual machine types
// ============================================================================

/// Network interface.
#[derive(Debug, Clone, Deserialize)]
pub struct Nic {
    /// IPv4 address.
    #[serde(default)]
    pub ipaddress: Option<String>,
    /// IPv6 address.
    #[serde(default)]
    pub ip6address: Option<String>,
    /// Whether this is the default NIC.
    #[serde(default)]
    pub isdefault: bool,
}

/// Virtual machine.
#[derive(Debug, Clone, Deserialize)]
pub struct VirtualMachine {
    /// VM ID.
    pub id: String,
    /// VM name.
    #[serde(default)]
    pub name: Option<String>,
    /// State: "Starting", "Running", "Stopping", "Stopped", "Destroyed",
    /// "Expunging", "Error", ...
    #[serde(default)]
    pub state: Option<String>,
    /// Attached NICs.
    #[serde(default)]
    pub nic: Vec<Nic>,
}

/// `listVirtualMachines` response.
#[derive(Debug, Default, Deserialize)]
pub struct ListVirtualMachinesResponse {
    /// Matching VMs.
    #[serde(default)]
    pub virtualmachine: Vec<VirtualMachine>,
}
