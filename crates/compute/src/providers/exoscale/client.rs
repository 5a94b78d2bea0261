//! Exoscale compute API client implementation.
//!
//! API Documentation: <https://community.exoscale.com/api/compute/>

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use sha1::Sha1;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use super::models::{
    AsyncJobResponse, AsyncJobResult, DeployJobResult, ErrorResponse, ListSecurityGroupsResponse,
    ListServiceOfferingsResponse, ListTemplatesResponse, ListVirtualMachinesResponse,
    ListZonesResponse, VirtualMachine, JOB_FAILURE, JOB_PENDING, JOB_SUCCESS,
};
use crate::config::Credentials;
use crate::providers::traits::{ComputeProvider, JobStatus, LifecycleState, ProviderError};
use crate::vm::{JobId, Template, VmId, VmSpec};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Bytes per GB as the API reports template sizes.
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

type HmacSha1 = Hmac<Sha1>;

/// Exoscale compute provider.
#[derive(Clone)]
pub struct Exoscale {
    /// HTTP client.
    client: Client,
    /// API endpoint (e.g., `https://api.exoscale.ch/compute`).
    endpoint: String,
    /// API key and secret.
    credentials: Credentials,
}

impl Exoscale {
    /// Create a new Exoscale provider.
    ///
    /// # Arguments
    /// * `endpoint` - Compute API endpoint
    /// * `credentials` - API key and secret
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(
        endpoint: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            credentials,
        })
    }

    /// Percent-encode a query value. Spaces become `%20`, not `+`.
    fn encode(value: &str) -> String {
        form_urlencoded::byte_serialize(value.as_bytes())
            .collect::<String>()
            .replace('+', "%20")
    }

    /// Query string with parameters sorted by lowercased key.
    fn canonical_query(params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by_key(|(key, _)| key.to_lowercase());
        sorted
            .iter()
            .map(|(key, value)| format!("{key}={}", Self::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Generate the request signature: base64 HMAC-SHA1 of the lowercased
    /// canonical query.
    fn generate_signature(&self, query: &str) -> Result<String, ProviderError> {
        let mut mac = HmacSha1::new_from_slice(self.credentials.api_secret().as_bytes())
            .map_err(|e| ProviderError::Config(format!("invalid API secret: {e}")))?;
        mac.update(query.to_lowercase().as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Build the signed URL for a command.
    fn signed_url(&self, command: &str, params: &[(&str, String)]) -> Result<String, ProviderError> {
        let mut all: Vec<(&str, String)> = Vec::with_capacity(params.len() + 3);
        all.push(("command", command.to_string()));
        all.push(("apiKey", self.credentials.api_key().to_string()));
        all.push(("response", "json".to_string()));
        all.extend(params.iter().cloned());

        let query = Self::canonical_query(&all);
        let signature = self.generate_signature(&query)?;
        Ok(format!(
            "{}?{query}&signature={}",
            self.endpoint,
            Self::encode(&signature)
        ))
    }

    /// Make an authenticated API call and unwrap the response envelope.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        command: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = self.signed_url(command, params)?;
        debug!(command, "GET request");

        let response = self.client.get(&url).send().await?;
        self.handle_response(command, response).await
    }

    /// Handle API response, parsing JSON or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        command: &str,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let text = response.text().await?;
        let key = format!("{}response", command.to_lowercase());

        if !status.is_success() {
            return Err(Self::classify_error(status, &key, &text));
        }

        let mut envelope: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %text, "Failed to parse response");
            ProviderError::Serialization(e)
        })?;
        let body = envelope
            .get_mut(&key)
            .map(serde_json::Value::take)
            .ok_or_else(|| ProviderError::Api {
                status: status.as_u16(),
                message: format!("response is missing `{key}`"),
            })?;

        serde_json::from_value(body).map_err(|e| {
            warn!(error = %e, command, "Failed to decode response body");
            ProviderError::Serialization(e)
        })
    }

    /// Map an error response to the matching [`ProviderError`].
    fn classify_error(status: StatusCode, key: &str, text: &str) -> ProviderError {
        let error = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|mut v| v.get_mut(key).map(serde_json::Value::take))
            .and_then(|v| serde_json::from_value::<ErrorResponse>(v).ok());

        let (code, message) = match error {
            Some(e) if e.errorcode != 0 => (e.errorcode, e.errortext),
            Some(e) => (status.as_u16(), e.errortext),
            None => (status.as_u16(), text.to_string()),
        };
        Self::classify(code, message)
    }

    fn classify(code: u16, message: String) -> ProviderError {
        let lower = message.to_lowercase();
        if lower.contains("already") {
            ProviderError::AlreadyInState(message)
        } else if code == StatusCode::NOT_FOUND.as_u16()
            || lower.contains("does not exist")
            || lower.contains("not found")
            || lower.contains("unable to find")
        {
            ProviderError::NotFound(message)
        } else {
            ProviderError::Api {
                status: code,
                message,
            }
        }
    }

    /// Convert an API state string to our state.
    fn to_state(state: Option<&str>) -> LifecycleState {
        match state {
            Some("Creating" | "Allocated") => LifecycleState::Provisioning,
            Some("Starting") => LifecycleState::Starting,
            Some("Running") => LifecycleState::Running,
            Some("Stopping") => LifecycleState::Stopping,
            Some("Stopped") => LifecycleState::Stopped,
            Some("Expunging") => LifecycleState::Destroying,
            Some("Destroyed" | "Expunged") => LifecycleState::Destroyed,
            _ => LifecycleState::Unknown,
        }
    }

    /// Collect every parseable NIC address.
    fn to_ips(vm: &VirtualMachine) -> BTreeSet<IpAddr> {
        vm.nic
            .iter()
            .flat_map(|nic| [nic.ipaddress.as_deref(), nic.ip6address.as_deref()])
            .flatten()
            .filter_map(|raw| match raw.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warn!(vm_id = %vm.id, address = %raw, "Ignoring unparseable address");
                    None
                }
            })
            .collect()
    }

    /// Fetch a VM by ID; `None` if the API no longer knows it.
    async fn find_vm(&self, id: &VmId) -> Result<Option<VirtualMachine>, ProviderError> {
        let response: Result<ListVirtualMachinesResponse, _> = self
            .call("listVirtualMachines", &[("id", id.to_string())])
            .await;
        match response {
            Ok(list) => Ok(list.virtualmachine.into_iter().find(|vm| vm.id == id.as_str())),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve a zone name to its ID.
    async fn zone_id(&self, name: &str) -> Result<String, ProviderError> {
        let response: ListZonesResponse = self
            .call("listZones", &[("name", name.to_string())])
            .await?;
        response
            .zone
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(name))
            .map(|z| z.id)
            .ok_or_else(|| ProviderError::NotFound(format!("zone {name}")))
    }

    /// Resolve a featured template by name and disk size within a zone.
    async fn template_id(&self, template: &Template, zone_id: &str) -> Result<String, ProviderError> {
        let response: ListTemplatesResponse = self
            .call(
                "listTemplates",
                &[
                    ("templatefilter", "featured".to_string()),
                    ("zoneid", zone_id.to_string()),
                    ("name", template.name.clone()),
                ],
            )
            .await?;

        let wanted = u64::from(template.storage_gb) * BYTES_PER_GB;
        response
            .template
            .into_iter()
            .find(|t| t.name == template.name && t.size == Some(wanted))
            .map(|t| t.id)
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "template {} ({} GB) in zone {}",
                    template.name, template.storage_gb, template.zone
                ))
            })
    }

    /// Resolve a service offering name to its ID.
    async fn service_offering_id(&self, name: &str) -> Result<String, ProviderError> {
        let response: ListServiceOfferingsResponse = self
            .call("listServiceOfferings", &[("name", name.to_string())])
            .await?;
        response
            .serviceoffering
            .into_iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
            .map(|o| o.id)
            .ok_or_else(|| ProviderError::NotFound(format!("service offering {name}")))
    }

    /// Resolve security group names to IDs.
    async fn security_group_ids(&self, names: &[String]) -> Result<Vec<String>, ProviderError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let response: ListSecurityGroupsResponse = self
                .call("listSecurityGroups", &[("securitygroupname", name.clone())])
                .await?;
            let id = response
                .securitygroup
                .into_iter()
                .find(|g| &g.name == name)
                .map(|g| g.id)
                .ok_or_else(|| ProviderError::NotFound(format!("security group {name}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Submit an asynchronous VM command and return its job ID.
    async fn submit(&self, command: &str, id: &VmId) -> Result<JobId, ProviderError> {
        let response: AsyncJobResponse = self.call(command, &[("id", id.to_string())]).await?;
        debug!(command, vm_id = %id, job_id = %response.jobid, "Job submitted");
        Ok(JobId::from(response.jobid))
    }
}

#[async_trait]
impl ComputeProvider for Exoscale {
    async fn provision(&self, spec: &VmSpec) -> Result<JobId, ProviderError> {
        info!(
            name = %spec.name,
            template = %spec.template.name,
            offering = %spec.offering,
            zone = %spec.zone,
            "Deploying VM"
        );

        let zone_id = self.zone_id(&spec.zone).await?;
        let template_zone_id = if spec.template.zone == spec.zone {
            zone_id.clone()
        } else {
            self.zone_id(&spec.template.zone).await?
        };
        let template_id = self.template_id(&spec.template, &template_zone_id).await?;
        let offering_id = self.service_offering_id(&spec.offering).await?;
        let group_ids = self.security_group_ids(&spec.security_groups).await?;

        let mut params = vec![
            ("zoneid", zone_id),
            ("templateid", template_id),
            ("serviceofferingid", offering_id),
            ("name", spec.name.clone()),
            ("displayname", spec.name.clone()),
        ];
        if !group_ids.is_empty() {
            params.push(("securitygroupids", group_ids.join(",")));
        }
        if let Some(keypair) = &spec.keypair {
            params.push(("keypair", keypair.clone()));
        }
        if let Some(user_data) = &spec.user_data {
            params.push(("userdata", STANDARD.encode(user_data)));
        }

        let response: AsyncJobResponse = self.call("deployVirtualMachine", &params).await?;

        info!(
            job_id = %response.jobid,
            vm_id = response.id.as_deref().unwrap_or("-"),
            "Deployment submitted"
        );

        Ok(JobId::from(response.jobid))
    }

    async fn query_job(&self, job_id: &JobId) -> Result<JobStatus, ProviderError> {
        let result: AsyncJobResult = self
            .call("queryAsyncJobResult", &[("jobid", job_id.to_string())])
            .await?;

        match result.jobstatus {
            JOB_PENDING => Ok(JobStatus::Pending),
            JOB_SUCCESS => {
                let body = result.jobresult.ok_or_else(|| {
                    ProviderError::Serialization(serde::de::Error::custom(format!(
                        "job {} succeeded without a result",
                        result.jobid
                    )))
                })?;
                let deployed: DeployJobResult = serde_json::from_value(body)?;
                Ok(JobStatus::Success(VmId::from(deployed.virtualmachine.id)))
            }
            JOB_FAILURE => {
                let detail = result
                    .jobresult
                    .and_then(|v| serde_json::from_value::<ErrorResponse>(v).ok())
                    .map(|e| e.errortext)
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| "job failed without error text".to_string());
                Ok(JobStatus::Failure(detail))
            }
            other => Err(ProviderError::Api {
                status: 0,
                message: format!("job {} has unknown status {other}", result.jobid),
            }),
        }
    }

    async fn start(&self, id: &VmId) -> Result<(), ProviderError> {
        info!(vm_id = %id, "Starting VM");
        self.submit("startVirtualMachine", id).await?;
        Ok(())
    }

    async fn halt(&self, id: &VmId) -> Result<(), ProviderError> {
        info!(vm_id = %id, "Stopping VM");
        self.submit("stopVirtualMachine", id).await?;
        Ok(())
    }

    async fn destroy(&self, id: &VmId) -> Result<(), ProviderError> {
        info!(vm_id = %id, "Destroying VM");
        self.submit("destroyVirtualMachine", id).await?;
        info!(vm_id = %id, "Destroy submitted");
        Ok(())
    }

    async fn get_state(&self, id: &VmId) -> Result<LifecycleState, ProviderError> {
        Ok(match self.find_vm(id).await? {
            Some(vm) => Self::to_state(vm.state.as_deref()),
            None => LifecycleState::Destroyed,
        })
    }

    async fn get_ips(&self, id: &VmId) -> Result<BTreeSet<IpAddr>, ProviderError> {
        Ok(self
            .find_vm(id)
            .await?
            .map(|vm| Self::to_ips(&vm))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn credentials() -> Credentials {
        Credentials::from_parts(Some("EXO-KEY".into()), Some("s3cret".into())).unwrap()
    }

    async fn provider(server: &MockServer) -> Exoscale {
        Exoscale::new(format!("{}/compute", server.uri()), credentials()).unwrap()
    }

    async fn mount(server: &MockServer, command: &str, status: u16, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/compute"))
            .and(query_param("command", command))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_canonical_query_sorting_and_encoding() {
        let query = Exoscale::canonical_query(&[
            ("response", "json".to_string()),
            ("command", "listSecurityGroups".to_string()),
            ("apiKey", "KEY".to_string()),
            ("securitygroupname", "second sg".to_string()),
        ]);
        assert_eq!(
            query,
            "apiKey=KEY&command=listSecurityGroups&response=json&securitygroupname=second%20sg"
        );
    }

    #[test]
    fn test_signature_is_case_insensitive_hmac() {
        let exo = Exoscale::new("https://example.invalid/compute", credentials()).unwrap();
        let query = "apiKey=EXO-KEY&command=listZones&response=json";

        let mut mac = HmacSha1::new_from_slice(b"s3cret").unwrap();
        mac.update(query.to_lowercase().as_bytes());
        let expected = STANDARD.encode(mac.finalize().into_bytes());

        assert_eq!(exo.generate_signature(query).unwrap(), expected);
        assert_eq!(
            exo.generate_signature(&query.to_lowercase()).unwrap(),
            expected
        );
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(Exoscale::to_state(Some("Running")), LifecycleState::Running);
        assert_eq!(Exoscale::to_state(Some("Expunging")), LifecycleState::Destroying);
        assert_eq!(Exoscale::to_state(Some("Migrating")), LifecycleState::Unknown);
        assert_eq!(Exoscale::to_state(None), LifecycleState::Unknown);
    }

    #[tokio::test]
    async fn test_requests_are_signed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compute"))
            .and(query_param("command", "queryAsyncJobResult"))
            .and(query_param("apiKey", "EXO-KEY"))
            .and(query_param("response", "json"))
            .and(query_param("jobid", "job-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queryasyncjobresultresponse": { "jobid": "job-1", "jobstatus": 0 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let exo = provider(&server).await;
        exo.query_job(&JobId::from("job-1")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let signature = requests[0]
            .url
            .query_pairs()
            .find(|(k, _)| k == "signature")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let expected = exo
            .generate_signature(
                "apiKey=EXO-KEY&command=queryAsyncJobResult&jobid=job-1&response=json",
            )
            .unwrap();
        assert_eq!(signature, expected);
    }

    #[tokio::test]
    async fn test_query_job_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("jobid", "pending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queryasyncjobresultresponse": { "jobid": "pending", "jobstatus": 0 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("jobid", "done"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queryasyncjobresultresponse": {
                    "jobid": "done",
                    "jobstatus": 1,
                    "jobresult": { "virtualmachine": { "id": "vm-42", "state": "Running" } }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("jobid", "failed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queryasyncjobresultresponse": {
                    "jobid": "failed",
                    "jobstatus": 2,
                    "jobresult": { "errorcode": 530, "errortext": "Insufficient capacity" }
                }
            })))
            .mount(&server)
            .await;

        let exo = provider(&server).await;
        assert_eq!(
            exo.query_job(&JobId::from("pending")).await.unwrap(),
            JobStatus::Pending
        );
        assert_eq!(
            exo.query_job(&JobId::from("done")).await.unwrap(),
            JobStatus::Success(VmId::from("vm-42"))
        );
        assert_eq!(
            exo.query_job(&JobId::from("failed")).await.unwrap(),
            JobStatus::Failure("Insufficient capacity".into())
        );
    }

    #[tokio::test]
    async fn test_successful_job_without_result_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("command", "queryAsyncJobResult"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queryasyncjobresultresponse": { "jobid": "job-1", "jobstatus": 1 }
            })))
            .mount(&server)
            .await;

        let exo = provider(&server).await;
        let err = exo.query_job(&JobId::from("job-1")).await.unwrap_err();

        assert!(matches!(err, ProviderError::Serialization(_)));
        assert!(err.to_string().contains("without a result"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_unknown_vm_reads_destroyed_with_no_ips() {
        let server = MockServer::start().await;
        mount(
            &server,
            "listVirtualMachines",
            431,
            json!({
                "listvirtualmachinesresponse": {
                    "errorcode": 431,
                    "errortext": "Unable to execute API command listvirtualmachines due to invalid value. Invalid parameter id value=vm-gone due to incorrect long value format, or entity does not exist"
                }
            }),
        )
        .await;

        let exo = provider(&server).await;
        let id = VmId::from("vm-gone");
        assert_eq!(exo.get_state(&id).await.unwrap(), LifecycleState::Destroyed);
        assert!(exo.get_ips(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_and_ips() {
        let server = MockServer::start().await;
        mount(
            &server,
            "listVirtualMachines",
            200,
            json!({
                "listvirtualmachinesresponse": {
                    "count": 1,
                    "virtualmachine": [{
                        "id": "vm-42",
                        "name": "lifecycle-demo",
                        "state": "Running",
                        "nic": [{
                            "ipaddress": "185.19.28.10",
                            "ip6address": "2a04:c43:e00:6a87::1",
                            "isdefault": true
                        }]
                    }]
                }
            }),
        )
        .await;

        let exo = provider(&server).await;
        let id = VmId::from("vm-42");
        assert_eq!(exo.get_state(&id).await.unwrap(), LifecycleState::Running);

        let ips = exo.get_ips(&id).await.unwrap();
        assert_eq!(ips.len(), 2);
        assert!(ips.contains(&"185.19.28.10".parse::<IpAddr>().unwrap()));
    }

    #[tokio::test]
    async fn test_starting_vm_without_nic_has_no_ips() {
        let server = MockServer::start().await;
        mount(
            &server,
            "listVirtualMachines",
            200,
            json!({
                "listvirtualmachinesresponse": {
                    "count": 1,
                    "virtualmachine": [{ "id": "vm-42", "state": "Starting" }]
                }
            }),
        )
        .await;

        let exo = provider(&server).await;
        let id = VmId::from("vm-42");
        assert_eq!(exo.get_state(&id).await.unwrap(), LifecycleState::Starting);
        assert!(exo.get_ips(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_already_running_is_already_in_state() {
        let server = MockServer::start().await;
        mount(
            &server,
            "startVirtualMachine",
            431,
            json!({
                "startvirtualmachineresponse": {
                    "errorcode": 431,
                    "errortext": "VM vm-42 is already running"
                }
            }),
        )
        .await;

        let exo = provider(&server).await;
        let err = exo.start(&VmId::from("vm-42")).await.unwrap_err();
        assert!(matches!(err, ProviderError::AlreadyInState(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let exo = provider(&server).await;
        let err = exo.get_state(&VmId::from("vm-42")).await.unwrap_err();
        assert!(err.is_transient());
    }

    async fn mount_lookups(server: &MockServer) {
        mount(
            server,
            "listZones",
            200,
            json!({ "listzonesresponse": { "count": 1, "zone": [{ "id": "zone-1", "name": "ch-dk-2" }] } }),
        )
        .await;
        mount(
            server,
            "listTemplates",
            200,
            json!({ "listtemplatesresponse": { "count": 2, "template": [
                { "id": "tpl-50", "name": "Linux Ubuntu 16.04 LTS 64-bit", "size": 53_687_091_200_u64 },
                { "id": "tpl-10", "name": "Linux Ubuntu 16.04 LTS 64-bit", "size": 10_737_418_240_u64 }
            ] } }),
        )
        .await;
        mount(
            server,
            "listServiceOfferings",
            200,
            json!({ "listserviceofferingsresponse": { "count": 1, "serviceoffering": [{ "id": "so-micro", "name": "Micro" }] } }),
        )
        .await;
        Mock::given(method("GET"))
            .and(query_param("command", "listSecurityGroups"))
            .and(query_param("securitygroupname", "default"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "listsecuritygroupsresponse": { "count": 1, "securitygroup": [{ "id": "sg-1", "name": "default" }] }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_provision_resolves_names() {
        let server = MockServer::start().await;
        mount_lookups(&server).await;
        Mock::given(method("GET"))
            .and(query_param("command", "deployVirtualMachine"))
            .and(query_param("zoneid", "zone-1"))
            .and(query_param("templateid", "tpl-10"))
            .and(query_param("serviceofferingid", "so-micro"))
            .and(query_param("securitygroupids", "sg-1"))
            .and(query_param("keypair", "first"))
            .and(query_param("userdata", STANDARD.encode("#cloud-config\n")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "deployvirtualmachineresponse": { "id": "vm-42", "jobid": "job-1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let exo = provider(&server).await;
        let job = exo.provision(&crate::vm::test_spec()).await.unwrap();
        assert_eq!(job.as_str(), "job-1");
    }

    #[tokio::test]
    async fn test_provision_unknown_template_size() {
        let server = MockServer::start().await;
        mount_lookups(&server).await;

        let mut spec = crate::vm::test_spec();
        spec.template.storage_gb = 20;

        let exo = provider(&server).await;
        let err = exo.provision(&spec).await.unwrap_err();
        match err {
            ProviderError::NotFound(what) => assert!(what.contains("20 GB")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
