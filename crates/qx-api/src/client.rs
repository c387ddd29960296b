//! High-level Quantum Experience operations.

use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::{QxError, QxResult};
use crate::execution::{
    ExecutionResult, ExecutionStatus, ExperimentResponse, fetch_result, is_truthy, string_field,
};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::poller::{ExecutionPoller, PollOutcome};
use crate::resolver::{BackendInfo, BackendResolver, EndpointKind, ResolvedBackend};
use crate::seed::Seed;
use crate::transport::TransportClient;

/// Header lines the service rejects in submitted programs.
const STRIPPED_HEADERS: [&str; 2] = ["IBMQASM 2.0;", "OPENQASM 2.0;"];

/// Options for [`QuantumExperience::run_experiment`].
#[derive(Debug, Clone, Default)]
pub struct ExperimentOptions {
    /// Experiment name; defaults to `Experiment #<timestamp>`.
    pub name: Option<String>,
    /// Simulator seed in decimal form.
    pub seed: Option<String>,
    /// Poll attempts; defaults to the configured poll timeout.
    pub timeout: Option<u32>,
}

impl ExperimentOptions {
    /// Set the experiment name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the simulator seed.
    pub fn with_seed(mut self, seed: impl ToString) -> Self {
        self.seed = Some(seed.to_string());
        self
    }

    /// Set the number of poll attempts; zero disables polling.
    pub fn with_timeout(mut self, timeout: u32) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for [`QuantumExperience::run_job`].
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Shots per program.
    pub shots: u32,
    /// Credit cap for the job.
    pub max_credits: u32,
    /// Simulator seed in decimal form.
    pub seed: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            shots: 1,
            max_credits: 3,
            seed: None,
        }
    }
}

/// Queue status of a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    /// Whether the backend accepts work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    /// Whether the backend is currently executing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy: Option<bool>,
    /// Jobs waiting in the queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_jobs: Option<u64>,
}

/// Quantum Experience API client.
#[derive(Debug)]
pub struct QuantumExperience {
    transport: TransportClient,
    poller: ExecutionPoller,
    resolver: BackendResolver,
    default_timeout: u32,
}

impl QuantumExperience {
    /// Connect using a `reqwest` transport.
    ///
    /// Logs in when an API token or email/password is configured; an
    /// injected access token is used as is.
    pub fn connect(config: ClientConfig) -> QxResult<Self> {
        let http = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Box::new(http))
    }

    /// Connect over a caller-provided transport.
    pub fn with_transport(config: ClientConfig, http: Box<dyn HttpTransport>) -> QxResult<Self> {
        let policy = config.retry_policy()?;
        let mut credentials = CredentialStore::new(
            config.base_url.trim_end_matches('/'),
            config.login_method(),
            config.client_application_header(),
        );

        let login_now = config.api_token.is_some() || config.access_token.is_none();
        if !login_now {
            if let Some(token) = &config.access_token {
                credentials.set_token(token.clone());
            }
            if let Some(user_id) = &config.user_id {
                credentials.set_user_id(user_id.clone());
            }
        }

        let mut transport = TransportClient::new(http, credentials, policy);
        if login_now {
            transport.login()?;
        }
        info!("connected to {}", config.base_url);

        Ok(Self {
            transport,
            poller: ExecutionPoller::new(config.poll_interval_duration()),
            resolver: BackendResolver,
            default_timeout: config.poll_timeout,
        })
    }

    /// Whether a session token is present.
    pub fn check_credentials(&self) -> bool {
        self.transport.credentials().is_authenticated()
    }

    /// Use an externally-obtained session token from now on.
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.transport.credentials_mut().set_token(token);
    }

    /// Use an externally-obtained user id from now on.
    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.transport.credentials_mut().set_user_id(user_id);
    }

    /// The underlying transport client.
    pub fn transport(&mut self) -> &mut TransportClient {
        &mut self.transport
    }

    fn require_credentials(&self) -> QxResult<()> {
        self.transport.credentials().require_token().map(|_| ())
    }

    fn require_user_id(&self) -> QxResult<String> {
        self.require_credentials()?;
        self.transport
            .credentials()
            .current_user_id()
            .map(str::to_string)
            .ok_or_else(|| QxError::Authentication("no user id for this session".into()))
    }

    // ------------------------------------------------------------------
    // Executions and codes
    // ------------------------------------------------------------------

    /// Get an execution, with its code embedded under `code`.
    #[instrument(skip(self))]
    pub fn get_execution(&mut self, id_execution: &str) -> QxResult<Value> {
        self.require_credentials()?;
        let mut execution = self.transport.get(&format!("/Executions/{id_execution}"), &[])?;
        let code_id = execution
            .as_object()
            .and_then(|e| string_field(e, "codeId"))
            .filter(|id| !id.is_empty());
        if let Some(code_id) = code_id {
            let code = self.get_code(&code_id)?;
            if let Some(obj) = execution.as_object_mut() {
                obj.insert("code".into(), code);
            }
        }
        Ok(execution)
    }

    /// Get the result of an execution; empty while it is still running.
    #[instrument(skip(self))]
    pub fn get_result_from_execution(&mut self, id_execution: &str) -> QxResult<ExecutionResult> {
        self.require_credentials()?;
        fetch_result(&mut self.transport, id_execution)
    }

    /// Get a code with its three most recent executions.
    #[instrument(skip(self))]
    pub fn get_code(&mut self, id_code: &str) -> QxResult<Value> {
        self.require_credentials()?;
        let mut code = self.transport.get(&format!("/Codes/{id_code}"), &[])?;
        let executions = self.transport.get(
            &format!("/Codes/{id_code}/executions"),
            &[("filter", json!({"limit": 3}).to_string())],
        )?;
        if executions.is_array() {
            if let Some(obj) = code.as_object_mut() {
                obj.insert("executions".into(), executions);
            }
        }
        Ok(code)
    }

    /// Get the URL of a code's rendered image.
    #[instrument(skip(self))]
    pub fn get_image_code(&mut self, id_code: &str) -> QxResult<Value> {
        self.require_credentials()?;
        self.transport
            .get(&format!("/Codes/{id_code}/export/png/url"), &[])
    }

    /// Get the user's latest codes, with executions.
    #[instrument(skip(self))]
    pub fn get_last_codes(&mut self) -> QxResult<Value> {
        let user_id = self.require_user_id()?;
        let mut response = self.transport.get(
            &format!("/users/{user_id}/codes/lastest"),
            &[("includeExecutions", "true".to_string())],
        )?;
        response
            .get_mut("codes")
            .map(Value::take)
            .ok_or_else(|| QxError::UnexpectedResponse("latest codes without `codes`".into()))
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Run a program and wait (bounded) for its result.
    ///
    /// When the submission answer is already `DONE` or `ERROR` no polling
    /// happens. Otherwise the execution is polled up to `options.timeout`
    /// times; if it is still running afterwards the last known status is
    /// returned with `timed_out` set.
    #[instrument(skip(self, qasm, options))]
    pub fn run_experiment(
        &mut self,
        qasm: &str,
        backend: &str,
        shots: u32,
        options: ExperimentOptions,
    ) -> QxResult<ExperimentResponse> {
        let seed = options.seed.as_deref().map(Seed::parse).transpose()?;
        self.require_credentials()?;

        let target = self.resolve_backend(backend, EndpointKind::Experiment)?;
        check_seed_allowed(seed.as_ref(), backend, &target)?;

        let name = options
            .name
            .unwrap_or_else(|| format!("Experiment #{}", Local::now().format("%Y%m%d%H%M%S")));
        let body = json!({
            "qasm": strip_headers(qasm),
            "codeType": "QASM2",
            "name": name,
        });

        let mut params = vec![("shots", shots.to_string())];
        if let Some(seed) = &seed {
            params.push(("seed", seed.to_string()));
        }
        params.push(("deviceRunType", target.id.clone()));

        let execution = self.transport.post("/codes/execute", &params, body)?;
        let mut response = parse_submission(&execution)?;
        info!(
            "execution {} submitted with status {}",
            response.id_execution, response.status
        );

        match response.status {
            ExecutionStatus::Done => {
                response.result = ExecutionResult::from_submission(&execution);
                response.info_queue = None;
                Ok(response)
            }
            ExecutionStatus::Error => {
                response.info_queue = None;
                Ok(response)
            }
            _ => {
                let timeout = options.timeout.unwrap_or(self.default_timeout);
                let outcome =
                    self.poller
                        .wait(&mut self.transport, &response.id_execution, timeout)?;
                match outcome {
                    PollOutcome::Completed { mut result, .. } => {
                        response.status = ExecutionStatus::Done;
                        response.calibration = result.calibration.take();
                        response.result = Some(result);
                        response.info_queue = None;
                    }
                    PollOutcome::TimedOut { .. } => response.timed_out = true,
                    PollOutcome::Skipped => {}
                }
                Ok(response)
            }
        }
    }

    /// Submit a batch of programs as a job. The job is not waited on.
    #[instrument(skip(self, qasms, options))]
    pub fn run_job(
        &mut self,
        qasms: &[&str],
        backend: &str,
        options: JobOptions,
    ) -> QxResult<Value> {
        let seed = options.seed.as_deref().map(Seed::parse).transpose()?;
        self.require_credentials()?;

        let target = self.resolve_backend(backend, EndpointKind::Job)?;
        check_seed_allowed(seed.as_ref(), backend, &target)?;

        let programs: Vec<Value> = qasms
            .iter()
            .map(|q| json!({"qasm": strip_headers(q)}))
            .collect();
        let mut body = json!({
            "qasms": programs,
            "shots": options.shots,
            "maxCredits": options.max_credits,
            "backend": {"name": target.id},
        });
        if let Some(seed) = &seed {
            body["seed"] = Value::String(seed.to_string());
        }

        self.transport.post("/Jobs", &[], body)
    }

    /// Get a job, with each program's result data lifted to `data`.
    #[instrument(skip(self))]
    pub fn get_job(&mut self, id_job: &str) -> QxResult<Value> {
        self.require_credentials()?;
        if id_job.is_empty() {
            return Err(QxError::InvalidParameter("job id not specified".into()));
        }
        let mut job = self.transport.get(&format!("/Jobs/{id_job}"), &[])?;
        if let Some(qasms) = job.get_mut("qasms").and_then(Value::as_array_mut) {
            for qasm in qasms {
                lift_result_data(qasm);
            }
        }
        Ok(job)
    }

    /// Get the user's most recent jobs.
    #[instrument(skip(self))]
    pub fn get_jobs(&mut self, limit: u32) -> QxResult<Value> {
        self.require_credentials()?;
        self.transport
            .get("/Jobs", &[("filter", json!({"limit": limit}).to_string())])
    }

    // ------------------------------------------------------------------
    // Backends
    // ------------------------------------------------------------------

    /// Queue status of a backend. The status endpoint is public.
    #[instrument(skip(self))]
    pub fn backend_status(&mut self, backend: &str) -> QxResult<BackendStatus> {
        let target = self.resolve_backend(backend, EndpointKind::Status)?;
        let status = self
            .transport
            .get_public(&format!("/Backends/{}/queue/status", target.id), &[])?;

        Ok(BackendStatus {
            available: status.get("state").map(is_truthy),
            busy: status.get("busy").map(is_truthy),
            pending_jobs: status.get("lengthQueue").and_then(Value::as_u64),
        })
    }

    /// Latest calibration of a hardware backend.
    #[instrument(skip(self))]
    pub fn backend_calibration(&mut self, backend: &str) -> QxResult<Value> {
        self.backend_document(backend, "calibration", "calibrations")
    }

    /// Calibration parameters of a hardware backend.
    #[instrument(skip(self))]
    pub fn backend_parameters(&mut self, backend: &str) -> QxResult<Value> {
        self.backend_document(backend, "parameters", "parameters")
    }

    fn backend_document(&mut self, backend: &str, path: &str, empty_key: &str) -> QxResult<Value> {
        self.require_credentials()?;
        let target = self.resolve_backend(backend, EndpointKind::Calibration)?;

        if target.simulator {
            let mut doc = Map::new();
            doc.insert("backend".into(), Value::String(target.id));
            doc.insert(empty_key.into(), Value::Null);
            return Ok(Value::Object(doc));
        }

        let mut doc = self
            .transport
            .get(&format!("/Backends/{}/{path}", target.id), &[])?;
        match doc.as_object_mut() {
            Some(obj) => {
                obj.insert("backend".into(), Value::String(target.id));
                Ok(doc)
            }
            None => Err(QxError::UnexpectedResponse(format!(
                "backend {path} is not an object"
            ))),
        }
    }

    /// Backends currently switched on.
    #[instrument(skip(self))]
    pub fn available_backends(&mut self) -> QxResult<Vec<BackendInfo>> {
        self.require_credentials()?;
        let listing = self.transport.get("/Backends", &[])?;
        let Value::Array(entries) = listing else {
            return Err(QxError::UnexpectedResponse(
                "backend list is not an array".into(),
            ));
        };

        let mut backends = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<BackendInfo>(entry) {
                Ok(info) if info.is_on() => backends.push(info),
                Ok(_) => {}
                Err(e) => warn!("skipping malformed backend entry: {e}"),
            }
        }
        Ok(backends)
    }

    /// Simulators currently switched on.
    #[instrument(skip(self))]
    pub fn available_backend_simulators(&mut self) -> QxResult<Vec<BackendInfo>> {
        Ok(self
            .available_backends()?
            .into_iter()
            .filter(|b| b.simulator)
            .collect())
    }

    /// Resolve a backend name for an endpoint family.
    pub fn resolve_backend(&mut self, name: &str, kind: EndpointKind) -> QxResult<ResolvedBackend> {
        if let Some(resolved) = self.resolver.resolve_alias(name, kind) {
            return Ok(resolved);
        }
        let backends = self.available_backends()?;
        self.resolver
            .resolve_listed(name, &backends)
            .ok_or_else(|| QxError::UnknownBackend(name.to_string()))
    }

    // ------------------------------------------------------------------
    // Account
    // ------------------------------------------------------------------

    /// Credit balance of the current user.
    #[instrument(skip(self))]
    pub fn get_my_credits(&mut self) -> QxResult<Value> {
        let user_id = self.require_user_id()?;
        let mut user = self.transport.get(&format!("/users/{user_id}"), &[])?;
        let Some(Value::Object(mut credit)) = user.get_mut("credit").map(Value::take) else {
            return Ok(Value::Object(Map::new()));
        };
        credit.remove("promotionalCodesUsed");
        credit.remove("lastRefill");
        Ok(Value::Object(credit))
    }
}

/// Remove the version header lines the service does not accept.
fn strip_headers(qasm: &str) -> String {
    STRIPPED_HEADERS
        .iter()
        .fold(qasm.to_string(), |acc, header| acc.replace(header, ""))
}

/// Seeds are only honored by simulators.
fn check_seed_allowed(
    seed: Option<&Seed>,
    backend: &str,
    target: &ResolvedBackend,
) -> QxResult<()> {
    if seed.is_some() && !target.simulator {
        return Err(QxError::InvalidParameter(format!(
            "seed not allowed for non-simulator backend \"{backend}\""
        )));
    }
    Ok(())
}

/// Read the synchronous answer of `POST /codes/execute`.
fn parse_submission(execution: &Value) -> QxResult<ExperimentResponse> {
    let malformed = || {
        QxError::UnexpectedResponse(format!("submission answer without status/id: {execution}"))
    };
    let obj = execution.as_object().ok_or_else(malformed)?;
    let status = obj
        .get("status")
        .and_then(|s| s.get("id"))
        .and_then(Value::as_str)
        .map(ExecutionStatus::parse)
        .ok_or_else(malformed)?;
    let id_execution = string_field(obj, "id").ok_or_else(malformed)?;

    Ok(ExperimentResponse {
        status,
        id_execution,
        id_code: string_field(obj, "codeId"),
        info_queue: obj.get("infoQueue").cloned(),
        result: None,
        calibration: None,
        timed_out: false,
    })
}

/// Move `result.data` to `data` and merge the rest of `result` into it.
fn lift_result_data(qasm: &mut Value) {
    let Some(obj) = qasm.as_object_mut() else {
        return;
    };
    let has_data = obj
        .get("result")
        .and_then(Value::as_object)
        .is_some_and(|r| r.contains_key("data"));
    if !has_data {
        return;
    }
    let Some(Value::Object(mut result)) = obj.remove("result") else {
        return;
    };
    let mut data = result.remove("data").unwrap_or(Value::Null);
    if let Some(data_obj) = data.as_object_mut() {
        data_obj.extend(result);
    }
    obj.insert("data".into(), data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use std::time::Duration;

    const BASE: &str = "https://qx.test/api";
    const BELL: &str = "OPENQASM 2.0;\ninclude \"qelib1.inc\";\nqreg q[2];\ncreg c[2];\nh q[0];\ncx q[0],q[1];\nmeasure q -> c;\n";

    fn config() -> ClientConfig {
        ClientConfig::with_access_token("session", Some("user-1".into()))
            .base_url(BASE)
            .backoff_interval(Duration::ZERO)
            .poll_interval(Duration::ZERO)
    }

    fn connect(http: &ScriptedTransport) -> QuantumExperience {
        QuantumExperience::with_transport(config(), Box::new(http.clone())).unwrap()
    }

    fn query(url: &str) -> Vec<(String, String)> {
        reqwest::Url::parse(url)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect()
    }

    #[test]
    fn test_connect_with_api_token_logs_in() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"id": "session-9", "userId": "user-9"}));
        let config = ClientConfig::with_api_token("api").base_url(BASE);
        let qx = QuantumExperience::with_transport(config, Box::new(http.clone())).unwrap();

        assert!(qx.check_credentials());
        assert!(http.requests()[0].url.ends_with("/users/loginWithToken"));
    }

    #[test]
    fn test_connect_with_injected_token_skips_login() {
        let http = ScriptedTransport::new();
        let qx = connect(&http);
        assert!(qx.check_credentials());
        assert_eq!(http.request_count(), 0);
    }

    #[test]
    fn test_connect_without_credentials_fails() {
        let http = ScriptedTransport::new();
        let config = ClientConfig::default().base_url(BASE);
        let err = QuantumExperience::with_transport(config, Box::new(http)).unwrap_err();
        assert!(matches!(err, QxError::Authentication(_)));
    }

    #[test]
    fn test_connect_with_bad_api_token_fails() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"error": {"status": 401, "message": "login failed"}}));
        let config = ClientConfig::with_api_token("bad").base_url(BASE);
        let err = QuantumExperience::with_transport(config, Box::new(http)).unwrap_err();
        assert!(matches!(err, QxError::Authentication(_)));
    }

    #[test]
    fn test_protected_operation_without_token() {
        let http = ScriptedTransport::new();
        let mut credentials = CredentialStore::new(BASE, None, "qx-api-rs");
        credentials.set_user_id("u");
        let transport = TransportClient::new(
            Box::new(http.clone()),
            credentials,
            crate::config::RetryPolicy::default(),
        );
        let mut qx = QuantumExperience {
            transport,
            poller: ExecutionPoller::new(Duration::ZERO),
            resolver: BackendResolver,
            default_timeout: 60,
        };

        assert!(!qx.check_credentials());
        assert!(matches!(qx.get_jobs(5), Err(QxError::Authentication(_))));
        assert!(matches!(qx.get_my_credits(), Err(QxError::Authentication(_))));
        assert_eq!(http.request_count(), 0);
    }

    #[test]
    fn test_run_experiment_done_on_submission() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({
            "id": "exec-1",
            "codeId": "code-1",
            "status": {"id": "DONE"},
            "infoQueue": {"status": "FINISHED"},
            "result": {"data": {
                "p": {"labels": ["00", "11"], "values": [0.5, 0.5]},
                "valsxyz": [[0, 0, 1]],
                "additionalData": {"seed": 815}
            }}
        }));
        let mut qx = connect(&http);

        let response = qx
            .run_experiment(BELL, "simulator", 1024, ExperimentOptions::default().with_name("bell"))
            .unwrap();

        assert_eq!(response.status, ExecutionStatus::Done);
        assert_eq!(response.id_execution, "exec-1");
        assert_eq!(response.id_code.as_deref(), Some("code-1"));
        assert!(response.info_queue.is_none());
        assert!(!response.timed_out);
        let result = response.result.unwrap();
        assert_eq!(result.measure, Some(json!({"labels": ["00", "11"], "values": [0.5, 0.5]})));
        assert_eq!(result.bloch, Some(json!([[0, 0, 1]])));
        assert_eq!(result.extra_info, Some(json!({"seed": 815})));

        // Only the submission went out: no polling.
        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert!(request.url.starts_with("https://qx.test/api/codes/execute?"));
        assert_eq!(
            query(&request.url),
            vec![
                ("access_token".to_string(), "session".to_string()),
                ("shots".to_string(), "1024".to_string()),
                ("deviceRunType".to_string(), "sim_trivial_2".to_string()),
            ]
        );
        match &request.body {
            crate::http::Body::Json(body) => {
                assert_eq!(body["codeType"], "QASM2");
                assert_eq!(body["name"], "bell");
                let qasm = body["qasm"].as_str().unwrap();
                assert!(!qasm.contains("OPENQASM 2.0;"));
                assert!(qasm.contains("cx q[0],q[1];"));
            }
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[test]
    fn test_run_experiment_done_without_data_drops_queue_info() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({
            "id": "exec-7",
            "codeId": "code-7",
            "status": {"id": "DONE"},
            "infoQueue": {"position": 1}
        }));
        let mut qx = connect(&http);

        let response = qx
            .run_experiment(BELL, "simulator", 1, ExperimentOptions::default())
            .unwrap();
        assert_eq!(response.status, ExecutionStatus::Done);
        assert!(response.info_queue.is_none());
        assert!(response.result.is_none());
        assert_eq!(http.request_count(), 1);
    }

    #[test]
    fn test_run_experiment_error_on_submission() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({
            "id": "exec-2",
            "codeId": "code-2",
            "status": {"id": "ERROR"},
            "infoQueue": {"position": 3}
        }));
        let mut qx = connect(&http);

        let response = qx
            .run_experiment(BELL, "simulator", 1, ExperimentOptions::default())
            .unwrap();
        assert_eq!(response.status, ExecutionStatus::Error);
        assert!(response.info_queue.is_none());
        assert!(response.result.is_none());
        assert_eq!(http.request_count(), 1);
    }

    #[test]
    fn test_run_experiment_polls_until_done() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({
            "id": "exec-3",
            "codeId": "code-3",
            "status": {"id": "RUNNING"},
            "infoQueue": {"position": 1}
        }))
        .ok_json(json!({"id": "exec-3", "status": {"id": "RUNNING"}}))
        .ok_json(json!({"id": "exec-3", "status": {"id": "RUNNING"}}))
        .ok_json(json!({
            "id": "exec-3",
            "status": {"id": "DONE"},
            "calibration": {"t1": 40},
            "result": {"data": {"p": {"labels": ["1"], "values": [1.0]}, "time": 0.3}}
        }));
        let mut qx = connect(&http);

        let response = qx
            .run_experiment(BELL, "simulator", 1, ExperimentOptions::default().with_timeout(3))
            .unwrap();

        assert_eq!(response.status, ExecutionStatus::Done);
        assert!(!response.timed_out);
        assert!(response.info_queue.is_none());
        assert_eq!(response.calibration, Some(json!({"t1": 40})));
        let result = response.result.unwrap();
        assert!(result.calibration.is_none());
        assert_eq!(result.time_taken, Some(json!(0.3)));
        // Submission plus three polls.
        assert_eq!(http.request_count(), 4);
    }

    #[test]
    fn test_run_experiment_timeout_keeps_last_status() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({
            "id": "exec-4",
            "codeId": "code-4",
            "status": {"id": "RUNNING"},
            "infoQueue": {"position": 7}
        }));
        for _ in 0..2 {
            http.ok_json(json!({"id": "exec-4", "status": {"id": "RUNNING"}}));
        }
        let mut qx = connect(&http);

        let response = qx
            .run_experiment(BELL, "simulator", 1, ExperimentOptions::default().with_timeout(2))
            .unwrap();
        assert_eq!(response.status, ExecutionStatus::Running);
        assert!(response.timed_out);
        assert!(response.result.is_none());
        assert_eq!(response.info_queue, Some(json!({"position": 7})));
        assert_eq!(http.request_count(), 3);
    }

    #[test]
    fn test_run_experiment_zero_timeout_returns_immediately() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"id": "exec-5", "codeId": "c", "status": {"id": "SUBMITTED"}}));
        let mut qx = connect(&http);

        let response = qx
            .run_experiment(BELL, "simulator", 1, ExperimentOptions::default().with_timeout(0))
            .unwrap();
        assert_eq!(response.status, ExecutionStatus::Submitted);
        assert!(!response.timed_out);
        assert_eq!(http.request_count(), 1);
    }

    #[test]
    fn test_run_experiment_with_seed_on_simulator() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({
            "id": "exec-6",
            "codeId": "c",
            "status": {"id": "DONE"},
            "result": {"data": {"p": {"labels": ["0"]}, "additionalData": {"seed": 815}}}
        }));
        let mut qx = connect(&http);

        let response = qx
            .run_experiment(BELL, "simulator", 1, ExperimentOptions::default().with_seed(815))
            .unwrap();
        assert_eq!(response.result.unwrap().extra_info.unwrap()["seed"], 815);

        let pairs = query(&http.requests()[0].url);
        assert!(pairs.contains(&("seed".to_string(), "815".to_string())));
    }

    #[test]
    fn test_invalid_seed_never_reaches_transport() {
        let http = ScriptedTransport::new();
        let mut qx = connect(&http);

        for seed in ["12345678901", "abc", "-3"] {
            let err = qx
                .run_experiment(BELL, "simulator", 1, ExperimentOptions::default().with_seed(seed))
                .unwrap_err();
            assert!(matches!(err, QxError::InvalidParameter(_)), "{seed}");
        }
        let err = qx
            .run_job(
                &[BELL],
                "simulator",
                JobOptions {
                    seed: Some("99999999999".into()),
                    ..JobOptions::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QxError::InvalidParameter(_)));
        assert_eq!(http.request_count(), 0);
    }

    #[test]
    fn test_seed_rejected_for_hardware() {
        let http = ScriptedTransport::new();
        let mut qx = connect(&http);

        let err = qx
            .run_experiment(BELL, "ibmqx2", 1, ExperimentOptions::default().with_seed(1))
            .unwrap_err();
        assert!(matches!(err, QxError::InvalidParameter(msg) if msg.contains("non-simulator")));
        assert_eq!(http.request_count(), 0);
    }

    #[test]
    fn test_unknown_backend() {
        let http = ScriptedTransport::new();
        http.ok_json(json!([{"name": "ibmqx4", "status": "on"}]));
        let mut qx = connect(&http);

        let err = qx
            .run_experiment(BELL, "5qreal", 1, ExperimentOptions::default())
            .unwrap_err();
        assert!(matches!(err, QxError::UnknownBackend(name) if name == "5qreal"));
        // Only the backend listing was fetched.
        assert_eq!(http.request_count(), 1);
        assert!(http.requests()[0].url.contains("/Backends?"));
    }

    #[test]
    fn test_listed_simulator_runs_as_chip_simulator() {
        let http = ScriptedTransport::new();
        http.ok_json(json!([
            {"name": "ibmqx_hpc_qasm_simulator", "status": "on", "simulator": true}
        ]))
        .ok_json(json!({"id": "e", "codeId": "c", "status": {"id": "ERROR"}}));
        let mut qx = connect(&http);

        qx.run_experiment(
            BELL,
            "ibmqx_hpc_qasm_simulator",
            1,
            ExperimentOptions::default().with_seed(7),
        )
        .unwrap();
        let pairs = query(&http.requests()[1].url);
        assert!(pairs.contains(&("deviceRunType".to_string(), "chip_simulator".to_string())));
    }

    #[test]
    fn test_malformed_submission_answer() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"error": {"status": 500, "message": "boom"}}));
        let mut qx = connect(&http);

        let err = qx
            .run_experiment(BELL, "simulator", 1, ExperimentOptions::default())
            .unwrap_err();
        assert!(matches!(err, QxError::UnexpectedResponse(_)));
    }

    #[test]
    fn test_run_job_body() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"id": "job-1", "status": "RUNNING"}));
        let mut qx = connect(&http);

        let job = qx
            .run_job(
                &["IBMQASM 2.0;\nx q[0];", BELL],
                "real",
                JobOptions {
                    shots: 100,
                    max_credits: 5,
                    seed: None,
                },
            )
            .unwrap();
        assert_eq!(job["id"], "job-1");

        let request = &http.requests()[0];
        assert!(request.url.starts_with("https://qx.test/api/Jobs?"));
        match &request.body {
            crate::http::Body::Json(body) => {
                assert_eq!(body["shots"], 100);
                assert_eq!(body["maxCredits"], 5);
                assert_eq!(body["backend"]["name"], "ibmqx2");
                assert_eq!(body["qasms"][0]["qasm"], "\nx q[0];");
                assert!(body.get("seed").is_none());
            }
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[test]
    fn test_run_job_with_seed_on_simulator() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"id": "job-2"}));
        let mut qx = connect(&http);

        qx.run_job(
            &[BELL],
            "simulator",
            JobOptions {
                seed: Some("42".into()),
                ..JobOptions::default()
            },
        )
        .unwrap();
        match &http.requests()[0].body {
            crate::http::Body::Json(body) => {
                assert_eq!(body["seed"], "42");
                assert_eq!(body["backend"]["name"], "simulator");
            }
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[test]
    fn test_get_job_lifts_result_data() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({
            "id": "job-1",
            "qasms": [
                {"qasm": "x", "result": {"data": {"counts": {"1": 10}}, "date": "2017-01-01"}},
                {"qasm": "y", "status": "RUNNING"}
            ]
        }));
        let mut qx = connect(&http);

        let job = qx.get_job("job-1").unwrap();
        assert_eq!(
            job["qasms"][0],
            json!({"qasm": "x", "data": {"counts": {"1": 10}, "date": "2017-01-01"}})
        );
        assert_eq!(job["qasms"][1], json!({"qasm": "y", "status": "RUNNING"}));
    }

    #[test]
    fn test_get_job_requires_id() {
        let http = ScriptedTransport::new();
        let mut qx = connect(&http);
        assert!(matches!(
            qx.get_job(""),
            Err(QxError::InvalidParameter(_))
        ));
        assert_eq!(http.request_count(), 0);
    }

    #[test]
    fn test_get_jobs_filter() {
        let http = ScriptedTransport::new();
        http.ok_json(json!([{"id": "a"}, {"id": "b"}]));
        let mut qx = connect(&http);

        let jobs = qx.get_jobs(2).unwrap();
        assert_eq!(jobs.as_array().unwrap().len(), 2);
        let pairs = query(&http.requests()[0].url);
        assert!(pairs.contains(&("filter".to_string(), r#"{"limit":2}"#.to_string())));
    }

    #[test]
    fn test_get_execution_embeds_code() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"id": "exec-1", "codeId": "code-1"}))
            .ok_json(json!({"id": "code-1", "name": "bell"}))
            .ok_json(json!([{"id": "exec-1"}]));
        let mut qx = connect(&http);

        let execution = qx.get_execution("exec-1").unwrap();
        assert_eq!(execution["code"]["name"], "bell");
        assert_eq!(execution["code"]["executions"][0]["id"], "exec-1");

        let urls: Vec<String> = http.requests().into_iter().map(|r| r.url).collect();
        assert!(urls[1].starts_with("https://qx.test/api/Codes/code-1?"));
        assert!(urls[2].starts_with("https://qx.test/api/Codes/code-1/executions?"));
    }

    #[test]
    fn test_get_code_ignores_non_list_executions() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"id": "code-1"}))
            .ok_json(json!({"error": {"status": 404}}));
        let mut qx = connect(&http);

        let code = qx.get_code("code-1").unwrap();
        assert!(code.get("executions").is_none());
    }

    #[test]
    fn test_get_result_from_execution() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"id": "e", "status": {"id": "RUNNING"}}));
        let mut qx = connect(&http);
        assert!(qx.get_result_from_execution("e").unwrap().is_empty());
    }

    #[test]
    fn test_get_image_code() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"url": "https://img/x.png"}));
        let mut qx = connect(&http);

        assert_eq!(qx.get_image_code("code-1").unwrap()["url"], "https://img/x.png");
        assert!(http.requests()[0].url.contains("/Codes/code-1/export/png/url"));
    }

    #[test]
    fn test_get_last_codes() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"codes": [{"id": "c1"}], "total": 1}));
        let mut qx = connect(&http);

        let codes = qx.get_last_codes().unwrap();
        assert_eq!(codes, json!([{"id": "c1"}]));
        let url = &http.requests()[0].url;
        assert!(url.starts_with("https://qx.test/api/users/user-1/codes/lastest?"));
        assert!(query(url).contains(&("includeExecutions".to_string(), "true".to_string())));
    }

    #[test]
    fn test_get_last_codes_needs_user_id() {
        let http = ScriptedTransport::new();
        let config = ClientConfig::with_access_token("session", None).base_url(BASE);
        let mut qx = QuantumExperience::with_transport(config, Box::new(http.clone())).unwrap();
        assert!(matches!(
            qx.get_last_codes(),
            Err(QxError::Authentication(_))
        ));

        qx.set_user_id("user-2");
        http.ok_json(json!({"codes": []}));
        assert_eq!(qx.get_last_codes().unwrap(), json!([]));
    }

    #[test]
    fn test_backend_status_is_public() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"state": true, "busy": false, "lengthQueue": 4}));
        let mut qx = connect(&http);

        let status = qx.backend_status("real").unwrap();
        assert_eq!(
            status,
            BackendStatus {
                available: Some(true),
                busy: Some(false),
                pending_jobs: Some(4),
            }
        );
        assert_eq!(
            http.requests()[0].url,
            "https://qx.test/api/Backends/ibmqx2/queue/status"
        );
    }

    #[test]
    fn test_backend_calibration_for_hardware() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"lastUpdateDate": "2017-05-01", "qubits": []}));
        let mut qx = connect(&http);

        let calibration = qx.backend_calibration("ibmqx5qv2").unwrap();
        assert_eq!(calibration["backend"], "ibmqx2");
        assert_eq!(calibration["lastUpdateDate"], "2017-05-01");
        assert!(http.requests()[0].url.contains("/Backends/ibmqx2/calibration"));
    }

    #[test]
    fn test_backend_parameters_for_simulator_skips_call() {
        let http = ScriptedTransport::new();
        let mut qx = connect(&http);

        let parameters = qx.backend_parameters("simulator").unwrap();
        assert_eq!(
            parameters,
            json!({"backend": "ibmqx_qasm_simulator", "parameters": null})
        );
        let calibration = qx.backend_calibration("simulator").unwrap();
        assert_eq!(calibration["calibrations"], Value::Null);
        assert_eq!(http.request_count(), 0);
    }

    #[test]
    fn test_available_backends_filters() {
        let http = ScriptedTransport::new();
        let listing = json!([
            {"name": "ibmqx2", "status": "on", "simulator": false},
            {"name": "ibmqx3", "status": "off", "simulator": false},
            {"name": "ibmqx_qasm_simulator", "status": "on", "simulator": true},
            {"status": "on"}
        ]);
        http.ok_json(listing.clone()).ok_json(listing);
        let mut qx = connect(&http);

        let names: Vec<String> = qx
            .available_backends()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["ibmqx2", "ibmqx_qasm_simulator"]);

        let sims = qx.available_backend_simulators().unwrap();
        assert_eq!(sims.len(), 1);
        assert_eq!(sims[0].name, "ibmqx_qasm_simulator");
    }

    #[test]
    fn test_available_backends_rejects_non_list() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({"backends": []}));
        let mut qx = connect(&http);
        assert!(matches!(
            qx.available_backends(),
            Err(QxError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_get_my_credits() {
        let http = ScriptedTransport::new();
        http.ok_json(json!({
            "id": "user-1",
            "credit": {"remaining": 15, "promotionalCodesUsed": [], "lastRefill": "x", "maxUserType": 15}
        }))
        .ok_json(json!({"id": "user-1"}));
        let mut qx = connect(&http);

        assert_eq!(
            qx.get_my_credits().unwrap(),
            json!({"remaining": 15, "maxUserType": 15})
        );
        assert_eq!(qx.get_my_credits().unwrap(), json!({}));
        assert!(http.requests()[0].url.starts_with("https://qx.test/api/users/user-1?"));
    }

    #[test]
    fn test_set_access_token_is_used() {
        let http = ScriptedTransport::new();
        http.ok_json(json!([]));
        let mut qx = connect(&http);
        qx.set_access_token("other");

        qx.get_jobs(1).unwrap();
        assert!(query(&http.requests()[0].url).contains(&(
            "access_token".to_string(),
            "other".to_string()
        )));
    }

    #[test]
    fn test_strip_headers() {
        assert_eq!(strip_headers("IBMQASM 2.0;\nh q[0];"), "\nh q[0];");
        assert_eq!(strip_headers("OPENQASM 2.0;h q[0];"), "h q[0];");
        assert_eq!(strip_headers("h q[0];"), "h q[0];");
    }
}
