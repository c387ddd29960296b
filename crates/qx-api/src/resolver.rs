//! Backend name resolution.
//!
//! Users name backends loosely (`"simulator"`, `"real"`, `"ibmqx5qv2"`), while
//! each endpoint family of the service expects its own identifier for the
//! same machine. Known aliases are resolved from a static table; anything
//! else is matched against the live backend list.

use serde::{Deserialize, Serialize};

/// Endpoint family a backend identifier is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// `POST /codes/execute` (`deviceRunType`).
    Experiment,
    /// `POST /Jobs` (`backend.name`).
    Job,
    /// `GET /Backends/{name}/queue/status`.
    Status,
    /// `GET /Backends/{name}/calibration|parameters`.
    Calibration,
}

/// Group of user-facing names that denote the same machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Family {
    Ibmqx2,
    Ibmqx3,
    Simulator,
}

impl Family {
    fn is_simulator(self) -> bool {
        self == Self::Simulator
    }
}

const ALIASES: &[(Family, &[&str])] = &[
    (
        Family::Ibmqx2,
        &["ibmqx5qv2", "ibmqx2", "qx5qv2", "qx5q", "real"],
    ),
    (Family::Ibmqx3, &["ibmqx3"]),
    (
        Family::Simulator,
        &["simulator", "sim_trivial_2", "ibmqx_qasm_simulator"],
    ),
];

const CANONICAL: &[(Family, EndpointKind, &str)] = &[
    (Family::Ibmqx2, EndpointKind::Experiment, "real"),
    (Family::Ibmqx2, EndpointKind::Job, "ibmqx2"),
    (Family::Ibmqx2, EndpointKind::Status, "ibmqx2"),
    (Family::Ibmqx2, EndpointKind::Calibration, "ibmqx2"),
    (Family::Ibmqx3, EndpointKind::Experiment, "ibmqx3"),
    (Family::Ibmqx3, EndpointKind::Job, "ibmqx3"),
    (Family::Ibmqx3, EndpointKind::Status, "ibmqx3"),
    (Family::Ibmqx3, EndpointKind::Calibration, "ibmqx3"),
    (Family::Simulator, EndpointKind::Experiment, "sim_trivial_2"),
    (Family::Simulator, EndpointKind::Job, "simulator"),
    (Family::Simulator, EndpointKind::Status, "ibmqx_qasm_simulator"),
    (
        Family::Simulator,
        EndpointKind::Calibration,
        "ibmqx_qasm_simulator",
    ),
];

/// Service identifier every dynamically-listed simulator runs under.
pub const CHIP_SIMULATOR: &str = "chip_simulator";

/// A backend entry from `GET /Backends`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Backend name.
    pub name: String,
    /// Availability marker, `"on"` when usable.
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    /// Whether this is a simulator.
    #[serde(default)]
    pub simulator: bool,
    /// Remaining fields as returned by the service.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BackendInfo {
    /// Whether the service reports the backend as usable.
    pub fn is_on(&self) -> bool {
        self.status.as_ref().and_then(serde_json::Value::as_str) == Some("on")
    }
}

/// A resolved backend identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    /// Identifier to send to the service.
    pub id: String,
    /// Whether the identifier denotes a simulator.
    pub simulator: bool,
}

/// Maps user-supplied backend names to service identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendResolver;

impl BackendResolver {
    /// Resolve from the alias table alone (case-insensitive).
    pub fn resolve_alias(&self, name: &str, kind: EndpointKind) -> Option<ResolvedBackend> {
        let lowered = name.to_lowercase();
        let family = ALIASES
            .iter()
            .find(|(_, names)| names.contains(&lowered.as_str()))
            .map(|(family, _)| *family)?;
        CANONICAL
            .iter()
            .find(|(f, k, _)| *f == family && *k == kind)
            .map(|(_, _, id)| ResolvedBackend {
                id: (*id).to_string(),
                simulator: family.is_simulator(),
            })
    }

    /// Resolve against a live backend list (exact name match).
    pub fn resolve_listed(&self, name: &str, backends: &[BackendInfo]) -> Option<ResolvedBackend> {
        backends
            .iter()
            .find(|b| b.name == name)
            .map(|b| ResolvedBackend {
                id: if b.simulator {
                    CHIP_SIMULATOR.to_string()
                } else {
                    b.name.clone()
                },
                simulator: b.simulator,
            })
    }
}
