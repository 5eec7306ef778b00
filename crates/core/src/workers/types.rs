//! Worker identity types.

use serde::{Deserialize, Serialize};

pub type WorkerId = i64;

/// A redemption identity in the registry.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Worker {
    pub id: WorkerId,
    /// Login identity on the redemption site.
    pub identity: String,
    /// Credential for `identity`. Never logged or serialized.
    #[serde(skip_serializing, default)]
    pub secret: String,
    /// Operator switch. Inactive workers are not loaded into runs.
    pub active: bool,
}

// Hand-written so the secret never reaches logs.
impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .field("active", &self.active)
            .finish()
    }
}

impl Worker {
    pub fn credentials(&self) -> WorkerCredentials {
        WorkerCredentials {
            identity: self.identity.clone(),
            secret: self.secret.clone(),
        }
    }
}

/// What the activation driver needs to log in as a worker.
#[derive(Clone, PartialEq, Eq)]
pub struct WorkerCredentials {
    pub identity: String,
    pub secret: String,
}

impl std::fmt::Debug for WorkerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerCredentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Request to register a worker.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWorker {
    pub identity: String,
    pub secret: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_hidden() {
        let worker = Worker {
            id: 1,
            identity: "alpha@example.com".to_string(),
            secret: "hunter2".to_string(),
            active: true,
        };
        assert!(!format!("{:?}", worker).contains("hunter2"));
        assert!(!format!("{:?}", worker.credentials()).contains("hunter2"));
        let json = serde_json::to_string(&worker).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_new_worker_defaults_active() {
        let w: NewWorker =
            serde_json::from_str(r#"{"identity": "a@example.com", "secret": "s"}"#).unwrap();
        assert!(w.active);
    }
}
