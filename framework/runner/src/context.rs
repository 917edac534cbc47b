use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::Rng;
use serde::Serialize;

use crate::locations::AGENT_SERVICE_LOGS_DIR;

const RUN_ID_MIN: u32 = 10000;
const RUN_ID_MAX: u32 = 99999;

/// Alias for the log folder as seen by the agent.
pub const SERVICE_LOGS_DIR_ALIAS: &str = "SERVICE_LOGS_DIR";
/// Alias for the run identifier.
pub const TEST_RUN_ID_ALIAS: &str = "TEST_RUN_ID";

/// Where the benchmarked service writes its logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogsFolders {
    /// Folder on this machine
    pub local: PathBuf,
    /// The same folder as mounted into the agent
    pub agent: PathBuf,
}

/// Describes where and how the benchmarked service is deployed.
///
/// The provisioning steps fill it in while setting up a run, after which it is only read. A value
/// that was set is never cleared, see [ServiceContext::absorb].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceContext {
    /// Name of the input service, when the load comes from one
    pub name: String,
    pub hostname: String,
    pub ports: Vec<u16>,
    pub logs: LogsFolders,
    pub run_id: String,
    /// Free-form values exposed to scenario templates by their key
    pub custom: BTreeMap<String, String>,
}

impl ServiceContext {
    pub fn new(run_id: impl Into<String>, local_logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_id: run_id.into(),
            logs: LogsFolders {
                local: local_logs_dir.into(),
                agent: PathBuf::from(AGENT_SERVICE_LOGS_DIR),
            },
            ..Default::default()
        }
    }

    /// Values available as helpers in scenario templates.
    pub fn aliases(&self) -> BTreeMap<String, String> {
        let mut aliases = self.custom.clone();
        aliases.insert(
            SERVICE_LOGS_DIR_ALIAS.to_string(),
            self.logs.agent.display().to_string(),
        );
        aliases.insert(TEST_RUN_ID_ALIAS.to_string(), self.run_id.clone());
        aliases
    }

    /// Take the values another context has set, keeping ours where the other is empty.
    pub fn absorb(&mut self, other: ServiceContext) {
        fn keep_set(current: &mut String, update: String) {
            if !update.is_empty() {
                *current = update;
            }
        }

        keep_set(&mut self.name, other.name);
        keep_set(&mut self.hostname, other.hostname);
        keep_set(&mut self.run_id, other.run_id);
        if !other.ports.is_empty() {
            self.ports = other.ports;
        }
        if !other.logs.local.as_os_str().is_empty() {
            self.logs.local = other.logs.local;
        }
        if !other.logs.agent.as_os_str().is_empty() {
            self.logs.agent = other.logs.agent;
        }
        self.custom.extend(other.custom);
    }
}

/// A random run identifier in `[10000, 99999]`.
pub fn create_run_id() -> String {
    rand::thread_rng()
        .gen_range(RUN_ID_MIN..=RUN_ID_MAX)
        .to_string()
}
