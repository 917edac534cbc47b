//! Agent policy management, the resources a benchmark provisions to receive its load.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::package::{DataStreamManifest, PackageManifest, PolicyTemplate, Variable};
use crate::scenario::Scenario;

/// Namespace of every benchmark data stream.
pub const BENCH_NAMESPACE: &str = "ep";

/// Agent hosts and policies that belong to the fleet infrastructure itself.
const FLEET_SERVER_HOST: &str = "docker-fleet-server";
const FLEET_SERVER_POLICY_IDS: &[&str] = &["fleet-server-policy", "Elastic Cloud agent policy"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub monitoring_enabled: Vec<String>,
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub package_policies: Vec<PackagePolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub policy_id: String,
    pub policy_revision: i64,
    #[serde(default)]
    pub local_metadata: AgentMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    #[serde(default)]
    pub host: AgentHost,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentHost {
    #[serde(default)]
    pub name: String,
}

/// The configuration of one package attached to a policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagePolicy {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub policy_id: String,
    pub enabled: bool,
    pub package: PackageRef,
    pub inputs: Vec<PolicyInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub title: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyInput {
    pub policy_template: String,
    #[serde(rename = "type")]
    pub input_type: String,
    pub enabled: bool,
    pub vars: Vars,
    pub streams: Vec<PolicyStream>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyStream {
    pub id: String,
    pub enabled: bool,
    pub data_stream: StreamDataStream,
    pub vars: Vars,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamDataStream {
    #[serde(rename = "type")]
    pub ds_type: String,
    pub dataset: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Var {
    #[serde(rename = "type")]
    pub var_type: String,
    pub value: serde_json::Value,
}

pub type Vars = BTreeMap<String, Var>;

impl PackagePolicy {
    /// The data stream the package writes to, `<type>-<dataset>-<namespace>`.
    pub fn data_stream(&self) -> Option<String> {
        let stream = self.inputs.first()?.streams.first()?;
        Some(format!(
            "{}-{}-{}",
            stream.data_stream.ds_type, stream.data_stream.dataset, self.namespace
        ))
    }

    /// Prefix of the ingest pipelines installed for the package, `<type>-<dataset>-<version>`.
    pub fn pipeline_prefix(&self) -> Option<String> {
        let stream = self.inputs.first()?.streams.first()?;
        Some(format!(
            "{}-{}-{}",
            stream.data_stream.ds_type, stream.data_stream.dataset, self.package.version
        ))
    }
}

/// The policy service of the stack under benchmark.
#[async_trait]
pub trait FleetApi: Send + Sync {
    async fn create_policy(&self, policy: &Policy) -> anyhow::Result<Policy>;

    async fn delete_policy(&self, policy: &Policy) -> anyhow::Result<()>;

    /// Get a policy together with its package policies.
    async fn get_policy(&self, policy_id: &str) -> anyhow::Result<Policy>;

    async fn add_package_policy(&self, package_policy: &PackagePolicy)
        -> anyhow::Result<PackagePolicy>;

    async fn delete_package_policy(&self, package_policy: &PackagePolicy) -> anyhow::Result<()>;

    async fn list_agents(&self) -> anyhow::Result<Vec<Agent>>;

    async fn assign_policy(&self, agent: &Agent, policy: &Policy) -> anyhow::Result<()>;
}

/// Agents that can run a benchmark policy.
///
/// Agents without a policy revision yet and the fleet server agents are left out.
pub fn filter_agents(agents: Vec<Agent>) -> Vec<Agent> {
    agents
        .into_iter()
        .filter(|agent| agent.policy_revision != 0)
        .filter(|agent| {
            agent.local_metadata.host.name != FLEET_SERVER_HOST
                && !FLEET_SERVER_POLICY_IDS.contains(&agent.policy_id.as_str())
        })
        .collect()
}

/// Build the package policy that configures the benchmarked data stream.
pub fn package_policy(
    policy: &Policy,
    package: &PackageManifest,
    template: &PolicyTemplate,
    data_stream: &DataStreamManifest,
    scenario: &Scenario,
) -> PackagePolicy {
    if package.is_input_package() {
        input_package_policy(policy, package, template, scenario)
    } else {
        integration_package_policy(policy, package, template, data_stream, scenario)
    }
}

fn integration_package_policy(
    policy: &Policy,
    package: &PackageManifest,
    template: &PolicyTemplate,
    data_stream: &DataStreamManifest,
    scenario: &Scenario,
) -> PackagePolicy {
    let stream = data_stream
        .streams
        .get(data_stream.stream_index(&scenario.input))
        .cloned()
        .unwrap_or_default();

    let mut input_vars = Vec::new();
    if let Some(input) = template.find_input(&stream.input) {
        input_vars.extend(input.vars.iter().cloned());
        input_vars.extend(package.vars.iter().cloned());
    }

    PackagePolicy {
        name: format!("{}-{}", package.name, data_stream.name),
        namespace: BENCH_NAMESPACE.to_string(),
        policy_id: policy.id.clone(),
        enabled: true,
        package: package_ref(package),
        inputs: vec![PolicyInput {
            policy_template: template.name.clone(),
            input_type: stream.input.clone(),
            enabled: true,
            vars: resolve_vars(&input_vars, &scenario.vars),
            streams: vec![PolicyStream {
                id: format!("{}-{}.{}", stream.input, package.name, data_stream.name),
                enabled: true,
                data_stream: StreamDataStream {
                    ds_type: data_stream.ds_type.clone(),
                    dataset: data_stream.dataset(package),
                },
                vars: resolve_vars(&stream.vars, &scenario.data_stream.vars),
            }],
        }],
        ..Default::default()
    }
}

fn input_package_policy(
    policy: &Policy,
    package: &PackageManifest,
    template: &PolicyTemplate,
    scenario: &Scenario,
) -> PackagePolicy {
    let dataset = format!("{}.{}", package.name, template.name);

    let mut vars = resolve_vars(&template.vars, &scenario.vars);
    vars.entry("data_stream.dataset".to_string())
        .or_insert_with(|| Var {
            var_type: "text".to_string(),
            value: serde_json::Value::String(dataset.clone()),
        });

    PackagePolicy {
        name: format!("{}-{}", package.name, template.name),
        namespace: BENCH_NAMESPACE.to_string(),
        policy_id: policy.id.clone(),
        enabled: true,
        package: package_ref(package),
        inputs: vec![PolicyInput {
            policy_template: template.name.clone(),
            input_type: template.input.clone(),
            enabled: true,
            vars: Vars::new(),
            streams: vec![PolicyStream {
                id: format!("{}-{}.{}", template.input, package.name, template.name),
                enabled: true,
                data_stream: StreamDataStream {
                    ds_type: template.template_type.clone(),
                    dataset,
                },
                vars,
            }],
        }],
        ..Default::default()
    }
}

fn package_ref(package: &PackageManifest) -> PackageRef {
    PackageRef {
        name: package.name.clone(),
        title: package.title.clone(),
        version: package.version.clone(),
    }
}

/// Every declared variable with its default, overridden by the scenario value when present.
fn resolve_vars(
    definitions: &[Variable],
    values: &BTreeMap<String, serde_json::Value>,
) -> Vars {
    definitions
        .iter()
        .map(|definition| {
            let value = lookup(values, &definition.name)
                .cloned()
                .or_else(|| definition.default.clone())
                .unwrap_or(serde_json::Value::Null);
            (
                definition.name.clone(),
                Var {
                    var_type: definition.var_type.clone(),
                    value,
                },
            )
        })
        .collect()
}

/// Look up a dotted name, first as a literal key and then as a nested path.
fn lookup<'a>(
    values: &'a BTreeMap<String, serde_json::Value>,
    name: &str,
) -> Option<&'a serde_json::Value> {
    if let Some(value) = values.get(name) {
        return Some(value);
    }

    let mut parts = name.split('.');
    let first = values.get(parts.next()?)?;
    parts.try_fold(first, |value, part| value.get(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PolicyTemplateInput, Stream};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn agent(id: &str, policy_id: &str, revision: i64, host: &str) -> Agent {
        Agent {
            id: id.to_string(),
            policy_id: policy_id.to_string(),
            policy_revision: revision,
            local_metadata: AgentMetadata {
                host: AgentHost {
                    name: host.to_string(),
                },
            },
        }
    }

    #[test]
    fn fleet_server_agents_are_ignored() {
        let agents = vec![
            agent("a1", "default-policy", 3, "elastic-agent"),
            agent("a2", "default-policy", 0, "elastic-agent"),
            agent("a3", "default-policy", 1, "docker-fleet-server"),
            agent("a4", "fleet-server-policy", 1, "fleet"),
            agent("a5", "Elastic Cloud agent policy", 1, "cloud"),
        ];

        let ids = filter_agents(agents)
            .into_iter()
            .map(|a| a.id)
            .collect::<Vec<_>>();

        assert_eq!(ids, vec!["a1"]);
    }

    fn scenario(vars: serde_json::Value, ds_vars: serde_json::Value) -> Scenario {
        serde_json::from_value(json!({
            "input": "logfile",
            "vars": vars,
            "data_stream": { "name": "access", "vars": ds_vars },
        }))
        .unwrap()
    }

    #[test]
    fn integration_policy_overrides_defaults() {
        let package = PackageManifest {
            name: "nginx".to_string(),
            title: "Nginx".to_string(),
            version: "1.2.0".to_string(),
            package_type: "integration".to_string(),
            vars: vec![Variable {
                name: "tags".to_string(),
                var_type: "text".to_string(),
                default: Some(json!(["nginx"])),
            }],
            ..Default::default()
        };
        let template = PolicyTemplate {
            name: "nginx".to_string(),
            inputs: vec![PolicyTemplateInput {
                input_type: "logfile".to_string(),
                vars: vec![Variable {
                    name: "ssl.enabled".to_string(),
                    var_type: "bool".to_string(),
                    default: Some(json!(false)),
                }],
            }],
            ..Default::default()
        };
        let data_stream = DataStreamManifest {
            name: "access".to_string(),
            ds_type: "logs".to_string(),
            streams: vec![Stream {
                input: "logfile".to_string(),
                vars: vec![Variable {
                    name: "paths".to_string(),
                    var_type: "text".to_string(),
                    default: Some(json!(["/var/log/nginx/access.log*"])),
                }],
            }],
            ..Default::default()
        };
        let policy = Policy {
            id: "policy-1".to_string(),
            ..Default::default()
        };

        let package_policy = package_policy(
            &policy,
            &package,
            &template,
            &data_stream,
            &scenario(
                json!({ "ssl": { "enabled": true } }),
                json!({ "paths": ["/tmp/service_logs/corpus-*"] }),
            ),
        );

        assert_eq!(package_policy.name, "nginx-access");
        assert_eq!(package_policy.policy_id, "policy-1");
        let input = &package_policy.inputs[0];
        assert_eq!(input.input_type, "logfile");
        assert_eq!(input.vars["ssl.enabled"].value, json!(true));
        assert_eq!(input.vars["tags"].value, json!(["nginx"]));
        let stream = &input.streams[0];
        assert_eq!(stream.id, "logfile-nginx.access");
        assert_eq!(stream.vars["paths"].value, json!(["/tmp/service_logs/corpus-*"]));
        assert_eq!(
            package_policy.data_stream().as_deref(),
            Some("logs-nginx.access-ep")
        );
        assert_eq!(
            package_policy.pipeline_prefix().as_deref(),
            Some("logs-nginx.access-1.2.0")
        );
    }

    #[test]
    fn input_policy_defaults_dataset() {
        let package = PackageManifest {
            name: "sql".to_string(),
            version: "0.1.0".to_string(),
            package_type: "input".to_string(),
            ..Default::default()
        };
        let template = PolicyTemplate {
            name: "sql_query".to_string(),
            input: "sql".to_string(),
            template_type: "metrics".to_string(),
            ..Default::default()
        };

        let package_policy = package_policy(
            &Policy::default(),
            &package,
            &template,
            &DataStreamManifest::default(),
            &scenario(json!({}), json!({})),
        );

        let stream = &package_policy.inputs[0].streams[0];
        assert_eq!(stream.vars["data_stream.dataset"].value, json!("sql.sql_query"));
        assert_eq!(
            package_policy.data_stream().as_deref(),
            Some("metrics-sql.sql_query-ep")
        );
    }
}
