//! The parts of package and data stream manifests a benchmark needs.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;

pub const PACKAGE_MANIFEST_FILE: &str = "manifest.yml";
pub const DATA_STREAM_MANIFEST_FILE: &str = "manifest.yml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub version: String,
    /// `integration` or `input`
    #[serde(rename = "type", default = "default_package_type")]
    pub package_type: String,
    #[serde(default)]
    pub policy_templates: Vec<PolicyTemplate>,
    #[serde(default)]
    pub vars: Vec<Variable>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PolicyTemplate {
    pub name: String,
    /// Data streams this template applies to, all of them when empty
    #[serde(default)]
    pub data_streams: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<PolicyTemplateInput>,
    /// Input of an input package template
    #[serde(default)]
    pub input: String,
    /// Data stream type of an input package template
    #[serde(rename = "type", default)]
    pub template_type: String,
    #[serde(default)]
    pub vars: Vec<Variable>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PolicyTemplateInput {
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(default)]
    pub vars: Vec<Variable>,
}

/// A variable declared by a manifest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub var_type: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DataStreamManifest {
    /// Directory name of the data stream
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub ds_type: String,
    #[serde(default)]
    pub dataset: String,
    #[serde(default)]
    pub streams: Vec<Stream>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Stream {
    pub input: String,
    #[serde(default)]
    pub vars: Vec<Variable>,
}

fn default_package_type() -> String {
    "integration".to_string()
}

impl PackageManifest {
    pub fn is_input_package(&self) -> bool {
        self.package_type == "input"
    }
}

impl PolicyTemplate {
    pub fn find_input(&self, input_type: &str) -> Option<&PolicyTemplateInput> {
        self.inputs.iter().find(|i| i.input_type == input_type)
    }
}

impl DataStreamManifest {
    /// Index of the stream using `input`, the first stream otherwise.
    pub fn stream_index(&self, input: &str) -> usize {
        self.streams
            .iter()
            .position(|s| s.input == input)
            .unwrap_or_default()
    }

    /// The dataset of this data stream, `<package>.<data stream>` unless declared.
    pub fn dataset(&self, package: &PackageManifest) -> String {
        if self.dataset.is_empty() {
            format!("{}.{}", package.name, self.name)
        } else {
            self.dataset.clone()
        }
    }
}

pub fn read_package_manifest(package_root: &Path) -> anyhow::Result<PackageManifest> {
    let path = package_root.join(PACKAGE_MANIFEST_FILE);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Reading package manifest failed: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Decoding package manifest failed: {}", path.display()))
}

pub fn data_stream_path(package_root: &Path, data_stream: &str) -> PathBuf {
    package_root.join("data_stream").join(data_stream)
}

pub fn read_data_stream_manifest(
    package_root: &Path,
    data_stream: &str,
) -> anyhow::Result<DataStreamManifest> {
    let path = data_stream_path(package_root, data_stream).join(DATA_STREAM_MANIFEST_FILE);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Reading data stream manifest failed: {}", path.display()))?;
    let mut manifest: DataStreamManifest = serde_yaml::from_str(&content)
        .with_context(|| format!("Decoding data stream manifest failed: {}", path.display()))?;
    manifest.name = data_stream.to_string();

    Ok(manifest)
}

/// The name of the policy template that applies to the benchmarked input.
///
/// Fails when no template or more than one template matches.
pub fn find_policy_template_for_input(
    package: &PackageManifest,
    data_stream: &DataStreamManifest,
    input: &str,
) -> anyhow::Result<String> {
    if package.is_input_package() {
        return find_policy_template_for_input_package(package, input);
    }

    let input = if input.is_empty() {
        let Some(stream) = data_stream.streams.get(data_stream.stream_index(input)) else {
            bail!("no streams declared in data stream manifest");
        };
        stream.input.as_str()
    } else {
        input
    };

    let matched = package
        .policy_templates
        .iter()
        .filter(|t| t.find_input(input).is_some())
        .filter(|t| t.data_streams.is_empty() || t.data_streams.contains(&data_stream.name))
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>();

    match matched.as_slice() {
        [name] => Ok(name.to_string()),
        [] => bail!(
            "no policy template was found for data stream {:?} with input type {input:?}: verify that you have included the data stream and input in the package's policy_template list",
            data_stream.name
        ),
        _ => bail!(
            "ambiguous result: multiple policy templates ([{}]) were found that apply to data stream {:?} with input type {input:?}: please specify the 'policy_template' in the system benchmark config",
            matched.join(", "),
            data_stream.name
        ),
    }
}

fn find_policy_template_for_input_package(
    package: &PackageManifest,
    input: &str,
) -> anyhow::Result<String> {
    let input = if input.is_empty() {
        let Some(first) = package.policy_templates.first() else {
            bail!("no policy templates specified for input package");
        };
        first.input.as_str()
    } else {
        input
    };

    let matched = package
        .policy_templates
        .iter()
        .filter(|t| t.input == input)
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>();

    match matched.as_slice() {
        [name] => Ok(name.to_string()),
        [] => bail!("no policy template was found with input type {input:?}"),
        _ => bail!(
            "ambiguous result: multiple policy templates ([{}]) with input type {input:?}: please specify the 'policy_template' in the system benchmark config",
            matched.join(", ")
        ),
    }
}

pub fn select_policy_template_by_name<'a>(
    templates: &'a [PolicyTemplate],
    name: &str,
) -> anyhow::Result<&'a PolicyTemplate> {
    templates
        .iter()
        .find(|t| t.name == name)
        .with_context(|| format!("policy template {name:?} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PACKAGE: &str = r#"
name: nginx
title: Nginx
version: 1.2.0
policy_templates:
  - name: nginx
    data_streams: [access, error]
    inputs:
      - type: logfile
        vars:
          - name: paths
            type: text
      - type: nginx/metrics
  - name: nginx-otel
    data_streams: [access]
    inputs:
      - type: otel
vars:
  - name: tags
    type: text
    default: [nginx]
"#;

    fn package() -> PackageManifest {
        serde_yaml::from_str(PACKAGE).unwrap()
    }

    fn access() -> DataStreamManifest {
        let mut ds: DataStreamManifest = serde_yaml::from_str(
            "title: Access logs\ntype: logs\nstreams:\n  - input: logfile\n  - input: otel\n",
        )
        .unwrap();
        ds.name = "access".to_string();
        ds
    }

    #[test]
    fn finds_template_by_input() {
        let package = package();

        assert_eq!(
            find_policy_template_for_input(&package, &access(), "otel").unwrap(),
            "nginx-otel"
        );
        assert_eq!(
            find_policy_template_for_input(&package, &access(), "").unwrap(),
            "nginx"
        );
        assert!(find_policy_template_for_input(&package, &access(), "udp").is_err());
    }

    #[test]
    fn ambiguous_templates_are_rejected() {
        let mut package = package();
        package.policy_templates[1]
            .inputs
            .push(PolicyTemplateInput {
                input_type: "logfile".to_string(),
                vars: Vec::new(),
            });

        let err = find_policy_template_for_input(&package, &access(), "logfile").unwrap_err();
        assert!(err.to_string().contains("ambiguous result"));
    }

    #[test]
    fn input_package_templates() {
        let package: PackageManifest = serde_yaml::from_str(
            "name: sql\nversion: 0.1.0\ntype: input\npolicy_templates:\n  - name: sql_query\n    input: sql\n    type: metrics\n",
        )
        .unwrap();

        assert!(package.is_input_package());
        assert_eq!(
            find_policy_template_for_input(&package, &DataStreamManifest::default(), "").unwrap(),
            "sql_query"
        );
    }

    #[test]
    fn dataset_defaults_to_package_and_stream() {
        let package = package();
        let mut ds = access();

        assert_eq!(ds.dataset(&package), "nginx.access");
        ds.dataset = "nginx.custom".to_string();
        assert_eq!(ds.dataset(&package), "nginx.custom");
    }

    #[test]
    fn reads_manifests_from_disk() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("manifest.yml"), PACKAGE).unwrap();
        let ds_dir = data_stream_path(root.path(), "access");
        std::fs::create_dir_all(&ds_dir).unwrap();
        std::fs::write(ds_dir.join("manifest.yml"), "type: logs\nstreams: []\n").unwrap();

        let package = read_package_manifest(root.path()).unwrap();
        let ds = read_data_stream_manifest(root.path(), "access").unwrap();

        assert_eq!(package.package_type, "integration");
        assert_eq!(package.vars[0].default, Some(serde_json::json!(["nginx"])));
        assert_eq!(ds.name, "access");
        assert_eq!(ds.ds_type, "logs");
        assert_eq!(
            select_policy_template_by_name(&package.policy_templates, "nginx")
                .unwrap()
                .inputs
                .len(),
            2
        );
    }
}
