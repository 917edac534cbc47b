use crate::aggregate::AggregationError;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// File format of an ingest pipeline definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineFormat {
    Yaml,
    Json,
}

impl PipelineFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yml" | "yaml" => Some(PipelineFormat::Yaml),
            "json" => Some(PipelineFormat::Json),
            _ => None,
        }
    }
}

/// The source of an installed ingest pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSource {
    /// Name the pipeline is installed under
    pub name: String,
    pub path: PathBuf,
    pub format: PipelineFormat,
    pub content: String,
}

/// One processor declared in a pipeline source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processor {
    pub processor_type: String,
    /// 1-based line of the source where the processor is declared
    pub first_line: usize,
}

impl PipelineSource {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        content: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let path = path.into();
        let format = PipelineFormat::from_path(&path)
            .with_context(|| format!("Unsupported pipeline format: {}", path.display()))?;

        Ok(Self {
            name: name.into(),
            path,
            format,
            content: content.into(),
        })
    }

    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone())
    }

    /// The processors of this pipeline, in declaration order.
    pub fn processors(&self) -> Result<Vec<Processor>, AggregationError> {
        let types = self.processor_types()?;
        let lines = match self.format {
            PipelineFormat::Yaml => yaml_processor_lines(&self.content, types.len()),
            PipelineFormat::Json => json_processor_lines(&self.content),
        };

        if lines.len() != types.len() {
            return Err(self.source_error(format!(
                "located {} processor declarations but decoded {}",
                lines.len(),
                types.len()
            )));
        }

        Ok(types
            .into_iter()
            .zip(lines)
            .map(|(processor_type, first_line)| Processor {
                processor_type,
                first_line,
            })
            .collect())
    }

    fn processor_types(&self) -> Result<Vec<String>, AggregationError> {
        #[derive(serde::Deserialize)]
        struct Definition {
            #[serde(default)]
            processors: Vec<serde_yaml::Mapping>,
        }

        let definition: Definition = serde_yaml::from_str(&self.content)
            .map_err(|e| self.source_error(e.to_string()))?;

        definition
            .processors
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                if entry.len() != 1 {
                    return Err(self.source_error(format!(
                        "processor#{idx} is not a single-key map (keys: {})",
                        entry.len()
                    )));
                }
                entry
                    .keys()
                    .next()
                    .and_then(|k| k.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        self.source_error(format!("processor#{idx} type is not a string"))
                    })
            })
            .collect()
    }

    fn source_error(&self, reason: String) -> AggregationError {
        AggregationError::PipelineSource {
            file: self.filename(),
            reason,
        }
    }
}

/// Lines of the processor keys directly under the top-level `processors:` block.
///
/// A flow-style list (`processors: [ ... ]`) attributes all `declared` processors to the line of
/// the `processors:` key.
fn yaml_processor_lines(content: &str, declared: usize) -> Vec<usize> {
    let mut lines = content.lines().enumerate().map(|(idx, line)| (idx + 1, line));

    let is_processors_key = |line: &str| {
        let key = line.split(':').next().unwrap_or_default().trim_end();
        !line.starts_with(char::is_whitespace)
            && line.contains(':')
            && key.trim_matches(|c| c == '"' || c == '\'') == "processors"
    };
    let Some((key_line, line)) = lines.find(|(_, line)| is_processors_key(*line)) else {
        return Vec::new();
    };
    let value = line.split_once(':').map(|(_, v)| v.trim_start()).unwrap_or_default();
    if value.starts_with('[') {
        return vec![key_line; declared];
    }

    let mut result = Vec::new();
    let mut item_indent = None;
    let mut awaiting_key = false;
    for (number, line) in lines {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = line.len() - trimmed.len();

        if awaiting_key {
            result.push(number);
            awaiting_key = false;
            continue;
        }

        let is_item = trimmed == "-" || trimmed.starts_with("- ");
        match item_indent {
            None if is_item => item_indent = Some(indent),
            None => break,
            Some(expected) if indent < expected => break,
            Some(expected) if indent == expected && !is_item => break,
            Some(expected) if indent > expected || !is_item => continue,
            Some(_) => {}
        }

        if trimmed == "-" {
            awaiting_key = true;
        } else {
            result.push(number);
        }
    }

    result
}

/// Lines of the first key of every object in the top-level `"processors"` array.
fn json_processor_lines(content: &str) -> Vec<usize> {
    let mut result = Vec::new();
    let mut depth = 0usize;
    let mut line = 1usize;
    let mut chars = content.chars();

    let mut last_string: Option<(String, usize)> = None;
    let mut awaiting_array = false;
    let mut in_processors = false;
    let mut item_keyed = true;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            '"' => {
                let start = line;
                let mut value = String::new();
                while let Some(s) = chars.next() {
                    match s {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => break,
                        '\n' => {
                            line += 1;
                            value.push(s);
                        }
                        _ => value.push(s),
                    }
                }
                last_string = Some((value, start));
            }
            ':' => {
                if let Some((key, key_line)) = last_string.take() {
                    if depth == 1 && key == "processors" && !in_processors {
                        awaiting_array = true;
                    } else if in_processors && depth == 3 && !item_keyed {
                        result.push(key_line);
                        item_keyed = true;
                    }
                }
            }
            '[' => {
                depth += 1;
                if awaiting_array && depth == 2 {
                    in_processors = true;
                }
                awaiting_array = false;
            }
            '{' => {
                depth += 1;
                if in_processors && depth == 3 {
                    item_keyed = false;
                }
                awaiting_array = false;
            }
            ']' => {
                if in_processors && depth == 2 {
                    break;
                }
                depth = depth.saturating_sub(1);
            }
            '}' => depth = depth.saturating_sub(1),
            ',' => last_string = None,
            _ => {}
        }
    }

    result
}

/// Load the ingest pipelines of a data stream, named the way they are installed.
///
/// `default.{yml,json}` is installed as `pipeline_prefix`, every other pipeline file as
/// `pipeline_prefix-<file stem>`.
pub fn load_pipeline_sources(
    data_stream_dir: &Path,
    pipeline_prefix: &str,
) -> anyhow::Result<Vec<PipelineSource>> {
    let pipeline_dir = data_stream_dir.join("elasticsearch").join("ingest_pipeline");
    if !pipeline_dir.exists() {
        log::debug!(
            "No ingest pipelines found in {}",
            data_stream_dir.display()
        );
        return Ok(Vec::new());
    }

    let mut paths = std::fs::read_dir(&pipeline_dir)
        .with_context(|| format!("Listing ingest pipelines in {}", pipeline_dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|p| p.is_file() && PipelineFormat::from_path(p).is_some());
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let name = if stem == "default" {
                pipeline_prefix.to_string()
            } else {
                format!("{pipeline_prefix}-{stem}")
            };
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Reading ingest pipeline {}", path.display()))?;
            PipelineSource::new(name, path, content)
        })
        .collect()
}
