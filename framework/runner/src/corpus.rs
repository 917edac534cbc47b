use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::scenario::{CorporaAsset, Generator};

/// Template language of a corpus template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemplateType {
    #[default]
    Placeholder,
    GoText,
}

impl TemplateType {
    /// Unknown names fall back to [TemplateType::Placeholder] with a warning.
    pub fn resolve(name: Option<&str>) -> Self {
        match name {
            None | Some("") | Some("placeholder") => TemplateType::Placeholder,
            Some("gotext") => TemplateType::GoText,
            Some(other) => {
                log::warn!("Unknown corpus template type '{other}', using 'placeholder'");
                TemplateType::Placeholder
            }
        }
    }
}

/// How much data the generator should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusTarget {
    Events(u64),
    Bytes(u64),
}

/// Everything a generator needs, read from the scenario and the benchmark directory.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorAssets {
    pub template_type: TemplateType,
    pub template: Vec<u8>,
    pub fields: Vec<u8>,
    pub config: Vec<u8>,
    pub target: CorpusTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    Event,
    Exhausted,
}

/// Produces synthetic documents one at a time.
pub trait CorpusGenerator: Send {
    /// Append the next document to `sink`, or report that the corpus is complete.
    fn emit(&mut self, sink: &mut Vec<u8>) -> anyhow::Result<Emit>;

    fn close(&mut self) -> anyhow::Result<()>;
}

pub trait GeneratorFactory: Send + Sync {
    fn create(&self, assets: GeneratorAssets) -> anyhow::Result<Box<dyn CorpusGenerator>>;
}

/// A generated corpus on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub path: PathBuf,
    pub documents: u64,
}

/// Read the generator assets of a scenario.
///
/// Asset paths are relative to `bench_dir` and may reference environment variables.
pub fn load_assets(generator: &Generator, bench_dir: &Path) -> anyhow::Result<GeneratorAssets> {
    let target = match (generator.total_events, &generator.size) {
        (Some(events), _) => CorpusTarget::Events(events),
        (None, Some(size)) => CorpusTarget::Bytes(
            parse_size(size).with_context(|| format!("Invalid corpus size '{size}'"))?,
        ),
        (None, None) => bail!("The corpus generator needs either 'total_events' or 'size'"),
    };

    let template = match (&generator.template.raw, &generator.template.path) {
        (Some(raw), _) => raw.clone().into_bytes(),
        (None, Some(path)) => read_asset(bench_dir, path, "template")?,
        (None, None) => bail!("The corpus generator needs a template"),
    };

    let fields = load_asset(&generator.fields, bench_dir, "fields")?
        .context("The corpus generator needs field definitions")?;
    let config = load_asset(&generator.config, bench_dir, "config")?.unwrap_or_default();

    Ok(GeneratorAssets {
        template_type: TemplateType::resolve(generator.template.template_type.as_deref()),
        template,
        fields,
        config,
        target,
    })
}

fn load_asset(
    asset: &CorporaAsset,
    bench_dir: &Path,
    kind: &str,
) -> anyhow::Result<Option<Vec<u8>>> {
    if let Some(raw) = &asset.raw {
        let encoded = serde_yaml::to_string(raw)
            .with_context(|| format!("Failed to encode inline {kind}"))?;
        return Ok(Some(encoded.into_bytes()));
    }

    asset
        .path
        .as_deref()
        .map(|path| read_asset(bench_dir, path, kind))
        .transpose()
}

fn read_asset(bench_dir: &Path, path: &str, kind: &str) -> anyhow::Result<Vec<u8>> {
    let path = bench_dir.join(expand_env(path));
    std::fs::read(&path).with_context(|| format!("Can't open {kind} file {}", path.display()))
}

/// Expand `$VAR` and `${VAR}` from the environment, unset variables expand to nothing.
///
/// An unterminated `${` is kept as written.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let name = if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed {
                out.push_str("${");
                out.push_str(&name);
                continue;
            }
            name
        } else {
            let mut name = String::new();
            while let Some(c) = chars.peek().copied() {
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    break;
                }
                name.push(c);
                chars.next();
            }
            name
        };

        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&std::env::var(&name).unwrap_or_default());
        }
    }

    out
}

/// Parse a byte size such as `20MiB`, `1.5GB` or `512`.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: f64 = number.parse().ok()?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "ki" | "kib" => 1 << 10,
        "m" | "mb" => 1_000_000,
        "mi" | "mib" => 1 << 20,
        "g" | "gb" => 1_000_000_000,
        "gi" | "gib" => 1 << 30,
        "t" | "tb" => 1_000_000_000_000,
        "ti" | "tib" => 1 << 40,
        _ => return None,
    };

    Some((number * multiplier as f64) as u64)
}

/// Drain `generator` into a new `corpus-*` file in `dest_dir`, one document per line.
///
/// Line breaks inside a document are removed. The file is deleted again if generation fails.
pub async fn generate_corpus(
    generator: Box<dyn CorpusGenerator>,
    dest_dir: PathBuf,
) -> anyhow::Result<CorpusFile> {
    tokio::task::spawn_blocking(move || write_corpus(generator, &dest_dir))
        .await
        .context("Corpus generation task failed")?
}

fn write_corpus(
    mut generator: Box<dyn CorpusGenerator>,
    dest_dir: &Path,
) -> anyhow::Result<CorpusFile> {
    let (file, path) = tempfile::Builder::new()
        .prefix("corpus-")
        .tempfile_in(dest_dir)
        .with_context(|| format!("Can't create corpus file in {}", dest_dir.display()))?
        .keep()
        .context("Can't keep corpus file")?;

    let mut writer = BufWriter::new(file);
    let written = emit_all(generator.as_mut(), &mut writer).and_then(|documents| {
        writer.flush()?;
        generator.close()?;
        Ok(documents)
    });
    drop(writer);

    match written {
        Ok(documents) => Ok(CorpusFile { path, documents }),
        Err(e) => {
            if let Err(remove_err) = std::fs::remove_file(&path) {
                log::warn!(
                    "Failed to remove partial corpus file {}: {remove_err}",
                    path.display()
                );
            }
            Err(e.context("Can't generate benchmark data corpus"))
        }
    }
}

fn emit_all(generator: &mut dyn CorpusGenerator, writer: &mut impl Write) -> anyhow::Result<u64> {
    let mut buf = Vec::new();
    let mut documents = 0;

    loop {
        buf.clear();
        if generator.emit(&mut buf)? == Emit::Exhausted {
            break;
        }

        buf.retain(|b| *b != b'\n' && *b != b'\r');
        writer.write_all(&buf)?;
        writer.write_all(b"\n")?;
        documents += 1;
    }

    Ok(documents)
}
