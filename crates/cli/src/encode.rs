use anyhow::{Context, Result};
use clap::ValueEnum;
use phone_matcher_protocol::{MatchOutput, RegistryEntry};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub(crate) const fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// `<dir>/<stem>-clean.<ext>` for an uploaded file.
pub(crate) fn clean_output_path(input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output");
    let name = format!("{stem}-clean.{}", format.extension());
    match input.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

#[derive(Serialize)]
struct StateRow<'a> {
    state: Option<&'a str>,
    phone: &'a str,
}

pub(crate) fn write_match_output<W: Write>(
    out: W,
    output: &MatchOutput,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_match_json(out, output),
        OutputFormat::Csv => write_match_csv(out, output),
    }
}

fn write_match_json<W: Write>(mut out: W, output: &MatchOutput) -> Result<()> {
    match output {
        MatchOutput::Phones(phones) => serde_json::to_writer_pretty(&mut out, phones)?,
        MatchOutput::Tagged(records) => {
            let rows: Vec<StateRow<'_>> = records
                .iter()
                .map(|r| StateRow {
                    state: r.tag.as_deref(),
                    phone: r.phone.as_str(),
                })
                .collect();
            serde_json::to_writer_pretty(&mut out, &rows)?;
        }
    }
    writeln!(out)?;
    Ok(())
}

fn write_match_csv<W: Write>(out: W, output: &MatchOutput) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    match output {
        MatchOutput::Phones(phones) => {
            writer.write_record(["phone"])?;
            for phone in phones {
                writer.write_record([phone.as_str()])?;
            }
        }
        MatchOutput::Tagged(records) => {
            writer.write_record(["state", "phone"])?;
            for record in records {
                writer.write_record([record.tag.as_deref().unwrap_or(""), record.phone.as_str()])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

pub(crate) fn write_entries<W: Write>(
    mut out: W,
    entries: &[RegistryEntry],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, entries)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(["id", "phone", "added_by", "created_at"])?;
            for entry in entries {
                writer.write_record([
                    entry.id.to_string().as_str(),
                    entry.phone.as_str(),
                    entry.owner.as_str(),
                    entry.created_at.to_string().as_str(),
                ])?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

/// Write through a temp sibling and rename, so readers never see a partial file.
pub(crate) fn write_file_atomic(
    path: &Path,
    write: impl FnOnce(&mut std::io::BufWriter<std::fs::File>) -> Result<()>,
) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let tmp = temp_sibling(path);
    let result = write_and_rename(&tmp, path, write);
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// `<name>.tmp-<pid>` next to `path`.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

fn write_and_rename(
    tmp: &Path,
    path: &Path,
    write: impl FnOnce(&mut std::io::BufWriter<std::fs::File>) -> Result<()>,
) -> Result<()> {
    let file = std::fs::File::create(tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    let mut buf = std::io::BufWriter::new(file);
    write(&mut buf)?;
    buf.flush()?;
    drop(buf);
    std::fs::rename(tmp, path)
        .with_context(|| format!("Failed to move output into {}", path.display()))?;
    Ok(())
}
