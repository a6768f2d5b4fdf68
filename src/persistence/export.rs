use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::macros::format_description;

use crate::analysis::result::{AnalysisResult, MethodGraph};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExportKind {
    ResultJson,
    Code,
    GraphCsv,
}

impl ExportKind {
    fn stem(self) -> &'static str {
        match self {
            ExportKind::ResultJson => "analysis",
            ExportKind::Code => "reproduction",
            ExportKind::GraphCsv => "method_graph",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ExportKind::ResultJson => "json",
            ExportKind::Code => "py",
            ExportKind::GraphCsv => "csv",
        }
    }
}

/// `{dir}/{stem}_{timestamp}.{ext}`
pub fn timestamped_path(dir: &Path, kind: ExportKind) -> PathBuf {
    let now = OffsetDateTime::now_utc();
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = now.format(fmt).unwrap_or_else(|_| "unknown".to_string());
    dir.join(format!("{}_{}.{}", kind.stem(), stamp, kind.extension()))
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
    let tmp_path = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(data)?;
        f.flush()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

/// Full result as pretty JSON. Re-validating the file yields the same result.
pub fn export_result_json(result: &AnalysisResult, path: &Path) -> anyhow::Result<()> {
    let mut s = serde_json::to_string_pretty(result)?;
    // ensure newline at end
    s.push('\n');
    atomic_write(path, s.as_bytes())?;
    Ok(())
}

/// Generated code, byte for byte.
pub fn export_code(result: &AnalysisResult, path: &Path) -> anyhow::Result<()> {
    atomic_write(path, result.code.as_bytes())?;
    Ok(())
}

/// Writes `{stem}_nodes.csv` and `{stem}_links.csv` next to `base_path`.
pub fn export_graph_csv(graph: &MethodGraph, base_path: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let parent = base_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let stem = base_path.file_stem().and_then(|s| s.to_str()).unwrap_or("graph");
    let nodes_path = parent.join(format!("{}_nodes.csv", stem));
    let links_path = parent.join(format!("{}_links.csv", stem));
    {
        let mut wtr = csv::Writer::from_path(&nodes_path)?;
        wtr.write_record(["id", "group", "label"])?;
        for n in &graph.nodes {
            wtr.write_record([n.id.as_str(), n.group.as_str(), n.label.as_str()])?;
        }
        wtr.flush()?;
    }
    {
        let mut wtr = csv::Writer::from_path(&links_path)?;
        wtr.write_record(["source", "target", "value"])?;
        for l in &graph.links {
            wtr.write_record([l.source.clone(), l.target.clone(), l.weight.to_string()])?;
        }
        wtr.flush()?;
    }
    Ok((nodes_path, links_path))
}

/// Export into the configured directory with a timestamped name.
pub fn export_to_dir(result: &AnalysisResult, dir: &Path, kind: ExportKind) -> anyhow::Result<PathBuf> {
    let path = timestamped_path(dir, kind);
    match kind {
        ExportKind::ResultJson => export_result_json(result, &path)?,
        ExportKind::Code => export_code(result, &path)?,
        ExportKind::GraphCsv => {
            let (nodes, _links) = export_graph_csv(&result.graph, &path)?;
            return Ok(nodes);
        }
    }
    log::info!("exported {:?} to {}", kind, path.display());
    Ok(path)
}
