use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::store::{SkillPage, SkillStore};

pub const DEFAULT_CONTENT_DIR: &str = "output";
pub const DEFAULT_SUMMARY_DIR: &str = "ai_summary";

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub output_dir: PathBuf,
    pub written: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

/// `attack_f2p.txt`
pub fn content_file_name(page: &SkillPage) -> String {
    format!("{}_{}.txt", page.name.to_lowercase(), page.mode)
}

/// `Attack_f2p.txt`, spaces replaced by underscores.
pub fn summary_file_name(page: &SkillPage) -> String {
    format!("{}_{}.txt", page.name, page.mode).replace(' ', "_")
}

pub fn content_file_body(page: &SkillPage) -> String {
    format!(
        "--- Skill: {} ({}) ---\n\n{}",
        page.name,
        page.mode.as_str().to_uppercase(),
        page.content
    )
}

pub fn export_skills(store: &SkillStore, output_dir: &Path) -> Result<ExportReport> {
    let records = store.list()?;
    create_output_dir(output_dir)?;
    let mut report = ExportReport {
        output_dir: output_dir.to_path_buf(),
        written: Vec::with_capacity(records.len()),
        skipped: Vec::new(),
    };
    for record in &records {
        let path = output_dir.join(content_file_name(record));
        fs::write(&path, content_file_body(record))
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(skill = %record.name, mode = %record.mode, path = %path.display(), "exported");
        report.written.push(path);
    }
    Ok(report)
}

/// Records without a summary are listed in `skipped`.
pub fn export_summaries(store: &SkillStore, output_dir: &Path) -> Result<ExportReport> {
    let records = store.list()?;
    create_output_dir(output_dir)?;
    let mut report = ExportReport {
        output_dir: output_dir.to_path_buf(),
        written: Vec::new(),
        skipped: Vec::new(),
    };
    for record in &records {
        let Some(summary) = record.summary.as_deref().filter(|_| record.has_summary()) else {
            warn!(skill = %record.name, mode = %record.mode, "skipping, no summary yet");
            report.skipped.push(format!("{} ({})", record.name, record.mode));
            continue;
        };
        let path = output_dir.join(summary_file_name(record));
        fs::write(&path, summary).with_context(|| format!("failed to write {}", path.display()))?;
        info!(skill = %record.name, mode = %record.mode, path = %path.display(), "saved summary");
        report.written.push(path);
    }
    Ok(report)
}

fn create_output_dir(output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))
}
