use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{CatalogEntry, Mode};
use crate::clean::{MarkupFormat, clean_markup};
use crate::error::{ErrorKind, error_kind};
use crate::store::{SkillStore, compute_hash};
use crate::wiki::{WikiApi, fetch_with_fallback};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchAction {
    Added,
    Updated,
    Unchanged,
    Failed,
}

impl FetchAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub skill: String,
    pub mode: Mode,
    pub page: String,
    pub action: FetchAction,
    pub error_kind: Option<ErrorKind>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub success: bool,
    pub requested: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub items: Vec<FetchItemResult>,
}

/// Fetches every catalog entry and upserts it keyed by (skill, mode).
/// A failing entry is recorded and the batch moves on.
pub fn store_skills<A: WikiApi + ?Sized>(
    api: &A,
    store: &SkillStore,
    catalog: &[CatalogEntry],
    format: MarkupFormat,
) -> FetchReport {
    let mut report = FetchReport {
        success: true,
        requested: catalog.len(),
        added: 0,
        updated: 0,
        unchanged: 0,
        failed: 0,
        items: Vec::with_capacity(catalog.len()),
    };

    for entry in catalog {
        let item = match store_entry(api, store, entry, format) {
            Ok((action, page)) => FetchItemResult {
                skill: entry.skill.to_string(),
                mode: entry.mode,
                page,
                action,
                error_kind: None,
                detail: None,
            },
            Err(error) => {
                let kind = error_kind(&error);
                warn!(
                    skill = entry.skill,
                    mode = %entry.mode,
                    kind = kind.as_str(),
                    "failed to store skill: {error:#}"
                );
                FetchItemResult {
                    skill: entry.skill.to_string(),
                    mode: entry.mode,
                    page: entry.page.to_string(),
                    action: FetchAction::Failed,
                    error_kind: Some(kind),
                    detail: Some(format!("{error:#}")),
                }
            }
        };
        match item.action {
            FetchAction::Added => report.added += 1,
            FetchAction::Updated => report.updated += 1,
            FetchAction::Unchanged => report.unchanged += 1,
            FetchAction::Failed => report.failed += 1,
        }
        report.items.push(item);
    }

    report.success = report.failed == 0;
    report
}

fn store_entry<A: WikiApi + ?Sized>(
    api: &A,
    store: &SkillStore,
    entry: &CatalogEntry,
    format: MarkupFormat,
) -> Result<(FetchAction, String)> {
    let resolved = fetch_with_fallback(api, entry.skill, entry.mode, entry.page)?;
    let content = clean_markup(&resolved.markup, format);
    let hash = compute_hash(&content);

    let action = match store.find(entry.skill, entry.mode)? {
        Some(existing) if existing.hash == hash => {
            info!(skill = entry.skill, mode = %entry.mode, "no change");
            FetchAction::Unchanged
        }
        Some(existing) => {
            store.update_content(existing.id, &content, &hash)?;
            info!(skill = entry.skill, mode = %entry.mode, page = %resolved.title, "updated");
            FetchAction::Updated
        }
        None => {
            store.insert(entry.skill, entry.mode, &content, &hash)?;
            info!(skill = entry.skill, mode = %entry.mode, page = %resolved.title, "added");
            FetchAction::Added
        }
    };
    Ok((action, resolved.title))
}
