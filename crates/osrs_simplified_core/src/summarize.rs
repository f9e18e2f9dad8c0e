use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::Mode;
use crate::error::{ErrorKind, error_kind};
use crate::llm::CompletionApi;
use crate::store::SkillStore;

pub const MAX_PROMPT_CONTENT_CHARS: usize = 50_000;

const PROMPT_TEMPLATE: &str = "\
You are summarizing the Old School RuneScape wiki training guide for the skill: {skill} ({mode}).

Goal: a clear, accurate Markdown summary for both beginners and experienced players, covering only the key training information.

Instructions:
- Write the summary in Markdown.
- Organize it by level ranges, using the ranges as section headers, for example:
  ### Level 1–20
  ### Level 20–40
  ### Level 40+
- For each range list the main training methods, important locations, notable equipment or items, and key unlocks or transitions.
- Bold important **training methods**, **locations**, and **items**.
- Keep the tone factual and efficient, like a simplified wiki guide.
- Do not include meta text, AI references, or offers of further help.
- Do not add a conclusion; end after the last level range.
- Leave out lore, trivia, pricing, and unnecessary mechanics.

Now summarize the following wiki content accordingly:

";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryScope {
    /// Only records whose summary is NULL or blank.
    #[default]
    Missing,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryAction {
    Summarized,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryItemResult {
    pub id: i64,
    pub skill: String,
    pub mode: Mode,
    pub action: SummaryAction,
    pub error_kind: Option<ErrorKind>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub success: bool,
    pub scope: SummaryScope,
    pub considered: usize,
    pub summarized: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<SummaryItemResult>,
}

pub fn build_prompt(content: &str, skill: &str, mode: Mode) -> String {
    let header = PROMPT_TEMPLATE
        .replace("{skill}", skill)
        .replace("{mode}", mode.as_str());
    format!("{header}{}", truncate_chars(content, MAX_PROMPT_CONTENT_CHARS))
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

pub fn summarize_content<L: CompletionApi + ?Sized>(
    llm: &L,
    content: &str,
    skill: &str,
    mode: Mode,
) -> Result<String> {
    let prompt = build_prompt(content, skill, mode);
    let summary = llm
        .complete(&prompt)
        .with_context(|| format!("failed to summarize {skill} ({mode})"))?;
    Ok(summary.trim().to_string())
}

/// Writes LLM summaries onto stored records, one record at a time.
pub fn summarize_skills<L: CompletionApi + ?Sized>(
    store: &SkillStore,
    llm: &L,
    scope: SummaryScope,
) -> Result<SummaryReport> {
    let records = store.list()?;
    let mut report = SummaryReport {
        success: true,
        scope,
        considered: records.len(),
        summarized: 0,
        skipped: 0,
        failed: 0,
        items: Vec::with_capacity(records.len()),
    };

    for record in records {
        let mut item = SummaryItemResult {
            id: record.id,
            skill: record.name.clone(),
            mode: record.mode,
            action: SummaryAction::Skipped,
            error_kind: None,
            detail: None,
        };
        if scope == SummaryScope::Missing && record.has_summary() {
            report.skipped += 1;
            report.items.push(item);
            continue;
        }

        let outcome = summarize_content(llm, &record.content, &record.name, record.mode)
            .and_then(|summary| store.set_summary(record.id, &summary));
        match outcome {
            Ok(()) => {
                info!(skill = %record.name, mode = %record.mode, "summarized");
                item.action = SummaryAction::Summarized;
                report.summarized += 1;
            }
            Err(error) => {
                warn!(skill = %record.name, mode = %record.mode, "failed to summarize: {error:#}");
                item.action = SummaryAction::Failed;
                item.error_kind = Some(error_kind(&error));
                item.detail = Some(format!("{error:#}"));
                report.failed += 1;
            }
        }
        report.items.push(item);
    }

    report.success = report.failed == 0;
    Ok(report)
}
