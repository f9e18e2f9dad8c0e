use anyhow::Result;
use serde::Serialize;

use crate::store::{SkillPage, SkillStore};

pub const EMPTY_LISTING_MESSAGE: &str = "No skills found in the database.";
pub const PING_MESSAGE: &str = "Database connected";

/// Either the full record list or a message object when the table is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SkillListing {
    Records(Vec<SkillPage>),
    Empty { message: String },
}

pub fn list_skills(store: &SkillStore) -> Result<SkillListing> {
    let records = store.list()?;
    if records.is_empty() {
        return Ok(SkillListing::Empty {
            message: EMPTY_LISTING_MESSAGE.to_string(),
        });
    }
    Ok(SkillListing::Records(records))
}

#[derive(Debug, Clone, Serialize)]
pub struct PingStatus {
    pub status: &'static str,
    pub message: &'static str,
}

pub fn ping(store: &SkillStore) -> Result<PingStatus> {
    store.ping()?;
    Ok(PingStatus {
        status: "ok",
        message: PING_MESSAGE,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Credits {
    pub video_creator: &'static str,
    pub data_source: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AboutInfo {
    pub project_name: &'static str,
    pub description: &'static str,
    pub tech_stack: Vec<&'static str>,
    pub credits: Credits,
    pub repository: &'static str,
}

pub fn about() -> AboutInfo {
    AboutInfo {
        project_name: "OSRS Simplified",
        description: "Condensed Old School RuneScape skill training guides, fetched from the \
                      official wiki and summarized by level range.",
        tech_stack: vec!["Rust", "axum", "SQLite", "OpenAI"],
        credits: Credits {
            video_creator: "Melankola",
            data_source: "Old School RuneScape Wiki (oldschool.runescape.wiki)",
        },
        repository: "https://github.com/CadenLofgren/osrssimplified",
    }
}
