use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    F2p,
    P2p,
}

impl Mode {
    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("f2p") {
            return Ok(Self::F2p);
        }
        if value.eq_ignore_ascii_case("p2p") {
            return Ok(Self::P2p);
        }
        bail!("unsupported mode: {value} (expected f2p|p2p)")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::F2p => "f2p",
            Self::P2p => "p2p",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub skill: &'static str,
    pub mode: Mode,
    pub page: &'static str,
}

const fn entry(skill: &'static str, mode: Mode, page: &'static str) -> CatalogEntry {
    CatalogEntry { skill, mode, page }
}

/// Training guides per skill. Melee skills share the melee pages, and
/// Construction's p2p title is expected to fall back to `Construction_training`.
pub const SKILL_CATALOG: &[CatalogEntry] = &[
    entry("Attack", Mode::F2p, "Free-to-play_melee_training"),
    entry("Attack", Mode::P2p, "Pay-to-play_melee_training"),
    entry("Strength", Mode::F2p, "Free-to-play_melee_training"),
    entry("Strength", Mode::P2p, "Pay-to-play_melee_training"),
    entry("Defence", Mode::F2p, "Free-to-play_melee_training"),
    entry("Defence", Mode::P2p, "Pay-to-play_melee_training"),
    entry("Hitpoints", Mode::F2p, "Free-to-play_melee_training"),
    entry("Hitpoints", Mode::P2p, "Pay-to-play_melee_training"),
    entry("Ranged", Mode::F2p, "Free-to-play_ranged_training"),
    entry("Ranged", Mode::P2p, "Pay-to-play_ranged_training"),
    entry("Prayer", Mode::F2p, "Free-to-play_prayer_training"),
    entry("Prayer", Mode::P2p, "Pay-to-play_prayer_training"),
    entry("Magic", Mode::F2p, "Free-to-play_magic_training"),
    entry("Magic", Mode::P2p, "Pay-to-play_magic_training"),
    entry("Runecraft", Mode::F2p, "Free-to-play_Runecraft_training"),
    entry("Runecraft", Mode::P2p, "Pay-to-play_Runecraft_training"),
    entry("Construction", Mode::P2p, "Pay-to-play_Construction_training"),
    entry("Agility", Mode::P2p, "Agility_training"),
    entry("Herblore", Mode::P2p, "Herblore_training"),
    entry("Thieving", Mode::P2p, "Thieving_training"),
    entry("Crafting", Mode::F2p, "Free-to-play_Crafting_training"),
    entry("Crafting", Mode::P2p, "Pay-to-play_Crafting_training"),
    entry("Fletching", Mode::P2p, "Fletching_training"),
    entry("Slayer", Mode::P2p, "Slayer_training"),
    entry("Hunter", Mode::P2p, "Hunter_training"),
    entry("Mining", Mode::F2p, "Free-to-play_Mining_training"),
    entry("Mining", Mode::P2p, "Pay-to-play_Mining_training"),
    entry("Smithing", Mode::F2p, "Free-to-play_Smithing_training"),
    entry("Smithing", Mode::P2p, "Pay-to-play_Smithing_training"),
    entry("Fishing", Mode::F2p, "Free-to-play_Fishing_training"),
    entry("Fishing", Mode::P2p, "Pay-to-play_Fishing_training"),
    entry("Cooking", Mode::F2p, "Free-to-play_Cooking_training"),
    entry("Cooking", Mode::P2p, "Pay-to-play_Cooking_training"),
    entry("Firemaking", Mode::F2p, "Free-to-play_Firemaking_training"),
    entry("Firemaking", Mode::P2p, "Pay-to-play_Firemaking_training"),
    entry("Woodcutting", Mode::F2p, "Free-to-play_Woodcutting_training"),
    entry("Woodcutting", Mode::P2p, "Pay-to-play_Woodcutting_training"),
    entry("Farming", Mode::P2p, "Farming_training"),
];

/// Secondary title tried when the catalog page is missing.
pub fn fallback_title(skill: &str) -> String {
    format!("{}_training", skill.trim().replace(' ', "_"))
}

/// Entries for `skill`, matched case-insensitively, in catalog order.
pub fn entries_for_skill<'a>(catalog: &'a [CatalogEntry], skill: &str) -> Vec<&'a CatalogEntry> {
    let skill = skill.trim();
    catalog
        .iter()
        .filter(|entry| entry.skill.eq_ignore_ascii_case(skill))
        .collect()
}

/// Picks the entry for an on-demand lookup. Without an explicit mode the
/// p2p guide is preferred.
pub fn find_entry<'a>(
    catalog: &'a [CatalogEntry],
    skill: &str,
    mode: Option<Mode>,
) -> Option<&'a CatalogEntry> {
    let entries = entries_for_skill(catalog, skill);
    match mode {
        Some(mode) => entries.into_iter().find(|entry| entry.mode == mode),
        None => entries
            .iter()
            .find(|entry| entry.mode == Mode::P2p)
            .or_else(|| entries.first())
            .copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_is_case_insensitive() {
        assert_eq!(Mode::parse("F2P").expect("parse"), Mode::F2p);
        assert_eq!(Mode::parse("p2p").expect("parse"), Mode::P2p);
        let error = Mode::parse("ironman").expect_err("must fail");
        assert!(error.to_string().contains("unsupported mode"));
    }

    #[test]
    fn fallback_title_uses_training_suffix() {
        assert_eq!(fallback_title("Construction"), "Construction_training");
        assert_eq!(fallback_title(" Skill Name "), "Skill_Name_training");
    }

    #[test]
    fn catalog_pairs_are_unique() {
        let mut seen = std::collections::BTreeSet::new();
        for entry in SKILL_CATALOG {
            assert!(
                seen.insert((entry.skill, entry.mode)),
                "duplicate catalog entry {} ({})",
                entry.skill,
                entry.mode
            );
        }
        assert_eq!(seen.len(), SKILL_CATALOG.len());
    }

    #[test]
    fn find_entry_prefers_p2p_without_explicit_mode() {
        let entry = find_entry(SKILL_CATALOG, "mining", None).expect("mining");
        assert_eq!(entry.mode, Mode::P2p);
        assert_eq!(entry.page, "Pay-to-play_Mining_training");

        let entry = find_entry(SKILL_CATALOG, "Mining", Some(Mode::F2p)).expect("f2p mining");
        assert_eq!(entry.page, "Free-to-play_Mining_training");

        assert!(find_entry(SKILL_CATALOG, "Farming", Some(Mode::F2p)).is_none());
        assert!(find_entry(SKILL_CATALOG, "Sailing", None).is_none());
    }

    #[test]
    fn find_entry_falls_back_to_first_entry() {
        let catalog = [entry("Testing", Mode::F2p, "Free-to-play_testing")];
        let found = find_entry(&catalog, "testing", None).expect("entry");
        assert_eq!(found.mode, Mode::F2p);
    }
}
