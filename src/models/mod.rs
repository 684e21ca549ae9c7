//! Release and game-mode models shared by repositories, the installer and the CLI.
//!
//! A [`Release`] is built once from a feed entry and never mutated afterwards.
//! Every `Release` handed to callers carries a parsed [`semver::Version`]; feed
//! entries whose tag cannot be turned into a version are dropped during parsing.
//!
//! # Tag Conventions
//!
//! Localization repositories publish one release stream per game channel and tell
//! them apart by a tag suffix:
//!
//! ```text
//! 3.23.1-v0.6        -> LIVE (suffix is not a mode name)
//! 3.24.0-v0.1-PTU    -> PTU
//! 1.4.2-EPTU         -> EPTU
//! 1.4.2              -> LIVE
//! ```

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Game channel a localization package targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameMode {
    /// The public release channel.
    #[default]
    #[serde(rename = "LIVE", alias = "live", alias = "Live")]
    Live,
    /// Public test universe.
    #[serde(rename = "PTU", alias = "ptu", alias = "Ptu")]
    Ptu,
    /// Evocati (early) public test universe.
    #[serde(rename = "EPTU", alias = "eptu", alias = "Eptu")]
    Eptu,
}

impl GameMode {
    /// All known modes, default first.
    pub const ALL: [GameMode; 3] = [GameMode::Live, GameMode::Ptu, GameMode::Eptu];

    /// Canonical upper-case name, as used in tag suffixes.
    pub const fn as_str(self) -> &'static str {
        match self {
            GameMode::Live => "LIVE",
            GameMode::Ptu => "PTU",
            GameMode::Eptu => "EPTU",
        }
    }

    /// Parses a mode by name, ignoring ASCII case. Surrounding text is not trimmed.
    pub fn parse(name: &str) -> Option<GameMode> {
        Self::ALL.into_iter().find(|mode| mode.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameMode::parse(s).ok_or_else(|| {
            format!("unknown game mode '{s}' (expected one of: LIVE, PTU, EPTU)")
        })
    }
}

/// Returns whether a release tag belongs to the given mode.
///
/// A non-default mode requires the tag to end with `-<MODE>` (any case). The
/// default mode is permissive: it claims every tag whose last `-` segment is
/// missing, empty, or not a known mode name, plus tags explicitly suffixed with
/// the default mode. Every tag therefore belongs to exactly one mode.
pub fn is_tag_for_mode(tag: &str, mode: GameMode) -> bool {
    if mode != GameMode::default() {
        let suffix = format!("-{}", mode.as_str());
        return tag
            .len()
            .checked_sub(suffix.len())
            .and_then(|start| tag.get(start..))
            .is_some_and(|tail| tail.eq_ignore_ascii_case(&suffix));
    }

    match tag.rfind('-') {
        None => true,
        Some(idx) if idx + 1 == tag.len() => true,
        Some(idx) => GameMode::parse(&tag[idx + 1..]).is_none_or(|parsed| parsed == mode),
    }
}

/// Infers the mode a tag belongs to.
pub fn mode_of_tag(tag: &str) -> GameMode {
    GameMode::ALL
        .into_iter()
        .filter(|mode| *mode != GameMode::default())
        .find(|mode| is_tag_for_mode(tag, *mode))
        .unwrap_or_default()
}

/// Parses a release tag into a semantic version.
///
/// Trims whitespace, strips a leading `v`/`V` and a trailing `-<MODE>` suffix,
/// then parses strictly. Short numeric cores are padded (`1.2` becomes `1.2.0`).
pub fn parse_tag_version(tag: &str) -> Option<Version> {
    let trimmed = tag.trim();
    let body = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    let body = strip_mode_suffix(body);

    if let Ok(version) = Version::parse(body) {
        return Some(version);
    }

    let split = body.find(['-', '+']).unwrap_or(body.len());
    let (core, rest) = body.split_at(split);
    let parts: Vec<u64> = core.split('.').map(str::parse).collect::<Result<_, _>>().ok()?;
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let component = |i: usize| parts.get(i).copied().unwrap_or(0);
    Version::parse(&format!("{}.{}.{}{rest}", component(0), component(1), component(2))).ok()
}

fn strip_mode_suffix(body: &str) -> &str {
    match body.rfind('-') {
        Some(idx) if GameMode::parse(&body[idx + 1..]).is_some() => &body[..idx],
        _ => body,
    }
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// One published version of a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Tag exactly as published.
    pub tag: String,
    /// Human-readable title; falls back to the tag when the feed has none.
    pub name: String,
    pub version: Version,
    pub prerelease: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub assets: Vec<ReleaseAsset>,
    /// Zipball of the tagged source tree.
    pub source_archive_url: Option<String>,
}

impl Release {
    /// Game mode inferred from the tag suffix.
    pub fn mode(&self) -> GameMode {
        mode_of_tag(&self.tag)
    }

    /// Whether a user-supplied version hint names this release.
    ///
    /// The tag is compared case-insensitively first, then the parsed versions.
    pub fn matches_hint(&self, hint: &str) -> bool {
        let hint = hint.trim();
        self.tag.eq_ignore_ascii_case(hint)
            || parse_tag_version(hint).is_some_and(|v| v == self.version)
    }

    /// Finds an asset by file name, ignoring ASCII case.
    pub fn asset_named(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

impl PartialEq for Release {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Release {}

impl PartialOrd for Release {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Release {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version).then_with(|| self.tag.cmp(&other.tag))
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if self.prerelease {
            write!(f, " (pre-release)")?;
        }
        Ok(())
    }
}
