/// Capture source classifier
///
/// Ranks candidate windows by how likely they are to be a live table.
/// Rule order is fixed:
///
/// 1. Exclusion patterns (development tools, chat, trackers). Always win.
/// 2. Known table-application signatures → `High`
/// 3. Generic card-game keywords → `Medium`
/// 4. Anything else → `Low`
///
/// Classification is a pure function of the title.
pub mod normalize;

pub use normalize::normalize_title;

use regex::Regex;
use std::fmt;

use crate::capture::{SourceHandle, SourceInfo};
use crate::error::ConfigError;

const EXCLUSION_PATTERNS: &[&str] = &[
    r"\bvisual studio\b",
    r"\bvs ?code\b",
    r"\b(intellij|pycharm|webstorm|clion|rustrover|rider|goland)\b",
    r"\bxcode\b",
    r"\bsublime text\b",
    r"\bnotepad\+*",
    r"\b(vim|neovim|emacs)\b",
    r"\b(terminal|iterm2?|powershell|command prompt|alacritty|wezterm|kitty)\b",
    r"\bcmd\.exe\b",
    r"\b(github|gitlab|bitbucket|stack overflow)\b",
    r"\b(devtools|developer tools)\b",
    r"\b(slack|discord|telegram|whatsapp)\b",
    r"\bobs( studio)?\b",
    r"\btable[- ]?watch\b",
    r"\b(holdem manager|hold'em manager|poker ?tracker|hand2note|gto ?wizard|piosolver)\b",
    r"\.(rs|py|ts|js|md|toml|json)\b",
];

const HIGH_PATTERNS: &[&str] = &[
    r"\bpokerstars\b",
    r"\b(ggpoker|natural8|clubgg)\b",
    r"\b888 ?poker\b",
    r"\bpartypoker\b",
    r"\bwinamax\b",
    r"\b(americas cardroom|acr poker)\b",
    r"\bwpt global\b",
    r"\b(ignition|bovada)\b",
    r"\bcoinpoker\b",
    r"\b(ipoker|unibet poker|pokerbros|pppoker)\b",
];

/// Stakes or game-type signature that upgrades a high match to full confidence
const TABLE_SIGNATURE_PATTERNS: &[&str] = &[
    r"[$€£]?\d+(\.\d+)?[km]?\s*/\s*[$€£]?\d+(\.\d+)?[km]?",
    r"\b(nlhe|plo\d?|nl ?hold'?em|no limit|pot limit|fixed limit|nl\d+)\b",
];

const MEDIUM_PATTERNS: &[&str] = &[
    r"\bpoker\b",
    r"\bhold'?em\b",
    r"\bomaha\b",
    r"\b(nlhe|plo\d?)\b",
    r"\btable\b",
    r"\btournament\b",
    r"\bblinds?\b",
    r"\bcash game\b",
    r"\b(sit ?& ?go|sng|spin ?& ?go)\b",
    r"\bante\b",
];

const HIGH_SCORE: f32 = 0.9;
const HIGH_SIGNATURE_BONUS: f32 = 0.1;
const MEDIUM_BASE_SCORE: f32 = 0.5;
const MEDIUM_KEYWORD_BONUS: f32 = 0.05;
const MEDIUM_MAX_SCORE: f32 = 0.75;
const LOW_SCORE: f32 = 0.1;

/// Classification category, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceCategory {
    High,
    Medium,
    Low,
    Excluded,
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceCategory::High => "high",
            SourceCategory::Medium => "medium",
            SourceCategory::Low => "low",
            SourceCategory::Excluded => "excluded",
        };
        f.write_str(name)
    }
}

/// Classified capture source. Created per scan cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCandidate {
    pub handle: SourceHandle,
    pub title: String,
    pub score: f32,
    pub category: SourceCategory,
}

/// Title-based source classifier
pub struct SourceClassifier {
    exclusions: Vec<Regex>,
    high: Vec<Regex>,
    signatures: Vec<Regex>,
    medium: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                tracing::error!("Skipping invalid classifier pattern '{}': {}", pattern, err);
                None
            }
        })
        .collect()
}

impl SourceClassifier {
    pub fn new() -> Self {
        Self {
            exclusions: compile(EXCLUSION_PATTERNS),
            high: compile(HIGH_PATTERNS),
            signatures: compile(TABLE_SIGNATURE_PATTERNS),
            medium: compile(MEDIUM_PATTERNS),
        }
    }

    /// Add user-supplied exclusion patterns (matched against normalized titles)
    pub fn with_exclusions(mut self, patterns: &[String]) -> Result<Self, ConfigError> {
        for pattern in patterns {
            let regex = Regex::new(&pattern.to_lowercase()).map_err(|err| {
                ConfigError::Invalid(format!("exclusion pattern '{}': {}", pattern, err))
            })?;
            self.exclusions.push(regex);
        }
        Ok(self)
    }

    /// Classify a window title into a score and category
    pub fn classify(&self, title: &str) -> (f32, SourceCategory) {
        let normalized = normalize_title(title);
        if normalized.is_empty() {
            return (0.0, SourceCategory::Low);
        }

        if self.exclusions.iter().any(|p| p.is_match(&normalized)) {
            return (0.0, SourceCategory::Excluded);
        }

        if self.high.iter().any(|p| p.is_match(&normalized)) {
            let score = if self.signatures.iter().any(|p| p.is_match(&normalized)) {
                HIGH_SCORE + HIGH_SIGNATURE_BONUS
            } else {
                HIGH_SCORE
            };
            return (score.min(1.0), SourceCategory::High);
        }

        let keyword_hits = self.medium.iter().filter(|p| p.is_match(&normalized)).count();
        if keyword_hits > 0 {
            let score = MEDIUM_BASE_SCORE + MEDIUM_KEYWORD_BONUS * (keyword_hits - 1) as f32;
            return (score.min(MEDIUM_MAX_SCORE), SourceCategory::Medium);
        }

        (LOW_SCORE, SourceCategory::Low)
    }

    pub fn candidate(&self, info: SourceInfo) -> SourceCandidate {
        let (score, category) = self.classify(&info.title);
        SourceCandidate {
            handle: info.handle,
            title: info.title,
            score,
            category,
        }
    }

    /// Split sources into high, medium and excluded, each best-first
    ///
    /// Low candidates are dropped.
    pub fn filter_and_prioritize(
        &self,
        sources: Vec<SourceInfo>,
    ) -> (Vec<SourceCandidate>, Vec<SourceCandidate>, Vec<SourceCandidate>) {
        let mut high = Vec::new();
        let mut medium = Vec::new();
        let mut excluded = Vec::new();

        for info in sources {
            let candidate = self.candidate(info);
            match candidate.category {
                SourceCategory::High => high.push(candidate),
                SourceCategory::Medium => medium.push(candidate),
                SourceCategory::Excluded => excluded.push(candidate),
                SourceCategory::Low => {
                    tracing::debug!("Ignoring low-priority source '{}'", candidate.title);
                }
            }
        }

        high.sort_by(|a, b| b.score.total_cmp(&a.score));
        medium.sort_by(|a, b| b.score.total_cmp(&a.score));

        (high, medium, excluded)
    }

    /// Pick the best capture target: best high, else best medium
    pub fn select_target(&self, sources: Vec<SourceInfo>) -> Option<SourceCandidate> {
        let (high, medium, _) = self.filter_and_prioritize(sources);
        high.into_iter().next().or_else(|| medium.into_iter().next())
    }
}

impl Default for SourceClassifier {
    fn default() -> Self {
        Self::new()
    }
}
