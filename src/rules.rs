//! Keyword rule tables for pictograms and drink detection
//!
//! Rules are plain data evaluated in priority order, so the tables can be
//! extended without touching the matching code.

use std::sync::LazyLock;

use regex::Regex;

/// How a rule keyword is compared against normalized text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Whole text equals the keyword
    Exact,
    /// Keyword appears anywhere in the text
    Contains,
}

/// Maps a keyword to a pictogram
#[derive(Debug, Clone, Copy)]
pub struct IconRule {
    pub keyword: &'static str,
    pub kind: MatchKind,
    pub icon: &'static str,
}

const fn exact(keyword: &'static str, icon: &'static str) -> IconRule {
    IconRule {
        keyword,
        kind: MatchKind::Exact,
        icon,
    }
}

const fn contains(keyword: &'static str, icon: &'static str) -> IconRule {
    IconRule {
        keyword,
        kind: MatchKind::Contains,
        icon,
    }
}

/// Exact names first, then substring heuristics for longer phrases
pub const ICON_RULES: &[IconRule] = &[
    exact("water", "💧"),
    exact("juice", "🧃"),
    exact("apple juice", "🧃"),
    exact("orange juice", "🧃"),
    exact("grape juice", "🧃"),
    exact("milk", "🥛"),
    exact("tea", "☕"),
    exact("coffee", "☕"),
    exact("apple", "🍎"),
    exact("banana", "🍌"),
    exact("bread", "🍞"),
    exact("toast", "🍞"),
    exact("yogurt", "🥣"),
    exact("fruit", "🍎"),
    exact("sandwich", "🥪"),
    exact("pasta", "🍝"),
    exact("chicken", "🍗"),
    exact("toilet", "🚽"),
    exact("bathroom", "🚽"),
    exact("help", "🆘"),
    exact("show me", "👀"),
    exact("again", "🔁"),
    exact("drawing", "🎨"),
    exact("draw", "🎨"),
    exact("music", "🎵"),
    exact("game", "🎮"),
    exact("minecraft", "🎮"),
    exact("park", "🏞️"),
    exact("walk", "🚶"),
    contains("juice", "🧃"),
    contains("water", "💧"),
    contains("milk", "🥛"),
    contains("toilet", "🚽"),
    contains("bathroom", "🚽"),
    contains("help", "🆘"),
    contains("draw", "🎨"),
    contains("game", "🎮"),
];

/// Pictogram for a reply label or option item, if any rule matches
#[must_use]
pub fn icon_for_text(text: &str) -> Option<&'static str> {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return None;
    }

    let pass = |kind: MatchKind| {
        ICON_RULES
            .iter()
            .filter(move |r| r.kind == kind)
            .find(|r| match kind {
                MatchKind::Exact => t == r.keyword,
                MatchKind::Contains => t.contains(r.keyword),
            })
            .map(|r| r.icon)
    };

    pass(MatchKind::Exact).or_else(|| pass(MatchKind::Contains))
}

/// Leading pictograph (with optional variation selector) followed by text
static EMOJI_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\p{Extended_Pictographic}\x{FE0F}?)\s+(.*)$").expect("valid regex")
});

/// A label split into pictogram and text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconLabel {
    pub icon: Option<String>,
    pub text: String,
}

/// Split `"🧃 Juice"` into icon and text; otherwise look the label up in the
/// icon rules
#[must_use]
pub fn split_icon_label(label: &str) -> IconLabel {
    let raw = label.trim();
    if raw.is_empty() {
        return IconLabel::default();
    }

    if let Some(caps) = EMOJI_PREFIX.captures(raw) {
        return IconLabel {
            icon: Some(caps[1].to_string()),
            text: caps[2].trim().to_string(),
        };
    }

    IconLabel {
        icon: icon_for_text(raw).map(str::to_string),
        text: raw.to_string(),
    }
}

/// A drink the conversation screen can offer without the dialogue service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drink {
    pub key: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    /// Whole-word keywords that mention this drink
    pub keywords: &'static [&'static str],
}

/// Drinks in detection priority order
pub const DRINKS: &[Drink] = &[
    Drink {
        key: "water",
        label: "Water",
        icon: "💧",
        keywords: &["water"],
    },
    Drink {
        key: "orange_juice",
        label: "Orange juice",
        icon: "🧃",
        keywords: &["orange juice", "orange", "oj"],
    },
    Drink {
        key: "apple_juice",
        label: "Apple juice",
        icon: "🧃",
        keywords: &["apple juice", "apple"],
    },
    Drink {
        key: "milk",
        label: "Milk",
        icon: "🥛",
        keywords: &["milk"],
    },
    Drink {
        key: "tea",
        label: "Tea",
        icon: "☕",
        keywords: &["tea"],
    },
];

/// Order in which alternatives are offered
const ALTERNATIVE_ORDER: &[&str] = &["orange_juice", "apple_juice", "water", "tea", "milk"];

/// Lowercase, strip punctuation and collapse whitespace
#[must_use]
pub fn normalise(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Look a drink up by key
#[must_use]
pub fn drink(key: &str) -> Option<&'static Drink> {
    DRINKS.iter().find(|d| d.key == key)
}

/// First drink (in table order) mentioned in `question`
#[must_use]
pub fn detect_drink(question: &str) -> Option<&'static Drink> {
    let padded = format!(" {} ", normalise(question));
    DRINKS.iter().find(|d| {
        d.keywords
            .iter()
            .any(|kw| padded.contains(&format!(" {kw} ")))
    })
}

/// A drink different from `primary` to offer "instead"
#[must_use]
pub fn alternative_drink(primary: Option<&Drink>, fallback: &'static Drink) -> &'static Drink {
    ALTERNATIVE_ORDER
        .iter()
        .filter_map(|key| drink(key))
        .find(|d| primary.is_none_or(|p| p.key != d.key))
        .unwrap_or(fallback)
}
