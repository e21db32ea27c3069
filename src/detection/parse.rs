/// Label parsing for recognized table text
///
/// Turns raw recognizer labels into amounts, cards, actions, stakes and timer
/// seconds.
use regex::Regex;
use std::sync::OnceLock;

use super::cards::Card;
use super::detector::PlayerAction;

fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)(?:\s*([km])\b)?").expect("amount pattern is valid")
    })
}

fn card_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(10|[2-9tjqka])\s*([cdhs♣♦♥♠♧♢♡♤])").expect("card pattern is valid")
    })
}

fn stakes_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)[$€£]?\s*(\d[\d,]*(?:\.\d+)?[km]?)\s*/\s*[$€£]?\s*(\d[\d,]*(?:\.\d+)?[km]?)")
            .expect("stakes pattern is valid")
    })
}

fn ante_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)ante\s*[:=]?\s*[$€£]?\s*(\d[\d,]*(?:\.\d+)?[km]?)")
            .expect("ante pattern is valid")
    })
}

fn clock_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("clock pattern is valid"))
}

fn seconds_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*s?\b").expect("seconds pattern is valid"))
}

/// Parse a chip amount such as `$1,234.50`, `1.2K` or `2.5M BB`
///
/// Returns `None` when no number is present.
pub fn parse_amount(label: &str) -> Option<f64> {
    let captures = amount_pattern().captures(label)?;
    let digits = captures.get(1)?.as_str().replace(',', "");
    let mut value: f64 = digits.parse().ok()?;

    if let Some(suffix) = captures.get(2) {
        match suffix.as_str().to_ascii_lowercase().as_str() {
            "k" => value *= 1_000.0,
            "m" => value *= 1_000_000.0,
            _ => {}
        }
    }

    value.is_finite().then_some(value)
}

/// Parse every amount in a label, in reading order
pub fn parse_amounts(label: &str) -> Vec<f64> {
    amount_pattern()
        .find_iter(label)
        .filter_map(|m| parse_amount(m.as_str()))
        .collect()
}

/// Parse side pot amounts (`"Side pot 1: 40 Side pot 2: 12.5"` or `"40 | 12.5"`)
///
/// When pots are labelled with an index, only the amounts after each colon count.
pub fn parse_side_pots(label: &str) -> Vec<f64> {
    if label.contains(':') {
        label
            .split(':')
            .skip(1)
            .filter_map(parse_amount)
            .collect()
    } else {
        parse_amounts(label)
    }
}

/// Parse all cards in a label (`"Ah Kd 10c"`)
pub fn parse_cards(label: &str) -> Vec<Card> {
    card_pattern()
        .captures_iter(label)
        .filter_map(|captures| {
            let text = format!("{}{}", captures.get(1)?.as_str(), captures.get(2)?.as_str());
            text.parse().ok()
        })
        .collect()
}

/// Parse a seat action label (`"Raise 12.50"`, `"ALL-IN"`, `"posts BB 1"`)
pub fn parse_action(label: &str) -> Option<(PlayerAction, Option<f64>)> {
    let lower = label.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    // All-in first: "all-in" labels often also carry "raise" or "call"
    let action = if lower.contains("all-in") || lower.contains("all in") || lower.contains("allin") {
        PlayerAction::AllIn
    } else if lower.contains("fold") {
        PlayerAction::Fold
    } else if lower.contains("check") {
        PlayerAction::Check
    } else if lower.contains("call") {
        PlayerAction::Call
    } else if lower.contains("raise") {
        PlayerAction::Raise
    } else if lower.contains("bet") {
        PlayerAction::Bet
    } else if lower.contains("post") {
        PlayerAction::Post
    } else {
        return None;
    };

    let amount = match action {
        PlayerAction::Fold | PlayerAction::Check => None,
        _ => parse_amount(&lower),
    };

    Some((action, amount))
}

/// Parse stakes (`"$0.50/$1"`, `"100/200 Ante 25"`) into small, big and ante
pub fn parse_stakes(label: &str) -> Option<(f64, f64, Option<f64>)> {
    let captures = stakes_pattern().captures(label)?;
    let small = parse_amount(captures.get(1)?.as_str())?;
    let big = parse_amount(captures.get(2)?.as_str())?;

    let ante = ante_pattern()
        .captures(label)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_amount(m.as_str()));

    Some((small, big, ante))
}

/// Parse remaining seconds from a timer label (`"0:12"`, `"12s"`, `"7"`)
pub fn parse_seconds(label: &str) -> Option<f32> {
    if let Some(captures) = clock_pattern().captures(label) {
        let minutes: f32 = captures.get(1)?.as_str().parse().ok()?;
        let seconds: f32 = captures.get(2)?.as_str().parse().ok()?;
        return Some(minutes * 60.0 + seconds);
    }

    let captures = seconds_pattern().captures(label)?;
    captures.get(1)?.as_str().parse().ok()
}
