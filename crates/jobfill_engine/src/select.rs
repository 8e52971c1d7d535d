//! Maps a free-text answer onto one option of a `<select>`.
//!
//! Strategies are tried in order (exact, numeric range, word tokens,
//! punctuation-insensitive substring); the first one that produces a
//! candidate wins and later strategies are not consulted.

use regex::Regex;
use std::sync::LazyLock;

use crate::dom::SelectOption;
use crate::text::{compact, tokens};

/// Maximum distance between the answer and a lone number in an option.
pub const NUMERIC_TOLERANCE: u64 = 2;
/// Words of this length or shorter are ignored when comparing tokens.
const INSIGNIFICANT_LEN: usize = 2;
/// Answers beyond this are not treated as quantities.
const MAX_NUMERIC_ANSWER: f64 = 1e9;

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));
static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?").expect("valid regex"));

type Strategy = fn(&str, &[SelectOption]) -> Option<usize>;

pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("exact", exact_or_contained),
    ("numeric-range", numeric_range),
    ("word-tokens", word_tokens),
    ("substring", compact_substring),
];

/// Index of the chosen option, if any strategy produced one.
pub fn match_option(answer: &str, options: &[SelectOption]) -> Option<usize> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let index = strategy(answer, options)?;
        jobfill_logging::fill_debug!(
            "answer '{}' matched option '{}' via {}",
            answer,
            options[index].text,
            name
        );
        Some(index)
    })
}

fn candidates(options: &[SelectOption]) -> impl Iterator<Item = (usize, &SelectOption)> {
    options
        .iter()
        .enumerate()
        .filter(|(_, opt)| !opt.disabled && !opt.placeholder && !opt.text.trim().is_empty())
}

fn boolean_synonym(answer: &str) -> Option<&'static str> {
    match answer {
        "yes" | "y" | "true" => Some("yes"),
        "no" | "n" | "false" => Some("no"),
        _ => None,
    }
}

pub(crate) fn exact_or_contained(answer: &str, options: &[SelectOption]) -> Option<usize> {
    let answer = answer.to_lowercase();
    let synonym = boolean_synonym(&answer);

    let exact = candidates(options).find(|(_, opt)| {
        let text = opt.text.trim().to_lowercase();
        let value = opt.value.trim().to_lowercase();
        text == answer || value == answer || synonym.is_some_and(|s| text == s || value == s)
    });
    if let Some((index, _)) = exact {
        return Some(index);
    }

    candidates(options)
        .find(|(_, opt)| {
            let text = opt.text.trim().to_lowercase();
            text.contains(&answer) || answer.contains(&text)
        })
        .map(|(index, _)| index)
}

fn integers(text: &str) -> Vec<i64> {
    INTEGER
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// The quantity an answer starts with, so "6 years" reads as 6.
fn leading_number(answer: &str) -> Option<f64> {
    let answer = answer.trim();
    let number: f64 = match answer.parse() {
        Ok(number) => number,
        Err(_) => LEADING_NUMBER.find(answer)?.as_str().parse().ok()?,
    };
    (0.0..=MAX_NUMERIC_ANSWER).contains(&number).then_some(number)
}

pub(crate) fn numeric_range(answer: &str, options: &[SelectOption]) -> Option<usize> {
    let number = leading_number(answer)?;
    let whole = number.round() as i64;

    let in_range = candidates(options).find(|(_, opt)| {
        let found = integers(&opt.text);
        match found.as_slice() {
            [a, b, ..] => {
                let (lo, hi) = if a <= b { (*a, *b) } else { (*b, *a) };
                (lo as f64) <= number && number <= (hi as f64)
            }
            _ => false,
        }
    });
    if let Some((index, _)) = in_range {
        return Some(index);
    }

    let near = candidates(options).find(|(_, opt)| {
        matches!(integers(&opt.text).as_slice(), [single] if single.abs_diff(whole) <= NUMERIC_TOLERANCE)
    });
    if let Some((index, _)) = near {
        return Some(index);
    }

    let needle = answer.to_lowercase();
    candidates(options)
        .find(|(_, opt)| tokens(&opt.text).iter().any(|token| *token == needle))
        .map(|(index, _)| index)
}

fn significant(words: Vec<String>) -> Vec<String> {
    words
        .into_iter()
        .filter(|word| word.chars().count() > INSIGNIFICANT_LEN)
        .collect()
}

pub(crate) fn word_tokens(answer: &str, options: &[SelectOption]) -> Option<usize> {
    let answer_words = tokens(answer);
    let answer_significant = significant(answer_words.clone());

    if !answer_significant.is_empty() {
        let all_present = candidates(options).find(|(_, opt)| {
            let text = opt.text.to_lowercase();
            answer_significant.iter().all(|word| text.contains(word.as_str()))
        });
        if let Some((index, _)) = all_present {
            return Some(index);
        }
    }

    let shared_word = candidates(options).find(|(_, opt)| {
        significant(tokens(&opt.text))
            .iter()
            .any(|word| answer_words.contains(word))
    });
    if let Some((index, _)) = shared_word {
        return Some(index);
    }

    if answer_significant.len() < 2 {
        return None;
    }
    let initials: String = answer_significant
        .iter()
        .filter_map(|word| word.chars().next())
        .collect();
    candidates(options)
        .find(|(_, opt)| tokens(&opt.text).iter().any(|word| *word == initials))
        .map(|(index, _)| index)
}

pub(crate) fn compact_substring(answer: &str, options: &[SelectOption]) -> Option<usize> {
    let answer = compact(answer);
    if answer.is_empty() {
        return None;
    }
    candidates(options)
        .find(|(_, opt)| {
            [compact(&opt.text), compact(&opt.value)]
                .iter()
                .filter(|form| !form.is_empty())
                .any(|form| form.contains(&answer) || answer.contains(form.as_str()))
        })
        .map(|(index, _)| index)
}
