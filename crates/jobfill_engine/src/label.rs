//! Label resolution for a single form control.
//!
//! Strategies run in a fixed priority order and the first non-empty caption
//! wins. Results are never combined across strategies.

use scraper::ElementRef;

use crate::dom::Page;
use crate::text::{caption_text, clean_caption};
use crate::types::FieldLabel;

/// Preceding siblings inspected by the sibling strategy.
pub const MAX_SIBLINGS: usize = 4;
/// Sibling text at or above this length is not treated as an implicit label.
pub const MAX_SIBLING_TEXT: usize = 80;
/// Ancestor levels searched for a heading or emphasized caption.
pub const MAX_ANCESTOR_LEVELS: usize = 6;

type Strategy = fn(&Page, ElementRef) -> Option<String>;

/// Name and implementation of every strategy, highest priority first.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("label-for", label_for),
    ("wrapping-label", wrapping_label),
    ("aria-labelledby", aria_labelledby),
    ("preceding-sibling", preceding_sibling),
    ("own-attribute", own_attribute),
    ("ancestor-heading", ancestor_heading),
];

pub fn resolve_label(page: &Page, control: ElementRef) -> FieldLabel {
    STRATEGIES
        .iter()
        .find_map(|(name, strategy)| {
            let label = strategy(page, control)?;
            jobfill_logging::fill_trace!("label '{}' resolved via {}", label, name);
            Some(label)
        })
        .map(FieldLabel::Text)
        .unwrap_or(FieldLabel::Missing)
}

/// Caption of a whole radio or checkbox group, given its first member.
///
/// A fieldset legend or a labelled `role="radiogroup"` wins. A lone checkbox
/// is captioned like any other control. Otherwise the question is looked for
/// before the first choice, skipping the captions of the choices themselves.
pub fn resolve_group_label(page: &Page, first: ElementRef, group_size: usize) -> FieldLabel {
    let label = fieldset_legend(first)
        .or_else(|| labelled_group(page, first))
        .or_else(|| {
            if group_size == 1 {
                return resolve_label(page, first).text().map(ToOwned::to_owned);
            }
            let anchor = first
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "label")
                .unwrap_or(first);
            question_sibling(anchor).or_else(|| ancestor_heading(page, anchor))
        });
    label.map(FieldLabel::Text).unwrap_or(FieldLabel::Missing)
}

/// Caption of a single radio button or checkbox, as its own label shows it.
pub fn choice_caption(page: &Page, choice: ElementRef) -> Option<String> {
    label_for(page, choice).or_else(|| wrapping_label(page, choice))
}

fn fieldset_legend(control: ElementRef) -> Option<String> {
    let fieldset = control
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "fieldset")?;
    fieldset
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "legend")
        .and_then(|legend| non_empty(caption_text(legend)))
}

fn labelled_group(page: &Page, control: ElementRef) -> Option<String> {
    let group = control.ancestors().filter_map(ElementRef::wrap).find(|el| {
        el.value()
            .attr("role")
            .is_some_and(|role| role == "radiogroup" || role == "group")
    })?;
    aria_labelledby(page, group).or_else(|| {
        group
            .value()
            .attr("aria-label")
            .map(clean_caption)
            .and_then(non_empty)
    })
}

fn question_sibling(anchor: ElementRef) -> Option<String> {
    anchor
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .take(MAX_SIBLINGS)
        .filter(|sibling| sibling.value().name() != "label" && !contains_control(*sibling))
        .find_map(|sibling| {
            let text = caption_text(sibling);
            (!text.is_empty() && text.chars().count() < MAX_SIBLING_TEXT).then_some(text)
        })
}

fn contains_control(element: ElementRef) -> bool {
    std::iter::once(element)
        .chain(element.descendants().filter_map(ElementRef::wrap))
        .any(|el| el.value().name() == "input")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub(crate) fn label_for(page: &Page, control: ElementRef) -> Option<String> {
    let id = control.value().id().filter(|id| !id.is_empty())?;
    page.elements()
        .filter(|el| el.value().name() == "label" && el.value().attr("for") == Some(id))
        .find_map(|label| non_empty(caption_text(label)))
}

pub(crate) fn wrapping_label(_page: &Page, control: ElementRef) -> Option<String> {
    control
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "label")
        .and_then(|label| non_empty(caption_text(label)))
}

pub(crate) fn aria_labelledby(page: &Page, control: ElementRef) -> Option<String> {
    let ids = control.value().attr("aria-labelledby")?;
    let joined = ids
        .split_whitespace()
        .filter_map(|id| page.element_by_id(id))
        .map(caption_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    non_empty(joined)
}

pub(crate) fn preceding_sibling(_page: &Page, control: ElementRef) -> Option<String> {
    control
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .take(MAX_SIBLINGS)
        .find_map(|sibling| {
            let text = caption_text(sibling);
            if text.is_empty() {
                return None;
            }
            if is_label_like(sibling) || text.chars().count() < MAX_SIBLING_TEXT {
                Some(text)
            } else {
                None
            }
        })
}

fn is_label_like(element: ElementRef) -> bool {
    matches!(element.value().name(), "label" | "legend")
        || element
            .value()
            .attr("class")
            .is_some_and(|class| class.to_ascii_lowercase().contains("label"))
}

/// ARIA label first, then placeholder.
pub(crate) fn own_attribute(_page: &Page, control: ElementRef) -> Option<String> {
    ["aria-label", "placeholder"]
        .iter()
        .filter_map(|attr| control.value().attr(attr))
        .map(clean_caption)
        .find(|text| !text.is_empty())
}

pub(crate) fn ancestor_heading(_page: &Page, control: ElementRef) -> Option<String> {
    control
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(MAX_ANCESTOR_LEVELS)
        .find_map(|ancestor| {
            ancestor
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|el| is_heading_or_emphasis(el.value().name()))
                .find_map(|el| non_empty(caption_text(el)))
        })
}

fn is_heading_or_emphasis(name: &str) -> bool {
    matches!(
        name,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "strong" | "b" | "em" | "legend"
    )
}
