use std::collections::HashSet;
use std::sync::LazyLock;

use ego_tree::NodeId;
use regex::Regex;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};

use crate::dom::{
    choice_group, choice_value, control_kind, is_checkbox, is_visible, select_options,
    AttachedFile, Page, SelectOption,
};
use crate::label::choice_caption;
use crate::select::match_option;
use crate::text::{caption_text, tokens};
use crate::types::{AnswerSet, FieldDescriptor, FieldLabel, FieldTag, ResumeFilePayload};

/// Label words considered by the token-overlap resolver.
pub const MAX_LABEL_TOKENS: usize = 4;
/// Label words this short ("of", "to") are dropped before the cap applies.
pub const SHORT_LABEL_TOKEN: usize = 2;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").expect("valid regex"));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s\-()]{8,}\d").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NoAnswer,
    NotFound,
    AlreadyFilled,
    NoMatchingOption,
    Rejected,
    PickerOpened,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedField {
    pub label: String,
    pub reason: SkipReason,
}

/// Outcome of one fill pass. Partial fills are normal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub filled: Vec<String>,
    pub file_attached: bool,
    pub picker_opened: usize,
    pub skipped: Vec<SkippedField>,
    pub fallback_used: bool,
}

impl FillReport {
    /// True iff at least one field received a value or a file.
    pub fn success(&self) -> bool {
        !self.filled.is_empty()
    }

    fn skip(&mut self, label: &FieldLabel, reason: SkipReason) {
        jobfill_logging::fill_debug!("skipping '{}': {:?}", label, reason);
        self.skipped.push(SkippedField {
            label: label.to_string(),
            reason,
        });
    }
}

enum Applied {
    Value,
    File,
    Picker,
    Skipped(SkipReason),
}

/// Fills `fields` on `page` from `answers`, attaching `resume_file` to file inputs.
///
/// When nothing could be filled and `resume_text` is given, email and phone
/// numbers found in the resume are used for fields labelled accordingly.
pub fn fill_fields(
    page: &mut Page,
    fields: &[FieldDescriptor],
    answers: &AnswerSet,
    resume_file: Option<&ResumeFilePayload>,
    resume_text: Option<&str>,
) -> FillReport {
    let mut report = FillReport::default();
    let mut used: HashSet<NodeId> = HashSet::new();

    for field in fields {
        let answer = lookup_answer(answers, &field.inferred_label);
        if answer.is_none() && field.tag != FieldTag::File {
            report.skip(&field.inferred_label, SkipReason::NoAnswer);
            continue;
        }
        fill_one(page, field, answer, resume_file, &mut used, &mut report);
    }

    if !report.success() {
        if let Some(text) = resume_text {
            fallback_contact_fields(page, fields, text, &mut used, &mut report);
        }
    }

    jobfill_logging::fill_info!(
        "fill pass: {} filled, {} skipped, picker opened {} times",
        report.filled.len(),
        report.skipped.len(),
        report.picker_opened
    );
    report
}

fn fill_one(
    page: &mut Page,
    field: &FieldDescriptor,
    answer: Option<&str>,
    resume_file: Option<&ResumeFilePayload>,
    used: &mut HashSet<NodeId>,
    report: &mut FillReport,
) -> bool {
    let Some(node) = resolve_element(page, field) else {
        report.skip(&field.inferred_label, SkipReason::NotFound);
        return false;
    };
    if !used.insert(node) {
        report.skip(&field.inferred_label, SkipReason::AlreadyFilled);
        return false;
    }

    match apply(page, node, answer, resume_file) {
        Applied::Value => {
            report.filled.push(field.inferred_label.to_string());
            true
        }
        Applied::File => {
            report.file_attached = true;
            report.filled.push(field.inferred_label.to_string());
            true
        }
        Applied::Picker => {
            report.picker_opened += 1;
            report.skip(&field.inferred_label, SkipReason::PickerOpened);
            false
        }
        Applied::Skipped(reason) => {
            used.remove(&node);
            report.skip(&field.inferred_label, reason);
            false
        }
    }
}

fn lookup_answer<'a>(answers: &'a AnswerSet, label: &FieldLabel) -> Option<&'a str> {
    let label = label.text()?.trim();
    answers
        .get(label)
        .or_else(|| {
            answers
                .iter()
                .find(|(key, _)| key.trim().to_lowercase() == label.to_lowercase())
                .map(|(_, value)| value)
        })
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
}

fn apply(
    page: &mut Page,
    node: NodeId,
    answer: Option<&str>,
    resume_file: Option<&ResumeFilePayload>,
) -> Applied {
    let Some(element) = page.element(node) else {
        return Applied::Skipped(SkipReason::NotFound);
    };
    match control_kind(element) {
        Some(FieldTag::File) => match resume_file {
            Some(payload) => match page.attach_file(node, AttachedFile::from(payload)) {
                Ok(()) => Applied::File,
                Err(err) => {
                    jobfill_logging::fill_warn!("file attach rejected: {}", err);
                    Applied::Skipped(SkipReason::Rejected)
                }
            },
            None => match page.open_file_picker(node) {
                Ok(()) => Applied::Picker,
                Err(_) => Applied::Skipped(SkipReason::Rejected),
            },
        },
        Some(FieldTag::Select) => {
            let Some(answer) = answer else {
                return Applied::Skipped(SkipReason::NoAnswer);
            };
            let options = select_options(element);
            let Some(index) = match_option(answer, &options) else {
                return Applied::Skipped(SkipReason::NoMatchingOption);
            };
            match page.select_option(node, index) {
                Ok(()) => Applied::Value,
                Err(_) => Applied::Skipped(SkipReason::Rejected),
            }
        }
        Some(FieldTag::TextInput) | Some(FieldTag::Textarea) => {
            let Some(answer) = answer else {
                return Applied::Skipped(SkipReason::NoAnswer);
            };
            match page.set_value(node, answer) {
                Ok(()) => Applied::Value,
                Err(_) => Applied::Skipped(SkipReason::Rejected),
            }
        }
        Some(FieldTag::Choice) => match answer {
            Some(answer) => apply_choice(page, node, answer),
            None => Applied::Skipped(SkipReason::NoAnswer),
        },
        None => Applied::Skipped(SkipReason::NotFound),
    }
}

fn apply_choice(page: &mut Page, node: NodeId, answer: &str) -> Applied {
    let Some((target, checked)) = choice_target(page, node, answer) else {
        return Applied::Skipped(SkipReason::NoMatchingOption);
    };
    match page.set_checked(target, checked) {
        Ok(()) => Applied::Value,
        Err(_) => Applied::Skipped(SkipReason::Rejected),
    }
}

/// The member of `node`'s group the answer names, to be checked. A lone
/// checkbox is checked or cleared by a yes/no answer instead.
fn choice_target(page: &Page, node: NodeId, answer: &str) -> Option<(NodeId, bool)> {
    let element = page.element(node)?;
    let members = choice_group(page, element);
    if members.len() == 1 && is_checkbox(element) {
        return affirmation(answer).map(|checked| (node, checked));
    }
    let options: Vec<SelectOption> = members
        .iter()
        .map(|member| SelectOption {
            text: choice_caption(page, *member).unwrap_or_else(|| choice_value(*member)),
            value: choice_value(*member),
            disabled: member.value().attr("disabled").is_some(),
            placeholder: false,
        })
        .collect();
    let index = match_option(answer, &options)?;
    Some((members[index].id(), true))
}

/// Yes/no reading of a free-text answer, by its leading letter.
fn affirmation(answer: &str) -> Option<bool> {
    let answer = answer.trim().to_lowercase();
    match answer.as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ if answer.starts_with('y') => Some(true),
        _ if answer.starts_with('n') => Some(false),
        _ => None,
    }
}

type Resolver = fn(&Page, &FieldDescriptor) -> Option<NodeId>;

/// Element resolvers, tried in order.
pub const RESOLVERS: &[(&str, Resolver)] = &[
    ("id", by_id),
    ("name", by_name),
    ("placeholder", by_placeholder),
    ("label-caption", by_label_caption),
    ("token-overlap", by_token_overlap),
];

/// Finds the control a descriptor refers to in the current document.
pub fn resolve_element(page: &Page, field: &FieldDescriptor) -> Option<NodeId> {
    RESOLVERS.iter().find_map(|(name, resolver)| {
        let node = resolver(page, field)?;
        jobfill_logging::fill_trace!("'{}' resolved by {}", field.inferred_label, name);
        Some(node)
    })
}

fn fillable<'a>(page: &'a Page) -> impl Iterator<Item = ElementRef<'a>> {
    page.controls().filter(|el| control_kind(*el).is_some())
}

fn by_id(page: &Page, field: &FieldDescriptor) -> Option<NodeId> {
    let id = field.dom_id.as_deref()?;
    fillable(page)
        .find(|el| el.value().id() == Some(id))
        .map(|el| el.id())
}

fn by_name(page: &Page, field: &FieldDescriptor) -> Option<NodeId> {
    let name = field.dom_name.as_deref()?;
    fillable(page)
        .find(|el| el.value().attr("name") == Some(name))
        .map(|el| el.id())
}

fn by_placeholder(page: &Page, field: &FieldDescriptor) -> Option<NodeId> {
    let wanted = field.placeholder.as_deref()?.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    fillable(page)
        .find(|el| {
            el.value()
                .attr("placeholder")
                .is_some_and(|p| p.to_lowercase().contains(&wanted))
        })
        .map(|el| el.id())
}

fn by_label_caption(page: &Page, field: &FieldDescriptor) -> Option<NodeId> {
    let wanted = field.inferred_label.text()?.to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    page.elements()
        .filter(|el| el.value().name() == "label")
        .filter(|label| {
            caption_text(*label).to_lowercase().contains(&wanted)
        })
        .find_map(|label| {
            if let Some(target) = label.value().attr("for") {
                return page
                    .element_by_id(target)
                    .filter(|el| control_kind(*el).is_some())
                    .map(|el| el.id());
            }
            label
                .descendants()
                .filter_map(ElementRef::wrap)
                .find(|el| control_kind(*el).is_some())
                .map(|el| el.id())
        })
}

fn by_token_overlap(page: &Page, field: &FieldDescriptor) -> Option<NodeId> {
    let label = field.inferred_label.text()?;
    let wanted: Vec<String> = tokens(label)
        .into_iter()
        .filter(|token| token.chars().count() > SHORT_LABEL_TOKEN)
        .take(MAX_LABEL_TOKENS)
        .collect();
    if wanted.is_empty() {
        return None;
    }

    let mut best: Option<(usize, NodeId)> = None;
    for candidate in fillable(page).filter(|el| is_visible(*el)) {
        let value = candidate.value();
        let haystack = ["id", "name", "placeholder", "aria-label"]
            .iter()
            .filter_map(|attr| value.attr(attr))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let score = wanted
            .iter()
            .filter(|token| haystack.contains(token.as_str()))
            .count();
        if score > 0 && best.is_none_or(|(top, _)| score > top) {
            best = Some((score, candidate.id()));
        }
    }
    best.map(|(_, node)| node)
}

fn fallback_contact_fields(
    page: &mut Page,
    fields: &[FieldDescriptor],
    resume_text: &str,
    used: &mut HashSet<NodeId>,
    report: &mut FillReport,
) {
    let email = EMAIL.find(resume_text).map(|m| m.as_str().to_string());
    let phone = PHONE.find(resume_text).map(|m| m.as_str().trim().to_string());

    for field in fields {
        let Some(label) = field.inferred_label.text() else {
            continue;
        };
        let label = label.to_lowercase();
        let value = if label.contains("email") {
            email.as_deref()
        } else if label.contains("phone") {
            phone.as_deref()
        } else {
            None
        };
        if let Some(value) = value {
            report
                .skipped
                .retain(|skipped| skipped.label != field.inferred_label.as_str());
            if fill_one(page, field, Some(value), None, used, report) {
                report.fallback_used = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor(label: &str) -> FieldDescriptor {
        FieldDescriptor {
            tag: FieldTag::TextInput,
            dom_id: None,
            dom_name: None,
            placeholder: None,
            aria_label: None,
            inferred_label: FieldLabel::Text(label.to_string()),
            visible: true,
            input_type: None,
        }
    }

    fn resolved_id(html: &str, field: &FieldDescriptor) -> Option<String> {
        let page = Page::parse(html);
        let node = resolve_element(&page, field)?;
        page.element(node)
            .and_then(|el| el.value().attr("id"))
            .map(ToOwned::to_owned)
    }

    #[test]
    fn id_is_tried_before_name() {
        let field = FieldDescriptor {
            dom_id: Some("b".into()),
            dom_name: Some("n".into()),
            ..descriptor("Name")
        };
        assert_eq!(
            resolved_id(r#"<input id="a" name="n"><input id="b">"#, &field).as_deref(),
            Some("b")
        );
    }

    #[test]
    fn stale_id_falls_back_to_name() {
        let field = FieldDescriptor {
            dom_id: Some("gone".into()),
            dom_name: Some("email".into()),
            ..descriptor("Email")
        };
        let html = r#"<input id="first" name="first"><input id="second" name="email">"#;
        assert_eq!(resolved_id(html, &field).as_deref(), Some("second"));
    }

    #[test]
    fn placeholder_matches_by_substring() {
        let field = FieldDescriptor {
            placeholder: Some("You@Example".into()),
            ..descriptor("Contact")
        };
        let html = r#"<input id="other" placeholder="City"><input id="mail" placeholder="e.g. you@example.com">"#;
        assert_eq!(resolved_id(html, &field).as_deref(), Some("mail"));
    }

    #[test]
    fn label_caption_finds_wrapped_and_targeted_controls() {
        let wrapped = r#"<label>Cover letter <textarea id="cl"></textarea></label>"#;
        assert_eq!(
            resolved_id(wrapped, &descriptor("cover letter")).as_deref(),
            Some("cl")
        );

        let targeted = r#"<label for="gh">GitHub profile URL</label><div><input id="gh"></div>"#;
        assert_eq!(
            resolved_id(targeted, &descriptor("GitHub profile")).as_deref(),
            Some("gh")
        );
    }

    #[test]
    fn token_overlap_prefers_the_highest_score_and_keeps_the_first_tie() {
        let field = descriptor("Years of Experience total");
        let html = r#"
            <input id="loose" name="years">
            <input id="tie_a" name="years_total">
            <input id="tie_b" aria-label="experience years">"#;
        assert_eq!(resolved_id(html, &field).as_deref(), Some("tie_a"));
    }

    #[test]
    fn token_overlap_skips_hidden_controls() {
        let field = descriptor("Portfolio link");
        let html = r#"<div hidden><input id="hidden" name="portfolio"></div><input id="shown" name="link">"#;
        assert_eq!(resolved_id(html, &field).as_deref(), Some("shown"));
    }

    #[test]
    fn token_overlap_uses_four_words_and_drops_short_ones() {
        let capped = descriptor("Alpha Bravo Charlie Delta Echo");
        assert_eq!(resolved_id(r#"<input id="e" name="echo">"#, &capped), None);
        assert_eq!(
            resolved_id(r#"<input id="d" name="delta">"#, &capped).as_deref(),
            Some("d")
        );

        let short = descriptor("Date of birth");
        assert_eq!(resolved_id(r#"<input id="x" name="of_x">"#, &short), None);
        assert_eq!(
            resolved_id(r#"<input id="x" name="of_x"><input id="dob" name="birth">"#, &short)
                .as_deref(),
            Some("dob")
        );
    }

    #[test]
    fn unresolvable_field_yields_nothing() {
        let field = FieldDescriptor {
            inferred_label: FieldLabel::Missing,
            ..descriptor("")
        };
        assert_eq!(resolved_id(r#"<input id="a" name="a">"#, &field), None);
    }

    #[test]
    fn yes_and_no_are_read_from_the_leading_letter() {
        assert_eq!(affirmation(" Yes, I am "), Some(true));
        assert_eq!(affirmation("no thanks"), Some(false));
        assert_eq!(affirmation("TRUE"), Some(true));
        assert_eq!(affirmation("maybe"), None);
    }
}
