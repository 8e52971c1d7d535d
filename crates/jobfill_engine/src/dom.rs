use std::collections::HashMap;

use ego_tree::NodeId;
use scraper::{ElementRef, Html};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::text::{caption_text, collapse_whitespace};
use crate::types::{FieldTag, ResumeFilePayload};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("node no longer exists")]
    NoSuchNode,
    #[error("expected a {expected:?} control")]
    WrongKind { expected: FieldTag },
    #[error("control is disabled")]
    Disabled,
    #[error("control is read-only")]
    ReadOnly,
    #[error("select has no option at index {0}")]
    NoSuchOption(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DomEvent {
    Input,
    Change,
    FilePickerOpened,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub text: String,
    pub value: String,
    pub disabled: bool,
    /// Explicit `value=""`, used by "Select one..." prompts.
    pub placeholder: bool,
}

/// File object synthesized from a resume payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachedFile {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl From<&ResumeFilePayload> for AttachedFile {
    fn from(payload: &ResumeFilePayload) -> Self {
        Self {
            name: payload.name.clone(),
            mime_type: payload.mime_type.clone(),
            size_bytes: payload.content.len() as u64,
            bytes: payload.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ControlState {
    value: Option<String>,
    selected: Option<usize>,
    checked: Option<bool>,
    files: Vec<AttachedFile>,
}

/// Current state of one mutated control, for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlSnapshot {
    pub dom_id: Option<String>,
    pub dom_name: Option<String>,
    pub value: Option<String>,
    pub files: Vec<AttachedFile>,
}

/// A parsed page plus the mutations applied to its form controls.
pub struct Page {
    url: Option<Url>,
    html: Html,
    states: HashMap<NodeId, ControlState>,
    events: Vec<(NodeId, DomEvent)>,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        Self {
            url: None,
            html: Html::parse_document(html),
            states: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    pub fn element(&self, node: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(node).and_then(ElementRef::wrap)
    }

    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html.root_element().descendants().filter_map(ElementRef::wrap)
    }

    /// Every `input`/`textarea`/`select` in document order, fillable or not.
    pub fn controls(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.elements()
            .filter(|el| matches!(el.value().name(), "input" | "textarea" | "select"))
    }

    pub fn element_by_id(&self, id: &str) -> Option<ElementRef<'_>> {
        self.elements().find(|el| el.value().id() == Some(id))
    }

    /// Visible text of the whole body.
    pub fn text(&self) -> String {
        collapse_whitespace(&caption_text(self.html.root_element()))
    }

    pub fn set_value(&mut self, node: NodeId, value: &str) -> Result<(), DomError> {
        let element = self.element(node).ok_or(DomError::NoSuchNode)?;
        match control_kind(element) {
            Some(FieldTag::TextInput) | Some(FieldTag::Textarea) => {}
            _ => {
                return Err(DomError::WrongKind {
                    expected: FieldTag::TextInput,
                })
            }
        }
        check_editable(element)?;
        if element.value().attr("readonly").is_some() {
            return Err(DomError::ReadOnly);
        }
        self.states.entry(node).or_default().value = Some(value.to_string());
        self.notify_changed(node);
        Ok(())
    }

    pub fn select_option(&mut self, node: NodeId, index: usize) -> Result<(), DomError> {
        let element = self.element(node).ok_or(DomError::NoSuchNode)?;
        if control_kind(element) != Some(FieldTag::Select) {
            return Err(DomError::WrongKind {
                expected: FieldTag::Select,
            });
        }
        check_editable(element)?;
        let options = select_options(element);
        let option = options.get(index).ok_or(DomError::NoSuchOption(index))?;
        if option.disabled {
            return Err(DomError::Disabled);
        }
        let state = self.states.entry(node).or_default();
        state.selected = Some(index);
        state.value = Some(option.value.clone());
        self.notify_changed(node);
        Ok(())
    }

    pub fn attach_file(&mut self, node: NodeId, file: AttachedFile) -> Result<(), DomError> {
        let element = self.element(node).ok_or(DomError::NoSuchNode)?;
        if control_kind(element) != Some(FieldTag::File) {
            return Err(DomError::WrongKind {
                expected: FieldTag::File,
            });
        }
        check_editable(element)?;
        let state = self.states.entry(node).or_default();
        state.value = Some(file.name.clone());
        state.files = vec![file];
        self.notify_changed(node);
        Ok(())
    }

    /// Checks or clears a radio button or checkbox. Checking a radio clears
    /// every other radio of its group.
    pub fn set_checked(&mut self, node: NodeId, checked: bool) -> Result<(), DomError> {
        let element = self.element(node).ok_or(DomError::NoSuchNode)?;
        if control_kind(element) != Some(FieldTag::Choice) {
            return Err(DomError::WrongKind {
                expected: FieldTag::Choice,
            });
        }
        check_editable(element)?;
        let others: Vec<NodeId> = if checked && input_type(element) == "radio" {
            choice_group(self, element)
                .iter()
                .map(|el| el.id())
                .filter(|id| *id != node)
                .collect()
        } else {
            Vec::new()
        };
        for other in others {
            if self.is_checked(other) {
                self.states.entry(other).or_default().checked = Some(false);
            }
        }
        self.states.entry(node).or_default().checked = Some(checked);
        self.notify_changed(node);
        Ok(())
    }

    /// Applied check state, falling back to the `checked` attribute.
    pub fn is_checked(&self, node: NodeId) -> bool {
        if let Some(checked) = self.states.get(&node).and_then(|state| state.checked) {
            return checked;
        }
        self.element(node)
            .is_some_and(|el| el.value().attr("checked").is_some())
    }

    /// Equivalent of `input.click()` on a file control.
    pub fn open_file_picker(&mut self, node: NodeId) -> Result<(), DomError> {
        let element = self.element(node).ok_or(DomError::NoSuchNode)?;
        if control_kind(element) != Some(FieldTag::File) {
            return Err(DomError::WrongKind {
                expected: FieldTag::File,
            });
        }
        self.events.push((node, DomEvent::FilePickerOpened));
        Ok(())
    }

    fn notify_changed(&mut self, node: NodeId) {
        self.events.push((node, DomEvent::Input));
        self.events.push((node, DomEvent::Change));
    }

    /// Current value: the applied mutation if any, otherwise the markup default.
    pub fn value_of(&self, node: NodeId) -> Option<String> {
        let element = self.element(node)?;
        if control_kind(element) == Some(FieldTag::Choice) {
            return self.is_checked(node).then(|| choice_value(element));
        }
        if let Some(state) = self.states.get(&node) {
            if let Some(index) = state.selected {
                return select_options(element).get(index).map(|opt| opt.text.clone());
            }
            if state.value.is_some() {
                return state.value.clone();
            }
        }
        match element.value().name() {
            "textarea" => Some(element.text().collect::<String>()),
            _ => element.value().attr("value").map(ToOwned::to_owned),
        }
    }

    pub fn files_of(&self, node: NodeId) -> &[AttachedFile] {
        self.states
            .get(&node)
            .map(|state| state.files.as_slice())
            .unwrap_or(&[])
    }

    pub fn events(&self) -> &[(NodeId, DomEvent)] {
        &self.events
    }

    pub fn events_for(&self, node: NodeId) -> Vec<DomEvent> {
        self.events
            .iter()
            .filter(|(id, _)| *id == node)
            .map(|(_, event)| *event)
            .collect()
    }

    pub fn picker_count(&self, node: NodeId) -> usize {
        self.events_for(node)
            .into_iter()
            .filter(|event| *event == DomEvent::FilePickerOpened)
            .count()
    }

    pub fn is_mutated(&self, node: NodeId) -> bool {
        self.states.contains_key(&node)
    }

    /// Mutated controls in document order.
    pub fn snapshot(&self) -> Vec<ControlSnapshot> {
        self.controls()
            .filter(|el| self.states.contains_key(&el.id()))
            .map(|el| ControlSnapshot {
                dom_id: el.value().id().map(ToOwned::to_owned),
                dom_name: el.value().attr("name").map(ToOwned::to_owned),
                value: self.value_of(el.id()),
                files: self.files_of(el.id()).to_vec(),
            })
            .collect()
    }
}

fn check_editable(element: ElementRef) -> Result<(), DomError> {
    if element.value().attr("disabled").is_some() {
        return Err(DomError::Disabled);
    }
    Ok(())
}

fn input_type(element: ElementRef) -> String {
    element
        .value()
        .attr("type")
        .map(|t| t.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Classifies a control; `None` for elements that cannot be filled with text, a choice or a file.
pub fn control_kind(element: ElementRef) -> Option<FieldTag> {
    match element.value().name() {
        "textarea" => Some(FieldTag::Textarea),
        "select" => Some(FieldTag::Select),
        "input" => match input_type(element).as_str() {
            "file" => Some(FieldTag::File),
            "radio" | "checkbox" => Some(FieldTag::Choice),
            "submit" | "button" | "reset" | "image" | "hidden" | "color" | "range" => None,
            _ => Some(FieldTag::TextInput),
        },
        _ => None,
    }
}

/// True for a checkbox, false for a radio button or any other control.
pub fn is_checkbox(element: ElementRef) -> bool {
    element.value().name() == "input" && input_type(element) == "checkbox"
}

/// Radio buttons or checkboxes sharing `member`'s type and name, in document
/// order. An unnamed choice is a group of its own.
pub fn choice_group<'a>(page: &'a Page, member: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let Some(name) = member.value().attr("name").filter(|n| !n.trim().is_empty()) else {
        return vec![member];
    };
    let kind = input_type(member);
    page.controls()
        .filter(|el| control_kind(*el) == Some(FieldTag::Choice))
        .filter(|el| el.value().attr("name") == Some(name) && input_type(*el) == kind)
        .collect()
}

/// Submitted value of a checked choice.
pub fn choice_value(element: ElementRef) -> String {
    element
        .value()
        .attr("value")
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| "on".to_string())
}

/// Static approximation of "rendered with a layout box".
pub fn is_visible(element: ElementRef) -> bool {
    let hidden_input = element.value().name() == "input"
        && element
            .value()
            .attr("type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("hidden"));
    if hidden_input {
        return false;
    }
    !std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(hides_subtree)
}

fn hides_subtree(element: ElementRef) -> bool {
    let value = element.value();
    if matches!(value.name(), "template" | "head" | "noscript" | "script" | "style") {
        return true;
    }
    if value.attr("hidden").is_some() {
        return true;
    }
    value.attr("style").is_some_and(style_hides)
}

fn style_hides(style: &str) -> bool {
    style.split(';').any(|decl| {
        let Some((property, value)) = decl.split_once(':') else {
            return false;
        };
        let property = property.trim().to_ascii_lowercase();
        let value = value.trim().to_ascii_lowercase();
        (property == "display" && value.starts_with("none"))
            || (property == "visibility" && (value.starts_with("hidden") || value.starts_with("collapse")))
    })
}

pub fn select_options(element: ElementRef) -> Vec<SelectOption> {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "option")
        .map(|el| {
            let text = collapse_whitespace(&el.text().collect::<String>());
            let explicit_value = el.value().attr("value");
            SelectOption {
                value: explicit_value.map(ToOwned::to_owned).unwrap_or_else(|| text.clone()),
                placeholder: explicit_value.is_some_and(|v| v.trim().is_empty()),
                disabled: el.value().attr("disabled").is_some(),
                text,
            }
        })
        .collect()
}
