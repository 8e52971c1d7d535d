use std::collections::HashSet;

use scraper::ElementRef;

use crate::dom::{choice_group, control_kind, is_visible, Page};
use crate::label::{resolve_group_label, resolve_label};
use crate::types::{FieldDescriptor, FieldLabel, FieldTag};

pub trait FieldExtractor: Send + Sync {
    fn extract(&self, page: &Page) -> Vec<FieldDescriptor>;
}

/// Extractor used by the page agent:
/// - visits `input`/`textarea`/`select` in document order
/// - keeps fillable, visible controls only
/// - resolves a label per control
/// - describes a radio or checkbox group once, at its first visible member
/// - drops repeats of the same (id, name, label) identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct VisibleFieldExtractor;

impl FieldExtractor for VisibleFieldExtractor {
    fn extract(&self, page: &Page) -> Vec<FieldDescriptor> {
        let mut seen = HashSet::new();
        let mut fields = Vec::new();

        for control in page.controls() {
            let Some(descriptor) = describe(page, control) else {
                continue;
            };
            let identity = (
                descriptor.dom_id.clone(),
                descriptor.dom_name.clone(),
                descriptor.inferred_label.clone(),
            );
            if seen.insert(identity) {
                fields.push(descriptor);
            }
        }

        jobfill_logging::fill_debug!("extracted {} fillable fields", fields.len());
        fields
    }
}

fn describe(page: &Page, control: ElementRef) -> Option<FieldDescriptor> {
    let tag = control_kind(control)?;
    if !is_visible(control) {
        return None;
    }
    let attr = |name: &str| {
        control
            .value()
            .attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
    };

    let inferred_label = match tag {
        FieldTag::Choice => group_label(page, control)?,
        _ => resolve_label(page, control),
    };

    Some(FieldDescriptor {
        tag,
        dom_id: attr("id"),
        dom_name: attr("name"),
        placeholder: attr("placeholder"),
        aria_label: attr("aria-label"),
        inferred_label,
        visible: true,
        input_type: attr("type").map(|t| t.to_ascii_lowercase()),
    })
}

/// Label of the group `control` leads, or `None` when an earlier visible
/// member already stands for the group.
fn group_label(page: &Page, control: ElementRef) -> Option<FieldLabel> {
    let members: Vec<ElementRef> = choice_group(page, control)
        .into_iter()
        .filter(|el| is_visible(*el))
        .collect();
    if members.first().map(|el| el.id()) != Some(control.id()) {
        return None;
    }
    Some(resolve_group_label(page, control, members.len()))
}
