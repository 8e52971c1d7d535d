use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

/// Elements whose text never contributes to a caption.
const SILENT_TAGS: &[&str] = &["script", "style", "select", "option", "textarea", "noscript", "template"];

/// Elements that break words apart when rendered.
const BLOCK_TAGS: &[&str] = &[
    "br", "p", "div", "li", "ul", "ol", "td", "th", "tr", "label", "legend", "section",
    "fieldset", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Rendered text of an element with whitespace collapsed and required markers removed.
pub fn caption_text(element: ElementRef) -> String {
    let mut raw = String::new();
    collect_text(*element, &mut raw);
    clean_caption(&raw)
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let name = element.name();
                if SILENT_TAGS.contains(&name) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push(' ');
                }
                collect_text(child, out);
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"  Email  * "` → `"Email"`.
pub fn clean_caption(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    collapsed
        .trim_end_matches(|c: char| c == '*' || c.is_whitespace())
        .to_string()
}

/// Lowercased alphanumeric words.
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Lowercased text with everything but letters and digits removed.
pub fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
