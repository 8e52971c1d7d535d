//! Terminal output. Progress goes to stderr, results to stdout.

use std::io::Write;

use jobfill_core::{AppViewModel, LastScoreView, Outcome, Phase, ScoreSummary};
use jobfill_engine::{ControlSnapshot, FillReport, PageReport};

const BAR_WIDTH: usize = 30;

#[derive(Default)]
pub struct Renderer {
    progress_shown: bool,
}

impl Renderer {
    pub fn render(&mut self, view: &AppViewModel) {
        match view.phase {
            Phase::Starting => {
                eprint!("\rstarting request...");
                self.progress_shown = true;
            }
            Phase::Polling => {
                eprint!("\r{}", progress_line(view));
                self.progress_shown = true;
            }
            Phase::Idle | Phase::Finished => self.clear(),
        }
        let _ = std::io::stderr().flush();
    }

    pub fn clear(&mut self) {
        if std::mem::take(&mut self.progress_shown) {
            eprintln!();
        }
    }
}

pub fn progress_line(view: &AppViewModel) -> String {
    let filled = usize::from(view.progress_percent) * BAR_WIDTH / 100;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled));
    let remaining = view
        .remaining_secs
        .map(|secs| format!(", {secs}s left"))
        .unwrap_or_default();
    format!(
        "[{bar}] {:>3}% {}s elapsed{remaining}",
        view.progress_percent, view.elapsed_secs
    )
}

pub fn score_text(score: &ScoreSummary) -> String {
    let mut text = format!("Score: {:.0}/100\n", score.score);
    if !score.common_skills.is_empty() {
        text.push_str(&format!("Matching skills: {}\n", score.common_skills.join(", ")));
    }
    if !score.missing_skills.is_empty() {
        text.push_str(&format!("Missing skills: {}\n", score.missing_skills.join(", ")));
    }
    if let Some(explanation) = &score.explanation {
        text.push_str(explanation.trim());
        text.push('\n');
    }
    text
}

pub fn outcome_text(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Score(score) => score_text(score),
        Outcome::Answers(count) => format!("Generated {count} answer(s)\n"),
        Outcome::Failed(message) => format!("Request failed: {message}\n"),
        Outcome::TimedOut => "Request timed out\n".to_string(),
        Outcome::Cancelled => "Request cancelled\n".to_string(),
    }
}

pub fn last_score_text(last: &LastScoreView) -> String {
    format!("Last score for {}\n{}", last.jd_url, score_text(&last.score))
}

pub fn page_text(report: &PageReport) -> String {
    let mut text = format!(
        "Page {}: {} field(s), {}\n",
        report.url.as_deref().unwrap_or("(local file)"),
        report.fields.len(),
        if report.supported {
            "application form"
        } else {
            "not an application form"
        }
    );
    for field in &report.fields {
        text.push_str(&format!("  {:?} {}\n", field.tag, field.inferred_label));
    }
    text
}

pub fn fill_text(report: &FillReport) -> String {
    let mut text = format!("Filled {} field(s)", report.filled.len());
    if report.file_attached {
        text.push_str(", resume attached");
    }
    if report.picker_opened > 0 {
        text.push_str(&format!(", {} file picker(s) left open", report.picker_opened));
    }
    if report.fallback_used {
        text.push_str(" (contact details taken from the resume)");
    }
    text.push('\n');
    for label in &report.filled {
        text.push_str(&format!("  + {label}\n"));
    }
    for skipped in &report.skipped {
        text.push_str(&format!("  - {} ({:?})\n", skipped.label, skipped.reason));
    }
    text
}

pub fn controls_text(controls: &[ControlSnapshot]) -> String {
    let mut text = String::new();
    for control in controls {
        let name = control
            .dom_id
            .as_deref()
            .or(control.dom_name.as_deref())
            .unwrap_or("?");
        match (&control.value, control.files.first()) {
            (_, Some(file)) => text.push_str(&format!("  {name} <- {} ({} bytes)\n", file.name, file.size_bytes)),
            (Some(value), None) => text.push_str(&format!("  {name} = {value}\n")),
            (None, None) => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn view(percent: u8, elapsed: u64, remaining: Option<u64>) -> AppViewModel {
        AppViewModel {
            phase: Phase::Polling,
            request_id: Some("id".into()),
            kind: None,
            jd_url: None,
            elapsed_secs: elapsed,
            remaining_secs: remaining,
            progress_percent: percent,
            outcome: None,
            last_score: None,
            last_error: None,
            dirty: true,
        }
    }

    #[test]
    fn progress_bar_tracks_percent() {
        assert_eq!(
            progress_line(&view(50, 60, Some(60))),
            format!("[{}{}]  50% 60s elapsed, 60s left", "#".repeat(15), "-".repeat(15))
        );
        assert!(progress_line(&view(100, 120, None)).starts_with(&format!("[{}]", "#".repeat(30))));
    }

    #[test]
    fn failure_message_is_shown_verbatim() {
        assert_eq!(
            outcome_text(&Outcome::Failed("503 Service Unavailable".into())),
            "Request failed: 503 Service Unavailable\n"
        );
    }
}
