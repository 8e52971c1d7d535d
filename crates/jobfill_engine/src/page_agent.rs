//! Agent living next to the page document.
//!
//! The document model is not `Send`, so the agent runs on its own thread and
//! is reached only through its message queue.

use std::thread;

use jobfill_logging::ExecContext;
use url::Url;

use crate::dom::{ControlSnapshot, Page};
use crate::extract::{FieldExtractor, VisibleFieldExtractor};
use crate::fill::{fill_fields, FillReport};
use crate::messages::{AgentMessage, AgentReply, ContextHandle, Envelope, PageReport};
use crate::types::{AnswerSet, FieldDescriptor, FieldTag, ResumeFilePayload};

pub const ATS_HOSTS: &[&str] = &["greenhouse", "lever", "workday", "ashby", "smartrecruiters"];
pub const APPLICATION_WORDS: &[&str] = &["apply", "application", "resume", "cv"];

const QUEUE_CAPACITY: usize = 8;

pub struct PageAgent {
    page: Page,
    extractor: Box<dyn FieldExtractor>,
}

impl PageAgent {
    pub fn new(page: Page) -> Self {
        Self::with_extractor(page, Box::new(VisibleFieldExtractor))
    }

    pub fn with_extractor(page: Page, extractor: Box<dyn FieldExtractor>) -> Self {
        Self { page, extractor }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn fields(&self) -> Vec<FieldDescriptor> {
        self.extractor.extract(&self.page)
    }

    pub fn check_page(&self) -> PageReport {
        let fields = self.fields();
        let supported = is_supported(&self.page, &fields);
        jobfill_logging::fill_info!(
            "page check: {} fields, supported: {}",
            fields.len(),
            supported
        );
        PageReport {
            supported,
            url: self.page.url().map(ToString::to_string),
            fields,
        }
    }

    /// Extracts fields afresh and fills them. Safe to call repeatedly.
    pub fn run_autofill(
        &mut self,
        answers: &AnswerSet,
        resume_file: Option<&ResumeFilePayload>,
        resume_text: Option<&str>,
    ) -> FillReport {
        let fields = self.fields();
        fill_fields(&mut self.page, &fields, answers, resume_file, resume_text)
    }

    pub fn handle(&mut self, message: AgentMessage) -> AgentReply {
        match message {
            AgentMessage::CheckPage => AgentReply::PageChecked {
                report: self.check_page(),
            },
            AgentMessage::RunAutofill {
                answers,
                resume_file,
                resume_text,
            } => AgentReply::AutofillDone {
                report: self.run_autofill(&answers, resume_file.as_ref(), resume_text.as_deref()),
            },
            other => AgentReply::failed(format!("{} is not handled by the page agent", other.name())),
        }
    }

    /// Parses `html` on a dedicated thread and serves messages until every
    /// handle is dropped. The thread yields the final state of mutated controls.
    pub fn spawn(
        html: String,
        url: Option<Url>,
    ) -> (ContextHandle, thread::JoinHandle<Vec<ControlSnapshot>>) {
        let (handle, mut rx) = ContextHandle::channel("page", QUEUE_CAPACITY);
        let join = thread::spawn(move || {
            jobfill_logging::set_context(ExecContext::Page);
            let mut page = Page::parse(&html);
            if let Some(url) = url {
                page = page.with_url(url);
            }
            let mut agent = PageAgent::new(page);
            while let Some(envelope) = rx.blocking_recv() {
                let Envelope { message, reply } = envelope;
                let answer = agent.handle(message);
                if reply.send(answer).is_err() {
                    jobfill_logging::fill_debug!("sender went away before the reply");
                }
            }
            agent.page().snapshot()
        });
        (handle, join)
    }
}

/// Application form heuristic: fillable fields plus a file input, a known
/// applicant tracking host, or application wording on the page.
pub fn is_supported(page: &Page, fields: &[FieldDescriptor]) -> bool {
    if fields.is_empty() {
        return false;
    }
    if fields.iter().any(|field| field.tag == FieldTag::File) {
        return true;
    }
    let on_ats_host = page
        .url()
        .and_then(Url::host_str)
        .map(str::to_ascii_lowercase)
        .is_some_and(|host| ATS_HOSTS.iter().any(|ats| host.contains(ats)));
    if on_ats_host {
        return true;
    }
    let words = crate::text::tokens(&page.text());
    APPLICATION_WORDS
        .iter()
        .any(|wanted| words.iter().any(|word| word == wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_without_application_signals_is_unsupported() {
        let agent = PageAgent::new(Page::parse(
            r#"<form><label for="q">Search</label><input id="q"></form>"#,
        ));
        let report = agent.check_page();
        assert_eq!(report.fields.len(), 1);
        assert!(!report.supported);
    }

    #[test]
    fn ats_host_marks_page_supported() {
        let page = Page::parse(r#"<label for="n">Name</label><input id="n">"#)
            .with_url(Url::parse("https://boards.greenhouse.io/acme/jobs/1").unwrap());
        assert!(PageAgent::new(page).check_page().supported);
    }

    #[test]
    fn application_wording_marks_page_supported() {
        let page = Page::parse(
            r#"<h1>Apply for this job</h1><label for="n">Name</label><input id="n">"#,
        );
        assert!(PageAgent::new(page).check_page().supported);
    }

    #[test]
    fn page_without_fields_is_unsupported() {
        let page = Page::parse("<h1>Apply now</h1>");
        assert!(!PageAgent::new(page).check_page().supported);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawned_agent_attaches_the_resume_it_was_sent() {
        let (handle, join) = PageAgent::spawn(
            r#"<label for="cv">Resume</label><input id="cv" type="file">"#.to_string(),
            None,
        );
        let resume = ResumeFilePayload::new("jane.pdf", "application/pdf", vec![7; 4096]);
        let reply = handle
            .request(AgentMessage::RunAutofill {
                answers: AnswerSet::default(),
                resume_file: Some(resume),
                resume_text: None,
            })
            .await
            .unwrap();
        let AgentReply::AutofillDone { report } = reply else {
            panic!("expected fill report, got {reply:?}");
        };
        assert!(report.file_attached);

        drop(handle);
        let snapshot = join.join().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].files[0].name, "jane.pdf");
        assert_eq!(snapshot[0].files[0].bytes.len(), 4096);
    }

    #[test]
    fn background_messages_are_refused() {
        let mut agent = PageAgent::new(Page::parse("<p></p>"));
        let reply = agent.handle(AgentMessage::GenerateAnswers {
            jd: String::new(),
            labels: vec![],
        });
        assert!(matches!(reply, AgentReply::Failed { .. }));
    }
}
