//! One function per subcommand.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use jobfill_core::{AppState, Msg, Outcome};
use jobfill_engine::{
    ensure_state_dir, AgentMessage, AgentReply, Page, ParsedResume, RequestId, ResumeFilePayload,
    StateStore,
};
use jobfill_logging::{fill_info, fill_warn};
use url::Url;

use super::app::{build_controller, run_controller, Contexts};
use super::{persistence, render};
use crate::config::AppConfig;

/// Opens the on-disk store, creating the state directory on first use.
pub fn open_store(config: &AppConfig) -> anyhow::Result<StateStore> {
    ensure_state_dir(&config.state_dir)
        .with_context(|| format!("preparing state directory {:?}", config.state_dir))?;
    Ok(StateStore::on_disk(config.state_dir.clone()))
}

pub async fn score(config: &AppConfig, resume: &Path, jd_url: String) -> anyhow::Result<()> {
    let store = open_store(config)?;
    store_parsed_resume(&store, resume).await?;

    let restored = persistence::restore_last_score(&store, Utc::now()).await?;
    let contexts = Contexts::start(config, store, None);
    let state = run_controller(
        &contexts,
        config.poll_settings(),
        vec![restored, Msg::ScoreRequested { jd_url }],
    )
    .await;
    contexts.shutdown().await?;
    finish(&state)
}

/// Picks up whatever request an earlier run left behind.
pub async fn resume(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    // Read storage before the background context sweeps it on start.
    let initial = persistence::restore(&store, Utc::now()).await?;
    let contexts = Contexts::start(config, store, None);
    let state = run_controller(&contexts, config.poll_settings(), initial).await;
    contexts.shutdown().await?;

    if state.outcome().is_none() {
        let view = state.view();
        match view.last_score {
            Some(last) => print!("{}", render::last_score_text(&last)),
            None => println!("Nothing to resume"),
        }
        return Ok(());
    }
    finish(&state)
}

pub struct FillArgs {
    pub page: PathBuf,
    pub page_url: Option<String>,
    pub resume: PathBuf,
    pub resume_file: Option<PathBuf>,
    pub jd: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub force: bool,
}

pub async fn fill(config: &AppConfig, args: FillArgs) -> anyhow::Result<()> {
    let html = fs::read_to_string(&args.page).with_context(|| format!("reading {:?}", args.page))?;
    let page_url = args
        .page_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("invalid --page-url")?;

    let store = open_store(config)?;
    let parsed = store_parsed_resume(&store, &args.resume).await?;
    let resume_file = match &args.resume_file {
        Some(path) => {
            let payload = read_resume_file(path)?;
            store.save_resume_file(&payload).await?;
            Some(payload)
        }
        None => store.resume_file().await?,
    };
    let jd = match &args.jd {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?,
        None => document_text(&html),
    };

    let contexts = Contexts::start(config, store, Some((html, page_url)));
    let outcome = fill_page(&contexts, jd, parsed.raw_text, resume_file, args.force).await;
    let controls = contexts.shutdown().await?;
    let report = outcome?;

    print!("{}", render::fill_text(&report));
    print!("{}", render::controls_text(&controls));
    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).with_context(|| format!("writing {path:?}"))?;
    }
    if !report.success() {
        bail!("no field could be filled");
    }
    Ok(())
}

async fn fill_page(
    contexts: &Contexts,
    jd: String,
    resume_text: String,
    resume_file: Option<ResumeFilePayload>,
    force: bool,
) -> anyhow::Result<jobfill_engine::FillReport> {
    let report = match contexts.router.send(AgentMessage::CheckPage).await? {
        AgentReply::PageChecked { report } => report,
        other => bail!("page check failed: {other:?}"),
    };
    print!("{}", render::page_text(&report));
    if !report.supported && !force {
        bail!("page does not look like an application form; pass --force to fill anyway");
    }

    let labels: Vec<String> = report
        .fields
        .iter()
        .filter_map(|field| field.inferred_label.text().map(ToOwned::to_owned))
        .collect();
    fill_info!("asking for answers to {} labels", labels.len());
    let answers = match contexts
        .router
        .send(AgentMessage::GenerateAnswers { jd, labels })
        .await?
    {
        AgentReply::AnswersGenerated { answers } => answers,
        AgentReply::Failed { message } => bail!("could not generate answers: {message}"),
        other => bail!("unexpected reply to answer generation: {other:?}"),
    };

    match contexts
        .router
        .send(AgentMessage::RunAutofill {
            answers,
            resume_file,
            resume_text: Some(resume_text),
        })
        .await?
    {
        AgentReply::AutofillDone { report } => Ok(report),
        AgentReply::Failed { message } => bail!("autofill failed: {message}"),
        other => bail!("unexpected reply to autofill: {other:?}"),
    }
}

pub async fn cancel(config: &AppConfig, request_id: &str) -> anyhow::Result<()> {
    let request_id: RequestId = request_id
        .parse()
        .with_context(|| format!("malformed request id '{request_id}'"))?;
    let store = open_store(config)?;
    // Handled in place: a started background context would sweep the record first.
    let controller = build_controller(config, store);
    match controller
        .handle(AgentMessage::CancelRequest { request_id })
        .await
    {
        AgentReply::RequestCancelled { existed: true, .. } => println!("Cancelled {request_id}"),
        AgentReply::RequestCancelled { existed: false, .. } => {
            println!("No request {request_id} in the state directory")
        }
        AgentReply::Failed { message } => bail!(message),
        other => bail!("unexpected reply to cancel: {other:?}"),
    }
    Ok(())
}

async fn store_parsed_resume(store: &StateStore, path: &Path) -> anyhow::Result<ParsedResume> {
    let raw_text = fs::read_to_string(path).with_context(|| format!("reading resume {path:?}"))?;
    if raw_text.trim().is_empty() {
        bail!("resume {path:?} is empty");
    }
    let parsed = ParsedResume {
        raw_text,
        filename: file_name(path),
    };
    store.save_parsed_resume(&parsed).await?;
    Ok(parsed)
}

fn read_resume_file(path: &Path) -> anyhow::Result<ResumeFilePayload> {
    let content = fs::read(path).with_context(|| format!("reading resume file {path:?}"))?;
    Ok(ResumeFilePayload::new(file_name(path), mime_type(path), content))
}

fn document_text(html: &str) -> String {
    Page::parse(html).text()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "resume".to_string())
}

pub fn mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Prints the outcome and turns failures into an error exit.
fn finish(state: &AppState) -> anyhow::Result<()> {
    let view = state.view();
    match state.outcome() {
        Some(outcome @ (Outcome::Score(_) | Outcome::Answers(_) | Outcome::Cancelled)) => {
            print!("{}", render::outcome_text(outcome));
            Ok(())
        }
        Some(outcome) => bail!("{}", render::outcome_text(outcome).trim_end()),
        None => match view.last_error {
            Some(message) => bail!(message),
            None => {
                fill_warn!("controller stopped without an outcome");
                Ok(())
            }
        },
    }
}
