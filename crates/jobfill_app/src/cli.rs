use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Scores resumes against job postings and fills application forms.
#[derive(Debug, Parser)]
#[command(name = "jobfill")]
#[command(version)]
pub struct Cli {
    /// Configuration file (RON).
    #[arg(short, long, default_value = "jobfill.ron", global = true)]
    pub config: PathBuf,

    /// Overrides `backend_url` from the configuration file.
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Overrides `state_dir` from the configuration file.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Score a resume against a job posting and wait for the result.
    Score {
        /// Plain-text resume.
        #[arg(long)]
        resume: PathBuf,
        /// URL of the job description.
        #[arg(long)]
        jd_url: String,
    },
    /// Pick up a request left in the state directory by an earlier run.
    Resume,
    /// Fill the application form in a saved HTML page.
    Fill {
        /// HTML of the application page.
        #[arg(long)]
        page: PathBuf,
        /// Address the page was loaded from.
        #[arg(long)]
        page_url: Option<String>,
        /// Plain-text resume.
        #[arg(long)]
        resume: PathBuf,
        /// Resume document attached to file inputs.
        #[arg(long)]
        resume_file: Option<PathBuf>,
        /// Job description text; defaults to the page text.
        #[arg(long)]
        jd: Option<PathBuf>,
        /// Write the fill report as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Fill even when the page does not look like an application form.
        #[arg(long)]
        force: bool,
    },
    /// Cancel an outstanding request.
    Cancel {
        #[arg(long)]
        request_id: String,
    },
}
