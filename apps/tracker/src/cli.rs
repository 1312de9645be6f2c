use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Start resume and critique generation jobs and follow them to completion", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a tailored resume and wait for it to finish
    Generate {
        /// Title of the new resume
        #[arg(long)]
        title: String,

        /// Job description text to tailor against
        #[arg(long, conflicts_with = "job_description_file")]
        job_description: Option<String>,

        /// Read the job description from a file
        #[arg(long)]
        job_description_file: Option<PathBuf>,
    },

    /// Critique a candidate's resume and wait for the scores
    Critique {
        /// The candidate to critique
        candidate_id: Uuid,

        /// Score against this job posting instead of the candidate's own
        #[arg(long)]
        job_id: Option<Uuid>,
    },

    /// List resumes and their generation status
    Resumes,

    /// List job postings
    Jobs,

    /// List candidates and their critique status
    Candidates {
        #[arg(long)]
        job_id: Option<Uuid>,
    },

    /// List tracked job applications
    Applications {
        /// Only show one pipeline stage (e.g. interviewing), or "all"
        #[arg(long, default_value = "all")]
        status: String,

        /// Group by pipeline stage instead of a flat list
        #[arg(long)]
        board: bool,
    },

    /// Move an application to another pipeline stage
    Move {
        id: Uuid,

        /// Target stage, e.g. offer
        status: String,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Toggle the favorite flag of an application
    Favorite { id: Uuid },
}
