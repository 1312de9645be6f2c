//! Client for a resume-tailoring backend: starts long-running generation jobs
//! (tailored resumes, resume critiques), follows them to completion by polling,
//! and keeps the application-tracking list in sync.

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod poller;
pub mod store;

#[cfg(test)]
mod testing;
