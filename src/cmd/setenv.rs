use anyhow::Context;
use envstore::SetOutcome;

use crate::{
    cmd::{Session, Source},
    config::Config,
    Status,
};

/// Set a variable and write the environment back
#[derive(clap::Parser)]
pub struct Cmd {
    /// The assignment, as `key=value`. An empty value is stored as such.
    assignment: String,
}

impl Cmd {
    pub fn run(self, source: &Source, config: &Config) -> anyhow::Result<Status> {
        let Some((key, value)) = split_assignment(&self.assignment) else {
            eprintln!("usage: ubootenv setenv <key>=<value>");
            return Ok(Status::Usage);
        };

        let mut session = Session::find(source, config, true)?;
        let outcome = session
            .env
            .set_and_persist(key, value, &mut session.flash)
            .with_context(|| format!("failed to set {key}"))?;

        if outcome == SetOutcome::Unchanged {
            tracing::info!("{} already has this value. Nothing will be changed", key);
        }
        Ok(Status::Success)
    }
}

/// Splits at the first `=`. The key must not be empty.
fn split_assignment(assignment: &str) -> Option<(&str, &str)> {
    assignment
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
}
