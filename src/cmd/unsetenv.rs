use anyhow::Context;
use envstore::SetOutcome;

use crate::{
    cmd::{Session, Source},
    config::Config,
    Status,
};

/// Delete a variable and write the environment back
#[derive(clap::Parser)]
pub struct Cmd {
    /// Name of the variable
    key: String,
}

impl Cmd {
    pub fn run(self, source: &Source, config: &Config) -> anyhow::Result<Status> {
        let mut session = Session::find(source, config, true)?;
        let outcome = session
            .env
            .remove_and_persist(&self.key, &mut session.flash)
            .with_context(|| format!("failed to unset {}", self.key))?;

        if outcome == SetOutcome::Unchanged {
            tracing::info!("{} is not set. Nothing will be changed", self.key);
        }
        Ok(Status::Success)
    }
}
