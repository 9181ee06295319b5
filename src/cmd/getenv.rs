use std::io::Write;

use crate::{
    cmd::{Session, Source},
    config::Config,
    Status,
};

/// Print the value of a single variable
#[derive(clap::Parser)]
pub struct Cmd {
    /// Name of the variable
    key: String,
}

impl Cmd {
    pub fn run(self, source: &Source, config: &Config) -> anyhow::Result<Status> {
        let session = Session::find(source, config, false)?;
        lookup(&session, &self.key, &mut std::io::stdout().lock())
    }
}

fn lookup(session: &Session, key: &str, out: &mut impl Write) -> anyhow::Result<Status> {
    match session.env.get(key)? {
        Some(value) => {
            writeln!(out, "{value}")?;
            Ok(Status::Success)
        }
        None => {
            tracing::info!("{} is not set", key);
            Ok(Status::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::test_support::*;
    use pretty_assertions::assert_eq;

    fn session(dir: &std::path::Path) -> Session {
        let path = dir.join("dump.bin");
        write_image(&path, &[block(b"bootcmd=run boot\0serial#=A1\0\0", 0x1000)]);
        let config = Config {
            block_size: 0x1000,
            ..Config::default()
        };
        let source = Source::Image {
            path,
            erase_size: 0x1000,
        };
        Session::find(&source, &config, false).unwrap()
    }

    #[test]
    fn prints_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();

        let status = lookup(&session(dir.path()), "bootcmd", &mut out).unwrap();

        assert_eq!(status, Status::Success);
        assert_eq!(out, b"run boot\n");
    }

    #[test]
    fn missing_key_is_reported_by_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();

        let status = lookup(&session(dir.path()), "serial", &mut out).unwrap();

        assert_eq!(status, Status::NotFound);
        assert!(out.is_empty());
    }
}
