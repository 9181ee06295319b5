use std::io::Write;

use crate::{
    cmd::{Session, Source},
    config::Config,
    Status,
};

/// Print every variable as `key=value`, in stored order
#[derive(clap::Parser)]
pub struct Cmd {}

impl Cmd {
    pub fn run(self, source: &Source, config: &Config) -> anyhow::Result<Status> {
        let session = Session::find(source, config, false)?;
        print(&session, &mut std::io::stdout().lock())?;
        Ok(Status::Success)
    }
}

fn print(session: &Session, out: &mut impl Write) -> anyhow::Result<()> {
    for record in session.env.records() {
        writeln!(out, "{}", record?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::test_support::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn prints_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.bin");
        write_image(
            &path,
            &[block(b"bootdelay=3\0baudrate=115200\0ipaddr=\0\0", 0x1000)],
        );
        let config = Config {
            block_size: 0x1000,
            ..Config::default()
        };
        let source = Source::Image {
            path,
            erase_size: 0x1000,
        };

        let session = Session::find(&source, &config, false).unwrap();
        let mut out = Vec::new();
        print(&session, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "bootdelay=3\nbaudrate=115200\nipaddr=\n"
        );
    }
}
