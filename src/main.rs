mod cmd;
mod config;
mod flash;
mod logging;

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use num_enum::IntoPrimitive;

use crate::{
    cmd::Source,
    config::Config,
    logging::{setup_logging, LevelFilter},
};

#[derive(clap::Parser)]
#[clap(name = "ubootenv", about = "Read and modify the U-Boot environment", version)]
struct Cli {
    /// Configuration file. Defaults to /etc/ubootenv.toml if it exists.
    #[clap(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Operate on a flash image file instead of the MTD devices
    #[clap(long, global = true, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Erase unit size of the image file
    #[clap(long, global = true, value_parser = parse_usize, default_value = "0x10000")]
    erase_size: usize,

    /// Log more. Repeat for even more detail.
    #[clap(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help_heading = "LOG CONFIGURATION"
    )]
    verbose: u8,

    /// Log level, taking precedence over `--verbose`. `RUST_LOG` overrides both.
    #[clap(long, global = true, value_enum, help_heading = "LOG CONFIGURATION")]
    log_level: Option<LevelFilter>,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Subcommand)]
enum Subcommand {
    Printenv(cmd::printenv::Cmd),
    Getenv(cmd::getenv::Cmd),
    Setenv(cmd::setenv::Cmd),
    Unsetenv(cmd::unsetenv::Cmd),
}

/// Process exit status
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Status {
    Success = 0,
    Failure = 1,
    Usage = 2,
    NotFound = 3,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        ExitCode::from(u8::from(status))
    }
}

fn parse_usize(src: &str) -> Result<usize, std::num::ParseIntError> {
    parse_int::parse::<usize>(src)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.log_level);

    match run(cli) {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("Error: {err:?}");
            Status::Failure.into()
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<Status> {
    let config = Config::load(cli.config.as_deref())?;

    let source = match cli.image {
        Some(path) => Source::Image {
            path,
            erase_size: cli.erase_size,
        },
        None => Source::Mtd,
    };

    match cli.subcommand {
        Subcommand::Printenv(cmd) => cmd.run(&source, &config),
        Subcommand::Getenv(cmd) => cmd.run(&source, &config),
        Subcommand::Setenv(cmd) => cmd.run(&source, &config),
        Subcommand::Unsetenv(cmd) => cmd.run(&source, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test_case("0x10000" => 0x10000; "hex")]
    #[test_case("4096" => 4096; "decimal")]
    fn erase_size_formats(src: &str) -> usize {
        parse_usize(src).unwrap()
    }

    #[test]
    fn image_flags_are_global() {
        let cli = Cli::try_parse_from([
            "ubootenv",
            "getenv",
            "bootcmd",
            "--image",
            "dump.bin",
            "--erase-size",
            "0x2000",
        ])
        .unwrap();

        assert_eq!(cli.image, Some(PathBuf::from("dump.bin")));
        assert_eq!(cli.erase_size, 0x2000);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(u8::from(Status::Usage), 2);
        assert_eq!(u8::from(Status::NotFound), 3);
    }
}
