pub mod getenv;
pub mod printenv;
pub mod setenv;
pub mod unsetenv;

use std::path::PathBuf;

use anyhow::Context;
use envstore::{EnvError, Environment};

use crate::{
    config::Config,
    flash::{FileFlash, MtdRegion},
};

/// Where to look for the environment
#[derive(Debug, Clone)]
pub enum Source {
    /// A flash dump or any other file
    Image { path: PathBuf, erase_size: usize },
    /// The MTD partitions of the running system
    Mtd,
}

/// A located environment together with the flash it came from
#[derive(Debug)]
pub struct Session {
    pub flash: FileFlash,
    pub env: Environment,
}

impl Session {
    /// Finds the first flash of `source` holding an environment block.
    ///
    /// MTD regions are tried in index order, up to [Config::max_regions]. Regions that
    /// can't be opened are skipped.
    pub fn open(source: &Source, config: &Config, writable: bool) -> anyhow::Result<Option<Self>> {
        match source {
            Source::Image { path, erase_size } => {
                let flash = FileFlash::open(path, *erase_size, writable)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                Self::locate(flash, config)
            }
            Source::Mtd => {
                let regions = MtdRegion::enumerate(&config.sysfs_root)?;
                for region in regions
                    .into_iter()
                    .filter(|region| region.index < config.max_regions)
                {
                    let path = region.block_device(&config.dev_root);
                    tracing::debug!(
                        "Searching mtd{} \"{}\" ({:#x} bytes) via {}",
                        region.index,
                        region.name,
                        region.size,
                        path.display()
                    );

                    let flash = match FileFlash::open(&path, region.erase_size, writable) {
                        Ok(flash) => flash,
                        Err(err) => {
                            tracing::warn!("Skipping {}: {}", path.display(), err);
                            continue;
                        }
                    };

                    if let Some(session) = Self::locate(flash, config)? {
                        return Ok(Some(session));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Like [Self::open], but not finding an environment is an error
    pub fn find(source: &Source, config: &Config, writable: bool) -> anyhow::Result<Self> {
        Self::open(source, config, writable)?
            .ok_or_else(|| anyhow::anyhow!("no U-Boot environment found"))
    }

    fn locate(flash: FileFlash, config: &Config) -> anyhow::Result<Option<Self>> {
        match Environment::locate(flash.image(), config.block_size) {
            Ok(env) => {
                tracing::info!(
                    "Found environment in {} at {:#x}",
                    flash.path().display(),
                    env.offset()
                );
                Ok(Some(Self { flash, env }))
            }
            Err(EnvError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const BLOCK: usize = 0x1000;

    fn config(root: &std::path::Path) -> Config {
        Config {
            sysfs_root: root.join("sys"),
            dev_root: root.join("dev"),
            max_regions: 2,
            block_size: BLOCK,
        }
    }

    fn add_mtd(root: &std::path::Path, index: u32, blocks: &[Vec<u8>]) {
        let sys = root.join("sys").join(format!("mtd{index}"));
        fs::create_dir_all(&sys).unwrap();
        fs::create_dir_all(root.join("dev")).unwrap();
        fs::write(sys.join("name"), format!("part{index}")).unwrap();
        fs::write(sys.join("size"), (blocks.len() * BLOCK).to_string()).unwrap();
        fs::write(sys.join("erasesize"), BLOCK.to_string()).unwrap();
        write_image(&root.join("dev").join(format!("mtdblock{index}")), blocks);
    }

    #[test]
    fn image_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.bin");
        write_image(&path, &[vec![0xFF; BLOCK], block(b"ver=1\0\0", BLOCK)]);

        let source = Source::Image {
            path,
            erase_size: BLOCK,
        };
        let session = Session::open(&source, &config(dir.path()), false)
            .unwrap()
            .unwrap();

        assert_eq!(session.env.offset(), BLOCK);
        assert_eq!(session.env.get("ver").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn image_without_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.bin");
        write_image(&path, &[vec![0; BLOCK]]);

        let source = Source::Image {
            path,
            erase_size: BLOCK,
        };
        assert!(Session::open(&source, &config(dir.path()), false)
            .unwrap()
            .is_none());
    }

    #[test]
    fn first_mtd_region_with_environment_wins() {
        let dir = tempfile::tempdir().unwrap();
        add_mtd(dir.path(), 0, &[vec![0xFF; BLOCK]]);
        add_mtd(dir.path(), 1, &[block(b"part=1\0\0", BLOCK)]);

        let session = Session::open(&Source::Mtd, &config(dir.path()), false)
            .unwrap()
            .unwrap();

        assert!(session.flash.path().ends_with("mtdblock1"));
        assert_eq!(session.env.get("part").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn regions_past_the_limit_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        add_mtd(dir.path(), 0, &[vec![0xFF; BLOCK]]);
        add_mtd(dir.path(), 2, &[block(b"part=2\0\0", BLOCK)]);

        assert!(Session::open(&Source::Mtd, &config(dir.path()), false)
            .unwrap()
            .is_none());
    }

    #[test]
    fn unreadable_region_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        add_mtd(dir.path(), 0, &[vec![0xFF; BLOCK]]);
        add_mtd(dir.path(), 1, &[block(b"part=1\0\0", BLOCK)]);
        fs::remove_file(dir.path().join("dev").join("mtdblock0")).unwrap();

        let session = Session::open(&Source::Mtd, &config(dir.path()), false)
            .unwrap()
            .unwrap();
        assert_eq!(session.env.get("part").unwrap().as_deref(), Some("1"));
    }
}
