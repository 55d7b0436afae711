//! Fetch the source archive with an external downloader

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use log::{info, warn};

use crate::ExtractError;

/// UCSC hg38 xeno mRNA collection
pub const DEFAULT_ARCHIVE_URL: &str =
    "http://hgdownload.soe.ucsc.edu/goldenPath/hg38/bigZips/xenoMrna.fa.gz";

const DOWNLOADER: &str = "wget";

/// Download `url` to `dest` unless `dest` is already there
///
/// Returns whether a download happened. `force` downloads regardless.
pub fn ensure_archive(url: &str, dest: &Path, force: bool) -> Result<bool> {
    ensure_archive_with(DOWNLOADER, url, dest, force)
}

fn ensure_archive_with(program: &str, url: &str, dest: &Path, force: bool) -> Result<bool> {
    if dest.exists() && !force {
        info!("Archive {:?} already present, skipping download", dest);
        return Ok(false);
    }
    fetch_with(program, url, dest)?;
    Ok(true)
}

/// Download `url` to `dest` with wget
pub fn fetch(url: &str, dest: &Path) -> Result<()> {
    fetch_with(DOWNLOADER, url, dest)
}

fn fetch_with(program: &str, url: &str, dest: &Path) -> Result<()> {
    info!("Downloading {} to {:?}", url, dest);
    let status = Command::new(program)
        .arg("-O")
        .arg(dest)
        .arg(url)
        .status()
        .map_err(|err| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("could not run {}: {}", program, err),
        })?;

    if !status.success() {
        // wget -O leaves an empty file behind on failure
        if dest.exists() {
            if let Err(err) = fs::remove_file(dest) {
                warn!("Could not remove partial download {:?}: {}", dest, err);
            }
        }
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("{} exited with {}", program, status),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_existing_archive_is_kept() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("xenoMrna.fa.gz");
        fs::write(&dest, b"already here")?;

        assert!(!ensure_archive(DEFAULT_ARCHIVE_URL, &dest, false)?);
        assert_eq!(fs::read(&dest)?, b"already here");
        Ok(())
    }

    #[test]
    fn test_missing_downloader() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("archive.fa.gz");

        let err = fetch_with("no-such-downloader-installed", "http://localhost/a.fa.gz", &dest)
            .unwrap_err();

        match err.downcast_ref::<ExtractError>() {
            Some(ExtractError::DownloadFailed { url, reason }) => {
                assert_eq!(url, "http://localhost/a.fa.gz");
                assert!(reason.starts_with("could not run no-such-downloader-installed"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_download_removes_partial_file() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("archive.fa.gz");
        fs::File::create(&dest)?;

        // `false` ignores its arguments and exits non-zero
        let err = fetch_with("false", "http://localhost/a.fa.gz", &dest).unwrap_err();

        assert!(format!("{}", err).contains("exited with"));
        assert!(!dest.exists());
        Ok(())
    }

    /// test helper for a downloader that writes `contents` to the `-O` target
    #[cfg(unix)]
    fn stub_downloader(dir: &Path, contents: &str) -> Result<std::path::PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("stub-wget");
        fs::write(&path, format!("#!/bin/sh\nprintf '{}' > \"$2\"\n", contents))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    #[cfg(unix)]
    #[test]
    fn test_forced_download_replaces_archive() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("xenoMrna.fa.gz");
        fs::write(&dest, b"stale")?;
        let downloader = stub_downloader(dir.path(), "fresh")?;
        let program = downloader.to_str().unwrap();

        assert!(!ensure_archive_with(program, DEFAULT_ARCHIVE_URL, &dest, false)?);
        assert_eq!(fs::read(&dest)?, b"stale");

        assert!(ensure_archive_with(program, DEFAULT_ARCHIVE_URL, &dest, true)?);
        assert_eq!(fs::read(&dest)?, b"fresh");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_archive_is_downloaded() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("xenoMrna.fa.gz");
        let downloader = stub_downloader(dir.path(), ">x\nACGT\n")?;

        assert!(ensure_archive_with(downloader.to_str().unwrap(), DEFAULT_ARCHIVE_URL, &dest, false)?);
        assert_eq!(fs::read_to_string(&dest)?, ">x\nACGT\n");
        Ok(())
    }
}
