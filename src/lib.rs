//! Copy the first records of a FASTA archive into a plain and a gzipped FASTA file

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bio::io::fasta;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};

use anyhow::{Context, Result};
use thiserror::Error;

pub mod download;

/// Number of records written when no other limit is given
pub const DEFAULT_RECORD_LIMIT: usize = 500_000;

/// Sequence line width, as written by Biopython's FASTA writer
pub const LINE_WIDTH: usize = 60;

const PROGRESS_INTERVAL: usize = 100_000;

const FASTA_EXTENSIONS: [&str; 3] = ["fa", "fasta", "fna"];

#[derive(Error, Debug, PartialEq)]
pub enum ExtractError {
    #[error("Archive ran out after {found:?} records, but {wanted:?} were requested")]
    ArchiveExhausted { wanted: usize, found: usize },

    #[error("Cannot derive an output name from archive path {path:?}")]
    UnnamedArchive { path: PathBuf },

    #[error("Download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },
}

/// Record stream decoded from an archive, gzipped or not
pub type ArchiveReader = fasta::Reader<BufReader<Box<dyn Read>>>;

/// Destinations for the uncompressed and gzipped copies
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub plain: PathBuf,
    pub compressed: PathBuf,
}

impl OutputPaths {
    /// Sibling `.part` files that are written before being renamed into place
    fn staging(&self) -> OutputPaths {
        OutputPaths {
            plain: staging_path(&self.plain),
            compressed: staging_path(&self.compressed),
        }
    }

    /// Rename both staged files over `target`
    ///
    /// If only the plain file made it, it is removed again so the pair never
    /// holds different records.
    fn commit(&self, target: &OutputPaths) -> Result<()> {
        fs::rename(&self.plain, &target.plain)
            .with_context(|| format!("Could not move output into place at {:?}", target.plain))?;
        if let Err(err) = fs::rename(&self.compressed, &target.compressed) {
            warn!(
                "Removing {:?}, its gzipped counterpart {:?} could not be written",
                target.plain, target.compressed
            );
            if let Err(rm_err) = fs::remove_file(&target.plain) {
                warn!("Could not remove {:?}: {}", target.plain, rm_err);
            }
            return Err(err).with_context(|| {
                format!("Could not move output into place at {:?}", target.compressed)
            });
        }
        Ok(())
    }

    fn discard(&self) {
        for path in [&self.plain, &self.compressed].iter() {
            if !path.exists() {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => warn!("Removed incomplete output {:?}", path),
                Err(err) => warn!("Could not remove incomplete output {:?}: {}", path, err),
            }
        }
    }
}

/// Summary of a finished extraction
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub records: usize,
    pub plain: PathBuf,
    pub compressed: PathBuf,
}

/// Derive `<name>_short.fa` and `<name>_short.fa.gz` from the archive path
///
/// Outputs go to `output_dir` if given, next to the archive otherwise.
pub fn output_paths(archive: &Path, output_dir: Option<&Path>) -> Result<OutputPaths> {
    let name = archive_name(archive).ok_or_else(|| ExtractError::UnnamedArchive {
        path: archive.to_path_buf(),
    })?;
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => archive.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(OutputPaths {
        plain: dir.join(format!("{}_short.fa", name)),
        compressed: dir.join(format!("{}_short.fa.gz", name)),
    })
}

/// Archive file name without its `.gz` and FASTA extensions
fn archive_name(archive: &Path) -> Option<String> {
    let mut name = archive.file_name()?.to_str()?;
    name = name.strip_suffix(".gz").unwrap_or(name);
    for ext in FASTA_EXTENSIONS.iter() {
        if let Some(stem) = name.strip_suffix(ext).and_then(|s| s.strip_suffix('.')) {
            name = stem;
            break;
        }
    }

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn is_gzipped(path: &Path) -> bool {
    path.extension().map(|ext| ext == "gz").unwrap_or(false)
}

/// Open the archive at `path` for streaming
///
/// `.gz` archives may hold several gzip members (bgzip output does).
/// Anything else is read as uncompressed FASTA.
pub fn open_archive(path: &Path) -> Result<ArchiveReader> {
    let file = File::open(path).with_context(|| format!("Could not open archive {:?}", path))?;
    let stream: Box<dyn Read> = if is_gzipped(path) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(fasta::Reader::new(stream))
}

/// Write `record` as FASTA with sequence lines wrapped at `LINE_WIDTH`
///
/// An empty sequence gets a header line only.
pub fn write_record<W: Write>(out: &mut W, record: &fasta::Record) -> io::Result<()> {
    match record.desc() {
        Some(desc) => writeln!(out, ">{} {}", record.id(), desc)?,
        None => writeln!(out, ">{}", record.id())?,
    }
    for line in record.seq().chunks(LINE_WIDTH) {
        out.write_all(line)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Write the next `limit` records to both sinks, in stream order
///
/// Fails with `ExtractError::ArchiveExhausted` if the stream ends first.
pub fn copy_records<I, P, C>(
    records: I,
    limit: usize,
    plain: &mut P,
    compressed: &mut C,
) -> Result<usize>
where
    I: IntoIterator<Item = io::Result<fasta::Record>>,
    P: Write,
    C: Write,
{
    let mut records = records.into_iter();
    let mut count = 0;
    while count < limit {
        let record = match records.next() {
            Some(record) => record?,
            None => {
                return Err(ExtractError::ArchiveExhausted {
                    wanted: limit,
                    found: count,
                }
                .into())
            }
        };
        write_record(plain, &record)?;
        write_record(compressed, &record)?;
        count += 1;

        if count % PROGRESS_INTERVAL == 0 {
            debug!("Copied {} of {} records", count, limit);
        }
    }
    Ok(count)
}

/// Copy the first `limit` records of `archive` to both `paths`
///
/// Outputs only appear once both are complete. On failure nothing new is
/// left at `paths`.
pub fn extract(archive: &Path, paths: &OutputPaths, limit: usize) -> Result<Extraction> {
    for dir in [&paths.plain, &paths.compressed].iter().filter_map(|p| p.parent()) {
        fs::create_dir_all(dir).with_context(|| format!("Could not create directory {:?}", dir))?;
    }

    let staged = paths.staging();
    let result = write_outputs(archive, &staged, limit).and_then(|records| {
        staged.commit(paths)?;
        Ok(records)
    });

    match result {
        Ok(records) => {
            info!(
                "Wrote {} records to {:?} and {:?}",
                records, paths.plain, paths.compressed
            );
            Ok(Extraction {
                records,
                plain: paths.plain.clone(),
                compressed: paths.compressed.clone(),
            })
        }
        Err(err) => {
            staged.discard();
            Err(err.context(format!("Could not extract records from {:?}", archive)))
        }
    }
}

fn write_outputs(archive: &Path, staged: &OutputPaths, limit: usize) -> Result<usize> {
    let reader = open_archive(archive)?;
    info!("Reading {} records from {:?}", limit, archive);

    let mut plain = BufWriter::new(create_output(&staged.plain)?);
    let mut compressed = GzEncoder::new(
        BufWriter::new(create_output(&staged.compressed)?),
        Compression::default(),
    );

    let count = copy_records(reader.records(), limit, &mut plain, &mut compressed)?;

    plain.flush()?;
    compressed.finish()?.flush()?;
    Ok(count)
}

fn create_output(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Could not create output {:?}", path))
}
