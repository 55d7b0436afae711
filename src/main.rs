//! Write the first records of a FASTA archive as sample data

use log::info;

use anyhow::Result;

use std::path::PathBuf;

use structopt::StructOpt;

use fasta_head::download::{self, DEFAULT_ARCHIVE_URL};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "fasta head",
    about = "Copy the first records of a FASTA archive to plain and gzipped FASTA files"
)]
struct Opt {
    /// FASTA archive to read, gzipped or plain
    #[structopt(parse(from_os_str), default_value = "xenoMrna.fa.gz")]
    archive: PathBuf,

    /// directory for the output files [default: next to the archive]
    #[structopt(short, long, parse(from_os_str))]
    output_dir: Option<PathBuf>,

    /// download the archive first if it is missing
    #[structopt(long)]
    download: bool,

    /// download the archive even if it is present
    #[structopt(long)]
    force_download: bool,

    /// archive URL to download from [default: UCSC hg38 xenoMrna.fa.gz]
    #[structopt(long)]
    url: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let opt: Opt = Opt::from_args();

    if opt.download || opt.force_download {
        let url = opt.url.as_deref().unwrap_or(DEFAULT_ARCHIVE_URL);
        download::ensure_archive(url, &opt.archive, opt.force_download)?;
    }

    let paths = fasta_head::output_paths(&opt.archive, opt.output_dir.as_deref())?;
    info!(
        "Extracting from {:?}. Output to {:?} and {:?}",
        opt.archive, paths.plain, paths.compressed
    );
    let extraction = fasta_head::extract(&opt.archive, &paths, fasta_head::DEFAULT_RECORD_LIMIT)?;

    println!("{}", extraction.records);
    println!("I am done");

    Ok(())
}
