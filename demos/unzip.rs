use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

use anyhow::*;
use log::*;
use structopt::*;

use zipvault::{Archive, EntryKind, FileSource, OpenOptions};

#[derive(Debug, StructOpt)]
#[structopt(name = "unzip", about = "Dumps a .zip file into the current directory")]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Change to the given directory before perfoming any operations.
    #[structopt(short = "C", long)]
    directory: Option<PathBuf>,

    /// Prints the tree of files in the ZIP archive instead of extracting them.
    #[structopt(short = "n", long)]
    dry_run: bool,

    /// Password used to decrypt WinZip AES-encrypted entries.
    #[structopt(long)]
    aes_password: Option<String>,

    #[structopt(name("ZIP file"))]
    zip_path: PathBuf,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    if let Some(chto) = &args.directory {
        std::env::set_current_dir(chto)
            .with_context(|| format!("Couldn't set working directory to {}", chto.display()))?;
    }

    info!("Opening {:#?}", &args.zip_path);
    let zip_file = File::open(&args.zip_path).context("Couldn't open zip file")?;

    let mut options = OpenOptions::default();
    if let Some(password) = &args.aes_password {
        options = options.aes_password(password.as_str());
    }

    let mut archive = Archive::open(Box::new(FileSource::new(zip_file)), options)
        .context("Couldn't load archive")?;

    let mut paths = Vec::new();
    walk(&mut archive, "", &mut paths)?;

    if args.dry_run {
        print_tree(&paths)
    } else {
        extract(&mut archive, &paths)
    }
}

/// Recursively lists every entry beneath `path`, depth first, resolving
/// each directory's children lazily as it's visited.
fn walk(archive: &mut Archive, path: &str, out: &mut Vec<(String, EntryKind)>) -> Result<()> {
    for child in archive.enumerate(path).with_context(|| format!("Couldn't list {path}"))? {
        let child_path = if path.is_empty() {
            child.name.clone()
        } else {
            format!("{path}/{}", child.name)
        };
        let kind = child.kind;
        out.push((child_path.clone(), kind));
        if kind == EntryKind::Directory {
            walk(archive, &child_path, out)?;
        }
    }
    Ok(())
}

fn print_tree(paths: &[(String, EntryKind)]) -> Result<()> {
    for (path, _) in paths {
        println!("{path}");
    }
    Ok(())
}

fn extract(archive: &mut Archive, paths: &[(String, EntryKind)]) -> Result<()> {
    for (path, kind) in paths {
        match kind {
            EntryKind::Directory => {
                fs::create_dir_all(path).with_context(|| format!("Couldn't create directory {path}"))?;
            }
            EntryKind::Regular | EntryKind::Symlink => {
                if let Some(parent) = PathBuf::from(path).parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Couldn't create directory {}", parent.display()))?;
                }
                let mut reader = archive
                    .open_read(path)
                    .with_context(|| format!("Couldn't open {path} for reading"))?;
                let mut sink =
                    File::create(path).with_context(|| format!("Couldn't create file {path}"))?;
                io::copy(&mut reader, &mut sink)?;
            }
        }
    }
    Ok(())
}
