//! Assemble a PDF from page ranges of other PDFs.
//!
//! Usage:
//!   pdf_binder -o out.pdf a.pdf b.pdf:1-3 c.pdf:ODD
//!   pdf_binder --job job.json
//!
//! Options:
//!   -o, --output <path>      output file (default: bound.pdf)
//!   --version <x.y>          output version, e.g. 1.4 or 1.7
//!   --password <pw>          encrypt with this user password (AES-128)
//!   --bookmarks              add one bookmark per source at its first page
//!   --job <path>             read the whole job from a JSON file
//!
//! Set `RUST_LOG=debug` to follow numbering and emission.

use pdf_binder::{Algorithm, Document, EncryptionConfig, PdfVersion, Permissions, WriteOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[derive(Debug, Deserialize)]
struct Source {
    path: PathBuf,
    #[serde(default = "all_pages")]
    pages: String,
    #[serde(default)]
    bookmark: Option<String>,
}

fn all_pages() -> String {
    "ALL".to_string()
}

#[derive(Debug, Deserialize)]
struct JobEncryption {
    user_password: String,
    #[serde(default)]
    owner_password: String,
    #[serde(default)]
    algorithm: Algorithm,
    #[serde(default)]
    read_only: bool,
}

#[derive(Debug, Deserialize)]
struct Job {
    output: PathBuf,
    #[serde(default)]
    version: Option<PdfVersion>,
    sources: Vec<Source>,
    #[serde(default)]
    encryption: Option<JobEncryption>,
    #[serde(default)]
    title: Option<String>,
}

impl Job {
    fn from_args() -> Result<Self, Box<dyn std::error::Error>> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut output = PathBuf::from("bound.pdf");
        let mut version = None;
        let mut password = None;
        let mut bookmarks = false;
        let mut sources = Vec::new();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--job" => {
                    i += 1;
                    let path = args.get(i).ok_or("--job needs a path")?;
                    return Self::from_file(Path::new(path));
                },
                "-o" | "--output" => {
                    i += 1;
                    output = PathBuf::from(args.get(i).ok_or("--output needs a path")?);
                },
                "--version" => {
                    i += 1;
                    version = Some(args.get(i).ok_or("--version needs a value")?.parse()?);
                },
                "--password" => {
                    i += 1;
                    password = Some(args.get(i).ok_or("--password needs a value")?.clone());
                },
                "--bookmarks" => {
                    bookmarks = true;
                },
                arg => {
                    // `file.pdf:1-3`; a bare path takes every page.
                    let (path, pages) = match arg.rsplit_once(':') {
                        Some((path, pages)) if !path.is_empty() && !pages.contains(['/', '\\']) => {
                            (path, pages.to_string())
                        },
                        _ => (arg, all_pages()),
                    };
                    let path = PathBuf::from(path);
                    let bookmark = bookmarks.then(|| {
                        path.file_stem()
                            .map(|s| s.to_string_lossy().to_string())
                            .unwrap_or_default()
                    });
                    sources.push(Source { path, pages, bookmark });
                },
            }
            i += 1;
        }

        if sources.is_empty() {
            return Err("no input files (usage: pdf_binder -o out.pdf a.pdf b.pdf:1-3)".into());
        }
        Ok(Self {
            output,
            version,
            sources,
            encryption: password.map(|user_password| JobEncryption {
                user_password,
                owner_password: String::new(),
                algorithm: Algorithm::default(),
                read_only: false,
            }),
            title: None,
        })
    }

    fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        let job: Job = serde_json::from_str(&text)?;
        log::debug!("Loaded job {} with {} sources", path.display(), job.sources.len());
        Ok(job)
    }
}

fn run(job: Job) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let mut doc = match job.version {
        Some(version) => Document::with_version(version),
        None => Document::new(),
    };

    for source in &job.sources {
        let first = doc.page_count();
        let count = doc.merge_file(&source.path, &source.pages)?;
        if let (Some(title), Some(page)) = (&source.bookmark, doc.page_key(first)) {
            if count > 0 {
                doc.add_bookmark(None, title.as_str(), page)?;
            }
        }
        println!("  {} [{}]: {} pages", source.path.display(), source.pages, count);
    }

    if let Some(title) = &job.title {
        doc.set_info("Title", title);
    }
    if let Some(enc) = job.encryption {
        let permissions = if enc.read_only {
            Permissions::read_only()
        } else {
            Permissions::default()
        };
        doc.set_encryption(Some(
            EncryptionConfig::new(enc.user_password, enc.owner_password)
                .with_algorithm(enc.algorithm)
                .with_permissions(permissions),
        ));
    }

    let mut options = WriteOptions::new();
    if let Some(version) = job.version {
        options = options.with_version(version);
    }
    doc.save(&job.output, &options)?;

    if let Some(session) = doc.last_session() {
        println!(
            "Wrote {} ({} pages, {} objects, {} bytes) in {:.2?}",
            job.output.display(),
            doc.page_count(),
            session.object_count(),
            session.bytes_written(),
            start.elapsed()
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let job = match Job::from_args() {
        Ok(job) => job,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        },
    };
    match run(job) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
