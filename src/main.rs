mod cli;
mod config;
mod model;
mod repo;

use std::env;
use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::model::{Message, OllamaModel, Prompter};
use crate::repo::{
    render_patch, Committer, Differ, FileSource, GitRepo, MemoryFile, Reader, Revision,
    RevisionContext,
};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
}

fn with_optional_revision(ctx: &RevisionContext, rev: Option<String>) -> RevisionContext {
    match rev {
        Some(rev) => ctx.with_revision(Revision::from(rev)),
        None => ctx.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = config::load_config();

    let cwd = env::current_dir()?;
    let repo = match GitRepo::discover(&cwd) {
        Ok(r) => r.with_author(&config.author),
        Err(_) => {
            eprintln!(
                "revlens: not a git repository (or any parent directory)\n\
                 Run this command from inside a git working tree."
            );
            std::process::exit(1);
        }
    };

    let ctx = RevisionContext::new();
    let mut out = io::stdout().lock();

    match cli.command {
        Command::List { rev } => {
            let ctx = with_optional_revision(&ctx, rev);
            let mut paths = repo.list(&ctx)?;
            paths.sort();
            for path in paths {
                writeln!(out, "{path}")?;
            }
        }
        Command::Read { path, rev } => {
            let ctx = with_optional_revision(&ctx, rev);
            repo.read(&ctx, &path, &mut out)
                .with_context(|| format!("read {path}"))?;
        }
        Command::Status => {
            let mut status = repo.status()?;
            status.sort_by(|a, b| a.path.cmp(&b.path));
            for entry in status {
                writeln!(out, "{} {}", entry.class.label(), entry.path)?;
            }
        }
        Command::Diff { path, from, to } => {
            let ctx = match (from, to) {
                (Some(from), Some(to)) => {
                    ctx.with_diff(Revision::from(from), Revision::from(to))
                }
                _ => ctx,
            };
            match path {
                Some(path) => {
                    let (from_text, to_text) = repo.diff(&ctx, &path)?;
                    write!(out, "{}", render_patch(&path, &from_text, &to_text))?;
                }
                None => repo.diff_patch(&ctx, &mut out)?,
            }
        }
        Command::Add { files } => {
            let mut sources: Vec<Box<dyn FileSource>> = Vec::with_capacity(files.len());
            for file in files {
                let bytes = match fs::read(&file) {
                    Ok(bytes) => bytes,
                    // Missing on disk means the caller wants it gone: stage
                    // an empty payload, which the repo treats as a removal.
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                    Err(e) => anyhow::bail!("read {file}: {e}"),
                };
                sources.push(Box::new(MemoryFile::new(file, bytes)));
            }
            repo.add(&ctx, sources)?;
        }
        Command::Commit { message } => {
            let revision = repo.commit(&ctx, &message)?;
            writeln!(out, "{revision}")?;
        }
        Command::Ask {
            question,
            diff,
            model,
        } => {
            let model_id = model.unwrap_or(config.model_id);
            let client = OllamaModel::new(&config.model_addr, &model_id)
                .await
                .with_context(|| format!("connect to model at {}", config.model_addr))?;
            let context_text = if diff {
                let mut buf = Vec::new();
                repo.diff_patch(&ctx, &mut buf)?;
                String::from_utf8_lossy(&buf).into_owned()
            } else {
                String::new()
            };
            let message = Message {
                user: question,
                context: context_text,
                ..Default::default()
            };
            // Buffer the response; stdout's lock guard is not Send and
            // cannot cross the await as the prompt sink.
            let mut response = Vec::new();
            client.prompt(&message, &mut response).await?;
            out.write_all(&response)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
