use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "revlens",
    version,
    about = "Revision-aware repository access, diffing, and patch synthesis"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List files at a revision (the worktree when omitted)
    List {
        /// Revision to list
        #[arg(long)]
        rev: Option<String>,
    },

    /// Print a file's content at a revision
    Read {
        path: String,

        /// Revision to read from
        #[arg(long)]
        rev: Option<String>,
    },

    /// Show per-path change classification against the last commit
    Status,

    /// Show a patch for pending changes, or between two revisions
    Diff {
        /// Limit the patch to a single path
        path: Option<String>,

        /// Base revision of a commit-range diff
        #[arg(long, requires = "to")]
        from: Option<String>,

        /// Target revision of a commit-range diff
        #[arg(long, requires = "from")]
        to: Option<String>,
    },

    /// Stage files (a missing file is staged as a deletion)
    Add {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Commit staged changes and print the new revision
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Ask the configured model a question
    Ask {
        question: String,

        /// Attach the pending worktree patch as context
        #[arg(long)]
        diff: bool,

        /// Model id override
        #[arg(long)]
        model: Option<String>,
    },
}
