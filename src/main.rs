use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgGroup, CommandFactory, Parser};

use minitar::SystemIdentity;

/// minitar: create, append to, list, update and extract ustar archives
#[derive(Debug, Parser)]
#[clap(name = "minitar", version)]
#[clap(group(
    ArgGroup::new("operation")
        .required(true)
        .args(["create", "append", "list", "update", "extract"])
))]
struct App {
    /// Create a new archive holding FILE...
    #[clap(short = 'c', long)]
    create: bool,
    /// Append FILE... to the end of an existing archive
    #[clap(short = 'a', long)]
    append: bool,
    /// List the names stored in the archive
    #[clap(short = 't', long)]
    list: bool,
    /// Re-add FILE..., each of which must already be in the archive
    #[clap(short = 'u', long)]
    update: bool,
    /// Extract every entry of the archive
    #[clap(short = 'x', long)]
    extract: bool,
    /// The archive to operate on
    #[clap(short = 'f', long = "file", value_name = "ARCHIVE")]
    archive: PathBuf,
    /// Directory to extract into
    #[clap(short = 'C', long = "directory", value_name = "DIR", default_value = ".")]
    directory: PathBuf,
    /// Log every entry as it is processed
    #[clap(short, long)]
    verbose: bool,
    #[clap(value_name = "FILE")]
    files: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Create,
    Append,
    List,
    Update,
    Extract,
}

impl Operation {
    fn takes_files(self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Append | Operation::Update
        )
    }
}

impl App {
    fn operation(&self) -> Operation {
        if self.create {
            Operation::Create
        } else if self.append {
            Operation::Append
        } else if self.list {
            Operation::List
        } else if self.update {
            Operation::Update
        } else {
            Operation::Extract
        }
    }

    /// Checks the constraints clap cannot express between the operation and
    /// the FILE arguments.
    fn validate(&self) -> Result<Operation, clap::Error> {
        let op = self.operation();
        if op.takes_files() && self.files.is_empty() {
            return Err(App::command().error(
                ErrorKind::MissingRequiredArgument,
                "at least one FILE is required with -c, -a and -u",
            ));
        }
        if !op.takes_files() && !self.files.is_empty() {
            return Err(App::command().error(
                ErrorKind::ArgumentConflict,
                "FILE arguments are only accepted with -c, -a and -u",
            ));
        }
        Ok(op)
    }
}

fn run(args: &App, op: Operation) -> Result<()> {
    match op {
        Operation::Create => minitar::create(&args.archive, &args.files, &SystemIdentity)?,
        Operation::Append => minitar::append(&args.archive, &args.files, &SystemIdentity)?,
        Operation::Update => minitar::update(&args.archive, &args.files, &SystemIdentity)?,
        Operation::Extract => minitar::extract(&args.archive, &args.directory)?,
        Operation::List => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for name in minitar::list(&args.archive)? {
                writeln!(out, "{}", name)?;
            }
            out.flush()?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = App::parse();
    let op = args.validate().unwrap_or_else(|e| e.exit());

    let level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    run(&args, op).with_context(|| format!("failed to process `{}`", args.archive.display()))
}
