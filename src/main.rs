use std::io::prelude::*;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use cffs_core::prelude::*;
use env_logger::Builder;
use log::{Level, LevelFilter};
use owo_colors::OwoColorize;

mod device;
mod menu;

use device::FileStore;
use menu::{Cffs, DeleteOp, DirOp, EraseOp, FsckOp, GetOp, Op, PutOp};

fn color_level(level: Level) -> String {
    match level {
        Level::Error => level.red().to_string(),
        Level::Warn => level.yellow().to_string(),
        Level::Info => level.green().to_string(),
        Level::Debug => level.blue().to_string(),
        Level::Trace => level.purple().to_string(),
    }
}

const fn level_filter(verbose: usize) -> LevelFilter {
    match verbose {
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        5 => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

fn main() -> Result<()> {
    let args: Cffs = argp::parse_args_or_exit(argp::DEFAULT);

    if args.verbose != 0 {
        Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{}] {} {}",
                    cffs_core::time::current_time(),
                    color_level(record.level()),
                    record.args()
                )
            })
            .filter(None, level_filter(args.verbose))
            .init();
    }

    let store = FileStore::open(&args.device)
        .with_context(|| format!("failed to open device {}", args.device))?;

    match args.nested {
        Op::Dir(op) => dir(&store, op)?,
        Op::Get(op) => get(&store, op)?,
        Op::Put(op) => put(&store, op)?,
        Op::Delete(op) => delete(&store, op)?,
        Op::Fsck(op) => fsck(&store, op)?,
        Op::Erase(op) => erase(&store, op)?,
    }

    Ok(())
}

fn dir(store: &FileStore, op: DirOp) -> Result<()> {
    let entries = cffs_core::ops::list(store, &op.patterns)?;

    if entries.is_empty() {
        println!("No files found");
        return Ok(());
    }

    for entry in entries {
        let date = cffs_core::time::format_timestamp(i64::from(entry.header.date()))
            .unwrap_or_else(|_| "unknown date".to_string());
        let size = cffs_core::util::format_size(entry.header.length() as usize);

        let mut annotations = Vec::new();
        if entry.header.deleted() {
            annotations.push("deleted");
        }
        if entry.bad_chksum {
            annotations.push("bad chksum");
        }

        let suffix =
            if annotations.is_empty() { String::new() } else { format!(" [{}]", annotations.join(", ")) };

        println!("{:>10}  {date}  {}{suffix}", size, entry.header.name());
    }

    Ok(())
}

fn get(store: &FileStore, op: GetOp) -> Result<()> {
    let dest_dir = op.output.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let on_exists = match (op.overwrite, op.skip) {
        (true, true) => bail!("--overwrite and --skip are mutually exclusive"),
        (true, false) => OnExists::Overwrite,
        (false, true) => OnExists::Skip,
        (false, false) => OnExists::Fail,
    };

    let outcomes = cffs_core::ops::extract(store, &op.patterns, &dest_dir, on_exists)?;
    for outcome in outcomes {
        match outcome {
            cffs_core::ops::ExtractOutcome::Written(path) => {
                log::info!("wrote {}", path.display());
            }
            cffs_core::ops::ExtractOutcome::Skipped(path) => {
                log::info!("skipped {} (already exists)", path.display());
            }
        }
    }

    Ok(())
}

fn put(store: &FileStore, op: PutOp) -> Result<()> {
    for path in &op.files {
        let payload = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
        let name = PathBuf::from(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());

        let now = cffs_core::time::now_unix_timestamp() as u32;
        let offset = cffs_core::ops::insert(store, &name, &payload, now)?;
        log::info!("inserted {name} at offset {offset}");
    }

    Ok(())
}

fn delete(store: &FileStore, op: DeleteOp) -> Result<()> {
    if op.patterns.is_empty() {
        bail!("refusing to delete with no name patterns given");
    }
    let count = cffs_core::ops::delete(store, &op.patterns)?;
    log::info!("deleted {count} file(s)");
    Ok(())
}

fn fsck(store: &FileStore, _op: FsckOp) -> Result<()> {
    let report = cffs_core::ops::fsck(store)?;

    let mut bad = 0;
    for entry in &report.per_file {
        if entry.chksum_ok {
            println!("{}: ok", entry.name);
        } else {
            bad += 1;
            println!("{}: {}", entry.name, "bad checksum".red());
        }
    }

    println!("{} bytes free", cffs_core::util::format_size(report.free_bytes as usize));

    if report.tail_ok {
        println!("{}", "tail ok".green());
    } else {
        println!(
            "{}",
            format!("tail corrupt at offset {}", report.tail_bad_at.unwrap_or_default()).red()
        );
    }

    if bad > 0 || !report.tail_ok {
        bail!("filesystem check found problems");
    }

    Ok(())
}

fn erase(store: &FileStore, op: EraseOp) -> Result<()> {
    if !op.yes && !confirm("erase the entire device")? {
        println!("erase aborted");
        return Ok(());
    }

    cffs_core::ops::erase(store, |done, total| {
        log::info!("erased block {done}/{total}");
    })?;

    Ok(())
}

fn confirm(action: &str) -> Result<bool> {
    print!("Proceed with {action}? [Y/n] ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let answer = line.trim();

    Ok(answer.is_empty() || answer.eq_ignore_ascii_case("y"))
}
