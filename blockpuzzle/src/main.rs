use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use blockpuzzle::core::ChartData;
use blockpuzzle::parse_chart_file;
use blockpuzzle::projectors::schedule_projector;
use blockpuzzle::schedule::TrackSchedule;
use clap::{Args, Parser, Subcommand};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

#[derive(Debug, Parser)]
#[command(
    name = "blockpuzzle",
    about = "Parse block puzzle chart text and project track schedules",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse chart files and print the chart data.
    Parse(ParseArgs),

    /// Parse chart files and print each track's slices with allocated
    /// hours.
    Schedule(ScheduleArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Chart files or directories containing chart files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output as JSON instead of the debug representation.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ScheduleArgs {
    /// Chart files or directories containing chart files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output as JSON instead of a readable listing.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    init_logging(verbose)?;

    match cli.command {
        Commands::Parse(args) => handle_parse(args, verbose),
        Commands::Schedule(args) => handle_schedule(args, verbose),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context("initializing logger")
}

fn handle_parse(args: ParseArgs, verbose: bool) -> Result<()> {
    let ParseArgs { inputs, json } = args;

    let expanded = expand_inputs(&inputs, verbose)?;
    if expanded.is_empty() {
        anyhow::bail!("no chart files found in the provided inputs");
    }

    let mut parsed = Vec::new();
    for path in expanded {
        if verbose {
            eprintln!("Parsing {:?}", path);
        }
        let data = parse_chart_file(&path).with_context(|| format!("parsing {:?}", path))?;
        parsed.push((path, data));
    }

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            path: String,
            chart: &'a ChartData,
        }

        let payload: Vec<JsonOutput<'_>> = parsed
            .iter()
            .map(|(path, data)| JsonOutput {
                path: path.display().to_string(),
                chart: data,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let many = parsed.len() > 1;
    for (index, (path, data)) in parsed.iter().enumerate() {
        if many {
            println!("== {} ==", path.display());
        }
        println!("{:#?}", data);
        if many && index + 1 < parsed.len() {
            println!();
        }
    }
    Ok(())
}

fn handle_schedule(args: ScheduleArgs, verbose: bool) -> Result<()> {
    let ScheduleArgs { inputs, json } = args;

    let expanded = expand_inputs(&inputs, verbose)?;
    if expanded.is_empty() {
        anyhow::bail!("no chart files found in the provided inputs");
    }

    let mut projected = Vec::new();
    for path in expanded {
        if verbose {
            eprintln!("Projecting {:?}", path);
        }
        let data = parse_chart_file(&path).with_context(|| format!("parsing {:?}", path))?;
        let schedules = schedule_projector::project_chart(&data);
        projected.push((path, data, schedules));
    }

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            path: String,
            tracks: &'a [TrackSchedule],
        }

        let payload: Vec<JsonOutput<'_>> = projected
            .iter()
            .map(|(path, _, schedules)| JsonOutput {
                path: path.display().to_string(),
                tracks: schedules,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let many = projected.len() > 1;
    for (path, data, schedules) in &projected {
        if many {
            println!("== {} ==", path.display());
        }
        if schedules.is_empty() {
            eprintln!("No reservations found in {}", path.display());
            continue;
        }
        for (track, schedule) in data.tracks.iter().zip(schedules) {
            println!(
                "* {} [{} .. {}]",
                schedule.name, schedule.start, schedule.end
            );
            for slice in &schedule.slices {
                let allocations: Vec<String> = slice
                    .reservations
                    .iter()
                    .enumerate()
                    .map(|(at, index)| {
                        let name = track
                            .reservations
                            .get(*index)
                            .map(|r| r.name.as_str())
                            .unwrap_or("?");
                        format!("{} {:.1}h", name, slice.reservation_hours[at])
                    })
                    .collect();
                println!(
                    "  {} .. {}  unused {:.1}h  {}",
                    slice.start,
                    slice.end,
                    slice.unused_hours,
                    allocations.join(", ")
                );
            }
        }
    }
    Ok(())
}

/// Expand the command line inputs into a list of chart files. Directories
/// are walked recursively; explicit files must carry the `.txt` extension.
fn expand_inputs(paths: &[PathBuf], verbose: bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = BTreeSet::new();

    for path in paths {
        let canonical =
            fs::canonicalize(path).with_context(|| format!("resolving path {:?}", path))?;
        let meta = fs::metadata(&canonical)
            .with_context(|| format!("reading metadata for {:?}", canonical))?;
        if meta.is_dir() {
            if verbose {
                eprintln!("Scanning directory {:?}", canonical);
            }
            for file in collect_chart_files(&canonical, verbose)? {
                if visited.insert(file.clone()) {
                    out.push(file);
                }
            }
        } else if meta.is_file() {
            if !is_chart_file(&canonical) {
                anyhow::bail!("{:?} is not a .txt chart file", canonical);
            }
            if verbose {
                eprintln!("Adding file {:?}", canonical);
            }
            if visited.insert(canonical.clone()) {
                out.push(canonical);
            }
        }
    }
    Ok(out)
}

fn is_chart_file(path: &Path) -> bool {
    path.extension().map(|ext| ext == "txt").unwrap_or(false)
}

fn collect_chart_files(dir: &Path, verbose: bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    visit_dir(dir, &mut out, &mut visited, verbose)?;
    out.sort();
    out.dedup();
    Ok(out)
}

fn visit_dir(
    path: &Path,
    out: &mut Vec<PathBuf>,
    visited: &mut HashSet<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let canonical = fs::canonicalize(path)?;
    if !visited.insert(canonical.clone()) {
        return Ok(());
    }

    let metadata = fs::metadata(&canonical)?;
    if metadata.is_dir() {
        if verbose {
            eprintln!("Visiting directory {:?}", canonical);
        }
        for entry in fs::read_dir(&canonical)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_symlink() {
                continue;
            }
            visit_dir(&entry.path(), out, visited, verbose)?;
        }
    } else if metadata.is_file() && is_chart_file(&canonical) {
        if verbose {
            eprintln!("Found chart file {:?}", canonical);
        }
        out.push(canonical);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_inputs_walks_directories_for_chart_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let nested = tmp.path().join("nested");
        fs::create_dir_all(&nested).expect("mkdir nested");
        fs::write(tmp.path().join("a.txt"), "* a\n").expect("write a");
        fs::write(nested.join("b.txt"), "* b\n").expect("write b");
        fs::write(nested.join("ignored.org"), "* heading\n").expect("write ignored");

        let expanded = expand_inputs(&[tmp.path().to_path_buf()], false).expect("expand");

        let names: Vec<_> = expanded
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn expand_inputs_rejects_files_with_other_extensions() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let other = tmp.path().join("notes.org");
        fs::write(&other, "* heading\n").expect("write");

        assert!(expand_inputs(&[other], false).is_err());
    }

    #[test]
    fn expand_inputs_dedups_repeated_arguments() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let chart = tmp.path().join("chart.txt");
        fs::write(&chart, "* a\n").expect("write");

        let expanded = expand_inputs(
            &[chart.clone(), chart.clone(), tmp.path().to_path_buf()],
            false,
        )
        .expect("expand");
        assert_eq!(expanded.len(), 1);
    }

    #[test]
    fn parse_chart_file_reads_from_disk() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("chart.txt");
        fs::write(&path, "AVAILABLE_HOURS: 42\n* user1\n - R: 2020\n").expect("write chart");

        let data = parse_chart_file(&path).expect("parse");

        assert_eq!(data.options.available_hours, 42.0);
        assert_eq!(data.tracks.len(), 1);
        assert_eq!(data.tracks[0].reservations.len(), 1);
    }
}
