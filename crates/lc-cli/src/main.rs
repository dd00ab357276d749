//! larcal CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use lc_core::Hit;
use lc_hist::{FileSource, HistogramSet, HitFiller, MergeOptions, ObjectFile, merge_all};
use lc_inference::{CalibrationCurve, curve_ratio, profile_grid, profile_groups};
use std::io::BufRead;
use std::path::{Path, PathBuf};

mod config;

#[derive(Parser)]
#[command(name = "larcal")]
#[command(about = "larcal - LArTPC calorimetric calibration with iterative truncated means")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill per-group sparse histograms from a hit stream
    Fill {
        /// Run configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Hits, one JSON object per line
        #[arg(short, long)]
        input: PathBuf,

        /// Output object file
        #[arg(short, long)]
        output: PathBuf,

        /// Run report (pretty JSON). Defaults to stdout.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Merge histogram files from many jobs
    Merge {
        /// Input object files, merged in order
        #[arg(long, num_args = 1.., required_unless_present = "file_list", conflicts_with = "file_list")]
        inputs: Vec<PathBuf>,

        /// Text file with one input path per line (`#` starts a comment)
        #[arg(long)]
        file_list: Option<PathBuf>,

        /// Output object file
        #[arg(short, long)]
        output: PathBuf,

        /// Project onto these axes before merging (comma separated)
        #[arg(long, value_delimiter = ',')]
        keep_axes: Option<Vec<usize>>,

        /// Planes per drift volume, for inputs that do not record it
        #[arg(long, default_value = "3")]
        n_planes: u16,

        /// Run report (pretty JSON). Defaults to stdout.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Dynamic-binning profile of every group
    Profile {
        /// Run configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Merged histogram file
        #[arg(short, long)]
        input: PathBuf,

        /// Output object file with calibration curves
        #[arg(short, long)]
        output: PathBuf,

        /// Threads (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Run report (pretty JSON). Defaults to stdout.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Fixed 2-D block profile of every group
    ProfileGrid {
        /// Run configuration (YAML or JSON), must have a `grid` section
        #[arg(short, long)]
        config: PathBuf,

        /// Merged histogram file
        #[arg(short, long)]
        input: PathBuf,

        /// Output object file with grid profiles
        #[arg(short, long)]
        output: PathBuf,

        /// Run report (pretty JSON). Defaults to stdout.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Divide data calibration curves by simulation curves, group by group
    Ratio {
        /// Curves profiled from data (output of `profile`)
        #[arg(long)]
        data: PathBuf,

        /// Curves profiled from simulation (output of `profile`)
        #[arg(long)]
        mc: PathBuf,

        /// Output object file with curve ratios
        #[arg(short, long)]
        output: PathBuf,

        /// Run report (pretty JSON). Defaults to stdout.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the objects in a file
    Inspect {
        /// Object file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fill { config, input, output, report } => {
            cmd_fill(&config, &input, &output, report.as_ref())
        }
        Commands::Merge { inputs, file_list, output, keep_axes, n_planes, report } => cmd_merge(
            inputs,
            file_list.as_deref(),
            &output,
            keep_axes,
            n_planes,
            report.as_ref(),
        ),
        Commands::Profile { config, input, output, threads, report } => {
            cmd_profile(&config, &input, &output, threads, report.as_ref())
        }
        Commands::ProfileGrid { config, input, output, report } => {
            cmd_profile_grid(&config, &input, &output, report.as_ref())
        }
        Commands::Ratio { data, mc, output, report } => cmd_ratio(&data, &mc, &output, report.as_ref()),
        Commands::Inspect { input, output } => cmd_inspect(&input, output.as_ref()),
        Commands::Version => {
            println!("larcal {}", lc_core::VERSION);
            Ok(())
        }
    }
}

fn read_hits(path: &Path) -> Result<impl Iterator<Item = lc_core::Result<Hit>>> {
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("cannot open hit stream {}: {e}", path.display()))?;
    let lines = std::io::BufReader::new(file).lines().enumerate();
    Ok(lines.filter_map(|(n, line)| match line {
        Err(e) => Some(Err(lc_core::Error::Io(e))),
        Ok(l) if l.trim().is_empty() => None,
        Ok(l) => Some(serde_json::from_str::<Hit>(&l).map_err(|e| {
            lc_core::Error::Validation(format!("hit stream line {}: {e}", n + 1))
        })),
    }))
}

fn cmd_fill(config: &Path, input: &Path, output: &Path, report: Option<&PathBuf>) -> Result<()> {
    let cfg = config::read_config(config)?;
    let mut filler = HitFiller::new(cfg.fill_spec()?, cfg.n_planes)?;
    for c in cfg.corrections() {
        tracing::info!(correction = c.name(), "charge correction enabled");
        filler = filler.with_correction(c);
    }

    tracing::info!(path = %input.display(), "filling");
    filler.fill_all(read_hits(input)?)?;
    let (set, stats) = filler.finish();

    let mut file = ObjectFile::new();
    set.write_to(&mut file)?;
    file.set_attribute("fill_stats", serde_json::to_value(stats)?);
    file.save(output)?;

    let groups: Vec<String> = set.groups().map(|g| set.object_name(&g)).collect();
    write_json(
        report,
        serde_json::json!({
            "command": "fill",
            "output": output.display().to_string(),
            "groups": groups,
            "stats": stats,
        }),
    )
}

fn read_file_list(path: &Path) -> Result<Vec<PathBuf>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

fn cmd_merge(
    inputs: Vec<PathBuf>,
    file_list: Option<&Path>,
    output: &Path,
    keep_axes: Option<Vec<usize>>,
    n_planes: u16,
    report: Option<&PathBuf>,
) -> Result<()> {
    let paths = match file_list {
        Some(list) => read_file_list(list)?,
        None => inputs,
    };
    tracing::info!(inputs = paths.len(), "merging");
    let opts = MergeOptions { keep_axes };
    let outcome = merge_all(paths.iter().map(|p| FileSource::new(p, n_planes)), &opts)?;

    let mut file = ObjectFile::new();
    outcome.merged.write_to(&mut file)?;
    file.set_attribute("sources_merged", serde_json::json!(outcome.sources_merged));
    file.save(output)?;

    write_json(
        report,
        serde_json::json!({
            "command": "merge",
            "output": output.display().to_string(),
            "sources_seen": outcome.sources_seen,
            "sources_merged": outcome.sources_merged,
            "groups": outcome.merged.len(),
            "skipped": outcome.skipped,
        }),
    )
}

fn load_set(input: &Path, default_n_planes: u16) -> Result<HistogramSet> {
    tracing::info!(path = %input.display(), "loading histograms");
    let set = HistogramSet::read_from(&ObjectFile::open(input)?, default_n_planes)?;
    if set.is_empty() {
        tracing::warn!(path = %input.display(), "no group histograms in input");
    }
    Ok(set)
}

fn cmd_profile(
    config: &Path,
    input: &Path,
    output: &Path,
    threads: usize,
    report: Option<&PathBuf>,
) -> Result<()> {
    let cfg = config::read_config(config)?;
    let (section, pcfg) = cfg.profile_config()?;
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }

    let mut set = load_set(input, cfg.n_planes)?;
    let profiles = profile_groups(&mut set, section.profile_axis, &section.projection_axes, &pcfg)?;

    let mut file = ObjectFile::new();
    file.set_attribute("n_planes", serde_json::json!(set.n_planes()));
    let mut groups = Vec::new();
    for (g, results) in &profiles.results {
        let dir = set.object_name(g);
        let mut curves = Vec::new();
        for (i, r) in results.iter().enumerate() {
            let c = &r.curve;
            if i == 0 {
                file.put(format!("{dir}/summary_dim{}", c.profile_axis), &r.summary)?;
            }
            file.put(format!("{dir}/curve_dim{}_{}", c.profile_axis, c.projection_axis), c)?;
            for (p, proj) in c.points.iter().zip(&r.projections) {
                let name = format!("{dir}/proj_dim{}_{}_{}", c.projection_axis, p.first_bin, p.last_bin);
                file.put(name, proj)?;
            }
            let skipped: Vec<_> = c
                .points
                .iter()
                .filter_map(|p| {
                    p.skipped.as_ref().map(|reason| {
                        serde_json::json!({ "low": p.low, "high": p.high, "reason": reason })
                    })
                })
                .collect();
            curves.push(serde_json::json!({
                "projection_axis": c.projection_axis,
                "points": c.len(),
                "unconverged": c.n_unconverged(),
                "skipped": skipped,
            }));
        }
        groups.push(serde_json::json!({ "group": dir, "curves": curves }));
    }
    file.save(output)?;

    let failures: Vec<_> = profiles
        .failures
        .iter()
        .map(|(g, reason)| serde_json::json!({ "group": set.object_name(g), "reason": reason }))
        .collect();
    write_json(
        report,
        serde_json::json!({
            "command": "profile",
            "output": output.display().to_string(),
            "profile_axis": section.profile_axis,
            "groups": groups,
            "failures": failures,
        }),
    )
}

fn cmd_profile_grid(config: &Path, input: &Path, output: &Path, report: Option<&PathBuf>) -> Result<()> {
    let cfg = config::read_config(config)?;
    let grid = cfg.grid_config()?;
    let est = cfg.estimator_config();
    let mut set = load_set(input, cfg.n_planes)?;

    let mut file = ObjectFile::new();
    file.set_attribute("n_planes", serde_json::json!(set.n_planes()));
    let mut groups = Vec::new();
    let mut failures = Vec::new();
    let n_planes = set.n_planes();
    for (g, h) in set.iter_mut() {
        let dir = g.object_name(n_planes);
        match profile_grid(h, &grid, &est) {
            Ok(gp) => {
                let skipped = gp.points.iter().filter(|p| p.skipped.is_some()).count();
                file.put(
                    format!("{dir}/grid_dim{}_{}_{}", grid.x_axis, grid.y_axis, grid.projection_axis),
                    &gp,
                )?;
                groups.push(serde_json::json!({ "group": dir, "blocks": gp.points.len(), "skipped": skipped }));
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(group = %g, error = %e, "skipping group");
                failures.push(serde_json::json!({ "group": dir, "reason": e.to_string() }));
            }
            Err(e) => return Err(e.into()),
        }
    }
    file.save(output)?;

    write_json(
        report,
        serde_json::json!({
            "command": "profile-grid",
            "output": output.display().to_string(),
            "groups": groups,
            "failures": failures,
        }),
    )
}

fn cmd_ratio(data: &Path, mc: &Path, output: &Path, report: Option<&PathBuf>) -> Result<()> {
    let data_file = ObjectFile::open(data)?;
    let mc_file = ObjectFile::open(mc)?;

    let mut file = ObjectFile::new();
    if let Some(n) = data_file.attribute("n_planes") {
        file.set_attribute("n_planes", n.clone());
    }
    let mut ratios = Vec::new();
    let mut failures = Vec::new();
    for key in data_file.list_keys() {
        if key.class_name != <CalibrationCurve as lc_hist::StoredObject>::CLASS_NAME {
            continue;
        }
        let Some((dir, leaf)) = key.name.rsplit_once('/') else { continue };
        let Some(dims) = leaf.strip_prefix("curve_dim") else { continue };

        let result = data_file.get::<CalibrationCurve>(&key.name).and_then(|d| {
            let m = mc_file.get::<CalibrationCurve>(&key.name)?;
            curve_ratio(&d, &m)
        });
        match result {
            Ok(r) => {
                let name = format!("{dir}/ratio_dim{dims}");
                file.put(&name, &r)?;
                let skipped: Vec<_> = r
                    .points
                    .iter()
                    .filter_map(|p| {
                        p.skipped.as_ref().map(|reason| {
                            serde_json::json!({ "low": p.low, "high": p.high, "reason": reason })
                        })
                    })
                    .collect();
                ratios.push(serde_json::json!({ "name": name, "points": r.len(), "skipped": skipped }));
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(curve = %key.name, error = %e, "skipping curve");
                failures.push(serde_json::json!({ "curve": key.name, "reason": e.to_string() }));
            }
            Err(e) => return Err(e.into()),
        }
    }
    if ratios.is_empty() {
        tracing::warn!(data = %data.display(), mc = %mc.display(), "no curve ratios produced");
    }
    file.save(output)?;

    write_json(
        report,
        serde_json::json!({
            "command": "ratio",
            "output": output.display().to_string(),
            "ratios": ratios,
            "failures": failures,
        }),
    )
}

fn cmd_inspect(input: &Path, output: Option<&PathBuf>) -> Result<()> {
    let file = ObjectFile::open(input)?;
    let keys: Vec<_> = file
        .list_keys()
        .into_iter()
        .map(|k| serde_json::json!({ "name": k.name, "class_name": k.class_name }))
        .collect();
    write_json(output, serde_json::json!({ "attributes": file.attributes(), "keys": keys }))
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
