use std::path::{Path, PathBuf};

use argh::FromArgs;
use indicatif::{ProgressBar, ProgressStyle};

use chubaca::k3d::io::{obj::read_obj_mesh, openmvg, pcd::read_pcd};
use chubaca::reproject::annotation::{read_report, Report};
use chubaca::reproject::frames::{list_rendered_frames, list_videos};
use chubaca::reproject::geomorphometrics::generate_metric_clouds;
use chubaca::reproject::hitmap::generate_hit_maps;
use chubaca::reproject::mapper::reproject_frames;
use chubaca::reproject::stats::stat_summary;
use chubaca::reproject::tables::{read_polygons_csv, summary_path, write_summary_csv, SummaryKind};
use chubaca::reproject::tracks::resolve_tracks;
use chubaca::reproject::{ReprojectError, ReprojectionConfig, RunControl};

#[derive(FromArgs, Debug)]
/// Reproject image and video annotations onto a photogrammetry mesh.
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Command {
    HitMaps(HitMapsArgs),
    Reproject(ReprojectArgs),
    VolumeStats(VolumeStatsArgs),
    Geomorphometrics(GeomorphometricsArgs),
}

#[derive(FromArgs, Debug)]
/// Render the hit map of every camera of a reconstruction.
#[argh(subcommand, name = "hit-maps")]
struct HitMapsArgs {
    /// path to the OBJ mesh
    #[argh(option, short = 'm')]
    mesh: PathBuf,

    /// path to the OpenMVG sfm_data.json
    #[argh(option, short = 's')]
    sfm: PathBuf,

    /// directory receiving the hit maps
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// number of threads, one per core by default
    #[argh(option, short = 'n')]
    threads: Option<usize>,

    /// path to a JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

#[derive(FromArgs, Debug)]
/// Map the annotations of a report onto the rendered frames.
#[argh(subcommand, name = "reproject")]
struct ReprojectArgs {
    /// path to the image or video annotation report
    #[argh(option, short = 'r')]
    report: PathBuf,

    /// directory holding the hit maps
    #[argh(option, short = 'm')]
    hit_maps: PathBuf,

    /// directory receiving the points, lines and polygons tables
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// directory holding the source videos of a video report
    #[argh(option, short = 'v')]
    videos: Option<PathBuf>,

    /// only keep the whole-frame video tracks
    #[argh(switch)]
    wholeframe_only: bool,

    /// path to a JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

#[derive(FromArgs, Debug)]
/// Summarize point cloud fields inside the reprojected polygons.
#[argh(subcommand, name = "volume-stats")]
struct VolumeStatsArgs {
    /// path to the polygons table
    #[argh(option, short = 'p')]
    polygons: PathBuf,

    /// path to a PCD point cloud, repeat for several clouds
    #[argh(option, short = 'i')]
    clouds: Vec<PathBuf>,

    /// directory receiving the summary tables
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// only summarize the annotation tracks
    #[argh(switch)]
    video_tracks_only: bool,

    /// name of the report used in the summary file names
    #[argh(option, default = "String::from(\"report\")")]
    name: String,

    /// path to a JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

#[derive(FromArgs, Debug)]
/// Sample the mesh and write one terrain metric cloud per scale.
#[argh(subcommand, name = "geomorphometrics")]
struct GeomorphometricsArgs {
    /// path to the OBJ mesh
    #[argh(option, short = 'm')]
    mesh: PathBuf,

    /// directory receiving the metric clouds, next to the mesh by default
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// neighbourhood radius, repeat for several scales
    #[argh(option, short = 's')]
    scales: Vec<f64>,

    /// path to a JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<ReprojectionConfig, ReprojectError> {
    match path {
        Some(path) => Ok(ReprojectionConfig::from_json_file(path)?),
        None => Ok(ReprojectionConfig::default()),
    }
}

fn progress_bar(message: &'static str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("##>-"),
    );
    pb.set_message(message);
    Ok(pb)
}

// Ctrl-C raises the abort flag, the running stage stops at its next unit of work
fn run_control(pb: &ProgressBar) -> Result<RunControl, Box<dyn std::error::Error>> {
    let control = RunControl::new().on_progress({
        let pb = pb.clone();
        move |percent| pb.set_position(percent.round() as u64)
    });
    ctrlc::set_handler({
        let abort = control.abort_flag();
        move || {
            log::warn!("Received Ctrl-C signal, stopping");
            abort.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    })?;
    Ok(control)
}

fn hit_maps(args: HitMapsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(threads) = args.threads {
        config.hit_maps.num_threads = threads;
    }

    let mesh = read_obj_mesh(&args.mesh)?;
    let cameras = openmvg::read_openmvg_sfm(
        &args.sfm,
        &openmvg::SfmReadOptions {
            suppress_distortion_warnings: config.hit_maps.suppress_distortion_warnings,
        },
    )?;
    println!(
        "🚀 Rendering {} cameras over {} triangles",
        cameras.len(),
        mesh.num_faces()
    );

    let pb = progress_bar("hit maps")?;
    let control = run_control(&pb)?;
    let batch = generate_hit_maps(&mesh, &cameras, &args.output, &config.hit_maps, &control)?;
    pb.finish();

    for (camera, error) in &batch.failed {
        log::error!("{camera}: {error}");
    }
    if batch.aborted {
        return Err(ReprojectError::Aborted.into());
    }
    println!(
        "🔥 Wrote {} hit maps to {}, {} failed",
        batch.written.len(),
        args.output.display(),
        batch.failed.len()
    );
    Ok(())
}

fn reproject(args: ReprojectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_deref())?;
    config.tracks.wholeframe_only |= args.wholeframe_only;

    let frames = list_rendered_frames(&args.hit_maps)?;

    let annotations = match read_report(&args.report)? {
        Report::Image(annotations) => annotations,
        Report::Video(tracks) => {
            let Some(video_dir) = args.videos.as_deref() else {
                return Err("a video report needs the --videos directory".into());
            };
            let videos = list_videos(video_dir)?;
            resolve_tracks(&tracks, &frames, &videos, &config.tracks)
        }
    };
    println!(
        "🚀 Reprojecting {} annotations over {} frames",
        annotations.len(),
        frames.len()
    );

    let pb = progress_bar("frames")?;
    let control = run_control(&pb)?;
    let tables = reproject_frames(&frames, &annotations, &config, &control)?;
    pb.finish();

    std::fs::create_dir_all(&args.output)?;
    let paths = tables.write_csv(&args.output)?;
    println!(
        "🔥 Wrote {} points, {} lines and {} polygons",
        tables.points.len(),
        tables.lines.len(),
        tables.polygons.len()
    );
    for path in paths {
        log::info!("wrote {}", path.display());
    }
    Ok(())
}

fn volume_stats(args: VolumeStatsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_deref())?;
    config.stats.video_tracks_only |= args.video_tracks_only;

    if args.clouds.is_empty() {
        return Err("at least one --clouds path is required".into());
    }

    let polygons = read_polygons_csv(&args.polygons)?;
    std::fs::create_dir_all(&args.output)?;

    let pb = progress_bar("volumes")?;
    let control = run_control(&pb)?;
    for cloud_path in &args.clouds {
        let cloud = read_pcd(cloud_path)?;
        let cloud_name = cloud_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("cloud");
        pb.set_message(cloud_name.to_string());
        pb.set_position(0);

        let summaries = stat_summary(&cloud, &polygons, &config.volume, &config.stats, &control)?;

        let tracks = summary_path(&args.output, cloud_name, &args.name, SummaryKind::Tracks);
        write_summary_csv(&tracks, &summaries.tracks)?;
        if !config.stats.video_tracks_only {
            let polys = summary_path(&args.output, cloud_name, &args.name, SummaryKind::Polygons);
            write_summary_csv(&polys, &summaries.polygons)?;
        }
        log::info!(
            "{cloud_name}: {} track rows, {} polygon rows",
            summaries.tracks.len(),
            summaries.polygons.len()
        );
    }
    pb.finish();

    println!("🔥 Wrote the summaries of {} clouds", args.clouds.len());
    Ok(())
}

fn geomorphometrics(args: GeomorphometricsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if !args.scales.is_empty() {
        config.geomorphometry.scales = args.scales;
        config.validate()?;
    }

    let output = match args.output {
        Some(output) => output,
        None => args
            .mesh
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    let mesh = read_obj_mesh(&args.mesh)?;
    println!(
        "🚀 Computing terrain metrics at {} scales over {} triangles",
        config.geomorphometry.scales.len(),
        mesh.num_faces()
    );

    let pb = progress_bar("scales")?;
    let control = run_control(&pb)?;
    let batch = generate_metric_clouds(&mesh, &output, &config.geomorphometry, &control)?;
    pb.finish();

    for (scale, error) in &batch.failed {
        log::error!("scale {scale}: {error}");
    }
    if batch.aborted {
        return Err(ReprojectError::Aborted.into());
    }
    println!(
        "🔥 Wrote {} metric clouds to {}, {} failed",
        batch.written.len(),
        output.display(),
        batch.failed.len()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    match args.command {
        Command::HitMaps(args) => hit_maps(args),
        Command::Reproject(args) => reproject(args),
        Command::VolumeStats(args) => volume_stats(args),
        Command::Geomorphometrics(args) => geomorphometrics(args),
    }
}
