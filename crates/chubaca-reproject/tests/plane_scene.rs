use std::path::PathBuf;

use chubaca_3d::camera::{Camera, CameraIntrinsics, RadialDistortion};
use chubaca_3d::mesh::TriangleMesh;
use chubaca_3d::pointcloud::PointCloud;
use chubaca_reproject::annotation::{read_report, Report};
use chubaca_reproject::config::HitMapConfig;
use chubaca_reproject::frames::list_rendered_frames;
use chubaca_reproject::hitmap::generate_hit_maps;
use chubaca_reproject::mapper::{reproject_frames, BOUND_ID};
use chubaca_reproject::stats::stat_summary;
use chubaca_reproject::tables::{
    read_polygons_csv, summary_path, write_summary_csv, SummaryKind,
};
use chubaca_reproject::{ReprojectionConfig, RunControl};
use glam::{DMat3, DVec3};

const WIDTH: usize = 64;
const HEIGHT: usize = 48;

const REPORT: &str = "\
annotation_label_id,filename,shape_name,points,label_name,label_hierarchy,annotation_id
1,20210521T101512.250Z.jpg,Point,\"[32.5, 24.5]\",Sponge,Biota > Sponge,11
2,20210521T101512.250Z.jpg,WholeFrame,[],Sand,Substrate > Sand,12
3,20210521T101513.000Z.jpg,Polygon,\"[20, 14, 44, 14, 44, 34, 20, 34]\",Rock,Substrate > Rock,13
4,20210521T101513.000Z.jpg,Circle,\"[32.5, 24.5, 8]\",Coral,Biota > Coral,14
";

fn seafloor() -> TriangleMesh {
    let vertices = vec![
        [-50.0, -50.0, 0.0],
        [50.0, -50.0, 0.0],
        [50.0, 50.0, 0.0],
        [-50.0, 50.0, 0.0],
    ];
    TriangleMesh::new(vertices, vec![[0, 1, 2], [0, 2, 3]]).unwrap()
}

// looking straight down, image up is world +Y; a 64 px focal length sees 10 m wide from 10 m
fn nadir_camera(name: &str, center: DVec3) -> Camera {
    Camera {
        image_name: name.to_string(),
        relative_path: PathBuf::from(name),
        absolute_path: PathBuf::from(name),
        width: WIDTH,
        height: HEIGHT,
        intrinsics: CameraIntrinsics {
            focal_length: WIDTH as f64,
            principal_point: [WIDTH as f64 / 2.0, HEIGHT as f64 / 2.0],
        },
        distortion: RadialDistortion::None,
        rotation: DMat3::from_cols(
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, -1.0, 0.0),
            DVec3::new(0.0, 0.0, -1.0),
        ),
        center,
        view_index: 0,
        panoramic: false,
    }
}

// a 0.5 m grid on the seafloor whose "depth" field is the x coordinate
fn survey_cloud() -> PointCloud {
    let mut points = Vec::new();
    for i in 0..=40 {
        for j in 0..=40 {
            points.push([-4.75 + 0.5 * i as f64, -6.75 + 0.5 * j as f64, 0.0]);
        }
    }
    let depth = points.iter().map(|p| p[0]).collect();
    let mut cloud = PointCloud::new(points, None, None);
    cloud.add_field("x", vec![0.0; cloud.len()]).unwrap();
    cloud.add_field("depth", depth).unwrap();
    cloud
}

#[test]
fn test_plane_scene_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let workdir = tempfile::tempdir()?;
    let hit_map_dir = workdir.path().join("hitmaps");
    let config = ReprojectionConfig::default();
    let control = RunControl::new();

    let cameras = vec![
        nadir_camera("20210521T101513.000Z.jpg", DVec3::new(6.0, 3.0, 10.0)),
        nadir_camera("20210521T101512.250Z.jpg", DVec3::new(5.0, 3.0, 10.0)),
    ];
    let batch = generate_hit_maps(
        &seafloor(),
        &cameras,
        &hit_map_dir,
        &HitMapConfig::default(),
        &control,
    )?;
    assert_eq!(batch.written.len(), 2);
    assert!(batch.failed.is_empty());

    let frames = list_rendered_frames(&hit_map_dir)?;
    let names: Vec<&str> = frames.iter().map(|f| f.image_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["20210521T101512.250Z.jpg", "20210521T101513.000Z.jpg"]
    );

    let report_path = workdir.path().join("report.csv");
    std::fs::write(&report_path, REPORT)?;
    let Report::Image(annotations) = read_report(&report_path)? else {
        panic!("expected an image report");
    };
    assert_eq!(annotations.len(), 4);

    let tables = reproject_frames(&frames, &annotations, &config, &control)?;

    // the image centre lands under the camera
    assert_eq!(tables.points.len(), 2);
    let point = &tables.points[0];
    assert_eq!(point.annotation_id, 11);
    assert_eq!(point.radius, 0.0);
    assert!((point.point[0] - 5.0).abs() < 0.2);
    assert!((point.point[1] - 3.0).abs() < 0.2);
    assert!(point.point[2].abs() < 1e-4);

    // 8 px at 10 m with a 64 px focal length
    let circle = &tables.points[1];
    assert_eq!(circle.annotation_id, 14);
    assert!((circle.radius - 1.25).abs() < 0.1);

    let ids: Vec<i64> = tables.polygons.iter().map(|p| p.annotation_id).collect();
    assert_eq!(ids, vec![12, BOUND_ID, 13, BOUND_ID]);
    assert_eq!(tables.polygons[2].misses, 0);
    assert_eq!(tables.polygons[2].points.len(), 4);
    // the whole-frame polygon is the frame bound
    assert_eq!(tables.polygons[0].points, tables.polygons[1].points);
    assert!(tables.polygons[1].points.len() > 4);

    // pixel centres of the first frame span x in 5 +- 4.92 and y in 3 +- 3.67 on the seafloor
    let outline = &tables.polygons[0].points;
    let (mut min, mut max) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
    for p in outline {
        assert!(p[2].abs() < 1e-4);
        for k in 0..2 {
            min[k] = min[k].min(p[k]);
            max[k] = max[k].max(p[k]);
        }
    }
    assert!(min[0] > 0.0 && min[0] < 0.5, "min x {}", min[0]);
    assert!(max[0] > 9.5 && max[0] < 10.0, "max x {}", max[0]);
    assert!(min[1] > -0.75 && min[1] < -0.3, "min y {}", min[1]);
    assert!(max[1] > 6.3 && max[1] < 6.75, "max y {}", max[1]);

    let [_, _, polygons_csv] = tables.write_csv(workdir.path())?;
    let polygons = read_polygons_csv(&polygons_csv)?;
    assert_eq!(polygons, tables.polygons);

    let cloud = survey_cloud();
    let summaries = stat_summary(
        &cloud,
        &polygons,
        &config.volume,
        &config.stats,
        &control,
    )?;
    assert!(summaries.tracks.is_empty());
    assert_eq!(summaries.polygons.len(), 4);
    assert!(summaries.polygons.iter().all(|s| s.metrics_name == "depth"));

    // the rock square is centred under the second camera
    let rock = &summaries.polygons[2];
    assert_eq!(rock.track, 13);
    assert_eq!(rock.frame.as_deref(), Some("20210521T101513.000Z.jpg"));
    assert!((rock.mean - 6.0).abs() < 0.5);
    assert!(rock.q1 < rock.median && rock.median < rock.q3);

    // the first frame sees x in [0, 10]
    let sand = &summaries.polygons[0];
    assert_eq!(sand.track, 12);
    assert!(sand.q1 > min[0] && sand.q3 < max[0]);
    assert!((sand.median - 5.0).abs() < 0.5, "median {}", sand.median);
    assert_eq!(summaries.polygons[1].track, BOUND_ID);
    assert_eq!(summaries.polygons[1].mean, sand.mean);

    let path = summary_path(workdir.path(), "survey", "report", SummaryKind::Polygons);
    write_summary_csv(&path, &summaries.polygons)?;
    let written = std::fs::read_to_string(&path)?;
    assert!(written.starts_with("metrics_name,mean,sd,median,q1,q3,track,frame"));
    assert_eq!(written.lines().count(), 5);
    Ok(())
}
