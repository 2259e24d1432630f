use approx::assert_relative_eq;
use parry3d_f64::shape::SharedShape;
use scansim::dataset::{GROUND_TRUTH_FILE, read_ground_truth, read_scan_csv, scan_file_name};
use scansim::na::Matrix3;
use scansim::visualize::{DebugVisualizer, VisualizationRequest};
use scansim::{
    CancelToken, DatasetGenerator, FieldOfView, GeometryOracle, Iso3, Position, Resolution,
    RunConfig, ScanError, Scene, SetupViewRenderer, Vector3,
};
use std::path::{Path, PathBuf};

fn config(dir: &Path, samples: usize) -> RunConfig {
    let mut c = RunConfig::new(
        Resolution::new(16, 12).unwrap(),
        FieldOfView::new(60.0, 45.0).unwrap(),
        Position::new(0.0, 0.0, 5.0),
        samples,
        dir.to_path_buf(),
    );
    c.seed = Some(1234);
    c.max_range_m = 10.0;
    c
}

fn plane_scene() -> Scene {
    let mut scene = Scene::new();
    scene.add(
        "Plane",
        SharedShape::halfspace(Vector3::z_axis()),
        Iso3::identity(),
    );
    scene
}

fn read_all(dir: &Path) -> Vec<(String, String)> {
    let mut files = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "csv"))
        .map(|p| {
            (
                p.file_name().unwrap().to_string_lossy().to_string(),
                std::fs::read_to_string(&p).unwrap(),
            )
        })
        .collect::<Vec<_>>();
    files.sort();
    files
}

#[test]
fn one_row_per_sample_with_rigid_transforms() {
    let dir = tempfile::tempdir().unwrap();
    let scene = Scene::default_cube();
    let mut c = config(dir.path(), 12);
    c.translation_range_m = 0.5;

    let generator = DatasetGenerator::new(c, &scene, &scene).unwrap();
    let summary = generator.run(None, &CancelToken::new()).unwrap();

    assert_eq!(summary.samples, 12);
    assert_eq!(summary.seed, 1234);
    assert_eq!(summary.ground_truth, dir.path().join(GROUND_TRUTH_FILE));
    assert!(dir.path().join("run_config.json").exists());

    let gt = read_ground_truth(&summary.ground_truth).unwrap();
    assert!(gt.settings.starts_with("Res=16x12, FOV=60x45, Pos=0,0,5, Range=10"));
    assert!(gt.settings.ends_with("Seed=1234"));
    assert_eq!(gt.records.len(), 12);

    let mut points = 0;
    for (i, r) in gt.records.iter().enumerate() {
        assert_eq!(r.sample_id, i);
        assert_eq!(r.filename, scan_file_name(i));

        let rot: Matrix3<f64> = r.matrix.fixed_view::<3, 3>(0, 0).into_owned();
        assert_relative_eq!(rot.transpose() * rot, Matrix3::identity(), epsilon = 1e-5);
        assert_relative_eq!(rot.determinant(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(r.matrix[(3, 3)], 1.0);
        assert_relative_eq!(r.matrix[(0, 3)], r.pose.tx, epsilon = 1e-6);

        let cloud = read_scan_csv(&dir.path().join(&r.filename)).unwrap();
        assert!(cloud.len() <= 16 * 12);
        points += cloud.len();
    }
    assert_eq!(points, summary.total_points);
    assert!(points > 0);
}

#[test]
fn zero_ranges_record_identity() {
    let dir = tempfile::tempdir().unwrap();
    let scene = Scene::default_cube();
    let mut c = config(dir.path(), 5);
    c.rotation_range_deg = 0.0;
    c.translation_range_m = 0.0;

    let summary = DatasetGenerator::new(c, &scene, &scene)
        .unwrap()
        .run(None, &CancelToken::new())
        .unwrap();

    let text = std::fs::read_to_string(&summary.ground_truth).unwrap();
    let rows = text.lines().skip(2).collect::<Vec<_>>();
    assert_eq!(rows.len(), 5);
    for (i, row) in rows.iter().enumerate() {
        let expected = format!(
            "{i},scan_{i:04}.csv,0.000000,0.000000,0.000000,0.000000,0.000000,0.000000,\
             1.000000,0.000000,0.000000,0.000000,\
             0.000000,1.000000,0.000000,0.000000,\
             0.000000,0.000000,1.000000,0.000000,\
             0.000000,0.000000,0.000000,1.000000"
        );
        assert_eq!(*row, expected);
    }

    // Every scan of the unmoved cube is the same
    let first = std::fs::read_to_string(dir.path().join("scan_0000.csv")).unwrap();
    let last = std::fs::read_to_string(dir.path().join("scan_0004.csv")).unwrap();
    assert_eq!(first, last);
}

#[test]
fn plane_scenario_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let scene = plane_scene();
    let mut c = RunConfig::new(
        Resolution::new(4, 4).unwrap(),
        FieldOfView::new(90.0, 90.0).unwrap(),
        Position::new(0.0, 0.0, 5.0),
        2,
        dir.path().to_path_buf(),
    );
    c.target = "Plane".to_string();
    c.rotation_range_deg = 0.0;
    c.max_range_m = 10.0;
    c.seed = Some(0);

    DatasetGenerator::new(c, &scene, &scene)
        .unwrap()
        .run(None, &CancelToken::new())
        .unwrap();

    let t = (std::f64::consts::PI / 8.0).tan();
    let offsets = [-1.0, -t, 0.0, t];
    let cloud = read_scan_csv(&dir.path().join("scan_0001.csv")).unwrap();
    assert_eq!(cloud.len(), 16);
    for (k, p) in cloud.iter().enumerate() {
        assert_relative_eq!(p.x, 5.0 * offsets[k % 4], epsilon = 1e-6);
        assert_relative_eq!(p.y, 5.0 * offsets[k / 4], epsilon = 1e-6);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-6);
    }
}

#[test]
fn same_seed_same_dataset() {
    let scene = Scene::default_cube();
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();

    for dir in [a.path(), b.path()] {
        let mut c = config(dir, 6);
        c.noise_std_dev_m = 0.002;
        c.translation_range_m = 0.3;
        DatasetGenerator::new(c, &scene, &scene)
            .unwrap()
            .run(None, &CancelToken::new())
            .unwrap();
    }

    assert_eq!(read_all(a.path()), read_all(b.path()));
}

#[test]
fn parallel_samples_match_serial() {
    let scene = Scene::default_cube();
    let serial = tempfile::tempdir().unwrap();
    let parallel = tempfile::tempdir().unwrap();

    for (dir, par) in [(serial.path(), false), (parallel.path(), true)] {
        let mut c = config(dir, 40);
        c.noise_std_dev_m = 0.001;
        c.parallel_samples = par;
        c.parallel_rays = !par;
        DatasetGenerator::new(c, &scene, &scene)
            .unwrap()
            .run(None, &CancelToken::new())
            .unwrap();
    }

    let s = read_all(serial.path());
    assert_eq!(s.len(), 41);
    assert_eq!(s, read_all(parallel.path()));
}

#[test]
fn missing_target_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("never_created");
    let scene = Scene::default_cube();
    let mut c = config(&out, 3);
    c.target = "Monkey".to_string();

    let err = DatasetGenerator::new(c, &scene, &scene).err().unwrap();
    assert!(matches!(err, ScanError::NotFound(ref n) if n == "Monkey"));
    assert!(err.is_configuration());
    assert!(!out.exists());
}

#[test]
fn degenerate_look_at_is_rejected_before_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let scene = Scene::default_cube();
    let mut c = config(dir.path(), 3);
    c.sensor_position = Position::new(0.0, 0.0, 0.0);

    let err = DatasetGenerator::new(c, &scene, &scene).err().unwrap();
    assert!(matches!(err, ScanError::DegenerateLookAt { .. }));
}

#[test]
fn cancelled_run_leaves_no_valid_table() {
    let dir = tempfile::tempdir().unwrap();
    let scene = Scene::default_cube();
    let generator = DatasetGenerator::new(config(dir.path(), 5), &scene, &scene).unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = generator.run(None, &cancel).unwrap_err();

    assert!(matches!(
        err,
        ScanError::Cancelled {
            completed: 0,
            requested: 5
        }
    ));
    assert!(!dir.path().join(GROUND_TRUTH_FILE).exists());
    assert!(dir.path().join("ground_truth.csv.partial").exists());
}

#[test]
fn failed_rerun_does_not_leave_previous_table() {
    let dir = tempfile::tempdir().unwrap();
    let scene = Scene::default_cube();

    let mut first = config(dir.path(), 3);
    first.seed = Some(1);
    DatasetGenerator::new(first, &scene, &scene)
        .unwrap()
        .run(None, &CancelToken::new())
        .unwrap();
    assert!(dir.path().join(GROUND_TRUTH_FILE).exists());

    let mut second = config(dir.path(), 3);
    second.seed = Some(99);
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = DatasetGenerator::new(second, &scene, &scene)
        .unwrap()
        .run(None, &cancel)
        .unwrap_err();

    assert!(matches!(err, ScanError::Cancelled { .. }));
    assert!(!dir.path().join(GROUND_TRUTH_FILE).exists());
    assert!(dir.path().join("ground_truth.csv.partial").exists());
}

#[test]
fn adjacent_seeds_give_different_datasets() {
    let scene = Scene::default_cube();
    let runs = [1u64, 2].map(|seed| {
        let dir = tempfile::tempdir().unwrap();
        let mut c = config(dir.path(), 6);
        c.seed = Some(seed);
        c.translation_range_m = 0.5;
        let summary = DatasetGenerator::new(c, &scene, &scene)
            .unwrap()
            .run(None, &CancelToken::new())
            .unwrap();
        let gt = read_ground_truth(&summary.ground_truth).unwrap();
        gt.records.into_iter().map(|r| r.pose).collect::<Vec<_>>()
    });

    for pose in runs[0].iter() {
        assert!(!runs[1].contains(pose));
    }
}

#[test]
fn target_starts_at_its_scene_placement() {
    let mut scene = Scene::new();
    scene.add(
        "Cube",
        SharedShape::cuboid(1.0, 1.0, 1.0),
        Iso3::translation(0.0, 1.5, 0.0),
    );
    let dir = tempfile::tempdir().unwrap();
    let generator = DatasetGenerator::new(config(dir.path(), 1), &scene, &scene).unwrap();
    assert_relative_eq!(generator.target().pose().ty, 1.5, epsilon = 1e-12);
}

#[test]
fn unwritable_output_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, "x").unwrap();

    let scene = Scene::default_cube();
    let generator = DatasetGenerator::new(config(&blocker, 2), &scene, &scene).unwrap();
    let err = generator.run(None, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, ScanError::Io(_)));
}

struct BrokenVisualizer;

impl DebugVisualizer for BrokenVisualizer {
    fn render(
        &self,
        _oracle: &dyn GeometryOracle,
        _request: &VisualizationRequest<'_>,
    ) -> scansim::Result<Vec<PathBuf>> {
        Err(ScanError::Visualization("no display".to_string()))
    }
}

#[test]
fn visualization_failure_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let scene = Scene::default_cube();
    let mut c = config(dir.path(), 2);
    c.visualize = true;

    let summary = DatasetGenerator::new(c, &scene, &scene)
        .unwrap()
        .run(Some(&BrokenVisualizer), &CancelToken::new())
        .unwrap();
    assert!(summary.debug_views.is_empty());
    assert!(summary.ground_truth.exists());
}

#[test]
fn debug_views_are_written_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let scene = Scene::default_cube();
    let mut c = config(dir.path(), 1);
    c.visualize = true;

    let renderer = SetupViewRenderer {
        resolution: Resolution::new(40, 30).unwrap(),
        ..Default::default()
    };
    let summary = DatasetGenerator::new(c, &scene, &scene)
        .unwrap()
        .run(Some(&renderer), &CancelToken::new())
        .unwrap();

    assert_eq!(summary.debug_views.len(), 4);
    for name in ["iso", "front", "right", "top"] {
        assert!(dir.path().join(format!("setup_view_{name}.png")).exists());
    }
}
