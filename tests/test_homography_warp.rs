use geodrape::core::homography::{compute_homography, project, HomographyParams};
use geodrape::core::pipeline::{DrapePipeline, GateStatus, UpdateGate, UpdateOutcome};
use geodrape::core::warp::{source_quad, HomographyWarper, WarpFilter, WarpParams};
use geodrape::core::FootprintParams;
use geodrape::io::{MetadataTimeline, TelemetryField};
use geodrape::types::{DrapeError, Quad, Raster, TRANSPARENT};
use ndarray::Array2;

/// Deterministic convex-ish quads inside a 512x512 raster
fn sample_quads() -> Vec<Quad> {
    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = move |lo: f64, hi: f64| {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        lo + (state % 10_000) as f64 / 10_000.0 * (hi - lo)
    };
    (0..50)
        .map(|_| {
            [
                [next(0.0, 200.0), next(0.0, 200.0)],
                [next(312.0, 512.0), next(0.0, 200.0)],
                [next(312.0, 512.0), next(312.0, 512.0)],
                [next(0.0, 200.0), next(312.0, 512.0)],
            ]
        })
        .collect()
}

fn gradient(width: usize, height: usize) -> Raster {
    Array2::from_shape_fn((height, width), |(r, c)| {
        [(c * 255 / width.max(1)) as u8, (r * 255 / height.max(1)) as u8, 128, 255]
    })
}

#[test]
fn test_homography_reproduces_destination_corners() {
    let params = HomographyParams::default();
    for (w, h) in [(1.0, 1.0), (640.0, 480.0), (1920.0, 1080.0)] {
        let src: Quad = [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]];
        for dst in sample_quads() {
            let matrix = compute_homography(&src, &dst, &params).unwrap();
            for i in 0..4 {
                let p = project(&matrix, src[i]).unwrap();
                for k in 0..2 {
                    let rel = (p[k] - dst[i][k]).abs() / dst[i][k].abs().max(1.0);
                    assert!(rel < 1e-6, "corner {} axis {}: {} vs {}", i, k, p[k], dst[i][k]);
                }
            }
        }
    }
}

#[test]
fn test_collinear_correspondences_fail_cleanly() {
    let src = source_quad(640, 480);
    let cases: [Quad; 3] = [
        [[0.0, 0.0], [10.0, 10.0], [20.0, 20.0], [30.0, 30.0]],
        [[5.0, 100.0], [50.0, 100.0], [400.0, 100.0], [500.0, 100.0]],
        [[1.0, 1.0], [1.0, 1.0], [300.0, 300.0], [300.0, 300.0]],
    ];
    for dst in &cases {
        match compute_homography(&src, dst, &HomographyParams::default()) {
            Err(DrapeError::SingularMatrix { .. }) | Err(DrapeError::DegenerateQuad(_)) => {}
            other => panic!("expected failure for {:?}, got {:?}", dst, other),
        }
    }
}

#[test]
fn test_warp_inside_and_outside_quad() {
    let source = gradient(64, 48);
    let warper = HomographyWarper::new(WarpParams::default(), 256, 256);
    let quad = [[40.0, 20.0], [220.0, 60.0], [200.0, 230.0], [30.0, 180.0]];
    let out = warper.warp(&source, &quad).unwrap();

    assert_eq!(out[[5, 5]], TRANSPARENT);
    assert_eq!(out[[250, 250]], TRANSPARENT);
    // near the top-left corner the sample comes from the source's top-left
    let near_tl = out[[24, 44]];
    assert_eq!(near_tl[3], 255);
    assert!(near_tl[0] < 40 && near_tl[1] < 40);
    // near the bottom-right corner it comes from the source's bottom-right
    let near_br = out[[222, 198]];
    assert_eq!(near_br[3], 255);
    assert!(near_br[0] > 200 && near_br[1] > 200);
}

#[test]
fn test_sobel_background_fills_quad_interior() {
    let source = Array2::from_elem((32, 32), [90, 90, 90, 255]);
    let params = WarpParams {
        filter: WarpFilter::sobel(),
        background: [0, 0, 0, 255],
        ..WarpParams::default()
    };
    let warper = HomographyWarper::new(params, 64, 64);
    let out = warper.warp(&source, &source_quad(64, 64)).unwrap();
    // uniform source has no edges: every pixel shows the background
    assert!(out.iter().all(|p| *p == [0, 0, 0, 255]));
}

#[test]
fn test_timeline_driven_pipeline_with_gate() {
    let _ = env_logger::builder().is_test(true).try_init();

    let records: String = (0..10)
        .map(|i| {
            // elevation sweeps from looking down to above the horizon
            let elevation = -70.0 + i as f64 * 10.0;
            format!(
                "{{\"#ts\": {}, \"Sensor Latitude\": 45.0, \"Sensor Longitude\": 10.0, \
                 \"Sensor True Altitude\": 3000.0, \"Platform Heading Angle\": {}, \
                 \"Sensor Relative Elevation Angle\": {}, \
                 \"Sensor Horizontal Field of View\": 20.0, \"Sensor Vertical Field of View\": 10.0}}\n",
                i as f64 * 0.5,
                i as f64 * 15.0,
                elevation
            )
        })
        .collect();
    let mut timeline = MetadataTimeline::new();
    assert_eq!(timeline.load(records.as_bytes()).unwrap(), 10);

    let source = gradient(80, 60);
    let mut pipeline = DrapePipeline::ellipsoid(FootprintParams::default(), WarpParams::default(), 128, 128);
    let gate = UpdateGate::new();
    let mut outcomes = Vec::new();

    for t in [0.1, 1.2, 2.6, 4.4] {
        let frame = timeline.get(t).unwrap().clone();
        let status = gate.submit(frame, |f| {
            let elevation = f.get(TelemetryField::SensorRelativeElevationAngle);
            outcomes.push((elevation, pipeline.update(&f, &source)));
        });
        assert_eq!(status, GateStatus::Completed { runs: 1 });
    }

    // 0.1 -> -70, 1.2 -> -50, 2.6 -> -20, 4.4 -> +20
    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[0], (-70.0, UpdateOutcome::Warped { generation: 1 }));
    assert_eq!(outcomes[1], (-50.0, UpdateOutcome::Warped { generation: 2 }));
    assert_eq!(outcomes[2], (-20.0, UpdateOutcome::Warped { generation: 3 }));
    assert_eq!(outcomes[3], (20.0, UpdateOutcome::NoFootprint));

    // the last good raster is still exposed
    let front = pipeline.front().unwrap();
    assert!(front.iter().any(|p| p[3] == 255));
    assert!(pipeline.footprint().is_some());
}
