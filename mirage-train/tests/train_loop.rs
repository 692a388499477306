//! End-to-end runs of the training driver on a tiny synthetic scene.

use std::fs;
use std::path::{Path, PathBuf};

use burn::backend::{Autodiff, NdArray};
use image::{Rgba, RgbaImage};
use mirage_model::NerfModelConfig;
use mirage_train::trainer::TrainError;
use mirage_train::{ScalarEvent, TrainConfig, train};
use serde_json::json;

type B = Autodiff<NdArray<f32>>;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mirage-e2e-{name}-{}", std::process::id()));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write a two-frame 4x4 scene in the on-disk layout the loader expects.
fn write_scene(dir: &Path) {
    fs::create_dir_all(dir.join("train")).unwrap();
    let pose = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 4.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    let transforms = json!({
        "camera_angle_x": 0.6911112,
        "frames": [
            { "file_path": "./train/r_0", "transform_matrix": pose },
            { "file_path": "./train/r_1", "transform_matrix": pose },
        ],
    });
    fs::write(
        dir.join("transforms_train.json"),
        serde_json::to_string_pretty(&transforms).unwrap(),
    )
    .unwrap();

    for (i, shade) in [60u8, 180u8].iter().enumerate() {
        let mut img = RgbaImage::new(4, 4);
        for px in img.pixels_mut() {
            *px = Rgba([*shade, shade / 2, 255 - shade, 255]);
        }
        img.save(dir.join(format!("train/r_{i}.png"))).unwrap();
    }
}

fn tiny_config(scene: &Path, log: &Path) -> TrainConfig {
    let model = NerfModelConfig::new()
        .with_num_samples(4)
        .with_hidden(8)
        .with_max_deg(2)
        .with_viewdirs_max_deg(1)
        .with_randomized(false);
    TrainConfig::new(
        "blender".into(),
        scene.to_str().unwrap().into(),
        log.to_str().unwrap().into(),
        model,
    )
    .with_batch_size(4)
    .with_max_steps(1)
    .with_save_every(1)
    .with_render_every(1)
    .with_lr_delay_steps(0)
    .with_n_poses(1)
    .with_render_height(4)
    .with_render_width(4)
    .with_chunks(8)
    .with_seed(7)
}

fn step0_events(events: &[ScalarEvent]) -> Vec<&ScalarEvent> {
    events.iter().filter(|e| e.step == 0).collect()
}

#[test]
fn test_single_step_run_produces_all_artifacts() {
    let root = scratch_dir("artifacts");
    let scene = root.join("scene");
    let log = root.join("log");
    write_scene(&scene);

    let config = tiny_config(&scene, &log);
    let report = train::<B>(&config, &Default::default()).unwrap();
    assert_eq!(report.final_step, 1);

    // Exactly one checkpoint pair: the rolling latest and the step snapshot.
    assert!(log.join("model.bin").exists());
    assert!(log.join("model_0.bin").exists());
    let snapshots = fs::read_dir(&log)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with("model_") && name.ends_with(".bin")
        })
        .count();
    assert_eq!(snapshots, 1);

    // One rendered frame plus the aggregated animation.
    assert!(log.join("step_0/image_0.png").exists());
    assert!(log.join("step_0/video.gif").exists());
    assert!(!log.join("step_0/image_1.png").exists());

    // Five scalars at step 0, in logging order.
    let at_step0 = step0_events(&report.events);
    assert_eq!(at_step0.len(), 5);
    let tags: Vec<&str> = at_step0.iter().map(|e| e.tag.as_str()).collect();
    assert_eq!(
        tags,
        vec![
            "train/loss",
            "train/coarse_psnr",
            "train/fine_psnr",
            "train/avg_psnr",
            "train/lr"
        ]
    );

    // The on-disk stream holds the same events.
    let stream = fs::read_to_string(log.join("train/scalars.jsonl")).unwrap();
    assert_eq!(stream.lines().count(), report.events.len());

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_fixed_seed_runs_are_identical() {
    let root = scratch_dir("determinism");
    let scene = root.join("scene");
    write_scene(&scene);

    let run = |log: PathBuf| {
        let config = tiny_config(&scene, &log)
            .with_max_steps(2)
            .with_save_every(10)
            .with_render_every(10);
        train::<B>(&config, &Default::default()).unwrap()
    };
    let first = run(root.join("log-a"));
    let second = run(root.join("log-b"));

    assert_eq!(first.events.len(), second.events.len());
    for (a, b) in first.events.iter().zip(&second.events) {
        assert_eq!(a, b, "scalar streams diverged");
    }

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_psnr_aggregation_invariant_holds_in_logged_stream() {
    let root = scratch_dir("aggregation");
    let scene = root.join("scene");
    let log = root.join("log");
    write_scene(&scene);

    let config = tiny_config(&scene, &log)
        .with_max_steps(2)
        .with_save_every(10)
        .with_render_every(10);
    let report = train::<B>(&config, &Default::default()).unwrap();

    for step in 0..2 {
        let value = |tag: &str| {
            report
                .events
                .iter()
                .find(|e| e.step == step && e.tag == tag)
                .map(|e| e.value)
                .unwrap()
        };
        // Two levels: avg is the mean of the one coarse PSNR and the fine.
        let expected = (value("train/coarse_psnr") + value("train/fine_psnr")) / 2.0;
        assert!((value("train/avg_psnr") - expected).abs() < 1e-4);
    }

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_resume_restores_saved_step() {
    let root = scratch_dir("resume");
    let scene = root.join("scene");
    let log = root.join("log");
    write_scene(&scene);

    // First run saves at step 0.
    let config = tiny_config(&scene, &log).with_render_every(100);
    train::<B>(&config, &Default::default()).unwrap();

    // Resuming picks the saved step back up and continues to the new bound.
    let config = tiny_config(&scene, &log)
        .with_render_every(100)
        .with_save_every(100)
        .with_max_steps(3)
        .with_resume(true);
    let report = train::<B>(&config, &Default::default()).unwrap();
    assert_eq!(report.final_step, 3);
    let first_logged = report.events.first().map(|e| e.step).unwrap();
    assert_eq!(first_logged, 0);

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_resume_without_checkpoint_is_fatal() {
    let root = scratch_dir("resume-missing");
    let scene = root.join("scene");
    let log = root.join("log");
    write_scene(&scene);

    let config = tiny_config(&scene, &log).with_resume(true);
    let err = train::<B>(&config, &Default::default()).unwrap_err();
    assert!(matches!(err, TrainError::Checkpoint(_)));

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_unknown_dataset_is_fatal() {
    let root = scratch_dir("unknown-dataset");
    let config = TrainConfig::new(
        "llff".into(),
        root.join("scene").to_str().unwrap().into(),
        root.join("log").to_str().unwrap().into(),
        NerfModelConfig::new(),
    );
    let err = train::<B>(&config, &Default::default()).unwrap_err();
    assert!(matches!(err, TrainError::Data(_)));

    fs::remove_dir_all(&root).unwrap();
}
