//! Integration tests for the evaluator and its attention figures.

mod common;

use common::*;
use destilar::data::{DataLoader, ImageDataset};
use destilar::device::Cpu;
use destilar::dist::SingleProcess;
use destilar::nn::Model;
use destilar::precision::Precision;
use destilar::visual::{PngGridRenderer, KERNEL_FIGURE_NAME};
use destilar::{evaluate, Error, EvalOptions};

fn options(dir: &std::path::Path) -> EvalOptions {
    EvalOptions::default()
        .with_precision(Precision::Fp32)
        .with_print_freq(1000)
        .with_output_dir(dir)
}

#[test]
fn test_small_batches_produce_no_figures() {
    let dir = tempfile::tempdir().unwrap();
    let ds = dataset(99, 2, 4);
    let loader = DataLoader::new(&ds, 99).unwrap();
    let mut model = Recorder::new(probed_classifier(4, 2), event_log());
    let mut renderer = RecordingRenderer::default();

    evaluate(
        &loader,
        &mut model,
        &mut Cpu,
        &SingleProcess,
        Some(&ds),
        &mut renderer,
        &options(dir.path()),
    )
    .unwrap();

    assert!(renderer.figures.is_empty());
    assert_eq!(model.capturing_forwards, 1);
}

#[test]
fn test_full_batch_fills_the_grid() {
    let dir = tempfile::tempdir().unwrap();
    let ds = dataset(150, 2, 4);
    let loader = DataLoader::new(&ds, 150).unwrap();
    let mut model = probed_classifier(4, 2);
    let mut renderer = RecordingRenderer::default();

    evaluate(
        &loader,
        &mut model,
        &mut Cpu,
        &SingleProcess,
        Some(&ds),
        &mut renderer,
        &options(dir.path()),
    )
    .unwrap();

    assert_eq!(renderer.figures.len(), 1);
    let figure = &renderer.figures[0];
    assert_eq!((figure.rows, figure.cols), (10, 10));
    assert_eq!(figure.populated(), 100);
    assert_eq!(figure.alpha, 0.2);

    // 2x2 cells upsampled three times
    let cell = figure.cells[0].as_ref().unwrap();
    assert_eq!(cell.overlay.as_ref().unwrap().dim(), (6, 6));
    let (image, _) = ds.get(0).unwrap();
    assert_eq!(cell.image.as_ref().unwrap(), &image);
}

#[test]
fn test_each_batch_captures_its_own_activations() {
    let dir = tempfile::tempdir().unwrap();
    let ds = dataset(300, 3, 4);
    let loader = DataLoader::new(&ds, 150).unwrap();
    let mut model = Recorder::new(probed_classifier(4, 3), event_log());
    let mut renderer = RecordingRenderer::default();
    let opts = options(dir.path()).with_alpha(0.5);

    evaluate(
        &loader,
        &mut model,
        &mut Cpu,
        &SingleProcess,
        Some(&ds),
        &mut renderer,
        &opts,
    )
    .unwrap();

    assert_eq!(model.capturing_forwards, 2);
    assert_eq!(model.stale_captures, 0);
    let paths: Vec<_> = renderer.figures.iter().map(|f| f.path.clone()).collect();
    assert_eq!(
        paths,
        vec![opts.visual.figure_path(0), opts.visual.figure_path(1)]
    );
    assert!(paths[1].ends_with("figure and attn 1 alpha 0.5.png"));
    // second figure reads originals 150.. so labels keep matching
    assert_eq!(renderer.figures[1].populated(), 100);
}

#[test]
fn test_kernels_rendered_once_at_entry() {
    let dir = tempfile::tempdir().unwrap();
    let ds = dataset(20, 10, 4);
    let loader = DataLoader::new(&ds, 5).unwrap();
    let mut model = KernelModel::new(4, 3, 10);
    let mut renderer = RecordingRenderer::default();

    evaluate(
        &loader,
        &mut model,
        &mut Cpu,
        &SingleProcess,
        Some(&ds),
        &mut renderer,
        &options(dir.path()),
    )
    .unwrap();

    assert_eq!(renderer.figures.len(), 1);
    let kernels = &renderer.figures[0];
    assert!(kernels.path.ends_with(KERNEL_FIGURE_NAME));
    assert_eq!((kernels.rows, kernels.cols), (4, 3));
    assert_eq!(kernels.populated(), 12);
    assert!(!model.is_training());
}

#[test]
fn test_no_capture_without_original_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let ds = dataset(200, 2, 4);
    let loader = DataLoader::new(&ds, 200).unwrap();
    let mut model = Recorder::new(probed_classifier(4, 2), event_log());
    let mut renderer = RecordingRenderer::default();

    evaluate(
        &loader,
        &mut model,
        &mut Cpu,
        &SingleProcess,
        None,
        &mut renderer,
        &options(dir.path()),
    )
    .unwrap();

    assert_eq!(model.forwards, 1);
    assert_eq!(model.capturing_forwards, 0);
    assert!(renderer.figures.is_empty());
}

#[test]
fn test_accuracy_meters() {
    let dir = tempfile::tempdir().unwrap();
    let ds = dataset(64, 10, 4);
    let loader = DataLoader::new(&ds, 16).unwrap();
    let mut model = classifier(4, 10);
    let mut renderer = RecordingRenderer::default();

    let stats = evaluate(
        &loader,
        &mut model,
        &mut Cpu,
        &SingleProcess,
        None,
        &mut renderer,
        &options(dir.path()),
    )
    .unwrap();

    assert!(stats["acc1"] <= stats["acc5"]);
    assert!((0.0..=100.0).contains(&stats["acc5"]));
    assert!(stats["loss"].is_finite());
}

#[test]
fn test_png_figures_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let ds = dataset(100, 2, 4);
    let loader = DataLoader::new(&ds, 100).unwrap();
    let mut model = probed_classifier(4, 2);
    let mut renderer = PngGridRenderer;
    let opts = options(&dir.path().join("visual"));

    evaluate(
        &loader,
        &mut model,
        &mut Cpu,
        &SingleProcess,
        Some(&ds),
        &mut renderer,
        &opts,
    )
    .unwrap();

    let path = opts.visual.figure_path(0);
    assert!(path.exists(), "missing {}", path.display());
    let (width, height) = image::image_dimensions(&path).unwrap();
    assert_eq!((width, height), (420, 420));
}

#[test]
fn test_figures_reject_sharded_or_shuffled_loader() {
    let dir = tempfile::tempdir().unwrap();
    let ds = dataset(200, 2, 4);
    let sharded = DataLoader::new(&ds, 100).unwrap().with_shard(0, 2).unwrap();
    let shuffled = DataLoader::new(&ds, 100).unwrap().with_shuffle(3);

    for loader in [&sharded, &shuffled] {
        let mut model = probed_classifier(4, 2);
        let mut renderer = RecordingRenderer::default();
        let err = evaluate(
            loader,
            &mut model,
            &mut Cpu,
            &SingleProcess,
            Some(&ds),
            &mut renderer,
            &options(dir.path()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)), "got {err:?}");
        assert!(renderer.figures.is_empty());
    }

    // metrics alone still work over a shard
    let mut model = probed_classifier(4, 2);
    evaluate(
        &sharded,
        &mut model,
        &mut Cpu,
        &SingleProcess,
        None,
        &mut RecordingRenderer::default(),
        &options(dir.path()),
    )
    .unwrap();
}
