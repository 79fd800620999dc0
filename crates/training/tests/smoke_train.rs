mod common;

use common::{synthetic_dataset, train_args};
use training::checkpoint::{load_checkpoint_meta, CheckpointPaths};
use training::{run_train_with_sink, MemoryScalarSink};

#[test]
fn smoke_train_writes_checkpoints_and_scalars() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dataset = synthetic_dataset(tmp.path())?;
    let ckpt = tmp.path().join("ckpt");
    let args = train_args(&dataset, &ckpt, &["--nEpochs", "2", "--use_se"]);

    let mut sink = MemoryScalarSink::new();
    let summary = run_train_with_sink(&args, &mut sink)?;
    assert_eq!(summary.start_epoch, 1);
    assert_eq!(summary.epochs_run, 2);
    assert!(summary.last_loss.is_some_and(|l| l.is_finite() && l >= 0.0));

    // 6 samples at batch 4 -> 2 batches; step = batches * epoch + iteration.
    assert_eq!(sink.steps("loss"), vec![3, 4, 5, 6]);

    for epoch in 1..=2 {
        let paths = CheckpointPaths::for_epoch(&ckpt, 2, epoch);
        assert!(paths.model.is_file() && paths.optim.is_file());
        let meta = load_checkpoint_meta(&paths.dir)?;
        assert_eq!(meta.epoch, epoch);
        assert!(meta.model.use_se);
    }
    assert_eq!(
        summary.last_checkpoint,
        Some(CheckpointPaths::for_epoch(&ckpt, 2, 2).dir)
    );
    Ok(())
}

#[test]
fn missing_pretrained_and_resume_paths_are_skipped() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dataset = synthetic_dataset(tmp.path())?;
    let ckpt = tmp.path().join("ckpt");
    let missing = tmp.path().join("does_not_exist");
    let missing = missing.display().to_string();
    let args = train_args(
        &dataset,
        &ckpt,
        &["--nEpochs", "1", "--pretrained", &missing, "--resume", &missing],
    );
    let summary = run_train_with_sink(&args, &mut MemoryScalarSink::new())?;
    assert_eq!(summary.start_epoch, 1);
    assert_eq!(summary.epochs_run, 1);
    Ok(())
}

#[test]
fn pretrained_checkpoint_keeps_start_epoch() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dataset = synthetic_dataset(tmp.path())?;
    let first = tmp.path().join("first");
    run_train_with_sink(
        &train_args(&dataset, &first, &["--nEpochs", "1"]),
        &mut MemoryScalarSink::new(),
    )?;

    let pretrained = CheckpointPaths::for_epoch(&first, 2, 1).dir;
    let pretrained = pretrained.display().to_string();
    let second = tmp.path().join("second");
    let summary = run_train_with_sink(
        &train_args(&dataset, &second, &["--nEpochs", "1", "--pretrained", &pretrained]),
        &mut MemoryScalarSink::new(),
    )?;
    assert_eq!(summary.start_epoch, 1);
    assert!(CheckpointPaths::for_epoch(&second, 2, 1).model.is_file());
    Ok(())
}

#[test]
fn missing_dataset_fails_before_training() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let ckpt = tmp.path().join("ckpt");
    let args = train_args(&tmp.path().join("missing.h5"), &ckpt, &["--nEpochs", "1"]);
    let mut sink = MemoryScalarSink::new();
    assert!(run_train_with_sink(&args, &mut sink).is_err());
    assert!(sink.records.is_empty());
    assert!(!ckpt.exists());
    Ok(())
}

#[test]
fn rate_without_matching_label_fails_before_training() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dataset = synthetic_dataset(tmp.path())?;
    let ckpt = tmp.path().join("ckpt");
    let args = train_args(&dataset, &ckpt, &["--nEpochs", "1", "--rate", "3"]);
    assert!(run_train_with_sink(&args, &mut MemoryScalarSink::new()).is_err());
    assert!(!ckpt.exists());
    Ok(())
}

#[test]
fn eval_reports_on_trained_checkpoint_and_falls_back_without_one() -> anyhow::Result<()> {
    use clap::Parser;
    use training::{run_eval, EvalArgs};

    let tmp = tempfile::tempdir()?;
    let dataset = synthetic_dataset(tmp.path())?;
    let ckpt = tmp.path().join("ckpt");
    run_train_with_sink(
        &train_args(&dataset, &ckpt, &["--nEpochs", "1"]),
        &mut MemoryScalarSink::new(),
    )?;

    let dataset_arg = dataset.display().to_string();
    let dir = CheckpointPaths::for_epoch(&ckpt, 2, 1).dir.display().to_string();
    let args = EvalArgs::parse_from(["eval", "--datasets", &dataset_arg, "--checkpoint", &dir]);
    let report = run_eval(&args)?;
    assert_eq!(report.samples, 6);
    assert_eq!(report.batches, 1);
    assert!(report.mean_loss >= 0.0 && report.psnr_db.is_finite());

    let missing = tmp.path().join("nope").display().to_string();
    let args = EvalArgs::parse_from([
        "eval", "--datasets", &dataset_arg, "--checkpoint", &missing, "--blocks", "1",
    ]);
    assert_eq!(run_eval(&args)?.samples, 6);
    Ok(())
}
