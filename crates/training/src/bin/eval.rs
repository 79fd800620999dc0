use clap::Parser;
use training::eval::{run_eval, EvalArgs};

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    let args = EvalArgs::parse();
    let report = run_eval(&args)?;
    println!(
        "samples={} batches={} charbonnier={:.6} psnr={:.3} dB",
        report.samples, report.batches, report.mean_loss, report.psnr_db
    );
    Ok(())
}
