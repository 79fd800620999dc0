use clap::Parser;
use cli_support::{ShardOutputArgs, ShardOutputOpts};
use patch_dataset::{write_shards, PatchStore};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pack_patches",
    about = "Convert an HDF5 patch file into a shard manifest (needs --features hdf5)"
)]
struct Args {
    /// Source dataset (.h5/.hdf5, or a manifest to re-shard).
    #[arg(long)]
    input: PathBuf,
    #[command(flatten)]
    out: ShardOutputArgs,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    let args = Args::parse();
    let out = ShardOutputOpts::from(&args.out);
    let store = PatchStore::open(&args.input)?;
    let manifest = write_shards(&store, &out.output, out.shard_size)?;
    println!("Wrote {} samples to {}", store.len(), manifest.display());
    Ok(())
}
