use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tessera_core::{IntTensor, Result, Shape, Tensor, TesseraError};
use tessera_nn::{Embed, EmbedConfig, Layer, VECTORS};
use tessera_optim::Sgd;
use tracing::info;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "tessera embedding layer CLI")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the reference lookup/backward/update cycle on a 4x2 table.
    Smoke,
    /// Build a layer from a JSON config, initialize it, and save its table.
    Init {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Embed ids with a saved table.
    Lookup {
        #[arg(long)]
        table: PathBuf,
        /// Comma-separated ids, e.g. `1,3,1`.
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        ids: Vec<i64>,
        /// Ids per row; with more than one, `--column` picks which to embed.
        #[arg(long, default_value_t = 1)]
        features: usize,
        #[arg(long, default_value_t = 0)]
        column: usize,
    },
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt::try_init();
    let args = Args::parse();
    let result = match args.cmd {
        Cmd::Smoke => smoke(),
        Cmd::Init { config, out } => init(&config, &out),
        Cmd::Lookup {
            table,
            ids,
            features,
            column,
        } => lookup(&table, &ids, features, column),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_rows(label: &str, t: &Tensor) -> Result<()> {
    let rows = t.shape().dim(0).unwrap_or(0);
    println!("{label} {}:", t.shape());
    for i in 0..rows {
        println!("  {:?}", t.row(i)?);
    }
    Ok(())
}

fn smoke() -> Result<()> {
    let mut layer = Embed::new().with_name("smoke");
    layer.set_vectors(Tensor::from_rows(&[
        [0.0, 0.0],
        [1.0, 1.0],
        [2.0, 2.0],
        [3.0, 3.0],
    ]))?;

    let ids = IntTensor::vector(&[1, 3, 1]);
    let (out, backprop) = layer.begin_update(&ids)?;
    print_rows("forward [1,3,1] =", &out)?;

    let d_ids = backprop(&Tensor::ones(out.shape()))?;
    println!("d_ids = {:?} ({})", d_ids.as_slice(), d_ids.dtype());
    let grad = layer
        .params()
        .get_grad(VECTORS)
        .ok_or_else(|| TesseraError::MissingParam(VECTORS.to_string()))?;
    print_rows("d_vectors =", &grad)?;

    let clamped = layer.predict(&IntTensor::vector(&[4, 10]))?;
    print_rows("forward [4,10] (out of range) =", &clamped)?;

    let updated = layer.finish_update(&mut Sgd::new(0.1, 0.0))?;
    print_rows("vectors after sgd(0.1) =", &layer.vectors()?)?;
    info!(updated, "smoke run complete");
    println!("\nAll smoke checks passed.");
    Ok(())
}

fn init(config: &Path, out: &Path) -> Result<()> {
    let cfg = EmbedConfig::from_path(config)?;
    let mut layer = cfg.build();
    layer.initialize(None, None)?;
    tessera_io::save_params(out, layer.params())?;
    let table = layer.vectors()?;
    info!(out = %out.display(), shape = %table.shape(), "saved embedding table");
    Ok(())
}

fn lookup(table: &Path, ids: &[i64], features: usize, column: usize) -> Result<()> {
    if features == 0 || ids.len() % features != 0 {
        return Err(TesseraError::InvalidArgument(format!(
            "{} ids do not split into rows of {features}",
            ids.len()
        )));
    }
    let ids = if features == 1 {
        IntTensor::vector(ids)
    } else {
        IntTensor::from_i64(ids, &Shape::matrix(ids.len() / features, features))?
    };

    let mut layer = Embed::new().column(column);
    tessera_io::load_embed(table, &mut layer)?;
    print_rows("embedded", &layer.predict(&ids)?)
}
