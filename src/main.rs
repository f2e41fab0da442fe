use std::{env, fs, process};

use log::info;

use neural_labeler::{
    Result,
    config::{ModelConfig, TopologyConfig},
    params::ModelParams,
};

fn inspect(path: &str) -> Result<()> {
    let json = fs::read_to_string(path)?;
    let ModelConfig { variant, hyper, dims } = ModelConfig::from_json(&json)?;

    let config = TopologyConfig::derive(variant, hyper, dims)?;
    for stage in config.stages() {
        info!(input = stage.input, output = stage.output; "{}", stage.name);
    }

    let (params, layout) = ModelParams::new(&config)?;
    for unit in params.export_units() {
        for tensor in unit.tensors() {
            let entry = layout.entry(tensor);
            info!(len = entry.shape.len(); "{}", entry.name);
        }
    }

    info!(
        variant = variant.name(),
        tensors = layout.tensors(),
        params = layout.size();
        "topology is consistent"
    );
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <config.json>", args[0]);
        process::exit(1);
    }

    if let Err(e) = inspect(&args[1]) {
        eprintln!("{e}");
        process::exit(1);
    }
}
