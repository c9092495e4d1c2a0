//! `inspect` command: print a trained model's layer table.

use std::path::Path;

use crate::error::Result;
use crate::net::persistence::load_model;

pub fn run(model_path: &Path) -> Result<()> {
    let model = load_model(model_path)?;

    println!("Model: {}", model_path.display());
    println!("Layers: {}", model.layers.len());
    println!("--------------------");

    let mut total = 0usize;
    for (i, layer) in model.layers.iter().enumerate() {
        let params: usize = layer.params().iter().map(|p| p.len()).sum();
        total += params;
        if params > 0 {
            println!("  {i}: {:<10} {params} parameters", layer.type_name());
        } else {
            println!("  {i}: {}", layer.type_name());
        }
    }

    println!("--------------------");
    println!("Total parameters: {total}");
    Ok(())
}
