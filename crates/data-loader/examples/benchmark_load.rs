use data_loader::Dataset;
use std::path::PathBuf;
use std::time::Instant;

fn main() {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/items.dat"));

    println!("Loading item dataset from {}...\n", path.display());

    let start = Instant::now();
    let dataset = Dataset::load_from_file(&path).expect("Failed to load dataset");
    let elapsed = start.elapsed();

    println!("=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Items: {}", dataset.len());
    println!("Valid items: {}", dataset.valid_count());
    println!("Unresolved attributes: {}", dataset.unresolved().len());
    println!(
        "\nPerformance: {:.0} items/second",
        dataset.len() as f64 / elapsed.as_secs_f64()
    );
}
