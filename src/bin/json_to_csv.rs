use clap::Parser;
use std::path::PathBuf;
use trip_analytics::utils::flatten::{convert_json_file, find_json_files};
use trip_analytics::utils::logger;

#[derive(Parser)]
#[command(name = "json-to-csv")]
#[command(about = "Flatten every JSON file under a folder into a one-row CSV beside it")]
struct Args {
    /// Folder searched recursively for *.json files
    #[arg(long, default_value = "data")]
    data_folder: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init_cli_logger(args.verbose);

    let files = find_json_files(&args.data_folder)?;
    tracing::info!(
        "📁 Found {} JSON files under {}",
        files.len(),
        args.data_folder.display()
    );

    let mut failed = 0usize;
    for json_path in &files {
        match convert_json_file(json_path) {
            Ok(csv_path) => {
                println!("Converted {} to {}", json_path.display(), csv_path.display());
            }
            Err(e) => {
                failed += 1;
                tracing::error!("❌ Failed to convert {}: {}", json_path.display(), e);
            }
        }
    }

    if failed > 0 {
        eprintln!("❌ {} of {} files could not be converted", failed, files.len());
        std::process::exit(1);
    }

    Ok(())
}
