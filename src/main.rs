// src/main.rs

use norn_scripts::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(summary) if summary.failed == 0 => {}
        Ok(_) => std::process::exit(1),
        Err(err) => {
            eprintln!("norn-scripts error: {err:?}");
            std::process::exit(2);
        }
    }
}

async fn run_main() -> anyhow::Result<norn_scripts::RunSummary> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
