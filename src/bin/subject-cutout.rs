//! Subject cutout command-line tool

use subject_cutout::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
