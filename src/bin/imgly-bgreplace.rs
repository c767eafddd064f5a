//! IMG.LY Background Replacement CLI Tool
//!
//! Removes the background of a subject image through a rembg-style
//! collaborator and composites the subject onto a replacement background.

#[cfg(feature = "cli")]
use imgly_bgreplace::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(2);
}
