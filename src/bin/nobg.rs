//! nobg CLI Tool
//!
//! Command-line interface for removing image backgrounds through the nobg
//! library, using either the remote prediction service or an embedded
//! local engine.

#[cfg(feature = "cli")]
use nobg::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
