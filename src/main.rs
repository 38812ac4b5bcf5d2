use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    smartdiag_cli::cli::run().await
}
