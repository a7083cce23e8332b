#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cauliflow_core::cli::run_cli().await
}
