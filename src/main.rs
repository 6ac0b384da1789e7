#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examgrader::run().await {
        eprintln!("examgrader fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
