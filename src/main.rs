#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = ielts_assess::run().await {
        eprintln!("ielts-assess fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
