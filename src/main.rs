#[tokio::main]
async fn main() {
    if let Err(e) = token_pool::run().await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}
