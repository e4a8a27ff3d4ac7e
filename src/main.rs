#[tokio::main]
async fn main() {
    if player_sync::run_with_config().await.is_err() {
        std::process::exit(1);
    }
}
