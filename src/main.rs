#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gps_tracker_lib::run().await
}
