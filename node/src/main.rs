mod host;
mod network;
mod portal;
mod sensors;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
