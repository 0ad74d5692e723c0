#[tokio::main]
async fn main() {
    if let Err(e) = syllabus_events::run().await {
        tracing::error!("{e}");
        eprintln!("syllabus-events: {e}");
        std::process::exit(1);
    }
}
