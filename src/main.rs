mod cli;
mod destination;
mod dial;
mod proxy_io;
mod relay;

#[tokio::main]
async fn main() {
    if let Err(err) = cli::run().await {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
    // the stdin reader can still be parked in a blocking read; don't wait for it
    std::process::exit(0);
}
