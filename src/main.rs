use clap::Parser;
use treestyle::app::{AppConfig, TreeStyleApp};

fn main() {
    let _ = env_logger::builder().format_timestamp(None).try_init();

    let config = AppConfig::parse();
    if let Err(err) = TreeStyleApp::run(&config) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
