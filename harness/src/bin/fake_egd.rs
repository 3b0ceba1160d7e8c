// SPDX-License-Identifier: CC0-1.0

//! Daemon stand-in for exercising EGD clients.
//!
//! Serves one connection with prefixes of a fixed text, misbehaving as told by
//! the bug switches, then exits. Never use its output as entropy.

use log::{error, info};
use seedstream_harness::{Bugs, FakeEgd};

configure_me::include_config!("fake_egd");

#[tokio::main]
async fn main() {
    env_logger::init();

    let (config, _) = Config::including_optional_config_files::<&[&str]>(&[]).unwrap_or_exit();
    let bugs = Bugs {
        truncate_output: config.truncate_output,
        short_output: config.short_output,
        no_output: config.no_output,
        close_after_read: config.close_after_read,
        close_before_read: config.close_before_read,
    };

    let daemon = match &config.unix_path {
        #[cfg(unix)]
        Some(path) => {
            info!("Listening on {path}.");
            FakeEgd::bind_unix(std::path::Path::new(path), bugs)
                .expect("Failed to bind to socket path.")
        }
        #[cfg(not(unix))]
        Some(_) => {
            eprintln!("Unix domain sockets are not supported on this platform.");
            std::process::exit(1);
        }
        None => {
            let daemon = FakeEgd::bind_tcp(&config.bind_host, config.bind_port, bugs)
                .await
                .expect("Failed to bind to port.");
            if let Some(port) = daemon.local_port() {
                info!("Listening on {}:{port}.", config.bind_host);
                // Tests read the port off stdout.
                println!("PORT:{port}");
            }
            daemon
        }
    };

    if let Err(e) = daemon.serve_one().await {
        error!("Session ended with error: {e}.");
        std::process::exit(1);
    }
}
