// SPDX-License-Identifier: CC0-1.0

//! Gather strong entropy from an EGD alone and print the outcome as status
//! lines for a test driver to parse.

use std::time::Duration;

use log::{info, warn};
use seedstream::egd::Endpoint;
use seedstream::entropy::{gather, GatherConfig, SourceFlags, StrongRngError};
use seedstream::io::EgdClient;
use seedstream_harness::Status;

configure_me::include_config!("egd_status");

/// One request through the tokio client, reported like a gather.
fn fetch_async(endpoint: &Endpoint, out: &mut [u8]) -> Result<SourceFlags, StrongRngError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");
    let bytes = runtime
        .block_on(seedstream::futures::fetch(endpoint, out.len()))
        .map_err(StrongRngError::from)?;
    out.copy_from_slice(&bytes);
    Ok(SourceFlags::SRC_EGD | SourceFlags::STRONG)
}

fn main() {
    env_logger::init();

    let (config, _) = Config::including_optional_config_files::<&[&str]>(&[]).unwrap_or_exit();
    if config.bytes > 256 {
        eprintln!("--bytes must be in 0..256");
        std::process::exit(1);
    }
    let endpoint: Endpoint = match config.endpoint.parse() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!("{e}");
            println!("{}", Status::Failure(StrongRngError::Init));
            return;
        }
    };

    info!("Requesting {} bytes from {endpoint}.", config.bytes);
    let mut out = vec![0u8; config.bytes];
    let result = if config.async_client {
        fetch_async(&endpoint, &mut out)
    } else {
        let mut egd = EgdClient::new(endpoint);
        if let Some(secs) = config.timeout_secs {
            egd = egd.with_timeout(Duration::from_secs(secs));
        }
        let only_egd = GatherConfig::new().with_required(SourceFlags::SRC_EGD);
        gather(&only_egd, &mut [&mut egd], &mut out)
    };

    println!("{}", Status::from_gather(result, &out));
}
