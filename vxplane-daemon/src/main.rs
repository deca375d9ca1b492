//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod config;
mod supervisor;

use std::sync::Arc;

use clap::{App, Arg};
use nix::unistd::Uid;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use vxplane_bgp::transport::JsonTransport;
use vxplane_bgp::SpeakerClient;
use vxplane_utils::worker::Worker;

use crate::config::{Config, ConfigType};

struct RuntimeOptions {
    config_file: String,
    config_type: ConfigType,
    api_hosts: String,
    remote: bool,
    graceful_restart: bool,
}

fn init_tracing(log_level: &str, plain: bool) {
    let level = match log_level {
        "debug" => LevelFilter::DEBUG,
        _ => LevelFilter::INFO,
    };
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if plain {
        subscriber.init();
    } else {
        subscriber.json().init();
    }
}

// Speaker endpoints like ":50051" bind all addresses on the speaker side;
// for dialing, that means the local host.
fn dial_target(api_hosts: &str) -> String {
    match api_hosts.strip_prefix(':') {
        Some(port) => format!("127.0.0.1:{}", port),
        None => api_hosts.to_owned(),
    }
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("vxplane agent")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("config-file")
                .short("f")
                .long("config-file")
                .value_name("file")
                .default_value("vxplane.conf")
                .help("Specify the configuration file."),
        )
        .arg(
            Arg::with_name("config-type")
                .short("t")
                .long("config-type")
                .value_name("toml|yaml|json")
                .default_value("toml")
                .help("Specify the configuration file format."),
        )
        .arg(
            Arg::with_name("log-level")
                .short("l")
                .long("log-level")
                .value_name("debug|info")
                .default_value("info")
                .help("Specify the log level."),
        )
        .arg(
            Arg::with_name("log-plain")
                .short("p")
                .long("log-plain")
                .help("Use plain format for logging (JSON by default)."),
        )
        .arg(
            Arg::with_name("api-hosts")
                .long("api-hosts")
                .value_name("host:port")
                .default_value(":50051")
                .help("Specify the BGP speaker RPC endpoint."),
        )
        .arg(
            Arg::with_name("remote-bgp")
                .short("r")
                .long("remote-bgp")
                .help("Remote BGP mode: ignore the file's bgp section."),
        )
        .arg(
            Arg::with_name("graceful-restart")
                .short("g")
                .long("graceful-restart")
                .help("Flag restart-state in the graceful-restart capability."),
        )
        .get_matches();

    init_tracing(
        matches.value_of("log-level").unwrap(),
        matches.is_present("log-plain"),
    );

    let config_type = match matches.value_of("config-type").unwrap().parse() {
        Ok(config_type) => config_type,
        Err(reason) => {
            eprintln!("{}", reason);
            std::process::exit(1);
        }
    };
    let opts = RuntimeOptions {
        config_file: matches.value_of("config-file").unwrap().to_owned(),
        config_type,
        api_hosts: matches.value_of("api-hosts").unwrap().to_owned(),
        remote: matches.is_present("remote-bgp"),
        graceful_restart: matches.is_present("graceful-restart"),
    };

    // Check for root privileges.
    if !Uid::effective().is_root() {
        eprintln!("need privileged user");
        std::process::exit(1);
    }

    // Set panic handler to abort the process if any child task panics.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    // We're ready to go!
    info!("starting up");

    let exit_code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(run(opts));
    std::process::exit(exit_code);
}

async fn run(opts: RuntimeOptions) -> i32 {
    // The initial configuration must be valid; reload failures later are
    // soft.
    let initial = match Config::load(&opts.config_file, opts.config_type) {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid initial configuration");
            return 1;
        }
    };
    if opts.remote && initial.bgp.is_some() {
        warn!(
            "running in remote BGP mode; the file's bgp section is ignored"
        );
    }
    if opts.graceful_restart {
        info!("graceful-restart mode is handled by the speaker");
    }

    let (config_tx, config_rx) = mpsc::channel(1);
    let _ = config_tx.send(initial).await;

    // SIGHUP re-reads the configuration file.
    let config_file = opts.config_file.clone();
    let config_type = opts.config_type;
    let _reload_worker = Worker::spawn(async move {
        let mut hangup =
            signal(SignalKind::hangup()).expect("failed to register SIGHUP");
        loop {
            hangup.recv().await;
            info!("reloading the configuration file");
            match Config::load(&config_file, config_type) {
                Ok(config) => {
                    let _ = config_tx.send(config).await;
                }
                // Invalid configuration is not fatal at reload time.
                Err(error) => {
                    warn!(%error, "configuration reload failed");
                }
            }
        }
    });

    // SIGINT/SIGTERM shut the agent down.
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let _signal_worker = Worker::spawn(async move {
        let mut interrupt = signal(SignalKind::interrupt())
            .expect("failed to register SIGINT");
        let mut terminate = signal(SignalKind::terminate())
            .expect("failed to register SIGTERM");
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        info!("shutting down");
        let _ = shutdown_tx.send(()).await;
    });

    let transport =
        Arc::new(JsonTransport::new(dial_target(&opts.api_hosts)));
    let speaker = SpeakerClient::new(transport);

    match supervisor::run(speaker, config_rx, shutdown_rx, opts.remote).await
    {
        Ok(()) => 0,
        Err(error) => {
            error.log();
            1
        }
    }
}
