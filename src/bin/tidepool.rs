#![allow(unknown_lints)]

extern crate chrono;
extern crate fern;
extern crate tidepool;

#[macro_use]
extern crate log;

use chrono::Utc;
use std::process;
use std::sync::{Arc, RwLock};
use tidepool::api::Api;
use tidepool::http;
use tidepool::store::Store;
use tidepool::thread::Stoppable;

fn main() {
    let args = match tidepool::config::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("tidepool: {}", e);
            process::exit(1);
        }
    };

    let level = match args.verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let logging = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}][{}] {}",
                record.module_path().unwrap_or("?"),
                record.line().unwrap_or(0),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply();
    if let Err(e) = logging {
        eprintln!("tidepool: could not set up logging: {}", e);
        process::exit(1);
    }

    info!("tidepool - {}", args.version);
    info!(
        "retaining {}ms of metrics in {}ms buckets",
        args.window_ms, args.bucket_size_ms
    );

    let store = Arc::new(RwLock::new(Store::new(args.window_ms, args.bucket_size_ms)));
    let server = match http::Server::new(args.host_port(), Api::new(store)) {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    match server.local_addr() {
        Some(addr) => info!("listening on http://{}", addr),
        None => info!("listening on {}", args.host_port()),
    }

    server.join();
}
