use std::convert::Infallible;
use std::error::Error;
use std::future::ready;
use std::sync::Arc;

use futures_util::stream::StreamExt;
use hyper::server::accept;
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use log::{error, info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use reef_common::constants::{
    INACCEL_DEBUG_ENV, INACCEL_LOG_CONFIG_FILE, INACCEL_LOG_CONFIG_FILE_ENV,
};
use tls_listener::TlsListener;

use crate::webhook::{injector_handler, load_ssl};

mod errors;
mod jsonpatch;
mod mutate;
mod webhook;

pub type Acceptor = tokio_rustls::TlsAcceptor;

fn init_logging() {
    let log_config = std::env::var(INACCEL_LOG_CONFIG_FILE_ENV)
        .unwrap_or_else(|_| INACCEL_LOG_CONFIG_FILE.to_string());
    if log4rs::init_file(&log_config, Default::default()).is_err() {
        // No log4rs file mounted; fall back to console logging.
        let level = std::env::var(INACCEL_DEBUG_ENV)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .map(|debug| if debug { LevelFilter::Debug } else { LevelFilter::Info })
            .unwrap_or(LevelFilter::Info);
        let stdout = ConsoleAppender::builder().build();
        let config = Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(level))
            .expect("Unable to build console logging configuration");
        log4rs::init_config(config).expect("Unable to initialize logging");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let ssl_config = load_ssl()?;
    let addr = ([0, 0, 0, 0], 8443).into();
    let tls_acceptor: Acceptor = Arc::new(ssl_config).into();
    let make_service = make_service_fn(move |_conn| async {
        Ok::<_, Infallible>(service_fn(injector_handler))
    });
    let incoming = TlsListener::new(tls_acceptor, AddrIncoming::bind(&addr)?).filter(|c| {
        if let Err(e) = c {
            error!("Error accepting TLS connection: {:?}", e);
            ready(false)
        } else {
            ready(true)
        }
    });

    info!("Starting InAccel injector server");
    let server = Server::builder(accept::from_stream(incoming)).serve(make_service);
    server.await?;
    Ok(())
}
