use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use warp::Filter;

mod args;
mod auth;
mod backend;
mod bootstrap;
mod form;
mod markdown;
mod message;
mod modpack;
mod mpds;
mod page;
mod routes;
mod schema;
mod time;

use args::Args;
use backend::Backend;
use mpds::Mpds;

#[tokio::main]
async fn main() -> ExitCode {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&filters)
        .init();

    let args = Args::parse();

    let addr = match args.addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid address: {e}");
            return ExitCode::FAILURE;
        }
    };

    let backend = match Backend::new(args.data_dir()).await {
        Ok(backend) => backend,
        Err(e) => {
            error!("couldn't open database in {:?}: {e}", args.data_dir());
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = bootstrap::run(&backend, schema::TABLES, schema::DB_VERSION).await {
        error!("database setup failed: {e}");
        return ExitCode::FAILURE;
    }

    let mpds = Arc::new(Mpds::new(
        backend,
        args.icons_dir(),
        args.placeholder_icon(),
    ));

    let routes = routes::routes(
        mpds,
        routes::Settings {
            secure: args.secure(),
            public_dir: args.public_dir(),
            docs_file: args.docs_file(),
        },
    )
    .with(warp::log("mpds"));

    info!("listening on {addr}");
    warp::serve(routes).run(addr).await;

    ExitCode::SUCCESS
}
