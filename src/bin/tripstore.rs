use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use clap::Parser;

use tripstore::config::ServerArgs;
use tripstore::server::Server;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = ServerArgs::parse();
    log::info!(
        "listening on port {} for gen, {} for queries.",
        args.port,
        args.query_port
    );

    let ingest_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port);
    let query_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.query_port);

    let mut server = match Server::bind(ingest_addr, query_addr) {
        Ok(server) => server,
        Err(e) => {
            log::error!("error in socketing: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run() {
        log::error!("event loop exited: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
