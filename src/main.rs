use socks5_tls_forwarder::{
    Result, SecureRequestForwarder,
    config::CmdOpt,
    server::Server,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let opt: CmdOpt = clap::Parser::parse();

    let default = format!("{}={:?}", module_path!(), opt.verbosity);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();

    let config = opt.forwarder_config();
    log::info!("routing through SOCKS5 proxy {}:{} as {}", config.proxy.host, config.proxy.port, config.proxy.auth.username);
    if !config.tls.verifies_peer() {
        log::warn!("TLS certificate verification of {} is DISABLED", config.target);
    }

    let forwarder = Arc::new(SecureRequestForwarder::new(&config)?);
    let server = Server::bind(opt.listen_addr(), forwarder, Arc::new(config.target.clone())).await?;
    log::info!("listening on {}, forwarding to https://{}", server.local_addr()?, config.target);

    let token = CancellationToken::new();
    let cloned_token = token.clone();

    let ctrlc = ctrlc2::AsyncCtrlC::new(move || {
        log::info!("");
        log::info!("Ctrl-C received, shutting down...");
        cloned_token.cancel();
        true
    })?;

    server.run(token).await?;

    ctrlc.await?;

    Ok(())
}
