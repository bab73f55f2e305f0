use structopt::StructOpt;

use session_hub::config::Config;
use session_hub::server;

#[derive(StructOpt, Debug)]
#[structopt(name = "session_hub")]
struct Opt {
    /// Overrides BIND_ADDR from the environment, e.g. 0.0.0.0:8080.
    #[structopt(long)]
    bind: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();
    let mut config = Config::from_env();
    if let Some(bind) = opt.bind {
        config.bind_addr = bind;
    }

    server::run(config).await;
}
