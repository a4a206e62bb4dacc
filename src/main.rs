use std::{env, time::Duration};

use log::LevelFilter;
use structopt::StructOpt;
use tokio::sync::broadcast;

use pingo::{Config, IpVersion, TracingReporter};

#[derive(StructOpt, Debug)]
#[structopt(name = "pingo")]
struct Opt {
    /// Host name or IP literal to ping.
    #[structopt(short = "h", long, default_value = "github.com")]
    host: String,

    /// IP version to use, `4` or `6`.
    #[structopt(long, default_value = "4")]
    ip: IpVersion,

    /// Milliseconds to wait for each reply.
    #[structopt(short = "W", long, default_value = "100")]
    timeout: u64,

    /// Milliseconds to wait between sending each packet.
    #[structopt(short = "i", long, default_value = "1000")]
    interval: u64,

    /// Time-to-live (IPv4) or hop limit (IPv6) of outgoing requests.
    #[structopt(short = "t", long)]
    ttl: Option<u32>,

    /// Bind the socket to this network interface (Linux only).
    #[structopt(short = "I", long)]
    iface: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut logger = pretty_env_logger::formatted_builder();
    logger.filter_level(LevelFilter::Info);
    if let Ok(filters) = env::var("RUST_LOG") {
        logger.parse_filters(&filters);
    }
    logger.init();
    let opt = Opt::from_args();

    let mut config_builder = Config::builder()
        .kind(opt.ip)
        .timeout(Duration::from_millis(opt.timeout))
        .interval(Duration::from_millis(opt.interval));
    if let Some(ttl) = opt.ttl {
        config_builder = config_builder.ttl(ttl);
    }
    if let Some(interface) = &opt.iface {
        config_builder = config_builder.interface(interface);
    }
    let config = config_builder.build();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    if pingo::ping(&opt.host, &config, TracingReporter, shutdown_rx)
        .await
        .is_err()
    {
        std::process::exit(1);
    }
}
