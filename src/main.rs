use clap::Parser;
use log::{debug, error, info};
use rtmpsniff::{
    open_capture, CaptureConfig, FlowSupervisor, TcpReassembler, MAX_BUFFERED_SEGMENTS,
};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Display decoded RTMP commands from pcap wire data.
#[derive(Parser, Debug)]
#[command(name = "rtmpsniff", version, about, long_about = None)]
struct Cli {
    /// pcap file from tcpdump
    #[arg(short = 'f', value_name = "FILE")]
    file: Option<PathBuf>,

    /// interface to read packets from ("en4", "eth0", ..)
    #[arg(short = 'i', default_value = "all", value_name = "IFACE")]
    interface: String,

    /// interface snap length
    #[arg(short = 's', default_value_t = 65535, value_name = "LEN")]
    snaplen: i32,

    /// disable promiscuous mode
    #[arg(short = 'p')]
    promisc_off: bool,

    /// BPF filter expression
    #[arg(trailing_var_arg = true, value_name = "BPF")]
    filter: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env().init();

    let cli = Cli::parse();
    let config = CaptureConfig {
        file: cli.file,
        interface: cli.interface,
        snaplen: cli.snaplen,
        promiscuous: !cli.promisc_off,
        filter: cli.filter.join(" "),
    };

    let mut capture = match open_capture(&config) {
        Ok(capture) => capture,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let datalink = capture.get_datalink().0;

    let (results_tx, mut results_rx) = mpsc::channel::<String>(64);
    let printer = tokio::spawn(async move {
        while let Some(line) = results_rx.recv().await {
            if !line.trim().is_empty() {
                println!("{}", line);
            }
        }
    });

    let supervisor = FlowSupervisor::new(results_tx);
    let reassembler = TcpReassembler::new(supervisor, MAX_BUFFERED_SEGMENTS);

    // The pcap read loop is blocking, so it runs on the blocking pool and
    // hands flow bytes to the async workers through their pipes.
    let capture_loop = tokio::task::spawn_blocking(move || {
        let mut reassembler = reassembler;
        loop {
            match capture.next_packet() {
                Ok(packet) => reassembler.handle_frame(datalink, packet.data),
                Err(pcap::Error::NoMorePackets) => break,
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(e) => {
                    error!("packet: {}", e);
                    break;
                }
            }
        }
        // Force-close flows still mid-decode before waiting on them.
        reassembler.flush_all()
    });

    let supervisor = match capture_loop.await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("capture loop: {}", e);
            std::process::exit(1);
        }
    };

    debug!("waiting for {} flows", supervisor.outstanding());
    supervisor.wait().await;

    // Every result sender is gone once the flows are; the printer drains
    // what is left and exits.
    if printer.await.is_err() {
        error!("printer task failed");
    }
    info!("done");
}
