use std::net::SocketAddr;
use std::time::Duration;

/// Runtime configuration, passed entirely at construction. No config file.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub unacked_scan_interval: Duration,
    pub unacked_timeout: Duration,
    pub buf_size: usize,
    pub consumer_queue_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().unwrap(),
            unacked_scan_interval: Duration::from_secs(3),
            unacked_timeout: Duration::from_secs(5),
            buf_size: 16384,
            consumer_queue_size: 1,
        }
    }
}
