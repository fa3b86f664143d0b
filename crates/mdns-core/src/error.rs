use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mdns daemon error: {0}")]
    Mdns(#[from] mdns_sd::Error),
    #[error("no usable network interface")]
    NoInterface,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
