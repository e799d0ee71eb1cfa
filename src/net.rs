use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::config::Config;

/// Source of the two addresses the bot can report.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Address the OS picks as source for outbound traffic.
    async fn local_ip(&self) -> Result<IpAddr>;
    /// Address the outside world sees, according to an IP echo service.
    async fn public_ip(&self) -> Result<IpAddr>;
}

#[derive(Debug, Deserialize)]
struct EchoResponse {
    ip: String,
}

/// Find the local source address by "connecting" a UDP socket to `probe`.
/// Connecting a datagram socket only asks the kernel for a route; nothing is sent.
pub async fn local_ip(probe: SocketAddr) -> Result<IpAddr> {
    let bind_addr = match probe {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };

    let socket = UdpSocket::bind(bind_addr)
        .await
        .context("Failed to open UDP socket")?;
    socket
        .connect(probe)
        .await
        .with_context(|| format!("Failed to route towards {}", probe))?;

    let local = socket
        .local_addr()
        .context("Failed to read local socket address")?;
    Ok(local.ip())
}

/// Ask an IP echo service (ipify-style `{"ip": "..."}` body) for our public address.
pub async fn public_ip(client: &reqwest::Client, url: &str) -> Result<IpAddr> {
    debug!("Requesting public IP from {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("IP echo service returned {}", status);
    }

    let body: EchoResponse = response
        .json()
        .await
        .context("Failed to parse IP echo response")?;

    body.ip
        .trim()
        .parse::<IpAddr>()
        .with_context(|| format!("IP echo service returned an invalid address: {:?}", body.ip))
}

/// Resolver backed by the real network.
pub struct NetResolver {
    client: reqwest::Client,
    public_ip_url: String,
    probe: SocketAddr,
}

impl NetResolver {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            public_ip_url: config.public_ip_url.clone(),
            probe: config.probe_addr()?,
        })
    }
}

#[async_trait]
impl AddressResolver for NetResolver {
    async fn local_ip(&self) -> Result<IpAddr> {
        local_ip(self.probe).await
    }

    async fn public_ip(&self) -> Result<IpAddr> {
        public_ip(&self.client, &self.public_ip_url).await
    }
}
