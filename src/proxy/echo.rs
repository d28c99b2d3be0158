use std::{fmt::Debug, net::IpAddr, time::Duration};

use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::trace;

use super::ProxyEndpoint;

/// Echo services answer with the bare address when they see a curl client.
const USER_AGENT: &str = "curl/7.72.0";

/// A service telling the caller which IP address it connects from
pub trait IpEcho: Sync + Debug {
    /// The public address seen by the service, optionally going through a proxy.
    fn apparent_ip(&self, proxy: Option<&ProxyEndpoint>) -> Result<IpAddr>;
}

/// Plain-text IP echo service reached over HTTP, e.g. `https://ipconfig.io`
#[derive(Debug, Clone)]
pub struct HttpIpEcho {
    url: String,
    timeout: Duration,
}

impl HttpIpEcho {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl IpEcho for HttpIpEcho {
    fn apparent_ip(&self, proxy: Option<&ProxyEndpoint>) -> Result<IpAddr> {
        let mut agent = ureq::AgentBuilder::new()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);
        if let Some(proxy) = proxy {
            let proxy = ureq::Proxy::new(proxy.as_str())
                .into_diagnostic()
                .wrap_err_with(|| format!("Proxy {proxy} is not usable by the HTTP client"))?;
            agent = agent.proxy(proxy);
        }

        let body = agent
            .build()
            .get(&self.url)
            .call()
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not reach {}", self.url))?
            .into_string()
            .into_diagnostic()
            .wrap_err("Could not read the echo service answer")?;
        trace!("IP echo answer: {body:?}");

        parse_ip(&body)
    }
}

fn parse_ip(body: &str) -> Result<IpAddr> {
    let body = body.trim();
    body.parse()
        .map_err(|_| miette!("Echo service answer is not an IP address: {body:?}"))
}
