//! Startup-time selection of the outbound proxy.
//!
//! A candidate is usable when going through it changes the apparent IP
//! address *and* the video host still serves metadata through it.

mod echo;
mod endpoint;

use std::{net::IpAddr, thread};

use miette::miette;
use tracing::{debug, error, info, warn};

pub use echo::{HttpIpEcho, IpEcho};
pub use endpoint::ProxyEndpoint;

use crate::{
    outside::VideoHost,
    result::{ErrorKind, Result},
};

#[derive(Debug)]
pub struct ProxySelector<'a> {
    echo: &'a dyn IpEcho,
    host: &'a dyn VideoHost,
    reference_url: &'a str,
    workers: usize,
}

impl<'a> ProxySelector<'a> {
    /// `reference_url` must point at a video known to be available,
    /// it is used to check that the host answers through a candidate.
    pub fn new(
        echo: &'a dyn IpEcho,
        host: &'a dyn VideoHost,
        reference_url: &'a str,
        workers: usize,
    ) -> Self {
        Self {
            echo,
            host,
            reference_url,
            workers: workers.max(1),
        }
    }

    /// Pick the first working proxy among the candidates.
    ///
    /// Returns `Ok(None)` when there is no candidate at all, without any network access.
    /// Returns [`ErrorKind::ProxyError`] if a candidate is malformed or if none works.
    pub fn select<S: AsRef<str>>(&self, candidates: &[S]) -> Result<Option<ProxyEndpoint>> {
        let candidates: Vec<&str> = candidates
            .iter()
            .map(|c| c.as_ref().trim())
            .filter(|c| !c.is_empty())
            .collect();
        if candidates.is_empty() {
            debug!("No proxy configured, using direct connections");
            return Ok(None);
        }

        let endpoints = candidates
            .iter()
            .map(|raw| {
                ProxyEndpoint::from_candidate(raw).inspect_err(|_| {
                    error!("Malformed proxy connection string: {raw:?}");
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let direct_ip = self.echo.apparent_ip(None).map_err(|report| {
            error!("Could not get the host IP address: {report:?}");
            ErrorKind::ProxyError
        })?;
        debug!("Direct IP address is {direct_ip}");

        let echoed = self.probe_all(&endpoints)?;
        let masking = endpoints
            .iter()
            .zip(echoed)
            .filter_map(|(endpoint, ip)| match ip {
                Some(ip) if ip == direct_ip => {
                    warn!("Proxy {endpoint} does not change the IP address ({ip})");
                    None
                }
                Some(ip) => {
                    debug!("Proxy {endpoint} appears as {ip}");
                    Some(endpoint)
                }
                None => None,
            });

        for endpoint in masking {
            match self.host.get_metadata(self.reference_url, Some(endpoint)) {
                Ok(metadata) if metadata.duration_seconds.is_some_and(|d| d > 0.0) => {
                    info!("Using proxy {endpoint}");
                    return Ok(Some(endpoint.clone()));
                }
                Ok(metadata) => {
                    warn!("Proxy {endpoint} returned incomplete metadata: {metadata}");
                }
                Err(failure) => {
                    warn!("Video host unreachable through proxy {endpoint}: {failure:?}");
                }
            }
        }

        error!("None of the {} proxies is usable", endpoints.len());
        Err(ErrorKind::ProxyError.into())
    }

    /// Ask the echo service for the apparent IP through every endpoint, concurrently.
    ///
    /// The result at index `i` belongs to `endpoints[i]`, `None` when the probe failed.
    fn probe_all(&self, endpoints: &[ProxyEndpoint]) -> Result<Vec<Option<IpAddr>>> {
        let workers = self.workers.min(endpoints.len());
        let (job_tx, jobs) = crossbeam_channel::bounded(endpoints.len());
        for job in endpoints.iter().enumerate() {
            job_tx
                .send(job)
                .map_err(|_| miette!("Could not queue the proxy check"))?;
        }
        drop(job_tx);

        let (result_tx, results) = crossbeam_channel::unbounded();
        thread::scope(|scope| -> Result<()> {
            for id in 0..workers {
                let jobs = jobs.clone();
                let result_tx = result_tx.clone();
                thread::Builder::new()
                    .name(format!("probe-{id}"))
                    .spawn_scoped(scope, move || {
                        for (idx, endpoint) in jobs {
                            let ip = match self.echo.apparent_ip(Some(endpoint)) {
                                Ok(ip) => Some(ip),
                                Err(report) => {
                                    warn!("Proxy {endpoint} probe failed: {report}");
                                    None
                                }
                            };
                            if result_tx.send((idx, ip)).is_err() {
                                break;
                            }
                        }
                    })?;
            }
            Ok(())
        })?;
        drop(result_tx);

        let mut slots = vec![None; endpoints.len()];
        for (idx, ip) in results {
            slots[idx] = ip;
        }
        Ok(slots)
    }
}
