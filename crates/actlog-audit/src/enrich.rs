//! Best-effort geolocation and client-hint enrichment.
//!
//! Nothing in this module returns an error to the pipeline. Lookups that fail
//! leave their fields empty and the event is persisted without them.

use maxminddb::{Reader, geoip2};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use actlog_core::{GeoIpConfig, HeaderConfig};

use crate::context::{Headers, RequestContext};
use crate::error::EnrichmentError;
use crate::event::{ClientDescriptor, EventOrigin, GeoLocation};

/// Resolves an address to an approximate location.
pub trait GeoLocator: Send + Sync {
    fn locate(&self, ip: IpAddr) -> Result<GeoLocation, EnrichmentError>;
}

/// Locator used when no database is configured.
pub struct NoGeoLocator;

impl GeoLocator for NoGeoLocator {
    fn locate(&self, _ip: IpAddr) -> Result<GeoLocation, EnrichmentError> {
        Err(EnrichmentError::NoDatabase)
    }
}

/// MaxMind City database (`GeoLite2-City.mmdb` or compatible).
pub struct MaxMindLocator {
    reader: Reader<Vec<u8>>,
}

impl MaxMindLocator {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EnrichmentError> {
        let reader = Reader::open_readfile(path.as_ref())
            .map_err(|e| EnrichmentError::Open(e.to_string()))?;
        Ok(Self { reader })
    }
}

impl GeoLocator for MaxMindLocator {
    fn locate(&self, ip: IpAddr) -> Result<GeoLocation, EnrichmentError> {
        let city: geoip2::City = self
            .reader
            .lookup(ip)
            .map_err(|e| EnrichmentError::Lookup(e.to_string()))?;

        let location = city.location.as_ref();
        Ok(GeoLocation {
            latitude: location.and_then(|l| l.latitude),
            longitude: location.and_then(|l| l.longitude),
            city: city
                .city
                .as_ref()
                .and_then(|c| c.names.as_ref())
                .and_then(|names| names.get("en"))
                .map(|name| name.to_string()),
            country: city.country.as_ref().and_then(|c| {
                c.names
                    .as_ref()
                    .and_then(|names| names.get("en"))
                    .map(|name| name.to_string())
                    .or_else(|| c.iso_code.map(str::to_string))
            }),
        })
    }
}

/// Build the locator described by configuration.
///
/// A configured database that cannot be opened degrades to no geolocation.
pub fn locator_from_config(config: &GeoIpConfig) -> Arc<dyn GeoLocator> {
    let Some(path) = &config.database_path else {
        return Arc::new(NoGeoLocator);
    };
    match MaxMindLocator::open(path) {
        Ok(locator) => {
            tracing::info!(path = %path.display(), "Geolocation database loaded");
            Arc::new(locator)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Geolocation disabled");
            Arc::new(NoGeoLocator)
        }
    }
}

/// Result of enriching one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub geo: GeoLocation,
    pub client: ClientDescriptor,
}

/// Derives network origin and client metadata for events.
pub struct Enricher {
    headers: HeaderConfig,
    locator: Arc<dyn GeoLocator>,
}

impl Enricher {
    pub fn new(headers: HeaderConfig, locator: Arc<dyn GeoLocator>) -> Self {
        Self { headers, locator }
    }

    /// Look up `remote_ip` and read the client-hint headers. Never fails.
    pub fn enrich(&self, remote_ip: Option<&str>, headers: &Headers) -> Enrichment {
        let geo = match remote_ip.map(|ip| self.geolocate(ip)) {
            Some(Ok(geo)) => geo,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "geolocation unavailable");
                GeoLocation::default()
            }
            None => GeoLocation::default(),
        };

        Enrichment {
            geo,
            client: self.client_descriptor(headers),
        }
    }

    /// Remote address of the request: the first entry of the forwarded header
    /// when configured and present, the peer address otherwise.
    pub fn remote_ip(&self, ctx: &RequestContext) -> Option<String> {
        let forwarded = self
            .headers
            .remote_addr
            .as_deref()
            .and_then(|name| ctx.headers.get_non_empty(name))
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        match forwarded {
            Some(ip) => Some(ip.to_string()),
            None => ctx.peer_addr.map(|ip| ip.to_string()),
        }
    }

    /// Full origin of an event captured in `ctx`, or an empty origin without one.
    pub fn origin(&self, ctx: Option<&RequestContext>) -> EventOrigin {
        let Some(ctx) = ctx else {
            return EventOrigin::default();
        };
        let remote_ip = self.remote_ip(ctx);
        let enrichment = self.enrich(remote_ip.as_deref(), &ctx.headers);
        EventOrigin {
            remote_ip,
            geo: enrichment.geo,
            client: enrichment.client,
        }
    }

    fn geolocate(&self, raw: &str) -> Result<GeoLocation, EnrichmentError> {
        let ip = parse_ip(raw)?;
        if !is_public(&ip) {
            return Err(EnrichmentError::NonRoutable(ip));
        }
        self.locator.locate(ip)
    }

    fn client_descriptor(&self, headers: &Headers) -> ClientDescriptor {
        let read = |name: &str| headers.get_non_empty(name).map(str::to_string);
        ClientDescriptor {
            browser: read(&self.headers.browser),
            platform: read(&self.headers.platform),
            operating_system: read(&self.headers.operating_system),
        }
    }
}

/// Accepts bare addresses as well as `ip:port` and `[v6]:port` forms.
fn parse_ip(raw: &str) -> Result<IpAddr, EnrichmentError> {
    let raw = raw.trim();
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Ok(ip);
    }
    raw.parse::<std::net::SocketAddr>()
        .map(|addr| addr.ip())
        .map_err(|_| EnrichmentError::InvalidAddress(raw.to_string()))
}

fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            !(v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80)
        }
    }
}
