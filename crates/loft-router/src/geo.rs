//! Client geo-resolution with a TTL-bounded cache.
//!
//! Lookup order per IP: loopback/private addresses short-circuit to a
//! fixed `Local/Development` tag without any lookup; then the cache; then
//! the primary HTTP resolver under a short deadline; then the static
//! prefix table from config; finally `Unknown`. Expired cache entries are
//! purged by a periodic background task.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info};

use loft_core::config::GeoConfig;

/// A resolved `{country, city}` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub country: String,
    pub city: String,
}

impl Location {
    pub fn unknown() -> Self {
        Self {
            country: "Unknown".to_string(),
            city: "Unknown".to_string(),
        }
    }

    /// Fixed tag for loopback and private addresses.
    pub fn local() -> Self {
        Self {
            country: "Local".to_string(),
            city: "Development".to_string(),
        }
    }
}

struct CacheEntry {
    location: Location,
    expires_at: Instant,
}

/// Response shape of the primary resolver endpoint.
#[derive(Deserialize)]
struct GeoResponse {
    country: Option<String>,
    city: Option<String>,
}

/// Shared geo-resolution service.
///
/// The cache is the router's only cross-request shared mutable state; it
/// is guarded by a plain `RwLock` (reads dominate).
pub struct GeoService {
    cache: RwLock<HashMap<IpAddr, CacheEntry>>,
    ttl: Duration,
    client: Option<reqwest::Client>,
    endpoint: Option<String>,
    static_table: Vec<(String, Location)>,
}

impl GeoService {
    pub fn new(config: &GeoConfig) -> Self {
        let client = config.endpoint.as_ref().and_then(|_| {
            reqwest::Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .ok()
        });
        let static_table = config
            .static_table
            .iter()
            .map(|(prefix, tag)| {
                let (country, city) = tag.split_once('/').unwrap_or((tag.as_str(), "Unknown"));
                (
                    prefix.clone(),
                    Location {
                        country: country.to_string(),
                        city: city.to_string(),
                    },
                )
            })
            .collect();
        Self {
            cache: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            client,
            endpoint: config.endpoint.clone(),
            static_table,
        }
    }

    /// Resolve an address to a location, consulting the cache first.
    pub async fn resolve(&self, ip: IpAddr) -> Location {
        if is_local(ip) {
            return Location::local();
        }

        if let Some(hit) = self.cached(ip) {
            return hit;
        }

        let location = match self.primary_lookup(ip).await {
            Some(location) => location,
            None => self
                .static_lookup(ip)
                .unwrap_or_else(Location::unknown),
        };

        let mut cache = self.cache.write().expect("geo cache lock");
        cache.insert(
            ip,
            CacheEntry {
                location: location.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        location
    }

    fn cached(&self, ip: IpAddr) -> Option<Location> {
        let cache = self.cache.read().expect("geo cache lock");
        let entry = cache.get(&ip)?;
        (entry.expires_at > Instant::now()).then(|| entry.location.clone())
    }

    async fn primary_lookup(&self, ip: IpAddr) -> Option<Location> {
        let endpoint = self.endpoint.as_ref()?;
        let client = self.client.as_ref()?;
        let url = format!("{}/{ip}", endpoint.trim_end_matches('/'));
        let response = client.get(&url).send().await.ok()?;
        let body: GeoResponse = response.json().await.ok()?;
        let country = body.country.filter(|c| !c.is_empty())?;
        Some(Location {
            country,
            city: body.city.unwrap_or_else(|| "Unknown".to_string()),
        })
    }

    fn static_lookup(&self, ip: IpAddr) -> Option<Location> {
        let text = ip.to_string();
        self.static_table
            .iter()
            .find(|(prefix, _)| text.starts_with(prefix.as_str()))
            .map(|(_, location)| location.clone())
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut cache = self.cache.write().expect("geo cache lock");
        let before = cache.len();
        let now = Instant::now();
        cache.retain(|_, entry| entry.expires_at > now);
        before - cache.len()
    }

    /// Number of live cache entries.
    pub fn cached_entries(&self) -> usize {
        self.cache.read().expect("geo cache lock").len()
    }

    /// Periodic purge loop; runs until the shutdown signal flips.
    pub async fn run_purge(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        debug!(purged, "expired geo cache entries removed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("geo cache purge loop stopping");
                    break;
                }
            }
        }
    }
}

/// Addresses that never leave the machine or LAN get the fixed local tag.
fn is_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            // fc00::/7 is the unique-local range.
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn config_with(
        endpoint: Option<&str>,
        ttl_secs: u64,
        table: &[(&str, &str)],
    ) -> GeoConfig {
        GeoConfig {
            endpoint: endpoint.map(str::to_string),
            timeout_ms: 100,
            cache_ttl_secs: ttl_secs,
            purge_interval_secs: 1,
            static_table: table
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<StdHashMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn loopback_short_circuits_to_local_tag() {
        let geo = GeoService::new(&config_with(None, 60, &[]));
        let location = geo.resolve("127.0.0.1".parse().unwrap()).await;
        assert_eq!(location, Location::local());
        // Short-circuited addresses are not cached.
        assert_eq!(geo.cached_entries(), 0);
    }

    #[tokio::test]
    async fn private_ranges_are_local() {
        let geo = GeoService::new(&config_with(None, 60, &[]));
        for ip in ["10.0.0.1", "192.168.1.5", "172.16.0.9", "::1"] {
            let location = geo.resolve(ip.parse().unwrap()).await;
            assert_eq!(location, Location::local(), "{ip}");
        }
    }

    #[tokio::test]
    async fn static_table_is_the_fallback() {
        let geo = GeoService::new(&config_with(
            None,
            60,
            &[("203.0.113.", "Germany/Berlin")],
        ));
        let location = geo.resolve("203.0.113.7".parse().unwrap()).await;
        assert_eq!(location.country, "Germany");
        assert_eq!(location.city, "Berlin");
    }

    #[tokio::test]
    async fn unmatched_public_ip_is_unknown() {
        let geo = GeoService::new(&config_with(None, 60, &[]));
        let location = geo.resolve("198.51.100.23".parse().unwrap()).await;
        assert_eq!(location, Location::unknown());
    }

    #[tokio::test]
    async fn resolutions_are_cached_and_purgeable() {
        // TTL of zero: every entry is expired the moment it lands.
        let geo = GeoService::new(&config_with(None, 0, &[]));
        geo.resolve("198.51.100.23".parse().unwrap()).await;
        assert_eq!(geo.cached_entries(), 1);
        assert_eq!(geo.purge_expired(), 1);
        assert_eq!(geo.cached_entries(), 0);
    }

    #[tokio::test]
    async fn cache_hit_skips_resolution() {
        let geo = GeoService::new(&config_with(
            None,
            60,
            &[("198.51.", "France/Paris")],
        ));
        let ip: IpAddr = "198.51.100.23".parse().unwrap();
        let first = geo.resolve(ip).await;
        let second = geo.resolve(ip).await;
        assert_eq!(first, second);
        assert_eq!(geo.cached_entries(), 1);
    }

    #[test]
    fn static_tag_without_city() {
        let geo = GeoService::new(&config_with(None, 60, &[("9.9.", "Sweden")]));
        let location = geo.static_lookup("9.9.9.9".parse().unwrap()).unwrap();
        assert_eq!(location.country, "Sweden");
        assert_eq!(location.city, "Unknown");
    }
}
