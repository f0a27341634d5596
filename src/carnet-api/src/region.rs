//! Home region lookup, memoized per VIN.

use std::collections::HashMap;

use tracing::{debug, info};
use url::Url;

use carnet_login::{Result, TokenScope};

use crate::gateway::{ApiRequest, BASE_URL, Gateway, MAL_URL};
use crate::responses::HomeRegionResponse;

/// Marker of the default management cluster.
const DEFAULT_CLUSTER: &str = "mal-1a";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionEndpoints {
    /// Base for vehicle-scoped calls (`.../fs-car`).
    pub vehicle_base: String,
    /// Management base reported by the home region lookup.
    pub management_base: String,
}

impl RegionEndpoints {
    /// Derive the vehicle base from the management base.
    pub fn from_management_base(management_base: &str) -> Result<Self> {
        let vehicle_base = if management_base.contains(DEFAULT_CLUSTER) {
            BASE_URL.to_string()
        } else {
            let url = Url::parse(management_base)?;
            let host = url.host_str().unwrap_or_default().replace("mal", "fal");
            match url.port() {
                Some(port) => format!("{}://{host}:{port}/fs-car", url.scheme()),
                None => format!("{}://{host}/fs-car", url.scheme()),
            }
        };
        Ok(Self {
            vehicle_base,
            management_base: management_base.to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct RegionResolver {
    cache: HashMap<String, RegionEndpoints>,
}

impl RegionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoints for `vin`; only the first call per VIN touches the network.
    pub fn resolve(&mut self, gateway: &mut Gateway, vin: &str) -> Result<RegionEndpoints> {
        if let Some(endpoints) = self.cache.get(vin) {
            return Ok(endpoints.clone());
        }

        let response: HomeRegionResponse = gateway.fetch(
            ApiRequest::get(MAL_URL, format!("/cs/vds/v1/vehicles/{vin}/homeRegion"))
                .scope(TokenScope::Vehicle),
        )?;
        let endpoints = RegionEndpoints::from_management_base(&response.home_region.base_uri.content)?;
        debug!(fal = %endpoints.vehicle_base, mal = %endpoints.management_base, "Resolved home region");
        info!("Received fal/mal Uri");

        self.cache.insert(vin.to_string(), endpoints.clone());
        Ok(endpoints)
    }
}
