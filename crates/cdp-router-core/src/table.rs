use cdp_config::{RouteEntry, RoutingConfig};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub fqdn: String,
    pub metric: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct RealmEntry {
    realm: String,
    routes: Vec<Route>,
}

/// Realm routes kept in ascending metric order, plus the default routes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutingTable {
    realms: Vec<RealmEntry>,
    default_routes: Vec<Route>,
}

fn sorted(entries: &[RouteEntry]) -> Vec<Route> {
    let mut routes: Vec<Route> = entries
        .iter()
        .map(|r| Route {
            fqdn: r.fqdn.clone(),
            metric: r.metric,
        })
        .collect();
    // stable: equal metrics keep their configured order
    routes.sort_by_key(|r| r.metric);
    routes
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RoutingConfig) -> Self {
        let mut table = Self::new();
        for realm in &config.realms {
            for route in &realm.routes {
                table.add_route(&realm.realm, &route.fqdn, route.metric);
            }
        }
        table.default_routes = sorted(&config.default_routes);
        table
    }

    /// Add a route, keeping the realm's routes ordered by metric
    pub fn add_route(&mut self, realm: &str, fqdn: &str, metric: u32) {
        let idx = match self
            .realms
            .iter()
            .position(|r| r.realm.eq_ignore_ascii_case(realm))
        {
            Some(idx) => idx,
            None => {
                self.realms.push(RealmEntry {
                    realm: realm.to_string(),
                    routes: Vec::new(),
                });
                self.realms.len() - 1
            }
        };
        let routes = &mut self.realms[idx].routes;
        let at = routes.partition_point(|r| r.metric <= metric);
        routes.insert(
            at,
            Route {
                fqdn: fqdn.to_string(),
                metric,
            },
        );
    }

    pub fn add_default_route(&mut self, fqdn: &str, metric: u32) {
        let at = self.default_routes.partition_point(|r| r.metric <= metric);
        self.default_routes.insert(
            at,
            Route {
                fqdn: fqdn.to_string(),
                metric,
            },
        );
    }

    /// Routes of `realm` (case-insensitive), empty if the realm is unknown
    pub fn routes_for(&self, realm: &str) -> &[Route] {
        self.realms
            .iter()
            .find(|r| r.realm.eq_ignore_ascii_case(realm))
            .map(|r| r.routes.as_slice())
            .unwrap_or(&[])
    }

    pub fn default_routes(&self) -> &[Route] {
        &self.default_routes
    }

    pub fn realms(&self) -> impl Iterator<Item = &str> {
        self.realms.iter().map(|r| r.realm.as_str())
    }
}
