//! Request-to-endpoint selection across every registered service.

use http::Method;

use crate::params::Params;
use crate::template::{BindPoint, RouteTemplate};

/// A successful route selection.
#[derive(Debug)]
pub struct RouteMatch<'r, H> {
    /// The payload registered with the winning template (typically a
    /// handler reference or endpoint index).
    pub handler: &'r H,
    /// The winning template.
    pub template: &'r RouteTemplate,
    /// Parameters captured from the path.
    pub params: Params,
}

#[derive(Debug)]
struct Route<H> {
    template: RouteTemplate,
    bind: BindPoint,
    handler: H,
}

/// Matches inbound `(method, path, bind point)` triples against every
/// registered route template.
///
/// Templates from unrelated services may be structurally identical
/// (same segment counts, same parameter positions); they are told
/// apart purely by exact literal segments. See the crate docs for why
/// no ranking pass exists.
///
/// # Example
///
/// ```rust
/// use http::Method;
/// use nimbus_router::{BindPoint, Router, RouteTemplate};
///
/// let mut router = Router::new();
/// router.register(
///     "GET /providers/Microsoft.EventHub/namespaces/{n}".parse().unwrap(),
///     BindPoint::http(8080),
///     "eventhub",
/// );
///
/// let m = router
///     .match_request(BindPoint::http(8080), &Method::GET, "/providers/Microsoft.EventHub/namespaces/ns1")
///     .unwrap();
/// assert_eq!(*m.handler, "eventhub");
/// assert_eq!(m.params.get("n"), Some("ns1"));
/// ```
#[derive(Debug, Default)]
pub struct Router<H> {
    routes: Vec<Route<H>>,
}

impl<H> Router<H> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers one template on a bind point.
    pub fn register(&mut self, template: RouteTemplate, bind: BindPoint, handler: H) {
        self.routes.push(Route {
            template,
            bind,
            handler,
        });
    }

    /// Number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` when no templates are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Every distinct bind point with at least one registered template.
    #[must_use]
    pub fn bind_points(&self) -> Vec<BindPoint> {
        let mut points: Vec<BindPoint> = self.routes.iter().map(|r| r.bind).collect();
        points.sort_by_key(|b| (b.port, b.protocol as u8));
        points.dedup();
        points
    }

    /// Selects the endpoint for a request, or `None` when no template
    /// survives exact-literal filtering.
    ///
    /// If more than one template survives, the registration set is
    /// ambiguous (two services claimed the same literal path); that is
    /// a wiring bug, logged once per occurrence, and the first
    /// registration wins.
    #[must_use]
    pub fn match_request(
        &self,
        bind: BindPoint,
        method: &Method,
        path: &str,
    ) -> Option<RouteMatch<'_, H>> {
        let mut winner: Option<RouteMatch<'_, H>> = None;
        for route in &self.routes {
            if route.bind != bind {
                continue;
            }
            let Some(params) = route.template.matches(method, path) else {
                continue;
            };
            if let Some(existing) = &winner {
                tracing::warn!(
                    first = %existing.template,
                    second = %route.template,
                    %path,
                    "ambiguous route registration; keeping first"
                );
            } else {
                winner = Some(RouteMatch {
                    handler: &route.handler,
                    template: &route.template,
                    params,
                });
            }
        }
        winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(spec: &str) -> RouteTemplate {
        spec.parse().unwrap()
    }

    #[test]
    fn test_empty_router_matches_nothing() {
        let router: Router<u32> = Router::new();
        assert!(router.is_empty());
        assert!(router
            .match_request(BindPoint::http(1), &Method::GET, "/x")
            .is_none());
    }

    #[test]
    fn test_structurally_identical_templates_disambiguated_by_literal() {
        let mut router = Router::new();
        let bind = BindPoint::http(8080);
        router.register(
            template("GET /subscriptions/{s}/resourceGroups/{g}/providers/Microsoft.EventHub/namespaces/{n}"),
            bind,
            "eventhub",
        );
        router.register(
            template("GET /subscriptions/{s}/resourceGroups/{g}/providers/Microsoft.ServiceBus/namespaces/{n}"),
            bind,
            "servicebus",
        );

        let m = router
            .match_request(
                bind,
                &Method::GET,
                "/subscriptions/s1/resourceGroups/g1/providers/Microsoft.ServiceBus/namespaces/n1",
            )
            .unwrap();
        assert_eq!(*m.handler, "servicebus");

        let m = router
            .match_request(
                bind,
                &Method::GET,
                "/subscriptions/s1/resourceGroups/g1/providers/Microsoft.EventHub/namespaces/n1",
            )
            .unwrap();
        assert_eq!(*m.handler, "eventhub");

        // Matching neither provider namespace matches nothing.
        assert!(router
            .match_request(
                bind,
                &Method::GET,
                "/subscriptions/s1/resourceGroups/g1/providers/Microsoft.KeyVault/vaults/v1",
            )
            .is_none());
    }

    #[test]
    fn test_bind_point_is_part_of_match_identity() {
        let mut router = Router::new();
        router.register(template("GET /things/{id}"), BindPoint::http(8080), "a");
        router.register(template("GET /things/{id}"), BindPoint::https(8443), "b");

        let m = router
            .match_request(BindPoint::https(8443), &Method::GET, "/things/1")
            .unwrap();
        assert_eq!(*m.handler, "b");

        assert!(router
            .match_request(BindPoint::http(9999), &Method::GET, "/things/1")
            .is_none());
    }

    #[test]
    fn test_method_is_part_of_match_identity() {
        let mut router = Router::new();
        let bind = BindPoint::http(8080);
        router.register(template("PUT /things/{id}"), bind, "put");
        router.register(template("DELETE /things/{id}"), bind, "delete");

        let m = router.match_request(bind, &Method::DELETE, "/things/1").unwrap();
        assert_eq!(*m.handler, "delete");
    }

    #[test]
    fn test_ambiguous_registration_first_wins() {
        let mut router = Router::new();
        let bind = BindPoint::http(8080);
        router.register(template("GET /same/{x}"), bind, "first");
        router.register(template("GET /same/{y}"), bind, "second");

        let m = router.match_request(bind, &Method::GET, "/same/1").unwrap();
        assert_eq!(*m.handler, "first");
        assert_eq!(m.params.get("x"), Some("1"));
    }

    #[test]
    fn test_bind_points_deduplicated() {
        let mut router = Router::new();
        router.register(template("GET /a"), BindPoint::http(8080), 0);
        router.register(template("GET /b"), BindPoint::http(8080), 1);
        router.register(template("GET /c"), BindPoint::https(8443), 2);

        let points = router.bind_points();
        assert_eq!(points, vec![BindPoint::http(8080), BindPoint::https(8443)]);
    }
}
