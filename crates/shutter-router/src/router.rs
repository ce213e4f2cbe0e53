use http::header::{RANGE, REFERER};
use http::{HeaderMap, StatusCode};
use jiff::Timestamp;
use shutter_core::{CacheLookup, ImageMapping, MappingCache, RequestTarget};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::classifier::{classify, Classification, ClientType};
use crate::config::RouterConfig;
use crate::planner::{self, ErrorBody, ErrorKind, PlanContext, ResponsePlan};
use crate::policy::AccessPolicy;
use crate::proxy::ProxyFetcher;
use crate::resolver::ResourceResolver;
use crate::response::Served;
use crate::stats::{AccessEvent, AccessType, StatsRecorder};

/// A planned answer plus what is known about the request that produced it.
#[derive(Debug, Clone)]
pub struct Decision {
    pub plan: ResponsePlan,
    pub target: Option<RequestTarget>,
    pub mapping: Option<ImageMapping>,
    pub classification: Option<Classification>,
}

impl Decision {
    fn not_found(plan: ResponsePlan, target: Option<RequestTarget>) -> Self {
        Self {
            plan,
            target,
            mapping: None,
            classification: None,
        }
    }
}

/// The unified image-access router.
///
/// Flow per request: parse, cache lookup, store lookup on miss (populating
/// the cache), expiry check, classification, planning, password gating,
/// execution, and finally a detached stats record. Never fails: every
/// fault degrades to a well-defined answer.
#[derive(Clone)]
pub struct ImageRouter {
    cache: Arc<dyn MappingCache>,
    resolver: ResourceResolver,
    policy: AccessPolicy,
    proxy: ProxyFetcher,
    stats: StatsRecorder,
    config: RouterConfig,
}

impl std::fmt::Debug for ImageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRouter")
            .field("cache", &self.cache.name())
            .field("resolver", &self.resolver)
            .field("policy", &self.policy)
            .field("stats", &self.stats)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ImageRouter {
    pub fn new(
        cache: Arc<dyn MappingCache>,
        resolver: ResourceResolver,
        policy: AccessPolicy,
        proxy: ProxyFetcher,
        stats: StatsRecorder,
        config: RouterConfig,
    ) -> Self {
        Self {
            cache,
            resolver,
            policy,
            proxy,
            stats,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<dyn MappingCache> {
        &self.cache
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Handles one request for the raw path segment `raw`.
    pub async fn handle(&self, raw: &str, headers: &HeaderMap) -> Served {
        let now = Timestamp::now();
        let decision = self.decide(raw, headers, now).await;
        let served = self.execute(&decision, headers, now).await;

        if let Some(target) = &decision.target {
            let access_type = access_type(&decision, &served);
            self.stats.record(AccessEvent {
                id: target.id().clone(),
                client_type: decision
                    .classification
                    .as_ref()
                    .map_or(ClientType::Unknown, |c| c.client_type),
                access_type,
                referer: header_string(headers, REFERER.as_str()),
                client_ip: client_ip(headers),
                at: now,
            });
        }

        served
    }

    /// Runs the pipeline up to, but not including, execution.
    pub async fn decide(&self, raw: &str, headers: &HeaderMap, now: Timestamp) -> Decision {
        let prefix = &self.config.not_found_prefix;

        let Ok(target) = RequestTarget::parse(raw) else {
            debug!(raw, "Rejecting malformed identifier");
            return Decision::not_found(ResponsePlan::not_found(prefix, raw), None);
        };
        let id = target.id();

        let mapping = match self.cache.lookup(id).await {
            CacheLookup::Hit(mapping) => {
                trace!(id = %id, tier = self.cache.name(), "Served mapping from cache");
                mapping
            }
            // Answered from the cached copy; the store is not consulted.
            CacheLookup::Expired(mapping) => mapping,
            CacheLookup::Miss => match self.resolver.resolve(id).await {
                Some(mapping) => {
                    if !mapping.is_expired(now) {
                        self.cache.set(id, &mapping, Some(self.config.cache_ttl)).await;
                    }
                    mapping
                }
                None => {
                    return Decision::not_found(ResponsePlan::not_found(prefix, raw), Some(target));
                }
            },
        };

        if let Some(expired) = self.policy.check_expiry(&mapping, now) {
            self.cache.delete(id).await;
            return Decision {
                plan: expired,
                target: Some(target),
                mapping: Some(mapping),
                classification: None,
            };
        }

        let classification = classify(headers, target.has_extension());
        let ctx = PlanContext {
            serve_mode: self.config.serve_mode,
            preview_base: &self.config.preview_base,
        };
        let plan = planner::plan(&target, &classification, &mapping, ctx);

        let preview = format!("{}{}", self.config.preview_base, id.preview_path());
        let plan = self
            .policy
            .gate(plan, &mapping, &classification, headers, &preview, now);

        Decision {
            plan,
            target: Some(target),
            mapping: Some(mapping),
            classification: Some(classification),
        }
    }

    async fn execute(&self, decision: &Decision, headers: &HeaderMap, now: Timestamp) -> Served {
        match &decision.plan {
            ResponsePlan::Redirect { location, status } => Served::Redirect {
                location: location.clone(),
                status: *status,
            },
            ResponsePlan::Json { payload, status } => Served::Json {
                status: *status,
                body: payload.clone(),
            },
            ResponsePlan::Error { status, body, .. } => match body {
                ErrorBody::Text(text) => Served::Text {
                    status: *status,
                    body: text.clone(),
                },
                ErrorBody::Json(json) => Served::Json {
                    status: *status,
                    body: json.clone(),
                },
            },
            ResponsePlan::Proxy {
                url,
                headers: forward,
            } => {
                let Some(mapping) = &decision.mapping else {
                    return Served::Text {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        body: "Internal error".to_string(),
                    };
                };

                let mut forward = forward.clone();
                if let Some(range) = headers.get(RANGE) {
                    forward.insert(RANGE, range.clone());
                }
                self.proxy.serve(url, &forward, mapping, now).await
            }
        }
    }
}

fn access_type(decision: &Decision, served: &Served) -> AccessType {
    match (&decision.plan, served) {
        (_, Served::Upstream(_)) => AccessType::Proxy,
        (_, Served::Placeholder(_)) => AccessType::Failed,
        (ResponsePlan::Error { kind, .. }, _) => match kind {
            ErrorKind::Expired => AccessType::Expired,
            ErrorKind::NotFound => AccessType::NotFound,
            _ => AccessType::Denied,
        },
        (ResponsePlan::Json { .. }, _) => AccessType::Metadata,
        (ResponsePlan::Redirect { .. }, _) if decision.mapping.is_none() => AccessType::NotFound,
        (plan @ ResponsePlan::Redirect { .. }, _) => match &decision.mapping {
            Some(mapping) if plan.serves_content(mapping) => AccessType::Direct,
            _ => AccessType::Preview,
        },
        (ResponsePlan::Proxy { .. }, _) => AccessType::Proxy,
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First `X-Forwarded-For` hop, else `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_string(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|hop| hop.trim().to_string()))
        .filter(|hop| !hop.is_empty())
        .or_else(|| header_string(headers, "x-real-ip"))
}
