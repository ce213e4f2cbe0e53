use shutter_cache::RedisLink;
use shutter_router::ImageRouter;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    router: Arc<ImageRouter>,
    redis: Option<RedisLink>,
}

impl AppState {
    pub fn new(router: ImageRouter) -> Self {
        Self {
            router: Arc::new(router),
            redis: None,
        }
    }

    /// Lets the readiness probe check the distributed tier.
    pub fn with_redis(mut self, link: RedisLink) -> Self {
        self.redis = Some(link);
        self
    }

    pub fn router(&self) -> &ImageRouter {
        &self.router
    }

    pub fn redis(&self) -> Option<&RedisLink> {
        self.redis.as_ref()
    }
}
