mod health;
mod image;

pub use health::{health_handler, readiness_handler, HealthResponse, ReadinessResponse};
pub use image::image_handler;
