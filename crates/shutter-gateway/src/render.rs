//! Turns router answers into HTTP responses.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, StatusCode};
use shutter_router::Served;
use tracing::warn;

pub fn render(served: Served) -> Response {
    match served {
        Served::Redirect { location, status } => match HeaderValue::from_str(&location) {
            Ok(value) => (status, [(LOCATION, value)]).into_response(),
            Err(_) => {
                warn!(location = %location, "Redirect target is not a valid header value");
                StatusCode::NOT_FOUND.into_response()
            }
        },
        Served::Json { status, body } => (status, Json(body)).into_response(),
        Served::Text { status, body } => (
            status,
            [(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
            body,
        )
            .into_response(),
        Served::Upstream(upstream) => {
            let (status, headers, response) = upstream.into_parts();
            let mut out = Response::new(Body::from_stream(response.bytes_stream()));
            *out.status_mut() = status;
            *out.headers_mut() = headers;
            out
        }
        Served::Placeholder(placeholder) => {
            let mut out = Response::new(Body::from(placeholder.body()));
            *out.status_mut() = placeholder.status();
            *out.headers_mut() = placeholder.headers();
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shutter_router::Placeholder;

    #[test]
    fn redirect_sets_location() {
        let response = render(Served::Redirect {
            location: "/Ab12Cd3xyz9/p".to_string(),
            status: StatusCode::FOUND,
        });
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/Ab12Cd3xyz9/p");
    }

    #[test]
    fn unusable_location_degrades_to_not_found() {
        let response = render(Served::Redirect {
            location: "/bad\nheader".to_string(),
            status: StatusCode::FOUND,
        });
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn text_is_plain() {
        let response = render(Served::Text {
            status: StatusCode::FORBIDDEN,
            body: "This image is password protected".to_string(),
        });
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn placeholder_keeps_its_headers() {
        let response = render(Served::Placeholder(Placeholder::new(StatusCode::BAD_GATEWAY)));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "image/svg+xml");
    }
}
