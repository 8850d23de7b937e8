/// Address resolution
///
/// Geocoding is best-effort enrichment: a listing is created even when the
/// address cannot be resolved, in which case the location is stored at the
/// `(0, 0)` sentinel.
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::models::{AddressFields, Coordinates};

/// Trait for address-to-coordinate resolvers
///
/// Implementations absorb every failure and never surface an error to the
/// caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolves an address, falling back to [`Coordinates::FALLBACK`]
    async fn resolve(&self, address: &AddressFields) -> Coordinates;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Outcome of one geocoding request, before the fallback policy applies
#[derive(Debug)]
enum Lookup {
    Found(Coordinates),
    NoMatch,
    Transient(String),
    Failed(String),
}

/// Single result entry of a Nominatim search; coordinates arrive as strings
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: Option<String>,
    lon: Option<String>,
}

/// Nominatim (OpenStreetMap) search client
#[derive(Clone)]
pub struct NominatimGeocoder {
    http_client: HttpClient,
    api_url: String,
    retry_backoff: Duration,
}

impl NominatimGeocoder {
    pub fn new(
        api_url: String,
        user_agent: &str,
        timeout: Duration,
        retry_backoff: Duration,
    ) -> reqwest::Result<Self> {
        let http_client = HttpClient::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            api_url,
            retry_backoff,
        })
    }

    async fn lookup(&self, address: &AddressFields) -> Lookup {
        let response = self
            .http_client
            .get(&self.api_url)
            .query(&[
                ("street", address.street.as_str()),
                ("city", address.city.as_str()),
                ("country", address.country.as_str()),
                ("postalcode", address.postal_code.as_str()),
                ("format", "json"),
                ("limit", "1"),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Lookup::Failed(format!("timed out: {}", e)),
            Err(e) => return Lookup::Transient(e.to_string()),
        };

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Lookup::Transient(format!("status {}", status));
        }
        if !status.is_success() {
            return Lookup::Failed(format!("status {}", status));
        }

        match response.text().await {
            Ok(body) => parse_search_response(&body),
            Err(e) if e.is_timeout() => Lookup::Failed(format!("timed out: {}", e)),
            Err(e) => Lookup::Transient(e.to_string()),
        }
    }
}

/// Extracts the first place's coordinates from a Nominatim JSON body
fn parse_search_response(body: &str) -> Lookup {
    let places: Vec<NominatimPlace> = match serde_json::from_str(body) {
        Ok(places) => places,
        Err(e) => return Lookup::Failed(format!("malformed response: {}", e)),
    };

    let Some(place) = places.into_iter().next() else {
        return Lookup::NoMatch;
    };

    let latitude = place.lat.as_deref().and_then(|v| v.trim().parse::<f64>().ok());
    let longitude = place.lon.as_deref().and_then(|v| v.trim().parse::<f64>().ok());

    match (latitude, longitude) {
        (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
            Lookup::Found(Coordinates::new(lat, lon))
        }
        _ => Lookup::Failed("first match has no usable lat/lon".to_string()),
    }
}

#[async_trait::async_trait]
impl Geocoder for NominatimGeocoder {
    async fn resolve(&self, address: &AddressFields) -> Coordinates {
        let mut lookup = self.lookup(address).await;

        if let Lookup::Transient(reason) = &lookup {
            tracing::warn!(
                reason = %reason,
                backoff_ms = self.retry_backoff.as_millis() as u64,
                "Geocoding request failed, retrying once"
            );
            tokio::time::sleep(self.retry_backoff).await;
            lookup = self.lookup(address).await;
        }

        match lookup {
            Lookup::Found(coordinates) => {
                tracing::debug!(
                    city = %address.city,
                    latitude = coordinates.latitude,
                    longitude = coordinates.longitude,
                    "Address resolved"
                );
                coordinates
            }
            Lookup::NoMatch => {
                tracing::warn!(
                    city = %address.city,
                    postal_code = %address.postal_code,
                    "No geocoding match, using fallback coordinates"
                );
                Coordinates::FALLBACK
            }
            Lookup::Transient(reason) | Lookup::Failed(reason) => {
                tracing::warn!(
                    city = %address.city,
                    reason = %reason,
                    "Geocoding failed, using fallback coordinates"
                );
                Coordinates::FALLBACK
            }
        }
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Query, State},
        http::StatusCode as AxumStatus,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    #[derive(Clone)]
    struct Scripted {
        calls: Arc<AtomicUsize>,
        responses: Arc<Vec<(AxumStatus, &'static str)>>,
        delay: Duration,
        seen_query: Arc<tokio::sync::Mutex<Option<HashMap<String, String>>>>,
    }

    async fn search(
        State(script): State<Scripted>,
        Query(query): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        let call = script.calls.fetch_add(1, Ordering::SeqCst);
        *script.seen_query.lock().await = Some(query);
        tokio::time::sleep(script.delay).await;
        let index = call.min(script.responses.len() - 1);
        script.responses[index]
    }

    async fn spawn_geocoder(
        responses: Vec<(AxumStatus, &'static str)>,
        delay: Duration,
    ) -> (NominatimGeocoder, Scripted) {
        let script = Scripted {
            calls: Arc::default(),
            responses: Arc::new(responses),
            delay,
            seen_query: Arc::default(),
        };
        let app = Router::new()
            .route("/search", get(search))
            .with_state(script.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let geocoder = NominatimGeocoder::new(
            format!("http://{}/search", addr),
            "listing-api-tests",
            Duration::from_millis(200),
            Duration::from_millis(5),
        )
        .unwrap();

        (geocoder, script)
    }

    fn address() -> AddressFields {
        AddressFields {
            street: "10 Downing Street".to_string(),
            city: "London".to_string(),
            state: None,
            country: "United Kingdom".to_string(),
            postal_code: "SW1A 2AA".to_string(),
        }
    }

    #[test]
    fn test_parse_first_match() {
        let body = r#"[{"lat": "51.5033635", "lon": "-0.1276248", "display_name": "10 Downing St"}]"#;
        match parse_search_response(body) {
            Lookup::Found(c) => {
                assert_eq!(c.latitude, 51.5033635);
                assert_eq!(c.longitude, -0.1276248);
            }
            other => panic!("unexpected lookup {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_array_is_no_match() {
        assert!(matches!(parse_search_response("[]"), Lookup::NoMatch));
    }

    #[test]
    fn test_parse_malformed_or_partial() {
        assert!(matches!(
            parse_search_response(r#"{"error": "bad"}"#),
            Lookup::Failed(_)
        ));
        assert!(matches!(
            parse_search_response(r#"[{"lat": "51.5"}]"#),
            Lookup::Failed(_)
        ));
        assert!(matches!(
            parse_search_response(r#"[{"lat": "north", "lon": "-0.12"}]"#),
            Lookup::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_resolve_sends_structured_query() {
        let (geocoder, script) = spawn_geocoder(
            vec![(AxumStatus::OK, r#"[{"lat": "51.5", "lon": "-0.12"}]"#)],
            Duration::ZERO,
        )
        .await;

        let coordinates = geocoder.resolve(&address()).await;

        assert_eq!(coordinates, Coordinates::new(51.5, -0.12));
        let query = script.seen_query.lock().await.clone().unwrap();
        assert_eq!(query["street"], "10 Downing Street");
        assert_eq!(query["postalcode"], "SW1A 2AA");
        assert_eq!(query["format"], "json");
        assert_eq!(query["limit"], "1");
    }

    #[tokio::test]
    async fn test_no_match_falls_back_without_retry() {
        let (geocoder, script) =
            spawn_geocoder(vec![(AxumStatus::OK, "[]")], Duration::ZERO).await;

        assert!(geocoder.resolve(&address()).await.is_fallback());
        assert_eq!(script.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried_once() {
        let (geocoder, script) = spawn_geocoder(
            vec![
                (AxumStatus::BAD_GATEWAY, ""),
                (AxumStatus::OK, r#"[{"lat": "1.5", "lon": "2.5"}]"#),
            ],
            Duration::ZERO,
        )
        .await;

        assert_eq!(geocoder.resolve(&address()).await, Coordinates::new(1.5, 2.5));
        assert_eq!(script.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_server_error_falls_back_after_one_retry() {
        let (geocoder, script) =
            spawn_geocoder(vec![(AxumStatus::SERVICE_UNAVAILABLE, "")], Duration::ZERO).await;

        assert!(geocoder.resolve(&address()).await.is_fallback());
        assert_eq!(script.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let (geocoder, _script) = spawn_geocoder(
            vec![(AxumStatus::OK, r#"[{"lat": "1.5", "lon": "2.5"}]"#)],
            Duration::from_secs(2),
        )
        .await;

        assert!(geocoder.resolve(&address()).await.is_fallback());
    }

    #[tokio::test]
    async fn test_unreachable_service_falls_back() {
        let geocoder = NominatimGeocoder::new(
            "http://127.0.0.1:9/search".to_string(),
            "listing-api-tests",
            Duration::from_millis(200),
            Duration::from_millis(1),
        )
        .unwrap();

        assert!(geocoder.resolve(&address()).await.is_fallback());
    }
}
