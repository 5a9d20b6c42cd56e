//! Google Street View source images.
//!
//! Images are fetched from the Street View Static API by place name or by
//! coordinates. Random locations come from the 3geonames random-land API,
//! with a fixed list of well-covered cities as a fallback.

use crate::config::explicit_or_env;
use crate::error::{classify_http_error, Result, UrbanVizError};
use crate::store::write_bytes_atomic;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const STREETVIEW_URL: &str = "https://maps.googleapis.com/maps/api/streetview";
const METADATA_URL: &str = "https://maps.googleapis.com/maps/api/streetview/metadata";
const RANDOM_LAND_URL: &str = "https://api.3geonames.org/?randomland=yes&json=1";

/// Image size requested from the Static API.
pub const IMAGE_SIZE: &str = "600x400";

/// Responses smaller than this are grey "no imagery" placeholders.
pub const MIN_IMAGE_BYTES: usize = 5000;

/// Random coordinates tried before falling back to known cities.
pub const RANDOM_ATTEMPTS: usize = 3;

/// Cities with dense Street View coverage.
pub const FALLBACK_CITIES: [(&str, f64, f64); 5] = [
    ("Manhattan, NY", 40.714728, -73.998672),
    ("Paris, France", 48.858370, 2.294481),
    ("Tokyo, Japan", 35.689487, 139.691711),
    ("London, UK", 51.507351, -0.127758),
    ("Sydney, Australia", -33.868820, 151.209296),
];

/// Where to point the camera.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    /// Free-text place, geocoded by Google.
    Place(String),
    Coordinates {
        latitude: f64,
        longitude: f64,
        name: Option<String>,
    },
}

impl LocationQuery {
    pub fn coordinates(latitude: f64, longitude: f64) -> Self {
        Self::Coordinates {
            latitude,
            longitude,
            name: None,
        }
    }

    fn location_param(&self) -> String {
        match self {
            Self::Place(place) => place.clone(),
            Self::Coordinates {
                latitude,
                longitude,
                ..
            } => format!("{latitude},{longitude}"),
        }
    }

    fn display_name(&self) -> String {
        match self {
            Self::Place(place) => place.clone(),
            Self::Coordinates {
                name: Some(name), ..
            } => name.clone(),
            Self::Coordinates { .. } => format!("Coordinates: {}", self.location_param()),
        }
    }
}

/// Camera position of a fetched image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetViewLocation {
    pub name: String,
    /// Unknown for place-name queries.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub heading: u16,
    pub pitch: i16,
}

/// A fetched Street View image.
#[derive(Debug, Clone)]
pub struct StreetViewImage {
    pub data: Vec<u8>,
    pub location: StreetViewLocation,
}

impl StreetViewImage {
    /// `street_view_<lat>_<lng>_<heading>.jpg`, or the slugged place name
    /// when coordinates are unknown.
    pub fn file_name(&self) -> String {
        let loc = &self.location;
        match (loc.latitude, loc.longitude) {
            (Some(lat), Some(lng)) => format!("street_view_{lat}_{lng}_{}.jpg", loc.heading),
            _ => format!("street_view_{}_{}.jpg", slug(&loc.name), loc.heading),
        }
    }

    /// Saves the image under `dir` and returns its path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        write_bytes_atomic(&path, &self.data)?;
        tracing::debug!(path = %path.display(), "saved street view image");
        Ok(path)
    }
}

fn slug(text: &str) -> String {
    let slug: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let trimmed = slug.trim_matches('_');
    if trimmed.is_empty() {
        "place".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Accepts a JSON number or a numeric string.
fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
struct GeonamesResponse {
    major: GeonamesPlace,
}

#[derive(Debug, Deserialize)]
struct GeonamesPlace {
    #[serde(deserialize_with = "number_or_string")]
    latt: f64,
    #[serde(deserialize_with = "number_or_string")]
    longt: f64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    status: String,
}

/// Builder for StreetViewClient.
#[derive(Debug, Clone)]
pub struct StreetViewClientBuilder {
    api_key: Option<String>,
    timeout: Duration,
}

impl Default for StreetViewClientBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout: crate::config::DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl StreetViewClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_MAPS_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<StreetViewClient> {
        let api_key = explicit_or_env(self.api_key, "GOOGLE_MAPS_API_KEY")?;
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        Ok(StreetViewClient { client, api_key })
    }
}

/// Street View Static API client.
pub struct StreetViewClient {
    client: reqwest::Client,
    api_key: String,
}

impl StreetViewClient {
    pub fn builder() -> StreetViewClientBuilder {
        StreetViewClientBuilder::new()
    }

    fn image_params(&self, query: &LocationQuery, heading: u16) -> Vec<(&'static str, String)> {
        vec![
            ("size", IMAGE_SIZE.to_string()),
            ("location", query.location_param()),
            ("heading", heading.to_string()),
            ("key", self.api_key.clone()),
            ("return_error_code", "true".to_string()),
        ]
    }

    /// Fetches one image with a random heading.
    pub async fn fetch(&self, query: &LocationQuery) -> Result<StreetViewImage> {
        let heading = rand::rng().random_range(0..360u16);
        self.fetch_at(query, heading).await
    }

    /// Fetches one image looking along `heading` degrees.
    pub async fn fetch_at(&self, query: &LocationQuery, heading: u16) -> Result<StreetViewImage> {
        let name = query.display_name();
        tracing::debug!(location = %name, heading, "GET {STREETVIEW_URL}");

        let response = self
            .client
            .get(STREETVIEW_URL)
            .query(&self.image_params(query, heading))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_image_status(status.as_u16(), &text, &headers, &name));
        }

        let data = response.bytes().await?.to_vec();
        check_image_size(&data, &name)?;

        let (latitude, longitude) = match query {
            LocationQuery::Coordinates {
                latitude,
                longitude,
                ..
            } => (Some(*latitude), Some(*longitude)),
            LocationQuery::Place(_) => (None, None),
        };
        Ok(StreetViewImage {
            data,
            location: StreetViewLocation {
                name,
                latitude,
                longitude,
                heading,
                pitch: 0,
            },
        })
    }

    /// Asks 3geonames for a random point on land.
    pub async fn random_land_coordinates(&self) -> Result<LocationQuery> {
        tracing::debug!("GET {RANDOM_LAND_URL}");
        let response = self.client.get(RANDOM_LAND_URL).send().await?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &text, &headers));
        }
        let text = response.text().await?;
        parse_random_land(&text)
    }

    /// Finds any usable image: random land coordinates first, then the
    /// fallback cities.
    pub async fn find_random(&self) -> Result<StreetViewImage> {
        for attempt in 1..=RANDOM_ATTEMPTS {
            let query = match self.random_land_coordinates().await {
                Ok(q) => q,
                Err(e) => {
                    tracing::warn!(attempt, "could not get random coordinates: {e}");
                    continue;
                }
            };
            tracing::info!(attempt, location = %query.display_name(), "trying random location");
            match self.fetch(&query).await {
                Ok(image) => return Ok(image),
                Err(e) => tracing::warn!(attempt, "no usable street view: {e}"),
            }
        }

        tracing::info!("random locations failed; trying fallback cities");
        for (name, latitude, longitude) in FALLBACK_CITIES {
            let query = LocationQuery::Coordinates {
                latitude,
                longitude,
                name: Some(name.to_string()),
            };
            match self.fetch(&query).await {
                Ok(image) => return Ok(image),
                Err(e) => tracing::warn!(city = name, "fallback failed: {e}"),
            }
        }

        Err(UrbanVizError::NoImagery(format!(
            "no usable image after {} random locations and {} fallback cities",
            RANDOM_ATTEMPTS,
            FALLBACK_CITIES.len()
        )))
    }

    /// Checks the key against the free metadata endpoint. Returns the
    /// metadata status, e.g. `OK` or `REQUEST_DENIED`.
    pub async fn check_key(&self) -> Result<String> {
        let (_, lat, lng) = FALLBACK_CITIES[0];
        let response = self
            .client
            .get(METADATA_URL)
            .query(&[("location", format!("{lat},{lng}")), ("key", self.api_key.clone())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &text, &headers));
        }
        let meta: MetadataResponse = response.json().await?;
        Ok(meta.status)
    }
}

fn classify_image_status(
    status: u16,
    text: &str,
    headers: &reqwest::header::HeaderMap,
    location: &str,
) -> UrbanVizError {
    if status == 404 {
        UrbanVizError::NoImagery(format!("no imagery found at {location}"))
    } else {
        classify_http_error(status, text, headers)
    }
}

fn check_image_size(data: &[u8], location: &str) -> Result<()> {
    if data.len() < MIN_IMAGE_BYTES {
        return Err(UrbanVizError::NoImagery(format!(
            "placeholder image received for {location} ({} bytes)",
            data.len()
        )));
    }
    Ok(())
}

fn parse_random_land(text: &str) -> Result<LocationQuery> {
    let parsed: GeonamesResponse = serde_json::from_str(text).map_err(|e| {
        UrbanVizError::UnexpectedResponse(format!("unreadable random-land response: {e}"))
    })?;
    let place = parsed.major;
    Ok(LocationQuery::Coordinates {
        latitude: place.latt,
        longitude: place.longt,
        name: place.name.filter(|n| !n.trim().is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn client() -> StreetViewClient {
        StreetViewClientBuilder::new()
            .api_key("AIza-test")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_blank_key_fails() {
        let result = StreetViewClientBuilder::new().api_key(" ").build();
        assert!(matches!(result, Err(UrbanVizError::Auth(_))));
    }

    #[tokio::test]
    async fn test_failed_fetch_does_not_leak_key() {
        let client = StreetViewClientBuilder::new()
            .api_key("AIzaSECRETKEY123")
            .timeout(Duration::from_millis(1))
            .build()
            .unwrap();
        let err = client
            .fetch_at(&LocationQuery::Place("Paris".into()), 10)
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(!text.contains("AIzaSECRETKEY123"), "{text}");
    }

    #[test]
    fn test_image_params() {
        let query = LocationQuery::coordinates(48.85837, 2.294481);
        let params = client().image_params(&query, 90);
        assert!(params.contains(&("size", "600x400".into())));
        assert!(params.contains(&("location", "48.85837,2.294481".into())));
        assert!(params.contains(&("heading", "90".into())));
        assert!(params.contains(&("return_error_code", "true".into())));
    }

    #[test]
    fn test_404_is_no_imagery() {
        let err = classify_image_status(404, "", &HeaderMap::new(), "Atlantis");
        assert!(matches!(err, UrbanVizError::NoImagery(ref m) if m.contains("Atlantis")));

        let err = classify_image_status(403, "denied", &HeaderMap::new(), "Paris");
        assert!(matches!(err, UrbanVizError::Auth(_)));
    }

    #[test]
    fn test_small_body_is_placeholder() {
        assert!(matches!(
            check_image_size(&[0u8; 4999], "x"),
            Err(UrbanVizError::NoImagery(_))
        ));
        assert!(check_image_size(&[0u8; MIN_IMAGE_BYTES], "x").is_ok());
    }

    #[test]
    fn test_parse_random_land_strings_and_numbers() {
        let q = parse_random_land(r#"{"major": {"latt": "45.50", "longt": "-73.56", "name": "Montreal"}}"#)
            .unwrap();
        assert_eq!(
            q,
            LocationQuery::Coordinates {
                latitude: 45.5,
                longitude: -73.56,
                name: Some("Montreal".into())
            }
        );

        let q = parse_random_land(r#"{"major": {"latt": 1.5, "longt": 2, "name": ""}}"#).unwrap();
        assert_eq!(q, LocationQuery::coordinates(1.5, 2.0));

        assert!(parse_random_land(r#"{"major": {"latt": "north"}}"#).is_err());
    }

    #[test]
    fn test_file_names() {
        let mut image = StreetViewImage {
            data: vec![],
            location: StreetViewLocation {
                name: "Tokyo, Japan".into(),
                latitude: Some(35.5),
                longitude: Some(139.25),
                heading: 12,
                pitch: 0,
            },
        };
        assert_eq!(image.file_name(), "street_view_35.5_139.25_12.jpg");

        image.location.latitude = None;
        assert_eq!(image.file_name(), "street_view_tokyo__japan_12.jpg");
    }

    #[test]
    fn test_display_names() {
        assert_eq!(LocationQuery::Place("Times Square".into()).display_name(), "Times Square");
        assert_eq!(
            LocationQuery::coordinates(1.0, 2.5).display_name(),
            "Coordinates: 1,2.5"
        );
    }
}
