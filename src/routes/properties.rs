use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use std::str::FromStr;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{AddressFields, Listing, ListingFilter, PhotoFile, RawFields, RawSubmission},
};

use super::AppState;

/// Form field carrying photo parts
pub const PHOTOS_FIELD: &str = "photos";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Filter value meaning "no constraint"
const ANY: &str = "any";

/// Handler for listing creation from a multipart form
pub async fn create(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Listing>)> {
    let submission = read_submission(multipart).await?;

    tracing::info!(
        request_id = %request_id,
        photo_count = submission.files.len(),
        "Received listing submission"
    );

    let listing = state.ingestion.ingest(submission).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// Handler for fetching a single listing
pub async fn get(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<Listing>> {
    state
        .store
        .find_listing(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Property {} not found", id)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub favorite_ids: Option<String>,
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub beds: Option<String>,
    pub baths: Option<String>,
    pub property_type: Option<String>,
    pub square_feet_min: Option<String>,
    pub square_feet_max: Option<String>,
}

impl ListQuery {
    pub fn into_filter(self) -> AppResult<ListingFilter> {
        let ids = match non_empty(self.favorite_ids.as_deref()) {
            Some(raw) => Some(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| parse_param::<i32>("favoriteIds", s))
                    .collect::<AppResult<Vec<_>>>()?,
            ),
            None => None,
        };

        Ok(ListingFilter {
            ids,
            property_type: optional(self.property_type.as_deref(), "propertyType")?,
            price_min: optional(self.price_min.as_deref(), "priceMin")?,
            price_max: optional(self.price_max.as_deref(), "priceMax")?,
            beds_min: optional(self.beds.as_deref(), "beds")?,
            baths_min: optional(self.baths.as_deref(), "baths")?,
            square_feet_min: optional(self.square_feet_min.as_deref(), "squareFeetMin")?,
            square_feet_max: optional(self.square_feet_max.as_deref(), "squareFeetMax")?,
            ..Default::default()
        })
    }
}

/// Handler for listing search
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Listing>>> {
    let filter = query.into_filter()?;
    let listings = state.store.find_listings(&filter).await?;
    Ok(Json(listings))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(ANY))
}

fn optional<T>(value: Option<&str>, name: &str) -> AppResult<Option<T>>
where
    T: FromStr,
{
    non_empty(value).map(|v| parse_param(name, v)).transpose()
}

fn parse_param<T: FromStr>(name: &str, value: &str) -> AppResult<T> {
    value
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Invalid value '{}' for {}", value, name)))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge(e.body_text());
    }
    AppError::InvalidInput(format!("Malformed multipart body: {}", e))
}

/// Splits a multipart form into address, manager, attribute fields and photos
async fn read_submission(mut multipart: Multipart) -> AppResult<RawSubmission> {
    let mut fields = RawFields::new();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;

                // Browsers send an empty part when no file was chosen
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                if name != PHOTOS_FIELD {
                    tracing::debug!(field = %name, "Treating non-photos file part as a photo");
                }
                files.push(PhotoFile::new(file_name, content_type, bytes));
            }
            None => {
                let value = field.text().await.map_err(multipart_error)?;
                fields.insert(name, value);
            }
        }
    }

    Ok(submission_from_form(fields, files))
}

fn take(fields: &mut RawFields, key: &str) -> String {
    fields.remove(key).unwrap_or_default()
}

fn submission_from_form(mut fields: RawFields, files: Vec<PhotoFile>) -> RawSubmission {
    let address = AddressFields {
        street: take(&mut fields, "address"),
        city: take(&mut fields, "city"),
        state: fields.remove("state").filter(|s| !s.trim().is_empty()),
        country: take(&mut fields, "country"),
        postal_code: take(&mut fields, "postalCode"),
    };

    let manager_id = match fields.remove("managerId") {
        Some(id) => {
            fields.remove("managerCognitoId");
            id
        }
        None => take(&mut fields, "managerCognitoId"),
    };

    RawSubmission {
        address,
        manager_id,
        fields,
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropertyType;

    fn form(pairs: &[(&str, &str)]) -> RawFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_submission_from_form_splits_address() {
        let sub = submission_from_form(
            form(&[
                ("address", "1 Main St"),
                ("city", "Springfield"),
                ("state", " "),
                ("country", "USA"),
                ("postalCode", "12345"),
                ("managerCognitoId", "mgr-1"),
                ("beds", "2"),
            ]),
            vec![],
        );

        assert_eq!(sub.address.street, "1 Main St");
        assert_eq!(sub.address.state, None);
        assert_eq!(sub.address.postal_code, "12345");
        assert_eq!(sub.manager_id, "mgr-1");
        assert_eq!(sub.fields.len(), 1);
        assert_eq!(sub.fields.get("beds").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_manager_id_takes_precedence_over_alias() {
        let sub = submission_from_form(
            form(&[("managerId", "primary"), ("managerCognitoId", "alias")]),
            vec![],
        );
        assert_eq!(sub.manager_id, "primary");
        assert!(sub.fields.is_empty());
    }

    #[test]
    fn test_query_any_is_ignored() {
        let filter = ListQuery {
            beds: Some("any".to_string()),
            baths: Some("Any".to_string()),
            property_type: Some("any".to_string()),
            price_max: Some("2000".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.beds_min, None);
        assert_eq!(filter.baths_min, None);
        assert_eq!(filter.property_type, None);
        assert_eq!(filter.price_max, Some(2000.0));
    }

    #[test]
    fn test_query_parses_favorites_and_type() {
        let filter = ListQuery {
            favorite_ids: Some("3, 1,,7".to_string()),
            property_type: Some("villa".to_string()),
            square_feet_min: Some("500".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.ids, Some(vec![3, 1, 7]));
        assert_eq!(filter.property_type, Some(PropertyType::Villa));
        assert_eq!(filter.square_feet_min, Some(500));
    }

    #[test]
    fn test_query_rejects_bad_values() {
        let err = ListQuery {
            price_min: Some("cheap".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = ListQuery {
            property_type: Some("castle".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
