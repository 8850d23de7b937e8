use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Geographic coordinates for a location
///
/// Never partially set: geocoding either yields both values or the
/// `(0, 0)` sentinel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Sentinel used when an address cannot be resolved
    pub const FALLBACK: Coordinates = Coordinates {
        latitude: 0.0,
        longitude: 0.0,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::FALLBACK
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::FALLBACK
    }
}

/// Kind of property, as accepted in submissions and used for recommendations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Rooms,
    Tondominium,
    Apartment,
    Villa,
    Townhouse,
    Cottage,
}

impl PropertyType {
    pub const ALL: [PropertyType; 6] = [
        PropertyType::Rooms,
        PropertyType::Tondominium,
        PropertyType::Apartment,
        PropertyType::Villa,
        PropertyType::Townhouse,
        PropertyType::Cottage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Rooms => "Rooms",
            PropertyType::Tondominium => "Tondominium",
            PropertyType::Apartment => "Apartment",
            PropertyType::Villa => "Villa",
            PropertyType::Townhouse => "Townhouse",
            PropertyType::Cottage => "Cottage",
        }
    }
}

impl Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        PropertyType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown property type '{}'", trimmed))
    }
}

/// Address fields of a submission, before a location row exists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressFields {
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub country: String,
    pub postal_code: String,
}

/// Location row to be inserted alongside a new listing
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    pub address: AddressFields,
    pub coordinates: Coordinates,
}

/// Persisted location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: i32,
    pub address: String,
    pub city: String,
    pub state: Option<String>,
    pub country: String,
    pub postal_code: String,
    pub coordinates: Coordinates,
}

/// Typed, validated listing attributes ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedListing {
    pub name: String,
    pub description: String,
    pub property_type: PropertyType,
    pub price_per_month: f64,
    pub security_deposit: f64,
    pub application_fee: f64,
    pub beds: i32,
    pub baths: f64,
    pub square_feet: i32,
    pub is_pets_allowed: bool,
    pub is_parking_included: bool,
    pub amenities: Vec<String>,
    pub highlights: Vec<String>,
    pub photo_urls: Vec<String>,
}

/// Persisted listing with its location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub property_type: PropertyType,
    pub price_per_month: f64,
    pub security_deposit: f64,
    pub application_fee: f64,
    pub beds: i32,
    pub baths: f64,
    pub square_feet: i32,
    pub is_pets_allowed: bool,
    pub is_parking_included: bool,
    pub amenities: Vec<String>,
    pub highlights: Vec<String>,
    pub photo_urls: Vec<String>,
    pub posted_date: DateTime<Utc>,
    pub manager_id: String,
    pub location: Location,
}

impl Listing {
    /// Assembles a listing from its normalized attributes and stored references
    pub fn from_parts(
        id: i32,
        listing: NormalizedListing,
        location: Location,
        manager_id: String,
        posted_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: listing.name,
            description: listing.description,
            property_type: listing.property_type,
            price_per_month: listing.price_per_month,
            security_deposit: listing.security_deposit,
            application_fee: listing.application_fee,
            beds: listing.beds,
            baths: listing.baths,
            square_feet: listing.square_feet,
            is_pets_allowed: listing.is_pets_allowed,
            is_parking_included: listing.is_parking_included,
            amenities: listing.amenities,
            highlights: listing.highlights,
            photo_urls: listing.photo_urls,
            posted_date,
            manager_id,
            location,
        }
    }
}

/// Filter for listing queries; every bound is optional and inclusive
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub ids: Option<Vec<i32>>,
    pub exclude_id: Option<i32>,
    pub property_type: Option<PropertyType>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub beds_min: Option<i32>,
    pub baths_min: Option<f64>,
    pub square_feet_min: Option<i32>,
    pub square_feet_max: Option<i32>,
    pub limit: Option<usize>,
}

impl ListingFilter {
    /// Checks a listing against every bound in the filter (limit excluded)
    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&listing.id) {
                return false;
            }
        }
        if self.exclude_id == Some(listing.id) {
            return false;
        }
        if let Some(property_type) = self.property_type {
            if listing.property_type != property_type {
                return false;
            }
        }
        let price = listing.price_per_month;
        if self.price_min.is_some_and(|min| price < min)
            || self.price_max.is_some_and(|max| price > max)
        {
            return false;
        }
        if self.beds_min.is_some_and(|min| listing.beds < min)
            || self.baths_min.is_some_and(|min| listing.baths < min)
        {
            return false;
        }
        let sqft = listing.square_feet;
        !(self.square_feet_min.is_some_and(|min| sqft < min)
            || self.square_feet_max.is_some_and(|max| sqft > max))
    }
}
