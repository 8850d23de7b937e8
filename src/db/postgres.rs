use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, QueryBuilder};

use crate::{
    db::ListingStore,
    error::{AppError, AppResult},
    models::{Coordinates, Listing, ListingFilter, Location, NewLocation, NormalizedListing},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

const SELECT_LISTINGS: &str = r#"
    SELECT l.id, l.name, l.description, l.property_type, l.price_per_month,
           l.security_deposit, l.application_fee, l.beds, l.baths, l.square_feet,
           l.is_pets_allowed, l.is_parking_included, l.amenities, l.highlights,
           l.photo_urls, l.posted_date, l.manager_id,
           loc.id AS location_id, loc.address, loc.city, loc.state, loc.country,
           loc.postal_code, loc.latitude, loc.longitude
    FROM listings l
    JOIN locations loc ON loc.id = l.location_id
"#;

/// Flat row of a listing joined with its location
#[derive(Debug, FromRow)]
struct ListingRow {
    id: i32,
    name: String,
    description: String,
    property_type: String,
    price_per_month: f64,
    security_deposit: f64,
    application_fee: f64,
    beds: i32,
    baths: f64,
    square_feet: i32,
    is_pets_allowed: bool,
    is_parking_included: bool,
    amenities: Vec<String>,
    highlights: Vec<String>,
    photo_urls: Vec<String>,
    posted_date: DateTime<Utc>,
    manager_id: String,
    location_id: i32,
    address: String,
    city: String,
    state: Option<String>,
    country: String,
    postal_code: String,
    latitude: f64,
    longitude: f64,
}

impl TryFrom<ListingRow> for Listing {
    type Error = AppError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        let property_type = row.property_type.parse().map_err(|e| {
            AppError::Internal(format!("Listing {} has invalid property type: {}", row.id, e))
        })?;

        Ok(Listing {
            id: row.id,
            name: row.name,
            description: row.description,
            property_type,
            price_per_month: row.price_per_month,
            security_deposit: row.security_deposit,
            application_fee: row.application_fee,
            beds: row.beds,
            baths: row.baths,
            square_feet: row.square_feet,
            is_pets_allowed: row.is_pets_allowed,
            is_parking_included: row.is_parking_included,
            amenities: row.amenities,
            highlights: row.highlights,
            photo_urls: row.photo_urls,
            posted_date: row.posted_date,
            manager_id: row.manager_id,
            location: Location {
                id: row.location_id,
                address: row.address,
                city: row.city,
                state: row.state,
                country: row.country,
                postal_code: row.postal_code,
                coordinates: Coordinates::new(row.latitude, row.longitude),
            },
        })
    }
}

/// Postgres-backed listing store
#[derive(Clone)]
pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &ListingFilter) {
    query.push(" WHERE TRUE");

    if let Some(ids) = &filter.ids {
        query.push(" AND l.id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(exclude_id) = filter.exclude_id {
        query.push(" AND l.id <> ").push_bind(exclude_id);
    }
    if let Some(property_type) = filter.property_type {
        query
            .push(" AND l.property_type = ")
            .push_bind(property_type.as_str());
    }
    if let Some(min) = filter.price_min {
        query.push(" AND l.price_per_month >= ").push_bind(min);
    }
    if let Some(max) = filter.price_max {
        query.push(" AND l.price_per_month <= ").push_bind(max);
    }
    if let Some(min) = filter.beds_min {
        query.push(" AND l.beds >= ").push_bind(min);
    }
    if let Some(min) = filter.baths_min {
        query.push(" AND l.baths >= ").push_bind(min);
    }
    if let Some(min) = filter.square_feet_min {
        query.push(" AND l.square_feet >= ").push_bind(min);
    }
    if let Some(max) = filter.square_feet_max {
        query.push(" AND l.square_feet <= ").push_bind(max);
    }

    query.push(" ORDER BY l.id ASC");

    if let Some(limit) = filter.limit {
        query.push(" LIMIT ").push_bind(limit as i64);
    }
}

#[async_trait::async_trait]
impl ListingStore for PgListingStore {
    async fn create_listing(
        &self,
        location: &NewLocation,
        listing: &NormalizedListing,
        manager_id: &str,
    ) -> AppResult<Listing> {
        let mut tx = self.pool.begin().await?;

        let address = &location.address;
        let location_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO locations (address, city, state, country, postal_code, latitude, longitude)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&address.street)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.country)
        .bind(&address.postal_code)
        .bind(location.coordinates.latitude)
        .bind(location.coordinates.longitude)
        .fetch_one(&mut *tx)
        .await?;

        let (listing_id, posted_date): (i32, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO listings (
                name, description, property_type, price_per_month, security_deposit,
                application_fee, beds, baths, square_feet, is_pets_allowed,
                is_parking_included, amenities, highlights, photo_urls, manager_id, location_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id, posted_date
            "#,
        )
        .bind(&listing.name)
        .bind(&listing.description)
        .bind(listing.property_type.as_str())
        .bind(listing.price_per_month)
        .bind(listing.security_deposit)
        .bind(listing.application_fee)
        .bind(listing.beds)
        .bind(listing.baths)
        .bind(listing.square_feet)
        .bind(listing.is_pets_allowed)
        .bind(listing.is_parking_included)
        .bind(&listing.amenities)
        .bind(&listing.highlights)
        .bind(&listing.photo_urls)
        .bind(manager_id)
        .bind(location_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(listing_id, location_id, "Inserted listing and location");

        Ok(Listing::from_parts(
            listing_id,
            listing.clone(),
            Location {
                id: location_id,
                address: address.street.clone(),
                city: address.city.clone(),
                state: address.state.clone(),
                country: address.country.clone(),
                postal_code: address.postal_code.clone(),
                coordinates: location.coordinates,
            },
            manager_id.to_string(),
            posted_date,
        ))
    }

    async fn find_listing(&self, id: i32) -> AppResult<Option<Listing>> {
        let row = sqlx::query_as::<_, ListingRow>(&format!("{} WHERE l.id = $1", SELECT_LISTINGS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Listing::try_from).transpose()
    }

    async fn find_listings(&self, filter: &ListingFilter) -> AppResult<Vec<Listing>> {
        let mut query = QueryBuilder::<Postgres>::new(SELECT_LISTINGS);
        push_filter(&mut query, filter);

        let rows = query
            .build_query_as::<ListingRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Listing::try_from).collect()
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
