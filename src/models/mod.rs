pub mod listing;
pub mod submission;

pub use listing::{
    AddressFields, Coordinates, Listing, ListingFilter, Location, NewLocation, NormalizedListing,
    PropertyType,
};
pub use submission::{PhotoFile, RawFields, RawSubmission};
