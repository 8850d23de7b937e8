/// Listing normalization
///
/// Converts the untyped text fields of a submission into a [`NormalizedListing`].
/// Every problem is collected so the client can fix the whole form in one pass.
use std::str::FromStr;

use crate::{
    error::FieldError,
    models::{AddressFields, NormalizedListing, PropertyType, RawFields},
};

pub const FIELD_NAME: &str = "name";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_PROPERTY_TYPE: &str = "propertyType";
pub const FIELD_PRICE_PER_MONTH: &str = "pricePerMonth";
pub const FIELD_SECURITY_DEPOSIT: &str = "securityDeposit";
pub const FIELD_APPLICATION_FEE: &str = "applicationFee";
pub const FIELD_BEDS: &str = "beds";
pub const FIELD_BATHS: &str = "baths";
pub const FIELD_SQUARE_FEET: &str = "squareFeet";
pub const FIELD_PETS_ALLOWED: &str = "isPetsAllowed";
pub const FIELD_PARKING_INCLUDED: &str = "isParkingIncluded";
pub const FIELD_AMENITIES: &str = "amenities";
pub const FIELD_HIGHLIGHTS: &str = "highlights";

/// Normalizes a submission's address, manager and attribute fields
///
/// Photo URLs are not known yet at this point; the returned listing carries
/// an empty `photo_urls` that the orchestrator fills in.
pub fn normalize(
    address: &AddressFields,
    manager_id: &str,
    fields: &RawFields,
) -> Result<NormalizedListing, Vec<FieldError>> {
    let mut errors = validate_address(address, manager_id);
    let mut parser = FieldParser {
        fields,
        errors: &mut errors,
    };

    let name = parser.required_text(FIELD_NAME);
    let property_type = parser.parse::<PropertyType>(FIELD_PROPERTY_TYPE, "a known property type");
    let price_per_month = parser.decimal(FIELD_PRICE_PER_MONTH);
    let security_deposit = parser.decimal(FIELD_SECURITY_DEPOSIT);
    let application_fee = parser.decimal(FIELD_APPLICATION_FEE);
    let beds = parser.whole_number(FIELD_BEDS);
    let baths = parser.decimal(FIELD_BATHS);
    let square_feet = parser.whole_number(FIELD_SQUARE_FEET);

    let (
        Some(name),
        Some(property_type),
        Some(price_per_month),
        Some(security_deposit),
        Some(application_fee),
        Some(beds),
        Some(baths),
        Some(square_feet),
    ) = (
        name,
        property_type,
        price_per_month,
        security_deposit,
        application_fee,
        beds,
        baths,
        square_feet,
    )
    else {
        return Err(errors);
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NormalizedListing {
        name,
        description: field(fields, FIELD_DESCRIPTION)
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
        property_type,
        price_per_month,
        security_deposit,
        application_fee,
        beds,
        baths,
        square_feet,
        is_pets_allowed: parse_flag(field(fields, FIELD_PETS_ALLOWED)),
        is_parking_included: parse_flag(field(fields, FIELD_PARKING_INCLUDED)),
        amenities: split_list(field(fields, FIELD_AMENITIES)),
        highlights: split_list(field(fields, FIELD_HIGHLIGHTS)),
        photo_urls: Vec::new(),
    })
}

/// Checks the address and submitter fields; `state` is optional
pub fn validate_address(address: &AddressFields, manager_id: &str) -> Vec<FieldError> {
    [
        ("address", address.street.as_str()),
        ("city", address.city.as_str()),
        ("country", address.country.as_str()),
        ("postalCode", address.postal_code.as_str()),
        ("managerId", manager_id),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| FieldError::new(name, "is required"))
    .collect()
}

/// Boolean coercion for form flags
///
/// Only the literal `"true"` (any case, surrounding whitespace ignored) is true.
/// Everything else, including absent values and typos such as `"yes"`, is false.
/// Never fails.
pub fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Splits a comma-delimited field into trimmed, non-empty entries, preserving order
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn field<'a>(fields: &'a RawFields, name: &str) -> Option<&'a str> {
    fields.get(name).map(String::as_str)
}

struct FieldParser<'a> {
    fields: &'a RawFields,
    errors: &'a mut Vec<FieldError>,
}

impl<'a> FieldParser<'a> {
    fn present(&mut self, name: &str) -> Option<&'a str> {
        match field(self.fields, name).map(str::trim) {
            Some(value) if !value.is_empty() => Some(value),
            _ => {
                self.errors.push(FieldError::new(name, "is required"));
                None
            }
        }
    }

    fn required_text(&mut self, name: &str) -> Option<String> {
        self.present(name).map(String::from)
    }

    fn parse<T: FromStr>(&mut self, name: &str, expected: &str) -> Option<T> {
        let value = self.present(name)?;
        match value.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                let message = format!("must be {}, got '{}'", expected, value);
                self.errors.push(FieldError::new(name, message));
                None
            }
        }
    }

    fn decimal(&mut self, name: &str) -> Option<f64> {
        let value = self.parse::<f64>(name, "a number")?;
        self.non_negative(name, value, !value.is_finite() || value < 0.0)
    }

    fn whole_number(&mut self, name: &str) -> Option<i32> {
        let value = self.parse::<i32>(name, "a whole number")?;
        self.non_negative(name, value, value < 0)
    }

    fn non_negative<T>(&mut self, name: &str, value: T, rejected: bool) -> Option<T> {
        if rejected {
            self.errors
                .push(FieldError::new(name, "must be a non-negative number"));
            return None;
        }
        Some(value)
    }
}
