//! Customer contact and shipping details captured at checkout.

use serde::{Deserialize, Serialize};

use super::email::{Email, EmailError};

/// Longest free-text field we accept from a checkout form.
const MAX_FIELD_LENGTH: usize = 200;

/// Errors raised while validating checkout details.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutDetailsError {
    #[error("invalid customer email: {0}")]
    Email(#[from] EmailError),
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
}

/// A postal shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl ShippingAddress {
    /// Trim every field and check that none is blank.
    ///
    /// # Errors
    ///
    /// Returns the first missing or oversized field.
    pub fn validated(self) -> Result<Self, CheckoutDetailsError> {
        Ok(Self {
            street: required("shippingAddress.street", &self.street)?,
            city: required("shippingAddress.city", &self.city)?,
            state: required("shippingAddress.state", &self.state)?,
            zip_code: required("shippingAddress.zipCode", &self.zip_code)?,
            country: required("shippingAddress.country", &self.country)?,
        })
    }
}

/// Validated customer contact and shipping details for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutDetails {
    pub customer_email: Email,
    pub customer_name: String,
    pub shipping_address: ShippingAddress,
}

impl CheckoutDetails {
    /// Validate raw checkout form input.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutDetailsError`] for an invalid email or any blank or
    /// oversized field.
    pub fn parse(
        email: &str,
        name: &str,
        address: ShippingAddress,
    ) -> Result<Self, CheckoutDetailsError> {
        Ok(Self {
            customer_email: Email::parse(email)?,
            customer_name: required("customerName", name)?,
            shipping_address: address.validated()?,
        })
    }
}

fn required(field: &'static str, value: &str) -> Result<String, CheckoutDetailsError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CheckoutDetailsError::Missing { field });
    }
    if value.chars().count() > MAX_FIELD_LENGTH {
        return Err(CheckoutDetailsError::TooLong {
            field,
            max: MAX_FIELD_LENGTH,
        });
    }
    Ok(value.to_owned())
}
