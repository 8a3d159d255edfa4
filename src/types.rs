use serde::{Deserialize, Serialize};

/// An order as returned by the orders endpoints.
///
/// The API returns a superset of these fields depending on service and
/// country; anything not modelled explicitly is preserved in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    pub tracking_number: Option<String>,
    pub requested_tracking_number: Option<String>,
    pub service_type: Option<String>,
    pub service_level: Option<String>,
    pub reference: Option<Reference>,
    pub from: Option<Contact>,
    pub to: Option<Contact>,
    /// Pickup/delivery job details; deeply country- and service-specific,
    /// passed through untyped.
    pub parcel_job: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Merchant-side references attached to an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub merchant_order_number: Option<String>,
}

/// A shipper or recipient on an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub area: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub address_type: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

/// A generated waybill document.
#[derive(Debug, Clone)]
pub struct Waybill {
    /// Raw PDF bytes as served by the reports endpoint.
    pub pdf: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_deserializes_and_preserves_unknown_fields() {
        let body = r#"{
            "requested_tracking_number": "TEST123",
            "tracking_number": "NINJA123",
            "service_type": "Parcel",
            "service_level": "Standard",
            "reference": { "merchant_order_number": "SHIP-TEST123" },
            "from": {
                "name": "Sender Name",
                "phone_number": "+6591234567",
                "email": "sender@example.com",
                "address": {
                    "address1": "123 Sender St",
                    "city": "Singapore",
                    "country": "SG",
                    "postal_code": "123456"
                }
            },
            "to": { "name": "Recipient Name" },
            "parcel_job": { "is_pickup_required": true },
            "granular_status": "Pending Pickup"
        }"#;

        let order: Order = serde_json::from_str(body).unwrap();
        assert_eq!(order.tracking_number.as_deref(), Some("NINJA123"));
        assert_eq!(order.requested_tracking_number.as_deref(), Some("TEST123"));
        assert_eq!(
            order
                .reference
                .as_ref()
                .and_then(|r| r.merchant_order_number.as_deref()),
            Some("SHIP-TEST123")
        );
        assert_eq!(
            order
                .from
                .as_ref()
                .and_then(|c| c.address.as_ref())
                .and_then(|a| a.postal_code.as_deref()),
            Some("123456")
        );
        assert_eq!(order.extra["granular_status"], "Pending Pickup");
    }

    #[test]
    fn order_tolerates_a_minimal_body() {
        let order: Order = serde_json::from_str(r#"{"tracking_number":"NV1"}"#).unwrap();
        assert_eq!(order.tracking_number.as_deref(), Some("NV1"));
        assert!(order.from.is_none());
    }
}
