//! Resource-specific endpoint shims over the client's request pipeline.

use serde::Serialize;

use crate::client::NinjaVanClient;
use crate::error::Result;
use crate::types::{Order, Waybill};

/// Order creation and cancellation.
pub struct OrderResource<'a> {
    client: &'a NinjaVanClient,
}

impl<'a> OrderResource<'a> {
    pub(crate) fn new(client: &'a NinjaVanClient) -> Self {
        Self { client }
    }

    /// `POST 4.2/orders`. The request shape is passed through as-is; see
    /// the API reference for the per-country order schema.
    pub async fn create<T: Serialize + ?Sized>(&self, params: &T) -> Result<Order> {
        let response = self.client.post("4.2/orders", params).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// `DELETE 2.2/orders/{tracking_number}`.
    pub async fn cancel(&self, tracking_number: &str) -> Result<Order> {
        let response = self
            .client
            .delete(&format!("2.2/orders/{}", tracking_number))
            .await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Options for waybill generation.
#[derive(Debug, Clone, Default)]
pub struct WaybillOptions {
    pub hide_shipper_details: Option<bool>,
    /// `"portrait"` or `"landscape"`.
    pub orientation: Option<String>,
}

/// Waybill (shipping label) retrieval.
pub struct WaybillResource<'a> {
    client: &'a NinjaVanClient,
}

impl<'a> WaybillResource<'a> {
    pub(crate) fn new(client: &'a NinjaVanClient) -> Self {
        Self { client }
    }

    /// `GET 2.0/reports/waybill?tid={tracking_number}`, returning the raw
    /// PDF bytes.
    pub async fn get(&self, tracking_number: &str, options: &WaybillOptions) -> Result<Waybill> {
        let mut query = vec![("tid", tracking_number.to_string())];
        if let Some(hide) = options.hide_shipper_details {
            query.push(("hide_shipper_details", hide.to_string()));
        }
        if let Some(orientation) = &options.orientation {
            query.push(("orientation", orientation.clone()));
        }

        let response = self.client.get("2.0/reports/waybill", &query).await?;
        let pdf = response.bytes().await?.to_vec();
        Ok(Waybill { pdf })
    }
}
