//! Google Sheets v4 store client.
//!
//! Implements [`SheetApi`] over the REST surface the bot needs:
//! spreadsheet metadata for partition listing, `values` get/update for
//! ranged reads and writes, and a `batchUpdate` DeleteDimension request
//! for structural row deletes.
//!
//! Rate limiting (429) and temporary unavailability (5xx) are classified
//! transient so the store client's backoff applies; other non-success
//! statuses are permanent. The bearer token comes from configuration;
//! provisioning it is a deployment concern.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::store::{Partition, SheetApi};

const BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub struct SheetsClient {
    http: reqwest::Client,
    spreadsheet_id: String,
    token: String,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
        }
    }

    /// A1 range qualified with the partition title, percent-encoded for
    /// the URL path ("спринт 32 (04.08-10.08)!A2:C").
    fn encoded_range(partition_title: &str, range: &str) -> String {
        urlencoding::encode(&format!("{partition_title}!{range}")).into_owned()
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = format!(
            "sheets API status {}: {}",
            status.as_u16(),
            resp.text().await.unwrap_or_default()
        );
        if status.as_u16() == 429 || status.is_server_error() {
            Err(Error::StoreTransient(message))
        } else {
            Err(Error::StorePermanent(message))
        }
    }
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[async_trait]
impl SheetApi for SheetsClient {
    async fn list_partitions(&self) -> Result<Vec<Partition>> {
        let url = format!(
            "{BASE_URL}/{}?fields=sheets.properties",
            self.spreadsheet_id
        );
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let meta: SpreadsheetMeta = Self::check(resp).await?.json().await?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|sheet| Partition {
                id: sheet.properties.sheet_id,
                title: sheet.properties.title,
            })
            .collect())
    }

    async fn read_range(&self, partition_title: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = format!(
            "{BASE_URL}/{}/values/{}",
            self.spreadsheet_id,
            Self::encoded_range(partition_title, range)
        );
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let values: ValueRange = Self::check(resp).await?.json().await?;
        Ok(values.values)
    }

    async fn write_range(
        &self,
        partition_title: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        let url = format!(
            "{BASE_URL}/{}/values/{}?valueInputOption=USER_ENTERED",
            self.spreadsheet_id,
            Self::encoded_range(partition_title, range)
        );
        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn delete_row(&self, partition_id: i64, row: u32) -> Result<()> {
        let url = format!("{BASE_URL}/{}:batchUpdate", self.spreadsheet_id);
        // DeleteDimension uses 0-based half-open row indices.
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": partition_id,
                        "dimension": "ROWS",
                        "startIndex": row - 1,
                        "endIndex": row,
                    }
                }
            }]
        });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
