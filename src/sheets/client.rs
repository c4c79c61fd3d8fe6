use super::auth::{ServiceAccountKey, TokenProvider};
use super::types::{UpdateValuesResponse, ValueRange};
use anyhow::{anyhow, bail, Context, Result as AnyhowResult};
use log::debug;
use reqwest::{Response, Url};
use std::path::Path;

/// Root of the Sheets REST API.
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/";

/// Authenticated client for the Sheets API `values` endpoints.
///
/// Owns the HTTP client and a token cache; nothing needs to be released when it is dropped.
pub struct GoogleSheetsHandler {
    http: reqwest::Client,
    tokens: TokenProvider,
    base_url: String,
}

impl GoogleSheetsHandler {
    /// Builds a handler from a service-account key file (JSON format).
    ///
    /// # Arguments
    ///
    /// * `service_account_file` - Path to the Google Cloud service account key.
    ///
    /// # Returns
    ///
    /// * `Ok(GoogleSheetsHandler)` - Ready to issue requests; no request has been made yet.
    /// * `Err(anyhow::Error)` - The file is unreadable or its private key is invalid.
    pub fn from_service_account_file(service_account_file: impl AsRef<Path>) -> AnyhowResult<Self> {
        Self::new(ServiceAccountKey::from_file(service_account_file)?)
    }

    pub fn new(key: ServiceAccountKey) -> AnyhowResult<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            tokens: TokenProvider::new(key)?,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Points the handler at a different API root (e.g. a local emulator).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = normalize_url(base_url);
        self
    }

    /// Identity the requests are made as.
    pub fn target(&self) -> String {
        format!("sheets:{}", self.tokens.client_email())
    }

    /// Reads `range` (A1 notation) and returns its rows; an empty range yields no rows.
    pub async fn execute_query(
        &mut self,
        spreadsheet_id: &str,
        range: &str,
    ) -> AnyhowResult<Vec<Vec<serde_json::Value>>> {
        let url = self.values_url(spreadsheet_id, range)?;
        let token = self.tokens.access_token(&self.http).await?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to read range {}", range))?;
        let body: ValueRange = check_status(resp)
            .await?
            .json()
            .await
            .context("Failed to parse range values")?;
        debug!("Range {} holds {} row(s)", range, body.values.len());
        Ok(body.values)
    }

    /// Writes `values` (row-major) starting at `range`, stored as entered (`RAW`).
    pub async fn update_range(
        &mut self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<serde_json::Value>>,
    ) -> AnyhowResult<UpdateValuesResponse> {
        let mut url = self.values_url(spreadsheet_id, range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let token = self.tokens.access_token(&self.http).await?;
        let body = ValueRange {
            range: None,
            values,
        };
        let resp = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to update range {}", range))?;
        let summary: UpdateValuesResponse = check_status(resp)
            .await?
            .json()
            .await
            .context("Failed to parse update response")?;
        debug!("Updated {:?} ({:?} rows)", summary.updated_range, summary.updated_rows);
        Ok(summary)
    }

    /// `{base}v4/spreadsheets/{id}/values/{range}`, with each segment percent-encoded.
    fn values_url(&self, spreadsheet_id: &str, range: &str) -> AnyhowResult<Url> {
        let mut url = Url::parse(&self.base_url).context("Invalid Sheets API base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Sheets API base URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id, "values", range]);
        Ok(url)
    }
}

/// Passes successful responses through and turns API errors into messages carrying the body.
async fn check_status(resp: Response) -> AnyhowResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("Sheets API returned {}: {}", status, body)
}

fn normalize_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> GoogleSheetsHandler {
        GoogleSheetsHandler::new(ServiceAccountKey {
            client_email: "exporter@project.iam.gserviceaccount.com".to_string(),
            private_key: include_str!("../../tests/fixtures/test_key.pem").to_string(),
            private_key_id: None,
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("http://localhost:8080"), "http://localhost:8080/");
        assert_eq!(normalize_url("http://localhost:8080/"), "http://localhost:8080/");
    }

    #[test]
    fn test_values_url_encodes_range() {
        let url = handler().values_url("abc123", "My Sheet!A:S").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/My%20Sheet!A:S"
        );
    }

    #[test]
    fn test_values_url_keeps_base_path() {
        let url = handler()
            .with_base_url("http://localhost:9000/emulator")
            .values_url("id", "Sheet1!A7")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9000/emulator/v4/spreadsheets/id/values/Sheet1!A7"
        );
    }

    #[test]
    fn test_target_names_service_account() {
        assert_eq!(handler().target(), "sheets:exporter@project.iam.gserviceaccount.com");
    }
}
