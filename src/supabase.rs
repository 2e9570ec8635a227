//! Minimal Supabase REST client shared by the settings and artifact stores.
//!
//! Talks to PostgREST (`/rest/v1`) for tables and to `/storage/v1` for objects.

use reqwest::RequestBuilder;

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        }
    }

    /// `{base}/rest/v1/{table}?{query}`
    pub fn rest_url(&self, table: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/rest/v1/{}", self.base_url, table)
        } else {
            format!("{}/rest/v1/{}?{}", self.base_url, table, query)
        }
    }

    /// `{base}/storage/v1/object/{bucket}/{path}`
    pub fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path)
    }

    /// Public download URL for an object in a public bucket.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, bucket, path
        )
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.key).bearer_auth(&self.key)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.authorize(self.http.get(url))
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.authorize(self.http.post(url))
    }

    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.authorize(self.http.patch(url))
    }
}

/// Read a response body as JSON rows, turning transport and status failures
/// into a message.
pub async fn json_rows(response: reqwest::Response) -> Result<Vec<serde_json::Value>, String> {
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(format!("Supabase returned {}: {}", status.as_u16(), detail.trim()));
    }

    match response.json::<serde_json::Value>().await {
        Ok(serde_json::Value::Array(rows)) => Ok(rows),
        Ok(serde_json::Value::Object(row)) => Ok(vec![serde_json::Value::Object(row)]),
        Ok(other) => Err(format!("unexpected Supabase response: {other}")),
        Err(e) => Err(format!("failed to parse Supabase response: {e}")),
    }
}
