//! Cloudflare Images client backing report attachments.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, multipart};
use serde::Deserialize;
use tracing::{debug, info};

use crate::application::attachments::{CdnError, CdnImage, ImageCdn, ImageMetadata};
use crate::config::CdnSettings;

use super::error::InfraError;

const TARGET: &str = "marketlens::cdn";
const DEFAULT_VARIANT: &str = "public";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    id: String,
    #[serde(default)]
    variants: Vec<String>,
}

#[derive(Clone)]
pub struct CloudflareImages {
    client: Client,
    account_id: Option<String>,
    api_token: Option<String>,
    api_base: String,
    delivery_url: Option<String>,
}

impl CloudflareImages {
    pub fn new(settings: &CdnSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("marketlens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| InfraError::configuration(format!("failed to build CDN client: {err}")))?;

        Ok(Self {
            client,
            account_id: settings.account_id.clone(),
            api_token: settings.api_token.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            delivery_url: settings
                .delivery_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_ok()
    }

    fn credentials(&self) -> Result<(&str, &str), CdnError> {
        match (self.account_id.as_deref(), self.api_token.as_deref()) {
            (Some(account), Some(token)) if !account.is_empty() && !token.is_empty() => {
                Ok((account, token))
            }
            _ => Err(CdnError::NotConfigured),
        }
    }

    fn images_endpoint(&self, account: &str) -> String {
        format!("{}/accounts/{account}/images/v1", self.api_base)
    }

    fn delivery_for(&self, result: &UploadResult) -> String {
        match &self.delivery_url {
            Some(base) => format!("{base}/{}/{DEFAULT_VARIANT}", result.id),
            None => result
                .variants
                .iter()
                .find(|variant| variant.ends_with(DEFAULT_VARIANT))
                .or_else(|| result.variants.first())
                .cloned()
                .unwrap_or_default(),
        }
    }
}

fn rejection(status: StatusCode, errors: &[ApiMessage]) -> CdnError {
    let message = errors
        .iter()
        .map(|error| format!("{} ({})", error.message, error.code))
        .collect::<Vec<_>>()
        .join("; ");
    CdnError::Rejected {
        status: status.as_u16(),
        message: if message.is_empty() {
            "no error detail".to_string()
        } else {
            message
        },
    }
}

#[async_trait]
impl ImageCdn for CloudflareImages {
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        metadata: &ImageMetadata,
    ) -> Result<CdnImage, CdnError> {
        let (account, token) = self.credentials()?;
        let metadata = serde_json::to_string(metadata)
            .map_err(|err| CdnError::Request(err.to_string()))?;

        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        let part = multipart::Part::bytes(Vec::from(bytes))
            .file_name(filename.to_string())
            .mime_str(mime.as_ref())
            .map_err(|err| CdnError::Request(err.to_string()))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("metadata", metadata);

        let response = self
            .client
            .post(self.images_endpoint(account))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|err| CdnError::Request(err.to_string()))?;

        let status = response.status();
        let envelope: Envelope<UploadResult> = response
            .json()
            .await
            .map_err(|err| CdnError::Request(format!("invalid CDN response ({status}): {err}")))?;

        match envelope.result {
            Some(result) if status.is_success() && envelope.success => {
                let url = self.delivery_for(&result);
                info!(target: TARGET, image_id = %result.id, "image uploaded");
                Ok(CdnImage { id: result.id, url })
            }
            _ => Err(rejection(status, &envelope.errors)),
        }
    }

    async fn delete(&self, image_id: &str) -> Result<(), CdnError> {
        let (account, token) = self.credentials()?;
        let response = self
            .client
            .delete(format!("{}/{image_id}", self.images_endpoint(account)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| CdnError::Request(err.to_string()))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(target: TARGET, image_id, status = status.as_u16(), "image deleted");
            return Ok(());
        }

        let errors = response
            .json::<Envelope<serde_json::Value>>()
            .await
            .map(|envelope| envelope.errors)
            .unwrap_or_default();
        Err(rejection(status, &errors))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn settings(account: Option<&str>, token: Option<&str>) -> CdnSettings {
        CdnSettings {
            account_id: account.map(str::to_string),
            api_token: token.map(str::to_string),
            api_base: "https://api.cloudflare.com/client/v4/".to_string(),
            delivery_url: Some("https://imagedelivery.net/hash/".to_string()),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn missing_credentials_refuse_upload() {
        let cdn = CloudflareImages::new(&settings(Some("acct"), None)).expect("client");
        assert!(!cdn.is_configured());

        let err = cdn
            .upload(
                Bytes::from_static(b"png"),
                "chart.png",
                &ImageMetadata {
                    report_id: 1,
                    kind: "report",
                    uploaded_by: 2,
                },
            )
            .await
            .expect_err("unconfigured");
        assert_eq!(err, CdnError::NotConfigured);
    }

    #[test]
    fn delivery_url_uses_public_variant() {
        let cdn = CloudflareImages::new(&settings(Some("acct"), Some("token"))).expect("client");
        assert!(cdn.is_configured());
        assert_eq!(
            cdn.images_endpoint("acct"),
            "https://api.cloudflare.com/client/v4/accounts/acct/images/v1"
        );
        let result = UploadResult {
            id: "abc".to_string(),
            variants: Vec::new(),
        };
        assert_eq!(
            cdn.delivery_for(&result),
            "https://imagedelivery.net/hash/abc/public"
        );
    }
}
