use std::time::SystemTime;

use anyhow::{anyhow, Result};
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, PercentEncodingMode, SignableBody, SignableRequest,
    SigningSettings, UriPathNormalizationMode,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;

use crate::AwsCredentials;

/// Service-specific signing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningProfile {
    /// S3 wants single percent-encoding, an explicit payload hash header and
    /// untouched object key paths.
    S3,
    /// Every other JSON service, e.g. `bedrock`.
    Standard(&'static str),
}

impl SigningProfile {
    pub fn service(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Standard(name) => name,
        }
    }

    fn settings(&self) -> SigningSettings {
        let mut settings = SigningSettings::default();
        if matches!(self, Self::S3) {
            settings.percent_encoding_mode = PercentEncodingMode::Single;
            settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
            settings.uri_path_normalization_mode = UriPathNormalizationMode::Disabled;
        }
        settings
    }
}

/// Produces SigV4 headers for outgoing HTTP requests.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: AwsCredentials,
    region: String,
    profile: SigningProfile,
}

impl RequestSigner {
    pub fn new(credentials: AwsCredentials, region: impl Into<String>, profile: SigningProfile) -> Self {
        Self {
            credentials,
            region: region.into(),
            profile,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn profile(&self) -> SigningProfile {
        self.profile
    }

    /// Returns the headers to attach, `authorization` included.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>> {
        self.sign_at(method, url, headers, body, SystemTime::now())
    }

    pub fn sign_at(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &[u8],
        time: SystemTime,
    ) -> Result<Vec<(String, String)>> {
        let credentials = Credentials::new(
            self.credentials.access_key_id.clone(),
            self.credentials.secret_access_key.clone(),
            self.credentials.session_token.clone(),
            None,
            "docbot",
        );
        let identity = Identity::new(credentials, None);

        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(self.profile.service())
            .time(time)
            .settings(self.profile.settings())
            .build()
            .map_err(|e| anyhow!("invalid signing params: {e}"))?
            .into();

        let signable = SignableRequest::new(
            method,
            url,
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            SignableBody::Bytes(body),
        )
        .map_err(|e| anyhow!("request cannot be signed: {e}"))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| anyhow!("sigv4 signing failed: {e}"))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}
