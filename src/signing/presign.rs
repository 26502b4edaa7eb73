//! AWS Signature V4 query-string presigning.
//!
//! The request is signed over the `host` header only with an
//! `UNSIGNED-PAYLOAD` body hash, so the origin request carries nothing but
//! the target and `host`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hyper::header::{HeaderValue, HOST};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

use crate::config::OriginConfig;
use crate::signing::{RequestSigner, SignError, SignedRequest};

type HmacSha256 = Hmac<Sha256>;

/// Everything but the RFC 3986 unreserved characters.
const AWS_URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

#[derive(Debug, Clone)]
pub struct QueryPresigner {
    host: String,
    port: u16,
    region: String,
    access_key_id: String,
    secret_access_key: String,
    expiry_secs: u64,
    virtual_host: bool,
}

impl QueryPresigner {
    pub fn from_config(origin: &OriginConfig) -> Self {
        Self {
            host: origin.host.clone(),
            port: origin.port,
            region: origin.region.clone(),
            access_key_id: origin.access_key_id.clone(),
            secret_access_key: origin.secret_access_key.clone(),
            expiry_secs: origin.url_expiry_secs,
            virtual_host: origin.virtual_host,
        }
    }

    fn host_header(&self, bucket: &str) -> String {
        let host = if self.virtual_host {
            format!("{}.{}", bucket, self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            80 | 443 => host,
            port => format!("{}:{}", host, port),
        }
    }

    fn canonical_uri(&self, bucket: &str, key: &str) -> String {
        let key = utf8_percent_encode(key, AWS_URI_ENCODE);
        if self.virtual_host {
            format!("/{}", key)
        } else {
            format!("/{}/{}", utf8_percent_encode(bucket, AWS_URI_ENCODE), key)
        }
    }

    /// Sign as of `now`. Exposed for deterministic tests.
    pub fn presign_at(&self, bucket: &str, key: &str, now: DateTime<Utc>) -> Result<SignedRequest, SignError> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(SignError::MissingCredentials);
        }

        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = format!("{}/{}/{}/aws4_request", date_stamp, self.region, SERVICE);
        let credential = format!("{}/{}", self.access_key_id, scope);

        let host = self.host_header(bucket);
        let uri = self.canonical_uri(bucket, key);

        // Parameters are already in canonical (sorted) order.
        let query = format!(
            "X-Amz-Algorithm={}&X-Amz-Credential={}&X-Amz-Date={}&X-Amz-Expires={}&X-Amz-SignedHeaders=host",
            ALGORITHM,
            utf8_percent_encode(&credential, AWS_URI_ENCODE),
            amz_date,
            self.expiry_secs,
        );

        let canonical_request = format!("GET\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD", uri, query, host);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac_sha256(format!("AWS4{}", self.secret_access_key).as_bytes(), date_stamp.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

        let host_value = HeaderValue::from_str(&host).map_err(|_| SignError::InvalidHeader(host.clone()))?;

        Ok(SignedRequest {
            target: format!("{}?{}&X-Amz-Signature={}", uri, query, signature),
            headers: vec![(HOST, host_value)],
        })
    }
}

impl RequestSigner for QueryPresigner {
    fn sign(&self, bucket: &str, key: &str) -> Result<SignedRequest, SignError> {
        self.presign_at(bucket, key, Utc::now())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SignError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SignError::InvalidKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
