//! Shared-key request signing.

use crate::error::{RestoreError, StorageError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::{
    header::{HeaderName, HeaderValue, AUTHORIZATION},
    Request,
};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Standard headers in the order they appear in the string-to-sign.
const SIGNED_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl SharedKeyCredential {
    pub fn new(account: impl Into<String>, access_key: &str) -> Result<Self, RestoreError> {
        let key = STANDARD.decode(access_key.trim()).map_err(|err| {
            RestoreError::Authentication(format!("access key is not base64: {err}"))
        })?;
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn sign(&self, request: &mut Request) -> Result<(), StorageError> {
        let string_to_sign = string_to_sign(request, &self.account);
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| StorageError::transport(format!("invalid signing key: {err}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let value = HeaderValue::from_str(&format!("SharedKey {}:{signature}", self.account))
            .map_err(|err| {
                StorageError::transport(format!("invalid authorization header: {err}"))
            })?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

pub fn string_to_sign(request: &Request, account: &str) -> String {
    let headers = request.headers();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    };

    let mut out = String::new();
    out.push_str(request.method().as_str());
    out.push('\n');
    for name in SIGNED_HEADERS {
        let value = header(name);
        // A zero length is signed as the empty string.
        if name == "content-length" && value == "0" {
            out.push('\n');
            continue;
        }
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(&canonicalized_headers(request));
    out.push_str(&canonicalized_resource(request, account));
    out
}

fn canonicalized_headers(request: &Request) -> String {
    let mut ms_headers: Vec<(&HeaderName, Vec<&str>)> = Vec::new();
    for name in request.headers().keys() {
        if !name.as_str().starts_with("x-ms-") {
            continue;
        }
        let values = request
            .headers()
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::trim)
            .collect();
        ms_headers.push((name, values));
    }
    ms_headers.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

    ms_headers
        .into_iter()
        .map(|(name, values)| format!("{}:{}\n", name.as_str(), values.join(",")))
        .collect()
}

fn canonicalized_resource(request: &Request, account: &str) -> String {
    let url = request.url();
    let mut out = format!("/{account}{}", url.path());

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .collect();
    params.sort();

    let mut index = 0;
    while index < params.len() {
        let name = params[index].0.clone();
        let mut values = Vec::new();
        while index < params.len() && params[index].0 == name {
            values.push(params[index].1.as_str());
            index += 1;
        }
        out.push('\n');
        out.push_str(&name);
        out.push(':');
        out.push_str(&values.join(","));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Client, Method};

    fn request(method: Method, url: &str) -> Request {
        Client::new()
            .request(method, url)
            .header("x-ms-version", "2021-06-08")
            .header("x-ms-date", "Mon, 01 Jan 2024 00:00:00 GMT")
            .header("content-length", "0")
            .build()
            .expect("request")
    }

    #[test]
    fn string_to_sign_for_listing() {
        let req = request(
            Method::GET,
            "https://acct.blob.core.windows.net/data?restype=container&comp=list&showonly=deleted",
        );
        let expected = [
            "GET", "", "", "", "", "", "", "", "", "", "", "",
            "x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT",
            "x-ms-version:2021-06-08",
            "/acct/data",
            "comp:list",
            "restype:container",
            "showonly:deleted",
        ]
        .join("\n");
        assert_eq!(string_to_sign(&req, "acct"), expected);
    }

    #[test]
    fn resource_keeps_encoded_path() {
        let req = request(
            Method::PUT,
            "https://acct.blob.core.windows.net/data/dir/a%20b.txt?comp=undelete",
        );
        assert!(string_to_sign(&req, "acct").ends_with("/acct/data/dir/a%20b.txt\ncomp:undelete"));
    }

    #[test]
    fn sign_sets_shared_key_authorization() {
        let credential = SharedKeyCredential::new("acct", "c2VjcmV0LWtleQ==").expect("key");
        let mut req = request(Method::GET, "https://acct.blob.core.windows.net/data");
        credential.sign(&mut req).expect("sign");

        let auth = req.headers()[AUTHORIZATION].to_str().expect("ascii");
        assert!(auth.starts_with("SharedKey acct:"));
        assert!(auth.len() > "SharedKey acct:".len());
    }

    #[test]
    fn rejects_non_base64_key() {
        assert!(matches!(
            SharedKeyCredential::new("acct", "not base64!"),
            Err(RestoreError::Authentication(_))
        ));
    }
}
