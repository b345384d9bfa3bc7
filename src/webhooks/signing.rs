use std::io;

use rocket::{
    data::{ByteUnit, FromData, Outcome},
    http::Status,
    Data, Request, State,
};
use thiserror::Error;
use tracing::trace;

use crate::config::ServerConfig;

const X_HUB_SIGNATURE: &str = "X-Hub-Signature";

/// Failure to authenticate a delivery against the configured shared secret.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("missing X-Hub-Signature header required for HMAC verification")]
    MissingSignature,
    #[error("HMAC verification failed")]
    InvalidSignature,
}

/// Checks a `sha1=<hex>` signature header against the HMAC-SHA1 of the raw
/// body bytes, keyed by the shared secret.
///
/// The digest comparison is constant-time, via the `hmac` crate. Neither the
/// secret nor any digest is ever logged.
pub(crate) fn validate_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    trace!("validating signature...");
    use hmac::{Hmac, Mac, NewMac};
    use sha1::Sha1;

    type HmacSha1 = Hmac<Sha1>;

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).expect("this should never fail");

    mac.update(body);

    // GitHub puts an algorithm prefix in front of its hex digest
    let signature = match signature.strip_prefix("sha1=") {
        Some(s) => s,
        None => {
            trace!("signature header doesn't carry a sha1= prefix");
            return false;
        }
    };

    match hex::decode(signature) {
        Ok(bytes) => mac.verify(&bytes).is_ok(),
        Err(_) => {
            trace!("signature header isn't valid hex");
            false
        }
    }
}

/// The raw bytes of a delivery body, authenticated against the configured
/// secret before any route handler runs.
///
/// Verification happens over the unparsed byte sequence: decoding the JSON
/// first and re-serializing it could reorder or reformat fields and would no
/// longer match what the sender signed. When no secret is configured every
/// request passes, which is the documented (if risky) opt-out.
pub struct SignedPayload(pub Vec<u8>);

const LIMIT: ByteUnit = ByteUnit::Mebibyte(1);

#[rocket::async_trait]
impl<'r> FromData<'r> for SignedPayload {
    type Error = anyhow::Error;

    async fn from_data(request: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self> {
        trace!("received payload on webhook endpoint: {:?}", request);

        let size_limit = request.limits().get("json").unwrap_or(LIMIT);
        let body = match data.open(size_limit).into_bytes().await {
            Ok(bytes) if bytes.is_complete() => bytes.into_inner(),
            Ok(_) => {
                let eof = io::ErrorKind::UnexpectedEof;
                trace!("payload was too big");
                return Outcome::Error((
                    Status::PayloadTooLarge,
                    io::Error::new(eof, "data limit exceeded").into(),
                ));
            }
            Err(e) => return Outcome::Error((Status::BadRequest, e.into())),
        };

        let config = request.guard::<&State<ServerConfig>>().await.unwrap();
        let secret = match &config.secret {
            Some(secret) => secret,
            // No secret configured: authentication is disabled.
            None => return Outcome::Success(SignedPayload(body)),
        };

        let signatures = request
            .headers()
            .get(X_HUB_SIGNATURE)
            .collect::<Vec<_>>();
        if signatures.len() != 1 {
            trace!("couldn't locate {} header", X_HUB_SIGNATURE);
            return Outcome::Error((
                Status::Forbidden,
                AuthenticationError::MissingSignature.into(),
            ));
        }

        if !validate_signature(secret, signatures[0], &body) {
            trace!("signature validation failed, stopping here...");
            return Outcome::Error((
                Status::Forbidden,
                AuthenticationError::InvalidSignature.into(),
            ));
        }

        trace!("validated payload");
        Outcome::Success(SignedPayload(body))
    }
}

#[cfg(test)]
pub(crate) fn signature_header(secret: &str, body: &[u8]) -> String {
    use hmac::{Hmac, Mac, NewMac};
    use sha1::Sha1;

    let mut mac =
        Hmac::<Sha1>::new_from_slice(secret.as_bytes()).expect("this should never fail");
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}
