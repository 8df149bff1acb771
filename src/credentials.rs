//! Basic-auth credentials used to log into the streaming endpoint.

use std::borrow::Borrow;

use http::header::{HeaderValue, AUTHORIZATION};

/// A username/password pair used to authenticate streaming requests.
///
/// This plays the role that `Token` (an OAuth1 key pair) played in the
/// original crate this one grew out of; the wire protocol here uses HTTP
/// Basic authentication instead.
#[derive(Clone, Debug)]
pub struct Credentials<U = String, P = String> {
    pub username: U,
    pub password: P,
}

impl<U: Borrow<str>, P: Borrow<str>> Credentials<U, P> {
    pub fn new(username: U, password: P) -> Self {
        Credentials { username, password }
    }

    /// Borrows the credential strings from `self` and makes a new
    /// `Credentials` with them.
    pub fn borrowed(&self) -> Credentials<&str, &str> {
        Credentials::new(self.username.borrow(), self.password.borrow())
    }

    /// Renders the `Authorization: Basic ...` header value for this pair.
    pub fn authorization_header(&self) -> HeaderValue {
        let raw = format!("{}:{}", self.username.borrow(), self.password.borrow());
        let encoded = base64::encode(raw.as_bytes());
        let mut value = HeaderValue::from_str(&format!("Basic {}", encoded))
            .expect("base64 output is always a valid header value");
        value.set_sensitive(true);
        value
    }

    /// Applies the header to a request builder, under the key the transport
    /// expects (`AUTHORIZATION`).
    pub fn apply(&self, builder: http::request::Builder) -> http::request::Builder {
        builder.header(AUTHORIZATION, self.authorization_header())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_standard_basic_auth() {
        let creds = Credentials::new("Aladdin", "open sesame");
        let header = creds.authorization_header();
        assert_eq!(header, "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }
}
