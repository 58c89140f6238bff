//! Client-carried session identity and preference cookies.
//!
//! # Responsibilities
//! - Read the session id from the request cookie or issue a new one
//! - Expose the id to downstream stages as a request extension
//! - Refresh the session cookie on every response
//! - Read and build the currency preference cookie for page handlers
//!
//! Nothing is stored server side. A session ends when the browser drops the
//! cookie after its max-age.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use cookie::Cookie;
use uuid::Uuid;

use crate::config::SessionConfig;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Currencies a visitor may select.
pub const SUPPORTED_CURRENCIES: [&str; 6] = ["USD", "EUR", "CAD", "JPY", "GBP", "TRY"];

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Names and lifetime of the cookies the frontend issues.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    prefix: String,
    max_age: Duration,
}

impl SessionCookies {
    pub fn new(prefix: impl Into<String>, max_age: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            max_age,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.cookie_prefix.clone(), config.max_age())
    }

    pub fn session_cookie_name(&self) -> String {
        format!("{}session-id", self.prefix)
    }

    pub fn currency_cookie_name(&self) -> String {
        format!("{}currency", self.prefix)
    }

    /// The session id carried by the request, if any.
    pub fn read_session(&self, headers: &HeaderMap) -> Option<SessionId> {
        find_cookie(headers, &self.session_cookie_name()).map(SessionId)
    }

    /// The visitor's currency, falling back to [`DEFAULT_CURRENCY`] when the
    /// cookie is missing or names an unsupported currency.
    pub fn currency(&self, headers: &HeaderMap) -> &'static str {
        find_cookie(headers, &self.currency_cookie_name())
            .and_then(|code| SUPPORTED_CURRENCIES.iter().copied().find(|c| *c == code))
            .unwrap_or(DEFAULT_CURRENCY)
    }

    pub fn session_cookie(&self, session: &SessionId) -> Cookie<'static> {
        self.build(self.session_cookie_name(), session.as_str().to_string())
    }

    /// Cookie storing `code`, or `None` if the currency is not supported.
    pub fn currency_cookie(&self, code: &str) -> Option<Cookie<'static>> {
        SUPPORTED_CURRENCIES
            .contains(&code)
            .then(|| self.build(self.currency_cookie_name(), code.to_string()))
    }

    /// Cookies that expire every frontend cookie, used on logout.
    pub fn expired(&self) -> Vec<Cookie<'static>> {
        [self.session_cookie_name(), self.currency_cookie_name()]
            .into_iter()
            .map(|name| {
                Cookie::build((name, ""))
                    .path("/")
                    .max_age(cookie::time::Duration::ZERO)
                    .build()
            })
            .collect()
    }

    fn build(&self, name: String, value: String) -> Cookie<'static> {
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        Cookie::build((name, value))
            .path("/")
            .max_age(cookie::time::Duration::seconds(max_age))
            .build()
    }

    /// Add the session cookie ahead of any cookie the handler issued, so a
    /// handler that expires the session (logout) still wins in the browser.
    fn attach(&self, session: &SessionId, headers: &mut HeaderMap) {
        let Ok(value) = HeaderValue::from_str(&self.session_cookie(session).to_string()) else {
            tracing::warn!(session = %session, "Session id is not a valid header value, cookie not refreshed");
            return;
        };

        let issued: Vec<HeaderValue> = headers.get_all(SET_COOKIE).iter().cloned().collect();
        headers.remove(SET_COOKIE);
        headers.append(SET_COOKIE, value);
        for cookie in issued {
            headers.append(SET_COOKIE, cookie);
        }
    }
}

fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}

/// Session stage of the request pipeline.
pub async fn assign_session(
    State(cookies): State<Arc<SessionCookies>>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = cookies
        .read_session(request.headers())
        .unwrap_or_else(SessionId::generate);
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;
    cookies.attach(&session, response.headers_mut());
    response
}
