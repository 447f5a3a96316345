//! Capability Store: which portfolios the current client may modify.
//!
//! Grants are held by the client in the `portfolioAccess` cookie as a
//! dot-separated list of portfolio ids. The cookie is unsigned: this is an
//! advisory, client-trust control and offers no server-side guarantee.

use std::collections::BTreeMap;

use axum::http::{header, HeaderMap};

pub const ACCESS_COOKIE: &str = "portfolioAccess";
const SEPARATOR: char = '.';
const COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 365;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityStore {
    grants: BTreeMap<String, bool>,
    demo_id: Option<String>,
}

impl CapabilityStore {
    /// Unions the always-granted demo portfolio with the persisted grants.
    pub fn load(demo_id: Option<&str>, persisted: &BTreeMap<String, bool>) -> Self {
        let mut grants = BTreeMap::new();
        if let Some(demo) = demo_id {
            grants.insert(demo.to_string(), true);
        }
        grants.extend(persisted.iter().map(|(k, v)| (k.clone(), *v)));
        Self {
            grants,
            demo_id: demo_id.map(str::to_string),
        }
    }

    /// Loads the grants carried by a request's `Cookie` header(s).
    pub fn from_headers(demo_id: Option<&str>, headers: &HeaderMap) -> Self {
        let mut persisted = BTreeMap::new();
        for value in headers.get_all(header::COOKIE) {
            if let Ok(raw) = value.to_str() {
                persisted.extend(parse_cookie_grants(raw));
            }
        }
        Self::load(demo_id, &persisted)
    }

    /// Adds a grant without disturbing existing ones.
    pub fn grant(&mut self, portfolio_id: &str) {
        self.grants.insert(portfolio_id.to_string(), true);
    }

    /// Unknown ids are not granted.
    pub fn has(&self, portfolio_id: &str) -> bool {
        self.grants.get(portfolio_id).copied().unwrap_or(false)
    }

    pub fn grants(&self) -> &BTreeMap<String, bool> {
        &self.grants
    }

    /// `Set-Cookie` value persisting every granted id except the built-in demo grant.
    pub fn to_set_cookie(&self) -> String {
        let ids: Vec<&str> = self
            .grants
            .iter()
            .filter(|(id, granted)| **granted && Some(id.as_str()) != self.demo_id.as_deref())
            .map(|(id, _)| id.as_str())
            .collect();
        format!(
            "{ACCESS_COOKIE}={}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}; SameSite=Lax",
            ids.join(&SEPARATOR.to_string())
        )
    }
}

/// Extracts the granted ids from a `Cookie` header value.
fn parse_cookie_grants(raw: &str) -> BTreeMap<String, bool> {
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| *name == ACCESS_COOKIE)
        .flat_map(|(_, value)| value.split(SEPARATOR))
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.chars().all(is_id_char))
        .map(|id| (id.to_string(), true))
        .collect()
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}
