//! Correlation-ID lookup on incoming request headers.

use std::collections::{BTreeMap, HashMap};

/// Header carrying the transaction ID assigned by the front-end server.
pub const CORRELATION_HEADER: &str = "passenger-txn-id";

/// Read-only view over a request's headers.
///
/// Implementations compare header names case-insensitively.
pub trait HeaderLookup {
    fn header(&self, name: &str) -> Option<&str>;
}

fn find_in_pairs<'a, K, V>(
    mut pairs: impl Iterator<Item = (&'a K, &'a V)>,
    name: &str,
) -> Option<&'a str>
where
    K: AsRef<str> + ?Sized + 'a,
    V: AsRef<str> + ?Sized + 'a,
{
    pairs
        .find(|(key, _)| key.as_ref().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_ref())
}

impl<K: AsRef<str>, V: AsRef<str>, S> HeaderLookup for HashMap<K, V, S> {
    fn header(&self, name: &str) -> Option<&str> {
        find_in_pairs(self.iter(), name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> HeaderLookup for BTreeMap<K, V> {
    fn header(&self, name: &str) -> Option<&str> {
        find_in_pairs(self.iter(), name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> HeaderLookup for [(K, V)] {
    fn header(&self, name: &str) -> Option<&str> {
        find_in_pairs(self.iter().map(|(k, v)| (k, v)), name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> HeaderLookup for Vec<(K, V)> {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

/// Correlation ID carried by a request, if present and non-empty.
pub fn correlation_id_from_request<H: HeaderLookup + ?Sized>(headers: &H) -> Option<&str> {
    headers
        .header(CORRELATION_HEADER)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}
