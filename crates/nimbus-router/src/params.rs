//! Captured path parameters.

use smallvec::SmallVec;

/// Parameters stored inline before spilling to the heap. ARM paths
/// rarely carry more than four (subscription, group, name, child).
const INLINE_PARAMS: usize = 4;

/// Named path parameters extracted by a route match.
///
/// # Example
///
/// ```rust
/// use nimbus_router::Params;
///
/// let mut params = Params::new();
/// params.push("subscriptionId", "sub1");
/// assert_eq!(params.get("subscriptionId"), Some("sub1"));
/// assert_eq!(params.get("missing"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a captured parameter.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Looks up a parameter value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` when nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over `(name, value)` pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let mut params = Params::new();
        params.push("resourceGroupName", "rg1");
        params.push("namespaceName", "ns1");

        assert_eq!(params.get("resourceGroupName"), Some("rg1"));
        assert_eq!(params.get("namespaceName"), Some("ns1"));
        assert_eq!(params.get("other"), None);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_iter_preserves_capture_order() {
        let mut params = Params::new();
        for i in 0..6 {
            params.push(format!("p{i}"), format!("v{i}"));
        }
        let names: Vec<_> = params.iter().map(|(n, _)| n.to_owned()).collect();
        assert_eq!(names, ["p0", "p1", "p2", "p3", "p4", "p5"]);
    }

    #[test]
    fn test_empty() {
        let params = Params::new();
        assert!(params.is_empty());
        assert_eq!(params.get("x"), None);
    }
}
