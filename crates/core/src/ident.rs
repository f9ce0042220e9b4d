//! Resource identifiers: `<namespace>/<name>`.
//!
//! `/` is not legal in either a namespace or an object name, so the split is
//! unambiguous and `parse` is the exact inverse of `compose`.

use crate::error::{ProviderError, ProviderResult};

pub const SEPARATOR: char = '/';

pub fn compose(namespace: &str, name: &str) -> String { format!("{namespace}{SEPARATOR}{name}") }

pub fn parse(id: &str) -> ProviderResult<(String, String)> {
    let mut parts = id.split(SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(ns), Some(name), None) if !ns.is_empty() && !name.is_empty() => Ok((ns.to_string(), name.to_string())),
        _ => Err(ProviderError::MalformedIdentifier(id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DNS1123: &str = "[a-z0-9]([-a-z0-9]{0,30}[a-z0-9])?";
    const SUBDOMAIN: &str = "[a-z0-9]([-a-z0-9]{0,10}[a-z0-9])?(\\.[a-z0-9]([-a-z0-9]{0,10}[a-z0-9])?){0,3}";

    proptest! {
        #[test]
        fn parse_inverts_compose_for_legal_names(ns in DNS1123, name in SUBDOMAIN) {
            let id = compose(&ns, &name);
            prop_assert_eq!(parse(&id).ok(), Some((ns, name)));
        }

        #[test]
        fn compose_inverts_parse_for_accepted_ids(id in "[a-z0-9./-]{0,40}") {
            if let Ok((ns, name)) = parse(&id) {
                prop_assert_eq!(compose(&ns, &name), id);
            }
        }
    }

    #[test]
    fn parse_inverts_compose() {
        for (ns, name) in [("default", "web-0"), ("kube-system", "a"), ("n1", "x.y.z"), ("ns", "node_1")] {
            assert_eq!(parse(&compose(ns, name)).unwrap(), (ns.to_string(), name.to_string()));
        }
    }

    #[test]
    fn rejects_wrong_arity_and_empty_parts() {
        for bad in ["", "noslash", "/name", "ns/", "/", "a/b/c", "a//b"] {
            assert!(matches!(parse(bad), Err(ProviderError::MalformedIdentifier(_))), "{bad}");
        }
    }
}
