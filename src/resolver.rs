//! Namespace prefix bookkeeping for qualified names appearing in a document.
//!
//! # Reference
//! Namespaces in XML 1.0 (Third Edition)

use std::collections::HashMap;

use crate::{XML_NS_NAMESPACE, XML_XML_NAMESPACE, error::NameResolverError, name_class::EName};

#[derive(Debug, Clone, Default)]
struct Scope {
    forward: HashMap<String, String>,
    /// URI -> prefixes bound to it in this scope. The empty prefix is always first.
    backward: HashMap<String, Vec<String>>,
}

/// A stack of namespace scopes.
///
/// The outermost scope is the default context. It binds `xml` and cannot be left.
#[derive(Debug, Clone)]
pub struct NameResolver {
    scopes: Vec<Scope>,
}

impl NameResolver {
    pub fn new() -> Self {
        let mut default = Scope::default();
        default
            .forward
            .insert("xml".to_owned(), XML_XML_NAMESPACE.to_owned());
        default
            .backward
            .insert(XML_XML_NAMESPACE.to_owned(), vec!["xml".to_owned()]);
        Self {
            scopes: vec![default],
        }
    }

    /// Bind `prefix` to `uri` in the innermost scope.
    ///
    /// `prefix` may be empty, in which case the default namespace is declared.
    pub fn define_prefix(&mut self, prefix: &str, uri: &str) -> Result<(), NameResolverError> {
        if prefix == "xmlns" {
            return Err(NameResolverError::DefineXmlns);
        }
        if (prefix == "xml") != (uri == XML_XML_NAMESPACE) || uri == XML_NS_NAMESPACE {
            return Err(NameResolverError::RebindXml {
                prefix: prefix.to_owned(),
                uri: uri.to_owned(),
            });
        }

        let scope = self
            .scopes
            .last_mut()
            .expect("the default context is never removed");
        if let Some(old) = scope.forward.insert(prefix.to_owned(), uri.to_owned()) {
            if let Some(prefixes) = scope.backward.get_mut(&old) {
                prefixes.retain(|p| p != prefix);
            }
        }
        let prefixes = scope.backward.entry(uri.to_owned()).or_default();
        if prefix.is_empty() {
            prefixes.insert(0, String::new());
        } else {
            prefixes.push(prefix.to_owned());
        }
        Ok(())
    }

    pub fn enter_context(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn leave_context(&mut self) -> Result<(), NameResolverError> {
        if self.scopes.len() > 1 {
            self.scopes.pop();
            Ok(())
        } else {
            Err(NameResolverError::LeaveDefaultContext)
        }
    }

    /// The number of scopes, including the default context.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.forward.get(prefix))
            .map(String::as_str)
    }

    /// Resolve a qualified name to an expanded name.
    ///
    /// Unprefixed attribute names are never in a namespace. Unprefixed element names are
    /// in the default namespace, if one is declared.
    ///
    /// If the prefix is not bound or `name` contains more than one colon, return `None`.
    pub fn resolve_name(&self, name: &str, attribute: bool) -> Option<EName> {
        let (prefix, local) = match name.split_once(':') {
            Some((_, local)) if local.contains(':') => return None,
            Some((prefix, local)) => (prefix, local),
            None if attribute => return Some(EName::new("", name)),
            None => ("", name),
        };

        match self.lookup(prefix) {
            Some(uri) => Some(EName::new(uri, local)),
            None if prefix.is_empty() => Some(EName::new("", local)),
            None => None,
        }
    }

    /// The prefix to use for names in `uri`, preferring the default namespace.
    ///
    /// Prefixes shadowed by an inner scope are skipped.
    pub fn prefix_from_uri(&self, uri: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .filter_map(|scope| scope.backward.get(uri))
            .flatten()
            .map(String::as_str)
            .find(|prefix| self.lookup(prefix) == Some(uri))
    }

    /// Convert an expanded name back to a qualified name valid in the current scope.
    ///
    /// If `uri` is not bound to any prefix, return `None`.
    pub fn unresolve_name(&self, uri: &str, local: &str) -> Option<String> {
        if uri.is_empty() {
            return Some(local.to_owned());
        }
        match self.prefix_from_uri(uri)? {
            "" => Some(local.to_owned()),
            prefix => Some(format!("{prefix}:{local}")),
        }
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefixed_name_test() {
        let mut resolver = NameResolver::new();
        resolver.enter_context();
        resolver.define_prefix("foo", "urn:x").unwrap();
        assert_eq!(
            resolver.resolve_name("foo:bar", false),
            Some(EName::new("urn:x", "bar"))
        );
        resolver.leave_context().unwrap();
        assert_eq!(resolver.resolve_name("foo:bar", false), None);
    }

    #[test]
    fn resolve_unprefixed_name_test() {
        let mut resolver = NameResolver::new();
        assert_eq!(resolver.resolve_name("a", false), Some(EName::new("", "a")));
        resolver.enter_context();
        resolver.define_prefix("", "urn:d").unwrap();
        assert_eq!(
            resolver.resolve_name("a", false),
            Some(EName::new("urn:d", "a"))
        );
        assert_eq!(resolver.resolve_name("a", true), Some(EName::new("", "a")));
        assert_eq!(resolver.resolve_name("a:b:c", false), None);
        assert_eq!(
            resolver.resolve_name("xml:lang", true),
            Some(EName::new(XML_XML_NAMESPACE, "lang"))
        );
    }

    #[test]
    fn define_reserved_prefix_test() {
        let mut resolver = NameResolver::new();
        assert!(matches!(
            resolver.define_prefix("xmlns", "urn:x"),
            Err(NameResolverError::DefineXmlns)
        ));
        assert!(resolver.define_prefix("xml", "urn:x").is_err());
        assert!(resolver.define_prefix("foo", XML_XML_NAMESPACE).is_err());
        assert!(resolver.define_prefix("xml", XML_XML_NAMESPACE).is_ok());
        assert!(matches!(
            resolver.leave_context(),
            Err(NameResolverError::LeaveDefaultContext)
        ));
    }

    #[test]
    fn unresolve_name_test() {
        let mut resolver = NameResolver::new();
        resolver.enter_context();
        resolver.define_prefix("a", "urn:x").unwrap();
        resolver.define_prefix("", "urn:x").unwrap();
        assert_eq!(resolver.unresolve_name("urn:x", "n").as_deref(), Some("n"));
        assert_eq!(resolver.unresolve_name("", "n").as_deref(), Some("n"));
        assert_eq!(resolver.unresolve_name("urn:y", "n"), None);

        resolver.enter_context();
        // shadow the default namespace
        resolver.define_prefix("", "urn:y").unwrap();
        assert_eq!(resolver.unresolve_name("urn:x", "n").as_deref(), Some("a:n"));
        assert_eq!(resolver.prefix_from_uri("urn:y"), Some(""));
    }

    #[test]
    fn clone_independence_test() {
        let mut resolver = NameResolver::new();
        resolver.enter_context();
        let mut cloned = resolver.clone();
        cloned.define_prefix("p", "urn:p").unwrap();
        assert!(resolver.resolve_name("p:a", false).is_none());
        assert!(cloned.resolve_name("p:a", false).is_some());
    }
}
