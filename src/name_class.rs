//! Name classes of simplified RELAX NG.
//!
//! # Reference
//! ISO/IEC 19757-2:2008 4.16 `name` attribute of `element` and `attribute` elements

use std::{collections::BTreeSet, sync::Arc};

use serde_json::{Value, json};

/// An expanded name: a pair of namespace name and local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EName {
    pub ns: Arc<str>,
    pub local: Arc<str>,
}

impl EName {
    pub fn new(ns: impl Into<Arc<str>>, local: impl Into<Arc<str>>) -> Self {
        Self {
            ns: ns.into(),
            local: local.into(),
        }
    }
}

impl std::fmt::Display for EName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}{}", self.ns, self.local)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameClass {
    Name {
        ns: Arc<str>,
        local: Arc<str>,
    },
    NameChoice(Arc<NameClass>, Arc<NameClass>),
    NsName {
        ns: Arc<str>,
        except: Option<Arc<NameClass>>,
    },
    AnyName {
        except: Option<Arc<NameClass>>,
    },
}

impl NameClass {
    pub fn name(ns: impl Into<Arc<str>>, local: impl Into<Arc<str>>) -> Self {
        Self::Name {
            ns: ns.into(),
            local: local.into(),
        }
    }

    pub fn choice(a: NameClass, b: NameClass) -> Self {
        Self::NameChoice(Arc::new(a), Arc::new(b))
    }

    /// Check if the pair of `ns` and `local` is a member of this name class.
    ///
    /// This method does not verify if `local` is a valid NCName.
    pub fn matches(&self, ns: &str, local: &str) -> bool {
        match self {
            Self::Name { ns: nc_ns, local: nc_local } => ns == &**nc_ns && local == &**nc_local,
            Self::NameChoice(a, b) => a.matches(ns, local) || b.matches(ns, local),
            Self::NsName { ns: nc_ns, except } => {
                ns == &**nc_ns && except.as_ref().is_none_or(|e| !e.matches(ns, local))
            }
            Self::AnyName { except } => except.as_ref().is_none_or(|e| !e.matches(ns, local)),
        }
    }

    /// Check if the pair of `ns` and `local` matches this name class only because of
    /// `nsName` or `anyName`.
    ///
    /// A literal `name` never matches as a wildcard, even if it is part of a choice that
    /// also contains a wildcard.
    pub fn wildcard_match(&self, ns: &str, local: &str) -> bool {
        match self {
            Self::Name { .. } => false,
            Self::NameChoice(a, b) => a.wildcard_match(ns, local) || b.wildcard_match(ns, local),
            Self::NsName { .. } | Self::AnyName { .. } => self.matches(ns, local),
        }
    }

    /// A name class is simple if it is composed only of `name` and `choice`.
    ///
    /// Simple name classes accept a finite set of names, which [`NameClass::to_names`]
    /// can enumerate.
    pub fn is_simple(&self) -> bool {
        match self {
            Self::Name { .. } => true,
            Self::NameChoice(a, b) => a.is_simple() && b.is_simple(),
            Self::NsName { .. } | Self::AnyName { .. } => false,
        }
    }

    /// Enumerate the names this name class accepts.
    ///
    /// If this name class is not simple, return `None`.
    pub fn to_names(&self) -> Option<Vec<EName>> {
        match self {
            Self::Name { ns, local } => Some(vec![EName::new(ns.clone(), local.clone())]),
            Self::NameChoice(a, b) => {
                let mut names = a.to_names()?;
                names.extend(b.to_names()?);
                Some(names)
            }
            Self::NsName { .. } | Self::AnyName { .. } => None,
        }
    }

    /// Collect the namespaces this name class refers to.
    ///
    /// `*` stands for `anyName` and `::except` is recorded if any exception occurs.
    pub fn namespaces(&self) -> BTreeSet<String> {
        let mut namespaces = BTreeSet::new();
        self.record_namespaces(&mut namespaces);
        namespaces
    }

    pub(crate) fn record_namespaces(&self, namespaces: &mut BTreeSet<String>) {
        match self {
            Self::Name { ns, .. } => {
                namespaces.insert(ns.to_string());
            }
            Self::NameChoice(a, b) => {
                a.record_namespaces(namespaces);
                b.record_namespaces(namespaces);
            }
            Self::NsName { ns, except } => {
                namespaces.insert(ns.to_string());
                if except.is_some() {
                    namespaces.insert("::except".to_owned());
                }
            }
            Self::AnyName { except } => {
                namespaces.insert("*".to_owned());
                if except.is_some() {
                    namespaces.insert("::except".to_owned());
                }
            }
        }
    }

    /// A JSON representation of this name class.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Name { ns, local } => json!({ "ns": &**ns, "name": &**local }),
            Self::NameChoice(a, b) => json!({ "a": a.to_json(), "b": b.to_json() }),
            Self::NsName { ns, except } => {
                let mut ret = json!({ "ns": &**ns });
                if let Some(except) = except {
                    ret["except"] = except.to_json();
                }
                ret
            }
            Self::AnyName { except } => {
                let mut ret = json!({ "pattern": "AnyName" });
                if let Some(except) = except {
                    ret["except"] = except.to_json();
                }
                ret
            }
        }
    }
}

impl std::fmt::Display for NameClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<EName> for NameClass {
    fn from(value: EName) -> Self {
        Self::Name {
            ns: value.ns,
            local: value.local,
        }
    }
}
