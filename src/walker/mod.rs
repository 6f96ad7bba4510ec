//! Incremental matchers, one per kind of pattern.
//!
//! A walker consumes one [`Event`] at a time and keeps just enough state to tell what
//! it accepts next. Walkers mirror only the visited part of the pattern tree: children
//! of an element are created when its start tag is left, later iterations of
//! `oneOrMore` when the current one is done, and so on.
//!
//! Walkers never own the namespace context. The [`GrammarWalker`](crate::validate::GrammarWalker)
//! owns it and lends it through [`WalkerContext`], so cloning a walker tree never
//! duplicates the resolver.

mod combinator;
mod element;
mod text;

use crate::{
    error::ValidationError,
    event::{Event, EventSet, PossibleEvent, TextMatcher},
    grammar::{Grammar, Pattern, PatternId},
    resolver::NameResolver,
    xmlchar::is_whitespace_only,
};

use combinator::{ChoiceWalker, GroupWalker, InterleaveWalker, OneOrMoreWalker};
use element::{AttributeWalker, ElementWalker};
use text::{DataWalker, ListWalker, ValueWalker};

/// What walkers need to know besides their own state.
#[derive(Clone, Copy)]
pub(crate) struct WalkerContext<'a> {
    pub grammar: &'a Grammar,
    pub resolver: &'a NameResolver,
}

/// The outcome of [`Walker::fire_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FireResult {
    Matched,
    /// The event was consumed, but is invalid for the reasons listed.
    Errors(Vec<ValidationError>),
    /// Only the first `len` bytes of a text event were consumed.
    PartialMatch(usize),
    Unmatched,
}

impl FireResult {
    /// Check if the event was consumed, even partially or with errors.
    pub fn is_matched(&self) -> bool {
        !matches!(self, Self::Unmatched)
    }

    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        if errors.is_empty() {
            Self::Matched
        } else {
            Self::Errors(errors)
        }
    }

    pub fn from_end(end: Result<(), Vec<ValidationError>>) -> Self {
        match end {
            Ok(()) => Self::Matched,
            Err(errors) => Self::from_errors(errors),
        }
    }

    /// Append `errors` to a result that consumed its event.
    ///
    /// A partial match cannot carry errors, so they are dropped.
    pub fn with_errors(self, errors: Vec<ValidationError>) -> Self {
        match self {
            Self::Matched => Self::from_errors(errors),
            Self::Errors(mut prev) => {
                prev.extend(errors);
                Self::Errors(prev)
            }
            ret => ret,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Walker {
    Empty,
    NotAllowed,
    Text,
    Value(ValueWalker),
    Data(DataWalker),
    List(ListWalker),
    OneOrMore(OneOrMoreWalker),
    Choice(ChoiceWalker),
    Group(GroupWalker),
    Interleave(InterleaveWalker),
    Attribute(AttributeWalker),
    Element(ElementWalker),
}

impl Walker {
    /// Create the walker of `pattern`.
    ///
    /// No walker exists for `ref` or `define`: the walker of the pattern they stand for
    /// is returned instead.
    pub fn new(grammar: &Grammar, pattern: PatternId) -> Self {
        match grammar.pattern(pattern) {
            Pattern::Empty => Self::Empty,
            Pattern::NotAllowed => Self::NotAllowed,
            Pattern::Text | Pattern::Param(_) => Self::Text,
            Pattern::Value(value) => Self::Value(ValueWalker::new(value.clone())),
            Pattern::Data(data) => Self::Data(DataWalker::new(data.clone())),
            &Pattern::List(child) => Self::List(ListWalker::new(grammar, child)),
            &Pattern::Ref(_, target) | &Pattern::Define(_, target) => Self::new(grammar, target),
            &Pattern::OneOrMore(child) => Self::OneOrMore(OneOrMoreWalker::new(grammar, child)),
            &Pattern::Choice(a, b) => Self::Choice(ChoiceWalker::new(a, b)),
            &Pattern::Group(a, b) => Self::Group(GroupWalker::new(grammar, a, b)),
            &Pattern::Interleave(a, b) => Self::Interleave(InterleaveWalker::new(grammar, a, b)),
            Pattern::Attribute(name, child) => {
                Self::Attribute(AttributeWalker::new(name.clone(), *child))
            }
            Pattern::Element(element) => {
                if element.content == crate::grammar::NOT_ALLOWED {
                    Self::NotAllowed
                } else {
                    Self::Element(ElementWalker::new(element.clone()))
                }
            }
        }
    }

    /// Create the walker of the element pattern `pattern`, even if its content is
    /// `notAllowed`.
    ///
    /// Misplaced elements are validated with such walkers, so their start tag must
    /// always match.
    pub fn element(grammar: &Grammar, pattern: PatternId) -> Self {
        match grammar.pattern(pattern) {
            Pattern::Element(element) => Self::Element(ElementWalker::new(element.clone())),
            _ => Self::new(grammar, pattern),
        }
    }

    /// The events this walker accepts next.
    pub fn possible(&self, cx: &WalkerContext) -> EventSet {
        match self {
            Self::Empty | Self::NotAllowed => EventSet::new(),
            Self::Text => EventSet::from([PossibleEvent::Text(TextMatcher::Any)]),
            Self::Value(w) => w.possible(),
            Self::Data(w) => w.possible(),
            Self::List(w) => w.possible(cx),
            Self::OneOrMore(w) => w.possible(cx),
            Self::Choice(w) => w.possible(cx),
            Self::Group(w) => w.possible(cx),
            Self::Interleave(w) => w.possible(cx),
            Self::Attribute(w) => w.possible(cx),
            Self::Element(w) => w.possible(cx),
        }
    }

    pub fn fire_event(&mut self, cx: &WalkerContext, event: &Event) -> FireResult {
        match self {
            Self::Empty => match event {
                Event::Text(text) if is_whitespace_only(text) => FireResult::Matched,
                _ => FireResult::Unmatched,
            },
            Self::NotAllowed => FireResult::Unmatched,
            Self::Text => match event {
                Event::Text(_) => FireResult::Matched,
                _ => FireResult::Unmatched,
            },
            Self::Value(w) => w.fire_event(cx, event),
            Self::Data(w) => w.fire_event(cx, event),
            Self::List(w) => w.fire_event(cx, event),
            Self::OneOrMore(w) => w.fire_event(cx, event),
            Self::Choice(w) => w.fire_event(cx, event),
            Self::Group(w) => w.fire_event(cx, event),
            Self::Interleave(w) => w.fire_event(cx, event),
            Self::Attribute(w) => w.fire_event(cx, event),
            Self::Element(w) => w.fire_event(cx, event),
        }
    }

    /// Check if the walker could end here without errors.
    pub fn can_end(&self, cx: &WalkerContext) -> bool {
        match self {
            Self::Empty | Self::Text => true,
            Self::NotAllowed => false,
            Self::Value(w) => w.can_end(),
            Self::Data(w) => w.can_end(cx),
            Self::List(w) => w.can_end(cx),
            Self::OneOrMore(w) => w.can_end(cx),
            Self::Choice(w) => w.can_end(cx),
            Self::Group(w) => w.can_end(cx),
            Self::Interleave(w) => w.can_end(cx),
            Self::Attribute(w) => w.can_end(),
            Self::Element(w) => w.can_end(),
        }
    }

    /// Finish walking, reporting what is still missing.
    pub fn end(&mut self, cx: &WalkerContext) -> Result<(), Vec<ValidationError>> {
        match self {
            // `notAllowed` cannot end, but it always comes with a reason reported elsewhere
            Self::Empty | Self::Text | Self::NotAllowed => Ok(()),
            Self::Value(w) => w.end(),
            Self::Data(w) => w.end(cx),
            Self::List(w) => w.end(cx),
            Self::OneOrMore(w) => w.end(cx),
            Self::Choice(w) => w.end(cx),
            Self::Group(w) => w.end(cx),
            Self::Interleave(w) => w.end(cx),
            Self::Attribute(w) => w.end(),
            Self::Element(w) => w.end(cx),
        }
    }

    /// Make attribute patterns stop accepting anything.
    ///
    /// This is called once the start tag of the enclosing element is left. It does not
    /// cross element boundaries.
    pub fn suppress_attributes(&mut self) {
        match self {
            Self::OneOrMore(w) => w.suppress_attributes(),
            Self::Choice(w) => w.suppress_attributes(),
            Self::Group(w) => w.suppress_attributes(),
            Self::Interleave(w) => w.suppress_attributes(),
            Self::Attribute(w) => w.suppress_attributes(),
            Self::Empty
            | Self::NotAllowed
            | Self::Text
            | Self::Value(_)
            | Self::Data(_)
            | Self::List(_)
            | Self::Element(_) => {}
        }
    }
}
