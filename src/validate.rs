//! Validation of a whole document against a [`Grammar`].

use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    error::ValidationError,
    event::{Event, EventSet},
    grammar::Grammar,
    name_class::{EName, NameClass},
    resolver::NameResolver,
    walker::{FireResult, Walker, WalkerContext},
    xmlchar::{is_whitespace, is_whitespace_only},
};

/// Where events go after an element the schema does not allow at that point.
#[derive(Debug, Clone)]
enum Recovery {
    /// The only definition of the misplaced element. Its content is still validated.
    Walker(Walker),
    /// Swallows the whole subtree, counting nested start tags.
    Placeholder { depth: usize },
}

/// Validates one document, one event at a time.
///
/// A `GrammarWalker` owns the namespace context of the document, so namespace events
/// must be fired at it like any other event. Errors never stop validation: after an
/// error, the walker recovers and keeps reporting errors for the rest of the document.
///
/// Cloning a `GrammarWalker` yields a fully independent session, which makes it cheap to
/// ask "what if" questions about the next events.
///
/// # Example
/// ```
/// use rngwalk::{event::Event, format::read_tree};
///
/// let grammar = read_tree(r#"{"v":2,"o":1,"d":[15,[13,[18,"","a"],[0,[1]]],[0]]}"#).unwrap();
/// let mut walker = grammar.new_walker();
///
/// assert!(walker.fire_event(&Event::enter_start_tag("", "a")).is_ok());
/// assert!(walker.fire_event(&Event::LeaveStartTag).is_ok());
/// assert!(walker.fire_event(&Event::text("not empty")).is_err());
/// assert!(walker.fire_event(&Event::end_tag("", "a")).is_ok());
/// assert!(walker.end().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GrammarWalker {
    grammar: Arc<Grammar>,
    walker: Walker,
    resolver: NameResolver,
    recovery: Vec<Recovery>,
    /// Whitespace-only text not yet fired.
    suspended_ws: Option<String>,
    /// Set after an end tag: whitespace up to the next event is insignificant.
    ignore_next_ws: bool,
    /// Set after an attribute name is rejected: its value is not reported again.
    swallow_attribute_value: bool,
    previous_was_text: bool,
}

impl GrammarWalker {
    pub(crate) fn new(grammar: Arc<Grammar>) -> Self {
        let walker = Walker::new(&grammar, grammar.start());
        debug!(start = grammar.start(), "start validation");
        Self {
            grammar,
            walker,
            resolver: NameResolver::new(),
            recovery: vec![],
            suspended_ws: None,
            ignore_next_ws: false,
            swallow_attribute_value: false,
            previous_was_text: false,
        }
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    /// The namespace context of the document at this point.
    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    /// Resolve a qualified name with the prefixes declared so far.
    pub fn resolve_name(&self, name: &str, attribute: bool) -> Option<EName> {
        self.resolver.resolve_name(name, attribute)
    }

    /// Convert an expanded name back to a qualified name valid at this point.
    pub fn unresolve_name(&self, uri: &str, local: &str) -> Option<String> {
        self.resolver.unresolve_name(uri, local)
    }

    /// Fire `event` and report the errors it causes.
    ///
    /// # Panics
    /// - Two non-whitespace text events are fired in a row. Text must be fired in one
    ///   piece.
    /// - `LeaveContext` is fired without a matching `EnterContext`.
    /// - `LeaveStartTag` is fired outside of any start tag.
    pub fn fire_event(&mut self, event: &Event) -> Result<(), Vec<ValidationError>> {
        trace!(%event, "fire");
        match event {
            Event::EnterContext => {
                self.resolver.enter_context();
                return Ok(());
            }
            Event::LeaveContext => {
                if let Err(err) = self.resolver.leave_context() {
                    panic!("{err}");
                }
                return Ok(());
            }
            Event::DefinePrefix { prefix, uri } => {
                return self
                    .resolver
                    .define_prefix(prefix, uri)
                    .map_err(|err| vec![ValidationError::plain(err.to_string())]);
            }
            Event::Text(text) => {
                if is_whitespace_only(text) {
                    self.suspended_ws.get_or_insert_default().push_str(text);
                    return Ok(());
                }
                assert!(
                    !self.previous_was_text,
                    "two consecutive text events are fired; text must be fired in one piece"
                );
            }
            _ => {}
        }
        self.previous_was_text = matches!(event, Event::Text(_));

        let mut errors = vec![];
        let ignore_now = std::mem::take(&mut self.ignore_next_ws);
        let mut trimmed = None;
        match event {
            Event::EnterStartTag { .. } => self.suspended_ws = None,
            Event::Text(text) => {
                if ignore_now {
                    self.suspended_ws = None;
                    let rest = text.trim_start_matches(is_whitespace);
                    if rest.len() != text.len() {
                        trimmed = Some(Event::text(rest));
                    }
                } else {
                    self.flush_whitespace(&mut errors);
                }
            }
            _ => {
                if matches!(event, Event::EndTag { .. }) {
                    self.ignore_next_ws = true;
                }
                if ignore_now {
                    self.suspended_ws = None;
                } else {
                    self.flush_whitespace(&mut errors);
                }
            }
        }
        let event = trimmed.as_ref().unwrap_or(event);

        if std::mem::take(&mut self.swallow_attribute_value) {
            if matches!(event, Event::AttributeValue(_)) {
                return into_result(errors);
            }
            errors.push(ValidationError::plain("attribute value required"));
        }

        self.fire_and_recover(event, &mut errors);
        into_result(errors)
    }

    /// Fire `event` at the walker in charge, whether it is the main walker or a recovery
    /// walker.
    fn dispatch(&mut self, event: &Event) -> FireResult {
        let cx = WalkerContext {
            grammar: &self.grammar,
            resolver: &self.resolver,
        };
        match self.recovery.last_mut() {
            Some(Recovery::Walker(walker)) => walker.fire_event(&cx, event),
            Some(Recovery::Placeholder { depth }) => {
                match event {
                    Event::EnterStartTag { .. } => *depth += 1,
                    Event::EndTag { .. } => *depth -= 1,
                    _ => {}
                }
                FireResult::Matched
            }
            None => self.walker.fire_event(&cx, event),
        }
    }

    fn flush_whitespace(&mut self, errors: &mut Vec<ValidationError>) {
        let Some(ws) = self.suspended_ws.take() else {
            return;
        };
        match self.dispatch(&Event::Text(ws)) {
            FireResult::Matched | FireResult::PartialMatch(_) => {}
            FireResult::Errors(errs) => errors.extend(errs),
            FireResult::Unmatched => errors.push(ValidationError::plain("text not allowed here")),
        }
    }

    fn fire_and_recover(&mut self, event: &Event, errors: &mut Vec<ValidationError>) {
        match self.dispatch(event) {
            FireResult::Matched => {}
            FireResult::Errors(errs) => errors.extend(errs),
            FireResult::PartialMatch(len) => {
                let Event::Text(text) = event else {
                    panic!("internal error: {event} is partially matched");
                };
                // the remainder always starts with a rejected token, so it is reported
                return self.fire_and_recover(&Event::text(&text[len..]), errors);
            }
            FireResult::Unmatched => self.report_unmatched(event, errors),
        }

        let cx = WalkerContext {
            grammar: &self.grammar,
            resolver: &self.resolver,
        };
        let done = match self.recovery.last() {
            Some(Recovery::Walker(walker)) => walker.can_end(&cx),
            Some(Recovery::Placeholder { depth }) => *depth == 0,
            None => false,
        };
        if done {
            if let Some(Recovery::Walker(mut walker)) = self.recovery.pop() {
                if let Err(errs) = walker.end(&cx) {
                    errors.extend(errs);
                }
            }
            debug!(depth = self.recovery.len(), "leave recovery");
        }
    }

    fn report_unmatched(&mut self, event: &Event, errors: &mut Vec<ValidationError>) {
        match event {
            Event::EnterStartTag { uri, local } => {
                errors.push(ValidationError::element_name(
                    "tag not allowed here",
                    NameClass::name(uri.as_str(), local.as_str()),
                ));
                let cx = WalkerContext {
                    grammar: &self.grammar,
                    resolver: &self.resolver,
                };
                let recovery = match self.grammar.elements_matching(uri, local)[..] {
                    [id] => {
                        let mut walker = Walker::element(&self.grammar, id);
                        if walker.fire_event(&cx, event).is_matched() {
                            Recovery::Walker(walker)
                        } else {
                            Recovery::Placeholder { depth: 1 }
                        }
                    }
                    _ => Recovery::Placeholder { depth: 1 },
                };
                debug!(
                    %event,
                    validated = matches!(recovery, Recovery::Walker(_)),
                    "enter recovery"
                );
                self.recovery.push(recovery);
            }
            Event::EndTag { uri, local } => errors.push(ValidationError::element_name(
                "unexpected end tag",
                NameClass::name(uri.as_str(), local.as_str()),
            )),
            Event::AttributeName { uri, local } => {
                errors.push(ValidationError::attribute_name(
                    "attribute not allowed here",
                    NameClass::name(uri.as_str(), local.as_str()),
                ));
                self.swallow_attribute_value = true;
            }
            Event::AttributeValue(_) => errors.push(ValidationError::plain(
                "unexpected attributeValue event; it is likely that fireEvent is incorrectly called",
            )),
            Event::Text(_) => errors.push(ValidationError::plain("text not allowed here")),
            Event::LeaveStartTag => {
                panic!("internal error: leaveStartTag is fired outside of any start tag")
            }
            Event::EnterContext | Event::LeaveContext | Event::DefinePrefix { .. } => {
                unreachable!("namespace events never reach walkers")
            }
        }
    }

    /// The events acceptable at this point.
    ///
    /// Inside a misplaced element that has no unique definition, nothing is offered.
    pub fn possible(&self) -> EventSet {
        let cx = WalkerContext {
            grammar: &self.grammar,
            resolver: &self.resolver,
        };
        match self.recovery.last() {
            Some(Recovery::Walker(walker)) => walker.possible(&cx),
            Some(Recovery::Placeholder { .. }) => EventSet::new(),
            None => self.walker.possible(&cx),
        }
    }

    /// Check if the document could end here without errors.
    pub fn can_end(&self) -> bool {
        let cx = WalkerContext {
            grammar: &self.grammar,
            resolver: &self.resolver,
        };
        self.recovery.is_empty() && self.walker.can_end(&cx)
    }

    /// Finish the document, reporting everything still missing.
    pub fn end(&mut self) -> Result<(), Vec<ValidationError>> {
        let cx = WalkerContext {
            grammar: &self.grammar,
            resolver: &self.resolver,
        };
        let mut errors = vec![];
        while let Some(recovery) = self.recovery.pop() {
            if let Recovery::Walker(mut walker) = recovery {
                errors.extend(walker.end(&cx).err().unwrap_or_default());
            }
        }
        errors.extend(self.walker.end(&cx).err().unwrap_or_default());
        into_result(errors)
    }
}

fn into_result(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        datatype::{RelaxNGDatatypeLibraries, xsd::XSD_NAMESPACE},
        event::{PossibleEvent, TextMatcher},
        grammar::{EMPTY, GrammarBuilder, NOT_ALLOWED, Pattern, PatternId, TEXT},
    };

    fn build(f: impl FnOnce(&mut GrammarBuilder) -> PatternId) -> Arc<Grammar> {
        let libraries = RelaxNGDatatypeLibraries::default();
        let mut builder = GrammarBuilder::new(&libraries);
        let start = f(&mut builder);
        Arc::new(Grammar::new(builder, start, &[]).unwrap())
    }

    fn name(local: &str) -> NameClass {
        NameClass::name("", local)
    }

    /// <doc> <a>text</a>* </doc>, with `<a>` also allowed alone in `<other>`.
    fn document_grammar() -> Arc<Grammar> {
        build(|b| {
            let a = b.element(name("a"), TEXT);
            let items = b.create_node(Pattern::OneOrMore(a));
            let doc = b.element(name("doc"), items);
            let c = b.element(name("c"), EMPTY);
            let other = b.element(name("other"), c);
            b.create_node(Pattern::Choice(doc, other))
        })
    }

    fn fire(walker: &mut GrammarWalker, events: &[Event]) -> Vec<ValidationError> {
        events
            .iter()
            .flat_map(|ev| walker.fire_event(ev).err().unwrap_or_default())
            .collect()
    }

    fn open(local: &str) -> [Event; 2] {
        [Event::enter_start_tag("", local), Event::LeaveStartTag]
    }

    #[test]
    fn valid_document_test() {
        let grammar = build(|b| b.element(name("a"), EMPTY));
        let mut walker = grammar.new_walker();
        assert!(!walker.can_end());
        assert_eq!(walker.fire_event(&Event::enter_start_tag("", "a")), Ok(()));
        assert_eq!(walker.fire_event(&Event::LeaveStartTag), Ok(()));
        assert_eq!(walker.fire_event(&Event::end_tag("", "a")), Ok(()));
        assert!(walker.can_end());
        assert_eq!(walker.end(), Ok(()));
    }

    #[test]
    fn misplaced_element_without_content_test() {
        // <doc> (<a/> | <x>notAllowed</x>) </doc>
        let grammar = build(|b| {
            let a = b.element(name("a"), EMPTY);
            let x = b.element(name("x"), NOT_ALLOWED);
            let content = b.create_node(Pattern::Choice(a, x));
            b.element(name("doc"), content)
        });
        let mut walker = grammar.new_walker();
        assert!(fire(&mut walker, &open("doc")).is_empty());

        assert_eq!(
            walker.fire_event(&Event::enter_start_tag("", "x")),
            Err(vec![ValidationError::element_name(
                "tag not allowed here",
                name("x")
            )])
        );
        assert_eq!(walker.fire_event(&Event::LeaveStartTag), Ok(()));
        assert_eq!(
            walker.fire_event(&Event::text("content")),
            Err(vec![ValidationError::plain("text not allowed here")])
        );
        assert_eq!(walker.fire_event(&Event::end_tag("", "x")), Ok(()));

        let mut events = open("a").to_vec();
        events.push(Event::end_tag("", "a"));
        events.push(Event::end_tag("", "doc"));
        assert!(fire(&mut walker, &events).is_empty());
        assert_eq!(walker.end(), Ok(()));
    }

    #[test]
    fn misplaced_subtree_is_swallowed_test() {
        let grammar = build(|b| b.element(name("a"), EMPTY));
        let mut walker = grammar.new_walker();

        assert_eq!(
            walker.fire_event(&Event::enter_start_tag("", "b")),
            Err(vec![ValidationError::element_name(
                "tag not allowed here",
                name("b")
            )])
        );
        let mut events = vec![Event::attribute_name("", "x"), Event::attribute_value("1")];
        events.push(Event::LeaveStartTag);
        events.extend(open("c"));
        events.push(Event::text("ignored"));
        events.push(Event::end_tag("", "c"));
        assert!(fire(&mut walker, &events).is_empty());
        assert!(walker.possible().is_empty());
        assert!(!walker.can_end());

        assert_eq!(walker.fire_event(&Event::end_tag("", "b")), Ok(()));
        assert_eq!(
            walker.possible(),
            EventSet::from([PossibleEvent::EnterStartTag(name("a"))])
        );
    }

    #[test]
    fn misplaced_element_is_still_validated_test() {
        let grammar = document_grammar();
        let mut walker = grammar.new_walker();

        assert!(fire(&mut walker, &open("doc")).is_empty());
        // <c> has a single definition, so its content is checked
        assert_eq!(
            fire(&mut walker, &open("c")),
            vec![ValidationError::element_name(
                "tag not allowed here",
                name("c")
            )]
        );
        assert_eq!(walker.possible(), EventSet::from([PossibleEvent::EndTag(name("c"))]));
        assert_eq!(
            walker.fire_event(&Event::text("oops")),
            Err(vec![ValidationError::plain("text not allowed here")])
        );
        assert_eq!(walker.fire_event(&Event::end_tag("", "c")), Ok(()));

        let mut events = open("a").to_vec();
        events.push(Event::end_tag("", "a"));
        events.push(Event::end_tag("", "doc"));
        assert!(fire(&mut walker, &events).is_empty());
        assert_eq!(walker.end(), Ok(()));
    }

    #[test]
    fn unexpected_end_tag_test() {
        let grammar = build(|b| b.element(name("a"), EMPTY));
        let mut walker = grammar.new_walker();
        fire(&mut walker, &open("a"));
        assert_eq!(
            walker.fire_event(&Event::end_tag("", "b")),
            Err(vec![ValidationError::element_name(
                "unexpected end tag",
                name("b")
            )])
        );
        assert_eq!(
            walker.end(),
            Err(vec![ValidationError::element_name("tag not closed", name("a"))])
        );
    }

    #[test]
    fn attribute_value_is_swallowed_test() {
        let grammar = build(|b| b.element(name("a"), EMPTY));
        let mut walker = grammar.new_walker();
        walker.fire_event(&Event::enter_start_tag("", "a")).unwrap();

        assert_eq!(
            walker.fire_event(&Event::attribute_name("", "x")),
            Err(vec![ValidationError::attribute_name(
                "attribute not allowed here",
                name("x")
            )])
        );
        assert_eq!(walker.fire_event(&Event::attribute_value("1")), Ok(()));

        walker.fire_event(&Event::attribute_name("", "y")).unwrap_err();
        assert_eq!(
            walker.fire_event(&Event::LeaveStartTag),
            Err(vec![ValidationError::plain("attribute value required")])
        );
    }

    #[test]
    fn stray_attribute_value_test() {
        let grammar = build(|b| b.element(name("a"), EMPTY));
        let mut walker = grammar.new_walker();
        walker.fire_event(&Event::enter_start_tag("", "a")).unwrap();
        let errors = walker
            .fire_event(&Event::attribute_value("1"))
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().starts_with("unexpected attributeValue"));
    }

    #[test]
    fn whitespace_test() {
        let grammar = document_grammar();
        let mut walker = grammar.new_walker();

        // whitespace between elements is insignificant
        let mut events = vec![Event::text("\n")];
        events.extend(open("doc"));
        events.push(Event::text("\n  "));
        events.extend(open("a"));
        events.push(Event::text("  x  "));
        events.push(Event::end_tag("", "a"));
        events.push(Event::text("\n  "));
        events.push(Event::text("\t"));
        events.extend(open("a"));
        events.push(Event::end_tag("", "a"));
        events.push(Event::text("\n"));
        events.push(Event::end_tag("", "doc"));
        events.push(Event::text("\n"));
        assert_eq!(fire(&mut walker, &events), vec![]);
        assert_eq!(walker.end(), Ok(()));
    }

    #[test]
    fn suspended_whitespace_is_flushed_test() {
        let grammar = build(|b| b.element(name("a"), EMPTY));
        let mut walker = grammar.new_walker();
        fire(&mut walker, &open("a"));
        // empty content accepts whitespace
        assert_eq!(walker.fire_event(&Event::text("  ")), Ok(()));
        assert_eq!(walker.fire_event(&Event::end_tag("", "a")), Ok(()));

        let grammar = build(|b| {
            let c = b.element(name("c"), EMPTY);
            b.element(name("a"), c)
        });
        let mut walker = grammar.new_walker();
        fire(&mut walker, &open("a"));
        walker.fire_event(&Event::text(" ")).unwrap();
        assert_eq!(
            walker.fire_event(&Event::text("x")),
            Err(vec![
                ValidationError::plain("text not allowed here"),
                ValidationError::plain("text not allowed here")
            ])
        );
    }

    #[test]
    fn partial_list_match_test() {
        let grammar = build(|b| {
            let int = b.data(XSD_NAMESPACE, "integer", &[], None).unwrap();
            let ints = b.create_node(Pattern::OneOrMore(int));
            let list = b.create_node(Pattern::List(ints));
            b.element(name("a"), list)
        });
        let mut walker = grammar.new_walker();
        fire(&mut walker, &open("a"));
        assert_eq!(
            walker.possible(),
            EventSet::from([PossibleEvent::Text(TextMatcher::Datatype("integer".into()))])
        );
        assert_eq!(
            walker.fire_event(&Event::text("1 2 x 3")),
            Err(vec![ValidationError::plain("text not allowed here")])
        );
        assert_eq!(walker.fire_event(&Event::end_tag("", "a")), Ok(()));
    }

    #[test]
    #[should_panic(expected = "two consecutive text events")]
    fn consecutive_text_test() {
        let grammar = build(|b| b.element(name("a"), TEXT));
        let mut walker = grammar.new_walker();
        fire(&mut walker, &open("a"));
        let _ = walker.fire_event(&Event::text("x"));
        let _ = walker.fire_event(&Event::text("y"));
    }

    #[test]
    #[should_panic]
    fn leave_default_context_test() {
        let grammar = build(|b| b.element(name("a"), TEXT));
        let _ = grammar.new_walker().fire_event(&Event::LeaveContext);
    }

    #[test]
    fn namespace_test() {
        let grammar = build(|b| b.element(NameClass::name("urn:x", "bar"), EMPTY));
        let mut walker = grammar.new_walker();

        walker.fire_event(&Event::EnterContext).unwrap();
        walker
            .fire_event(&Event::define_prefix("foo", "urn:x"))
            .unwrap();
        assert_eq!(
            walker.resolve_name("foo:bar", false),
            Some(EName::new("urn:x", "bar"))
        );
        assert_eq!(walker.unresolve_name("urn:x", "bar").as_deref(), Some("foo:bar"));
        assert!(walker.fire_event(&Event::define_prefix("xmlns", "urn:y")).is_err());

        let events = [
            Event::enter_start_tag("urn:x", "bar"),
            Event::LeaveStartTag,
            Event::end_tag("urn:x", "bar"),
            Event::LeaveContext,
        ];
        assert!(fire(&mut walker, &events).is_empty());
        assert_eq!(walker.resolve_name("foo:bar", false), None);
        assert_eq!(walker.end(), Ok(()));
    }

    #[test]
    fn clone_test() {
        let grammar = document_grammar();
        let mut walker = grammar.new_walker();
        walker.fire_event(&Event::EnterContext).unwrap();
        fire(&mut walker, &open("doc"));
        let possible = walker.possible();

        let mut clone = walker.clone();
        clone
            .fire_event(&Event::define_prefix("p", "urn:p"))
            .unwrap();
        fire(&mut clone, &open("a"));
        assert_ne!(clone.possible(), possible);

        assert_eq!(walker.possible(), possible);
        assert_eq!(walker.resolve_name("p:x", false), None);
        assert_eq!(
            clone.resolve_name("p:x", false),
            Some(EName::new("urn:p", "x"))
        );
    }

    #[test]
    fn end_reports_open_recovery_test() {
        let grammar = document_grammar();
        let mut walker = grammar.new_walker();
        fire(&mut walker, &open("doc"));
        fire(&mut walker, &open("c"));
        assert!(!walker.can_end());
        assert_eq!(
            walker.end(),
            Err(vec![
                ValidationError::element_name("tag not closed", name("c")),
                ValidationError::element_name("tag required", name("a")),
                ValidationError::element_name("tag not closed", name("doc")),
            ])
        );
    }
}
