use std::sync::Arc;

use crate::{
    error::ValidationError,
    event::{Event, EventSet, PossibleEvent, TextMatcher},
    grammar::{DataPattern, Grammar, PatternId, ValuePattern},
    resolver::NameResolver,
    walker::{FireResult, Walker, WalkerContext},
    xmlchar::is_whitespace,
};

/// # Reference
/// ISO/IEC 19757-2:2008 9.3.8 data and value pattern
#[derive(Debug, Clone)]
pub(crate) struct ValueWalker {
    pattern: Arc<ValuePattern>,
    matched: bool,
}

impl ValueWalker {
    pub fn new(pattern: Arc<ValuePattern>) -> Self {
        Self {
            pattern,
            matched: false,
        }
    }

    pub fn possible(&self) -> EventSet {
        if self.matched {
            EventSet::new()
        } else {
            EventSet::from([PossibleEvent::Text(TextMatcher::Literal(
                self.pattern.raw.clone(),
            ))])
        }
    }

    pub fn fire_event(&mut self, cx: &WalkerContext, event: &Event) -> FireResult {
        let Event::Text(text) = event else {
            return FireResult::Unmatched;
        };
        let datatype = &self.pattern.datatype;
        let context = datatype.needs_context().then_some(cx.resolver);
        if self.matched || !datatype.equal(text, &self.pattern.value, context) {
            return FireResult::Unmatched;
        }
        self.matched = true;
        FireResult::Matched
    }

    pub fn can_end(&self) -> bool {
        self.matched || self.pattern.raw.is_empty()
    }

    pub fn end(&self) -> Result<(), Vec<ValidationError>> {
        if self.can_end() {
            Ok(())
        } else {
            Err(vec![ValidationError::plain(format!(
                "value required: {}",
                self.pattern.raw
            ))])
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DataWalker {
    pattern: Arc<DataPattern>,
    matched: bool,
}

impl DataWalker {
    pub fn new(pattern: Arc<DataPattern>) -> Self {
        Self {
            pattern,
            matched: false,
        }
    }

    fn context<'a>(&self, cx: &WalkerContext<'a>) -> Option<&'a NameResolver> {
        self.pattern
            .datatype
            .needs_context()
            .then_some(cx.resolver)
    }

    pub fn possible(&self) -> EventSet {
        if self.matched {
            EventSet::new()
        } else {
            EventSet::from([PossibleEvent::Text(TextMatcher::Datatype(
                self.pattern.type_name.clone(),
            ))])
        }
    }

    pub fn fire_event(&mut self, cx: &WalkerContext, event: &Event) -> FireResult {
        let Event::Text(text) = event else {
            return FireResult::Unmatched;
        };
        if self.matched {
            return FireResult::Unmatched;
        }
        let pattern = &self.pattern;
        if pattern
            .datatype
            .disallows(text, &pattern.params, self.context(cx))
            .is_some()
        {
            return FireResult::Unmatched;
        }
        if let Some(except) = pattern.except {
            let mut except = Walker::new(cx.grammar, except);
            if except.fire_event(cx, event) == FireResult::Matched && except.can_end(cx) {
                return FireResult::Unmatched;
            }
        }
        self.matched = true;
        FireResult::Matched
    }

    pub fn can_end(&self, cx: &WalkerContext) -> bool {
        self.matched
            || self
                .pattern
                .datatype
                .disallows("", &self.pattern.params, self.context(cx))
                .is_none()
    }

    pub fn end(&self, cx: &WalkerContext) -> Result<(), Vec<ValidationError>> {
        if self.can_end(cx) {
            Ok(())
        } else {
            Err(vec![ValidationError::plain("value required")])
        }
    }
}

/// Each whitespace-separated token of a text is matched against the child in turn.
///
/// # Reference
/// ISO/IEC 19757-2:2008 9.3.9 list pattern
#[derive(Debug, Clone)]
pub(crate) struct ListWalker {
    child: Box<Walker>,
    seen_tokens: bool,
}

impl ListWalker {
    pub fn new(grammar: &Grammar, pattern: PatternId) -> Self {
        Self {
            child: Box::new(Walker::new(grammar, pattern)),
            seen_tokens: false,
        }
    }

    pub fn possible(&self, cx: &WalkerContext) -> EventSet {
        self.child.possible(cx)
    }

    pub fn fire_event(&mut self, cx: &WalkerContext, event: &Event) -> FireResult {
        let Event::Text(text) = event else {
            return FireResult::Unmatched;
        };

        for (i, (offset, token)) in tokens(text).enumerate() {
            self.seen_tokens = true;
            match self.child.fire_event(cx, &Event::text(token)) {
                FireResult::Matched => {}
                FireResult::Errors(errors) => return FireResult::Errors(errors),
                _ if i == 0 => return FireResult::Unmatched,
                _ => return FireResult::PartialMatch(offset),
            }
        }
        // whitespace only text is consumed without any effect
        FireResult::Matched
    }

    pub fn can_end(&self, cx: &WalkerContext) -> bool {
        if self.seen_tokens || self.child.can_end(cx) {
            return self.child.can_end(cx);
        }
        // An empty list is a single empty token.
        let mut token = self.child.clone();
        token.fire_event(cx, &Event::text("")) == FireResult::Matched && token.can_end(cx)
    }

    pub fn end(&mut self, cx: &WalkerContext) -> Result<(), Vec<ValidationError>> {
        if self.can_end(cx) {
            return Ok(());
        }
        self.child.end(cx)?;
        Err(vec![ValidationError::plain("unfulfilled list")])
    }
}

/// Split `text` on whitespace, yielding each token with its byte offset in `text`.
fn tokens(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut rest = 0;
    std::iter::from_fn(move || {
        let start = rest + text[rest..].find(|c| !is_whitespace(c))?;
        let len = text[start..]
            .find(is_whitespace)
            .unwrap_or(text.len() - start);
        rest = start + len;
        Some((start, &text[start..rest]))
    })
}
