use std::sync::Arc;

use crate::{
    error::ValidationError,
    event::{Event, EventSet, PossibleEvent},
    grammar::{ElementPattern, PatternId},
    name_class::NameClass,
    walker::{FireResult, Walker, WalkerContext},
};

/// # Reference
/// ISO/IEC 19757-2:2008 9.3.7 attribute pattern
#[derive(Debug, Clone)]
pub(crate) struct AttributeWalker {
    name: NameClass,
    pattern: PatternId,
    /// The walker of the value. It is created when the value arrives.
    child: Option<Box<Walker>>,
    seen_name: bool,
    seen_value: bool,
    suppressed: bool,
}

impl AttributeWalker {
    pub fn new(name: NameClass, pattern: PatternId) -> Self {
        Self {
            name,
            pattern,
            child: None,
            seen_name: false,
            seen_value: false,
            suppressed: false,
        }
    }

    pub fn possible(&self, cx: &WalkerContext) -> EventSet {
        if self.suppressed || self.seen_value {
            return EventSet::new();
        }
        if !self.seen_name {
            return EventSet::from([PossibleEvent::AttributeName(self.name.clone())]);
        }

        let values = match &self.child {
            Some(child) => child.possible(cx),
            None => Walker::new(cx.grammar, self.pattern).possible(cx),
        };
        values
            .into_iter()
            .filter_map(|event| match event {
                PossibleEvent::Text(text) => Some(PossibleEvent::AttributeValue(text)),
                _ => None,
            })
            .collect()
    }

    pub fn fire_event(&mut self, cx: &WalkerContext, event: &Event) -> FireResult {
        if self.suppressed {
            return FireResult::Unmatched;
        }

        match event {
            Event::AttributeName { uri, local } if !self.seen_name => {
                if self.name.matches(uri, local) {
                    self.seen_name = true;
                    FireResult::Matched
                } else {
                    FireResult::Unmatched
                }
            }
            Event::AttributeValue(value) if self.seen_name && !self.seen_value => {
                self.seen_value = true;
                let child = self
                    .child
                    .get_or_insert_with(|| Box::new(Walker::new(cx.grammar, self.pattern)));
                match child.fire_event(cx, &Event::text(value.as_str())) {
                    FireResult::Matched => FireResult::from_end(child.end(cx)),
                    FireResult::Unmatched | FireResult::PartialMatch(_) => {
                        FireResult::Errors(vec![ValidationError::attribute_value(
                            "invalid attribute value",
                            self.name.clone(),
                        )])
                    }
                    ret @ FireResult::Errors(_) => ret,
                }
            }
            _ => FireResult::Unmatched,
        }
    }

    pub fn can_end(&self) -> bool {
        self.suppressed || self.seen_value
    }

    pub fn end(&self) -> Result<(), Vec<ValidationError>> {
        if self.can_end() {
            Ok(())
        } else if !self.seen_name {
            Err(vec![ValidationError::attribute_name(
                "attribute missing",
                self.name.clone(),
            )])
        } else {
            Err(vec![ValidationError::attribute_value(
                "attribute value missing",
                self.name.clone(),
            )])
        }
    }

    pub fn suppress_attributes(&mut self) {
        self.suppressed = true;
    }
}

/// An element goes through three phases: its start tag, its attributes up to the end of
/// the start tag, then its content up to the end tag.
///
/// While the start tag is open, attributes are matched against the attribute projection
/// of the content, because the content itself may start with non-attribute patterns.
/// The attributes are replayed to the real content walker once the start tag is left.
///
/// # Reference
/// ISO/IEC 19757-2:2008 9.3.7 element pattern
#[derive(Debug, Clone)]
pub(crate) struct ElementWalker {
    element: Arc<ElementPattern>,
    /// The name the start tag used. The end tag must use the same one.
    name: Option<(String, String)>,
    ended_start_tag: bool,
    closed: bool,
    /// The attribute walker in the start tag, the content walker after it.
    walker: Option<Box<Walker>>,
    captured: Vec<Event>,
}

impl ElementWalker {
    pub fn new(element: Arc<ElementPattern>) -> Self {
        Self {
            element,
            name: None,
            ended_start_tag: false,
            closed: false,
            walker: None,
            captured: vec![],
        }
    }

    pub fn possible(&self, cx: &WalkerContext) -> EventSet {
        let Some((ns, local)) = self.name.as_ref() else {
            return EventSet::from([PossibleEvent::EnterStartTag(self.element.name.clone())]);
        };

        if self.closed {
            return EventSet::new();
        }

        if !self.ended_start_tag {
            let Some(walker) = self.walker.as_ref() else {
                return EventSet::from([PossibleEvent::LeaveStartTag]);
            };
            let all = walker.possible(cx);
            // A pending attribute value excludes everything else.
            let mut ret = match all
                .iter()
                .find(|event| matches!(event, PossibleEvent::AttributeValue(_)))
            {
                Some(value) => EventSet::from([value.clone()]),
                None => all
                    .into_iter()
                    .filter(PossibleEvent::is_attribute_event)
                    .collect(),
            };
            if walker.can_end(cx) {
                ret.insert(PossibleEvent::LeaveStartTag);
            }
            return ret;
        }

        let mut ret = self
            .walker
            .as_ref()
            .map(|walker| walker.possible(cx))
            .unwrap_or_default();
        if self.walker.as_ref().is_none_or(|walker| walker.can_end(cx)) {
            ret.insert(PossibleEvent::EndTag(NameClass::name(
                ns.as_str(),
                local.as_str(),
            )));
        }
        ret
    }

    pub fn fire_event(&mut self, cx: &WalkerContext, event: &Event) -> FireResult {
        if self.name.is_none() {
            return match event {
                Event::EnterStartTag { uri, local } if self.element.name.matches(uri, local) => {
                    self.name = Some((uri.clone(), local.clone()));
                    self.walker = self
                        .element
                        .attributes
                        .map(|attrs| Box::new(Walker::new(cx.grammar, attrs)));
                    FireResult::Matched
                }
                _ => FireResult::Unmatched,
            };
        }

        if self.closed {
            return FireResult::Unmatched;
        }

        if !self.ended_start_tag {
            return match event {
                Event::LeaveStartTag => self.leave_start_tag(cx),
                event if event.is_attribute_event() => {
                    let ret = self
                        .walker
                        .as_mut()
                        .map_or(FireResult::Unmatched, |walker| walker.fire_event(cx, event));
                    if ret.is_matched() {
                        self.captured.push(event.clone());
                    }
                    ret
                }
                _ => FireResult::Unmatched,
            };
        }

        let (Some(walker), Some((ns, local))) = (self.walker.as_mut(), self.name.as_ref()) else {
            return FireResult::Unmatched;
        };
        let ret = walker.fire_event(cx, event);
        if ret.is_matched() {
            return ret;
        }
        match event {
            Event::EndTag { uri, local: l } if uri == ns && l == local => {
                self.closed = true;
                FireResult::from_end(walker.end(cx))
            }
            Event::LeaveStartTag => FireResult::Errors(vec![ValidationError::plain(
                "unexpected leaveStartTag event; it is likely that fireEvent is incorrectly called",
            )]),
            _ => FireResult::Unmatched,
        }
    }

    fn leave_start_tag(&mut self, cx: &WalkerContext) -> FireResult {
        self.ended_start_tag = true;

        let ret = match self.walker.as_mut() {
            Some(walker) => FireResult::from_end(walker.end(cx)),
            None => FireResult::Matched,
        };

        let mut content = Walker::new(cx.grammar, self.element.content);
        for event in &self.captured {
            // Errors were reported when the attribute walker saw these events.
            content.fire_event(cx, event);
        }
        content.suppress_attributes();
        self.walker = Some(Box::new(content));
        ret
    }

    pub fn can_end(&self) -> bool {
        self.closed
    }

    pub fn end(&mut self, cx: &WalkerContext) -> Result<(), Vec<ValidationError>> {
        if self.name.is_none() {
            return Err(vec![ValidationError::element_name(
                "tag required",
                self.element.name.clone(),
            )]);
        }
        if self.closed {
            return Ok(());
        }

        let mut errors = self
            .walker
            .as_mut()
            .and_then(|walker| walker.end(cx).err())
            .unwrap_or_default();
        let msg = if self.ended_start_tag {
            "tag not closed"
        } else {
            "start tag not terminated"
        };
        errors.push(ValidationError::element_name(msg, self.element.name.clone()));
        Err(errors)
    }
}
