use crate::{
    error::ValidationError,
    event::{Event, EventSet, PossibleEvent},
    grammar::{Grammar, PatternId},
    walker::{FireResult, Walker, WalkerContext},
};

/// # Reference
/// ISO/IEC 19757-2:2008 9.3.4 oneOrMore pattern
#[derive(Debug, Clone)]
pub(crate) struct OneOrMoreWalker {
    pattern: PatternId,
    current: Box<Walker>,
    /// Created once `current` may end.
    next: Option<Box<Walker>>,
    seen_once: bool,
    suppressed: bool,
}

impl OneOrMoreWalker {
    pub fn new(grammar: &Grammar, pattern: PatternId) -> Self {
        Self {
            pattern,
            current: Box::new(Walker::new(grammar, pattern)),
            next: None,
            seen_once: false,
            suppressed: false,
        }
    }

    fn new_iteration(&self, cx: &WalkerContext) -> Box<Walker> {
        let mut walker = Walker::new(cx.grammar, self.pattern);
        if self.suppressed {
            walker.suppress_attributes();
        }
        Box::new(walker)
    }

    pub fn possible(&self, cx: &WalkerContext) -> EventSet {
        let mut ret = self.current.possible(cx);
        if self.current.can_end(cx) {
            match &self.next {
                Some(next) => ret.extend(next.possible(cx)),
                None => ret.extend(self.new_iteration(cx).possible(cx)),
            }
        }
        ret
    }

    /// # Panics
    /// - The current iteration claims it can end, but ending it fails.
    pub fn fire_event(&mut self, cx: &WalkerContext, event: &Event) -> FireResult {
        let ret = self.current.fire_event(cx, event);
        if ret == FireResult::Matched {
            self.seen_once = true;
        }
        if ret.is_matched() {
            return ret;
        }

        if self.seen_once && self.current.can_end(cx) {
            if let Err(errors) = self.current.end(cx) {
                panic!("internal error; can_end() returns true but end() fails: {errors:?}");
            }
            let mut next = match self.next.take() {
                Some(next) => next,
                None => self.new_iteration(cx),
            };
            let ret = next.fire_event(cx, event);
            if ret.is_matched() {
                self.current = next;
            } else {
                self.next = Some(next);
            }
            return ret;
        }
        FireResult::Unmatched
    }

    pub fn can_end(&self, cx: &WalkerContext) -> bool {
        self.seen_once && self.current.can_end(cx)
    }

    pub fn end(&mut self, cx: &WalkerContext) -> Result<(), Vec<ValidationError>> {
        self.next = None;
        self.current.end(cx)
    }

    pub fn suppress_attributes(&mut self) {
        if !self.suppressed {
            self.suppressed = true;
            self.current.suppress_attributes();
            if let Some(next) = self.next.as_mut() {
                next.suppress_attributes();
            }
        }
    }
}

/// A branch of a choice. Its walker is created the first time an event reaches it.
#[derive(Debug, Clone)]
enum Branch {
    Pending(PatternId),
    Started(Box<Walker>),
    /// The branch stopped matching.
    Dropped,
}

impl Branch {
    fn walker(&mut self, grammar: &Grammar, suppressed: bool) -> Option<&mut Walker> {
        if let Self::Pending(pattern) = *self {
            let mut walker = Walker::new(grammar, pattern);
            if suppressed {
                walker.suppress_attributes();
            }
            *self = Self::Started(Box::new(walker));
        }
        match self {
            Self::Started(walker) => Some(&mut **walker),
            _ => None,
        }
    }

    /// Query the walker of this branch without starting it.
    fn query<R>(
        &self,
        cx: &WalkerContext,
        suppressed: bool,
        f: impl FnOnce(&Walker) -> R,
    ) -> Option<R> {
        match self {
            &Self::Pending(pattern) => {
                let mut walker = Walker::new(cx.grammar, pattern);
                if suppressed {
                    walker.suppress_attributes();
                }
                Some(f(&walker))
            }
            Self::Started(walker) => Some(f(&**walker)),
            Self::Dropped => None,
        }
    }
}

/// Both branches see every event until one of them stops matching.
///
/// # Reference
/// ISO/IEC 19757-2:2008 9.3.5 choice pattern
#[derive(Debug, Clone)]
pub(crate) struct ChoiceWalker {
    a: Branch,
    b: Branch,
    chosen: bool,
    done: bool,
    suppressed: bool,
}

impl ChoiceWalker {
    pub fn new(a: PatternId, b: PatternId) -> Self {
        Self {
            a: Branch::Pending(a),
            b: Branch::Pending(b),
            chosen: false,
            done: false,
            suppressed: false,
        }
    }

    pub fn possible(&self, cx: &WalkerContext) -> EventSet {
        let mut ret = EventSet::new();
        for branch in [&self.a, &self.b] {
            if let Some(possible) = branch.query(cx, self.suppressed, |w| w.possible(cx)) {
                ret.extend(possible);
            }
        }
        ret
    }

    pub fn fire_event(&mut self, cx: &WalkerContext, event: &Event) -> FireResult {
        if self.done {
            return FireResult::Unmatched;
        }

        let ret_a = self
            .a
            .walker(cx.grammar, self.suppressed)
            .map_or(FireResult::Unmatched, |a| a.fire_event(cx, event));
        let ret_b = self
            .b
            .walker(cx.grammar, self.suppressed)
            .map_or(FireResult::Unmatched, |b| b.fire_event(cx, event));

        if ret_a.is_matched() {
            self.chosen = true;
            if !ret_b.is_matched() {
                self.b = Branch::Dropped;
            }
            return ret_a;
        }
        if ret_b.is_matched() {
            self.chosen = true;
            self.a = Branch::Dropped;
            return ret_b;
        }
        FireResult::Unmatched
    }

    pub fn can_end(&self, cx: &WalkerContext) -> bool {
        let a = self
            .a
            .query(cx, self.suppressed, |a| a.can_end(cx))
            .unwrap_or(true);
        let b = self
            .b
            .query(cx, self.suppressed, |b| b.can_end(cx))
            .unwrap_or(true);
        // Once a branch is chosen, the dropped one counts as ended.
        if self.chosen { a && b } else { a || b }
    }

    pub fn end(&mut self, cx: &WalkerContext) -> Result<(), Vec<ValidationError>> {
        self.done = true;
        if self.can_end(cx) {
            return Ok(());
        }

        let ret_a = self
            .a
            .walker(cx.grammar, self.suppressed)
            .map_or(Ok(()), |a| a.end(cx));
        let ret_b = self
            .b
            .walker(cx.grammar, self.suppressed)
            .map_or(Ok(()), |b| b.end(cx));
        let (errors_a, errors_b) = match (ret_a, ret_b) {
            (Ok(()), Ok(())) => return Ok(()),
            (Err(errors), Ok(())) | (Ok(()), Err(errors)) => return Err(errors),
            (Err(a), Err(b)) => (a, b),
        };

        // Both branches failed. If both only wait for some element, the document must
        // contain one of them.
        if let (Branch::Started(a), Branch::Started(b)) = (&self.a, &self.b) {
            if let (Some(names_a), Some(names_b)) =
                (start_tag_names(a, cx), start_tag_names(b, cx))
            {
                return Err(vec![ValidationError::Choice { names_a, names_b }]);
            }
        }
        drop(errors_b);
        Err(errors_a)
    }

    pub fn suppress_attributes(&mut self) {
        self.suppressed = true;
        for branch in [&mut self.a, &mut self.b] {
            if let Branch::Started(walker) = branch {
                walker.suppress_attributes();
            }
        }
    }
}

/// The names of the elements `walker` can start, if nothing else is possible.
fn start_tag_names(walker: &Walker, cx: &WalkerContext) -> Option<Vec<crate::name_class::NameClass>> {
    let mut names = walker
        .possible(cx)
        .into_iter()
        .map(|event| match event {
            PossibleEvent::EnterStartTag(name) => Some(name),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    names.sort_by_cached_key(|name| name.to_string());
    Some(names)
}

/// `a` then `b`. Attributes are unordered, so attribute events may reach `b` before `a`
/// is done.
///
/// # Reference
/// ISO/IEC 19757-2:2008 9.3.6 group pattern
#[derive(Debug, Clone)]
pub(crate) struct GroupWalker {
    a: Box<Walker>,
    b: Box<Walker>,
    hit_a: bool,
    ended_a: bool,
    hit_b: bool,
    suppressed: bool,
}

impl GroupWalker {
    pub fn new(grammar: &Grammar, a: PatternId, b: PatternId) -> Self {
        Self {
            a: Box::new(Walker::new(grammar, a)),
            b: Box::new(Walker::new(grammar, b)),
            hit_a: false,
            ended_a: false,
            hit_b: false,
            suppressed: false,
        }
    }

    pub fn possible(&self, cx: &WalkerContext) -> EventSet {
        let mut ret = if self.ended_a {
            EventSet::new()
        } else {
            self.a.possible(cx)
        };

        if self.suppressed {
            // While `a` cannot end, nothing of `b` is possible.
            if self.ended_a || self.a.can_end(cx) {
                ret.extend(self.b.possible(cx));
            }
        } else {
            let possible_b = self.b.possible(cx);
            if (!self.ended_a || self.hit_b) && !self.a.can_end(cx) {
                ret.extend(possible_b.into_iter().filter(|ev| ev.is_attribute_event()));
            } else {
                ret.extend(possible_b);
            }
        }
        ret
    }

    pub fn fire_event(&mut self, cx: &WalkerContext, event: &Event) -> FireResult {
        if !self.ended_a {
            let ret = self.a.fire_event(cx, event);
            if ret.is_matched() {
                self.hit_a = true;
                return ret;
            }
            // Only attributes may skip ahead.
            if !event.is_attribute_event() && !self.a.can_end(cx) {
                return FireResult::Unmatched;
            }
        }

        let ret = self.b.fire_event(cx, event);
        if !ret.is_matched() {
            return ret;
        }
        self.hit_b = true;

        if !event.is_attribute_event() && !self.ended_a {
            self.ended_a = true;
            if let Err(errors) = self.a.end(cx) {
                return ret.with_errors(errors);
            }
        }
        ret
    }

    pub fn can_end(&self, cx: &WalkerContext) -> bool {
        self.a.can_end(cx) && self.b.can_end(cx)
    }

    pub fn end(&mut self, cx: &WalkerContext) -> Result<(), Vec<ValidationError>> {
        if !self.ended_a {
            self.a.end(cx)?;
        }
        self.b.end(cx)
    }

    pub fn suppress_attributes(&mut self) {
        if !self.suppressed {
            self.suppressed = true;
            self.a.suppress_attributes();
            self.b.suppress_attributes();
        }
    }
}

/// `a` and `b` in any order, where at most one of them may be inside an element at a
/// time.
///
/// # Reference
/// ISO/IEC 19757-2:2008 9.3.6 interleave pattern
#[derive(Debug, Clone)]
pub(crate) struct InterleaveWalker {
    a: Box<Walker>,
    b: Box<Walker>,
    /// The number of elements each child has entered but not left.
    depth_a: usize,
    depth_b: usize,
}

impl InterleaveWalker {
    pub fn new(grammar: &Grammar, a: PatternId, b: PatternId) -> Self {
        Self {
            a: Box::new(Walker::new(grammar, a)),
            b: Box::new(Walker::new(grammar, b)),
            depth_a: 0,
            depth_b: 0,
        }
    }

    pub fn possible(&self, cx: &WalkerContext) -> EventSet {
        match (self.depth_a > 0, self.depth_b > 0) {
            (true, _) => self.a.possible(cx),
            (_, true) => self.b.possible(cx),
            _ => {
                let mut ret = self.a.possible(cx);
                ret.extend(self.b.possible(cx));
                ret
            }
        }
    }

    fn fire_child(
        walker: &mut Walker,
        depth: &mut usize,
        cx: &WalkerContext,
        event: &Event,
    ) -> FireResult {
        let ret = walker.fire_event(cx, event);
        if ret.is_matched() {
            match event {
                Event::EnterStartTag { .. } => *depth += 1,
                Event::EndTag { .. } => *depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        ret
    }

    /// # Panics
    /// - Both children are inside an element.
    pub fn fire_event(&mut self, cx: &WalkerContext, event: &Event) -> FireResult {
        match (self.depth_a > 0, self.depth_b > 0) {
            (true, true) => panic!("internal error: both children of interleave are in progress"),
            (true, false) => Self::fire_child(&mut self.a, &mut self.depth_a, cx, event),
            (false, true) => Self::fire_child(&mut self.b, &mut self.depth_b, cx, event),
            (false, false) => {
                let ret = Self::fire_child(&mut self.a, &mut self.depth_a, cx, event);
                if ret.is_matched() {
                    return ret;
                }
                Self::fire_child(&mut self.b, &mut self.depth_b, cx, event)
            }
        }
    }

    pub fn can_end(&self, cx: &WalkerContext) -> bool {
        self.a.can_end(cx) && self.b.can_end(cx)
    }

    pub fn end(&mut self, cx: &WalkerContext) -> Result<(), Vec<ValidationError>> {
        let mut errors = self.a.end(cx).err().unwrap_or_default();
        errors.extend(self.b.end(cx).err().unwrap_or_default());
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn suppress_attributes(&mut self) {
        self.a.suppress_attributes();
        self.b.suppress_attributes();
    }
}
