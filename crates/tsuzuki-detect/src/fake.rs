//! In-memory [`Dom`] for tests.
//!
//! Supports a small selector subset: `tag`, `#id`, `.class`, `[attr]`,
//! `[attr='v']`, `[attr*='v']` and comma-separated lists of those compounds.
//! Anything else (combinators, pseudo-classes) is rejected as an invalid
//! selector, which is handy for exercising error paths.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use crate::dom::{Dom, DomError, MediaEvent, MediaSnapshot, NodeId, Rect};

#[derive(Debug, Clone, Default)]
struct FakeNode {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: Option<NodeId>,
    host: Option<NodeId>,
    rect: Rect,
    visible: bool,
    media: Option<MediaSnapshot>,
}

/// A scriptable page.
#[derive(Debug)]
pub struct FakeDom {
    nodes: RefCell<Vec<FakeNode>>,
    title: RefCell<String>,
    location: RefCell<String>,
    top_level: Cell<bool>,
    listeners: RefCell<HashMap<NodeId, HashSet<MediaEvent>>>,
    failing_selectors: RefCell<HashSet<String>>,
    unlisten_fails: Cell<bool>,
    scanned_scopes: RefCell<Vec<NodeId>>,
}

impl FakeDom {
    pub const DOCUMENT: NodeId = NodeId(0);

    pub fn new(location: &str) -> Self {
        let document = FakeNode {
            tag: "#document".into(),
            visible: true,
            ..Default::default()
        };
        Self {
            nodes: RefCell::new(vec![document]),
            title: RefCell::new(String::new()),
            location: RefCell::new(location.to_string()),
            top_level: Cell::new(true),
            listeners: RefCell::new(HashMap::new()),
            failing_selectors: RefCell::new(HashSet::new()),
            unlisten_fails: Cell::new(false),
            scanned_scopes: RefCell::new(Vec::new()),
        }
    }

    /// Append an element described by a compound selector, e.g.
    /// `div#player.video-player[data-kind='main']`.
    pub fn add_element(&self, parent: NodeId, spec: &str) -> NodeId {
        let compound = parse_compound(spec).unwrap_or_else(|e| panic!("bad element spec {spec}: {e}"));
        let node = FakeNode {
            tag: compound.tag.unwrap_or_else(|| "div".into()),
            id: compound.id,
            classes: compound.classes,
            attrs: compound
                .attrs
                .into_iter()
                .map(|a| match a.op {
                    AttrOp::Exists => (a.name, String::new()),
                    AttrOp::Equals(v) | AttrOp::Contains(v) => (a.name, v),
                })
                .collect(),
            parent: Some(parent),
            visible: true,
            ..Default::default()
        };
        self.push_child(parent, node)
    }

    /// Append a `<video>` with the given size and media state.
    pub fn add_video(&self, parent: NodeId, rect: Rect, media: MediaSnapshot) -> NodeId {
        let id = self.add_element(parent, "video");
        let mut nodes = self.nodes.borrow_mut();
        let node = &mut nodes[id.0 as usize];
        node.rect = rect;
        node.media = Some(media);
        id
    }

    /// Attach an open shadow root to `host`.
    pub fn attach_shadow(&self, host: NodeId) -> NodeId {
        let root = {
            let mut nodes = self.nodes.borrow_mut();
            let id = NodeId(nodes.len() as u64);
            nodes.push(FakeNode {
                tag: "#shadow-root".into(),
                host: Some(host),
                visible: true,
                ..Default::default()
            });
            id
        };
        self.nodes.borrow_mut()[host.0 as usize].shadow_root = Some(root);
        root
    }

    pub fn set_text(&self, id: NodeId, text: &str) {
        self.nodes.borrow_mut()[id.0 as usize].text = Some(text.to_string());
    }

    pub fn set_attr(&self, id: NodeId, name: &str, value: &str) {
        let mut nodes = self.nodes.borrow_mut();
        let attrs = &mut nodes[id.0 as usize].attrs;
        if let Some(slot) = attrs.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value.to_string();
        } else {
            attrs.push((name.to_string(), value.to_string()));
        }
    }

    pub fn set_rect(&self, id: NodeId, rect: Rect) {
        self.nodes.borrow_mut()[id.0 as usize].rect = rect;
    }

    pub fn set_visible(&self, id: NodeId, visible: bool) {
        self.nodes.borrow_mut()[id.0 as usize].visible = visible;
    }

    /// Mutate the media state of a video element.
    pub fn update_media(&self, id: NodeId, f: impl FnOnce(&mut MediaSnapshot)) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(media) = nodes[id.0 as usize].media.as_mut() {
            f(media);
        }
    }

    /// Detach `id` (and its subtree) from the page.
    pub fn remove(&self, id: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(parent) = nodes[id.0 as usize].parent.take() {
            nodes[parent.0 as usize].children.retain(|c| *c != id);
        }
    }

    pub fn set_title(&self, title: &str) {
        *self.title.borrow_mut() = title.to_string();
    }

    pub fn set_location(&self, location: &str) {
        *self.location.borrow_mut() = location.to_string();
    }

    pub fn set_top_level(&self, top_level: bool) {
        self.top_level.set(top_level);
    }

    /// Make every query with exactly this selector fail.
    pub fn fail_selector(&self, selector: &str) {
        self.failing_selectors.borrow_mut().insert(selector.to_string());
    }

    pub fn fail_unlisten(&self, fail: bool) {
        self.unlisten_fails.set(fail);
    }

    /// Events currently wired on `id`.
    pub fn listeners(&self, id: NodeId) -> HashSet<MediaEvent> {
        self.listeners.borrow().get(&id).cloned().unwrap_or_default()
    }

    /// Scopes passed to `query_selector_all`, in call order.
    pub fn scanned_scopes(&self) -> Vec<NodeId> {
        self.scanned_scopes.borrow().clone()
    }

    fn push_child(&self, parent: NodeId, node: FakeNode) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len() as u64);
        nodes.push(node);
        nodes[parent.0 as usize].children.push(id);
        id
    }

    fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let nodes = self.nodes.borrow();
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = nodes[scope.0 as usize].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(nodes[id.0 as usize].children.iter().rev().copied());
        }
        out
    }

    fn node_matches(&self, id: NodeId, selector: &str) -> Result<bool, DomError> {
        let list = parse_selector_list(selector)?;
        let nodes = self.nodes.borrow();
        let node = &nodes[id.0 as usize];
        Ok(list.iter().any(|c| c.matches(node)))
    }
}

impl Dom for FakeDom {
    fn document(&self) -> NodeId {
        Self::DOCUMENT
    }

    fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        self.scanned_scopes.borrow_mut().push(scope);
        if self.failing_selectors.borrow().contains(selector) {
            return Err(DomError::Query(format!("forced failure for {selector}")));
        }
        let list = parse_selector_list(selector)?;
        let nodes = self.nodes.borrow();
        Ok(self
            .descendants(scope)
            .into_iter()
            .filter(|id| list.iter().any(|c| c.matches(&nodes[id.0 as usize])))
            .collect())
    }

    fn elements(&self, scope: NodeId) -> Result<Vec<NodeId>, DomError> {
        Ok(self.descendants(scope))
    }

    fn shadow_root(&self, element: NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(element.0 as usize)?.shadow_root
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(node.0 as usize)?.parent
    }

    fn shadow_host(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(node.0 as usize)?.host
    }

    fn matches(&self, element: NodeId, selector: &str) -> Result<bool, DomError> {
        if element == Self::DOCUMENT {
            return Ok(false);
        }
        self.node_matches(element, selector)
    }

    fn is_connected(&self, element: NodeId) -> bool {
        let nodes = self.nodes.borrow();
        let mut current = element;
        loop {
            if current == Self::DOCUMENT {
                return true;
            }
            let Some(node) = nodes.get(current.0 as usize) else {
                return false;
            };
            match node.parent.or(node.host) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    fn text_content(&self, element: NodeId) -> Option<String> {
        self.nodes.borrow().get(element.0 as usize)?.text.clone()
    }

    fn attribute(&self, element: NodeId, name: &str) -> Option<String> {
        let nodes = self.nodes.borrow();
        let node = nodes.get(element.0 as usize)?;
        if name == "id" {
            return node.id.clone();
        }
        node.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
    }

    fn bounding_rect(&self, element: NodeId) -> Rect {
        self.nodes
            .borrow()
            .get(element.0 as usize)
            .map(|n| n.rect)
            .unwrap_or_default()
    }

    fn is_visible(&self, element: NodeId) -> bool {
        self.nodes
            .borrow()
            .get(element.0 as usize)
            .is_some_and(|n| n.visible)
    }

    fn media(&self, element: NodeId) -> Option<MediaSnapshot> {
        self.nodes.borrow().get(element.0 as usize)?.media.clone()
    }

    fn listen(&self, element: NodeId, events: &[MediaEvent]) -> Result<(), DomError> {
        if !self.is_connected(element) {
            return Err(DomError::Detached(element));
        }
        self.listeners
            .borrow_mut()
            .entry(element)
            .or_default()
            .extend(events.iter().copied());
        Ok(())
    }

    fn unlisten(&self, element: NodeId, events: &[MediaEvent]) -> Result<(), DomError> {
        if self.unlisten_fails.get() {
            return Err(DomError::Detached(element));
        }
        if let Some(set) = self.listeners.borrow_mut().get_mut(&element) {
            for event in events {
                set.remove(event);
            }
        }
        Ok(())
    }

    fn seek(&self, element: NodeId, seconds: f64) -> Result<(), DomError> {
        let mut nodes = self.nodes.borrow_mut();
        let media = nodes
            .get_mut(element.0 as usize)
            .and_then(|n| n.media.as_mut())
            .ok_or(DomError::Detached(element))?;
        media.current_time = seconds;
        Ok(())
    }

    fn title(&self) -> String {
        self.title.borrow().clone()
    }

    fn location(&self) -> String {
        self.location.borrow().clone()
    }

    fn is_top_level(&self) -> bool {
        self.top_level.get()
    }
}

// ── Selector subset ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
}

#[derive(Debug, Clone)]
struct AttrSel {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSel>,
}

impl Compound {
    fn matches(&self, node: &FakeNode) -> bool {
        if node.tag.starts_with('#') {
            return false;
        }
        if let Some(tag) = &self.tag {
            if tag != "*" && !tag.eq_ignore_ascii_case(&node.tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| node.classes.contains(c)) {
            return false;
        }
        self.attrs.iter().all(|a| {
            let value = if a.name == "id" {
                node.id.clone()
            } else if a.name == "class" {
                (!node.classes.is_empty()).then(|| node.classes.join(" "))
            } else {
                node.attrs.iter().find(|(n, _)| *n == a.name).map(|(_, v)| v.clone())
            };
            match (&a.op, value) {
                (_, None) => false,
                (AttrOp::Exists, Some(_)) => true,
                (AttrOp::Equals(want), Some(v)) => *want == v,
                (AttrOp::Contains(want), Some(v)) => v.contains(want.as_str()),
            }
        })
    }
}

fn parse_selector_list(selector: &str) -> Result<Vec<Compound>, DomError> {
    selector
        .split(',')
        .map(|part| parse_compound(part.trim()))
        .collect()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(s: &str) -> Result<Compound, DomError> {
    let invalid = || DomError::InvalidSelector(s.to_string());
    if s.is_empty() {
        return Err(invalid());
    }
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    let mut compound = Compound::default();

    let take_ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    if chars[0] == '*' {
        compound.tag = Some("*".into());
        i = 1;
    } else if is_ident_char(chars[0]) {
        compound.tag = Some(take_ident(&mut i));
    }

    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                let ident = take_ident(&mut i);
                if ident.is_empty() {
                    return Err(invalid());
                }
                compound.id = Some(ident);
            }
            '.' => {
                i += 1;
                let ident = take_ident(&mut i);
                if ident.is_empty() {
                    return Err(invalid());
                }
                compound.classes.push(ident);
            }
            '[' => {
                i += 1;
                let name = take_ident(&mut i);
                if name.is_empty() || i >= chars.len() {
                    return Err(invalid());
                }
                let op = match chars[i] {
                    ']' => AttrOp::Exists,
                    '=' | '*' => {
                        let contains = chars[i] == '*';
                        i += if contains { 2 } else { 1 };
                        if contains && chars.get(i - 1) != Some(&'=') {
                            return Err(invalid());
                        }
                        let value = take_value(&chars, &mut i).ok_or_else(invalid)?;
                        if contains {
                            AttrOp::Contains(value)
                        } else {
                            AttrOp::Equals(value)
                        }
                    }
                    _ => return Err(invalid()),
                };
                if chars.get(i) != Some(&']') {
                    return Err(invalid());
                }
                i += 1;
                compound.attrs.push(AttrSel { name, op });
            }
            _ => return Err(invalid()),
        }
    }
    Ok(compound)
}

fn take_value(chars: &[char], i: &mut usize) -> Option<String> {
    let quote = *chars.get(*i)?;
    if quote == '\'' || quote == '"' {
        *i += 1;
        let start = *i;
        while *i < chars.len() && chars[*i] != quote {
            *i += 1;
        }
        if *i >= chars.len() {
            return None;
        }
        let value = chars[start..*i].iter().collect();
        *i += 1;
        Some(value)
    } else {
        let start = *i;
        while *i < chars.len() && chars[*i] != ']' {
            *i += 1;
        }
        Some(chars[start..*i].iter().collect())
    }
}
