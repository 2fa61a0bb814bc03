//! In-memory page model.
//!
//! Nodes live in an arena addressed by [`NodeId`]; removed nodes leave a hole,
//! so handles held across a mutation degrade to no-ops instead of pointing at
//! something else. Selector support covers what engine tables use: type, `#id`,
//! `.class`, `[attr]` and `[attr="value"]` compounds, descendant and `>`
//! combinators, and comma-separated groups.

use crate::domain::model::{NodeId, TreatmentKind};
use crate::domain::ports::{ChangeCallback, Page};
use crate::utils::subscription::Subscription;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Declarative element tree used to build pages and fixtures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn href(mut self, href: &str) -> Self {
        self.href = Some(href.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// A page snapshot as stored on disk: its URL and top-level elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFixture {
    pub url: String,
    #[serde(default)]
    pub body: Vec<ElementSpec>,
}

#[derive(Debug)]
struct Node {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    href: Option<String>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.clone(),
            "href" => self.href.clone(),
            "class" if !self.classes.is_empty() => Some(self.classes.join(" ")),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Document {
    nodes: Vec<Option<Node>>,
    roots: Vec<NodeId>,
}

impl Document {
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn build(&mut self, parent: Option<NodeId>, spec: &ElementSpec) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            tag: spec.tag.to_ascii_lowercase(),
            id: spec.id.clone(),
            classes: spec.classes.clone(),
            href: spec.href.clone(),
            text: spec.text.clone(),
            parent,
            children: Vec::new(),
        }));

        let children: Vec<NodeId> = spec
            .children
            .iter()
            .map(|child| self.build(Some(id), child))
            .collect();
        if let Some(node) = self.node_mut(id) {
            node.children = children;
        }
        id
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let children = self
            .node(id)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        for child in children {
            self.drop_subtree(child);
        }
        if let Some(slot) = self.nodes.get_mut(id.0) {
            *slot = None;
        }
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> Option<&mut Vec<NodeId>> {
        match parent {
            Some(parent) => self.node_mut(parent).map(|node| &mut node.children),
            None => Some(&mut self.roots),
        }
    }

    /// Descendants of `scope` (or of the document) in document order.
    fn descendants(&self, scope: Option<NodeId>) -> Vec<NodeId> {
        let start = match scope {
            Some(scope) => match self.node(scope) {
                Some(node) => node.children.clone(),
                None => return Vec::new(),
            },
            None => self.roots.clone(),
        };

        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = start.into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.node(id) {
                out.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        let mut text = node.text.clone().unwrap_or_default();
        for child in &node.children {
            text.push_str(&self.text_content(*child));
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrTest {
    Present(String),
    Equals(String, String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

impl Compound {
    fn parse(token: &str) -> Option<Self> {
        let mut compound = Compound::default();
        let chars: Vec<char> = token.chars().collect();
        let mut i = 0;

        let read_ident = |i: &mut usize| -> String {
            let start = *i;
            while *i < chars.len() && (chars[*i].is_alphanumeric() || chars[*i] == '-' || chars[*i] == '_') {
                *i += 1;
            }
            chars[start..*i].iter().collect()
        };

        if i < chars.len() && chars[i] == '*' {
            i += 1;
        } else if i < chars.len() && chars[i].is_alphabetic() {
            compound.tag = Some(read_ident(&mut i).to_ascii_lowercase());
        }

        while i < chars.len() {
            match chars[i] {
                '#' => {
                    i += 1;
                    let ident = read_ident(&mut i);
                    if ident.is_empty() {
                        return None;
                    }
                    compound.id = Some(ident);
                }
                '.' => {
                    i += 1;
                    let ident = read_ident(&mut i);
                    if ident.is_empty() {
                        return None;
                    }
                    compound.classes.push(ident);
                }
                '[' => {
                    let close = chars[i..].iter().position(|c| *c == ']')? + i;
                    let inner: String = chars[i + 1..close].iter().collect();
                    compound.attrs.push(match inner.split_once('=') {
                        Some((name, value)) => AttrTest::Equals(
                            name.trim().to_string(),
                            value.trim().trim_matches(|c| c == '"' || c == '\'').to_string(),
                        ),
                        None => AttrTest::Present(inner.trim().to_string()),
                    });
                    i = close + 1;
                }
                _ => return None,
            }
        }

        Some(compound)
    }

    fn matches(&self, node: &Node) -> bool {
        if let Some(tag) = &self.tag {
            if &node.tag != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.id.as_ref() != Some(id) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| node.classes.contains(c)) {
            return false;
        }
        self.attrs.iter().all(|test| match test {
            AttrTest::Present(name) => node.attribute(name).is_some(),
            AttrTest::Equals(name, value) => node.attribute(name).as_deref() == Some(value.as_str()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// One comma-free selector, stored right-to-left.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
    rightmost: Compound,
    ancestors: Vec<(Combinator, Compound)>,
}

impl ComplexSelector {
    fn parse(group: &str) -> Option<Self> {
        let spaced = group.replace('>', " > ");
        let mut compounds = Vec::new();
        let mut pending = Combinator::Descendant;

        for token in spaced.split_whitespace() {
            if token == ">" {
                if compounds.is_empty() {
                    return None;
                }
                pending = Combinator::Child;
                continue;
            }
            compounds.push((pending, Compound::parse(token)?));
            pending = Combinator::Descendant;
        }

        if pending == Combinator::Child {
            return None;
        }

        // Each compound carries the combinator joining it to its left neighbour.
        let (mut link, rightmost) = compounds.pop()?;
        let mut ancestors = Vec::with_capacity(compounds.len());
        while let Some((own, compound)) = compounds.pop() {
            ancestors.push((link, compound));
            link = own;
        }

        Some(Self {
            rightmost,
            ancestors,
        })
    }

    fn matches(&self, document: &Document, id: NodeId) -> bool {
        match document.node(id) {
            Some(node) if self.rightmost.matches(node) => {
                self.match_ancestors(document, node.parent, 0)
            }
            _ => false,
        }
    }

    fn match_ancestors(&self, document: &Document, parent: Option<NodeId>, index: usize) -> bool {
        let Some((combinator, compound)) = self.ancestors.get(index) else {
            return true;
        };

        let mut current = parent;
        while let Some(id) = current {
            let Some(node) = document.node(id) else {
                return false;
            };
            if compound.matches(node) && self.match_ancestors(document, node.parent, index + 1) {
                return true;
            }
            if *combinator == Combinator::Child {
                return false;
            }
            current = node.parent;
        }
        false
    }
}

struct Observer {
    target: NodeId,
    callback: ChangeCallback,
}

/// Mutable, observable page held entirely in memory.
pub struct MemoryPage {
    url: String,
    document: Mutex<Document>,
    observers: Arc<Mutex<HashMap<u64, Observer>>>,
    next_observer: AtomicU64,
    claimed: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryPage {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            document: Mutex::new(Document::default()),
            observers: Arc::new(Mutex::new(HashMap::new())),
            next_observer: AtomicU64::new(0),
            claimed: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn from_fixture(fixture: &PageFixture) -> Self {
        let page = Self::new(&fixture.url);
        for element in &fixture.body {
            page.append(None, element.clone());
        }
        page
    }

    fn document(&self) -> MutexGuard<'_, Document> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `spec` as the last child of `parent` (or as a top-level element).
    pub fn append(&self, parent: Option<NodeId>, spec: ElementSpec) -> NodeId {
        let id = {
            let mut document = self.document();
            let id = document.build(parent, &spec);
            let attached = match document.siblings_mut(parent) {
                Some(siblings) => {
                    siblings.push(id);
                    true
                }
                None => false,
            };
            if !attached {
                document.drop_subtree(id);
                tracing::warn!("Append target {:?} no longer exists", parent);
                return id;
            }
            id
        };
        self.notify_child_list(parent);
        id
    }

    /// Removes `node` and its subtree. Returns `false` if it was already gone.
    pub fn remove(&self, node: NodeId) -> bool {
        let parent = {
            let mut document = self.document();
            let Some(parent) = document.node(node).map(|n| n.parent) else {
                return false;
            };
            if let Some(siblings) = document.siblings_mut(parent) {
                siblings.retain(|child| *child != node);
            }
            document.drop_subtree(node);
            parent
        };
        self.notify_child_list(parent);
        true
    }

    /// Swaps `node` for a freshly built `spec` at the same position.
    pub fn replace(&self, node: NodeId, spec: ElementSpec) -> Option<NodeId> {
        let (parent, replacement) = {
            let mut document = self.document();
            let parent = document.node(node)?.parent;
            let replacement = document.build(parent, &spec);
            let siblings = document.siblings_mut(parent)?;
            let position = siblings.iter().position(|child| *child == node)?;
            siblings[position] = replacement;
            document.drop_subtree(node);
            (parent, replacement)
        };
        self.notify_child_list(parent);
        Some(replacement)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.document().node(node).is_some()
    }

    /// Selector queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().map(|o| o.len()).unwrap_or(0)
    }

    fn notify_child_list(&self, parent: Option<NodeId>) {
        let Some(target) = parent else {
            return;
        };
        let callbacks: Vec<ChangeCallback> = match self.observers.lock() {
            Ok(observers) => observers
                .values()
                .filter(|observer| observer.target == target)
                .map(|observer| observer.callback.clone())
                .collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback();
        }
    }

    fn select(&self, scope: Option<NodeId>, selector: &str) -> Vec<NodeId> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let groups: Option<Vec<ComplexSelector>> =
            selector.split(',').map(ComplexSelector::parse).collect();
        let Some(groups) = groups else {
            tracing::warn!("Unsupported selector '{}'", selector);
            return Vec::new();
        };

        let document = self.document();
        document
            .descendants(scope)
            .into_iter()
            .filter(|id| groups.iter().any(|group| group.matches(&document, *id)))
            .collect()
    }
}

impl Page for MemoryPage {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::SeqCst)
    }

    fn query_selector(&self, scope: Option<NodeId>, selector: &str) -> Option<NodeId> {
        self.select(scope, selector).into_iter().next()
    }

    fn query_selector_all(&self, scope: Option<NodeId>, selector: &str) -> Vec<NodeId> {
        self.select(scope, selector)
    }

    fn link_text(&self, node: NodeId) -> Option<String> {
        let document = self.document();
        let element = document.node(node)?;
        match &element.href {
            Some(href) => Some(href.clone()),
            None => Some(document.text_content(node)),
        }
    }

    fn has_marker(&self, node: NodeId, treatment: TreatmentKind) -> bool {
        self.document()
            .node(node)
            .map(|n| n.classes.iter().any(|c| c == treatment.marker()))
            .unwrap_or(false)
    }

    fn add_marker(&self, node: NodeId, treatment: TreatmentKind) {
        if let Some(node) = self.document().node_mut(node) {
            if !node.classes.iter().any(|c| c == treatment.marker()) {
                node.classes.push(treatment.marker().to_string());
            }
        }
    }

    fn remove_marker(&self, node: NodeId, treatment: TreatmentKind) {
        if let Some(node) = self.document().node_mut(node) {
            node.classes.retain(|c| c != treatment.marker());
        }
    }

    fn observe_child_list(&self, target: NodeId, callback: ChangeCallback) -> Subscription {
        let id = self.next_observer.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut observers) = self.observers.lock() {
            observers.insert(id, Observer { target, callback });
        }

        let observers = Arc::downgrade(&self.observers);
        Subscription::new(move || {
            if let Some(observers) = observers.upgrade() {
                if let Ok(mut observers) = observers.lock() {
                    observers.remove(&id);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results_page() -> (MemoryPage, NodeId) {
        let page = MemoryPage::new("https://www.google.com/search?q=rust");
        let container = page.append(None, ElementSpec::new("div").id("search"));
        page.append(
            Some(container),
            ElementSpec::new("div")
                .class("g")
                .child(ElementSpec::new("h3").child(ElementSpec::new("a").href("https://a.com/"))),
        );
        page.append(
            Some(container),
            ElementSpec::new("div")
                .class("g")
                .class("extra")
                .child(ElementSpec::new("a").href("https://b.com/")),
        );
        (page, container)
    }

    #[test]
    fn test_selector_forms() {
        let (page, container) = results_page();

        assert_eq!(page.query_selector(None, "#search"), Some(container));
        assert_eq!(page.query_selector_all(Some(container), ".g").len(), 2);
        assert_eq!(page.query_selector_all(None, "div.g.extra").len(), 1);
        assert_eq!(page.query_selector_all(None, "#search a").len(), 2);
        assert_eq!(page.query_selector_all(None, ".g > a").len(), 1);
        assert_eq!(page.query_selector_all(None, "h3 a, .extra > a").len(), 2);
        assert_eq!(page.query_selector_all(None, "a[href]").len(), 2);
        assert_eq!(
            page.query_selector_all(None, r#"a[href="https://b.com/"]"#).len(),
            1
        );
        assert!(page.query_selector_all(None, "div..g").is_empty());
    }

    #[test]
    fn test_group_results_are_in_document_order_without_duplicates() {
        let (page, container) = results_page();
        let all = page.query_selector_all(Some(container), ".extra, .g");
        assert_eq!(all, page.query_selector_all(Some(container), ".g"));
    }

    #[test]
    fn test_link_text_prefers_href() {
        let page = MemoryPage::new("https://example.com/");
        let with_href = page.append(None, ElementSpec::new("a").href("https://x.com/").text("X"));
        let text_only = page.append(
            None,
            ElementSpec::new("cite")
                .text("https://")
                .child(ElementSpec::new("b").text("y.com")),
        );

        assert_eq!(page.link_text(with_href).as_deref(), Some("https://x.com/"));
        assert_eq!(page.link_text(text_only).as_deref(), Some("https://y.com"));
    }

    #[test]
    fn test_child_list_observer_fires_for_direct_children_only() {
        let (page, container) = results_page();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let subscription = page.observe_child_list(
            container,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let result = page.append(Some(container), ElementSpec::new("div").class("g"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        page.append(Some(result), ElementSpec::new("span"));
        page.add_marker(result, TreatmentKind::Screen);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(page.remove(result));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        drop(subscription);
        assert_eq!(page.observer_count(), 0);
        page.append(Some(container), ElementSpec::new("div"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_removed_handles_are_inert() {
        let (page, container) = results_page();
        let first = page.query_selector(Some(container), ".g").unwrap();
        page.remove(first);

        page.add_marker(first, TreatmentKind::Spotlight);
        assert!(!page.has_marker(first, TreatmentKind::Spotlight));
        assert_eq!(page.link_text(first), None);
        assert!(page.query_selector_all(Some(first), "a").is_empty());
    }

    #[test]
    fn test_claim_once() {
        let page = MemoryPage::new("https://example.com/");
        assert!(page.claim());
        assert!(!page.claim());
    }
}
