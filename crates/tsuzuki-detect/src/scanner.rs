//! Video discovery across the document and every reachable shadow tree.

use std::collections::HashSet;

use tracing::debug;

use crate::dom::{Dom, NodeId};

/// Walks the primary document and, recursively, every open shadow root.
///
/// Each tree is visited at most once per call, even if several hosts report
/// the same root.
pub struct Scanner<'a> {
    dom: &'a dyn Dom,
}

impl<'a> Scanner<'a> {
    pub fn new(dom: &'a dyn Dom) -> Self {
        Self { dom }
    }

    /// All `<video>` elements in insertion order, document first and then each
    /// shadow tree as it is discovered.
    pub fn find_all_videos(&self) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.walk(|dom, scope| match dom.query_selector_all(scope, "video") {
            Ok(videos) => {
                found.extend(videos);
                false
            }
            Err(e) => {
                debug!(scope = ?scope, error = %e, "video query failed, skipping tree");
                false
            }
        });
        found
    }

    /// First element matching any of `selectors` that also satisfies
    /// `predicate`, mapped through it.
    ///
    /// Selectors are in priority order: each one is tried against every tree
    /// before the next selector is considered.
    pub fn find_first_match<T>(
        &self,
        selectors: &[&str],
        mut predicate: impl FnMut(NodeId) -> Option<T>,
    ) -> Option<T> {
        let trees = self.trees();
        for selector in selectors {
            for &scope in &trees {
                let hits = match self.dom.query_selector_all(scope, selector) {
                    Ok(hits) => hits,
                    Err(e) => {
                        debug!(selector, scope = ?scope, error = %e, "selector query failed");
                        continue;
                    }
                };
                if let Some(value) = hits.into_iter().find_map(&mut predicate) {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Whether any element in any tree matches one of `selectors`.
    pub fn any_match(&self, selectors: &[&str]) -> bool {
        self.find_first_match(selectors, Some).is_some()
    }

    /// The document followed by every reachable shadow root, breadth-first.
    fn trees(&self) -> Vec<NodeId> {
        let mut trees = Vec::new();
        self.walk(|_, scope| {
            trees.push(scope);
            false
        });
        trees
    }

    /// Visit every tree breadth-first. `visit` returns `true` to stop early.
    fn walk(&self, mut visit: impl FnMut(&dyn Dom, NodeId) -> bool) {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut queue = vec![self.dom.document()];
        let mut next = 0;

        while next < queue.len() {
            let scope = queue[next];
            next += 1;
            if !visited.insert(scope) {
                continue;
            }
            if visit(self.dom, scope) {
                return;
            }
            let elements = match self.dom.elements(scope) {
                Ok(elements) => elements,
                Err(e) => {
                    debug!(scope = ?scope, error = %e, "element enumeration failed");
                    continue;
                }
            };
            for element in elements {
                if let Some(root) = self.dom.shadow_root(element) {
                    if !visited.contains(&root) {
                        queue.push(root);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MediaSnapshot, Rect};
    use crate::fake::FakeDom;

    fn video(dom: &FakeDom, parent: NodeId) -> NodeId {
        dom.add_video(parent, Rect::new(640.0, 360.0), MediaSnapshot::default())
    }

    #[test]
    fn test_finds_videos_in_nested_shadow_roots() {
        let dom = FakeDom::new("https://example.com/watch");
        let top = video(&dom, FakeDom::DOCUMENT);
        let host = dom.add_element(FakeDom::DOCUMENT, "player-shell");
        let root = dom.attach_shadow(host);
        let inner_host = dom.add_element(root, "player-core");
        let inner_root = dom.attach_shadow(inner_host);
        let deep = video(&dom, inner_root);

        let videos = Scanner::new(&dom).find_all_videos();
        assert_eq!(videos, vec![top, deep]);
    }

    #[test]
    fn test_each_tree_visited_once() {
        let dom = FakeDom::new("https://example.com/watch");
        let host = dom.add_element(FakeDom::DOCUMENT, "player-shell");
        let root = dom.attach_shadow(host);
        video(&dom, root);

        Scanner::new(&dom).find_all_videos();
        let scopes = dom.scanned_scopes();
        assert_eq!(scopes.iter().filter(|s| **s == root).count(), 1);
        assert_eq!(scopes.iter().filter(|s| **s == FakeDom::DOCUMENT).count(), 1);
    }

    #[test]
    fn test_first_match_skips_failing_selector() {
        let dom = FakeDom::new("https://example.com/watch");
        let heading = dom.add_element(FakeDom::DOCUMENT, "h1.title");
        dom.set_text(heading, "Some Show");
        dom.fail_selector(".broken");

        let scanner = Scanner::new(&dom);
        let title = scanner.find_first_match(&[".broken", "h1.title"], |el| dom.text_content(el));
        assert_eq!(title.as_deref(), Some("Some Show"));
    }

    #[test]
    fn test_first_match_respects_predicate() {
        let dom = FakeDom::new("https://example.com/watch");
        dom.add_element(FakeDom::DOCUMENT, "h1.title");
        let host = dom.add_element(FakeDom::DOCUMENT, "x-header");
        let root = dom.attach_shadow(host);
        let inner = dom.add_element(root, "h1.title");
        dom.set_text(inner, "Inside Shadow");

        let scanner = Scanner::new(&dom);
        let title = scanner.find_first_match(&["h1.title"], |el| {
            dom.text_content(el).filter(|t| !t.trim().is_empty())
        });
        assert_eq!(title.as_deref(), Some("Inside Shadow"));
    }

    #[test]
    fn test_selector_priority_spans_shadow_trees() {
        let dom = FakeDom::new("https://example.com/watch");
        let heading = dom.add_element(FakeDom::DOCUMENT, "h1");
        dom.set_text(heading, "Site Name");
        let host = dom.add_element(FakeDom::DOCUMENT, "x-player");
        let root = dom.attach_shadow(host);
        let inner = dom.add_element(root, "div.video-title");
        dom.set_text(inner, "Episode Title");

        let title = Scanner::new(&dom).find_first_match(&[".video-title", "h1"], |el| dom.text_content(el));
        assert_eq!(title.as_deref(), Some("Episode Title"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let dom = FakeDom::new("https://example.com/");
        assert!(!Scanner::new(&dom).any_match(&["#player"]));
    }
}
