//! Flame-graph aggregation and view state.
//!
//! The server sends a tree rooted at a synthetic node whose first level is threads.
//! The "all threads" view drops that level and coalesces same-named frames level by
//! level; a single-thread view uses the thread's subtree untouched. Focus, zoom and
//! elision are view concerns and never modify the tree.

use std::collections::{BTreeMap, HashMap};

use ratatui::style::Color;

use crate::state::FlameData;
use crate::types::{FlameGraphNode, ThreadStat};

/// Frames narrower than this (percent of the display root, after zoom) are not laid out.
pub const MIN_WIDTH_PERCENT: f64 = 0.3;
pub const ZOOM_MIN: f64 = 0.5;
pub const ZOOM_MAX: f64 = 10.0;
const ZOOM_STEP: f64 = 1.5;

/// Coalesce one sibling list: same name → values summed, children concatenated.
/// First-occurrence order is kept.
pub fn coalesce_siblings(nodes: Vec<FlameGraphNode>) -> Vec<FlameGraphNode> {
    let mut out: Vec<FlameGraphNode> = Vec::with_capacity(nodes.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for node in nodes {
        match index.get(&node.name) {
            Some(&i) => {
                let existing = &mut out[i];
                existing.value += node.value;
                existing.children.extend(node.children);
            }
            None => {
                index.insert(node.name.clone(), out.len());
                out.push(node);
            }
        }
    }
    out
}

/// Recursive same-name merge. Only siblings within one child list are ever combined.
pub fn merge_nodes(nodes: Vec<FlameGraphNode>) -> Vec<FlameGraphNode> {
    coalesce_siblings(nodes)
        .into_iter()
        .map(|mut node| {
            if !node.children.is_empty() {
                node.children = merge_nodes(std::mem::take(&mut node.children));
            }
            node
        })
        .collect()
}

/// Hide the thread level and merge every thread's stacks into one tree.
pub fn merged_global_tree(root: &FlameGraphNode) -> FlameGraphNode {
    if root.children.is_empty() {
        return root.clone();
    }
    let stack_roots: Vec<FlameGraphNode> = root
        .children
        .iter()
        .flat_map(|thread| thread.children.iter().cloned())
        .collect();
    FlameGraphNode {
        name: root.name.clone(),
        value: root.value,
        address: root.address.clone(),
        children: merge_nodes(stack_roots),
    }
}

pub fn thread_subtree<'a>(root: &'a FlameGraphNode, thread: &str) -> Option<&'a FlameGraphNode> {
    root.children.iter().find(|c| c.name == thread)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEntry {
    pub name: String,
    pub short_name: String,
    pub sample_count: u64,
    pub cpu_ratio: f64,
}

fn short_thread_name(name: &str) -> String {
    name.split(" (").next().unwrap_or(name).to_string()
}

/// Threads by descending sample count, from thread stats when the server sent them,
/// otherwise from the tree's first level.
pub fn thread_list(
    root: Option<&FlameGraphNode>,
    stats: &BTreeMap<String, ThreadStat>,
) -> Vec<ThreadEntry> {
    let mut threads: Vec<ThreadEntry> = if !stats.is_empty() {
        stats
            .iter()
            .map(|(name, s)| ThreadEntry {
                name: name.clone(),
                short_name: short_thread_name(name),
                sample_count: s.sample_count,
                cpu_ratio: s.cpu_time_ratio,
            })
            .collect()
    } else if let Some(root) = root {
        root.children
            .iter()
            .map(|c| ThreadEntry {
                name: c.name.clone(),
                short_name: short_thread_name(&c.name),
                sample_count: c.value,
                cpu_ratio: if root.value > 0 {
                    c.value as f64 / root.value as f64
                } else {
                    0.0
                },
            })
            .collect()
    } else {
        Vec::new()
    };
    threads.sort_by(|a, b| b.sample_count.cmp(&a.sample_count));
    threads
}

/// What the flame panel should show right now.
#[derive(Debug, Clone, PartialEq)]
pub enum Display {
    /// No call-stack payload received yet.
    Waiting,
    /// The selected thread is not in the latest tree.
    NoData,
    Tree(FlameGraphNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlameView {
    /// `None` = all threads merged.
    pub selected_thread: Option<String>,
    pub focused: Option<FlameGraphNode>,
    pub zoom: f64,
    /// Index into the current layout, for keyboard navigation.
    pub cursor: usize,
}

impl Default for FlameView {
    fn default() -> Self {
        Self {
            selected_thread: None,
            focused: None,
            zoom: 1.0,
            cursor: 0,
        }
    }
}

impl FlameView {
    pub fn select_thread(&mut self, thread: Option<String>) {
        self.selected_thread = thread;
        self.focused = None;
        self.cursor = 0;
    }

    /// all → first thread → ... → last thread → all
    pub fn cycle_thread(&mut self, threads: &[ThreadEntry]) {
        let next = match &self.selected_thread {
            None => threads.first().map(|t| t.name.clone()),
            Some(cur) => {
                let pos = threads.iter().position(|t| &t.name == cur);
                pos.and_then(|i| threads.get(i + 1)).map(|t| t.name.clone())
            }
        };
        self.select_thread(next);
    }

    /// Pin `node` as display root, or un-pin when it is already the pinned frame.
    pub fn toggle_focus(&mut self, node: &FlameGraphNode) {
        if self.focused.as_ref().is_some_and(|f| f.name == node.name) {
            self.focused = None;
        } else {
            self.focused = Some(node.clone());
        }
        self.cursor = 0;
    }

    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom * ZOOM_STEP).min(ZOOM_MAX);
    }

    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom / ZOOM_STEP).max(ZOOM_MIN);
    }

    pub fn reset(&mut self) {
        self.zoom = 1.0;
        self.focused = None;
        self.cursor = 0;
    }

    pub fn display(&self, data: Option<&FlameData>) -> Display {
        let Some(data) = data else {
            return Display::Waiting;
        };
        if let Some(focused) = &self.focused {
            return Display::Tree(focused.clone());
        }
        match &self.selected_thread {
            None => Display::Tree(merged_global_tree(&data.root)),
            Some(thread) => match thread_subtree(&data.root, thread) {
                Some(node) => Display::Tree(node.clone()),
                None => Display::NoData,
            },
        }
    }
}

/// One laid-out frame. `start` and `width` are fractions of the display root.
#[derive(Debug, Clone, PartialEq)]
pub struct FlameFrame {
    pub depth: usize,
    pub name: String,
    pub value: u64,
    pub start: f64,
    pub width: f64,
    /// Path of child indices (in sorted order) from the display root.
    pub path: Vec<usize>,
}

/// Flatten the tree into frames, depth-first, children by descending value (stable),
/// skipping frames whose zoomed width falls under `min_width_percent`.
pub fn layout(root: &FlameGraphNode, zoom: f64, min_width_percent: f64) -> Vec<FlameFrame> {
    let mut out = Vec::new();
    if root.value == 0 {
        return out;
    }
    let total = root.value as f64;
    let mut path = Vec::new();
    layout_node(root, 0, 0.0, total, zoom, min_width_percent, &mut path, &mut out);
    out
}

#[allow(clippy::too_many_arguments)]
fn layout_node(
    node: &FlameGraphNode,
    depth: usize,
    start: f64,
    total: f64,
    zoom: f64,
    min_width_percent: f64,
    path: &mut Vec<usize>,
    out: &mut Vec<FlameFrame>,
) {
    let width = node.value as f64 / total;
    if width * 100.0 * zoom < min_width_percent {
        return;
    }
    out.push(FlameFrame {
        depth,
        name: node.name.clone(),
        value: node.value,
        start,
        width,
        path: path.clone(),
    });

    let mut offset = start;
    for (i, child) in sorted_children(node).into_iter().enumerate() {
        path.push(i);
        layout_node(child, depth + 1, offset, total, zoom, min_width_percent, path, out);
        path.pop();
        offset += child.value as f64 / total;
    }
}

pub fn sorted_children(node: &FlameGraphNode) -> Vec<&FlameGraphNode> {
    let mut kids: Vec<&FlameGraphNode> = node.children.iter().collect();
    kids.sort_by(|a, b| b.value.cmp(&a.value));
    kids
}

/// Resolve a layout path back to its node.
pub fn node_at<'a>(root: &'a FlameGraphNode, path: &[usize]) -> Option<&'a FlameGraphNode> {
    let mut node = root;
    for &i in path {
        node = *sorted_children(node).get(i)?;
    }
    Some(node)
}

// ---------- colors ----------

const FLAME_COLORS: [Color; 10] = [
    Color::Rgb(0xff, 0x6b, 0x35),
    Color::Rgb(0xf7, 0x93, 0x1e),
    Color::Rgb(0xfb, 0xb0, 0x3b),
    Color::Rgb(0xfc, 0xee, 0x21),
    Color::Rgb(0x8c, 0xc6, 0x3f),
    Color::Rgb(0x39, 0xb5, 0x4a),
    Color::Rgb(0x00, 0xa9, 0x9d),
    Color::Rgb(0x2e, 0x31, 0x92),
    Color::Rgb(0x66, 0x2d, 0x91),
    Color::Rgb(0xed, 0x1c, 0x24),
];

pub const COLOR_OBJC: Color = Color::Rgb(0x6b, 0x72, 0x80);
pub const COLOR_DYLD: Color = Color::Rgb(0x4b, 0x55, 0x63);
pub const COLOR_LIBSYSTEM: Color = Color::Rgb(0x37, 0x41, 0x51);
pub const COLOR_UNKNOWN: Color = Color::Rgb(0x11, 0x18, 0x27);

/// 32-bit `h * 31 + c` over UTF-16 code units, absolute value.
pub fn hash_name(name: &str) -> u32 {
    let mut h: i32 = 0;
    for c in name.encode_utf16() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(c as i32);
    }
    h.unsigned_abs()
}

fn looks_like_address(name: &str) -> bool {
    name.starts_with("0x") || (!name.is_empty() && name.chars().all(|c| c.is_ascii_hexdigit()))
}

pub fn color_for_name(name: &str) -> Color {
    if name.starts_with("objc_") || name.contains("objc_msgSend") {
        return COLOR_OBJC;
    }
    if name.contains("dyld") {
        return COLOR_DYLD;
    }
    if name.contains("libsystem") {
        return COLOR_LIBSYSTEM;
    }
    if looks_like_address(name) {
        return COLOR_UNKNOWN;
    }
    FLAME_COLORS[hash_name(name) as usize % FLAME_COLORS.len()]
}

/// Shorten a frame label to `max_len` characters. ObjC selectors keep `-[Class sel]`.
pub fn simplify_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        return name.to_string();
    }
    if name.starts_with("-[") || name.starts_with("+[") {
        if let Some(end) = name.find(']') {
            if end > 2 {
                return name[..=end].to_string();
            }
        }
    }
    let keep = max_len.saturating_sub(3);
    let mut s: String = name.chars().take(keep).collect();
    s.push_str("...");
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(name: &str, value: u64, children: Vec<FlameGraphNode>) -> FlameGraphNode {
        FlameGraphNode {
            name: name.into(),
            value,
            address: None,
            children,
        }
    }

    fn two_threads() -> FlameGraphNode {
        n(
            "root",
            25,
            vec![
                n("main (1)", 10, vec![n("foo", 10, vec![n("a", 3, vec![]), n("b", 2, vec![])])]),
                n("worker (2)", 15, vec![n("foo", 15, vec![n("a", 5, vec![]), n("c", 1, vec![])])]),
            ],
        )
    }

    #[test]
    fn coalescing_sums_values_and_concatenates_children() {
        let pooled: Vec<FlameGraphNode> = two_threads()
            .children
            .into_iter()
            .flat_map(|t| t.children)
            .collect();
        let level = coalesce_siblings(pooled);
        assert_eq!(level.len(), 1);
        assert_eq!(level[0].value, 25);
        let names: Vec<&str> = level[0].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "a", "c"]);
    }

    #[test]
    fn global_merge_drops_thread_level_and_remerges() {
        let merged = merged_global_tree(&two_threads());
        assert_eq!(merged.name, "root");
        assert_eq!(merged.children.len(), 1);
        let foo = &merged.children[0];
        assert_eq!((foo.name.as_str(), foo.value), ("foo", 25));
        let kids: Vec<(&str, u64)> = foo
            .children
            .iter()
            .map(|c| (c.name.as_str(), c.value))
            .collect();
        assert_eq!(kids, vec![("a", 8), ("b", 2), ("c", 1)]);
    }

    #[test]
    fn cousins_are_never_merged() {
        let tree = n(
            "root",
            4,
            vec![n(
                "t",
                4,
                vec![
                    n("x", 2, vec![n("leaf", 2, vec![])]),
                    n("y", 2, vec![n("leaf", 2, vec![])]),
                ],
            )],
        );
        let merged = merged_global_tree(&tree);
        assert_eq!(merged.children.len(), 2);
        assert_eq!(merged.children[0].children[0].value, 2);
        assert_eq!(merged.children[1].children[0].value, 2);
    }

    #[test]
    fn view_states() {
        let data = FlameData {
            root: two_threads(),
            summary: Default::default(),
            thread_stats: Default::default(),
        };
        let mut view = FlameView::default();
        assert_eq!(view.display(None), Display::Waiting);

        view.select_thread(Some("worker (2)".into()));
        match view.display(Some(&data)) {
            Display::Tree(t) => assert_eq!(t.value, 15),
            other => panic!("unexpected {other:?}"),
        }

        view.select_thread(Some("gone".into()));
        assert_eq!(view.display(Some(&data)), Display::NoData);

        let foo = n("foo", 25, vec![]);
        view.toggle_focus(&foo);
        assert_eq!(view.display(Some(&data)), Display::Tree(foo.clone()));
        view.toggle_focus(&foo);
        assert!(view.focused.is_none());
    }

    #[test]
    fn cycling_threads_wraps_back_to_all() {
        let threads = thread_list(Some(&two_threads()), &BTreeMap::new());
        assert_eq!(threads[0].name, "worker (2)");
        assert_eq!(threads[0].short_name, "worker");
        let mut view = FlameView::default();
        view.cycle_thread(&threads);
        assert_eq!(view.selected_thread.as_deref(), Some("worker (2)"));
        view.cycle_thread(&threads);
        assert_eq!(view.selected_thread.as_deref(), Some("main (1)"));
        view.cycle_thread(&threads);
        assert_eq!(view.selected_thread, None);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut view = FlameView::default();
        for _ in 0..20 {
            view.zoom_in();
        }
        assert_eq!(view.zoom, ZOOM_MAX);
        for _ in 0..20 {
            view.zoom_out();
        }
        assert_eq!(view.zoom, ZOOM_MIN);
        view.reset();
        assert_eq!(view.zoom, 1.0);
    }

    #[test]
    fn layout_sorts_children_and_elides_tiny_frames() {
        let tree = n(
            "root",
            1000,
            vec![
                n("small", 100, vec![]),
                n("big", 400, vec![]),
                n("tie", 400, vec![]),
                n("tiny", 2, vec![]),
            ],
        );
        let frames = layout(&tree, 1.0, MIN_WIDTH_PERCENT);
        let names: Vec<&str> = frames.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["root", "big", "tie", "small"]);
        assert_eq!(frames[1].start, 0.0);
        assert!((frames[2].start - 0.4).abs() < 1e-9);

        // zooming in brings the tiny frame over the threshold
        let zoomed = layout(&tree, 2.0, MIN_WIDTH_PERCENT);
        assert!(zoomed.iter().any(|f| f.name == "tiny"));

        let tie = node_at(&tree, &frames[2].path).unwrap();
        assert_eq!(tie.name, "tie");
        assert!(layout(&n("empty", 0, vec![]), 1.0, MIN_WIDTH_PERCENT).is_empty());
    }

    #[test]
    fn colors_are_deterministic_and_system_frames_are_grey() {
        assert_eq!(color_for_name("objc_msgSend"), COLOR_OBJC);
        assert_eq!(color_for_name("_dyld_start"), COLOR_DYLD);
        assert_eq!(color_for_name("libsystem_kernel.dylib"), COLOR_LIBSYSTEM);
        assert_eq!(color_for_name("0x1045abc"), COLOR_UNKNOWN);
        assert_eq!(color_for_name("deadbeef"), COLOR_UNKNOWN);
        let c = color_for_name("-[AppDelegate application:didFinishLaunching:]");
        assert_eq!(c, color_for_name("-[AppDelegate application:didFinishLaunching:]"));
        assert!(FLAME_COLORS.contains(&c));
        // "a" hashes to 97
        assert_eq!(hash_name("a"), 97);
        assert_eq!(color_for_name("main"), FLAME_COLORS[hash_name("main") as usize % 10]);
    }

    #[test]
    fn names_are_shortened() {
        assert_eq!(simplify_name("short", 10), "short");
        assert_eq!(simplify_name("abcdefghijkl", 8), "abcde...");
        assert_eq!(
            simplify_name("-[UIView layoutSubviews] + 123 extra", 10),
            "-[UIView layoutSubviews]"
        );
    }
}
