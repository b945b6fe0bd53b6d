//! Text rendering of the directory tree implied by logical paths.

use std::fmt::Write;

#[derive(Default)]
struct Node {
    name: String,
    children: Vec<Node>,
    is_file: bool,
}

impl Node {
    fn child(&mut self, name: &str) -> &mut Node {
        let i = match self.children.iter().position(|c| c.name == name) {
            Some(i) => i,
            None => {
                self.children.push(Node {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.children.len() - 1
            }
        };
        &mut self.children[i]
    }
}

/// Render `paths` as an indented tree, siblings in first-seen order.
///
/// Directories end with `/`. A name used both as a file and as a directory
/// is shown once, as a directory.
pub fn render_tree<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let mut root = Node::default();
    for path in paths {
        let mut node = &mut root;
        let parts: Vec<_> = path.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
        for (i, part) in parts.iter().enumerate() {
            node = node.child(part);
            if i + 1 == parts.len() {
                node.is_file = true;
            }
        }
    }
    let mut out = String::new();
    render(&root, 0, &mut out);
    out
}

fn render(node: &Node, depth: usize, out: &mut String) {
    for c in &node.children {
        let slash = if c.children.is_empty() && c.is_file { "" } else { "/" };
        let _ = writeln!(out, "{:indent$}{}{}", "", c.name, slash, indent = depth * 2);
        render(c, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_by_separator_in_first_seen_order() {
        let tree = render_tree([
            "/project_root/src/main.rs",
            "/project_root/README.md",
            "/project_root/src/lib.rs",
            "/other/x",
        ]);
        assert_eq!(
            tree,
            "project_root/\n  src/\n    main.rs\n    lib.rs\n  README.md\nother/\n  x\n"
        );
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(render_tree(Vec::<&str>::new()), "");
    }
}
