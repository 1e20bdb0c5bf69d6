//! Renderers for the walked graph: an indented tree and a flat postorder
//! install list. Both write to any `io::Write` so the CLI can direct them
//! at stdout and tests at a buffer.

use std::collections::HashSet;
use std::io;

use crate::walker::{DepNode, DepWalk, NodeKey};

fn render_extras(node: &DepNode) -> String {
    match &node.dep_extras {
        Some(extras) if !extras.is_empty() => {
            let joined: Vec<&str> = extras.iter().map(String::as_str).collect();
            format!("[{}]", joined.join(", "))
        }
        _ => String::new(),
    }
}

/// Indented tree, one line per edge in discovery order. Nodes reached by a
/// second edge are marked `(already listed)` and not expanded again.
pub fn print_deps<W: io::Write>(walk: &DepWalk, out: &mut W) -> io::Result<()> {
    let mut seen = HashSet::new();
    print_deps_from(walk, walk.root_node(), &mut seen, 0, out)
}

fn print_deps_from<W: io::Write>(
    walk: &DepWalk,
    node: &DepNode,
    seen: &mut HashSet<NodeKey>,
    depth: usize,
    out: &mut W,
) -> io::Result<()> {
    let prefix = ". ".repeat(depth);
    for edge in &node.deps {
        let target = walk.node(&edge.target);
        let extras = render_extras(target);
        let marker = edge
            .markers
            .as_ref()
            .map(|m| format!(" ; {m}"))
            .unwrap_or_default();
        if seen.contains(&edge.target) {
            writeln!(
                out,
                "{prefix}{}{extras} (=={}) (already listed){marker}",
                target.name, target.version
            )?;
        } else {
            seen.insert(edge.target.clone());
            let constraints = edge.constraints.as_deref().unwrap_or("*");
            let no_whl = if target.has_bdist == Some(true) {
                ""
            } else {
                " no whl"
            };
            writeln!(
                out,
                "{prefix}{}{extras} (=={}){marker} via {constraints}{no_whl}",
                target.name, target.version
            )?;
            if !target.deps.is_empty() {
                print_deps_from(walk, target, seen, depth + 1, out)?;
            }
        }
    }
    Ok(())
}

/// Flat postorder listing (`name[extras]==version`), dependencies before
/// their dependents, each node once.
pub fn print_flat_deps<W: io::Write>(walk: &DepWalk, out: &mut W) -> io::Result<()> {
    let mut seen = HashSet::new();
    print_flat_from(walk, walk.root_node(), &mut seen, out)
}

fn print_flat_from<W: io::Write>(
    walk: &DepWalk,
    node: &DepNode,
    seen: &mut HashSet<NodeKey>,
    out: &mut W,
) -> io::Result<()> {
    for edge in &node.deps {
        let target = walk.node(&edge.target);
        let already = seen.contains(&edge.target);
        seen.insert(edge.target.clone());
        if !already {
            if !target.deps.is_empty() {
                print_flat_from(walk, target, seen, out)?;
            }
            writeln!(
                out,
                "{}{}=={}",
                target.name,
                render_extras(target),
                target.version
            )?;
        }
    }
    Ok(())
}
