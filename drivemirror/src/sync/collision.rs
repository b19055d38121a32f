use std::collections::{HashMap, HashSet};

use super::extension::infer_extension;
use super::remote::{NodeKind, RemoteNode};
use super::sanitize::{file_component, folder_component};
use super::transfer::PARTIAL_SUFFIX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChild {
    pub node: RemoteNode,
    /// Name of the directory or file inside the parent's local directory.
    pub local_name: String,
}

/// Maps each child of one folder to a distinct local name, preserving
/// listing order.
///
/// Children that would land on the same name are disambiguated by remote
/// id: the smallest id keeps the plain name and the rest get ` (<id>)`
/// before the extension. The outcome does not depend on listing order.
///
/// A file's staging name (`<name>.partial`) is reserved as well, so a
/// sibling literally called `a.bin.partial` is renamed instead of being
/// overwritten while `a.bin` downloads.
pub fn plan_children(children: Vec<RemoteNode>) -> Vec<PlannedChild> {
    let candidates: Vec<String> = children.iter().map(candidate_name).collect();

    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, name) in candidates.iter().enumerate() {
        groups.entry(name.as_str()).or_default().push(index);
    }

    let mut names: Vec<String> = candidates.clone();
    let mut taken: HashSet<String> = HashSet::new();
    let mut losers: Vec<usize> = Vec::new();

    for members in groups.values() {
        let mut members = members.clone();
        members.sort_by(|&a, &b| children[a].id.cmp(&children[b].id));
        taken.insert(candidates[members[0]].clone());
        losers.extend_from_slice(&members[1..]);
    }

    losers.sort_by(|&a, &b| children[a].id.cmp(&children[b].id));
    for index in losers {
        let name = unique_suffixed(&children[index], &candidates[index], &taken);
        taken.insert(name.clone());
        names[index] = name;
    }

    // `taken` covers every assigned name and staging name, so a rename
    // never introduces a new clash.
    loop {
        let staging: HashSet<String> = children
            .iter()
            .zip(&names)
            .filter(|(node, _)| node.kind == NodeKind::File)
            .map(|(_, name)| staging_name(name))
            .collect();
        let clash = (0..children.len())
            .filter(|&index| staging.contains(&names[index]))
            .min_by(|&a, &b| children[a].id.cmp(&children[b].id));
        let Some(index) = clash else {
            break;
        };
        taken.extend(staging);
        let name = unique_suffixed(&children[index], &candidates[index], &taken);
        taken.insert(name.clone());
        names[index] = name;
    }

    children
        .into_iter()
        .zip(names)
        .map(|(node, local_name)| PlannedChild { node, local_name })
        .collect()
}

fn unique_suffixed(node: &RemoteNode, candidate: &str, taken: &HashSet<String>) -> String {
    let mut name = with_suffix(candidate, &node.id, node.kind);
    let mut counter = 2u32;
    while taken.contains(&name)
        || (node.kind == NodeKind::File && taken.contains(&staging_name(&name)))
    {
        let tag = format!("{} {counter}", node.id);
        name = with_suffix(candidate, &tag, node.kind);
        counter += 1;
    }
    name
}

fn staging_name(name: &str) -> String {
    format!("{name}{PARTIAL_SUFFIX}")
}

fn candidate_name(node: &RemoteNode) -> String {
    match node.kind {
        NodeKind::Folder => folder_component(&node.name),
        NodeKind::File => file_component(&infer_extension(&node.name, &node.mime_type)),
    }
}

fn with_suffix(name: &str, id: &str, kind: NodeKind) -> String {
    if kind == NodeKind::File
        && let Some((stem, ext)) = name.rsplit_once('.')
        && !stem.is_empty()
    {
        return format!("{stem} ({id}).{ext}");
    }
    format!("{name} ({id})")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, name: &str) -> RemoteNode {
        RemoteNode {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::File,
            size: 1,
            mime_type: "application/pdf".into(),
        }
    }

    fn folder(id: &str, name: &str) -> RemoteNode {
        RemoteNode {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::Folder,
            size: 0,
            mime_type: drivemirror_core::FOLDER_MIME_TYPE.into(),
        }
    }

    fn names(plan: &[PlannedChild]) -> Vec<&str> {
        plan.iter().map(|p| p.local_name.as_str()).collect()
    }

    #[test]
    fn distinct_names_are_untouched() {
        let plan = plan_children(vec![
            file("1", "a.pdf"),
            folder("2", "Trip: 2024"),
            file("3", "scan"),
        ]);
        assert_eq!(names(&plan), vec!["a.pdf", "Trip 2024", "scan.pdf"]);
    }

    #[test]
    fn smallest_id_keeps_plain_name_regardless_of_order() {
        let forward = plan_children(vec![file("b", "report.pdf"), file("a", "report.pdf")]);
        let reverse = plan_children(vec![file("a", "report.pdf"), file("b", "report.pdf")]);

        assert_eq!(names(&forward), vec!["report (b).pdf", "report.pdf"]);
        assert_eq!(names(&reverse), vec!["report.pdf", "report (b).pdf"]);
    }

    #[test]
    fn folders_colliding_after_sanitization_are_suffixed() {
        let plan = plan_children(vec![folder("x1", "A/B"), folder("x2", "AB")]);
        assert_eq!(names(&plan), vec!["AB", "AB (x2)"]);
    }

    #[test]
    fn file_and_folder_share_one_namespace() {
        let plan = plan_children(vec![folder("2", "notes.pdf"), file("1", "notes.pdf")]);
        assert_eq!(names(&plan), vec!["notes.pdf (2)", "notes.pdf"]);
    }

    #[test]
    fn suffix_that_is_already_taken_gets_a_counter() {
        let plan = plan_children(vec![
            file("a", "x.pdf"),
            file("b", "x.pdf"),
            file("c", "x (b).pdf"),
        ]);
        assert_eq!(names(&plan), vec!["x.pdf", "x (b 2).pdf", "x (b).pdf"]);
    }

    #[test]
    fn staging_name_of_a_sibling_is_never_reused() {
        let plan = plan_children(vec![file("p", "a.pdf.partial"), file("q", "a.pdf")]);
        assert_eq!(names(&plan), vec!["a.pdf (p).partial", "a.pdf"]);

        let plan = plan_children(vec![file("q", "a.pdf"), file("p", "a.pdf.partial")]);
        assert_eq!(names(&plan), vec!["a.pdf", "a.pdf (p).partial"]);
    }

    #[test]
    fn folder_named_like_a_staging_file_is_renamed() {
        let plan = plan_children(vec![folder("d", "a.pdf.partial"), file("f", "a.pdf")]);
        assert_eq!(names(&plan), vec!["a.pdf.partial (d)", "a.pdf"]);
    }
}
