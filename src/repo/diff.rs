use similar::TextDiff;

/// Render a unified patch block for one path.
///
/// Equal inputs render to the empty string; an empty `from` renders as a pure
/// insertion and an empty `to` as a pure deletion, which is how untracked and
/// removed files enter the patch document.
pub fn render_patch(path: &str, from: &str, to: &str) -> String {
    if from == to {
        return String::new();
    }
    TextDiff::from_lines(from, to)
        .unified_diff()
        .context_radius(3)
        .header(path, path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_yields_empty_patch() {
        assert_eq!(render_patch("a.txt", "same\n", "same\n"), "");
        assert_eq!(render_patch("a.txt", "", ""), "");
    }

    fn body_lines_with(patch: &str, prefix: char) -> usize {
        patch
            .lines()
            .filter(|l| l.starts_with(prefix) && !l.starts_with("+++") && !l.starts_with("---"))
            .count()
    }

    #[test]
    fn empty_from_yields_pure_insertion() {
        let patch = render_patch("a.txt", "", "something");
        assert!(patch.contains("+something"), "patch: {patch}");
        assert_eq!(body_lines_with(&patch, '-'), 0, "patch: {patch}");
    }

    #[test]
    fn empty_to_yields_pure_deletion() {
        let patch = render_patch("a.txt", "something", "");
        assert!(patch.contains("-something"), "patch: {patch}");
        assert_eq!(body_lines_with(&patch, '+'), 0, "patch: {patch}");
    }

    #[test]
    fn patch_is_addressed_to_the_path() {
        let patch = render_patch("dir/a.txt", "one\n", "two\n");
        assert!(patch.contains("dir/a.txt"), "patch: {patch}");
        assert!(patch.contains("-one"), "patch: {patch}");
        assert!(patch.contains("+two"), "patch: {patch}");
    }
}
