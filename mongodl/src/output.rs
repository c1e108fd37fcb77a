use crate::query::Listing;
use semver::Version;

const WRAP_WIDTH: usize = 78;
const INDENT: &str = "  ";

/// Print the listing. Match blocks are only shown for a filtered listing.
pub fn print_listing(listing: &Listing, show_matches: bool) {
    print!("{}", render_listing(listing, show_matches));
}

fn render_listing(listing: &Listing, show_matches: bool) -> String {
    let mut out = String::new();

    for component in listing.matching.iter().filter(|_| show_matches) {
        out.push_str(&format!(
            "Download: {}\n Version: {}\n  Target: {}\n    Arch: {}\n Edition: {}\n    Info: {}\n\n",
            component.key,
            component.version,
            component.target,
            component.arch,
            component.edition,
            component.data
        ));
    }

    let dimensions = &listing.dimensions;
    let mut versions = dimensions.versions.clone();
    sort_versions(&mut versions);

    out.push_str(&format!(
        "Architectures:\n{INDENT}{}\nTargets:\n{}\nEditions:\n{INDENT}{}\nVersions:\n{}\nComponents:\n{INDENT}{}\n",
        dimensions.arches.join(", "),
        wrap(&dimensions.targets.join(", ")),
        dimensions.editions.join(", "),
        wrap(&versions.join(", ")),
        dimensions.components.join(", "),
    ));

    out
}

/// Semantic versions first in ascending order, anything unparseable after.
fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
}

/// Greedy word wrap with every line indented.
fn wrap(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::from(INDENT);

    for word in text.split_whitespace() {
        if line.len() > INDENT.len() && line.len() + 1 + word.len() > WRAP_WIDTH {
            lines.push(std::mem::replace(&mut line, String::from(INDENT)));
        }

        if line.len() > INDENT.len() {
            line.push(' ');
        }
        line.push_str(word);
    }

    lines.push(line);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CachedComponent;
    use crate::query::Dimensions;

    #[test]
    fn versions_sort_semantically() {
        let mut versions = vec![
            "7.0.10".to_owned(),
            "latest".to_owned(),
            "7.0.2".to_owned(),
            "6.0.0-rc1".to_owned(),
        ];
        sort_versions(&mut versions);
        assert_eq!(versions, ["6.0.0-rc1", "7.0.2", "7.0.10", "latest"]);
    }

    #[test]
    fn long_lists_wrap_with_indent() {
        let text = (0..40).map(|i| format!("v{i}")).collect::<Vec<_>>().join(", ");
        let wrapped = wrap(&text);

        assert!(wrapped.lines().count() > 1);
        for line in wrapped.lines() {
            assert!(line.len() <= WRAP_WIDTH, "{line:?} is too long");
            assert!(line.starts_with(INDENT));
        }
        assert_eq!(wrapped.split_whitespace().collect::<Vec<_>>().join(" "), text);
    }

    #[test]
    fn listing_shows_matches_and_dimensions() {
        let listing = Listing {
            matching: vec![CachedComponent {
                version: "7.0.1".to_owned(),
                target: "ubuntu2004".to_owned(),
                arch: "x86_64".to_owned(),
                edition: "targeted".to_owned(),
                key: "archive".to_owned(),
                data: "{\"url\":\"https://example.com/a.tgz\"}".to_owned(),
            }],
            dimensions: Dimensions {
                versions: vec!["7.0.1".to_owned()],
                targets: vec!["null".to_owned(), "ubuntu2004".to_owned()],
                arches: vec!["x86_64".to_owned()],
                editions: vec!["targeted".to_owned()],
                components: vec!["archive".to_owned()],
            },
        };

        let rendered = render_listing(&listing, true);

        assert!(rendered.starts_with("Download: archive\n Version: 7.0.1\n"));
        assert!(rendered.contains("Targets:\n  null, ubuntu2004\n"));
        assert!(rendered.ends_with("Components:\n  archive\n"));

        let unfiltered = render_listing(&listing, false);
        assert!(unfiltered.starts_with("Architectures:\n"));
        assert!(!unfiltered.contains("Download: "));
    }
}
