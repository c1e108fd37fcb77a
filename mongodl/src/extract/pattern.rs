use crate::error::DownloaderError;
use std::collections::HashSet;

const RECURSIVE_WILDCARD: &str = "**";

#[derive(Debug, Clone)]
enum Segment {
    Recursive,
    Glob(glob::Pattern),
}

/// A glob over whole archive member paths.
///
/// Each `/`-separated segment is a shell-style wildcard matched against one
/// path segment, except `**` which consumes any number of segments, none
/// included. Matching is anchored at the root of the member path, and once
/// the pattern is used up any remaining path segments are accepted, so
/// `bin` selects everything below `bin/`.
#[derive(Debug, Clone)]
pub struct MemberPattern {
    source: String,
    segments: Vec<Segment>,
}

impl MemberPattern {
    pub fn new(pattern: &str) -> Result<Self, DownloaderError> {
        let segments = path_segments(pattern)
            .into_iter()
            .map(|segment| {
                if segment == RECURSIVE_WILDCARD {
                    Ok(Segment::Recursive)
                } else {
                    glob::Pattern::new(segment).map(Segment::Glob)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: pattern.to_owned(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    #[cfg(test)]
    pub fn matches(&self, path: &str) -> bool {
        self.matches_segments(&path_segments(path))
    }

    pub fn matches_segments(&self, path: &[&str]) -> bool {
        // (pattern index, path index) states still to explore.
        let mut pending = vec![(0usize, 0usize)];
        let mut seen = HashSet::new();

        while let Some(state) = pending.pop() {
            if !seen.insert(state) {
                continue;
            }

            let (pattern_index, path_index) = state;
            let Some(head) = self.segments.get(pattern_index) else {
                return true;
            };

            match head {
                Segment::Recursive => {
                    for suffix_start in (path_index..=path.len()).rev() {
                        pending.push((pattern_index + 1, suffix_start));
                    }
                }
                Segment::Glob(glob) => {
                    if let Some(segment) = path.get(path_index) {
                        if glob.matches(segment) {
                            pending.push((pattern_index + 1, path_index + 1));
                        }
                    }
                }
            }
        }

        false
    }
}

/// Split a relative path into its segments, dropping empty and `.` parts.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect()
}
