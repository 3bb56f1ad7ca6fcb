//! # Path Matching
//!
//! Segment-wise matching of a normalized request path against a route
//! pattern with `{name}` placeholders.
//!
//! Placeholders are segment-bounded, so matching is a single pairwise walk
//! over the segment lists: O(segments), no backtracking.
//!
//! Paths arrive still percent-encoded. Each segment is decoded only after
//! the split, so an encoded `/` stays inside its segment.

use std::borrow::Cow;

/// One segment of a compiled pattern
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Compiled route pattern
///
/// Built from an already-normalized pattern (no leading/trailing slash).
/// The empty pattern is the root route and matches only the empty path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

/// Outcome of matching one path against one pattern
///
/// `params` are positional: aligned with the placeholders' order of
/// appearance in the pattern. Empty when `matched` is false.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// Whether every segment matched
    pub matched: bool,
    /// Extracted placeholder values, left to right
    pub params: Vec<String>,
}

impl MatchResult {
    fn miss() -> Self {
        Self::default()
    }

    /// The params when matched, `None` otherwise
    #[must_use]
    pub fn into_params(self) -> Option<Vec<String>> {
        self.matched.then_some(self.params)
    }
}

impl PathPattern {
    /// Compile a normalized pattern
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .map(|segment| match parse_placeholder(segment) {
                Some(name) => Segment::Placeholder(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();

        Self {
            source: pattern.to_string(),
            segments,
        }
    }

    /// The normalized pattern text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of `/`-separated segments
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Number of placeholder segments
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Placeholder(_)))
            .count()
    }

    /// Placeholder names in order of appearance
    pub fn placeholder_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a normalized path against this pattern
    ///
    /// Segments are percent-decoded before comparison, and captured
    /// values are returned decoded.
    #[must_use]
    pub fn match_path(&self, path: &str) -> MatchResult {
        let path_segments: Vec<&str> = path.split('/').collect();

        if path_segments.len() != self.segments.len() {
            return MatchResult::miss();
        }

        let mut params = Vec::with_capacity(self.placeholder_count());

        for (pattern_seg, path_seg) in self.segments.iter().zip(path_segments) {
            let decoded = decode_segment(path_seg);
            match pattern_seg {
                Segment::Placeholder(_) => params.push(decoded.into_owned()),
                Segment::Literal(literal) if *literal != decoded => return MatchResult::miss(),
                Segment::Literal(_) => {}
            }
        }

        MatchResult {
            matched: true,
            params,
        }
    }
}

/// Match `path` against `pattern`, both already normalized
#[must_use]
pub fn match_path(pattern: &str, path: &str) -> MatchResult {
    PathPattern::parse(pattern).match_path(path)
}

/// Percent-decode one path segment, keeping it raw when the escapes are
/// not valid UTF-8
fn decode_segment(segment: &str) -> Cow<'_, str> {
    urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment))
}

/// `{name}` -> `Some("name")`, anything else -> `None`
fn parse_placeholder(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_static_match() {
        let m = match_path("about", "about");
        assert!(m.matched);
        assert!(m.params.is_empty());

        assert!(!match_path("about", "contact").matched);
        assert!(!match_path("about", "About").matched);
    }

    #[test]
    fn test_dynamic_match_positional() {
        let m = match_path("user/{id}/name/{name}", "user/21/name/johnjoe");
        assert!(m.matched);
        assert_eq!(m.params, vec!["21", "johnjoe"]);
    }

    #[test]
    fn test_literal_mismatch_in_dynamic_pattern() {
        let m = match_path("user/{id}/name/{name}", "user/21/nick/johnjoe");
        assert!(!m.matched);
        assert!(m.params.is_empty());
    }

    #[test]
    fn test_segment_count_guard() {
        assert!(!match_path("user/{id}", "user").matched);
        assert!(!match_path("user/{id}", "user/1/extra").matched);
        assert!(!match_path("about", "about/us").matched);
    }

    #[test]
    fn test_root_pattern() {
        assert!(match_path("", "").matched);
        assert!(!match_path("", "about").matched);
        assert!(!match_path("about", "").matched);
    }

    #[test]
    fn test_segments_are_decoded_after_splitting() {
        let m = match_path("files/{name}", "files/a%2Fb");
        assert_eq!(m.into_params(), Some(vec!["a/b".to_string()]));
        assert!(!match_path("files/{name}", "files/a/b").matched);

        let m = match_path("name/{name}", "name/Ren%C3%A9");
        assert_eq!(m.into_params(), Some(vec!["Ren\u{e9}".to_string()]));

        let m = match_path("name/{name}", "name/john%20doe");
        assert_eq!(m.into_params(), Some(vec!["john doe".to_string()]));

        assert!(match_path("a-b", "a%2Db").matched);
        assert_eq!(
            match_path("{raw}", "bad%FF").into_params(),
            Some(vec!["bad%FF".to_string()])
        );
    }

    #[test]
    fn test_placeholder_names() {
        let pattern = PathPattern::parse("posts/{post_id}/comments/{comment_id}");
        let names: Vec<_> = pattern.placeholder_names().collect();
        assert_eq!(names, vec!["post_id", "comment_id"]);
        assert_eq!(pattern.placeholder_count(), 2);
        assert_eq!(pattern.segment_count(), 4);
    }

    #[test]
    fn test_into_params() {
        assert_eq!(
            match_path("{a}", "x").into_params(),
            Some(vec!["x".to_string()])
        );
        assert_eq!(match_path("a", "x").into_params(), None);
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,6}"
    }

    proptest! {
        #[test]
        fn prop_matches_iff_literals_equal(
            path in prop::collection::vec(segment(), 1..6),
            mask in prop::collection::vec(any::<bool>(), 6),
            replace in prop::collection::vec(segment(), 6),
        ) {
            // Build a pattern over the same segment count: placeholders where
            // the mask is set, otherwise a literal that may differ from the path.
            let mut pattern = Vec::new();
            let mut expect_match = true;
            let mut expected = Vec::new();
            for (i, seg) in path.iter().enumerate() {
                if mask[i] {
                    pattern.push(format!("{{p{i}}}"));
                    expected.push(seg.clone());
                } else {
                    if &replace[i] != seg {
                        expect_match = false;
                    }
                    pattern.push(replace[i].clone());
                }
            }

            let m = match_path(&pattern.join("/"), &path.join("/"));
            prop_assert_eq!(m.matched, expect_match);
            if expect_match {
                prop_assert_eq!(m.params, expected);
            }
        }

        #[test]
        fn prop_segment_count_mismatch_never_matches(
            pattern in prop::collection::vec(segment(), 1..6),
            path in prop::collection::vec(segment(), 1..6),
        ) {
            prop_assume!(pattern.len() != path.len());
            let pattern: Vec<String> = pattern.iter().map(|s| format!("{{{s}}}")).collect();
            prop_assert!(!match_path(&pattern.join("/"), &path.join("/")).matched);
        }
    }
}
