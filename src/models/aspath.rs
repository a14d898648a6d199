use crate::models::*;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Enum of AS path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AsPathSegment {
    Sequence(Vec<Asn>),
    Set(Vec<Asn>),
    ConfedSequence(Vec<Asn>),
    ConfedSet(Vec<Asn>),
}

impl AsPathSegment {
    /// Shorthand for creating a `Sequence` segment.
    pub fn sequence<S: AsRef<[u32]>>(seq: S) -> Self {
        AsPathSegment::Sequence(seq.as_ref().iter().copied().map_into().collect())
    }

    /// Shorthand for creating a `Set` segment.
    pub fn set<S: AsRef<[u32]>>(seq: S) -> Self {
        AsPathSegment::Set(seq.as_ref().iter().copied().map_into().collect())
    }

    /// Gets if a segment represents the local members of an autonomous system
    /// confederation.
    ///
    /// <https://datatracker.ietf.org/doc/html/rfc3065#section-5>
    pub fn is_confed(&self) -> bool {
        matches!(
            self,
            AsPathSegment::ConfedSequence(_) | AsPathSegment::ConfedSet(_)
        )
    }

    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_ref().is_empty()
    }
}

impl AsRef<[Asn]> for AsPathSegment {
    fn as_ref(&self) -> &[Asn] {
        let (AsPathSegment::Sequence(x)
        | AsPathSegment::Set(x)
        | AsPathSegment::ConfedSequence(x)
        | AsPathSegment::ConfedSet(x)) = self;
        x
    }
}

/// An AS path as observed in a RIB row or an announcement.
#[derive(Debug, PartialEq, Clone, Eq, Default, Hash, Serialize, Deserialize)]
pub struct AsPath {
    pub segments: Vec<AsPathSegment>,
}

impl AsPath {
    pub fn new() -> AsPath {
        AsPath { segments: vec![] }
    }

    /// Shorthand for creating an `AsPath` consisting of a single `Sequence` segment.
    pub fn from_sequence<S: AsRef<[u32]>>(seq: S) -> Self {
        AsPath {
            segments: vec![AsPathSegment::sequence(seq)],
        }
    }

    pub fn from_segments(segments: Vec<AsPathSegment>) -> AsPath {
        AsPath { segments }
    }

    /// Check if the path is empty. Note that a non-empty path may still have a
    /// route length of 0 due to empty segments or confederation segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Get the total length of the routes this path represents. Sets count as
    /// one hop, confederation segments as zero.
    pub fn route_len(&self) -> usize {
        self.segments
            .iter()
            .map(|seg| match seg {
                AsPathSegment::Sequence(v) => v.len(),
                AsPathSegment::Set(_) => 1,
                AsPathSegment::ConfedSequence(_) | AsPathSegment::ConfedSet(_) => 0,
            })
            .sum()
    }

    /// The first segment of the path, i.e. the one adjacent to the announcing
    /// peer.
    pub fn first_segment(&self) -> Option<&AsPathSegment> {
        self.segments.first()
    }

    /// The origin segment of the path, i.e. the last one.
    pub fn origin_segment(&self) -> Option<&AsPathSegment> {
        self.segments.last()
    }

    /// The neighbour AS the path was learned from, when the leading segment is
    /// a plain sequence.
    pub fn first_asn(&self) -> Option<Asn> {
        match self.first_segment() {
            Some(AsPathSegment::Sequence(v)) => v.first().copied(),
            _ => None,
        }
    }
}

impl Display for AsPath {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            if index != 0 {
                write!(f, " ")?;
            }
            match segment {
                AsPathSegment::Sequence(v) | AsPathSegment::ConfedSequence(v) => {
                    write!(f, "{}", v.iter().join(" "))?;
                }
                AsPathSegment::Set(v) | AsPathSegment::ConfedSet(v) => {
                    write!(f, "{{{}}}", v.iter().join(","))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let path = AsPath::from_segments(vec![
            AsPathSegment::sequence([174, 1916, 52888]),
            AsPathSegment::set([65001, 65002]),
        ]);
        assert_eq!(path.to_string(), "174 1916 52888 {65001,65002}");
    }

    #[test]
    fn test_first_asn() {
        let path = AsPath::from_sequence([3356, 13335]);
        assert_eq!(path.first_asn(), Some(Asn::new(3356)));
        assert_eq!(AsPath::new().first_asn(), None);

        let set_first = AsPath::from_segments(vec![AsPathSegment::set([3356, 174])]);
        assert_eq!(set_first.first_asn(), None);
    }
}
