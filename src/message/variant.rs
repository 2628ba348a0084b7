//! Content variant tags and the sets agents declare they accept.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag naming one of the closed set of content variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantTag {
    Text,
    Chat,
    Chunk,
    MultiModal,
}

impl VariantTag {
    /// Every variant, in declaration order.
    pub const ALL: [VariantTag; 4] = [
        VariantTag::Text,
        VariantTag::Chat,
        VariantTag::Chunk,
        VariantTag::MultiModal,
    ];

    const fn bit(self) -> u8 {
        match self {
            VariantTag::Text => 1,
            VariantTag::Chat => 1 << 1,
            VariantTag::Chunk => 1 << 2,
            VariantTag::MultiModal => 1 << 3,
        }
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariantTag::Text => "plain text",
            VariantTag::Chat => "structured chat",
            VariantTag::Chunk => "streaming chunk",
            VariantTag::MultiModal => "multi-modal",
        };
        f.write_str(name)
    }
}

/// A set of [`VariantTag`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VariantSet(u8);

impl VariantSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0b1111)
    }

    pub const fn of(tags: &[VariantTag]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < tags.len() {
            bits |= tags[i].bit();
            i += 1;
        }
        Self(bits)
    }

    pub const fn with(self, tag: VariantTag) -> Self {
        Self(self.0 | tag.bit())
    }

    pub const fn union(self, other: VariantSet) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(self, tag: VariantTag) -> bool {
        self.0 & tag.bit() != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = VariantTag> {
        VariantTag::ALL.into_iter().filter(move |t| self.contains(*t))
    }
}

impl FromIterator<VariantTag> for VariantSet {
    fn from_iter<I: IntoIterator<Item = VariantTag>>(iter: I) -> Self {
        iter.into_iter().fold(VariantSet::empty(), VariantSet::with)
    }
}

impl fmt::Display for VariantSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|t| t.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_set_membership() {
        let set = VariantSet::of(&[VariantTag::Chat, VariantTag::Chunk]);
        assert!(set.contains(VariantTag::Chat));
        assert!(!set.contains(VariantTag::Text));
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn test_variant_set_union() {
        let set = VariantSet::of(&[VariantTag::Chat]).union(VariantSet::of(&[VariantTag::Text]));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![VariantTag::Text, VariantTag::Chat]);
        assert!(VariantSet::empty().is_empty());
        assert_eq!(VariantTag::ALL.into_iter().collect::<VariantSet>(), VariantSet::all());
    }
}
